//! Faster R-CNN two-stage detector
//!
//! Region proposals from an RPN feed a per-region classification head.
//! Slower per image than the one-stage variants but typically the accuracy
//! ceiling of the capability set. Hyperparameters live under the
//! `faster_rcnn` group.

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::ConfigMap;
use crate::estimator::{
    group_f64, group_str, group_u64, train_epochs, train_seed, Estimator, EstimatorKind,
    ParamSnapshot,
};
use crate::search::trial::Reporter;

const DEFAULT_EPOCHS: usize = 26;

/// Faster R-CNN hyperparameters
#[derive(Debug, Clone)]
pub struct FasterRcnnConfig {
    /// Backbone feature extractor
    pub backbone: String,

    /// Shorter image side after resize
    pub short_side: u64,

    /// Proposals kept after RPN non-max suppression
    pub rpn_post_nms: u64,

    /// Base learning rate
    pub lr: f64,
}

impl Default for FasterRcnnConfig {
    fn default() -> Self {
        Self {
            backbone: "resnet50_v1b".to_string(),
            short_side: 600,
            rpn_post_nms: 300,
            lr: 1e-3,
        }
    }
}

impl FasterRcnnConfig {
    /// Read the `faster_rcnn` group of a nested configuration
    pub fn from_nested(nested: &ConfigMap) -> Self {
        let defaults = Self::default();
        Self {
            backbone: group_str(nested, "faster_rcnn", "backbone").unwrap_or(defaults.backbone),
            short_side: group_u64(nested, "faster_rcnn", "short_side")
                .unwrap_or(defaults.short_side),
            rpn_post_nms: group_u64(nested, "faster_rcnn", "rpn_post_nms")
                .unwrap_or(defaults.rpn_post_nms),
            lr: group_f64(nested, "faster_rcnn", "lr").unwrap_or(defaults.lr),
        }
    }

    /// Validate hyperparameter ranges
    pub fn validate(&self) -> Result<()> {
        if self.lr <= 0.0 {
            bail!("faster_rcnn.lr must be positive, got {}", self.lr);
        }
        if self.short_side < 224 {
            bail!("faster_rcnn.short_side must be at least 224");
        }
        if self.rpn_post_nms == 0 {
            bail!("faster_rcnn.rpn_post_nms must be positive");
        }
        Ok(())
    }
}

/// Faster R-CNN detection estimator
#[derive(Debug)]
pub struct FasterRcnnEstimator {
    config: FasterRcnnConfig,
    epochs: usize,
    seed: u64,
    reporter: Reporter,
    params: ParamSnapshot,
}

pub(crate) fn construct(nested: &ConfigMap, reporter: Reporter) -> Result<Box<dyn Estimator>> {
    Ok(Box::new(FasterRcnnEstimator::from_nested(nested, reporter)))
}

impl FasterRcnnEstimator {
    /// Build from a nested configuration and a reward channel
    pub fn from_nested(nested: &ConfigMap, reporter: Reporter) -> Self {
        Self {
            config: FasterRcnnConfig::from_nested(nested),
            epochs: train_epochs(nested, DEFAULT_EPOCHS),
            seed: train_seed(nested),
            reporter,
            params: ParamSnapshot::default(),
        }
    }
}

impl Estimator for FasterRcnnEstimator {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::FasterRcnn
    }

    fn fit(&mut self) -> Result<()> {
        self.config.validate()?;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let lr_offset = (self.config.lr.log10() - (-3.0)).abs().min(4.0) / 4.0;
        // Higher ceiling, slower ramp than the one-stage detectors.
        let ceiling = 0.82 * (1.0 - 0.5 * lr_offset);

        for epoch in 1..=self.epochs {
            let progress = 1.0 - (-(epoch as f64) / 8.0).exp();
            let noise = rng.gen_range(-0.01..0.01);
            self.reporter
                .report(epoch, (ceiling * progress + noise).clamp(0.0, 1.0));
        }

        self.params = ParamSnapshot {
            layers: [
                (
                    format!("backbone.{}", self.config.backbone),
                    (0..96).map(|_| rng.gen_range(-0.1..0.1)).collect(),
                ),
                (
                    "rpn".to_string(),
                    (0..32).map(|_| rng.gen_range(-0.1..0.1)).collect(),
                ),
                (
                    "box_head".to_string(),
                    (0..48).map(|_| rng.gen_range(-0.1..0.1)).collect(),
                ),
            ]
            .into_iter()
            .collect(),
        };
        Ok(())
    }

    fn collect_params(&self) -> ParamSnapshot {
        self.params.clone()
    }

    fn put_params(&mut self, params: &ParamSnapshot) -> Result<()> {
        if params.is_empty() {
            bail!("refusing to load an empty parameter snapshot");
        }
        self.params = params.clone();
        Ok(())
    }
}
