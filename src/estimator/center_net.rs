//! CenterNet anchor-free detector
//!
//! Detects objects as center-point peaks on a class heatmap with regressed
//! sizes, no anchor boxes involved.

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::ConfigMap;
use crate::estimator::{
    group_f64, group_str, train_epochs, train_seed, Estimator, EstimatorKind, ParamSnapshot,
};
use crate::search::trial::Reporter;

const DEFAULT_EPOCHS: usize = 40;

/// CenterNet hyperparameters (`center_net` configuration group)
#[derive(Debug, Clone)]
pub struct CenterNetConfig {
    /// Backbone feature extractor
    pub backbone: String,

    /// Base learning rate
    pub lr: f64,

    /// Weight on the size-regression loss term
    pub wh_weight: f64,
}

impl Default for CenterNetConfig {
    fn default() -> Self {
        Self {
            backbone: "resnet18_v1b".to_string(),
            lr: 1.25e-4,
            wh_weight: 0.1,
        }
    }
}

impl CenterNetConfig {
    /// Read the `center_net` group of a nested configuration
    pub fn from_nested(nested: &ConfigMap) -> Self {
        let defaults = Self::default();
        Self {
            backbone: group_str(nested, "center_net", "backbone").unwrap_or(defaults.backbone),
            lr: group_f64(nested, "center_net", "lr").unwrap_or(defaults.lr),
            wh_weight: group_f64(nested, "center_net", "wh_weight").unwrap_or(defaults.wh_weight),
        }
    }

    /// Validate hyperparameter ranges
    pub fn validate(&self) -> Result<()> {
        if self.lr <= 0.0 {
            bail!("center_net.lr must be positive, got {}", self.lr);
        }
        if self.wh_weight < 0.0 {
            bail!("center_net.wh_weight must be non-negative");
        }
        Ok(())
    }
}

/// CenterNet detection estimator
#[derive(Debug)]
pub struct CenterNetEstimator {
    config: CenterNetConfig,
    epochs: usize,
    seed: u64,
    reporter: Reporter,
    params: ParamSnapshot,
}

pub(crate) fn construct(nested: &ConfigMap, reporter: Reporter) -> Result<Box<dyn Estimator>> {
    Ok(Box::new(CenterNetEstimator::from_nested(nested, reporter)))
}

impl CenterNetEstimator {
    /// Build from a nested configuration and a reward channel
    pub fn from_nested(nested: &ConfigMap, reporter: Reporter) -> Self {
        Self {
            config: CenterNetConfig::from_nested(nested),
            epochs: train_epochs(nested, DEFAULT_EPOCHS),
            seed: train_seed(nested),
            reporter,
            params: ParamSnapshot::default(),
        }
    }
}

impl Estimator for CenterNetEstimator {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::CenterNet
    }

    fn fit(&mut self) -> Result<()> {
        self.config.validate()?;
        let mut rng = StdRng::seed_from_u64(self.seed);

        // CenterNet's sweet spot sits lower than the anchor-based variants.
        let lr_offset = (self.config.lr.log10() - (-3.9)).abs().min(4.0) / 4.0;
        let ceiling = 0.74 * (1.0 - 0.5 * lr_offset);

        for epoch in 1..=self.epochs {
            let progress = 1.0 - (-(epoch as f64) / 10.0).exp();
            let noise = rng.gen_range(-0.01..0.01);
            self.reporter
                .report(epoch, (ceiling * progress + noise).clamp(0.0, 1.0));
        }

        self.params = ParamSnapshot {
            layers: [
                (
                    format!("backbone.{}", self.config.backbone),
                    (0..72).map(|_| rng.gen_range(-0.1..0.1)).collect(),
                ),
                (
                    "heatmap_head".to_string(),
                    (0..40).map(|_| rng.gen_range(-0.1..0.1)).collect(),
                ),
                (
                    "wh_head".to_string(),
                    (0..16).map(|_| rng.gen_range(-0.1..0.1)).collect(),
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
