//! YOLO-v3 style single-stage detector

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::ConfigMap;
use crate::estimator::{
    group_f64, group_str, group_u64, train_epochs, train_seed, Estimator, EstimatorKind,
    ParamSnapshot,
};
use crate::search::trial::Reporter;

const DEFAULT_EPOCHS: usize = 30;

/// YOLO hyperparameters (`yolo` configuration group)
#[derive(Debug, Clone)]
pub struct YoloConfig {
    /// Backbone feature extractor
    pub backbone: String,

    /// Square input resolution, multiple of 32
    pub data_shape: u64,

    /// Base learning rate
    pub lr: f64,

    /// Mixup augmentation toggle
    pub mixup: bool,
}

impl Default for YoloConfig {
    fn default() -> Self {
        Self {
            backbone: "darknet53".to_string(),
            data_shape: 416,
            lr: 1e-3,
            mixup: false,
        }
    }
}

impl YoloConfig {
    /// Read the `yolo` group of a nested configuration
    pub fn from_nested(nested: &ConfigMap) -> Self {
        let defaults = Self::default();
        let mixup = nested
            .get("yolo")
            .and_then(|v| v.as_map())
            .and_then(|m| m.get("mixup"))
            .and_then(|v| v.as_bool())
            .unwrap_or(defaults.mixup);
        Self {
            backbone: group_str(nested, "yolo", "backbone").unwrap_or(defaults.backbone),
            data_shape: group_u64(nested, "yolo", "data_shape").unwrap_or(defaults.data_shape),
            lr: group_f64(nested, "yolo", "lr").unwrap_or(defaults.lr),
            mixup,
        }
    }

    /// Validate hyperparameter ranges
    pub fn validate(&self) -> Result<()> {
        if self.lr <= 0.0 {
            bail!("yolo.lr must be positive, got {}", self.lr);
        }
        if self.data_shape == 0 || self.data_shape % 32 != 0 {
            bail!(
                "yolo.data_shape must be a positive multiple of 32, got {}",
                self.data_shape
            );
        }
        Ok(())
    }
}

/// YOLO detection estimator
#[derive(Debug)]
pub struct YoloEstimator {
    config: YoloConfig,
    epochs: usize,
    seed: u64,
    reporter: Reporter,
    params: ParamSnapshot,
}

pub(crate) fn construct(nested: &ConfigMap, reporter: Reporter) -> Result<Box<dyn Estimator>> {
    Ok(Box::new(YoloEstimator::from_nested(nested, reporter)))
}

impl YoloEstimator {
    /// Build from a nested configuration and a reward channel
    pub fn from_nested(nested: &ConfigMap, reporter: Reporter) -> Self {
        Self {
            config: YoloConfig::from_nested(nested),
            epochs: train_epochs(nested, DEFAULT_EPOCHS),
            seed: train_seed(nested),
            reporter,
            params: ParamSnapshot::default(),
        }
    }
}

impl Estimator for YoloEstimator {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::Yolo
    }

    fn fit(&mut self) -> Result<()> {
        self.config.validate()?;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let lr_offset = (self.config.lr.log10() - (-3.0)).abs().min(4.0) / 4.0;
        let mixup_bonus = if self.config.mixup { 0.02 } else { 0.0 };
        let ceiling = (0.76 + mixup_bonus) * (1.0 - 0.5 * lr_offset);

        for epoch in 1..=self.epochs {
            let progress = 1.0 - (-(epoch as f64) / 6.0).exp();
            let noise = rng.gen_range(-0.01..0.01);
            self.reporter
                .report(epoch, (ceiling * progress + noise).clamp(0.0, 1.0));
        }

        let scale_heads = (self.config.data_shape / 128).max(1) as usize;
        self.params = ParamSnapshot {
            layers: [
                (
                    format!("backbone.{}", self.config.backbone),
                    (0..80).map(|_| rng.gen_range(-0.1..0.1)).collect(),
                ),
                (
                    "yolo_outputs".to_string(),
                    (0..scale_heads * 24).map(|_| rng.gen_range(-0.1..0.1)).collect(),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(YoloConfig::default().validate().is_ok());
    }

    #[test]
    fn test_data_shape_must_be_multiple_of_32() {
        let config = YoloConfig {
            data_shape: 400,
            ..YoloConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
