//! Detection estimator variants
//!
//! The estimator set is closed: four architectures, selected through
//! [`EstimatorKind`] and constructed through a static lookup table so a new
//! variant cannot be added without the compiler pointing at every site that
//! must learn about it. Per-architecture training internals live in the
//! submodules; the search controller only sees the [`Estimator`] trait.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::ConfigMap;
use crate::error::TaskError;
use crate::search::trial::Reporter;

pub mod center_net;
pub mod faster_rcnn;
pub mod ssd;
pub mod yolo;

pub use center_net::CenterNetEstimator;
pub use faster_rcnn::FasterRcnnEstimator;
pub use ssd::SsdEstimator;
pub use yolo::YoloEstimator;

/// The closed set of detection architectures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    /// Single-shot detector
    Ssd,
    /// Two-stage region-proposal detector
    FasterRcnn,
    /// Single-stage YOLO-v3 style detector
    Yolo,
    /// Keypoint-based anchor-free detector
    CenterNet,
}

type Constructor = fn(&ConfigMap, Reporter) -> Result<Box<dyn Estimator>>;

/// Static constructor table, one entry per variant
const CONSTRUCTORS: [(EstimatorKind, Constructor); 4] = [
    (EstimatorKind::Ssd, ssd::construct),
    (EstimatorKind::FasterRcnn, faster_rcnn::construct),
    (EstimatorKind::Yolo, yolo::construct),
    (EstimatorKind::CenterNet, center_net::construct),
];

impl EstimatorKind {
    /// Every known variant, in capability-set order
    pub const ALL: [EstimatorKind; 4] = [
        EstimatorKind::Ssd,
        EstimatorKind::FasterRcnn,
        EstimatorKind::Yolo,
        EstimatorKind::CenterNet,
    ];

    /// Canonical lowercase name used in configuration and persisted files
    pub fn name(&self) -> &'static str {
        match self {
            EstimatorKind::Ssd => "ssd",
            EstimatorKind::FasterRcnn => "faster_rcnn",
            EstimatorKind::Yolo => "yolo",
            EstimatorKind::CenterNet => "center_net",
        }
    }

    /// Parse a configuration name into a variant
    pub fn parse(name: &str) -> Result<Self, TaskError> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| TaskError::InvalidEstimator(name.to_string()))
    }

    /// Instantiate this variant from a nested configuration
    ///
    /// The reporter is the estimator's only channel back to the scheduler;
    /// pass [`Reporter::sink`] when reconstructing a model that will not be
    /// trained.
    pub fn build(&self, nested: &ConfigMap, reporter: Reporter) -> Result<Box<dyn Estimator>> {
        let (_, constructor) = CONSTRUCTORS
            .iter()
            .find(|(kind, _)| kind == self)
            .expect("constructor table covers every variant");
        constructor(nested, reporter)
    }
}

impl std::fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A named snapshot of trained model parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSnapshot {
    /// Flattened parameter arrays keyed by layer name
    pub layers: BTreeMap<String, Vec<f32>>,
}

impl ParamSnapshot {
    /// True when no parameters have been recorded
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Total number of scalar parameters across all layers
    pub fn num_params(&self) -> usize {
        self.layers.values().map(Vec::len).sum()
    }
}

/// A trainable detection estimator
///
/// Implementations own their full training loop; the controller only
/// starts it, snapshots parameters afterwards, and restores them when
/// reconstructing the winning model.
pub trait Estimator: Send {
    /// Which architecture this is
    fn kind(&self) -> EstimatorKind;

    /// Run training to completion, reporting per-epoch reward
    fn fit(&mut self) -> Result<()>;

    /// Snapshot the current parameters
    fn collect_params(&self) -> ParamSnapshot;

    /// Restore parameters from a snapshot
    fn put_params(&mut self, params: &ParamSnapshot) -> Result<()>;
}

/// Read a float from a group sub-mapping (`nested[group][key]`)
pub(crate) fn group_f64(nested: &ConfigMap, group: &str, key: &str) -> Option<f64> {
    nested.get(group)?.as_map()?.get(key)?.as_f64()
}

/// Read a non-negative integer from a group sub-mapping
pub(crate) fn group_u64(nested: &ConfigMap, group: &str, key: &str) -> Option<u64> {
    nested
        .get(group)?
        .as_map()?
        .get(key)?
        .as_i64()
        .filter(|v| *v >= 0)
        .map(|v| v as u64)
}

/// Read a string from a group sub-mapping
pub(crate) fn group_str(nested: &ConfigMap, group: &str, key: &str) -> Option<String> {
    Some(nested.get(group)?.as_map()?.get(key)?.as_str()?.to_string())
}

/// Training epochs from the `train` group, with a per-architecture default
pub(crate) fn train_epochs(nested: &ConfigMap, default: usize) -> usize {
    group_u64(nested, "train", "epochs")
        .map(|v| v as usize)
        .unwrap_or(default)
}

/// Seed from the `train` group
pub(crate) fn train_seed(nested: &ConfigMap) -> u64 {
    group_u64(nested, "train", "seed").unwrap_or(crate::config::task::DEFAULT_SEED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_names() {
        for kind in EstimatorKind::ALL {
            assert_eq!(EstimatorKind::parse(kind.name()).unwrap(), kind);
        }
    }

    #[test]
    fn test_parse_unknown_name() {
        let err = EstimatorKind::parse("resnet_classifier").unwrap_err();
        assert!(matches!(err, TaskError::InvalidEstimator(_)));
    }

    #[test]
    fn test_constructor_table_covers_all() {
        for kind in EstimatorKind::ALL {
            assert!(CONSTRUCTORS.iter().any(|(k, _)| *k == kind));
        }
    }

    #[test]
    fn test_snapshot_counts() {
        let mut snapshot = ParamSnapshot::default();
        assert!(snapshot.is_empty());
        snapshot.layers.insert("head".into(), vec![0.0; 8]);
        snapshot.layers.insert("backbone".into(), vec![0.0; 16]);
        assert_eq!(snapshot.num_params(), 24);
    }
}
