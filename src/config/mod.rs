//! Configuration values and flat/nested normalization
//!
//! User configuration arrives either flat (`train.epochs = 1`) or nested
//! (`{train: {epochs: 1}}`). Trials and estimators consume the nested form;
//! the search space stores the flat form. [`to_nested`] and [`to_flat`] are
//! inverses on the recognized group keys and both are idempotent, so either
//! shape can be fed in at any boundary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod task;

pub use task::TaskConfig;

/// A single configuration value: scalar, list, or nested mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// Boolean flag
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating-point value
    Float(f64),
    /// String value
    Str(String),
    /// Homogeneous or mixed list
    List(Vec<ConfigValue>),
    /// Nested mapping
    Map(ConfigMap),
}

/// An ordered string-keyed configuration mapping
pub type ConfigMap = BTreeMap<String, ConfigValue>;

impl ConfigValue {
    /// Get as bool, if this is a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64, if this is an integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as f64 (integers are widened)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(v) => Some(*v),
            ConfigValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Get as string slice, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get as list, if this is a list
    pub fn as_list(&self) -> Option<&[ConfigValue]> {
        match self {
            ConfigValue::List(v) => Some(v),
            _ => None,
        }
    }

    /// Get as nested mapping, if this is a map
    pub fn as_map(&self) -> Option<&ConfigMap> {
        match self {
            ConfigValue::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        ConfigValue::Bool(v)
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        ConfigValue::Int(v)
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        ConfigValue::Float(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        ConfigValue::Str(v.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        ConfigValue::Str(v)
    }
}

/// Group prefixes that nest under their own sub-mapping
///
/// Dotted keys with any other prefix stay top-level untouched.
pub const GROUPS: [&str; 8] = [
    "train",
    "validation",
    "dataset",
    "estimator",
    "ssd",
    "faster_rcnn",
    "yolo",
    "center_net",
];

fn is_group(key: &str) -> bool {
    GROUPS.contains(&key)
}

/// Insert a possibly-dotted key into a mapping, nesting at each dot
fn insert_nested(map: &mut ConfigMap, key: &str, value: ConfigValue) {
    match key.split_once('.') {
        Some((head, rest)) => {
            let entry = map
                .entry(head.to_string())
                .or_insert_with(|| ConfigValue::Map(ConfigMap::new()));
            if let ConfigValue::Map(inner) = entry {
                insert_nested(inner, rest, value);
            } else {
                // A scalar already sits at this key; the dotted form wins.
                let mut inner = ConfigMap::new();
                insert_nested(&mut inner, rest, value);
                *entry = ConfigValue::Map(inner);
            }
        }
        None => {
            map.insert(key.to_string(), value);
        }
    }
}

/// Convert a flat or partially-nested configuration to nested form
///
/// Dotted keys with a recognized group prefix (`train.epochs`) move under
/// that group's sub-mapping; already-nested groups are merged in place.
/// Unrecognized keys pass through unchanged. Total over well-formed maps
/// and idempotent.
pub fn to_nested(config: &ConfigMap) -> ConfigMap {
    let mut out = ConfigMap::new();
    for (key, value) in config {
        if let Some((head, rest)) = key.split_once('.') {
            if is_group(head) {
                let entry = out
                    .entry(head.to_string())
                    .or_insert_with(|| ConfigValue::Map(ConfigMap::new()));
                if let ConfigValue::Map(inner) = entry {
                    insert_nested(inner, rest, value.clone());
                    continue;
                }
            }
            // Unrecognized prefix: top-level literal key
            out.insert(key.clone(), value.clone());
        } else if is_group(key) {
            if let ConfigValue::Map(group) = value {
                // Already nested; merge so flat siblings are not clobbered
                let entry = out
                    .entry(key.clone())
                    .or_insert_with(|| ConfigValue::Map(ConfigMap::new()));
                if let ConfigValue::Map(existing) = entry {
                    for (k, v) in group {
                        insert_nested(existing, k, v.clone());
                    }
                }
            } else {
                // `estimator` may be a plain scalar choice
                out.insert(key.clone(), value.clone());
            }
        } else {
            out.insert(key.clone(), value.clone());
        }
    }
    out
}

fn flatten_into(out: &mut ConfigMap, prefix: &str, map: &ConfigMap) {
    for (key, value) in map {
        let flat_key = format!("{}.{}", prefix, key);
        match value {
            ConfigValue::Map(inner) => flatten_into(out, &flat_key, inner),
            other => {
                out.insert(flat_key, other.clone());
            }
        }
    }
}

/// Convert a nested configuration back to flat dotted-key form
///
/// Inverse of [`to_nested`] on recognized group keys: group sub-mappings
/// become dotted keys, everything else passes through.
pub fn to_flat(config: &ConfigMap) -> ConfigMap {
    let mut out = ConfigMap::new();
    for (key, value) in config {
        match value {
            ConfigValue::Map(inner) if is_group(key) => flatten_into(&mut out, key, inner),
            other => {
                out.insert(key.clone(), other.clone());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_flat() -> ConfigMap {
        let mut c = ConfigMap::new();
        c.insert("dataset".into(), "voc_tiny".into());
        c.insert("train.epochs".into(), ConfigValue::Int(5));
        c.insert("train.seed".into(), ConfigValue::Int(233));
        c.insert("ssd.lr".into(), ConfigValue::Float(1e-3));
        c.insert("num_workers".into(), ConfigValue::Int(4));
        c
    }

    #[test]
    fn test_to_nested_groups_keys() {
        let nested = to_nested(&sample_flat());
        let train = nested["train"].as_map().unwrap();
        assert_eq!(train["epochs"].as_i64(), Some(5));
        assert_eq!(train["seed"].as_i64(), Some(233));
        assert_eq!(nested["num_workers"].as_i64(), Some(4));
        assert!(!nested.contains_key("train.epochs"));
    }

    #[test]
    fn test_round_trip_flat() {
        let flat = sample_flat();
        assert_eq!(to_flat(&to_nested(&flat)), flat);
    }

    #[test]
    fn test_idempotent_nested() {
        let nested = to_nested(&sample_flat());
        assert_eq!(to_nested(&nested), nested);
    }

    #[test]
    fn test_unknown_prefix_passes_through() {
        let mut flat = ConfigMap::new();
        flat.insert("custom.key".into(), ConfigValue::Int(1));
        let nested = to_nested(&flat);
        assert_eq!(nested["custom.key"].as_i64(), Some(1));
        assert_eq!(to_flat(&nested), flat);
    }

    #[test]
    fn test_partially_nested_input_merges() {
        let mut c = ConfigMap::new();
        let mut train = ConfigMap::new();
        train.insert("epochs".into(), ConfigValue::Int(3));
        c.insert("train".into(), ConfigValue::Map(train));
        c.insert("train.seed".into(), ConfigValue::Int(7));

        let nested = to_nested(&c);
        let train = nested["train"].as_map().unwrap();
        assert_eq!(train["epochs"].as_i64(), Some(3));
        assert_eq!(train["seed"].as_i64(), Some(7));
    }

    #[test]
    fn test_estimator_scalar_stays_top_level() {
        let mut c = ConfigMap::new();
        c.insert("estimator".into(), "ssd".into());
        let nested = to_nested(&c);
        assert_eq!(nested["estimator"].as_str(), Some("ssd"));
    }
}
