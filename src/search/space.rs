//! Search space assembly
//!
//! A [`SearchSpace`] is a plain value object: a fixed base configuration
//! (resources, seed, dataset, the `final_fit` marker) plus the parameters
//! the scheduler is free to sample, always including the categorical
//! estimator choice. There is no hidden registration step; the space is
//! handed to the scheduler explicitly.

use rand::rngs::StdRng;
use rand::Rng;

use crate::config::{ConfigMap, ConfigValue, TaskConfig};
use crate::error::TaskError;
use crate::estimator::EstimatorKind;
use crate::resource::ResourceBudget;

/// A sampleable entry in the search space
#[derive(Debug, Clone)]
pub enum Parameter {
    /// Choice among explicit values
    Categorical {
        /// Flat configuration key
        name: String,
        /// Allowed values
        values: Vec<ConfigValue>,
    },
    /// Continuous range with optional log-scale sampling
    Continuous {
        /// Flat configuration key
        name: String,
        /// Lower bound (inclusive)
        min: f64,
        /// Upper bound (exclusive)
        max: f64,
        /// Sample uniformly in log space
        log_scale: bool,
    },
    /// Integer choice among explicit values
    Discrete {
        /// Flat configuration key
        name: String,
        /// Allowed values
        values: Vec<i64>,
    },
}

impl Parameter {
    /// Flat configuration key this parameter fills
    pub fn name(&self) -> &str {
        match self {
            Parameter::Categorical { name, .. }
            | Parameter::Continuous { name, .. }
            | Parameter::Discrete { name, .. } => name,
        }
    }

    /// Sample one concrete value
    pub fn sample(&self, rng: &mut StdRng) -> ConfigValue {
        match self {
            Parameter::Categorical { values, .. } => {
                values[rng.gen_range(0..values.len())].clone()
            }
            Parameter::Continuous {
                min,
                max,
                log_scale,
                ..
            } => {
                let value = if *log_scale {
                    let (log_min, log_max) = (min.ln(), max.ln());
                    (rng.gen_range(0.0..1.0) * (log_max - log_min) + log_min).exp()
                } else {
                    rng.gen_range(*min..*max)
                };
                ConfigValue::Float(value)
            }
            Parameter::Discrete { values, .. } => {
                ConfigValue::Int(values[rng.gen_range(0..values.len())])
            }
        }
    }

    /// Check that this parameter can be sampled
    ///
    /// Empty value lists, inverted or non-finite continuous bounds, and
    /// log-scale ranges that reach zero are all rejected here so a bad
    /// parameter never reaches a scheduler worker.
    pub fn validate(&self) -> Result<(), TaskError> {
        match self {
            Parameter::Categorical { name, values } => {
                if values.is_empty() {
                    return Err(TaskError::InvalidConfig(format!(
                        "`{name}` has no candidate values"
                    )));
                }
            }
            Parameter::Continuous {
                name,
                min,
                max,
                log_scale,
            } => {
                if !min.is_finite() || !max.is_finite() || min >= max {
                    return Err(TaskError::InvalidConfig(format!(
                        "`{name}` range [{min}, {max}) is empty or unbounded"
                    )));
                }
                if *log_scale && *min <= 0.0 {
                    return Err(TaskError::InvalidConfig(format!(
                        "`{name}` log-scale range requires a positive lower bound, got {min}"
                    )));
                }
            }
            Parameter::Discrete { name, values } => {
                if values.is_empty() {
                    return Err(TaskError::InvalidConfig(format!(
                        "`{name}` has no candidate values"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Deterministic fallback used when resolving a partially-sampled
    /// configuration
    pub fn default_value(&self) -> ConfigValue {
        match self {
            Parameter::Categorical { values, .. } => values[0].clone(),
            Parameter::Continuous { min, max, .. } => ConfigValue::Float((min + max) / 2.0),
            Parameter::Discrete { values, .. } => ConfigValue::Int(values[0]),
        }
    }
}

/// The registered search space for one task
#[derive(Debug, Clone)]
pub struct SearchSpace {
    base: ConfigMap,
    parameters: Vec<Parameter>,
}

impl SearchSpace {
    /// The fixed (non-sampled) part of every trial configuration
    pub fn base(&self) -> &ConfigMap {
        &self.base
    }

    /// The sampleable parameters, estimator choice included
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Number of sampleable parameters
    pub fn dim(&self) -> usize {
        self.parameters.len()
    }

    /// Draw one complete flat trial configuration
    pub fn sample(&self, rng: &mut StdRng) -> ConfigMap {
        let mut config = self.base.clone();
        for parameter in &self.parameters {
            config.insert(parameter.name().to_string(), parameter.sample(rng));
        }
        config
    }

    /// Resolve a possibly partially-sampled configuration to a complete one
    ///
    /// Recorded values win; anything the scheduler never sampled falls back
    /// to the parameter's deterministic default, on top of the base.
    pub fn resolve(&self, partial: &ConfigMap) -> ConfigMap {
        let mut config = self.base.clone();
        for parameter in &self.parameters {
            config.insert(
                parameter.name().to_string(),
                parameter.default_value(),
            );
        }
        for (key, value) in partial {
            config.insert(key.clone(), value.clone());
        }
        config
    }
}

/// Heuristic estimator suggestion from dataset statistics
///
/// Stands in for an external dataset-profiling service: the signature is
/// the contract, the default implementation is a name-based heuristic.
pub type SuggestFn = fn(&TaskConfig) -> Vec<EstimatorKind>;

/// Default suggestion: small datasets skip the heavy two-stage detector
pub fn default_suggest(config: &TaskConfig) -> Vec<EstimatorKind> {
    if config.dataset.contains("tiny") || config.dataset.contains("mini") {
        vec![
            EstimatorKind::Ssd,
            EstimatorKind::Yolo,
            EstimatorKind::CenterNet,
        ]
    } else {
        EstimatorKind::ALL.to_vec()
    }
}

/// Builds a [`SearchSpace`] from the task configuration and the clamped
/// resource budget
#[derive(Debug)]
pub struct SearchSpaceBuilder {
    config: TaskConfig,
    budget: ResourceBudget,
    suggest: SuggestFn,
    parameters: Vec<Parameter>,
}

impl SearchSpaceBuilder {
    /// Start from a validated task configuration and resource budget
    pub fn new(config: TaskConfig, budget: ResourceBudget) -> Self {
        Self {
            config,
            budget,
            suggest: default_suggest,
            parameters: Vec::new(),
        }
    }

    /// Replace the auto-suggestion heuristic
    pub fn suggest_with(mut self, suggest: SuggestFn) -> Self {
        self.suggest = suggest;
        self
    }

    /// Add a user-defined sampleable hyperparameter
    pub fn add_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Assemble the search space
    ///
    /// Explicit estimator candidates are used verbatim; otherwise the
    /// suggestion heuristic picks them. The estimator choice is always
    /// registered as a categorical parameter, even for a single candidate.
    pub fn build(self) -> Result<SearchSpace, TaskError> {
        // Zero-epoch trials would finish without ever reporting a reward.
        if self.config.epochs == Some(0) {
            return Err(TaskError::InvalidConfig(
                "`train.epochs` must be at least 1".into(),
            ));
        }

        let candidates = match (&self.config.estimators, self.config.auto_suggest) {
            (Some(explicit), _) => {
                if explicit.is_empty() {
                    return Err(TaskError::InvalidConfig(
                        "estimator list must not be empty".into(),
                    ));
                }
                explicit.clone()
            }
            (None, true) => (self.suggest)(&self.config),
            (None, false) => EstimatorKind::ALL.to_vec(),
        };

        let mut base = ConfigMap::new();
        base.insert("dataset".into(), self.config.dataset.clone().into());
        base.insert(
            "num_workers".into(),
            ConfigValue::Int(self.budget.num_workers as i64),
        );
        base.insert(
            "gpus".into(),
            ConfigValue::List(
                self.budget
                    .gpus
                    .iter()
                    .map(|i| ConfigValue::Int(*i as i64))
                    .collect(),
            ),
        );
        base.insert("train.seed".into(), ConfigValue::Int(self.config.seed as i64));
        if let Some(epochs) = self.config.epochs {
            base.insert("train.epochs".into(), ConfigValue::Int(epochs as i64));
        }
        base.insert("final_fit".into(), ConfigValue::Bool(false));
        for (key, value) in &self.config.extra {
            base.insert(key.clone(), value.clone());
        }

        let mut parameters = vec![Parameter::Categorical {
            name: "estimator".into(),
            values: candidates
                .iter()
                .map(|kind| ConfigValue::from(kind.name()))
                .collect(),
        }];
        parameters.extend(self.parameters);
        for parameter in &parameters {
            parameter.validate()?;
        }

        Ok(SearchSpace { base, parameters })
    }
}
