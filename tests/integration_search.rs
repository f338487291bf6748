//! Integration tests for the full search pipeline
//!
//! Covers the end-to-end path: loose configuration mapping in, scheduler
//! run, best-model reconstruction, persistence, and the documented
//! degradation behaviors (resource clamping, hyperband overrides,
//! exhausted searches, load-type guards).

use anyhow::Result;
use detsearch::config::{ConfigMap, ConfigValue, TaskConfig};
use detsearch::estimator::EstimatorKind;
use detsearch::resource::ResourceBudgeter;
use detsearch::task::DetectionTask;
use detsearch::TaskError;
use tempfile::tempdir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("detsearch=info")
        .try_init();
}

fn scenario_config(checkpoint: &str) -> ConfigMap {
    let mut map = ConfigMap::new();
    map.insert("dataset".into(), "voc_tiny".into());
    map.insert("estimator".into(), "ssd".into());
    map.insert("train.epochs".into(), ConfigValue::Int(1));
    map.insert("gpus".into(), ConfigValue::List(vec![ConfigValue::Int(0)]));
    map.insert("num_workers".into(), ConfigValue::Int(1));
    map.insert("num_trials".into(), ConfigValue::Int(1));
    map.insert("search_strategy".into(), "random".into());
    map.insert("checkpoint".into(), checkpoint.into());
    map
}

#[test]
fn test_fit_returns_trained_ssd() -> Result<()> {
    init_tracing();
    let dir = tempdir()?;
    let checkpoint = dir.path().join("exp1.ag");
    let map = scenario_config(checkpoint.to_str().unwrap());

    let config = TaskConfig::from_map(&map)?;
    let task = DetectionTask::with_budgeter(config, ResourceBudgeter::new(2, 1))?;
    let model = task.fit()?;

    assert_eq!(model.kind(), EstimatorKind::Ssd);
    assert!(!model.params().is_empty());
    assert!(checkpoint.exists(), "scheduler state should be checkpointed");
    Ok(())
}

#[test]
fn test_gpu_over_request_is_clamped() -> Result<()> {
    init_tracing();
    // Eight GPUs requested on a two-GPU machine: degrade, don't fail.
    let config = TaskConfig::new("voc_tiny")
        .estimator(EstimatorKind::Ssd)
        .gpus((0..8).collect());
    let task = DetectionTask::with_budgeter(config, ResourceBudgeter::new(4, 2))?;

    assert_eq!(task.scheduler_options().resource.num_gpus, 2);
    Ok(())
}

#[test]
fn test_hyperband_defaults_without_epochs() -> Result<()> {
    let config = TaskConfig::new("voc_tiny")
        .estimator(EstimatorKind::Yolo)
        .search_strategy("hyperband");
    let task = DetectionTask::with_budgeter(config, ResourceBudgeter::new(2, 0))?;

    let options = task.scheduler_options();
    assert_eq!(options.searcher, "random");
    assert_eq!(options.max_t, Some(50));
    assert_eq!(options.grace_period, Some(12));
    Ok(())
}

#[test]
fn test_load_guards_against_foreign_models() -> Result<()> {
    let dir = tempdir()?;

    // A valid detector round-trips with its exact architecture.
    let checkpoint = dir.path().join("exp1.ag");
    let config = TaskConfig::new("voc_tiny")
        .estimator(EstimatorKind::Ssd)
        .epochs(1)
        .num_trials(1)
        .checkpoint(checkpoint.to_str().unwrap());
    let task = DetectionTask::with_budgeter(config, ResourceBudgeter::new(1, 0))?;
    let model = task.fit()?;

    let model_path = dir.path().join("best.json");
    model.save(&model_path)?;
    let loaded = DetectionTask::load(&model_path)?;
    assert_eq!(loaded.kind(), EstimatorKind::Ssd);

    // A classification model saved under the same mechanism is refused.
    let foreign_path = dir.path().join("classifier.json");
    std::fs::write(
        &foreign_path,
        r#"{"kind": "image_classifier", "config": {}, "params": {"layers": {}}}"#,
    )?;
    let err = DetectionTask::load(&foreign_path).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TaskError>(),
        Some(TaskError::TypeMismatch(_))
    ));
    Ok(())
}

#[test]
fn test_exhausted_search_is_a_distinct_error() -> Result<()> {
    let dir = tempdir()?;
    let checkpoint = dir.path().join("exp1.ag");

    let mut config = TaskConfig::new("voc_tiny")
        .estimator(EstimatorKind::Ssd)
        .epochs(1)
        .num_trials(2)
        .checkpoint(checkpoint.to_str().unwrap());
    // Every trial fails hyperparameter validation.
    config
        .extra
        .insert("ssd.lr".into(), ConfigValue::Float(-1.0));

    let task = DetectionTask::with_budgeter(config, ResourceBudgeter::new(2, 0))?;
    let err = task.fit().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TaskError>(),
        Some(TaskError::SearchExhausted)
    ));
    Ok(())
}

#[test]
fn test_multi_estimator_search_picks_a_known_variant() -> Result<()> {
    let dir = tempdir()?;
    let checkpoint = dir.path().join("exp1.ag");

    let config = TaskConfig::new("voc_tiny")
        .estimators(vec![
            EstimatorKind::Ssd,
            EstimatorKind::Yolo,
            EstimatorKind::CenterNet,
        ])
        .epochs(1)
        .num_trials(3)
        .checkpoint(checkpoint.to_str().unwrap());

    let task = DetectionTask::with_budgeter(config, ResourceBudgeter::new(2, 0))?;
    let model = task.fit()?;
    assert!(EstimatorKind::ALL.contains(&model.kind()));
    assert!(!model.params().is_empty());
    Ok(())
}
