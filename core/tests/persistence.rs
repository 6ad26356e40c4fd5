//! Save/load round-trip tests for model artifacts.

use promo_core::{
    dataset::train_test_split, lifecycle::ModelStatus, scenario::ScenarioGenerator,
    EnsembleConfig, FeatureFrame, PromoError, QuantileEnsemble, SimulatorConfig,
};

fn fitted_with_holdout() -> (QuantileEnsemble, FeatureFrame) {
    let data = ScenarioGenerator::new(SimulatorConfig::default())
        .unwrap()
        .generate(800, 42)
        .unwrap();
    let (features, target) = data.to_training_frame().unwrap();
    let (train, test) = train_test_split(&features, &target, 0.2, 42).unwrap();
    let mut model = QuantileEnsemble::new("acme", "v1", EnsembleConfig::default_test()).unwrap();
    model
        .fit(&train.features, &train.target, Some("sim_v1_800"), "simulator")
        .unwrap();
    (model, test.features)
}

#[test]
fn save_then_load_preserves_everything() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storage/models/acme_v1.json");

    let (mut model, _holdout) = fitted_with_holdout();
    model.deploy().unwrap();
    model.save(&path).unwrap();

    let loaded = QuantileEnsemble::load(&path).unwrap();
    assert!(loaded.is_fitted());
    assert_eq!(loaded.model_id(), model.model_id());
    assert_eq!(loaded.client_id(), "acme");
    assert_eq!(loaded.simulator_version(), "v1");
    assert_eq!(loaded.feature_names().unwrap(), model.feature_names().unwrap());
    assert_eq!(loaded.quantiles(), model.quantiles());
    assert_eq!(loaded.status(), ModelStatus::Deployed);
    assert_eq!(loaded.deployed_at(), model.deployed_at());
    assert_eq!(loaded.retired_at(), None);
    assert_eq!(loaded.provenance(), model.provenance());
    assert_eq!(loaded.training_metadata(), model.training_metadata());
    assert_eq!(loaded.config(), model.config());
}

#[test]
fn loaded_model_predicts_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");

    let (model, holdout) = fitted_with_holdout();
    model.save(&path).unwrap();
    let loaded = QuantileEnsemble::load(&path).unwrap();

    let before = model.predict(&holdout).unwrap();
    let after = loaded.predict(&holdout).unwrap();
    assert_eq!(before.labels(), after.labels());
    for (a, b) in before.iter().zip(after.iter()) {
        for (x, y) in a.values.iter().zip(&b.values) {
            assert!((x - y).abs() <= 1e-9 * x.abs().max(1.0), "{}: {x} vs {y}", a.label);
        }
    }
}

#[test]
fn save_before_fit_is_not_fitted() {
    let dir = tempfile::tempdir().unwrap();
    let model = QuantileEnsemble::new("acme", "v1", EnsembleConfig::default_test()).unwrap();
    assert!(matches!(model.save(dir.path().join("m.json")), Err(PromoError::NotFitted)));
    assert!(!dir.path().join("m.json").exists());
}

#[test]
fn retired_status_and_timestamp_survive_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("retired.json");

    let (mut model, _) = fitted_with_holdout();
    model.retire();
    model.save(&path).unwrap();

    let loaded = QuantileEnsemble::load(&path).unwrap();
    assert_eq!(loaded.status(), ModelStatus::Retired);
    assert_eq!(loaded.retired_at(), model.retired_at());
}

#[test]
fn loading_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        QuantileEnsemble::load(dir.path().join("absent.json")),
        Err(PromoError::Io(_))
    ));
}

#[test]
fn loading_garbage_is_serialization_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.json");
    std::fs::write(&path, b"not json").unwrap();
    assert!(matches!(QuantileEnsemble::load(&path), Err(PromoError::Serialization(_))));
}

/// Rewrite the first occurrence of `"key":<number>` in a saved artifact.
fn tamper(path: &std::path::Path, key: &str, replacement: &str) {
    let text = std::fs::read_to_string(path).unwrap();
    let needle = format!("\"{key}\":");
    let start = text.find(&needle).expect("key present") + needle.len();
    let end = start + text[start..].find([',', '}']).expect("value end");
    let patched = format!("{}{replacement}{}", &text[..start], &text[end..]);
    std::fs::write(path, patched).unwrap();
}

#[test]
fn split_on_missing_feature_is_rejected_at_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tampered.json");
    let (model, _) = fitted_with_holdout();
    model.save(&path).unwrap();

    tamper(&path, "feature", "99");
    assert!(matches!(QuantileEnsemble::load(&path), Err(PromoError::InvalidInput(_))));
}

#[test]
fn cyclic_tree_is_rejected_at_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cyclic.json");
    let (model, _) = fitted_with_holdout();
    model.save(&path).unwrap();

    // the first split is the root of the first tree; point it at itself
    tamper(&path, "left", "0");
    assert!(matches!(QuantileEnsemble::load(&path), Err(PromoError::InvalidInput(_))));
}
