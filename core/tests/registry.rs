//! Model registry tests: the SQLite side of a training run.

use promo_core::{
    lifecycle::ModelStatus, scenario::ScenarioGenerator, store::ScenarioStore, EnsembleConfig,
    PromoError, QuantileEnsemble, SimulatorConfig,
};

fn store() -> ScenarioStore {
    let store = ScenarioStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    store
}

fn fitted(client: &str) -> QuantileEnsemble {
    let data = ScenarioGenerator::new(SimulatorConfig::default())
        .unwrap()
        .generate(200, 4)
        .unwrap();
    let (features, target) = data.to_training_frame().unwrap();
    let mut model = QuantileEnsemble::new(client, "v1", EnsembleConfig::default_test()).unwrap();
    model.fit(&features, &target, Some("sim_v1_200"), "simulator").unwrap();
    model
}

#[test]
fn registered_models_are_scoped_by_client() {
    let store = store();
    let a = fitted("client_a");
    let b = fitted("client_b");
    store.register_model(&a, "models/a.json").unwrap();
    store.register_model(&b, "models/b.json").unwrap();

    let entries = store.models_for_client("client_a").unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].model_id, a.model_id());
    assert_eq!(entries[0].status, ModelStatus::Trained);
    assert_eq!(entries[0].data_version.as_deref(), Some("sim_v1_200"));
    assert_eq!(entries[0].artifact_path, "models/a.json");

    assert!(store.models_for_client("client_c").unwrap().is_empty());
}

#[test]
fn status_updates_follow_the_model() {
    let store = store();
    let mut model = fitted("client_a");
    store.register_model(&model, "models/a.json").unwrap();

    model.deploy().unwrap();
    store.update_model_status(model.model_id(), model.status()).unwrap();

    let entries = store.models_for_client("client_a").unwrap();
    assert_eq!(entries[0].status, ModelStatus::Deployed);
}

#[test]
fn unfitted_model_cannot_be_registered() {
    let model = QuantileEnsemble::new("client_a", "v1", EnsembleConfig::default_test()).unwrap();
    assert!(matches!(store().register_model(&model, "x.json"), Err(PromoError::NotFitted)));
}
