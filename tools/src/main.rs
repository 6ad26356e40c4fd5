//! train-runner: headless training pipeline for promotion P&L forecasts.
//!
//! Usage:
//!   train-runner --seed 42 --samples 4000 --client demo_client
//!   train-runner --seed 7 --samples 20000 --db promo.db --data-dir ./data

use anyhow::{Context, Result};
use promo_core::{
    dataset::train_test_split,
    ensemble::quantile_label,
    evaluation::{crossing_rate, interval_coverage, pinball_loss, r2_score},
    risk::{BandRiskInterpreter, RiskInterpreter},
    store::ScenarioStore,
    PromoConfig, QuantileEnsemble, QuantilePredictions, ScenarioGenerator,
};
use std::env;

const RISK_PREVIEW_ROWS: usize = 5;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let samples = parse_arg(&args, "--samples", 4000usize);
    let test_fraction = parse_arg(&args, "--test-fraction", 0.2f64);
    let client = str_arg(&args, "--client").unwrap_or("demo_client");
    let db = str_arg(&args, "--db").unwrap_or(":memory:");
    let data_dir = str_arg(&args, "--data-dir");

    let config = match data_dir {
        Some(dir) => PromoConfig::load(dir)?,
        None => PromoConfig::default(),
    };
    let simulator_version = str_arg(&args, "--simulator-version")
        .unwrap_or(&config.simulator.simulator_version)
        .to_string();
    let data_version = str_arg(&args, "--data-version")
        .map(String::from)
        .unwrap_or_else(|| format!("sim_{simulator_version}_{samples}_s{seed}"));
    let out = str_arg(&args, "--out")
        .map(String::from)
        .unwrap_or_else(|| format!("storage/models/{client}_{simulator_version}.json"));

    println!("Promo P&L: train-runner");
    println!("  seed:          {seed}");
    println!("  samples:       {samples}");
    println!("  client:        {client}");
    println!("  simulator:     {simulator_version}");
    println!("  data_version:  {data_version}");
    println!("  db:            {db}");
    println!("  data_dir:      {}", data_dir.unwrap_or("(built-in defaults)"));
    println!();

    let store = ScenarioStore::open(db)?;
    store.migrate()?;

    let generator = ScenarioGenerator::new(config.simulator.clone())?;
    let dataset = generator.generate(samples, seed)?;
    store
        .insert_dataset(&data_version, seed, &simulator_version, &dataset)
        .with_context(|| format!("storing dataset {data_version}"))?;

    let (features, target) = dataset.to_training_frame()?;
    let (train, test) = train_test_split(&features, &target, test_fraction, seed)?;
    log::info!(
        "split {} rows into train={} test={}",
        dataset.len(),
        train.target.len(),
        test.target.len()
    );

    let mut model = QuantileEnsemble::new(client, simulator_version.clone(), config.ensemble.clone())?;
    model.fit(&train.features, &train.target, Some(&data_version), "simulator")?;
    model.deploy()?;
    model.save(&out)?;
    store.register_model(&model, &out)?;

    let predictions = model.predict(&test.features)?;
    print_summary(&model, &predictions, &test.target, &out)?;
    Ok(())
}

fn print_summary(
    model: &QuantileEnsemble,
    predictions: &QuantilePredictions,
    actual: &[f64],
    artifact_path: &str,
) -> Result<()> {
    println!("=== MODEL ===");
    println!("  model_id:      {}", model.model_id());
    println!("  status:        {}", model.status());
    println!("  artifact:      {artifact_path}");
    if let Some(meta) = model.training_metadata() {
        println!("  trained on:    {} rows × {} features", meta.n_samples, meta.n_features);
        println!("  target mean:   ${:.0} (std ${:.0})", meta.target_mean, meta.target_std);
    }

    println!();
    println!("=== HOLD-OUT ({} rows) ===", actual.len());
    for series in predictions.iter() {
        println!(
            "  {:<6} pinball: {:>10.2}",
            series.label,
            pinball_loss(actual, &series.values, series.level)?
        );
    }

    let levels = model.quantiles();
    if let (Some(&low), Some(&high)) = (levels.first(), levels.last()) {
        let lower = predictions.get(&quantile_label(low)).unwrap_or_default();
        let upper = predictions.get(&quantile_label(high)).unwrap_or_default();
        if levels.len() > 1 {
            println!(
                "  coverage {}-{}: {:.1}%",
                quantile_label(low),
                quantile_label(high),
                100.0 * interval_coverage(actual, lower, upper)?
            );
            println!("  crossing rate: {:.2}%", 100.0 * crossing_rate(lower, upper)?);
        }
    }
    if let Some(median) = predictions.get("p50") {
        println!("  r² (p50):      {:.3}", r2_score(actual, median)?);
    }

    println!();
    println!("=== RISK PREVIEW ===");
    let interpreter = BandRiskInterpreter;
    for row in 0..predictions.n_rows().min(RISK_PREVIEW_ROWS) {
        let Some(band) = predictions.band(row) else {
            continue;
        };
        let risk = interpreter.classify_band(&band);
        println!(
            "  row {row}: [{:>9.0} | {:>9.0} | {:>9.0}] {:<8} spread ${:.0} loss ${:.0} (actual {:.0})",
            band.pessimistic,
            band.median,
            band.optimistic,
            risk.risk_level.as_str(),
            risk.spread,
            risk.potential_loss,
            actual[row]
        );
    }
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn str_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}
