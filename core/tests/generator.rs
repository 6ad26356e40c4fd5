//! Scenario generator tests: clip ranges, discrete sets, formula caps.

use promo_core::{
    dataset::{CustomerSegment, FEATURE_COLUMNS},
    scenario::ScenarioGenerator,
    types::TARGET_COLUMN,
    ScenarioDataset, SimulatorConfig,
};

fn generate(n: usize, seed: u64) -> ScenarioDataset {
    ScenarioGenerator::new(SimulatorConfig::default())
        .unwrap()
        .generate(n, seed)
        .unwrap()
}

fn within(value: f64, min: f64, max: f64) -> bool {
    value >= min && value <= max
}

#[test]
fn every_clipped_field_stays_in_range() {
    let data = generate(4000, 42);
    for (i, r) in data.records.iter().enumerate() {
        assert!(within(r.discount_percent, 5.0, 70.0), "row {i} discount {}", r.discount_percent);
        assert!(within(r.sales_velocity, 1.0, 200.0), "row {i} velocity {}", r.sales_velocity);
        assert!(within(r.return_rate, 0.01, 0.5), "row {i} returns {}", r.return_rate);
        assert!(within(r.inventory_level, 10.0, 10_000.0), "row {i} inventory {}", r.inventory_level);
        assert!(within(r.price, 500.0, 100_000.0), "row {i} price {}", r.price);
        assert!(within(r.support_tickets, 0.01, 0.3), "row {i} support {}", r.support_tickets);
        assert!(r.margin_before >= 20.0 && r.margin_before < 60.0, "row {i} margin {}", r.margin_before);
        assert!(r.actual_profit_loss.is_finite(), "row {i} outcome not finite");
    }
}

#[test]
fn clipping_is_actually_exercised() {
    // N(25000, 18000) puts ~9% of draws below 500; some rows must sit on the bound.
    let data = generate(4000, 42);
    assert!(data.records.iter().any(|r| r.price == 500.0));
    assert!(data.records.iter().any(|r| r.inventory_level == 10.0));
}

#[test]
fn discrete_fields_come_from_fixed_sets() {
    let data = generate(3000, 3);
    let durations = [1u32, 3, 7, 14, 21, 30];
    for r in &data.records {
        assert!(durations.contains(&r.duration_days), "duration {}", r.duration_days);
        assert!(r.competitor_activity <= 10, "competitor {}", r.competitor_activity);
    }
    for d in durations {
        assert!(data.records.iter().any(|r| r.duration_days == d), "duration {d} never drawn");
    }
    assert!(data.records.iter().any(|r| r.competitor_activity == 0));
    assert!(data.records.iter().any(|r| r.competitor_activity == 10));
}

#[test]
fn segment_frequencies_match_probabilities() {
    let data = generate(10_000, 11);
    let share = |seg: CustomerSegment| {
        data.records.iter().filter(|r| r.customer_segment == seg).count() as f64 / 10_000.0
    };
    assert!((share(CustomerSegment::Premium) - 0.3).abs() < 0.02);
    assert!((share(CustomerSegment::Value) - 0.5).abs() < 0.02);
    assert!((share(CustomerSegment::Bargain) - 0.2).abs() < 0.02);
}

#[test]
fn units_sold_never_exceed_inventory_allowance() {
    let generator = ScenarioGenerator::new(SimulatorConfig::default()).unwrap();
    let rows = generator.generate_detailed(4000, 42).unwrap();
    let mut capped = 0;
    for s in &rows {
        let cap = s.record.inventory_level * 1.2;
        assert!(s.breakdown.units_sold <= cap, "sold {} > cap {cap}", s.breakdown.units_sold);
        if s.breakdown.units_sold == cap {
            capped += 1;
        }
    }
    assert!(capped > 0, "inventory cap never binds; check the demand formula");
}

#[test]
fn velocity_rises_with_discount() {
    let data = generate(6000, 21);
    let mean_velocity = |lo: f64, hi: f64| {
        let v: Vec<f64> = data
            .records
            .iter()
            .filter(|r| r.discount_percent >= lo && r.discount_percent < hi)
            .map(|r| r.sales_velocity)
            .collect();
        v.iter().sum::<f64>() / v.len() as f64
    };
    assert!(mean_velocity(40.0, 70.1) > mean_velocity(5.0, 20.0));
}

#[test]
fn outcome_can_be_a_loss() {
    let data = generate(4000, 42);
    assert!(data.records.iter().any(|r| r.actual_profit_loss < 0.0));
    assert!(data.records.iter().any(|r| r.actual_profit_loss > 0.0));
}

#[test]
fn training_frame_follows_table_schema() {
    let data = generate(20, 5);
    let (frame, target) = data.to_training_frame().unwrap();
    assert_eq!(frame.n_rows(), 20);
    assert_eq!(target.len(), 20);
    let names: Vec<&str> = frame.column_names().iter().map(String::as_str).collect();
    assert_eq!(names, FEATURE_COLUMNS.to_vec());
    assert_eq!(ScenarioDataset::column_names().last().map(String::as_str), Some(TARGET_COLUMN));
    let segments = frame.column("customer_segment").unwrap();
    assert!(segments.iter().all(|c| [0.0, 1.0, 2.0].contains(c)));
}

fn detailed(n: usize, seed: u64) -> Vec<promo_core::scenario::SimulatedScenario> {
    ScenarioGenerator::new(SimulatorConfig::default())
        .unwrap()
        .generate_detailed(n, seed)
        .unwrap()
}

fn sample_std(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
}

#[test]
fn penalties_follow_discount_duration_and_competition() {
    for (i, s) in detailed(2000, 21).iter().enumerate() {
        let r = &s.record;
        let b = &s.breakdown;
        let habituation = (r.discount_percent / 100.0).powf(1.4)
            * b.gross_revenue
            * 0.05
            * (r.duration_days as f64 / 30.0);
        let competition = (r.competitor_activity as f64 / 10.0) * b.gross_revenue * 0.06;
        let tol = |x: f64| 1e-9 * x.abs().max(1.0);
        assert!(
            (b.habituation_penalty - habituation).abs() <= tol(habituation),
            "row {i}: habituation {} vs {habituation}",
            b.habituation_penalty
        );
        assert!(
            (b.competition_penalty - competition).abs() <= tol(competition),
            "row {i}: competition {} vs {competition}",
            b.competition_penalty
        );
    }
}

#[test]
fn market_noise_widens_with_discount_and_competition() {
    let rows = detailed(20_000, 77);
    let hot: Vec<f64> = rows
        .iter()
        .filter(|s| s.record.discount_percent > 50.0 && s.record.competitor_activity >= 8)
        .map(|s| s.breakdown.market_noise)
        .collect();
    let calm: Vec<f64> = rows
        .iter()
        .filter(|s| s.record.discount_percent < 15.0 && s.record.competitor_activity <= 2)
        .map(|s| s.breakdown.market_noise)
        .collect();
    assert!(hot.len() > 100 && calm.len() > 100, "hot={} calm={}", hot.len(), calm.len());
    // scale >= 21400 on the hot side, <= 12400 on the calm side
    let (hot_std, calm_std) = (sample_std(&hot), sample_std(&calm));
    assert!(hot_std > 1.3 * calm_std, "hot std {hot_std:.0} vs calm std {calm_std:.0}");
}

#[test]
fn execution_noise_widens_with_discount() {
    let rows = detailed(20_000, 78);
    let deep: Vec<f64> = rows
        .iter()
        .filter(|s| s.record.discount_percent > 50.0)
        .map(|s| s.breakdown.execution_noise)
        .collect();
    let shallow: Vec<f64> = rows
        .iter()
        .filter(|s| s.record.discount_percent < 15.0)
        .map(|s| s.breakdown.execution_noise)
        .collect();
    assert!(deep.len() > 300 && shallow.len() > 300, "deep={} shallow={}", deep.len(), shallow.len());
    // scale >= 16000 for deep discounts, <= 13200 for shallow ones
    let (deep_std, shallow_std) = (sample_std(&deep), sample_std(&shallow));
    assert!(deep_std > 1.1 * shallow_std, "deep std {deep_std:.0} vs shallow std {shallow_std:.0}");
}
