//! Economic scenario generator: synthetic promotion P&L.
//!
//! Draws are column-wise: every row's discount first, then every
//! row's velocity, and so on. The draw order is part of the
//! reproducibility contract; appending a new driver must go after
//! the existing ones.
//!
//! Execution order of one generate() call:
//!   1. Drivers (clipped normals, uniform, log-normal, discrete picks)
//!   2. Elasticity noise, market noise, execution noise
//!   3. Profit formula, row by row, no further draws

use crate::{
    config::SimulatorConfig,
    dataset::{CustomerSegment, ScenarioDataset, ScenarioRecord},
    error::{PromoError, PromoResult},
    rng::{StreamRng, StreamSlot},
};
use serde::{Deserialize, Serialize};

/// Intermediate quantities of the profit formula for one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitBreakdown {
    pub elasticity: f64,
    pub units_sold: f64,
    pub discounted_price: f64,
    pub gross_revenue: f64,
    pub total_cost: f64,
    pub base_profit: f64,
    pub return_costs: f64,
    pub holding_costs: f64,
    pub support_costs: f64,
    pub hidden_cost_total: f64,
    pub net_profit: f64,
    pub habituation_penalty: f64,
    pub competition_penalty: f64,
    pub premium_bonus: f64,
    pub market_noise: f64,
    pub execution_noise: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedScenario {
    pub record: ScenarioRecord,
    pub breakdown: ProfitBreakdown,
}

/// Raw draws for one row before the formula runs.
struct Drivers {
    discount: f64,
    velocity: f64,
    return_rate: f64,
    inventory: f64,
    price: f64,
    support: f64,
    duration: u32,
    competitor: u32,
    segment: CustomerSegment,
    margin: f64,
    hidden_cost: f64,
    elasticity_noise: f64,
    market_noise: f64,
    execution_noise: f64,
}

pub struct ScenarioGenerator {
    config: SimulatorConfig,
}

impl ScenarioGenerator {
    pub fn new(config: SimulatorConfig) -> PromoResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn simulator_version(&self) -> &str {
        &self.config.simulator_version
    }

    /// Generate `n` scenario rows. Same (n, seed) → identical table.
    pub fn generate(&self, n: usize, seed: u64) -> PromoResult<ScenarioDataset> {
        let rows = self.generate_detailed(n, seed)?;
        Ok(ScenarioDataset::new(rows.into_iter().map(|s| s.record).collect()))
    }

    /// Generate `n` rows together with their profit breakdowns.
    pub fn generate_detailed(&self, n: usize, seed: u64) -> PromoResult<Vec<SimulatedScenario>> {
        if n == 0 {
            return Err(PromoError::invalid_input("n_samples must be a positive integer"));
        }
        let mut rng = StreamRng::for_slot(seed, StreamSlot::Generator);
        let drivers = self.draw_drivers(n, &mut rng);

        let scenarios: Vec<SimulatedScenario> =
            drivers.iter().map(|d| self.evaluate(d)).collect();

        let losses = scenarios.iter().filter(|s| s.record.actual_profit_loss < 0.0).count();
        log::info!(
            "generator {}: {n} scenarios seed={seed} loss_share={:.3}",
            self.config.simulator_version,
            losses as f64 / n as f64
        );
        Ok(scenarios)
    }

    fn draw_drivers(&self, n: usize, rng: &mut StreamRng) -> Vec<Drivers> {
        let cfg = &self.config;
        let eco = &cfg.economics;

        let discount: Vec<f64> = (0..n)
            .map(|_| {
                let d = &cfg.discount;
                rng.clipped_normal(d.mean, d.std_dev, d.min, d.max)
            })
            .collect();

        let velocity: Vec<f64> = discount
            .iter()
            .map(|&x| {
                let v = &cfg.velocity;
                rng.clipped_normal(v.base_mean + x * v.slope, v.std_dev, v.min, v.max)
            })
            .collect();

        let return_rate: Vec<f64> = discount
            .iter()
            .map(|&x| {
                let r = &cfg.return_rate;
                rng.clipped_normal(r.base_mean + x * r.slope, r.std_dev, r.min, r.max)
            })
            .collect();

        let inventory: Vec<f64> = (0..n)
            .map(|_| {
                let i = &cfg.inventory;
                rng.clipped_normal(i.mean, i.std_dev, i.min, i.max)
            })
            .collect();

        let price: Vec<f64> = (0..n)
            .map(|_| {
                let p = &cfg.price;
                rng.clipped_normal(p.mean, p.std_dev, p.min, p.max)
            })
            .collect();

        let support: Vec<f64> = return_rate
            .iter()
            .map(|&x| {
                let s = &cfg.support;
                rng.clipped_normal(s.base_mean + x * s.slope, s.std_dev, s.min, s.max)
            })
            .collect();

        let duration: Vec<u32> = (0..n)
            .map(|_| {
                let idx = rng.next_u64_below(cfg.duration_days.len() as u64) as usize;
                cfg.duration_days[idx]
            })
            .collect();

        let competitor: Vec<u32> = (0..n)
            .map(|_| rng.next_u64_below(cfg.competitor_max as u64 + 1) as u32)
            .collect();

        let weights: Vec<f64> = cfg.segments.iter().map(|s| s.probability).collect();
        let segment: Vec<CustomerSegment> = (0..n)
            .map(|_| cfg.segments[rng.pick_weighted(&weights)].segment)
            .collect();

        let margin: Vec<f64> = (0..n).map(|_| rng.uniform(cfg.margin_min, cfg.margin_max)).collect();

        let hidden_cost: Vec<f64> = (0..n)
            .map(|_| rng.lognormal(cfg.hidden_cost_log_mean, cfg.hidden_cost_log_sigma))
            .collect();

        let elasticity_noise: Vec<f64> =
            (0..n).map(|_| rng.normal(1.0, eco.elasticity_noise_std)).collect();

        let market_noise: Vec<f64> = (0..n)
            .map(|i| {
                let scale = eco.market_noise_base
                    + discount[i] * eco.market_noise_per_discount
                    + competitor[i] as f64 * eco.market_noise_per_competitor;
                rng.normal(0.0, scale)
            })
            .collect();

        let execution_noise: Vec<f64> = (0..n)
            .map(|i| {
                let scale =
                    eco.execution_noise_base + discount[i] * eco.execution_noise_per_discount;
                rng.normal(0.0, scale)
            })
            .collect();

        (0..n)
            .map(|i| Drivers {
                discount: discount[i],
                velocity: velocity[i],
                return_rate: return_rate[i],
                inventory: inventory[i],
                price: price[i],
                support: support[i],
                duration: duration[i],
                competitor: competitor[i],
                segment: segment[i],
                margin: margin[i],
                hidden_cost: hidden_cost[i],
                elasticity_noise: elasticity_noise[i],
                market_noise: market_noise[i],
                execution_noise: execution_noise[i],
            })
            .collect()
    }

    fn evaluate(&self, d: &Drivers) -> SimulatedScenario {
        let eco = &self.config.economics;
        let duration = d.duration as f64;

        // ── Demand ─────────────────────────────────────────────

        let elasticity_base =
            eco.elasticity_ceiling * (1.0 - (-d.discount / eco.elasticity_scale).exp());
        let elasticity = elasticity_base * d.elasticity_noise;
        let demand_multiplier = 1.0 + elasticity;

        let raw_demand = d.velocity * duration * demand_multiplier;
        let units_sold = raw_demand.min(d.inventory * eco.inventory_overflow);

        let discounted_price = d.price * (1.0 - d.discount / 100.0);
        let gross_revenue = discounted_price * units_sold;

        // ── Cost structure ─────────────────────────────────────

        let cost_per_unit = d.price * (1.0 - d.margin / 100.0);
        let total_cost = cost_per_unit * units_sold;
        let base_profit = gross_revenue - total_cost;

        let return_costs = discounted_price * units_sold * d.return_rate * eco.return_cost_factor;
        let holding_costs = d.inventory * eco.holding_cost_rate * duration;
        let support_costs = units_sold * d.support * eco.support_cost_per_ticket;
        let hidden_cost_total = d.hidden_cost * eco.hidden_cost_share;

        let net_profit =
            base_profit - return_costs - holding_costs - support_costs - hidden_cost_total;

        // ── Nonlinear adjustments ──────────────────────────────

        let habituation_penalty = (d.discount / 100.0).powf(eco.habituation_exponent)
            * gross_revenue
            * eco.habituation_rate
            * (duration / eco.reference_window_days);

        let competition_penalty =
            (d.competitor as f64 / eco.competitor_reference) * gross_revenue * eco.competition_rate;

        let premium_bonus = if d.segment == CustomerSegment::Premium
            && d.discount < eco.premium_discount_threshold
        {
            gross_revenue * eco.premium_bonus_rate
        } else {
            0.0
        };

        let actual_profit_loss = net_profit - habituation_penalty - competition_penalty
            + premium_bonus
            + d.market_noise
            + d.execution_noise;

        SimulatedScenario {
            record: ScenarioRecord {
                discount_percent: d.discount,
                sales_velocity: d.velocity,
                return_rate: d.return_rate,
                inventory_level: d.inventory,
                price: d.price,
                support_tickets: d.support,
                duration_days: d.duration,
                competitor_activity: d.competitor,
                customer_segment: d.segment,
                margin_before: d.margin,
                actual_profit_loss,
            },
            breakdown: ProfitBreakdown {
                elasticity,
                units_sold,
                discounted_price,
                gross_revenue,
                total_cost,
                base_profit,
                return_costs,
                holding_costs,
                support_costs,
                hidden_cost_total,
                net_profit,
                habituation_penalty,
                competition_penalty,
                premium_bonus,
                market_noise: d.market_noise,
                execution_noise: d.execution_noise,
            },
        }
    }
}
