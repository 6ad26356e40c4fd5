//! SQLite persistence for scenario datasets and the model registry.
//!
//! RULE: Only store.rs talks to the database.
//! Model weights never go into SQLite; the registry records where
//! each artifact file lives.

use crate::{
    dataset::{CustomerSegment, ScenarioDataset, ScenarioRecord},
    ensemble::QuantileEnsemble,
    error::{PromoError, PromoResult},
    lifecycle::ModelStatus,
};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetInfo {
    pub dataset_version: String,
    pub seed: u64,
    pub simulator_version: String,
    pub n_samples: usize,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRegistryEntry {
    pub model_id: String,
    pub client_id: String,
    pub simulator_version: String,
    pub data_version: Option<String>,
    pub status: ModelStatus,
    pub artifact_path: String,
    pub trained_at: String,
    pub registered_at: String,
}

pub struct ScenarioStore {
    conn: Connection,
}

impl ScenarioStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &str) -> PromoResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode: readers never block the training runner.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> PromoResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> PromoResult<()> {
        self.conn.execute_batch(include_str!("../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    // ── Datasets ───────────────────────────────────────────────

    /// Store a dataset and all of its rows in one transaction.
    pub fn insert_dataset(
        &self,
        dataset_version: &str,
        seed: u64,
        simulator_version: &str,
        dataset: &ScenarioDataset,
    ) -> PromoResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO dataset (dataset_version, seed, simulator_version, n_samples, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                dataset_version,
                seed as i64,
                simulator_version,
                dataset.len() as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO scenario (
                    dataset_version, row_idx, discount_percent, sales_velocity, return_rate,
                    inventory_level, price, support_tickets, duration_days, competitor_activity,
                    customer_segment, margin_before, actual_profit_loss)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for (i, r) in dataset.records.iter().enumerate() {
                stmt.execute(params![
                    dataset_version,
                    i as i64,
                    r.discount_percent,
                    r.sales_velocity,
                    r.return_rate,
                    r.inventory_level,
                    r.price,
                    r.support_tickets,
                    r.duration_days as i64,
                    r.competitor_activity as i64,
                    r.customer_segment.as_str(),
                    r.margin_before,
                    r.actual_profit_loss,
                ])?;
            }
        }
        tx.commit()?;
        log::info!(
            "store: inserted dataset {dataset_version} ({} rows, seed={seed})",
            dataset.len()
        );
        Ok(())
    }

    pub fn dataset_info(&self, dataset_version: &str) -> PromoResult<Option<DatasetInfo>> {
        let info = self
            .conn
            .query_row(
                "SELECT dataset_version, seed, simulator_version, n_samples, created_at
                 FROM dataset WHERE dataset_version = ?1",
                params![dataset_version],
                |row| {
                    Ok(DatasetInfo {
                        dataset_version: row.get(0)?,
                        seed: row.get::<_, i64>(1)? as u64,
                        simulator_version: row.get(2)?,
                        n_samples: row.get::<_, i64>(3)? as usize,
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(info)
    }

    /// Rows of a stored dataset in their original order.
    pub fn load_dataset(&self, dataset_version: &str) -> PromoResult<Option<ScenarioDataset>> {
        if self.dataset_info(dataset_version)?.is_none() {
            return Ok(None);
        }
        let mut stmt = self.conn.prepare(
            "SELECT discount_percent, sales_velocity, return_rate, inventory_level, price,
                    support_tickets, duration_days, competitor_activity, customer_segment,
                    margin_before, actual_profit_loss
             FROM scenario WHERE dataset_version = ?1
             ORDER BY row_idx ASC",
        )?;
        let rows = stmt
            .query_map(params![dataset_version], |row| {
                Ok((
                    ScenarioRecord {
                        discount_percent: row.get(0)?,
                        sales_velocity: row.get(1)?,
                        return_rate: row.get(2)?,
                        inventory_level: row.get(3)?,
                        price: row.get(4)?,
                        support_tickets: row.get(5)?,
                        duration_days: row.get::<_, i64>(6)? as u32,
                        competitor_activity: row.get::<_, i64>(7)? as u32,
                        // placeholder, replaced below once the label is checked
                        customer_segment: CustomerSegment::Value,
                        margin_before: row.get(9)?,
                        actual_profit_loss: row.get(10)?,
                    },
                    row.get::<_, String>(8)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for (mut record, segment) in rows {
            record.customer_segment = CustomerSegment::parse(&segment).ok_or_else(|| {
                PromoError::invalid_input(format!("unknown customer_segment '{segment}'"))
            })?;
            records.push(record);
        }
        Ok(Some(ScenarioDataset::new(records)))
    }

    pub fn dataset_versions(&self) -> PromoResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT dataset_version FROM dataset ORDER BY dataset_version ASC")?;
        let versions = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(versions)
    }

    // ── Model registry ─────────────────────────────────────────

    /// Record a fitted ensemble and the path of its saved artifact.
    pub fn register_model(&self, ensemble: &QuantileEnsemble, artifact_path: &str) -> PromoResult<()> {
        let metadata = ensemble.training_metadata().ok_or(PromoError::NotFitted)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO model_registry
                (model_id, client_id, simulator_version, data_version, status,
                 artifact_path, trained_at, registered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                ensemble.model_id(),
                ensemble.client_id(),
                ensemble.simulator_version(),
                metadata.data_version,
                ensemble.status().as_str(),
                artifact_path,
                metadata.trained_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        log::debug!(
            "store: registered model {} for client {}",
            ensemble.model_id(),
            ensemble.client_id()
        );
        Ok(())
    }

    pub fn update_model_status(&self, model_id: &str, status: ModelStatus) -> PromoResult<()> {
        let updated = self.conn.execute(
            "UPDATE model_registry SET status = ?1 WHERE model_id = ?2",
            params![status.as_str(), model_id],
        )?;
        if updated == 0 {
            log::warn!("store: model {model_id} not found in registry");
            return Err(PromoError::invalid_input(format!("unknown model_id '{model_id}'")));
        }
        Ok(())
    }

    pub fn models_for_client(&self, client_id: &str) -> PromoResult<Vec<ModelRegistryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT model_id, client_id, simulator_version, data_version, status,
                    artifact_path, trained_at, registered_at
             FROM model_registry WHERE client_id = ?1
             ORDER BY registered_at ASC, model_id ASC",
        )?;
        let rows = stmt
            .query_map(params![client_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(model_id, client_id, simulator_version, data_version, status, artifact_path, trained_at, registered_at)| {
                    let status = ModelStatus::parse(&status).ok_or_else(|| {
                        PromoError::invalid_input(format!("unknown model status '{status}'"))
                    })?;
                    Ok(ModelRegistryEntry {
                        model_id,
                        client_id,
                        simulator_version,
                        data_version,
                        status,
                        artifact_path,
                        trained_at,
                        registered_at,
                    })
                },
            )
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::SimulatorConfig, scenario::ScenarioGenerator};

    fn store() -> ScenarioStore {
        let store = ScenarioStore::in_memory().expect("in-memory store");
        store.migrate().expect("migration");
        store
    }

    #[test]
    fn dataset_round_trips_exactly() {
        let store = store();
        let generator = ScenarioGenerator::new(SimulatorConfig::default()).unwrap();
        let dataset = generator.generate(250, 42).unwrap();
        store.insert_dataset("sim_v1_250", 42, "v1", &dataset).unwrap();

        let loaded = store.load_dataset("sim_v1_250").unwrap().expect("dataset present");
        assert_eq!(loaded, dataset);

        let info = store.dataset_info("sim_v1_250").unwrap().unwrap();
        assert_eq!(info.seed, 42);
        assert_eq!(info.n_samples, 250);
    }

    #[test]
    fn missing_dataset_is_none() {
        assert!(store().load_dataset("nope").unwrap().is_none());
    }

    #[test]
    fn duplicate_dataset_version_rejected() {
        let store = store();
        let generator = ScenarioGenerator::new(SimulatorConfig::default()).unwrap();
        let dataset = generator.generate(5, 1).unwrap();
        store.insert_dataset("dup", 1, "v1", &dataset).unwrap();
        assert!(matches!(
            store.insert_dataset("dup", 1, "v1", &dataset),
            Err(PromoError::Database(_))
        ));
        assert_eq!(store.dataset_versions().unwrap(), vec!["dup".to_string()]);
    }

    #[test]
    fn unknown_model_status_update_fails() {
        assert!(store().update_model_status("missing", ModelStatus::Retired).is_err());
    }
}
