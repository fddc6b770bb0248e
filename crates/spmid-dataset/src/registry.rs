//! Multi-Algorithm Registry (C8, §4.7): a named mapping
//! `algorithm_name -> AlgorithmDataset`, grounded on the original
//! `MultiAlgorithmManager` (thread-pool-backed, mutex-serialized map
//! mutation). `add_async` runs the CPU-bound analysis on a bounded
//! `tokio` worker pool (default 10, §5) and only serializes the brief
//! map insertion at the end.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use spmid_format::Track;
use tokio::sync::Semaphore;

use crate::dataset::{generate_algorithm_name, AlgorithmDataset, AlgorithmStatisticsSnapshot};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("algorithm name '{0}' already exists")]
    DuplicateName(String),
    #[error("maximum algorithm count ({0}) reached")]
    LimitReached(usize),
    #[error("display name must not be empty")]
    EmptyDisplayName,
}

/// Registry configuration: §6.4 `{max_algorithms, worker_pool_size}`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RegistryConfig {
    pub max_algorithms: Option<usize>,
    pub worker_pool_size: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { max_algorithms: None, worker_pool_size: 10 }
    }
}

/// Holds every registered algorithm's dataset, keyed by its unique
/// `algorithm_name`. Map mutations are serialized by `Mutex`; concurrent
/// `add_async` analyses run independently on the worker pool and only
/// briefly hold the lock to insert their finished result (§5).
pub struct AlgorithmRegistry {
    algorithms: Mutex<HashMap<String, AlgorithmDataset>>,
    max_algorithms: Option<usize>,
    semaphore: Arc<Semaphore>,
}

impl AlgorithmRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        let pool_size = config.worker_pool_size.max(1);
        Self {
            algorithms: Mutex::new(HashMap::new()),
            max_algorithms: config.max_algorithms,
            semaphore: Arc::new(Semaphore::new(pool_size)),
        }
    }

    fn algorithm_count(&self) -> usize {
        self.algorithms.lock().unwrap().len()
    }

    fn can_add(&self) -> bool {
        match self.max_algorithms {
            None => true,
            Some(limit) => self.algorithm_count() < limit,
        }
    }

    /// Analyze `record`/`replay` off-thread and insert the resulting
    /// dataset under its computed `algorithm_name`. Duplicates (same
    /// computed name) are rejected without running the analysis.
    pub async fn add_async(
        &self,
        display_name: &str,
        filename: &str,
        record: Track,
        replay: Track,
    ) -> Result<String, RegistryError> {
        if display_name.trim().is_empty() {
            return Err(RegistryError::EmptyDisplayName);
        }

        let algorithm_name = generate_algorithm_name(display_name, filename);

        {
            let algorithms = self.algorithms.lock().unwrap();
            if algorithms.contains_key(&algorithm_name) {
                return Err(RegistryError::DuplicateName(algorithm_name));
            }
        }
        if !self.can_add() {
            return Err(RegistryError::LimitReached(self.max_algorithms.unwrap()));
        }

        let _permit = self.semaphore.acquire().await.expect("semaphore never closed");

        let display_name = display_name.to_string();
        let filename = filename.to_string();
        let name_for_worker = algorithm_name.clone();
        let dataset = tokio::task::spawn_blocking(move || {
            let mut dataset = AlgorithmDataset::new(name_for_worker, display_name, filename);
            dataset.load_data(&record, &replay, false);
            dataset
        })
        .await
        .expect("analysis worker panicked");

        let mut algorithms = self.algorithms.lock().unwrap();
        if algorithms.contains_key(&algorithm_name) {
            return Err(RegistryError::DuplicateName(algorithm_name));
        }
        if let Some(limit) = self.max_algorithms {
            if algorithms.len() >= limit {
                return Err(RegistryError::LimitReached(limit));
            }
        }
        algorithms.insert(algorithm_name.clone(), dataset);
        tracing::info!(algorithm = %algorithm_name, "algorithm registered");
        Ok(algorithm_name)
    }

    /// Idempotent removal: returns `true` only if an entry was present.
    pub fn remove(&self, algorithm_name: &str) -> bool {
        self.algorithms.lock().unwrap().remove(algorithm_name).is_some()
    }

    pub fn with_dataset<T>(&self, algorithm_name: &str, f: impl FnOnce(&AlgorithmDataset) -> T) -> Option<T> {
        self.algorithms.lock().unwrap().get(algorithm_name).map(f)
    }

    pub fn with_dataset_mut<T>(&self, algorithm_name: &str, f: impl FnOnce(&mut AlgorithmDataset) -> T) -> Option<T> {
        self.algorithms.lock().unwrap().get_mut(algorithm_name).map(f)
    }

    /// Snapshots of every READY && active dataset (`get_active`, §4.7).
    pub fn get_active(&self) -> Vec<AlgorithmStatisticsSnapshot> {
        self.algorithms
            .lock()
            .unwrap()
            .values()
            .filter(|d| d.is_active && d.is_ready())
            .map(|d| d.statistics_snapshot())
            .collect()
    }

    pub fn get_all(&self) -> Vec<AlgorithmStatisticsSnapshot> {
        self.algorithms.lock().unwrap().values().map(|d| d.statistics_snapshot()).collect()
    }

    /// Flips `is_active`; returns `false` if the name is unknown.
    pub fn toggle(&self, algorithm_name: &str) -> bool {
        let mut algorithms = self.algorithms.lock().unwrap();
        match algorithms.get_mut(algorithm_name) {
            Some(dataset) => {
                dataset.is_active = !dataset.is_active;
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        self.algorithms.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.algorithm_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
