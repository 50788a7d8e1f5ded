//! Worker registry
//!
//! Populated before runs start and read from the execution thread. Backed
//! by a `DashMap` so registration from the interaction side never blocks a
//! running lookup.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use steward_types::WorkerId;
use tracing::info;

use crate::error::RegistryError;
use crate::worker::Worker;

#[derive(Default)]
pub struct WorkerRegistry {
    workers: DashMap<WorkerId, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker under its own id
    pub fn register(&self, worker: Arc<dyn Worker>) -> Result<WorkerId, RegistryError> {
        let id = worker.id();
        match self.workers.entry(id.clone()) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateWorker(id)),
            Entry::Vacant(slot) => {
                slot.insert(worker);
                info!(worker = %id, "Worker registered");
                Ok(id)
            }
        }
    }

    pub fn unregister(&self, id: &WorkerId) -> Option<Arc<dyn Worker>> {
        self.workers.remove(id).map(|(_, worker)| worker)
    }

    pub fn get(&self, id: &WorkerId) -> Result<Arc<dyn Worker>, RegistryError> {
        self.workers
            .get(id)
            .map(|w| w.value().clone())
            .ok_or_else(|| RegistryError::UnknownWorker(id.clone()))
    }

    pub fn contains(&self, id: &WorkerId) -> bool {
        self.workers.contains_key(id)
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<WorkerId> {
        let mut ids: Vec<WorkerId> = self.workers.iter().map(|w| w.key().clone()).collect();
        ids.sort();
        ids
    }

    /// `(id, description)` pairs, sorted by id
    pub fn describe(&self) -> Vec<(WorkerId, String)> {
        let mut described: Vec<(WorkerId, String)> = self
            .workers
            .iter()
            .map(|w| (w.key().clone(), w.value().description()))
            .collect();
        described.sort_by(|a, b| a.0.cmp(&b.0));
        described
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::StaticWorker;
    use serde_json::json;

    #[test]
    fn duplicate_registration_fails() {
        let registry = WorkerRegistry::new();
        registry
            .register(Arc::new(StaticWorker::new("writer", json!("a"))))
            .unwrap();
        let err = registry
            .register(Arc::new(StaticWorker::new("writer", json!("b"))))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateWorker(WorkerId::new("writer")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lookup_of_unknown_worker_fails() {
        let registry = WorkerRegistry::new();
        assert!(matches!(
            registry.get(&WorkerId::new("ghost")),
            Err(RegistryError::UnknownWorker(_))
        ));
    }

    #[test]
    fn ids_are_sorted() {
        let registry = WorkerRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry
                .register(Arc::new(StaticWorker::new(name, json!(null))))
                .unwrap();
        }
        let ids: Vec<String> = registry.ids().into_iter().map(|id| id.0).collect();
        assert_eq!(ids, vec!["alpha", "mid", "zeta"]);

        assert!(registry.unregister(&WorkerId::new("mid")).is_some());
        assert!(!registry.contains(&WorkerId::new("mid")));
    }
}
