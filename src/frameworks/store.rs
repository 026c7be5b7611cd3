// In-memory keyed store backing the lobby registry.

use crate::domain::errors::StoreError;
use crate::domain::ports::Repository;

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

pub struct MemoryStore<T> {
    records: Option<RwLock<HashMap<String, T>>>,
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            records: Some(RwLock::new(HashMap::new())),
        }
    }

    /// A store that refuses every operation.
    pub fn uninitialized() -> Self {
        Self { records: None }
    }

    fn records(&self) -> Result<&RwLock<HashMap<String, T>>, StoreError> {
        self.records.as_ref().ok_or(StoreError::Uninitialized)
    }
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync> Repository<T> for MemoryStore<T> {
    fn create(&self, id: &str, record: T) -> Result<(), StoreError> {
        let mut records = self.records()?.write().unwrap_or_else(PoisonError::into_inner);
        if records.contains_key(id) {
            return Err(StoreError::AlreadyExists);
        }
        records.insert(id.to_string(), record);
        Ok(())
    }

    fn get_by_id(&self, id: &str) -> Result<T, StoreError> {
        let records = self.records()?.read().unwrap_or_else(PoisonError::into_inner);
        records.get(id).cloned().ok_or(StoreError::NotFound)
    }

    fn get_all(&self) -> Result<Vec<T>, StoreError> {
        let records = self.records()?.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.values().cloned().collect())
    }

    fn update(&self, id: &str, record: T) -> Result<(), StoreError> {
        let mut records = self.records()?.write().unwrap_or_else(PoisonError::into_inner);
        match records.get_mut(id) {
            Some(existing) => {
                *existing = record;
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    fn remove(&self, id: &str) -> Result<(), StoreError> {
        let mut records = self.records()?.write().unwrap_or_else(PoisonError::into_inner);
        records.remove(id).map(|_| ()).ok_or(StoreError::NotFound)
    }

    fn is_valid(&self) -> bool {
        self.records.is_some()
    }
}
