use crate::{
    record::{LeaseKey, LeaseRecord, Versioned},
    Error, Result,
};
use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Shared, linearizable store of lease records.
///
/// Every write is conditional: `create` only succeeds if the record is
/// absent and `update` only if the stored version still equals the one the
/// caller read. Implementations must be safe to share between tasks.
#[async_trait]
pub trait LeaseStore: Send + Sync + std::fmt::Debug {
    async fn get(&self, key: &LeaseKey) -> Result<Option<Versioned<LeaseRecord>>>;

    async fn create(&self, key: &LeaseKey, record: LeaseRecord) -> Result<Versioned<LeaseRecord>>;

    async fn update(
        &self,
        key: &LeaseKey,
        record: LeaseRecord,
        expected_version: u64,
    ) -> Result<Versioned<LeaseRecord>>;
}

/// Process-local store, shared between contenders through an `Arc`.
#[derive(Debug)]
pub struct InMemoryStore {
    data: DashMap<LeaseKey, (u64, Vec<u8>)>,
    revision: AtomicU64,
    available: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            revision: AtomicU64::new(0),
            available: AtomicBool::new(true),
        }
    }

    /// While unavailable every call fails with [`Error::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Current record, bypassing availability. Intended for inspection.
    pub fn snapshot(&self, key: &LeaseKey) -> Option<LeaseRecord> {
        self.data
            .get(key)
            .and_then(|entry| bincode::deserialize(&entry.value().1).ok())
    }

    fn check_available(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(Error::Unavailable)
        }
    }

    fn next_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LeaseStore for InMemoryStore {
    async fn get(&self, key: &LeaseKey) -> Result<Option<Versioned<LeaseRecord>>> {
        self.check_available()?;
        match self.data.get(key) {
            Some(entry) => {
                let (version, bytes) = entry.value();
                Ok(Some(Versioned {
                    version: *version,
                    value: bincode::deserialize(bytes)?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn create(&self, key: &LeaseKey, record: LeaseRecord) -> Result<Versioned<LeaseRecord>> {
        self.check_available()?;
        let bytes = bincode::serialize(&record)?;
        match self.data.entry(key.clone()) {
            Entry::Occupied(_) => Err(Error::Conflict {
                key: key.to_string(),
            }),
            Entry::Vacant(slot) => {
                let version = self.next_revision();
                slot.insert((version, bytes));
                Ok(Versioned {
                    version,
                    value: record,
                })
            }
        }
    }

    async fn update(
        &self,
        key: &LeaseKey,
        record: LeaseRecord,
        expected_version: u64,
    ) -> Result<Versioned<LeaseRecord>> {
        self.check_available()?;
        let bytes = bincode::serialize(&record)?;
        let mut entry = self.data.get_mut(key).ok_or_else(|| Error::NotFound {
            key: key.to_string(),
        })?;

        if entry.0 != expected_version {
            return Err(Error::Conflict {
                key: key.to_string(),
            });
        }

        let version = self.next_revision();
        *entry = (version, bytes);
        Ok(Versioned {
            version,
            value: record,
        })
    }
}
