use leasepool::{LeaseStore, Result};
use std::sync::Arc;

/// Produces clients to the shared lease store.
///
/// `create` is synchronous and may fail, e.g. when the store's API cannot be
/// reached or rejects our credentials.
pub trait ClientFactory: Send + Sync {
    fn create(&self) -> Result<Arc<dyn LeaseStore>>;
}

impl<F> ClientFactory for F
where
    F: Fn() -> Result<Arc<dyn LeaseStore>> + Send + Sync,
{
    fn create(&self) -> Result<Arc<dyn LeaseStore>> {
        self()
    }
}

/// Hands out the same store to every caller. Replicas built from one
/// `SharedStoreFactory` contend on one set of records.
#[derive(Debug, Clone)]
pub struct SharedStoreFactory {
    store: Arc<dyn LeaseStore>,
}

impl SharedStoreFactory {
    pub fn new(store: Arc<dyn LeaseStore>) -> Self {
        Self { store }
    }
}

impl ClientFactory for SharedStoreFactory {
    fn create(&self) -> Result<Arc<dyn LeaseStore>> {
        Ok(self.store.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leasepool::{Error, InMemoryStore};

    #[test]
    fn test_shared_factory_returns_same_store() {
        let store: Arc<dyn LeaseStore> = Arc::new(InMemoryStore::new());
        let factory = SharedStoreFactory::new(store.clone());
        let a = factory.create().unwrap();
        let b = factory.create().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &store));
    }

    #[test]
    fn test_closure_factory() {
        let failing = || -> Result<Arc<dyn LeaseStore>> { Err(Error::Unavailable) };
        assert!(matches!(failing.create(), Err(Error::Unavailable)));
    }
}
