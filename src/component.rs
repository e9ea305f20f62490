//! Component lifecycle and a minimal supervisor.
//!
//! The supervisor calls `init` and `run` once per component, in the order
//! components were added, and `stop` in reverse order.

use crate::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

#[async_trait]
pub trait Component: Send + Sync {
    /// Prepares the component. Must not start background work.
    async fn init(&self) -> Result<()>;

    /// Starts the component. Returns once it is running, not when it is done.
    async fn run(&self) -> Result<()>;

    /// Requests shutdown. Does not wait for background work to finish.
    async fn stop(&self) -> Result<()>;

    async fn healthy(&self) -> Result<()>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

#[derive(Default)]
pub struct Manager {
    components: Vec<Arc<dyn Component>>,
    // Number of components, from the front, whose `run` succeeded
    started: AtomicUsize,
}

impl Manager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, component: Arc<dyn Component>) {
        self.components.push(component);
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub async fn init(&self) -> Result<()> {
        for component in &self.components {
            debug!(component = component.name(), "initializing component");
            component.init().await?;
        }
        Ok(())
    }

    /// Runs every component. If one fails, the ones already running are
    /// stopped again and the error is returned.
    pub async fn start(&self) -> Result<()> {
        for (index, component) in self.components.iter().enumerate() {
            info!(component = component.name(), "starting component");
            if let Err(e) = component.run().await {
                error!(component = component.name(), error = %e, "failed to start component");
                self.started.store(index, Ordering::SeqCst);
                // Rollback errors are logged by stop
                let _ = self.stop().await;
                return Err(e);
            }
        }
        self.started.store(self.components.len(), Ordering::SeqCst);
        Ok(())
    }

    /// Stops running components in reverse order. Keeps going past failures
    /// and returns the first one.
    pub async fn stop(&self) -> Result<()> {
        let started = self.started.swap(0, Ordering::SeqCst);
        let mut first_error = None;
        for component in self.components[..started].iter().rev() {
            info!(component = component.name(), "stopping component");
            if let Err(e) = component.stop().await {
                error!(component = component.name(), error = %e, "failed to stop component");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub async fn healthy(&self) -> Result<()> {
        for component in &self.components {
            component.healthy().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use parking_lot::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail_run: bool,
    }

    impl Recorder {
        fn new(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                log: log.clone(),
                fail_run: false,
            })
        }

        fn failing(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                log: log.clone(),
                fail_run: true,
            })
        }

        fn record(&self, event: &str) {
            self.log.lock().push(format!("{}:{}", self.name, event));
        }
    }

    #[async_trait]
    impl Component for Recorder {
        async fn init(&self) -> Result<()> {
            self.record("init");
            Ok(())
        }

        async fn run(&self) -> Result<()> {
            self.record("run");
            if self.fail_run {
                return Err(Error::Config("boom".into()));
            }
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            self.record("stop");
            Ok(())
        }

        async fn healthy(&self) -> Result<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    #[tokio::test]
    async fn test_lifecycle_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = Manager::new();
        manager.add(Recorder::new("a", &log));
        manager.add(Recorder::new("b", &log));

        manager.init().await.unwrap();
        manager.start().await.unwrap();
        assert!(manager.healthy().await.is_ok());
        manager.stop().await.unwrap();

        assert_eq!(
            *log.lock(),
            vec!["a:init", "b:init", "a:run", "b:run", "b:stop", "a:stop"]
        );
    }

    #[tokio::test]
    async fn test_failed_start_rolls_back() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = Manager::new();
        manager.add(Recorder::new("a", &log));
        manager.add(Recorder::failing("b", &log));
        manager.add(Recorder::new("c", &log));

        assert!(manager.start().await.is_err());
        assert_eq!(*log.lock(), vec!["a:run", "b:run", "a:stop"]);

        // Nothing left to stop
        manager.stop().await.unwrap();
        assert_eq!(log.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_stop_before_start_is_noop() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = Manager::new();
        manager.add(Recorder::new("a", &log));

        manager.stop().await.unwrap();
        assert!(log.lock().is_empty());
    }
}
