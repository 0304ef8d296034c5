#![deny(clippy::unwrap_used)]

//! Serializes linker invocations (§4.1 "linker serialisation"). Linking is
//! memory- and I/O-heavy enough that running several at once thrashes the
//! build machine, so link tasks queue on a single-permit semaphore the same
//! way `ParallelPool` queues compiles on an N-permit one, rather than
//! racing alongside ordinary compiles in the main pool.

use std::sync::Arc;

pub struct LinkerFifo {
    semaphore: Arc<tokio::sync::Semaphore>,
}

impl LinkerFifo {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(tokio::sync::Semaphore::new(1)),
        }
    }

    pub async fn run<F, Fut, Out>(&self, f: F) -> Out
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Out>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("semaphore is never closed");
        f().await
    }
}

impl Default for LinkerFifo {
    fn default() -> Self {
        Self::new()
    }
}
