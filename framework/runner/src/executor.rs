use std::future::Future;
use std::time::Duration;

use gust_core::prelude::{DelegatedShutdownListener, ShutdownHandle, ShutdownSignalError};

/// Bridges the virtual user threads into the shared async runtime.
#[derive(Debug)]
pub struct Executor {
    runtime: tokio::runtime::Runtime,
    shutdown_handle: ShutdownHandle,
}

impl Executor {
    pub(crate) fn new(runtime: tokio::runtime::Runtime, shutdown_handle: ShutdownHandle) -> Self {
        Self {
            runtime,
            shutdown_handle,
        }
    }

    /// Run async code in place, blocking until it completes.
    ///
    /// The future is allowed to finish when the scenario is stopping, so in-flight requests
    /// complete. It is only cancelled if the runner is forced to shut down, for example because
    /// the graceful stop period ran out. In that case a [ShutdownSignalError] is returned.
    pub fn execute_in_place<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        let mut shutdown_listener = self.shutdown_handle.new_listener();
        self.runtime.block_on(async move {
            tokio::select! {
                result = fut => result,
                _ = shutdown_listener.wait_for_shutdown() => {
                    Err(anyhow::anyhow!(ShutdownSignalError::default()))
                },
            }
        })
    }

    /// Block for `duration`, or until `stop_listener` fires.
    ///
    /// Returns `true` if the full duration elapsed.
    pub fn sleep(&self, duration: Duration, stop_listener: &mut DelegatedShutdownListener) -> bool {
        self.runtime.block_on(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => true,
                _ = stop_listener.wait_for_shutdown() => false,
            }
        })
    }
}
