use tokio::sync::watch::{Receiver, Sender};

/// A handle which can be used to signal a shutdown to any number of listeners.
///
/// The signal is sticky. Once [ShutdownHandle::shutdown] has been called, every listener, including
/// listeners created after the call, will observe the shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Sender<bool>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            sender: tokio::sync::watch::channel(false).0,
        }
    }

    pub fn shutdown(&self) {
        let changed = self.sender.send_if_modified(|triggered| {
            if *triggered {
                false
            } else {
                *triggered = true;
                true
            }
        });

        if !changed {
            log::trace!("Shutdown was already signalled");
        }
    }

    /// Whether [ShutdownHandle::shutdown] has been called on this handle or any of its clones.
    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn new_listener(&self) -> DelegatedShutdownListener {
        DelegatedShutdownListener::new(self.sender.subscribe())
    }
}

#[derive(Clone, Debug)]
pub struct DelegatedShutdownListener {
    receiver: Receiver<bool>,
}

impl DelegatedShutdownListener {
    pub(crate) fn new(receiver: Receiver<bool>) -> Self {
        Self { receiver }
    }

    /// Point in time check if the shutdown signal has been received. If this returns true then work
    /// should be stopped so that the scenario can shut down.
    pub fn should_shutdown(&mut self) -> bool {
        *self.receiver.borrow_and_update()
    }

    /// Wait for the shutdown signal to be received. It is safe to race this with another future so
    /// that the shutdown signal can be used to cancel other work in progress.
    ///
    /// If every [ShutdownHandle] has been dropped without signalling, this waits forever.
    pub async fn wait_for_shutdown(&mut self) {
        if self.receiver.wait_for(|triggered| *triggered).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct ShutdownSignalError {
    msg: String,
}

impl Default for ShutdownSignalError {
    fn default() -> Self {
        Self {
            msg: "Execution cancelled by shutdown signal".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_created_after_shutdown_sees_it() {
        let handle = ShutdownHandle::new();
        let mut early = handle.new_listener();
        assert!(!early.should_shutdown());

        handle.shutdown();

        let mut late = handle.new_listener();
        assert!(early.should_shutdown());
        assert!(late.should_shutdown());
        assert!(handle.is_shutdown());
    }

    #[test]
    fn shutdown_is_not_consumed_by_checking() {
        let handle = ShutdownHandle::new();
        let mut listener = handle.new_listener();
        handle.shutdown();
        handle.shutdown();

        assert!(listener.should_shutdown());
        assert!(listener.should_shutdown());
    }

    #[tokio::test]
    async fn wait_for_shutdown_completes_after_signal() {
        let handle = ShutdownHandle::new();
        let mut listener = handle.new_listener();

        let waiter = tokio::spawn(async move {
            listener.wait_for_shutdown().await;
        });

        handle.shutdown();

        tokio::time::timeout(std::time::Duration::from_secs(5), waiter)
            .await
            .expect("listener did not observe shutdown")
            .unwrap();
    }
}
