use gust_core::prelude::ShutdownHandle;
use tokio::signal;

/// Listen for Ctrl-C.
///
/// The first Ctrl-C stops the scenario, letting in-flight iterations complete. A second Ctrl-C
/// shuts the runner down, cancelling anything still in flight.
pub(crate) fn start_shutdown_listener(
    runtime: &tokio::runtime::Runtime,
    stop_handle: ShutdownHandle,
    shutdown_handle: ShutdownHandle,
) {
    runtime.spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {:?}", e);
            return;
        }
        println!("Received stop signal, waiting for in-flight iterations. Press Ctrl-C again to abort.");
        stop_handle.shutdown();

        if signal::ctrl_c().await.is_ok() {
            println!("Received second stop signal, shutting down...");
            shutdown_handle.shutdown();
        }
    });
}
