//! Shutdown broadcast helpers

use tokio::sync::watch;

/// Resolve once shutdown has been requested
///
/// Checks the current value first, so a request made before the call is not
/// missed. Never resolves if the sender is dropped without requesting.
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
