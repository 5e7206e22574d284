//! Polling helpers for assertions on work done by spawned handler tasks.

use std::{future::Future, time::Duration};

use tokio::time::{sleep, timeout};

/// Poll `condition` every millisecond until it holds or a second passes.
///
/// Returns whether the condition held.
pub async fn eventually<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    timeout(Duration::from_secs(1), async {
        while !condition() {
            sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .is_ok()
}

/// Await `fut` for at most one second.
///
/// # Panics
///
/// Panics if the future does not complete in time.
pub async fn within<F: Future>(fut: F) -> F::Output {
    timeout(Duration::from_secs(1), fut)
        .await
        .unwrap_or_else(|_| panic!("future did not complete within a second"))
}
