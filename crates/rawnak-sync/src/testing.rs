//! Shared helpers for the unit tests of this crate.

use std::time::Duration;

use tokio::sync::watch;

/// Waits until the channel holds a value matching `pred` and returns it.
///
/// Panics after five seconds so a missing snapshot fails the test instead
/// of hanging it.
pub async fn wait_for<T, F>(rx: &mut watch::Receiver<T>, pred: F) -> T
where
    T: Clone,
    F: Fn(&T) -> bool,
{
    let value = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|v| pred(v)))
        .await
        .expect("timed out waiting for view")
        .expect("view channel closed");
    (*value).clone()
}
