use std::time::Duration;

use tokio::sync::watch;

/// Wait up to `limit` for the watched value to satisfy `predicate`.
///
/// The current value is checked first. Returns a clone of the matching
/// value, or `None` when the limit elapses or the sender goes away.
pub(crate) async fn timed_wait<T, F>(
    rx: &mut watch::Receiver<T>,
    limit: Duration,
    mut predicate: F,
) -> Option<T>
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    match tokio::time::timeout(limit, rx.wait_for(|v| predicate(v))).await {
        Ok(Ok(value)) => Some(value.clone()),
        Ok(Err(_)) | Err(_) => None,
    }
}
