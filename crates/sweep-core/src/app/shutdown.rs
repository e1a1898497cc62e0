//! Cooperative stop signal shared by the loops.
//!
//! `true` on the watch channel means stop. A dropped sender means the same.

use std::time::Duration;

use tokio::sync::watch;

pub(crate) fn stop_requested(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow() || rx.has_changed().is_err()
}

/// Sleep for `duration` unless a stop arrives first. Returns `false` when the
/// loop should stop.
pub(crate) async fn sleep_or_stop(duration: Duration, rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = rx.wait_for(|stop| *stop) => false,
    }
}
