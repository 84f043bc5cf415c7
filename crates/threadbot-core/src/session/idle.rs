//! Per-session idle timer.
//!
//! One tokio task per session sleeps until `last activity + timeout`. Every
//! `touch` moves the deadline forward, and the countdown is suspended while
//! the session holds the timer for a running turn. The expiry callback runs
//! at most once, and never after the session's cancellation token fires or
//! the timer handle is dropped.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy)]
struct Activity {
    last: Instant,
    held: bool,
}

/// Handle to a running idle timer.
#[derive(Debug)]
pub struct IdleTimer {
    activity: watch::Sender<Activity>,
}

impl IdleTimer {
    /// Start a timer whose countdown begins now.
    pub fn spawn<F, Fut>(timeout: Duration, cancel: CancellationToken, on_expire: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (activity, mut rx) = watch::channel(Activity {
            last: Instant::now(),
            held: false,
        });

        if Instant::now().checked_add(timeout).is_none() {
            warn!(
                idle_timeout_secs = timeout.as_secs(),
                "Idle timeout out of range, session will never expire"
            );
        }

        tokio::spawn(async move {
            loop {
                let activity = *rx.borrow_and_update();
                let deadline = if activity.held {
                    None
                } else {
                    expiry_deadline(activity.last, timeout)
                };
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        trace!("Idle timer reset");
                    }
                    _ = sleep_until_deadline(deadline) => break,
                }
            }
            on_expire().await;
        });

        Self { activity }
    }

    /// Restart the countdown from now.
    pub fn touch(&self) {
        self.activity.send_modify(|activity| activity.last = Instant::now());
    }

    /// Suspend the countdown until `release`.
    pub fn hold(&self) {
        self.activity.send_modify(|activity| activity.held = true);
    }

    /// Resume the countdown, starting from now.
    pub fn release(&self) {
        self.activity.send_replace(Activity {
            last: Instant::now(),
            held: false,
        });
    }
}

/// `last + timeout`, or `None` when that instant cannot be represented.
fn expiry_deadline(last: Instant, timeout: Duration) -> Option<Instant> {
    last.checked_add(timeout)
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
