//! # Retry module
//!
//! This module provide a bounded retry helper, a fixed number of attempts
//! separated by a fixed delay.

use std::{future::Future, time::Duration};

use tokio::time::sleep;

/// run `f` up to `attempts` times, sleeping `delay` between two attempts, and
/// returns the first value produced. `f` receives the index of the attempt
/// starting at zero. Returns `None` when every attempt failed.
pub async fn bounded<F, Fut, T>(attempts: usize, delay: Duration, mut f: F) -> Option<T>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for attempt in 0..attempts {
        if let Some(value) = f(attempt).await {
            return Some(value);
        }

        if attempt + 1 < attempts {
            sleep(delay).await;
        }
    }

    None
}
