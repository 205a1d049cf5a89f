// Fallback ladder - try ranked options in order, stop at the first success
//
// Used for thumbnail quality tiers and for thumbnail-then-render.

use std::fmt;
use std::future::Future;

use tracing::{debug, info};

/// Every rung failed; failures are kept in the order they were tried
#[derive(Debug)]
pub struct Exhausted<R, E> {
    pub failures: Vec<(R, E)>,
}

impl<R, E> Exhausted<R, E> {
    pub fn attempts(&self) -> usize {
        self.failures.len()
    }

    /// Failure of the last rung tried, if any rung ran
    pub fn into_last(self) -> Option<(R, E)> {
        self.failures.into_iter().last()
    }
}

/// Run `attempt` for each rung in order and return the first success
pub async fn first_success<I, F, Fut, T, E>(
    ladder: &'static str,
    rungs: I,
    mut attempt: F,
) -> Result<(I::Item, T), Exhausted<I::Item, E>>
where
    I: IntoIterator,
    I::Item: fmt::Display + Clone,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let mut failures = Vec::new();

    for rung in rungs {
        debug!(ladder, %rung, "trying rung");

        match attempt(rung.clone()).await {
            Ok(value) => {
                info!(ladder, %rung, "rung succeeded");
                return Ok((rung, value));
            }
            Err(e) => {
                debug!(ladder, %rung, error = %e, "rung failed");
                failures.push((rung, e));
            }
        }
    }

    Err(Exhausted { failures })
}
