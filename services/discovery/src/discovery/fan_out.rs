//! Parallel Fan-Out
//!
//! Runs one independent operation per item concurrently and gathers every
//! outcome. A failing item never cancels its siblings, and results come
//! back in input order so callers can zip them with their inputs.

use futures::stream::{self, StreamExt};
use std::future::Future;

/// Gather-with-isolation executor with an optional in-flight bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FanOut {
    max_in_flight: Option<usize>,
}

impl FanOut {
    /// `None` launches every item at once
    pub fn new(max_in_flight: Option<usize>) -> Self {
        Self {
            max_in_flight: max_in_flight.map(|n| n.max(1)),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn bounded(max_in_flight: usize) -> Self {
        Self::new(Some(max_in_flight))
    }

    pub fn max_in_flight(&self) -> Option<usize> {
        self.max_in_flight
    }

    /// Run `operation` for every item, at most `max_in_flight` at a time
    pub async fn run<T, R, E, F, Fut>(&self, items: Vec<T>, operation: F) -> Vec<Result<R, E>>
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let width = self.max_in_flight.unwrap_or(items.len()).max(1);

        stream::iter(items)
            .map(operation)
            .buffered(width)
            .collect()
            .await
    }
}

/// Unbounded fan-out over `items`
pub async fn fan_out<T, R, E, F, Fut>(items: Vec<T>, operation: F) -> Vec<Result<R, E>>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    FanOut::unbounded().run(items, operation).await
}
