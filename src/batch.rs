//! Per-item execution for batch stages.
//!
//! Stages describe what happens to one item; an [`ItemExecutor`] decides how
//! the items are driven. [`Sequential`] starts item *i+1* only after item *i*
//! has resolved. [`Bounded`] runs up to `n` items at once and still returns
//! outputs in input order.

use futures::stream::{self, StreamExt};
use std::future::Future;

pub trait ItemExecutor {
    /// Run `task` over every item. The output has one entry per input, in
    /// input order. `task` receives the zero-based item index.
    async fn run<I, T, F, Fut>(&self, items: Vec<I>, task: F) -> Vec<T>
    where
        F: FnMut(usize, I) -> Fut,
        Fut: Future<Output = T>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential;

impl ItemExecutor for Sequential {
    async fn run<I, T, F, Fut>(&self, items: Vec<I>, mut task: F) -> Vec<T>
    where
        F: FnMut(usize, I) -> Fut,
        Fut: Future<Output = T>,
    {
        stream::iter(items.into_iter().enumerate())
            .then(|(i, item)| task(i, item))
            .collect()
            .await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Bounded(pub usize);

impl ItemExecutor for Bounded {
    async fn run<I, T, F, Fut>(&self, items: Vec<I>, mut task: F) -> Vec<T>
    where
        F: FnMut(usize, I) -> Fut,
        Fut: Future<Output = T>,
    {
        stream::iter(items.into_iter().enumerate())
            .map(|(i, item)| task(i, item))
            .buffered(self.0.max(1))
            .collect()
            .await
    }
}

/// Executor chosen at runtime from the CLI.
#[derive(Debug, Clone, Copy)]
pub enum Executor {
    Sequential(Sequential),
    Bounded(Bounded),
}

impl Executor {
    pub fn with_concurrency(n: usize) -> Self {
        if n <= 1 {
            Executor::Sequential(Sequential)
        } else {
            Executor::Bounded(Bounded(n))
        }
    }
}

impl ItemExecutor for Executor {
    async fn run<I, T, F, Fut>(&self, items: Vec<I>, task: F) -> Vec<T>
    where
        F: FnMut(usize, I) -> Fut,
        Fut: Future<Output = T>,
    {
        match self {
            Executor::Sequential(e) => e.run(items, task).await,
            Executor::Bounded(e) => e.run(items, task).await,
        }
    }
}
