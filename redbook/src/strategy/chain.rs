//! Ordered strategy chains.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::errors::FailureKind;

/// One way of obtaining a value.
///
/// `None` means the strategy does not apply or found nothing, `Some(Err)`
/// means it failed. Either way the chain moves on to the next strategy.
#[async_trait]
pub trait Strategy<C, T>: Send + Sync
where
    C: ?Sized + Sync,
    T: Send,
{
    /// Name used in logs and in the chain result.
    fn name(&self) -> &str;

    /// Tries to obtain a value.
    async fn attempt(&self, ctx: &C) -> Option<Result<T, String>>;
}

/// A strategy backed by a synchronous closure.
pub struct FnStrategy<F> {
    name: String,
    f: F,
}

impl<F> FnStrategy<F> {
    /// Wraps a closure.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> fmt::Debug for FnStrategy<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStrategy").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<C, T, F> Strategy<C, T> for FnStrategy<F>
where
    C: ?Sized + Sync,
    T: Send,
    F: Fn(&C) -> Option<Result<T, String>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, ctx: &C) -> Option<Result<T, String>> {
        (self.f)(ctx)
    }
}

/// The value produced by a chain and the strategy that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution<T> {
    /// The value.
    pub value: T,
    /// Name of the winning strategy.
    pub strategy: String,
}

/// Every strategy in a chain came up empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("No strategy in '{chain}' produced a value ({} failed)", failures.len())]
pub struct ChainExhausted {
    /// Chain label.
    pub chain: String,
    /// `(strategy, error)` for every strategy that failed outright.
    pub failures: Vec<(String, String)>,
}

/// An ordered list of strategies; the first to produce a value wins.
pub struct StrategyChain<C, T>
where
    C: ?Sized + Sync,
    T: Send,
{
    label: String,
    strategies: Vec<Arc<dyn Strategy<C, T>>>,
}

impl<C, T> StrategyChain<C, T>
where
    C: ?Sized + Sync,
    T: Send,
{
    /// Creates an empty chain.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            strategies: Vec::new(),
        }
    }

    /// Appends a strategy.
    #[must_use]
    pub fn with(mut self, strategy: impl Strategy<C, T> + 'static) -> Self {
        self.strategies.push(Arc::new(strategy));
        self
    }

    /// Returns the chain label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the strategy names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Returns the number of strategies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Returns true if the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Runs the strategies in order until one produces a value.
    ///
    /// Failures are logged and swallowed; only exhaustion is reported.
    pub async fn run(&self, ctx: &C) -> Result<Resolution<T>, ChainExhausted> {
        let mut failures = Vec::new();
        for strategy in &self.strategies {
            match strategy.attempt(ctx).await {
                Some(Ok(value)) => {
                    debug!(chain = %self.label, strategy = strategy.name(), "Strategy produced a value");
                    return Ok(Resolution {
                        value,
                        strategy: strategy.name().to_string(),
                    });
                }
                Some(Err(error)) => {
                    warn!(
                        chain = %self.label,
                        strategy = strategy.name(),
                        error = %error,
                        "Strategy failed"
                    );
                    failures.push((strategy.name().to_string(), error));
                }
                None => {
                    debug!(chain = %self.label, strategy = strategy.name(), "Strategy found nothing");
                }
            }
        }
        debug!(
            chain = %self.label,
            failure_kind = %FailureKind::TargetNotFound,
            "Strategy chain exhausted"
        );
        Err(ChainExhausted {
            chain: self.label.clone(),
            failures,
        })
    }
}

impl<C, T> fmt::Debug for StrategyChain<C, T>
where
    C: ?Sized + Sync,
    T: Send,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyChain")
            .field("label", &self.label)
            .field("strategies", &self.strategies.len())
            .finish()
    }
}
