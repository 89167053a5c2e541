//! Commit collaborator
//!
//! The remote setter that makes a draft durable. Implemented by the caller
//! (usually a thin wrapper over a remote actor call).

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;

/// Operation that durably saves a value
///
/// At most one call is in flight per draft at any time.
#[async_trait]
pub trait CommitTarget<T: Send + 'static>: Send + Sync {
    /// Persist `value`, returning the saved value
    async fn commit(&self, value: T) -> anyhow::Result<T>;
}

/// Adapter turning an async closure into a [`CommitTarget`]
pub struct FnCommit<T> {
    f: Box<dyn Fn(T) -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>,
}

impl<T: Send + 'static> FnCommit<T> {
    /// Wrap `f`
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            f: Box::new(move |value| Box::pin(f(value))),
        }
    }
}

impl<T> fmt::Debug for FnCommit<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCommit").finish_non_exhaustive()
    }
}

#[async_trait]
impl<T: Send + 'static> CommitTarget<T> for FnCommit<T> {
    async fn commit(&self, value: T) -> anyhow::Result<T> {
        (self.f)(value).await
    }
}

/// Build a [`CommitTarget`] from an async closure
pub fn commit_fn<T, F, Fut>(f: F) -> FnCommit<T>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    FnCommit::new(f)
}
