//! One cancellation deadline shared by every protocol round-trip.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use super::types::DiscoveryLog;
use crate::error::{McpbError, Result};

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    /// Run `fut` until it completes or the deadline passes, additionally
    /// capped by `limit` from now.
    pub async fn run_within<T, F>(
        &self,
        operation: &str,
        limit: Option<Duration>,
        fut: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let (at, after) = match limit {
            Some(limit) if Instant::now() + limit < self.at => (Instant::now() + limit, limit),
            _ => (self.at, self.budget),
        };
        match tokio::time::timeout_at(at, fut).await {
            Ok(result) => result,
            Err(_) => Err(McpbError::Timeout {
                operation: operation.to_string(),
                after,
            }),
        }
    }
}

/// Applies the deadline to a call and downgrades any failure to a warning.
#[derive(Debug, Clone)]
pub struct SoftCall {
    deadline: Deadline,
    log: DiscoveryLog,
}

impl SoftCall {
    pub fn new(deadline: Deadline, log: DiscoveryLog) -> Self {
        Self { deadline, log }
    }

    pub fn log(&self) -> &DiscoveryLog {
        &self.log
    }

    /// `None` on error or timeout, after emitting `"{context}: {error}"`.
    pub async fn call<T, F>(&self, operation: &str, context: &str, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.call_within(operation, None, context, fut).await
    }

    pub async fn call_within<T, F>(
        &self,
        operation: &str,
        limit: Option<Duration>,
        context: &str,
        fut: F,
    ) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.deadline.run_within(operation, limit, fut).await {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::debug!("{} failed: {}", operation, e);
                self.log.warn(&format!("{}: {}", context, e));
                None
            }
        }
    }
}
