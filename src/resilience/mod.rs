//! Retry, session refresh and degrade-to-default for flaky external calls.
//!
//! Every network-facing stage goes through [`Resilience`]. A classifier labels
//! each failure:
//!
//! - `Transient`: wait with exponential backoff, then retry.
//! - `Blocked`: the remote side rejected the session (captcha, expired
//!   token). The session is recreated once per call, then the failure is
//!   retried like a transient one inside the same attempt budget.
//! - `Permanent`: stop immediately.
//!
//! [`Resilience::call_or_default`] never fails: when the budget is exhausted
//! or the failure is permanent it returns the caller's degraded default and
//! writes exactly one [`FailureReport`] to the failure log.
//! [`Resilience::retry`] shares the policy but hands the final error back.

mod backoff;

pub use backoff::{next_delay, RetryPolicy};

use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// How a failed call should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    Transient,
    Blocked,
    Permanent,
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Blocked => write!(f, "blocked"),
            Self::Permanent => write!(f, "permanent"),
        }
    }
}

/// A session or client context that can be thrown away and rebuilt.
#[async_trait]
pub trait SessionControl: Send + Sync {
    async fn refresh(&self) -> Result<(), String>;
}

/// Structured record of a call that ended in a degraded default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub operation: String,
    pub identifiers: BTreeMap<String, String>,
    pub error: String,
    pub attempts: u32,
    pub recorded_at: DateTime<Utc>,
}

/// Sink for [`FailureReport`]s.
pub trait FailureLog: Send + Sync {
    fn record(&self, report: &FailureReport);
}

/// Failure log kept in memory.
#[derive(Debug, Default)]
pub struct MemoryFailureLog {
    reports: Mutex<Vec<FailureReport>>,
}

impl MemoryFailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<FailureReport> {
        self.reports.lock().clone()
    }
}

impl FailureLog for MemoryFailureLog {
    fn record(&self, report: &FailureReport) {
        self.reports.lock().push(report.clone());
    }
}

/// Describes one logical call: its name, identifiers and optional session.
pub struct Call<'a> {
    operation: &'a str,
    identifiers: BTreeMap<String, String>,
    session: Option<&'a dyn SessionControl>,
}

impl<'a> Call<'a> {
    pub fn new(operation: &'a str) -> Self {
        Self {
            operation,
            identifiers: BTreeMap::new(),
            session: None,
        }
    }

    /// Attach an identifier included in logs and failure reports.
    pub fn id(mut self, name: &str, value: impl Display) -> Self {
        self.identifiers.insert(name.to_string(), value.to_string());
        self
    }

    /// Session recreated on a `Blocked` failure.
    pub fn session(mut self, session: &'a dyn SessionControl) -> Self {
        self.session = Some(session);
        self
    }

    pub fn operation(&self) -> &str {
        self.operation
    }
}

/// Final failure of a retried call.
#[derive(Debug)]
pub struct RetryError<E> {
    pub error: E,
    pub class: FailureClass,
    pub attempts: u32,
}

impl<E: Display> Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} failure after {} attempt(s): {}",
            self.class, self.attempts, self.error
        )
    }
}

impl<E: std::fmt::Debug + Display> std::error::Error for RetryError<E> {}

/// Result of [`Resilience::call_or_default`].
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome<T> {
    pub value: T,
    pub attempts: u32,
    /// The value is the caller's default, not a real result.
    pub degraded: bool,
}

/// Retry wrapper shared by all network-facing stages.
#[derive(Clone)]
pub struct Resilience {
    policy: RetryPolicy,
    failure_log: Arc<dyn FailureLog>,
}

impl Resilience {
    pub fn new(policy: RetryPolicy, failure_log: Arc<dyn FailureLog>) -> Self {
        Self {
            policy,
            failure_log,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` under the retry policy and return its final error on failure.
    pub async fn retry<T, E, F, Fut, C>(
        &self,
        call: &Call<'_>,
        classify: C,
        op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> FailureClass,
        E: Display,
    {
        self.run(call, classify, op).await.map(|(value, _)| value)
    }

    /// Run `op` under the retry policy, falling back to `default`.
    pub async fn call_or_default<T, E, F, Fut, C>(
        &self,
        call: &Call<'_>,
        classify: C,
        op: F,
        default: T,
    ) -> CallOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> FailureClass,
        E: Display,
    {
        match self.run(call, classify, op).await {
            Ok((value, attempts)) => CallOutcome {
                value,
                attempts,
                degraded: false,
            },
            Err(failure) => {
                tracing::error!(
                    operation = call.operation,
                    identifiers = ?call.identifiers,
                    attempts = failure.attempts,
                    class = %failure.class,
                    error = %failure.error,
                    "External call failed, using degraded default"
                );

                self.failure_log.record(&FailureReport {
                    operation: call.operation.to_string(),
                    identifiers: call.identifiers.clone(),
                    error: failure.error.to_string(),
                    attempts: failure.attempts,
                    recorded_at: Utc::now(),
                });

                CallOutcome {
                    value: default,
                    attempts: failure.attempts,
                    degraded: true,
                }
            }
        }
    }

    async fn run<T, E, F, Fut, C>(
        &self,
        call: &Call<'_>,
        classify: C,
        mut op: F,
    ) -> Result<(T, u32), RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> FailureClass,
        E: Display,
    {
        let max_attempts = self.policy.attempts();
        let mut waited = Duration::ZERO;
        let mut last_wait = Duration::ZERO;
        let mut refreshed = false;
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let error = match op().await {
                Ok(value) => {
                    tracing::debug!(
                        operation = call.operation,
                        attempt,
                        wait_ms = last_wait.as_millis() as u64,
                        total_wait_ms = waited.as_millis() as u64,
                        "External call succeeded"
                    );
                    return Ok((value, attempt));
                }
                Err(e) => e,
            };

            let class = classify(&error);
            tracing::warn!(
                operation = call.operation,
                attempt,
                max_attempts,
                wait_ms = last_wait.as_millis() as u64,
                total_wait_ms = waited.as_millis() as u64,
                class = %class,
                error = %error,
                "External call failed"
            );

            if class == FailureClass::Permanent || attempt >= max_attempts {
                return Err(RetryError {
                    error,
                    class,
                    attempts: attempt,
                });
            }

            if class == FailureClass::Blocked && !refreshed {
                refreshed = true;
                if let Some(session) = call.session {
                    match session.refresh().await {
                        Ok(()) => tracing::info!(
                            operation = call.operation,
                            attempt,
                            "Session recreated after blocked response"
                        ),
                        Err(e) => tracing::warn!(
                            operation = call.operation,
                            attempt,
                            error = %e,
                            "Session refresh failed, retrying anyway"
                        ),
                    }
                }
            }

            let delay = self.policy.delay_for(attempt);
            tokio::time::sleep(delay).await;
            last_wait = delay;
            waited += delay;
        }
    }
}
