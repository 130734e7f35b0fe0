//! State-refresh poller
//!
//! Repeatedly asks a [`StateRefresher`] for the current lifecycle label until
//! it lands in the target set, with exponential backoff between checks and an
//! overall timeout.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::{LifecycleError, LifecycleResult};
use crate::lifecycle::StateTransition;
use crate::timeouts::format_duration;

/// First wait between checks when no poll interval is set
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
/// Cap for the exponential backoff
const MAX_BACKOFF: Duration = Duration::from_secs(10);
/// Poll intervals above this are ignored in favour of the backoff
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(180);

pub const DEFAULT_NOT_FOUND_CHECKS: u32 = 20;

/// Source of lifecycle labels
#[async_trait]
pub trait StateRefresher: Send {
    /// Current label, or `None` while the resource is not visible
    async fn refresh(&mut self) -> LifecycleResult<Option<String>>;
}

#[derive(Debug, Error)]
pub enum WaitError {
    #[error(
        "timeout while waiting for state to become '{}' (last state: '{last_state}', timeout: {})",
        .expected.join(", "),
        format_duration(.timeout)
    )]
    Timeout {
        last_state: String,
        expected: Vec<String>,
        timeout: Duration,
    },

    #[error("unexpected state '{state}', wanted target '{}'", .expected.join(", "))]
    UnexpectedState { state: String, expected: Vec<String> },

    #[error("couldn't find resource ({checks} retries)")]
    NotFound { checks: u32 },

    #[error(transparent)]
    Refresh(LifecycleError),
}

impl WaitError {
    /// Attach the identifier of the resource being polled
    pub fn for_resource(self, identifier: &str) -> LifecycleError {
        let identifier = identifier.to_string();
        match self {
            WaitError::Timeout {
                last_state,
                expected,
                timeout,
            } => LifecycleError::Timeout {
                identifier,
                last_state,
                expected,
                timeout,
            },
            WaitError::UnexpectedState { state, expected } => LifecycleError::UnexpectedState {
                identifier,
                state,
                expected,
            },
            WaitError::NotFound { checks } => LifecycleError::NotFound { identifier, checks },
            WaitError::Refresh(e) => e,
        }
    }
}

/// Description of one wait: which labels to wait through and for how long
#[derive(Debug, Clone)]
pub struct StateChangeConf {
    pub pending: Vec<String>,
    pub target: Vec<String>,
    pub timeout: Duration,
    /// Wait before the first check
    pub delay: Duration,
    /// Smallest wait between checks
    pub min_timeout: Duration,
    /// Fixed wait between checks, overriding the backoff
    pub poll_interval: Option<Duration>,
    /// Consecutive "not visible" results tolerated before giving up
    pub not_found_checks: u32,
    /// Consecutive target observations required before finishing
    pub continuous_target_occurrence: u32,
}

impl StateChangeConf {
    pub fn new(transition: &StateTransition, timeout: Duration) -> Self {
        Self {
            pending: transition.pending().to_vec(),
            target: transition.target().to_vec(),
            timeout,
            delay: Duration::ZERO,
            min_timeout: Duration::ZERO,
            poll_interval: None,
            not_found_checks: DEFAULT_NOT_FOUND_CHECKS,
            continuous_target_occurrence: 1,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_min_timeout(mut self, min_timeout: Duration) -> Self {
        self.min_timeout = min_timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn with_not_found_checks(mut self, checks: u32) -> Self {
        self.not_found_checks = checks;
        self
    }

    pub fn with_continuous_target_occurrence(mut self, occurrences: u32) -> Self {
        self.continuous_target_occurrence = occurrences;
        self
    }

    /// Poll until a target label is observed; returns that label
    pub async fn wait_for_state<R>(&self, refresher: &mut R) -> Result<String, WaitError>
    where
        R: StateRefresher + ?Sized,
    {
        let mut last_state = String::new();
        let outcome = tokio::time::timeout(self.timeout, self.poll(refresher, &mut last_state)).await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                log::warn!(
                    "gave up waiting for [{}] after {} (last state: '{}')",
                    self.target.join(", "),
                    format_duration(&self.timeout),
                    last_state
                );
                Err(WaitError::Timeout {
                    last_state,
                    expected: self.target.clone(),
                    timeout: self.timeout,
                })
            }
        }
    }

    async fn poll<R>(&self, refresher: &mut R, last_state: &mut String) -> Result<String, WaitError>
    where
        R: StateRefresher + ?Sized,
    {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut backoff = INITIAL_BACKOFF;
        let mut not_found_ticks = 0u32;
        let mut target_occurrence = 0u32;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match refresher.refresh().await.map_err(WaitError::Refresh)? {
                None => {
                    target_occurrence = 0;
                    not_found_ticks += 1;
                    if not_found_ticks > self.not_found_checks {
                        return Err(WaitError::NotFound {
                            checks: not_found_ticks,
                        });
                    }
                    log::debug!("resource not visible yet (check {})", not_found_ticks);
                }
                Some(state) => {
                    not_found_ticks = 0;
                    *last_state = state.clone();

                    if self.target.contains(&state) {
                        target_occurrence += 1;
                        if target_occurrence >= self.continuous_target_occurrence.max(1) {
                            log::debug!("reached state '{}' after {} checks", state, attempt);
                            return Ok(state);
                        }
                    } else if self.pending.is_empty() || self.pending.contains(&state) {
                        target_occurrence = 0;
                    } else {
                        return Err(WaitError::UnexpectedState {
                            state,
                            expected: self.target.clone(),
                        });
                    }
                    log::debug!("state '{}' (check {}), still waiting", state, attempt);
                }
            }

            tokio::time::sleep(self.next_wait(&mut backoff)).await;
        }
    }

    fn next_wait(&self, backoff: &mut Duration) -> Duration {
        if let Some(interval) = self
            .poll_interval
            .filter(|i| !i.is_zero() && *i <= MAX_POLL_INTERVAL)
        {
            return interval;
        }
        let wait = if *backoff < self.min_timeout {
            self.min_timeout
        } else {
            (*backoff).min(MAX_BACKOFF)
        };
        *backoff = backoff.saturating_mul(2);
        wait
    }
}
