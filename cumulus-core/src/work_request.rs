//! Work request waiter
//!
//! Some services answer a mutating call with a work request instead of a
//! resource in a transitional state. The waiter polls the work request with
//! the same poller the orchestrator uses and turns a failed or canceled work
//! request into an error carrying the service's error payload.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{LifecycleError, LifecycleResult};
use crate::lifecycle::{CANCELED, FAILED, SUCCEEDED, StateTransition};
use crate::poller::{StateChangeConf, StateRefresher};

pub const ACCEPTED: &str = "ACCEPTED";
pub const IN_PROGRESS: &str = "IN_PROGRESS";
pub const CANCELING: &str = "CANCELING";

/// Status of a work request as reported by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkRequestStatus {
    pub id: String,
    pub status: String,
    /// Identifier of the resource the work request created or changed
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Fetches the current status of a work request
#[async_trait]
pub trait WorkRequestFetcher: Send + Sync {
    async fn fetch(&self, work_request_id: &str) -> LifecycleResult<WorkRequestStatus>;
}

#[derive(Debug, Clone)]
pub struct WorkRequestWaiter {
    timeout: Duration,
    poll_interval: Option<Duration>,
}

impl WorkRequestWaiter {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            poll_interval: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Wait for the work request to finish; returns the affected resource id
    pub async fn wait<F>(&self, fetcher: &F, work_request_id: &str) -> LifecycleResult<Option<String>>
    where
        F: WorkRequestFetcher + ?Sized,
    {
        let transition = StateTransition::new(
            [ACCEPTED, IN_PROGRESS, CANCELING],
            [SUCCEEDED, FAILED, CANCELED],
        )?;
        let mut conf = StateChangeConf::new(&transition, self.timeout);
        if let Some(interval) = self.poll_interval {
            conf = conf.with_poll_interval(interval);
        }

        let mut refresher = Refresher {
            fetcher,
            id: work_request_id,
            last: None,
        };
        let result = conf.wait_for_state(&mut refresher).await;
        let last = refresher.last.take();
        let status = result.map_err(|e| e.for_resource(work_request_id))?;

        let last = last.unwrap_or_else(|| WorkRequestStatus {
            id: work_request_id.to_string(),
            status: status.clone(),
            resource_id: None,
            errors: Vec::new(),
        });

        if status == SUCCEEDED {
            log::debug!("work request {} succeeded", work_request_id);
            return Ok(last.resource_id);
        }

        let message = (!last.errors.is_empty()).then(|| last.errors.join("; "));
        log::error!(
            "work request {} finished with status {}",
            work_request_id,
            status
        );
        Err(LifecycleError::WorkRequest {
            id: work_request_id.to_string(),
            status,
            message,
        })
    }
}

struct Refresher<'a, F: ?Sized> {
    fetcher: &'a F,
    id: &'a str,
    last: Option<WorkRequestStatus>,
}

#[async_trait]
impl<F> StateRefresher for Refresher<'_, F>
where
    F: WorkRequestFetcher + ?Sized,
{
    async fn refresh(&mut self) -> LifecycleResult<Option<String>> {
        let status = self.fetcher.fetch(self.id).await?;
        let label = status.status.clone();
        self.last = Some(status);
        Ok(Some(label))
    }
}
