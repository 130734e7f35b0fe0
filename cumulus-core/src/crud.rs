//! Lifecycle orchestrator
//!
//! Generic create / read / update / delete entry points driving any adapter
//! that implements the capability traits in [`crate::lifecycle`]. Each call is
//! strictly sequential: remote call, optional state poll, reconcile the
//! configuration store, optional extra wait.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;

use crate::error::{LifecycleError, LifecycleResult};
use crate::lifecycle::{
    Capabilities, FAILED, ResourceCreator, ResourceCrud, ResourceDeleter, ResourceUpdater,
    SUCCEEDED, StateTransition,
};
use crate::metrics::{OperationMetric, Outcome};
use crate::not_found::is_missing_resource;
use crate::poller::{StateChangeConf, StateRefresher, WaitError};
use crate::timeouts::Verb;

/// How a state wait ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A target label other than FAILED was observed
    Reached(String),
    /// The resource disappeared while waiting; its state has been voided
    Vanished,
}

/// Create the resource, wait for it to settle and record it
pub async fn create_resource<R>(sync: &mut R) -> LifecycleResult<()>
where
    R: ResourceCreator + ?Sized,
{
    let caps = sync.capabilities();
    let started = Instant::now();
    let result = {
        let _guard = lock(&caps).await;
        create_inner(sync, &caps).await
    };
    record(&caps, sync.type_name(), Verb::Create, &result, started);
    result
}

async fn create_inner<R>(sync: &mut R, caps: &Capabilities) -> LifecycleResult<()>
where
    R: ResourceCreator + ?Sized,
{
    sync.create().await?;

    if let Some(transition) = &caps.created {
        let timeout = sync.data().timeout(Verb::Create);
        match wait_for_state_refresh(sync, timeout, Verb::Create, transition, caps.poll_interval)
            .await
        {
            Ok(WaitOutcome::Reached(_)) => {}
            Ok(WaitOutcome::Vanished) => return Ok(()),
            Err(e) => {
                if sync.state().as_deref() == Some(FAILED) {
                    // Recreated on the next apply
                    sync.void_state();
                } else {
                    adopt_id(sync);
                }
                // Keep whatever was created tracked, even though waiting failed
                if let Err(set_err) = sync.set_data() {
                    log::error!(
                        "error setting data for {} after waiting for creation failed: {}",
                        sync.type_name(),
                        set_err
                    );
                }
                return Err(e);
            }
        }
    }

    adopt_id(sync);
    sync.set_data()?;

    if let Some(wait) = caps.extra_wait_post_create_delete {
        log::info!(
            "{} created, waiting an extra {}s for propagation",
            sync.type_name(),
            wait.as_secs()
        );
        tokio::time::sleep(wait).await;
    }
    Ok(())
}

/// Refresh the configuration store from the remote resource
///
/// A resource that is gone, or that reports one of its deleted labels, is
/// voided without error so the caller can recreate it.
pub async fn read_resource<R>(sync: &mut R) -> LifecycleResult<()>
where
    R: ResourceCrud + ?Sized,
{
    let caps = sync.capabilities();
    let started = Instant::now();
    let result = {
        let _guard = lock(&caps).await;
        read_inner(sync, &caps).await
    };
    record(&caps, sync.type_name(), Verb::Read, &result, started);
    result
}

async fn read_inner<R>(sync: &mut R, caps: &Capabilities) -> LifecycleResult<()>
where
    R: ResourceCrud + ?Sized,
{
    if let Err(e) = sync.get().await {
        if is_missing_resource(&e) {
            log::warn!(
                "{} {} no longer exists, removing it from state",
                sync.type_name(),
                sync.data().id()
            );
            sync.void_state();
            return Ok(());
        }
        return Err(e);
    }

    sync.set_data()?;

    let Some(deleted) = &caps.deleted else {
        return Ok(());
    };
    if let Some(state) = sync.state() {
        if state != SUCCEEDED && deleted.is_target(&state) {
            log::info!(
                "{} {} is {}, removing it from state",
                sync.type_name(),
                sync.data().id(),
                state
            );
            sync.void_state();
        }
    }
    Ok(())
}

/// Apply configuration changes to an existing resource
pub async fn update_resource<R>(sync: &mut R) -> LifecycleResult<()>
where
    R: ResourceUpdater + ?Sized,
{
    let caps = sync.capabilities();
    let started = Instant::now();
    let result = {
        let _guard = lock(&caps).await;
        update_inner(sync, &caps).await
    };
    record(&caps, sync.type_name(), Verb::Update, &result, started);
    result
}

async fn update_inner<R>(sync: &mut R, caps: &Capabilities) -> LifecycleResult<()>
where
    R: ResourceUpdater + ?Sized,
{
    sync.update().await?;

    if let Some(transition) = &caps.updated {
        let timeout = sync.data().timeout(Verb::Update);
        let outcome =
            wait_for_state_refresh(sync, timeout, Verb::Update, transition, caps.poll_interval)
                .await?;
        if outcome == WaitOutcome::Vanished {
            return Ok(());
        }
    }

    adopt_id(sync);
    sync.set_data()
}

/// Delete the resource and wait until it is gone
pub async fn delete_resource<R>(sync: &mut R) -> LifecycleResult<()>
where
    R: ResourceDeleter + ?Sized,
{
    let caps = sync.capabilities();
    let started = Instant::now();
    let result = {
        let _guard = lock(&caps).await;
        delete_inner(sync, &caps).await
    };
    record(&caps, sync.type_name(), Verb::Delete, &result, started);
    result
}

async fn delete_inner<R>(sync: &mut R, caps: &Capabilities) -> LifecycleResult<()>
where
    R: ResourceDeleter + ?Sized,
{
    if let Err(e) = sync.delete().await {
        if is_missing_resource(&e) {
            log::warn!(
                "{} {} was already deleted",
                sync.type_name(),
                sync.data().id()
            );
            sync.void_state();
            return Ok(());
        }
        return Err(e);
    }

    if let Some(transition) = &caps.deleted {
        let timeout = sync.data().timeout(Verb::Delete);
        wait_for_state_refresh(sync, timeout, Verb::Delete, transition, caps.poll_interval)
            .await?;
    }

    if let Some(wait) = caps.post_delete_wait() {
        log::info!(
            "{} deleted, waiting an extra {}s for propagation",
            sync.type_name(),
            wait.as_secs()
        );
        tokio::time::sleep(wait).await;
    }

    sync.void_state();
    Ok(())
}

/// Wait for the created transition outside of [`create_resource`]
pub async fn wait_for_created_state<R>(sync: &mut R) -> LifecycleResult<WaitOutcome>
where
    R: ResourceCrud + ?Sized,
{
    wait_for_declared(sync, Verb::Create).await
}

/// Wait for the updated transition outside of [`update_resource`]
pub async fn wait_for_updated_state<R>(sync: &mut R) -> LifecycleResult<WaitOutcome>
where
    R: ResourceCrud + ?Sized,
{
    wait_for_declared(sync, Verb::Update).await
}

async fn wait_for_declared<R>(sync: &mut R, verb: Verb) -> LifecycleResult<WaitOutcome>
where
    R: ResourceCrud + ?Sized,
{
    let caps = sync.capabilities();
    let transition = match verb {
        Verb::Create => caps.created.as_ref(),
        Verb::Update => caps.updated.as_ref(),
        Verb::Delete => caps.deleted.as_ref(),
        Verb::Read => None,
    };
    match transition {
        Some(t) => {
            let timeout = sync.data().timeout(verb);
            wait_for_state_refresh(sync, timeout, verb, t, caps.poll_interval).await
        }
        None => Ok(WaitOutcome::Reached(sync.state().unwrap_or_default())),
    }
}

struct Refresh<'a, R: ?Sized>(&'a mut R);

#[async_trait]
impl<R> StateRefresher for Refresh<'_, R>
where
    R: ResourceCrud + ?Sized,
{
    async fn refresh(&mut self) -> LifecycleResult<Option<String>> {
        self.0.get().await?;
        Ok(Some(self.0.state().unwrap_or_default()))
    }
}

/// Poll `sync` from the transition's pending labels to its target labels
///
/// A missing-resource error while refreshing voids the state and counts as
/// success. Reaching FAILED is an error even though it stops the poll.
pub async fn wait_for_state_refresh<R>(
    sync: &mut R,
    timeout: Duration,
    verb: Verb,
    transition: &StateTransition,
    poll_interval: Option<Duration>,
) -> LifecycleResult<WaitOutcome>
where
    R: ResourceCrud + ?Sized,
{
    let identifier = sync.id().unwrap_or_default();
    let mut conf = StateChangeConf::new(transition, timeout);
    if let Some(interval) = poll_interval {
        conf = conf.with_poll_interval(interval);
    }

    log::debug!(
        "waiting for {} of {} {} to reach [{}]",
        verb.operation_name(),
        sync.type_name(),
        identifier,
        transition.target().join(", ")
    );

    let result = conf.wait_for_state(&mut Refresh(&mut *sync)).await;
    match result {
        Ok(state) if state == FAILED => Err(LifecycleError::Failed {
            identifier: sync.id().unwrap_or(identifier),
            verb,
            message: sync.failure_message(),
        }),
        Ok(state) => Ok(WaitOutcome::Reached(state)),
        Err(WaitError::Refresh(e)) if is_missing_resource(&e) => {
            log::warn!(
                "{} {} disappeared during {}, voiding it",
                sync.type_name(),
                identifier,
                verb.operation_name()
            );
            sync.void_state();
            Ok(WaitOutcome::Vanished)
        }
        Err(e) => Err(e.for_resource(&sync.id().unwrap_or(identifier))),
    }
}

struct Condition<'a, R: ?Sized, F> {
    sync: &'a mut R,
    condition: F,
}

#[async_trait]
impl<R, F> StateRefresher for Condition<'_, R, F>
where
    R: ResourceCrud + ?Sized,
    F: Fn(&R) -> bool + Send,
{
    async fn refresh(&mut self) -> LifecycleResult<Option<String>> {
        self.sync.get().await?;
        Ok(Some((self.condition)(&*self.sync).to_string()))
    }
}

/// Re-fetch `sync` until `condition` holds, for APIs without lifecycle labels
pub async fn wait_for_resource_condition<R, F>(
    sync: &mut R,
    condition: F,
    timeout: Duration,
) -> LifecycleResult<()>
where
    R: ResourceCrud + ?Sized,
    F: Fn(&R) -> bool + Send,
{
    if condition(&*sync) {
        return Ok(());
    }
    let identifier = sync.id().unwrap_or_default();
    let transition = StateTransition::new(["false"], ["true"])?;
    let mut refresher = Condition {
        sync: &mut *sync,
        condition,
    };
    StateChangeConf::new(&transition, timeout)
        .wait_for_state(&mut refresher)
        .await
        .map(|_| ())
        .map_err(|e| e.for_resource(&identifier))
}

fn adopt_id<R: ResourceCrud + ?Sized>(sync: &mut R) {
    if let Some(id) = sync.id() {
        sync.data_mut().set_id(id);
    }
}

async fn lock(caps: &Capabilities) -> Option<OwnedMutexGuard<()>> {
    match &caps.mutex {
        Some(mutex) => Some(mutex.clone().lock_owned().await),
        None => None,
    }
}

fn record<T>(
    caps: &Capabilities,
    type_name: &str,
    verb: Verb,
    result: &LifecycleResult<T>,
    started: Instant,
) {
    let metric = OperationMetric {
        type_name: type_name.to_string(),
        verb,
        outcome: if result.is_ok() {
            Outcome::Success
        } else {
            Outcome::Failure
        },
        elapsed: started.elapsed(),
    };
    log::debug!(
        "{} {} finished with {} in {}ms",
        metric.type_name,
        metric.verb,
        metric.outcome.as_str(),
        metric.elapsed.as_millis()
    );
    if let Some(sink) = &caps.metrics {
        sink.record(&metric);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::metrics::InMemoryMetrics;
    use crate::resource::ResourceData;
    use crate::timeouts::ResourceTimeouts;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex as StdMutex};

    /// Scripted adapter counting every call the orchestrator makes
    struct FakeResource {
        data: ResourceData,
        remote_id: String,
        gets: VecDeque<LifecycleResult<String>>,
        current: Option<String>,
        caps: Capabilities,
        create_error: Option<LifecycleError>,
        delete_error: Option<LifecycleError>,
        get_calls: u32,
        set_data_calls: u32,
        void_calls: u32,
        /// (start, end) of every remote mutating call, shared between instances
        intervals: Arc<StdMutex<Vec<(Instant, Instant)>>>,
        remote_latency: Duration,
    }

    impl FakeResource {
        fn new(caps: Capabilities) -> Self {
            Self {
                data: ResourceData::new("fake_resource")
                    .with_timeouts(ResourceTimeouts::uniform(Duration::from_secs(300))),
                remote_id: "ocid1.fake.sim..0001".to_string(),
                gets: VecDeque::new(),
                current: None,
                caps,
                create_error: None,
                delete_error: None,
                get_calls: 0,
                set_data_calls: 0,
                void_calls: 0,
                intervals: Arc::new(StdMutex::new(Vec::new())),
                remote_latency: Duration::ZERO,
            }
        }

        fn with_gets(mut self, states: &[&str]) -> Self {
            self.gets = states.iter().map(|s| Ok(s.to_string())).collect();
            self
        }

        async fn remote_call(&mut self) {
            let start = Instant::now();
            if !self.remote_latency.is_zero() {
                tokio::time::sleep(self.remote_latency).await;
            }
            self.intervals.lock().unwrap().push((start, Instant::now()));
        }
    }

    #[async_trait]
    impl ResourceCrud for FakeResource {
        fn type_name(&self) -> &'static str {
            "fake_resource"
        }

        fn data(&self) -> &ResourceData {
            &self.data
        }

        fn data_mut(&mut self) -> &mut ResourceData {
            &mut self.data
        }

        fn id(&self) -> Option<String> {
            Some(self.remote_id.clone())
        }

        async fn get(&mut self) -> LifecycleResult<()> {
            self.get_calls += 1;
            match self.gets.pop_front() {
                Some(Ok(state)) => {
                    self.current = Some(state);
                    Ok(())
                }
                Some(Err(e)) => Err(e),
                // Keep reporting the last state
                None => Ok(()),
            }
        }

        fn set_data(&mut self) -> LifecycleResult<()> {
            self.set_data_calls += 1;
            if let Some(state) = self.current.clone() {
                self.data.set("state", state);
            }
            Ok(())
        }

        fn void_state(&mut self) {
            self.void_calls += 1;
            self.data.void();
        }

        fn state(&self) -> Option<String> {
            self.current.clone()
        }

        fn failure_message(&self) -> Option<String> {
            Some("out of capacity".to_string())
        }

        fn capabilities(&self) -> Capabilities {
            self.caps.clone()
        }
    }

    #[async_trait]
    impl ResourceCreator for FakeResource {
        async fn create(&mut self) -> LifecycleResult<()> {
            self.remote_call().await;
            match self.create_error.take() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl ResourceUpdater for FakeResource {
        async fn update(&mut self) -> LifecycleResult<()> {
            self.remote_call().await;
            Ok(())
        }
    }

    #[async_trait]
    impl ResourceDeleter for FakeResource {
        async fn delete(&mut self) -> LifecycleResult<()> {
            self.remote_call().await;
            match self.delete_error.take() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
    }

    fn provisioning_caps() -> Capabilities {
        Capabilities::new()
            .created(StateTransition::new(["PROVISIONING"], ["ACTIVE", "FAILED"]).unwrap())
            .updated(StateTransition::new(["UPDATING"], ["ACTIVE"]).unwrap())
            .deleted(StateTransition::new(["DELETING"], ["DELETED"]).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn create_polls_until_active() {
        let mut fake = FakeResource::new(provisioning_caps()).with_gets(&[
            "PROVISIONING",
            "PROVISIONING",
            "ACTIVE",
        ]);

        create_resource(&mut fake).await.unwrap();

        assert_eq!(fake.get_calls, 3);
        assert_eq!(fake.set_data_calls, 1);
        assert_eq!(fake.void_calls, 0);
        assert_eq!(fake.data.id(), "ocid1.fake.sim..0001");
        assert_eq!(fake.data.get_str("state"), Some("ACTIVE"));
    }

    #[tokio::test(start_paused = true)]
    async fn create_failed_state_voids_and_errors() {
        let mut fake = FakeResource::new(provisioning_caps()).with_gets(&[
            "PROVISIONING",
            "PROVISIONING",
            "FAILED",
        ]);

        let err = create_resource(&mut fake).await.unwrap_err();

        assert!(matches!(err, LifecycleError::Failed { verb: Verb::Create, .. }));
        assert!(err.to_string().contains("out of capacity"));
        assert_eq!(fake.void_calls, 1);
        assert_eq!(fake.set_data_calls, 1);
        assert!(!fake.data.has_id());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_resource_during_poll_voids_and_succeeds() {
        let errors = [
            LifecycleError::data("Vcn ocid1.fake does not exist"),
            LifecycleError::data("resource not found"),
            LifecycleError::data("request failed, status code: 404"),
            LifecycleError::Service(ServiceError::not_found("gone")),
        ];

        for error in errors {
            let mut fake = FakeResource::new(provisioning_caps());
            fake.gets = VecDeque::from(vec![Ok("PROVISIONING".to_string()), Err(error)]);

            create_resource(&mut fake).await.unwrap();

            assert_eq!(fake.void_calls, 1);
            assert!(!fake.data.has_id());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_state_refresh_vanished_outcome() {
        let mut fake = FakeResource::new(Capabilities::new());
        fake.gets = VecDeque::from(vec![Err(LifecycleError::data("Vcn does not exist"))]);
        let transition = StateTransition::new(["DELETING"], ["DELETED"]).unwrap();

        let outcome = wait_for_state_refresh(
            &mut fake,
            Duration::from_secs(60),
            Verb::Delete,
            &transition,
            None,
        )
        .await
        .unwrap();

        assert_eq!(outcome, WaitOutcome::Vanished);
        assert_eq!(fake.void_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn create_timeout_names_the_resource_and_keeps_it_tracked() {
        let mut fake = FakeResource::new(provisioning_caps()).with_gets(&["PROVISIONING"]);
        fake.data = fake
            .data
            .clone()
            .with_timeouts(ResourceTimeouts::uniform(Duration::from_secs(30)));

        let err = create_resource(&mut fake).await.unwrap_err();

        assert!(err.is_timeout());
        assert!(err.to_string().contains("ocid1.fake.sim..0001"));
        assert_eq!(fake.void_calls, 0);
        assert_eq!(fake.set_data_calls, 1);
        assert_eq!(fake.data.id(), "ocid1.fake.sim..0001");
    }

    #[tokio::test(start_paused = true)]
    async fn create_error_propagates_without_polling() {
        let mut fake = FakeResource::new(provisioning_caps());
        fake.create_error = Some(ServiceError::invalid_parameter("bad cidr").into());

        let err = create_resource(&mut fake).await.unwrap_err();

        assert_eq!(err.service_error().map(|e| e.status_code), Some(400));
        assert_eq!(fake.get_calls, 0);
        assert_eq!(fake.set_data_calls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn create_without_transition_skips_polling() {
        let mut fake = FakeResource::new(Capabilities::new());

        create_resource(&mut fake).await.unwrap();

        assert_eq!(fake.get_calls, 0);
        assert_eq!(fake.set_data_calls, 1);
        assert!(fake.data.has_id());
    }

    #[tokio::test(start_paused = true)]
    async fn create_sleeps_extra_wait() {
        let caps = provisioning_caps().extra_wait_post_create_delete(Duration::from_secs(120));
        let mut fake = FakeResource::new(caps).with_gets(&["ACTIVE"]);

        let started = Instant::now();
        create_resource(&mut fake).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn read_voids_deleted_resource() {
        let mut fake = FakeResource::new(provisioning_caps()).with_gets(&["DELETED"]);
        fake.data.set_id("ocid1.fake.sim..0001");

        read_resource(&mut fake).await.unwrap();

        assert_eq!(fake.set_data_calls, 1);
        assert_eq!(fake.void_calls, 1);
        assert!(!fake.data.has_id());
    }

    #[tokio::test(start_paused = true)]
    async fn read_does_not_void_succeeded_work_request() {
        let caps = Capabilities::new()
            .deleted(StateTransition::new(["IN_PROGRESS"], ["SUCCEEDED", "FAILED"]).unwrap());
        let mut fake = FakeResource::new(caps).with_gets(&["SUCCEEDED"]);
        fake.data.set_id("ocid1.fake.sim..0001");

        read_resource(&mut fake).await.unwrap();

        assert_eq!(fake.void_calls, 0);
        assert!(fake.data.has_id());
    }

    #[tokio::test(start_paused = true)]
    async fn read_missing_resource_voids_without_error() {
        let mut fake = FakeResource::new(provisioning_caps());
        fake.gets = VecDeque::from(vec![Err(ServiceError::not_found("gone").into())]);
        fake.data.set_id("ocid1.fake.sim..0001");

        read_resource(&mut fake).await.unwrap();

        assert_eq!(fake.void_calls, 1);
        assert_eq!(fake.set_data_calls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn read_propagates_other_errors() {
        let mut fake = FakeResource::new(provisioning_caps());
        fake.gets = VecDeque::from(vec![Err(ServiceError::conflict("busy").into())]);

        assert!(read_resource(&mut fake).await.is_err());
        assert_eq!(fake.void_calls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn update_waits_for_updated_target() {
        let mut fake = FakeResource::new(provisioning_caps()).with_gets(&["UPDATING", "ACTIVE"]);

        update_resource(&mut fake).await.unwrap();

        assert_eq!(fake.get_calls, 2);
        assert_eq!(fake.set_data_calls, 1);
        assert_eq!(fake.data.get_str("state"), Some("ACTIVE"));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_waits_then_voids() {
        let caps = provisioning_caps().extra_wait_post_delete(Duration::from_secs(10));
        let mut fake = FakeResource::new(caps).with_gets(&["DELETING", "DELETED"]);
        fake.data.set_id("ocid1.fake.sim..0001");

        let started = Instant::now();
        delete_resource(&mut fake).await.unwrap();

        assert_eq!(fake.get_calls, 2);
        assert_eq!(fake.void_calls, 1);
        assert!(!fake.data.has_id());
        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_of_missing_resource_succeeds() {
        let mut fake = FakeResource::new(provisioning_caps());
        fake.delete_error = Some(ServiceError::not_found("gone").into());
        fake.data.set_id("ocid1.fake.sim..0001");

        delete_resource(&mut fake).await.unwrap();

        assert_eq!(fake.void_calls, 1);
        assert_eq!(fake.get_calls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_conflict_is_returned() {
        let mut fake = FakeResource::new(provisioning_caps());
        fake.delete_error = Some(ServiceError::conflict("busy").into());
        fake.data.set_id("ocid1.fake.sim..0001");

        assert!(delete_resource(&mut fake).await.is_err());
        assert_eq!(fake.void_calls, 0);
        assert!(fake.data.has_id());
    }

    #[tokio::test(start_paused = true)]
    async fn mutex_serializes_remote_calls() {
        let mutex = Arc::new(tokio::sync::Mutex::new(()));
        let intervals = Arc::new(StdMutex::new(Vec::new()));

        let make = || {
            let mut fake = FakeResource::new(Capabilities::new().mutex(mutex.clone()));
            fake.intervals = intervals.clone();
            fake.remote_latency = Duration::from_millis(50);
            fake
        };
        let (mut a, mut b) = (make(), make());

        let (ra, rb) = tokio::join!(create_resource(&mut a), delete_resource(&mut b));
        ra.unwrap();
        rb.unwrap();

        let recorded = intervals.lock().unwrap().clone();
        assert_eq!(recorded.len(), 2);
        let (first, second) = if recorded[0].0 <= recorded[1].0 {
            (recorded[0], recorded[1])
        } else {
            (recorded[1], recorded[0])
        };
        assert!(first.1 <= second.0, "remote calls overlapped: {recorded:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn without_mutex_remote_calls_overlap() {
        let intervals = Arc::new(StdMutex::new(Vec::new()));
        let make = || {
            let mut fake = FakeResource::new(Capabilities::new());
            fake.intervals = intervals.clone();
            fake.remote_latency = Duration::from_millis(50);
            fake
        };
        let (mut a, mut b) = (make(), make());

        let (ra, rb) = tokio::join!(create_resource(&mut a), create_resource(&mut b));
        ra.unwrap();
        rb.unwrap();

        let recorded = intervals.lock().unwrap().clone();
        assert_eq!(recorded[0].0, recorded[1].0);
    }

    #[tokio::test(start_paused = true)]
    async fn metrics_are_recorded_per_verb() {
        let sink = Arc::new(InMemoryMetrics::new());
        let caps = provisioning_caps().metrics(sink.clone());
        let mut fake = FakeResource::new(caps).with_gets(&["ACTIVE"]);

        create_resource(&mut fake).await.unwrap();
        fake.create_error = Some(ServiceError::conflict("busy").into());
        let _ = create_resource(&mut fake).await;

        let counts = sink.counts();
        let key = |outcome| ("fake_resource".to_string(), Verb::Create, outcome);
        assert_eq!(counts.get(&key(Outcome::Success)), Some(&1));
        assert_eq!(counts.get(&key(Outcome::Failure)), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_condition_refetches_until_true() {
        let mut fake = FakeResource::new(Capabilities::new()).with_gets(&["a", "b", "ready"]);

        wait_for_resource_condition(
            &mut fake,
            |r: &FakeResource| r.current.as_deref() == Some("ready"),
            Duration::from_secs(60),
        )
        .await
        .unwrap();

        assert_eq!(fake.get_calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_condition_times_out() {
        let mut fake = FakeResource::new(Capabilities::new()).with_gets(&["never"]);

        let err = wait_for_resource_condition(
            &mut fake,
            |r: &FakeResource| r.current.as_deref() == Some("ready"),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();

        assert!(err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_created_state_without_transition_reports_current() {
        let mut fake = FakeResource::new(Capabilities::new());
        fake.current = Some("ACTIVE".to_string());

        let outcome = wait_for_created_state(&mut fake).await.unwrap();
        assert_eq!(outcome, WaitOutcome::Reached("ACTIVE".to_string()));
        assert_eq!(fake.get_calls, 0);
    }
}
