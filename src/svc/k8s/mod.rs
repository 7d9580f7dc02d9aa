//! # Kubernetes module
//!
//! This module provide kubernetes helpers, the object store and remote
//! executor seams and the generic controller plumbing on top of
//! [`Controller<T>`]

use std::{error::Error, fmt::Debug, hash::Hash, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use kube::{
    runtime::{
        controller::{self, Action},
        watcher, Controller,
    },
    CustomResourceExt, Resource, ResourceExt,
};
#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;
#[cfg(feature = "metrics")]
use prometheus::{opts, register_counter_vec, CounterVec};
use serde::de::DeserializeOwned;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, trace};

use crate::svc::{
    cfg::Configuration,
    k8s::{
        exec::{PodExecutor, RemoteExecutor},
        store::ObjectStore,
    },
};

pub mod client;
pub mod exec;
pub mod finalizer;
pub mod pod;
pub mod recorder;
pub mod resource;
pub mod secret;
pub mod store;

// -----------------------------------------------------------------------------
// Constants

pub const RECONCILIATION_UPSERT_EVENT: &str = "upsert";
pub const RECONCILIATION_DELETE_EVENT: &str = "delete";

// -----------------------------------------------------------------------------
// Telemetry

#[cfg(feature = "metrics")]
static RECONCILIATION_SUCCESS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        opts!(
            "ords_operator_reconciliation_success",
            "number of successful reconciliation"
        ),
        &["kind"]
    )
    .expect("metrics 'ords_operator_reconciliation_success' to not be already registered")
});

#[cfg(feature = "metrics")]
static RECONCILIATION_FAILED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        opts!(
            "ords_operator_reconciliation_failed",
            "number of failed reconciliation"
        ),
        &["kind"]
    )
    .expect("metrics 'ords_operator_reconciliation_failed' to not be already registered")
});

#[cfg(feature = "metrics")]
static RECONCILIATION_EVENT: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        opts!(
            "ords_operator_reconciliation_event",
            "number of upsert or delete event",
        ),
        &["kind", "namespace", "event"]
    )
    .expect("metrics 'ords_operator_reconciliation_event' to not be already registered")
});

#[cfg(feature = "metrics")]
static RECONCILIATION_DURATION: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        opts!(
            "ords_operator_reconciliation_duration",
            "duration of reconciliation",
        ),
        &["kind", "unit"]
    )
    .expect("metrics 'ords_operator_reconciliation_duration' to not be already registered")
});

// -----------------------------------------------------------------------------
// Context structure

/// contains the collaborators given to each reconciliation
#[derive(Clone)]
pub struct Context {
    pub store: Arc<dyn ObjectStore>,
    pub executor: Arc<dyn RemoteExecutor>,
    pub config: Arc<Configuration>,
}

impl From<(kube::Client, Arc<Configuration>)> for Context {
    fn from((kube, config): (kube::Client, Arc<Configuration>)) -> Self {
        Self {
            store: Arc::new(kube.to_owned()),
            executor: Arc::new(PodExecutor::from(kube)),
            config,
        }
    }
}

impl Context {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        executor: Arc<dyn RemoteExecutor>,
        config: Arc<Configuration>,
    ) -> Self {
        Self {
            store,
            executor,
            config,
        }
    }
}

// -----------------------------------------------------------------------------
// ControllerBuilder trait

/// provides a common way to create a kubernetes
/// controller [`Controller<T>`]
pub trait ControllerBuilder<T>
where
    T: Resource + Clone + Debug,
    <T as Resource>::DynamicType: Eq + Hash,
{
    /// returns a new created kubernetes controller
    fn build(&self, kube: kube::Client, config: &Configuration) -> Controller<T>;
}

// -----------------------------------------------------------------------------
// Reconciler trait

/// provides two method which is given to a kubernetes controller
/// [`Controller<T>`]
#[async_trait]
pub trait Reconciler<T>
where
    T: ResourceExt + CustomResourceExt + Debug + Clone + Send + Sync + 'static,
{
    type Error: Error + Send + Sync + 'static;

    /// create or update the object, returns when the next reconciliation
    /// should happen
    async fn upsert(ctx: Arc<Context>, obj: Arc<T>) -> Result<Action, Self::Error>;

    /// clean up third parts of the object before kubernetes removes it
    async fn delete(ctx: Arc<Context>, obj: Arc<T>) -> Result<Action, Self::Error>;

    /// returns a [`Action`] to perform following the given error
    fn retry(obj: Arc<T>, err: &Self::Error, ctx: Arc<Context>) -> Action {
        let delay = ctx.config.requeue_delay();

        trace!(
            name = obj.name_any(),
            duration = delay.as_secs(),
            error = err.to_string(),
            "Requeue failed reconciliation",
        );

        Action::requeue(delay)
    }

    /// dispatch the object to [`Reconciler::upsert`] or [`Reconciler::delete`]
    /// whether it is marked for deletion.
    async fn reconcile(obj: Arc<T>, ctx: Arc<Context>) -> Result<Action, Self::Error> {
        let (namespace, name) = resource::namespaced_name(&*obj);
        let kind = T::api_resource().kind;

        if resource::deleted(&*obj) {
            info!(
                kind = &kind,
                namespace = &namespace,
                name = &name,
                "Received deletion event for custom resource",
            );

            #[cfg(feature = "metrics")]
            RECONCILIATION_EVENT
                .with_label_values(&[&kind, &namespace, RECONCILIATION_DELETE_EVENT])
                .inc();

            return Self::delete(ctx, obj.to_owned()).await.map_err(|err| {
                error!(
                    kind = &kind,
                    namespace = &namespace,
                    name = &name,
                    error = err.to_string(),
                    "Failed to delete custom resource",
                );

                err
            });
        }

        info!(
            kind = &kind,
            namespace = &namespace,
            name = &name,
            "Received upsertion event for custom resource",
        );

        #[cfg(feature = "metrics")]
        RECONCILIATION_EVENT
            .with_label_values(&[&kind, &namespace, RECONCILIATION_UPSERT_EVENT])
            .inc();

        Self::upsert(ctx, obj.to_owned()).await.map_err(|err| {
            error!(
                kind = &kind,
                namespace = &namespace,
                name = &name,
                error = err.to_string(),
                "Failed to upsert custom resource",
            );

            err
        })
    }
}

// -----------------------------------------------------------------------------
// WatcherError trait

/// group other trait needed to provide a default
/// implementation for [`Watcher<T>`] trait
pub trait WatcherError:
    From<kube::Error> + From<controller::Error<Self, watcher::Error>> + Error
where
    Self: 'static,
{
}

/// Blanket implementation of [`WatcherError`]
impl<T> WatcherError for T
where
    T: From<kube::Error> + From<controller::Error<Self, watcher::Error>> + Error,
    Self: 'static,
{
}

// -----------------------------------------------------------------------------
// Watcher trait

/// provides a watch method that listen to events of
/// kubernetes custom resource using a [`Controller<T>`]
#[async_trait]
pub trait Watcher<T>: ControllerBuilder<T> + Reconciler<T>
where
    T: DeserializeOwned + ResourceExt + CustomResourceExt + Clone + Debug + Send + Sync + 'static,
    <T as Resource>::DynamicType: Unpin + Eq + Hash + Clone + Debug + Send + Sync,
    Self: Send + Sync + 'static,
    <Self as Reconciler<T>>::Error: WatcherError + Send + Sync,
{
    type Error: WatcherError + Send + Sync;

    /// listen for events of the custom resource as generic parameter until
    /// the stream of events ends
    async fn watch(
        &self,
        kube: kube::Client,
        ctx: Arc<Context>,
    ) -> Result<(), <Self as Watcher<T>>::Error> {
        let kind = T::api_resource().kind;
        let mut stream = self
            .build(kube, &ctx.config)
            .run(Self::reconcile, Self::retry, ctx.to_owned())
            .boxed();

        loop {
            let instant = Instant::now();

            match stream.try_next().await {
                Ok(None) => {
                    debug!(
                        kind = &kind,
                        "We have reached the end of the infinite watch stream"
                    );
                    return Ok(());
                }
                Ok(Some((obj, _action))) => {
                    debug!(
                        kind = &kind,
                        namespace = &obj.namespace,
                        name = &obj.name,
                        "Successfully reconcile resource",
                    );

                    #[cfg(feature = "metrics")]
                    RECONCILIATION_SUCCESS.with_label_values(&[&kind]).inc();
                }
                Err(controller::Error::ObjectNotFound(obj_ref)) => {
                    debug!(
                        kind = &kind,
                        namespace = &obj_ref.namespace,
                        name = &obj_ref.name,
                        "Received an event about an already deleted resource",
                    );

                    #[cfg(feature = "metrics")]
                    RECONCILIATION_SUCCESS.with_label_values(&[&kind]).inc();
                }
                Err(err) => {
                    error!(
                        kind = &kind,
                        error = err.to_string(),
                        "Failed to reconcile resource",
                    );

                    #[cfg(feature = "metrics")]
                    RECONCILIATION_FAILED.with_label_values(&[&kind]).inc();
                }
            }

            #[cfg(feature = "metrics")]
            RECONCILIATION_DURATION
                .with_label_values(&[&kind, "us"])
                .inc_by(Instant::now().duration_since(instant).as_micros() as f64);

            sleep_until(instant + Duration::from_millis(100)).await;
        }
    }
}

/// Blanket implementation for [`Watcher<T>`]
impl<T, U> Watcher<T> for U
where
    T: DeserializeOwned + ResourceExt + CustomResourceExt + Clone + Debug + Send + Sync + 'static,
    <T as Resource>::DynamicType: Unpin + Eq + Hash + Clone + Debug + Send + Sync,
    U: Reconciler<T> + ControllerBuilder<T>,
    U::Error: WatcherError + Send + Sync,
    Self: Send + Sync + 'static,
{
    type Error = U::Error;
}
