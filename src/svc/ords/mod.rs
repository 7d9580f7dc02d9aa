//! # Oracle rest data service reconciler
//!
//! This module drives an [`OracleRestDataService`] toward its desired state.
//! A reconciliation is a [`Pass`] running a fixed sequence of phases, each
//! phase either lets the pass continue or stops it with a [`Stop`] telling
//! whether and when the next pass should happen. The status of the instance
//! and of its database are persisted on every exit path.

use std::{
    fmt::{self, Display, Formatter},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    runtime::{
        controller::{self, Action},
        watcher, Controller,
    },
    Api, ResourceExt,
};
use tracing::{debug, info, warn};

use crate::svc::{
    cfg::Configuration,
    crd::{
        database::{SingleInstanceDatabase, StatusPatch},
        rest_data_service::{OracleRestDataService, Password, State, Status, FINALIZER},
    },
    k8s::{
        self,
        exec::{self, Output},
        finalizer, recorder, resource, secret, Context, ControllerBuilder,
    },
};

pub mod apex;
pub mod converge;
pub mod database;
pub mod probe;
pub mod schema;
pub mod sql;
pub mod teardown;
pub mod template;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

// -----------------------------------------------------------------------------
// Reason enumeration

/// reasons of the events recorded against an instance
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug)]
pub enum Reason {
    Waiting,
    SpecError,
    SecretNotFound,
    LogonDenied,
    InstallingApex,
    InstalledApex,
    SchemaSkipped,
    NoReadyPod,
    UpsertFinalizer,
    DeleteFinalizer,
}

impl Display for Reason {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "Waiting"),
            Self::SpecError => write!(f, "SpecError"),
            Self::SecretNotFound => write!(f, "SecretNotFound"),
            Self::LogonDenied => write!(f, "LogonDenied"),
            Self::InstallingApex => write!(f, "InstallingApex"),
            Self::InstalledApex => write!(f, "InstalledApex"),
            Self::SchemaSkipped => write!(f, "SchemaSkipped"),
            Self::NoReadyPod => write!(f, "NoReadyPod"),
            Self::UpsertFinalizer => write!(f, "UpsertFinalizer"),
            Self::DeleteFinalizer => write!(f, "DeleteFinalizer"),
        }
    }
}

// -----------------------------------------------------------------------------
// ReconcilerError enum

#[derive(thiserror::Error, Debug)]
pub enum ReconcilerError {
    #[error("failed to reconcile resource, {0}")]
    Reconcile(String),
    #[error("failed to execute request on kubernetes api, {0}")]
    KubeClient(kube::Error),
    #[error("failed to execute command, {0}")]
    Exec(exec::Error),
    #[error("failed to clean up rest data service from pod '{0}', {1}")]
    Cleanup(String, String),
}

impl From<kube::Error> for ReconcilerError {
    fn from(err: kube::Error) -> Self {
        Self::KubeClient(err)
    }
}

impl From<exec::Error> for ReconcilerError {
    fn from(err: exec::Error) -> Self {
        Self::Exec(err)
    }
}

impl From<controller::Error<Self, watcher::Error>> for ReconcilerError {
    fn from(err: controller::Error<ReconcilerError, watcher::Error>) -> Self {
        Self::Reconcile(err.to_string())
    }
}

// -----------------------------------------------------------------------------
// Stop enumeration

/// reason why a pass ends before running every phase
#[derive(Debug)]
pub enum Stop {
    /// run another pass after the configured delay
    Requeue,
    /// wait for the next change of the watched objects
    Halt,
    /// the error is logged and the pass is retried after the configured delay
    Failed(ReconcilerError),
}

impl From<ReconcilerError> for Stop {
    fn from(err: ReconcilerError) -> Self {
        Self::Failed(err)
    }
}

impl From<kube::Error> for Stop {
    fn from(err: kube::Error) -> Self {
        Self::Failed(ReconcilerError::from(err))
    }
}

impl From<exec::Error> for Stop {
    fn from(err: exec::Error) -> Self {
        Self::Failed(ReconcilerError::from(err))
    }
}

/// outcome of a phase, `Ok` lets the pass continue
pub type Step = Result<(), Stop>;

/// returns the action given back to the controller for the outcome of a pass
pub fn action(step: Step, delay: Duration) -> Result<Action, ReconcilerError> {
    match step {
        Ok(()) | Err(Stop::Halt) => Ok(Action::await_change()),
        Err(Stop::Requeue) => Ok(Action::requeue(delay)),
        Err(Stop::Failed(err)) => Err(err),
    }
}

// -----------------------------------------------------------------------------
// Pass structure

/// a single reconciliation of an instance and the state gathered by its
/// phases
pub struct Pass<'a> {
    pub(crate) ctx: &'a Context,
    pub(crate) namespace: String,
    pub(crate) name: String,
    pub(crate) instance: OracleRestDataService,
    pub(crate) database: SingleInstanceDatabase,
    /// ready pod of the database, known once the database is ready
    pub(crate) database_pod: Option<String>,
    /// ready pod of the instance, known once the health probe succeeded
    pub(crate) ords_pod: Option<String>,
    persisted: Option<Status>,
    database_persisted: StatusPatch,
}

impl<'a> Pass<'a> {
    /// fetch the instance and its database, a missing object records a wait
    /// event against the given cached object and requests a delayed pass
    pub async fn load(ctx: &'a Context, obj: &OracleRestDataService) -> Result<Pass<'a>, Stop> {
        let (namespace, name) = resource::namespaced_name(obj);

        let instance = match ctx.store.get_instance(&namespace, &name).await? {
            Some(instance) => instance,
            None => {
                debug!(
                    namespace = &namespace,
                    name = &name,
                    "Custom resource is not found, it may have been deleted",
                );

                let message = format!("waiting for {} to be available", name);
                recorder::normal(&*ctx.store, obj, &Reason::Waiting, &message).await;
                return Err(Stop::Requeue);
            }
        };

        let database_ref = &instance.spec.database_ref;
        let database = match ctx.store.get_database(&namespace, database_ref).await? {
            Some(database) => database,
            None => {
                info!(
                    namespace = &namespace,
                    name = &name,
                    database = database_ref,
                    "Database referenced by custom resource is not found",
                );

                let message = format!("waiting for database {}", database_ref);
                recorder::normal(&*ctx.store, &instance, &Reason::Waiting, &message).await;
                return Err(Stop::Requeue);
            }
        };

        Ok(Self {
            ctx,
            namespace,
            name,
            persisted: instance.status.to_owned(),
            database_persisted: database.status_patch(),
            instance,
            database,
            database_pod: None,
            ords_pod: None,
        })
    }

    pub fn config(&self) -> &Configuration {
        &self.ctx.config
    }

    pub fn set_state(&mut self, state: State) {
        self.instance.set_state(state);
    }

    /// record an event against the instance, see [`recorder::record`]
    pub async fn event(&self, level: recorder::Level, reason: Reason, message: &str) {
        recorder::record(&*self.ctx.store, &self.instance, level, &reason, message).await
    }

    /// returns the password stored in the secret referenced by the given
    /// credential, none if the secret does not exist
    pub async fn password(&self, password: &Password) -> Result<Option<String>, kube::Error> {
        let found = self
            .ctx
            .store
            .get_secret(&self.namespace, &password.secret_name)
            .await?;

        Ok(found.map(|s| secret::value(&s, &password.secret_key).unwrap_or_default()))
    }

    /// run the given sql script with sqlplus in the given pod
    pub async fn sql(&self, pod: &str, script: &str) -> Result<Output, exec::Error> {
        self.shell(pod, &sql::sqlplus(script)).await
    }

    /// run the given shell script in the given pod
    pub async fn shell(&self, pod: &str, script: &str) -> Result<Output, exec::Error> {
        let output = self
            .ctx
            .executor
            .exec(&self.namespace, pod, None, exec::bash(script))
            .await?;

        debug!(
            namespace = &self.namespace,
            pod = pod,
            output = output.combined(),
            "Command executed in pod",
        );

        Ok(output)
    }

    /// add the finalizer on the instance if it is missing
    pub async fn ensure_finalizer(&mut self) -> Step {
        if finalizer::contains(&self.instance, FINALIZER) {
            return Ok(());
        }

        info!(
            namespace = &self.namespace,
            name = &self.name,
            "Set finalizer on custom resource",
        );

        let modified = finalizer::add(self.instance.to_owned(), FINALIZER);
        let patched = self
            .ctx
            .store
            .patch_instance(&self.instance, &modified)
            .await?;

        // keep the in-memory status, only the metadata is patched here
        self.instance.metadata = patched.metadata;

        let message = format!("Create finalizer '{}'", FINALIZER);
        self.event(recorder::Level::Normal, Reason::UpsertFinalizer, &message)
            .await;

        Ok(())
    }

    /// run every phase in order
    pub async fn converge(&mut self) -> Step {
        self.ensure_finalizer().await?;
        self.validate().await?;
        self.ensure_service().await?;
        self.ensure_claim().await?;
        self.database_ready().await?;
        self.ensure_pods().await?;
        self.probe().await?;
        self.enable_schemas().await?;
        self.configure_apex().await?;
        self.delete_secrets().await;

        if self.instance.status().service_ip.is_empty() {
            debug!(
                namespace = &self.namespace,
                name = &self.name,
                "Service address is not known yet, requeue",
            );

            return Err(Stop::Requeue);
        }

        Ok(())
    }

    /// write the status of the instance and of the database when they
    /// changed, failures are logged and swallowed
    pub async fn persist(&mut self) {
        if self.instance.status != self.persisted {
            let status = self.instance.status();
            match self
                .ctx
                .store
                .patch_instance_status(&self.namespace, &self.name, &status)
                .await
            {
                Ok(()) => self.persisted = Some(status),
                Err(err) => warn!(
                    namespace = &self.namespace,
                    name = &self.name,
                    error = err.to_string(),
                    "Could not update status of custom resource",
                ),
            }
        }

        let patch = self.database.status_patch();
        if patch != self.database_persisted {
            let database = self.database.name_any();
            match self
                .ctx
                .store
                .patch_database_status(&self.namespace, &database, &patch)
                .await
            {
                Ok(()) => self.database_persisted = patch,
                Err(err) => warn!(
                    namespace = &self.namespace,
                    database = &database,
                    error = err.to_string(),
                    "Could not update status of database",
                ),
            }
        }
    }

    /// delete the credential secrets the user asked not to keep
    pub async fn delete_secrets(&self) {
        let spec = &self.instance.spec;

        for password in [&spec.admin_password, &spec.ords_password, &spec.apex_password] {
            if password.keep_secret || password.secret_name.is_empty() {
                continue;
            }

            let found = self
                .ctx
                .store
                .get_secret(&self.namespace, &password.secret_name)
                .await;

            if let Ok(Some(_)) = found {
                match self
                    .ctx
                    .store
                    .delete_secret(&self.namespace, &password.secret_name)
                    .await
                {
                    Ok(()) => info!(
                        namespace = &self.namespace,
                        secret = &password.secret_name,
                        "Deleted credential secret",
                    ),
                    Err(err) => debug!(
                        namespace = &self.namespace,
                        secret = &password.secret_name,
                        error = err.to_string(),
                        "Could not delete credential secret",
                    ),
                }
            }
        }
    }
}

// -----------------------------------------------------------------------------
// Reconciler structure

#[derive(Clone, Default, Debug)]
pub struct Reconciler {}

impl ControllerBuilder<OracleRestDataService> for Reconciler {
    fn build(&self, kube: kube::Client, config: &Configuration) -> Controller<OracleRestDataService> {
        Controller::new(Api::all(kube.to_owned()), watcher::Config::default())
            .owns(Api::<Pod>::all(kube), watcher::Config::default())
            .with_config(controller::Config::default().concurrency(config.operator.concurrency))
    }
}

#[async_trait]
impl k8s::Reconciler<OracleRestDataService> for Reconciler {
    type Error = ReconcilerError;

    async fn upsert(
        ctx: Arc<Context>,
        origin: Arc<OracleRestDataService>,
    ) -> Result<Action, ReconcilerError> {
        let delay = ctx.config.requeue_delay();
        let mut pass = match Pass::load(&ctx, &origin).await {
            Ok(pass) => pass,
            Err(stop) => return action(Err(stop), delay),
        };

        if resource::deleted(&pass.instance) {
            return action(pass.teardown().await, delay);
        }

        let step = pass.converge().await;
        pass.persist().await;

        action(step, delay)
    }

    async fn delete(
        ctx: Arc<Context>,
        origin: Arc<OracleRestDataService>,
    ) -> Result<Action, ReconcilerError> {
        let delay = ctx.config.requeue_delay();
        let mut pass = match Pass::load(&ctx, &origin).await {
            Ok(pass) => pass,
            Err(stop) => return action(Err(stop), delay),
        };

        action(pass.teardown().await, delay)
    }
}
