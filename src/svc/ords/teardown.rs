//! # Teardown module
//!
//! This module removes what the rest data service left in the database
//! before the finalizer is released. Any failure keeps the finalizer so the
//! teardown is attempted again on the next pass.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::svc::{
    crd::rest_data_service::FINALIZER,
    k8s::{finalizer, pod, recorder::Level, secret},
    ords::{sql, template, Pass, Reason, ReconcilerError, Step, Stop},
    retry,
};

impl<'a> Pass<'a> {
    /// clean up the database, release it and remove the finalizer
    pub async fn teardown(&mut self) -> Step {
        if !finalizer::contains(&self.instance, FINALIZER) {
            return Ok(());
        }

        if self.instance.status().ords_installed {
            self.cleanup().await?;
        }

        self.release_database().await?;

        info!(
            namespace = &self.namespace,
            name = &self.name,
            "Remove finalizer from custom resource",
        );

        let modified = finalizer::remove(self.instance.to_owned(), FINALIZER);
        let patched = self
            .ctx
            .store
            .patch_instance(&self.instance, &modified)
            .await?;

        self.instance.metadata = patched.metadata;

        let message = format!("Delete finalizer '{}'", FINALIZER);
        self.event(Level::Normal, Reason::DeleteFinalizer, &message)
            .await;

        Ok(())
    }

    /// returns the admin password, waiting for its secret to show up a bounded
    /// number of times
    async fn admin_password_with_retry(&self) -> Option<String> {
        let this = &*self;
        let admin = &self.instance.spec.admin_password;
        let config = self.config();

        retry::bounded(config.teardown.secret_attempts, config.secret_delay(), move |_| async move {
            match this
                .ctx
                .store
                .get_secret(&this.namespace, &admin.secret_name)
                .await
            {
                Ok(Some(found)) => Some(secret::value(&found, &admin.secret_key).unwrap_or_default()),
                Ok(None) => {
                    let message =
                        format!("waiting for secret : {} to get created", admin.secret_name);
                    this.event(Level::Normal, Reason::Waiting, &message).await;
                    None
                }
                Err(err) => {
                    debug!(
                        namespace = &this.namespace,
                        secret = &admin.secret_name,
                        error = err.to_string(),
                        "Could not retrieve admin secret",
                    );
                    None
                }
            }
        })
        .await
    }

    /// kill the sessions of the rest data service user, uninstall it from the
    /// database and drop the common users
    async fn cleanup(&mut self) -> Step {
        let database_pod = match self.find_database_pod().await? {
            Some(database_pod) => database_pod,
            None => {
                let message = format!(
                    "omitting ORDS uninstallation as no ready pod of {} is available",
                    self.instance.spec.database_ref
                );
                self.event(Level::Normal, Reason::NoReadyPod, &message).await;
                return Ok(());
            }
        };

        let output = self
            .sql(&database_pod, &sql::session_info(self.instance.ords_user()))
            .await?;
        let kill = sql::kill_sessions(output.lines());
        if !kill.is_empty() {
            info!(
                namespace = &self.namespace,
                name = &self.name,
                "Kill sessions of rest data service user",
            );

            self.sql(&database_pod, &kill).await?;
        }

        let password = self.admin_password_with_retry().await;

        let pods = pod::find(
            &*self.ctx.store,
            &self.namespace,
            &template::labels(&self.instance),
            &self.instance.spec.image.pull_from,
        )
        .await?;

        let ords_pod = pods.ready_name();
        if let (Some(password), Some(ords_pod)) = (password, &ords_pod) {
            let output = self.shell(ords_pod, &sql::uninstall_ords(&password)).await?;
            if output.failed() {
                return Err(Stop::Failed(ReconcilerError::Cleanup(
                    ords_pod.to_owned(),
                    output.combined(),
                )));
            }

            info!(
                namespace = &self.namespace,
                name = &self.name,
                pod = ords_pod,
                "Rest data service is uninstalled from the database",
            );
        } else {
            warn!(
                namespace = &self.namespace,
                name = &self.name,
                "Skip uninstallation, admin password or ready worker pod is missing",
            );
        }

        match self.sql(&database_pod, sql::DROP_ADMIN_USERS).await {
            Ok(output) if output.failed() => warn!(
                namespace = &self.namespace,
                name = &self.name,
                output = output.combined(),
                "Could not drop common users",
            ),
            Ok(_) => {}
            Err(err) => warn!(
                namespace = &self.namespace,
                name = &self.name,
                error = err.to_string(),
                "Could not drop common users",
            ),
        }

        if let Some(ords_pod) = ords_pod {
            if let Err(err) = self.ctx.store.delete_pod(&self.namespace, &ords_pod).await {
                warn!(
                    namespace = &self.namespace,
                    pod = &ords_pod,
                    error = err.to_string(),
                    "Could not delete worker pod",
                );
            }
        }

        let admin = &self.instance.spec.admin_password;
        if !admin.keep_secret {
            if let Err(err) = self
                .ctx
                .store
                .delete_secret(&self.namespace, &admin.secret_name)
                .await
            {
                debug!(
                    namespace = &self.namespace,
                    secret = &admin.secret_name,
                    error = err.to_string(),
                    "Could not delete admin secret",
                );
            }
        }

        Ok(())
    }

    /// clear the back reference of the database, retried a bounded number of
    /// times as the database controller writes the same status
    async fn release_database(&mut self) -> Step {
        let mut patch = self.database.status_patch();
        patch.ords_reference = String::new();

        let config = self.config();
        let database = kube::ResourceExt::name_any(&self.database);
        let store = Arc::clone(&self.ctx.store);

        let released = retry::bounded(config.teardown.status_attempts, config.status_delay(), |attempt| {
            let store = Arc::clone(&store);
            let (namespace, database, patch) =
                (self.namespace.to_owned(), database.to_owned(), patch.to_owned());

            async move {
                match store.patch_database_status(&namespace, &database, &patch).await {
                    Ok(()) => Some(()),
                    Err(err) => {
                        debug!(
                            namespace = &namespace,
                            database = &database,
                            attempt = attempt,
                            error = err.to_string(),
                            "Could not release database",
                        );
                        None
                    }
                }
            }
        })
        .await;

        if released.is_none() {
            return Err(Stop::Failed(ReconcilerError::Reconcile(format!(
                "could not clear the rest data service reference of database {}",
                database
            ))));
        }

        self.database.status_mut().ords_reference = String::new();
        self.database_persisted = self.database.status_patch();

        Ok(())
    }
}
