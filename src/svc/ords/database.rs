//! # Database module
//!
//! This module waits for the database to be ready and provisions the common
//! administrative users the rest data service relies on. It runs before any
//! worker pod is created, the bootstrap script of the workers needs them.

use kube::ResourceExt;
use tracing::{info, warn};

use crate::svc::{
    crd::rest_data_service::State,
    k8s::{
        pod::{self, Labels},
        recorder::Level,
    },
    ords::{sql, Pass, Reason, Step, Stop},
};

impl<'a> Pass<'a> {
    /// returns the name of the ready pod of the database, if any
    pub async fn find_database_pod(&self) -> Result<Option<String>, kube::Error> {
        let image = &self.database.spec.image;
        let labels = Labels::new(self.database.name_any(), image.version.to_owned());
        let pods = pod::find(&*self.ctx.store, &self.namespace, &labels, &image.pull_from).await?;

        Ok(pods.ready_name())
    }

    /// wait for the database to be healthy with a ready pod, then bootstrap it
    pub async fn database_ready(&mut self) -> Step {
        let database_pod = self.find_database_pod().await?;

        let database_pod = match database_pod {
            Some(database_pod) if self.database.healthy() => database_pod,
            _ => {
                let message = format!("waiting for {} to be Ready", self.database.name_any());
                info!(
                    namespace = &self.namespace,
                    name = &self.name,
                    database = self.database.name_any(),
                    "Database is not ready yet",
                );

                self.event(Level::Normal, Reason::Waiting, &message).await;
                return Err(Stop::Requeue);
            }
        };

        self.database_pod = Some(database_pod.to_owned());
        self.bootstrap(&database_pod).await
    }

    /// validate the admin password and create the common users, skipped
    /// once the users exist
    pub async fn bootstrap(&mut self, database_pod: &str) -> Step {
        let status = self.instance.status();
        if status.ords_installed || status.common_users_created {
            return Ok(());
        }

        let admin = self.instance.spec.admin_password.to_owned();
        let password = match self.password(&admin).await? {
            Some(password) => password,
            None => {
                let message = format!("waiting for secret : {} to get created", admin.secret_name);
                self.set_state(State::Error);
                self.event(Level::Normal, Reason::Waiting, &message).await;
                return Err(Stop::Requeue);
            }
        };

        let output = self
            .sql(database_pod, &sql::validate_admin_password(&password))
            .await?;

        if output.contains(sql::LOGON_DENIED) {
            let message = format!(
                "logon denied with the admin password of secret {}",
                admin.secret_name
            );
            warn!(
                namespace = &self.namespace,
                name = &self.name,
                secret = &admin.secret_name,
                "Admin password is invalid",
            );

            self.set_state(State::Error);
            self.event(Level::Warning, Reason::LogonDenied, &message).await;
            return Err(Stop::Halt);
        }

        if !output.contains(sql::ADMIN_USER_MARKER) {
            return Err(Stop::Requeue);
        }

        let output = self
            .sql(database_pod, &sql::set_admin_users(&password))
            .await?;

        if !output.succeeded_except(&[sql::USER_CONFLICT]) {
            warn!(
                namespace = &self.namespace,
                name = &self.name,
                errors = output.oracle_errors().join(","),
                "Could not create common users",
            );

            return Err(Stop::Requeue);
        }

        info!(
            namespace = &self.namespace,
            name = &self.name,
            "Common users are created",
        );

        self.instance.status_mut().common_users_created = true;
        Ok(())
    }
}
