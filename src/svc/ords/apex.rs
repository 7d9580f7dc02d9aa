//! # Apex module
//!
//! This module installs apex in the primary database and configures the
//! rest data service to serve it. The configuration is read at process
//! start, so the worker pod is restarted once it is applied.

use tracing::{error, info, warn};

use crate::svc::{
    crd::rest_data_service::State,
    k8s::recorder::Level,
    ords::{sql, Pass, Reason, Step, Stop},
};

impl<'a> Pass<'a> {
    pub async fn configure_apex(&mut self) -> Step {
        let apex = self.instance.spec.apex_password.to_owned();
        if apex.secret_name.is_empty() {
            self.instance.status_mut().apex_configured = false;
            return Ok(());
        }

        if self.instance.status().apex_configured {
            return Ok(());
        }

        let apex_password = match self.password(&apex).await? {
            Some(password) => password,
            None => {
                let message = format!("waiting for secret : {} to get created", apex.secret_name);
                self.set_state(State::Error);
                self.event(Level::Normal, Reason::Waiting, &message).await;
                return Err(Stop::Requeue);
            }
        };

        let ords_pod = match &self.ords_pod {
            Some(ords_pod) => ords_pod.to_owned(),
            None => return Err(Stop::Requeue),
        };

        if !self.database.status().apex_installed {
            self.install_apex(&ords_pod, &apex_password).await?;
        }

        let output = self
            .shell(&ords_pod, &sql::set_apex_users(&apex_password))
            .await?;

        if output.has_error() {
            warn!(
                namespace = &self.namespace,
                name = &self.name,
                output = output.combined(),
                "Could not configure apex users",
            );

            return Err(Stop::Requeue);
        }

        info!(
            namespace = &self.namespace,
            name = &self.name,
            pod = &ords_pod,
            "Restart worker pod to apply apex configuration",
        );

        if let Err(err) = self.ctx.store.delete_pod(&self.namespace, &ords_pod).await {
            warn!(
                namespace = &self.namespace,
                pod = &ords_pod,
                error = err.to_string(),
                "Could not restart worker pod",
            );

            return Err(Stop::Requeue);
        }

        self.instance.status_mut().apex_configured = true;
        Ok(())
    }

    /// run the apex installer against the pluggable database, the installed
    /// latch of the database is set once the version is reported
    async fn install_apex(&mut self, ords_pod: &str, apex_password: &str) -> Step {
        let admin = self.instance.spec.admin_password.to_owned();
        let sys_password = match self.password(&admin).await? {
            Some(password) => password,
            None => {
                let message = format!("waiting for secret : {} to get created", admin.secret_name);
                self.set_state(State::Error);
                self.event(Level::Normal, Reason::Waiting, &message).await;
                return Err(Stop::Requeue);
            }
        };

        let pdb = self.database.pdb_name();

        self.set_state(State::Updating);
        self.persist().await;
        self.event(
            Level::Warning,
            Reason::InstallingApex,
            "installing apex in the database, this takes several minutes",
        )
        .await;

        if let Err(err) = self
            .shell(ords_pod, &sql::install_apex(apex_password, &sys_password, &pdb))
            .await
        {
            error!(
                namespace = &self.namespace,
                name = &self.name,
                error = err.to_string(),
                "Apex installer did not complete",
            );
        }

        let output = self
            .shell(ords_pod, &sql::is_apex_installed(&sys_password, &pdb))
            .await?;

        if !output.contains(sql::APEX_VERSION_MARKER) {
            return Err(Stop::Requeue);
        }

        self.set_state(State::Ready);
        self.event(Level::Normal, Reason::InstalledApex, "apex is installed in the database")
            .await;
        self.database.status_mut().apex_installed = true;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::svc::{
        crd::rest_data_service::{Password, State},
        ords::{
            testing::{self, Fixture},
            Pass, Stop,
        },
    };

    fn with_apex(fixture: &Fixture) {
        fixture.store.update_instance(|obj| {
            obj.spec.apex_password = Password {
                secret_name: testing::APEX_SECRET.to_string(),
                ..Default::default()
            };
        });
        fixture.store.insert_secret(testing::secret(
            testing::APEX_SECRET,
            "oracle_pwd",
            testing::PASSWORD,
        ));
        fixture.ready_worker("ords-sample-ready");
    }

    #[tokio::test]
    async fn no_apex_secret_is_a_no_op() {
        let fixture = Fixture::new();
        fixture
            .store
            .update_instance(|obj| obj.status_mut().apex_configured = true);

        let ctx = fixture.context();
        let mut pass = Pass::load(&ctx, &testing::instance()).await.unwrap();

        for _ in 0..2 {
            pass.configure_apex().await.unwrap();
            assert!(!pass.instance.status().apex_configured);
        }
        assert!(fixture.executor.calls().is_empty());
    }

    #[tokio::test]
    async fn install_then_restart() {
        let fixture = Fixture::new();
        with_apex(&fixture);
        fixture
            .executor
            .respond("dba_registry", "APEXVERSION:21.1.0.00.04");

        let ctx = fixture.context();
        let mut pass = Pass::load(&ctx, &testing::instance()).await.unwrap();
        pass.ords_pod = Some("ords-sample-ready".to_string());
        pass.configure_apex().await.unwrap();

        assert!(pass.instance.status().apex_configured);
        assert_eq!(pass.instance.status().state, State::Ready);
        assert!(pass.database.status().apex_installed);
        assert!(fixture.executor.ran("apexins.sql"));
        assert_eq!(
            fixture.store.with(|o| o.deleted_pods.to_owned()),
            vec!["ords-sample-ready".to_string()]
        );
        assert_eq!(
            fixture.store.reasons(),
            vec!["InstallingApex".to_string(), "InstalledApex".to_string()]
        );
        assert_eq!(
            fixture.store.instance().status().state,
            State::Updating,
            "status is written before the installer runs"
        );

        pass.configure_apex().await.unwrap();
        assert_eq!(fixture.executor.count("apexins.sql"), 1);
    }

    #[tokio::test]
    async fn missing_version_requeues() {
        let fixture = Fixture::new();
        with_apex(&fixture);
        fixture.executor.fail("apexins.sql");

        let ctx = fixture.context();
        let mut pass = Pass::load(&ctx, &testing::instance()).await.unwrap();
        pass.ords_pod = Some("ords-sample-ready".to_string());

        assert!(matches!(pass.configure_apex().await, Err(Stop::Requeue)));
        assert!(!pass.instance.status().apex_configured);
        assert!(!pass.database.status().apex_installed);
        assert!(fixture.store.with(|o| o.deleted_pods.is_empty()));
    }

    #[tokio::test]
    async fn installed_database_skips_installer() {
        let fixture = Fixture::new();
        with_apex(&fixture);
        fixture
            .store
            .update_database(|db| db.status_mut().apex_installed = true);

        let ctx = fixture.context();
        let mut pass = Pass::load(&ctx, &testing::instance()).await.unwrap();
        pass.ords_pod = Some("ords-sample-ready".to_string());
        pass.configure_apex().await.unwrap();

        assert!(!fixture.executor.ran("apexins.sql"));
        assert!(fixture.executor.ran("db.password"));
        assert!(pass.instance.status().apex_configured);
    }
}
