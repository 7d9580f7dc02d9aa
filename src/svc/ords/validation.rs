//! # Validation module
//!
//! This module checks the spec of an instance before anything is mutated in
//! the cluster. Immutable fields are compared to the snapshots recorded in
//! the status on the first valid pass.

use tracing::warn;

use crate::svc::{
    crd::{
        database::ACCESS_MODE_READ_WRITE_ONCE,
        rest_data_service::{State, VALUE_UNAVAILABLE},
    },
    k8s::recorder::Level,
    ords::{Pass, Reason, Step, Stop},
};

impl<'a> Pass<'a> {
    /// returns the violations of the spec, empty if it is valid
    pub fn violations(&self) -> Vec<String> {
        let spec = &self.instance.spec;
        let status = self.instance.status();
        let mut violations = vec![];

        if self.database.spec.persistence.access_mode == ACCESS_MODE_READ_WRITE_ONCE
            && !spec.persistence.dedicated()
        {
            violations.push(format!(
                "database {} uses a {} volume, set persistence.size to request a dedicated claim",
                spec.database_ref, ACCESS_MODE_READ_WRITE_ONCE
            ));
        }

        if spec.persistence.dedicated() && spec.persistence.access_mode.is_empty() {
            violations.push(
                "persistence.accessMode is required when persistence.size is set".to_string(),
            );
        }

        if let Some(database_ref) = &status.database_ref {
            if database_ref != &spec.database_ref {
                violations.push(format!(
                    "databaseRef cannot be updated from {} to {}",
                    database_ref, spec.database_ref
                ));
            }
        }

        if let Some(load_balancer) = status.load_balancer {
            if load_balancer != spec.load_balancer {
                violations.push(format!(
                    "loadBalancer cannot be updated from {} to {}",
                    load_balancer, spec.load_balancer
                ));
            }
        }

        if let Some(image) = &status.image {
            if !image.pull_from.is_empty() && image != &spec.image {
                violations.push(format!(
                    "image cannot be updated from {} to {}",
                    image.pull_from, spec.image.pull_from
                ));
            }
        }

        violations
    }

    /// validate the spec and record the snapshots of the immutable fields
    pub async fn validate(&mut self) -> Step {
        {
            let status = self.instance.status_mut();
            for url in [
                &mut status.apex_url,
                &mut status.database_api_url,
                &mut status.database_actions_url,
            ] {
                if url.is_empty() {
                    *url = VALUE_UNAVAILABLE.to_string();
                }
            }
        }

        let pull_secrets = &self.instance.spec.image.pull_secrets;
        if !pull_secrets.is_empty()
            && self
                .ctx
                .store
                .get_secret(&self.namespace, pull_secrets)
                .await?
                .is_none()
        {
            let message = format!("image pull secret {} is not found", pull_secrets);
            warn!(
                namespace = &self.namespace,
                name = &self.name,
                secret = pull_secrets,
                "Image pull secret is not found",
            );

            self.set_state(State::Error);
            self.event(Level::Warning, Reason::SpecError, &message).await;
            return Err(Stop::Requeue);
        }

        let violations = self.violations();
        if !violations.is_empty() {
            let message = violations.join(", ");
            warn!(
                namespace = &self.namespace,
                name = &self.name,
                violations = &message,
                "Custom resource spec is invalid",
            );

            self.set_state(State::Error);
            self.event(Level::Warning, Reason::SpecError, &message).await;
            return Err(Stop::Halt);
        }

        let spec = self.instance.spec.to_owned();
        let status = self.instance.status_mut();
        status.database_ref = Some(spec.database_ref);
        status.load_balancer = Some(spec.load_balancer);
        status.image = Some(spec.image);

        Ok(())
    }
}
