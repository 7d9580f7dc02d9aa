//! # Schema module
//!
//! This module enables or disables rest access on the schemas listed in the
//! spec, each rule targets a pluggable database of the primary database.

use tracing::{debug, info, warn};

use crate::svc::{
    k8s::{exec::Output, recorder::Level},
    ords::{sql, Pass, Reason, Step, Stop},
};

/// returns the pluggable databases listed in the output of the query
pub fn pdbs(output: &Output) -> Vec<String> {
    output.lines().map(str::to_uppercase).collect()
}

impl<'a> Pass<'a> {
    pub async fn enable_schemas(&mut self) -> Step {
        let rules = self.instance.spec.rest_enable_schemas.to_owned();
        if rules.is_empty() {
            return Ok(());
        }

        let database_pod = match &self.database_pod {
            Some(database_pod) => database_pod.to_owned(),
            None => return Err(Stop::Requeue),
        };

        let available = pdbs(&self.sql(&database_pod, sql::GET_PDBS).await?);
        let ords_password = self.instance.spec.ords_password.to_owned();

        for rule in rules {
            if !available.contains(&rule.pdb.to_uppercase()) {
                let message = format!(
                    "skipping schema {}, pluggable database {} is not found",
                    rule.schema, rule.pdb
                );

                self.event(Level::Warning, Reason::SchemaSkipped, &message)
                    .await;
                continue;
            }

            let output = self
                .sql(&database_pod, &sql::schema_status(&rule.schema, &rule.pdb))
                .await?;

            if output.contains(sql::SCHEMA_ENABLED_MARKER) == rule.enable {
                debug!(
                    namespace = &self.namespace,
                    name = &self.name,
                    schema = &rule.schema,
                    enable = rule.enable,
                    "Schema is already in the desired state",
                );

                continue;
            }

            let password = match self.password(&ords_password).await? {
                Some(password) => password,
                None => {
                    let message = format!("secret {} is not found", ords_password.secret_name);
                    self.event(Level::Normal, Reason::SecretNotFound, &message)
                        .await;
                    return Err(Stop::Requeue);
                }
            };

            let output = self
                .sql(
                    &database_pod,
                    &sql::enable_schema(
                        &rule.schema,
                        &password,
                        rule.enable,
                        &rule.url_pattern(),
                        &rule.pdb,
                    ),
                )
                .await?;

            if output.failed() {
                warn!(
                    namespace = &self.namespace,
                    name = &self.name,
                    schema = &rule.schema,
                    output = output.combined(),
                    "Could not update rest access of schema",
                );
            } else {
                info!(
                    namespace = &self.namespace,
                    name = &self.name,
                    schema = &rule.schema,
                    enable = rule.enable,
                    "Updated rest access of schema",
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::svc::{
        crd::rest_data_service::RestEnableSchema,
        ords::testing::{self, Fixture},
    };

    fn rule(schema: &str, pdb: &str, enable: bool) -> RestEnableSchema {
        RestEnableSchema {
            schema: schema.to_string(),
            pdb: pdb.to_string(),
            enable,
            url_mapping: String::new(),
        }
    }

    #[test]
    fn pdbs_are_upper_cased() {
        let output = Output::new("\nORCLPDB1\norclpdb2\n\n");
        assert_eq!(pdbs(&output), vec!["ORCLPDB1", "ORCLPDB2"]);
    }

    #[tokio::test]
    async fn rules_are_applied_once() {
        let fixture = Fixture::new();
        fixture.store.update_instance(|obj| {
            obj.spec.rest_enable_schemas = vec![
                rule("HR", "orclpdb1", true),
                rule("SCOTT", "MISSING", true),
                rule("SALES", "ORCLPDB1", false),
            ];
        });
        fixture.executor.respond("v\\$pdbs", "ORCLPDB1\n");

        let ctx = fixture.context();
        let mut pass = Pass::load(&ctx, &testing::instance()).await.unwrap();
        pass.database_pod = Some(testing::DATABASE_POD.to_string());
        pass.enable_schemas().await.unwrap();

        assert_eq!(fixture.store.reasons(), vec!["SchemaSkipped".to_string()]);
        assert_eq!(fixture.executor.count("ORDS.ENABLE_SCHEMA"), 1);
        assert!(fixture.executor.ran("p_schema => 'HR'"));
        assert!(fixture.executor.ran("p_url_mapping_pattern => 'hr'"));

        fixture.executor.respond("upper('HR')", "STATUS:ENABLED");
        pass.enable_schemas().await.unwrap();
        assert_eq!(fixture.executor.count("ORDS.ENABLE_SCHEMA"), 1);
    }

    #[tokio::test]
    async fn lower_case_schema_targets_the_stored_user() {
        let fixture = Fixture::new();
        fixture
            .store
            .update_instance(|obj| obj.spec.rest_enable_schemas = vec![rule("hr", "ORCLPDB1", true)]);
        fixture.executor.respond("v\\$pdbs", "ORCLPDB1");

        let ctx = fixture.context();
        let mut pass = Pass::load(&ctx, &testing::instance()).await.unwrap();
        pass.database_pod = Some(testing::DATABASE_POD.to_string());
        pass.enable_schemas().await.unwrap();

        assert!(fixture.executor.ran("username = 'HR'"));
        assert!(fixture.executor.ran("p_schema => 'HR'"));
        assert!(!fixture.executor.ran("username = 'hr'"));
        assert!(fixture.executor.ran("p_url_mapping_pattern => 'hr'"));
    }

    #[tokio::test]
    async fn missing_ords_secret_requeues() {
        let fixture = Fixture::new();
        fixture
            .store
            .update_instance(|obj| obj.spec.rest_enable_schemas = vec![rule("HR", "ORCLPDB1", true)]);
        fixture.store.remove_secret(testing::ORDS_SECRET);
        fixture.executor.respond("v\\$pdbs", "ORCLPDB1");

        let ctx = fixture.context();
        let mut pass = Pass::load(&ctx, &testing::instance()).await.unwrap();
        pass.database_pod = Some(testing::DATABASE_POD.to_string());

        assert!(matches!(pass.enable_schemas().await, Err(Stop::Requeue)));
        assert_eq!(fixture.store.reasons(), vec!["SecretNotFound".to_string()]);
    }
}
