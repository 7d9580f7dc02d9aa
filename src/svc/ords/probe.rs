//! # Probe module
//!
//! This module elects the ready worker pod and asks the rest data service
//! running in it whether it answers.

use tracing::{debug, info};

use crate::svc::{
    crd::rest_data_service::State,
    k8s::{exec::Output, pod},
    ords::{sql, template, Pass, Step, Stop},
};

// -----------------------------------------------------------------------------
// Health enumeration

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Health {
    Healthy,
    Unhealthy,
}

/// classify the output of the health check, an error marker wins over the
/// success marker
pub fn classify(output: &Output) -> Health {
    if !output.has_error() && output.contains(sql::HEALTHY_MARKER) {
        Health::Healthy
    } else {
        Health::Unhealthy
    }
}

impl<'a> Pass<'a> {
    /// probe the ready worker pod, the installed latch is set on the first
    /// healthy answer
    pub async fn probe(&mut self) -> Step {
        let pods = pod::find(
            &*self.ctx.store,
            &self.namespace,
            &template::labels(&self.instance),
            &self.instance.spec.image.pull_from,
        )
        .await?;

        let ready = match pods.ready_name() {
            Some(ready) => ready,
            None => {
                debug!(
                    namespace = &self.namespace,
                    name = &self.name,
                    "No worker pod is ready yet",
                );

                return Err(Stop::Requeue);
            }
        };

        let output = self.shell(&ready, sql::GET_ORDS_STATUS).await?;
        if classify(&output) == Health::Unhealthy {
            info!(
                namespace = &self.namespace,
                name = &self.name,
                pod = &ready,
                "Rest data service is not healthy",
            );

            self.set_state(State::NotReady);
            return Err(Stop::Requeue);
        }

        self.set_state(State::Ready);
        self.instance.status_mut().ords_installed = true;
        self.ords_pod = Some(ready);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mockall::predicate::{always, eq};

    use super::*;
    use crate::svc::{
        k8s::{exec::MockRemoteExecutor, Context},
        ords::testing::{self, Fixture},
    };

    fn context(fixture: &Fixture, stdout: &'static str) -> Context {
        let mut executor = MockRemoteExecutor::new();
        executor
            .expect_exec()
            .with(eq(testing::NAMESPACE), eq("ords-sample-ready"), eq(None::<String>), always())
            .times(1)
            .returning(move |_, _, _, _| Ok(Output::new(stdout)));

        Context::new(
            fixture.store.to_owned(),
            Arc::new(executor),
            Arc::new(fixture.config.to_owned()),
        )
    }

    #[test]
    fn error_marker_wins() {
        assert_eq!(
            classify(&Output::new("< HTTP/1.1 200 OK\nerror: ok")),
            Health::Unhealthy
        );
        assert_eq!(classify(&Output::new("< HTTP/1.1 200 OK")), Health::Healthy);
        assert_eq!(
            classify(&Output::new("< HTTP/1.1 503 Service Unavailable")),
            Health::Unhealthy
        );
    }

    #[tokio::test]
    async fn healthy_answer_sets_latch() {
        let fixture = Fixture::new();
        fixture.ready_worker("ords-sample-ready");

        let ctx = context(&fixture, "* Connected to localhost\n< HTTP/1.1 200 OK\n");
        let mut pass = Pass::load(&ctx, &testing::instance()).await.unwrap();
        pass.probe().await.unwrap();

        let status = pass.instance.status();
        assert_eq!(status.state, State::Ready);
        assert!(status.ords_installed);
        assert_eq!(pass.ords_pod.as_deref(), Some("ords-sample-ready"));
    }

    #[tokio::test]
    async fn unhealthy_answer_requeues_and_keeps_latch() {
        let fixture = Fixture::new();
        fixture.ready_worker("ords-sample-ready");
        fixture
            .store
            .update_instance(|obj| obj.status_mut().ords_installed = true);

        let ctx = context(&fixture, "curl: (7) Failed to connect to localhost port 8443");
        let mut pass = Pass::load(&ctx, &testing::instance()).await.unwrap();

        assert!(matches!(pass.probe().await, Err(Stop::Requeue)));
        assert_eq!(pass.instance.status().state, State::NotReady);
        assert!(pass.instance.status().ords_installed);
    }

    #[tokio::test]
    async fn no_ready_pod_requeues() {
        let fixture = Fixture::new();
        let ctx = fixture.context();
        let mut pass = Pass::load(&ctx, &testing::instance()).await.unwrap();

        assert!(matches!(pass.probe().await, Err(Stop::Requeue)));
        assert!(fixture.executor.calls().is_empty());
    }
}
