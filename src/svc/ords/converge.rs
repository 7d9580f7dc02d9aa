//! # Converge module
//!
//! This module brings the child objects of an instance in line with its
//! spec: the endpoint and the urls derived from it, the optional dedicated
//! claim and the pool of worker pods.

use k8s_openapi::api::core::v1::{Node, Service};
use tracing::{debug, info, warn};

use crate::svc::{
    crd::rest_data_service::State,
    k8s::pod,
    ords::{template, Pass, Step},
};

// -----------------------------------------------------------------------------
// Constants

pub const ADDRESS_EXTERNAL: &str = "ExternalIP";
pub const ADDRESS_INTERNAL: &str = "InternalIP";

// -----------------------------------------------------------------------------
// Helpers functions

/// returns the address of the first node, an external address is preferred
/// over an internal one
pub fn node_address(nodes: &[Node]) -> Option<String> {
    let addresses: Vec<_> = nodes
        .first()
        .and_then(|node| node.status.as_ref())
        .and_then(|status| status.addresses.to_owned())
        .unwrap_or_default();

    [ADDRESS_EXTERNAL, ADDRESS_INTERNAL].iter().find_map(|kind| {
        addresses
            .iter()
            .find(|address| address.type_ == *kind)
            .map(|address| address.address.to_owned())
    })
}

/// returns the address published by the load balancer, its ip or else its
/// hostname
pub fn ingress_address(service: &Service) -> Option<String> {
    let ingress = service
        .status
        .as_ref()
        .and_then(|status| status.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .and_then(|ingress| ingress.first())?;

    ingress
        .ip
        .to_owned()
        .or_else(|| ingress.hostname.to_owned())
        .filter(|address| !address.is_empty())
}

/// returns the port and node port of the first port of the service
fn ports(service: &Service) -> (Option<i32>, Option<i32>) {
    let port = service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_ref())
        .and_then(|ports| ports.first());

    (port.map(|p| p.port), port.and_then(|p| p.node_port))
}

// -----------------------------------------------------------------------------
// Pass implementation

impl<'a> Pass<'a> {
    /// create the endpoint when it is missing, it is never updated afterward
    pub async fn ensure_service(&mut self) -> Step {
        let service = match self
            .ctx
            .store
            .get_service(&self.namespace, &self.name)
            .await?
        {
            Some(service) => service,
            None => {
                info!(
                    namespace = &self.namespace,
                    name = &self.name,
                    load_balancer = self.instance.spec.load_balancer,
                    "Create service for custom resource",
                );

                self.ctx
                    .store
                    .create_service(&template::service(&self.instance))
                    .await?
            }
        };

        self.refresh_endpoint(&service).await
    }

    /// derive the service address and urls from the endpoint, the previous
    /// address is cleared first so a stale value never survives a pass
    pub async fn refresh_endpoint(&mut self, service: &Service) -> Step {
        self.instance.status_mut().service_ip = String::new();

        let (port, node_port) = ports(service);
        let address = if self.instance.spec.load_balancer {
            ingress_address(service).zip(port)
        } else {
            let nodes = self.ctx.store.list_nodes().await?;
            node_address(&nodes).zip(node_port)
        };

        let (ip, port) = match address {
            Some(address) => address,
            None => {
                debug!(
                    namespace = &self.namespace,
                    name = &self.name,
                    "Service address is not published yet",
                );

                return Ok(());
            }
        };

        let pdb = self.database.pdb_name();
        let base = format!("https://{}:{}/ords", ip, port);
        let status = self.instance.status_mut();

        status.service_ip = ip;
        status.database_api_url = format!("{}/{}/_/db-api/stable/", base, pdb);
        status.database_actions_url = format!("{}/sql-developer", base);
        if status.apex_configured {
            status.apex_url = format!("{}/{}/apex", base, pdb);
        }

        Ok(())
    }

    /// create the dedicated claim when one is requested and missing
    pub async fn ensure_claim(&mut self) -> Step {
        if !self.instance.spec.persistence.dedicated() {
            return Ok(());
        }

        if self
            .ctx
            .store
            .get_claim(&self.namespace, &self.name)
            .await?
            .is_some()
        {
            return Ok(());
        }

        info!(
            namespace = &self.namespace,
            name = &self.name,
            size = &self.instance.spec.persistence.size,
            "Create persistent volume claim for custom resource",
        );

        self.ctx
            .store
            .create_claim(&template::claim(&self.instance))
            .await?;

        Ok(())
    }

    /// converge the number of worker pods to the desired replicas
    pub async fn ensure_pods(&mut self) -> Step {
        let labels = template::labels(&self.instance);
        let pods = pod::find(
            &*self.ctx.store,
            &self.namespace,
            &labels,
            &self.instance.spec.image.pull_from,
        )
        .await?;

        for terminating in &pods.terminating {
            let name = kube::ResourceExt::name_any(terminating);
            if let Err(err) = self.ctx.store.delete_pod(&self.namespace, &name).await {
                warn!(
                    namespace = &self.namespace,
                    pod = &name,
                    error = err.to_string(),
                    "Could not force the deletion of terminating pod",
                );
            }
        }

        let found = pods.count();
        let desired = usize::try_from(self.instance.spec.replicas).unwrap_or_default();

        if found == 0 {
            self.set_state(State::NotReady);
        }

        if found < desired {
            self.scale_up(desired - found).await?;
        } else if found > desired {
            self.scale_down(&pods, found - desired).await;
        }

        self.database.status_mut().ords_reference = self.name.to_owned();
        self.instance.status_mut().replicas = self.instance.spec.replicas;

        Ok(())
    }

    async fn scale_up(&self, count: usize) -> Step {
        if self
            .ctx
            .store
            .get_secret(&self.namespace, &self.name)
            .await?
            .is_none()
        {
            self.ctx
                .store
                .create_secret(&template::init_secret(&self.instance))
                .await?;
        }

        for _ in 0..count {
            let pod = template::pod(&self.instance, &self.database);

            info!(
                namespace = &self.namespace,
                name = &self.name,
                pod = kube::ResourceExt::name_any(&pod),
                "Create worker pod for custom resource",
            );

            self.ctx.store.create_pod(&pod).await?;
        }

        Ok(())
    }

    /// delete the given number of pods, the ready pod is kept as long as
    /// another one can go instead
    async fn scale_down(&self, pods: &pod::Pods, count: usize) {
        let candidates = pods
            .available_names()
            .into_iter()
            .chain(pods.ready_name())
            .take(count);

        for name in candidates {
            info!(
                namespace = &self.namespace,
                name = &self.name,
                pod = &name,
                "Delete excess worker pod of custom resource",
            );

            if let Err(err) = self.ctx.store.delete_pod(&self.namespace, &name).await {
                warn!(
                    namespace = &self.namespace,
                    pod = &name,
                    error = err.to_string(),
                    "Could not delete excess worker pod",
                );
            }
        }
    }
}
