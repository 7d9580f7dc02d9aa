//! # Store module
//!
//! This module provide the narrow interface through which the reconciliation
//! loop reads and writes cluster objects, and its implementation on top of
//! the kubernetes client.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event, Node, PersistentVolumeClaim, Pod, Secret, Service};
use kube::{api::ListParams, Api, Client};

use crate::svc::{
    crd::{
        database::{SingleInstanceDatabase, StatusPatch},
        rest_data_service::{OracleRestDataService, Status},
    },
    k8s::resource,
};

// -----------------------------------------------------------------------------
// ObjectStore trait

/// provides the object store primitives consumed by the control loop. Every
/// call is namespaced except nodes. Getters return `None` when the object does
/// not exist and deleting a missing object is not an error.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_instance(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<OracleRestDataService>, kube::Error>;

    /// apply the difference between both objects, used for metadata changes
    /// such as finalizers
    async fn patch_instance(
        &self,
        origin: &OracleRestDataService,
        modified: &OracleRestDataService,
    ) -> Result<OracleRestDataService, kube::Error>;

    async fn patch_instance_status(
        &self,
        namespace: &str,
        name: &str,
        status: &Status,
    ) -> Result<(), kube::Error>;

    async fn get_database(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SingleInstanceDatabase>, kube::Error>;

    async fn patch_database_status(
        &self,
        namespace: &str,
        name: &str,
        status: &StatusPatch,
    ) -> Result<(), kube::Error>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, kube::Error>;

    async fn create_secret(&self, secret: &Secret) -> Result<(), kube::Error>;

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), kube::Error>;

    async fn get_service(&self, namespace: &str, name: &str)
        -> Result<Option<Service>, kube::Error>;

    async fn create_service(&self, service: &Service) -> Result<Service, kube::Error>;

    async fn get_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PersistentVolumeClaim>, kube::Error>;

    async fn create_claim(&self, claim: &PersistentVolumeClaim) -> Result<(), kube::Error>;

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>, kube::Error>;

    async fn create_pod(&self, pod: &Pod) -> Result<(), kube::Error>;

    /// delete the pod immediately, zero grace period and foreground propagation
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), kube::Error>;

    async fn list_nodes(&self) -> Result<Vec<Node>, kube::Error>;

    async fn create_event(&self, event: &Event) -> Result<(), kube::Error>;
}

// -----------------------------------------------------------------------------
// ObjectStore implementation for the kubernetes client

#[async_trait]
impl ObjectStore for Client {
    async fn get_instance(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<OracleRestDataService>, kube::Error> {
        resource::get(self.to_owned(), namespace, name).await
    }

    async fn patch_instance(
        &self,
        origin: &OracleRestDataService,
        modified: &OracleRestDataService,
    ) -> Result<OracleRestDataService, kube::Error> {
        let patch = resource::diff(origin, modified).map_err(kube::Error::SerdeError)?;

        resource::patch(self.to_owned(), modified, patch).await
    }

    async fn patch_instance_status(
        &self,
        namespace: &str,
        name: &str,
        status: &Status,
    ) -> Result<(), kube::Error> {
        resource::merge_status::<OracleRestDataService, _>(self.to_owned(), namespace, name, status)
            .await
            .map(|_| ())
    }

    async fn get_database(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SingleInstanceDatabase>, kube::Error> {
        resource::get(self.to_owned(), namespace, name).await
    }

    async fn patch_database_status(
        &self,
        namespace: &str,
        name: &str,
        status: &StatusPatch,
    ) -> Result<(), kube::Error> {
        resource::merge_status::<SingleInstanceDatabase, _>(
            self.to_owned(),
            namespace,
            name,
            status,
        )
        .await
        .map(|_| ())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, kube::Error> {
        resource::get(self.to_owned(), namespace, name).await
    }

    async fn create_secret(&self, secret: &Secret) -> Result<(), kube::Error> {
        resource::create(self.to_owned(), secret).await.map(|_| ())
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), kube::Error> {
        resource::delete::<Secret>(self.to_owned(), namespace, name, false).await
    }

    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, kube::Error> {
        resource::get(self.to_owned(), namespace, name).await
    }

    async fn create_service(&self, service: &Service) -> Result<Service, kube::Error> {
        resource::create(self.to_owned(), service).await
    }

    async fn get_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PersistentVolumeClaim>, kube::Error> {
        resource::get(self.to_owned(), namespace, name).await
    }

    async fn create_claim(&self, claim: &PersistentVolumeClaim) -> Result<(), kube::Error> {
        resource::create(self.to_owned(), claim).await.map(|_| ())
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>, kube::Error> {
        resource::list(self.to_owned(), namespace, selector).await
    }

    async fn create_pod(&self, pod: &Pod) -> Result<(), kube::Error> {
        resource::create(self.to_owned(), pod).await.map(|_| ())
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), kube::Error> {
        resource::delete::<Pod>(self.to_owned(), namespace, name, true).await
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, kube::Error> {
        Ok(Api::<Node>::all(self.to_owned())
            .list(&ListParams::default())
            .await?
            .items)
    }

    async fn create_event(&self, event: &Event) -> Result<(), kube::Error> {
        resource::create(self.to_owned(), event).await.map(|_| ())
    }
}
