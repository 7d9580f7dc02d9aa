//! # Resource module
//!
//! This module provide helpers on kubernetes [`Resource`]

use std::fmt::Debug;

use k8s_openapi::{
    api::core::v1::ObjectReference, apimachinery::pkg::apis::meta::v1::OwnerReference,
    NamespaceResourceScope,
};
use kube::{
    api::{DeleteParams, ListParams, Patch, PatchParams, PostParams, PropagationPolicy},
    Api, Client, CustomResourceExt, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

// -----------------------------------------------------------------------------
// Helpers functions

/// returns if the resource is considered from kubernetes point of view as deleted
pub fn deleted<T>(obj: &T) -> bool
where
    T: Resource,
{
    obj.meta().deletion_timestamp.is_some()
}

/// returns the namespace and name of the kubernetes resource.
pub fn namespaced_name<T>(obj: &T) -> (String, String)
where
    T: ResourceExt,
{
    (obj.namespace().unwrap_or_default(), obj.name_any())
}

/// returns differnce between the two given object serialize as json patch
pub fn diff<T>(origin: &T, modified: &T) -> Result<json_patch::Patch, serde_json::Error>
where
    T: Serialize,
{
    Ok(json_patch::diff(
        &serde_json::to_value(origin)?,
        &serde_json::to_value(modified)?,
    ))
}

/// returns the resource with the given name, none if it does not exist
pub async fn get<T>(client: Client, namespace: &str, name: &str) -> Result<Option<T>, kube::Error>
where
    T: Resource<Scope = NamespaceResourceScope> + DeserializeOwned + Clone + Debug,
    <T as Resource>::DynamicType: Default,
{
    debug!(
        kind = T::kind(&Default::default()).to_string(),
        namespace = namespace,
        name = name,
        "Execute a request to retrieve resource",
    );

    match Api::<T>::namespaced(client, namespace).get(name).await {
        Ok(obj) => Ok(Some(obj)),
        Err(kube::Error::Api(err)) if err.code == 404 => Ok(None),
        Err(err) => Err(err),
    }
}

/// returns resources of the namespace matching the given label selector
pub async fn list<T>(client: Client, namespace: &str, selector: &str) -> Result<Vec<T>, kube::Error>
where
    T: Resource<Scope = NamespaceResourceScope> + DeserializeOwned + Clone + Debug,
    <T as Resource>::DynamicType: Default,
{
    debug!(
        kind = T::kind(&Default::default()).to_string(),
        namespace = namespace,
        selector = selector,
        "Execute a request to list resources",
    );

    Ok(Api::<T>::namespaced(client, namespace)
        .list(&ListParams::default().labels(selector))
        .await?
        .items)
}

/// create the given resource in its namespace
pub async fn create<T>(client: Client, obj: &T) -> Result<T, kube::Error>
where
    T: Resource<Scope = NamespaceResourceScope> + DeserializeOwned + Serialize + Clone + Debug,
    <T as Resource>::DynamicType: Default,
{
    let (namespace, name) = namespaced_name(obj);

    debug!(
        kind = T::kind(&Default::default()).to_string(),
        namespace = &namespace,
        name = &name,
        "Execute a request to create resource",
    );

    Api::namespaced(client, &namespace)
        .create(&PostParams::default(), obj)
        .await
}

/// delete the resource with the given name, a missing resource is not an
/// error. When `force` is set the deletion has no grace period and uses the
/// foreground propagation policy.
pub async fn delete<T>(
    client: Client,
    namespace: &str,
    name: &str,
    force: bool,
) -> Result<(), kube::Error>
where
    T: Resource<Scope = NamespaceResourceScope> + DeserializeOwned + Clone + Debug,
    <T as Resource>::DynamicType: Default,
{
    let params = if force {
        DeleteParams {
            grace_period_seconds: Some(0),
            propagation_policy: Some(PropagationPolicy::Foreground),
            ..Default::default()
        }
    } else {
        DeleteParams::default()
    };

    debug!(
        kind = T::kind(&Default::default()).to_string(),
        namespace = namespace,
        name = name,
        force = force,
        "Execute a request to delete resource",
    );

    match Api::<T>::namespaced(client, namespace)
        .delete(name, &params)
        .await
    {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(err)) if err.code == 404 => Ok(()),
        Err(err) => Err(err),
    }
}

/// make a patch request on the given resource using the given patch
pub async fn patch<T>(client: Client, obj: &T, patch: json_patch::Patch) -> Result<T, kube::Error>
where
    T: Resource<Scope = NamespaceResourceScope> + DeserializeOwned + Serialize + Clone + Debug,
    <T as Resource>::DynamicType: Default,
{
    let (namespace, name) = namespaced_name(obj);

    if patch.0.is_empty() {
        debug!(
            namespace = &namespace,
            name = &name,
            "Skip patch request on resource, no operation to apply",
        );

        return Ok(obj.to_owned());
    }

    debug!(
        namespace = &namespace,
        name = &name,
        patch = serde_json::to_string(&patch).unwrap_or_default(),
        "Execute patch request on resource",
    );

    Api::namespaced(client, &namespace)
        .patch(&name, &PatchParams::default(), &Patch::Json::<T>(patch))
        .await
}

/// make a merge patch request on the status of the resource with the given
/// name, the status is wrapped in a `{"status": ...}` document
pub async fn merge_status<T, U>(
    client: Client,
    namespace: &str,
    name: &str,
    status: &U,
) -> Result<T, kube::Error>
where
    T: Resource<Scope = NamespaceResourceScope> + DeserializeOwned + Clone + Debug,
    <T as Resource>::DynamicType: Default,
    U: Serialize + Debug,
{
    let document = serde_json::json!({ "status": status });

    debug!(
        kind = T::kind(&Default::default()).to_string(),
        namespace = namespace,
        name = name,
        "Execute merge patch request on resource's status",
    );

    Api::<T>::namespaced(client, namespace)
        .patch_status(name, &PatchParams::default(), &Patch::Merge(&document))
        .await
}

/// returns a owner references object pointing to the given resource
pub fn owner_reference<T>(obj: &T) -> OwnerReference
where
    T: ResourceExt + CustomResourceExt,
{
    let api_resource = T::api_resource();

    OwnerReference {
        api_version: api_resource.api_version,
        block_owner_deletion: Some(true),
        controller: Some(true),
        kind: api_resource.kind,
        name: obj.name_any(),
        uid: obj.uid().unwrap_or_default(),
    }
}

/// returns an object reference pointing to the given resource
pub fn object_reference<T>(obj: &T) -> ObjectReference
where
    T: ResourceExt + CustomResourceExt,
{
    let api_resource = T::api_resource();

    ObjectReference {
        api_version: Some(api_resource.api_version),
        kind: Some(api_resource.kind),
        name: Some(obj.name_any()),
        namespace: obj.namespace(),
        resource_version: obj.resource_version(),
        uid: obj.uid(),
        ..Default::default()
    }
}
