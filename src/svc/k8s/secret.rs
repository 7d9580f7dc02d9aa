//! # Secret module
//!
//! This module provide helpers to build secrets owned by a custom resource
//! and to read credentials out of existing ones

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use kube::{api::ObjectMeta, CustomResourceExt, ResourceExt};

use crate::svc::k8s::resource;

pub const TYPE_OPAQUE: &str = "Opaque";

/// returns a new opaque secret with the given name, owned by the given object
pub fn new<T>(
    obj: &T,
    name: &str,
    labels: BTreeMap<String, String>,
    data: BTreeMap<String, String>,
) -> Secret
where
    T: ResourceExt + CustomResourceExt,
{
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: obj.namespace(),
            labels: Some(labels),
            owner_references: Some(vec![resource::owner_reference(obj)]),
            ..Default::default()
        },
        type_: Some(TYPE_OPAQUE.to_string()),
        string_data: Some(data),
        ..Default::default()
    }
}

/// returns the value stored under the given key, decoded as utf-8. The
/// `stringData` field is only consulted when `data` does not hold the key,
/// it is never populated by the api server but may be by a caller.
pub fn value(secret: &Secret, key: &str) -> Option<String> {
    if let Some(bytes) = secret.data.as_ref().and_then(|data| data.get(key)) {
        return Some(String::from_utf8_lossy(&bytes.0).to_string());
    }

    secret
        .string_data
        .as_ref()
        .and_then(|data| data.get(key))
        .map(ToOwned::to_owned)
}
