//! # Pod module
//!
//! This module provide helpers to discover the pods of a workload and to
//! select the one considered as ready.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;

use crate::svc::k8s::{resource, store::ObjectStore};

// -----------------------------------------------------------------------------
// Labels structure

/// the fixed label set identifying the pods of a workload
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Labels {
    pub app: String,
    pub version: String,
}

impl Labels {
    pub fn new(app: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            version: version.into(),
        }
    }

    /// returns the labels as a map, the version is omitted when empty
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::from([("app".to_string(), self.app.to_owned())]);
        if !self.version.is_empty() {
            labels.insert("version".to_string(), self.version.to_owned());
        }

        labels
    }

    /// returns the map restricted to the `app` key, used by objects which
    /// are not versioned
    pub fn app_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("app".to_string(), self.app.to_owned())])
    }

    /// returns the labels formatted as a kubernetes label selector
    pub fn selector(&self) -> String {
        self.to_map()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

// -----------------------------------------------------------------------------
// Pods structure

/// pods of a workload partitioned by their state
#[derive(Clone, Debug, Default)]
pub struct Pods {
    pub ready: Option<Pod>,
    pub available: Vec<Pod>,
    pub terminating: Vec<Pod>,
}

impl Pods {
    /// returns the number of live pods, the terminating ones are excluded
    pub fn count(&self) -> usize {
        self.available.len() + usize::from(self.ready.is_some())
    }

    pub fn ready_name(&self) -> Option<String> {
        self.ready.as_ref().map(ResourceExt::name_any)
    }

    pub fn available_names(&self) -> Vec<String> {
        self.available.iter().map(ResourceExt::name_any).collect()
    }
}

// -----------------------------------------------------------------------------
// Helpers functions

/// returns if the container runtime reports the pod as running and ready
pub fn ready(pod: &Pod) -> bool {
    let status = match &pod.status {
        Some(status) => status,
        None => return false,
    };

    status.phase.as_deref() == Some("Running")
        && status
            .conditions
            .iter()
            .flatten()
            .any(|c| c.type_ == "Ready" && c.status == "True")
}

fn image(pod: &Pod) -> Option<&str> {
    pod.spec
        .as_ref()
        .and_then(|spec| spec.containers.first())
        .and_then(|container| container.image.as_deref())
}

/// partition the given pods running the given image, the first ready pod
/// found is elected as the ready one
pub fn partition(pods: Vec<Pod>, pull_from: &str) -> Pods {
    let mut result = Pods::default();

    for pod in pods {
        if !pull_from.is_empty() && image(&pod) != Some(pull_from) {
            continue;
        }

        if resource::deleted(&pod) {
            result.terminating.push(pod);
        } else if result.ready.is_none() && ready(&pod) {
            result.ready = Some(pod);
        } else {
            result.available.push(pod);
        }
    }

    result
}

/// discover the pods of a workload using its labels and image
pub async fn find(
    store: &dyn ObjectStore,
    namespace: &str,
    labels: &Labels,
    pull_from: &str,
) -> Result<Pods, kube::Error> {
    let pods = store.list_pods(namespace, &labels.selector()).await?;

    Ok(partition(pods, pull_from))
}
