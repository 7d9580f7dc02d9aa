//! # Finalizer module
//!
//! This module provide helpers methods to interact with kubernetes' resource
//! finalizer

use kube::Resource;

/// returns if there is the given finalizer on the resource
pub fn contains<T>(obj: &T, finalizer: &str) -> bool
where
    T: Resource,
{
    if let Some(finalizers) = &obj.meta().finalizers {
        finalizers.iter().any(|f| finalizer == f)
    } else {
        false
    }
}

/// add finalizer to the resource
pub fn add<T>(mut obj: T, finalizer: &str) -> T
where
    T: Resource,
{
    if contains(&obj, finalizer) {
        return obj;
    }

    obj.meta_mut()
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(finalizer.into());

    obj
}

/// remove finalizer from the resource
pub fn remove<T>(mut obj: T, finalizer: &str) -> T
where
    T: Resource,
{
    if let Some(finalizers) = obj.meta_mut().finalizers.as_mut() {
        finalizers.retain(|f| f != finalizer);
    }

    obj
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::Pod;

    use super::*;

    #[test]
    fn add_is_idempotent_and_remove_clears() {
        let pod = add(Pod::default(), "example.com/finalizer");
        let pod = add(pod, "example.com/finalizer");

        assert_eq!(pod.metadata.finalizers.as_ref().map(Vec::len), Some(1));
        assert!(contains(&pod, "example.com/finalizer"));

        let pod = remove(pod, "example.com/finalizer");
        assert!(!contains(&pod, "example.com/finalizer"));
    }
}
