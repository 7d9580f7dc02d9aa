//! # SingleInstanceDatabase custom resource
//!
//! This module provide a read-only mirror of the single instance database
//! custom resource. The resource is owned by another controller, only the
//! fields the rest data service depends on are declared, the others are
//! ignored on deserialization.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------------
// Constants

pub const STATUS_HEALTHY: &str = "Healthy";
pub const ACCESS_MODE_READ_WRITE_ONCE: &str = "ReadWriteOnce";
pub const LISTENER_PORT: &str = "1521";

// -----------------------------------------------------------------------------
// Image structure

#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
pub struct Image {
    #[serde(rename = "pullFrom", default)]
    pub pull_from: String,
    #[serde(rename = "version", default)]
    pub version: String,
}

// -----------------------------------------------------------------------------
// Persistence structure

#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
pub struct Persistence {
    #[serde(rename = "accessMode", default)]
    pub access_mode: String,
}

// -----------------------------------------------------------------------------
// Spec structure

#[derive(
    CustomResource, JsonSchema, Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default,
)]
#[kube(group = "database.oracle.com")]
#[kube(version = "v1alpha1")]
#[kube(kind = "SingleInstanceDatabase")]
#[kube(singular = "singleinstancedatabase")]
#[kube(plural = "singleinstancedatabases")]
#[kube(status = "Status")]
#[kube(namespaced)]
#[kube(derive = "PartialEq")]
pub struct Spec {
    #[serde(rename = "sid", default)]
    pub sid: String,
    #[serde(rename = "image", default)]
    pub image: Image,
    #[serde(rename = "persistence", default)]
    pub persistence: Persistence,
}

// -----------------------------------------------------------------------------
// Status structure

#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
pub struct Status {
    #[serde(rename = "status", default)]
    pub status: String,
    #[serde(rename = "pdbName", default)]
    pub pdb_name: String,
    #[serde(rename = "ordsReference", default)]
    pub ords_reference: String,
    #[serde(rename = "apexInstalled", default)]
    pub apex_installed: bool,
}

/// the subset of the status this operator is allowed to write, applied as a
/// json merge patch
#[derive(Serialize, PartialEq, Eq, Clone, Debug)]
pub struct StatusPatch {
    #[serde(rename = "ordsReference")]
    pub ords_reference: String,
    #[serde(rename = "apexInstalled")]
    pub apex_installed: bool,
}

// -----------------------------------------------------------------------------
// SingleInstanceDatabase implementation

impl SingleInstanceDatabase {
    pub fn status(&self) -> Status {
        self.status.to_owned().unwrap_or_default()
    }

    pub fn status_mut(&mut self) -> &mut Status {
        self.status.get_or_insert_with(Status::default)
    }

    pub fn healthy(&self) -> bool {
        self.status().status == STATUS_HEALTHY
    }

    pub fn pdb_name(&self) -> String {
        self.status().pdb_name
    }

    pub fn status_patch(&self) -> StatusPatch {
        let status = self.status();

        StatusPatch {
            ords_reference: status.ords_reference,
            apex_installed: status.apex_installed,
        }
    }

    /// returns the sub-path of the shared volume holding the rest data
    /// service configuration
    pub fn config_sub_path(&self) -> String {
        format!("{}_ORDS", self.spec.sid.to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreign_fields_are_ignored() {
        let db: SingleInstanceDatabase = serde_json::from_value(serde_json::json!({
            "apiVersion": "database.oracle.com/v1alpha1",
            "kind": "SingleInstanceDatabase",
            "metadata": { "name": "sidb", "namespace": "default" },
            "spec": {
                "sid": "orclcdb",
                "edition": "enterprise",
                "image": { "pullFrom": "registry/db:21.3.0", "version": "21.3.0" },
                "persistence": { "size": "100Gi", "accessMode": "ReadWriteMany" }
            },
            "status": { "status": "Healthy", "pdbName": "ORCLPDB1", "role": "PRIMARY" }
        }))
        .unwrap();

        assert!(db.healthy());
        assert_eq!(db.pdb_name(), "ORCLPDB1");
        assert_eq!(db.config_sub_path(), "ORCLCDB_ORDS");
        assert!(!db.status().apex_installed);
    }
}
