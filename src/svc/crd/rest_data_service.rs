//! # OracleRestDataService custom resource
//!
//! This module provide the oracle rest data service custom resource, its
//! definition and the helpers used by the reconciliation loop to read its
//! spec and mutate its status.

use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
};

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------------
// Constants

pub const FINALIZER: &str = "database.oracle.com/oraclerestdataservicefinalizer";
pub const VALUE_UNAVAILABLE: &str = "Unavailable";
pub const DEFAULT_SECRET_KEY: &str = "oracle_pwd";
pub const DEFAULT_ORDS_USER: &str = "ORDS_PUBLIC_USER";
pub const DEFAULT_SERVICE_ACCOUNT: &str = "default";

// -----------------------------------------------------------------------------
// Helpers

/// returns the value if it is set, the fallback otherwise
pub fn default_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

fn default_replicas() -> i32 {
    1
}

fn default_secret_key() -> String {
    DEFAULT_SECRET_KEY.to_string()
}

fn default_keep_secret() -> bool {
    true
}

// -----------------------------------------------------------------------------
// Image structure

#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
pub struct Image {
    #[serde(rename = "pullFrom")]
    pub pull_from: String,
    #[serde(rename = "pullSecrets", default)]
    pub pull_secrets: String,
    #[serde(rename = "version", default)]
    pub version: String,
}

// -----------------------------------------------------------------------------
// Persistence structure

#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
pub struct Persistence {
    #[serde(rename = "size", default)]
    pub size: String,
    #[serde(rename = "storageClass", default)]
    pub storage_class: String,
    #[serde(rename = "accessMode", default)]
    pub access_mode: String,
}

impl Persistence {
    /// returns if the service requests its own claim instead of sharing the
    /// database volume
    pub fn dedicated(&self) -> bool {
        !self.size.is_empty()
    }
}

// -----------------------------------------------------------------------------
// Password structure

#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Password {
    #[serde(rename = "secretName", default)]
    pub secret_name: String,
    #[serde(rename = "secretKey", default = "default_secret_key")]
    pub secret_key: String,
    #[serde(rename = "keepSecret", default = "default_keep_secret")]
    pub keep_secret: bool,
}

impl Default for Password {
    fn default() -> Self {
        Self {
            secret_name: String::new(),
            secret_key: default_secret_key(),
            keep_secret: default_keep_secret(),
        }
    }
}

// -----------------------------------------------------------------------------
// RestEnableSchema structure

#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
pub struct RestEnableSchema {
    #[serde(rename = "schema")]
    pub schema: String,
    #[serde(rename = "pdb")]
    pub pdb: String,
    #[serde(rename = "enable", default)]
    pub enable: bool,
    #[serde(rename = "urlMapping", default)]
    pub url_mapping: String,
}

impl RestEnableSchema {
    /// returns the url segment under which the schema is published
    pub fn url_pattern(&self) -> String {
        default_or(&self.url_mapping, &self.schema).to_lowercase()
    }
}

// -----------------------------------------------------------------------------
// Spec structure

#[derive(CustomResource, JsonSchema, Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
#[kube(group = "database.oracle.com")]
#[kube(version = "v1alpha1")]
#[kube(kind = "OracleRestDataService")]
#[kube(singular = "oraclerestdataservice")]
#[kube(plural = "oraclerestdataservices")]
#[kube(shortname = "ords")]
#[kube(status = "Status")]
#[kube(namespaced)]
#[kube(derive = "PartialEq")]
#[kube(
    printcolumn = r#"{"name":"status", "type":"string", "description":"Status", "jsonPath":".status.status"}"#
)]
#[kube(
    printcolumn = r#"{"name":"database", "type":"string", "description":"Database", "jsonPath":".spec.databaseRef"}"#
)]
#[kube(
    printcolumn = r#"{"name":"service ip", "type":"string", "description":"Service IP", "jsonPath":".status.serviceIP"}"#
)]
#[kube(
    printcolumn = r#"{"name":"replicas", "type":"integer", "description":"Replicas", "jsonPath":".status.replicas"}"#
)]
pub struct Spec {
    #[serde(rename = "databaseRef")]
    pub database_ref: String,
    #[serde(rename = "image")]
    pub image: Image,
    #[serde(rename = "replicas", default = "default_replicas")]
    pub replicas: i32,
    #[serde(rename = "persistence", default)]
    pub persistence: Persistence,
    #[serde(rename = "adminPassword")]
    pub admin_password: Password,
    #[serde(rename = "ordsPassword")]
    pub ords_password: Password,
    #[serde(rename = "apexPassword", default)]
    pub apex_password: Password,
    #[serde(rename = "restEnableSchemas", default)]
    pub rest_enable_schemas: Vec<RestEnableSchema>,
    #[serde(rename = "loadBalancer", default)]
    pub load_balancer: bool,
    #[serde(rename = "nodeSelector", default)]
    pub node_selector: BTreeMap<String, String>,
    #[serde(rename = "serviceAccountName", default)]
    pub service_account_name: String,
    #[serde(rename = "oracleService", default)]
    pub oracle_service: String,
    #[serde(rename = "ordsUser", default)]
    pub ords_user: String,
}

// -----------------------------------------------------------------------------
// State enumeration

/// lifecycle state surfaced to operators.
///
/// `Pending -> Updating -> Ready`, `NotReady` and `Error` are reachable from
/// any state. None of them is terminal.
#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum State {
    #[default]
    #[serde(rename = "Pending")]
    Pending,
    #[serde(rename = "Updating")]
    Updating,
    #[serde(rename = "Healthy")]
    Ready,
    #[serde(rename = "Unhealthy")]
    NotReady,
    #[serde(rename = "Error")]
    Error,
}

impl Display for State {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Updating => write!(f, "Updating"),
            Self::Ready => write!(f, "Healthy"),
            Self::NotReady => write!(f, "Unhealthy"),
            Self::Error => write!(f, "Error"),
        }
    }
}

// -----------------------------------------------------------------------------
// Status structure

#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
pub struct Status {
    #[serde(rename = "status", default)]
    pub state: State,
    #[serde(rename = "serviceIP", default)]
    pub service_ip: String,
    #[serde(rename = "databaseApiUrl", default)]
    pub database_api_url: String,
    #[serde(rename = "databaseActionsUrl", default)]
    pub database_actions_url: String,
    #[serde(rename = "apexUrl", default)]
    pub apex_url: String,
    #[serde(rename = "ordsInstalled", default)]
    pub ords_installed: bool,
    #[serde(rename = "apexConfigured", default)]
    pub apex_configured: bool,
    #[serde(rename = "commonUsersCreated", default)]
    pub common_users_created: bool,
    #[serde(rename = "replicas", default)]
    pub replicas: i32,
    #[serde(rename = "databaseRef", default, skip_serializing_if = "Option::is_none")]
    pub database_ref: Option<String>,
    #[serde(rename = "loadBalancer", default, skip_serializing_if = "Option::is_none")]
    pub load_balancer: Option<bool>,
    #[serde(rename = "image", default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Image>,
}

// -----------------------------------------------------------------------------
// OracleRestDataService implementation

impl OracleRestDataService {
    pub fn status(&self) -> Status {
        self.status.to_owned().unwrap_or_default()
    }

    pub fn status_mut(&mut self) -> &mut Status {
        self.status.get_or_insert_with(Status::default)
    }

    pub fn set_state(&mut self, state: State) {
        self.status_mut().state = state;
    }

    pub fn ords_user(&self) -> &str {
        default_or(&self.spec.ords_user, DEFAULT_ORDS_USER)
    }

    pub fn service_account_name(&self) -> &str {
        default_or(&self.spec.service_account_name, DEFAULT_SERVICE_ACCOUNT)
    }

    /// returns the name of the claim mounted by the worker pods, either our
    /// own or the one of the database
    pub fn claim_name(&self, database: &str) -> String {
        if self.spec.persistence.dedicated() {
            kube::ResourceExt::name_any(self)
        } else {
            database.to_string()
        }
    }
}
