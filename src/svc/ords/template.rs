//! # Template module
//!
//! This module builds the child objects of a rest data service, the endpoint,
//! the claim, the worker pods and their bootstrap secret. Every object is owned
//! by the rest data service so kubernetes removes it along with its owner.

use std::collections::BTreeMap;

use k8s_openapi::{
    api::core::v1::{
        Container, ContainerPort, EnvVar, EnvVarSource, KeyToPath, LocalObjectReference,
        PersistentVolumeClaim, PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource, Pod,
        PodSecurityContext, PodSpec, ResourceRequirements, Secret, SecretKeySelector,
        SecretVolumeSource, SecurityContext, Service, ServicePort, ServiceSpec, Volume,
        VolumeMount,
    },
    apimachinery::pkg::{api::resource::Quantity, apis::meta::v1::LabelSelector},
};
use kube::{api::ObjectMeta, ResourceExt};
use rand::{distributions::Alphanumeric, Rng};

use crate::svc::{
    crd::{
        database::{SingleInstanceDatabase, LISTENER_PORT},
        rest_data_service::{default_or, OracleRestDataService, Password},
    },
    k8s::{pod::Labels, resource, secret},
    ords::sql,
};

// -----------------------------------------------------------------------------
// Constants

pub const SERVICE_PORT: i32 = 8443;
pub const SERVICE_PORT_NAME: &str = "client";
pub const ORACLE_UID: i64 = 54321;
pub const DBA_GID: i64 = 54322;
pub const INIT_CMD_KEY: &str = "init-cmd";
pub const STORAGE_CLASS_OCI: &str = "oci";

const DATA_VOLUME: &str = "datamount";
const INIT_VOLUME: &str = "init-ords-vol";
const TERMINATION_GRACE_PERIOD: i64 = 30;

// -----------------------------------------------------------------------------
// Helpers functions

fn metadata(obj: &OracleRestDataService, name: String, labels: BTreeMap<String, String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: obj.namespace(),
        labels: Some(labels),
        owner_references: Some(vec![resource::owner_reference(obj)]),
        ..Default::default()
    }
}

/// returns the labels of the worker pods of the given instance
pub fn labels(obj: &OracleRestDataService) -> Labels {
    Labels::new(obj.name_any(), obj.spec.image.version.to_owned())
}

/// returns a pod name made of the instance name and a random suffix
pub fn pod_name(obj: &OracleRestDataService) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(5)
        .map(char::from)
        .collect();

    format!("{}-{}", obj.name_any(), suffix.to_lowercase())
}

fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn env_from_secret(name: &str, password: &Password) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: Some(password.secret_name.to_owned()),
                key: password.secret_key.to_owned(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn config_mount(database: &SingleInstanceDatabase) -> VolumeMount {
    VolumeMount {
        name: DATA_VOLUME.to_string(),
        mount_path: sql::CONFIG_DIR.to_string(),
        sub_path: Some(database.config_sub_path()),
        ..Default::default()
    }
}

/// returns the connection settings shared by the bootstrap and serving
/// containers
fn connection_env(obj: &OracleRestDataService, database: &SingleInstanceDatabase) -> Vec<EnvVar> {
    vec![
        env("ORACLE_HOST", database.name_any()),
        env("ORACLE_PORT", LISTENER_PORT),
        env(
            "ORACLE_SERVICE",
            default_or(&obj.spec.oracle_service, &database.spec.sid),
        ),
        env("ORDS_USER", obj.ords_user()),
    ]
}

// -----------------------------------------------------------------------------
// Templates

/// returns the endpoint exposing the worker pods, a load balancer or a node
/// port depending on the spec
pub fn service(obj: &OracleRestDataService) -> Service {
    let labels = labels(obj);

    Service {
        metadata: metadata(obj, obj.name_any(), labels.app_map()),
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                name: Some(SERVICE_PORT_NAME.to_string()),
                port: SERVICE_PORT,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            selector: Some(labels.app_map()),
            type_: Some(
                if obj.spec.load_balancer {
                    "LoadBalancer"
                } else {
                    "NodePort"
                }
                .to_string(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// returns the claim requested by an instance with a dedicated persistence
pub fn claim(obj: &OracleRestDataService) -> PersistentVolumeClaim {
    let persistence = &obj.spec.persistence;
    let selector = (persistence.storage_class == STORAGE_CLASS_OCI).then(|| LabelSelector {
        match_labels: Some(obj.spec.node_selector.to_owned()),
        ..Default::default()
    });

    PersistentVolumeClaim {
        metadata: metadata(obj, obj.name_any(), labels(obj).app_map()),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec![persistence.access_mode.to_owned()]),
            resources: Some(ResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(persistence.size.to_owned()),
                )])),
                ..Default::default()
            }),
            storage_class_name: Some(persistence.storage_class.to_owned()),
            selector,
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// returns the secret holding the bootstrap script of the worker pods, one
/// secret is shared by every replica
pub fn init_secret(obj: &OracleRestDataService) -> Secret {
    secret::new(
        obj,
        &obj.name_any(),
        labels(obj).app_map(),
        BTreeMap::from([(INIT_CMD_KEY.to_string(), sql::INIT_ORDS_CMD.to_string())]),
    )
}

/// returns a worker pod attached to the given database
pub fn pod(obj: &OracleRestDataService, database: &SingleInstanceDatabase) -> Pod {
    let image = &obj.spec.image;

    let mut init_env = connection_env(obj, database);
    init_env.push(env_from_secret("ORDS_PWD", &obj.spec.ords_password));
    init_env.push(env_from_secret("ORACLE_PWD", &obj.spec.admin_password));

    let image_pull_secrets = (!image.pull_secrets.is_empty()).then(|| {
        vec![LocalObjectReference {
            name: Some(image.pull_secrets.to_owned()),
        }]
    });

    Pod {
        metadata: metadata(obj, pod_name(obj), labels(obj).to_map()),
        spec: Some(PodSpec {
            volumes: Some(vec![
                Volume {
                    name: DATA_VOLUME.to_string(),
                    persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                        claim_name: obj.claim_name(&database.name_any()),
                        read_only: Some(false),
                    }),
                    ..Default::default()
                },
                Volume {
                    name: INIT_VOLUME.to_string(),
                    secret: Some(SecretVolumeSource {
                        secret_name: Some(obj.name_any()),
                        optional: Some(true),
                        items: Some(vec![KeyToPath {
                            key: INIT_CMD_KEY.to_string(),
                            path: INIT_CMD_KEY.to_string(),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            ]),
            init_containers: Some(vec![
                Container {
                    name: "init-permissions".to_string(),
                    image: Some(image.pull_from.to_owned()),
                    command: Some(vec![
                        "/bin/sh".to_string(),
                        "-c".to_string(),
                        format!("chown {}:{} {}", ORACLE_UID, DBA_GID, sql::CONFIG_DIR),
                    ]),
                    security_context: Some(SecurityContext {
                        run_as_user: Some(0),
                        ..Default::default()
                    }),
                    volume_mounts: Some(vec![config_mount(database)]),
                    ..Default::default()
                },
                Container {
                    name: "init-ords".to_string(),
                    image: Some(image.pull_from.to_owned()),
                    command: Some(vec!["/bin/sh".to_string(), sql::INIT_CMD_PATH.to_string()]),
                    security_context: Some(SecurityContext {
                        run_as_user: Some(ORACLE_UID),
                        run_as_group: Some(DBA_GID),
                        ..Default::default()
                    }),
                    volume_mounts: Some(vec![
                        config_mount(database),
                        VolumeMount {
                            name: INIT_VOLUME.to_string(),
                            mount_path: sql::INIT_CMD_PATH.to_string(),
                            sub_path: Some(INIT_CMD_KEY.to_string()),
                            read_only: Some(true),
                            ..Default::default()
                        },
                    ]),
                    env: Some(init_env),
                    ..Default::default()
                },
            ]),
            containers: vec![Container {
                name: obj.name_any(),
                image: Some(image.pull_from.to_owned()),
                ports: Some(vec![ContainerPort {
                    container_port: SERVICE_PORT,
                    ..Default::default()
                }]),
                volume_mounts: Some(vec![config_mount(database)]),
                env: Some(connection_env(obj, database)),
                ..Default::default()
            }],
            termination_grace_period_seconds: Some(TERMINATION_GRACE_PERIOD),
            node_selector: Some(obj.spec.node_selector.to_owned()),
            service_account_name: Some(obj.service_account_name().to_string()),
            security_context: Some(PodSecurityContext {
                run_as_user: Some(ORACLE_UID),
                run_as_group: Some(DBA_GID),
                ..Default::default()
            }),
            image_pull_secrets,
            ..Default::default()
        }),
        ..Default::default()
    }
}
