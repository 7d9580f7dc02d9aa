//! # Testing module
//!
//! In-memory object store, scripted remote executor and fixtures shared by
//! the tests of the reconciliation phases.

use std::{
    collections::BTreeMap,
    io,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use k8s_openapi::{
    api::core::v1::{
        Container, Event, Node, NodeAddress, NodeStatus, PersistentVolumeClaim, Pod, PodCondition,
        PodSpec, PodStatus, Secret, Service,
    },
    ByteString,
};
use kube::{api::ObjectMeta, error::ErrorResponse, ResourceExt};

use crate::svc::{
    cfg::{Configuration, Teardown},
    crd::{
        database::{self, SingleInstanceDatabase, StatusPatch},
        rest_data_service::{self, Image, OracleRestDataService, Password, Spec, Status},
    },
    k8s::{
        exec::{self, Output, RemoteExecutor},
        pod::Labels,
        store::ObjectStore,
        Context,
    },
};

// -----------------------------------------------------------------------------
// Constants

pub const NAMESPACE: &str = "default";
pub const NAME: &str = "ords-sample";
pub const DATABASE: &str = "sidb-sample";
pub const ADMIN_SECRET: &str = "db-admin";
pub const ORDS_SECRET: &str = "ords-secret";
pub const APEX_SECRET: &str = "apex-secret";
pub const PASSWORD: &str = "Welcome1";
pub const PULL_FROM: &str = "container-registry.oracle.com/database/ords:21.4.2";
pub const VERSION: &str = "21.4.2";
pub const DATABASE_PULL_FROM: &str = "container-registry.oracle.com/database/enterprise:21.3.0";
pub const DATABASE_VERSION: &str = "21.3.0";
pub const DATABASE_POD: &str = "sidb-sample-x1y2z";

// -----------------------------------------------------------------------------
// Fixtures

pub fn instance() -> OracleRestDataService {
    let mut obj = OracleRestDataService::new(
        NAME,
        Spec {
            database_ref: DATABASE.to_string(),
            image: Image {
                pull_from: PULL_FROM.to_string(),
                pull_secrets: String::new(),
                version: VERSION.to_string(),
            },
            replicas: 1,
            persistence: Default::default(),
            admin_password: Password {
                secret_name: ADMIN_SECRET.to_string(),
                ..Default::default()
            },
            ords_password: Password {
                secret_name: ORDS_SECRET.to_string(),
                ..Default::default()
            },
            apex_password: Password::default(),
            rest_enable_schemas: vec![],
            load_balancer: false,
            node_selector: BTreeMap::new(),
            service_account_name: String::new(),
            oracle_service: String::new(),
            ords_user: String::new(),
        },
    );

    obj.metadata.namespace = Some(NAMESPACE.to_string());
    obj.metadata.uid = Some("5f0c8a52-4a57-4b39-a4c4-0d3cbb5ab0f1".to_string());
    obj
}

pub fn database() -> SingleInstanceDatabase {
    let mut obj = SingleInstanceDatabase::new(
        DATABASE,
        database::Spec {
            sid: "ORCLCDB".to_string(),
            image: database::Image {
                pull_from: DATABASE_PULL_FROM.to_string(),
                version: DATABASE_VERSION.to_string(),
            },
            persistence: database::Persistence {
                access_mode: "ReadWriteMany".to_string(),
            },
        },
    );

    obj.metadata.namespace = Some(NAMESPACE.to_string());
    obj.status = Some(database::Status {
        status: database::STATUS_HEALTHY.to_string(),
        pdb_name: "ORCLPDB1".to_string(),
        ..Default::default()
    });
    obj
}

pub fn secret(name: &str, key: &str, value: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            key.to_string(),
            ByteString(value.as_bytes().to_vec()),
        )])),
        ..Default::default()
    }
}

/// returns a running and ready pod carrying the given labels and image
pub fn ready_pod(name: &str, labels: &Labels, image: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            labels: Some(labels.to_map()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: labels.app.to_owned(),
                image: Some(image.to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }),
        status: Some(PodStatus {
            phase: Some("Running".to_string()),
            conditions: Some(vec![PodCondition {
                type_: "Ready".to_string(),
                status: "True".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}

pub fn node(addresses: &[(&str, &str)]) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some("worker-1".to_string()),
            ..Default::default()
        },
        status: Some(NodeStatus {
            addresses: Some(
                addresses
                    .iter()
                    .map(|(type_, address)| NodeAddress {
                        type_: type_.to_string(),
                        address: address.to_string(),
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// configuration without delays so retries do not slow the tests down
pub fn config() -> Configuration {
    let mut config = Configuration::default();
    config.operator.requeue_delay = 15;
    config.teardown = Teardown {
        secret_attempts: 2,
        secret_delay: 0,
        status_attempts: 3,
        status_delay: 0,
    };

    config
}

pub fn not_found(name: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("\"{}\" not found", name),
        reason: "NotFound".to_string(),
        code: 404,
    })
}

fn conflict(name: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("\"{}\" already exists", name),
        reason: "AlreadyExists".to_string(),
        code: 409,
    })
}

// -----------------------------------------------------------------------------
// FakeStore structure

#[derive(Default)]
pub struct Objects {
    pub instance: Option<OracleRestDataService>,
    pub database: Option<SingleInstanceDatabase>,
    pub secrets: BTreeMap<String, Secret>,
    pub services: BTreeMap<String, Service>,
    pub claims: BTreeMap<String, PersistentVolumeClaim>,
    pub pods: Vec<Pod>,
    pub nodes: Vec<Node>,
    pub events: Vec<Event>,
    pub status_writes: usize,
    pub created_pods: usize,
    pub created_secrets: usize,
    pub created_services: usize,
    pub deleted_pods: Vec<String>,
    /// creations and deletions of pods in call order
    pub pod_operations: Vec<String>,
    /// number of upcoming database status writes to reject
    pub failing_database_writes: usize,
}

/// object store keeping every object in memory
#[derive(Default)]
pub struct FakeStore {
    objects: Mutex<Objects>,
}

impl FakeStore {
    pub fn with<T>(&self, f: impl FnOnce(&mut Objects) -> T) -> T {
        let mut objects = self.objects.lock().unwrap();
        f(&mut objects)
    }

    pub fn instance(&self) -> OracleRestDataService {
        self.with(|o| o.instance.to_owned().unwrap())
    }

    pub fn database(&self) -> SingleInstanceDatabase {
        self.with(|o| o.database.to_owned().unwrap())
    }

    pub fn update_instance(&self, f: impl FnOnce(&mut OracleRestDataService)) {
        self.with(|o| f(o.instance.as_mut().unwrap()))
    }

    pub fn update_database(&self, f: impl FnOnce(&mut SingleInstanceDatabase)) {
        self.with(|o| f(o.database.as_mut().unwrap()))
    }

    pub fn remove_database(&self) {
        self.with(|o| o.database = None)
    }

    pub fn insert_secret(&self, secret: Secret) {
        self.with(|o| o.secrets.insert(secret.name_any(), secret));
    }

    pub fn remove_secret(&self, name: &str) {
        self.with(|o| o.secrets.remove(name));
    }

    pub fn secret(&self, name: &str) -> Option<Secret> {
        self.with(|o| o.secrets.get(name).cloned())
    }

    pub fn insert_pod(&self, pod: Pod) {
        self.with(|o| o.pods.push(pod))
    }

    pub fn insert_service(&self, service: Service) {
        self.with(|o| o.services.insert(service.name_any(), service));
    }

    pub fn pods(&self) -> Vec<Pod> {
        self.with(|o| o.pods.to_owned())
    }

    /// returns the names of the pods carrying the given app label
    pub fn pod_names(&self, app: &str) -> Vec<String> {
        self.with(|o| {
            o.pods
                .iter()
                .filter(|p| p.labels().get("app").map(String::as_str) == Some(app))
                .map(ResourceExt::name_any)
                .collect()
        })
    }

    pub fn reasons(&self) -> Vec<String> {
        self.with(|o| {
            o.events
                .iter()
                .filter_map(|e| e.reason.to_owned())
                .collect()
        })
    }

    pub fn messages(&self) -> Vec<String> {
        self.with(|o| {
            o.events
                .iter()
                .filter_map(|e| e.message.to_owned())
                .collect()
        })
    }

    pub fn status_writes(&self) -> usize {
        self.with(|o| o.status_writes)
    }
}

fn matches(pod: &Pod, selector: &str) -> bool {
    let labels = pod.labels();

    selector
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .all(|(k, v)| labels.get(k).map(String::as_str) == Some(v))
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn get_instance(
        &self,
        _namespace: &str,
        _name: &str,
    ) -> Result<Option<OracleRestDataService>, kube::Error> {
        Ok(self.with(|o| o.instance.to_owned()))
    }

    async fn patch_instance(
        &self,
        _origin: &OracleRestDataService,
        modified: &OracleRestDataService,
    ) -> Result<OracleRestDataService, kube::Error> {
        self.with(|o| {
            let stored = o.instance.as_mut().ok_or_else(|| not_found(NAME))?;
            stored.metadata = modified.metadata.to_owned();
            stored.spec = modified.spec.to_owned();
            Ok(stored.to_owned())
        })
    }

    async fn patch_instance_status(
        &self,
        _namespace: &str,
        _name: &str,
        status: &Status,
    ) -> Result<(), kube::Error> {
        self.with(|o| {
            let stored = o.instance.as_mut().ok_or_else(|| not_found(NAME))?;
            stored.status = Some(status.to_owned());
            o.status_writes += 1;
            Ok(())
        })
    }

    async fn get_database(
        &self,
        _namespace: &str,
        _name: &str,
    ) -> Result<Option<SingleInstanceDatabase>, kube::Error> {
        Ok(self.with(|o| o.database.to_owned()))
    }

    async fn patch_database_status(
        &self,
        _namespace: &str,
        name: &str,
        status: &StatusPatch,
    ) -> Result<(), kube::Error> {
        self.with(|o| {
            if o.failing_database_writes > 0 {
                o.failing_database_writes -= 1;
                return Err(conflict(name));
            }

            let stored = o.database.as_mut().ok_or_else(|| not_found(name))?;
            let current = stored.status_mut();
            current.ords_reference = status.ords_reference.to_owned();
            current.apex_installed = status.apex_installed;
            Ok(())
        })
    }

    async fn get_secret(&self, _namespace: &str, name: &str) -> Result<Option<Secret>, kube::Error> {
        Ok(self.secret(name))
    }

    async fn create_secret(&self, secret: &Secret) -> Result<(), kube::Error> {
        self.with(|o| {
            let name = secret.name_any();
            if o.secrets.contains_key(&name) {
                return Err(conflict(&name));
            }

            o.secrets.insert(name, secret.to_owned());
            o.created_secrets += 1;
            Ok(())
        })
    }

    async fn delete_secret(&self, _namespace: &str, name: &str) -> Result<(), kube::Error> {
        self.remove_secret(name);
        Ok(())
    }

    async fn get_service(
        &self,
        _namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, kube::Error> {
        Ok(self.with(|o| o.services.get(name).cloned()))
    }

    async fn create_service(&self, service: &Service) -> Result<Service, kube::Error> {
        self.with(|o| {
            let mut service = service.to_owned();
            if let Some(port) = service
                .spec
                .as_mut()
                .and_then(|spec| spec.ports.as_mut())
                .and_then(|ports| ports.first_mut())
            {
                port.node_port = Some(30443);
            }

            o.services.insert(service.name_any(), service.to_owned());
            o.created_services += 1;
            Ok(service)
        })
    }

    async fn get_claim(
        &self,
        _namespace: &str,
        name: &str,
    ) -> Result<Option<PersistentVolumeClaim>, kube::Error> {
        Ok(self.with(|o| o.claims.get(name).cloned()))
    }

    async fn create_claim(&self, claim: &PersistentVolumeClaim) -> Result<(), kube::Error> {
        self.with(|o| {
            o.claims.insert(claim.name_any(), claim.to_owned());
            Ok(())
        })
    }

    async fn list_pods(&self, _namespace: &str, selector: &str) -> Result<Vec<Pod>, kube::Error> {
        Ok(self.with(|o| {
            o.pods
                .iter()
                .filter(|p| matches(p, selector))
                .cloned()
                .collect()
        }))
    }

    async fn create_pod(&self, pod: &Pod) -> Result<(), kube::Error> {
        self.with(|o| {
            o.pods.push(pod.to_owned());
            o.created_pods += 1;
            o.pod_operations.push(format!("create:{}", pod.name_any()));
            Ok(())
        })
    }

    async fn delete_pod(&self, _namespace: &str, name: &str) -> Result<(), kube::Error> {
        self.with(|o| {
            o.pods.retain(|p| p.name_any() != name);
            o.deleted_pods.push(name.to_string());
            o.pod_operations.push(format!("delete:{}", name));
            Ok(())
        })
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, kube::Error> {
        Ok(self.with(|o| o.nodes.to_owned()))
    }

    async fn create_event(&self, event: &Event) -> Result<(), kube::Error> {
        self.with(|o| o.events.push(event.to_owned()));
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// FakeExecutor structure

/// remote executor answering with scripted outputs, the most recently
/// registered response whose pattern is found in the script wins. A script
/// without response gets an empty output.
#[derive(Default)]
pub struct FakeExecutor {
    responses: Mutex<Vec<(String, Option<Output>)>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeExecutor {
    pub fn respond(&self, pattern: &str, stdout: &str) {
        self.responses
            .lock()
            .unwrap()
            .push((pattern.to_string(), Some(Output::new(stdout))));
    }

    /// the transport fails for scripts containing the pattern
    pub fn fail(&self, pattern: &str) {
        self.responses
            .lock()
            .unwrap()
            .push((pattern.to_string(), None));
    }

    /// returns the pods and scripts executed so far
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().to_owned()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.calls()
            .iter()
            .filter(|(_, script)| script.contains(pattern))
            .count()
    }

    pub fn ran(&self, pattern: &str) -> bool {
        self.count(pattern) > 0
    }
}

#[async_trait]
impl RemoteExecutor for FakeExecutor {
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        _container: Option<String>,
        command: Vec<String>,
    ) -> Result<Output, exec::Error> {
        let script = command.last().cloned().unwrap_or_default();
        self.calls
            .lock()
            .unwrap()
            .push((pod.to_string(), script.to_owned()));

        let response = self
            .responses
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(pattern, _)| script.contains(pattern.as_str()))
            .map(|(_, output)| output.to_owned());

        match response {
            Some(Some(output)) => Ok(output),
            Some(None) => Err(exec::Error::Read(
                namespace.to_string(),
                pod.to_string(),
                io::Error::new(io::ErrorKind::BrokenPipe, "stream closed"),
            )),
            None => Ok(Output::default()),
        }
    }
}

// -----------------------------------------------------------------------------
// Fixture structure

/// a cluster holding the instance, a healthy database with its ready pod, the
/// admin and ords credentials and a single node
pub struct Fixture {
    pub store: Arc<FakeStore>,
    pub executor: Arc<FakeExecutor>,
    pub config: Configuration,
}

impl Fixture {
    pub fn new() -> Self {
        let store = FakeStore::default();
        store.with(|o| {
            o.instance = Some(instance());
            o.database = Some(database());
            o.nodes = vec![node(&[("InternalIP", "10.0.0.4")])];
        });

        store.insert_secret(secret(
            ADMIN_SECRET,
            rest_data_service::DEFAULT_SECRET_KEY,
            PASSWORD,
        ));
        store.insert_secret(secret(
            ORDS_SECRET,
            rest_data_service::DEFAULT_SECRET_KEY,
            PASSWORD,
        ));
        store.insert_pod(ready_pod(
            DATABASE_POD,
            &Labels::new(DATABASE, DATABASE_VERSION),
            DATABASE_PULL_FROM,
        ));

        Self {
            store: Arc::new(store),
            executor: Arc::new(FakeExecutor::default()),
            config: config(),
        }
    }

    pub fn context(&self) -> Arc<Context> {
        Arc::new(Context::new(
            self.store.to_owned(),
            self.executor.to_owned(),
            Arc::new(self.config.to_owned()),
        ))
    }

    /// add a ready worker pod matching the current spec of the instance
    pub fn ready_worker(&self, name: &str) {
        let obj = self.store.instance();
        self.store.insert_pod(ready_pod(
            name,
            &super::template::labels(&obj),
            &obj.spec.image.pull_from,
        ));
    }
}
