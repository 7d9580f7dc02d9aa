//! # Event module
//!
//! This module provide helpers to interact with the kubernetes core/v1/event
//! api

use std::fmt::Debug;

use chrono::Utc;
use k8s_openapi::{
    api::core::v1::{Event, EventSource},
    apimachinery::pkg::apis::meta::v1::{MicroTime, Time},
};
use kube::{api::ObjectMeta, CustomResourceExt, ResourceExt};

use crate::svc::k8s::{recorder::Level, resource};

// -----------------------------------------------------------------------------
// constants

pub const REPORTING_COMPONENT: &str = "ords-operator";

// -----------------------------------------------------------------------------
// Helper functions

/// create a new event from the given parameters
pub fn new<T, U>(obj: &T, kind: &Level, reason: &U, message: &str) -> Event
where
    T: ResourceExt + CustomResourceExt + Debug,
    U: ToString + Debug,
{
    let now = Utc::now();

    Event {
        metadata: ObjectMeta {
            namespace: obj.namespace(),
            name: Some(format!(
                "{}-{}-{}",
                obj.name_any(),
                reason.to_string().to_lowercase(),
                now.timestamp_nanos_opt().unwrap_or_else(|| now.timestamp())
            )),
            ..Default::default()
        },
        type_: Some(kind.to_string()),
        action: Some(reason.to_string()),
        count: Some(1),
        event_time: Some(MicroTime(now)),
        first_timestamp: Some(Time(now)),
        involved_object: resource::object_reference(obj),
        last_timestamp: Some(Time(now)),
        message: Some(message.to_string()),
        reason: Some(reason.to_string()),
        reporting_component: Some(REPORTING_COMPONENT.to_string()),
        reporting_instance: Some(format!(
            "{}/{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        )),
        series: None,
        source: Some(source()),
        ..Default::default()
    }
}

/// returns the source of this operator
pub fn source() -> EventSource {
    let host = hostname::get()
        .ok()
        .map(|host| host.to_string_lossy().to_string());

    EventSource {
        component: Some(REPORTING_COMPONENT.to_string()),
        host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::svc::ords::{testing, Reason};

    #[test]
    fn event_describes_the_instance() {
        let obj = testing::instance();
        let event = new(&obj, &Level::Warning, &Reason::SchemaSkipped, "pdb is missing");

        let name = event.metadata.name.unwrap_or_default();
        assert!(name.starts_with("ords-sample-schemaskipped-"));
        assert_eq!(event.metadata.namespace.as_deref(), Some(testing::NAMESPACE));
        assert_eq!(event.type_.as_deref(), Some("Warning"));
        assert_eq!(event.reason.as_deref(), Some("SchemaSkipped"));
        assert_eq!(event.message.as_deref(), Some("pdb is missing"));
        assert_eq!(event.reporting_component.as_deref(), Some("ords-operator"));
        assert_eq!(event.involved_object.kind.as_deref(), Some("OracleRestDataService"));
        assert_eq!(event.involved_object.name.as_deref(), Some(testing::NAME));
        assert_eq!(
            event.source.and_then(|source| source.component).as_deref(),
            Some(REPORTING_COMPONENT)
        );
    }
}
