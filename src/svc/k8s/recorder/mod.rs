//! # Event recorder module
//!
//! This module provide an alternative to the golang EventRecorder structure
//!
//! See following links for more details:
//! - <https://book-v1.book.kubebuilder.io/beyond_basics/creating_events.html>
//! - <https://github.com/kubernetes/client-go/blob/master/tools/record/event.go#L56>

use std::{
    convert::TryFrom,
    fmt::{self, Debug, Display, Formatter},
    str::FromStr,
};

use kube::{CustomResourceExt, ResourceExt};
use tracing::{debug, warn};

use crate::svc::k8s::store::ObjectStore;

pub mod event;

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to parse '{0}', available options are 'normal' or 'warning'")]
    Parse(String),
}

// -----------------------------------------------------------------------------
// Level enumeration

#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug)]
pub enum Level {
    Warning,
    Normal,
}

impl FromStr for Level {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "warning" => Self::Warning,
            "normal" => Self::Normal,
            _ => {
                return Err(Error::Parse(s.to_string()));
            }
        })
    }
}

impl TryFrom<String> for Level {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_str(&s)
    }
}

impl Display for Level {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "Warning"),
            Self::Normal => write!(f, "Normal"),
        }
    }
}

// -----------------------------------------------------------------------------
// Helper methods

/// record an event for the given object. Recording is best-effort, a failure
/// is logged and swallowed so it never interrupts a reconciliation.
pub async fn record<T, U>(store: &dyn ObjectStore, obj: &T, kind: Level, reason: &U, message: &str)
where
    T: ResourceExt + CustomResourceExt + Debug,
    U: ToString + Debug,
{
    debug!(
        reason = reason.to_string(),
        namespace = obj.namespace().unwrap_or_else(|| "<none>".to_string()),
        name = obj.name_any(),
        message = message,
        "Create event for resource",
    );

    if let Err(err) = store
        .create_event(&event::new(obj, &kind, reason, message))
        .await
    {
        warn!(
            reason = reason.to_string(),
            name = obj.name_any(),
            error = err.to_string(),
            "Could not record event for resource",
        );
    }
}

/// shortcut for the [`record`] method with the 'Normal' [`Level`]
pub async fn normal<T, U>(store: &dyn ObjectStore, obj: &T, reason: &U, message: &str)
where
    T: ResourceExt + CustomResourceExt + Debug,
    U: ToString + Debug,
{
    record(store, obj, Level::Normal, reason, message).await
}

/// shortcut for the [`record`] method with the 'Warning' [`Level`]
pub async fn warning<T, U>(store: &dyn ObjectStore, obj: &T, reason: &U, message: &str)
where
    T: ResourceExt + CustomResourceExt + Debug,
    U: ToString + Debug,
{
    record(store, obj, Level::Warning, reason, message).await
}
