//! # Custom resource definition module
//!
//! This module provides custom resource module command line interface function
//! implementation

use std::{error::Error, str::FromStr, sync::Arc};

use async_trait::async_trait;
use clap::Subcommand;
use kube::CustomResourceExt;

use crate::{
    cmd::Executor,
    svc::{
        cfg::Configuration,
        crd::{database::SingleInstanceDatabase, rest_data_service::OracleRestDataService},
    },
};

// -----------------------------------------------------------------------------
// CustomResource enum

#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Debug)]
pub enum CustomResource {
    OracleRestDataService,
    SingleInstanceDatabase,
}

impl FromStr for CustomResource {
    type Err = Box<dyn Error + Send + Sync>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ords" | "oraclerestdataservice" => Ok(Self::OracleRestDataService),
            "sidb" | "singleinstancedatabase" => Ok(Self::SingleInstanceDatabase),
            _ => Err(format!(
                "failed to parse '{}', available options are 'oraclerestdataservice' (ords) or 'singleinstancedatabase' (sidb)",
                s
            )
            .into()),
        }
    }
}

// -----------------------------------------------------------------------------
// CustomResourceDefinitionError enum

#[derive(thiserror::Error, Debug)]
pub enum CustomResourceDefinitionError {
    #[error("failed to serialize custom resource definition, {0}")]
    Serialize(serde_yaml::Error),
}

// -----------------------------------------------------------------------------
// CustomResourceDefinition enum

#[derive(Subcommand, Clone, Debug)]
pub enum CustomResourceDefinition {
    /// View custom resource definition
    #[clap(name = "view", aliases = &["v"])]
    View {
        #[clap(name = "custom-resource")]
        custom_resource: Option<CustomResource>,
    },
}

#[async_trait]
impl Executor for CustomResourceDefinition {
    type Error = CustomResourceDefinitionError;

    async fn execute(&self, config: Arc<Configuration>) -> Result<(), Self::Error> {
        match self {
            Self::View { custom_resource } => view(config, custom_resource).await,
        }
    }
}

// -----------------------------------------------------------------------------
// view function

/// returns the yaml document of the requested definition, the oracle rest
/// data service one when none is given. The database definition is the subset
/// read by this operator, it is meant for local clusters without the database
/// controller.
pub fn render(
    custom_resource: &Option<CustomResource>,
) -> Result<String, CustomResourceDefinitionError> {
    let resources = match custom_resource {
        Some(cr) => vec![cr.to_owned()],
        None => vec![CustomResource::OracleRestDataService],
    };

    let mut documents = vec![];
    for cr in resources {
        let document = match cr {
            CustomResource::OracleRestDataService => serde_yaml::to_string(&OracleRestDataService::crd()),
            CustomResource::SingleInstanceDatabase => {
                serde_yaml::to_string(&SingleInstanceDatabase::crd())
            }
        }
        .map_err(CustomResourceDefinitionError::Serialize)?;

        documents.push(document);
    }

    Ok(documents.join("---\n"))
}

pub async fn view(
    _config: Arc<Configuration>,
    custom_resource: &Option<CustomResource>,
) -> Result<(), CustomResourceDefinitionError> {
    print!("{}", render(custom_resource)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_are_parsed() {
        assert_eq!(
            CustomResource::from_str("ORDS").unwrap(),
            CustomResource::OracleRestDataService
        );
        assert_eq!(
            CustomResource::from_str("sidb").unwrap(),
            CustomResource::SingleInstanceDatabase
        );
        assert!(CustomResource::from_str("postgresql").is_err());
    }

    #[test]
    fn definition_is_rendered() {
        let yaml = render(&None).unwrap();

        assert!(yaml.contains("oraclerestdataservices.database.oracle.com"));
        assert!(yaml.contains("shortNames"));
        assert!(!yaml.contains("singleinstancedatabases"));
    }
}
