//! # Exec module
//!
//! This module provide the remote executor used to run shell and sql scripts
//! inside a running pod, and the helpers classifying their output. The outcome
//! of a script is decided by inspecting its output for textual markers, the
//! transport error only tells that the command could not be run at all.

use async_trait::async_trait;
use futures::future;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{AttachParams, AttachedProcess},
    Api, Client,
};
#[cfg(test)]
use mockall::automock;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

// -----------------------------------------------------------------------------
// Constants

pub const ERROR_MARKER: &str = "ERROR";
pub const ORACLE_ERROR_PREFIX: &str = "ORA-";

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to execute command in pod '{0}/{1}', {2}")]
    Attach(String, String, kube::Error),
    #[error("failed to read output of command in pod '{0}/{1}', {2}")]
    Read(String, String, std::io::Error),
}

// -----------------------------------------------------------------------------
// Output structure

#[derive(PartialEq, Eq, Clone, Debug, Default)]
pub struct Output {
    pub stdout: String,
    pub stderr: String,
}

impl Output {
    pub fn new(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// returns standard output followed by standard error
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            return self.stdout.to_owned();
        }

        format!("{}\n{}", self.stdout, self.stderr)
    }

    pub fn contains(&self, marker: &str) -> bool {
        self.stdout.contains(marker) || self.stderr.contains(marker)
    }

    /// returns if the output carries the generic error marker, case insensitive
    pub fn has_error(&self) -> bool {
        self.combined().to_uppercase().contains(ERROR_MARKER)
    }

    /// returns the distinct oracle error codes found in the output, e.g.
    /// `ORA-01920`
    pub fn oracle_errors(&self) -> Vec<String> {
        let combined = self.combined();
        let mut codes: Vec<String> = combined
            .match_indices(ORACLE_ERROR_PREFIX)
            .filter_map(|(idx, _)| {
                let digits: String = combined[idx + ORACLE_ERROR_PREFIX.len()..]
                    .chars()
                    .take_while(char::is_ascii_digit)
                    .collect();

                if digits.is_empty() {
                    None
                } else {
                    Some(format!("{}{}", ORACLE_ERROR_PREFIX, digits))
                }
            })
            .collect();

        codes.sort();
        codes.dedup();
        codes
    }

    /// returns if the output carries the generic error marker or any oracle
    /// error code
    pub fn failed(&self) -> bool {
        self.has_error() || !self.oracle_errors().is_empty()
    }

    /// returns if the output contains no error, or only the whitelisted
    /// oracle error codes
    pub fn succeeded_except(&self, whitelist: &[&str]) -> bool {
        let codes = self.oracle_errors();
        if codes.is_empty() {
            return !self.has_error();
        }

        codes.iter().all(|code| whitelist.contains(&code.as_str()))
    }

    /// returns the lines of the output
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines().map(str::trim).filter(|l| !l.is_empty())
    }
}

// -----------------------------------------------------------------------------
// RemoteExecutor trait

/// run a command inside a container of a pod and returns its output
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<String>,
        command: Vec<String>,
    ) -> Result<Output, Error>;
}

/// returns a `bash -c` command line running the given script
pub fn bash(script: impl Into<String>) -> Vec<String> {
    vec!["bash".to_string(), "-c".to_string(), script.into()]
}

// -----------------------------------------------------------------------------
// PodExecutor structure

/// executes commands through the websocket exec api of kubernetes
#[derive(Clone)]
pub struct PodExecutor {
    kube: Client,
}

impl From<Client> for PodExecutor {
    fn from(kube: Client) -> Self {
        Self { kube }
    }
}

async fn drain<R>(reader: Option<R>) -> Result<String, std::io::Error>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![];
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }

    Ok(String::from_utf8_lossy(&buf).to_string())
}

#[async_trait]
impl RemoteExecutor for PodExecutor {
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<String>,
        command: Vec<String>,
    ) -> Result<Output, Error> {
        let api: Api<Pod> = Api::namespaced(self.kube.to_owned(), namespace);
        let mut params = AttachParams::default().stdout(true).stderr(true);
        if let Some(container) = container {
            params = params.container(container);
        }

        debug!(
            namespace = namespace,
            pod = pod,
            "Execute command in pod",
        );

        let mut process: AttachedProcess = api
            .exec(pod, command, &params)
            .await
            .map_err(|err| Error::Attach(namespace.to_string(), pod.to_string(), err))?;

        let (stdout, stderr) = future::join(drain(process.stdout()), drain(process.stderr())).await;
        let output = Output {
            stdout: stdout
                .map_err(|err| Error::Read(namespace.to_string(), pod.to_string(), err))?,
            stderr: stderr
                .map_err(|err| Error::Read(namespace.to_string(), pod.to_string(), err))?,
        };

        if let Some(status) = process.take_status() {
            if let Some(status) = status.await {
                trace!(
                    namespace = namespace,
                    pod = pod,
                    status = status.status.unwrap_or_default(),
                    message = status.message.unwrap_or_default(),
                    "Command in pod terminated",
                );
            }
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oracle_errors_are_extracted_once() {
        let output = Output::new(
            "ERROR at line 1:\nORA-01920: user name 'C##DBAPI_CDB_ADMIN' conflicts\nORA-01920: again",
        );

        assert_eq!(output.oracle_errors(), vec!["ORA-01920".to_string()]);
        assert!(output.succeeded_except(&["ORA-01920"]));
        assert!(!output.succeeded_except(&[]));
    }

    #[test]
    fn generic_error_without_code_fails() {
        let output = Output::new("SP2-0310: unable to open file\nerror");

        assert!(output.has_error());
        assert!(!output.succeeded_except(&["ORA-01920"]));
    }

    #[test]
    fn oracle_code_alone_is_a_failure() {
        let output = Output::new("ORA-04043: object ORDS_METADATA does not exist");

        assert!(!output.has_error());
        assert!(output.failed());
    }

    #[test]
    fn clean_output_succeeds() {
        let output = Output::new("User created.\nGrant succeeded.");

        assert!(output.succeeded_except(&["ORA-01920"]));
    }

    #[test]
    fn stderr_is_inspected() {
        let output = Output {
            stdout: String::new(),
            stderr: "< HTTP/1.1 200 OK".to_string(),
        };

        assert!(output.contains("HTTP/1.1 200 OK"));
        assert!(!output.has_error());
    }
}
