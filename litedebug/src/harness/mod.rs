//! Hive harness
//!
//! The types exchanged with the hive simulator API, the [`Harness`] seam the
//! runner drives, and the suite description the runner executes.

pub mod hive;
pub mod runner;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::config::Params;

pub use hive::HiveSimulation;
pub use runner::run_suite;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SuiteId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestId(pub u32);

impl fmt::Display for SuiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A client image known to the harness
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDefinition {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub meta: ClientMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMetadata {
    #[serde(default)]
    pub roles: Vec<String>,
}

impl ClientDefinition {
    pub fn has_role(&self, role: &str) -> bool {
        self.meta.roles.iter().any(|r| r == role)
    }
}

/// Verdict reported when a test ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub pass: bool,
    pub details: String,
}

impl TestResult {
    pub fn passed() -> Self {
        Self {
            pass: true,
            details: String::new(),
        }
    }

    pub fn failed(details: impl Into<String>) -> Self {
        Self {
            pass: false,
            details: details.into(),
        }
    }
}

/// Everything needed to start one client container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientLaunch {
    pub client: String,
    pub environment: Params,
    /// Destination path inside the container -> contents
    pub files: BTreeMap<String, Vec<u8>>,
}

/// A running client container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub id: String,
    pub ip: String,
}

/// Operations of the hive simulator API
#[async_trait]
pub trait Harness: Send + Sync {
    async fn client_types(&self) -> Result<Vec<ClientDefinition>>;

    async fn start_suite(&self, name: &str, description: &str) -> Result<SuiteId>;

    async fn end_suite(&self, suite: SuiteId) -> Result<()>;

    async fn start_test(&self, suite: SuiteId, name: &str, description: &str) -> Result<TestId>;

    async fn end_test(&self, suite: SuiteId, test: TestId, result: &TestResult) -> Result<()>;

    async fn start_client(
        &self,
        suite: SuiteId,
        test: TestId,
        launch: &ClientLaunch,
    ) -> Result<ClientInfo>;
}

/// The client a test body runs against
#[derive(Debug, Clone)]
pub struct ClientHandle {
    /// Client definition name, e.g. `kcc`
    pub name: String,
    pub info: ClientInfo,
}

pub type ClientTestFn = Arc<dyn Fn(ClientHandle) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A test run once per client having `role`
#[derive(Clone)]
pub struct ClientTestSpec {
    pub role: String,
    pub name: String,
    pub description: String,
    pub files: BTreeMap<String, Vec<u8>>,
    pub parameters: Params,
    pub run: ClientTestFn,
}

impl ClientTestSpec {
    /// Test name reported for `client`
    pub fn test_name(&self, client: &str) -> String {
        format!("{} ({})", self.name, client)
    }

    /// Launch request for `client`, which also learns its own name
    pub fn launch_for(&self, client: &str) -> ClientLaunch {
        ClientLaunch {
            client: client.to_string(),
            environment: self.parameters.clone().with("CLIENT", client),
            files: self.files.clone(),
        }
    }
}

impl fmt::Debug for ClientTestSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientTestSpec")
            .field("role", &self.role)
            .field("name", &self.name)
            .field("files", &self.files.keys().collect::<Vec<_>>())
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct Suite {
    pub name: String,
    pub description: String,
    pub tests: Vec<ClientTestSpec>,
}
