//! HTTP client of the hive simulator API

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::{multipart, Client, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use url::Url;

use super::{ClientDefinition, ClientInfo, ClientLaunch, Harness, SuiteId, TestId, TestResult};

/// Environment variable holding the simulator API endpoint
pub const SIMULATOR_ENV: &str = "HIVE_SIMULATOR";

/// Starting a client waits for its container to come up, which takes far
/// longer than a regular API call
const CLIENT_START_TIMEOUT: Duration = Duration::from_secs(300);

/// Hive simulator API reachable over HTTP
pub struct HiveSimulation {
    client: Client,
    base: String,
}

impl HiveSimulation {
    pub fn new(url: &Url, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base: url.as_str().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn test_path(suite: SuiteId, test: TestId) -> String {
        format!("/testsuite/{suite}/test/{test}")
    }
}

/// Turn a non-2xx answer into an error carrying the response body
async fn check_status(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    bail!("{} failed (status {}): {}", what, status, body.trim())
}

async fn decode<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    let response = check_status(response, what).await?;
    response
        .json()
        .await
        .with_context(|| format!("invalid response to {what}"))
}

#[async_trait]
impl Harness for HiveSimulation {
    async fn client_types(&self) -> Result<Vec<ClientDefinition>> {
        let response = self
            .client
            .get(self.endpoint("/clients"))
            .send()
            .await
            .context("failed to list clients")?;
        decode(response, "list clients").await
    }

    async fn start_suite(&self, name: &str, description: &str) -> Result<SuiteId> {
        let response = self
            .client
            .post(self.endpoint("/testsuite"))
            .json(&json!({ "name": name, "description": description }))
            .send()
            .await
            .context("failed to start suite")?;
        let suite: SuiteId = decode(response, "start suite").await?;
        info!("Started suite {} ({})", name, suite);
        Ok(suite)
    }

    async fn end_suite(&self, suite: SuiteId) -> Result<()> {
        let response = self
            .client
            .delete(self.endpoint(&format!("/testsuite/{suite}")))
            .send()
            .await
            .context("failed to end suite")?;
        check_status(response, "end suite").await?;
        Ok(())
    }

    async fn start_test(&self, suite: SuiteId, name: &str, description: &str) -> Result<TestId> {
        let response = self
            .client
            .post(self.endpoint(&format!("/testsuite/{suite}/test")))
            .json(&json!({ "name": name, "description": description }))
            .send()
            .await
            .context("failed to start test")?;
        decode(response, "start test").await
    }

    async fn end_test(&self, suite: SuiteId, test: TestId, result: &TestResult) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint(&Self::test_path(suite, test)))
            .json(result)
            .send()
            .await
            .context("failed to end test")?;
        check_status(response, "end test").await?;
        Ok(())
    }

    async fn start_client(
        &self,
        suite: SuiteId,
        test: TestId,
        launch: &ClientLaunch,
    ) -> Result<ClientInfo> {
        let config = serde_json::to_string(&json!({
            "client": launch.client,
            "environment": launch.environment,
        }))
        .context("failed to encode client config")?;

        // field names are container paths and must reach hive verbatim
        let mut form = multipart::Form::new()
            .percent_encode_noop()
            .text("config", config);
        for (destination, contents) in &launch.files {
            let file_name = destination
                .rsplit('/')
                .next()
                .unwrap_or(destination.as_str())
                .to_string();
            let part = multipart::Part::bytes(contents.clone()).file_name(file_name);
            form = form.part(destination.clone(), part);
        }

        if log::log_enabled!(log::Level::Debug) {
            debug!(
                "Starting client {} with parameters [{}] and files [{}]",
                launch.client,
                launch.environment.keys().collect::<Vec<_>>().join(", "),
                launch.files.keys().map(String::as_str).collect::<Vec<_>>().join(", ")
            );
        }

        let response = self
            .client
            .post(self.endpoint(&format!("{}/node", Self::test_path(suite, test))))
            .timeout(CLIENT_START_TIMEOUT)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("failed to start client {}", launch.client))?;
        let info: ClientInfo = decode(response, "start client").await?;
        info!("Client {} started: id {} ip {}", launch.client, info.id, info.ip);
        Ok(info)
    }
}
