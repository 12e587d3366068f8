//! The "litedebug mode" suite

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use log::info;

use crate::config::{defaults, SimulatorConfig};
use crate::harness::{ClientHandle, ClientTestSpec, Suite};
use crate::rpc::{RpcClient, RpcClientConfig};
use crate::scenarios::{run_scenario, Scenario, ScenarioSettings};

pub const SUITE_NAME: &str = "litedebug mode";
pub const SUITE_DESCRIPTION: &str = "Testcase for litedebug mode";

/// Where the genesis is staged inside every client container
pub const GENESIS_PATH: &str = "/genesis.json";

/// Chain 321 with the miner as the single POSA validator
pub const GENESIS: &[u8] = include_bytes!("../genesis.json");

/// The suite with the built-in genesis
pub fn litedebug_suite(config: &SimulatorConfig) -> Suite {
    litedebug_suite_with_genesis(config, GENESIS.to_vec())
}

/// The suite staging `genesis` into every client
pub fn litedebug_suite_with_genesis(config: &SimulatorConfig, genesis: Vec<u8>) -> Suite {
    let settings = ScenarioSettings::from(config);
    let rpc_config = RpcClientConfig {
        request_timeout: config.request_timeout,
        ..Default::default()
    };

    let tests = Scenario::ALL
        .iter()
        .map(|&scenario| ClientTestSpec {
            role: defaults::CLIENT_ROLE.to_string(),
            name: scenario.name().to_string(),
            description: scenario.description().to_string(),
            files: BTreeMap::from([(GENESIS_PATH.to_string(), genesis.clone())]),
            parameters: scenario.parameters(),
            run: scenario_test(scenario, settings, rpc_config.clone()),
        })
        .collect();

    Suite {
        name: SUITE_NAME.to_string(),
        description: SUITE_DESCRIPTION.to_string(),
        tests,
    }
}

fn scenario_test(
    scenario: Scenario,
    settings: ScenarioSettings,
    rpc_config: RpcClientConfig,
) -> crate::harness::ClientTestFn {
    Arc::new(move |client: ClientHandle| -> BoxFuture<'static, Result<()>> {
        let rpc_config = rpc_config.clone();
        async move {
            let rpc = RpcClient::for_client_ip(&client.info.ip, rpc_config)?;
            info!(
                "Running {} against {} at {}",
                scenario.name(),
                client.name,
                rpc.url()
            );
            run_scenario(&rpc, scenario, settings).await?;
            Ok(())
        }
        .boxed()
    })
}
