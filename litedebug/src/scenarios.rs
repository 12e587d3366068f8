//! Lite-debug scenarios
//!
//! Each scenario mines one transfer, traces its block by number (always
//! allowed), then asks the node to trace a block from a file that does not
//! exist. Which error comes back tells whether file based tracing is exposed:
//!
//! | scenario               | node flag                       | `debug_traceBlockFromFile` |
//! |------------------------|---------------------------------|----------------------------|
//! | `LiteDebugOnly`        | `HIVE_RPC_LITE_DEBUG_ONLY`      | method not available       |
//! | `LiteAndFullDebug`     | `HIVE_RPC_LITE_DEBUG_AND_DEBUG` | file not found             |
//! | `FullDebugOnly`        | none                            | file not found             |

use anyhow::{anyhow, bail, Context, Result};
use clap::ValueEnum;
use log::{debug, info};
use serde_json::{json, Value};
use tokio::time::{timeout_at, Duration, Instant};

use crate::config::{parameters_with_flag, Params, SimulatorConfig};
use crate::error::RpcError;
use crate::rpc::{block_number_hex, EthRpc};
use crate::submitter::{MinedTransfer, Submitter};

/// File handed to `debug_traceBlockFromFile`; must not exist on the node
pub const MISSING_TRACE_FILE: &str = "non-exist-file";

pub const METHOD_UNAVAILABLE_ERROR: &str =
    "the method debug_traceBlockFromFile does not exist/is not available";
pub const FILE_NOT_FOUND_ERROR: &str =
    "could not read file: open non-exist-file: no such file or directory";

/// Debug RPC configuration of the node under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Scenario {
    /// Only the lite debug namespace is enabled
    LiteDebugOnly,
    /// Lite debug and the full debug namespace are both enabled
    LiteAndFullDebug,
    /// Only the full debug namespace is enabled
    FullDebugOnly,
}

impl Scenario {
    pub const ALL: [Scenario; 3] = [
        Scenario::LiteDebugOnly,
        Scenario::LiteAndFullDebug,
        Scenario::FullDebugOnly,
    ];

    /// Test name registered with the harness
    pub fn name(&self) -> &'static str {
        match self {
            Self::LiteDebugOnly => "litedebug(only)",
            Self::LiteAndFullDebug => "litedebug + full debug ",
            Self::FullDebugOnly => "full debug (only)",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::LiteDebugOnly => "debug_traceBlockFromFile must not be exposed in lite debug mode",
            Self::LiteAndFullDebug => {
                "debug_traceBlockFromFile stays available when full debug is also enabled"
            }
            Self::FullDebugOnly => "debug_traceBlockFromFile is available in full debug mode",
        }
    }

    /// Flag switched on in the client parameters. Full debug is the client
    /// default, so that scenario sets a flag the client ignores.
    pub fn flag(&self) -> &'static str {
        match self {
            Self::LiteDebugOnly => "HIVE_RPC_LITE_DEBUG_ONLY",
            Self::LiteAndFullDebug => "HIVE_RPC_LITE_DEBUG_AND_DEBUG",
            Self::FullDebugOnly => "NOT_USED_OPTION",
        }
    }

    pub fn parameters(&self) -> Params {
        parameters_with_flag(self.flag())
    }

    /// Whether the node should expose file based tracing
    pub fn file_tracing_enabled(&self) -> bool {
        !matches!(self, Self::LiteDebugOnly)
    }

    /// Error text `debug_traceBlockFromFile("non-exist-file")` must contain
    pub fn expected_file_trace_error(&self) -> &'static str {
        if self.file_tracing_enabled() {
            FILE_NOT_FOUND_ERROR
        } else {
            METHOD_UNAVAILABLE_ERROR
        }
    }
}

/// Timing knobs for a scenario run
#[derive(Debug, Clone, Copy)]
pub struct ScenarioSettings {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl From<&SimulatorConfig> for ScenarioSettings {
    fn from(config: &SimulatorConfig) -> Self {
        Self {
            timeout: config.scenario_timeout,
            poll_interval: config.receipt_poll_interval,
        }
    }
}

impl Default for ScenarioSettings {
    fn default() -> Self {
        (&SimulatorConfig::default()).into()
    }
}

/// What a successful scenario observed
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub transfer: MinedTransfer,
    pub block_trace: Value,
    pub file_trace_error: String,
}

/// Run `scenario` against the node behind `rpc`
pub async fn run_scenario<R: EthRpc + ?Sized>(
    rpc: &R,
    scenario: Scenario,
    settings: ScenarioSettings,
) -> Result<ScenarioOutcome> {
    let deadline = Instant::now() + settings.timeout;

    let submitter = Submitter::from_miner_key(settings.poll_interval)?;
    let transfer = submitter.send_and_wait(rpc, deadline).await?;

    let block = block_number_hex(transfer.block_number);
    let block_trace = call_before(deadline, rpc, "debug_traceBlockByNumber", json!([block]))
        .await?
        .context("failed to debug_traceBlockByNumber")?;
    info!("debug_traceBlockByNumber result: {}", block_trace);

    let file_trace = call_before(
        deadline,
        rpc,
        "debug_traceBlockFromFile",
        json!([MISSING_TRACE_FILE]),
    )
    .await?;
    let file_trace_error = check_file_trace(scenario, file_trace)?;

    Ok(ScenarioOutcome {
        transfer,
        block_trace,
        file_trace_error,
    })
}

/// Issue an RPC call bounded by the scenario deadline. The outer error is
/// the deadline, the inner one is whatever the node answered.
async fn call_before<R: EthRpc + ?Sized>(
    deadline: Instant,
    rpc: &R,
    method: &str,
    params: Value,
) -> Result<std::result::Result<Value, RpcError>> {
    timeout_at(deadline, rpc.call(method, params))
        .await
        .map_err(|_| anyhow!("timeout calling {}", method))
}

/// Compare the `debug_traceBlockFromFile` outcome with what `scenario` allows
pub fn check_file_trace(
    scenario: Scenario,
    outcome: std::result::Result<Value, RpcError>,
) -> Result<String> {
    let expected = scenario.expected_file_trace_error();
    let err = match outcome {
        Ok(result) => bail!(
            "debug_traceBlockFromFile({}) unexpectedly succeeded: {}",
            MISSING_TRACE_FILE,
            result
        ),
        Err(err) => {
            debug!(
                "debug_traceBlockFromFile failed with code {:?}: {}",
                err.code(),
                err
            );
            // the node's own wording, without the client's error prefix
            err.server_message()
                .map_or_else(|| err.to_string(), str::to_string)
        }
    };

    if !err.contains(expected) {
        if scenario.file_tracing_enabled() {
            bail!(
                "debug_traceBlockFromFile should be available, the returned error is actually: {}",
                err
            );
        }
        bail!(
            "debug_traceBlockFromFile should not be available, the returned error is actually: {}",
            err
        );
    }
    Ok(err)
}
