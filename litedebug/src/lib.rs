//! KCC lite-debug hive simulator
//!
//! Checks that a KCC node started in lite debug mode keeps
//! `debug_traceBlockByNumber` but hides `debug_traceBlockFromFile`, while
//! full debug mode (alone or next to lite debug) exposes both.
//!
//! The crate can drive a hive simulator run ([`harness::run_suite`] with
//! [`suite::litedebug_suite`]) or run one scenario against a node it is
//! pointed at ([`scenarios::run_scenario`]).

pub mod config;
pub mod error;
pub mod harness;
pub mod report;
pub mod rpc;
pub mod scenarios;
pub mod submitter;
pub mod suite;
pub mod transaction;
pub mod waiters;

pub use config::{ConfigError, Params, RawSettings, SimulatorConfig, TestPattern};
pub use error::RpcError;
pub use harness::{run_suite, Harness, HiveSimulation};
pub use report::{TestReport, TestStatus};
pub use rpc::{EthRpc, RpcClient, RpcClientConfig};
pub use scenarios::{run_scenario, Scenario, ScenarioOutcome, ScenarioSettings};
pub use suite::litedebug_suite;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
