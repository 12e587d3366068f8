//! Simulator configuration
//!
//! Fixed chain constants shared by every scenario, the per-scenario client
//! parameter table, and the validated runtime configuration assembled from
//! the command line and the hive environment.

use std::collections::BTreeMap;
use std::time::Duration;

use alloy_primitives::{address, Address};
use log::{debug, warn};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Chain constants and tunables
pub mod defaults {
    use super::*;

    /// Private key of the genesis miner, which also funds the test transfers
    pub const MINER_KEY: &str =
        "0x9c647b8b7c4e7c3490668fb6c11473619db80c93704c70893d3813af4090c39c";
    /// Address derived from [`MINER_KEY`]
    pub const MINER_ADDRESS: Address = address!("658bdf435d810c91414ec09147daa6db62406379");
    /// POSA validators system contract, recipient of the test transfer
    pub const VALIDATORS_CONTRACT: Address = address!("000000000000000000000000000000000000f333");
    pub const CHAIN_ID: u64 = 321;

    /// 1 ether
    pub const TRANSFER_VALUE_WEI: u128 = 1_000_000_000_000_000_000;
    pub const TRANSFER_GAS_LIMIT: u64 = 500_000;
    /// 100 gwei
    pub const TRANSFER_GAS_PRICE_WEI: u128 = 100_000_000_000;

    /// Port the eth1 clients expose HTTP JSON-RPC on inside the hive network
    pub const CLIENT_RPC_PORT: u16 = 8545;
    pub const CLIENT_ROLE: &str = "eth1";

    pub const SCENARIO_TIMEOUT_SECS: u64 = 120;
    pub const RECEIPT_POLL_INTERVAL_MS: u64 = 1000;
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;
    pub const PARALLELISM: usize = 1;

    // Validation limits
    pub const MIN_TIMEOUT_SECS: u64 = 1;
    pub const MAX_TIMEOUT_SECS: u64 = 3600;
    pub const MAX_PARALLELISM: usize = 64;
}

/// Environment-style parameters handed to a client container
///
/// Keys are kept sorted so the launch request is stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter, replacing any previous value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Builder form of [`Params::set`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Parameters every KCC node in this suite starts with: a single POSA
/// validator (the miner) producing one block per second, with the Ishikari
/// forks and patches activated shortly after genesis.
pub fn base_parameters() -> Params {
    let miner = format!("{:#x}", defaults::MINER_ADDRESS);
    Params::new()
        .with(
            "HIVE_CLIQUE_PRIVATEKEY",
            defaults::MINER_KEY.trim_start_matches("0x"),
        )
        .with("HIVE_MINER", miner.trim_start_matches("0x"))
        .with("HIVE_CHAIN_ID", defaults::CHAIN_ID.to_string())
        .with("HIVE_KCC_POSA_BLOCK_INTERVAL", "1")
        .with("HIVE_KCC_POSA_EPOCH", "5")
        .with("HIVE_KCC_POSA_ISHIKARI_INIT_VALIDATORS", miner.as_str())
        .with("HIVE_KCC_POSA_ADMIN", miner.as_str())
        .with("HIVE_FORK_KCC_ISHIKARI", "9")
        .with("HIVE_FORK_KCC_ISHIKARI_PATCH001", "10")
        .with("HIVE_FORK_KCC_ISHIKARI_PATCH002", "11")
}

/// [`base_parameters`] with one extra flag switched on
pub fn parameters_with_flag(flag: &str) -> Params {
    base_parameters().with(flag, "1")
}

/// Test selection in the format hive passes through `HIVE_TEST_PATTERN`
///
/// The part before the first `/` selects suites, the rest selects tests.
/// Both parts match case-insensitively anywhere in the name.
#[derive(Debug, Clone)]
pub struct TestPattern {
    suite: Regex,
    test: Option<Regex>,
}

impl TestPattern {
    pub fn parse(pattern: &str) -> ValidationResult<Self> {
        let (suite, test) = match pattern.split_once('/') {
            Some((suite, test)) => (suite, Some(test)),
            None => (pattern, None),
        };
        let compile = |part: &str| {
            Regex::new(&format!("(?i:{part})")).map_err(|e| ConfigError::InvalidTestPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
        };
        Ok(Self {
            suite: compile(suite)?,
            test: test.map(compile).transpose()?,
        })
    }

    pub fn matches_suite(&self, suite: &str) -> bool {
        self.suite.is_match(suite)
    }

    pub fn matches_test(&self, suite: &str, test: &str) -> bool {
        self.matches_suite(suite) && self.test.as_ref().map_or(true, |t| t.is_match(test))
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid simulator URL: '{0}' - must be a valid HTTP/HTTPS URL")]
    InvalidSimulatorUrl(String),

    #[error("Missing simulator URL: set HIVE_SIMULATOR or pass --simulator")]
    MissingSimulatorUrl,

    #[error("Invalid {field}: {value} seconds - must be between {min} and {max} seconds")]
    InvalidTimeout {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("Invalid parallelism: {value} - must be between 1 and {max}")]
    InvalidParallelism { value: usize, max: usize },

    #[error("Invalid test pattern '{pattern}': {reason}")]
    InvalidTestPattern { pattern: String, reason: String },
}

/// Configuration validation result
pub type ValidationResult<T> = std::result::Result<T, ConfigError>;

/// Runtime configuration shared by hive and local mode
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Hive simulator API endpoint (hive mode only)
    pub simulator_url: Option<Url>,
    /// Only matching suites and tests run
    pub test_pattern: Option<TestPattern>,
    /// Maximum number of tests in flight
    pub parallelism: usize,
    /// Budget for a whole scenario, receipt wait included
    pub scenario_timeout: Duration,
    pub receipt_poll_interval: Duration,
    /// Per HTTP request timeout for node and harness calls
    pub request_timeout: Duration,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            simulator_url: None,
            test_pattern: None,
            parallelism: defaults::PARALLELISM,
            scenario_timeout: Duration::from_secs(defaults::SCENARIO_TIMEOUT_SECS),
            receipt_poll_interval: Duration::from_millis(defaults::RECEIPT_POLL_INTERVAL_MS),
            request_timeout: Duration::from_secs(defaults::REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Unvalidated settings as they come from the command line and environment
#[derive(Debug, Clone, Default)]
pub struct RawSettings {
    pub simulator: Option<String>,
    pub test_pattern: Option<String>,
    pub parallelism: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

impl SimulatorConfig {
    /// Validate raw settings into a usable configuration
    pub fn from_settings(raw: RawSettings) -> ValidationResult<Self> {
        let mut config = Self::default();

        if let Some(simulator) = raw.simulator.filter(|s| !s.is_empty()) {
            config.simulator_url = Some(parse_http_url(&simulator)?);
        }

        if let Some(pattern) = raw.test_pattern.filter(|p| !p.is_empty()) {
            config.test_pattern = Some(TestPattern::parse(&pattern)?);
        }

        if let Some(parallelism) = raw.parallelism {
            if parallelism == 0 || parallelism > defaults::MAX_PARALLELISM {
                return Err(ConfigError::InvalidParallelism {
                    value: parallelism,
                    max: defaults::MAX_PARALLELISM,
                });
            }
            config.parallelism = parallelism;
        }

        if let Some(secs) = raw.timeout_secs {
            validate_timeout("scenario timeout", secs)?;
            config.scenario_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = raw.request_timeout_secs {
            validate_timeout("request timeout", secs)?;
            config.request_timeout = Duration::from_secs(secs);
        }

        if config.request_timeout > config.scenario_timeout {
            if log::log_enabled!(log::Level::Warn) {
                warn!(
                    "Request timeout {:?} exceeds scenario timeout {:?}, the scenario deadline wins",
                    config.request_timeout, config.scenario_timeout
                );
            }
        }

        debug!("Validated configuration: {:?}", config);
        Ok(config)
    }

    /// The simulator URL, required in hive mode
    pub fn require_simulator_url(&self) -> ValidationResult<&Url> {
        self.simulator_url
            .as_ref()
            .ok_or(ConfigError::MissingSimulatorUrl)
    }

    /// Whether any test of this suite can be selected by the pattern
    pub fn selects_suite(&self, suite: &str) -> bool {
        self.test_pattern
            .as_ref()
            .map_or(true, |pattern| pattern.matches_suite(suite))
    }

    /// Whether `test` of `suite` is selected by the pattern
    pub fn selects(&self, suite: &str, test: &str) -> bool {
        self.test_pattern
            .as_ref()
            .map_or(true, |pattern| pattern.matches_test(suite, test))
    }
}

fn validate_timeout(field: &'static str, value: u64) -> ValidationResult<()> {
    if !(defaults::MIN_TIMEOUT_SECS..=defaults::MAX_TIMEOUT_SECS).contains(&value) {
        return Err(ConfigError::InvalidTimeout {
            field,
            value,
            min: defaults::MIN_TIMEOUT_SECS,
            max: defaults::MAX_TIMEOUT_SECS,
        });
    }
    Ok(())
}

/// Parse an HTTP(S) URL, accepting bare `host:port` as plain HTTP
pub fn parse_http_url(input: &str) -> ValidationResult<Url> {
    let candidate = if input.starts_with("http://") || input.starts_with("https://") {
        input.to_string()
    } else {
        format!("http://{input}")
    };

    let url = Url::parse(&candidate).map_err(|_| ConfigError::InvalidSimulatorUrl(input.into()))?;
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidSimulatorUrl(input.into()));
    }
    Ok(url)
}
