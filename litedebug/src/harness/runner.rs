//! Suite runner
//!
//! Expands every client test spec over the clients that have its role, runs
//! the selected tests with bounded concurrency and reports each verdict to
//! the harness. A test that fails (its client included) is recorded and the
//! run goes on. A failing harness API call fails the run once every started
//! test has been ended and recorded.

use anyhow::{Context, Result};
use futures::{stream, StreamExt};
use log::{error, info, warn};
use tokio::time::Instant;

use super::{ClientDefinition, ClientHandle, ClientTestSpec, Harness, Suite, SuiteId, TestResult};
use crate::config::SimulatorConfig;
use crate::report::TestReport;

/// One spec paired with one client
struct PlannedTest<'a> {
    spec: &'a ClientTestSpec,
    client: String,
    name: String,
}

struct CompletedTest {
    name: String,
    client: String,
    result: TestResult,
    duration: std::time::Duration,
    /// Outcome of handing the verdict to the harness
    reported: Result<()>,
}

/// Run `suite` against every matching client known to `harness`, recording
/// each verdict into `report`.
///
/// `report` holds every recorded verdict even when a harness call fails.
pub async fn run_suite<H: Harness + ?Sized>(
    harness: &H,
    suite: &Suite,
    config: &SimulatorConfig,
    report: &mut TestReport,
) -> Result<()> {
    let started = Instant::now();
    let outcome = if config.selects_suite(&suite.name) {
        run_selected(harness, suite, config, report).await
    } else {
        info!("Skipping suite {} (filtered by test pattern)", suite.name);
        Ok(())
    };
    report.finish(started.elapsed());
    outcome
}

async fn run_selected<H: Harness + ?Sized>(
    harness: &H,
    suite: &Suite,
    config: &SimulatorConfig,
    report: &mut TestReport,
) -> Result<()> {
    let clients = harness
        .client_types()
        .await
        .context("failed to get client types")?;
    if clients.is_empty() {
        warn!("The harness reported no clients");
    }

    let suite_id = harness
        .start_suite(&suite.name, &suite.description)
        .await
        .context("failed to start suite")?;

    let mut planned = Vec::new();
    for (spec, client) in expand(suite, &clients) {
        let name = spec.test_name(&client.name);
        if !config.selects(&suite.name, &name) {
            info!("Skipping {} (filtered by test pattern)", name);
            report.record_skip(&name, &client.name);
            continue;
        }
        planned.push(PlannedTest {
            spec,
            client: client.name.clone(),
            name,
        });
    }

    info!(
        "Running {} tests of suite {} with parallelism {}",
        planned.len(),
        suite.name,
        config.parallelism
    );

    let completed: Vec<Result<CompletedTest>> = stream::iter(planned)
        .map(|test| run_test(harness, suite_id, test))
        .buffered(config.parallelism)
        .collect()
        .await;

    let mut first_error = None;
    for test in completed {
        let reported = match test {
            Ok(test) => {
                if test.result.pass {
                    report.record_pass(&test.name, &test.client, test.duration);
                } else {
                    report.record_failure(
                        &test.name,
                        &test.client,
                        test.duration,
                        test.result.details,
                    );
                }
                test.reported
            }
            Err(e) => Err(e),
        };
        if let Err(e) = reported {
            error!("{e:#}");
            if first_error.is_none() {
                first_error = Some(e);
            }
        }
    }

    // close the suite even when a harness call failed
    let ended = harness
        .end_suite(suite_id)
        .await
        .context("failed to end suite");

    if let Some(e) = first_error {
        if let Err(end) = ended {
            error!("{end:#}");
        }
        return Err(e);
    }
    ended
}

/// Every (spec, client) pair where the client has the spec's role
fn expand<'a>(
    suite: &'a Suite,
    clients: &'a [ClientDefinition],
) -> impl Iterator<Item = (&'a ClientTestSpec, &'a ClientDefinition)> {
    suite.tests.iter().flat_map(move |spec| {
        clients
            .iter()
            .filter(move |client| client.has_role(&spec.role))
            .map(move |client| (spec, client))
    })
}

async fn run_test<H: Harness + ?Sized>(
    harness: &H,
    suite: SuiteId,
    test: PlannedTest<'_>,
) -> Result<CompletedTest> {
    let started = Instant::now();
    let test_id = harness
        .start_test(suite, &test.name, &test.spec.description)
        .await
        .with_context(|| format!("failed to start test {}", test.name))?;

    let result = match launch_and_run(harness, suite, test_id, &test).await {
        Ok(()) => {
            info!("{}: PASS", test.name);
            TestResult::passed()
        }
        Err(e) => {
            let details = format!("{e:#}");
            error!("{}: FAIL: {}", test.name, details);
            TestResult::failed(details)
        }
    };

    let reported = harness
        .end_test(suite, test_id, &result)
        .await
        .with_context(|| format!("failed to end test {}", test.name));

    Ok(CompletedTest {
        name: test.name,
        client: test.client,
        result,
        duration: started.elapsed(),
        reported,
    })
}

async fn launch_and_run<H: Harness + ?Sized>(
    harness: &H,
    suite: SuiteId,
    test_id: super::TestId,
    test: &PlannedTest<'_>,
) -> Result<()> {
    let launch = test.spec.launch_for(&test.client);
    let info = harness
        .start_client(suite, test_id, &launch)
        .await
        .context("failed to start client")?;

    let handle = ClientHandle {
        name: test.client.clone(),
        info,
    };
    (test.spec.run)(handle).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Params, RawSettings};
    use crate::harness::{ClientInfo, ClientLaunch, ClientMetadata, TestId};
    use crate::report::TestStatus;
    use anyhow::bail;
    use async_trait::async_trait;
    use futures::future::BoxFuture;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    /// In-memory harness recording every call
    #[derive(Default)]
    struct MockHarness {
        clients: Vec<ClientDefinition>,
        next_test: AtomicU32,
        launches: Mutex<Vec<ClientLaunch>>,
        verdicts: Mutex<Vec<(TestId, TestResult)>>,
        suite_ended: Mutex<bool>,
        suites_started: AtomicU32,
        end_test_calls: AtomicU32,
        fail_launch_of: Option<String>,
        fail_end_test: bool,
    }

    impl MockHarness {
        fn with_clients(names: &[(&str, &str)]) -> Self {
            Self {
                clients: names
                    .iter()
                    .map(|(name, role)| ClientDefinition {
                        name: name.to_string(),
                        version: "test".to_string(),
                        meta: ClientMetadata {
                            roles: vec![role.to_string()],
                        },
                    })
                    .collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl Harness for MockHarness {
        async fn client_types(&self) -> Result<Vec<ClientDefinition>> {
            Ok(self.clients.clone())
        }

        async fn start_suite(&self, _name: &str, _description: &str) -> Result<SuiteId> {
            self.suites_started.fetch_add(1, Ordering::SeqCst);
            Ok(SuiteId(1))
        }

        async fn end_suite(&self, _suite: SuiteId) -> Result<()> {
            *self.suite_ended.lock().unwrap() = true;
            Ok(())
        }

        async fn start_test(&self, _suite: SuiteId, _name: &str, _desc: &str) -> Result<TestId> {
            Ok(TestId(self.next_test.fetch_add(1, Ordering::SeqCst)))
        }

        async fn end_test(&self, _suite: SuiteId, test: TestId, result: &TestResult) -> Result<()> {
            self.end_test_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_end_test {
                bail!("connection refused");
            }
            self.verdicts.lock().unwrap().push((test, result.clone()));
            Ok(())
        }

        async fn start_client(
            &self,
            _suite: SuiteId,
            _test: TestId,
            launch: &ClientLaunch,
        ) -> Result<ClientInfo> {
            self.launches.lock().unwrap().push(launch.clone());
            if self.fail_launch_of.as_deref() == Some(launch.client.as_str()) {
                bail!("container exited with status 1");
            }
            Ok(ClientInfo {
                id: format!("{}-container", launch.client),
                ip: "172.17.0.3".to_string(),
            })
        }
    }

    fn spec(name: &str, outcome: fn(&ClientHandle) -> Result<()>) -> ClientTestSpec {
        ClientTestSpec {
            role: "eth1".to_string(),
            name: name.to_string(),
            description: String::new(),
            files: BTreeMap::from([("/genesis.json".to_string(), b"{}".to_vec())]),
            parameters: Params::new().with("HIVE_CHAIN_ID", "321"),
            run: Arc::new(move |handle: ClientHandle| -> BoxFuture<'static, Result<()>> {
                let result = outcome(&handle);
                Box::pin(async move { result })
            }),
        }
    }

    async fn run(
        harness: &MockHarness,
        suite: &Suite,
        config: &SimulatorConfig,
    ) -> (TestReport, Result<()>) {
        let mut report = TestReport::new(&suite.name);
        let outcome = run_suite(harness, suite, config, &mut report).await;
        (report, outcome)
    }

    fn pattern(pattern: &str) -> SimulatorConfig {
        SimulatorConfig::from_settings(RawSettings {
            test_pattern: Some(pattern.to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    fn suite(tests: Vec<ClientTestSpec>) -> Suite {
        Suite {
            name: "litedebug mode".to_string(),
            description: "Testcase for litedebug mode".to_string(),
            tests,
        }
    }

    #[tokio::test]
    async fn test_runs_each_spec_per_matching_client() {
        let harness = MockHarness::with_clients(&[("kcc", "eth1"), ("lighthouse", "beacon")]);
        let suite = suite(vec![
            spec("litedebug(only)", |_| Ok(())),
            spec("full debug (only)", |_| bail!("debug_traceBlockFromFile should be available")),
        ]);

        let (report, outcome) = run(&harness, &suite, &SimulatorConfig::default()).await;
        outcome.unwrap();

        assert_eq!(report.total, 2);
        assert_eq!(report.passed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.results[0].name, "litedebug(only) (kcc)");
        assert_eq!(report.results[1].name, "full debug (only) (kcc)");

        let launches = harness.launches.lock().unwrap();
        assert_eq!(launches.len(), 2);
        assert!(launches.iter().all(|l| l.environment.get("CLIENT") == Some("kcc")));

        let verdicts = harness.verdicts.lock().unwrap();
        assert_eq!(verdicts.len(), 2);
        assert!(*harness.suite_ended.lock().unwrap());
    }

    #[tokio::test]
    async fn test_launch_failure_fails_only_that_test() {
        let harness = MockHarness {
            fail_launch_of: Some("kcc-broken".to_string()),
            ..MockHarness::with_clients(&[("kcc", "eth1"), ("kcc-broken", "eth1")])
        };
        let suite = suite(vec![spec("litedebug(only)", |_| Ok(()))]);

        let (report, outcome) = run(&harness, &suite, &SimulatorConfig::default()).await;
        outcome.unwrap();

        assert_eq!(report.passed, 1);
        assert_eq!(report.failed, 1);
        let failed = report
            .results
            .iter()
            .find(|r| r.status == TestStatus::Fail)
            .unwrap();
        assert_eq!(failed.client, "kcc-broken");
        assert!(failed
            .error
            .as_deref()
            .unwrap()
            .contains("failed to start client: container exited"));
    }

    #[tokio::test]
    async fn test_pattern_skips_unselected_tests() {
        let harness = MockHarness::with_clients(&[("kcc", "eth1")]);
        let suite = suite(vec![
            spec("litedebug(only)", |_| Ok(())),
            spec("full debug (only)", |_| Ok(())),
        ]);
        let (report, outcome) = run(&harness, &suite, &pattern("litedebug/^full")).await;
        outcome.unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.passed, 1);
        assert_eq!(harness.launches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_suite_pattern_runs_every_test() {
        for selector in ["litedebug", "LITEDEBUG", "debug mode"] {
            let harness = MockHarness::with_clients(&[("kcc", "eth1")]);
            let suite = suite(vec![
                spec("litedebug(only)", |_| Ok(())),
                spec("litedebug + full debug ", |_| Ok(())),
                spec("full debug (only)", |_| Ok(())),
            ]);

            let (report, outcome) = run(&harness, &suite, &pattern(selector)).await;
            outcome.unwrap();

            assert_eq!(report.passed, 3, "pattern {selector}");
            assert_eq!(report.skipped, 0, "pattern {selector}");
        }
    }

    #[tokio::test]
    async fn test_test_part_of_pattern_filters_tests() {
        let harness = MockHarness::with_clients(&[("kcc", "eth1")]);
        let suite = suite(vec![
            spec("litedebug(only)", |_| Ok(())),
            spec("litedebug + full debug ", |_| Ok(())),
            spec("full debug (only)", |_| Ok(())),
        ]);

        let (report, outcome) = run(&harness, &suite, &pattern("litedebug/full")).await;
        outcome.unwrap();

        assert_eq!(report.passed, 2);
        assert_eq!(report.skipped, 1);
        let skipped = report
            .results
            .iter()
            .find(|r| r.status == TestStatus::Skip)
            .unwrap();
        assert_eq!(skipped.name, "litedebug(only) (kcc)");
    }

    #[tokio::test]
    async fn test_unmatched_suite_is_not_started() {
        let harness = MockHarness::with_clients(&[("kcc", "eth1")]);
        let suite = suite(vec![spec("litedebug(only)", |_| Ok(()))]);

        let (report, outcome) = run(&harness, &suite, &pattern("consensus/litedebug")).await;
        outcome.unwrap();

        assert_eq!(report.total, 0);
        assert_eq!(harness.suites_started.load(Ordering::SeqCst), 0);
        assert!(harness.launches.lock().unwrap().is_empty());
        assert!(!*harness.suite_ended.lock().unwrap());
    }

    #[tokio::test]
    async fn test_harness_failure_aborts_run() {
        let harness = MockHarness {
            fail_end_test: true,
            ..MockHarness::with_clients(&[("kcc", "eth1")])
        };
        let suite = suite(vec![spec("litedebug(only)", |_| Ok(()))]);

        let (report, outcome) = run(&harness, &suite, &SimulatorConfig::default()).await;

        let err = outcome.unwrap_err();
        assert!(format!("{err:#}").contains("failed to end test litedebug(only) (kcc)"));
        assert!(*harness.suite_ended.lock().unwrap());
        assert_eq!(report.passed, 1);
    }

    #[tokio::test]
    async fn test_harness_failure_still_ends_and_records_parallel_tests() {
        let harness = MockHarness {
            fail_end_test: true,
            ..MockHarness::with_clients(&[("kcc", "eth1"), ("geth", "eth1")])
        };
        let suite = suite(vec![
            spec("litedebug(only)", |_| Ok(())),
            spec("full debug (only)", |_| bail!("debug_traceBlockFromFile should be available")),
        ]);
        let config = SimulatorConfig::from_settings(RawSettings {
            parallelism: Some(4),
            ..Default::default()
        })
        .unwrap();

        let (report, outcome) = run(&harness, &suite, &config).await;

        let err = outcome.unwrap_err();
        assert!(format!("{err:#}").contains("failed to end test litedebug(only) (kcc)"));
        assert_eq!(harness.end_test_calls.load(Ordering::SeqCst), 4);
        assert_eq!(report.total, 4);
        assert_eq!(report.passed, 2);
        assert_eq!(report.failed, 2);
        assert!(*harness.suite_ended.lock().unwrap());
    }

    #[tokio::test]
    async fn test_parallel_run_keeps_spec_order() {
        let harness = MockHarness::with_clients(&[("kcc", "eth1"), ("geth", "eth1")]);
        let suite = suite(vec![
            spec("litedebug(only)", |_| Ok(())),
            spec("full debug (only)", |_| Ok(())),
        ]);
        let config = SimulatorConfig::from_settings(RawSettings {
            parallelism: Some(4),
            ..Default::default()
        })
        .unwrap();

        let (report, outcome) = run(&harness, &suite, &config).await;
        outcome.unwrap();

        let names: Vec<_> = report.results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "litedebug(only) (kcc)",
                "litedebug(only) (geth)",
                "full debug (only) (kcc)",
                "full debug (only) (geth)",
            ]
        );
    }
}
