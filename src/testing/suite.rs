//! Built-in comparison suite.
//!
//! Each check runs two scenarios and compares them. The suite is what the
//! `noc-engine check` command prints.

use crate::config::EngineConfig;
use crate::device::address::CoreCoord;
use crate::device::Platform;
use crate::error::NocError;
use crate::multicast::MulticastRequest;

use super::scenarios::{run_multicast, run_read_pipeline, run_write_stream, ReadPipeline, ThroughputReport};

/// Result of one comparison.
#[derive(Debug, Clone)]
pub enum CheckOutcome {
    /// The expected ordering held.
    Pass {
        better: ThroughputReport,
        worse: ThroughputReport,
    },
    /// The ordering did not hold.
    Fail {
        better: ThroughputReport,
        worse: ThroughputReport,
    },
    /// A scenario could not run.
    Error {
        message: String,
    },
}

impl CheckOutcome {
    /// Check if the comparison passed.
    pub fn is_pass(&self) -> bool {
        matches!(self, CheckOutcome::Pass { .. })
    }

    fn compare(better: ThroughputReport, worse: ThroughputReport, strict: bool) -> Self {
        let (b, w) = (better.bytes_per_cycle(), worse.bytes_per_cycle());
        let holds = if strict { b > w } else { b >= w };
        if holds {
            CheckOutcome::Pass { better, worse }
        } else {
            CheckOutcome::Fail { better, worse }
        }
    }
}

impl From<NocError> for CheckOutcome {
    fn from(err: NocError) -> Self {
        CheckOutcome::Error { message: err.to_string() }
    }
}

/// Aggregate counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
}

/// Runs the built-in comparisons on one platform.
pub struct ScenarioSuite {
    platform: Platform,
    config: EngineConfig,
    results: Vec<(&'static str, CheckOutcome)>,
}

impl ScenarioSuite {
    pub fn new(platform: Platform, config: EngineConfig) -> Self {
        Self { platform, config, results: Vec::new() }
    }

    /// Outcomes so far, in run order.
    pub fn results(&self) -> &[(&'static str, CheckOutcome)] {
        &self.results
    }

    /// Run every check.
    pub fn run_all(&mut self) -> SuiteResult {
        self.results.clear();

        let outcome = self.check_trid_pipelining();
        self.record("two trids outpace one", outcome);
        let outcome = self.check_multicast_loopback();
        self.record("multicast without loopback", outcome);
        let outcome = self.check_posted_writes();
        self.record("posted writes outpace acked", outcome);

        let mut result = SuiteResult { total: self.results.len(), ..Default::default() };
        for (_, outcome) in &self.results {
            match outcome {
                CheckOutcome::Pass { .. } => result.passed += 1,
                CheckOutcome::Fail { .. } => result.failed += 1,
                CheckOutcome::Error { .. } => result.errors += 1,
            }
        }
        result
    }

    fn record(&mut self, name: &'static str, outcome: CheckOutcome) {
        match &outcome {
            CheckOutcome::Pass { .. } => log::info!("{}: pass", name),
            CheckOutcome::Fail { .. } => log::warn!("{}: FAIL", name),
            CheckOutcome::Error { message } => log::error!("{}: {}", name, message),
        }
        self.results.push((name, outcome));
    }

    fn check_trid_pipelining(&self) -> CheckOutcome {
        let run = |num_trids| {
            run_read_pipeline(&self.platform, self.config, ReadPipeline { num_trids, ..Default::default() })
        };
        match (run(2), run(1)) {
            (Ok(two), Ok(one)) => CheckOutcome::compare(two, one, true),
            (Err(e), _) | (_, Err(e)) => e.into(),
        }
    }

    fn check_multicast_loopback(&self) -> CheckOutcome {
        let req = MulticastRequest::new(CoreCoord::new(0, 0), CoreCoord::new(0, 0), CoreCoord::new(3, 3));
        let run = |loopback| run_multicast(&self.platform, self.config, req.with_loopback(loopback), 4096, 10);
        match (run(false), run(true)) {
            (Ok(off), Ok(on)) => CheckOutcome::compare(off.measured, on.measured, false),
            (Err(e), _) | (_, Err(e)) => e.into(),
        }
    }

    fn check_posted_writes(&self) -> CheckOutcome {
        let dest = CoreCoord::new(3, 3);
        let run = |posted| run_write_stream(&self.platform, self.config, dest, 16, 2048, posted);
        match (run(true), run(false)) {
            (Ok(posted), Ok(acked)) => CheckOutcome::compare(posted, acked, true),
            (Err(e), _) | (_, Err(e)) => e.into(),
        }
    }

    /// Generate a summary report.
    pub fn summary_report(&self, result: &SuiteResult) -> String {
        let mut report = String::new();

        report.push_str(&format!("=== NoC Scenario Checks ({}) ===\n\n", self.platform.family));
        report.push_str(&format!(
            "Total: {}, Passed: {}, Failed: {}, Errors: {}\n\n",
            result.total, result.passed, result.failed, result.errors
        ));

        for (name, outcome) in &self.results {
            match outcome {
                CheckOutcome::Pass { better, worse } | CheckOutcome::Fail { better, worse } => {
                    let tag = if outcome.is_pass() { "PASS" } else { "FAIL" };
                    report.push_str(&format!("{}: {}\n  {}\n  {}\n", name, tag, better, worse));
                }
                CheckOutcome::Error { message } => {
                    report.push_str(&format!("{}: ERROR - {}\n", name, message));
                }
            }
        }
        report
    }
}
