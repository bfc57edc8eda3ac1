mod report;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use tokio::runtime::Runtime;

use crate::report::{InMemoryReporter, InfluxFileReportCollector};

pub use report::{ReportCollector, ReportMetric};

/// A record of a single operation, such as an HTTP request, made by a virtual user.
///
/// Create the record just before the operation starts and hand it to [report_operation] once the
/// operation has completed.
#[derive(Debug, Clone)]
pub struct OperationRecord {
    operation_id: String,
    started: Instant,
    elapsed: Option<Duration>,
    is_error: bool,
    attr: BTreeMap<String, String>,
}

impl OperationRecord {
    pub fn new(operation_id: String) -> Self {
        Self {
            operation_id,
            started: Instant::now(),
            elapsed: None,
            is_error: false,
            attr: BTreeMap::new(),
        }
    }

    /// Attach an attribute to the record. Attributes become tags when the record is written to
    /// InfluxDB.
    pub fn add_attr(&mut self, key: impl Into<String>, value: impl ToString) {
        self.attr.insert(key.into(), value.to_string());
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }

    /// How long the operation took. Only available once the record has been reported.
    pub fn duration(&self) -> Option<Duration> {
        self.elapsed
    }

    pub fn attr(&self) -> &BTreeMap<String, String> {
        &self.attr
    }

    fn finish(&mut self, is_error: bool) {
        self.elapsed = Some(self.started.elapsed());
        self.is_error = is_error;
    }
}

/// Complete an operation and send it to the reporter.
pub fn report_operation<T, E>(
    reporter: Arc<Reporter>,
    mut operation_record: OperationRecord,
    response: &Result<T, E>,
) {
    operation_record.finish(response.is_err());
    reporter.add_operation(&operation_record);
}

/// The outcome of a named check, evaluated against a response.
///
/// Checks are observational. A failed check is counted and reported but never changes what the
/// virtual user does next.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckRecord {
    name: String,
    passed: bool,
    timestamp: SystemTime,
}

impl CheckRecord {
    pub fn new(name: impl Into<String>, passed: bool) -> Self {
        Self {
            name: name.into(),
            passed,
            timestamp: SystemTime::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }
}

/// Pass and fail counts for a single check.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CheckTally {
    pub passes: u64,
    pub fails: u64,
}

impl CheckTally {
    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }

    /// Fraction of passing checks, or `None` if the check was never evaluated.
    pub fn pass_rate(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            total => Some(self.passes as f64 / total as f64),
        }
    }
}

/// Fans records out to every enabled [ReportCollector].
///
/// The reporter also keeps its own tally of checks so that the runner can include check outcomes
/// in the run summary, whichever collectors are enabled.
pub struct Reporter {
    collectors: Vec<Mutex<Box<dyn ReportCollector + Send>>>,
    checks: Mutex<BTreeMap<String, CheckTally>>,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("collectors", &self.collectors.len())
            .finish()
    }
}

impl Reporter {
    /// A reporter that drops everything apart from the check tally.
    pub fn noop() -> Self {
        Self::with_collectors(Vec::new())
    }

    pub fn with_collectors(collectors: Vec<Box<dyn ReportCollector + Send>>) -> Self {
        Self {
            collectors: collectors.into_iter().map(Mutex::new).collect(),
            checks: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn add_operation(&self, operation_record: &OperationRecord) {
        for collector in &self.collectors {
            collector.lock().add_operation(operation_record);
        }
    }

    pub fn add_check(&self, check: &CheckRecord) {
        {
            let mut checks = self.checks.lock();
            let tally = checks.entry(check.name.clone()).or_default();
            if check.passed {
                tally.passes += 1;
            } else {
                tally.fails += 1;
            }
        }

        for collector in &self.collectors {
            collector.lock().add_check(check);
        }
    }

    pub fn add_custom(&self, metric: ReportMetric) {
        for collector in &self.collectors {
            collector.lock().add_custom(metric.clone());
        }
    }

    /// Snapshot of the check outcomes recorded so far, keyed by check name.
    pub fn check_tally(&self) -> BTreeMap<String, CheckTally> {
        self.checks.lock().clone()
    }

    /// Flush and print the output of every collector. Call this once, after all virtual users
    /// have stopped.
    pub fn finalize(&self) {
        for collector in &self.collectors {
            collector.lock().finalize();
        }
    }
}

/// Choose which collectors a [Reporter] should send records to.
#[derive(Debug, Clone)]
pub struct ReportConfig {
    run_id: String,
    scenario_name: String,
    in_memory: bool,
    influx_file_dir: Option<PathBuf>,
}

impl ReportConfig {
    pub fn new(run_id: impl Into<String>, scenario_name: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            scenario_name: scenario_name.into(),
            in_memory: false,
            influx_file_dir: None,
        }
    }

    /// Keep records in memory and print summary tables when the reporter is finalized.
    pub fn enable_in_memory(mut self) -> Self {
        self.in_memory = true;
        self
    }

    /// Write records in the InfluxDB line protocol to a file inside `dir`.
    pub fn enable_influx_file(mut self, dir: PathBuf) -> Self {
        self.influx_file_dir = Some(dir);
        self
    }

    pub fn init_reporter(self, runtime: &Runtime) -> anyhow::Result<Reporter> {
        let mut collectors: Vec<Box<dyn ReportCollector + Send>> = Vec::new();

        if self.in_memory {
            collectors.push(Box::new(InMemoryReporter::new()));
        }

        if let Some(dir) = self.influx_file_dir {
            collectors.push(Box::new(InfluxFileReportCollector::new(
                runtime,
                dir,
                self.scenario_name,
                self.run_id,
            )?));
        }

        Ok(Reporter::with_collectors(collectors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counting {
        operations: Arc<Mutex<Vec<OperationRecord>>>,
        checks: Arc<Mutex<Vec<CheckRecord>>>,
        finalized: Arc<Mutex<bool>>,
    }

    impl ReportCollector for Counting {
        fn add_operation(&mut self, operation_record: &OperationRecord) {
            self.operations.lock().push(operation_record.clone());
        }

        fn add_check(&mut self, check: &CheckRecord) {
            self.checks.lock().push(check.clone());
        }

        fn add_custom(&mut self, _metric: ReportMetric) {}

        fn finalize(&mut self) {
            *self.finalized.lock() = true;
        }
    }

    #[test]
    fn report_operation_marks_errors_and_duration() {
        let collector = Counting::default();
        let operations = collector.operations.clone();
        let reporter = Arc::new(Reporter::with_collectors(vec![Box::new(collector)]));

        let ok: Result<(), ()> = Ok(());
        let err: Result<(), ()> = Err(());
        report_operation(reporter.clone(), OperationRecord::new("http_get".to_string()), &ok);
        report_operation(reporter, OperationRecord::new("http_get".to_string()), &err);

        let operations = operations.lock();
        assert_eq!(2, operations.len());
        assert!(!operations[0].is_error());
        assert!(operations[1].is_error());
        assert!(operations.iter().all(|op| op.duration().is_some()));
    }

    #[test]
    fn checks_are_tallied_by_name() {
        let collector = Counting::default();
        let checks = collector.checks.clone();
        let finalized = collector.finalized.clone();
        let reporter = Reporter::with_collectors(vec![Box::new(collector)]);

        reporter.add_check(&CheckRecord::new("status was 200", true));
        reporter.add_check(&CheckRecord::new("status was 200", false));
        reporter.add_check(&CheckRecord::new("status was 200", true));
        reporter.add_check(&CheckRecord::new("body not empty", false));
        reporter.finalize();

        let tally = reporter.check_tally();
        assert_eq!(
            CheckTally {
                passes: 2,
                fails: 1
            },
            tally["status was 200"]
        );
        assert_eq!(Some(0.0), tally["body not empty"].pass_rate());
        assert_eq!(4, checks.lock().len());
        assert!(*finalized.lock());
    }

    #[test]
    fn noop_reporter_still_tallies_checks() {
        let reporter = Reporter::noop();
        reporter.add_check(&CheckRecord::new("status was 200", true));
        reporter.finalize();

        assert_eq!(1, reporter.check_tally()["status was 200"].total());
    }

    #[test]
    fn empty_tally_has_no_pass_rate() {
        assert_eq!(None, CheckTally::default().pass_rate());
    }
}
