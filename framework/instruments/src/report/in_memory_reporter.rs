mod checks_table;
mod operations_table;

use crate::report::in_memory_reporter::checks_table::CheckRow;
use crate::report::in_memory_reporter::operations_table::OperationRow;
use crate::report::{ReportCollector, ReportMetric};
use crate::{CheckRecord, CheckTally, OperationRecord};
use std::collections::BTreeMap;
use tabled::settings::Style;
use tabled::Table;

/// A very basic reporter that keeps all of the operations in memory and prints a summary of the
/// operations and checks at the end of the run.
pub struct InMemoryReporter {
    operation_records: Vec<OperationRecord>,
    checks: BTreeMap<String, CheckTally>,
}

impl InMemoryReporter {
    pub fn new() -> Self {
        Self {
            operation_records: Vec::new(),
            checks: BTreeMap::new(),
        }
    }

    fn print_summary(&self) {
        println!("\nSummary of operations");
        let mut table = Table::new(summarise_operations(&self.operation_records));
        table.with(Style::modern());
        println!("{table}");

        if !self.checks.is_empty() {
            println!("\nSummary of checks");
            let mut table = Table::new(summarise_checks(&self.checks));
            table.with(Style::modern());
            println!("{table}");
        }
    }
}

impl ReportCollector for InMemoryReporter {
    fn add_operation(&mut self, operation_record: &OperationRecord) {
        self.operation_records.push(operation_record.clone());
    }

    fn add_check(&mut self, check: &CheckRecord) {
        let tally = self.checks.entry(check.name().to_string()).or_default();
        if check.passed() {
            tally.passes += 1;
        } else {
            tally.fails += 1;
        }
    }

    fn add_custom(&mut self, _metric: ReportMetric) {
        // no-op because custom metrics are only useful as a time series
    }

    fn finalize(&mut self) {
        self.print_summary();
    }
}

fn summarise_operations(records: &[OperationRecord]) -> Vec<OperationRow> {
    let grouped = records
        .iter()
        .fold(BTreeMap::<&str, Vec<&OperationRecord>>::new(), |mut acc, record| {
            acc.entry(record.operation_id()).or_default().push(record);
            acc
        });

    grouped
        .into_iter()
        .map(|(operation_id, operations)| {
            // Timings only describe successful operations, errors are counted separately.
            let mut timings_ms = operations
                .iter()
                .filter(|op| !op.is_error())
                .filter_map(|op| op.duration())
                .map(|d| d.as_micros() as f64 / 1000.0)
                .collect::<Vec<_>>();
            timings_ms.sort_by(f64::total_cmp);

            let avg_time_ms = if timings_ms.is_empty() {
                None
            } else {
                Some(timings_ms.iter().sum::<f64>() / timings_ms.len() as f64)
            };

            OperationRow {
                operation_id: operation_id.to_string(),
                avg_time_ms,
                min_time_ms: timings_ms.first().copied(),
                max_time_ms: timings_ms.last().copied(),
                p95_time_ms: percentile(&timings_ms, 0.95),
                total_operations: operations.len(),
                errors: operations.iter().filter(|op| op.is_error()).count(),
            }
        })
        .collect()
}

fn summarise_checks(checks: &BTreeMap<String, CheckTally>) -> Vec<CheckRow> {
    checks
        .iter()
        .map(|(name, tally)| CheckRow {
            check: name.clone(),
            passes: tally.passes,
            fails: tally.fails,
            pass_rate: tally.pass_rate(),
        })
        .collect()
}

/// Nearest-rank percentile over sorted values.
fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }

    let rank = (p * sorted.len() as f64).ceil() as usize;
    sorted.get(rank.saturating_sub(1)).copied()
}
