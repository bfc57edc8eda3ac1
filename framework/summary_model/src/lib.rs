use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, Read, Write};
use std::path::Path;

/// One stage of the ramp, as it was configured for the run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageSummary {
    /// The stage duration, in milliseconds
    pub duration_ms: u64,
    /// The number of virtual users targeted at the end of the stage
    pub target: usize,
}

/// Pass and fail counts for a named check.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckCounts {
    pub passes: u64,
    pub fails: u64,
}

/// Summary of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// The unique run id
    ///
    /// Chosen by the runner. Unique for each run.
    pub run_id: String,
    /// The name of the scenario that was run
    pub scenario_name: String,
    /// The time the run started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
    /// The duration that the run was configured with, in seconds
    ///
    /// The run finishes sooner than `started_at + run_duration` if it is stopped early.
    pub run_duration: u64,
    /// The number of virtual users at the start of the ramp
    pub start_vus: usize,
    /// The ramp stages
    pub stages: Vec<StageSummary>,
    /// The number of virtual users the ramp was targeting when the run stopped
    ///
    /// There is no implicit ramp down, so this is the last stage's target for a run that wasn't
    /// stopped early.
    pub final_vus: usize,
    /// The most virtual users that were active at the same time
    pub peak_vus: usize,
    /// The number of iterations completed across all virtual users
    pub iterations: u64,
    /// The number of virtual users that bailed
    ///
    /// The slot of a bailed virtual user is not refilled, so this reduces the load for the rest
    /// of the run.
    pub bailed_vus: usize,
    /// Check outcomes, keyed by check name
    pub checks: BTreeMap<String, CheckCounts>,
    /// Environment variables set for the run
    ///
    /// This won't capture all environment variables. Just the ones that the runner is aware of or
    /// that are included by the scenario itself.
    pub env: HashMap<String, String>,
    /// The version of Gust that was used for this run
    pub gust_version: String,
}

impl RunSummary {
    /// Create a new run summary
    pub fn new(
        run_id: String,
        scenario_name: String,
        started_at: i64,
        run_duration: u64,
        start_vus: usize,
        stages: Vec<StageSummary>,
        gust_version: String,
    ) -> Self {
        Self {
            run_id,
            scenario_name,
            started_at,
            run_duration,
            start_vus,
            stages,
            final_vus: 0,
            peak_vus: 0,
            iterations: 0,
            bailed_vus: 0,
            checks: BTreeMap::new(),
            env: HashMap::with_capacity(0),
            gust_version,
        }
    }

    /// Record how the virtual users ended the run
    pub fn set_outcome(
        &mut self,
        final_vus: usize,
        peak_vus: usize,
        iterations: u64,
        bailed_vus: usize,
    ) {
        self.final_vus = final_vus;
        self.peak_vus = peak_vus;
        self.iterations = iterations;
        self.bailed_vus = bailed_vus;
    }

    pub fn set_checks(&mut self, checks: BTreeMap<String, CheckCounts>) {
        self.checks = checks;
    }

    /// Add an environment variable
    pub fn add_env(&mut self, key: String, value: String) {
        self.env.insert(key, value);
    }

    /// Compute a fingerprint for this run summary
    ///
    /// The fingerprint is intended to uniquely identify the configuration used to run the scenario.
    /// It uses the
    ///     - Scenario name
    ///     - Run duration
    ///     - Start VUs and stages
    ///     - Selected environment variables
    ///     - Gust version
    ///
    /// The fingerprint is computed using [sha3::Sha3_256].
    pub fn fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, self.scenario_name.as_bytes());
        Digest::update(&mut hasher, self.run_duration.to_le_bytes());
        Digest::update(&mut hasher, self.start_vus.to_le_bytes());
        for stage in &self.stages {
            Digest::update(&mut hasher, stage.duration_ms.to_le_bytes());
            Digest::update(&mut hasher, stage.target.to_le_bytes());
        }
        self.env
            .iter()
            .sorted_by_key(|(k, _)| k.to_owned())
            .for_each(|(k, v)| {
                Digest::update(&mut hasher, k.as_bytes());
                Digest::update(&mut hasher, v.as_bytes());
            });
        Digest::update(&mut hasher, self.gust_version.as_bytes());

        format!("{:x}", hasher.finalize())
    }
}

/// Append the run summary to a file
///
/// The summary will be serialized to JSON and output as a single line followed by a newline. The
/// recommended file extension is `.jsonl`.
pub fn append_run_summary(run_summary: &RunSummary, path: &Path) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    store_run_summary(run_summary, &mut file)?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Serialize the run summary to a writer
pub fn store_run_summary<W: Write>(run_summary: &RunSummary, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(writer, run_summary)?;
    Ok(())
}

/// Load a run summary from a reader
pub fn load_run_summary<R: Read>(reader: R) -> anyhow::Result<RunSummary> {
    let reader = std::io::BufReader::new(reader);
    let run_summary: RunSummary = serde_json::from_reader(reader)?;
    Ok(run_summary)
}

/// Load run summaries from a file
///
/// The file should contain one JSON object per line. This is the format produced by
/// [append_run_summary].
pub fn load_summary_runs(path: &Path) -> anyhow::Result<Vec<RunSummary>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut runs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let run: RunSummary = serde_json::from_str(&line)?;
        runs.push(run);
    }
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn summary(run_id: &str) -> RunSummary {
        RunSummary::new(
            run_id.to_string(),
            "api_info_highload".to_string(),
            1_700_000_000,
            90,
            200,
            vec![
                StageSummary {
                    duration_ms: 30_000,
                    target: 1000,
                },
                StageSummary {
                    duration_ms: 60_000,
                    target: 1000,
                },
            ],
            "0.1.0".to_string(),
        )
    }

    #[test]
    fn fingerprint_ignores_run_specific_values() {
        let mut first = summary("a");
        let mut second = summary("b");
        second.started_at += 100;
        second.set_outcome(1000, 1000, 50_000, 2);
        second.set_checks(BTreeMap::from([(
            "status was 200".to_string(),
            CheckCounts {
                passes: 10,
                fails: 0,
            },
        )]));

        first.add_env("A".to_string(), "1".to_string());
        first.add_env("B".to_string(), "2".to_string());
        second.add_env("B".to_string(), "2".to_string());
        second.add_env("A".to_string(), "1".to_string());

        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_the_ramp() {
        let first = summary("a");
        let mut second = summary("a");
        second.stages[0].target = 999;

        assert_ne!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn appends_one_summary_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_summary.jsonl");

        let mut first = summary("a");
        first.set_outcome(1000, 1000, 42, 0);
        append_run_summary(&first, &path).unwrap();
        append_run_summary(&summary("b"), &path).unwrap();

        let runs = load_summary_runs(&path).unwrap();
        assert_eq!(vec![first, summary("b")], runs);
    }

    #[test]
    fn loads_a_stored_summary() {
        let mut buf = Vec::new();
        store_run_summary(&summary("a"), &mut buf).unwrap();

        assert_eq!(summary("a"), load_run_summary(buf.as_slice()).unwrap());
    }
}
