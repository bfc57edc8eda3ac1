use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Parser)]
#[command(about, long_about = None)]
pub struct GustScenarioCli {
    /// Base URL of the service to test, for example `http://localhost:8080`.
    ///
    /// Scenarios usually provide a default, so this is only needed to target a different service.
    #[clap(short, long)]
    pub connection_string: Option<String>,

    /// Path to a TOML file with the scenario options. This replaces the options built into the
    /// scenario, including the start VUs and all of the stages.
    #[clap(long)]
    pub options: Option<PathBuf>,

    /// The number of seconds to run the scenario for.
    ///
    /// By default the scenario runs for the sum of its stage durations. A shorter duration cuts
    /// the ramp short and a longer one holds the last stage's target until the time is up.
    #[clap(long)]
    pub duration: Option<u64>,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,

    /// Where operations, checks and custom metrics are reported.
    #[clap(long, value_enum, default_value_t = ReporterOpt::InMemory)]
    pub reporter: ReporterOpt,

    /// Directory for the metrics file when using the `influx-file` reporter.
    #[clap(long, default_value = "metrics")]
    pub metrics_dir: PathBuf,

    /// A unique identifier for this run. A random one is chosen if not set.
    #[clap(long)]
    pub run_id: Option<String>,

    /// Append a JSON summary of the run to this file.
    #[clap(long)]
    pub run_summary: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReporterOpt {
    /// Don't report anything, check outcomes are still counted for the run summary.
    Noop,
    /// Keep everything in memory and print summary tables at the end of the run.
    #[default]
    InMemory,
    /// Write InfluxDB line protocol to a file in `--metrics-dir`.
    InfluxFile,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let cli = GustScenarioCli::try_parse_from([
            "api_info_highload",
            "--connection-string",
            "http://localhost:9000",
            "--duration",
            "10",
            "--reporter",
            "influx-file",
            "--no-progress",
        ])
        .unwrap();

        assert_eq!(Some("http://localhost:9000"), cli.connection_string.as_deref());
        assert_eq!(Some(10), cli.duration);
        assert_eq!(ReporterOpt::InfluxFile, cli.reporter);
        assert!(cli.no_progress);
        assert_eq!(PathBuf::from("metrics"), cli.metrics_dir);
    }

    #[test]
    fn defaults_to_in_memory_reporter() {
        let cli = GustScenarioCli::try_parse_from(["api_info_highload"]).unwrap();

        assert_eq!(ReporterOpt::InMemory, cli.reporter);
        assert!(cli.options.is_none());
        assert!(!cli.no_progress);
    }
}
