use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::{parse_duration, DurationParseError};
use crate::ramp::{RampSchedule, Stage};

const DEFAULT_GRACEFUL_STOP: &str = "30s";

/// Errors from loading or validating [ScenarioOptions].
///
/// These are fatal. The runner refuses to start any virtual users with invalid options.
#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum OptionsError {
    #[display("Failed to read options file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[display("Failed to parse options: {source}")]
    Parse { source: toml::de::Error },
    #[display("The ramping-vus executor needs at least one stage")]
    NoStages,
    #[display("The stages must add up to a duration greater than zero")]
    ZeroDuration,
    #[display("Invalid {field}: {source}")]
    InvalidDuration {
        field: String,
        source: DurationParseError,
    },
}

/// The scenario options, which describe how load is generated.
///
/// Options can be written in code with the builder methods or loaded from a TOML file:
///
/// ```toml
/// discardResponseBodies = true
///
/// [scenario]
/// executor = "ramping-vus"
/// startVUs = 200
/// stages = [
///   { duration = "30s", target = 1000 },
///   { duration = "1m", target = 1000 },
/// ]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScenarioOptions {
    /// Read response bodies off the wire but don't keep them. This saves memory and does not
    /// change what requests are sent.
    #[serde(default)]
    pub discard_response_bodies: bool,
    pub scenario: RampingVusOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RampingVusOptions {
    #[serde(default)]
    pub executor: ExecutorKind,
    #[serde(rename = "startVUs", default)]
    pub start_vus: usize,
    #[serde(default)]
    pub stages: Vec<StageOptions>,
    /// How long in-flight iterations may run after the scenario ends before they are cancelled.
    #[serde(default = "default_graceful_stop")]
    pub graceful_stop: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutorKind {
    /// Ramp the number of concurrently looping virtual users through the configured stages.
    #[default]
    RampingVus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageOptions {
    pub duration: String,
    pub target: usize,
}

fn default_graceful_stop() -> String {
    DEFAULT_GRACEFUL_STOP.to_string()
}

impl ScenarioOptions {
    /// Options for the ramping-vus executor starting with `start_vus` and no stages.
    pub fn ramping_vus(start_vus: usize) -> Self {
        Self {
            discard_response_bodies: false,
            scenario: RampingVusOptions {
                executor: ExecutorKind::RampingVus,
                start_vus,
                stages: Vec::new(),
                graceful_stop: default_graceful_stop(),
            },
        }
    }

    /// Append a stage. The duration is a literal like `30s` or `1m30s`.
    pub fn with_stage(mut self, duration: &str, target: usize) -> Self {
        self.scenario.stages.push(StageOptions {
            duration: duration.to_string(),
            target,
        });
        self
    }

    pub fn with_graceful_stop(mut self, graceful_stop: &str) -> Self {
        self.scenario.graceful_stop = graceful_stop.to_string();
        self
    }

    pub fn with_discard_response_bodies(mut self, discard: bool) -> Self {
        self.discard_response_bodies = discard;
        self
    }

    pub fn from_toml_str(s: &str) -> Result<Self, OptionsError> {
        toml::from_str(s).map_err(|source| OptionsError::Parse { source })
    }

    pub fn from_file(path: &Path) -> Result<Self, OptionsError> {
        let content = std::fs::read_to_string(path).map_err(|source| OptionsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Check the options and build the ramp that they describe.
    pub fn ramp_schedule(&self) -> Result<RampSchedule, OptionsError> {
        if self.scenario.stages.is_empty() {
            return Err(OptionsError::NoStages);
        }

        let stages = self
            .scenario
            .stages
            .iter()
            .enumerate()
            .map(|(index, stage)| {
                parse_duration(&stage.duration)
                    .map(|duration| Stage::new(duration, stage.target))
                    .map_err(|source| OptionsError::InvalidDuration {
                        field: format!("duration of stage {}", index + 1),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let schedule = RampSchedule::new(self.scenario.start_vus, stages);
        if schedule.total_duration().is_zero() {
            return Err(OptionsError::ZeroDuration);
        }

        Ok(schedule)
    }

    pub fn graceful_stop(&self) -> Result<Duration, OptionsError> {
        parse_duration(&self.scenario.graceful_stop).map_err(|source| {
            OptionsError::InvalidDuration {
                field: "gracefulStop".to_string(),
                source,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const API_INFO_OPTIONS: &str = r#"
discardResponseBodies = true

[scenario]
executor = "ramping-vus"
startVUs = 200
stages = [
  { duration = "30s", target = 1000 },
  { duration = "1m", target = 1000 },
]
"#;

    #[test]
    fn parses_toml_options() {
        let options = ScenarioOptions::from_toml_str(API_INFO_OPTIONS).unwrap();

        let expected = ScenarioOptions::ramping_vus(200)
            .with_discard_response_bodies(true)
            .with_stage("30s", 1000)
            .with_stage("1m", 1000);
        assert_eq!(expected, options);
    }

    #[test]
    fn builds_ramp_schedule() {
        let schedule = ScenarioOptions::from_toml_str(API_INFO_OPTIONS)
            .unwrap()
            .ramp_schedule()
            .unwrap();

        assert_eq!(200, schedule.start_vus());
        assert_eq!(
            vec![
                Stage::new(Duration::from_secs(30), 1000),
                Stage::new(Duration::from_secs(60), 1000)
            ],
            schedule.stages()
        );
    }

    #[test]
    fn defaults() {
        let options = ScenarioOptions::from_toml_str(
            r#"
[scenario]
stages = [{ duration = "10s", target = 5 }]
"#,
        )
        .unwrap();

        assert!(!options.discard_response_bodies);
        assert_eq!(ExecutorKind::RampingVus, options.scenario.executor);
        assert_eq!(0, options.scenario.start_vus);
        assert_eq!(Duration::from_secs(30), options.graceful_stop().unwrap());
    }

    #[test]
    fn rejects_unknown_executor() {
        let err = ScenarioOptions::from_toml_str(
            r#"
[scenario]
executor = "constant-arrival-rate"
stages = [{ duration = "10s", target = 5 }]
"#,
        )
        .unwrap_err();

        assert!(matches!(err, OptionsError::Parse { .. }));
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = ScenarioOptions::from_toml_str(
            r#"
[scenario]
startVus = 5
stages = [{ duration = "10s", target = 5 }]
"#,
        )
        .unwrap_err();

        assert!(matches!(err, OptionsError::Parse { .. }));
    }

    #[test]
    fn rejects_negative_target() {
        let err = ScenarioOptions::from_toml_str(
            r#"
[scenario]
stages = [{ duration = "10s", target = -5 }]
"#,
        )
        .unwrap_err();

        assert!(matches!(err, OptionsError::Parse { .. }));
    }

    #[test]
    fn rejects_missing_stages() {
        let err = ScenarioOptions::ramping_vus(10).ramp_schedule().unwrap_err();

        assert!(matches!(err, OptionsError::NoStages));
    }

    #[test]
    fn rejects_zero_total_duration() {
        let err = ScenarioOptions::ramping_vus(10)
            .with_stage("0s", 10)
            .ramp_schedule()
            .unwrap_err();

        assert!(matches!(err, OptionsError::ZeroDuration));
    }

    #[test]
    fn reports_which_stage_has_a_bad_duration() {
        let err = ScenarioOptions::ramping_vus(10)
            .with_stage("30s", 10)
            .with_stage("a minute", 10)
            .ramp_schedule()
            .unwrap_err();

        assert_eq!(
            "Invalid duration of stage 2: invalid duration `a minute`: expected a number",
            err.to_string()
        );
    }

    #[test]
    fn reads_options_from_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), API_INFO_OPTIONS).unwrap();

        let options = ScenarioOptions::from_file(file.path()).unwrap();
        assert_eq!(2, options.scenario.stages.len());

        let missing = ScenarioOptions::from_file(&file.path().with_extension("missing"));
        assert!(matches!(missing, Err(OptionsError::Read { .. })));
    }
}
