use std::fmt::{Display, Formatter};
use std::time::Duration;

/// One segment of a ramp: move linearly from the previous target to `target` virtual users over
/// `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: usize,
}

impl Stage {
    pub fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }
}

/// Where a ramp is at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampState {
    /// Inside the stage with this index.
    Ramping { stage: usize },
    /// Every stage has elapsed. The target stays at the last stage's target.
    Finished,
}

impl Display for RampState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RampState::Ramping { stage } => write!(f, "stage {}", stage + 1),
            RampState::Finished => write!(f, "finished"),
        }
    }
}

/// A piecewise-linear schedule of how many virtual users should be active over time.
///
/// The ramp starts at `start_vus` and each stage interpolates from the previous stage's target, or
/// `start_vus` for the first stage, to its own target. There is no implicit ramp down after the
/// last stage. If the last stage isn't targeting zero virtual users then the ramp finishes with
/// that many still active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RampSchedule {
    start_vus: usize,
    stages: Vec<Stage>,
}

impl RampSchedule {
    pub fn new(start_vus: usize, stages: Vec<Stage>) -> Self {
        Self { start_vus, stages }
    }

    pub fn start_vus(&self) -> usize {
        self.start_vus
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// The sum of every stage's duration.
    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// The most virtual users that the schedule will ever ask for.
    pub fn max_vus(&self) -> usize {
        self.stages
            .iter()
            .map(|s| s.target)
            .fold(self.start_vus, usize::max)
    }

    pub fn state_at(&self, elapsed: Duration) -> RampState {
        let mut stage_end = Duration::ZERO;
        for (index, stage) in self.stages.iter().enumerate() {
            stage_end += stage.duration;
            if elapsed < stage_end {
                return RampState::Ramping { stage: index };
            }
        }

        RampState::Finished
    }

    /// The exact, fractional, number of virtual users that should be active at `elapsed`.
    pub fn target_at(&self, elapsed: Duration) -> f64 {
        let mut from = self.start_vus as f64;
        let mut stage_start = Duration::ZERO;

        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            let to = stage.target as f64;

            // Zero length stages never match here, so they act as an immediate jump to the target.
            if elapsed < stage_end {
                let progress =
                    (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                return from + (to - from) * progress;
            }

            from = to;
            stage_start = stage_end;
        }

        from
    }

    /// The number of virtual users that should be active at `elapsed`.
    ///
    /// Rounds to the nearest whole virtual user. A half rounds up, so the ramp prefers spawning a
    /// virtual user over retiring one.
    pub fn vus_at(&self, elapsed: Duration) -> usize {
        (self.target_at(elapsed) + 0.5).floor() as usize
    }
}
