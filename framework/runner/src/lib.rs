mod cli;
mod context;
mod definition;
mod duration;
mod executor;
mod init;
mod monitor;
mod options;
mod pool;
mod progress;
mod ramp;
mod run;
mod shutdown;
mod types;

pub mod prelude {
    pub use crate::cli::{GustScenarioCli, ReporterOpt};
    pub use crate::context::UserValuesConstraint;
    pub use crate::context::{AgentContext, RunnerContext};
    pub use crate::definition::{HookResult, ScenarioDefinitionBuilder};
    pub use crate::duration::{parse_duration, DurationParseError};
    pub use crate::executor::Executor;
    pub use crate::init::init;
    pub use crate::options::{
        ExecutorKind, OptionsError, RampingVusOptions, ScenarioOptions, StageOptions,
    };
    pub use crate::ramp::{RampSchedule, RampState, Stage};
    pub use crate::run::{run, RunOutcome};
    pub use crate::types::GustResult;
    pub use gust_instruments::{report_operation, OperationRecord, ReportMetric, Reporter};
}
