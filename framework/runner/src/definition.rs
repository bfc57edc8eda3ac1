use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::cli::{GustScenarioCli, ReporterOpt};
use crate::context::{AgentContext, RunnerContext, UserValuesConstraint};
use crate::init::init;
use crate::options::ScenarioOptions;
use crate::ramp::RampSchedule;

pub type HookResult = anyhow::Result<()>;

pub type GlobalHookMut<RV> = fn(&mut RunnerContext<RV>) -> HookResult;
pub type GlobalHook<RV> = fn(Arc<RunnerContext<RV>>) -> HookResult;
pub type AgentHookMut<RV, V> = fn(&mut AgentContext<RV, V>) -> HookResult;

/// The builder for a scenario definition.
///
/// This must be used at the start of a test to define the scenario that you want to run.
pub struct ScenarioDefinitionBuilder<RV: UserValuesConstraint, V: UserValuesConstraint> {
    /// The name of the scenario, which should be unique within the test suite.
    ///
    /// Recommended value is `env!("CARGO_PKG_NAME")`.
    name: String,
    /// This value is initialised for you and you cannot change it.
    #[doc(hidden)]
    cli: GustScenarioCli,
    /// The connection string to use if none is given on the command line.
    default_connection_string: Option<String>,
    /// The options to use if no options file is given on the command line.
    default_options: Option<ScenarioOptions>,
    /// Global setup hook for this scenario. It will be run once, before any virtual users are started.
    ///
    /// If this hook fails then the scenario does not run.
    setup_fn: Option<GlobalHookMut<RV>>,
    /// Setup hook for a virtual user, which will be run each time the ramp spawns a virtual user.
    setup_agent_fn: Option<AgentHookMut<RV, V>>,
    /// The iteration function. Virtual users call this in a loop until they are retired by the ramp
    /// or the scenario stops.
    agent_behaviour: Option<AgentHookMut<RV, V>>,
    /// Teardown hook for a virtual user, run when it is retired or the scenario stops.
    teardown_agent_fn: Option<AgentHookMut<RV, V>>,
    /// Global teardown hook, run once after every virtual user has stopped. This is best effort,
    /// an error is logged but does not fail the run.
    teardown_fn: Option<GlobalHook<RV>>,
}

pub struct ScenarioDefinition<RV: UserValuesConstraint, V: UserValuesConstraint> {
    pub name: String,
    pub connection_string: Option<String>,
    pub options: ScenarioOptions,
    pub ramp: RampSchedule,
    pub graceful_stop: Duration,
    /// How long to run the ramp for, the schedule's total unless overridden on the command line.
    pub run_for: Duration,
    pub no_progress: bool,
    pub reporter: ReporterOpt,
    pub metrics_dir: PathBuf,
    pub run_id: Option<String>,
    pub run_summary: Option<PathBuf>,
    pub setup_fn: Option<GlobalHookMut<RV>>,
    pub setup_agent_fn: Option<AgentHookMut<RV, V>>,
    pub agent_behaviour: AgentHookMut<RV, V>,
    pub teardown_agent_fn: Option<AgentHookMut<RV, V>>,
    pub teardown_fn: Option<GlobalHook<RV>>,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> ScenarioDefinitionBuilder<RV, V> {
    /// Initialise a new scenario definition from the scenario name and command line arguments.
    ///
    /// This also initialises logging, so it should only be called once, from the scenario's `main`.
    pub fn new_with_init(name: &str) -> Self {
        Self::new(name, init())
    }

    /// Initialise a new scenario definition with a pre-built CLI configuration.
    pub fn new(name: &str, cli: GustScenarioCli) -> Self {
        Self {
            name: name.to_string(),
            cli,
            default_connection_string: None,
            default_options: None,
            setup_fn: None,
            setup_agent_fn: None,
            agent_behaviour: None,
            teardown_agent_fn: None,
            teardown_fn: None,
        }
    }

    /// Set the connection string to use when `--connection-string` isn't given.
    pub fn with_default_connection_string(mut self, connection_string: &str) -> Self {
        self.default_connection_string = Some(connection_string.to_string());
        self
    }

    /// Set the options to use when `--options` isn't given.
    pub fn with_default_options(mut self, options: ScenarioOptions) -> Self {
        self.default_options = Some(options);
        self
    }

    /// Set the global setup hook [ScenarioDefinitionBuilder::setup_fn] for this scenario.
    pub fn use_setup(mut self, setup_fn: GlobalHookMut<RV>) -> Self {
        self.setup_fn = Some(setup_fn);
        self
    }

    /// Set the virtual user setup hook [ScenarioDefinitionBuilder::setup_agent_fn] for this scenario.
    pub fn use_agent_setup(mut self, setup_agent_fn: AgentHookMut<RV, V>) -> Self {
        self.setup_agent_fn = Some(setup_agent_fn);
        self
    }

    /// Set the iteration function [ScenarioDefinitionBuilder::agent_behaviour] for this scenario.
    pub fn use_agent_behaviour(mut self, behaviour: AgentHookMut<RV, V>) -> Self {
        self.agent_behaviour = Some(behaviour);
        self
    }

    /// Set the virtual user teardown hook [ScenarioDefinitionBuilder::teardown_agent_fn] for this scenario.
    pub fn use_agent_teardown(mut self, teardown_agent_fn: AgentHookMut<RV, V>) -> Self {
        self.teardown_agent_fn = Some(teardown_agent_fn);
        self
    }

    /// Set the global teardown hook [ScenarioDefinitionBuilder::teardown_fn] for this scenario.
    pub fn use_teardown(mut self, teardown_fn: GlobalHook<RV>) -> Self {
        self.teardown_fn = Some(teardown_fn);
        self
    }

    /// Resolve the command line against the scenario defaults and validate the result.
    pub(crate) fn build(self) -> anyhow::Result<ScenarioDefinition<RV, V>> {
        let options = match &self.cli.options {
            Some(path) => {
                log::info!("Loading scenario options from {}", path.display());
                ScenarioOptions::from_file(path)?
            }
            None => self.default_options.ok_or_else(|| {
                anyhow::anyhow!("No options configured, pass --options or set default options in the scenario")
            })?,
        };

        let ramp = options.ramp_schedule()?;
        let graceful_stop = options.graceful_stop()?;

        let run_for = match self.cli.duration {
            Some(seconds) => Duration::from_secs(seconds),
            None => ramp.total_duration(),
        };
        if run_for.is_zero() {
            anyhow::bail!("The run duration must be greater than zero");
        }

        let agent_behaviour = self
            .agent_behaviour
            .ok_or_else(|| anyhow::anyhow!("No agent behaviour has been defined for {}", self.name))?;

        Ok(ScenarioDefinition {
            name: self.name,
            connection_string: self.cli.connection_string.or(self.default_connection_string),
            options,
            ramp,
            graceful_stop,
            run_for,
            no_progress: self.cli.no_progress,
            reporter: self.cli.reporter,
            metrics_dir: self.cli.metrics_dir,
            run_id: self.cli.run_id,
            run_summary: self.cli.run_summary,
            setup_fn: self.setup_fn,
            setup_agent_fn: self.setup_agent_fn,
            agent_behaviour,
            teardown_agent_fn: self.teardown_agent_fn,
            teardown_fn: self.teardown_fn,
        })
    }
}
