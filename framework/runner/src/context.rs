use std::{fmt::Debug, sync::Arc, time::Duration};

use gust_core::prelude::{DelegatedShutdownListener, ShutdownHandle};
use gust_instruments::{CheckRecord, Reporter};

use crate::executor::Executor;
use crate::options::ScenarioOptions;

pub trait UserValuesConstraint: Default + Debug + Send + Sync + 'static {}

/// Shared by every virtual user. The value `RV` can only be modified by the global setup hook,
/// after that the context is read-only.
#[derive(Debug)]
pub struct RunnerContext<RV: UserValuesConstraint> {
    executor: Arc<Executor>,
    reporter: Arc<Reporter>,
    stop_handle: ShutdownHandle,
    connection_string: Option<String>,
    options: ScenarioOptions,
    value: RV,
}

impl<RV: UserValuesConstraint> RunnerContext<RV> {
    pub(crate) fn new(
        executor: Arc<Executor>,
        reporter: Arc<Reporter>,
        stop_handle: ShutdownHandle,
        connection_string: Option<String>,
        options: ScenarioOptions,
    ) -> Self {
        Self {
            executor,
            reporter,
            stop_handle,
            connection_string,
            options,
            value: Default::default(),
        }
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn reporter(&self) -> Arc<Reporter> {
        self.reporter.clone()
    }

    /// The connection string from the command line, or the scenario's default.
    pub fn get_connection_string(&self) -> Option<&str> {
        self.connection_string.as_deref()
    }

    /// The options this scenario is running with.
    pub fn options(&self) -> &ScenarioOptions {
        &self.options
    }

    /// Stop the scenario early. Virtual users finish their current iteration and then exit.
    pub fn force_stop_scenario(&self) {
        self.stop_handle.shutdown();
    }

    pub fn get_mut(&mut self) -> &mut RV {
        &mut self.value
    }

    pub fn get(&self) -> &RV {
        &self.value
    }
}

/// The context of a single virtual user.
///
/// A fresh context, with a default `V`, is created each time the ramp spawns a virtual user.
pub struct AgentContext<RV: UserValuesConstraint, V: UserValuesConstraint> {
    agent_index: usize,
    agent_id: String,
    iteration: u64,
    runner_context: Arc<RunnerContext<RV>>,
    stop_listener: DelegatedShutdownListener,
    value: V,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> AgentContext<RV, V> {
    pub(crate) fn new(
        agent_index: usize,
        runner_context: Arc<RunnerContext<RV>>,
        stop_listener: DelegatedShutdownListener,
    ) -> Self {
        Self {
            agent_index,
            agent_id: format!("vu-{}", agent_index),
            iteration: 0,
            runner_context,
            stop_listener,
            value: Default::default(),
        }
    }

    /// A name for this virtual user, unique among the virtual users that are active at the same time.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn agent_index(&self) -> usize {
        self.agent_index
    }

    /// How many iterations this virtual user has completed.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub(crate) fn complete_iteration(&mut self) {
        self.iteration += 1;
    }

    pub fn runner_context(&self) -> &Arc<RunnerContext<RV>> {
        &self.runner_context
    }

    /// Fires when the scenario is stopping. Race this against long running work that is safe to
    /// abandon.
    pub fn stop_listener(&mut self) -> &mut DelegatedShutdownListener {
        &mut self.stop_listener
    }

    /// Pause this virtual user, for example to add think time between iterations.
    ///
    /// The pause ends early if the scenario is stopping. Returns `true` if the full duration elapsed.
    pub fn sleep(&mut self, duration: Duration) -> bool {
        let executor = self.runner_context.executor().clone();
        executor.sleep(duration, &mut self.stop_listener)
    }

    /// Record the outcome of a named check. Checks are only reported, they don't affect what the
    /// virtual user does next. Returns `passed` so the caller can branch on it if needed.
    pub fn check(&self, name: &str, passed: bool) -> bool {
        self.runner_context
            .reporter
            .add_check(&CheckRecord::new(name, passed));
        passed
    }

    pub fn get_mut(&mut self) -> &mut V {
        &mut self.value
    }

    pub fn get(&self) -> &V {
        &self.value
    }
}
