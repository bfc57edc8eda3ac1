use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use gust_core::prelude::ShutdownHandle;
use gust_instruments::{ReportConfig, ReportMetric, Reporter};
use gust_summary_model::{append_run_summary, CheckCounts, RunSummary, StageSummary};

use crate::cli::ReporterOpt;
use crate::context::{RunnerContext, UserValuesConstraint};
use crate::definition::{ScenarioDefinition, ScenarioDefinitionBuilder};
use crate::executor::Executor;
use crate::monitor::start_monitor;
use crate::pool::{AgentHooks, VirtualUserPool};
use crate::progress::start_progress;
use crate::ramp::RampState;
use crate::shutdown::start_shutdown_listener;

/// How often the ramp recomputes its target and scales the virtual users.
const RAMP_TICK: Duration = Duration::from_millis(100);

/// What the virtual users did during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// The number of virtual users the ramp was targeting when the run stopped.
    pub final_vus: usize,
    /// The most virtual users that were active at the same time.
    pub peak_vus: usize,
    /// Iterations completed across all virtual users.
    pub iterations: u64,
    /// Virtual users that bailed. Their slots were not refilled.
    pub bailed_vus: usize,
}

pub fn run<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: ScenarioDefinitionBuilder<RV, V>,
) -> anyhow::Result<RunOutcome> {
    let definition = definition.build()?;

    log::info!(
        "Running scenario {} for {:?}, starting with {} virtual users and peaking at {}",
        definition.name,
        definition.run_for,
        definition.ramp.start_vus(),
        definition.ramp.max_vus()
    );

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;

    // Stop lets in-flight iterations complete, shutdown cancels them.
    let stop_handle = ShutdownHandle::new();
    let shutdown_handle = ShutdownHandle::new();
    start_shutdown_listener(&runtime, stop_handle.clone(), shutdown_handle.clone());

    let run_id = definition
        .run_id
        .clone()
        .unwrap_or_else(|| nanoid::nanoid!());
    let started_at = chrono::Utc::now().timestamp();

    let reporter = Arc::new(init_reporter(&definition, &run_id, &runtime)?);
    let executor = Arc::new(Executor::new(runtime, shutdown_handle.clone()));

    let mut runner_context = RunnerContext::new(
        executor,
        reporter.clone(),
        stop_handle.clone(),
        definition.connection_string.clone(),
        definition.options.clone(),
    );

    if let Some(setup_fn) = definition.setup_fn {
        setup_fn(&mut runner_context)?;
    }

    let runner_context = Arc::new(runner_context);

    let mut pool = VirtualUserPool::<RV, V>::new(
        runner_context.clone(),
        AgentHooks {
            setup: definition.setup_agent_fn,
            behaviour: definition.agent_behaviour,
            teardown: definition.teardown_agent_fn,
        },
        stop_handle.clone(),
    );

    if !definition.no_progress {
        start_progress(
            definition.run_for,
            pool.counters().clone(),
            stop_handle.new_listener(),
        )?;
    }

    // Ready to start spawning virtual users so start the resource monitor to report high usage by
    // the load generator, which might lead to a misleading outcome.
    start_monitor(stop_handle.new_listener())?;

    let final_vus = drive_ramp(&definition, &mut pool, &reporter, &stop_handle);

    log::info!("Stopping virtual users");
    stop_handle.shutdown();

    if !pool.wait_for_idle(definition.graceful_stop) {
        log::warn!(
            "{} virtual users were still running after the graceful stop period of {:?}, cancelling them",
            pool.counters().active(),
            definition.graceful_stop
        );
        shutdown_handle.shutdown();
    }
    pool.join_all()?;

    if let Some(teardown_fn) = definition.teardown_fn {
        // Don't crash the runner if the teardown fails. We still want the reporting and runner
        // shutdown to happen cleanly. The hook is documented as 'best effort'
        if let Err(e) = teardown_fn(runner_context.clone()) {
            log::error!("Teardown failed: {:?}", e);
        }
    }

    reporter.finalize();

    let counters = pool.counters();
    let outcome = RunOutcome {
        final_vus,
        peak_vus: counters.peak(),
        iterations: counters.iterations(),
        bailed_vus: counters.bailed(),
    };

    log::info!(
        "Scenario {} finished with {} virtual users after {} iterations",
        definition.name,
        outcome.final_vus,
        outcome.iterations
    );

    if let Some(path) = &definition.run_summary {
        let summary = build_run_summary(&definition, run_id, started_at, &reporter, &outcome);
        append_run_summary(&summary, path)
            .with_context(|| format!("Failed to write run summary to {}", path.display()))?;
    }

    Ok(outcome)
}

fn init_reporter<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: &ScenarioDefinition<RV, V>,
    run_id: &str,
    runtime: &tokio::runtime::Runtime,
) -> anyhow::Result<Reporter> {
    let config = ReportConfig::new(run_id, definition.name.clone());
    let config = match definition.reporter {
        ReporterOpt::Noop => {
            log::info!("Running without reporting");
            config
        }
        ReporterOpt::InMemory => config.enable_in_memory(),
        ReporterOpt::InfluxFile => {
            log::info!(
                "Writing metrics for run {} to {}",
                run_id,
                definition.metrics_dir.display()
            );
            config.enable_influx_file(definition.metrics_dir.clone())
        }
    };

    config.init_reporter(runtime)
}

/// Scale the virtual users along the ramp until the run time is up or the scenario is stopped.
///
/// Returns the target when the ramp ended.
fn drive_ramp<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: &ScenarioDefinition<RV, V>,
    pool: &mut VirtualUserPool<RV, V>,
    reporter: &Reporter,
    stop_handle: &ShutdownHandle,
) -> usize {
    let mut stop_listener = stop_handle.new_listener();
    let started = Instant::now();
    let mut last_state: Option<RampState> = None;

    loop {
        let elapsed = started.elapsed().min(definition.run_for);

        let state = definition.ramp.state_at(elapsed);
        if last_state != Some(state) {
            log::info!("Ramp entered {} at {:?}", state, elapsed);
            last_state = Some(state);
        }

        let target = definition.ramp.vus_at(elapsed);

        if stop_listener.should_shutdown() || elapsed >= definition.run_for {
            return target;
        }

        if let Err(e) = pool.scale_to(target) {
            log::error!("Failed to scale to {} virtual users: {:?}", target, e);
        }

        reporter.add_custom(
            ReportMetric::new("vus")
                .with_tag("ramp", state.to_string())
                .with_field("active", pool.counters().active() as u64)
                .with_field("target", target as u64),
        );

        std::thread::sleep(RAMP_TICK.min(definition.run_for - elapsed));
    }
}

fn build_run_summary<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: &ScenarioDefinition<RV, V>,
    run_id: String,
    started_at: i64,
    reporter: &Reporter,
    outcome: &RunOutcome,
) -> RunSummary {
    let mut summary = RunSummary::new(
        run_id,
        definition.name.clone(),
        started_at,
        definition.run_for.as_secs(),
        definition.ramp.start_vus(),
        definition
            .ramp
            .stages()
            .iter()
            .map(|stage| StageSummary {
                duration_ms: stage.duration.as_millis() as u64,
                target: stage.target,
            })
            .collect(),
        env!("CARGO_PKG_VERSION").to_string(),
    );
    summary.set_outcome(
        outcome.final_vus,
        outcome.peak_vus,
        outcome.iterations,
        outcome.bailed_vus,
    );
    summary.set_checks(
        reporter
            .check_tally()
            .into_iter()
            .map(|(name, tally)| {
                (
                    name,
                    CheckCounts {
                        passes: tally.passes,
                        fails: tally.fails,
                    },
                )
            })
            .collect::<BTreeMap<_, _>>(),
    );
    if let Some(connection_string) = &definition.connection_string {
        summary.add_env("CONNECTION_STRING".to_string(), connection_string.clone());
    }

    summary
}
