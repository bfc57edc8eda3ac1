use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::time::Duration;

use http_gust_runner::prelude::*;
use gust_summary_model::CheckCounts;
use pretty_assertions::assert_eq;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TEST_TOKEN: &str = "test-token";

fn setup(ctx: &mut RunnerContext<HttpRunnerContext>) -> HookResult {
    configure_http_client(ctx)?;
    ctx.get_mut().set_bearer_token(TEST_TOKEN);
    Ok(())
}

fn agent_behaviour(ctx: &mut AgentContext<HttpRunnerContext, HttpAgentContext>) -> HookResult {
    let response = get_with_bearer_token(ctx, "/api/info");
    check_status(ctx, "status was 200", &response, StatusCode::OK);
    ctx.sleep(Duration::from_millis(100));
    Ok(())
}

fn cli_for(connection_string: String, run_summary: PathBuf) -> GustScenarioCli {
    GustScenarioCli {
        connection_string: Some(connection_string),
        options: None,
        duration: None,
        no_progress: true,
        reporter: ReporterOpt::Noop,
        metrics_dir: PathBuf::from("metrics"),
        run_id: None,
        run_summary: Some(run_summary),
    }
}

fn short_ramp() -> ScenarioOptions {
    ScenarioOptions::ramping_vus(1)
        .with_stage("500ms", 2)
        .with_discard_response_bodies(true)
}

fn run_against(
    connection_string: String,
    options: ScenarioOptions,
    run_summary: PathBuf,
) -> RunOutcome {
    let scenario = ScenarioDefinitionBuilder::<HttpRunnerContext, HttpAgentContext>::new(
        "api_requests",
        cli_for(connection_string, run_summary),
    )
    .with_default_options(options)
    .use_setup(setup)
    .use_agent_behaviour(agent_behaviour);

    run(scenario).unwrap()
}

fn status_checks(run_summary: &Path) -> CheckCounts {
    let summary = gust_summary_model::load_summary_runs(run_summary)
        .unwrap()
        .remove(0);
    summary.checks["status was 200"]
}

#[test]
fn checks_pass_when_the_api_accepts_the_token() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let server = runtime.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/info"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;
        server
    });

    let dir = tempfile::tempdir().unwrap();
    let summary_path = dir.path().join("run_summary.jsonl");
    let outcome = run_against(server.uri(), short_ramp(), summary_path.clone());

    let checks = status_checks(&summary_path);
    assert_eq!(0, checks.fails);
    assert_eq!(outcome.iterations, checks.passes);

    let requests = runtime.block_on(server.received_requests()).unwrap();
    assert_eq!(outcome.iterations as usize, requests.len());
}

#[test]
fn checks_fail_on_other_statuses() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let server = runtime.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        server
    });

    let dir = tempfile::tempdir().unwrap();
    let summary_path = dir.path().join("run_summary.jsonl");
    let outcome = run_against(server.uri(), short_ramp(), summary_path.clone());

    let checks = status_checks(&summary_path);
    assert_eq!(0, checks.passes);
    assert_eq!(outcome.iterations, checks.fails);
    assert_eq!(0, outcome.bailed_vus);
}

#[test]
fn transport_errors_fail_the_check_and_the_virtual_user_carries_on() {
    // Nothing listens on the port once the listener is dropped.
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let dir = tempfile::tempdir().unwrap();
    let summary_path = dir.path().join("run_summary.jsonl");
    let outcome = run_against(
        format!("http://127.0.0.1:{port}"),
        ScenarioOptions::ramping_vus(1).with_stage("500ms", 1),
        summary_path.clone(),
    );

    assert!(outcome.iterations > 0);
    assert_eq!(0, outcome.bailed_vus);
    assert_eq!(
        CheckCounts {
            passes: 0,
            fails: outcome.iterations,
        },
        status_checks(&summary_path)
    );
}

#[test]
fn slow_responses_hold_up_each_iteration() {
    let delay = Duration::from_millis(250);
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let server = runtime.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/info"))
            .respond_with(ResponseTemplate::new(200).set_delay(delay))
            .mount(&server)
            .await;
        server
    });

    let run_for = Duration::from_secs(1);
    let dir = tempfile::tempdir().unwrap();
    let summary_path = dir.path().join("run_summary.jsonl");
    let outcome = run_against(
        server.uri(),
        ScenarioOptions::ramping_vus(1).with_stage("1s", 1),
        summary_path.clone(),
    );

    // Each iteration waits for the response and then sleeps for 100ms, so the one virtual user
    // can only start an iteration every 350ms. One started before the stop is allowed to finish.
    let per_iteration = delay + Duration::from_millis(100);
    let max_iterations = run_for.as_millis().div_ceil(per_iteration.as_millis()) as u64;
    assert!(outcome.iterations > 0);
    assert!(
        outcome.iterations <= max_iterations,
        "{} iterations in {:?} with {:?} per iteration",
        outcome.iterations,
        run_for,
        per_iteration
    );
    assert_eq!(outcome.iterations, status_checks(&summary_path).passes);
}

#[test]
fn setup_fails_without_a_connection_string() {
    let dir = tempfile::tempdir().unwrap();
    let scenario = ScenarioDefinitionBuilder::<HttpRunnerContext, HttpAgentContext>::new(
        "api_requests",
        GustScenarioCli {
            connection_string: None,
            options: None,
            duration: None,
            no_progress: true,
            reporter: ReporterOpt::Noop,
            metrics_dir: dir.path().to_path_buf(),
            run_id: None,
            run_summary: None,
        },
    )
    .with_default_options(ScenarioOptions::ramping_vus(1).with_stage("1s", 1))
    .use_setup(setup)
    .use_agent_behaviour(agent_behaviour);

    assert!(run(scenario).is_err());
}
