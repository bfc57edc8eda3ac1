use http_gust_runner::prelude::*;
use std::time::Duration;

const API_INFO_PATH: &str = "/api/info";

fn default_options() -> ScenarioOptions {
    ScenarioOptions::ramping_vus(200)
        .with_stage("30s", 1000)
        .with_stage("1m", 1000)
        .with_discard_response_bodies(true)
}

fn setup(ctx: &mut RunnerContext<HttpRunnerContext>) -> HookResult {
    configure_bearer_token(ctx)?;
    configure_http_client(ctx)?;
    Ok(())
}

fn agent_behaviour(ctx: &mut AgentContext<HttpRunnerContext, HttpAgentContext>) -> HookResult {
    let response = get_with_bearer_token(ctx, API_INFO_PATH);
    check_status(ctx, "status was 200", &response, StatusCode::OK);

    ctx.sleep(Duration::from_secs(1));

    Ok(())
}

fn main() -> GustResult<()> {
    let builder = ScenarioDefinitionBuilder::<HttpRunnerContext, HttpAgentContext>::new_with_init(
        env!("CARGO_PKG_NAME"),
    )
    .with_default_connection_string("http://localhost:8080")
    .with_default_options(default_options())
    .use_setup(setup)
    .use_agent_behaviour(agent_behaviour);

    run(builder)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_ramp() {
        let ramp = default_options().ramp_schedule().unwrap();

        assert_eq!(200, ramp.vus_at(Duration::ZERO));
        assert_eq!(1000, ramp.vus_at(Duration::from_secs(30)));
        assert_eq!(1000, ramp.vus_at(Duration::from_secs(90)));
        assert_eq!(Duration::from_secs(90), ramp.total_duration());
    }

    #[test]
    fn options_file_matches_the_defaults() {
        let options = ScenarioOptions::from_toml_str(include_str!("../options.toml")).unwrap();

        assert_eq!(default_options(), options);
    }
}
