use anyhow::Context;
use gust_core::prelude::ShutdownSignalError;
use gust_runner::prelude::{AgentContext, GustResult, HookResult, RunnerContext, UserValuesConstraint};
use http_client_instrumented::prelude::{HttpClient, HttpResponse, StatusCode};

use crate::context::HttpAgentContext;
use crate::runner_context::HttpRunnerContext;

/// The environment variable that the bearer token is read from.
pub const BEARER_TOKEN_ENV: &str = "API_BEARER_TOKEN";

/// Create the HTTP client that every virtual user shares, pointed at the connection string.
///
/// Call this from the global setup hook. The client discards response bodies if the scenario
/// options ask for it.
pub fn configure_http_client(ctx: &mut RunnerContext<HttpRunnerContext>) -> HookResult {
    let base_url = ctx
        .get_connection_string()
        .context("No connection string, pass --connection-string or set a default in the scenario")?
        .to_string();
    let discard_response_bodies = ctx.options().discard_response_bodies;

    log::info!(
        "Sending requests to {} (discard response bodies: {})",
        base_url,
        discard_response_bodies
    );

    let client = HttpClient::new(&base_url, ctx.reporter(), discard_response_bodies)?;
    ctx.get_mut().client = Some(client);

    Ok(())
}

/// Read the bearer token from the `API_BEARER_TOKEN` environment variable.
///
/// Call this from the global setup hook. A missing or empty token stops the scenario before any
/// virtual user starts.
pub fn configure_bearer_token(ctx: &mut RunnerContext<HttpRunnerContext>) -> HookResult {
    let token = bearer_token_from(std::env::var(BEARER_TOKEN_ENV).ok())?;
    ctx.get_mut().set_bearer_token(token);

    Ok(())
}

fn bearer_token_from(value: Option<String>) -> anyhow::Result<String> {
    match value {
        Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        Some(_) => anyhow::bail!("{} is set but empty", BEARER_TOKEN_ENV),
        None => anyhow::bail!(
            "{} is not set, export the bearer token to authenticate with",
            BEARER_TOKEN_ENV
        ),
    }
}

/// Send a GET request for `path`, authenticated with the configured bearer token.
///
/// The request completes even if the scenario is stopping. It is only abandoned on a hard
/// shutdown, in which case a [ShutdownSignalError] is returned.
pub fn get_with_bearer_token<SV>(
    ctx: &AgentContext<HttpRunnerContext, HttpAgentContext<SV>>,
    path: &str,
) -> GustResult<HttpResponse>
where
    SV: UserValuesConstraint,
{
    let runner_context = ctx.runner_context();
    let client = runner_context.get().client()?;
    let bearer_token = runner_context.get().bearer_token();

    runner_context
        .executor()
        .execute_in_place(async move { client.get(path, bearer_token).await })
}

/// Record a check named `name` that passes if the request succeeded with the `expected` status.
///
/// A transport error fails the check. The result of a request that was abandoned on shutdown is
/// not checked. Returns whether the check passed.
pub fn check_status<SV>(
    ctx: &AgentContext<HttpRunnerContext, HttpAgentContext<SV>>,
    name: &str,
    result: &GustResult<HttpResponse>,
    expected: StatusCode,
) -> bool
where
    SV: UserValuesConstraint,
{
    let passed = match result {
        Ok(response) => response.status() == expected,
        Err(e) if e.is::<ShutdownSignalError>() => return false,
        Err(e) => {
            log::debug!("Request failed for {}: {:?}", ctx.agent_id(), e);
            false
        }
    };

    ctx.check(name, passed)
}
