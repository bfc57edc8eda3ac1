use gust_runner::prelude::UserValuesConstraint;
use http_client_instrumented::prelude::HttpClient;

/// HTTP specific runner context values.
///
/// These are filled in by the global setup hook and shared, read-only, by every virtual user.
#[derive(Default, Debug)]
pub struct HttpRunnerContext {
    pub(crate) client: Option<HttpClient>,
    pub(crate) bearer_token: Option<String>,
}

impl UserValuesConstraint for HttpRunnerContext {}

impl HttpRunnerContext {
    /// The shared client. Requires [crate::prelude::configure_http_client] in the global setup.
    pub fn client(&self) -> anyhow::Result<&HttpClient> {
        self.client.as_ref().ok_or_else(|| {
            anyhow::anyhow!(
                "HTTP client is not set, did you forget to call `configure_http_client` in your setup?"
            )
        })
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }

    /// Use `token` for requests instead of reading it from the environment.
    pub fn set_bearer_token(&mut self, token: impl Into<String>) {
        self.bearer_token = Some(token.into());
    }
}
