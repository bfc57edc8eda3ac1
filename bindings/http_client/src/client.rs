use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use gust_instruments::{OperationRecord, Reporter};
use gust_instruments_derive::gust_instrument;
use reqwest::{StatusCode, Url};

use crate::request::Request;

/// The parts of a response that a scenario can check.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: StatusCode,
    body: Option<Bytes>,
}

impl HttpResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The response body, or `None` if the client discards response bodies.
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }
}

/// An HTTP client that reports every request as an operation.
///
/// A response with an error status is not an error here, it is up to the scenario to check the
/// status. Only transport failures, such as a refused connection, are reported as errors.
///
/// The client is cheap to clone and clones share one connection pool.
#[derive(Debug, Clone)]
pub struct HttpClientInstrumented {
    inner: reqwest::Client,
    base_url: Url,
    reporter: Arc<Reporter>,
    discard_response_bodies: bool,
}

impl HttpClientInstrumented {
    pub fn new(
        base_url: &str,
        reporter: Arc<Reporter>,
        discard_response_bodies: bool,
    ) -> anyhow::Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("Invalid base URL: {}", base_url))?;

        let inner = reqwest::Client::builder()
            .user_agent(concat!("gust/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        log::debug!("Created HTTP client for {}", base_url);

        Ok(Self {
            inner,
            base_url,
            reporter,
            discard_response_bodies,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[gust_instrument(prefix = "http_", post_hook = tag_status)]
    pub async fn get(&self, path: &str, bearer_token: Option<&str>) -> anyhow::Result<HttpResponse> {
        let mut request = Request::get(path);
        if let Some(token) = bearer_token {
            request = request.with_bearer_token(token);
        }

        self.execute(request).await
    }

    #[gust_instrument(prefix = "http_", post_hook = tag_status)]
    pub async fn send(&self, request: Request) -> anyhow::Result<HttpResponse> {
        self.execute(request).await
    }

    async fn execute(&self, request: Request) -> anyhow::Result<HttpResponse> {
        let url = self
            .base_url
            .join(&request.path)
            .with_context(|| format!("Invalid request path: {}", request.path))?;

        let mut builder = self.inner.request(request.method.clone(), url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(token) = &request.bearer_token {
            builder = builder.bearer_auth(token);
        }

        let mut response = builder
            .send()
            .await
            .with_context(|| format!("{} {} failed", request.method, url))?;
        let status = response.status();

        let body = if self.discard_response_bodies {
            // Drain the body so the connection can be reused.
            while response
                .chunk()
                .await
                .with_context(|| format!("Failed to read response body from {}", url))?
                .is_some()
            {}
            None
        } else {
            Some(
                response
                    .bytes()
                    .await
                    .with_context(|| format!("Failed to read response body from {}", url))?,
            )
        };

        Ok(HttpResponse { status, body })
    }
}

fn tag_status(operation_record: &mut OperationRecord, result: &anyhow::Result<HttpResponse>) {
    if let Ok(response) = result {
        operation_record.add_attr("status", response.status().as_u16());
    }
}
