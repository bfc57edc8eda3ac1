mod client;
mod request;

pub mod prelude {
    pub use crate::client::{HttpClientInstrumented as HttpClient, HttpResponse};
    pub use crate::request::Request;

    // Re-exported so that scenarios don't need to depend on reqwest directly
    pub use reqwest::{Method, StatusCode, Url};
}
