use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HyphaError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {function} failed: {source}")]
    Request {
        function: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{function} returned HTTP {status}: {body}")]
    Status {
        function: String,
        status: StatusCode,
        body: String,
    },

    #[error("{function} raised an error: {detail}")]
    Remote { function: String, detail: String },

    #[error("failed to decode {function} response: {source}")]
    Decode {
        function: String,
        #[source]
        source: serde_json::Error,
    },
}
