//! Failures of the CouchDB user store.

use reqwest::StatusCode;
use thiserror::Error;

pub type CouchResult<T> = Result<T, CouchDaoError>;

#[derive(Debug, Error)]
pub enum CouchDaoError {
    #[error("missing CouchDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to build CouchDB client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// The request never got an HTTP answer.
    #[error("CouchDB request `{method} {path}` failed")]
    Transport {
        method: reqwest::Method,
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB answered with a status the store does not expect.
    #[error("CouchDB answered {status} to `{method} {path}`")]
    UnexpectedStatus {
        method: reqwest::Method,
        path: String,
        status: StatusCode,
    },
    #[error("failed to decode CouchDB response for `{path}`")]
    DecodeResponse {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to deserialize CouchDB row of `{path}`")]
    DeserializeValue {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    /// A document id does not carry the user prefix.
    #[error("invalid document ID `{doc_id}`")]
    InvalidDocId { doc_id: String },
}
