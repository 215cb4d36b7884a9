//! Error types surfaced by the synchronization layer.
//!
//! Errors are cloneable because a failed fetch is stored on its cache entry
//! and delivered to every subscriber of that entry.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Error returned by queries and mutations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The request never produced an HTTP response.
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with a non-2xx status.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// A 2xx body could not be decoded into the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),
}

impl ApiError {
    /// Returns the HTTP status if the server answered.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http(err) => Some(err.status),
            _ => None,
        }
    }

    /// Returns the server-provided detail, if any.
    #[must_use]
    pub const fn detail(&self) -> Option<&ErrorDetail> {
        match self {
            Self::Http(err) => err.detail.as_ref(),
            _ => None,
        }
    }
}

/// A non-2xx response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("HTTP {status}{}", .detail.as_ref().map(|d| format!(": {d}")).unwrap_or_default())]
pub struct HttpError {
    pub status: u16,
    pub detail: Option<ErrorDetail>,
}

impl HttpError {
    /// Builds an error from a status and the raw response body.
    ///
    /// Bodies of the form `{"detail": "..."}` become [`ErrorDetail::Message`];
    /// field validation maps (`{"quantity": ["..."]}`) become
    /// [`ErrorDetail::Validation`]. Anything else is dropped.
    #[must_use]
    pub fn from_body(status: u16, body: &[u8]) -> Self {
        let detail = serde_json::from_slice::<Value>(body)
            .ok()
            .and_then(ErrorDetail::from_json);
        Self { status, detail }
    }
}

/// Structured detail carried by an [`HttpError`], passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorDetail {
    Message(String),
    Validation(BTreeMap<String, Vec<String>>),
}

impl ErrorDetail {
    fn from_json(value: Value) -> Option<Self> {
        let Value::Object(map) = value else {
            return None;
        };

        if let Some(Value::String(message)) = map.get("detail") {
            return Some(Self::Message(message.clone()));
        }

        let fields: BTreeMap<String, Vec<String>> = map
            .into_iter()
            .map(|(field, messages)| {
                let messages = match messages {
                    Value::Array(items) => items
                        .into_iter()
                        .map(|item| match item {
                            Value::String(s) => s,
                            other => other.to_string(),
                        })
                        .collect(),
                    Value::String(s) => vec![s],
                    other => vec![other.to_string()],
                };
                (field, messages)
            })
            .collect();

        if fields.is_empty() {
            None
        } else {
            Some(Self::Validation(fields))
        }
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(message) => f.write_str(message),
            Self::Validation(fields) => {
                let mut first = true;
                for (field, messages) in fields {
                    if !first {
                        f.write_str("; ")?;
                    }
                    first = false;
                    write!(f, "{field}: {}", messages.join(", "))?;
                }
                Ok(())
            }
        }
    }
}
