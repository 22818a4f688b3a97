//! One request/response cycle against the answering service.
//!
//! The HTTP layer ([`AnswerClient::ask`]) reports failures as
//! [`ExchangeError`]. [`exchange`] folds every result into an [`Outcome`],
//! which always carries the text the transcript should show.

use std::time::Duration;

use anyhow::Result;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:5000/answer";

/// Shown when a successful reply carries no usable `response`.
pub const NO_ANSWER_TEXT: &str = "Sorry, I couldn't find an answer.";
/// Shown when an error reply carries no usable `error`.
pub const GENERIC_ERROR_TEXT: &str = "Something went wrong while fetching the answer.";
/// Shown when no readable reply arrived at all.
pub const CONNECTION_ERROR_TEXT: &str = "Connection error. Please try again later.";

#[derive(Serialize)]
struct AnswerRequest<'a> {
    prompt: &'a str,
}

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("request to answering service failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("answering service sent a body that is not JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A reply that made it back over the wire with a JSON body.
#[derive(Debug)]
pub struct AnswerReply {
    pub status: StatusCode,
    pub body: Value,
}

#[derive(Clone)]
pub struct AnswerClient {
    client: Client,
    endpoint: String,
}

impl AnswerClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
        }
    }

    /// Build a client whose requests give up after `timeout`.
    pub fn with_timeout(endpoint: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn ask(&self, prompt: &str) -> Result<AnswerReply, ExchangeError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .json(&AnswerRequest { prompt })
            .send()
            .await?;

        let status = response.status();
        // The body is decoded before the status is looked at, so an error
        // page that isn't JSON counts as a transport failure.
        let bytes = response.bytes().await?;
        let body: Value = serde_json::from_slice(&bytes)?;

        Ok(AnswerReply { status, body })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(String),
    HttpError { status: u16, message: String },
    TransportError,
}

impl Outcome {
    pub fn from_reply(reply: &AnswerReply) -> Self {
        // A bare `null` body has no fields to read, whatever the status.
        if reply.body.is_null() {
            return Outcome::TransportError;
        }

        if reply.status.is_success() {
            Outcome::Success(extract_reply(&reply.body))
        } else {
            Outcome::HttpError {
                status: reply.status.as_u16(),
                message: extract_error(&reply.body),
            }
        }
    }

    /// Text of the assistant message this outcome turns into.
    pub fn text(&self) -> &str {
        match self {
            Outcome::Success(text) => text,
            Outcome::HttpError { message, .. } => message,
            Outcome::TransportError => CONNECTION_ERROR_TEXT,
        }
    }
}

/// The `response` field of a successful body, or [`NO_ANSWER_TEXT`].
pub fn extract_reply(body: &Value) -> String {
    extract_field(body, "response", NO_ANSWER_TEXT)
}

/// The `error` field of a failed body, or [`GENERIC_ERROR_TEXT`].
pub fn extract_error(body: &Value) -> String {
    extract_field(body, "error", GENERIC_ERROR_TEXT)
}

fn extract_field(body: &Value, field: &str, fallback: &str) -> String {
    match body.get(field) {
        Some(Value::String(text)) if !text.is_empty() => text.clone(),
        Some(Value::Number(n)) if n.as_f64() != Some(0.0) => n.to_string(),
        Some(value @ (Value::Bool(true) | Value::Array(_) | Value::Object(_))) => value.to_string(),
        // Absent, null, false, zero or empty string.
        _ => fallback.to_string(),
    }
}

/// Run one exchange to completion. Never fails; failures become outcomes.
pub async fn exchange(client: &AnswerClient, prompt: &str) -> Outcome {
    match client.ask(prompt).await {
        Ok(reply) => {
            tracing::debug!(status = %reply.status, body = %reply.body, "answering service replied");
            Outcome::from_reply(&reply)
        }
        Err(err) => {
            tracing::warn!(error = %err, endpoint = client.endpoint(), "exchange failed");
            Outcome::TransportError
        }
    }
}
