//! # Arm Client
//!
//! This module provides the transport used to talk to the arm's HTTP JSON command interface.
//!
//! Every request is a blocking HTTP GET of `{endpoint}/js?json={request}`. The arm answers
//! commands with an empty (or ignorable) body, and feedback requests with a JSON object.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::Duration;

use comms_if::eqpt::arm::{ArmFeedback, ArmRequest};
use log::trace;
use serde_json::Value;

use crate::reading::PositionReading;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Something which can deliver requests to the arm.
///
/// Implemented by the HTTP client and by the simulated arm used in tests.
pub trait ArmTransport {
    /// Send a single request, returning the decoded response body (`Value::Null` if the arm sent
    /// no body).
    ///
    /// There is no retry at this level.
    fn send(&mut self, request: &ArmRequest) -> Result<Value, TransportError>;

    /// Query the arm's current position, joint angles and torques.
    fn query_position(&mut self) -> Result<PositionReading, TransportError> {
        let value = self.send(&ArmRequest::Feedback)?;

        let fb: ArmFeedback = serde_json::from_value(value)
            .map_err(|e| TransportError::BadResponse(format!("Invalid feedback: {}", e)))?;

        Ok(PositionReading::from(&fb))
    }
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// HTTP client for the arm.
pub struct ArmClient {
    client: reqwest::blocking::Client,

    /// Full URL of the command endpoint, i.e. `http://<arm>/js`.
    url: String,

    timeout: Duration,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Failures to deliver a request to the arm or to understand its response.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("No response from the arm within {0:?}")]
    Timeout(Duration),

    #[error("The arm is unreachable: {0}")]
    Unreachable(String),

    #[error("Bad response from the arm: {0}")]
    BadResponse(String),
}

#[derive(thiserror::Error, Debug)]
pub enum ArmClientError {
    #[error("Could not build the HTTP client: {0}")]
    ClientBuild(reqwest::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ArmClient {
    /// Create a new client for the arm at `endpoint` (e.g. `http://192.168.4.1`).
    ///
    /// No request is made here, an unreachable arm only shows up on the first send.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ArmClientError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(ArmClientError::ClientBuild)?;

        Ok(Self {
            client,
            url: format!("{}/js", endpoint.trim_end_matches('/')),
            timeout,
        })
    }

    /// The URL requests are sent to.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn classify_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else if e.is_connect() {
            TransportError::Unreachable(e.to_string())
        } else if e.is_decode() || e.is_body() {
            TransportError::BadResponse(e.to_string())
        } else {
            TransportError::Unreachable(e.to_string())
        }
    }
}

impl ArmTransport for ArmClient {
    fn send(&mut self, request: &ArmRequest) -> Result<Value, TransportError> {
        let json_str = request.to_json().to_string();
        trace!("-> {}", json_str);

        let response = self
            .client
            .get(&self.url)
            .query(&[("json", json_str.as_str())])
            .send()
            .map_err(|e| self.classify_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::BadResponse(format!(
                "HTTP status {}",
                status
            )));
        }

        let body = response.text().map_err(|e| self.classify_error(e))?;
        trace!("<- {}", body);

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body)
            .map_err(|e| TransportError::BadResponse(format!("Invalid JSON ({}): {}", e, body)))
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
