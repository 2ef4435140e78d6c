//! # Relay Client
//!
//! Switches the outputs of a network relay (Tasmota command API), used for the air assist.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::Duration;

use log::debug;
use serde_json::Value;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A device with switchable outputs.
pub trait RelayOutput {
    /// Switch the output on `channel` (1 based) on or off.
    fn set_output(&mut self, channel: u8, on: bool) -> Result<(), RelayClientError>;

    /// Read the state of the output on `channel`.
    fn output(&mut self, channel: u8) -> Result<bool, RelayClientError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct RelayClient {
    client: reqwest::blocking::Client,

    /// Full URL of the command endpoint, i.e. `http://<relay>/cm`.
    url: String,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum RelayClientError {
    #[error("Could not build the HTTP client: {0}")]
    ClientBuild(reqwest::Error),

    #[error("Request to the relay failed: {0}")]
    RequestError(reqwest::Error),

    #[error("The relay returned HTTP status {0}")]
    Status(reqwest::StatusCode),

    #[error("Could not deserialize the response from the relay: {0}")]
    DeserializeError(serde_json::Error),

    #[error("The relay's response did not contain the state of channel {0}")]
    MissingState(u8),

    #[error("Relay channel {channel} reports {actual} after being switched {expected}")]
    StateMismatch {
        channel: u8,
        expected: PowerState,
        actual: PowerState,
    },
}

/// Switch state of a relay output, as named in the relay's command API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    On,
    Off,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl From<bool> for PowerState {
    fn from(on: bool) -> Self {
        if on {
            PowerState::On
        } else {
            PowerState::Off
        }
    }
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerState::On => write!(f, "ON"),
            PowerState::Off => write!(f, "OFF"),
        }
    }
}

impl RelayClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, RelayClientError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(RelayClientError::ClientBuild)?;

        Ok(Self {
            client,
            url: format!("{}/cm", endpoint.trim_end_matches('/')),
        })
    }

    /// Send a command, returning the power state of `channel` reported back by the relay.
    fn command(&self, channel: u8, cmnd: &str) -> Result<bool, RelayClientError> {
        debug!("Relay command: {}", cmnd);

        let response = self
            .client
            .get(&self.url)
            .query(&[("cmnd", cmnd)])
            .send()
            .map_err(RelayClientError::RequestError)?;

        if !response.status().is_success() {
            return Err(RelayClientError::Status(response.status()));
        }

        let body = response.text().map_err(RelayClientError::RequestError)?;
        let value: Value =
            serde_json::from_str(&body).map_err(RelayClientError::DeserializeError)?;

        parse_power_state(&value, channel)
    }
}

impl RelayOutput for RelayClient {
    fn set_output(&mut self, channel: u8, on: bool) -> Result<(), RelayClientError> {
        let expected = PowerState::from(on);
        let reported = self.command(channel, &format!("Power{} {}", channel, expected))?;
        let actual = PowerState::from(reported);

        if actual != expected {
            return Err(RelayClientError::StateMismatch {
                channel,
                expected,
                actual,
            });
        }

        Ok(())
    }

    fn output(&mut self, channel: u8) -> Result<bool, RelayClientError> {
        self.command(channel, &format!("Power{}", channel))
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Extract the power state of `channel` from a relay response.
///
/// Single channel relays answer with `POWER`, multi channel relays with `POWER<n>`.
pub fn parse_power_state(value: &Value, channel: u8) -> Result<bool, RelayClientError> {
    let state = value
        .get(format!("POWER{}", channel))
        .or_else(|| value.get("POWER"))
        .and_then(Value::as_str)
        .ok_or(RelayClientError::MissingState(channel))?;

    Ok(state.eq_ignore_ascii_case("ON"))
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;
    use std::{
        io::{Read, Write},
        net::TcpListener,
        thread,
    };

    #[test]
    fn test_parse_power_state() {
        assert!(parse_power_state(&json!({"POWER1": "ON"}), 1).unwrap());
        assert!(!parse_power_state(&json!({"POWER": "OFF"}), 1).unwrap());
        assert!(matches!(
            parse_power_state(&json!({"POWER2": "ON"}), 1),
            Err(RelayClientError::MissingState(1))
        ));
    }

    /// Answer a single request with `body`, returning the request head.
    fn serve_once(body: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let n = stream.read(&mut buf).unwrap();
            write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            )
            .unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });

        (endpoint, server)
    }

    #[test]
    fn test_set_output() {
        let (endpoint, server) = serve_once(r#"{"POWER1":"ON"}"#);

        let mut relay = RelayClient::new(&endpoint, Duration::from_secs(2)).unwrap();
        relay.set_output(1, true).unwrap();

        let request = server.join().unwrap();
        assert!(request.starts_with("GET /cm?cmnd=Power1+ON"), "{}", request);
    }

    #[test]
    fn test_set_output_state_mismatch() {
        let (endpoint, server) = serve_once(r#"{"POWER1":"OFF"}"#);

        let mut relay = RelayClient::new(&endpoint, Duration::from_secs(2)).unwrap();

        match relay.set_output(1, true) {
            Err(RelayClientError::StateMismatch {
                channel,
                expected,
                actual,
            }) => {
                assert_eq!(channel, 1);
                assert_eq!(expected, PowerState::On);
                assert_eq!(actual, PowerState::Off);
            }
            other => panic!("Expected a state mismatch, got {:?}", other),
        }

        server.join().unwrap();
    }
}
