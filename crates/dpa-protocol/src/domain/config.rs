//! Protocol timing configuration and validation
//!
//! # Example
//!
//! ```ignore
//! use dpa_protocol::domain::ProtocolConfig;
//!
//! let config = ProtocolConfig::default()
//!     .with_time_to_wait_for_confirmation_ms(300)
//!     .with_state_change_timeout_ms(2_000);
//! config.validate().expect("Valid config");
//! ```

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::ProtocolError;

/// Default time to wait for a confirmation [ms].
pub const DEFAULT_TIME_TO_WAIT_FOR_CONFIRMATION_MS: i64 = 500;

/// Default base time to wait for a response [ms].
pub const DEFAULT_BASE_TIME_TO_WAIT_FOR_RESPONSE_MS: i64 = 500;

/// Default guard timeout for a worker to acknowledge a command [ms].
pub const DEFAULT_STATE_CHANGE_TIMEOUT_MS: i64 = 1_000;

/// Default grace period for the worker to stop on destroy [ms].
pub const DEFAULT_JOIN_GRACE_PERIOD_MS: i64 = 2_000;

/// Default time a sender waits for the channel to become free [ms].
pub const DEFAULT_SEND_WAIT_TIMEOUT_MS: i64 = 10_000;

/// Protocol state machine configuration.
///
/// Millisecond fields are signed so that negative values coming from
/// configuration files or the environment can be rejected explicitly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Time to wait for a confirmation
    pub time_to_wait_for_confirmation_ms: i64,
    /// Base of the time to wait for a response, before routing is added
    pub base_time_to_wait_for_response_ms: i64,
    /// Guard timeout for blocking calls; not a protocol value
    pub state_change_timeout_ms: i64,
    /// How long `destroy` waits for the worker to stop
    pub join_grace_period_ms: i64,
    /// How long `DpaChannel::send_request` waits for a free channel
    pub send_wait_timeout_ms: i64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            time_to_wait_for_confirmation_ms: DEFAULT_TIME_TO_WAIT_FOR_CONFIRMATION_MS,
            base_time_to_wait_for_response_ms: DEFAULT_BASE_TIME_TO_WAIT_FOR_RESPONSE_MS,
            state_change_timeout_ms: DEFAULT_STATE_CHANGE_TIMEOUT_MS,
            join_grace_period_ms: DEFAULT_JOIN_GRACE_PERIOD_MS,
            send_wait_timeout_ms: DEFAULT_SEND_WAIT_TIMEOUT_MS,
        }
    }
}

impl ProtocolConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `DPA_CONFIRMATION_TIMEOUT_MS` (default: 500)
    /// - `DPA_RESPONSE_BASE_TIMEOUT_MS` (default: 500)
    /// - `DPA_STATE_CHANGE_TIMEOUT_MS` (default: 1000)
    /// - `DPA_JOIN_GRACE_PERIOD_MS` (default: 2000)
    /// - `DPA_SEND_WAIT_TIMEOUT_MS` (default: 10000)
    ///
    /// Missing or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        fn read(name: &str, default: i64) -> i64 {
            env::var(name)
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        }

        Self {
            time_to_wait_for_confirmation_ms: read(
                "DPA_CONFIRMATION_TIMEOUT_MS",
                DEFAULT_TIME_TO_WAIT_FOR_CONFIRMATION_MS,
            ),
            base_time_to_wait_for_response_ms: read(
                "DPA_RESPONSE_BASE_TIMEOUT_MS",
                DEFAULT_BASE_TIME_TO_WAIT_FOR_RESPONSE_MS,
            ),
            state_change_timeout_ms: read(
                "DPA_STATE_CHANGE_TIMEOUT_MS",
                DEFAULT_STATE_CHANGE_TIMEOUT_MS,
            ),
            join_grace_period_ms: read("DPA_JOIN_GRACE_PERIOD_MS", DEFAULT_JOIN_GRACE_PERIOD_MS),
            send_wait_timeout_ms: read("DPA_SEND_WAIT_TIMEOUT_MS", DEFAULT_SEND_WAIT_TIMEOUT_MS),
        }
    }

    /// Validate all fields are non-negative.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        check_non_negative(
            "time_to_wait_for_confirmation",
            self.time_to_wait_for_confirmation_ms,
        )?;
        check_non_negative(
            "base_time_to_wait_for_response",
            self.base_time_to_wait_for_response_ms,
        )?;
        check_non_negative("state_change_timeout", self.state_change_timeout_ms)?;
        check_non_negative("join_grace_period", self.join_grace_period_ms)?;
        check_non_negative("send_wait_timeout", self.send_wait_timeout_ms)?;
        Ok(())
    }

    /// Builder-style method to set the confirmation timeout
    pub fn with_time_to_wait_for_confirmation_ms(mut self, ms: i64) -> Self {
        self.time_to_wait_for_confirmation_ms = ms;
        self
    }

    /// Builder-style method to set the base response timeout
    pub fn with_base_time_to_wait_for_response_ms(mut self, ms: i64) -> Self {
        self.base_time_to_wait_for_response_ms = ms;
        self
    }

    /// Builder-style method to set the state change guard timeout
    pub fn with_state_change_timeout_ms(mut self, ms: i64) -> Self {
        self.state_change_timeout_ms = ms;
        self
    }

    /// Builder-style method to set the join grace period
    pub fn with_join_grace_period_ms(mut self, ms: i64) -> Self {
        self.join_grace_period_ms = ms;
        self
    }

    /// Builder-style method to set the send wait timeout
    pub fn with_send_wait_timeout_ms(mut self, ms: i64) -> Self {
        self.send_wait_timeout_ms = ms;
        self
    }

    /// Upper bound on a single call into the machine.
    pub fn state_change_timeout(&self) -> Duration {
        millis(self.state_change_timeout_ms)
    }

    /// How long `destroy` waits for the worker to stop.
    pub fn join_grace_period(&self) -> Duration {
        millis(self.join_grace_period_ms)
    }

    /// How long a sender waits for the channel to become free.
    pub fn send_wait_timeout(&self) -> Duration {
        millis(self.send_wait_timeout_ms)
    }
}

/// Timing parameters consulted by the worker when computing budgets.
///
/// Shared between the machine handle (setters) and the worker (reader).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimingParameters {
    /// Budget for the confirmation of a routed request.
    pub time_to_wait_for_confirmation: Duration,
    /// Response budget before the routing time is added.
    pub base_time_to_wait_for_response: Duration,
}

impl TimingParameters {
    /// Take the protocol timing values out of a validated configuration.
    pub fn from_config(config: &ProtocolConfig) -> Result<Self, ProtocolError> {
        Ok(Self {
            time_to_wait_for_confirmation: checked_millis(
                "time_to_wait_for_confirmation",
                config.time_to_wait_for_confirmation_ms,
            )?,
            base_time_to_wait_for_response: checked_millis(
                "base_time_to_wait_for_response",
                config.base_time_to_wait_for_response_ms,
            )?,
        })
    }
}

impl Default for TimingParameters {
    fn default() -> Self {
        Self {
            time_to_wait_for_confirmation: millis(DEFAULT_TIME_TO_WAIT_FOR_CONFIRMATION_MS),
            base_time_to_wait_for_response: millis(DEFAULT_BASE_TIME_TO_WAIT_FOR_RESPONSE_MS),
        }
    }
}

/// Convert signed milliseconds, rejecting negative values.
pub fn checked_millis(name: &str, ms: i64) -> Result<Duration, ProtocolError> {
    check_non_negative(name, ms)?;
    Ok(millis(ms))
}

fn check_non_negative(name: &str, ms: i64) -> Result<(), ProtocolError> {
    if ms < 0 {
        return Err(ProtocolError::InvalidArgument(format!(
            "{} cannot be negative: {} ms",
            name, ms
        )));
    }
    Ok(())
}

// Negative values clamp to zero; callers validate first.
fn millis(ms: i64) -> Duration {
    Duration::from_millis(ms.max(0) as u64)
}
