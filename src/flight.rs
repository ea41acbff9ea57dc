//! Flight registry keyed by `(airline, designator, departure)`.

use crate::airline::AirlineRegistry;
use crate::error::{Result, SuretyError};
use crate::events::{EventLog, SuretyEvent};
use crate::identity::Address;
use blake2::digest::{consts::U32, Digest};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::info;

type Blake2b256 = blake2::Blake2b<U32>;

const FLIGHT_KEY_DOMAIN: &[u8] = b"SURETY_FLIGHT_KEY";

/// Reported flight outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum StatusCode {
    /// No outcome known yet.
    Unknown = 0,
    /// Departed on time.
    OnTime = 10,
    /// Delay attributable to the airline; the only code that pays out.
    LateAirline = 20,
    /// Weather delay.
    LateWeather = 30,
    /// Technical delay.
    LateTechnical = 40,
    /// Any other delay.
    LateOther = 50,
}

impl StatusCode {
    /// Every status code in ascending order.
    pub const ALL: [StatusCode; 6] = [
        StatusCode::Unknown,
        StatusCode::OnTime,
        StatusCode::LateAirline,
        StatusCode::LateWeather,
        StatusCode::LateTechnical,
        StatusCode::LateOther,
    ];

    /// Numeric wire code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Decodes a numeric wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    /// True when passengers are owed compensation for this outcome.
    pub fn is_airline_fault(self) -> bool {
        self == StatusCode::LateAirline
    }
}

impl From<StatusCode> for u8 {
    fn from(status: StatusCode) -> Self {
        status.code()
    }
}

impl TryFrom<u8> for StatusCode {
    type Error = SuretyError;

    fn try_from(code: u8) -> Result<Self> {
        Self::from_code(code)
            .ok_or_else(|| SuretyError::InvalidState(format!("unknown status code {code}")))
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// BLAKE2b-256 digest identifying a flight.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct FlightKey([u8; 32]);

impl FlightKey {
    /// Derives the key for `airline`'s flight `code` departing at `timestamp`.
    pub fn derive(airline: &Address, code: &str, timestamp: i64) -> Self {
        let mut hasher = Blake2b256::new();
        hasher.update(FLIGHT_KEY_DOMAIN);
        hasher.update(airline.as_bytes());
        hasher.update((code.len() as u64).to_be_bytes());
        hasher.update(code.as_bytes());
        hasher.update(timestamp.to_be_bytes());
        Self(hasher.finalize().into())
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for FlightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for FlightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FlightKey({self})")
    }
}

impl FromStr for FlightKey {
    type Err = SuretyError;

    fn from_str(input: &str) -> Result<Self> {
        let body = input.trim().trim_start_matches("0x");
        let decoded =
            hex::decode(body).map_err(|err| SuretyError::InvalidState(err.to_string()))?;
        let bytes: [u8; 32] = decoded
            .as_slice()
            .try_into()
            .map_err(|_| SuretyError::InvalidState("flight key must be 32 bytes".into()))?;
        Ok(Self(bytes))
    }
}

impl From<FlightKey> for String {
    fn from(key: FlightKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for FlightKey {
    type Error = SuretyError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Registered flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flight {
    /// Derived key.
    pub key: FlightKey,
    /// Sequential purchase option id, starting at 1.
    pub option_id: u64,
    /// Operating airline.
    pub airline: Address,
    /// Flight designator.
    pub code: String,
    /// Departure time (Unix seconds, UTC).
    pub timestamp: i64,
    /// Final status, `Unknown` until oracles reach quorum.
    pub status: StatusCode,
}

impl Flight {
    /// True once the status has been written.
    pub fn is_finalized(&self) -> bool {
        self.status != StatusCode::Unknown
    }
}

/// Query view returned by `check_flight`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightStatusView {
    /// Whether a flight exists under the key.
    pub registered: bool,
    /// Current status (`Unknown` if unregistered).
    pub status: StatusCode,
}

/// Flight records, owned here; the status is written only through
/// [`FlightRegistry::finalize_status`].
#[derive(Debug, Clone, Default)]
pub struct FlightRegistry {
    flights: HashMap<FlightKey, Flight>,
    options: Vec<FlightKey>,
}

impl FlightRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a flight operated by `caller`.
    pub fn register(
        &mut self,
        caller: &Address,
        code: &str,
        timestamp: i64,
        airlines: &AirlineRegistry,
        events: &mut EventLog,
    ) -> Result<FlightKey> {
        airlines.require_participant(caller)?;
        if code.trim().is_empty() {
            return Err(SuretyError::InvalidState("flight code is empty".into()));
        }
        let key = FlightKey::derive(caller, code, timestamp);
        if self.flights.contains_key(&key) {
            return Err(SuretyError::AlreadyExists(format!("flight {code} at {timestamp}")));
        }
        let option_id = self.options.len() as u64 + 1;
        self.flights.insert(
            key,
            Flight {
                key,
                option_id,
                airline: *caller,
                code: code.to_string(),
                timestamp,
                status: StatusCode::Unknown,
            },
        );
        self.options.push(key);
        info!(airline = %caller, code, timestamp, option_id, "flight registered");
        events.emit(SuretyEvent::FlightRegistered {
            key,
            option_id,
            airline: *caller,
            code: code.to_string(),
            timestamp,
        });
        Ok(key)
    }

    /// Flight stored under `key`.
    pub fn flight(&self, key: &FlightKey) -> Option<&Flight> {
        self.flights.get(key)
    }

    /// Returns true if a flight exists under `key`.
    pub fn is_registered(&self, key: &FlightKey) -> bool {
        self.flights.contains_key(key)
    }

    /// Registration flag and status for `key`.
    pub fn check(&self, key: &FlightKey) -> FlightStatusView {
        match self.flights.get(key) {
            Some(flight) => FlightStatusView {
                registered: true,
                status: flight.status,
            },
            None => FlightStatusView {
                registered: false,
                status: StatusCode::Unknown,
            },
        }
    }

    /// Key of purchase option `option_id`.
    pub fn key_for_option(&self, option_id: u64) -> Option<FlightKey> {
        let idx = usize::try_from(option_id.checked_sub(1)?).ok()?;
        self.options.get(idx).copied()
    }

    /// Flights in registration order.
    pub fn flights(&self) -> impl Iterator<Item = &Flight> {
        self.options.iter().filter_map(|key| self.flights.get(key))
    }

    /// Number of registered flights.
    pub fn len(&self) -> usize {
        self.options.len()
    }

    /// Returns true if no flight has been registered.
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Writes the final status.  Succeeds once per flight.
    pub(crate) fn finalize_status(&mut self, key: &FlightKey, status: StatusCode) -> Result<()> {
        if status == StatusCode::Unknown {
            return Err(SuretyError::InvalidState(
                "cannot finalize with unknown status".into(),
            ));
        }
        let flight = self.flights.get_mut(key).ok_or(SuretyError::FlightNotFound)?;
        if flight.is_finalized() {
            return Err(SuretyError::FlightAlreadyFinalized);
        }
        flight.status = status;
        info!(flight = %key, code = %flight.code, status = %status, "flight status finalized");
        Ok(())
    }
}
