//! Oracle registration, request sharding and quorum resolution.
//!
//! ## Protocol
//!
//! 1. An oracle pays the registration fee and receives three distinct
//!    indices from the [`IndexGenerator`].
//! 2. [`OracleCoordinator::fetch_flight_status`] opens a [`StatusRequest`]
//!    for a registered flight.  The request is sharded to a single index
//!    derived from the flight key, and a `StatusRequested` event tells
//!    off-chain agents which oracles should investigate.
//! 3. Oracles holding that index call [`OracleCoordinator::submit_response`].
//!    Responses are grouped by status code; each oracle counts once per code.
//! 4. The first code whose responder set reaches the quorum closes the
//!    request and is handed to the [`FinalizationHook`].  Later responses are
//!    rejected with [`SuretyError::RequestClosed`].

use crate::consensus::quorum_reached;
use crate::error::{Result, SuretyError};
use crate::events::{EventLog, SuretyEvent};
use crate::flight::{FlightKey, FlightRegistry, StatusCode};
use crate::identity::{Address, Balance, IdentityLedger, Role};
use crate::prng::{IndexGenerator, INDICES_PER_ORACLE};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

/// Receives the single finalization of each flight.
pub trait FinalizationHook {
    /// Applies `status` as the final outcome of `flight`.  An error aborts
    /// the response that triggered it, leaving the request open.
    fn finalize(&mut self, flight: FlightKey, status: StatusCode) -> Result<()>;
}

/// Registered oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Oracle {
    /// Oracle address.
    pub address: Address,
    /// Assigned indices, fixed at registration.
    pub indices: [u8; INDICES_PER_ORACLE],
    /// Zero-based registration order.
    pub registration: u64,
}

impl Oracle {
    /// True if the oracle holds `index`.
    pub fn holds(&self, index: u8) -> bool {
        self.indices.contains(&index)
    }
}

/// Identity of a status request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    /// Shard index oracles must hold to respond.
    pub index: u8,
    /// Operating airline.
    pub airline: Address,
    /// Flight designator.
    pub code: String,
    /// Departure time.
    pub timestamp: i64,
}

/// Response aggregation state for one flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRequest {
    /// Request identity.
    pub key: RequestKey,
    /// Flight the request resolves.
    pub flight: FlightKey,
    /// Caller that opened the request.
    pub requester: Address,
    /// Distinct responders per reported status.
    pub responses: BTreeMap<StatusCode, BTreeSet<Address>>,
    /// False once a status reached quorum.
    pub open: bool,
    /// Status that closed the request.
    pub resolved: Option<StatusCode>,
}

impl StatusRequest {
    /// Distinct responders that reported `status`.
    pub fn response_count(&self, status: StatusCode) -> usize {
        self.responses.get(&status).map_or(0, BTreeSet::len)
    }
}

/// A single oracle report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleReport {
    /// Index the oracle responds on.
    pub index: u8,
    /// Operating airline.
    pub airline: Address,
    /// Flight designator.
    pub code: String,
    /// Departure time.
    pub timestamp: i64,
    /// Reported status.
    pub status: StatusCode,
}

/// Result of [`OracleCoordinator::submit_response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// Response counted; no quorum yet.
    Recorded {
        /// Reported status.
        status: StatusCode,
        /// Distinct responders for that status.
        responses: usize,
    },
    /// The oracle had already reported this status; nothing changed.
    Duplicate {
        /// Reported status.
        status: StatusCode,
        /// Distinct responders for that status.
        responses: usize,
    },
    /// This response reached quorum and finalized the flight.
    Finalized {
        /// Finalized flight.
        flight: FlightKey,
        /// Final status.
        status: StatusCode,
    },
}

/// Owner of oracle and request records.
#[derive(Debug, Clone)]
pub struct OracleCoordinator {
    oracles: HashMap<Address, Oracle>,
    requests: HashMap<RequestKey, StatusRequest>,
    by_flight: HashMap<FlightKey, RequestKey>,
    generator: IndexGenerator,
    quorum: usize,
    registration_fee: Balance,
}

impl OracleCoordinator {
    /// Creates a coordinator.
    pub fn new(generator: IndexGenerator, quorum: usize, registration_fee: Balance) -> Self {
        Self {
            oracles: HashMap::new(),
            requests: HashMap::new(),
            by_flight: HashMap::new(),
            generator,
            quorum,
            registration_fee,
        }
    }

    /// Matching responses needed to close a request.
    pub fn quorum(&self) -> usize {
        self.quorum
    }

    /// Registers `caller` as an oracle and returns its indices.
    pub fn register_oracle(
        &mut self,
        caller: Address,
        fee: Balance,
        identity: &mut IdentityLedger,
        events: &mut EventLog,
    ) -> Result<[u8; INDICES_PER_ORACLE]> {
        if self.oracles.contains_key(&caller) {
            return Err(SuretyError::AlreadyExists(format!("oracle {caller}")));
        }
        if fee < self.registration_fee {
            return Err(SuretyError::InsufficientFunds {
                required: self.registration_fee,
                provided: fee,
            });
        }
        let registration = self.oracles.len() as u64;
        let indices = self.generator.assign(&caller, registration);
        self.oracles.insert(
            caller,
            Oracle {
                address: caller,
                indices,
                registration,
            },
        );
        identity.deposit(caller, fee);
        identity.grant_role(caller, Role::Oracle);
        info!(oracle = %caller, ?indices, "oracle registered");
        events.emit(SuretyEvent::OracleRegistered {
            oracle: caller,
            indices,
        });
        Ok(indices)
    }

    /// Oracle record for `address`.
    pub fn oracle(&self, address: &Address) -> Option<&Oracle> {
        self.oracles.get(address)
    }

    /// Indices held by `caller`.
    pub fn indices(&self, caller: &Address) -> Result<[u8; INDICES_PER_ORACLE]> {
        self.oracles
            .get(caller)
            .map(|o| o.indices)
            .ok_or(SuretyError::AccessDenied {
                caller: *caller,
                required: "registered oracle",
            })
    }

    /// Registered oracles in registration order.
    pub fn oracles(&self) -> Vec<&Oracle> {
        let mut list: Vec<&Oracle> = self.oracles.values().collect();
        list.sort_by_key(|o| o.registration);
        list
    }

    /// Shard index for `flight`.
    pub fn request_index(&self, flight: &FlightKey) -> u8 {
        self.generator.request_index(flight)
    }

    /// Request opened for `flight`, if any.
    pub fn request_for(&self, flight: &FlightKey) -> Option<&StatusRequest> {
        self.by_flight
            .get(flight)
            .and_then(|key| self.requests.get(key))
    }

    /// Opens a status request for a registered, unfinalized flight.  An
    /// already-open request is returned unchanged.
    pub fn fetch_flight_status(
        &mut self,
        caller: &Address,
        airline: Address,
        code: &str,
        timestamp: i64,
        flights: &FlightRegistry,
        events: &mut EventLog,
    ) -> Result<RequestKey> {
        let flight_key = FlightKey::derive(&airline, code, timestamp);
        let flight = flights.flight(&flight_key).ok_or(SuretyError::FlightNotFound)?;
        if flight.is_finalized() {
            return Err(SuretyError::FlightAlreadyFinalized);
        }
        if let Some(existing) = self.request_for(&flight_key) {
            if existing.open {
                debug!(flight = %flight_key, index = existing.key.index, "status request already open");
                return Ok(existing.key.clone());
            }
            return Err(SuretyError::RequestClosed);
        }

        let index = self.request_index(&flight_key);
        let key = RequestKey {
            index,
            airline,
            code: code.to_string(),
            timestamp,
        };
        self.requests.insert(
            key.clone(),
            StatusRequest {
                key: key.clone(),
                flight: flight_key,
                requester: *caller,
                responses: BTreeMap::new(),
                open: true,
                resolved: None,
            },
        );
        self.by_flight.insert(flight_key, key.clone());
        info!(flight = %flight_key, index, by = %caller, "status request opened");
        events.emit(SuretyEvent::StatusRequested {
            index,
            airline,
            code: code.to_string(),
            timestamp,
        });
        Ok(key)
    }

    /// Records an oracle response, finalizing the flight through `hook` when
    /// the reported status reaches quorum.
    pub fn submit_response<H: FinalizationHook>(
        &mut self,
        caller: &Address,
        report: &OracleReport,
        hook: &mut H,
        events: &mut EventLog,
    ) -> Result<ResponseOutcome> {
        let oracle = self.oracles.get(caller).ok_or(SuretyError::AccessDenied {
            caller: *caller,
            required: "registered oracle",
        })?;
        if !oracle.holds(report.index) {
            return Err(SuretyError::IndexMismatch {
                index: report.index,
            });
        }
        if report.status == StatusCode::Unknown {
            return Err(SuretyError::InvalidState(
                "oracles must report a known status".into(),
            ));
        }

        let flight_key = FlightKey::derive(&report.airline, &report.code, report.timestamp);
        let request_key = self
            .by_flight
            .get(&flight_key)
            .ok_or(SuretyError::RequestNotFound)?;
        let request = self
            .requests
            .get_mut(request_key)
            .ok_or(SuretyError::RequestNotFound)?;
        if request.key.index != report.index {
            return Err(SuretyError::IndexMismatch {
                index: report.index,
            });
        }
        if !request.open {
            return Err(SuretyError::RequestClosed);
        }

        let already = request
            .responses
            .get(&report.status)
            .map_or(false, |set| set.contains(caller));
        let count = request.response_count(report.status);
        if already {
            debug!(oracle = %caller, flight = %flight_key, status = %report.status, "duplicate response ignored");
            return Ok(ResponseOutcome::Duplicate {
                status: report.status,
                responses: count,
            });
        }

        let reached = quorum_reached(count + 1, self.quorum);
        if reached {
            // The hook runs before anything is recorded so a failure leaves
            // the request untouched.
            hook.finalize(flight_key, report.status)?;
        }

        request
            .responses
            .entry(report.status)
            .or_default()
            .insert(*caller);
        events.emit(SuretyEvent::OracleReported {
            index: report.index,
            airline: report.airline,
            code: report.code.clone(),
            timestamp: report.timestamp,
            status: report.status,
        });

        if !reached {
            debug!(oracle = %caller, flight = %flight_key, status = %report.status, responses = count + 1, "response recorded");
            return Ok(ResponseOutcome::Recorded {
                status: report.status,
                responses: count + 1,
            });
        }

        request.open = false;
        request.resolved = Some(report.status);
        info!(flight = %flight_key, status = %report.status, responses = count + 1, "status request closed on quorum");
        events.emit(SuretyEvent::StatusFinalized {
            key: flight_key,
            status: report.status,
        });
        Ok(ResponseOutcome::Finalized {
            flight: flight_key,
            status: report.status,
        })
    }
}
