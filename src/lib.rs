#![deny(missing_docs)]

//! # flight_surety
//!
//! **Flight Surety** is a flight-delay insurance ledger.  Airlines join a
//! consortium by vote, pay a participation fee and register flights.
//! Passengers buy capped cover on those flights.  A pool of independent
//! oracles reports each flight's outcome; once enough of them agree, the
//! status is written once and for all and passengers on flights delayed by
//! the airline are credited a fixed multiple of what they paid.
//!
//! ## Features
//!
//! * **Consortium admission**: the [`airline`](airline/index.html) module
//!   admits the first airlines directly and every later one by a majority of
//!   participant votes.
//! * **Oracle sharding**: the [`prng`](prng/index.html) module assigns each
//!   oracle three indices drawn from BLAKE2b-256 digests, and the
//!   [`oracle`](oracle/index.html) module only accepts responses on the index
//!   a request was opened with.
//! * **Threshold aggregation**: the [`consensus`](consensus/index.html)
//!   helpers decide oracle quorum and admission majorities.
//! * **Insurance accounting**: the [`insurance`](insurance/index.html) module
//!   records premiums, computes payouts and moves credit into withdrawable
//!   balances held by the [`identity`](identity/index.html) ledger.
//! * **Event log**: every state change is recorded as a
//!   [`SuretyEvent`] that can be streamed to JSON lines.
//!
//! ## Usage
//!
//! ```rust
//! use flight_surety::{Address, EngineConfig, FlightSurety, UNIT};
//!
//! let owner = Address::from_label("owner");
//! let mut ledger = FlightSurety::new(EngineConfig::with_owner(owner)).unwrap();
//!
//! // The owner is the genesis airline and can register flights right away.
//! let flight = ledger.register_flight(&owner, "NZ123", 1_917_856_800).unwrap();
//!
//! let passenger = Address::from_label("passenger");
//! ledger.buy(&passenger, flight, UNIT / 2).unwrap();
//! assert!(ledger.check_flight(&flight).registered);
//! ```

pub mod airline;
pub mod config;
pub mod consensus;
pub mod engine;
pub mod error;
pub mod events;
pub mod flight;
pub mod gate;
pub mod identity;
pub mod insurance;
pub mod oracle;
pub mod prng;
mod time;

pub use airline::{AdmissionOutcome, Airline, AirlineRegistry, AirlineState, FundOutcome, VoteOutcome};
pub use config::{EngineConfig, NetworkConfig, NetworkEndpoint, QuorumDenominator};
pub use consensus::{majority_reached, quorum_reached, required_approvals};
pub use engine::{FlightSurety, SharedSurety};
pub use error::{Result, SuretyError};
pub use events::{EventLog, EventRecord, SuretyEvent};
pub use flight::{Flight, FlightKey, FlightRegistry, FlightStatusView, StatusCode};
pub use gate::OperationalGate;
pub use identity::{format_units, parse_units, Account, Address, Balance, IdentityLedger, Role, UNIT};
pub use insurance::{InsuranceLedger, InsurancePolicy, PayoutRatio};
pub use oracle::{
    FinalizationHook, Oracle, OracleCoordinator, OracleReport, RequestKey, ResponseOutcome,
    StatusRequest,
};
pub use prng::{IndexGenerator, INDICES_PER_ORACLE};
pub use time::encode_timestamp;
