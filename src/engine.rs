//! Ledger facade exposing every entry point.
//!
//! [`FlightSurety`] owns one instance of each component plus the event log.
//! Every mutating method takes `&mut self`, so calls are totally ordered and
//! a component can never be re-entered while one of its mutations is in
//! progress.  [`SharedSurety`] adds a lock for callers that share the ledger
//! across threads: mutations take the write lock, queries the read lock.
//!
//! The caller identity is always an explicit argument; authenticating it is
//! the transport's job.

use crate::airline::{AdmissionOutcome, Airline, AirlineRegistry, FundOutcome, VoteOutcome};
use crate::config::EngineConfig;
use crate::error::{Result, SuretyError};
use crate::events::{EventLog, SuretyEvent};
use crate::gate::OperationalGate;
use crate::flight::{Flight, FlightKey, FlightRegistry, FlightStatusView, StatusCode};
use crate::identity::{Address, Balance, IdentityLedger, Role};
use crate::insurance::{InsuranceLedger, InsurancePolicy, PayoutRatio};
use crate::oracle::{
    FinalizationHook, Oracle, OracleCoordinator, OracleReport, RequestKey, ResponseOutcome,
    StatusRequest,
};
use crate::prng::{IndexGenerator, INDICES_PER_ORACLE};
use crate::time::encode_timestamp;
use std::sync::{Arc, RwLock};
use tracing::info;

/// Writes the final status and computes payouts in one step.
struct Settlement<'a> {
    flights: &'a mut FlightRegistry,
    insurance: &'a mut InsuranceLedger,
}

impl FinalizationHook for Settlement<'_> {
    fn finalize(&mut self, flight: FlightKey, status: StatusCode) -> Result<()> {
        self.flights.finalize_status(&flight, status)?;
        self.insurance.on_flight_finalized(flight, status);
        Ok(())
    }
}

/// Flight-delay insurance ledger.
#[derive(Debug, Clone)]
pub struct FlightSurety {
    config: EngineConfig,
    gate: OperationalGate,
    identity: IdentityLedger,
    airlines: AirlineRegistry,
    flights: FlightRegistry,
    oracles: OracleCoordinator,
    insurance: InsuranceLedger,
    events: EventLog,
}

impl FlightSurety {
    /// Builds a ledger from validated parameters.  `config.owner` becomes
    /// the owner and the genesis participant airline.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let mut identity = IdentityLedger::new();
        identity.grant_role(config.owner, Role::Owner);
        let airlines = AirlineRegistry::new(&config, &mut identity);
        let oracles = OracleCoordinator::new(
            IndexGenerator::new(config.index_seed, config.index_domain),
            config.quorum,
            config.registration_fee,
        );
        let insurance = InsuranceLedger::new(
            config.purchase_cap,
            PayoutRatio {
                numerator: config.payout_numerator,
                denominator: config.payout_denominator,
            },
        );
        info!(owner = %config.owner, quorum = config.quorum, seed = config.index_seed, "ledger initialized");
        Ok(Self {
            gate: OperationalGate::new(config.owner),
            config,
            identity,
            airlines,
            flights: FlightRegistry::new(),
            oracles,
            insurance,
            events: EventLog::new(),
        })
    }

    /// Parameters the ledger was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------
    // Administration
    // -----------------------------------------------------------------

    /// Flips the operating switch.  Owner or authorized operator only.
    pub fn set_operating_status(&mut self, caller: &Address, operational: bool) -> Result<()> {
        self.gate.set_operating_status(caller, operational)?;
        self.events
            .emit(SuretyEvent::OperatingStatusChanged { operational });
        Ok(())
    }

    /// Grants operator rights.  Owner only.
    pub fn authorize_caller(&mut self, caller: &Address, operator: Address) -> Result<()> {
        self.gate.authorize_caller(caller, operator)
    }

    /// Revokes operator rights.  Owner only.
    pub fn deauthorize_caller(&mut self, caller: &Address, operator: &Address) -> Result<()> {
        self.gate.deauthorize_caller(caller, operator)
    }

    // -----------------------------------------------------------------
    // Airlines
    // -----------------------------------------------------------------

    /// Admits or nominates `airline`.
    pub fn apply_airline(
        &mut self,
        caller: &Address,
        name: &str,
        airline: Address,
    ) -> Result<AdmissionOutcome> {
        self.gate.require_operational()?;
        self.airlines
            .apply(caller, name, airline, &mut self.identity, &mut self.events)
    }

    /// Votes for `airline`'s admission.
    pub fn vote_airline(
        &mut self,
        caller: &Address,
        name: &str,
        airline: Address,
    ) -> Result<VoteOutcome> {
        self.gate.require_operational()?;
        self.airlines
            .vote(caller, name, airline, &mut self.identity, &mut self.events)
    }

    /// Pays `caller`'s participation fee.
    pub fn fund(&mut self, caller: &Address, amount: Balance) -> Result<FundOutcome> {
        self.gate.require_operational()?;
        self.airlines
            .fund(caller, amount, &mut self.identity, &mut self.events)
    }

    // -----------------------------------------------------------------
    // Flights
    // -----------------------------------------------------------------

    /// Registers a flight operated by `caller`.
    pub fn register_flight(
        &mut self,
        caller: &Address,
        code: &str,
        timestamp: i64,
    ) -> Result<FlightKey> {
        self.gate.require_operational()?;
        self.flights
            .register(caller, code, timestamp, &self.airlines, &mut self.events)
    }

    /// Registers a flight departing at the given UTC calendar time.
    #[allow(clippy::too_many_arguments)]
    pub fn register_flight_at(
        &mut self,
        caller: &Address,
        code: &str,
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
    ) -> Result<FlightKey> {
        let timestamp = encode_timestamp(year, month, day, hour, minute)?;
        self.register_flight(caller, code, timestamp)
    }

    // -----------------------------------------------------------------
    // Oracles
    // -----------------------------------------------------------------

    /// Registers `caller` as an oracle.
    pub fn register_oracle(
        &mut self,
        caller: &Address,
        fee: Balance,
    ) -> Result<[u8; INDICES_PER_ORACLE]> {
        self.gate.require_operational()?;
        self.oracles
            .register_oracle(*caller, fee, &mut self.identity, &mut self.events)
    }

    /// Opens a status request for a flight.
    pub fn fetch_flight_status(
        &mut self,
        caller: &Address,
        airline: Address,
        code: &str,
        timestamp: i64,
    ) -> Result<RequestKey> {
        self.gate.require_operational()?;
        self.oracles.fetch_flight_status(
            caller,
            airline,
            code,
            timestamp,
            &self.flights,
            &mut self.events,
        )
    }

    /// Records an oracle response; on quorum the flight status is written
    /// and payouts are computed before this call returns.
    pub fn submit_response(
        &mut self,
        caller: &Address,
        report: &OracleReport,
    ) -> Result<ResponseOutcome> {
        self.gate.require_operational()?;
        let mut settlement = Settlement {
            flights: &mut self.flights,
            insurance: &mut self.insurance,
        };
        self.oracles
            .submit_response(caller, report, &mut settlement, &mut self.events)
    }

    // -----------------------------------------------------------------
    // Insurance
    // -----------------------------------------------------------------

    /// Buys cover on `flight`.  Returns the total paid into the policy.
    pub fn buy(&mut self, passenger: &Address, flight: FlightKey, amount: Balance) -> Result<Balance> {
        self.gate.require_operational()?;
        self.insurance.buy(
            *passenger,
            flight,
            amount,
            &self.flights,
            &mut self.identity,
            &mut self.events,
        )
    }

    /// Buys cover on the flight registered as `option_id`.
    pub fn buy_option(
        &mut self,
        passenger: &Address,
        option_id: u64,
        amount: Balance,
    ) -> Result<Balance> {
        let flight = self
            .flights
            .key_for_option(option_id)
            .ok_or(SuretyError::FlightNotFound)?;
        self.buy(passenger, flight, amount)
    }

    /// Moves `passenger`'s owed credit into their withdrawable balance.
    pub fn withdraw(&mut self, passenger: &Address) -> Result<Balance> {
        self.gate.require_operational()?;
        self.insurance
            .withdraw(*passenger, &mut self.identity, &mut self.events)
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    /// Whether mutating calls are admitted.
    pub fn is_operational(&self) -> bool {
        self.gate.is_operational()
    }

    /// Ledger owner.
    pub fn owner(&self) -> Address {
        self.gate.owner()
    }

    /// True once `airline` has been admitted.
    pub fn is_registered(&self, airline: &Address) -> bool {
        self.airlines.is_registered(airline)
    }

    /// True once `airline` has been admitted and funded.
    pub fn is_participant(&self, airline: &Address) -> bool {
        self.airlines.is_participant(airline)
    }

    /// Airline record.
    pub fn airline(&self, airline: &Address) -> Option<&Airline> {
        self.airlines.airline(airline)
    }

    /// Airlines at `Registered` or beyond.
    pub fn registered_airline_count(&self) -> usize {
        self.airlines.registered_count()
    }

    /// Votes a pending candidate still needs in total.
    pub fn votes_required(&self, airline: &Address) -> Option<usize> {
        self.airlines.votes_required(airline)
    }

    /// Indices held by `caller`.
    pub fn my_indices(&self, caller: &Address) -> Result<[u8; INDICES_PER_ORACLE]> {
        self.oracles.indices(caller)
    }

    /// Registered oracles in registration order.
    pub fn oracles(&self) -> Vec<&Oracle> {
        self.oracles.oracles()
    }

    /// Status request for `flight`.
    pub fn status_request(&self, flight: &FlightKey) -> Option<&StatusRequest> {
        self.oracles.request_for(flight)
    }

    /// Registration flag and status of `flight`.
    pub fn check_flight(&self, flight: &FlightKey) -> FlightStatusView {
        self.flights.check(flight)
    }

    /// Flight record.
    pub fn flight(&self, flight: &FlightKey) -> Option<&Flight> {
        self.flights.flight(flight)
    }

    /// Flights in registration order.
    pub fn flights(&self) -> impl Iterator<Item = &Flight> {
        self.flights.flights()
    }

    /// Key derivation as used for registration and requests.
    pub fn flight_key(airline: &Address, code: &str, timestamp: i64) -> FlightKey {
        FlightKey::derive(airline, code, timestamp)
    }

    /// Premium `passenger` paid on purchase option `option_id`.
    pub fn insurance_amount_paid(&self, option_id: u64, passenger: &Address) -> Result<Balance> {
        let flight = self
            .flights
            .key_for_option(option_id)
            .ok_or(SuretyError::FlightNotFound)?;
        Ok(self.insurance.amount_paid(&flight, passenger))
    }

    /// Policy held by `passenger` on `flight`.
    pub fn policy(&self, flight: &FlightKey, passenger: &Address) -> Option<&InsurancePolicy> {
        self.insurance.policy(flight, passenger)
    }

    /// Credit owed to `passenger` and not yet withdrawn.
    pub fn credit_owed(&self, passenger: &Address) -> Balance {
        self.insurance.credit_owed(passenger)
    }

    /// Withdrawable balance of `address`.
    pub fn withdrawable(&self, address: &Address) -> Balance {
        self.identity.withdrawable(address)
    }

    /// Value held by the shared pool.
    pub fn pool(&self) -> Balance {
        self.identity.pool()
    }

    /// Identity ledger.
    pub fn identity(&self) -> &IdentityLedger {
        &self.identity
    }

    /// Event log.
    pub fn events(&self) -> &EventLog {
        &self.events
    }
}

/// Thread-safe handle serializing mutations over one ledger.
#[derive(Debug, Clone)]
pub struct SharedSurety {
    inner: Arc<RwLock<FlightSurety>>,
}

impl SharedSurety {
    /// Wraps `ledger`.
    pub fn new(ledger: FlightSurety) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ledger)),
        }
    }

    /// Runs `op` under the write lock.
    pub fn mutate<T>(&self, op: impl FnOnce(&mut FlightSurety) -> Result<T>) -> Result<T> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| SuretyError::InvalidState("ledger lock poisoned".into()))?;
        op(&mut guard)
    }

    /// Runs `op` under the read lock.
    pub fn read<T>(&self, op: impl FnOnce(&FlightSurety) -> T) -> Result<T> {
        let guard = self
            .inner
            .read()
            .map_err(|_| SuretyError::InvalidState("ledger lock poisoned".into()))?;
        Ok(op(&guard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::UNIT;
    use std::thread;

    fn ledger() -> (FlightSurety, Address) {
        let owner = Address::from_label("owner");
        (
            FlightSurety::new(EngineConfig::with_owner(owner)).unwrap(),
            owner,
        )
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = EngineConfig::default();
        config.quorum = 0;
        assert!(matches!(
            FlightSurety::new(config),
            Err(SuretyError::Config(_))
        ));
    }

    #[test]
    fn paused_ledger_rejects_mutations_but_answers_queries() {
        let (mut ledger, owner) = ledger();
        let stranger = Address::from_label("stranger");
        assert!(matches!(
            ledger.set_operating_status(&stranger, false),
            Err(SuretyError::AccessDenied { .. })
        ));
        ledger.set_operating_status(&owner, false).unwrap();
        assert!(!ledger.is_operational());
        assert!(matches!(
            ledger.apply_airline(&owner, "Air 2", Address::from_label("air-2")),
            Err(SuretyError::NotOperational)
        ));
        assert!(matches!(
            ledger.register_flight(&owner, "NZ1", 0),
            Err(SuretyError::NotOperational)
        ));
        assert!(matches!(
            ledger.register_oracle(&stranger, UNIT),
            Err(SuretyError::NotOperational)
        ));
        assert!(matches!(
            ledger.withdraw(&stranger),
            Err(SuretyError::NotOperational)
        ));
        assert!(ledger.is_participant(&owner));
        ledger.set_operating_status(&owner, true).unwrap();
        ledger
            .apply_airline(&owner, "Air 2", Address::from_label("air-2"))
            .unwrap();
        assert!(matches!(
            ledger.events().records().last().map(|r| &r.event),
            Some(SuretyEvent::AirlineRegistered { .. })
        ));
    }

    #[test]
    fn authorized_operator_can_pause() {
        let (mut ledger, owner) = ledger();
        let operator = Address::from_label("operator");
        ledger.authorize_caller(&owner, operator).unwrap();
        ledger.set_operating_status(&operator, false).unwrap();
        ledger.deauthorize_caller(&owner, &operator).unwrap();
        assert!(ledger.set_operating_status(&operator, true).is_err());
    }

    #[test]
    fn calendar_registration_and_option_lookup() {
        let (mut ledger, owner) = ledger();
        let key = ledger
            .register_flight_at(&owner, "NZ123", 2030, 10, 10, 10, 0)
            .unwrap();
        assert_eq!(key, FlightSurety::flight_key(&owner, "NZ123", 1_917_856_800));
        assert!(matches!(
            ledger.register_flight_at(&owner, "NZ123", 2030, 13, 1, 0, 0),
            Err(SuretyError::InvalidTimestamp { .. })
        ));
        let passenger = Address::from_label("passenger");
        ledger.buy_option(&passenger, 1, UNIT).unwrap();
        assert_eq!(ledger.insurance_amount_paid(1, &passenger).unwrap(), UNIT);
        assert!(matches!(
            ledger.buy_option(&passenger, 2, UNIT),
            Err(SuretyError::FlightNotFound)
        ));
        assert!(matches!(
            ledger.insurance_amount_paid(2, &passenger),
            Err(SuretyError::FlightNotFound)
        ));
        assert_eq!(ledger.flights().count(), 1);
    }

    #[test]
    fn registered_key_matches_flight_key_for_padded_codes() {
        let (mut ledger, owner) = ledger();
        let key = ledger.register_flight(&owner, "NZ123 ", 100).unwrap();
        assert_eq!(key, FlightSurety::flight_key(&owner, "NZ123 ", 100));
        assert!(ledger.check_flight(&key).registered);
        let request = ledger
            .fetch_flight_status(&owner, owner, "NZ123 ", 100)
            .unwrap();
        assert_eq!(ledger.status_request(&key).unwrap().key, request);
    }

    #[test]
    fn oracle_registration_event_carries_assigned_indices() {
        let (mut ledger, _) = ledger();
        let oracle = Address::from_label("oracle");
        let indices = ledger.register_oracle(&oracle, UNIT).unwrap();
        assert_eq!(indices.len(), INDICES_PER_ORACLE);
        let last = ledger.events().records().last().unwrap();
        assert_eq!(
            last.event,
            SuretyEvent::OracleRegistered { oracle, indices }
        );
    }

    #[test]
    fn shared_handle_serializes_mutations() {
        let (ledger, owner) = ledger();
        let shared = SharedSurety::new(ledger);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let shared = shared.clone();
                thread::spawn(move || {
                    let oracle = Address::from_label(&format!("oracle-{i}"));
                    shared.mutate(|l| l.register_oracle(&oracle, UNIT))
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        let count = shared.read(|l| l.oracles().len()).unwrap();
        assert_eq!(count, 8);
        let pool = shared.read(|l| l.pool()).unwrap();
        assert_eq!(pool, 8 * UNIT);
        assert!(shared.read(|l| l.is_participant(&owner)).unwrap());
    }
}
