//! Airline admission state machine.
//!
//! ## Admission protocol
//!
//! * **Bootstrap.** While fewer than `bootstrap_airlines` airlines are
//!   registered, any participant may admit a new airline directly with
//!   [`AirlineRegistry::apply`].
//! * **Consensus.** After bootstrap, `apply` only records an `Applied`
//!   candidate.  Participants then call [`AirlineRegistry::vote`]; each
//!   participant counts once per candidate.  The candidate is admitted as
//!   soon as `votes * 2 >= electorate`, where the electorate is the
//!   registered count at vote time ([`QuorumDenominator::Floating`]) or the
//!   count captured when the candidate record was created
//!   ([`QuorumDenominator::Locked`]).
//! * **Funding.** A registered airline becomes a participant by paying at
//!   least the funding minimum.  Only participants vote, admit airlines or
//!   register flights.
//!
//! States only advance: `Applied -> Registered -> Participant`.

use crate::config::{EngineConfig, QuorumDenominator};
use crate::consensus::{majority_reached, required_approvals};
use crate::error::{Result, SuretyError};
use crate::events::{EventLog, SuretyEvent};
use crate::identity::{Address, Balance, IdentityLedger, Role};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// Admission stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AirlineState {
    /// Candidate awaiting votes.
    Applied,
    /// Admitted but not yet funded.
    Registered,
    /// Admitted and funded.
    Participant,
}

/// Airline record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Airline {
    /// Airline address.
    pub address: Address,
    /// Display name.
    pub name: String,
    /// Admission stage.
    pub state: AirlineState,
    /// Participants that voted for this airline.
    pub votes: BTreeSet<Address>,
    /// Registered count when the record was created.
    pub electorate_at_creation: usize,
    /// Amount paid when the airline became a participant.
    pub funded: Balance,
}

impl Airline {
    fn candidate(address: Address, name: &str, electorate: usize) -> Self {
        Self {
            address,
            name: name.to_string(),
            state: AirlineState::Applied,
            votes: BTreeSet::new(),
            electorate_at_creation: electorate,
            funded: 0,
        }
    }
}

/// Result of [`AirlineRegistry::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// Admitted directly during bootstrap.
    Registered,
    /// Recorded as a candidate that needs `required` votes.
    Applied {
        /// Votes currently held.
        votes: usize,
        /// Votes needed under the current electorate.
        required: usize,
    },
}

/// Result of [`AirlineRegistry::vote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Vote counted; the candidate is still pending.
    Counted {
        /// Votes currently held.
        votes: usize,
        /// Votes needed under the current electorate.
        required: usize,
    },
    /// The voter had already voted for this candidate; nothing changed.
    Duplicate {
        /// Votes currently held.
        votes: usize,
        /// Votes needed under the current electorate.
        required: usize,
    },
    /// This vote admitted the candidate.
    Registered {
        /// Votes held at admission.
        votes: usize,
    },
}

/// Result of [`AirlineRegistry::fund`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundOutcome {
    /// The airline became a participant.
    Participant,
    /// The airline was already a participant; no value was taken.
    AlreadyParticipant,
}

/// Registry of airline records.
#[derive(Debug, Clone)]
pub struct AirlineRegistry {
    airlines: HashMap<Address, Airline>,
    registered_count: usize,
    bootstrap: usize,
    funding_minimum: Balance,
    denominator: QuorumDenominator,
}

impl AirlineRegistry {
    /// Creates a registry whose genesis participant is `config.owner`.
    pub fn new(config: &EngineConfig, identity: &mut IdentityLedger) -> Self {
        let genesis = config.owner;
        let mut airline = Airline::candidate(genesis, &config.genesis_airline_name, 0);
        airline.state = AirlineState::Participant;
        let mut airlines = HashMap::new();
        airlines.insert(genesis, airline);
        identity.grant_role(genesis, Role::Airline);
        Self {
            airlines,
            registered_count: 1,
            bootstrap: config.bootstrap_airlines,
            funding_minimum: config.funding_minimum,
            denominator: config.quorum_denominator,
        }
    }

    /// Airline record for `address`.
    pub fn airline(&self, address: &Address) -> Option<&Airline> {
        self.airlines.get(address)
    }

    /// Number of airlines at `Registered` or beyond.
    pub fn registered_count(&self) -> usize {
        self.registered_count
    }

    /// True once `address` has been admitted.
    pub fn is_registered(&self, address: &Address) -> bool {
        self.airlines
            .get(address)
            .map_or(false, |a| a.state >= AirlineState::Registered)
    }

    /// True once `address` has been admitted and funded.
    pub fn is_participant(&self, address: &Address) -> bool {
        self.airlines
            .get(address)
            .map_or(false, |a| a.state == AirlineState::Participant)
    }

    /// Fails with [`SuretyError::AccessDenied`] unless `caller` is a participant.
    pub fn require_participant(&self, caller: &Address) -> Result<()> {
        if self.is_participant(caller) {
            Ok(())
        } else {
            Err(SuretyError::AccessDenied {
                caller: *caller,
                required: "participant airline",
            })
        }
    }

    /// Votes still required to admit a pending candidate, if any.
    pub fn votes_required(&self, candidate: &Address) -> Option<usize> {
        let airline = self.airlines.get(candidate)?;
        if airline.state != AirlineState::Applied {
            return None;
        }
        Some(required_approvals(self.electorate_for(airline)))
    }

    fn electorate_for(&self, airline: &Airline) -> usize {
        match self.denominator {
            QuorumDenominator::Floating => self.registered_count,
            QuorumDenominator::Locked => airline.electorate_at_creation,
        }
    }

    fn in_bootstrap(&self) -> bool {
        self.registered_count < self.bootstrap
    }

    fn reject_admitted(&self, address: &Address) -> Result<()> {
        match self.airlines.get(address) {
            Some(existing) if existing.state > AirlineState::Applied => {
                Err(SuretyError::AlreadyRegistered(*address))
            }
            _ => Ok(()),
        }
    }

    /// Registers `address` directly during bootstrap, or records it as a
    /// candidate afterwards.  Applying for an existing candidate is a no-op.
    pub fn apply(
        &mut self,
        caller: &Address,
        name: &str,
        address: Address,
        identity: &mut IdentityLedger,
        events: &mut EventLog,
    ) -> Result<AdmissionOutcome> {
        self.require_participant(caller)?;
        self.reject_admitted(&address)?;
        if name.trim().is_empty() {
            return Err(SuretyError::InvalidState("airline name is empty".into()));
        }

        if self.in_bootstrap() {
            let electorate = self.registered_count;
            let airline = self
                .airlines
                .entry(address)
                .or_insert_with(|| Airline::candidate(address, name, electorate));
            airline.state = AirlineState::Registered;
            let name = airline.name.clone();
            self.registered_count += 1;
            identity.grant_role(address, Role::Airline);
            info!(airline = %address, by = %caller, registered = self.registered_count, "airline admitted during bootstrap");
            events.emit(SuretyEvent::AirlineRegistered {
                airline: address,
                name,
                votes: 0,
            });
            return Ok(AdmissionOutcome::Registered);
        }

        if let Some(existing) = self.airlines.get(&address) {
            let required = required_approvals(self.electorate_for(existing));
            debug!(airline = %address, "application already pending");
            return Ok(AdmissionOutcome::Applied {
                votes: existing.votes.len(),
                required,
            });
        }

        let airline = Airline::candidate(address, name, self.registered_count);
        let required = required_approvals(self.electorate_for(&airline));
        self.airlines.insert(address, airline);
        identity.grant_role(address, Role::Airline);
        info!(airline = %address, by = %caller, required, "airline applied");
        events.emit(SuretyEvent::AirlineApplied {
            airline: address,
            name: name.to_string(),
            by: *caller,
        });
        Ok(AdmissionOutcome::Applied { votes: 0, required })
    }

    /// Casts `caller`'s vote for `address`, creating the candidate record if
    /// needed.  A repeated vote from the same participant is not counted again.
    pub fn vote(
        &mut self,
        caller: &Address,
        name: &str,
        address: Address,
        identity: &mut IdentityLedger,
        events: &mut EventLog,
    ) -> Result<VoteOutcome> {
        self.require_participant(caller)?;
        self.reject_admitted(&address)?;

        if !self.airlines.contains_key(&address) {
            if name.trim().is_empty() {
                return Err(SuretyError::InvalidState("airline name is empty".into()));
            }
            self.airlines.insert(
                address,
                Airline::candidate(address, name, self.registered_count),
            );
            identity.grant_role(address, Role::Airline);
            events.emit(SuretyEvent::AirlineApplied {
                airline: address,
                name: name.to_string(),
                by: *caller,
            });
        }

        let floating = self.registered_count;
        let denominator = self.denominator;
        let Some(airline) = self.airlines.get_mut(&address) else {
            return Err(SuretyError::InvalidState("candidate record missing".into()));
        };
        let electorate = match denominator {
            QuorumDenominator::Floating => floating,
            QuorumDenominator::Locked => airline.electorate_at_creation,
        };
        let required = required_approvals(electorate);

        if !airline.votes.insert(*caller) {
            debug!(airline = %address, voter = %caller, "duplicate vote ignored");
            return Ok(VoteOutcome::Duplicate {
                votes: airline.votes.len(),
                required,
            });
        }
        let votes = airline.votes.len();

        if !majority_reached(votes, electorate) {
            debug!(airline = %address, voter = %caller, votes, required, "vote counted");
            return Ok(VoteOutcome::Counted { votes, required });
        }

        airline.state = AirlineState::Registered;
        let name = airline.name.clone();
        self.registered_count += 1;
        info!(airline = %address, votes, electorate, registered = self.registered_count, "airline admitted by vote");
        events.emit(SuretyEvent::AirlineRegistered {
            airline: address,
            name,
            votes,
        });
        Ok(VoteOutcome::Registered { votes })
    }

    /// Pays the participation fee for `caller`.
    pub fn fund(
        &mut self,
        caller: &Address,
        amount: Balance,
        identity: &mut IdentityLedger,
        events: &mut EventLog,
    ) -> Result<FundOutcome> {
        let minimum = self.funding_minimum;
        let airline = match self.airlines.get_mut(caller) {
            Some(airline) if airline.state >= AirlineState::Registered => airline,
            _ => {
                return Err(SuretyError::AccessDenied {
                    caller: *caller,
                    required: "registered airline",
                })
            }
        };
        if airline.state == AirlineState::Participant {
            debug!(airline = %caller, "airline already funded");
            return Ok(FundOutcome::AlreadyParticipant);
        }
        if amount < minimum {
            return Err(SuretyError::InsufficientFunds {
                required: minimum,
                provided: amount,
            });
        }
        airline.state = AirlineState::Participant;
        airline.funded = amount;
        identity.deposit(*caller, amount);
        info!(airline = %caller, amount = %amount, "airline funded");
        events.emit(SuretyEvent::AirlineFunded {
            airline: *caller,
            amount,
        });
        Ok(FundOutcome::Participant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::UNIT;

    struct Fixture {
        registry: AirlineRegistry,
        identity: IdentityLedger,
        events: EventLog,
        owner: Address,
    }

    impl Fixture {
        fn new(denominator: QuorumDenominator) -> Self {
            let owner = Address::from_label("owner");
            let mut config = EngineConfig::with_owner(owner);
            config.quorum_denominator = denominator;
            let mut identity = IdentityLedger::new();
            let registry = AirlineRegistry::new(&config, &mut identity);
            Self {
                registry,
                identity,
                events: EventLog::new(),
                owner,
            }
        }

        fn apply(&mut self, caller: Address, label: &str) -> Result<AdmissionOutcome> {
            self.registry.apply(
                &caller,
                label,
                Address::from_label(label),
                &mut self.identity,
                &mut self.events,
            )
        }

        fn vote(&mut self, caller: Address, label: &str) -> Result<VoteOutcome> {
            self.registry.vote(
                &caller,
                label,
                Address::from_label(label),
                &mut self.identity,
                &mut self.events,
            )
        }

        fn fund(&mut self, label: &str) {
            let addr = Address::from_label(label);
            self.registry
                .fund(&addr, 10 * UNIT, &mut self.identity, &mut self.events)
                .unwrap();
        }

        /// Owner plus three bootstrap airlines, all funded.
        fn bootstrapped(denominator: QuorumDenominator) -> Self {
            let mut fx = Self::new(denominator);
            for label in ["air-2", "air-3", "air-4"] {
                assert_eq!(
                    fx.apply(fx.owner, label).unwrap(),
                    AdmissionOutcome::Registered
                );
                fx.fund(label);
            }
            fx
        }
    }

    fn addr(label: &str) -> Address {
        Address::from_label(label)
    }

    #[test]
    fn genesis_is_participant() {
        let fx = Fixture::new(QuorumDenominator::Floating);
        assert!(fx.registry.is_participant(&fx.owner));
        assert_eq!(fx.registry.registered_count(), 1);
    }

    #[test]
    fn bootstrap_admits_without_votes() {
        let fx = Fixture::bootstrapped(QuorumDenominator::Floating);
        assert_eq!(fx.registry.registered_count(), 4);
        assert!(fx.registry.is_registered(&addr("air-4")));
        assert!(fx.registry.airline(&addr("air-4")).unwrap().votes.is_empty());
    }

    #[test]
    fn non_participant_cannot_apply_or_vote() {
        let mut fx = Fixture::new(QuorumDenominator::Floating);
        fx.apply(fx.owner, "air-2").unwrap();
        // Registered but unfunded.
        assert!(matches!(
            fx.apply(addr("air-2"), "air-3"),
            Err(SuretyError::AccessDenied { .. })
        ));
        assert!(matches!(
            fx.vote(addr("stranger"), "air-3"),
            Err(SuretyError::AccessDenied { .. })
        ));
        assert!(fx.registry.airline(&addr("air-3")).is_none());
    }

    #[test]
    fn fifth_airline_needs_two_of_four() {
        let mut fx = Fixture::bootstrapped(QuorumDenominator::Floating);
        assert_eq!(
            fx.apply(fx.owner, "air-5").unwrap(),
            AdmissionOutcome::Applied { votes: 0, required: 2 }
        );
        assert!(!fx.registry.is_registered(&addr("air-5")));
        assert_eq!(
            fx.vote(addr("air-2"), "air-5").unwrap(),
            VoteOutcome::Counted { votes: 1, required: 2 }
        );
        assert!(!fx.registry.is_registered(&addr("air-5")));
        assert_eq!(
            fx.vote(addr("air-3"), "air-5").unwrap(),
            VoteOutcome::Registered { votes: 2 }
        );
        assert!(fx.registry.is_registered(&addr("air-5")));
        assert_eq!(fx.registry.registered_count(), 5);
    }

    #[test]
    fn duplicate_vote_is_not_double_counted() {
        let mut fx = Fixture::bootstrapped(QuorumDenominator::Floating);
        fx.apply(fx.owner, "air-5").unwrap();
        fx.vote(addr("air-2"), "air-5").unwrap();
        assert_eq!(
            fx.vote(addr("air-2"), "air-5").unwrap(),
            VoteOutcome::Duplicate { votes: 1, required: 2 }
        );
        assert!(!fx.registry.is_registered(&addr("air-5")));
    }

    #[test]
    fn sixth_airline_needs_three_of_five() {
        let mut fx = Fixture::bootstrapped(QuorumDenominator::Floating);
        fx.vote(addr("air-2"), "air-5").unwrap();
        fx.vote(addr("air-3"), "air-5").unwrap();
        fx.apply(fx.owner, "air-6").unwrap();
        fx.vote(addr("air-2"), "air-6").unwrap();
        assert_eq!(
            fx.vote(addr("air-3"), "air-6").unwrap(),
            VoteOutcome::Counted { votes: 2, required: 3 }
        );
        assert!(!fx.registry.is_registered(&addr("air-6")));
        assert_eq!(
            fx.vote(addr("air-4"), "air-6").unwrap(),
            VoteOutcome::Registered { votes: 3 }
        );
    }

    #[test]
    fn voting_on_admitted_airline_is_rejected() {
        let mut fx = Fixture::bootstrapped(QuorumDenominator::Floating);
        assert!(matches!(
            fx.vote(fx.owner, "air-2"),
            Err(SuretyError::AlreadyRegistered(_))
        ));
        assert!(matches!(
            fx.apply(fx.owner, "air-2"),
            Err(SuretyError::AlreadyRegistered(_))
        ));
    }

    #[test]
    fn reapplying_pending_candidate_is_noop() {
        let mut fx = Fixture::bootstrapped(QuorumDenominator::Floating);
        fx.apply(fx.owner, "air-5").unwrap();
        fx.vote(addr("air-2"), "air-5").unwrap();
        let before = fx.events.len();
        assert_eq!(
            fx.apply(addr("air-3"), "air-5").unwrap(),
            AdmissionOutcome::Applied { votes: 1, required: 2 }
        );
        assert_eq!(fx.events.len(), before);
    }

    /// Candidate created at registered=4, then two more airlines are
    /// admitted so the registered count is 6 when its votes arrive.
    fn grown_electorate(denominator: QuorumDenominator) -> Fixture {
        let mut fx = Fixture::bootstrapped(denominator);
        fx.apply(fx.owner, "late").unwrap();
        fx.vote(fx.owner, "air-5").unwrap();
        fx.vote(addr("air-2"), "air-5").unwrap();
        fx.fund("air-5");
        fx.vote(fx.owner, "air-6").unwrap();
        fx.vote(addr("air-2"), "air-6").unwrap();
        fx.vote(addr("air-3"), "air-6").unwrap();
        assert_eq!(fx.registry.registered_count(), 6);
        fx
    }

    #[test]
    fn floating_denominator_tracks_current_count() {
        let mut fx = grown_electorate(QuorumDenominator::Floating);
        assert_eq!(fx.registry.votes_required(&addr("late")), Some(3));
        fx.vote(fx.owner, "late").unwrap();
        assert_eq!(
            fx.vote(addr("air-2"), "late").unwrap(),
            VoteOutcome::Counted { votes: 2, required: 3 }
        );
        assert_eq!(
            fx.vote(addr("air-3"), "late").unwrap(),
            VoteOutcome::Registered { votes: 3 }
        );
    }

    #[test]
    fn locked_denominator_uses_creation_count() {
        let mut fx = grown_electorate(QuorumDenominator::Locked);
        assert_eq!(fx.registry.votes_required(&addr("late")), Some(2));
        fx.vote(fx.owner, "late").unwrap();
        assert_eq!(
            fx.vote(addr("air-2"), "late").unwrap(),
            VoteOutcome::Registered { votes: 2 }
        );
    }

    #[test]
    fn funding_is_one_way() {
        let mut fx = Fixture::new(QuorumDenominator::Floating);
        fx.apply(fx.owner, "air-2").unwrap();
        let air2 = addr("air-2");
        assert!(matches!(
            fx.registry
                .fund(&air2, 9 * UNIT, &mut fx.identity, &mut fx.events),
            Err(SuretyError::InsufficientFunds { .. })
        ));
        assert!(!fx.registry.is_participant(&air2));
        assert_eq!(
            fx.registry
                .fund(&air2, 10 * UNIT, &mut fx.identity, &mut fx.events)
                .unwrap(),
            FundOutcome::Participant
        );
        assert_eq!(
            fx.registry
                .fund(&air2, 10 * UNIT, &mut fx.identity, &mut fx.events)
                .unwrap(),
            FundOutcome::AlreadyParticipant
        );
        assert_eq!(fx.identity.pool(), 10 * UNIT);
    }

    #[test]
    fn unregistered_airline_cannot_fund() {
        let mut fx = Fixture::bootstrapped(QuorumDenominator::Floating);
        fx.apply(fx.owner, "air-5").unwrap();
        assert!(matches!(
            fx.registry
                .fund(&addr("air-5"), 10 * UNIT, &mut fx.identity, &mut fx.events),
            Err(SuretyError::AccessDenied { .. })
        ));
    }
}
