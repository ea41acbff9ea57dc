//! Policy purchase, payout computation and pull-payment withdrawal.
//!
//! Finalization only computes what each passenger is owed.  Value moves
//! later, when the passenger calls [`InsuranceLedger::withdraw`]: the owed
//! credit is zeroed first and only then credited to the passenger's
//! withdrawable balance.

use crate::error::{Result, SuretyError};
use crate::events::{EventLog, SuretyEvent};
use crate::flight::{FlightKey, FlightRegistry, StatusCode};
use crate::identity::{Address, Balance, IdentityLedger, Role};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

/// One passenger's cover on one flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsurancePolicy {
    /// Insured passenger.
    pub passenger: Address,
    /// Insured flight.
    pub flight: FlightKey,
    /// Total premium paid, never above the purchase cap.
    pub amount_paid: Balance,
    /// Payout computed at finalization and not yet withdrawn.
    pub credit_owed: Balance,
}

/// Payout multiplier expressed as a ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayoutRatio {
    /// Numerator.
    pub numerator: Balance,
    /// Denominator, non-zero.
    pub denominator: Balance,
}

impl PayoutRatio {
    /// Payout owed on `paid`, rounded down.
    pub fn apply(&self, paid: Balance) -> Balance {
        paid.saturating_mul(self.numerator) / self.denominator
    }
}

/// Owner of policy records.
#[derive(Debug, Clone)]
pub struct InsuranceLedger {
    policies: BTreeMap<FlightKey, BTreeMap<Address, InsurancePolicy>>,
    settled: HashSet<FlightKey>,
    purchase_cap: Balance,
    payout: PayoutRatio,
}

impl InsuranceLedger {
    /// Creates an empty ledger.
    pub fn new(purchase_cap: Balance, payout: PayoutRatio) -> Self {
        Self {
            policies: BTreeMap::new(),
            settled: HashSet::new(),
            purchase_cap,
            payout,
        }
    }

    /// Maximum premium per passenger per flight.
    pub fn purchase_cap(&self) -> Balance {
        self.purchase_cap
    }

    /// Buys cover on `flight`.  A repeat purchase tops up the existing
    /// policy as long as the total stays within the cap.  Returns the total
    /// paid into the policy.
    pub fn buy(
        &mut self,
        passenger: Address,
        flight: FlightKey,
        amount: Balance,
        flights: &FlightRegistry,
        identity: &mut IdentityLedger,
        events: &mut EventLog,
    ) -> Result<Balance> {
        let record = flights.flight(&flight).ok_or(SuretyError::FlightNotFound)?;
        if record.is_finalized() || self.settled.contains(&flight) {
            return Err(SuretyError::FlightAlreadyFinalized);
        }
        if amount == 0 {
            return Err(SuretyError::InsufficientFunds {
                required: 1,
                provided: 0,
            });
        }
        let held = self.amount_paid(&flight, &passenger);
        let total = held.saturating_add(amount);
        if total > self.purchase_cap {
            return Err(SuretyError::CapExceeded {
                cap: self.purchase_cap,
                requested: total,
            });
        }

        let policy = self
            .policies
            .entry(flight)
            .or_default()
            .entry(passenger)
            .or_insert_with(|| InsurancePolicy {
                passenger,
                flight,
                amount_paid: 0,
                credit_owed: 0,
            });
        policy.amount_paid = total;
        identity.deposit(passenger, amount);
        identity.grant_role(passenger, Role::Passenger);
        info!(passenger = %passenger, flight = %flight, amount = %amount, total = %total, "policy bought");
        events.emit(SuretyEvent::PolicyBought {
            passenger,
            key: flight,
            amount,
            total,
        });
        Ok(total)
    }

    /// Computes credit for every policy on `flight`.  Runs at most once per
    /// flight; returns the number of policies credited.
    pub(crate) fn on_flight_finalized(&mut self, flight: FlightKey, status: StatusCode) -> usize {
        if !self.settled.insert(flight) {
            debug!(flight = %flight, "flight already settled");
            return 0;
        }
        if !status.is_airline_fault() {
            debug!(flight = %flight, status = %status, "no payout for status");
            return 0;
        }
        let payout = self.payout;
        let Some(policies) = self.policies.get_mut(&flight) else {
            return 0;
        };
        for policy in policies.values_mut() {
            policy.credit_owed = payout.apply(policy.amount_paid);
        }
        info!(flight = %flight, policies = policies.len(), "passengers credited");
        policies.len()
    }

    /// Moves everything owed to `passenger` into their withdrawable balance.
    /// Returns the amount moved; a second call returns zero.
    pub fn withdraw(
        &mut self,
        passenger: Address,
        identity: &mut IdentityLedger,
        events: &mut EventLog,
    ) -> Result<Balance> {
        let owed = self.credit_owed(&passenger);
        if owed == 0 {
            return Ok(0);
        }
        if identity.pool() < owed {
            return Err(SuretyError::InsufficientFunds {
                required: owed,
                provided: identity.pool(),
            });
        }
        for policies in self.policies.values_mut() {
            if let Some(policy) = policies.get_mut(&passenger) {
                policy.credit_owed = 0;
            }
        }
        identity.credit_withdrawable(passenger, owed)?;
        info!(passenger = %passenger, amount = %owed, "credit withdrawn");
        events.emit(SuretyEvent::CreditWithdrawn {
            passenger,
            amount: owed,
        });
        Ok(owed)
    }

    /// Policy held by `passenger` on `flight`.
    pub fn policy(&self, flight: &FlightKey, passenger: &Address) -> Option<&InsurancePolicy> {
        self.policies.get(flight)?.get(passenger)
    }

    /// Premium `passenger` has paid on `flight`.
    pub fn amount_paid(&self, flight: &FlightKey, passenger: &Address) -> Balance {
        self.policy(flight, passenger).map_or(0, |p| p.amount_paid)
    }

    /// Total credit owed to `passenger` across all flights.
    pub fn credit_owed(&self, passenger: &Address) -> Balance {
        self.policies
            .values()
            .filter_map(|policies| policies.get(passenger))
            .fold(0, |acc: Balance, p| acc.saturating_add(p.credit_owed))
    }

    /// Policies written on `flight`.
    pub fn policies_for(&self, flight: &FlightKey) -> impl Iterator<Item = &InsurancePolicy> {
        self.policies.get(flight).into_iter().flat_map(|m| m.values())
    }
}
