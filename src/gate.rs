//! Global operating switch guarding every mutating entry point.

use crate::error::{Result, SuretyError};
use crate::identity::Address;
use std::collections::HashSet;
use tracing::info;

/// Owner-administered pause switch.
#[derive(Debug, Clone)]
pub struct OperationalGate {
    owner: Address,
    operational: bool,
    authorized: HashSet<Address>,
}

impl OperationalGate {
    /// Creates an operational gate owned by `owner`.
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            operational: true,
            authorized: HashSet::new(),
        }
    }

    /// Ledger owner.
    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Whether mutating calls are currently admitted.
    pub fn is_operational(&self) -> bool {
        self.operational
    }

    /// Fails with [`SuretyError::NotOperational`] while the switch is off.
    pub fn require_operational(&self) -> Result<()> {
        if self.operational {
            Ok(())
        } else {
            Err(SuretyError::NotOperational)
        }
    }

    /// Fails unless `caller` is the owner.
    pub fn require_owner(&self, caller: &Address) -> Result<()> {
        if *caller == self.owner {
            Ok(())
        } else {
            Err(SuretyError::AccessDenied {
                caller: *caller,
                required: "ledger owner",
            })
        }
    }

    /// Returns true if `caller` is an authorized operator.
    pub fn is_authorized(&self, caller: &Address) -> bool {
        self.authorized.contains(caller)
    }

    /// Grants operator rights to `target`.  Owner only.
    pub fn authorize_caller(&mut self, caller: &Address, target: Address) -> Result<()> {
        self.require_owner(caller)?;
        if !self.authorized.insert(target) {
            return Err(SuretyError::AlreadyExists(format!(
                "operator {target} already authorized"
            )));
        }
        info!(operator = %target, "operator authorized");
        Ok(())
    }

    /// Revokes operator rights from `target`.  Owner only.
    pub fn deauthorize_caller(&mut self, caller: &Address, target: &Address) -> Result<()> {
        self.require_owner(caller)?;
        if !self.authorized.remove(target) {
            return Err(SuretyError::InvalidState(format!(
                "operator {target} is not authorized"
            )));
        }
        info!(operator = %target, "operator deauthorized");
        Ok(())
    }

    /// Flips the operating switch.  The owner and authorized operators may
    /// call this; the new mode must differ from the current one.
    pub fn set_operating_status(&mut self, caller: &Address, mode: bool) -> Result<()> {
        if *caller != self.owner && !self.is_authorized(caller) {
            return Err(SuretyError::AccessDenied {
                caller: *caller,
                required: "ledger owner or authorized operator",
            });
        }
        if mode == self.operational {
            return Err(SuretyError::InvalidState(format!(
                "operating status already {mode}"
            )));
        }
        self.operational = mode;
        info!(operational = mode, by = %caller, "operating status changed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_operational() {
        let gate = OperationalGate::new(Address::from_label("owner"));
        assert!(gate.is_operational());
        assert!(gate.require_operational().is_ok());
    }

    #[test]
    fn only_owner_or_operator_toggles() {
        let owner = Address::from_label("owner");
        let stranger = Address::from_label("stranger");
        let mut gate = OperationalGate::new(owner);
        assert!(matches!(
            gate.set_operating_status(&stranger, false),
            Err(SuretyError::AccessDenied { .. })
        ));
        assert!(gate.is_operational());

        gate.authorize_caller(&owner, stranger).unwrap();
        gate.set_operating_status(&stranger, false).unwrap();
        assert!(matches!(
            gate.require_operational(),
            Err(SuretyError::NotOperational)
        ));
        gate.set_operating_status(&owner, true).unwrap();
        assert!(gate.is_operational());
    }

    #[test]
    fn repeated_mode_is_rejected() {
        let owner = Address::from_label("owner");
        let mut gate = OperationalGate::new(owner);
        assert!(matches!(
            gate.set_operating_status(&owner, true),
            Err(SuretyError::InvalidState(_))
        ));
    }

    #[test]
    fn authorization_is_owner_only() {
        let owner = Address::from_label("owner");
        let operator = Address::from_label("operator");
        let mut gate = OperationalGate::new(owner);
        assert!(gate.authorize_caller(&operator, operator).is_err());
        gate.authorize_caller(&owner, operator).unwrap();
        assert!(gate.authorize_caller(&owner, operator).is_err());
        gate.deauthorize_caller(&owner, &operator).unwrap();
        assert!(!gate.is_authorized(&operator));
        assert!(gate.deauthorize_caller(&owner, &operator).is_err());
    }
}
