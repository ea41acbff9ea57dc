//! Identities, roles and balances.
//!
//! Every participant (owner, airline, oracle, passenger) is an [`Address`].
//! The [`IdentityLedger`] records which roles an address holds and keeps the
//! shared pool that airline funding, oracle fees and premiums flow into.
//! Payouts leave the pool only through [`IdentityLedger::credit_withdrawable`],
//! which moves value into the recipient's withdrawable balance.

use crate::error::{Result, SuretyError};
use blake2::digest::{consts::U32, Digest};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

type Blake2b256 = blake2::Blake2b<U32>;

const ADDRESS_DOMAIN: &[u8] = b"SURETY_ADDRESS";

/// Amount in base units.
pub type Balance = u128;

/// Number of base units in one whole unit.
pub const UNIT: Balance = 1_000_000_000_000_000_000;

const UNIT_DECIMALS: usize = 18;

/// 20-byte account identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Address([u8; 20]);

impl Address {
    /// The all-zero address.
    pub const ZERO: Address = Address([0u8; 20]);

    /// Wraps raw address bytes.
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Deterministically derives an address from a human-readable label.
    pub fn from_label(label: &str) -> Self {
        let mut hasher = Blake2b256::new();
        hasher.update(ADDRESS_DOMAIN);
        hasher.update(label.as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[..20]);
        Self(bytes)
    }

    /// Raw address bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = SuretyError;

    fn from_str(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let decoded =
            hex::decode(body).map_err(|err| SuretyError::InvalidAddress(err.to_string()))?;
        let bytes: [u8; 20] = decoded
            .as_slice()
            .try_into()
            .map_err(|_| SuretyError::InvalidAddress(format!("expected 20 bytes, got {}", decoded.len())))?;
        Ok(Self(bytes))
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

impl TryFrom<String> for Address {
    type Error = SuretyError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Parses a decimal amount of whole units ("10", "1.5") into base units.
pub fn parse_units(input: &str) -> Result<Balance> {
    let trimmed = input.trim();
    let (whole, frac) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(SuretyError::InvalidState("empty amount".into()));
    }
    if frac.len() > UNIT_DECIMALS {
        return Err(SuretyError::InvalidState(format!(
            "amount {trimmed} has more than {UNIT_DECIMALS} decimals"
        )));
    }
    let parse = |digits: &str| -> Result<Balance> {
        if digits.is_empty() {
            return Ok(0);
        }
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SuretyError::InvalidState(format!("invalid amount {trimmed}")));
        }
        digits
            .parse::<Balance>()
            .map_err(|_| SuretyError::InvalidState(format!("invalid amount {trimmed}")))
    };
    let whole_units = parse(whole)?;
    let padded = format!("{frac:0<width$}", width = UNIT_DECIMALS);
    let frac_units = parse(&padded)?;
    whole_units
        .checked_mul(UNIT)
        .and_then(|v| v.checked_add(frac_units))
        .ok_or_else(|| SuretyError::InvalidState(format!("amount {trimmed} overflows")))
}

/// Formats base units as a decimal amount of whole units.
pub fn format_units(amount: Balance) -> String {
    let whole = amount / UNIT;
    let frac = amount % UNIT;
    if frac == 0 {
        return whole.to_string();
    }
    let digits = format!("{frac:0>width$}", width = UNIT_DECIMALS);
    format!("{whole}.{}", digits.trim_end_matches('0'))
}

/// Role an address may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    /// Ledger owner and operating-switch administrator.
    Owner,
    /// Airline at any admission stage.
    Airline,
    /// Registered flight-status oracle.
    Oracle,
    /// Passenger holding at least one policy.
    Passenger,
}

/// Per-address record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Account {
    /// Roles granted to the address.
    pub roles: BTreeSet<Role>,
    /// Total value the address has paid into the pool.
    pub deposited: Balance,
    /// Value credited to the address and awaiting external transfer.
    pub withdrawable: Balance,
}

/// Registry of identities and the shared value pool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityLedger {
    accounts: HashMap<Address, Account>,
    pool: Balance,
}

impl IdentityLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure an account exists and return mutable ref.
    pub fn ensure_account(&mut self, address: Address) -> &mut Account {
        self.accounts.entry(address).or_default()
    }

    /// Get account if present.
    pub fn account(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    /// Grants `role` to `address`.
    pub fn grant_role(&mut self, address: Address, role: Role) {
        self.ensure_account(address).roles.insert(role);
    }

    /// Returns true if `address` holds `role`.
    pub fn has_role(&self, address: &Address, role: Role) -> bool {
        self.accounts
            .get(address)
            .map_or(false, |acct| acct.roles.contains(&role))
    }

    /// Records a payment from `address` into the pool.
    pub fn deposit(&mut self, address: Address, amount: Balance) {
        let acct = self.ensure_account(address);
        acct.deposited = acct.deposited.saturating_add(amount);
        self.pool = self.pool.saturating_add(amount);
    }

    /// Value currently held by the pool.
    pub fn pool(&self) -> Balance {
        self.pool
    }

    /// Moves `amount` from the pool into the withdrawable balance of `address`.
    pub fn credit_withdrawable(&mut self, address: Address, amount: Balance) -> Result<()> {
        if self.pool < amount {
            return Err(SuretyError::InsufficientFunds {
                required: amount,
                provided: self.pool,
            });
        }
        self.pool -= amount;
        let acct = self.ensure_account(address);
        acct.withdrawable = acct.withdrawable.saturating_add(amount);
        Ok(())
    }

    /// Withdrawable balance of `address`.
    pub fn withdrawable(&self, address: &Address) -> Balance {
        self.accounts
            .get(address)
            .map_or(0, |acct| acct.withdrawable)
    }
}
