//! Engine parameters and the collaborator network file.

use crate::error::{Result, SuretyError};
use crate::identity::{Address, Balance, UNIT};
use crate::prng::INDICES_PER_ORACLE;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Which registered-airline count an admission vote is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuorumDenominator {
    /// Registered count at the moment each vote is cast.
    #[default]
    Floating,
    /// Registered count when the candidate record was created.
    Locked,
}

/// Tunable engine parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ledger owner; also admitted as the genesis participant airline.
    pub owner: Address,
    /// Name recorded for the genesis airline.
    pub genesis_airline_name: String,
    /// Matching oracle responses required to finalize a status.
    pub quorum: usize,
    /// Airlines admitted without a vote.
    pub bootstrap_airlines: usize,
    /// Minimum airline funding.
    pub funding_minimum: Balance,
    /// Oracle registration fee.
    pub registration_fee: Balance,
    /// Maximum insurance paid per passenger per flight.
    pub purchase_cap: Balance,
    /// Payout multiplier numerator.
    pub payout_numerator: Balance,
    /// Payout multiplier denominator.
    pub payout_denominator: Balance,
    /// Oracle indices are drawn from `0..index_domain`.
    pub index_domain: u8,
    /// Seed for index assignment and request sharding.
    pub index_seed: u64,
    /// Denominator rule for admission votes.
    pub quorum_denominator: QuorumDenominator,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            owner: Address::from_label("owner"),
            genesis_airline_name: "Genesis Air".to_string(),
            quorum: 3,
            bootstrap_airlines: 4,
            funding_minimum: 10 * UNIT,
            registration_fee: UNIT,
            purchase_cap: UNIT,
            payout_numerator: 3,
            payout_denominator: 2,
            index_domain: 10,
            index_seed: 0,
            quorum_denominator: QuorumDenominator::Floating,
        }
    }
}

impl EngineConfig {
    /// Default parameters owned by `owner`.
    pub fn with_owner(owner: Address) -> Self {
        Self {
            owner,
            ..Self::default()
        }
    }

    /// Load from JSON; missing file -> defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = fs::read(path)?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Persist to JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_json(path, self)
    }

    /// Rejects parameter combinations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.quorum == 0 {
            return Err(SuretyError::Config("quorum must be at least 1".into()));
        }
        if usize::from(self.index_domain) < INDICES_PER_ORACLE {
            return Err(SuretyError::Config(format!(
                "index_domain must be at least {INDICES_PER_ORACLE}"
            )));
        }
        if self.payout_denominator == 0 {
            return Err(SuretyError::Config(
                "payout_denominator must be non-zero".into(),
            ));
        }
        if self.purchase_cap == 0 {
            return Err(SuretyError::Config("purchase_cap must be non-zero".into()));
        }
        if self.genesis_airline_name.trim().is_empty() {
            return Err(SuretyError::Config(
                "genesis_airline_name must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Endpoint and deployed addresses for one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEndpoint {
    /// RPC endpoint.
    pub url: String,
    /// Address of the data layer deployment.
    pub data_address: String,
    /// Address of the application layer deployment.
    pub app_address: String,
}

/// Collaborator configuration keyed by network name, e.g.
///
/// ```json
/// { "network": { "url": "http://localhost:7545", "dataAddress": "0x..", "appAddress": "0x.." } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkConfig {
    networks: BTreeMap<String, NetworkEndpoint>,
}

impl NetworkConfig {
    /// Creates a configuration holding one network.
    pub fn single(name: impl Into<String>, endpoint: NetworkEndpoint) -> Self {
        let mut networks = BTreeMap::new();
        networks.insert(name.into(), endpoint);
        Self { networks }
    }

    /// Endpoint registered under `name`.
    pub fn endpoint(&self, name: &str) -> Option<&NetworkEndpoint> {
        self.networks.get(name)
    }

    /// Adds or replaces the endpoint for `name`.
    pub fn insert(&mut self, name: impl Into<String>, endpoint: NetworkEndpoint) {
        self.networks.insert(name.into(), endpoint);
    }

    /// Network names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.networks.keys().map(String::as_str)
    }

    /// Reads a network file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Writes a network file, tab-indented like the deployment tooling emits.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        fs::write(path, buf)?;
        Ok(())
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let data = serde_json::to_vec_pretty(value)?;
    fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_path(name: &str) -> std::path::PathBuf {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("{name}_{ts}.json"))
    }

    #[test]
    fn defaults_match_published_constants() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.quorum, 3);
        assert_eq!(cfg.bootstrap_airlines, 4);
        assert_eq!(cfg.funding_minimum, 10 * UNIT);
        assert_eq!(cfg.purchase_cap, UNIT);
        assert_eq!((cfg.payout_numerator, cfg.payout_denominator), (3, 2));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = temp_path("surety_missing_cfg");
        assert_eq!(EngineConfig::load(&path).unwrap(), EngineConfig::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let path = temp_path("surety_partial_cfg");
        fs::write(&path, r#"{"quorum": 5, "quorum_denominator": "locked"}"#).unwrap();
        let cfg = EngineConfig::load(&path).unwrap();
        assert_eq!(cfg.quorum, 5);
        assert_eq!(cfg.quorum_denominator, QuorumDenominator::Locked);
        assert_eq!(cfg.bootstrap_airlines, 4);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.index_domain = 2;
        assert!(matches!(cfg.validate(), Err(SuretyError::Config(_))));
        let mut cfg = EngineConfig::default();
        cfg.quorum = 0;
        assert!(cfg.validate().is_err());
        let mut cfg = EngineConfig::default();
        cfg.payout_denominator = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_save_then_load() {
        let path = temp_path("surety_cfg");
        let mut cfg = EngineConfig::with_owner(Address::from_label("someone"));
        cfg.index_seed = 77;
        cfg.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), cfg);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn network_file_uses_camel_case_keys() {
        let path = temp_path("surety_network");
        let net = NetworkConfig::single(
            "network",
            NetworkEndpoint {
                url: "http://localhost:7545".into(),
                data_address: "0xdata".into(),
                app_address: "0xapp".into(),
            },
        );
        net.save(&path).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"dataAddress\""));
        assert!(raw.contains("\"appAddress\""));
        let loaded = NetworkConfig::load(&path).unwrap();
        assert_eq!(loaded, net);
        assert_eq!(
            loaded.endpoint("network").unwrap().url,
            "http://localhost:7545"
        );
        assert_eq!(loaded.names().collect::<Vec<_>>(), vec!["network"]);
        fs::remove_file(path).unwrap();
    }
}
