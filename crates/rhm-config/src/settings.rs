use std::net::SocketAddr;

use anyhow::{bail, Context, Result};
use rhm_lifecycle::LeasePolicy;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::secrets::DEFAULT_DATABASE_URL_ENV;

/// Typed view of the merged config. Every section and key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub lease: LeaseSettings,
    pub reconcile: ReconcileSettings,
    pub bus: BusSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub addr: String,
    /// Browser origins allowed by CORS.
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8899".to_string(),
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Name of the env var holding the connection URL.
    pub url_env: String,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url_env: DEFAULT_DATABASE_URL_ENV.to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseSettings {
    #[serde(flatten)]
    pub policy: LeasePolicy,
    /// Period of the lease expiry sweep in the daemon. 0 disables it.
    pub expiry_sweep_secs: u64,
}

impl Default for LeaseSettings {
    fn default() -> Self {
        Self {
            policy: LeasePolicy::default(),
            expiry_sweep_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileSettings {
    /// Run one reconciliation pass when the daemon starts.
    pub on_start: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSettings {
    pub capacity: usize,
    pub heartbeat_secs: u64,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            capacity: 1024,
            heartbeat_secs: 5,
        }
    }
}

impl Settings {
    pub fn from_config_json(config_json: &Value) -> Result<Self> {
        let settings: Settings =
            serde_json::from_value(config_json.clone()).context("config does not match settings")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;
        if self.database.max_connections == 0 {
            bail!("database.max_connections must be > 0");
        }
        if self.bus.capacity == 0 {
            bail!("bus.capacity must be > 0");
        }
        if let Err(msg) = self.lease.policy.validate() {
            bail!("lease: {msg}");
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .addr
            .parse()
            .with_context(|| format!("server.addr is not a socket address: {}", self.server.addr))
    }
}

#[cfg(test)]
mod tests {
    use rhm_lifecycle::PenaltyPolicy;

    use super::*;
    use crate::load_layered_yaml_from_strings;

    #[test]
    fn empty_config_yields_defaults() {
        let s = Settings::from_config_json(&serde_json::json!({})).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.bind_addr().unwrap().port(), 8899);
        assert_eq!(s.database.url_env, "RHM_DATABASE_URL");
    }

    #[test]
    fn lease_section_maps_onto_policy() {
        let yaml = r#"
lease:
  deposit_months: 2
  expiry_sweep_secs: 0
  default_penalty:
    kind: months_of_rent
    months: 1
"#;
        let c = load_layered_yaml_from_strings(&[yaml]).unwrap();
        let s = c.settings().unwrap();
        assert_eq!(s.lease.policy.deposit_months, 2);
        assert_eq!(s.lease.policy.max_lease_months, 60);
        assert_eq!(
            s.lease.policy.default_penalty,
            PenaltyPolicy::MonthsOfRent { months: 1 }
        );
        assert_eq!(s.lease.expiry_sweep_secs, 0);
    }

    #[test]
    fn invalid_values_are_rejected() {
        for yaml in [
            "server:\n  addr: not-an-addr\n",
            "bus:\n  capacity: 0\n",
            "lease:\n  max_lease_months: 0\n",
        ] {
            let c = load_layered_yaml_from_strings(&[yaml]).unwrap();
            assert!(c.settings().is_err(), "{yaml}");
        }
    }
}
