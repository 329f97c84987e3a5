//! Engine configuration.
//!
//! Defaults reproduce the plain correlation behaviour (no eviction, no
//! extra chain cap). A JSON file and `SMBWIRE_*` environment variables can
//! override them.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_REASSEMBLY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-conversation cap on outstanding requests. The oldest request is
    /// evicted first. `None` keeps everything.
    pub max_pending_requests: Option<usize>,
    /// Tighter cap on AndX chain length. The PDU-size bound always applies.
    pub max_andx_chain: Option<usize>,
    /// Per-block cap on reassembled parameter/data bytes.
    pub max_reassembly_bytes: usize,
    /// Use the header reply bit to tell requests from responses. When
    /// false, a caller-supplied direction wins.
    pub trust_reply_flag: bool,
    /// Reassemble multi-PDU transactions. When false every fragment is
    /// handed off on its own.
    pub reassemble_transactions: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_pending_requests: None,
            max_andx_chain: None,
            max_reassembly_bytes: DEFAULT_MAX_REASSEMBLY_BYTES,
            trust_reply_flag: true,
            reassemble_transactions: true,
        }
    }
}

fn env_usize(name: &str) -> Result<Option<usize>> {
    match std::env::var(name) {
        Ok(v) => v
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| anyhow!("{} is not a number: {:?}", name, v)),
        Err(_) => Ok(None),
    }
}

fn env_bool(name: &str) -> Result<Option<bool>> {
    match std::env::var(name) {
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(anyhow!("{} is not a boolean: {:?}", name, v)),
        },
        Err(_) => Ok(None),
    }
}

impl EngineConfig {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by the environment.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env()
    }

    /// Apply `SMBWIRE_*` overrides on top of `self`.
    pub fn with_env(mut self) -> Result<Self> {
        if let Some(n) = env_usize("SMBWIRE_MAX_PENDING")? {
            self.max_pending_requests = Some(n);
        }
        if let Some(n) = env_usize("SMBWIRE_MAX_ANDX_CHAIN")? {
            self.max_andx_chain = Some(n);
        }
        if let Some(n) = env_usize("SMBWIRE_MAX_REASSEMBLY_BYTES")? {
            self.max_reassembly_bytes = n;
        }
        if let Some(b) = env_bool("SMBWIRE_TRUST_REPLY_FLAG")? {
            self.trust_reply_flag = b;
        }
        if let Some(b) = env_bool("SMBWIRE_REASSEMBLE")? {
            self.reassemble_transactions = b;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_pending_requests == Some(0) {
            bail!("max_pending_requests must be at least 1");
        }
        if self.max_andx_chain == Some(0) {
            bail!("max_andx_chain must be at least 1");
        }
        if self.max_reassembly_bytes == 0 {
            bail!("max_reassembly_bytes must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let c = EngineConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.max_pending_requests, None);
        assert!(c.trust_reply_flag);
    }

    #[test]
    fn test_partial_json() {
        let c: EngineConfig = serde_json::from_str(r#"{"max_pending_requests": 64}"#).unwrap();
        assert_eq!(c.max_pending_requests, Some(64));
        assert_eq!(c.max_reassembly_bytes, DEFAULT_MAX_REASSEMBLY_BYTES);
        assert!(c.reassemble_transactions);
    }

    #[test]
    fn test_zero_caps_rejected() {
        let c = EngineConfig { max_andx_chain: Some(0), ..Default::default() };
        assert!(c.validate().is_err());
        let c = EngineConfig { max_reassembly_bytes: 0, ..Default::default() };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("smbwire-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"trust_reply_flag": false, "max_andx_chain": 8}"#).unwrap();
        let c = EngineConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(!c.trust_reply_flag);
        assert_eq!(c.max_andx_chain, Some(8));
    }
}
