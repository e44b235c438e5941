//! Process configuration from `CUSTODY_*` environment variables.
//!
//! ```text
//! CUSTODY_BUILDER_PRIVATE_KEY   hex Ed25519 private key of the builder (required)
//! CUSTODY_COLLECTION_ID         namespace for user shares; unset = create one
//! CUSTODY_DATA_DIR              root for node, content and audit files (./custody-data)
//! CUSTODY_NODES                 custody nodes to split shares across (3)
//! CUSTODY_ROOT_COMMAND          command granted by the root token (/nil)
//! CUSTODY_ROOT_TTL_SECS         root token lifetime (86400)
//! CUSTODY_DELEGATION_TTL_SECS   user delegation lifetime (3600)
//! CUSTODY_REFRESH_WINDOW_SECS   reissue the root with this much left (300)
//! CUSTODY_LOG_FORMAT            "json" or "pretty" (pretty)
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use custody_envelope::{Command, Keypair};
use zeroize::Zeroizing;

use crate::error::ConfigError;
use crate::orchestrator::CustodyContext;
use crate::policy::TokenPolicy;
use crate::types::NamespaceId;

pub const BUILDER_PRIVATE_KEY: &str = "CUSTODY_BUILDER_PRIVATE_KEY";
pub const COLLECTION_ID: &str = "CUSTODY_COLLECTION_ID";
pub const DATA_DIR: &str = "CUSTODY_DATA_DIR";
pub const NODES: &str = "CUSTODY_NODES";
pub const ROOT_COMMAND: &str = "CUSTODY_ROOT_COMMAND";
pub const ROOT_TTL_SECS: &str = "CUSTODY_ROOT_TTL_SECS";
pub const DELEGATION_TTL_SECS: &str = "CUSTODY_DELEGATION_TTL_SECS";
pub const REFRESH_WINDOW_SECS: &str = "CUSTODY_REFRESH_WINDOW_SECS";
pub const LOG_FORMAT: &str = "CUSTODY_LOG_FORMAT";

const DEFAULT_DATA_DIR: &str = "./custody-data";
const DEFAULT_NODES: usize = 3;
const DEFAULT_ROOT_COMMAND: &str = "/nil";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(ConfigError::Invalid {
                key: LOG_FORMAT,
                reason: format!("expected json or pretty, got {other:?}"),
            }),
        }
    }
}

#[derive(Clone)]
pub struct CustodyConfig {
    pub builder_private_key: Zeroizing<String>,
    pub collection_id: Option<NamespaceId>,
    pub data_dir: PathBuf,
    pub nodes: usize,
    pub root_command: Command,
    pub policy: TokenPolicy,
    pub log_format: LogFormat,
}

impl fmt::Debug for CustodyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustodyConfig")
            .field("builder_private_key", &"[REDACTED]")
            .field("collection_id", &self.collection_id)
            .field("data_dir", &self.data_dir)
            .field("nodes", &self.nodes)
            .field("root_command", &self.root_command)
            .field("policy", &self.policy)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl CustodyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let builder_private_key =
            Zeroizing::new(get(BUILDER_PRIVATE_KEY).ok_or(ConfigError::Missing(BUILDER_PRIVATE_KEY))?);
        Keypair::from_hex(&builder_private_key).map_err(|e| ConfigError::Invalid {
            key: BUILDER_PRIVATE_KEY,
            reason: e.to_string(),
        })?;

        let collection_id = get(COLLECTION_ID)
            .map(|v| {
                v.parse::<NamespaceId>().map_err(|e| ConfigError::Invalid {
                    key: COLLECTION_ID,
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let nodes = parse_or(get(NODES), NODES, DEFAULT_NODES)?;
        if nodes == 0 {
            return Err(ConfigError::Invalid {
                key: NODES,
                reason: "need at least one node".into(),
            });
        }

        let root_command = Command::parse(get(ROOT_COMMAND).as_deref().unwrap_or(DEFAULT_ROOT_COMMAND))
            .map_err(|e| ConfigError::Invalid {
                key: ROOT_COMMAND,
                reason: e.to_string(),
            })?;

        let defaults = TokenPolicy::default();
        let policy = TokenPolicy {
            root_ttl: secs_or(get(ROOT_TTL_SECS), ROOT_TTL_SECS, defaults.root_ttl)?,
            delegation_ttl: secs_or(get(DELEGATION_TTL_SECS), DELEGATION_TTL_SECS, defaults.delegation_ttl)?,
            refresh_window: secs_or(get(REFRESH_WINDOW_SECS), REFRESH_WINDOW_SECS, defaults.refresh_window)?,
        };
        if policy.delegation_ttl > policy.root_ttl {
            return Err(ConfigError::Invalid {
                key: DELEGATION_TTL_SECS,
                reason: "delegation cannot outlive the root token".into(),
            });
        }

        let log_format = get(LOG_FORMAT).map(|v| v.parse::<LogFormat>()).transpose()?.unwrap_or_default();

        Ok(Self {
            builder_private_key,
            collection_id,
            data_dir: get(DATA_DIR).map(PathBuf::from).unwrap_or_else(|| DEFAULT_DATA_DIR.into()),
            nodes,
            root_command,
            policy,
            log_format,
        })
    }

    pub fn builder_keypair(&self) -> Result<Keypair, ConfigError> {
        Keypair::from_hex(&self.builder_private_key).map_err(|e| ConfigError::Invalid {
            key: BUILDER_PRIVATE_KEY,
            reason: e.to_string(),
        })
    }

    pub fn context(&self) -> Result<CustodyContext, ConfigError> {
        Ok(CustodyContext {
            builder: self.builder_keypair()?,
            root_command: self.root_command.clone(),
            namespace: self.collection_id,
            policy: self.policy.clone(),
        })
    }

    pub fn node_dir(&self, index: usize) -> PathBuf {
        self.data_dir.join("nodes").join(format!("node-{index}"))
    }

    pub fn content_dir(&self) -> PathBuf {
        self.data_dir.join("content")
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.data_dir.join("audit.jsonl")
    }
}

fn parse_or<T: FromStr>(value: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    match value {
        None => Ok(default),
        Some(v) => v.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
    }
}

fn secs_or(value: Option<String>, key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    parse_or(value, key, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const KEY: &str = "0707070707070707070707070707070707070707070707070707070707070707";

    fn config(pairs: &[(&str, &str)]) -> Result<CustodyConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CustodyConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply() {
        let cfg = config(&[(BUILDER_PRIVATE_KEY, KEY)]).unwrap();
        assert_eq!(cfg.collection_id, None);
        assert_eq!(cfg.nodes, 3);
        assert_eq!(cfg.root_command.to_string(), "/nil");
        assert_eq!(cfg.policy, TokenPolicy::default());
        assert_eq!(cfg.policy.delegation_ttl, Duration::from_secs(3600));
        assert_eq!(cfg.log_format, LogFormat::Pretty);
        assert_eq!(cfg.data_dir, PathBuf::from("./custody-data"));
    }

    #[test]
    fn missing_builder_key() {
        assert_eq!(config(&[]).unwrap_err(), ConfigError::Missing(BUILDER_PRIVATE_KEY));
        assert_eq!(
            config(&[(BUILDER_PRIVATE_KEY, "  ")]).unwrap_err(),
            ConfigError::Missing(BUILDER_PRIVATE_KEY)
        );
    }

    #[test]
    fn invalid_values_name_their_key() {
        let cases = [
            (BUILDER_PRIVATE_KEY, "abcd"),
            (COLLECTION_ID, "not-a-uuid"),
            (NODES, "0"),
            (NODES, "many"),
            (ROOT_COMMAND, "nil"),
            (LOG_FORMAT, "xml"),
            (DELEGATION_TTL_SECS, "999999999"),
        ];
        for (key, value) in cases {
            let mut pairs = vec![(BUILDER_PRIVATE_KEY, KEY)];
            pairs.retain(|(k, _)| *k != key);
            pairs.push((key, value));
            match config(&pairs) {
                Err(ConfigError::Invalid { key: k, .. }) => assert_eq!(k, key),
                other => panic!("{key}={value}: {other:?}"),
            }
        }
    }

    #[test]
    fn overrides_parse() {
        let ns = NamespaceId::generate().to_string();
        let cfg = config(&[
            (BUILDER_PRIVATE_KEY, KEY),
            (COLLECTION_ID, ns.as_str()),
            (NODES, "5"),
            (ROOT_TTL_SECS, "7200"),
            (DELEGATION_TTL_SECS, "600"),
            (LOG_FORMAT, "JSON"),
            (DATA_DIR, "/tmp/custody"),
        ])
        .unwrap();
        assert_eq!(cfg.collection_id.map(|n| n.to_string()), Some(ns));
        assert_eq!(cfg.nodes, 5);
        assert_eq!(cfg.policy.root_ttl, Duration::from_secs(7200));
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.node_dir(1), PathBuf::from("/tmp/custody/nodes/node-1"));
    }

    #[test]
    fn debug_redacts_key() {
        let cfg = config(&[(BUILDER_PRIVATE_KEY, KEY)]).unwrap();
        assert!(!format!("{cfg:?}").contains(KEY));
    }
}
