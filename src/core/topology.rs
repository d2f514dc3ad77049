//! Node topology of a PodNet pair
//!
//! The topology file names the pod's IPv6 subnet and which of the two
//! PodNet nodes is currently enabled:
//!
//! ```json
//! { "ipv6_subnet": "2a02:2078:3::/48", "podnet_a_enabled": true, "podnet_b_enabled": false }
//! ```
//!
//! Node A is reached at `<subnet prefix>10:0:2`, node B at `<subnet prefix>10:0:3`.
//! Exactly one node must be enabled.

use ipnetwork::Ipv6Network;
use serde_json::Value;
use std::fmt;
use std::net::Ipv6Addr;
use std::path::{Path, PathBuf};
use thiserror::Error;

const NODE_A_SUFFIX: &str = "10:0:2";
const NODE_B_SUFFIX: &str = "10:0:3";

/// Errors resolving the node topology
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("cannot read topology config {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("topology config {} is not valid JSON: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("topology config {} is missing `{key}`{}", path.display(), raw_dump(raw))]
    MissingKey {
        path: PathBuf,
        key: &'static str,
        raw: Value,
    },

    #[error("`{key}` in {} must be true or false, got {value}{}", path.display(), raw_dump(raw))]
    NotBoolean {
        path: PathBuf,
        key: &'static str,
        value: String,
        raw: Value,
    },

    #[error("`ipv6_subnet` in {} is not a valid IPv6 network: {value}{}", path.display(), raw_dump(raw))]
    InvalidSubnet {
        path: PathBuf,
        value: String,
        raw: Value,
    },

    #[error("both podnet_a_enabled and podnet_b_enabled are true in {}{}", path.display(), raw_dump(raw))]
    BothEnabled { path: PathBuf, raw: Value },

    #[error("neither podnet_a_enabled nor podnet_b_enabled is true in {}{}", path.display(), raw_dump(raw))]
    NoneEnabled { path: PathBuf, raw: Value },
}

/// Parsed configuration appended to topology errors. Object keys come out
/// sorted.
fn raw_dump(raw: &Value) -> String {
    let pretty = serde_json::to_string_pretty(raw).unwrap_or_else(|_| raw.to_string());
    format!("\nJSON dump of raw configuration:\n{pretty}")
}

/// Role of a node within the pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
pub enum NodeRole {
    #[strum(serialize = "enabled")]
    Enabled,
    #[strum(serialize = "disabled")]
    Disabled,
}

/// One PodNet node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Node {
    /// Address or hostname handed to the remote executor
    pub host: String,
    pub role: NodeRole,
}

impl Node {
    pub fn new(host: impl Into<String>, role: NodeRole) -> Self {
        Self {
            host: host.into(),
            role,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.host, self.role)
    }
}

/// The resolved node pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    /// Where the topology came from, quoted in diagnostics
    pub source: String,
    pub enabled: Node,
    pub disabled: Node,
}

impl Topology {
    /// Builds a topology from explicit hosts.
    pub fn new(source: impl Into<String>, enabled: &str, disabled: &str) -> Self {
        Self {
            source: source.into(),
            enabled: Node::new(enabled, NodeRole::Enabled),
            disabled: Node::new(disabled, NodeRole::Disabled),
        }
    }

    /// Nodes in deployment order: enabled first.
    pub fn nodes(&self) -> [&Node; 2] {
        [&self.enabled, &self.disabled]
    }

    /// Reads and resolves a topology file.
    ///
    /// # Errors
    ///
    /// Returns a distinct [`TopologyError`] for each way the file can be wrong.
    pub async fn load(path: &Path) -> Result<Self, TopologyError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| TopologyError::Unreadable {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json(path, &text)
    }

    /// Resolves a topology from file contents.
    ///
    /// # Errors
    ///
    /// Same as [`Topology::load`], minus the read failure.
    pub fn from_json(path: &Path, text: &str) -> Result<Self, TopologyError> {
        let value: Value = serde_json::from_str(text).map_err(|source| TopologyError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;

        let get = |key: &'static str| {
            value
                .get(key)
                .ok_or_else(|| TopologyError::MissingKey {
                    path: path.to_path_buf(),
                    key,
                    raw: value.clone(),
                })
        };

        let flag = |key: &'static str| -> Result<bool, TopologyError> {
            let raw = get(key)?;
            raw.as_bool().ok_or_else(|| TopologyError::NotBoolean {
                path: path.to_path_buf(),
                key,
                value: raw.to_string(),
                raw: value.clone(),
            })
        };

        let subnet_raw = get("ipv6_subnet")?;
        let invalid_subnet = || TopologyError::InvalidSubnet {
            path: path.to_path_buf(),
            value: subnet_raw.to_string(),
            raw: value.clone(),
        };
        let subnet = subnet_raw.as_str().ok_or_else(invalid_subnet)?;
        subnet
            .parse::<Ipv6Network>()
            .map_err(|_| invalid_subnet())?;

        let prefix = subnet.split('/').next().unwrap_or_default();
        let node_a = node_address(prefix, NODE_A_SUFFIX).ok_or_else(invalid_subnet)?;
        let node_b = node_address(prefix, NODE_B_SUFFIX).ok_or_else(invalid_subnet)?;

        let a_enabled = flag("podnet_a_enabled")?;
        let b_enabled = flag("podnet_b_enabled")?;

        let (enabled, disabled) = match (a_enabled, b_enabled) {
            (true, false) => (node_a, node_b),
            (false, true) => (node_b, node_a),
            (true, true) => {
                return Err(TopologyError::BothEnabled {
                    path: path.to_path_buf(),
                    raw: value,
                });
            }
            (false, false) => {
                return Err(TopologyError::NoneEnabled {
                    path: path.to_path_buf(),
                    raw: value,
                });
            }
        };

        Ok(Self::new(
            path.display().to_string(),
            &enabled.to_string(),
            &disabled.to_string(),
        ))
    }
}

/// Appends a node suffix to the subnet's address text, e.g. `2a02:2078:3::` + `10:0:2`.
fn node_address(prefix: &str, suffix: &str) -> Option<Ipv6Addr> {
    format!("{prefix}{suffix}").parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(json: &str) -> Result<Topology, TopologyError> {
        Topology::from_json(Path::new("/opt/robot/config.json"), json)
    }

    #[test]
    fn test_node_a_enabled() {
        let topology = resolve(
            r#"{"ipv6_subnet": "2a02:2078:3::/48", "podnet_a_enabled": true, "podnet_b_enabled": false}"#,
        )
        .unwrap();
        assert_eq!(topology.enabled.host, "2a02:2078:3::10:0:2");
        assert_eq!(topology.disabled.host, "2a02:2078:3::10:0:3");
        assert_eq!(topology.enabled.role, NodeRole::Enabled);
        assert_eq!(topology.source, "/opt/robot/config.json");
    }

    #[test]
    fn test_node_b_enabled() {
        let topology = resolve(
            r#"{"ipv6_subnet": "2a02:2078:3::/48", "podnet_a_enabled": false, "podnet_b_enabled": true}"#,
        )
        .unwrap();
        assert_eq!(topology.enabled.host, "2a02:2078:3::10:0:3");
        assert_eq!(topology.nodes()[1].host, "2a02:2078:3::10:0:2");
    }

    #[test]
    fn test_both_enabled() {
        let err = resolve(
            r#"{"ipv6_subnet": "2a02:2078:3::/48", "podnet_a_enabled": true, "podnet_b_enabled": true}"#,
        )
        .unwrap_err();
        assert!(matches!(err, TopologyError::BothEnabled { .. }));

        let message = err.to_string();
        let (_, dump) = message
            .split_once("\nJSON dump of raw configuration:\n")
            .unwrap();
        assert_eq!(
            dump,
            "{\n  \"ipv6_subnet\": \"2a02:2078:3::/48\",\n  \"podnet_a_enabled\": true,\n  \"podnet_b_enabled\": true\n}"
        );
    }

    #[test]
    fn test_none_enabled() {
        let err = resolve(
            r#"{"ipv6_subnet": "2a02:2078:3::/48", "podnet_a_enabled": false, "podnet_b_enabled": false}"#,
        )
        .unwrap_err();
        assert!(matches!(err, TopologyError::NoneEnabled { .. }));
    }

    #[test]
    fn test_flag_not_boolean() {
        let err = resolve(
            r#"{"ipv6_subnet": "2a02:2078:3::/48", "podnet_a_enabled": "yes", "podnet_b_enabled": false}"#,
        )
        .unwrap_err();
        assert!(
            matches!(err, TopologyError::NotBoolean { key, .. } if key == "podnet_a_enabled")
        );
    }

    #[test]
    fn test_missing_key() {
        let err = resolve(r#"{"podnet_a_enabled": true, "podnet_b_enabled": false}"#).unwrap_err();
        assert!(matches!(err, TopologyError::MissingKey { key: "ipv6_subnet", .. }));
        assert!(err.to_string().contains("\"podnet_a_enabled\": true"));
    }

    #[test]
    fn test_invalid_subnet() {
        let err = resolve(
            r#"{"ipv6_subnet": "10.0.0.0/8", "podnet_a_enabled": true, "podnet_b_enabled": false}"#,
        )
        .unwrap_err();
        assert!(matches!(err, TopologyError::InvalidSubnet { .. }));
    }

    #[test]
    fn test_malformed_json() {
        let err = resolve("{not json").unwrap_err();
        assert!(matches!(err, TopologyError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_unreadable_file() {
        let err = Topology::load(Path::new("/nonexistent/podfw/config.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, TopologyError::Unreadable { .. }));
        assert!(err.to_string().contains("/nonexistent/podfw/config.json"));
    }
}
