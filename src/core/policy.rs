//! Policy data structures
//!
//! Untyped input arrives as a [`PolicySpec`] whose rule, set and NAT entries
//! are raw JSON values. The validators turn each entry into one of the typed
//! records below; once constructed these are never mutated.
//!
//! The typed [`Rule`] carries its [`Direction`] instead of two optional
//! interfaces, so a rule that attaches to no interface cannot exist past
//! validation.

use ipnetwork::{IpNetwork, Ipv4Network};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::core::error::Result;

/// Address family of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum IpVersion {
    #[strum(serialize = "4")]
    V4,
    #[strum(serialize = "6")]
    V6,
}

impl IpVersion {
    /// nftables payload keyword for address matches
    pub const fn family(self) -> &'static str {
        match self {
            IpVersion::V4 => "ip",
            IpVersion::V6 => "ip6",
        }
    }

    pub fn of(network: &IpNetwork) -> Self {
        if network.is_ipv4() { Self::V4 } else { Self::V6 }
    }
}

/// Protocol selector of a rule
///
/// `icmp`, `dns` and `vpn` do not render inline; they jump to a shared
/// application chain (see [`crate::core::compile::Application`]).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[strum(serialize = "any")]
    Any,
    #[strum(serialize = "tcp")]
    Tcp,
    #[strum(serialize = "udp")]
    Udp,
    #[strum(serialize = "icmp")]
    Icmp,
    #[strum(serialize = "dns")]
    Dns,
    #[strum(serialize = "vpn")]
    Vpn,
}

/// Verdict of a rule, also used as a base chain's default policy
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[strum(serialize = "accept")]
    Accept,
    #[default]
    #[strum(serialize = "drop")]
    Drop,
}

/// Single port or inclusive range, both ends in 1..=65535
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortEntry {
    Single(u16),
    Range(u16, u16),
}

impl fmt::Display for PortEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortEntry::Single(p) => write!(f, "{p}"),
            PortEntry::Range(start, end) => write!(f, "{start}-{end}"),
        }
    }
}

/// Source or destination match of a rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressMatch {
    /// `["any"]`: no address clause is emitted
    Any,
    /// `["@name"]`: match against a declared set
    Set(String),
    /// Inline literal; never empty
    List(Vec<IpNetwork>),
}

impl AddressMatch {
    pub fn set_name(&self) -> Option<&str> {
        match self {
            AddressMatch::Set(name) => Some(name),
            _ => None,
        }
    }
}

/// Port match of a rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortMatch {
    /// `["@name"]`: match against a declared `inet_service` set
    Set(String),
    /// Inline literal, possibly empty
    List(Vec<PortEntry>),
}

impl PortMatch {
    pub fn set_name(&self) -> Option<&str> {
        match self {
            PortMatch::Set(name) => Some(name),
            PortMatch::List(_) => None,
        }
    }
}

/// An interface attachment that is present on the rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interface {
    /// The `any` sentinel: attached, but no `iifname`/`oifname` clause
    Any,
    Named(String),
}

impl Interface {
    pub fn name(&self) -> Option<&str> {
        match self {
            Interface::Any => None,
            Interface::Named(name) => Some(name),
        }
    }
}

/// Interface attachment of a rule, which also decides its chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Direction {
    Input { iiface: Interface },
    Output { oiface: Interface },
    Forward { iiface: Interface, oiface: Interface },
}

impl Direction {
    pub fn chain(&self) -> FilterChain {
        match self {
            Direction::Input { .. } => FilterChain::Input,
            Direction::Output { .. } => FilterChain::Output,
            Direction::Forward { .. } => FilterChain::Forward,
        }
    }

    pub fn iiface(&self) -> Option<&Interface> {
        match self {
            Direction::Input { iiface } | Direction::Forward { iiface, .. } => Some(iiface),
            Direction::Output { .. } => None,
        }
    }

    pub fn oiface(&self) -> Option<&Interface> {
        match self {
            Direction::Output { oiface } | Direction::Forward { oiface, .. } => Some(oiface),
            Direction::Input { .. } => None,
        }
    }
}

/// Filter base chains of the table
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::EnumIter,
    strum::AsRefStr,
)]
pub enum FilterChain {
    #[strum(serialize = "input")]
    Input,
    #[strum(serialize = "forward")]
    Forward,
    #[strum(serialize = "output")]
    Output,
}

/// A validated firewall rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub version: IpVersion,
    pub source: AddressMatch,
    pub destination: AddressMatch,
    pub protocol: Protocol,
    pub ports: PortMatch,
    pub action: Action,
    pub log: bool,
    pub direction: Direction,
    /// Emission position within the rule's chain; ties keep input order
    pub order: i64,
}

impl Rule {
    /// Names of all sets this rule references, with the set type each use requires.
    pub fn set_references(&self) -> Vec<(&str, SetType)> {
        let address_type = match self.version {
            IpVersion::V4 => SetType::Ipv4Addr,
            IpVersion::V6 => SetType::Ipv6Addr,
        };

        let mut refs = Vec::new();
        if let Some(name) = self.source.set_name() {
            refs.push((name, address_type));
        }
        if let Some(name) = self.destination.set_name() {
            refs.push((name, address_type));
        }
        if let Some(name) = self.ports.set_name() {
            refs.push((name, SetType::InetService));
        }
        refs
    }
}

/// Element type of a named set
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
pub enum SetType {
    #[strum(serialize = "ipv4_addr")]
    Ipv4Addr,
    #[strum(serialize = "ipv6_addr")]
    Ipv6Addr,
    #[strum(serialize = "inet_service")]
    InetService,
    #[strum(serialize = "ether_addr")]
    EtherAddr,
}

impl SetType {
    /// Whether the set is declared with `flags interval` (ranges and prefixes)
    pub const fn supports_intervals(self) -> bool {
        !matches!(self, SetType::EtherAddr)
    }
}

/// One element of a named set, already type-checked against the set type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetElement {
    Network(IpNetwork),
    Port(PortEntry),
    /// Lower-case, colon separated
    Mac(String),
}

/// A validated named set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedSet {
    pub name: String,
    pub set_type: SetType,
    pub elements: Vec<SetElement>,
}

/// NAT translation direction
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
pub enum NatDirection {
    /// Rewrites destination `public` to `private` in pre-routing
    #[strum(to_string = "dnat", serialize = "destination-nat")]
    Destination,
    /// Rewrites source `private` to `public` in post-routing
    #[strum(to_string = "snat", serialize = "source-nat")]
    Source,
}

/// A validated one-to-one NAT mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatMapping {
    pub direction: NatDirection,
    /// Routable IPv4 network, outside RFC1918
    pub public: Ipv4Network,
    /// RFC1918 IPv4 network
    pub private: Ipv4Network,
    pub iface: Option<String>,
}

/// Default policy of each filter base chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChainPolicies {
    #[serde(default)]
    pub input: Action,
    #[serde(default)]
    pub forward: Action,
    #[serde(default)]
    pub output: Action,
}

impl ChainPolicies {
    pub fn get(&self, chain: FilterChain) -> Action {
        match chain {
            FilterChain::Input => self.input,
            FilterChain::Forward => self.forward,
            FilterChain::Output => self.output,
        }
    }
}

/// Untyped policy input as read from a policy file
///
/// Entries stay as raw JSON so that validation can report type errors
/// (a string where a list belongs) instead of failing deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicySpec {
    #[serde(default)]
    pub rules: Vec<serde_json::Value>,
    #[serde(default)]
    pub sets: Vec<serde_json::Value>,
    #[serde(default)]
    pub nats: Vec<serde_json::Value>,
    #[serde(default)]
    pub policies: ChainPolicies,
}

impl PolicySpec {
    /// Reads a policy file.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the file cannot be read or is not a JSON object of the expected shape.
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// A fully validated policy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Policy {
    pub rules: Vec<Rule>,
    pub sets: Vec<NamedSet>,
    pub nats: Vec<NatMapping>,
    pub policies: ChainPolicies,
}

impl Policy {
    pub fn set(&self, name: &str) -> Option<&NamedSet> {
        self.sets.iter().find(|s| s.name == name)
    }
}

/// Where a document is deployed: one table in one network namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub namespace: String,
    pub table: String,
    /// Base chain priority shared by every hook chain in the table
    pub priority: i32,
}

impl Target {
    pub fn new(namespace: impl Into<String>, table: impl Into<String>, priority: i32) -> Self {
        Self {
            namespace: namespace.into(),
            table: table.into(),
            priority,
        }
    }

    /// Prefix attached to packets matched by a rule with `log: true`
    pub fn log_prefix(&self) -> String {
        format!("Namespace_{}_Table_{}", self.namespace, self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_nat_direction_aliases() {
        assert_eq!(NatDirection::from_str("dnat").ok(), Some(NatDirection::Destination));
        assert_eq!(
            NatDirection::from_str("destination-nat").ok(),
            Some(NatDirection::Destination)
        );
        assert_eq!(NatDirection::from_str("source-nat").ok(), Some(NatDirection::Source));
        assert_eq!(NatDirection::Source.to_string(), "snat");
    }

    #[test]
    fn test_chain_policies_default_to_drop() {
        let policies: ChainPolicies = serde_json::from_str(r#"{"output": "accept"}"#).unwrap();
        assert_eq!(policies.get(FilterChain::Input), Action::Drop);
        assert_eq!(policies.get(FilterChain::Forward), Action::Drop);
        assert_eq!(policies.get(FilterChain::Output), Action::Accept);
    }

    #[test]
    fn test_direction_chain() {
        let forward = Direction::Forward {
            iiface: Interface::Named("ext0".into()),
            oiface: Interface::Any,
        };
        assert_eq!(forward.chain(), FilterChain::Forward);
        assert_eq!(forward.oiface(), Some(&Interface::Any));
        assert!(Direction::Output { oiface: Interface::Any }.iiface().is_none());
    }

    #[test]
    fn test_log_prefix() {
        let target = Target::new("ns1100", "fw", 0);
        assert_eq!(target.log_prefix(), "Namespace_ns1100_Table_fw");
    }

    #[test]
    fn test_policy_spec_missing_sections() {
        let spec: PolicySpec = serde_json::from_str("{}").unwrap();
        assert!(spec.rules.is_empty());
        assert_eq!(spec.policies, ChainPolicies::default());
    }
}
