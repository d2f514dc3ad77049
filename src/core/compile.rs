//! Rendering of classified rules into nftables rule lines
//!
//! nftables evaluates a rule's expressions left to right, so clause order
//! within a line is part of the output contract:
//!
//! 1. interface matches (`iifname`, `oifname`)
//! 2. address matches (source before destination)
//! 3. log directive
//! 4. protocol, port and verdict
//!
//! [`RuleLineBuilder`] encodes that order in its type: each stage only
//! exposes the method for the next clause group, so a line cannot be built
//! out of order.
//!
//! `icmp`, `dns` and `vpn` rules jump to a shared per-protocol, per-action
//! chain. Each line that does so carries the [`Application`] the assembler
//! must declare.

use ipnetwork::IpNetwork;
use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;

use crate::core::classify::ClassifiedRules;
use crate::core::policy::{
    Action, AddressMatch, Direction, FilterChain, IpVersion, PortMatch, Protocol, Rule,
};

/// Kind of shared jump chain
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display, strum::AsRefStr,
)]
pub enum ApplicationKind {
    #[strum(serialize = "icmp")]
    Icmp,
    #[strum(serialize = "icmp6")]
    Icmp6,
    #[strum(serialize = "dns")]
    Dns,
    #[strum(serialize = "vpn")]
    Vpn,
}

/// A jump chain required by at least one rule, e.g. `icmp_drop`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Application {
    pub kind: ApplicationKind,
    pub action: Action,
}

impl Application {
    pub fn new(kind: ApplicationKind, action: Action) -> Self {
        Self { kind, action }
    }

    /// Chain name, also the jump target
    pub fn chain_name(&self) -> String {
        self.to_string()
    }

    /// Rule lines making up the chain body.
    pub fn body(&self) -> Vec<String> {
        let action = self.action;
        match self.kind {
            ApplicationKind::Icmp => vec![format!(
                "icmp type {{ destination-unreachable, echo-reply, echo-request, time-exceeded }} {action}"
            )],
            ApplicationKind::Icmp6 => vec![format!(
                "icmpv6 type {{ echo-request, mld-listener-query, nd-router-solicit, nd-router-advert, nd-neighbor-solicit, nd-neighbor-advert }} {action}"
            )],
            ApplicationKind::Dns => vec![
                format!("udp dport 53 {action}"),
                format!("tcp dport 53 {action}"),
            ],
            ApplicationKind::Vpn => vec![
                format!("udp dport {{ 500, 4500 }} {action}"),
                format!("meta l4proto esp {action}"),
            ],
        }
    }
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.kind, self.action)
    }
}

/// One rendered rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleLine {
    pub text: String,
    pub application: Option<Application>,
}

/// Builder stage: interface clauses are next
#[derive(Debug)]
pub struct Interfaces;
/// Builder stage: address clauses are next
#[derive(Debug)]
pub struct Addresses;
/// Builder stage: the log clause is next
#[derive(Debug)]
pub struct Logging;
/// Builder stage: protocol, port and verdict are next
#[derive(Debug)]
pub struct Verdict;

/// Typed builder for one rule line
#[derive(Debug)]
pub struct RuleLineBuilder<Stage> {
    clauses: Vec<String>,
    stage: PhantomData<Stage>,
}

impl Default for RuleLineBuilder<Interfaces> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Stage> RuleLineBuilder<Stage> {
    fn advance<Next>(self) -> RuleLineBuilder<Next> {
        RuleLineBuilder {
            clauses: self.clauses,
            stage: PhantomData,
        }
    }
}

impl RuleLineBuilder<Interfaces> {
    pub fn new() -> Self {
        Self {
            clauses: Vec::new(),
            stage: PhantomData,
        }
    }

    /// `iifname "x"` / `oifname "x"`; the `any` sentinel emits nothing.
    pub fn interfaces(mut self, direction: &Direction) -> RuleLineBuilder<Addresses> {
        if let Some(name) = direction.iiface().and_then(|i| i.name()) {
            self.clauses.push(format!("iifname \"{name}\""));
        }
        if let Some(name) = direction.oiface().and_then(|i| i.name()) {
            self.clauses.push(format!("oifname \"{name}\""));
        }
        self.advance()
    }
}

impl RuleLineBuilder<Addresses> {
    pub fn addresses(
        mut self,
        version: IpVersion,
        source: &AddressMatch,
        destination: &AddressMatch,
    ) -> RuleLineBuilder<Logging> {
        let family = version.family();
        for (selector, address) in [("saddr", source), ("daddr", destination)] {
            match address {
                AddressMatch::Any => {}
                AddressMatch::Set(name) => {
                    self.clauses.push(format!("{family} {selector} @{name}"));
                }
                AddressMatch::List(networks) => {
                    self.clauses.push(format!(
                        "{family} {selector} {{ {} }}",
                        join(networks.iter().map(render_network))
                    ));
                }
            }
        }
        self.advance()
    }
}

impl RuleLineBuilder<Logging> {
    pub fn log(mut self, prefix: Option<&str>) -> RuleLineBuilder<Verdict> {
        if let Some(prefix) = prefix {
            self.clauses
                .push(format!("log prefix \"{prefix}\" level debug"));
        }
        self.advance()
    }
}

impl RuleLineBuilder<Verdict> {
    /// Appends the protocol/port/verdict clause and finishes the line.
    pub fn verdict(
        mut self,
        version: IpVersion,
        protocol: Protocol,
        ports: &PortMatch,
        action: Action,
    ) -> RuleLine {
        let kind = match protocol {
            Protocol::Any => {
                self.clauses.push(action.to_string());
                None
            }
            Protocol::Icmp if version == IpVersion::V6 => Some(ApplicationKind::Icmp6),
            Protocol::Icmp => Some(ApplicationKind::Icmp),
            Protocol::Dns => Some(ApplicationKind::Dns),
            Protocol::Vpn => Some(ApplicationKind::Vpn),
            Protocol::Tcp | Protocol::Udp => {
                let clause = match ports {
                    PortMatch::Set(name) => format!("{protocol} dport @{name} {action}"),
                    PortMatch::List(entries) if entries.is_empty() => {
                        format!("meta l4proto {protocol} {action}")
                    }
                    PortMatch::List(entries) => format!(
                        "{protocol} dport {{ {} }} {action}",
                        join(entries.iter().map(ToString::to_string))
                    ),
                };
                self.clauses.push(clause);
                None
            }
        };

        let application = kind.map(|kind| Application::new(kind, action));
        if let Some(application) = application {
            self.clauses.push(format!("jump {application}"));
        }

        RuleLine {
            text: self.clauses.join(" "),
            application,
        }
    }
}

/// Host networks are written as bare addresses.
pub fn render_network(network: &IpNetwork) -> String {
    let host_prefix = match network {
        IpNetwork::V4(_) => 32,
        IpNetwork::V6(_) => 128,
    };
    if network.prefix() == host_prefix {
        network.ip().to_string()
    } else {
        network.to_string()
    }
}

fn join(items: impl Iterator<Item = String>) -> String {
    items.collect::<Vec<_>>().join(", ")
}

/// Renders one rule.
///
/// `log_prefix` is the prefix used when the rule has `log: true`.
pub fn compile_rule(rule: &Rule, log_prefix: &str) -> RuleLine {
    RuleLineBuilder::new()
        .interfaces(&rule.direction)
        .addresses(rule.version, &rule.source, &rule.destination)
        .log(rule.log.then_some(log_prefix))
        .verdict(rule.version, rule.protocol, &rule.ports, rule.action)
}

/// Rendered filter chains plus every jump chain they need
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompiledRules {
    pub input: Vec<String>,
    pub forward: Vec<String>,
    pub output: Vec<String>,
    /// Deduplicated and sorted, so declaration order is deterministic
    pub applications: BTreeSet<Application>,
}

impl CompiledRules {
    pub fn chain(&self, chain: FilterChain) -> &[String] {
        match chain {
            FilterChain::Input => &self.input,
            FilterChain::Forward => &self.forward,
            FilterChain::Output => &self.output,
        }
    }
}

/// Renders every classified rule, chain by chain.
pub fn compile_rules(classified: &ClassifiedRules<'_>, log_prefix: &str) -> CompiledRules {
    let mut compiled = CompiledRules::default();

    let mut render = |rules: &[&Rule]| -> Vec<String> {
        rules
            .iter()
            .map(|rule| {
                let line = compile_rule(rule, log_prefix);
                if let Some(application) = line.application {
                    compiled.applications.insert(application);
                }
                line.text
            })
            .collect()
    };

    let input = render(&classified.input);
    let forward = render(&classified.forward);
    let output = render(&classified.output);

    compiled.input = input;
    compiled.forward = forward;
    compiled.output = output;
    compiled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::policy::{Interface, PortEntry};

    fn input(name: &str) -> Direction {
        Direction::Input {
            iiface: Interface::Named(name.into()),
        }
    }

    #[test]
    fn test_builder_clause_order() {
        let line = RuleLineBuilder::new()
            .interfaces(&Direction::Forward {
                iiface: Interface::Named("ext0".into()),
                oiface: Interface::Named("int0".into()),
            })
            .addresses(
                IpVersion::V4,
                &AddressMatch::Set("trusted".into()),
                &AddressMatch::List(vec!["10.0.0.0/24".parse().unwrap()]),
            )
            .log(Some("Namespace_ns_Table_t"))
            .verdict(
                IpVersion::V4,
                Protocol::Tcp,
                &PortMatch::List(vec![PortEntry::Single(22), PortEntry::Range(80, 90)]),
                Action::Accept,
            );

        assert_eq!(
            line.text,
            "iifname \"ext0\" oifname \"int0\" ip saddr @trusted ip daddr { 10.0.0.0/24 } \
             log prefix \"Namespace_ns_Table_t\" level debug tcp dport { 22, 80-90 } accept"
        );
        assert!(line.application.is_none());
    }

    #[test]
    fn test_any_interface_emits_nothing() {
        let line = RuleLineBuilder::new()
            .interfaces(&Direction::Output {
                oiface: Interface::Any,
            })
            .addresses(IpVersion::V4, &AddressMatch::Any, &AddressMatch::Any)
            .log(None)
            .verdict(IpVersion::V4, Protocol::Any, &PortMatch::List(vec![]), Action::Drop);
        assert_eq!(line.text, "drop");
    }

    #[test]
    fn test_ipv6_family_and_host_rendering() {
        let line = RuleLineBuilder::new()
            .interfaces(&input("ext0"))
            .addresses(
                IpVersion::V6,
                &AddressMatch::List(vec!["2001:db8::1".parse().unwrap()]),
                &AddressMatch::Any,
            )
            .log(None)
            .verdict(IpVersion::V6, Protocol::Udp, &PortMatch::Set("dns".into()), Action::Accept);
        assert_eq!(
            line.text,
            "iifname \"ext0\" ip6 saddr { 2001:db8::1 } udp dport @dns accept"
        );
    }

    #[test]
    fn test_application_jumps() {
        let cases = [
            (IpVersion::V4, Protocol::Icmp, Action::Drop, "icmp_drop"),
            (IpVersion::V6, Protocol::Icmp, Action::Accept, "icmp6_accept"),
            (IpVersion::V4, Protocol::Dns, Action::Accept, "dns_accept"),
            (IpVersion::V6, Protocol::Vpn, Action::Drop, "vpn_drop"),
        ];

        for (version, protocol, action, chain) in cases {
            let line = RuleLineBuilder::new()
                .interfaces(&input("ext0"))
                .addresses(version, &AddressMatch::Any, &AddressMatch::Any)
                .log(None)
                .verdict(version, protocol, &PortMatch::List(vec![]), action);
            assert_eq!(line.text, format!("iifname \"ext0\" jump {chain}"));
            assert_eq!(line.application.map(|a| a.chain_name()), Some(chain.to_string()));
        }
    }

    #[test]
    fn test_empty_port_list_matches_protocol() {
        let line = RuleLineBuilder::new()
            .interfaces(&input("ext0"))
            .addresses(IpVersion::V4, &AddressMatch::Any, &AddressMatch::Any)
            .log(None)
            .verdict(IpVersion::V4, Protocol::Udp, &PortMatch::List(vec![]), Action::Accept);
        assert_eq!(line.text, "iifname \"ext0\" meta l4proto udp accept");
    }

    #[test]
    fn test_application_bodies() {
        let dns = Application::new(ApplicationKind::Dns, Action::Accept).body();
        assert_eq!(dns, vec!["udp dport 53 accept", "tcp dport 53 accept"]);

        let icmp6 = Application::new(ApplicationKind::Icmp6, Action::Drop).body();
        assert!(icmp6[0].starts_with("icmpv6 type {"));
        assert!(icmp6[0].ends_with("} drop"));
    }

    #[test]
    fn test_render_network() {
        assert_eq!(render_network(&"10.0.0.2".parse().unwrap()), "10.0.0.2");
        assert_eq!(render_network(&"10.0.0.0/8".parse().unwrap()), "10.0.0.0/8");
        assert_eq!(render_network(&"2001:db8::/32".parse().unwrap()), "2001:db8::/32");
    }
}
