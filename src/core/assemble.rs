//! Assembly of the complete table document
//!
//! Combines set declarations, jump chains, filter chains and NAT chains into
//! one `table inet <name> { ... }` document. The document is self-contained:
//! every `@set` and every `jump` target it mentions is declared inside it.

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt::Write;
use strum::IntoEnumIterator;
use tracing::debug;

use crate::core::classify::classify;
use crate::core::compile::{CompiledRules, compile_rules, render_network};
use crate::core::error::{Error, Result};
use crate::core::nat::{CompiledNat, compile_nat};
use crate::core::policy::{FilterChain, NamedSet, Policy, PolicySpec, SetElement, Target};
use crate::validators::{validate_policy, validate_target};

/// A rendered table document ready for deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    table: String,
    text: String,
    checksum: String,
}

impl Document {
    pub(crate) fn new(table: &str, text: String) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let checksum = format!("{:x}", hasher.finalize());
        Self {
            table: table.to_string(),
            text,
            checksum,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// SHA-256 of the document text, hex encoded
    pub fn checksum(&self) -> &str {
        &self.checksum
    }
}

impl std::fmt::Display for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

fn render_element(element: &SetElement) -> String {
    match element {
        SetElement::Network(network) => render_network(network),
        SetElement::Port(port) => port.to_string(),
        SetElement::Mac(mac) => mac.clone(),
    }
}

fn write_set(out: &mut String, set: &NamedSet) {
    let elements: Vec<String> = set.elements.iter().map(render_element).collect();

    let _ = writeln!(out, "    set {} {{", set.name);
    let _ = writeln!(out, "        type {}", set.set_type);
    if set.set_type.supports_intervals() {
        let _ = writeln!(out, "        flags interval");
        let _ = writeln!(out, "        auto-merge");
    }
    let _ = writeln!(out, "        elements = {{ {} }}", elements.join(", "));
    let _ = writeln!(out, "    }}\n");
}

fn write_chain(out: &mut String, name: &str, header: Option<&str>, lines: &[String]) {
    let _ = writeln!(out, "    chain {name} {{");
    if let Some(header) = header {
        let _ = writeln!(out, "        {header}");
    }
    for line in lines {
        let _ = writeln!(out, "        {line}");
    }
    let _ = writeln!(out, "    }}\n");
}

/// Checks that every `@set` a rule uses is declared in the policy.
fn check_set_references(policy: &Policy) -> Result<()> {
    let declared: HashSet<&str> = policy.sets.iter().map(|s| s.name.as_str()).collect();
    let missing: Vec<&str> = policy
        .rules
        .iter()
        .flat_map(|rule| rule.set_references())
        .map(|(name, _)| name)
        .filter(|name| !declared.contains(name))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::Assembly(format!(
            "rules reference undeclared sets: {}",
            missing.join(", ")
        )))
    }
}

fn render(policy: &Policy, target: &Target, rules: &CompiledRules, nat: &CompiledNat) -> String {
    let priority = target.priority;
    let mut out = String::new();

    let _ = writeln!(out, "table inet {} {{", target.table);

    for set in &policy.sets {
        write_set(&mut out, set);
    }

    for application in &rules.applications {
        write_chain(&mut out, &application.chain_name(), None, &application.body());
    }

    if !nat.prerouting.is_empty() {
        write_chain(
            &mut out,
            "prerouting",
            Some(&format!(
                "type nat hook prerouting priority {priority}; policy accept;"
            )),
            &nat.prerouting,
        );
    }

    for chain in FilterChain::iter() {
        write_chain(
            &mut out,
            chain.as_ref(),
            Some(&format!(
                "type filter hook {chain} priority {priority}; policy {};",
                policy.policies.get(chain)
            )),
            rules.chain(chain),
        );
    }

    if !nat.postrouting.is_empty() {
        write_chain(
            &mut out,
            "postrouting",
            Some(&format!(
                "type nat hook postrouting priority {priority}; policy accept;"
            )),
            &nat.postrouting,
        );
    }

    let _ = writeln!(out, "}}");
    out
}

/// Assembles a validated policy into the document for `target`.
///
/// # Errors
///
/// Returns [`Error::Assembly`] if the target identifiers are invalid or a
/// rule references a set the policy does not declare. No partial document
/// is ever returned.
pub fn assemble(policy: &Policy, target: &Target) -> Result<Document> {
    validate_target(target).map_err(|errors| Error::Assembly(errors.join("; ")))?;
    check_set_references(policy)?;

    let classified = classify(&policy.rules);
    let rules = compile_rules(&classified, &target.log_prefix());
    let nat = compile_nat(&policy.nats);

    let document = Document::new(&target.table, render(policy, target, &rules, &nat));

    debug!(
        table = %target.table,
        namespace = %target.namespace,
        rules = classified.len(),
        applications = rules.applications.len(),
        checksum = %document.checksum(),
        "Assembled document:\n{}",
        document.as_str()
    );

    Ok(document)
}

/// Validates untyped policy input and assembles it in one step.
///
/// # Errors
///
/// Returns [`Error::Validation`] with every defect found, or an assembly error.
pub fn build_document(spec: &PolicySpec, target: &Target) -> Result<Document> {
    let policy = validate_policy(spec)?;
    assemble(&policy, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::policy::{
        Action, AddressMatch, Direction, Interface, IpVersion, PortEntry, PortMatch, Protocol,
        Rule, SetType,
    };

    fn icmp_rule(action: Action) -> Rule {
        Rule {
            version: IpVersion::V4,
            source: AddressMatch::Any,
            destination: AddressMatch::Any,
            protocol: Protocol::Icmp,
            ports: PortMatch::List(vec![]),
            action,
            log: false,
            direction: Direction::Input {
                iiface: Interface::Named("ext0".into()),
            },
            order: 0,
        }
    }

    #[test]
    fn test_empty_policy_has_base_chains() {
        let document = assemble(&Policy::default(), &Target::new("ns1", "fw", -10)).unwrap();
        let text = document.as_str();

        assert!(text.starts_with("table inet fw {"));
        assert!(text.contains("type filter hook input priority -10; policy drop;"));
        assert!(text.contains("type filter hook forward priority -10; policy drop;"));
        assert!(text.contains("type filter hook output priority -10; policy drop;"));
        assert!(!text.contains("prerouting"));
        assert!(!text.contains("postrouting"));
        assert!(text.trim_end().ends_with('}'));
    }

    #[test]
    fn test_set_declaration() {
        let policy = Policy {
            sets: vec![NamedSet {
                name: "web".into(),
                set_type: SetType::InetService,
                elements: vec![
                    SetElement::Port(PortEntry::Single(80)),
                    SetElement::Port(PortEntry::Range(8000, 8080)),
                ],
            }],
            ..Policy::default()
        };
        let document = assemble(&policy, &Target::new("ns1", "fw", 0)).unwrap();
        assert!(document.as_str().contains(
            "    set web {\n        type inet_service\n        flags interval\n        auto-merge\n        elements = { 80, 8000-8080 }\n    }"
        ));
    }

    #[test]
    fn test_mac_set_has_no_interval_flag() {
        let policy = Policy {
            sets: vec![NamedSet {
                name: "macs".into(),
                set_type: SetType::EtherAddr,
                elements: vec![SetElement::Mac("aa:bb:cc:dd:ee:ff".into())],
            }],
            ..Policy::default()
        };
        let document = assemble(&policy, &Target::new("ns1", "fw", 0)).unwrap();
        assert!(!document.as_str().contains("flags interval"));
    }

    #[test]
    fn test_application_chains_declared_once() {
        let policy = Policy {
            rules: (0..5).map(|_| icmp_rule(Action::Drop)).collect(),
            ..Policy::default()
        };
        let document = assemble(&policy, &Target::new("ns1", "fw", 0)).unwrap();
        assert_eq!(document.as_str().matches("chain icmp_drop {").count(), 1);
        assert_eq!(document.as_str().matches("jump icmp_drop").count(), 5);
    }

    #[test]
    fn test_undeclared_set_fails() {
        let mut rule = icmp_rule(Action::Accept);
        rule.source = AddressMatch::Set("ghost".into());
        let policy = Policy {
            rules: vec![rule],
            ..Policy::default()
        };
        let err = assemble(&policy, &Target::new("ns1", "fw", 0)).unwrap_err();
        assert!(matches!(err, Error::Assembly(ref m) if m.contains("ghost")));
    }

    #[test]
    fn test_invalid_target_fails() {
        let err = assemble(&Policy::default(), &Target::new("ns 1", "fw", 0)).unwrap_err();
        assert!(matches!(err, Error::Assembly(_)));
    }

    #[test]
    fn test_checksum_is_stable() {
        let target = Target::new("ns1", "fw", 0);
        let a = assemble(&Policy::default(), &target).unwrap();
        let b = assemble(&Policy::default(), &target).unwrap();
        assert_eq!(a.checksum(), b.checksum());
        assert_eq!(a.checksum().len(), 64);
    }
}
