//! Input validation for policy objects
//!
//! Each object validator takes one untyped JSON value and returns either the
//! typed record or every error message found in it. Validators never stop at
//! the first defect, so one run reports everything wrong with an object.
//!
//! [`validate_policy`] runs the object validators over a whole batch and then
//! the batch-level checks (set name uniqueness, rule to set references).

use ipnetwork::{IpNetwork, Ipv4Network};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::debug;

use crate::core::error::{IssueKind, ValidationIssue, ValidationReport};
use crate::core::policy::{
    Action, AddressMatch, Direction, Interface, IpVersion, NamedSet, NatDirection, NatMapping,
    Policy, PolicySpec, PortEntry, PortMatch, Protocol, Rule, SetElement, SetType, Target,
};

/// Sentinel matching every address (or every interface)
pub const ANY: &str = "any";

/// Prefix marking a reference to a named set
pub const SET_REF_PREFIX: char = '@';

/// Interface values treated as "not attached"
const UNSET_INTERFACE: [&str; 2] = ["", "none"];

static MAC_ADDRESS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^([0-9A-Fa-f]{2}[:-]){5}[0-9A-Fa-f]{2}$").ok());

/// Validates a single port number.
///
/// # Errors
///
/// Returns `Err` if port is 0 (reserved).
pub fn validate_port(port: u16) -> Result<u16, String> {
    if port == 0 {
        Err("Port must be between 1 and 65535".to_string())
    } else {
        Ok(port)
    }
}

/// Validates a port range.
///
/// # Errors
///
/// Returns `Err` if:
/// - Either port is 0
/// - Start port is greater than end port
pub fn validate_port_range(start: u16, end: u16) -> Result<(u16, u16), String> {
    validate_port(start)?;
    validate_port(end)?;

    if start > end {
        Err(format!("Port range {start}-{end} starts after it ends"))
    } else {
        Ok((start, end))
    }
}

fn parse_port_number(raw: &str) -> Result<u16, String> {
    let port = raw
        .trim()
        .parse::<u16>()
        .map_err(|_| format!("\"{raw}\" is not a port number between 1 and 65535"))?;
    validate_port(port)
}

/// Parses `"22"` or `"8000-8080"`.
///
/// # Errors
///
/// Returns `Err` for anything else, including ranges with more than two parts.
pub fn parse_port_entry(raw: &str) -> Result<PortEntry, String> {
    let parts: Vec<&str> = raw.split('-').collect();
    match parts.as_slice() {
        [single] => parse_port_number(single).map(PortEntry::Single),
        [start, end] => {
            let (start, end) = validate_port_range(parse_port_number(start)?, parse_port_number(end)?)?;
            Ok(PortEntry::Range(start, end))
        }
        _ => Err(format!("\"{raw}\" is not a port or a two-part port range")),
    }
}

/// Integer value of a JSON number, accepting integral floats such as `4.0`.
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn integral(n: &serde_json::Number) -> Option<i64> {
    n.as_i64().or_else(|| {
        n.as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
            .map(|f| f as i64)
    })
}

fn port_entry_from_value(value: &Value) -> Result<PortEntry, String> {
    match value {
        Value::String(raw) => parse_port_entry(raw),
        Value::Number(n) => integral(n)
            .and_then(|n| u16::try_from(n).ok())
            .ok_or_else(|| format!("{n} is not a port number between 1 and 65535"))
            .and_then(validate_port)
            .map(PortEntry::Single),
        other => Err(format!("{other} is not a port or port range")),
    }
}

/// Validates a network interface name.
///
/// Linux kernel interface name rules:
/// - Max 15 characters (IFNAMSIZ - 1)
/// - Alphanumeric, dot, dash, underscore only
/// - Cannot be "." or ".."
///
/// # Errors
///
/// Returns `Err` if interface name violates kernel constraints.
pub fn validate_interface(name: &str) -> Result<String, String> {
    if name.chars().any(char::is_whitespace) {
        return Err(format!("Interface name \"{name}\" must not contain whitespace"));
    }

    if name.len() > 15 {
        return Err(format!("Interface name \"{name}\" is too long (max 15 characters)"));
    }

    if name.is_empty() || name == "." || name == ".." {
        return Err(format!("Invalid interface name \"{name}\""));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err(format!("Interface name \"{name}\" contains invalid characters"));
    }

    Ok(name.to_string())
}

/// Validates a set, namespace or table name.
///
/// These names are interpolated into nftables syntax and remote shell
/// commands, so only `[A-Za-z0-9_.-]` is accepted.
///
/// # Errors
///
/// Returns `Err` if the name is empty, contains whitespace or any other character.
pub fn validate_identifier(kind: &str, name: &str) -> Result<String, String> {
    if name.is_empty() {
        return Err(format!("{kind} must not be empty"));
    }

    if name.chars().any(char::is_whitespace) {
        return Err(format!("{kind} \"{name}\" must not contain whitespace"));
    }

    if name.len() > 64 {
        return Err(format!("{kind} \"{name}\" is too long (max 64 characters)"));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err(format!("{kind} \"{name}\" contains invalid characters"));
    }

    Ok(name.to_string())
}

/// Validates the namespace and table a document is built for.
///
/// # Errors
///
/// Returns every problem with either identifier.
pub fn validate_target(target: &Target) -> Result<(), Vec<String>> {
    let errors: Vec<String> = [
        validate_identifier("namespace", &target.namespace),
        validate_identifier("table", &target.table),
    ]
    .into_iter()
    .filter_map(Result::err)
    .collect();

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Parses an address or network, rejecting host bits outside the prefix.
///
/// `10.0.0.5` is accepted as a /32; `10.0.0.5/24` is rejected.
///
/// # Errors
///
/// Returns `Err` if the text is not an address/network or has host bits set.
pub fn parse_network(raw: &str) -> Result<IpNetwork, String> {
    let network = IpNetwork::from_str(raw.trim())
        .map_err(|_| format!("\"{raw}\" is not a valid IP address or network"))?;

    if network.ip() != network.network() {
        return Err(format!(
            "\"{raw}\" has host bits set, did you mean {}/{}?",
            network.network(),
            network.prefix()
        ));
    }

    Ok(network)
}

fn is_rfc1918_address(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    octets[0] == 10
        || (octets[0] == 172 && (16..=31).contains(&octets[1]))
        || (octets[0] == 192 && octets[1] == 168)
}

/// Whether the whole network lies inside RFC 1918 private space.
pub fn is_rfc1918(network: &Ipv4Network) -> bool {
    is_rfc1918_address(network.network()) && is_rfc1918_address(network.broadcast())
}

/// Whether the MAC is six octets separated by `:` or `-`.
pub fn is_mac_address(raw: &str) -> bool {
    MAC_ADDRESS.as_ref().is_some_and(|re| re.is_match(raw))
}

fn version_label(version: IpVersion) -> &'static str {
    match version {
        IpVersion::V4 => "IPv4",
        IpVersion::V6 => "IPv6",
    }
}

fn as_object<'a>(kind: &str, value: &'a Value) -> Result<&'a Map<String, Value>, Vec<String>> {
    value
        .as_object()
        .ok_or_else(|| vec![format!("{kind} must be an object, got {value}")])
}

/// Looks up a required string field.
fn required_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<&'a str, String> {
    match obj.get(key) {
        None | Some(Value::Null) => Err(format!("`{key}` is required")),
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(format!("`{key}` must be a string, got {other}")),
    }
}

/// Looks up a required list field.
fn required_list<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<&'a Vec<Value>, String> {
    match obj.get(key) {
        None | Some(Value::Null) => Err(format!("`{key}` is required")),
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(format!("`{key}` must be a list, got {other}")),
    }
}

fn parse_version(value: Option<&Value>) -> Result<IpVersion, String> {
    let version = match value {
        None | Some(Value::Null) => return Err("`version` is required".to_string()),
        Some(Value::Number(n)) => integral(n),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    };

    match version {
        Some(4) => Ok(IpVersion::V4),
        Some(6) => Ok(IpVersion::V6),
        _ => Err(format!(
            "`version` must be 4 or 6, got {}",
            value.map_or_else(String::new, ToString::to_string)
        )),
    }
}

/// Splits the singular-use forms (`any`, `@set`) from inline entries.
///
/// Returns `Ok(None)` when the list holds only ordinary entries.
fn singular_entry<'a>(field: &str, items: &'a [Value]) -> Result<Option<&'a str>, String> {
    let special = items.iter().any(|item| {
        item.as_str()
            .is_some_and(|s| s == ANY || s.starts_with(SET_REF_PREFIX))
    });

    if !special {
        return Ok(None);
    }

    if items.len() != 1 {
        return Err(format!(
            "`{field}`: when `any` or `@set` is used only one item is allowed per list"
        ));
    }

    Ok(items.first().and_then(Value::as_str))
}

fn parse_set_ref(field: &str, raw: &str) -> Result<String, String> {
    let name = raw.strip_prefix(SET_REF_PREFIX).unwrap_or(raw);
    validate_identifier(&format!("`{field}` set reference"), name)
}

fn parse_address_match(
    obj: &Map<String, Value>,
    field: &str,
    version: Option<IpVersion>,
) -> Result<AddressMatch, Vec<String>> {
    let items = required_list(obj, field).map_err(|e| vec![e])?;

    if items.is_empty() {
        return Err(vec![format!("`{field}` must not be empty")]);
    }

    match singular_entry(field, items).map_err(|e| vec![e])? {
        Some(ANY) => return Ok(AddressMatch::Any),
        Some(raw) => return parse_set_ref(field, raw).map(AddressMatch::Set).map_err(|e| vec![e]),
        None => {}
    }

    let mut networks = Vec::with_capacity(items.len());
    let mut errors = Vec::new();

    for item in items {
        let Some(raw) = item.as_str() else {
            errors.push(format!("`{field}`: {item} is not an address string"));
            continue;
        };

        match parse_network(raw) {
            Ok(network) => match version {
                Some(expected) if IpVersion::of(&network) != expected => errors.push(format!(
                    "IP version mismatch in `{field}`: \"{raw}\" is {} but the rule is {}",
                    version_label(IpVersion::of(&network)),
                    version_label(expected)
                )),
                _ => networks.push(network),
            },
            Err(e) => errors.push(format!("`{field}`: {e}")),
        }
    }

    if errors.is_empty() {
        Ok(AddressMatch::List(networks))
    } else {
        Err(errors)
    }
}

fn parse_port_match(obj: &Map<String, Value>) -> Result<PortMatch, Vec<String>> {
    let items = match obj.get("port") {
        None | Some(Value::Null) => return Ok(PortMatch::List(Vec::new())),
        Some(Value::Array(items)) => items,
        Some(other) => return Err(vec![format!("`port` must be a list, got {other}")]),
    };

    let set_ref = items
        .iter()
        .any(|item| item.as_str().is_some_and(|s| s.starts_with(SET_REF_PREFIX)));

    if set_ref {
        if items.len() != 1 {
            return Err(vec![
                "`port`: when `@set` is used only one item is allowed per list".to_string(),
            ]);
        }
        let raw = items.first().and_then(Value::as_str).unwrap_or_default();
        return parse_set_ref("port", raw)
            .map(PortMatch::Set)
            .map_err(|e| vec![e]);
    }

    let mut entries = Vec::with_capacity(items.len());
    let mut errors = Vec::new();
    for item in items {
        match port_entry_from_value(item) {
            Ok(entry) => entries.push(entry),
            Err(e) => errors.push(format!("`port`: {e}")),
        }
    }

    if errors.is_empty() {
        Ok(PortMatch::List(entries))
    } else {
        Err(errors)
    }
}

/// `None` means the rule is not attached on that side.
fn parse_interface(obj: &Map<String, Value>, field: &str) -> Result<Option<Interface>, String> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if UNSET_INTERFACE.contains(&s.as_str()) => Ok(None),
        Some(Value::String(s)) if s == ANY => Ok(Some(Interface::Any)),
        Some(Value::String(s)) => validate_interface(s)
            .map(|name| Some(Interface::Named(name)))
            .map_err(|e| format!("`{field}`: {e}")),
        Some(other) => Err(format!("`{field}` must be a string or null, got {other}")),
    }
}

fn parse_direction(obj: &Map<String, Value>) -> Result<Direction, Vec<String>> {
    let iiface = parse_interface(obj, "iiface");
    let oiface = parse_interface(obj, "oiface");

    match (iiface, oiface) {
        (Ok(Some(iiface)), Ok(None)) => Ok(Direction::Input { iiface }),
        (Ok(None), Ok(Some(oiface))) => Ok(Direction::Output { oiface }),
        (Ok(Some(iiface)), Ok(Some(oiface))) => Ok(Direction::Forward { iiface, oiface }),
        (Ok(None), Ok(None)) => Err(vec![format!(
            "Invalid rule type: iiface:{};oiface:{}, at least one interface must be set",
            obj.get("iiface").unwrap_or(&Value::Null),
            obj.get("oiface").unwrap_or(&Value::Null)
        )]),
        (i, o) => Err([i.err(), o.err()].into_iter().flatten().collect()),
    }
}

/// Validates one untyped rule object.
///
/// # Errors
///
/// Returns every defect found in the rule.
pub fn validate_rule(value: &Value) -> Result<Rule, Vec<String>> {
    let obj = as_object("rule", value)?;
    let mut errors = Vec::new();

    let action = required_str(obj, "action").and_then(|s| {
        Action::from_str(s).map_err(|_| format!("`action` must be accept or drop, got \"{s}\""))
    });

    let version = parse_version(obj.get("version"));

    let protocol = required_str(obj, "protocol").and_then(|s| {
        Protocol::from_str(s).map_err(|_| {
            format!("`protocol` must be one of any, tcp, udp, icmp, dns, vpn, got \"{s}\"")
        })
    });

    let known_version = version.as_ref().ok().copied();
    let source = parse_address_match(obj, "source", known_version);
    let destination = parse_address_match(obj, "destination", known_version);
    let ports = parse_port_match(obj);
    let direction = parse_direction(obj);

    let log = match obj.get("log") {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(format!("`log` must be true or false, got {other}")),
    };

    let order = match obj.get("order") {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => {
            integral(n).ok_or_else(|| format!("`order` must be an integer, got {n}"))
        }
        Some(other) => Err(format!("`order` must be an integer, got {other}")),
    };

    let action = action.map_err(|e| errors.push(e)).ok();
    let version = version.map_err(|e| errors.push(e)).ok();
    let protocol = protocol.map_err(|e| errors.push(e)).ok();
    let source = source.map_err(|e| errors.extend(e)).ok();
    let destination = destination.map_err(|e| errors.extend(e)).ok();
    let ports = ports.map_err(|e| errors.extend(e)).ok();
    let direction = direction.map_err(|e| errors.extend(e)).ok();
    let log = log.map_err(|e| errors.push(e)).ok();
    let order = order.map_err(|e| errors.push(e)).ok();

    match (action, version, protocol, source, destination, ports, direction, log, order) {
        (
            Some(action),
            Some(version),
            Some(protocol),
            Some(source),
            Some(destination),
            Some(ports),
            Some(direction),
            Some(log),
            Some(order),
        ) if errors.is_empty() => Ok(Rule {
            version,
            source,
            destination,
            protocol,
            ports,
            action,
            log,
            direction,
            order,
        }),
        _ => Err(errors),
    }
}

fn parse_set_element(set_type: SetType, item: &Value) -> Result<SetElement, String> {
    match set_type {
        SetType::Ipv4Addr | SetType::Ipv6Addr => {
            let raw = item
                .as_str()
                .ok_or_else(|| format!("{item} is not an address string"))?;
            let network = parse_network(raw)?;
            let expected = if set_type == SetType::Ipv4Addr {
                IpVersion::V4
            } else {
                IpVersion::V6
            };
            if IpVersion::of(&network) != expected {
                return Err(format!(
                    "IP version mismatch: \"{raw}\" is {} but set type is {set_type}",
                    version_label(IpVersion::of(&network))
                ));
            }
            Ok(SetElement::Network(network))
        }
        SetType::InetService => port_entry_from_value(item).map(SetElement::Port),
        SetType::EtherAddr => {
            let raw = item
                .as_str()
                .ok_or_else(|| format!("{item} is not a MAC address string"))?;
            if is_mac_address(raw) {
                Ok(SetElement::Mac(raw.replace('-', ":").to_lowercase()))
            } else {
                Err(format!("\"{raw}\" is not a valid MAC address"))
            }
        }
    }
}

/// Validates one untyped set object.
///
/// # Errors
///
/// Returns every defect found in the set, one message per bad element.
pub fn validate_set(value: &Value) -> Result<NamedSet, Vec<String>> {
    let obj = as_object("set", value)?;
    let mut errors = Vec::new();

    let name = required_str(obj, "name")
        .and_then(|s| validate_identifier("set name", s))
        .map_err(|e| errors.push(e))
        .ok();

    let set_type = required_str(obj, "type")
        .and_then(|s| {
            SetType::from_str(s).map_err(|_| {
                format!(
                    "`type` must be one of ipv4_addr, ipv6_addr, inet_service, ether_addr, got \"{s}\""
                )
            })
        })
        .map_err(|e| errors.push(e))
        .ok();

    let items = match required_list(obj, "elements") {
        Ok(items) if items.is_empty() => {
            errors.push("`elements` must not be empty".to_string());
            None
        }
        Ok(items) => Some(items),
        Err(e) => {
            errors.push(e);
            None
        }
    };

    let mut elements = Vec::new();
    if let (Some(set_type), Some(items)) = (set_type, items) {
        for item in items {
            match parse_set_element(set_type, item) {
                Ok(element) => elements.push(element),
                Err(e) => errors.push(format!("`elements`: {e}")),
            }
        }
    }

    match (name, set_type) {
        (Some(name), Some(set_type)) if errors.is_empty() => Ok(NamedSet {
            name,
            set_type,
            elements,
        }),
        _ => Err(errors),
    }
}

fn parse_nat_network(obj: &Map<String, Value>, field: &str) -> Result<Ipv4Network, String> {
    let raw = required_str(obj, field)?;
    match parse_network(raw).map_err(|e| format!("`{field}`: {e}"))? {
        IpNetwork::V4(network) => Ok(network),
        IpNetwork::V6(_) => Err(format!(
            "IP version mismatch in `{field}`: \"{raw}\" is IPv6, NAT mappings are IPv4 only"
        )),
    }
}

/// Validates one untyped NAT mapping.
///
/// # Errors
///
/// Returns every defect found in the mapping. A wrong IP version is reported
/// separately from an address in the wrong space.
pub fn validate_nat(value: &Value) -> Result<NatMapping, Vec<String>> {
    let obj = as_object("nat", value)?;
    let mut errors = Vec::new();

    let direction = required_str(obj, "direction")
        .and_then(|s| {
            NatDirection::from_str(s).map_err(|_| {
                format!("`direction` must be dnat, snat, destination-nat or source-nat, got \"{s}\"")
            })
        })
        .map_err(|e| errors.push(e))
        .ok();

    let public = match parse_nat_network(obj, "public") {
        Ok(network) if is_rfc1918(&network) => {
            errors.push(format!(
                "`public`: {network} is in private (RFC 1918) address space"
            ));
            None
        }
        Ok(network) => Some(network),
        Err(e) => {
            errors.push(e);
            None
        }
    };

    let private = match parse_nat_network(obj, "private") {
        Ok(network) if !is_rfc1918(&network) => {
            errors.push(format!(
                "`private`: {network} is not in private (RFC 1918) address space"
            ));
            None
        }
        Ok(network) => Some(network),
        Err(e) => {
            errors.push(e);
            None
        }
    };

    let iface = match obj.get("iface") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => validate_interface(s)
            .map_err(|e| errors.push(format!("`iface`: {e}")))
            .ok(),
        Some(other) => {
            errors.push(format!("`iface` must be a string or null, got {other}"));
            None
        }
    };

    match (direction, public, private) {
        (Some(direction), Some(public), Some(private)) if errors.is_empty() => Ok(NatMapping {
            direction,
            public,
            private,
            iface,
        }),
        _ => Err(errors),
    }
}

/// Checks set name uniqueness and that every rule's set references resolve
/// to a set of the right type.
fn check_references(rules: &[Rule], sets: &[NamedSet], report: &mut ValidationReport) {
    let mut by_name: HashMap<&str, &NamedSet> = HashMap::new();
    for set in sets {
        if by_name.insert(set.name.as_str(), set).is_some() {
            report.push(ValidationIssue::new(
                format!("set \"{}\"", set.name),
                IssueKind::Duplicate,
                format!("set name \"{}\" is declared more than once", set.name),
            ));
        }
    }

    for (index, rule) in rules.iter().enumerate() {
        for (name, required) in rule.set_references() {
            let subject = format!("rule[{index}]");
            match by_name.get(name) {
                None => report.push(ValidationIssue::new(
                    subject,
                    IssueKind::CrossReference,
                    format!("{name} not found in the supplied sets"),
                )),
                Some(set) if set.set_type != required => report.push(ValidationIssue::new(
                    subject,
                    IssueKind::CrossReference,
                    format!(
                        "set {name} has type {} but this use requires {required}",
                        set.set_type
                    ),
                )),
                Some(_) => {}
            }
        }
    }
}

/// Validates a whole policy batch.
///
/// Every rule, set and NAT mapping is validated and all issues are
/// collected. Batch-level checks run only once every object is valid.
///
/// # Errors
///
/// Returns a [`ValidationReport`] holding every issue found.
pub fn validate_policy(spec: &PolicySpec) -> Result<Policy, ValidationReport> {
    let mut report = ValidationReport::new();

    let mut rules = Vec::with_capacity(spec.rules.len());
    for (index, value) in spec.rules.iter().enumerate() {
        match validate_rule(value) {
            Ok(rule) => rules.push(rule),
            Err(errors) => report.extend_invalid(&format!("rule[{index}]"), errors),
        }
    }

    let mut sets = Vec::with_capacity(spec.sets.len());
    for (index, value) in spec.sets.iter().enumerate() {
        match validate_set(value) {
            Ok(set) => sets.push(set),
            Err(errors) => report.extend_invalid(&format!("set[{index}]"), errors),
        }
    }

    let mut nats = Vec::with_capacity(spec.nats.len());
    for (index, value) in spec.nats.iter().enumerate() {
        match validate_nat(value) {
            Ok(nat) => nats.push(nat),
            Err(errors) => report.extend_invalid(&format!("nat[{index}]"), errors),
        }
    }

    if report.is_empty() {
        check_references(&rules, &sets, &mut report);
    }

    debug!(
        rules = rules.len(),
        sets = sets.len(),
        nats = nats.len(),
        issues = report.len(),
        "Validated policy batch"
    );

    report.into_result()?;

    Ok(Policy {
        rules,
        sets,
        nats,
        policies: spec.policies,
    })
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    proptest! {
        #[test]
        fn test_valid_ports_parse(port in 1u16..=65535) {
            prop_assert_eq!(parse_port_entry(&port.to_string()), Ok(PortEntry::Single(port)));
        }

        #[test]
        fn test_ordered_ranges_parse(a in 1u16..=65535, b in 1u16..=65535) {
            let (start, end) = if a <= b { (a, b) } else { (b, a) };
            let parsed = parse_port_entry(&format!("{start}-{end}"));
            prop_assert_eq!(parsed, Ok(PortEntry::Range(start, end)));
        }

        #[test]
        fn test_validators_never_panic(input in "\\PC*") {
            let _ = parse_port_entry(&input);
            let _ = parse_network(&input);
            let _ = validate_interface(&input);
            let _ = validate_rule(&json!({"source": [input.clone()], "port": [input]}));
        }

        #[test]
        fn test_any_with_extra_entry_always_rejected(octet in 0u8..=255) {
            let rule = json!({
                "version": 4,
                "source": ["any", format!("10.0.0.{octet}")],
                "destination": ["any"],
                "protocol": "any",
                "action": "drop",
                "iiface": "ext0"
            });
            prop_assert!(validate_rule(&rule).is_err());
        }

        #[test]
        fn test_identifier_rejects_whitespace(a in "[a-z]{1,8}", b in "[a-z]{1,8}") {
            let name = format!("{a} {b}");
            prop_assert!(validate_identifier("set name", &name).is_err());
        }
    }
}
