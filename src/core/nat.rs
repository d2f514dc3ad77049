//! Rendering of NAT mappings
//!
//! Destination NAT lines go to the `prerouting` chain, source NAT lines to
//! `postrouting`. Mappings are independent, so input order is kept as is.

use ipnetwork::IpNetwork;

use crate::core::compile::render_network;
use crate::core::policy::{NatDirection, NatMapping};

/// Rendered NAT lines per hook
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompiledNat {
    pub prerouting: Vec<String>,
    pub postrouting: Vec<String>,
}

impl CompiledNat {
    pub fn is_empty(&self) -> bool {
        self.prerouting.is_empty() && self.postrouting.is_empty()
    }
}

/// Renders one mapping into its line.
pub fn compile_nat_line(nat: &NatMapping) -> String {
    let public = render_network(&IpNetwork::V4(nat.public));
    let private = render_network(&IpNetwork::V4(nat.private));

    let (iface_match, rest) = match nat.direction {
        NatDirection::Destination => ("iifname", format!("ip daddr {public} dnat to {private}")),
        NatDirection::Source => ("oifname", format!("ip saddr {private} snat to {public}")),
    };

    match &nat.iface {
        Some(iface) => format!("{iface_match} \"{iface}\" {rest}"),
        None => rest,
    }
}

/// Renders every mapping.
pub fn compile_nat(nats: &[NatMapping]) -> CompiledNat {
    let mut compiled = CompiledNat::default();
    for nat in nats {
        let line = compile_nat_line(nat);
        match nat.direction {
            NatDirection::Destination => compiled.prerouting.push(line),
            NatDirection::Source => compiled.postrouting.push(line),
        }
    }
    compiled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(direction: NatDirection, iface: Option<&str>) -> NatMapping {
        NatMapping {
            direction,
            public: "203.0.113.5/32".parse().unwrap(),
            private: "192.168.1.5/32".parse().unwrap(),
            iface: iface.map(String::from),
        }
    }

    #[test]
    fn test_dnat_line() {
        let line = compile_nat_line(&mapping(NatDirection::Destination, Some("ext0")));
        assert_eq!(line, "iifname \"ext0\" ip daddr 203.0.113.5 dnat to 192.168.1.5");
    }

    #[test]
    fn test_snat_line_without_iface() {
        let line = compile_nat_line(&mapping(NatDirection::Source, None));
        assert_eq!(line, "ip saddr 192.168.1.5 snat to 203.0.113.5");
    }

    #[test]
    fn test_compile_nat_keeps_order_per_hook() {
        let mut second = mapping(NatDirection::Destination, None);
        second.public = "198.51.100.7/32".parse().unwrap();

        let compiled = compile_nat(&[
            mapping(NatDirection::Destination, Some("ext0")),
            mapping(NatDirection::Source, Some("ext0")),
            second,
        ]);

        assert_eq!(compiled.prerouting.len(), 2);
        assert!(compiled.prerouting[1].contains("198.51.100.7"));
        assert_eq!(compiled.postrouting.len(), 1);
        assert!(compiled.postrouting[0].starts_with("oifname \"ext0\""));
    }
}
