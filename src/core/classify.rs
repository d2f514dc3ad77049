//! Partitioning of validated rules into filter chains
//!
//! A rule's chain follows from its interface attachment: input-only rules go
//! to `input`, output-only to `output`, both to `forward`. The typed
//! [`Direction`](crate::core::policy::Direction) makes the partition total.

use crate::core::policy::{FilterChain, Rule};

/// Rules grouped by chain, each group in emission order
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClassifiedRules<'a> {
    pub input: Vec<&'a Rule>,
    pub forward: Vec<&'a Rule>,
    pub output: Vec<&'a Rule>,
}

impl<'a> ClassifiedRules<'a> {
    pub fn chain(&self, chain: FilterChain) -> &[&'a Rule] {
        match chain {
            FilterChain::Input => &self.input,
            FilterChain::Forward => &self.forward,
            FilterChain::Output => &self.output,
        }
    }

    pub fn len(&self) -> usize {
        self.input.len() + self.forward.len() + self.output.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Splits rules into chains and orders each chain by ascending `order`.
///
/// The sort is stable, so rules with equal `order` keep their input order.
pub fn classify(rules: &[Rule]) -> ClassifiedRules<'_> {
    let mut classified = ClassifiedRules::default();

    for rule in rules {
        match rule.direction.chain() {
            FilterChain::Input => classified.input.push(rule),
            FilterChain::Forward => classified.forward.push(rule),
            FilterChain::Output => classified.output.push(rule),
        }
    }

    classified.input.sort_by_key(|r| r.order);
    classified.forward.sort_by_key(|r| r.order);
    classified.output.sort_by_key(|r| r.order);

    classified
}
