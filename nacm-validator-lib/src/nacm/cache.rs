//! The per-session NACM cache: memoised user->groups, compiled data-rule
//! PCBs with their once-evaluated node-sets, and latched default-decision
//! flags (spec.md SS3 "NACM rule cache", SS4.6).
//!
//! The C original keeps a separate per-message cache that borrows the
//! per-session cache when it is still valid. Single-threaded-per-session
//! execution (spec.md SS5) means a message never observes a cache another
//! message is mutating, so here the two collapse into one
//! [`NacmCache`] that the engine owns for the session and rebuilds
//! wholesale on invalidation, rather than modelling a borrow-or-own union
//! type for a distinction that has no observable effect in this runtime
//! model.

use std::collections::HashMap;

use tracing::warn;

use crate::error::NacmError;
use crate::nacm::config::{DataRule, NacmConfig, RuleEffect};
use crate::value::ValueTree;
use crate::xpath::pcb::{Pcb, PcbSource};
use crate::xpath::result::NodeSet;

/// A data-rule whose path compiled successfully. Rules that fail to parse
/// or validate are logged and skipped (spec.md SS4.5 "Failures"), not
/// fatal to the cache as a whole.
pub struct CompiledDataRule {
    pub config_index: usize,
    pub pcb: Pcb,
    /// Evaluated once per cache lifetime and reused for every
    /// `val_*_allowed` call against this snapshot generation.
    pub result: Option<NodeSet>,
}

pub struct NacmCache {
    user_groups: HashMap<String, Vec<String>>,
    pub data_rules: Vec<CompiledDataRule>,
    pub read_default: RuleEffect,
    pub write_default: RuleEffect,
    pub exec_default: RuleEffect,
    generation: u64,
}

impl NacmCache {
    /// Builds a fresh cache against `config`. All-or-nothing: the only
    /// failure mode here is a malformed instance-identifier structurally
    /// incompatible with the XPath grammar entirely (caught per-rule and
    /// skipped), so this effectively cannot fail in normal operation; it
    /// returns `Result` to keep the "never leaves a half-built cache
    /// reachable" contract explicit at the type level.
    pub fn build(config: &NacmConfig, generation: u64) -> Result<Self, NacmError> {
        let mut data_rules = Vec::with_capacity(config.data_rules.len());
        for (i, rule) in config.data_rules.iter().enumerate() {
            match compile_data_rule(rule) {
                Ok(pcb) => data_rules.push(CompiledDataRule { config_index: i, pcb, result: None }),
                Err(e) => warn!(rule = %rule.rule_name, error = %e, "skipping malformed data-rule"),
            }
        }
        Ok(NacmCache {
            user_groups: HashMap::new(),
            data_rules,
            read_default: config.read_default,
            write_default: config.write_default,
            exec_default: config.exec_default,
            generation,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn groups_for<'a>(&'a mut self, config: &NacmConfig, user: &str) -> &'a [String] {
        self.user_groups
            .entry(user.to_string())
            .or_insert_with(|| config.user_groups(user).into_iter().map(str::to_string).collect())
    }

    /// Evaluate (and memoise) the node-set a data-rule's path denotes,
    /// against the given document snapshot. `idx` is the rule's index in
    /// the original, unfiltered `config.data_rules` list; malformed rules
    /// are dropped during `build()` so `self.data_rules` is never a
    /// parallel array to it, hence the search by `config_index` rather
    /// than a direct index.
    pub fn data_rule_nodeset(&mut self, idx: usize, tree: &ValueTree, document_root: crate::value::ValueId) -> Option<&NodeSet> {
        let entry = self.data_rules.iter_mut().find(|r| r.config_index == idx)?;
        if entry.result.is_none() {
            match crate::xpath::eval::evaluate(&entry.pcb, tree, document_root, document_root) {
                Ok(crate::xpath::result::XPathResult::NodeSet(ns)) => entry.result = Some(ns),
                Ok(_) => entry.result = Some(NodeSet::empty()),
                Err(e) => {
                    warn!(error = %e, "data-rule evaluation failed, treating as empty node-set");
                    entry.result = Some(NodeSet::empty());
                }
            }
        }
        entry.result.as_ref()
    }
}

fn compile_data_rule(rule: &DataRule) -> Result<Pcb, NacmError> {
    let mut pcb = Pcb::new(PcbSource::InstanceIdentifier, rule.path.clone());
    pcb.parse()?;
    pcb.validate()?;
    Ok(pcb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{ValueData, ValueNode};

    fn config_with_rule(path: &str) -> NacmConfig {
        let mut config = NacmConfig::default();
        config.data_rules.push(DataRule {
            rule_name: "r1".into(),
            path: path.into(),
            allowed_rights: Default::default(),
            allowed_group: vec!["oper".into()],
            comment: None,
        });
        config
    }

    #[test]
    fn malformed_rule_is_skipped_not_fatal() {
        let config = config_with_rule("\"unterminated");
        let cache = NacmCache::build(&config, 1).unwrap();
        assert!(cache.data_rules.is_empty());
    }

    #[test]
    fn well_formed_rule_compiles_and_evaluates_once() {
        let config = config_with_rule("/misc");
        let mut cache = NacmCache::build(&config, 1).unwrap();
        assert_eq!(cache.data_rules.len(), 1);

        let mut tree = ValueTree::new();
        let root = tree.insert(ValueNode::new("top", "ex", ValueData::Container), None);
        let _misc = tree.insert(ValueNode::new("misc", "ex", ValueData::Container), Some(root));

        let first = cache.data_rule_nodeset(0, &tree, root).cloned();
        let second = cache.data_rule_nodeset(0, &tree, root).cloned();
        assert_eq!(first, second);
        assert_eq!(first.unwrap().len(), 1);
    }

    #[test]
    fn config_index_survives_an_earlier_malformed_rule() {
        let mut config = NacmConfig::default();
        config.data_rules.push(DataRule {
            rule_name: "bad".into(),
            path: "\"unterminated".into(),
            allowed_rights: Default::default(),
            allowed_group: vec!["oper".into()],
            comment: None,
        });
        config.data_rules.push(DataRule {
            rule_name: "good".into(),
            path: "/misc".into(),
            allowed_rights: Default::default(),
            allowed_group: vec!["oper".into()],
            comment: None,
        });
        let mut cache = NacmCache::build(&config, 1).unwrap();
        assert_eq!(cache.data_rules.len(), 1);
        assert_eq!(cache.data_rules[0].config_index, 1);

        let mut tree = ValueTree::new();
        let root = tree.insert(ValueNode::new("top", "ex", ValueData::Container), None);
        let _misc = tree.insert(ValueNode::new("misc", "ex", ValueData::Container), Some(root));

        assert!(cache.data_rule_nodeset(0, &tree, root).is_none());
        let good = cache.data_rule_nodeset(1, &tree, root).cloned();
        assert_eq!(good.unwrap().len(), 1);
    }

    #[test]
    fn groups_are_memoised_per_user() {
        let mut config = NacmConfig::default();
        config.groups.insert("oper".into(), crate::nacm::config::Group { name: "oper".into(), users: vec!["bob".into()] });
        let mut cache = NacmCache::build(&config, 1).unwrap();
        assert_eq!(cache.groups_for(&config, "bob"), &["oper".to_string()]);
        assert!(cache.groups_for(&config, "nobody").is_empty());
    }
}
