//! Integration tests for the six seed scenarios in spec.md §8, built
//! directly against the public API (not parsed XML) so they double as
//! regression tests for the decision ladder and the runstack loop cap.

use nacm_validator::nacm::{AccessMode, EditOp, Engine, NacmCache, NacmConfig};
use nacm_validator::nacm::config::{AllowedRights, DataRule, Group, RpcRule};
use nacm_validator::nacm::NacmState;
use nacm_validator::runstack::RunstackContext;
use nacm_validator::value::{ValueData, ValueNode, ValueTree};
use nacm_validator::xpath::pcb::{Pcb, PcbSource};
use nacm_validator::xpath::{evaluate, XPathResult};

fn config_with_operator_group() -> NacmConfig {
    let mut config = NacmConfig::default();
    config.groups.insert("operator".into(), Group { name: "operator".into(), users: vec!["bob".into()] });
    config
}

/// 1. Superuser bypass: a superuser is permitted regardless of mode,
/// rules, or write-blocking flags.
#[test]
fn superuser_bypasses_the_whole_ladder() {
    let config = config_with_operator_group();
    let state = NacmState::new(AccessMode::Enforcing, Some("root".into()));
    let mut cache = NacmCache::build(&config, 1).unwrap();

    let mut tree = ValueTree::new();
    let root = tree.insert(ValueNode::new("top", "ex", ValueData::Container), None);
    let mut locked = ValueNode::new("locked", "ex", ValueData::Leaf("x".into()));
    locked.block_user_create = false;
    let leaf = tree.insert(locked, Some(root));

    let mut engine = Engine { config: &config, state: &state, cache: &mut cache };
    assert!(engine.rpc_allowed("root", "ietf-interfaces", "reset", false, false));
    assert!(engine.val_read_allowed("root", &tree, root, leaf));
    assert!(engine.val_write_allowed("root", &tree, root, leaf, EditOp::Merge));
}

/// 2. Default-deny for a zero-group user: no groups means every decision
/// falls straight through to the configured default.
#[test]
fn zero_group_user_gets_the_configured_default() {
    let mut config = config_with_operator_group();
    config.write_default = nacm_validator::nacm::config::RuleEffect::Deny;
    config.read_default = nacm_validator::nacm::config::RuleEffect::Permit;
    let state = NacmState::new(AccessMode::Enforcing, None);
    let mut cache = NacmCache::build(&config, 1).unwrap();

    let mut tree = ValueTree::new();
    let root = tree.insert(ValueNode::new("top", "ex", ValueData::Container), None);
    let leaf = tree.insert(ValueNode::new("leaf", "ex", ValueData::Leaf("x".into())), Some(root));

    let mut engine = Engine { config: &config, state: &state, cache: &mut cache };
    assert!(engine.val_read_allowed("ghost", &tree, root, leaf));
    assert!(!engine.val_write_allowed("ghost", &tree, root, leaf, EditOp::Merge));
}

/// 3. Data-rule permit: a rule whose path's node-set contains the target
/// node, matched via the ancestor-or-self fast path.
#[test]
fn data_rule_permits_a_matching_group_member() {
    let mut config = config_with_operator_group();
    config.data_rules.push(DataRule {
        rule_name: "interfaces-read".into(),
        path: "/interfaces".into(),
        allowed_rights: AllowedRights { read: true, write: false, exec: false },
        allowed_group: vec!["operator".into()],
        comment: None,
    });
    let state = NacmState::new(AccessMode::Enforcing, None);
    let mut cache = NacmCache::build(&config, 1).unwrap();

    let mut tree = ValueTree::new();
    let root = tree.insert(ValueNode::new("top", "ex", ValueData::Container), None);
    let interfaces = tree.insert(ValueNode::new("interfaces", "ex", ValueData::Container), Some(root));
    let eth0 = tree.insert(ValueNode::new("eth0", "ex", ValueData::Leaf("up".into())), Some(interfaces));

    let mut engine = Engine { config: &config, state: &state, cache: &mut cache };
    assert!(engine.val_read_allowed("bob", &tree, root, eth0));
}

/// 4. Write blocked by an object's `block-user-*` flag, which pre-empts
/// the ladder even before the superuser check.
#[test]
fn write_blocked_by_object_flag_even_for_superuser() {
    let config = NacmConfig::default();
    let state = NacmState::new(AccessMode::Enforcing, Some("root".into()));
    let mut cache = NacmCache::build(&config, 1).unwrap();

    let mut tree = ValueTree::new();
    let root = tree.insert(ValueNode::new("top", "ex", ValueData::Container), None);
    let mut protected = ValueNode::new("protected", "ex", ValueData::Leaf("x".into()));
    protected.block_user_update = true;
    let leaf = tree.insert(protected, Some(root));

    let mut engine = Engine { config: &config, state: &state, cache: &mut cache };
    assert!(!engine.val_write_allowed("root", &tree, root, leaf, EditOp::Replace));
}

/// 5. XPath `concat`: exercised directly through the PCB/evaluator, the
/// same machinery the NACM data-rule cache compiles paths with.
#[test]
fn xpath_concat_joins_string_arguments() {
    let mut pcb = Pcb::new(PcbSource::XmlSelect, "concat('a', 'b', 'c')");
    pcb.parse().unwrap();
    pcb.validate().unwrap();

    let mut tree = ValueTree::new();
    let root = tree.insert(ValueNode::new("top", "ex", ValueData::Container), None);

    let result = evaluate(&pcb, &tree, root, root).unwrap();
    assert_eq!(result, XPathResult::String("abc".to_string()));
}

/// 6. Loop iteration cap: `while true { echo 1 }` with max-iterations=3
/// completes after exactly 3 executions and returns control to USER.
#[test]
fn runstack_loop_respects_its_iteration_cap() {
    let mut ctx = RunstackContext::new();
    ctx.enter_control("while", "true", true, 3).unwrap();
    ctx.collect_into_loop("echo 1");
    ctx.enter_control("end", "", false, 0).unwrap();

    let mut executed = 0;
    while let Some(line) = ctx.next_line().unwrap() {
        assert_eq!(line.text, "echo 1");
        executed += 1;
        assert!(executed <= 3, "loop exceeded its configured iteration cap");
    }
    assert_eq!(executed, 3);
    assert_eq!(ctx.current_source(), nacm_validator::runstack::Source::User);
}

/// RPC rules still see the module-rule -> default precedence when no
/// type-specific rule matches.
#[test]
fn rpc_falls_back_through_module_rule_to_default() {
    let mut config = config_with_operator_group();
    config.rpc_rules.push(RpcRule {
        rule_name: "operator-exec".into(),
        rpc_module_name: "ietf-system".into(),
        rpc_name: "get-time".into(),
        allowed_rights: AllowedRights { read: false, write: false, exec: true },
        allowed_group: vec!["operator".into()],
        comment: None,
    });
    let state = NacmState::new(AccessMode::Enforcing, None);
    let mut cache = NacmCache::build(&config, 1).unwrap();
    let mut engine = Engine { config: &config, state: &state, cache: &mut cache };

    assert!(engine.rpc_allowed("bob", "ietf-system", "get-time", false, false));
    // no rule matches this rpc name, falls through to exec_default (Permit)
    assert!(engine.rpc_allowed("bob", "ietf-system", "unrelated-rpc", false, false));
}
