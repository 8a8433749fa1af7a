//! End-to-end demo: load a `/nacm` XML configuration and run a handful of
//! access checks against it. The renamed former `examples/validate_access.rs`
//! from the teacher crate — relocated because the workspace root's
//! `examples/` is the read-only retrieval pack, not a place for our own
//! code.

use nacm_validator::nacm::{AccessMode, EditOp, Engine, NacmCache, NacmConfig, NacmState};
use nacm_validator::value::{ValueData, ValueNode, ValueTree};

fn main() {
    let xml = std::fs::read_to_string("nacm-validator-lib/demos/data/nacm_config.xml")
        .expect("run from the workspace root so the demo fixture resolves");
    let config = NacmConfig::from_xml(&xml).expect("fixture should be well-formed");

    let state = NacmState::new(AccessMode::Enforcing, None);
    let mut cache = NacmCache::build(&config, 1).expect("fixture has no malformed data-rules");

    let mut tree = ValueTree::new();
    let root = tree.insert(ValueNode::new("", "ietf-interfaces", ValueData::Container), None);
    let interfaces = tree.insert(ValueNode::new("interfaces", "ietf-interfaces", ValueData::Container), Some(root));

    let mut engine = Engine { config: &config, state: &state, cache: &mut cache };

    let alice_reads = engine.val_read_allowed("alice", &tree, root, interfaces);
    println!("alice (admin) read /interfaces: {}", if alice_reads { "PERMIT" } else { "DENY" });

    let bob_reads = engine.val_read_allowed("bob", &tree, root, interfaces);
    println!("bob (operator) read /interfaces: {}", if bob_reads { "PERMIT" } else { "DENY" });

    let bob_writes = engine.val_write_allowed("bob", &tree, root, interfaces, EditOp::Merge);
    println!("bob (operator) write /interfaces: {}", if bob_writes { "PERMIT" } else { "DENY" });

    let bob_restarts = engine.rpc_allowed("bob", "ietf-system", "system-restart", false, false);
    println!("bob (operator) exec system-restart: {}", if bob_restarts { "PERMIT" } else { "DENY" });

    let nobody_reads = engine.val_read_allowed("nobody", &tree, root, interfaces);
    println!("nobody (no group) read /interfaces: {}", if nobody_reads { "PERMIT" } else { "DENY" });
}
