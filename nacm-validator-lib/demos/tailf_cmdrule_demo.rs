//! Demo for the Tail-f `cmdrule` extension (spec.md SS6.1 note): CLI/WebUI
//! command access, additive on top of the RFC 8341 datastore/RPC rules.
//! Grounded on the teacher's `tailf_acm_demo.rs`, rewritten against the
//! new `cmd_allowed` operation.

use nacm_validator::nacm::{AccessMode, Access, Engine, NacmCache, NacmConfig, NacmState};

fn main() {
    let xml = std::fs::read_to_string("nacm-validator-lib/demos/data/tailf_cmdrule.xml")
        .expect("run from the workspace root so the demo fixture resolves");
    let config = NacmConfig::from_xml(&xml).expect("fixture should be well-formed");

    let state = NacmState::new(AccessMode::Enforcing, None);
    let mut cache = NacmCache::build(&config, 1).expect("fixture has no malformed data-rules");
    let mut engine = Engine { config: &config, state: &state, cache: &mut cache };

    let alice_show = engine.cmd_allowed("alice", Some("cli"), "show interfaces", Access::Read);
    println!("alice (operator) cli 'show interfaces': {}", if alice_show { "PERMIT" } else { "DENY" });

    let alice_reboot = engine.cmd_allowed("alice", Some("cli"), "reboot", Access::Exec);
    println!("alice (operator) cli 'reboot': {}", if alice_reboot { "PERMIT" } else { "DENY" });

    let nobody_show = engine.cmd_allowed("nobody", Some("cli"), "show interfaces", Access::Read);
    println!("nobody (no group) cli 'show interfaces': {}", if nobody_show { "PERMIT" } else { "DENY" });
}
