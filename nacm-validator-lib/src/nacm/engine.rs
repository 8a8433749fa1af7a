//! The NACM decision engine: the four public operations and the
//! permit/deny ladder of spec.md SS4.5, exactly in the order specified.

use tracing::{debug, warn};

use crate::nacm::cache::NacmCache;
use crate::nacm::config::{NacmConfig, RuleEffect};
use crate::nacm::state::{AccessMode, EditOp, NacmState};
use crate::value::{ValueId, ValueTree};
use crate::xpath::result::contains_via_ancestor;

/// What kind of access is being requested, used by the schema fast-check
/// table in spec.md SS4.5 step 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    Exec,
}

fn rule_kind_permits(effect_permit: bool, trace_kind: &'static str, user: &str, rule_name: &str) -> bool {
    debug!(user, rule = rule_name, kind = trace_kind, permit = effect_permit, "nacm decision");
    effect_permit
}

fn trace_default(user: &str, default: RuleEffect, kind: &'static str) -> bool {
    let permit = default == RuleEffect::Permit;
    debug!(user, kind, permit, "nacm default decision");
    permit
}

/// `true` if the schema-level fast-check (spec.md SS4.5 step 5) already
/// resolves the decision without consulting rules; `None` means "proceed
/// to full rule evaluation".
fn schema_fast_check(mode: AccessMode, access: Access, secure: bool, very_secure: bool) -> Option<bool> {
    use Access::*;
    use AccessMode::*;
    match (mode, access) {
        (Off, _) => Some(true),
        (Permissive, Read) if !very_secure => Some(true),
        (Disabled, Read) if !very_secure => Some(true),
        (Disabled, Write | Exec) if !secure && !very_secure => Some(true),
        _ => None,
    }
}

pub struct Engine<'a> {
    pub config: &'a NacmConfig,
    pub state: &'a NacmState,
    pub cache: &'a mut NacmCache,
}

impl<'a> Engine<'a> {
    /// `rpc_allowed(msg, user, rpc_obj)`.
    pub fn rpc_allowed(&mut self, user: &str, rpc_module: &str, rpc_name: &str, secure: bool, very_secure: bool) -> bool {
        if self.state.is_superuser(user) {
            return true;
        }
        if rpc_module == "ietf-netconf" && rpc_name == "close-session" {
            return true;
        }
        if let Some(permit) = schema_fast_check(self.state.mode(), Access::Exec, secure, very_secure) {
            return permit;
        }

        let permit = self.evaluate_rpc_or_notif(user, rpc_module, rpc_name, RuleKind::Rpc);
        if !permit {
            self.state.record_denied_rpc();
        }
        permit
    }

    /// `notif_allowed(user, notif_obj)`.
    pub fn notif_allowed(&mut self, user: &str, notif_module: &str, notif_name: &str, secure: bool, very_secure: bool) -> bool {
        if self.state.is_superuser(user) {
            return true;
        }
        if notif_name == "replayComplete" || notif_name == "notificationComplete" {
            return true;
        }
        if let Some(permit) = schema_fast_check(self.state.mode(), Access::Read, secure, very_secure) {
            return permit;
        }
        self.evaluate_rpc_or_notif(user, notif_module, notif_name, RuleKind::Notification)
    }

    /// `val_read_allowed(msg, user, val)`.
    pub fn val_read_allowed(&mut self, user: &str, tree: &ValueTree, document_root: ValueId, val: ValueId) -> bool {
        if self.state.is_superuser(user) {
            return true;
        }
        let Some(node) = tree.get(val) else {
            warn!(user, "val_read_allowed: missing value node, failing closed");
            return false;
        };
        if let Some(permit) = schema_fast_check(self.state.mode(), Access::Read, node.secure, node.very_secure) {
            return permit;
        }
        self.evaluate_data(user, tree, document_root, val, &node.module, Access::Read)
    }

    /// `val_write_allowed(msg, user, newval, curval, editop)`. `curval` is
    /// `None` for a CREATE against a path that does not yet exist.
    pub fn val_write_allowed(&mut self, user: &str, tree: &ValueTree, document_root: ValueId, val: ValueId, editop: EditOp) -> bool {
        let Some(node) = tree.get(val) else {
            warn!(user, "val_write_allowed: missing value node, failing closed");
            return false;
        };

        // Write-specific pre-check applies before the ladder, even for
        // the superuser (spec.md SS4.5).
        if editop.is_create() && node.block_user_create {
            debug!(user, kind = "block-user-create", permit = false, "nacm decision");
            self.state.record_denied_data_write();
            return false;
        }
        if editop.is_delete() && node.block_user_delete {
            debug!(user, kind = "block-user-delete", permit = false, "nacm decision");
            self.state.record_denied_data_write();
            return false;
        }
        if matches!(editop, EditOp::Merge | EditOp::Replace) && node.block_user_update {
            debug!(user, kind = "block-user-update", permit = false, "nacm decision");
            self.state.record_denied_data_write();
            return false;
        }

        if self.state.is_superuser(user) {
            return true;
        }
        if let Some(permit) = schema_fast_check(self.state.mode(), Access::Write, node.secure, node.very_secure) {
            if !permit {
                self.state.record_denied_data_write();
            }
            return permit;
        }

        let module = node.module.clone();
        let permit = self.evaluate_data(user, tree, document_root, val, &module, Access::Write);
        if !permit {
            self.state.record_denied_data_write();
        }
        permit
    }

    /// `cmd_allowed(user, context, command, access)`: the Tail-f `cmdrule`
    /// extension governing CLI/WebUI command invocation (spec.md SS6.1
    /// note). Additive on top of the RFC 8341 ladder: no superuser/
    /// DISABLED-mode bypass of its own, since it models an outer CLI layer
    /// rather than NETCONF access itself — the surrounding session already
    /// applied those bypasses before reaching the command dispatcher.
    pub fn cmd_allowed(&mut self, user: &str, context: Option<&str>, command: &str, access: Access) -> bool {
        let groups = self.cache.groups_for(self.config, user).to_vec();
        let default = match access {
            Access::Read => self.config.cmd_read_default,
            _ => self.config.cmd_exec_default,
        };
        if groups.is_empty() {
            return trace_default(user, default, "cmd-default");
        }

        for rule in &self.config.cmd_rules {
            let context_matches = match (&rule.context, context) {
                (None, _) => true,
                (Some(c), Some(actual)) => c == "*" || c == actual,
                (Some(c), None) => c == "*",
            };
            if !context_matches {
                continue;
            }
            let command_matches = match &rule.command {
                None => true,
                Some(c) => c == "*" || c == command,
            };
            if !command_matches {
                continue;
            }
            if !rule.allowed_group.iter().any(|g| groups.contains(g)) {
                continue;
            }
            let permitted = match access {
                Access::Read => rule.allowed_rights.read,
                _ => rule.allowed_rights.exec,
            };
            if permitted && rule.log_if_permit {
                debug!(user, rule = %rule.rule_name, command, "cmdrule log-if-permit");
            }
            if !permitted && rule.log_if_deny {
                debug!(user, rule = %rule.rule_name, command, "cmdrule log-if-deny");
            }
            return rule_kind_permits(permitted, "cmd-rule", user, &rule.rule_name);
        }

        trace_default(user, default, "cmd-default")
    }

    fn evaluate_rpc_or_notif(&mut self, user: &str, target_module: &str, target_name: &str, kind: RuleKind) -> bool {
        let groups = self.cache.groups_for(self.config, user).to_vec();
        if groups.is_empty() {
            return match kind {
                RuleKind::Rpc => trace_default(user, self.cache.exec_default, "exec-default"),
                RuleKind::Notification => trace_default(user, self.cache.read_default, "read-default"),
            };
        }

        match kind {
            RuleKind::Rpc => {
                for rule in &self.config.rpc_rules {
                    let module_matches = rule.rpc_module_name == "*" || rule.rpc_module_name == target_module;
                    let name_matches = rule.rpc_name == "*" || rule.rpc_name == target_name;
                    if !module_matches || !name_matches {
                        continue;
                    }
                    if rule.allowed_group.iter().any(|g| groups.contains(g)) {
                        return rule_kind_permits(rule.allowed_rights.exec, "rpc-rule", user, &rule.rule_name);
                    }
                }
            }
            RuleKind::Notification => {
                for rule in &self.config.notification_rules {
                    let module_matches = rule.notification_module_name == "*" || rule.notification_module_name == target_module;
                    let name_matches = rule.notification_name == "*" || rule.notification_name == target_name;
                    if !module_matches || !name_matches {
                        continue;
                    }
                    if rule.allowed_group.iter().any(|g| groups.contains(g)) {
                        return rule_kind_permits(rule.allowed_rights.read, "notification-rule", user, &rule.rule_name);
                    }
                }
            }
        }

        // No type-specific rule matched: fall through to module-rule, then
        // default (spec.md SS4.5 precedence).
        for rule in &self.config.module_rules {
            if rule.module_name != target_module {
                continue;
            }
            if rule.allowed_group.iter().any(|g| groups.contains(g)) {
                let permitted = match kind {
                    RuleKind::Rpc => rule.allowed_rights.exec,
                    RuleKind::Notification => rule.allowed_rights.read,
                };
                return rule_kind_permits(permitted, "module-rule", user, &rule.rule_name);
            }
        }

        match kind {
            RuleKind::Rpc => trace_default(user, self.cache.exec_default, "exec-default"),
            RuleKind::Notification => trace_default(user, self.cache.read_default, "read-default"),
        }
    }

    fn evaluate_data(&mut self, user: &str, tree: &ValueTree, document_root: ValueId, val: ValueId, target_module: &str, access: Access) -> bool {
        let groups = self.cache.groups_for(self.config, user).to_vec();
        let default = match access {
            Access::Read => self.cache.read_default,
            Access::Write => self.cache.write_default,
            Access::Exec => self.cache.exec_default,
        };
        if groups.is_empty() {
            let kind = match access {
                Access::Read => "read-default",
                Access::Write => "write-default",
                Access::Exec => "exec-default",
            };
            return trace_default(user, default, kind);
        }

        let data_rule_count = self.config.data_rules.len();
        for idx in 0..data_rule_count {
            let rule = &self.config.data_rules[idx];
            if !rule.allowed_group.iter().any(|g| groups.contains(g)) {
                continue;
            }
            let Some(nodeset) = self.cache.data_rule_nodeset(idx, tree, document_root) else { continue };
            if contains_via_ancestor(tree, nodeset, val) {
                let rule = &self.config.data_rules[idx];
                let permitted = match access {
                    Access::Read => rule.allowed_rights.read,
                    Access::Write => rule.allowed_rights.write,
                    Access::Exec => rule.allowed_rights.exec,
                };
                return rule_kind_permits(permitted, "data-rule", user, &rule.rule_name);
            }
        }

        for rule in &self.config.module_rules {
            if rule.module_name != target_module {
                continue;
            }
            if rule.allowed_group.iter().any(|g| groups.contains(g)) {
                let permitted = match access {
                    Access::Read => rule.allowed_rights.read,
                    Access::Write => rule.allowed_rights.write,
                    Access::Exec => rule.allowed_rights.exec,
                };
                return rule_kind_permits(permitted, "module-rule", user, &rule.rule_name);
            }
        }

        let kind = match access {
            Access::Read => "read-default",
            Access::Write => "write-default",
            Access::Exec => "exec-default",
        };
        trace_default(user, default, kind)
    }
}

enum RuleKind {
    Rpc,
    Notification,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nacm::config::{DataRule, Group, RpcRule};
    use crate::value::{ValueData, ValueNode};

    fn base_config() -> NacmConfig {
        let mut config = NacmConfig::default();
        config.groups.insert("admin".into(), Group { name: "admin".into(), users: vec!["alice".into()] });
        config
    }

    #[test]
    fn superuser_bypasses_everything() {
        let config = base_config();
        let state = NacmState::new(AccessMode::Enforcing, Some("root".into()));
        let mut cache = NacmCache::build(&config, 1).unwrap();
        let mut engine = Engine { config: &config, state: &state, cache: &mut cache };
        assert!(engine.rpc_allowed("root", "ietf-interfaces", "reset", false, false));
    }

    #[test]
    fn zero_groups_falls_back_to_exec_default() {
        let mut config = base_config();
        config.exec_default = RuleEffect::Deny;
        let state = NacmState::new(AccessMode::Enforcing, None);
        let mut cache = NacmCache::build(&config, 1).unwrap();
        let mut engine = Engine { config: &config, state: &state, cache: &mut cache };
        assert!(!engine.rpc_allowed("nobody", "ietf-interfaces", "reset", false, false));
    }

    #[test]
    fn rpc_rule_permits_matching_group() {
        let mut config = base_config();
        config.rpc_rules.push(RpcRule {
            rule_name: "admin-exec".into(),
            rpc_module_name: "*".into(),
            rpc_name: "*".into(),
            allowed_rights: crate::nacm::config::AllowedRights { read: false, write: false, exec: true },
            allowed_group: vec!["admin".into()],
            comment: None,
        });
        let state = NacmState::new(AccessMode::Enforcing, None);
        let mut cache = NacmCache::build(&config, 1).unwrap();
        let mut engine = Engine { config: &config, state: &state, cache: &mut cache };
        assert!(engine.rpc_allowed("alice", "ietf-interfaces", "reset", false, false));
    }

    #[test]
    fn write_blocked_by_object_flag_even_for_superuser() {
        let config = base_config();
        let state = NacmState::new(AccessMode::Enforcing, Some("root".into()));
        let mut cache = NacmCache::build(&config, 1).unwrap();
        let mut tree = ValueTree::new();
        let root = tree.insert(ValueNode::new("top", "ex", ValueData::Container), None);
        let mut locked = ValueNode::new("locked", "ex", ValueData::Leaf("x".into()));
        locked.block_user_delete = true;
        let locked_id = tree.insert(locked, Some(root));

        let mut engine = Engine { config: &config, state: &state, cache: &mut cache };
        assert!(!engine.val_write_allowed("root", &tree, root, locked_id, EditOp::Delete));
    }

    #[test]
    fn data_rule_permits_via_ancestor_containment() {
        let mut config = base_config();
        config.data_rules.push(DataRule {
            rule_name: "misc-rule".into(),
            path: "/misc".into(),
            allowed_rights: crate::nacm::config::AllowedRights { read: true, write: false, exec: false },
            allowed_group: vec!["admin".into()],
            comment: None,
        });
        let state = NacmState::new(AccessMode::Enforcing, None);
        let mut cache = NacmCache::build(&config, 1).unwrap();

        let mut tree = ValueTree::new();
        let root = tree.insert(ValueNode::new("top", "ex", ValueData::Container), None);
        let misc = tree.insert(ValueNode::new("misc", "ex", ValueData::Container), Some(root));
        let foo = tree.insert(ValueNode::new("foo", "ex", ValueData::Leaf("1".into())), Some(misc));

        let mut engine = Engine { config: &config, state: &state, cache: &mut cache };
        assert!(engine.val_read_allowed("alice", &tree, root, foo));
    }

    #[test]
    fn cmd_rule_permits_matching_context_and_command() {
        use crate::nacm::config::CmdRule;
        let mut config = base_config();
        config.cmd_rules.push(CmdRule {
            rule_name: "admin-show".into(),
            context: Some("cli".into()),
            command: Some("show".into()),
            allowed_rights: crate::nacm::config::AllowedRights { read: true, write: false, exec: false },
            allowed_group: vec!["admin".into()],
            log_if_permit: true,
            log_if_deny: false,
        });
        let state = NacmState::new(AccessMode::Enforcing, None);
        let mut cache = NacmCache::build(&config, 1).unwrap();
        let mut engine = Engine { config: &config, state: &state, cache: &mut cache };

        assert!(engine.cmd_allowed("alice", Some("cli"), "show", Access::Read));
        // zero-group user falls to cmd_read_default (Permit by spec.md SS6.1 default)
        assert!(engine.cmd_allowed("ghost", Some("cli"), "show", Access::Read));
        // command doesn't match the rule, falls to cmd_exec_default (Deny)
        assert!(!engine.cmd_allowed("alice", Some("cli"), "reboot", Access::Exec));
    }
}
