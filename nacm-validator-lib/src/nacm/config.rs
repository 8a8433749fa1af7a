//! The `/nacm` datastore shape (spec.md §6.1) plus the Tail-f `cmdrule`
//! extension the teacher's own CLI demos exercise, and the XML ingest
//! adapted from the teacher's `from_xml`/serde structures.

use std::collections::HashMap;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::XmlIngestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleEffect {
    Permit,
    Deny,
}

impl FromStr for RuleEffect {
    type Err = XmlIngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "permit" => Ok(RuleEffect::Permit),
            "deny" => Ok(RuleEffect::Deny),
            other => Err(XmlIngestError::InvalidEffect(other.to_string())),
        }
    }
}

/// The `allowed-rights` bits leaf: `read`, `write`, `exec`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllowedRights {
    pub read: bool,
    pub write: bool,
    pub exec: bool,
}

impl AllowedRights {
    pub fn all() -> Self {
        AllowedRights { read: true, write: true, exec: true }
    }

    fn parse_bits(s: &str) -> Result<Self, XmlIngestError> {
        let mut rights = AllowedRights::default();
        let trimmed = s.trim();
        if trimmed == "*" {
            return Ok(AllowedRights::all());
        }
        for tok in trimmed.split_whitespace() {
            match tok {
                "read" => rights.read = true,
                "write" => rights.write = true,
                "create" | "update" | "delete" => rights.write = true,
                "exec" => rights.exec = true,
                other => return Err(XmlIngestError::InvalidOperation(other.to_string())),
            }
        }
        Ok(rights)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrudOp {
    Create,
    Read,
    Update,
    Delete,
}

#[derive(Debug, Clone, Default)]
pub struct Group {
    pub name: String,
    pub users: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ModuleRule {
    pub rule_name: String,
    pub module_name: String,
    pub allowed_rights: AllowedRights,
    pub allowed_group: Vec<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RpcRule {
    pub rule_name: String,
    pub rpc_module_name: String,
    pub rpc_name: String,
    pub allowed_rights: AllowedRights,
    pub allowed_group: Vec<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DataRule {
    pub rule_name: String,
    /// Instance-identifier-style XPath, compiled lazily by `nacm::cache`.
    pub path: String,
    pub allowed_rights: AllowedRights,
    pub allowed_group: Vec<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NotificationRule {
    pub rule_name: String,
    pub notification_module_name: String,
    pub notification_name: String,
    pub allowed_rights: AllowedRights,
    pub allowed_group: Vec<String>,
    pub comment: Option<String>,
}

/// Tail-f `cmdrule` extension: access control over CLI/WebUI command
/// invocation, additive and NACM-namespaced (spec.md SS6.1 note, carried
/// forward from the teacher's CLI demo examples).
#[derive(Debug, Clone)]
pub struct CmdRule {
    pub rule_name: String,
    pub context: Option<String>,
    pub command: Option<String>,
    pub allowed_rights: AllowedRights,
    pub allowed_group: Vec<String>,
    pub log_if_permit: bool,
    pub log_if_deny: bool,
}

#[derive(Debug, Clone)]
pub struct NacmConfig {
    pub enable_nacm: bool,
    pub read_default: RuleEffect,
    pub write_default: RuleEffect,
    pub exec_default: RuleEffect,
    /// Tail-f extension defaults for CLI/WebUI command access.
    pub cmd_read_default: RuleEffect,
    pub cmd_exec_default: RuleEffect,
    pub groups: HashMap<String, Group>,
    pub module_rules: Vec<ModuleRule>,
    pub rpc_rules: Vec<RpcRule>,
    pub data_rules: Vec<DataRule>,
    pub notification_rules: Vec<NotificationRule>,
    pub cmd_rules: Vec<CmdRule>,
}

impl Default for NacmConfig {
    fn default() -> Self {
        // Defaults from spec.md SS6.1.
        NacmConfig {
            enable_nacm: true,
            read_default: RuleEffect::Permit,
            write_default: RuleEffect::Deny,
            exec_default: RuleEffect::Permit,
            cmd_read_default: RuleEffect::Permit,
            cmd_exec_default: RuleEffect::Deny,
            groups: HashMap::new(),
            module_rules: Vec::new(),
            rpc_rules: Vec::new(),
            data_rules: Vec::new(),
            notification_rules: Vec::new(),
            cmd_rules: Vec::new(),
        }
    }
}

impl NacmConfig {
    pub fn user_groups(&self, user: &str) -> Vec<&str> {
        self.groups
            .values()
            .filter(|g| g.users.iter().any(|u| u == user))
            .map(|g| g.name.as_str())
            .collect()
    }

    pub fn from_xml(xml_content: &str) -> Result<Self, XmlIngestError> {
        let doc: XmlConfig = serde_xml_rs::from_str(xml_content).map_err(|e| XmlIngestError::Xml(e.to_string()))?;
        let nacm = doc.nacm;

        let mut groups = HashMap::new();
        for g in nacm.groups.group {
            groups.insert(g.name.clone(), Group { name: g.name, users: g.user_names });
        }

        let rules = nacm.rules.unwrap_or_default();

        let module_rules = rules
            .module_rule
            .into_iter()
            .map(|r| -> Result<ModuleRule, XmlIngestError> {
                Ok(ModuleRule {
                    rule_name: r.rule_name,
                    module_name: r.module_name,
                    allowed_rights: r.allowed_rights.map(|s| AllowedRights::parse_bits(&s)).transpose()?.unwrap_or_default(),
                    allowed_group: split_groups(r.allowed_group),
                    comment: r.comment,
                })
            })
            .collect::<Result<_, _>>()?;

        let rpc_rules = rules
            .rpc_rule
            .into_iter()
            .map(|r| -> Result<RpcRule, XmlIngestError> {
                Ok(RpcRule {
                    rule_name: r.rule_name,
                    rpc_module_name: r.rpc_module_name,
                    rpc_name: r.rpc_name,
                    allowed_rights: r.allowed_rights.map(|s| AllowedRights::parse_bits(&s)).transpose()?.unwrap_or_default(),
                    allowed_group: split_groups(r.allowed_group),
                    comment: r.comment,
                })
            })
            .collect::<Result<_, _>>()?;

        let data_rules = rules
            .data_rule
            .into_iter()
            .map(|r| -> Result<DataRule, XmlIngestError> {
                Ok(DataRule {
                    rule_name: r.rule_name,
                    path: r.path,
                    allowed_rights: r.allowed_rights.map(|s| AllowedRights::parse_bits(&s)).transpose()?.unwrap_or_default(),
                    allowed_group: split_groups(r.allowed_group),
                    comment: r.comment,
                })
            })
            .collect::<Result<_, _>>()?;

        let notification_rules = rules
            .notification_rule
            .into_iter()
            .map(|r| -> Result<NotificationRule, XmlIngestError> {
                Ok(NotificationRule {
                    rule_name: r.rule_name,
                    notification_module_name: r.notification_module_name,
                    notification_name: r.notification_name,
                    allowed_rights: r.allowed_rights.map(|s| AllowedRights::parse_bits(&s)).transpose()?.unwrap_or_default(),
                    allowed_group: split_groups(r.allowed_group),
                    comment: r.comment,
                })
            })
            .collect::<Result<_, _>>()?;

        let cmd_rules = rules
            .cmdrule
            .into_iter()
            .map(|r| -> Result<CmdRule, XmlIngestError> {
                Ok(CmdRule {
                    rule_name: r.rule_name,
                    context: r.context,
                    command: r.command,
                    allowed_rights: r.allowed_rights.map(|s| AllowedRights::parse_bits(&s)).transpose()?.unwrap_or_default(),
                    allowed_group: split_groups(r.allowed_group),
                    log_if_permit: r.log_if_permit.unwrap_or(false),
                    log_if_deny: r.log_if_deny.unwrap_or(false),
                })
            })
            .collect::<Result<_, _>>()?;

        Ok(NacmConfig {
            enable_nacm: nacm.enable_nacm,
            read_default: nacm.read_default.map(|s| s.parse()).transpose()?.unwrap_or(RuleEffect::Permit),
            write_default: nacm.write_default.map(|s| s.parse()).transpose()?.unwrap_or(RuleEffect::Deny),
            exec_default: nacm.exec_default.map(|s| s.parse()).transpose()?.unwrap_or(RuleEffect::Permit),
            cmd_read_default: nacm.cmd_read_default.map(|s| s.parse()).transpose()?.unwrap_or(RuleEffect::Permit),
            cmd_exec_default: nacm.cmd_exec_default.map(|s| s.parse()).transpose()?.unwrap_or(RuleEffect::Deny),
            groups,
            module_rules,
            rpc_rules,
            data_rules,
            notification_rules,
            cmd_rules,
        })
    }
}

fn split_groups(raw: Option<String>) -> Vec<String> {
    raw.map(|s| s.split_whitespace().map(str::to_string).collect()).unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct XmlConfig {
    nacm: XmlNacm,
}

#[derive(Debug, Deserialize)]
struct XmlNacm {
    #[serde(rename = "enable-nacm")]
    enable_nacm: bool,
    #[serde(rename = "read-default")]
    read_default: Option<String>,
    #[serde(rename = "write-default")]
    write_default: Option<String>,
    #[serde(rename = "exec-default")]
    exec_default: Option<String>,
    #[serde(rename = "cmd-read-default")]
    cmd_read_default: Option<String>,
    #[serde(rename = "cmd-exec-default")]
    cmd_exec_default: Option<String>,
    groups: XmlGroups,
    rules: Option<XmlRules>,
}

#[derive(Debug, Deserialize)]
struct XmlGroups {
    #[serde(default)]
    group: Vec<XmlGroup>,
}

#[derive(Debug, Deserialize)]
struct XmlGroup {
    name: String,
    #[serde(rename = "user-name", default)]
    user_names: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct XmlRules {
    #[serde(rename = "module-rule", default)]
    module_rule: Vec<XmlModuleRule>,
    #[serde(rename = "rpc-rule", default)]
    rpc_rule: Vec<XmlRpcRule>,
    #[serde(rename = "data-rule", default)]
    data_rule: Vec<XmlDataRule>,
    #[serde(rename = "notification-rule", default)]
    notification_rule: Vec<XmlNotificationRule>,
    #[serde(default)]
    cmdrule: Vec<XmlCmdRule>,
}

#[derive(Debug, Deserialize)]
struct XmlModuleRule {
    #[serde(rename = "rule-name")]
    rule_name: String,
    #[serde(rename = "module-name")]
    module_name: String,
    #[serde(rename = "allowed-rights")]
    allowed_rights: Option<String>,
    #[serde(rename = "allowed-group")]
    allowed_group: Option<String>,
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlRpcRule {
    #[serde(rename = "rule-name")]
    rule_name: String,
    #[serde(rename = "rpc-module-name")]
    rpc_module_name: String,
    #[serde(rename = "rpc-name")]
    rpc_name: String,
    #[serde(rename = "allowed-rights")]
    allowed_rights: Option<String>,
    #[serde(rename = "allowed-group")]
    allowed_group: Option<String>,
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlDataRule {
    #[serde(rename = "rule-name")]
    rule_name: String,
    path: String,
    #[serde(rename = "allowed-rights")]
    allowed_rights: Option<String>,
    #[serde(rename = "allowed-group")]
    allowed_group: Option<String>,
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlNotificationRule {
    #[serde(rename = "rule-name")]
    rule_name: String,
    #[serde(rename = "notification-module-name")]
    notification_module_name: String,
    #[serde(rename = "notification-name")]
    notification_name: String,
    #[serde(rename = "allowed-rights")]
    allowed_rights: Option<String>,
    #[serde(rename = "allowed-group")]
    allowed_group: Option<String>,
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlCmdRule {
    #[serde(rename = "rule-name")]
    rule_name: String,
    context: Option<String>,
    command: Option<String>,
    #[serde(rename = "allowed-rights")]
    allowed_rights: Option<String>,
    #[serde(rename = "allowed-group")]
    allowed_group: Option<String>,
    #[serde(rename = "log-if-permit")]
    log_if_permit: Option<bool>,
    #[serde(rename = "log-if-deny")]
    log_if_deny: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
    <config>
      <nacm>
        <enable-nacm>true</enable-nacm>
        <read-default>deny</read-default>
        <write-default>deny</write-default>
        <exec-default>deny</exec-default>
        <groups>
          <group><name>admin</name><user-name>alice</user-name></group>
          <group><name>oper</name><user-name>bob</user-name></group>
        </groups>
        <rules>
          <rpc-rule>
            <rule-name>any-rpc</rule-name>
            <rpc-module-name>*</rpc-module-name>
            <rpc-name>*</rpc-name>
            <allowed-rights>exec</allowed-rights>
            <allowed-group>admin</allowed-group>
          </rpc-rule>
          <data-rule>
            <rule-name>misc-read</rule-name>
            <path>/misc</path>
            <allowed-rights>read</allowed-rights>
            <allowed-group>oper</allowed-group>
          </data-rule>
        </rules>
      </nacm>
    </config>"#;

    #[test]
    fn parses_groups_and_rule_kinds() {
        let config = NacmConfig::from_xml(SAMPLE).unwrap();
        assert!(config.enable_nacm);
        assert_eq!(config.groups.len(), 2);
        assert_eq!(config.rpc_rules.len(), 1);
        assert_eq!(config.data_rules.len(), 1);
        assert!(config.rpc_rules[0].allowed_rights.exec);
    }

    #[test]
    fn user_groups_looks_up_membership() {
        let config = NacmConfig::from_xml(SAMPLE).unwrap();
        assert_eq!(config.user_groups("alice"), vec!["admin"]);
        assert!(config.user_groups("nobody").is_empty());
    }

    #[test]
    fn wildcard_allowed_rights_grants_everything() {
        let rights = AllowedRights::parse_bits("*").unwrap();
        assert!(rights.read && rights.write && rights.exec);
    }

    #[test]
    fn missing_defaults_fall_back_to_rfc_8341_table() {
        const NO_DEFAULTS: &str = r#"
        <config>
          <nacm>
            <enable-nacm>true</enable-nacm>
            <groups></groups>
          </nacm>
        </config>"#;
        let config = NacmConfig::from_xml(NO_DEFAULTS).unwrap();
        assert_eq!(config.read_default, RuleEffect::Permit);
        assert_eq!(config.write_default, RuleEffect::Deny);
        assert_eq!(config.exec_default, RuleEffect::Permit);
    }
}
