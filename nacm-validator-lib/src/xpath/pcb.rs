//! The parser control block: owns one compiled XPath expression across
//! its three phases (parse, validate, evaluate), per spec.md SS3 "PCB"
//! and SS4.3.

use crate::token::{tokenize, SourceKind, TokenChain};
use crate::value::ValueId;
use crate::xpath::ast::Expr;
use crate::xpath::result::XPathResult;
use crate::error::XPathError;

/// What kind of expression this PCB holds; each source kind restricts the
/// grammar slightly (spec.md SS4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcbSource {
    LeafrefPath,
    YangMustWhen,
    InstanceIdentifier,
    SchemaInstanceIdentifier,
    XmlSelect,
}

/// Which bound object the PCB is currently traversing relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalMode {
    Target,
    Alt,
    Key,
}

/// Document kind of the runtime context, used by `current()` and
/// document-kind-sensitive functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Config,
    Rpc,
    RpcReply,
    Notification,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PcbFlags {
    pub dynamic: bool,
    pub short_circuit: bool,
    pub config_only: bool,
    pub root_usage: bool,
    pub instance_id_restricted: bool,
    pub schema_instance_id_restricted: bool,
    /// When set, a missing schema/value node during evaluation is an
    /// error rather than a warning (spec.md SS4.4 "Errors").
    pub missing_is_error: bool,
}

/// A bound `$name` -> value, or the alternative getvar callback (spec.md
/// SS3: "a variable-binding queue and a variable lookup callback (the two
/// are alternatives)").
pub enum VarSource {
    Bound(Vec<(String, XPathResult)>),
    Callback(Box<dyn Fn(&str) -> Option<XPathResult>>),
    None,
}

impl std::fmt::Debug for VarSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VarSource::Bound(v) => f.debug_tuple("Bound").field(&v.len()).finish(),
            VarSource::Callback(_) => f.write_str("Callback(..)"),
            VarSource::None => f.write_str("None"),
        }
    }
}

impl VarSource {
    pub fn lookup(&self, name: &str) -> Option<XPathResult> {
        match self {
            VarSource::Bound(vars) => vars.iter().find(|(n, _)| n == name).map(|(_, v)| v.clone()),
            VarSource::Callback(cb) => cb(name),
            VarSource::None => None,
        }
    }
}

const RESULT_CACHE_MAX: usize = 16;
const RESNODE_CACHE_MAX: usize = 64;

/// A bounded cache: once full, further pushes just fall back to plain
/// allocation rather than growing the cache (spec.md SS5 resource
/// policy), modelled here simply as a `Vec` capped to `MAX` in the getter
/// and otherwise handled as ordinary heap storage by the caller.
#[derive(Debug, Clone, Default)]
pub struct BoundedCache<T> {
    items: Vec<T>,
    max: usize,
}

impl<T> BoundedCache<T> {
    fn with_max(max: usize) -> Self {
        BoundedCache { items: Vec::new(), max }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() < self.max {
            self.items.push(item);
        }
        // overflow: silently dropped from the cache; caller already has
        // its own owned copy of `item`'s source value, this is purely an
        // opportunistic reuse cache.
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseStatus {
    NotRun,
    Ok,
    Failed,
}

/// Owns one compiled XPath expression across parse/validate/evaluate.
pub struct Pcb {
    pub source: PcbSource,
    pub raw_expr: String,
    pub chain: TokenChain,
    pub expr: Option<Expr>,

    pub traversal_mode: TraversalMode,
    pub document_kind: DocumentKind,
    pub context_node: Option<ValueId>,
    pub document_root: Option<ValueId>,

    pub flags: PcbFlags,
    pub vars: VarSource,

    pub result_cache: BoundedCache<XPathResult>,
    pub resnode_cache: BoundedCache<ValueId>,

    pub parse_result: PhaseStatus,
    pub validate_result: PhaseStatus,
    pub value_result: PhaseStatus,
}

impl Pcb {
    pub fn new(source: PcbSource, raw_expr: impl Into<String>) -> Self {
        Pcb {
            source,
            raw_expr: raw_expr.into(),
            chain: TokenChain::new(SourceKind::Xpath),
            expr: None,
            traversal_mode: TraversalMode::Target,
            document_kind: DocumentKind::Config,
            context_node: None,
            document_root: None,
            flags: PcbFlags::default(),
            vars: VarSource::None,
            result_cache: BoundedCache::with_max(RESULT_CACHE_MAX),
            resnode_cache: BoundedCache::with_max(RESNODE_CACHE_MAX),
            parse_result: PhaseStatus::NotRun,
            validate_result: PhaseStatus::NotRun,
            value_result: PhaseStatus::NotRun,
        }
    }

    /// Phase 1: tokenize and build the expression tree. Subsequent phases
    /// are gated on this succeeding.
    pub fn parse(&mut self) -> Result<(), XPathError> {
        match self.try_parse() {
            Ok(()) => {
                self.parse_result = PhaseStatus::Ok;
                Ok(())
            }
            Err(e) => {
                self.parse_result = PhaseStatus::Failed;
                Err(e)
            }
        }
    }

    fn try_parse(&mut self) -> Result<(), XPathError> {
        let chain = tokenize(&self.raw_expr, SourceKind::Xpath, false)?;
        let expr = crate::xpath::ast::parse_expr(&chain)?;
        self.chain = chain;
        self.expr = Some(expr);
        Ok(())
    }

    /// Phase 2: in the full engine this re-walks the expression against
    /// the cooked schema tree. Here it is a cheap structural check that
    /// the parse phase actually produced a tree, gated the same way.
    pub fn validate(&mut self) -> Result<(), XPathError> {
        if self.parse_result != PhaseStatus::Ok {
            self.validate_result = PhaseStatus::Failed;
            return Err(XPathError::PhaseGated);
        }
        if self.expr.is_none() {
            self.validate_result = PhaseStatus::Failed;
            return Err(XPathError::MalformedExpression { reason: "no compiled expression".into() });
        }
        self.validate_result = PhaseStatus::Ok;
        Ok(())
    }

    pub fn ready_to_evaluate(&self) -> bool {
        self.parse_result == PhaseStatus::Ok && self.validate_result == PhaseStatus::Ok
    }

    /// Clone compiled state and schema bindings; cached results and the
    /// evaluation context are reset (spec.md SS4.3 "A PCB may be cloned").
    pub fn clone_fresh(&self) -> Pcb {
        Pcb {
            source: self.source,
            raw_expr: self.raw_expr.clone(),
            chain: tokenize(&self.raw_expr, SourceKind::Xpath, false).unwrap_or_else(|_| TokenChain::new(SourceKind::Xpath)),
            expr: self.expr.clone(),
            traversal_mode: self.traversal_mode,
            document_kind: self.document_kind,
            context_node: None,
            document_root: None,
            flags: self.flags,
            vars: VarSource::None,
            result_cache: BoundedCache::with_max(RESULT_CACHE_MAX),
            resnode_cache: BoundedCache::with_max(RESNODE_CACHE_MAX),
            parse_result: self.parse_result,
            validate_result: self.validate_result,
            value_result: PhaseStatus::NotRun,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_short_circuit_on_parse_failure() {
        let mut pcb = Pcb::new(PcbSource::YangMustWhen, "\"unterminated");
        assert!(pcb.parse().is_err());
        assert_eq!(pcb.parse_result, PhaseStatus::Failed);
        let err = pcb.validate().unwrap_err();
        assert!(matches!(err, XPathError::PhaseGated));
    }

    #[test]
    fn clone_fresh_resets_caches_and_context() {
        let mut pcb = Pcb::new(PcbSource::LeafrefPath, "/a/b");
        pcb.parse().unwrap();
        pcb.validate().unwrap();
        pcb.result_cache.push(XPathResult::Boolean(true));
        pcb.context_node = Some(ValueId(3));
        let clone = pcb.clone_fresh();
        assert_eq!(clone.result_cache.len(), 0);
        assert!(clone.context_node.is_none());
        assert_eq!(clone.parse_result, PhaseStatus::Ok);
        assert_eq!(clone.validate_result, PhaseStatus::Ok);
    }
}
