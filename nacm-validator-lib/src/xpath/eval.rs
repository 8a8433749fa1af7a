//! Recursive-descent evaluator walking the [`Expr`] tree produced by the
//! parse phase against a live [`ValueTree`], per spec.md SS4.4.
//!
//! Comparison and conversion rules follow XPath 1.0 SS3.4 exactly: a
//! node-set compared against anything else converts the other side
//! per-node and is true if any pairing matches; two node-sets compared
//! against each other convert both sides to strings per-node; everything
//! else falls back to boolean, then number, then string coercion as
//! XPath 1.0 SS3.4 Table 1 specifies.

use std::collections::HashSet;

use crate::error::XPathError;
use crate::value::{ValueId, ValueTree};
use crate::xpath::ast::{ArithOp, Axis, CompareOp, Expr, NodeTest, PathExpr, StepNode};
use crate::xpath::functions;
use crate::xpath::pcb::{Pcb, VarSource};
use crate::xpath::result::{NodeSet, ResNode, StringOf, XPathResult};

pub struct EvalContext<'a> {
    pub tree: &'a ValueTree,
    pub document_root: ValueId,
    /// The node `current()` resolves to - fixed for the whole evaluation,
    /// unlike the context node which changes inside predicates and steps.
    pub current_node: ValueId,
    pub context_node: ValueId,
    pub context_position: usize,
    pub context_size: usize,
    pub vars: &'a VarSource,
    pub loaded_modules: HashSet<String>,
    pub enabled_features: HashSet<(String, String)>,
}

impl<'a> StringOf for EvalContext<'a> {
    fn string_of(&self, id: ValueId) -> String {
        string_value(self.tree, id)
    }
}

impl<'a> EvalContext<'a> {
    pub fn context_as_result(&self) -> XPathResult {
        XPathResult::NodeSet(NodeSet::from_ids(self.tree, [self.context_node]))
    }
}

/// The string-value of a node per XPath 1.0 SS5: for a leaf, its value; for
/// a leaf-list, its first member's value (leaf-lists rarely appear bare in
/// a string context, but this keeps the function total); for a container
/// or list, the concatenation of all descendant leaf text in document
/// order.
fn string_value(tree: &ValueTree, id: ValueId) -> String {
    let Some(node) = tree.get(id) else { return String::new() };
    match &node.data {
        crate::value::ValueData::Leaf(s) => s.clone(),
        crate::value::ValueData::LeafList(items) => items.first().cloned().unwrap_or_default(),
        crate::value::ValueData::Container | crate::value::ValueData::List => tree
            .preorder(id)
            .into_iter()
            .filter_map(|d| match &tree.get(d).unwrap().data {
                crate::value::ValueData::Leaf(s) => Some(s.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(""),
    }
}

/// Evaluate a fully parsed-and-validated PCB's expression against
/// `context_node`, which must belong to `tree`.
pub fn evaluate(pcb: &Pcb, tree: &ValueTree, document_root: ValueId, context_node: ValueId) -> Result<XPathResult, XPathError> {
    if !pcb.ready_to_evaluate() {
        return Err(XPathError::PhaseGated);
    }
    let expr = pcb.expr.as_ref().ok_or(XPathError::PhaseGated)?;
    let mut ctx = EvalContext {
        tree,
        document_root,
        current_node: context_node,
        context_node,
        context_position: 1,
        context_size: 1,
        vars: &pcb.vars,
        loaded_modules: HashSet::new(),
        enabled_features: HashSet::new(),
    };
    eval_expr(&mut ctx, expr)
}

fn eval_expr(ctx: &mut EvalContext, expr: &Expr) -> Result<XPathResult, XPathError> {
    match expr {
        Expr::Or(l, r) => {
            if eval_expr(ctx, l)?.to_boolean() {
                return Ok(XPathResult::Boolean(true));
            }
            Ok(XPathResult::Boolean(eval_expr(ctx, r)?.to_boolean()))
        }
        Expr::And(l, r) => {
            if !eval_expr(ctx, l)?.to_boolean() {
                return Ok(XPathResult::Boolean(false));
            }
            Ok(XPathResult::Boolean(eval_expr(ctx, r)?.to_boolean()))
        }
        Expr::Compare(op, l, r) => {
            let lv = eval_expr(ctx, l)?;
            let rv = eval_expr(ctx, r)?;
            Ok(XPathResult::Boolean(compare(ctx, *op, &lv, &rv)))
        }
        Expr::Arith(op, l, r) => {
            let lv = eval_expr(ctx, l)?.to_number();
            let rv = eval_expr(ctx, r)?.to_number();
            let n = match op {
                ArithOp::Add => lv + rv,
                ArithOp::Sub => lv - rv,
                ArithOp::Mul => lv * rv,
                ArithOp::Div => lv / rv,
                ArithOp::Mod => {
                    let m = lv % rv;
                    m
                }
            };
            Ok(XPathResult::Number(n))
        }
        Expr::Union(l, r) => {
            let lv = eval_expr(ctx, l)?;
            let rv = eval_expr(ctx, r)?;
            match (lv, rv) {
                (XPathResult::NodeSet(a), XPathResult::NodeSet(b)) => {
                    let ids = a.nodes.into_iter().chain(b.nodes).map(|n| n.valptr);
                    Ok(XPathResult::NodeSet(NodeSet::from_ids(ctx.tree, ids)))
                }
                _ => Err(XPathError::TypeError { reason: "union operands must be node-sets".into() }),
            }
        }
        Expr::Negate(inner) => Ok(XPathResult::Number(-eval_expr(ctx, inner)?.to_number())),
        Expr::Path(path) => Ok(XPathResult::NodeSet(eval_path(ctx, path)?)),
        Expr::FilterPath(base, path) => Ok(XPathResult::NodeSet(eval_filter_path(ctx, base, path)?)),
        Expr::FunctionCall(name, arg_exprs) => {
            let mut args = Vec::with_capacity(arg_exprs.len());
            for a in arg_exprs {
                args.push(eval_expr(ctx, a)?);
            }
            functions::call(ctx, name, &args)
        }
        Expr::VarRef(name) => ctx
            .vars
            .lookup(name)
            .ok_or_else(|| XPathError::UnresolvedVariable { name: name.clone() }),
        Expr::NumberLit(n) => Ok(XPathResult::Number(*n)),
        Expr::StringLit(s) => Ok(XPathResult::String(s.clone())),
    }
}

fn compare(ctx: &mut EvalContext, op: CompareOp, l: &XPathResult, r: &XPathResult) -> bool {
    use XPathResult::*;

    // A node-set compared against a boolean converts the whole node-set to
    // boolean (non-empty -> true), not per-node (XPath 1.0 SS3.4).
    if matches!(l, Boolean(_)) || matches!(r, Boolean(_)) {
        let lb = l.to_boolean();
        let rb = r.to_boolean();
        return match op {
            CompareOp::Eq => lb == rb,
            CompareOp::Ne => lb != rb,
            _ => cmp_ordered(op, lb as i32 as f64, rb as i32 as f64),
        };
    }

    match (l, r) {
        (NodeSet(a), NodeSet(b)) => a.nodes.iter().any(|na| {
            let ls = ctx.string_of(na.valptr);
            b.nodes
                .iter()
                .any(|nb| compare_scalars(op, &Cmp::Str(ls.clone()), &Cmp::Str(ctx.string_of(nb.valptr))))
        }),
        (NodeSet(a), other) => {
            let rc: Cmp = other.clone().into();
            a.nodes.iter().any(|n| compare_scalars(op, &node_cmp_as(&rc, ctx.string_of(n.valptr)), &rc))
        }
        (other, NodeSet(b)) => {
            let lc: Cmp = other.clone().into();
            b.nodes.iter().any(|n| compare_scalars(op, &lc, &node_cmp_as(&lc, ctx.string_of(n.valptr))))
        }
        _ => compare_scalars(op, &Cmp::from(l.clone()), &Cmp::from(r.clone())),
    }
}

/// A tiny internal comparison value that coerces per XPath 1.0 SS3.4 rules
/// depending on which side of the comparison it plays.
enum Cmp {
    Num(f64),
    Str(String),
}

impl From<XPathResult> for Cmp {
    fn from(v: XPathResult) -> Self {
        match v {
            XPathResult::Number(n) => Cmp::Num(n),
            XPathResult::String(s) => Cmp::Str(s),
            XPathResult::Boolean(b) => Cmp::Str(if b { "true".into() } else { "false".into() }),
            XPathResult::NodeSet(_) => Cmp::Str(String::new()),
        }
    }
}

/// A node's string-value, converted to match the "kind" of `other` so a
/// node-set-vs-scalar comparison compares like with like (number-to-number
/// when `other` is a number, string-to-string otherwise).
fn node_cmp_as(other: &Cmp, node_string: String) -> Cmp {
    match other {
        Cmp::Num(_) => Cmp::Num(crate::xpath::result::string_to_number(&node_string)),
        Cmp::Str(_) => Cmp::Str(node_string),
    }
}

fn compare_scalars(op: CompareOp, l: &Cmp, r: &Cmp) -> bool {
    match op {
        CompareOp::Eq | CompareOp::Ne => {
            // Equality: if either side is a number, both convert to number;
            // otherwise both convert to string.
            if matches!(l, Cmp::Num(_)) || matches!(r, Cmp::Num(_)) {
                let (ln, rn) = (cmp_to_num(l), cmp_to_num(r));
                if op == CompareOp::Eq { ln == rn } else { ln != rn }
            } else {
                let (ls, rs) = (cmp_to_str(l), cmp_to_str(r));
                if op == CompareOp::Eq { ls == rs } else { ls != rs }
            }
        }
        _ => cmp_ordered(op, cmp_to_num(l), cmp_to_num(r)),
    }
}

fn cmp_ordered(op: CompareOp, l: f64, r: f64) -> bool {
    match op {
        CompareOp::Lt => l < r,
        CompareOp::Le => l <= r,
        CompareOp::Gt => l > r,
        CompareOp::Ge => l >= r,
        _ => unreachable!("non-relational op routed through cmp_ordered"),
    }
}

fn cmp_to_num(c: &Cmp) -> f64 {
    match c {
        Cmp::Num(n) => *n,
        Cmp::Str(s) => crate::xpath::result::string_to_number(s),
    }
}

fn cmp_to_str(c: &Cmp) -> String {
    match c {
        Cmp::Num(n) => crate::xpath::result::number_to_string(*n),
        Cmp::Str(s) => s.clone(),
    }
}

fn eval_path(ctx: &mut EvalContext, path: &PathExpr) -> Result<NodeSet, XPathError> {
    let mut current: Vec<ValueId> = if path.absolute { vec![ctx.document_root] } else { vec![ctx.context_node] };
    if path.leading_descendant {
        current = expand_descendant_or_self(ctx.tree, &current);
    }
    for step in &path.steps {
        current = apply_step(ctx, &current, step)?;
    }
    Ok(NodeSet::from_ids(ctx.tree, current))
}

/// Evaluates a `FilterExpr ('/' | '//') RelativeLocationPath`: the base
/// expression must yield a node-set, which seeds the step walk instead of
/// the context node or document root (unlike a plain [`PathExpr`]).
fn eval_filter_path(ctx: &mut EvalContext, base: &Expr, path: &PathExpr) -> Result<NodeSet, XPathError> {
    let base_result = eval_expr(ctx, base)?;
    let XPathResult::NodeSet(base_set) = base_result else {
        return Err(XPathError::TypeError { reason: "path continuation requires a node-set".into() });
    };
    let mut current: Vec<ValueId> = base_set.nodes.into_iter().map(|n| n.valptr).collect();
    if path.leading_descendant {
        current = expand_descendant_or_self(ctx.tree, &current);
    }
    for step in &path.steps {
        current = apply_step(ctx, &current, step)?;
    }
    Ok(NodeSet::from_ids(ctx.tree, current))
}

fn expand_descendant_or_self(tree: &ValueTree, input: &[ValueId]) -> Vec<ValueId> {
    let mut out = Vec::new();
    for &id in input {
        out.extend(tree.preorder(id));
    }
    out
}

fn apply_step(ctx: &mut EvalContext, input: &[ValueId], step: &StepNode) -> Result<Vec<ValueId>, XPathError> {
    let mut out = Vec::new();
    for &context_id in input {
        let candidates = axis_candidates(ctx.tree, context_id, step.axis);
        let mut filtered: Vec<ValueId> = candidates.into_iter().filter(|id| node_test_matches(ctx.tree, *id, &step.test)).collect();

        for pred in &step.predicates {
            let size = filtered.len();
            let saved = (ctx.context_node, ctx.context_position, ctx.context_size);
            let mut kept = Vec::with_capacity(filtered.len());
            for (i, id) in filtered.iter().enumerate() {
                ctx.context_node = *id;
                ctx.context_position = i + 1;
                ctx.context_size = size;
                let result = eval_expr(ctx, pred)?;
                let keep = match result {
                    XPathResult::Number(n) => n == (i + 1) as f64,
                    other => other.to_boolean(),
                };
                if keep {
                    kept.push(*id);
                }
            }
            (ctx.context_node, ctx.context_position, ctx.context_size) = saved;
            filtered = kept;
        }
        out.extend(filtered);
    }
    Ok(out)
}

fn axis_candidates(tree: &ValueTree, id: ValueId, axis: Axis) -> Vec<ValueId> {
    match axis {
        Axis::Child => tree.get(id).map(|n| n.children.clone()).unwrap_or_default(),
        Axis::Descendant => {
            let mut all = tree.preorder(id);
            if !all.is_empty() {
                all.remove(0);
            }
            all
        }
        Axis::DescendantOrSelf => tree.preorder(id),
        Axis::Parent => tree.get(id).and_then(|n| n.parent).into_iter().collect(),
        Axis::SelfAxis => vec![id],
        Axis::Attribute => Vec::new(),
        Axis::Ancestor => {
            let mut chain = tree.ancestors_or_self(id);
            if !chain.is_empty() {
                chain.remove(0);
            }
            chain
        }
        Axis::AncestorOrSelf => tree.ancestors_or_self(id),
    }
}

fn node_test_matches(tree: &ValueTree, id: ValueId, test: &NodeTest) -> bool {
    let Some(node) = tree.get(id) else { return false };
    match test {
        NodeTest::Wildcard => true,
        NodeTest::PrefixWildcard(prefix) => &node.module == prefix,
        NodeTest::Name { prefix: _, local } => &node.name == local,
    }
}

/// Shared helper so the NACM engine's fast-path can reuse document order
/// and ancestor containment without re-implementing node-set building.
pub fn resnode_for(tree: &ValueTree, id: ValueId) -> ResNode {
    let ns = NodeSet::from_ids(tree, [id]);
    ns.nodes.into_iter().next().unwrap_or(ResNode { valptr: id, position: 1, last_position: 1, is_descendant: false })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{ValueData, ValueNode};
    use crate::xpath::pcb::{Pcb, PcbSource};

    fn sample_tree() -> (ValueTree, ValueId) {
        let mut tree = ValueTree::new();
        let root = tree.insert(ValueNode::new("top", "ex", ValueData::Container), None);
        let ifs = tree.insert(ValueNode::new("interfaces", "ex", ValueData::Container), Some(root));
        let eth0 = tree.insert(ValueNode::new("interface", "ex", ValueData::Container), Some(ifs));
        let name = tree.insert(ValueNode::new("name", "ex", ValueData::Leaf("eth0".into())), Some(eth0));
        let _ = name;
        let eth1 = tree.insert(ValueNode::new("interface", "ex", ValueData::Container), Some(ifs));
        let _name1 = tree.insert(ValueNode::new("name", "ex", ValueData::Leaf("eth1".into())), Some(eth1));
        (tree, root)
    }

    fn eval_str(tree: &ValueTree, root: ValueId, expr: &str) -> XPathResult {
        let mut pcb = Pcb::new(PcbSource::XmlSelect, expr);
        pcb.parse().unwrap();
        pcb.validate().unwrap();
        pcb.document_root = Some(root);
        pcb.context_node = Some(root);
        evaluate(&pcb, tree, root, root).unwrap()
    }

    #[test]
    fn evaluates_absolute_path_to_nodeset() {
        let (tree, root) = sample_tree();
        let result = eval_str(&tree, root, "/interfaces/interface");
        match result {
            XPathResult::NodeSet(ns) => assert_eq!(ns.len(), 2),
            other => panic!("expected NodeSet, got {other:?}"),
        }
    }

    #[test]
    fn evaluates_predicate_by_key_value() {
        let (tree, root) = sample_tree();
        let result = eval_str(&tree, root, "/interfaces/interface[name='eth1']");
        match result {
            XPathResult::NodeSet(ns) => assert_eq!(ns.len(), 1),
            other => panic!("expected NodeSet, got {other:?}"),
        }
    }

    #[test]
    fn evaluates_count_function() {
        let (tree, root) = sample_tree();
        let result = eval_str(&tree, root, "count(/interfaces/interface)");
        assert_eq!(result, XPathResult::Number(2.0));
    }

    #[test]
    fn boolean_short_circuits_and() {
        let (tree, root) = sample_tree();
        let result = eval_str(&tree, root, "false() and count(/nonexistent)");
        assert_eq!(result, XPathResult::Boolean(false));
    }

    #[test]
    fn concat_and_string_functions() {
        let (tree, root) = sample_tree();
        let result = eval_str(&tree, root, "concat('a', 'b', 'c')");
        assert_eq!(result, XPathResult::String("abc".into()));
    }
}
