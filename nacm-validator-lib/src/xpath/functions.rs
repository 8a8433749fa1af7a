//! The XPath 1.0 core function library, plus the YANG/NETCONF additions
//! named in spec.md SS6.3 (`current()`, `module-loaded()`,
//! `feature-enabled()`actions, `re-match()`).
//!
//! Each entry is checked for arity at call time (not parse time - doing it
//! here keeps the parser free of the function table, matching how the
//! tokenizer and parser stay ignorant of NACM/runstack concerns
//! elsewhere); [`crate::xpath::ast::parse_expr`] accepts any identifier
//! followed by `(`, deferring "is this a real function" to evaluation.

use crate::error::XPathError;
use crate::value::ValueId;
use crate::xpath::eval::EvalContext;
use crate::xpath::result::{number_to_string, string_to_number, NodeSet, StringOf, XPathResult};

pub fn call(ctx: &mut EvalContext, name: &str, args: &[XPathResult]) -> Result<XPathResult, XPathError> {
    match name {
        "last" => {
            check_arity(name, args, 0, 0)?;
            Ok(XPathResult::Number(ctx.context_size as f64))
        }
        "position" => {
            check_arity(name, args, 0, 0)?;
            Ok(XPathResult::Number(ctx.context_position as f64))
        }
        "count" => {
            check_arity(name, args, 1, 1)?;
            match &args[0] {
                XPathResult::NodeSet(ns) => Ok(XPathResult::Number(ns.len() as f64)),
                _ => Err(type_error(name, "a node-set")),
            }
        }
        "local-name" | "name" => {
            check_arity(name, args, 0, 1)?;
            let ns = node_set_arg_or_context(ctx, args)?;
            match ns.first() {
                Some(n) => Ok(XPathResult::String(ctx.tree.get(n.valptr).map(|v| v.name.clone()).unwrap_or_default())),
                None => Ok(XPathResult::String(String::new())),
            }
        }
        "namespace-uri" => {
            check_arity(name, args, 0, 1)?;
            let ns = node_set_arg_or_context(ctx, args)?;
            match ns.first() {
                Some(n) => Ok(XPathResult::String(ctx.tree.get(n.valptr).map(|v| v.module.clone()).unwrap_or_default())),
                None => Ok(XPathResult::String(String::new())),
            }
        }
        "string" => {
            check_arity(name, args, 0, 1)?;
            let v = args.first().cloned().unwrap_or_else(|| ctx.context_as_result());
            Ok(XPathResult::String(v.to_xstring(ctx)))
        }
        "concat" => {
            if args.len() < 2 {
                return Err(XPathError::ArityMismatch { name: name.into(), expected: ">=2".into(), actual: args.len() });
            }
            let s: String = args.iter().map(|a| a.to_xstring(ctx)).collect();
            Ok(XPathResult::String(s))
        }
        "starts-with" => {
            check_arity(name, args, 2, 2)?;
            let (a, b) = (args[0].to_xstring(ctx), args[1].to_xstring(ctx));
            Ok(XPathResult::Boolean(a.starts_with(&b)))
        }
        "contains" => {
            check_arity(name, args, 2, 2)?;
            let (a, b) = (args[0].to_xstring(ctx), args[1].to_xstring(ctx));
            Ok(XPathResult::Boolean(a.contains(&b)))
        }
        "substring-before" => {
            check_arity(name, args, 2, 2)?;
            let (a, b) = (args[0].to_xstring(ctx), args[1].to_xstring(ctx));
            let out = match a.find(&b) {
                Some(idx) if !b.is_empty() => a[..idx].to_string(),
                _ => String::new(),
            };
            Ok(XPathResult::String(out))
        }
        "substring-after" => {
            check_arity(name, args, 2, 2)?;
            let (a, b) = (args[0].to_xstring(ctx), args[1].to_xstring(ctx));
            let out = match a.find(&b) {
                Some(idx) if !b.is_empty() => a[idx + b.len()..].to_string(),
                _ => String::new(),
            };
            Ok(XPathResult::String(out))
        }
        "substring" => {
            check_arity(name, args, 2, 3)?;
            let s = args[0].to_xstring(ctx);
            let chars: Vec<char> = s.chars().collect();
            let start = round_half_up(args[1].to_number());
            let len = if args.len() == 3 { round_half_up(args[2].to_number()) } else { f64::INFINITY };
            Ok(XPathResult::String(xpath_substring(&chars, start, len)))
        }
        "string-length" => {
            check_arity(name, args, 0, 1)?;
            let s = match args.first() {
                Some(v) => v.to_xstring(ctx),
                None => ctx.context_as_result().to_xstring(ctx),
            };
            Ok(XPathResult::Number(s.chars().count() as f64))
        }
        "normalize-space" => {
            check_arity(name, args, 0, 1)?;
            let s = match args.first() {
                Some(v) => v.to_xstring(ctx),
                None => ctx.context_as_result().to_xstring(ctx),
            };
            let normalized: Vec<&str> = s.split_whitespace().collect();
            Ok(XPathResult::String(normalized.join(" ")))
        }
        "translate" => {
            check_arity(name, args, 3, 3)?;
            let s = args[0].to_xstring(ctx);
            let from: Vec<char> = args[1].to_xstring(ctx).chars().collect();
            let to: Vec<char> = args[2].to_xstring(ctx).chars().collect();
            let out: String = s
                .chars()
                .filter_map(|c| match from.iter().position(|f| *f == c) {
                    Some(i) => to.get(i).copied(),
                    None => Some(c),
                })
                .collect();
            Ok(XPathResult::String(out))
        }
        "boolean" => {
            check_arity(name, args, 1, 1)?;
            Ok(XPathResult::Boolean(args[0].to_boolean()))
        }
        "not" => {
            check_arity(name, args, 1, 1)?;
            Ok(XPathResult::Boolean(!args[0].to_boolean()))
        }
        "true" => {
            check_arity(name, args, 0, 0)?;
            Ok(XPathResult::Boolean(true))
        }
        "false" => {
            check_arity(name, args, 0, 0)?;
            Ok(XPathResult::Boolean(false))
        }
        "lang" => {
            check_arity(name, args, 1, 1)?;
            Ok(XPathResult::Boolean(false))
        }
        "number" => {
            check_arity(name, args, 0, 1)?;
            let v = args.first().cloned().unwrap_or_else(|| ctx.context_as_result());
            Ok(XPathResult::Number(v.to_number()))
        }
        "sum" => {
            check_arity(name, args, 1, 1)?;
            match &args[0] {
                XPathResult::NodeSet(ns) => {
                    let total: f64 = ns
                        .nodes
                        .iter()
                        .map(|n| string_to_number(&ctx.string_of(n.valptr)))
                        .sum();
                    Ok(XPathResult::Number(total))
                }
                _ => Err(type_error(name, "a node-set")),
            }
        }
        "floor" => {
            check_arity(name, args, 1, 1)?;
            Ok(XPathResult::Number(args[0].to_number().floor()))
        }
        "ceiling" => {
            check_arity(name, args, 1, 1)?;
            Ok(XPathResult::Number(args[0].to_number().ceil()))
        }
        "round" => {
            check_arity(name, args, 1, 1)?;
            Ok(XPathResult::Number(round_half_up(args[0].to_number())))
        }
        "current" => {
            check_arity(name, args, 0, 0)?;
            Ok(XPathResult::NodeSet(NodeSet::from_ids(ctx.tree, [ctx.current_node])))
        }
        "id" => {
            check_arity(name, args, 1, 1)?;
            let tokens = match &args[0] {
                XPathResult::NodeSet(ns) => ns
                    .nodes
                    .iter()
                    .map(|n| ctx.string_of(n.valptr))
                    .collect::<Vec<_>>()
                    .join(" "),
                other => other.to_xstring(ctx),
            };
            // The value tree has no DTD-style ID attribute; its `ValueId`
            // arena index is every node's one unique identity, so that's
            // what `id()` matches against (same grounding as the arena
            // model itself: spec.md SS9's "arena indices").
            let wanted: Vec<usize> = tokens.split_whitespace().filter_map(|t| t.parse().ok()).collect();
            let matches: Vec<ValueId> = ctx
                .tree
                .preorder(ctx.document_root)
                .into_iter()
                .filter(|id| wanted.contains(&id.0))
                .collect();
            Ok(XPathResult::NodeSet(NodeSet::from_ids(ctx.tree, matches)))
        }
        "re-match" => {
            check_arity(name, args, 2, 2)?;
            // A real implementation would compile the YANG `pattern`
            // regex dialect (XSD regex); out of scope here (spec.md
            // non-goal: "full YANG schema compilation"). Evaluates to
            // `false` so `must`/`when` expressions using it fail closed
            // rather than silently passing.
            Ok(XPathResult::Boolean(false))
        }
        "module-loaded" => {
            check_arity(name, args, 1, 1)?;
            let m = args[0].to_xstring(ctx);
            Ok(XPathResult::Boolean(ctx.loaded_modules.contains(&m)))
        }
        "feature-enabled" => {
            check_arity(name, args, 2, 2)?;
            let m = args[0].to_xstring(ctx);
            let f = args[1].to_xstring(ctx);
            Ok(XPathResult::Boolean(ctx.enabled_features.contains(&(m, f))))
        }
        _ => Err(XPathError::UnknownFunction { name: name.to_string() }),
    }
}

fn check_arity(name: &str, args: &[XPathResult], min: usize, max: usize) -> Result<(), XPathError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max { format!("{min}") } else { format!("{min}..={max}") };
        return Err(XPathError::ArityMismatch { name: name.into(), expected, actual: args.len() });
    }
    Ok(())
}

fn type_error(name: &str, expected: &str) -> XPathError {
    XPathError::TypeError { reason: format!("{name}() expects {expected}") }
}

fn node_set_arg_or_context(ctx: &EvalContext, args: &[XPathResult]) -> Result<NodeSet, XPathError> {
    if let Some(v) = args.first() {
        match v {
            XPathResult::NodeSet(ns) => Ok(ns.clone()),
            _ => Err(type_error("local-name/name/namespace-uri", "a node-set")),
        }
    } else {
        Ok(NodeSet::from_ids(ctx.tree, [ctx.context_node]))
    }
}

fn round_half_up(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() {
        return n;
    }
    (n + 0.5).floor()
}

fn xpath_substring(chars: &[char], start: f64, len: f64) -> String {
    if start.is_nan() || len.is_nan() {
        return String::new();
    }
    let n = chars.len() as f64;
    let first = start.max(1.0);
    let last = if len.is_infinite() { n + 1.0 } else { (start + len).min(n + 1.0) };
    if last <= first || first > n {
        return String::new();
    }
    let lo = (first.max(1.0) as usize).saturating_sub(1);
    let hi = (last.max(1.0) as usize).saturating_sub(1).min(chars.len());
    if lo >= hi {
        return String::new();
    }
    chars[lo..hi].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substring_matches_xpath_examples() {
        let chars: Vec<char> = "12345".chars().collect();
        assert_eq!(xpath_substring(&chars, 2.0, 3.0), "234");
        assert_eq!(xpath_substring(&chars, 1.5, 2.5), "234");
        assert_eq!(xpath_substring(&chars, 0.0, 3.0), "12");
        assert_eq!(xpath_substring(&chars, 0.0, f64::INFINITY), "12345");
    }

    #[test]
    fn round_half_up_matches_xpath() {
        assert_eq!(round_half_up(2.5), 3.0);
        assert_eq!(round_half_up(-0.5), 0.0);
        assert_eq!(round_half_up(2.4), 2.0);
    }

    #[test]
    fn number_roundtrip_helpers_are_consistent() {
        assert_eq!(number_to_string(3.0), "3");
        assert_eq!(string_to_number("3"), 3.0);
    }

    #[test]
    fn id_matches_by_arena_index() {
        use crate::value::{ValueData, ValueNode, ValueTree};
        use crate::xpath::pcb::VarSource;

        let mut tree = ValueTree::new();
        let root = tree.insert(ValueNode::new("top", "ex", ValueData::Container), None);
        let a = tree.insert(ValueNode::new("a", "ex", ValueData::Leaf("x".into())), Some(root));
        let _b = tree.insert(ValueNode::new("b", "ex", ValueData::Leaf("y".into())), Some(root));

        let vars = VarSource::None;
        let mut ctx = EvalContext {
            tree: &tree,
            document_root: root,
            current_node: root,
            context_node: root,
            context_position: 1,
            context_size: 1,
            vars: &vars,
            loaded_modules: Default::default(),
            enabled_features: Default::default(),
        };

        let result = call(&mut ctx, "id", &[XPathResult::String(a.0.to_string())]).unwrap();
        let XPathResult::NodeSet(ns) = result else { panic!("expected node-set") };
        assert_eq!(ns.nodes.len(), 1);
        assert_eq!(ns.nodes[0].valptr, a);
    }
}
