//! Schema-nodeid resolution: walking `[/] step (/step)*` through a schema
//! tree.
//!
//! Full YANG schema compilation is out of scope (spec.md SS1); this module
//! only needs enough of a schema tree to support the resolver contract
//! that the XPath validate phase and the NACM data-rule compiler both
//! depend on.

use std::collections::HashMap;

use crate::error::SchemaNodeidError;

/// A minimal schema node: just enough identity, module ownership and
/// augment-tracking to support resolution.
#[derive(Debug, Clone)]
pub struct SchemaObject {
    pub name: String,
    pub module: String,
    /// `true` if this object is a clone materialised by an `augment`
    /// statement rather than the node defined at this path originally.
    pub is_augment_clone: bool,
    pub children: Vec<SchemaObject>,
    pub secure: bool,
    pub very_secure: bool,
}

impl SchemaObject {
    pub fn new(name: impl Into<String>, module: impl Into<String>) -> Self {
        SchemaObject {
            name: name.into(),
            module: module.into(),
            is_augment_clone: false,
            children: Vec::new(),
            secure: false,
            very_secure: false,
        }
    }

    pub fn with_child(mut self, child: SchemaObject) -> Self {
        self.children.push(child);
        self
    }

    fn child(&self, module: &str, name: &str) -> Option<&SchemaObject> {
        self.children.iter().find(|c| c.name == name && c.module == module)
    }
}

/// A module's prefix-to-module-name import table, used to resolve
/// `prefix:name` steps. `local_prefix` is this module's own prefix: a step
/// using it is equivalent to an unqualified step in the local module.
#[derive(Debug, Clone, Default)]
pub struct ImportTable {
    pub local_module: String,
    pub local_prefix: String,
    pub imports: HashMap<String, String>,
}

impl ImportTable {
    pub fn resolve_prefix(&self, prefix: &str) -> Result<&str, SchemaNodeidError> {
        if prefix == self.local_prefix {
            return Ok(self.local_module.as_str());
        }
        self.imports
            .get(prefix)
            .map(|s| s.as_str())
            .ok_or_else(|| SchemaNodeidError::UnknownPrefix {
                prefix: prefix.to_string(),
                path_so_far: String::new(),
            })
    }
}

struct Step<'a> {
    prefix: Option<&'a str>,
    name: &'a str,
}

fn parse_steps(path: &str) -> Result<(bool, Vec<Step<'_>>), SchemaNodeidError> {
    if path.is_empty() {
        return Err(SchemaNodeidError::EmptyPath);
    }
    let absolute = path.starts_with('/');
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        return Err(SchemaNodeidError::EmptyPath);
    }
    let mut steps = Vec::new();
    for raw in trimmed.split('/') {
        if raw.is_empty() {
            continue;
        }
        let (prefix, name) = match raw.split_once(':') {
            Some((p, n)) => (Some(p), n),
            None => (None, raw),
        };
        if name.is_empty() || !name.chars().next().unwrap().is_alphabetic() {
            return Err(SchemaNodeidError::InvalidStep {
                step: raw.to_string(),
                path_so_far: String::new(),
            });
        }
        steps.push(Step { prefix, name });
    }
    Ok((absolute, steps))
}

fn resolve_inner<'a>(
    path: &str,
    base: &'a SchemaObject,
    imports: &ImportTable,
    log_errors: bool,
) -> Result<&'a SchemaObject, SchemaNodeidError> {
    let (_absolute, steps) = parse_steps(path)?;
    let mut current = base;
    let mut consumed = String::new();
    for step in steps {
        consumed.push('/');
        if let Some(p) = step.prefix {
            consumed.push_str(p);
            consumed.push(':');
        }
        consumed.push_str(step.name);

        let module = match step.prefix {
            Some(p) => imports.resolve_prefix(p).map_err(|_| SchemaNodeidError::UnknownPrefix {
                prefix: p.to_string(),
                path_so_far: consumed.clone(),
            })?,
            None => imports.local_module.as_str(),
        };

        let next = current.child(module, step.name).ok_or_else(|| SchemaNodeidError::NoSuchChild {
            step: step.name.to_string(),
            path_so_far: consumed.clone(),
        })?;

        if next.is_augment_clone {
            let err = SchemaNodeidError::AugmentClone {
                step: step.name.to_string(),
                path_so_far: consumed.clone(),
            };
            if log_errors {
                tracing::debug!(path = %consumed, "schema-nodeid: rejected augment clone");
            }
            return Err(err);
        }
        current = next;
    }
    Ok(current)
}

/// Resolve an absolute-or-relative schema-nodeid path starting from
/// `base`, logging on failure.
pub fn resolve<'a>(
    path: &str,
    base: &'a SchemaObject,
    imports: &ImportTable,
) -> Result<&'a SchemaObject, SchemaNodeidError> {
    let result = resolve_inner(path, base, imports, true);
    if let Err(ref e) = result {
        tracing::debug!(error = %e, "schema-nodeid resolution failed");
    }
    result
}

/// Same walk as [`resolve`] but never logs - used by runtime components
/// that must not emit errors for a failed lookup (e.g. speculative
/// existence checks).
pub fn resolve_noerr<'a>(
    path: &str,
    base: &'a SchemaObject,
    imports: &ImportTable,
) -> Result<&'a SchemaObject, SchemaNodeidError> {
    resolve_inner(path, base, imports, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (SchemaObject, ImportTable) {
        let tree = SchemaObject::new("top", "ex").with_child(
            SchemaObject::new("interfaces", "ex").with_child(SchemaObject::new("interface", "ex")),
        );
        let imports = ImportTable { local_module: "ex".into(), local_prefix: "ex".into(), imports: Default::default() };
        (tree, imports)
    }

    #[test]
    fn resolves_relative_path() {
        let (tree, imports) = fixture();
        let obj = resolve("interfaces/interface", &tree, &imports).unwrap();
        assert_eq!(obj.name, "interface");
    }

    #[test]
    fn resolution_is_idempotent_and_does_not_mutate() {
        let (tree, imports) = fixture();
        let first = resolve("interfaces", &tree, &imports).unwrap().name.clone();
        let second = resolve("interfaces", &tree, &imports).unwrap().name.clone();
        assert_eq!(first, second);
        assert_eq!(tree.children.len(), 1);
    }

    #[test]
    fn unknown_prefix_is_an_error_with_path_so_far() {
        let (tree, imports) = fixture();
        let err = resolve("bogus:interfaces", &tree, &imports).unwrap_err();
        match err {
            SchemaNodeidError::UnknownPrefix { prefix, path_so_far } => {
                assert_eq!(prefix, "bogus");
                assert_eq!(path_so_far, "/bogus:interfaces");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn same_module_different_prefix_is_local() {
        let (tree, _) = fixture();
        let imports = ImportTable {
            local_module: "ex".into(),
            local_prefix: "x".into(),
            imports: Default::default(),
        };
        let obj = resolve("x:interfaces", &tree, &imports).unwrap();
        assert_eq!(obj.name, "interfaces");
    }

    #[test]
    fn rejects_augment_clone() {
        let mut tree = SchemaObject::new("top", "ex");
        let mut clone = SchemaObject::new("interfaces", "ex");
        clone.is_augment_clone = true;
        tree.children.push(clone);
        let imports = ImportTable { local_module: "ex".into(), local_prefix: "ex".into(), imports: Default::default() };
        let err = resolve("interfaces", &tree, &imports).unwrap_err();
        assert!(matches!(err, SchemaNodeidError::AugmentClone { .. }));
    }
}
