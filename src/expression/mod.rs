//! Metadata expression compiler.
//!
//! Projects a database object selection tree into a flat string, e.g.
//! `db1.table1,db2.table2`, driven by a `MetadataExpression`:
//!
//! - `meta_type_required` is the type path a branch must follow, in order.
//!   Tree levels whose type is not on the path are skipped.
//! - A branch is emitted when it reaches the last required type, wrapped in
//!   `prefix`/`suffix` with its path joined by `meta_type_connect_symbol`.
//! - Emitted branches are joined by `meta_obj_connect_symbol`.
//!
//! Also hosts the `${var}` substitution used for expression literals and
//! free-form worker settings.

use std::collections::BTreeMap;

use crate::api::{MetaType, MetadataExpression, MetadataObject, SelectMode};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpressionError {
    #[error("unterminated variable in template: {0}")]
    UnterminatedVariable(String),
}

/// Compile one object subtree.
///
/// `path` is the names matched so far along this branch. It is owned by the
/// call, so siblings never observe each other's matches.
pub fn compile(
    expr: &MetadataExpression,
    required: &[MetaType],
    node: &MetadataObject,
    mut path: Vec<String>,
    is_source: bool,
) -> String {
    if expr.is_empty() || node.name.is_empty() || required.is_empty() {
        return path.join(&expr.meta_type_connect_symbol);
    }

    let matched = required.iter().position(|t| *t == node.meta_type);

    if matched.is_some() && required.len() == 1 {
        let selected = match expr.select_mode {
            SelectMode::Involved => true,
            SelectMode::Exactly => node.is_all,
        };
        if !selected {
            return String::new();
        }
        path.push(node.effective_name(is_source).to_string());
        let joined = path.join(&expr.meta_type_connect_symbol);
        if joined.is_empty() {
            return String::new();
        }
        return format!("{}{}{}", expr.prefix, joined, expr.suffix);
    }

    if node.child.is_empty() {
        return String::new();
    }

    let remaining = match matched {
        Some(idx) => {
            path.push(node.effective_name(is_source).to_string());
            &required[idx + 1..]
        }
        None => required,
    };

    node.child
        .iter()
        .map(|child| compile(expr, remaining, child, path.clone(), is_source))
        .filter(|out| !out.is_empty())
        .collect::<Vec<_>>()
        .join(&expr.meta_obj_connect_symbol)
}

/// Compile every top-level object and join the non-empty results.
pub fn compile_objects(
    expr: &MetadataExpression,
    objects: &[MetadataObject],
    is_source: bool,
) -> String {
    if expr.is_empty() || objects.is_empty() {
        return String::new();
    }
    objects
        .iter()
        .map(|obj| compile(expr, &expr.meta_type_required, obj, Vec::new(), is_source))
        .filter(|out| !out.is_empty())
        .collect::<Vec<_>>()
        .join(&expr.meta_obj_connect_symbol)
}

/// Replace `${name}` references with values from `vars`.
///
/// Unknown names are left in place.
pub fn substitute(
    template: &str,
    vars: &BTreeMap<String, String>,
) -> Result<String, ExpressionError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| ExpressionError::UnterminatedVariable(template.to_string()))?;
        let name = after[..end].trim();
        match vars.get(name) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests;
