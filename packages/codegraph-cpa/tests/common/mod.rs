//! Shared fixtures for integration tests

#![allow(dead_code)]

use codegraph_cpa::features::cpa::{ObjectSet, ResultStore, TypeDesc};
use codegraph_cpa::features::ir::{walk_stmts, CodeId, Expr, NodeId, Program};
use std::collections::BTreeSet;

/// First call in `code` whose callee is the variable `name` or whose method is `name`
pub fn call_node(program: &Program, code: CodeId, name: &str) -> NodeId {
    let mut found = None;
    walk_stmts(&program.code(code).body, &mut |stmt| {
        for expr in stmt.exprs() {
            expr.walk(&mut |e| {
                let hit = match e {
                    Expr::Call { callee, .. } => {
                        matches!(callee.as_ref(), Expr::Global(g) | Expr::Local(g) if g == name)
                    }
                    Expr::MethodCall { attr, .. } => attr == name,
                    _ => false,
                };
                if hit && found.is_none() {
                    found = e.node();
                }
            });
        }
    });
    found.unwrap_or_else(|| panic!("no call to {} in {:?}", name, code))
}

pub fn types(results: &ResultStore, objects: &ObjectSet) -> BTreeSet<TypeDesc> {
    objects.iter().map(|o| results.object(o).ty).collect()
}

pub fn code(program: &Program, name: &str) -> CodeId {
    program
        .code_by_name(name)
        .unwrap_or_else(|| panic!("no code named {}", name))
}
