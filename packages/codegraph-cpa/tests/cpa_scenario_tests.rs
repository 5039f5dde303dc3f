//! End-to-end scenarios for the points-to analysis
//!
//! Each test builds a small program, analyzes it and checks the Result Store:
//! - aliasing and allocation
//! - dynamic dispatch along the MRO
//! - unresolved and partly unknown calls under both policies
//! - sessions driven step by step
//! - recursion under k-limiting and both widening strategies
//! - context policies, defaults, `*args`, builtins, exceptions
//! - malformed bodies, entry points, budget, export

mod common;

use codegraph_cpa::config::{CpaConfig, Preset, UnresolvedCallPolicy};
use codegraph_cpa::errors::CpaError;
use codegraph_cpa::features::cpa::{
    analyze, analyze_batch, AnalysisSession, AnalysisStatus, CallAnnotation, CallResolution,
    ContextId, ContextPolicy, PointsToQuery, StepOutcome, TypeDesc, WideningStrategy,
};
use codegraph_cpa::features::ir::{
    BuiltinType, Expr, Handler, Literal, Param, Program, ProgramBuilder, Stmt,
};
use common::{call_node, code, types};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;

const ROOT: ContextId = ContextId::ROOT;

fn config(entries: &[&str]) -> CpaConfig {
    CpaConfig::default().entry_points(entries.iter().copied())
}

// ============================================================================
// Fixtures
// ============================================================================

/// class A; def main(): a = A(); b = a; c = a.x; return b
fn alias_program() -> Program {
    let mut b = ProgramBuilder::new();
    b.class("A", &[]);
    b.function(
        "main",
        vec![],
        vec![
            Stmt::assign("a", Expr::call(Expr::global("A"), vec![])),
            Stmt::assign("b", Expr::local("a")),
            Stmt::assign("c", Expr::attr(Expr::local("a"), "x")),
            Stmt::ret(Expr::local("b")),
        ],
    );
    b.build().unwrap()
}

/// Shape.area, Square(Shape).area, Circle(Shape); main iterates a list of both
fn shapes_program() -> Program {
    shapes_program_with(&["Square", "Circle"])
}

/// Like [`shapes_program`], with only `allocated` instances in the list
fn shapes_program_with(allocated: &[&str]) -> Program {
    let mut b = ProgramBuilder::new();
    let shape = b.class("Shape", &[]);
    let square = b.class("Square", &["Shape"]);
    b.class("Circle", &["Shape"]);
    b.method(shape, "area", vec![Param::new("self")], vec![Stmt::ret(Expr::int(0))]);
    b.method(square, "area", vec![Param::new("self")], vec![Stmt::ret(Expr::int(1))]);
    b.function(
        "main",
        vec![],
        vec![
            Stmt::assign(
                "shapes",
                Expr::list(
                    allocated
                        .iter()
                        .map(|class| Expr::call(Expr::global(*class), vec![]))
                        .collect(),
                ),
            ),
            Stmt::for_loop(
                "s",
                Expr::local("shapes"),
                vec![Stmt::assign("r", Expr::method(Expr::local("s"), "area", vec![]))],
            ),
            Stmt::ret(Expr::local("r")),
        ],
    );
    b.build().unwrap()
}

/// def main(f): g = f(); return g()
fn unresolved_program() -> Program {
    let mut b = ProgramBuilder::new();
    b.function(
        "main",
        vec![Param::new("f")],
        vec![
            Stmt::assign("g", Expr::call(Expr::local("f"), vec![])),
            Stmt::ret(Expr::call(Expr::local("g"), vec![])),
        ],
    );
    b.build().unwrap()
}

/// def rec(n): if n: return n; return rec(n)   def main(): return rec(1)
fn recursive_program() -> Program {
    let mut b = ProgramBuilder::new();
    b.function(
        "rec",
        vec![Param::new("n")],
        vec![
            Stmt::if_else(Expr::local("n"), vec![Stmt::ret(Expr::local("n"))], vec![]),
            Stmt::ret(Expr::call(Expr::global("rec"), vec![Expr::local("n")])),
        ],
    );
    b.function(
        "main",
        vec![],
        vec![Stmt::ret(Expr::call(Expr::global("rec"), vec![Expr::int(1)]))],
    );
    b.build().unwrap()
}

/// Box.set / Box.get used with two receivers holding different payloads
fn boxes_program() -> Program {
    let mut b = ProgramBuilder::new();
    b.class("A", &[]);
    b.class("B", &[]);
    let boxed = b.class("Box", &[]);
    b.method(
        boxed,
        "set",
        vec![Param::new("self"), Param::new("v")],
        vec![Stmt::store_attr(Expr::local("self"), "v", Expr::local("v"))],
    );
    b.method(
        boxed,
        "get",
        vec![Param::new("self")],
        vec![Stmt::ret(Expr::attr(Expr::local("self"), "v"))],
    );
    b.function(
        "main",
        vec![],
        vec![
            Stmt::assign("b1", Expr::call(Expr::global("Box"), vec![])),
            Stmt::assign("b2", Expr::call(Expr::global("Box"), vec![])),
            Stmt::expr(Expr::method(
                Expr::local("b1"),
                "set",
                vec![Expr::call(Expr::global("A"), vec![])],
            )),
            Stmt::expr(Expr::method(
                Expr::local("b2"),
                "set",
                vec![Expr::call(Expr::global("B"), vec![])],
            )),
            Stmt::assign("x", Expr::method(Expr::local("b1"), "get", vec![])),
            Stmt::assign("y", Expr::method(Expr::local("b2"), "get", vec![])),
        ],
    );
    b.build().unwrap()
}

// ============================================================================
// Alias and dispatch
// ============================================================================

#[test]
fn test_simple_alias() {
    let program = alias_program();
    let main = code(&program, "main");
    let report = analyze(&program, &config(&["main"])).unwrap();
    let results = &report.results;

    assert!(report.status.is_converged());
    let a = results.points_to(main, "a", ROOT);
    assert_eq!(a.len(), 1);
    assert_eq!(a, results.points_to(main, "b", ROOT));
    assert!(results.may_alias(main, "a", "b", ROOT));

    let class_a = program.class_by_name("A").unwrap();
    assert_eq!(
        results.types_of(main, "a", ROOT),
        BTreeSet::from([TypeDesc::Instance(class_a)])
    );
    assert_eq!(results.returns(main, ROOT), a);

    // a.x was never stored
    assert!(results.points_to(main, "c", ROOT).is_empty());
    let object = a.iter().next().unwrap();
    assert!(results.field_targets(object, "x").is_empty());

    // constructing A resolves to the class, with no __init__ to bind
    let node = call_node(&program, main, "A");
    match results.resolved_callees(node, ROOT) {
        CallResolution::Resolved(targets) => {
            assert!(targets.invocations.is_empty());
            assert_eq!(targets.constructs, BTreeSet::from([class_a]));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(report.diagnostics.is_empty());
}

#[test]
fn test_field_store_through_alias_is_read_back() {
    let mut b = ProgramBuilder::new();
    b.class("A", &[]);
    let class_b = b.class("B", &[]);
    let main = b.function(
        "main",
        vec![],
        vec![
            Stmt::assign("a", Expr::call(Expr::global("A"), vec![])),
            Stmt::assign("b", Expr::local("a")),
            Stmt::assign("v", Expr::call(Expr::global("B"), vec![])),
            Stmt::store_attr(Expr::local("b"), "x", Expr::local("v")),
            Stmt::assign("c", Expr::attr(Expr::local("a"), "x")),
        ],
    );
    let program = b.build().unwrap();
    let report = analyze(&program, &config(&["main"])).unwrap();
    let results = &report.results;

    let a = results.points_to(main, "a", ROOT);
    assert_eq!(a, results.points_to(main, "b", ROOT));
    let object = a.iter().next().unwrap();
    let c = results.points_to(main, "c", ROOT);
    assert_eq!(c, results.field_targets(object, "x"));
    assert_eq!(c, results.points_to(main, "v", ROOT));
    assert_eq!(
        results.types_of(main, "c", ROOT),
        BTreeSet::from([TypeDesc::Instance(class_b)])
    );
}

#[test]
fn test_monomorphic_call_has_single_callee() {
    let program = shapes_program_with(&["Square"]);
    let main = code(&program, "main");
    let square_area = code(&program, "Square.area");
    let report = analyze(&program, &config(&["main"])).unwrap();
    let results = &report.results;

    let node = call_node(&program, main, "area");
    let resolution = results.resolved_callees(node, ROOT);
    assert!(matches!(resolution, CallResolution::Resolved(_)));
    let (callee, _) = resolution.single_callee().unwrap();
    assert_eq!(callee, square_area);

    let annotation = report.annotations.get::<CallAnnotation>(node).unwrap();
    assert_eq!(annotation.callees, BTreeSet::from([square_area]));
    assert!(!annotation.unresolved);
}

#[test]
fn test_polymorphic_call_resolution() {
    let program = shapes_program();
    let main = code(&program, "main");
    let shape_area = code(&program, "Shape.area");
    let square_area = code(&program, "Square.area");
    let report = analyze(&program, &config(&["main"])).unwrap();
    let results = &report.results;

    let node = call_node(&program, main, "area");
    let callees: BTreeSet<_> = results
        .resolved_callees(node, ROOT)
        .callees()
        .into_iter()
        .map(|(code, _)| code)
        .collect();
    // Circle inherits Shape.area
    assert_eq!(callees, BTreeSet::from([shape_area, square_area]));
    assert_eq!(
        results.types_of(main, "r", ROOT),
        BTreeSet::from([TypeDesc::Builtin(BuiltinType::Int)])
    );

    let annotation = report.annotations.get::<CallAnnotation>(node).unwrap();
    assert_eq!(annotation.callees, BTreeSet::from([shape_area, square_area]));
    assert!(!annotation.unresolved);
}

#[test]
fn test_call_graph_edges() {
    let program = shapes_program();
    let report = analyze(&program, &config(&["main"])).unwrap();
    let graph = report.results.call_graph();

    assert_eq!(graph.node_count(), report.results.invocations().len());
    assert_eq!(graph.node_count(), 3);
    assert_eq!(graph.edge_count(), 2);
}

// ============================================================================
// Unresolved calls
// ============================================================================

#[test]
fn test_unresolved_call_is_conservative() {
    let program = unresolved_program();
    let main = code(&program, "main");
    let report = analyze(&program, &config(&["main"])).unwrap();
    let results = &report.results;

    let first = call_node(&program, main, "f");
    assert_eq!(results.resolved_callees(first, ROOT), CallResolution::Unresolved);
    // g is unknown, so calling it is unresolved too and the result stays unknown
    assert_eq!(
        results.types_of(main, "g", ROOT),
        BTreeSet::from([TypeDesc::Unknown])
    );
    assert_eq!(
        types(results, results.returns(main, ROOT)),
        BTreeSet::from([TypeDesc::Unknown])
    );
    assert_eq!(report.diagnostics_of_kind("unresolved-call").count(), 2);
    assert_eq!(report.stats.unresolved_calls, 2);
    assert!(report.status.is_converged());
}

#[test]
fn test_unresolved_call_ignored() {
    let program = unresolved_program();
    let main = code(&program, "main");
    let config = config(&["main"]).unresolved_call_policy(UnresolvedCallPolicy::Ignore);
    let report = analyze(&program, &config).unwrap();
    let results = &report.results;

    assert!(results.points_to(main, "g", ROOT).is_empty());
    assert!(results.returns(main, ROOT).is_empty());
    let node = call_node(&program, main, "f");
    assert_eq!(results.resolved_callees(node, ROOT), CallResolution::Unresolved);
    assert_eq!(report.diagnostics_of_kind("unresolved-call").count(), 2);
}

#[test]
fn test_unreached_call_site() {
    let program = shapes_program();
    let main = code(&program, "main");
    let node = call_node(&program, main, "area");
    // main is not an entry point, so nothing is reached
    let report = analyze(&program, &config(&["Shape.area"])).unwrap();
    assert_eq!(
        report.results.resolved_callees(node, ROOT),
        CallResolution::NotReached
    );
}

/// class A: def f(self): return 1
/// def main(p: Mystery): x = A() if p else p; return x.f()
fn partly_unknown_program() -> Program {
    let mut b = ProgramBuilder::new();
    let class_a = b.class("A", &[]);
    b.method(class_a, "f", vec![Param::new("self")], vec![Stmt::ret(Expr::int(1))]);
    b.function(
        "main",
        vec![Param::new("p").annotated("Mystery")],
        vec![
            Stmt::if_else(
                Expr::local("p"),
                vec![Stmt::assign("x", Expr::call(Expr::global("A"), vec![]))],
                vec![Stmt::assign("x", Expr::local("p"))],
            ),
            Stmt::assign("r", Expr::method(Expr::local("x"), "f", vec![])),
            Stmt::ret(Expr::local("r")),
        ],
    );
    b.build().unwrap()
}

#[test]
fn test_unknown_receiver_keeps_call_partial() {
    let program = partly_unknown_program();
    let main = code(&program, "main");
    let a_f = code(&program, "A.f");
    let class_a = program.class_by_name("A").unwrap();
    let report = analyze(&program, &config(&["main"])).unwrap();
    let results = &report.results;

    assert_eq!(
        results.types_of(main, "x", ROOT),
        BTreeSet::from([TypeDesc::Instance(class_a), TypeDesc::Unknown])
    );
    let node = call_node(&program, main, "f");
    let resolution = results.resolved_callees(node, ROOT);
    match &resolution {
        CallResolution::Partial(targets) => {
            assert!(targets.unknown);
            assert_eq!(targets.invocations.len(), 1);
        }
        other => panic!("unexpected {:?}", other),
    }
    // one known callee is not enough to devirtualize
    assert!(resolution.single_callee().is_none());
    assert_eq!(
        resolution.callees().into_iter().map(|(code, _)| code).collect::<Vec<_>>(),
        vec![a_f]
    );
    assert_eq!(
        results.types_of(main, "r", ROOT),
        BTreeSet::from([TypeDesc::Builtin(BuiltinType::Int), TypeDesc::Unknown])
    );
    assert_eq!(report.diagnostics_of_kind("unresolved-call").count(), 1);

    let annotation = report.annotations.get::<CallAnnotation>(node).unwrap();
    assert_eq!(annotation.callees, BTreeSet::from([a_f]));
    assert!(annotation.unresolved);
}

#[test]
fn test_unknown_receiver_ignored_policy_still_partial() {
    let program = partly_unknown_program();
    let main = code(&program, "main");
    let config = config(&["main"]).unresolved_call_policy(UnresolvedCallPolicy::Ignore);
    let report = analyze(&program, &config).unwrap();
    let results = &report.results;

    let node = call_node(&program, main, "f");
    assert!(matches!(
        results.resolved_callees(node, ROOT),
        CallResolution::Partial(_)
    ));
    assert_eq!(
        results.types_of(main, "r", ROOT),
        BTreeSet::from([TypeDesc::Builtin(BuiltinType::Int)])
    );
    assert_eq!(report.diagnostics_of_kind("unresolved-call").count(), 1);
}

// ============================================================================
// Session driving
// ============================================================================

#[test]
fn test_finish_without_solving_is_not_converged() {
    let program = alias_program();
    let main = code(&program, "main");
    let mut session = AnalysisSession::new(&program, config(&["main"])).unwrap();
    session.register_configured_entry_points().unwrap();
    let report = session.finish();

    assert_eq!(report.status, AnalysisStatus::NotConverged { iterations: 0 });
    assert_eq!(report.diagnostics_of_kind("non-convergence").count(), 1);
    assert!(report.results.points_to(main, "a", ROOT).is_empty());
}

#[test]
fn test_stepping_reaches_the_same_fixpoint_as_run() {
    let program = unresolved_program();
    let main = code(&program, "main");

    let mut session = AnalysisSession::new(&program, config(&["main"])).unwrap();
    session.register_configured_entry_points().unwrap();
    while let StepOutcome::Processed(_) = session.step() {}
    let stepped = session.finish();

    let solved = analyze(&program, &config(&["main"])).unwrap();
    assert!(stepped.status.is_converged());
    assert_eq!(
        types(&stepped.results, stepped.results.returns(main, ROOT)),
        BTreeSet::from([TypeDesc::Unknown])
    );
    assert_eq!(
        stepped.results.to_json().unwrap(),
        solved.results.to_json().unwrap()
    );
    assert_eq!(stepped.diagnostics, solved.diagnostics);
}

// ============================================================================
// Contexts
// ============================================================================

#[test]
fn test_recursion_terminates_with_drop_oldest() {
    let program = recursive_program();
    let main = code(&program, "main");
    let rec = code(&program, "rec");
    let report = analyze(&program, &config(&["main"]).context_depth_k(2)).unwrap();
    let results = &report.results;

    assert!(report.status.is_converged());
    // [c1], [c1, c2], [c2, c2]
    assert_eq!(results.contexts_of(rec).len(), 3);
    for context in results.contexts_of(rec) {
        assert!(results.context_elements(context).len() <= 2);
    }
    assert!(report.diagnostics_of_kind("context-overflow").count() >= 1);
    assert_eq!(
        types(results, results.returns(main, ROOT)),
        BTreeSet::from([TypeDesc::Builtin(BuiltinType::Int)])
    );
}

#[test]
fn test_recursion_collapses_to_top() {
    let program = recursive_program();
    let rec = code(&program, "rec");
    let config = config(&["main"])
        .context_depth_k(2)
        .widening(WideningStrategy::CollapseToTop);
    let report = analyze(&program, &config).unwrap();

    let contexts = report.results.contexts_of(rec);
    assert_eq!(contexts.len(), 3);
    assert!(contexts.contains(&ContextId::TOP));
}

#[test]
fn test_context_insensitive_merges_receivers() {
    let program = boxes_program();
    let main = code(&program, "main");
    let (a, b) = (
        program.class_by_name("A").unwrap(),
        program.class_by_name("B").unwrap(),
    );
    let config = CpaConfig::from_preset(Preset::Fast).entry_points(["main"]);
    let report = analyze(&program, &config).unwrap();

    assert_eq!(
        report.results.types_of(main, "x", ROOT),
        BTreeSet::from([TypeDesc::Instance(a), TypeDesc::Instance(b)])
    );
    assert_eq!(report.results.context_count(), 2);
}

#[test]
fn test_object_sensitivity_separates_receivers() {
    let program = boxes_program();
    let main = code(&program, "main");
    let get = code(&program, "Box.get");
    let (a, b) = (
        program.class_by_name("A").unwrap(),
        program.class_by_name("B").unwrap(),
    );
    let config = config(&["main"])
        .context_policy(ContextPolicy::ObjectSensitive)
        .context_depth_k(1)
        .heap_depth(1);
    let report = analyze(&program, &config).unwrap();
    let results = &report.results;

    assert_eq!(
        results.types_of(main, "x", ROOT),
        BTreeSet::from([TypeDesc::Instance(a)])
    );
    assert_eq!(
        results.types_of(main, "y", ROOT),
        BTreeSet::from([TypeDesc::Instance(b)])
    );
    // one context per receiver allocation site
    assert_eq!(results.contexts_of(get).len(), 2);
    assert_eq!(
        results.points_to_all_contexts(get, "self").len(),
        2
    );
}

// ============================================================================
// Binding
// ============================================================================

#[test]
fn test_varargs_and_defaults() {
    let mut b = ProgramBuilder::new();
    let class_a = b.class("A", &[]);
    let collect = b.function(
        "collect",
        vec![Param::new("first")],
        vec![Stmt::ret(Expr::local("rest"))],
    );
    b.vararg(collect, "rest");
    let opt = b.function(
        "opt",
        vec![Param::new("a"), Param::new("b").with_default(Literal::None)],
        vec![Stmt::ret(Expr::local("b"))],
    );
    let main = b.function(
        "main",
        vec![],
        vec![
            Stmt::assign(
                "t",
                Expr::call(
                    Expr::global("collect"),
                    vec![
                        Expr::int(1),
                        Expr::str("s"),
                        Expr::call(Expr::global("A"), vec![]),
                    ],
                ),
            ),
            Stmt::assign("d", Expr::call(Expr::global("opt"), vec![Expr::int(2)])),
        ],
    );
    let program = b.build().unwrap();
    let report = analyze(&program, &config(&["main"])).unwrap();
    let results = &report.results;

    let tuple = results.points_to(main, "t", ROOT);
    assert_eq!(
        types(results, tuple),
        BTreeSet::from([TypeDesc::Builtin(BuiltinType::Tuple)])
    );
    let surplus: BTreeSet<TypeDesc> = tuple
        .iter()
        .flat_map(|t| types(results, results.field_targets(t, "[]")))
        .collect();
    assert_eq!(
        surplus,
        BTreeSet::from([
            TypeDesc::Builtin(BuiltinType::Str),
            TypeDesc::Instance(class_a)
        ])
    );
    assert_eq!(
        results.types_of(main, "d", ROOT),
        BTreeSet::from([TypeDesc::Builtin(BuiltinType::None)])
    );
    let opt_context = *results.contexts_of(opt).iter().next().unwrap();
    assert_eq!(
        results.types_of(opt, "a", opt_context),
        BTreeSet::from([TypeDesc::Builtin(BuiltinType::Int)])
    );
}

#[test]
fn test_builtin_container_methods() {
    let mut b = ProgramBuilder::new();
    let class_a = b.class("A", &[]);
    let main = b.function(
        "main",
        vec![],
        vec![
            Stmt::assign("xs", Expr::list(vec![])),
            Stmt::expr(Expr::method(
                Expr::local("xs"),
                "append",
                vec![Expr::call(Expr::global("A"), vec![])],
            )),
            Stmt::assign("y", Expr::subscript(Expr::local("xs"), Expr::int(0))),
            Stmt::assign(
                "d",
                Expr::dict(vec![(Expr::str("k"), Expr::call(Expr::global("A"), vec![]))]),
            ),
            Stmt::assign("v", Expr::method(Expr::local("d"), "get", vec![Expr::str("k")])),
        ],
    );
    let program = b.build().unwrap();
    let report = analyze(&program, &config(&["main"])).unwrap();
    let results = &report.results;

    assert_eq!(
        results.types_of(main, "y", ROOT),
        BTreeSet::from([TypeDesc::Instance(class_a)])
    );
    assert_eq!(
        results.types_of(main, "v", ROOT),
        BTreeSet::from([
            TypeDesc::Builtin(BuiltinType::None),
            TypeDesc::Instance(class_a)
        ])
    );
    match results.resolved_callees(call_node(&program, main, "append"), ROOT) {
        CallResolution::Resolved(targets) => {
            assert_eq!(targets.intrinsics, BTreeSet::from(["list.append".to_string()]));
        }
        other => panic!("unexpected {:?}", other),
    }

    // the append call wrote the list's element field
    let node = call_node(&program, main, "append");
    let effects = results.effects(node, ROOT).unwrap();
    assert_eq!(effects.modifies.len(), 1);
    assert_eq!(effects.modifies.iter().next().unwrap().1, "[]");
}

#[test]
fn test_exceptions_reach_caller_handlers() {
    let mut b = ProgramBuilder::new();
    let oops = b.class("Oops", &[]);
    b.function(
        "thrower",
        vec![],
        vec![Stmt::Raise(Expr::call(Expr::global("Oops"), vec![]))],
    );
    let main = b.function(
        "main",
        vec![],
        vec![
            Stmt::Try {
                body: vec![Stmt::expr(Expr::call(Expr::global("thrower"), vec![]))],
                handlers: vec![Handler {
                    class: Some("Oops".into()),
                    name: Some("e".into()),
                    body: vec![],
                }],
                finally: vec![],
            },
            Stmt::ret(Expr::local("e")),
        ],
    );
    let program = b.build().unwrap();
    let report = analyze(&program, &config(&["main"])).unwrap();

    assert_eq!(
        report.results.types_of(main, "e", ROOT),
        BTreeSet::from([TypeDesc::Instance(oops)])
    );
}

#[test]
fn test_method_stored_in_field_is_called() {
    let mut b = ProgramBuilder::new();
    b.class("Holder", &[]);
    let class_a = b.class("A", &[]);
    b.function("make", vec![], vec![Stmt::ret(Expr::call(Expr::global("A"), vec![]))]);
    let main = b.function(
        "main",
        vec![],
        vec![
            Stmt::assign("h", Expr::call(Expr::global("Holder"), vec![])),
            Stmt::store_attr(Expr::local("h"), "factory", Expr::global("make")),
            Stmt::assign("r", Expr::method(Expr::local("h"), "factory", vec![])),
        ],
    );
    let program = b.build().unwrap();
    let report = analyze(&program, &config(&["main"])).unwrap();

    assert_eq!(
        report.results.types_of(main, "r", ROOT),
        BTreeSet::from([TypeDesc::Instance(class_a)])
    );
}

// ============================================================================
// Entry points and failure handling
// ============================================================================

#[test]
fn test_malformed_body_marks_entry_incomplete() {
    let mut b = ProgramBuilder::new();
    let broken = b.function("broken", vec![], vec![Stmt::ret(Expr::local("ghost"))]);
    let main = b.function(
        "main",
        vec![],
        vec![Stmt::ret(Expr::call(Expr::global("broken"), vec![]))],
    );
    b.function("other", vec![], vec![Stmt::ret(Expr::int(1))]);
    let program = b.build().unwrap();
    let report = analyze(&program, &config(&["main", "other"])).unwrap();

    assert!(report.status.is_converged());
    assert_eq!(report.incomplete_entry_points, vec!["main".to_string()]);
    assert_eq!(report.diagnostics_of_kind("malformed-ir").count(), 1);

    let node = call_node(&program, main, "broken");
    let callees = report.results.resolved_callees(node, ROOT).callees();
    assert_eq!(callees.len(), 1);
    let (callee, context) = *callees.iter().next().unwrap();
    assert_eq!(callee, broken);
    assert!(report.results.returns(broken, context).is_empty());
}

#[test]
fn test_class_entry_point_binds_self() {
    let mut b = ProgramBuilder::new();
    let counter = b.class("Counter", &[]);
    let inc = b.method(counter, "inc", vec![Param::new("self")], vec![Stmt::ret(Expr::local("self"))]);
    let reset = b.method(counter, "reset", vec![Param::new("self")], vec![]);
    let program = b.build().unwrap();
    let report = analyze(&program, &config(&["Counter"])).unwrap();
    let results = &report.results;

    assert_eq!(
        results.types_of(inc, "self", ROOT),
        BTreeSet::from([TypeDesc::Instance(counter)])
    );
    // both methods share one synthetic receiver
    assert_eq!(
        results.points_to(inc, "self", ROOT),
        results.points_to(reset, "self", ROOT)
    );
}

#[test]
fn test_annotated_entry_arguments() {
    let mut b = ProgramBuilder::new();
    let request = b.class("Request", &[]);
    let handle = b.function(
        "handle",
        vec![
            Param::new("req").annotated("Request"),
            Param::new("n").annotated("int"),
            Param::new("raw"),
        ],
        vec![],
    );
    let program = b.build().unwrap();
    let report = analyze(&program, &config(&["handle"])).unwrap();
    let results = &report.results;

    assert_eq!(
        results.types_of(handle, "req", ROOT),
        BTreeSet::from([TypeDesc::Instance(request)])
    );
    assert_eq!(
        results.types_of(handle, "n", ROOT),
        BTreeSet::from([TypeDesc::Builtin(BuiltinType::Int)])
    );
    assert!(results.points_to(handle, "raw", ROOT).is_empty());
}

#[test]
fn test_empty_entry_list_selects_all_definitions() {
    let program = shapes_program();
    let report = analyze(&program, &CpaConfig::default()).unwrap();
    // main plus the methods of every class entry
    assert!(!report.results.contexts_of(code(&program, "main")).is_empty());
    assert!(report
        .results
        .contexts_of(code(&program, "Square.area"))
        .contains(&ROOT));
}

#[test]
fn test_unknown_entry_point_is_an_error() {
    let program = alias_program();
    let err = analyze(&program, &config(&["nope"])).unwrap_err();
    assert!(matches!(err, CpaError::UnknownEntryPoint(ref name) if name == "nope"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let program = alias_program();
    let err = analyze(&program, &config(&["main"]).context_depth_k(99)).unwrap_err();
    assert!(matches!(err, CpaError::Config(_)));
}

// ============================================================================
// Budget, trace and export
// ============================================================================

#[test]
fn test_budget_exhaustion_reports_non_convergence() {
    let program = shapes_program();
    let config = config(&["main"]).iteration_budget(Some(2));
    let report = analyze(&program, &config).unwrap();

    assert_eq!(report.status, AnalysisStatus::NotConverged { iterations: 2 });
    assert_eq!(report.diagnostics_of_kind("non-convergence").count(), 1);
    assert_eq!(report.stats.iterations, 2);
}

#[test]
fn test_trace_records_every_pop() {
    let program = shapes_program();
    let report = analyze(&program, &config(&["main"]).record_trace(true)).unwrap();

    assert_eq!(report.trace.len(), report.stats.iterations);
    let iterations: Vec<usize> = report.trace.iter().map(|e| e.iteration).collect();
    assert_eq!(iterations, (1..=report.stats.iterations).collect::<Vec<_>>());
    assert_eq!(
        report.stats.constraints_by_kind.values().sum::<usize>(),
        report.stats.constraints
    );
}

#[test]
fn test_json_export() {
    let program = shapes_program();
    let report = analyze(&program, &config(&["main"])).unwrap();
    let json = report.results.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(
        value["objects"].as_array().unwrap().len(),
        report.results.objects().len()
    );
    // Square(), Circle() and s.area()
    assert_eq!(value["call_sites"].as_array().unwrap().len(), 3);
    assert!(value["locals"]
        .as_array()
        .unwrap()
        .iter()
        .any(|record| record["var"] == "shapes"));
}

#[test]
fn test_batch_analysis() {
    let programs = vec![alias_program(), shapes_program()];
    let reports = analyze_batch(&programs, &config(&["main"]));

    assert_eq!(reports.len(), 2);
    for report in reports {
        assert!(report.unwrap().status.is_converged());
    }
}
