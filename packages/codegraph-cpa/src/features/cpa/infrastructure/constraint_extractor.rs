//! Constraint extraction
//!
//! Lowers one code body into constraints for one invocation. Globals are fields of
//! the module object, operators and subscripts dispatch through their dunder
//! methods, and container literals allocate and store into the element field.
//!
//! Extraction either succeeds completely or fails with `MalformedIr`. A failed
//! extraction leaves the store graph as it found it.

use super::store_graph::{SlotOwner, StoreGraph};
use crate::errors::{CpaError, Result};
use crate::features::cpa::domain::{
    CallConstraint, CallTarget, Constraint, InvocationBody, InvocationId, OpRef, SlotId, TypeDesc,
    TypeTest,
};
use crate::features::ir::{
    walk_stmts, BuiltinType, CodeId, Expr, Handler, NodeId, Program, Stmt, UnaryOpKind,
};
use std::collections::BTreeMap;

/// Everything extracted for one invocation
#[derive(Debug)]
pub struct ExtractedBody {
    pub constraints: Vec<Constraint>,
    pub body: InvocationBody,
    /// Local holding the implicit `*args` tuple
    pub vararg: Option<SlotId>,
    /// Existing objects to place in slots before solving
    pub seeds: Vec<(SlotId, TypeDesc)>,
}

pub struct ConstraintExtractor<'a> {
    program: &'a Program,
    store: &'a mut StoreGraph,
    code: CodeId,
    invocation: InvocationId,
    locals: BTreeMap<String, SlotId>,
    const_slots: BTreeMap<BuiltinType, SlotId>,
    constraints: Vec<Constraint>,
    seeds: Vec<(SlotId, TypeDesc)>,
    ret: SlotId,
    exception: SlotId,
}

/// Extract the constraints of `code` for `invocation`
pub fn extract(
    program: &Program,
    store: &mut StoreGraph,
    code: CodeId,
    invocation: InvocationId,
) -> Result<ExtractedBody> {
    let checkpoint = store.checkpoint();
    let result = extract_into(program, store, code, invocation);
    if result.is_err() {
        store.rollback(checkpoint);
    }
    result
}

fn extract_into(
    program: &Program,
    store: &mut StoreGraph,
    code: CodeId,
    invocation: InvocationId,
) -> Result<ExtractedBody> {
    let ret = store.new_slot(SlotOwner::Temp(invocation));
    let exception = store.new_slot(SlotOwner::Temp(invocation));
    let extractor = ConstraintExtractor {
        program,
        store,
        code,
        invocation,
        locals: BTreeMap::new(),
        const_slots: BTreeMap::new(),
        constraints: Vec::new(),
        seeds: Vec::new(),
        ret,
        exception,
    };
    extractor.run()
}

impl<'a> ConstraintExtractor<'a> {
    fn run(mut self) -> Result<ExtractedBody> {
        let program = self.program;
        let code = program.code(self.code);

        let mut params = Vec::with_capacity(code.params.len());
        for param in &code.params {
            if self.locals.contains_key(&param.name) {
                return Err(self.malformed(format!("duplicate parameter '{}'", param.name)));
            }
            params.push(self.declare(&param.name));
        }
        let vararg = match &code.vararg {
            Some(name) if self.locals.contains_key(name) => {
                return Err(self.malformed(format!("duplicate parameter '{}'", name)));
            }
            Some(name) => Some(self.declare(name)),
            None => None,
        };
        for name in assigned_locals(&code.body) {
            if !self.locals.contains_key(&name) {
                self.declare(&name);
            }
        }

        self.lower_body(&code.body)?;
        if code.may_return_none() {
            self.seeds
                .push((self.ret, TypeDesc::Builtin(BuiltinType::None)));
        }

        Ok(ExtractedBody {
            constraints: self.constraints,
            body: InvocationBody {
                locals: self.locals,
                params,
                vararg: None,
                ret: self.ret,
                exception: self.exception,
            },
            vararg,
            seeds: self.seeds,
        })
    }

    fn malformed(&self, reason: String) -> CpaError {
        CpaError::malformed(self.program.qualified_name(self.code), reason)
    }

    fn declare(&mut self, name: &str) -> SlotId {
        let slot = self.store.new_slot(SlotOwner::Local(self.invocation));
        self.locals.insert(name.to_string(), slot);
        slot
    }

    fn local(&self, name: &str) -> Result<SlotId> {
        self.locals
            .get(name)
            .copied()
            .ok_or_else(|| self.malformed(format!("undefined local '{}'", name)))
    }

    fn temp(&mut self) -> SlotId {
        self.store.new_slot(SlotOwner::Temp(self.invocation))
    }

    #[inline]
    fn op(&self, node: NodeId) -> OpRef {
        OpRef {
            node,
            invocation: self.invocation,
        }
    }

    fn constant(&mut self, ty: BuiltinType) -> SlotId {
        if let Some(&slot) = self.const_slots.get(&ty) {
            return slot;
        }
        let slot = self.temp();
        self.seeds.push((slot, TypeDesc::Builtin(ty)));
        self.const_slots.insert(ty, slot);
        slot
    }

    fn global_slot(&mut self, name: &str) -> SlotId {
        let field = self.store.intern_field(name);
        let module = self.store.module();
        self.store.field_slot(module, field)
    }

    fn type_test(&self, class: &str) -> Result<TypeTest> {
        if let Some(id) = self.program.class_by_name(class) {
            return Ok(TypeTest::Class(id));
        }
        BuiltinType::from_name(class)
            .map(TypeTest::Builtin)
            .ok_or_else(|| self.malformed(format!("unknown class '{}'", class)))
    }

    fn call(&mut self, node: NodeId, target: CallTarget, args: Vec<SlotId>) -> SlotId {
        let ret = self.temp();
        let op = self.op(node);
        self.constraints.push(Constraint::Call(CallConstraint {
            op,
            target,
            args,
            ret,
        }));
        ret
    }

    fn method_call(&mut self, node: NodeId, receiver: SlotId, attr: &str, args: Vec<SlotId>) -> SlotId {
        let attr = self.store.intern_field(attr);
        self.call(node, CallTarget::Method { receiver, attr }, args)
    }

    fn allocate(&mut self, node: NodeId, ty: TypeDesc) -> SlotId {
        let dst = self.temp();
        let op = self.op(node);
        self.constraints.push(Constraint::Allocate {
            op,
            ty,
            dst,
        });
        dst
    }

    fn store_field(&mut self, node: NodeId, base: SlotId, field: &str, src: SlotId) {
        let field = self.store.intern_field(field);
        let op = self.op(node);
        self.constraints.push(Constraint::Store {
            op,
            base,
            field,
            src,
        });
    }

    fn assign(&mut self, src: SlotId, dst: SlotId) {
        if src != dst {
            self.constraints.push(Constraint::Assign { src, dst });
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Expressions
    // ═══════════════════════════════════════════════════════════════════════

    fn lower_expr(&mut self, expr: &Expr) -> Result<SlotId> {
        match expr {
            Expr::Local(name) => self.local(name),
            Expr::Global(name) => Ok(self.global_slot(name)),
            Expr::Const(literal) => Ok(self.constant(literal.builtin_type())),
            Expr::Attr { base, attr, node } => {
                let base = self.lower_expr(base)?;
                let field = self.store.intern_field(attr);
                let dst = self.temp();
                let op = self.op(*node);
                self.constraints.push(Constraint::Load {
                    op,
                    base,
                    field,
                    dst,
                });
                Ok(dst)
            }
            Expr::Subscript { base, index, node } => {
                let base = self.lower_expr(base)?;
                let index = self.lower_expr(index)?;
                Ok(self.method_call(*node, base, "__getitem__", vec![index]))
            }
            Expr::BinOp {
                op,
                left,
                right,
                node,
            } => {
                let left = self.lower_expr(left)?;
                let right = self.lower_expr(right)?;
                Ok(self.method_call(*node, left, op.dunder(), vec![right]))
            }
            Expr::UnaryOp { op, operand, node } => {
                let operand = self.lower_expr(operand)?;
                match op.dunder() {
                    Some(dunder) => Ok(self.method_call(*node, operand, dunder, Vec::new())),
                    None => {
                        debug_assert_eq!(*op, UnaryOpKind::Not);
                        Ok(self.constant(BuiltinType::Bool))
                    }
                }
            }
            Expr::Call { callee, args, node } => {
                let callee = self.lower_expr(callee)?;
                let args = self.lower_args(args)?;
                Ok(self.call(*node, CallTarget::Value(callee), args))
            }
            Expr::MethodCall {
                receiver,
                attr,
                args,
                node,
            } => {
                let receiver = self.lower_expr(receiver)?;
                let args = self.lower_args(args)?;
                Ok(self.method_call(*node, receiver, attr, args))
            }
            Expr::New { class, node } => {
                let ty = match self.type_test(class)? {
                    TypeTest::Class(id) => TypeDesc::Instance(id),
                    TypeTest::Builtin(b) => TypeDesc::Builtin(b),
                };
                Ok(self.allocate(*node, ty))
            }
            Expr::BuildList { elements, node } | Expr::BuildTuple { elements, node } => {
                let ty = if matches!(expr, Expr::BuildList { .. }) {
                    BuiltinType::List
                } else {
                    BuiltinType::Tuple
                };
                let container = self.allocate(*node, TypeDesc::Builtin(ty));
                for element in elements {
                    let value = self.lower_expr(element)?;
                    self.store_field(*node, container, super::store_graph::ELEMENT_FIELD, value);
                }
                Ok(container)
            }
            Expr::BuildDict { entries, node } => {
                let dict = self.allocate(*node, TypeDesc::Builtin(BuiltinType::Dict));
                for (key, value) in entries {
                    let key = self.lower_expr(key)?;
                    let value = self.lower_expr(value)?;
                    self.store_field(*node, dict, super::store_graph::KEY_FIELD, key);
                    self.store_field(*node, dict, super::store_graph::ELEMENT_FIELD, value);
                }
                Ok(dict)
            }
            Expr::IsInstance { value, class, .. } => {
                self.lower_expr(value)?;
                self.type_test(class)?;
                Ok(self.constant(BuiltinType::Bool))
            }
        }
    }

    fn lower_args(&mut self, args: &[Expr]) -> Result<Vec<SlotId>> {
        args.iter().map(|arg| self.lower_expr(arg)).collect()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Statements
    // ═══════════════════════════════════════════════════════════════════════

    fn lower_body(&mut self, body: &[Stmt]) -> Result<()> {
        for stmt in body {
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Assign { target, value } => {
                let value = self.lower_expr(value)?;
                let target = self.local(target)?;
                self.assign(value, target);
            }
            Stmt::StoreAttr {
                base,
                attr,
                value,
                node,
            } => {
                let base = self.lower_expr(base)?;
                let value = self.lower_expr(value)?;
                self.store_field(*node, base, attr, value);
            }
            Stmt::StoreSubscript {
                base,
                index,
                value,
                node,
            } => {
                let base = self.lower_expr(base)?;
                let index = self.lower_expr(index)?;
                let value = self.lower_expr(value)?;
                self.method_call(*node, base, "__setitem__", vec![index, value]);
            }
            Stmt::StoreGlobal { name, value, .. } => {
                let value = self.lower_expr(value)?;
                let global = self.global_slot(name);
                self.assign(value, global);
            }
            Stmt::Expr(expr) => {
                self.lower_expr(expr)?;
            }
            Stmt::Return(Some(value)) => {
                let value = self.lower_expr(value)?;
                self.assign(value, self.ret);
            }
            Stmt::Return(None) => {
                self.seeds
                    .push((self.ret, TypeDesc::Builtin(BuiltinType::None)));
            }
            Stmt::If {
                test,
                then_body,
                else_body,
            } => {
                self.lower_expr(test)?;
                self.lower_body(then_body)?;
                self.lower_body(else_body)?;
            }
            Stmt::While { test, body } => {
                self.lower_expr(test)?;
                self.lower_body(body)?;
            }
            Stmt::For {
                target,
                iter,
                body,
                node,
            } => {
                let base = self.lower_expr(iter)?;
                let dst = self.local(target)?;
                let field = self.store.element_field();
                let op = self.op(*node);
                self.constraints.push(Constraint::Load {
                    op,
                    base,
                    field,
                    dst,
                });
                self.lower_body(body)?;
            }
            Stmt::Try {
                body,
                handlers,
                finally,
            } => {
                self.lower_body(body)?;
                for handler in handlers {
                    self.lower_handler(handler)?;
                }
                self.lower_body(finally)?;
            }
            Stmt::Raise(value) => {
                let value = self.lower_expr(value)?;
                self.assign(value, self.exception);
            }
            Stmt::TypeSwitch {
                value,
                class,
                on_true,
                on_false,
                ..
            } => {
                let tested = self.local(value)?;
                let test = self.type_test(class)?;
                let on_true = self.local(on_true)?;
                let on_false = self.local(on_false)?;
                self.constraints.push(Constraint::Is {
                    tested,
                    test,
                    on_true,
                    on_false,
                });
            }
        }
        Ok(())
    }

    fn lower_handler(&mut self, handler: &Handler) -> Result<()> {
        let test = match &handler.class {
            Some(class) => Some(self.type_test(class)?),
            None => None,
        };
        if let Some(name) = &handler.name {
            let bound = self.local(name)?;
            match test {
                Some(test) => {
                    let rest = self.temp();
                    self.constraints.push(Constraint::Is {
                        tested: self.exception,
                        test,
                        on_true: bound,
                        on_false: rest,
                    });
                }
                None => self.assign(self.exception, bound),
            }
        }
        self.lower_body(&handler.body)
    }
}

/// Names bound by assignment anywhere in a body
fn assigned_locals(body: &[Stmt]) -> Vec<String> {
    let mut names = Vec::new();
    walk_stmts(body, &mut |stmt| match stmt {
        Stmt::Assign { target, .. } | Stmt::For { target, .. } => names.push(target.clone()),
        Stmt::TypeSwitch {
            on_true, on_false, ..
        } => {
            names.push(on_true.clone());
            names.push(on_false.clone());
        }
        Stmt::Try { handlers, .. } => {
            names.extend(handlers.iter().filter_map(|h| h.name.clone()));
        }
        _ => {}
    });
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::cpa::domain::ConstraintKind;
    use crate::features::ir::{Param, ProgramBuilder};

    fn kinds(body: &ExtractedBody) -> Vec<ConstraintKind> {
        body.constraints.iter().map(Constraint::kind).collect()
    }

    #[test]
    fn test_extract_attribute_flow() {
        let mut b = ProgramBuilder::new();
        let f = b.function(
            "f",
            vec![Param::new("p")],
            vec![
                Stmt::store_attr(Expr::local("p"), "x", Expr::int(1)),
                Stmt::assign("y", Expr::attr(Expr::local("p"), "x")),
                Stmt::ret(Expr::local("y")),
            ],
        );
        let program = b.build().unwrap();
        let mut store = StoreGraph::new();
        let body = extract(&program, &mut store, f, InvocationId(0)).unwrap();

        assert_eq!(
            kinds(&body),
            vec![
                ConstraintKind::Store,
                ConstraintKind::Load,
                ConstraintKind::Assign,
                ConstraintKind::Assign
            ]
        );
        assert_eq!(body.body.params.len(), 1);
        assert!(body.body.locals.contains_key("y"));
        // int constant seeded, no None return since the body ends with a return
        assert_eq!(body.seeds.len(), 1);
    }

    #[test]
    fn test_undefined_local_is_malformed() {
        let mut b = ProgramBuilder::new();
        let f = b.function("f", vec![], vec![Stmt::ret(Expr::local("ghost"))]);
        let program = b.build().unwrap();
        let mut store = StoreGraph::new();
        let err = extract(&program, &mut store, f, InvocationId(0)).unwrap_err();
        assert!(matches!(err, CpaError::MalformedIr { .. }));
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_malformed_extraction_leaves_store_untouched() {
        let mut b = ProgramBuilder::new();
        let f = b.function(
            "f",
            vec![Param::new("x")],
            vec![
                Stmt::store_global("counter", Expr::int(1)),
                Stmt::ret(Expr::local("ghost")),
            ],
        );
        let program = b.build().unwrap();
        let mut store = StoreGraph::new();
        let before = store.slot_count();
        let module = store.module();

        assert!(extract(&program, &mut store, f, InvocationId(0)).is_err());
        assert_eq!(store.slot_count(), before);
        assert!(store.lookup_field("counter").is_none());
        assert_eq!(store.fields_of(module).count(), 0);
        assert!(store.drain_changed().is_empty());

        // slots are handed out again from the same point
        let g = store.new_slot(SlotOwner::Temp(InvocationId(1)));
        assert_eq!(g.0 as usize, before);
    }

    #[test]
    fn test_unknown_class_is_malformed() {
        let mut b = ProgramBuilder::new();
        let f = b.function("f", vec![], vec![Stmt::ret(Expr::new_object("Nope"))]);
        let program = b.build().unwrap();
        let mut store = StoreGraph::new();
        assert!(extract(&program, &mut store, f, InvocationId(0)).is_err());
    }

    #[test]
    fn test_operators_dispatch_through_dunders() {
        let mut b = ProgramBuilder::new();
        let f = b.function(
            "f",
            vec![Param::new("a"), Param::new("b")],
            vec![Stmt::ret(Expr::binop(
                crate::features::ir::BinOpKind::Add,
                Expr::local("a"),
                Expr::local("b"),
            ))],
        );
        let program = b.build().unwrap();
        let mut store = StoreGraph::new();
        let body = extract(&program, &mut store, f, InvocationId(0)).unwrap();
        let add = store.lookup_field("__add__").unwrap();
        match &body.constraints[0] {
            Constraint::Call(call) => {
                assert_eq!(
                    call.target,
                    CallTarget::Method {
                        receiver: body.body.params[0],
                        attr: add
                    }
                );
                assert_eq!(call.args, vec![body.body.params[1]]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_fall_through_seeds_none() {
        let mut b = ProgramBuilder::new();
        let f = b.function("f", vec![], vec![]);
        let program = b.build().unwrap();
        let mut store = StoreGraph::new();
        let body = extract(&program, &mut store, f, InvocationId(0)).unwrap();
        assert_eq!(
            body.seeds,
            vec![(body.body.ret, TypeDesc::Builtin(BuiltinType::None))]
        );
    }

    #[test]
    fn test_handler_filters_exceptions() {
        let mut b = ProgramBuilder::new();
        b.class("Oops", &[]);
        let f = b.function(
            "f",
            vec![],
            vec![Stmt::Try {
                body: vec![Stmt::Raise(Expr::new_object("Oops"))],
                handlers: vec![Handler {
                    class: Some("Oops".into()),
                    name: Some("e".into()),
                    body: vec![],
                }],
                finally: vec![],
            }],
        );
        let program = b.build().unwrap();
        let mut store = StoreGraph::new();
        let body = extract(&program, &mut store, f, InvocationId(0)).unwrap();
        assert_eq!(
            kinds(&body),
            vec![
                ConstraintKind::Allocate,
                ConstraintKind::Assign,
                ConstraintKind::Is
            ]
        );
    }
}
