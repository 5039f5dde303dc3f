//! Program construction and structural validation

use super::ids::{ClassId, CodeId, NodeId};
use super::program::{ClassDef, Code, Expr, GlobalDef, Param, Program, Stmt};
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use thiserror::Error;

/// Structural errors found while building a [`Program`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IrError {
    #[error("class '{class}' inherits from unknown class '{base}'")]
    UnknownBase { class: String, base: String },

    #[error("class '{0}' inherits from itself")]
    InheritanceCycle(String),

    #[error("duplicate module-level definition '{0}'")]
    DuplicateDefinition(String),

    #[error("duplicate method '{method}' in class '{class}'")]
    DuplicateMethod { class: String, method: String },

    #[error("node id {0} is used more than once")]
    DuplicateNodeId(NodeId),

    #[error("unknown class id {0}")]
    InvalidClass(ClassId),

    #[error("unknown code id {0}")]
    InvalidCode(CodeId),
}

struct PendingClass {
    name: String,
    bases: Vec<String>,
    methods: Vec<(String, CodeId)>,
}

/// Incremental builder for [`Program`]
///
/// Expression and statement constructors leave node ids pending; `build` numbers
/// them in definition order, after the largest explicitly assigned id.
///
/// # Example
/// ```
/// use codegraph_cpa::features::ir::{Expr, Param, ProgramBuilder, Stmt};
///
/// let mut b = ProgramBuilder::new();
/// let point = b.class("Point", &[]);
/// b.method(point, "__init__", vec![Param::new("self"), Param::new("x")], vec![
///     Stmt::store_attr(Expr::local("self"), "x", Expr::local("x")),
/// ]);
/// b.function("make", vec![], vec![
///     Stmt::ret(Expr::call(Expr::global("Point"), vec![Expr::int(1)])),
/// ]);
/// let program = b.build().unwrap();
/// assert_eq!(program.codes().count(), 2);
/// ```
#[derive(Default)]
pub struct ProgramBuilder {
    codes: Vec<Code>,
    classes: Vec<PendingClass>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a class; bases are resolved by name at build time
    pub fn class(&mut self, name: impl Into<String>, bases: &[&str]) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        self.classes.push(PendingClass {
            name: name.into(),
            bases: bases.iter().map(|b| b.to_string()).collect(),
            methods: Vec::new(),
        });
        id
    }

    /// Add a module-level function
    pub fn function(&mut self, name: impl Into<String>, params: Vec<Param>, body: Vec<Stmt>) -> CodeId {
        self.push_code(name.into(), None, params, body)
    }

    /// Add a method to a declared class
    pub fn method(
        &mut self,
        class: ClassId,
        name: impl Into<String>,
        params: Vec<Param>,
        body: Vec<Stmt>,
    ) -> CodeId {
        let name = name.into();
        let id = self.push_code(name.clone(), Some(class), params, body);
        if let Some(pending) = self.classes.get_mut(class.0 as usize) {
            pending.methods.push((name, id));
        }
        id
    }

    /// Give a function a `*args` parameter
    pub fn vararg(&mut self, code: CodeId, name: impl Into<String>) -> &mut Self {
        if let Some(c) = self.codes.get_mut(code.0 as usize) {
            c.vararg = Some(name.into());
        }
        self
    }

    fn push_code(
        &mut self,
        name: String,
        owner: Option<ClassId>,
        params: Vec<Param>,
        body: Vec<Stmt>,
    ) -> CodeId {
        let id = CodeId(self.codes.len() as u32);
        self.codes.push(Code {
            id,
            name,
            owner,
            params,
            vararg: None,
            body,
        });
        id
    }

    pub fn build(self) -> Result<Program, IrError> {
        let ProgramBuilder {
            mut codes,
            classes: pending,
        } = self;

        for code in &codes {
            if let Some(owner) = code.owner {
                if owner.0 as usize >= pending.len() {
                    return Err(IrError::InvalidClass(owner));
                }
            }
        }

        let mut globals = BTreeMap::new();
        for code in codes.iter().filter(|c| c.owner.is_none()) {
            if globals
                .insert(code.name.clone(), GlobalDef::Function(code.id))
                .is_some()
            {
                return Err(IrError::DuplicateDefinition(code.name.clone()));
            }
        }
        for (index, class) in pending.iter().enumerate() {
            if globals
                .insert(class.name.clone(), GlobalDef::Class(ClassId(index as u32)))
                .is_some()
            {
                return Err(IrError::DuplicateDefinition(class.name.clone()));
            }
        }

        let mut classes = Vec::with_capacity(pending.len());
        for (index, class) in pending.into_iter().enumerate() {
            let mut bases = Vec::with_capacity(class.bases.len());
            for base in &class.bases {
                match globals.get(base) {
                    Some(GlobalDef::Class(id)) => bases.push(*id),
                    _ => {
                        return Err(IrError::UnknownBase {
                            class: class.name.clone(),
                            base: base.clone(),
                        })
                    }
                }
            }
            let mut methods = BTreeMap::new();
            for (name, code) in class.methods {
                if methods.insert(name.clone(), code).is_some() {
                    return Err(IrError::DuplicateMethod {
                        class: class.name.clone(),
                        method: name,
                    });
                }
            }
            classes.push(ClassDef {
                id: ClassId(index as u32),
                name: class.name,
                bases,
                methods,
            });
        }
        check_acyclic(&classes)?;

        number_nodes(&mut codes)?;

        Ok(Program {
            codes,
            classes,
            globals,
        })
    }
}

fn check_acyclic(classes: &[ClassDef]) -> Result<(), IrError> {
    // 0 = unvisited, 1 = on stack, 2 = done
    fn visit(classes: &[ClassDef], id: usize, marks: &mut [u8]) -> Result<(), IrError> {
        match marks[id] {
            1 => return Err(IrError::InheritanceCycle(classes[id].name.clone())),
            2 => return Ok(()),
            _ => {}
        }
        marks[id] = 1;
        for base in &classes[id].bases {
            visit(classes, base.0 as usize, marks)?;
        }
        marks[id] = 2;
        Ok(())
    }

    let mut marks = vec![0u8; classes.len()];
    for id in 0..classes.len() {
        visit(classes, id, &mut marks)?;
    }
    Ok(())
}

fn number_nodes(codes: &mut [Code]) -> Result<(), IrError> {
    let mut slots: Vec<&mut NodeId> = Vec::new();
    for code in codes.iter_mut() {
        collect_stmts(&mut code.body, &mut slots);
    }

    let mut seen = FxHashSet::default();
    let mut next = 0u32;
    for node in slots.iter().filter(|n| !n.is_pending()) {
        if !seen.insert(**node) {
            return Err(IrError::DuplicateNodeId(**node));
        }
        next = next.max(node.0 + 1);
    }
    for node in slots.into_iter().filter(|n| n.is_pending()) {
        *node = NodeId(next);
        next += 1;
    }
    Ok(())
}

fn collect_stmts<'a>(body: &'a mut [Stmt], out: &mut Vec<&'a mut NodeId>) {
    for stmt in body.iter_mut() {
        match stmt {
            Stmt::Assign { value, .. } | Stmt::Expr(value) | Stmt::Raise(value) => {
                collect_expr(value, out)
            }
            Stmt::StoreAttr {
                base, value, node, ..
            } => {
                collect_expr(base, out);
                collect_expr(value, out);
                out.push(node);
            }
            Stmt::StoreSubscript {
                base,
                index,
                value,
                node,
            } => {
                collect_expr(base, out);
                collect_expr(index, out);
                collect_expr(value, out);
                out.push(node);
            }
            Stmt::StoreGlobal { value, node, .. } => {
                collect_expr(value, out);
                out.push(node);
            }
            Stmt::Return(value) => {
                if let Some(value) = value {
                    collect_expr(value, out);
                }
            }
            Stmt::If {
                test,
                then_body,
                else_body,
            } => {
                collect_expr(test, out);
                collect_stmts(then_body, out);
                collect_stmts(else_body, out);
            }
            Stmt::While { test, body } => {
                collect_expr(test, out);
                collect_stmts(body, out);
            }
            Stmt::For {
                iter, body, node, ..
            } => {
                collect_expr(iter, out);
                out.push(node);
                collect_stmts(body, out);
            }
            Stmt::Try {
                body,
                handlers,
                finally,
            } => {
                collect_stmts(body, out);
                for handler in handlers.iter_mut() {
                    collect_stmts(&mut handler.body, out);
                }
                collect_stmts(finally, out);
            }
            Stmt::TypeSwitch { node, .. } => out.push(node),
        }
    }
}

fn collect_expr<'a>(expr: &'a mut Expr, out: &mut Vec<&'a mut NodeId>) {
    match expr {
        Expr::Local(_) | Expr::Global(_) | Expr::Const(_) => {}
        Expr::Attr { base, node, .. } => {
            collect_expr(base, out);
            out.push(node);
        }
        Expr::Subscript { base, index, node } => {
            collect_expr(base, out);
            collect_expr(index, out);
            out.push(node);
        }
        Expr::BinOp {
            left, right, node, ..
        } => {
            collect_expr(left, out);
            collect_expr(right, out);
            out.push(node);
        }
        Expr::UnaryOp { operand, node, .. } => {
            collect_expr(operand, out);
            out.push(node);
        }
        Expr::Call { callee, args, node } => {
            collect_expr(callee, out);
            for arg in args.iter_mut() {
                collect_expr(arg, out);
            }
            out.push(node);
        }
        Expr::MethodCall {
            receiver,
            args,
            node,
            ..
        } => {
            collect_expr(receiver, out);
            for arg in args.iter_mut() {
                collect_expr(arg, out);
            }
            out.push(node);
        }
        Expr::New { node, .. } => out.push(node),
        Expr::BuildList { elements, node } | Expr::BuildTuple { elements, node } => {
            for element in elements.iter_mut() {
                collect_expr(element, out);
            }
            out.push(node);
        }
        Expr::BuildDict { entries, node } => {
            for (key, value) in entries.iter_mut() {
                collect_expr(key, out);
                collect_expr(value, out);
            }
            out.push(node);
        }
        Expr::IsInstance { value, node, .. } => {
            collect_expr(value, out);
            out.push(node);
        }
    }
}
