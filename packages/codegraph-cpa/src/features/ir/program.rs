//! Normalized program representation consumed by the analysis
//!
//! A small, fixed vocabulary produced by the frontend: assignments, attribute and
//! subscript loads/stores, operators, calls, container construction, allocation and
//! the control statements (`if`/`while`/`for`/`try`). Control flow is kept only as
//! nesting; the points-to analysis is flow-insensitive within a body.

use super::ids::{ClassId, CodeId, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Builtin types of the source language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuiltinType {
    Int,
    Float,
    Str,
    Bool,
    None,
    List,
    Tuple,
    Dict,
    Module,
}

impl BuiltinType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuiltinType::Int => "int",
            BuiltinType::Float => "float",
            BuiltinType::Str => "str",
            BuiltinType::Bool => "bool",
            BuiltinType::None => "NoneType",
            BuiltinType::List => "list",
            BuiltinType::Tuple => "tuple",
            BuiltinType::Dict => "dict",
            BuiltinType::Module => "module",
        }
    }

    /// Resolve a builtin type by its source-level name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "int" => Some(BuiltinType::Int),
            "float" => Some(BuiltinType::Float),
            "str" => Some(BuiltinType::Str),
            "bool" => Some(BuiltinType::Bool),
            "NoneType" => Some(BuiltinType::None),
            "list" => Some(BuiltinType::List),
            "tuple" => Some(BuiltinType::Tuple),
            "dict" => Some(BuiltinType::Dict),
            _ => None,
        }
    }

    /// Containers keep their elements in the element field
    pub fn is_container(&self) -> bool {
        matches!(self, BuiltinType::List | BuiltinType::Tuple | BuiltinType::Dict)
    }
}

/// Literal constant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    None,
}

impl Literal {
    pub fn builtin_type(&self) -> BuiltinType {
        match self {
            Literal::Int(_) => BuiltinType::Int,
            Literal::Float(_) => BuiltinType::Float,
            Literal::Str(_) => BuiltinType::Str,
            Literal::Bool(_) => BuiltinType::Bool,
            Literal::None => BuiltinType::None,
        }
    }
}

/// Binary operators, dispatched through their dunder method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOpKind {
    pub fn dunder(&self) -> &'static str {
        match self {
            BinOpKind::Add => "__add__",
            BinOpKind::Sub => "__sub__",
            BinOpKind::Mul => "__mul__",
            BinOpKind::Div => "__truediv__",
            BinOpKind::Mod => "__mod__",
            BinOpKind::Eq => "__eq__",
            BinOpKind::Ne => "__ne__",
            BinOpKind::Lt => "__lt__",
            BinOpKind::Le => "__le__",
            BinOpKind::Gt => "__gt__",
            BinOpKind::Ge => "__ge__",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOpKind {
    Neg,
    Invert,
    Not,
}

impl UnaryOpKind {
    /// `not` is evaluated by the interpreter and never dispatches
    pub fn dunder(&self) -> Option<&'static str> {
        match self {
            UnaryOpKind::Neg => Some("__neg__"),
            UnaryOpKind::Invert => Some("__invert__"),
            UnaryOpKind::Not => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Local(String),
    Global(String),
    Const(Literal),
    Attr {
        base: Box<Expr>,
        attr: String,
        node: NodeId,
    },
    Subscript {
        base: Box<Expr>,
        index: Box<Expr>,
        node: NodeId,
    },
    BinOp {
        op: BinOpKind,
        left: Box<Expr>,
        right: Box<Expr>,
        node: NodeId,
    },
    UnaryOp {
        op: UnaryOpKind,
        operand: Box<Expr>,
        node: NodeId,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        node: NodeId,
    },
    MethodCall {
        receiver: Box<Expr>,
        attr: String,
        args: Vec<Expr>,
        node: NodeId,
    },
    /// Allocation of a new instance without running a constructor
    New { class: String, node: NodeId },
    BuildList { elements: Vec<Expr>, node: NodeId },
    BuildTuple { elements: Vec<Expr>, node: NodeId },
    BuildDict {
        entries: Vec<(Expr, Expr)>,
        node: NodeId,
    },
    IsInstance {
        value: Box<Expr>,
        class: String,
        node: NodeId,
    },
}

impl Expr {
    pub fn local(name: impl Into<String>) -> Self {
        Expr::Local(name.into())
    }

    pub fn global(name: impl Into<String>) -> Self {
        Expr::Global(name.into())
    }

    pub fn int(value: i64) -> Self {
        Expr::Const(Literal::Int(value))
    }

    pub fn str(value: impl Into<String>) -> Self {
        Expr::Const(Literal::Str(value.into()))
    }

    pub fn none() -> Self {
        Expr::Const(Literal::None)
    }

    pub fn attr(base: Expr, attr: impl Into<String>) -> Self {
        Expr::Attr {
            base: Box::new(base),
            attr: attr.into(),
            node: NodeId::PENDING,
        }
    }

    pub fn subscript(base: Expr, index: Expr) -> Self {
        Expr::Subscript {
            base: Box::new(base),
            index: Box::new(index),
            node: NodeId::PENDING,
        }
    }

    pub fn binop(op: BinOpKind, left: Expr, right: Expr) -> Self {
        Expr::BinOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
            node: NodeId::PENDING,
        }
    }

    pub fn unary(op: UnaryOpKind, operand: Expr) -> Self {
        Expr::UnaryOp {
            op,
            operand: Box::new(operand),
            node: NodeId::PENDING,
        }
    }

    pub fn call(callee: Expr, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: Box::new(callee),
            args,
            node: NodeId::PENDING,
        }
    }

    pub fn method(receiver: Expr, attr: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::MethodCall {
            receiver: Box::new(receiver),
            attr: attr.into(),
            args,
            node: NodeId::PENDING,
        }
    }

    pub fn new_object(class: impl Into<String>) -> Self {
        Expr::New {
            class: class.into(),
            node: NodeId::PENDING,
        }
    }

    pub fn list(elements: Vec<Expr>) -> Self {
        Expr::BuildList {
            elements,
            node: NodeId::PENDING,
        }
    }

    pub fn tuple(elements: Vec<Expr>) -> Self {
        Expr::BuildTuple {
            elements,
            node: NodeId::PENDING,
        }
    }

    pub fn dict(entries: Vec<(Expr, Expr)>) -> Self {
        Expr::BuildDict {
            entries,
            node: NodeId::PENDING,
        }
    }

    pub fn is_instance(value: Expr, class: impl Into<String>) -> Self {
        Expr::IsInstance {
            value: Box::new(value),
            class: class.into(),
            node: NodeId::PENDING,
        }
    }

    /// Node id of this expression, if it has one
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Expr::Local(_) | Expr::Global(_) | Expr::Const(_) => None,
            Expr::Attr { node, .. }
            | Expr::Subscript { node, .. }
            | Expr::BinOp { node, .. }
            | Expr::UnaryOp { node, .. }
            | Expr::Call { node, .. }
            | Expr::MethodCall { node, .. }
            | Expr::New { node, .. }
            | Expr::BuildList { node, .. }
            | Expr::BuildTuple { node, .. }
            | Expr::BuildDict { node, .. }
            | Expr::IsInstance { node, .. } => Some(*node),
        }
    }

    /// Visit this expression and its sub-expressions in evaluation order
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        match self {
            Expr::Local(_) | Expr::Global(_) | Expr::Const(_) | Expr::New { .. } => {}
            Expr::Attr { base, .. } => base.walk(visit),
            Expr::Subscript { base, index, .. } => {
                base.walk(visit);
                index.walk(visit);
            }
            Expr::BinOp { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expr::UnaryOp { operand, .. } => operand.walk(visit),
            Expr::Call { callee, args, .. } => {
                callee.walk(visit);
                args.iter().for_each(|a| a.walk(visit));
            }
            Expr::MethodCall { receiver, args, .. } => {
                receiver.walk(visit);
                args.iter().for_each(|a| a.walk(visit));
            }
            Expr::BuildList { elements, .. } | Expr::BuildTuple { elements, .. } => {
                elements.iter().for_each(|e| e.walk(visit));
            }
            Expr::BuildDict { entries, .. } => {
                for (k, v) in entries {
                    k.walk(visit);
                    v.walk(visit);
                }
            }
            Expr::IsInstance { value, .. } => value.walk(visit),
        }
        visit(self);
    }
}

/// Exception handler of a `try` statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handler {
    /// Class filter (`except C`); `None` catches everything
    pub class: Option<String>,
    /// Local bound to the caught exception (`except C as name`)
    pub name: Option<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Assign {
        target: String,
        value: Expr,
    },
    StoreAttr {
        base: Expr,
        attr: String,
        value: Expr,
        node: NodeId,
    },
    StoreSubscript {
        base: Expr,
        index: Expr,
        value: Expr,
        node: NodeId,
    },
    StoreGlobal {
        name: String,
        value: Expr,
        node: NodeId,
    },
    Expr(Expr),
    Return(Option<Expr>),
    If {
        test: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
    },
    For {
        target: String,
        iter: Expr,
        body: Vec<Stmt>,
        node: NodeId,
    },
    Try {
        body: Vec<Stmt>,
        handlers: Vec<Handler>,
        finally: Vec<Stmt>,
    },
    Raise(Expr),
    /// `on_true, on_false = split(value, class)`: type-test refinement
    TypeSwitch {
        value: String,
        class: String,
        on_true: String,
        on_false: String,
        node: NodeId,
    },
}

impl Stmt {
    pub fn assign(target: impl Into<String>, value: Expr) -> Self {
        Stmt::Assign {
            target: target.into(),
            value,
        }
    }

    pub fn store_attr(base: Expr, attr: impl Into<String>, value: Expr) -> Self {
        Stmt::StoreAttr {
            base,
            attr: attr.into(),
            value,
            node: NodeId::PENDING,
        }
    }

    pub fn store_subscript(base: Expr, index: Expr, value: Expr) -> Self {
        Stmt::StoreSubscript {
            base,
            index,
            value,
            node: NodeId::PENDING,
        }
    }

    pub fn store_global(name: impl Into<String>, value: Expr) -> Self {
        Stmt::StoreGlobal {
            name: name.into(),
            value,
            node: NodeId::PENDING,
        }
    }

    pub fn expr(value: Expr) -> Self {
        Stmt::Expr(value)
    }

    pub fn ret(value: Expr) -> Self {
        Stmt::Return(Some(value))
    }

    pub fn if_else(test: Expr, then_body: Vec<Stmt>, else_body: Vec<Stmt>) -> Self {
        Stmt::If {
            test,
            then_body,
            else_body,
        }
    }

    pub fn while_loop(test: Expr, body: Vec<Stmt>) -> Self {
        Stmt::While { test, body }
    }

    pub fn for_loop(target: impl Into<String>, iter: Expr, body: Vec<Stmt>) -> Self {
        Stmt::For {
            target: target.into(),
            iter,
            body,
            node: NodeId::PENDING,
        }
    }

    pub fn type_switch(
        value: impl Into<String>,
        class: impl Into<String>,
        on_true: impl Into<String>,
        on_false: impl Into<String>,
    ) -> Self {
        Stmt::TypeSwitch {
            value: value.into(),
            class: class.into(),
            on_true: on_true.into(),
            on_false: on_false.into(),
            node: NodeId::PENDING,
        }
    }

    /// Top-level expressions of this statement (not those of nested bodies)
    pub fn exprs(&self) -> Vec<&Expr> {
        match self {
            Stmt::Assign { value, .. } => vec![value],
            Stmt::StoreAttr { base, value, .. } => vec![base, value],
            Stmt::StoreSubscript {
                base, index, value, ..
            } => vec![base, index, value],
            Stmt::StoreGlobal { value, .. } => vec![value],
            Stmt::Expr(e) | Stmt::Raise(e) => vec![e],
            Stmt::Return(value) => value.iter().collect(),
            Stmt::If { test, .. } | Stmt::While { test, .. } => vec![test],
            Stmt::For { iter, .. } => vec![iter],
            Stmt::Try { .. } | Stmt::TypeSwitch { .. } => Vec::new(),
        }
    }

    /// Nested statement bodies
    pub fn bodies(&self) -> Vec<&[Stmt]> {
        match self {
            Stmt::If {
                then_body,
                else_body,
                ..
            } => vec![then_body, else_body],
            Stmt::While { body, .. } | Stmt::For { body, .. } => vec![body],
            Stmt::Try {
                body,
                handlers,
                finally,
            } => {
                let mut out: Vec<&[Stmt]> = vec![body];
                out.extend(handlers.iter().map(|h| h.body.as_slice()));
                out.push(finally);
                out
            }
            _ => Vec::new(),
        }
    }
}

/// Visit every statement of a body, depth-first in source order
pub fn walk_stmts<'a>(body: &'a [Stmt], visit: &mut impl FnMut(&'a Stmt)) {
    for stmt in body {
        visit(stmt);
        for nested in stmt.bodies() {
            walk_stmts(nested, visit);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub default: Option<Literal>,
    /// Declared type (class or builtin name), used to seed entry-point arguments
    pub annotation: Option<String>,
}

impl Param {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            annotation: None,
        }
    }

    pub fn with_default(mut self, default: Literal) -> Self {
        self.default = Some(default);
        self
    }

    pub fn annotated(mut self, type_name: impl Into<String>) -> Self {
        self.annotation = Some(type_name.into());
        self
    }
}

/// A function or method body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Code {
    pub id: CodeId,
    pub name: String,
    /// Defining class for methods
    pub owner: Option<ClassId>,
    pub params: Vec<Param>,
    pub vararg: Option<String>,
    pub body: Vec<Stmt>,
}

impl Code {
    /// Number of parameters without a default value
    pub fn required_params(&self) -> usize {
        self.params.iter().filter(|p| p.default.is_none()).count()
    }

    /// Whether a call passing `given` positional arguments can bind
    pub fn accepts(&self, given: usize) -> bool {
        given >= self.required_params() && (given <= self.params.len() || self.vararg.is_some())
    }

    /// Call and method-call nodes in source order
    pub fn call_nodes(&self) -> Vec<NodeId> {
        let mut nodes = Vec::new();
        walk_stmts(&self.body, &mut |stmt| {
            for expr in stmt.exprs() {
                expr.walk(&mut |e| {
                    if let Expr::Call { node, .. } | Expr::MethodCall { node, .. } = e {
                        nodes.push(*node);
                    }
                });
            }
        });
        nodes
    }

    /// Whether some path may fall off the end or return without a value
    pub fn may_return_none(&self) -> bool {
        let mut has_return = false;
        let mut bare_return = false;
        walk_stmts(&self.body, &mut |stmt| {
            if let Stmt::Return(value) = stmt {
                has_return = true;
                bare_return |= value.is_none();
            }
        });
        !has_return || bare_return || !matches!(self.body.last(), Some(Stmt::Return(_)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDef {
    pub id: ClassId,
    pub name: String,
    pub bases: Vec<ClassId>,
    pub methods: BTreeMap<String, CodeId>,
}

/// Module-level binding introduced by a definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlobalDef {
    Function(CodeId),
    Class(ClassId),
}

/// A whole program: every function, method and class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub(crate) codes: Vec<Code>,
    pub(crate) classes: Vec<ClassDef>,
    pub(crate) globals: BTreeMap<String, GlobalDef>,
}

impl Program {
    #[inline]
    pub fn code(&self, id: CodeId) -> &Code {
        &self.codes[id.0 as usize]
    }

    #[inline]
    pub fn class(&self, id: ClassId) -> &ClassDef {
        &self.classes[id.0 as usize]
    }

    pub fn codes(&self) -> impl Iterator<Item = &Code> {
        self.codes.iter()
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassDef> {
        self.classes.iter()
    }

    pub fn globals(&self) -> impl Iterator<Item = (&str, GlobalDef)> {
        self.globals.iter().map(|(name, def)| (name.as_str(), *def))
    }

    pub fn global(&self, name: &str) -> Option<GlobalDef> {
        self.globals.get(name).copied()
    }

    pub fn class_by_name(&self, name: &str) -> Option<ClassId> {
        self.classes.iter().find(|c| c.name == name).map(|c| c.id)
    }

    /// Look up a function (`f`) or method (`C.m`) by qualified name
    pub fn code_by_name(&self, qualified: &str) -> Option<CodeId> {
        self.codes
            .iter()
            .find(|c| self.qualified_name(c.id) == qualified)
            .map(|c| c.id)
    }

    pub fn qualified_name(&self, id: CodeId) -> String {
        let code = self.code(id);
        match code.owner {
            Some(owner) => format!("{}.{}", self.class(owner).name, code.name),
            None => code.name.clone(),
        }
    }

    /// Method resolution order: the class, then its bases depth-first, left to right
    pub fn mro(&self, class: ClassId) -> Vec<ClassId> {
        let mut order = Vec::new();
        let mut stack = vec![class];
        while let Some(c) = stack.pop() {
            if order.contains(&c) {
                continue;
            }
            order.push(c);
            for base in self.class(c).bases.iter().rev() {
                stack.push(*base);
            }
        }
        order
    }

    pub fn lookup_method(&self, class: ClassId, attr: &str) -> Option<CodeId> {
        self.mro(class)
            .into_iter()
            .find_map(|c| self.class(c).methods.get(attr).copied())
    }

    pub fn is_subclass(&self, class: ClassId, of: ClassId) -> bool {
        self.mro(class).contains(&of)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(params: Vec<Param>, vararg: Option<&str>, body: Vec<Stmt>) -> Code {
        Code {
            id: CodeId(0),
            name: "f".to_string(),
            owner: None,
            params,
            vararg: vararg.map(str::to_string),
            body,
        }
    }

    #[test]
    fn test_arity() {
        let c = code(
            vec![Param::new("a"), Param::new("b").with_default(Literal::Int(1))],
            None,
            vec![],
        );
        assert!(!c.accepts(0));
        assert!(c.accepts(1));
        assert!(c.accepts(2));
        assert!(!c.accepts(3));

        let v = code(vec![Param::new("a")], Some("rest"), vec![]);
        assert!(v.accepts(5));
    }

    #[test]
    fn test_may_return_none() {
        assert!(code(vec![], None, vec![]).may_return_none());
        assert!(!code(vec![], None, vec![Stmt::ret(Expr::int(1))]).may_return_none());
        assert!(code(
            vec![],
            None,
            vec![Stmt::if_else(
                Expr::local("c"),
                vec![Stmt::ret(Expr::int(1))],
                vec![]
            )]
        )
        .may_return_none());
    }

    #[test]
    fn test_walk_order_visits_children_first() {
        let e = Expr::call(Expr::local("f"), vec![Expr::method(Expr::local("x"), "g", vec![])]);
        let mut kinds = Vec::new();
        e.walk(&mut |x| {
            kinds.push(matches!(x, Expr::MethodCall { .. }));
        });
        // f, x, x.g(), f(...)
        assert_eq!(kinds, vec![false, false, true, false]);
    }
}
