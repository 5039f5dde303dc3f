//! Normalized IR consumed by the points-to analysis
//!
//! The frontend lowers source into this model; the analysis never sees an AST.
//! Every call and allocation expression carries a unique [`NodeId`].

pub mod builder;
pub mod ids;
pub mod program;

pub use builder::{IrError, ProgramBuilder};
pub use ids::{ClassId, CodeId, NodeId};
pub use program::{
    walk_stmts, BinOpKind, BuiltinType, ClassDef, Code, Expr, GlobalDef, Handler, Literal, Param,
    Program, Stmt, UnaryOpKind,
};
