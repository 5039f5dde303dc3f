//! Builtin method models
//!
//! Operators on primitive values return a primitive of the receiver's type
//! (comparisons return `bool`). Container methods are modelled through the element
//! field `[]`, and dict keys through `<key>`. Anything not listed is unresolved.

use crate::features::ir::BuiltinType;

/// Effect of a builtin method on the store graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intrinsic {
    /// Result is the existing object of a builtin type
    Returns(BuiltinType),
    /// Result is the receiver itself
    ReturnsReceiver,
    /// Result ⊇ receiver.[]
    ReadElements,
    /// receiver.[] ⊇ args[i]; result is None
    WriteElement(usize),
    /// `__setitem__`: dict keys go to `<key>`, values to `[]`
    SetItem,
    /// receiver.[] ⊇ args[i].[]; result is None
    ExtendFrom(usize),
    /// `dict.get`: result ⊇ receiver.[] ∪ args[1]
    GetWithDefault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinMethod {
    pub intrinsic: Intrinsic,
    pub min_args: usize,
    pub max_args: usize,
}

impl BuiltinMethod {
    const fn new(intrinsic: Intrinsic, min_args: usize, max_args: usize) -> Self {
        Self {
            intrinsic,
            min_args,
            max_args,
        }
    }

    #[inline]
    pub fn accepts(&self, given: usize) -> bool {
        (self.min_args..=self.max_args).contains(&given)
    }
}

const COMPARISONS: &[&str] = &["__eq__", "__ne__", "__lt__", "__le__", "__gt__", "__ge__"];

fn arithmetic(ty: BuiltinType, attr: &str) -> bool {
    match ty {
        BuiltinType::Int | BuiltinType::Float | BuiltinType::Bool => matches!(
            attr,
            "__add__" | "__sub__" | "__mul__" | "__truediv__" | "__mod__"
        ),
        BuiltinType::Str => matches!(attr, "__add__" | "__mul__" | "__mod__"),
        _ => false,
    }
}

/// Model of `attr` on a receiver of type `ty`
pub fn lookup(ty: BuiltinType, attr: &str) -> Option<BuiltinMethod> {
    use Intrinsic::*;

    if COMPARISONS.contains(&attr) {
        return Some(BuiltinMethod::new(Returns(BuiltinType::Bool), 1, 1));
    }
    if arithmetic(ty, attr) {
        return Some(BuiltinMethod::new(Returns(ty), 1, 1));
    }

    let method = match (ty, attr) {
        (BuiltinType::Int | BuiltinType::Float | BuiltinType::Bool, "__neg__" | "__invert__") => {
            BuiltinMethod::new(Returns(ty), 0, 0)
        }

        (BuiltinType::Str, "upper" | "lower" | "strip" | "format" | "join" | "replace") => {
            BuiltinMethod::new(Returns(BuiltinType::Str), 0, 2)
        }
        (BuiltinType::Str, "__getitem__") => BuiltinMethod::new(Returns(BuiltinType::Str), 1, 1),

        (BuiltinType::List, "append") => BuiltinMethod::new(WriteElement(0), 1, 1),
        (BuiltinType::List, "extend") => BuiltinMethod::new(ExtendFrom(0), 1, 1),
        (BuiltinType::List, "pop") => BuiltinMethod::new(ReadElements, 0, 1),
        (BuiltinType::List | BuiltinType::Dict, "__setitem__") => BuiltinMethod::new(SetItem, 2, 2),
        (BuiltinType::List | BuiltinType::Tuple | BuiltinType::Dict, "__getitem__") => {
            BuiltinMethod::new(ReadElements, 1, 1)
        }
        (BuiltinType::List | BuiltinType::Tuple | BuiltinType::Dict, "__iter__") => {
            BuiltinMethod::new(ReturnsReceiver, 0, 0)
        }

        (BuiltinType::Dict, "get") => BuiltinMethod::new(GetWithDefault, 1, 2),
        (BuiltinType::Dict, "pop") => BuiltinMethod::new(ReadElements, 1, 1),

        _ => return None,
    };
    Some(method)
}

/// Display name recorded in call targets, e.g. `list.append`
pub fn qualified_name(ty: BuiltinType, attr: &str) -> String {
    format!("{}.{}", ty.as_str(), attr)
}
