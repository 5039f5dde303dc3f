//! Call resolution
//!
//! A pure function of one callee object, the called attribute and the number of
//! positional arguments. Method lookup follows the program's MRO (depth-first,
//! bases left to right).

use super::builtins::{self, BuiltinMethod};
use crate::features::cpa::domain::{AbstractObject, AllocSite, FieldId, ObjectId, TypeDesc};
use crate::features::ir::{BuiltinType, ClassId, CodeId, Program};

/// What calling one object does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidate {
    /// Bind `code`; a receiver becomes its first parameter
    Code {
        code: CodeId,
        receiver: Option<ObjectId>,
    },
    /// Instantiate `class` at the call node, then run `init` on the new instance
    Construct { class: ClassId, init: Option<CodeId> },
    /// Builtin method on a primitive or container receiver
    Intrinsic {
        receiver: ObjectId,
        ty: BuiltinType,
        method: BuiltinMethod,
    },
    /// No method found: call whatever is stored in `object.attr`
    FieldFallback { object: ObjectId, attr: FieldId },
    /// The callee is the unknown object
    Unknown,
}

/// `f(args)` where `f` may reference `callee`
pub fn resolve_value(program: &Program, callee: &AbstractObject, argc: usize) -> Option<Candidate> {
    match callee.ty {
        TypeDesc::Function(code) => program.code(code).accepts(argc).then_some(Candidate::Code {
            code,
            receiver: None,
        }),
        TypeDesc::BoundMethod(code) => match callee.site {
            AllocSite::BoundMethod { receiver, .. } if program.code(code).accepts(argc + 1) => {
                Some(Candidate::Code {
                    code,
                    receiver: Some(receiver),
                })
            }
            _ => None,
        },
        TypeDesc::Class(class) => {
            let init = program
                .lookup_method(class, "__init__")
                .filter(|init| program.code(*init).accepts(argc + 1));
            Some(Candidate::Construct { class, init })
        }
        TypeDesc::Instance(class) => program
            .lookup_method(class, "__call__")
            .filter(|call| program.code(*call).accepts(argc + 1))
            .map(|code| Candidate::Code {
                code,
                receiver: Some(callee.id),
            }),
        TypeDesc::Unknown => Some(Candidate::Unknown),
        TypeDesc::Builtin(_) => None,
    }
}

/// `x.attr(args)` where `x` may reference `receiver`
pub fn resolve_method(
    program: &Program,
    receiver: &AbstractObject,
    attr: &str,
    attr_id: FieldId,
    argc: usize,
) -> Option<Candidate> {
    let fallback = Candidate::FieldFallback {
        object: receiver.id,
        attr: attr_id,
    };
    match receiver.ty {
        TypeDesc::Instance(class) => match program.lookup_method(class, attr) {
            Some(code) => program.code(code).accepts(argc + 1).then_some(Candidate::Code {
                code,
                receiver: Some(receiver.id),
            }),
            None => Some(fallback),
        },
        TypeDesc::Class(class) => match program.lookup_method(class, attr) {
            Some(code) => program.code(code).accepts(argc).then_some(Candidate::Code {
                code,
                receiver: None,
            }),
            None => Some(fallback),
        },
        TypeDesc::Builtin(BuiltinType::Module) => Some(fallback),
        TypeDesc::Builtin(ty) => builtins::lookup(ty, attr)
            .filter(|method| method.accepts(argc))
            .map(|method| Candidate::Intrinsic {
                receiver: receiver.id,
                ty,
                method,
            }),
        TypeDesc::Function(_) | TypeDesc::BoundMethod(_) => Some(fallback),
        TypeDesc::Unknown => Some(Candidate::Unknown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::cpa::domain::ContextId;
    use crate::features::ir::{Param, ProgramBuilder};

    fn object(id: u32, ty: TypeDesc) -> AbstractObject {
        AbstractObject {
            id: ObjectId(id),
            site: AllocSite::Existing(ty),
            context: ContextId::ROOT,
            ty,
        }
    }

    fn shapes() -> (Program, ClassId, ClassId, CodeId, CodeId) {
        let mut b = ProgramBuilder::new();
        let shape = b.class("Shape", &[]);
        let square = b.class("Square", &["Shape"]);
        let area = b.method(shape, "area", vec![Param::new("self")], vec![]);
        let init = b.method(
            square,
            "__init__",
            vec![Param::new("self"), Param::new("side")],
            vec![],
        );
        (b.build().unwrap(), shape, square, area, init)
    }

    #[test]
    fn test_method_found_along_mro() {
        let (program, _, square, area, _) = shapes();
        let recv = object(7, TypeDesc::Instance(square));
        assert_eq!(
            resolve_method(&program, &recv, "area", FieldId(9), 0),
            Some(Candidate::Code {
                code: area,
                receiver: Some(ObjectId(7))
            })
        );
        // arity mismatch
        assert_eq!(resolve_method(&program, &recv, "area", FieldId(9), 1), None);
    }

    #[test]
    fn test_missing_method_falls_back_to_field() {
        let (program, shape, _, _, _) = shapes();
        let recv = object(3, TypeDesc::Instance(shape));
        assert_eq!(
            resolve_method(&program, &recv, "callback", FieldId(4), 0),
            Some(Candidate::FieldFallback {
                object: ObjectId(3),
                attr: FieldId(4)
            })
        );
    }

    #[test]
    fn test_class_call_constructs() {
        let (program, shape, square, _, init) = shapes();
        assert_eq!(
            resolve_value(&program, &object(1, TypeDesc::Class(square)), 1),
            Some(Candidate::Construct {
                class: square,
                init: Some(init)
            })
        );
        assert_eq!(
            resolve_value(&program, &object(2, TypeDesc::Class(shape)), 0),
            Some(Candidate::Construct {
                class: shape,
                init: None
            })
        );
    }

    #[test]
    fn test_builtin_receivers() {
        let (program, ..) = shapes();
        let list = object(5, TypeDesc::Builtin(BuiltinType::List));
        assert!(matches!(
            resolve_method(&program, &list, "append", FieldId(0), 1),
            Some(Candidate::Intrinsic { .. })
        ));
        assert_eq!(resolve_method(&program, &list, "frobnicate", FieldId(0), 0), None);
        assert_eq!(
            resolve_value(&program, &object(6, TypeDesc::Builtin(BuiltinType::Int)), 0),
            None
        );
    }
}
