//! Default Boost.Python call policies for exported callables.

use tracing::warn;

use super::decl::{CallableFlavor, DeclGraph, DeclId, TypeRef};
use super::names::canonicalize_type;

const FUNDAMENTAL_TYPES: &[&str] = &[
    "bool",
    "char",
    "signed char",
    "unsigned char",
    "wchar_t",
    "short",
    "short int",
    "unsigned short",
    "short unsigned int",
    "int",
    "unsigned",
    "unsigned int",
    "long",
    "long int",
    "unsigned long",
    "long unsigned int",
    "long long",
    "long long int",
    "unsigned long long",
    "long long unsigned int",
    "float",
    "double",
    "long double",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnValue {
    ReferenceExistingObject,
    CopyConstReference,
    CopyNonConstReference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPolicy {
    Default,
    /// Keep the object at the given argument position alive while the
    /// result lives; position 1 is `self`
    ReturnInternalReference(u32),
    ReturnValuePolicy(ReturnValue),
}

impl CallPolicy {
    /// Expression passed to `def`, or `None` for the default policy
    pub fn render(&self) -> Option<String> {
        match self {
            CallPolicy::Default => None,
            CallPolicy::ReturnInternalReference(position) => {
                Some(format!("bp::return_internal_reference< {} >()", position))
            }
            CallPolicy::ReturnValuePolicy(ReturnValue::ReferenceExistingObject) => {
                Some("bp::return_value_policy< bp::reference_existing_object >()".to_string())
            }
            CallPolicy::ReturnValuePolicy(ReturnValue::CopyConstReference) => {
                Some("bp::return_value_policy< bp::copy_const_reference >()".to_string())
            }
            CallPolicy::ReturnValuePolicy(ReturnValue::CopyNonConstReference) => {
                Some("bp::return_value_policy< bp::copy_non_const_reference >()".to_string())
            }
        }
    }
}

pub fn is_fundamental(ty: &TypeRef) -> bool {
    let base = canonicalize_type(&ty.base_name());
    FUNDAMENTAL_TYPES.contains(&base.as_str())
}

fn is_c_string(ty: &TypeRef) -> bool {
    matches!(canonicalize_type(ty.as_str()).as_str(), "char const*" | "const char*")
}

/// Policy applied to a callable unless the user supplied code overrides it
pub fn resolve(graph: &DeclGraph, id: DeclId) -> CallPolicy {
    let Some(callable) = graph.get(id).as_callable() else {
        return CallPolicy::Default;
    };
    if callable.flavor == CallableFlavor::Constructor {
        return CallPolicy::Default;
    }
    let Some(ret) = callable.return_type.as_ref().filter(|ret| !ret.is_void()) else {
        return CallPolicy::Default;
    };
    if is_c_string(ret) {
        return CallPolicy::Default;
    }
    if is_fundamental(ret) {
        // internal references only work for class results
        if ret.is_reference() {
            let copy = if ret.is_const() { ReturnValue::CopyConstReference } else { ReturnValue::CopyNonConstReference };
            return CallPolicy::ReturnValuePolicy(copy);
        }
        if ret.is_pointer() {
            warn!(
                "{} returns a pointer to a fundamental type; no call policy applies",
                graph.display_name(id)
            );
        }
        return CallPolicy::Default;
    }
    if ret.is_reference() || ret.is_pointer() {
        let member = graph.parent(id).map_or(false, |parent| graph.get(parent).is_class());
        return if member && !callable.is_static {
            CallPolicy::ReturnInternalReference(1)
        } else {
            CallPolicy::ReturnValuePolicy(ReturnValue::ReferenceExistingObject)
        };
    }
    CallPolicy::Default
}
