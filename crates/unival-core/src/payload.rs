//! Reference-counted storage cell behind every [`Value`]
//!
//! A payload is allocated once and shared by every handle that points at it.
//! Built-in kinds live directly in the enum; foreign Rust types are boxed
//! behind [`NativeCell`] together with their class descriptor.

use std::any::{Any, TypeId};
use std::sync::Arc;

use crate::buffer::Buffer;
use crate::class::ClassDesc;
use crate::containers::{Array, Dict, Object};
use crate::function::Function;
use crate::value::Value;

/// Coarse classification of a payload, used for dispatch and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Kind {
    Undefined,
    Null,
    Boolean,
    Integer,
    Float,
    String,
    Array,
    Object,
    Dict,
    Buffer,
    Function,
    Class,
    Other,
}

impl Kind {
    /// Lowercase name used in error messages and dumps.
    pub fn name(self) -> &'static str {
        match self {
            Kind::Undefined => "undefined",
            Kind::Null => "null",
            Kind::Boolean => "bool",
            Kind::Integer => "int",
            Kind::Float => "double",
            Kind::String => "str",
            Kind::Array => "array",
            Kind::Object => "object",
            Kind::Dict => "dict",
            Kind::Buffer => "buffer",
            Kind::Function => "function",
            Kind::Class => "class",
            Kind::Other => "other",
        }
    }
}

/// The single storage cell a [`Value`] handle points at.
pub enum Payload {
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Array),
    Object(Object),
    Dict(Dict),
    Buffer(Buffer),
    Function(Function),
    Class(Arc<ClassDesc>),
    Other(NativeCell),
}

impl Payload {
    pub fn kind(&self) -> Kind {
        match self {
            Payload::Undefined => Kind::Undefined,
            Payload::Null => Kind::Null,
            Payload::Bool(_) => Kind::Boolean,
            Payload::Int(_) => Kind::Integer,
            Payload::Float(_) => Kind::Float,
            Payload::Str(_) => Kind::String,
            Payload::Array(_) => Kind::Array,
            Payload::Object(_) => Kind::Object,
            Payload::Dict(_) => Kind::Dict,
            Payload::Buffer(_) => Kind::Buffer,
            Payload::Function(_) => Kind::Function,
            Payload::Class(_) => Kind::Class,
            Payload::Other(_) => Kind::Other,
        }
    }

    /// Uniform typed view over the cell.
    ///
    /// Returns the stored datum as `&dyn Any` when it carries exactly the
    /// requested `TypeId`, for built-ins and native cells alike.
    pub fn raw(&self, id: TypeId) -> Option<&dyn Any> {
        match self {
            Payload::Bool(b) if id == TypeId::of::<bool>() => Some(b),
            Payload::Int(i) if id == TypeId::of::<i64>() => Some(i),
            Payload::Float(d) if id == TypeId::of::<f64>() => Some(d),
            Payload::Str(s) if id == TypeId::of::<String>() => Some(s),
            Payload::Array(a) if id == TypeId::of::<Array>() => Some(a),
            Payload::Object(o) if id == TypeId::of::<Object>() => Some(o),
            Payload::Dict(d) if id == TypeId::of::<Dict>() => Some(d),
            Payload::Buffer(b) if id == TypeId::of::<Buffer>() => Some(b),
            Payload::Function(f) if id == TypeId::of::<Function>() => Some(f),
            Payload::Class(c) if id == TypeId::of::<ClassDesc>() => Some(&**c),
            Payload::Other(cell) => cell.raw(id),
            _ => None,
        }
    }
}

/// Type-erased storage for a foreign Rust value.
///
/// A cell remembers the [`TypeId`] it answers to, the class descriptor that
/// describes it, and how (or whether) it can be copied.
pub struct NativeCell {
    type_id: TypeId,
    class: Value,
    boxed: Box<dyn NativeBox>,
}

impl NativeCell {
    pub(crate) fn owned<T>(value: T) -> Self
    where
        T: Any + Send + Sync + Clone,
    {
        NativeCell {
            type_id: TypeId::of::<T>(),
            class: crate::class::class_of::<T>(),
            boxed: Box::new(Owned {
                value,
                copy: Some(|v: &T| Value::new(v.clone())),
            }),
        }
    }

    /// Stores a value that cannot be copied; cloning it yields Undefined.
    pub(crate) fn opaque<T>(value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        NativeCell {
            type_id: TypeId::of::<T>(),
            class: crate::class::class_of::<T>(),
            boxed: Box::new(Owned { value, copy: None }),
        }
    }

    pub(crate) fn shared<T>(value: Arc<T>) -> Self
    where
        T: Any + Send + Sync,
    {
        NativeCell {
            type_id: TypeId::of::<T>(),
            class: crate::class::class_of::<T>(),
            boxed: Box::new(Shared { value }),
        }
    }

    /// Stores a borrowed pointer without taking ownership.
    ///
    /// # Safety
    /// The pointee must stay alive and unmoved for as long as any handle to
    /// this cell exists, and must not be mutated while handles can read it.
    pub(crate) unsafe fn borrowed<T>(ptr: *const T) -> Self
    where
        T: Any + Send + Sync,
    {
        NativeCell {
            type_id: TypeId::of::<T>(),
            class: crate::class::class_of::<T>(),
            boxed: Box::new(Borrowed { ptr }),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The class descriptor handle registered for the stored type.
    pub fn class(&self) -> Value {
        self.class.clone()
    }

    pub fn raw(&self, id: TypeId) -> Option<&dyn Any> {
        self.boxed.raw(id)
    }

    /// Copies the stored value into a fresh cell, if the type allows it.
    pub fn copy_value(&self) -> Option<Value> {
        self.boxed.copy_value()
    }
}

trait NativeBox: Send + Sync {
    fn raw(&self, id: TypeId) -> Option<&dyn Any>;
    fn copy_value(&self) -> Option<Value>;
}

struct Owned<T: Any + Send + Sync> {
    value: T,
    copy: Option<fn(&T) -> Value>,
}

impl<T: Any + Send + Sync> NativeBox for Owned<T> {
    fn raw(&self, id: TypeId) -> Option<&dyn Any> {
        (id == TypeId::of::<T>()).then_some(&self.value as &dyn Any)
    }

    fn copy_value(&self) -> Option<Value> {
        self.copy.map(|f| f(&self.value))
    }
}

struct Shared<T: Any + Send + Sync> {
    value: Arc<T>,
}

impl<T: Any + Send + Sync> NativeBox for Shared<T> {
    fn raw(&self, id: TypeId) -> Option<&dyn Any> {
        if id == TypeId::of::<T>() {
            Some(&*self.value as &dyn Any)
        } else if id == TypeId::of::<Arc<T>>() {
            Some(&self.value as &dyn Any)
        } else {
            None
        }
    }

    fn copy_value(&self) -> Option<Value> {
        // Sharing: the copy aliases the same Arc.
        Some(Value::shared(self.value.clone()))
    }
}

struct Borrowed<T: Any + Send + Sync> {
    ptr: *const T,
}

// The constructor contract requires the pointee to outlive the cell.
unsafe impl<T: Any + Send + Sync> Send for Borrowed<T> {}
unsafe impl<T: Any + Send + Sync> Sync for Borrowed<T> {}

impl<T: Any + Send + Sync> NativeBox for Borrowed<T> {
    fn raw(&self, id: TypeId) -> Option<&dyn Any> {
        (id == TypeId::of::<T>()).then_some(unsafe { &*self.ptr } as &dyn Any)
    }

    fn copy_value(&self) -> Option<Value> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names() {
        assert_eq!(Kind::Integer.name(), "int");
        assert_eq!(Kind::Float.name(), "double");
        assert_eq!(Kind::Undefined.name(), "undefined");
    }

    #[test]
    fn raw_answers_exact_type_only() {
        let p = Payload::Int(42);
        assert!(p.raw(TypeId::of::<i64>()).is_some());
        assert!(p.raw(TypeId::of::<i32>()).is_none());
        assert!(p.raw(TypeId::of::<f64>()).is_none());
    }

    #[test]
    fn shared_cell_answers_both_views() {
        let cell = NativeCell::shared(Arc::new(7u16));
        assert!(cell.raw(TypeId::of::<u16>()).is_some());
        assert!(cell.raw(TypeId::of::<Arc<u16>>()).is_some());
        assert!(cell.raw(TypeId::of::<u32>()).is_none());
    }
}
