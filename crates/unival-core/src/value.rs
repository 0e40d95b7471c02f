//! The `Value` handle
//!
//! A `Value` is an `Arc` around a single payload cell. Copying a handle is
//! a reference-count bump; the payload is shared, and container payloads
//! mutate behind their own locks. Undefined and Null are process-wide
//! singletons so empty handles never allocate.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::buffer::Buffer;
use crate::cast::FromValue;
use crate::class::{class_of, registered_name, short_type_name, ClassDesc, Property};
use crate::containers::{Array, Dict, Object};
use crate::error::{VarError, VarResult};
use crate::function::Function;
use crate::payload::{Kind, NativeCell, Payload};

/// Builtin operations dispatched through class slots and magic methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinOp {
    Neg,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Xor,
    Or,
    And,
    Eq,
    Lt,
    GetItem,
    SetItem,
    DelItem,
    Str,
    Len,
}

impl BuiltinOp {
    /// Name of the class method implementing the operation.
    pub fn method_name(self) -> &'static str {
        match self {
            BuiltinOp::Neg => "__neg__",
            BuiltinOp::Add => "__add__",
            BuiltinOp::Sub => "__sub__",
            BuiltinOp::Mul => "__mul__",
            BuiltinOp::Div => "__div__",
            BuiltinOp::Mod => "__mod__",
            BuiltinOp::Xor => "__xor__",
            BuiltinOp::Or => "__or__",
            BuiltinOp::And => "__and__",
            BuiltinOp::Eq => "__eq__",
            BuiltinOp::Lt => "__lt__",
            BuiltinOp::GetItem => "__getitem__",
            BuiltinOp::SetItem => "__setitem__",
            BuiltinOp::DelItem => "__delitem__",
            BuiltinOp::Str => "__str__",
            BuiltinOp::Len => "__len__",
        }
    }
}

static UNDEFINED: Lazy<Value> = Lazy::new(|| Value(Arc::new(Payload::Undefined)));
static NULL: Lazy<Value> = Lazy::new(|| Value(Arc::new(Payload::Null)));

/// Shared handle to one payload cell.
#[derive(Clone)]
pub struct Value(Arc<Payload>);

impl Value {
    pub fn undefined() -> Value {
        UNDEFINED.clone()
    }

    pub fn null() -> Value {
        NULL.clone()
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value(Arc::new(Payload::Array(Array::from_vec(items))))
    }

    pub fn object_empty() -> Value {
        Value(Arc::new(Payload::Object(Object::new())))
    }

    pub fn dict_empty() -> Value {
        Value(Arc::new(Payload::Dict(Dict::new())))
    }

    pub fn function(func: Function) -> Value {
        Value(Arc::new(Payload::Function(func)))
    }

    pub(crate) fn from_class(desc: Arc<ClassDesc>) -> Value {
        Value(Arc::new(Payload::Class(desc)))
    }

    /// Wraps an owned Rust value. Builtin-representable types collapse to
    /// their builtin payload; everything else becomes a native cell that
    /// copies via `Clone`.
    pub fn new<T>(value: T) -> Value
    where
        T: Any + Send + Sync + Clone,
    {
        let any: Box<dyn Any> = Box::new(value);
        let any = match any.downcast::<Value>() {
            Ok(v) => return *v,
            Err(a) => a,
        };
        let any = match any.downcast::<i64>() {
            Ok(i) => return Value(Arc::new(Payload::Int(*i))),
            Err(a) => a,
        };
        let any = match any.downcast::<f64>() {
            Ok(d) => return Value(Arc::new(Payload::Float(*d))),
            Err(a) => a,
        };
        let any = match any.downcast::<bool>() {
            Ok(b) => return Value(Arc::new(Payload::Bool(*b))),
            Err(a) => a,
        };
        let any = match any.downcast::<String>() {
            Ok(s) => return Value(Arc::new(Payload::Str(*s))),
            Err(a) => a,
        };
        match any.downcast::<T>() {
            Ok(v) => Value(Arc::new(Payload::Other(NativeCell::owned(*v)))),
            Err(_) => Value::undefined(),
        }
    }

    /// Wraps a value that cannot be copied; cloning the handle still
    /// shares, but deep copies yield Undefined.
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Value {
        Value(Arc::new(Payload::Other(NativeCell::opaque(value))))
    }

    /// Wraps a shared pointer without copying the pointee.
    pub fn shared<T: Any + Send + Sync>(value: Arc<T>) -> Value {
        Value(Arc::new(Payload::Other(NativeCell::shared(value))))
    }

    /// Wraps caller-managed memory by pointer.
    ///
    /// # Safety
    /// The pointee must outlive every handle to the returned value and must
    /// not be mutated while it can be read through the runtime.
    pub unsafe fn from_raw<T: Any + Send + Sync>(ptr: *const T) -> Value {
        Value(Arc::new(Payload::Other(NativeCell::borrowed(ptr))))
    }

    pub fn kind(&self) -> Kind {
        self.0.kind()
    }

    pub fn is_undefined(&self) -> bool {
        matches!(*self.0, Payload::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(*self.0, Payload::Null)
    }

    pub fn is_function(&self) -> bool {
        matches!(*self.0, Payload::Function(_))
    }

    pub fn is_class(&self) -> bool {
        matches!(*self.0, Payload::Class(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self.0 {
            Payload::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match *self.0 {
            Payload::Int(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match *self.0 {
            Payload::Float(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &*self.0 {
            Payload::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match &*self.0 {
            Payload::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match &*self.0 {
            Payload::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match &*self.0 {
            Payload::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_buffer(&self) -> Option<&Buffer> {
        match &*self.0 {
            Payload::Buffer(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match &*self.0 {
            Payload::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassDesc> {
        match &*self.0 {
            Payload::Class(c) => Some(c),
            _ => None,
        }
    }

    pub(crate) fn as_class_arc(&self) -> Option<Arc<ClassDesc>> {
        match &*self.0 {
            Payload::Class(c) => Some(c.clone()),
            _ => None,
        }
    }

    /// Stable address of the payload cell, used for identity ordering.
    pub(crate) fn payload_addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const u8 as usize
    }

    /// True when the payload holds exactly a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.0.raw(TypeId::of::<T>()).is_some()
    }

    /// Borrows the payload as a `T`, failing when the stored type differs.
    pub fn get<T: Any>(&self) -> VarResult<&T> {
        self.0
            .raw(TypeId::of::<T>())
            .and_then(|any| any.downcast_ref::<T>())
            .ok_or_else(|| {
                let expected = registered_name(TypeId::of::<T>())
                    .unwrap_or_else(|| short_type_name(std::any::type_name::<T>()));
                VarError::type_mismatch(expected, self.class_name())
            })
    }

    /// Converts to `T`, running class conversion methods when the payload
    /// is not already a `T`.
    pub fn cast<T: FromValue>(&self) -> VarResult<T> {
        T::from_value(self)
    }

    /// The class handle describing this value.
    pub fn class_value(&self) -> Value {
        crate::builtin::ensure();
        match &*self.0 {
            Payload::Undefined => class_of::<()>(),
            Payload::Null => class_of::<crate::builtin::NullType>(),
            Payload::Bool(_) => class_of::<bool>(),
            Payload::Int(_) => class_of::<i64>(),
            Payload::Float(_) => class_of::<f64>(),
            Payload::Str(_) => class_of::<String>(),
            Payload::Array(_) => class_of::<Array>(),
            Payload::Object(o) => o
                .class_override()
                .unwrap_or_else(|| class_of::<Object>()),
            Payload::Dict(_) => class_of::<Dict>(),
            Payload::Buffer(_) => class_of::<Buffer>(),
            Payload::Function(_) => class_of::<Function>(),
            Payload::Class(_) => class_of::<ClassDesc>(),
            Payload::Other(cell) => cell.class(),
        }
    }

    /// Name of this value's class, for diagnostics.
    pub fn class_name(&self) -> String {
        match self.class_value().as_class() {
            Some(desc) => desc.name(),
            None => self.kind().name().to_string(),
        }
    }

    /// Dispatches the member `name` through the value's class, binding
    /// `self` as the receiver. On a class handle this is a static call.
    pub fn call_method(&self, name: &str, args: Vec<Value>) -> VarResult<Value> {
        if let Some(desc) = self.as_class() {
            return desc.call(&Value::undefined(), name, args);
        }
        let class = self.class_value();
        match class.as_class() {
            Some(desc) => desc.call(self, name, args),
            None => Err(VarError::Attribute {
                class: self.kind().name().to_string(),
                name: name.to_string(),
                detail: String::new(),
            }),
        }
    }

    /// Calls the value: a function runs its overload chain, a class runs
    /// its constructor.
    pub fn invoke(&self, args: Vec<Value>) -> VarResult<Value> {
        if let Some(f) = self.as_function() {
            return f.call(args);
        }
        if let Some(desc) = self.as_class() {
            let init = desc.init_slot();
            if let Some(f) = init.as_function() {
                return f.call(args);
            }
            return Err(VarError::Attribute {
                class: desc.name(),
                name: "__init__".to_string(),
                detail: String::new(),
            });
        }
        Err(VarError::type_mismatch("function", self.class_name()))
    }

    /// Runs a unary builtin operation.
    pub fn op_unary(&self, op: BuiltinOp) -> VarResult<Value> {
        let out = self.call_method(op.method_name(), vec![])?;
        if out.is_undefined() {
            return Err(VarError::custom(format!(
                "{} is not supported on {}",
                op.method_name(),
                self.class_name()
            )));
        }
        Ok(out)
    }

    /// Runs a binary builtin operation against `rhs`.
    pub fn op_binary(&self, op: BuiltinOp, rhs: &Value) -> VarResult<Value> {
        let out = self.call_method(op.method_name(), vec![rhs.clone()])?;
        if out.is_undefined() {
            return Err(VarError::custom(format!(
                "{} is not supported between {} and {}",
                op.method_name(),
                self.class_name(),
                rhs.class_name()
            )));
        }
        Ok(out)
    }

    pub fn neg(&self) -> VarResult<Value> {
        self.op_unary(BuiltinOp::Neg)
    }

    pub fn add(&self, rhs: &Value) -> VarResult<Value> {
        self.op_binary(BuiltinOp::Add, rhs)
    }

    pub fn sub(&self, rhs: &Value) -> VarResult<Value> {
        self.op_binary(BuiltinOp::Sub, rhs)
    }

    pub fn mul(&self, rhs: &Value) -> VarResult<Value> {
        self.op_binary(BuiltinOp::Mul, rhs)
    }

    pub fn div(&self, rhs: &Value) -> VarResult<Value> {
        self.op_binary(BuiltinOp::Div, rhs)
    }

    pub fn rem(&self, rhs: &Value) -> VarResult<Value> {
        self.op_binary(BuiltinOp::Mod, rhs)
    }

    pub fn bitxor(&self, rhs: &Value) -> VarResult<Value> {
        self.op_binary(BuiltinOp::Xor, rhs)
    }

    pub fn bitor(&self, rhs: &Value) -> VarResult<Value> {
        self.op_binary(BuiltinOp::Or, rhs)
    }

    pub fn bitand(&self, rhs: &Value) -> VarResult<Value> {
        self.op_binary(BuiltinOp::And, rhs)
    }

    /// Equality through the class `__eq__` slot.
    ///
    /// Identity short-circuits, classes compare by descriptor identity,
    /// and a missing or failing `__eq__` yields false.
    pub fn value_eq(&self, other: &Value) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        if let (Some(a), Some(b)) = (self.as_class_arc(), other.as_class_arc()) {
            return Arc::ptr_eq(&a, &b);
        }
        let class = self.class_value();
        if let Some(desc) = class.as_class() {
            let eq = desc.eq_slot();
            if let Some(f) = eq.as_function() {
                if let Ok(out) = f.call(vec![self.clone(), other.clone()]) {
                    if let Some(b) = out.as_bool() {
                        return b;
                    }
                }
            }
        }
        false
    }

    /// Ordering through the class `__lt__` slot.
    pub fn value_lt(&self, other: &Value) -> VarResult<bool> {
        let class = self.class_value();
        if let Some(desc) = class.as_class() {
            let lt = desc.lt_slot();
            if let Some(f) = lt.as_function() {
                let out = f.call(vec![self.clone(), other.clone()])?;
                if let Some(b) = out.as_bool() {
                    return Ok(b);
                }
            }
        }
        Err(VarError::custom(format!(
            "__lt__ is not supported between {} and {}",
            self.class_name(),
            other.class_name()
        )))
    }

    /// Structural equality: containers compare recursively, leaves by
    /// content, everything else by identity.
    pub fn deep_eq(&self, other: &Value) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        match (&*self.0, &*other.0) {
            (Payload::Undefined, Payload::Undefined) => true,
            (Payload::Null, Payload::Null) => true,
            (Payload::Bool(a), Payload::Bool(b)) => a == b,
            (Payload::Int(a), Payload::Int(b)) => a == b,
            (Payload::Float(a), Payload::Float(b)) => a.total_cmp(b).is_eq(),
            (Payload::Str(a), Payload::Str(b)) => a == b,
            (Payload::Array(a), Payload::Array(b)) => {
                let a = a.snapshot();
                let b = b.snapshot();
                a.len() == b.len() && a.iter().zip(&b).all(|(x, y)| x.deep_eq(y))
            }
            (Payload::Object(a), Payload::Object(b)) => {
                let a = a.snapshot();
                if a.len() != b.len() {
                    return false;
                }
                a.iter().all(|(k, v)| {
                    b.contains(k) && v.deep_eq(&b.get(k))
                })
            }
            (Payload::Dict(a), Payload::Dict(b)) => {
                let a = a.snapshot();
                let b = b.snapshot();
                a.len() == b.len()
                    && a.iter()
                        .zip(&b)
                        .all(|((ka, va), (kb, vb))| ka.deep_eq(kb) && va.deep_eq(vb))
            }
            (Payload::Buffer(a), Payload::Buffer(b)) => a.bytes() == b.bytes(),
            _ => false,
        }
    }

    /// Copies the value. `depth` bounds recursion into containers: 0 copies
    /// the container cell but shares children. Functions and classes always
    /// share; native cells copy when their type allows it, else the copy is
    /// Undefined.
    pub fn clone_value(&self, depth: usize) -> Value {
        match &*self.0 {
            Payload::Undefined | Payload::Null => self.clone(),
            Payload::Bool(b) => Value(Arc::new(Payload::Bool(*b))),
            Payload::Int(i) => Value(Arc::new(Payload::Int(*i))),
            Payload::Float(d) => Value(Arc::new(Payload::Float(*d))),
            Payload::Str(s) => Value(Arc::new(Payload::Str(s.clone()))),
            Payload::Array(a) => {
                let mut items = a.snapshot();
                if depth > 0 {
                    items = items.iter().map(|v| v.clone_value(depth - 1)).collect();
                }
                Value(Arc::new(Payload::Array(Array::from_vec(items))))
            }
            Payload::Object(o) => {
                let copy = o.clone();
                if depth > 0 {
                    for (k, v) in copy.snapshot() {
                        copy.set(k, v.clone_value(depth - 1));
                    }
                }
                Value(Arc::new(Payload::Object(copy)))
            }
            Payload::Dict(d) => {
                let copy = Dict::new();
                for (k, v) in d.snapshot() {
                    if depth > 0 {
                        copy.set(k.clone_value(depth - 1), v.clone_value(depth - 1));
                    } else {
                        copy.set(k, v);
                    }
                }
                Value(Arc::new(Payload::Dict(copy)))
            }
            Payload::Buffer(b) => Value(Arc::new(Payload::Buffer(b.copy_bytes()))),
            Payload::Function(_) | Payload::Class(_) => self.clone(),
            Payload::Other(cell) => cell.copy_value().unwrap_or_else(Value::undefined),
        }
    }

    /// Element count for containers, byte length for strings and buffers;
    /// otherwise the class `__len__` method, defaulting to 0.
    pub fn len(&self) -> usize {
        match &*self.0 {
            Payload::Str(s) => s.len(),
            Payload::Array(a) => a.len(),
            Payload::Object(o) => o.len(),
            Payload::Dict(d) => d.len(),
            Payload::Buffer(b) => b.len(),
            _ => self
                .call_method(BuiltinOp::Len.method_name(), vec![])
                .ok()
                .and_then(|v| v.as_int())
                .map(|n| n.max(0) as usize)
                .unwrap_or(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index read. Containers answer directly (a miss or out-of-range index
    /// is Undefined); class handles look up attributes; anything else goes
    /// through `__getitem__`, then a property getter.
    pub fn index(&self, key: &Value) -> VarResult<Value> {
        match &*self.0 {
            Payload::Array(a) => match key.as_int() {
                Some(i) if i >= 0 => Ok(a.get(i as usize)),
                Some(_) => Ok(Value::undefined()),
                None => Err(VarError::type_mismatch("int", key.class_name())),
            },
            Payload::Object(o) => match key.as_str() {
                Some(k) => Ok(o.get(k)),
                None => Err(VarError::type_mismatch("str", key.class_name())),
            },
            Payload::Dict(d) => Ok(d.get(key)),
            Payload::Class(c) => match key.as_str() {
                Some(k) => Ok(c.attr(k)),
                None => Err(VarError::type_mismatch("str", key.class_name())),
            },
            _ => self.dispatch_index(key),
        }
    }

    fn dispatch_index(&self, key: &Value) -> VarResult<Value> {
        let class = self.class_value();
        if let Some(desc) = class.as_class() {
            let slot = desc.getitem_slot();
            if let Some(f) = slot.as_function() {
                return f.call(vec![self.clone(), key.clone()]);
            }
            if let Some(name) = key.as_str() {
                let attr = desc.attr(name);
                if let Ok(prop) = attr.get::<Property>() {
                    if let Some(fget) = prop.fget.as_function() {
                        return fget.call(vec![self.clone()]);
                    }
                }
                return Err(VarError::Attribute {
                    class: desc.name(),
                    name: name.to_string(),
                    detail: String::new(),
                });
            }
        }
        Err(VarError::ContainerType {
            op: "index".to_string(),
            found: self.class_name(),
        })
    }

    /// Index write, the mutating counterpart of [`Value::index`].
    pub fn set_index(&self, key: Value, value: Value) -> VarResult<()> {
        match &*self.0 {
            Payload::Array(a) => match key.as_int() {
                Some(i) if i >= 0 => a.set(i as usize, value),
                _ => Err(VarError::type_mismatch("int", key.class_name())),
            },
            Payload::Object(o) => match key.as_str() {
                Some(k) => {
                    o.set(k, value);
                    Ok(())
                }
                None => Err(VarError::type_mismatch("str", key.class_name())),
            },
            Payload::Dict(d) => {
                d.set(key, value);
                Ok(())
            }
            _ => {
                let class = self.class_value();
                if let Some(desc) = class.as_class() {
                    let slot = desc.setitem_slot();
                    if let Some(f) = slot.as_function() {
                        f.call(vec![self.clone(), key, value])?;
                        return Ok(());
                    }
                    if let Some(name) = key.as_str() {
                        let attr = desc.attr(name);
                        if let Ok(prop) = attr.get::<Property>() {
                            return match prop.fset.as_function() {
                                Some(fset) => {
                                    fset.call(vec![self.clone(), value])?;
                                    Ok(())
                                }
                                None => Err(VarError::Attribute {
                                    class: desc.name(),
                                    name: name.to_string(),
                                    detail: " (read-only)".to_string(),
                                }),
                            };
                        }
                    }
                }
                Err(VarError::ContainerType {
                    op: "set_index".to_string(),
                    found: self.class_name(),
                })
            }
        }
    }

    /// Looks up `path` on an Object value, inserting `default` on a miss.
    /// See [`Object::get_or`].
    pub fn get_or(&self, path: &str, default: Value, parse_dot: bool) -> VarResult<Value> {
        match self.as_object() {
            Some(o) => o.get_or(path, default, parse_dot),
            None => Err(VarError::ContainerType {
                op: format!("get {path:?}"),
                found: self.class_name(),
            }),
        }
    }

    /// Stores `value` at `path` on an Object value. See [`Object::set_path`].
    pub fn set(&self, path: &str, value: Value, parse_dot: bool) -> VarResult<()> {
        match self.as_object() {
            Some(o) => o.set_path(path, value, parse_dot),
            None => Err(VarError::ContainerType {
                op: format!("set {path:?}"),
                found: self.class_name(),
            }),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.value_eq(other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value(Arc::new(Payload::Bool(b)))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Value {
        Value(Arc::new(Payload::Int(i)))
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Value {
        Value(Arc::new(Payload::Int(i as i64)))
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Value {
        Value(Arc::new(Payload::Float(d)))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value(Arc::new(Payload::Str(s.to_string())))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value(Arc::new(Payload::Str(s)))
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Value {
        Value(Arc::new(Payload::Array(a)))
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Value {
        Value(Arc::new(Payload::Object(o)))
    }
}

impl From<Dict> for Value {
    fn from(d: Dict) -> Value {
        Value(Arc::new(Payload::Dict(d)))
    }
}

impl From<Buffer> for Value {
    fn from(b: Buffer) -> Value {
        Value(Arc::new(Payload::Buffer(b)))
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Value {
        Value::function(f)
    }
}

/// Appends `s` to `out` as a quoted JSON string, escaping control
/// characters and the line separators U+2028/U+2029.
pub fn escape_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Shortest round-trip rendering of a float, kept distinguishable from an
/// integer literal.
pub fn format_float(d: f64) -> String {
    let mut s = format!("{d}");
    if !s.contains(['.', 'e', 'E']) && !s.contains(char::is_alphabetic) {
        s.push_str(".0");
    }
    s
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            Payload::Undefined => f.write_str("undefined"),
            Payload::Null => f.write_str("null"),
            Payload::Bool(b) => write!(f, "{b}"),
            Payload::Int(i) => write!(f, "{i}"),
            Payload::Float(d) => f.write_str(&format_float(*d)),
            Payload::Str(s) => {
                let mut out = String::with_capacity(s.len() + 2);
                escape_string(&mut out, s);
                f.write_str(&out)
            }
            Payload::Array(a) => {
                f.write_str("[")?;
                for (i, item) in a.snapshot().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Payload::Object(o) => {
                let mut entries = o.snapshot();
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    let mut key = String::with_capacity(k.len() + 2);
                    escape_string(&mut key, k);
                    write!(f, "{key}: {v}")?;
                }
                f.write_str("}")
            }
            Payload::Class(c) => write!(f, "<class {}>", c.name()),
            _ => {
                // Dict, Buffer, Function, Other: a custom __str__ wins,
                // otherwise a placeholder with the payload address.
                let class = self.class_value();
                if let Some(desc) = class.as_class() {
                    let slot = desc.str_slot();
                    if let Some(func) = slot.as_function() {
                        if let Ok(out) = func.call(vec![self.clone()]) {
                            if let Some(s) = out.as_str() {
                                return f.write_str(s);
                            }
                        }
                    }
                }
                write!(f, "<{} at {:#x}>", self.class_name(), self.payload_addr())
            }
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({}: {})", self.kind().name(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singletons_do_not_allocate_twice() {
        let a = Value::undefined();
        let b = Value::undefined();
        assert!(Arc::ptr_eq(&a.0, &b.0));
        assert!(a.is_undefined());
        assert!(Value::null().is_null());
    }

    #[test]
    fn new_collapses_builtin_types() {
        assert_eq!(Value::new(5i64).kind(), Kind::Integer);
        assert_eq!(Value::new(0.5f64).kind(), Kind::Float);
        assert_eq!(Value::new(true).kind(), Kind::Boolean);
        assert_eq!(Value::new("x".to_string()).kind(), Kind::String);
        let inner = Value::from(3i64);
        assert_eq!(Value::new(inner).as_int(), Some(3));
    }

    #[test]
    fn native_cell_round_trip() {
        #[derive(Clone, PartialEq, Debug)]
        struct Point {
            x: i32,
            y: i32,
        }
        let v = Value::new(Point { x: 1, y: 2 });
        assert_eq!(v.kind(), Kind::Other);
        assert!(v.is::<Point>());
        assert_eq!(v.get::<Point>().unwrap(), &Point { x: 1, y: 2 });
        assert!(v.get::<i64>().is_err());
    }

    #[test]
    fn shared_aliases() {
        let shared = Arc::new(41i32);
        let v = Value::shared(shared.clone());
        assert_eq!(*v.get::<i32>().unwrap(), 41);
        assert_eq!(*v.get::<Arc<i32>>().unwrap(), shared);
    }

    #[test]
    fn from_raw_reads_pointee() {
        let boxed = Box::new(7u8);
        let v = unsafe { Value::from_raw(&*boxed as *const u8) };
        assert_eq!(*v.get::<u8>().unwrap(), 7);
        // Copies of a borrowed cell are Undefined.
        assert!(v.clone_value(0).is_undefined());
        drop(v);
        drop(boxed);
    }

    #[test]
    fn clone_depth_controls_sharing() {
        let inner = Value::array(vec![Value::from(1i64)]);
        let outer = Value::array(vec![inner.clone()]);

        let shallow = outer.clone_value(0);
        if let Some(a) = inner.as_array() {
            a.push(Value::from(2i64));
        }
        // Depth 0 shares children: the pushed element is visible.
        assert_eq!(shallow.index(&Value::from(0i64)).unwrap().len(), 2);

        let deep = outer.clone_value(32);
        if let Some(a) = inner.as_array() {
            a.push(Value::from(3i64));
        }
        assert_eq!(deep.index(&Value::from(0i64)).unwrap().len(), 2);
        assert_eq!(outer.index(&Value::from(0i64)).unwrap().len(), 3);
    }

    #[test]
    fn index_misses_are_undefined() {
        let arr = Value::array(vec![Value::from(1i64)]);
        assert!(arr.index(&Value::from(9i64)).unwrap().is_undefined());
        assert!(arr.index(&Value::from(-1i64)).unwrap().is_undefined());

        let obj = Value::object_empty();
        assert!(obj.index(&Value::from("missing")).unwrap().is_undefined());

        assert!(Value::from(1i64).index(&Value::from(0i64)).is_err());
    }

    #[test]
    fn display_renderings() {
        assert_eq!(Value::undefined().to_string(), "undefined");
        assert_eq!(Value::null().to_string(), "null");
        assert_eq!(Value::from(2.0f64).to_string(), "2.0");
        assert_eq!(Value::from(-0.5f64).to_string(), "-0.5");
        assert_eq!(Value::from("a\nb").to_string(), "\"a\\nb\"");
        assert_eq!(
            Value::array(vec![Value::from(1i64), Value::from("x")]).to_string(),
            "[1, \"x\"]"
        );
        let obj = Value::object_empty();
        obj.set("b", Value::from(2i64), false).unwrap();
        obj.set("a", Value::from(1i64), false).unwrap();
        assert_eq!(obj.to_string(), "{\"a\": 1, \"b\": 2}");
    }

    #[test]
    fn escape_line_separators() {
        let mut out = String::new();
        escape_string(&mut out, "a\u{2028}b\u{2029}c\u{1}");
        assert_eq!(out, "\"a\\u2028b\\u2029c\\u0001\"");
    }

    #[test]
    fn deep_eq_is_structural() {
        let a = Value::array(vec![Value::from(1i64), Value::from("x")]);
        let b = Value::array(vec![Value::from(1i64), Value::from("x")]);
        assert!(a.deep_eq(&b));
        assert!(!a.deep_eq(&Value::array(vec![Value::from(1i64)])));
        // Int and Float are distinct kinds even for equal magnitudes.
        assert!(!Value::from(1i64).deep_eq(&Value::from(1.0f64)));
    }
}
