//! Class descriptors, the global type registry, and the class builder
//!
//! Every Rust type surfaced to the runtime gets exactly one descriptor,
//! registered under its `TypeId` in a global concurrent map. Descriptors
//! carry named attributes (functions, constants, properties), parent links
//! with upcast converters, and fast slots for the hot builtin operations.

use std::any::{Any, TypeId};
use std::marker::PhantomData;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::{VarError, VarResult};
use crate::function::{Function, IntoFunction, Thunk};
use crate::payload::Kind;
use crate::value::Value;

static REGISTRY: Lazy<DashMap<TypeId, Value>> = Lazy::new(DashMap::new);

/// The unique class descriptor handle for `T`, creating a bare one on first
/// use. Builtin classes are installed before the lookup runs.
pub fn class_of<T: Any>() -> Value {
    crate::builtin::ensure();
    get_or_create::<T>(None, Kind::Other)
}

/// Name registered for a type, if any. Never creates a descriptor.
pub(crate) fn registered_name(id: TypeId) -> Option<String> {
    REGISTRY
        .get(&id)
        .and_then(|v| v.as_class().map(|c| c.name()))
}

/// Registry lookup that installs a descriptor on miss. Does not trigger
/// builtin installation, so it is safe to call while builtins register.
pub(crate) fn get_or_create<T: Any>(name: Option<&str>, kind: Kind) -> Value {
    let id = TypeId::of::<T>();
    REGISTRY
        .entry(id)
        .or_insert_with(|| {
            let name = match name {
                Some(n) => n.to_string(),
                None => short_type_name(std::any::type_name::<T>()),
            };
            ClassDesc::create(id, name, kind, true)
        })
        .clone()
}

/// Strips module paths from a `type_name` rendering, keeping generics.
pub(crate) fn short_type_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut token = String::new();
    for ch in full.chars() {
        if ch.is_alphanumeric() || ch == '_' || ch == ':' {
            token.push(ch);
        } else {
            out.push_str(token.rsplit("::").next().unwrap_or(&token));
            token.clear();
            out.push(ch);
        }
    }
    out.push_str(token.rsplit("::").next().unwrap_or(&token));
    out
}

type UpcastFn = Box<dyn Fn(&Value) -> VarResult<Value> + Send + Sync>;

/// Link to a base class together with the instance converter used when a
/// call is delegated upward.
pub struct Parent {
    pub class: Value,
    convert: UpcastFn,
}

impl Parent {
    pub fn upcast(&self, inst: &Value) -> VarResult<Value> {
        (self.convert)(inst)
    }
}

/// Attribute entry exposing a getter/setter pair.
#[derive(Clone)]
pub struct Property {
    pub name: String,
    pub fget: Value,
    pub fset: Value,
    pub doc: String,
}

#[derive(Default)]
struct Slots {
    init: Option<Value>,
    stringify: Option<Value>,
    get_item: Option<Value>,
    set_item: Option<Value>,
    eq: Option<Value>,
    lt: Option<Value>,
}

/// Reflection record for one runtime type.
pub struct ClassDesc {
    type_id: TypeId,
    kind: Kind,
    /// Whether instances are backed by a Rust type. Dynamic classes
    /// synthesize Object instances instead.
    native: bool,
    name: RwLock<String>,
    doc: RwLock<String>,
    attr: RwLock<FxHashMap<String, Value>>,
    parents: RwLock<Vec<Parent>>,
    slots: RwLock<Slots>,
}

impl ClassDesc {
    fn create(type_id: TypeId, name: String, kind: Kind, native: bool) -> Value {
        Value::from_class(Arc::new(ClassDesc {
            type_id,
            kind,
            native,
            name: RwLock::new(name),
            doc: RwLock::new(String::new()),
            attr: RwLock::new(FxHashMap::default()),
            parents: RwLock::new(Vec::new()),
            slots: RwLock::new(Slots::default()),
        }))
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// How instances of this class serialize.
    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn is_native(&self) -> bool {
        self.native
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.write() = name.into();
    }

    pub fn doc(&self) -> String {
        self.doc.read().clone()
    }

    pub fn set_doc(&self, doc: impl Into<String>) {
        *self.doc.write() = doc.into();
    }

    /// Attribute from the own table only.
    pub fn attr_local(&self, name: &str) -> Value {
        self.attr
            .read()
            .get(name)
            .cloned()
            .unwrap_or_else(Value::undefined)
    }

    /// Attribute lookup, querying parents in declaration order on a miss.
    /// Shared bases reached through several parents are visited again.
    pub fn attr(&self, name: &str) -> Value {
        if let Some(v) = self.attr.read().get(name) {
            return v.clone();
        }
        for parent in self.parents.read().iter() {
            if let Some(desc) = parent.class.as_class() {
                let v = desc.attr(name);
                if !v.is_undefined() {
                    return v;
                }
            }
        }
        Value::undefined()
    }

    pub fn set_attr(&self, name: impl Into<String>, value: Value) {
        self.attr.write().insert(name.into(), value);
    }

    pub fn attr_names(&self) -> Vec<String> {
        self.attr.read().keys().cloned().collect()
    }

    pub fn parents_len(&self) -> usize {
        self.parents.read().len()
    }

    pub fn init_slot(&self) -> Value {
        self.slots.read().init.clone().unwrap_or_else(Value::undefined)
    }

    pub fn str_slot(&self) -> Value {
        self.slots
            .read()
            .stringify
            .clone()
            .unwrap_or_else(Value::undefined)
    }

    pub fn getitem_slot(&self) -> Value {
        self.slots
            .read()
            .get_item
            .clone()
            .unwrap_or_else(Value::undefined)
    }

    pub fn setitem_slot(&self) -> Value {
        self.slots
            .read()
            .set_item
            .clone()
            .unwrap_or_else(Value::undefined)
    }

    pub fn eq_slot(&self) -> Value {
        self.slots.read().eq.clone().unwrap_or_else(Value::undefined)
    }

    pub fn lt_slot(&self) -> Value {
        self.slots.read().lt.clone().unwrap_or_else(Value::undefined)
    }

    /// Registers `func` under `name`.
    ///
    /// A second registration under the same name appends to the overload
    /// chain; an overload with an identical signature is dropped in favor
    /// of the first. `owner` is the class handle, needed when the first
    /// `__init__` of a dynamic class synthesizes its constructor.
    pub fn define(&self, owner: &Value, name: &str, mut func: Function, is_method: bool) {
        func.is_method = is_method;
        func.name = format!("{}.{}", self.name(), name);
        if name == "__init__" {
            func.is_constructor = true;
        }
        let func_val = Value::function(func);

        let head = {
            let mut attr = self.attr.write();
            match attr.get(name) {
                Some(existing) if existing.is_function() => {
                    push_overload(existing, func_val);
                    existing.clone()
                }
                _ => {
                    attr.insert(name.to_string(), func_val.clone());
                    func_val
                }
            }
        };

        self.capture_slot(owner, name, &head);
    }

    fn capture_slot(&self, owner: &Value, name: &str, head: &Value) {
        let mut slots = self.slots.write();
        let slot = match name {
            "__init__" => &mut slots.init,
            "__str__" => &mut slots.stringify,
            "__getitem__" => &mut slots.get_item,
            "__setitem__" => &mut slots.set_item,
            "__eq__" => &mut slots.eq,
            "__lt__" => &mut slots.lt,
            _ => return,
        };
        if slot.is_some() {
            return;
        }
        if name == "__init__" && !self.native {
            // Dynamic classes construct an Object instance, hand it to the
            // registered initializers as `self`, and return it.
            *slot = Some(synthesize_constructor(owner, head));
        } else {
            *slot = Some(head.clone());
        }
    }

    /// Adds a base class with its instance converter.
    pub fn add_parent(&self, class: Value, convert: UpcastFn) {
        self.parents.write().push(Parent { class, convert });
    }

    /// Invokes the member `name` with `inst` bound as the receiver.
    ///
    /// Methods found in the own table get `inst` prepended. On a miss,
    /// each parent is tried in declaration order with the upcast instance;
    /// the first success wins and every failure is recorded in the error.
    pub fn call(&self, inst: &Value, name: &str, mut args: Vec<Value>) -> VarResult<Value> {
        let local = self.attr.read().get(name).cloned();
        if let Some(fv) = local {
            if let Some(f) = fv.as_function() {
                if f.is_method() {
                    args.insert(0, inst.clone());
                }
                return f.call(args);
            }
        }

        let mut notes = Vec::new();
        for parent in self.parents.read().iter() {
            let parent_name = parent
                .class
                .as_class()
                .map(|c| c.name())
                .unwrap_or_else(|| "?".to_string());
            match parent.upcast(inst) {
                Ok(up) => {
                    if let Some(desc) = parent.class.as_class() {
                        match desc.call(&up, name, args.clone()) {
                            Ok(v) => return Ok(v),
                            Err(e) => notes.push(format!("{parent_name}: {e}")),
                        }
                    }
                }
                Err(e) => notes.push(format!("{parent_name} upcast: {e}")),
            }
        }

        Err(VarError::Attribute {
            class: self.name(),
            name: name.to_string(),
            detail: if notes.is_empty() {
                String::new()
            } else {
                format!(" ({})", notes.join("; "))
            },
        })
    }
}

/// Appends `func_val` to the chain headed by `head`, keeping the earlier
/// registration when an identical signature already exists.
fn push_overload(head: &Value, func_val: Value) {
    let new_sig = match func_val.as_function() {
        Some(f) => f.signature(),
        None => return,
    };
    let mut pending = Some(func_val);
    let mut node = head.clone();
    loop {
        let next = {
            let Some(f) = node.as_function() else { return };
            if f.signature() == new_sig {
                return;
            }
            let next = f.next_value();
            if !next.is_function() {
                if let Some(v) = pending.take() {
                    f.set_next(v);
                }
                return;
            }
            next
        };
        node = next;
    }
}

fn synthesize_constructor(owner: &Value, init_chain: &Value) -> Value {
    let class_val = owner.clone();
    let chain = init_chain.clone();
    let name = class_val
        .as_class()
        .map(|c| c.name())
        .unwrap_or_else(|| "?".to_string());
    let thunk: Thunk = Box::new(move |args: &[Value]| {
        let inst = Value::object_empty();
        if let Some(obj) = inst.as_object() {
            obj.set_class(class_val.clone());
        }
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(inst.clone());
        full.extend_from_slice(args);
        match chain.as_function() {
            Some(f) => f.call(full)?,
            None => return Err(VarError::custom("constructor chain is empty")),
        };
        Ok(inst)
    });
    let arg_types = vec![class_of::<crate::containers::Object>()];
    Value::function(Function::from_thunk(name, arg_types, thunk))
}

/// Creates a fresh dynamic class that synthesizes Object instances.
///
/// The descriptor is not tied to a Rust type and is not placed in the
/// global registry; the returned builder (and any module it is stored in)
/// owns it.
pub fn create_class(name: &str) -> ClassBuilder<crate::containers::Object> {
    crate::builtin::ensure();
    let class = ClassDesc::create(
        TypeId::of::<crate::containers::Object>(),
        name.to_string(),
        Kind::Object,
        false,
    );
    ClassBuilder::wrap(class)
}

/// Fluent registration of methods, statics, properties, and parents on the
/// class of `T`.
pub struct ClassBuilder<T> {
    class: Value,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> ClassBuilder<T> {
    pub fn new(name: &str) -> Self {
        let class = class_of::<T>();
        if let Some(desc) = class.as_class() {
            desc.set_name(name);
        }
        ClassBuilder {
            class,
            _marker: PhantomData,
        }
    }

    pub(crate) fn wrap(class: Value) -> Self {
        ClassBuilder {
            class,
            _marker: PhantomData,
        }
    }

    fn desc(&self) -> &ClassDesc {
        match self.class.as_class() {
            Some(desc) => desc,
            None => unreachable!("builder always wraps a class value"),
        }
    }

    pub fn doc(self, doc: &str) -> Self {
        self.desc().set_doc(doc);
        self
    }

    /// Registers an instance method; the receiver is prepended as the
    /// first argument on dispatch.
    pub fn def<Args, M>(self, name: &str, f: impl IntoFunction<Args, M>) -> Self {
        self.def_raw(name, Function::new(name, f), true)
    }

    /// Registers a static function on the class.
    pub fn def_static<Args, M>(self, name: &str, f: impl IntoFunction<Args, M>) -> Self {
        self.def_raw(name, Function::new(name, f), false)
    }

    /// Registers a prepared function, e.g. one carrying keyword defaults.
    pub fn def_raw(self, name: &str, func: Function, is_method: bool) -> Self {
        self.desc().define(&self.class, name, func, is_method);
        self
    }

    /// Stores a constant attribute.
    pub fn def_attr(self, name: &str, value: Value) -> Self {
        self.desc().set_attr(name, value);
        self
    }

    /// Exposes a getter (and optional setter) pair as a named property.
    pub fn def_property(
        self,
        name: &str,
        fget: Function,
        fset: Option<Function>,
        doc: &str,
    ) -> Self {
        let prop = Property {
            name: name.to_string(),
            fget: Value::function(fget),
            fset: fset.map(Value::function).unwrap_or_else(Value::undefined),
            doc: doc.to_string(),
        };
        self.desc().set_attr(name, Value::new(prop));
        self
    }

    /// Declares `B` as a base class. `upcast` converts an instance of this
    /// class into an instance of `B` when calls are delegated upward.
    pub fn inherit<B, F>(self, upcast: F) -> Self
    where
        B: Any + Send + Sync,
        F: Fn(&Value) -> VarResult<Value> + Send + Sync + 'static,
    {
        self.desc().add_parent(class_of::<B>(), Box::new(upcast));
        self
    }

    /// Declares an already-built class value as a base.
    pub fn inherit_class<F>(self, parent: Value, upcast: F) -> Self
    where
        F: Fn(&Value) -> VarResult<Value> + Send + Sync + 'static,
    {
        self.desc().add_parent(parent, Box::new(upcast));
        self
    }

    /// Finishes registration, returning the class handle.
    pub fn build(self) -> Value {
        self.class
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names() {
        assert_eq!(short_type_name("alloc::string::String"), "String");
        assert_eq!(
            short_type_name("alloc::vec::Vec<alloc::string::String>"),
            "Vec<String>"
        );
        assert_eq!(short_type_name("i64"), "i64");
    }

    #[test]
    fn class_is_singleton_per_type() {
        struct Marker;
        let a = class_of::<Marker>();
        let b = class_of::<Marker>();
        assert!(a.value_eq(&b));
    }

    #[test]
    fn duplicate_signature_keeps_first() {
        struct Dup;
        let class = ClassBuilder::<Dup>::new("Dup")
            .def_static("pick", |x: i64| x + 1)
            .def_static("pick", |x: i64| x + 100)
            .build();
        let desc = class.as_class().unwrap();
        let f = desc.attr("pick");
        let out = f.as_function().unwrap().call(vec![Value::from(1i64)]).unwrap();
        assert_eq!(out.as_int(), Some(2));
    }

    #[test]
    fn attr_falls_back_to_parents() {
        struct BaseA;
        struct DerivedA;
        ClassBuilder::<BaseA>::new("BaseA").def_attr("flag", Value::from(7i64));
        let derived = ClassBuilder::<DerivedA>::new("DerivedA")
            .inherit::<BaseA, _>(|_v| Ok(Value::undefined()))
            .build();
        let desc = derived.as_class().unwrap();
        assert_eq!(desc.attr("flag").as_int(), Some(7));
        assert!(desc.attr("missing").is_undefined());
    }

    #[test]
    fn missing_member_reports_class_and_parents() {
        struct BaseB;
        struct DerivedB;
        ClassBuilder::<BaseB>::new("BaseB");
        let derived = ClassBuilder::<DerivedB>::new("DerivedB")
            .inherit::<BaseB, _>(|v| Ok(v.clone()))
            .build();
        let desc = derived.as_class().unwrap();
        let err = desc
            .call(&Value::from(1i64), "nope", vec![])
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("DerivedB"));
        assert!(msg.contains("nope"));
        assert!(msg.contains("BaseB"));
    }
}
