//! Conversions between runtime values and Rust types
//!
//! `FromValue` and `IntoValue` are the two directions of the caster layer.
//! When the payload is not already the requested type, `convert` consults
//! class metadata: first a `__<target>__` method on the source class, then
//! the target's `__init__`. Both directions also carry the class handle a
//! parameter of that type advertises in function signatures.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::buffer::Buffer;
use crate::class::class_of;
use crate::containers::{Array, Dict, Object};
use crate::error::{VarError, VarResult};
use crate::function::Function;
use crate::value::Value;

/// Extraction of a typed Rust value out of a runtime value.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> VarResult<Self>;
    /// Class handle advertised for parameters of this type.
    fn type_class() -> Value;
}

/// Wrapping of a Rust value into a runtime value.
pub trait IntoValue {
    fn into_value(self) -> Value;
    /// Class handle advertised for returns of this type.
    fn type_class() -> Value;
}

/// Routes `value` to an instance of `target_class`.
///
/// Tried in order: a `__<name>__` conversion method on the source class
/// (parents included), then the target class constructor with the value as
/// its only argument. A result is accepted only when it lands in the
/// target class.
pub fn convert(value: &Value, target_class: &Value) -> VarResult<Value> {
    let target = match target_class.as_class() {
        Some(desc) => desc,
        None => return Err(VarError::type_mismatch("class", target_class.class_name())),
    };
    let target_name = target.name();

    if same_class(value, target_class) {
        return Ok(value.clone());
    }

    let source = value.class_value();
    if let Some(desc) = source.as_class() {
        let method = desc.attr(&format!("__{target_name}__"));
        if let Some(f) = method.as_function() {
            if let Ok(out) = f.call(vec![value.clone()]) {
                if same_class(&out, target_class) {
                    return Ok(out);
                }
            }
        }
    }

    let init = target.init_slot();
    if let Some(f) = init.as_function() {
        if let Ok(out) = f.call(vec![value.clone()]) {
            if same_class(&out, target_class) {
                return Ok(out);
            }
        }
    }

    Err(VarError::cast(value.class_name(), target_name))
}

fn same_class(value: &Value, class: &Value) -> bool {
    value.class_value().value_eq(class)
}

impl FromValue for Value {
    fn from_value(value: &Value) -> VarResult<Value> {
        Ok(value.clone())
    }

    fn type_class() -> Value {
        class_of::<Value>()
    }
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }

    fn type_class() -> Value {
        class_of::<Value>()
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> VarResult<bool> {
        if let Some(b) = value.as_bool() {
            return Ok(b);
        }
        let out = convert(value, &<Self as FromValue>::type_class())?;
        out.as_bool()
            .ok_or_else(|| VarError::cast(value.class_name(), "bool"))
    }

    fn type_class() -> Value {
        class_of::<bool>()
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::from(self)
    }

    fn type_class() -> Value {
        class_of::<bool>()
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> VarResult<i64> {
        if let Some(i) = value.as_int() {
            return Ok(i);
        }
        let out = convert(value, &<Self as FromValue>::type_class())?;
        out.as_int()
            .ok_or_else(|| VarError::cast(value.class_name(), "int"))
    }

    fn type_class() -> Value {
        class_of::<i64>()
    }
}

impl IntoValue for i64 {
    fn into_value(self) -> Value {
        Value::from(self)
    }

    fn type_class() -> Value {
        class_of::<i64>()
    }
}

macro_rules! impl_small_int {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> VarResult<$ty> {
                    let wide = i64::from_value(value)?;
                    <$ty>::try_from(wide).map_err(|_| {
                        VarError::cast(value.class_name(), stringify!($ty))
                    })
                }

                fn type_class() -> Value {
                    class_of::<i64>()
                }
            }

            impl IntoValue for $ty {
                fn into_value(self) -> Value {
                    Value::from(self as i64)
                }

                fn type_class() -> Value {
                    class_of::<i64>()
                }
            }
        )*
    };
}

impl_small_int!(i32, u32, u64, usize);

impl FromValue for f64 {
    fn from_value(value: &Value) -> VarResult<f64> {
        if let Some(d) = value.as_float() {
            return Ok(d);
        }
        let out = convert(value, &<Self as FromValue>::type_class())?;
        out.as_float()
            .ok_or_else(|| VarError::cast(value.class_name(), "double"))
    }

    fn type_class() -> Value {
        class_of::<f64>()
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> Value {
        Value::from(self)
    }

    fn type_class() -> Value {
        class_of::<f64>()
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> VarResult<f32> {
        Ok(f64::from_value(value)? as f32)
    }

    fn type_class() -> Value {
        class_of::<f64>()
    }
}

impl IntoValue for f32 {
    fn into_value(self) -> Value {
        Value::from(self as f64)
    }

    fn type_class() -> Value {
        class_of::<f64>()
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> VarResult<String> {
        if let Some(s) = value.as_str() {
            return Ok(s.to_string());
        }
        let out = convert(value, &<Self as FromValue>::type_class())?;
        out.as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| VarError::cast(value.class_name(), "str"))
    }

    fn type_class() -> Value {
        class_of::<String>()
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::from(self)
    }

    fn type_class() -> Value {
        class_of::<String>()
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::from(self)
    }

    fn type_class() -> Value {
        class_of::<String>()
    }
}

impl IntoValue for () {
    fn into_value(self) -> Value {
        Value::undefined()
    }

    fn type_class() -> Value {
        class_of::<()>()
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> VarResult<Vec<T>> {
        let array = value
            .as_array()
            .ok_or_else(|| VarError::type_mismatch("array", value.class_name()))?;
        array
            .snapshot()
            .iter()
            .map(T::from_value)
            .collect()
    }

    fn type_class() -> Value {
        class_of::<Array>()
    }
}

impl<T: IntoValue> IntoValue for Vec<T> {
    fn into_value(self) -> Value {
        Value::array(self.into_iter().map(IntoValue::into_value).collect())
    }

    fn type_class() -> Value {
        class_of::<Array>()
    }
}

macro_rules! impl_string_map {
    ($($map:ident),*) => {
        $(
            impl<T: FromValue> FromValue for $map<String, T> {
                fn from_value(value: &Value) -> VarResult<$map<String, T>> {
                    let object = value
                        .as_object()
                        .ok_or_else(|| VarError::type_mismatch("object", value.class_name()))?;
                    object
                        .snapshot()
                        .into_iter()
                        .map(|(k, v)| Ok((k, T::from_value(&v)?)))
                        .collect()
                }

                fn type_class() -> Value {
                    class_of::<Object>()
                }
            }

            impl<T: IntoValue> IntoValue for $map<String, T> {
                fn into_value(self) -> Value {
                    let object = Object::new();
                    for (k, v) in self {
                        object.set(k, v.into_value());
                    }
                    Value::from(object)
                }

                fn type_class() -> Value {
                    class_of::<Object>()
                }
            }
        )*
    };
}

impl_string_map!(FxHashMap, HashMap, BTreeMap);

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> VarResult<Option<T>> {
        if value.is_null() || value.is_undefined() {
            return Ok(None);
        }
        Ok(Some(T::from_value(value)?))
    }

    fn type_class() -> Value {
        T::type_class()
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Value {
        match self {
            Some(v) => v.into_value(),
            None => Value::null(),
        }
    }

    fn type_class() -> Value {
        T::type_class()
    }
}

impl<T: Any + Send + Sync> FromValue for Arc<T> {
    fn from_value(value: &Value) -> VarResult<Arc<T>> {
        Ok(value.get::<Arc<T>>()?.clone())
    }

    fn type_class() -> Value {
        class_of::<T>()
    }
}

impl<T: Any + Send + Sync> IntoValue for Arc<T> {
    fn into_value(self) -> Value {
        Value::shared(self)
    }

    fn type_class() -> Value {
        class_of::<T>()
    }
}

impl IntoValue for Array {
    fn into_value(self) -> Value {
        Value::from(self)
    }

    fn type_class() -> Value {
        class_of::<Array>()
    }
}

impl IntoValue for Object {
    fn into_value(self) -> Value {
        Value::from(self)
    }

    fn type_class() -> Value {
        class_of::<Object>()
    }
}

impl IntoValue for Dict {
    fn into_value(self) -> Value {
        Value::from(self)
    }

    fn type_class() -> Value {
        class_of::<Dict>()
    }
}

impl IntoValue for Buffer {
    fn into_value(self) -> Value {
        Value::from(self)
    }

    fn type_class() -> Value {
        class_of::<Buffer>()
    }
}

impl IntoValue for Function {
    fn into_value(self) -> Value {
        Value::function(self)
    }

    fn type_class() -> Value {
        class_of::<Function>()
    }
}

/// Implements [`FromValue`] and [`IntoValue`] for a `Clone` native type, so
/// it can flow through bound functions by value.
#[macro_export]
macro_rules! native_value {
    ($ty:ty) => {
        impl $crate::FromValue for $ty {
            fn from_value(value: &$crate::Value) -> $crate::VarResult<Self> {
                if let Ok(v) = value.get::<$ty>() {
                    return Ok(v.clone());
                }
                let out = $crate::convert(value, &<Self as $crate::FromValue>::type_class())?;
                out.get::<$ty>().map(Clone::clone)
            }

            fn type_class() -> $crate::Value {
                $crate::class_of::<$ty>()
            }
        }

        impl $crate::IntoValue for $ty {
            fn into_value(self) -> $crate::Value {
                $crate::Value::new(self)
            }

            fn type_class() -> $crate::Value {
                $crate::class_of::<$ty>()
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_identity_casts() {
        assert_eq!(Value::from(7i64).cast::<i64>().unwrap(), 7);
        assert_eq!(Value::from(0.5f64).cast::<f64>().unwrap(), 0.5);
        assert_eq!(Value::from(true).cast::<bool>().unwrap(), true);
        assert_eq!(Value::from("hi").cast::<String>().unwrap(), "hi");
    }

    #[test]
    fn numeric_conversions_use_class_methods() {
        // int -> double through int.__double__
        assert_eq!(Value::from(3i64).cast::<f64>().unwrap(), 3.0);
        // double -> int truncates through double.__int__
        assert_eq!(Value::from(2.9f64).cast::<i64>().unwrap(), 2);
        // str -> int through int.__init__
        assert_eq!(Value::from("42").cast::<i64>().unwrap(), 42);
        // int -> str through int.__str__
        assert_eq!(Value::from(9i64).cast::<String>().unwrap(), "9");
        // int -> bool through bool.__init__
        assert_eq!(Value::from(1i64).cast::<bool>().unwrap(), true);
        assert!(Value::from("no").cast::<i64>().is_err());
    }

    #[test]
    fn small_int_range_checks() {
        assert_eq!(Value::from(40i64).cast::<i32>().unwrap(), 40);
        assert!(Value::from(i64::MAX).cast::<i32>().is_err());
        assert!(Value::from(-1i64).cast::<u32>().is_err());
    }

    #[test]
    fn vec_round_trip() {
        let v = vec![1i64, 2, 3].into_value();
        assert_eq!(v.kind(), crate::payload::Kind::Array);
        assert_eq!(v.cast::<Vec<i64>>().unwrap(), vec![1, 2, 3]);
        // Elements convert individually.
        let mixed = Value::array(vec![Value::from(1i64), Value::from("2")]);
        assert_eq!(mixed.cast::<Vec<i64>>().unwrap(), vec![1, 2]);
    }

    #[test]
    fn map_round_trip() {
        let mut m = HashMap::new();
        m.insert("a".to_string(), 1i64);
        m.insert("b".to_string(), 2i64);
        let v = m.clone().into_value();
        assert_eq!(v.cast::<HashMap<String, i64>>().unwrap(), m);
    }

    #[test]
    fn option_maps_null() {
        assert_eq!(Value::null().cast::<Option<i64>>().unwrap(), None);
        assert_eq!(Value::from(4i64).cast::<Option<i64>>().unwrap(), Some(4));
        assert_eq!(None::<i64>.into_value().kind(), crate::payload::Kind::Null);
    }

    #[test]
    fn arc_passes_through() {
        let a = Arc::new(5u64);
        let v = a.clone().into_value();
        let back = v.cast::<Arc<u64>>().unwrap();
        assert!(Arc::ptr_eq(&a, &back));
    }
}
