//! Builtin class descriptors
//!
//! Installs the descriptors for every builtin kind, together with their
//! operator methods, constructors, and conversion methods. Installation
//! runs once, triggered lazily by the first registry access; re-entrant
//! lookups during installation short-circuit so registration code can
//! itself build functions.

use std::cell::Cell;
use std::sync::Once;

use crate::buffer::Buffer;
use crate::class::{get_or_create, ClassBuilder, ClassDesc};
use crate::containers::{Array, Dict, Object};
use crate::error::{VarError, VarResult};
use crate::function::Function;
use crate::payload::Kind;
use crate::value::{format_float, Value};

/// Marker type behind the `null` class.
pub struct NullType;

/// Runs builtin installation exactly once.
pub(crate) fn ensure() {
    static DONE: Once = Once::new();
    thread_local! {
        static BUSY: Cell<bool> = Cell::new(false);
    }
    if BUSY.with(|b| b.get()) {
        return;
    }
    DONE.call_once(|| {
        BUSY.with(|b| b.set(true));
        register_all();
        BUSY.with(|b| b.set(false));
    });
}

fn register_all() {
    // Descriptors first, so signature building during method registration
    // finds every builtin under its canonical name.
    get_or_create::<()>(Some("void"), Kind::Undefined);
    get_or_create::<NullType>(Some("null"), Kind::Null);
    get_or_create::<bool>(Some("bool"), Kind::Boolean);
    get_or_create::<i64>(Some("int"), Kind::Integer);
    get_or_create::<f64>(Some("double"), Kind::Float);
    get_or_create::<String>(Some("str"), Kind::String);
    get_or_create::<Array>(Some("array"), Kind::Array);
    get_or_create::<Object>(Some("object"), Kind::Object);
    get_or_create::<Dict>(Some("dict"), Kind::Dict);
    get_or_create::<Buffer>(Some("buffer"), Kind::Buffer);
    get_or_create::<Function>(Some("function"), Kind::Function);
    get_or_create::<ClassDesc>(Some("class"), Kind::Class);
    get_or_create::<Value>(Some("any"), Kind::Other);

    register_void();
    register_null();
    register_bool();
    register_int();
    register_double();
    register_str();
    register_array();
    register_object();
    register_dict();
    register_buffer();
}

fn builder<T: std::any::Any + Send + Sync>() -> ClassBuilder<T> {
    ClassBuilder::wrap(get_or_create::<T>(None, Kind::Other))
}

fn register_void() {
    builder::<()>().def("__str__", |_v: Value| "undefined");
}

fn register_null() {
    builder::<NullType>().def("__str__", |_v: Value| "null");
}

fn register_bool() {
    builder::<bool>()
        .doc("boolean")
        .def_static("__init__", |v: Value| -> VarResult<bool> {
            if let Some(b) = v.as_bool() {
                Ok(b)
            } else if let Some(i) = v.as_int() {
                Ok(i != 0)
            } else if let Some(d) = v.as_float() {
                Ok(d != 0.0)
            } else if let Some(s) = v.as_str() {
                match s {
                    "true" | "1" => Ok(true),
                    "false" | "0" => Ok(false),
                    _ => Err(VarError::cast("str", "bool")),
                }
            } else {
                Err(VarError::cast(v.class_name(), "bool"))
            }
        })
        .def("__int__", |b: bool| b as i64)
        .def("__double__", |b: bool| b as i64 as f64)
        .def("__str__", |b: bool| if b { "true" } else { "false" })
        .def("__eq__", |a: bool, b: bool| a == b);
}

fn register_int() {
    builder::<i64>()
        .doc("64-bit signed integer")
        .def_static("__init__", |v: Value| -> VarResult<i64> {
            if let Some(i) = v.as_int() {
                Ok(i)
            } else if let Some(d) = v.as_float() {
                Ok(d as i64)
            } else if let Some(b) = v.as_bool() {
                Ok(b as i64)
            } else if let Some(s) = v.as_str() {
                let t = s.trim();
                if let Ok(i) = t.parse::<i64>() {
                    Ok(i)
                } else if let Ok(d) = t.parse::<f64>() {
                    Ok(d as i64)
                } else {
                    Err(VarError::cast("str", "int"))
                }
            } else {
                Err(VarError::cast(v.class_name(), "int"))
            }
        })
        .def("__double__", |i: i64| i as f64)
        .def("__bool__", |i: i64| i != 0)
        .def("__str__", |i: i64| i.to_string())
        .def("__neg__", |i: i64| i.wrapping_neg())
        .def("__add__", |a: i64, b: i64| a.wrapping_add(b))
        .def("__sub__", |a: i64, b: i64| a.wrapping_sub(b))
        .def("__mul__", |a: i64, b: i64| a.wrapping_mul(b))
        .def("__div__", |a: i64, b: i64| -> VarResult<i64> {
            if b == 0 {
                Err(VarError::custom("integer division by zero"))
            } else {
                Ok(a.wrapping_div(b))
            }
        })
        .def("__mod__", |a: i64, b: i64| -> VarResult<i64> {
            if b == 0 {
                Err(VarError::custom("integer modulo by zero"))
            } else {
                Ok(a.wrapping_rem(b))
            }
        })
        .def("__xor__", |a: i64, b: i64| a ^ b)
        .def("__or__", |a: i64, b: i64| a | b)
        .def("__and__", |a: i64, b: i64| a & b)
        .def("__eq__", |a: i64, b: i64| a == b)
        .def("__lt__", |a: i64, b: i64| a < b);
}

fn register_double() {
    builder::<f64>()
        .doc("64-bit float")
        .def_static("__init__", |v: Value| -> VarResult<f64> {
            if let Some(d) = v.as_float() {
                Ok(d)
            } else if let Some(i) = v.as_int() {
                Ok(i as f64)
            } else if let Some(b) = v.as_bool() {
                Ok(b as i64 as f64)
            } else if let Some(s) = v.as_str() {
                s.trim()
                    .parse::<f64>()
                    .map_err(|_| VarError::cast("str", "double"))
            } else {
                Err(VarError::cast(v.class_name(), "double"))
            }
        })
        .def("__int__", |d: f64| d as i64)
        .def("__bool__", |d: f64| d != 0.0)
        .def("__str__", |d: f64| format_float(d))
        .def("__neg__", |d: f64| -d)
        .def("__add__", |a: f64, b: f64| a + b)
        .def("__sub__", |a: f64, b: f64| a - b)
        .def("__mul__", |a: f64, b: f64| a * b)
        .def("__div__", |a: f64, b: f64| a / b)
        .def("__eq__", |a: f64, b: f64| a == b)
        .def("__lt__", |a: f64, b: f64| a < b);
}

fn register_str() {
    builder::<String>()
        .doc("UTF-8 string")
        .def_static("__init__", |v: Value| -> VarResult<String> {
            match v.as_str() {
                Some(s) => Ok(s.to_string()),
                None => Ok(v.to_string()),
            }
        })
        .def("__len__", |s: String| s.len() as i64)
        // The quoted escaped form, as the serializer would write it.
        .def("__str__", |v: Value| v.to_string())
        .def("__add__", |a: String, b: String| format!("{a}{b}"))
        .def("__eq__", |a: String, b: String| a == b)
        .def("__lt__", |a: String, b: String| a < b);
}

fn need_array(v: &Value) -> VarResult<&Array> {
    v.as_array()
        .ok_or_else(|| VarError::type_mismatch("array", v.class_name()))
}

fn need_object(v: &Value) -> VarResult<&Object> {
    v.as_object()
        .ok_or_else(|| VarError::type_mismatch("object", v.class_name()))
}

fn need_dict(v: &Value) -> VarResult<&Dict> {
    v.as_dict()
        .ok_or_else(|| VarError::type_mismatch("dict", v.class_name()))
}

fn need_buffer(v: &Value) -> VarResult<&Buffer> {
    v.as_buffer()
        .ok_or_else(|| VarError::type_mismatch("buffer", v.class_name()))
}

fn register_array() {
    builder::<Array>()
        .doc("sequence of values")
        .def("__len__", |v: Value| -> VarResult<i64> {
            Ok(need_array(&v)?.len() as i64)
        })
        .def("__str__", |v: Value| v.to_string())
        .def("__getitem__", |v: Value, i: i64| -> VarResult<Value> {
            v.index(&Value::from(i))
        })
        .def("__setitem__", |v: Value, i: i64, item: Value| -> VarResult<()> {
            need_array(&v)?.set(i.max(0) as usize, item)
        })
        .def("__delitem__", |v: Value, i: i64| -> VarResult<Value> {
            Ok(need_array(&v)?.remove(i.max(0) as usize))
        })
        .def("__add__", |a: Value, b: Value| -> VarResult<Value> {
            Ok(Value::from(need_array(&a)?.concat(need_array(&b)?)))
        })
        .def("__mul__", |a: Value, n: i64| -> VarResult<Value> {
            Ok(Value::from(need_array(&a)?.repeat(n.max(0) as usize)))
        })
        .def("append", |v: Value, item: Value| -> VarResult<()> {
            need_array(&v)?.push(item);
            Ok(())
        });
}

fn register_object() {
    builder::<Object>()
        .doc("string-keyed map")
        .def("__len__", |v: Value| -> VarResult<i64> {
            Ok(need_object(&v)?.len() as i64)
        })
        .def("__str__", |v: Value| v.to_string())
        .def("__getitem__", |v: Value, k: String| -> VarResult<Value> {
            Ok(need_object(&v)?.get(&k))
        })
        .def("__setitem__", |v: Value, k: String, item: Value| -> VarResult<()> {
            need_object(&v)?.set(k, item);
            Ok(())
        })
        .def("__delitem__", |v: Value, k: String| -> VarResult<Value> {
            Ok(need_object(&v)?.remove(&k))
        })
        .def("update", |v: Value, other: Value| -> VarResult<()> {
            need_object(&v)?.merge(need_object(&other)?);
            Ok(())
        })
        // Left-biased merge into a fresh object.
        .def("__add__", |a: Value, b: Value| -> VarResult<Value> {
            let merged = need_object(&a)?.clone();
            merged.merge(need_object(&b)?);
            Ok(Value::from(merged))
        })
        .def("keys", |v: Value| -> VarResult<Vec<String>> {
            Ok(need_object(&v)?.keys())
        });
}

fn register_dict() {
    builder::<Dict>()
        .doc("value-keyed map")
        .def("__len__", |v: Value| -> VarResult<i64> {
            Ok(need_dict(&v)?.len() as i64)
        })
        .def("__getitem__", |v: Value, k: Value| -> VarResult<Value> {
            Ok(need_dict(&v)?.get(&k))
        })
        .def("__setitem__", |v: Value, k: Value, item: Value| -> VarResult<()> {
            need_dict(&v)?.set(k, item);
            Ok(())
        })
        .def("__delitem__", |v: Value, k: Value| -> VarResult<Value> {
            Ok(need_dict(&v)?.remove(&k))
        });
}

fn register_buffer() {
    builder::<Buffer>()
        .doc("contiguous bytes with shape metadata")
        .def("__len__", |v: Value| -> VarResult<i64> {
            Ok(need_buffer(&v)?.len() as i64)
        })
        .def("size", |v: Value| -> VarResult<i64> {
            Ok(need_buffer(&v)?.len() as i64)
        })
        .def("__str__", |v: Value| -> VarResult<String> {
            let b = need_buffer(&v)?;
            if b.shape.len() > 1 {
                let dims: Vec<String> = b.shape.iter().map(|d| d.to_string()).collect();
                Ok(format!("<buffer {} ({} bytes)>", dims.join("x"), b.len()))
            } else {
                Ok(format!("<buffer {} bytes>", b.len()))
            }
        })
        .def("hex", |v: Value| -> VarResult<String> { Ok(need_buffer(&v)?.hex()) })
        .def("base64", |v: Value| -> VarResult<String> {
            Ok(need_buffer(&v)?.base64())
        })
        .def("md5", |v: Value| -> VarResult<String> { Ok(need_buffer(&v)?.md5()) })
        .def_static("from_hex", |s: String| -> VarResult<Value> {
            Ok(Value::from(Buffer::from_hex(&s)?))
        })
        .def_static("from_base64", |s: String| -> VarResult<Value> {
            Ok(Value::from(Buffer::from_base64(&s)?))
        });
}
