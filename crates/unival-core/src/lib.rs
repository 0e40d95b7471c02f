//! Unival - dynamic value runtime for Rust
//!
//! One `Value` handle can hold any of the builtin kinds (null, bool, int,
//! double, str, array, object, dict, buffer, function, class) or any Rust
//! type surfaced through a class descriptor. Handles are cheap to copy and
//! safe to share across threads; containers mutate behind their own locks.
//!
//! # Example
//!
//! ```ignore
//! use unival_core::{Function, Value};
//!
//! let add = Value::function(Function::new("add", |a: i64, b: i64| a + b));
//! let sum = add.invoke(vec![Value::from(1i64), Value::from(2i64)])?;
//! assert_eq!(sum.as_int(), Some(3));
//! ```

pub mod buffer;
pub mod builtin;
pub mod cast;
pub mod class;
pub mod containers;
pub mod error;
pub mod function;
pub mod module;
pub mod payload;
pub mod value;

pub use buffer::{md5_hex, Buffer};
pub use cast::{convert, FromValue, IntoValue};
pub use class::{class_of, create_class, ClassBuilder, ClassDesc, Parent, Property};
pub use containers::{Array, Dict, DictKey, Object};
pub use error::{OverloadError, VarError, VarResult};
pub use function::{named, Function, IntoFunction, NamedArg};
pub use module::{instance, instance_ptr, MODULE_ENTRY_SYMBOL};
pub use payload::{Kind, NativeCell, Payload};
pub use value::{escape_string, format_float, BuiltinOp, Value};
