//! Process-wide root instance and the plugin entry convention
//!
//! The root instance is a plain Object value. Libraries register their
//! classes and functions into it; hosts loading a compiled module resolve
//! [`MODULE_ENTRY_SYMBOL`] and receive a pointer to the same instance, so
//! one process always shares one registry of exported values.

use once_cell::sync::Lazy;

use crate::value::Value;

/// Symbol name exported by [`export_module!`].
pub const MODULE_ENTRY_SYMBOL: &str = "unival_entry";

static INSTANCE: Lazy<Value> = Lazy::new(|| {
    let root = Value::object_empty();
    let builtin = Value::object_empty();
    if let Some(o) = builtin.as_object() {
        o.set("version", Value::from(env!("CARGO_PKG_VERSION")));
    }
    if let Some(o) = root.as_object() {
        o.set("__builtin__", builtin);
    }
    root
});

/// The singleton root instance.
pub fn instance() -> Value {
    INSTANCE.clone()
}

/// Stable pointer to a leaked handle of the root instance, for handing
/// across a dynamic-library boundary.
pub fn instance_ptr() -> *const Value {
    static PTR: Lazy<&'static Value> = Lazy::new(|| Box::leak(Box::new(instance())));
    *PTR as *const Value
}

/// Emits the C entry point a host dlopens to bootstrap this module.
///
/// `$setup` is called once with the root instance so the module can
/// register its exports before the pointer is handed back.
#[macro_export]
macro_rules! export_module {
    ($setup:path) => {
        #[no_mangle]
        pub extern "C" fn unival_entry() -> *const $crate::Value {
            $setup(&$crate::instance());
            $crate::instance_ptr()
        }
    };
}
