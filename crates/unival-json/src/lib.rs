//! Unival JSON - lenient parser and deterministic serializer
//!
//! The parser accepts standard JSON extended with comments and bare
//! identifiers; the serializer produces output the parser reads back into
//! a structurally equal value (for kinds JSON can express).

pub mod dump;
pub mod parser;

pub use dump::{dump, dump_pretty};
pub use parser::parse;

use unival_core::{create_class, Value, VarResult};

/// Registers the `Json` class, exposing `load` and `dump` statics, into
/// `root` (typically the process instance).
pub fn install(root: &Value) -> VarResult<()> {
    let class = create_class("Json")
        .doc("JSON codec")
        .def_static("load", |text: String| -> VarResult<Value> { parse(&text) })
        .def_static("dump", |v: Value| dump(&v))
        .build();
    root.set("Json", class, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installs_codec_class() {
        let root = Value::object_empty();
        install(&root).unwrap();
        let json = root.get_or("Json", Value::undefined(), false).unwrap();
        assert!(json.is_class());

        let parsed = json
            .call_method("load", vec![Value::from("{\"n\": 1}")])
            .unwrap();
        assert_eq!(
            parsed.index(&Value::from("n")).unwrap().as_int(),
            Some(1)
        );
        let dumped = json.call_method("dump", vec![parsed]).unwrap();
        assert_eq!(dumped.as_str(), Some("{\"n\":1}"));
    }
}
