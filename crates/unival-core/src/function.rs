//! Callable values: overload chains, keyword arguments, closure binding
//!
//! A `Function` wraps one native thunk plus metadata. Registering another
//! function under the same name links it onto the `next` chain; calls walk
//! the chain in declaration order and the first overload whose argument
//! conversion succeeds wins. Every rejection is recorded so a total failure
//! can report each candidate with its reason.

use std::collections::VecDeque;

use parking_lot::RwLock;

use crate::cast::{FromValue, IntoValue};
use crate::error::{OverloadError, VarResult};
use crate::value::Value;

pub(crate) type Thunk = Box<dyn Fn(&[Value]) -> VarResult<Value> + Send + Sync>;

/// A keyword argument travelling through a call site.
///
/// Produced by [`named`]; overload binding unwraps it when filling declared
/// keyword parameters.
#[derive(Clone)]
pub struct NamedArg {
    pub name: String,
    pub value: Value,
}

/// Wraps `value` as a keyword argument for a call.
pub fn named(name: impl Into<String>, value: impl IntoValue) -> Value {
    Value::new(NamedArg {
        name: name.into(),
        value: value.into_value(),
    })
}

pub struct Function {
    pub(crate) name: String,
    pub(crate) doc: String,
    /// Declared classes; index 0 is the return type, the rest are
    /// parameters in order.
    pub(crate) arg_types: Vec<Value>,
    /// Declared keyword parameters, aligned with the tail of `arg_types`.
    /// An Undefined default marks the parameter as required.
    pub(crate) kwargs: Vec<(String, Value)>,
    pub(crate) is_method: bool,
    pub(crate) is_constructor: bool,
    pub(crate) do_argcheck: bool,
    next: RwLock<Value>,
    thunk: Thunk,
}

impl Function {
    /// Binds a typed closure. Parameter and return classes are recorded from
    /// the closure's signature.
    pub fn new<Args, Marker, F>(name: impl Into<String>, f: F) -> Function
    where
        F: IntoFunction<Args, Marker>,
    {
        let (arg_types, thunk) = f.bind();
        Function {
            name: name.into(),
            doc: String::new(),
            arg_types,
            kwargs: Vec::new(),
            is_method: false,
            is_constructor: false,
            do_argcheck: true,
            next: RwLock::new(Value::undefined()),
            thunk,
        }
    }

    /// Wraps a raw thunk that performs its own argument handling.
    pub(crate) fn from_thunk(
        name: impl Into<String>,
        arg_types: Vec<Value>,
        thunk: Thunk,
    ) -> Function {
        Function {
            name: name.into(),
            doc: String::new(),
            arg_types,
            kwargs: Vec::new(),
            is_method: false,
            is_constructor: false,
            do_argcheck: false,
            next: RwLock::new(Value::undefined()),
            thunk,
        }
    }

    /// Declares the trailing parameters as keyword parameters.
    ///
    /// Pass Undefined as the default to make a keyword required.
    pub fn with_kwargs(mut self, kwargs: Vec<(impl Into<String>, Value)>) -> Self {
        self.kwargs = kwargs
            .into_iter()
            .map(|(n, v)| (n.into(), v))
            .collect();
        self
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc(&self) -> &str {
        &self.doc
    }

    pub fn is_method(&self) -> bool {
        self.is_method
    }

    pub fn is_constructor(&self) -> bool {
        self.is_constructor
    }

    pub(crate) fn next_value(&self) -> Value {
        self.next.read().clone()
    }

    pub(crate) fn set_next(&self, next: Value) {
        *self.next.write() = next;
    }

    /// Number of declared parameters, excluding the return slot.
    pub fn arity(&self) -> usize {
        self.arg_types.len().saturating_sub(1)
    }

    /// Human-readable signature, e.g. `add(arg0: int, b: int=0) -> int`.
    pub fn signature(&self) -> String {
        let total = self.arity();
        let fixed = total.saturating_sub(self.kwargs.len());
        let mut out = String::new();
        out.push_str(&self.name);
        out.push('(');
        for i in 0..total {
            if i > 0 {
                out.push_str(", ");
            }
            if i == 0 && self.is_method {
                out.push_str("self");
                continue;
            }
            let ty = class_label(&self.arg_types[i + 1]);
            if i >= fixed {
                let (kw_name, default) = &self.kwargs[i - fixed];
                out.push_str(kw_name);
                out.push_str(": ");
                out.push_str(&ty);
                if !default.is_undefined() {
                    out.push('=');
                    out.push_str(&default.to_string());
                }
            } else {
                out.push_str(&format!("arg{i}: {ty}"));
            }
        }
        out.push_str(") -> ");
        out.push_str(&class_label(&self.arg_types[0]));
        out
    }

    /// Runs the overload chain against `args`.
    ///
    /// Overloads are tried in declaration order; any failure, whether
    /// binding or execution, moves on to the next candidate. When every
    /// candidate rejects, the aggregated error lists each signature with
    /// its reason.
    pub fn call(&self, args: Vec<Value>) -> VarResult<Value> {
        let mut candidates = Vec::new();
        let mut failures = Vec::new();

        match self.try_call(&args) {
            Ok(v) => return Ok(v),
            Err(e) => {
                candidates.push(self.signature());
                failures.push(e.to_string());
            }
        }

        // Snapshot the chain first so new registrations during the walk
        // cannot extend it under us.
        let mut chain = Vec::new();
        let mut cur = self.next_value();
        while cur.is_function() {
            let next = match cur.as_function() {
                Some(f) => f.next_value(),
                None => Value::undefined(),
            };
            chain.push(cur);
            cur = next;
        }

        for node in &chain {
            if let Some(f) = node.as_function() {
                match f.try_call(&args) {
                    Ok(v) => return Ok(v),
                    Err(e) => {
                        candidates.push(f.signature());
                        failures.push(e.to_string());
                    }
                }
            }
        }

        Err(OverloadError {
            call: render_call(&self.name, &args),
            candidates,
            failures,
        }
        .into())
    }

    /// Tries this single overload against `args`.
    fn try_call(&self, args: &[Value]) -> VarResult<Value> {
        let total = self.arity();

        if self.kwargs.is_empty() {
            if args.iter().any(|a| a.is::<NamedArg>()) {
                return Err("takes no keyword arguments".into());
            }
            if self.do_argcheck && args.len() != total {
                return Err(format!(
                    "expected {total} arguments, got {}",
                    args.len()
                )
                .into());
            }
            return (self.thunk)(args);
        }

        // Keyword overload: split positional from named, then rebuild the
        // final positional list. Leading fixed parameters must come from
        // positionals; keyword parameters take a matching named argument
        // first, then a leftover positional, then their default.
        let mut positional: VecDeque<Value> = VecDeque::new();
        let mut named: Vec<(String, Value)> = Vec::new();
        for arg in args {
            if let Ok(na) = arg.get::<NamedArg>() {
                named.push((na.name.clone(), na.value.clone()));
            } else {
                positional.push_back(arg.clone());
            }
        }

        let fixed = total.saturating_sub(self.kwargs.len());
        let mut finalv = Vec::with_capacity(total);
        for i in 0..fixed {
            match positional.pop_front() {
                Some(v) => finalv.push(v),
                None => return Err(format!("missing positional argument {i}").into()),
            }
        }
        for (kw_name, default) in &self.kwargs {
            if let Some(idx) = named.iter().position(|(n, _)| n == kw_name) {
                finalv.push(named.remove(idx).1);
            } else if let Some(v) = positional.pop_front() {
                finalv.push(v);
            } else if !default.is_undefined() {
                finalv.push(default.clone());
            } else {
                return Err(format!("missing required keyword argument {kw_name:?}").into());
            }
        }
        if !positional.is_empty() {
            return Err(format!(
                "expected {total} arguments, got {}",
                total + positional.len()
            )
            .into());
        }
        if let Some((n, _)) = named.first() {
            return Err(format!("unexpected keyword argument {n:?}").into());
        }

        (self.thunk)(&finalv)
    }
}

fn class_label(class: &Value) -> String {
    match class.as_class() {
        Some(desc) => desc.name(),
        None => "?".to_string(),
    }
}

fn render_call(name: &str, args: &[Value]) -> String {
    let mut out = String::new();
    out.push_str(name);
    out.push('(');
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        if let Ok(na) = arg.get::<NamedArg>() {
            out.push_str(&format!("{}={}", na.name, na.value.class_name()));
        } else {
            out.push_str(&arg.class_name());
        }
    }
    out.push(')');
    out
}

/// Marker for closures returning a plain value.
pub struct ByValue;
/// Marker for closures returning `VarResult`.
pub struct ByResult;

/// Conversion of a typed Rust closure into the parts of a [`Function`].
///
/// Implemented for `Fn` closures of up to six arguments where every
/// parameter implements [`FromValue`] and the return type implements
/// [`IntoValue`], directly or wrapped in [`VarResult`].
pub trait IntoFunction<Args, Marker> {
    fn bind(self) -> (Vec<Value>, Thunk);
}

macro_rules! impl_into_function {
    ($($ty:ident $idx:tt),*) => {
        impl<Fun, Ret, $($ty,)*> IntoFunction<($($ty,)*), ByValue> for Fun
        where
            Fun: Fn($($ty),*) -> Ret + Send + Sync + 'static,
            Ret: IntoValue,
            $($ty: FromValue + 'static,)*
        {
            fn bind(self) -> (Vec<Value>, Thunk) {
                let arg_types = vec![
                    <Ret as IntoValue>::type_class(),
                    $(<$ty as FromValue>::type_class(),)*
                ];
                let thunk: Thunk = Box::new(move |args: &[Value]| {
                    let _ = args;
                    Ok(self($(<$ty as FromValue>::from_value(&args[$idx])?),*).into_value())
                });
                (arg_types, thunk)
            }
        }

        impl<Fun, Ret, $($ty,)*> IntoFunction<($($ty,)*), ByResult> for Fun
        where
            Fun: Fn($($ty),*) -> VarResult<Ret> + Send + Sync + 'static,
            Ret: IntoValue,
            $($ty: FromValue + 'static,)*
        {
            fn bind(self) -> (Vec<Value>, Thunk) {
                let arg_types = vec![
                    <Ret as IntoValue>::type_class(),
                    $(<$ty as FromValue>::type_class(),)*
                ];
                let thunk: Thunk = Box::new(move |args: &[Value]| {
                    let _ = args;
                    Ok(self($(<$ty as FromValue>::from_value(&args[$idx])?),*)?.into_value())
                });
                (arg_types, thunk)
            }
        }
    };
}

impl_into_function!();
impl_into_function!(A0 0);
impl_into_function!(A0 0, A1 1);
impl_into_function!(A0 0, A1 1, A2 2);
impl_into_function!(A0 0, A1 1, A2 2, A3 3);
impl_into_function!(A0 0, A1 1, A2 2, A3 3, A4 4);
impl_into_function!(A0 0, A1 1, A2 2, A3 3, A4 4, A5 5);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VarError;

    fn call_chain(head: &Value, args: Vec<Value>) -> VarResult<Value> {
        head.as_function()
            .expect("head is a function")
            .call(args)
    }

    #[test]
    fn single_overload() {
        let f = Function::new("inc", |x: i64| x + 1);
        assert_eq!(f.call(vec![Value::from(41i64)]).unwrap().as_int(), Some(42));
    }

    #[test]
    fn fallible_overload_propagates() {
        let f = Function::new("checked", |x: i64| -> VarResult<i64> {
            if x < 0 {
                Err(VarError::custom("negative"))
            } else {
                Ok(x)
            }
        });
        assert_eq!(f.call(vec![Value::from(3i64)]).unwrap().as_int(), Some(3));
        // The failure surfaces as an exhausted overload chain.
        let err = f.call(vec![Value::from(-3i64)]).unwrap_err();
        assert!(matches!(err, VarError::Overload(_)));
        assert!(err.to_string().contains("negative"));
    }

    #[test]
    fn overload_chain_picks_first_match() {
        let head = Value::function(Function::new("f", |x: i64| x * 2));
        let second = Value::function(Function::new("f", |s: String| -> VarResult<i64> {
            Ok(s.len() as i64)
        }));
        head.as_function().unwrap().set_next(second);

        assert_eq!(
            call_chain(&head, vec![Value::from(4i64)]).unwrap().as_int(),
            Some(8)
        );
        assert_eq!(
            call_chain(&head, vec![Value::from("abc")]).unwrap().as_int(),
            Some(3)
        );
    }

    #[test]
    fn arity_mismatch_skips_overload() {
        let head = Value::function(Function::new("f", |x: i64| x));
        let second = Value::function(Function::new("f", |x: i64, y: i64| x + y));
        head.as_function().unwrap().set_next(second);

        assert_eq!(
            call_chain(&head, vec![Value::from(1i64), Value::from(2i64)])
                .unwrap()
                .as_int(),
            Some(3)
        );
    }

    #[test]
    fn exhausted_chain_reports_candidates() {
        let f = Function::new("only_int", |x: i64| x);
        let err = f.call(vec![Value::array(vec![])]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("no overload matched call only_int(array)"));
        assert!(msg.contains("only_int(arg0: int) -> int"));
    }

    #[test]
    fn keyword_arguments() {
        let f = Function::new("add", |a: i64, b: i64| a + b)
            .with_kwargs(vec![("a", Value::undefined()), ("b", Value::from(0i64))]);

        // Positionals fill keyword parameters in order.
        assert_eq!(
            f.call(vec![Value::from(1i64), Value::from(2i64)]).unwrap().as_int(),
            Some(3)
        );
        // Default applies when b is omitted.
        assert_eq!(f.call(vec![Value::from(5i64)]).unwrap().as_int(), Some(5));
        // Named arguments may come in any order.
        assert_eq!(
            f.call(vec![named("b", 10i64), named("a", 1i64)]).unwrap().as_int(),
            Some(11)
        );
        // Mixing positional and named.
        assert_eq!(
            f.call(vec![Value::from(1i64), named("b", 2i64)]).unwrap().as_int(),
            Some(3)
        );
        // Required keyword missing.
        assert!(f.call(vec![named("b", 2i64)]).is_err());
        // Unknown keyword.
        assert!(f.call(vec![Value::from(1i64), named("c", 2i64)]).is_err());
    }

    #[test]
    fn signatures() {
        let f = Function::new("add", |a: i64, b: i64| a + b)
            .with_kwargs(vec![("a", Value::undefined()), ("b", Value::from(0i64))]);
        assert_eq!(f.signature(), "add(a: int, b: int=0) -> int");

        let g = Function::new("len_of", |s: String| s.len() as i64);
        assert_eq!(g.signature(), "len_of(arg0: str) -> int");
    }

    #[test]
    fn named_wrapper_round_trip() {
        let v = named("key", 7i64);
        let na = v.get::<NamedArg>().unwrap();
        assert_eq!(na.name, "key");
        assert_eq!(na.value.as_int(), Some(7));
    }
}
