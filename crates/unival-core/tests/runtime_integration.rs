use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use unival_core::{
    create_class, instance, named, ClassBuilder, Function, Kind, Value, VarError, VarResult,
};

// ============================================================================
// Dynamic classes
// ============================================================================

fn person_class() -> Value {
    create_class("Person")
        .doc("a named person with an age")
        .def(
            "__init__",
            |self_: Value, age: i64, name: String| -> VarResult<()> {
                self_.set("age", Value::from(age), false)?;
                self_.set("name", Value::from(name), false)?;
                Ok(())
            },
        )
        .def("intro", |self_: Value| -> VarResult<String> {
            let name = self_.get_or("name", Value::undefined(), false)?;
            let age = self_.get_or("age", Value::undefined(), false)?;
            Ok(format!("{} is {}", name.cast::<String>()?, age.cast::<i64>()?))
        })
        .build()
}

#[test]
fn test_dynamic_class_constructs_objects() {
    let person = person_class();
    let tom = person
        .invoke(vec![Value::from(20i64), Value::from("Tom")])
        .unwrap();

    assert_eq!(tom.kind(), Kind::Object);
    assert!(tom.class_value().value_eq(&person));
    assert_eq!(
        tom.call_method("intro", vec![]).unwrap().as_str(),
        Some("Tom is 20")
    );
    assert_eq!(
        tom.index(&Value::from("age")).unwrap().as_int(),
        Some(20)
    );
}

#[test]
fn test_dynamic_inheritance_dispatches_upward() {
    let person = person_class();
    let person_for_init = person.clone();
    let student = create_class("Student")
        .inherit_class(person.clone(), |v| Ok(v.clone()))
        .def(
            "__init__",
            move |self_: Value, age: i64, name: String, school: String| -> VarResult<()> {
                person_for_init.as_class().unwrap().call(
                    &self_,
                    "__init__",
                    vec![Value::from(age), Value::from(name)],
                )?;
                self_.set("school", Value::from(school), false)?;
                Ok(())
            },
        )
        .def("study", |self_: Value| -> VarResult<String> {
            let school = self_.get_or("school", Value::undefined(), false)?;
            Ok(format!("studies at {}", school.cast::<String>()?))
        })
        .build();

    let sara = student
        .invoke(vec![
            Value::from(18i64),
            Value::from("Sara"),
            Value::from("MIT"),
        ])
        .unwrap();

    assert_eq!(
        sara.call_method("study", vec![]).unwrap().as_str(),
        Some("studies at MIT")
    );
    // intro lives on the parent; the call is delegated with the upcast
    // instance.
    assert_eq!(
        sara.call_method("intro", vec![]).unwrap().as_str(),
        Some("Sara is 18")
    );
    assert!(sara.class_value().value_eq(&student));
}

#[test]
fn test_parents_searched_in_declaration_order() {
    let first = create_class("First")
        .def_attr("tag", Value::from("first"))
        .build();
    let second = create_class("Second")
        .def_attr("tag", Value::from("second"))
        .build();
    let both = create_class("Both")
        .inherit_class(first, |v| Ok(v.clone()))
        .inherit_class(second, |v| Ok(v.clone()))
        .build();

    let desc = both.as_class().unwrap();
    assert_eq!(desc.attr("tag").as_str(), Some("first"));
}

#[test]
fn test_shared_base_visited_once_per_parent() {
    let counter = Arc::new(AtomicUsize::new(0));
    let base = create_class("SharedBase").build();

    let c1 = counter.clone();
    let c2 = counter.clone();
    let left = create_class("Left")
        .inherit_class(base.clone(), move |v| {
            c1.fetch_add(1, Ordering::SeqCst);
            Ok(v.clone())
        })
        .build();
    let right = create_class("Right")
        .inherit_class(base.clone(), move |v| {
            c2.fetch_add(1, Ordering::SeqCst);
            Ok(v.clone())
        })
        .build();
    let diamond = create_class("Diamond")
        .inherit_class(left, |v| Ok(v.clone()))
        .inherit_class(right, |v| Ok(v.clone()))
        .build();

    let inst = Value::object_empty();
    let err = diamond
        .as_class()
        .unwrap()
        .call(&inst, "absent", vec![])
        .unwrap_err();
    assert!(matches!(err, VarError::Attribute { .. }));
    // Both paths to the shared base ran their upcast: no deduplication.
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Native classes
// ============================================================================

#[derive(Clone, PartialEq, Debug)]
struct Celsius {
    degrees: f64,
}

#[derive(Clone, PartialEq, Debug)]
struct Fridge {
    temperature: Celsius,
    label: String,
}

unival_core::native_value!(Celsius);
unival_core::native_value!(Fridge);

fn register_thermo() {
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(register_thermo_impl);
}

fn register_thermo_impl() {
    ClassBuilder::<Celsius>::new("Celsius")
        .def("degrees", |c: Celsius| c.degrees)
        .def("__str__", |c: Celsius| format!("{}C", c.degrees));
    ClassBuilder::<Fridge>::new("Fridge")
        .inherit::<Celsius, _>(|v| Ok(Value::new(v.get::<Fridge>()?.temperature.clone())))
        .def("label", |f: Fridge| f.label);
}

#[test]
fn test_native_class_upcast() {
    register_thermo();
    let fridge = Value::new(Fridge {
        temperature: Celsius { degrees: 4.0 },
        label: "kitchen".to_string(),
    });

    assert_eq!(
        fridge.call_method("label", vec![]).unwrap().as_str(),
        Some("kitchen")
    );
    // degrees is defined on the base; the upcast converter produces the
    // Celsius instance the base method runs on.
    assert_eq!(
        fridge.call_method("degrees", vec![]).unwrap().as_float(),
        Some(4.0)
    );
    assert_eq!(Value::new(Celsius { degrees: 4.0 }).to_string(), "4C");
}

#[test]
fn test_native_value_round_trip_through_functions() {
    register_thermo();
    let warmer = Function::new("warmer", |c: Celsius, by: f64| Celsius {
        degrees: c.degrees + by,
    });
    let out = warmer
        .call(vec![
            Value::new(Celsius { degrees: 20.0 }),
            Value::from(1.5f64),
        ])
        .unwrap();
    assert_eq!(out.cast::<Celsius>().unwrap(), Celsius { degrees: 21.5 });
}

#[derive(Clone)]
struct Gauge {
    level: f64,
}

unival_core::native_value!(Gauge);

#[test]
fn test_properties_read_through_index() {
    ClassBuilder::<Gauge>::new("Gauge").def_property(
        "level",
        Function::new("get_level", |g: Gauge| g.level),
        None,
        "current fill level",
    );

    let g = Value::new(Gauge { level: 0.75 });
    let got = g.index(&Value::from("level")).unwrap();
    assert_eq!(got.as_float(), Some(0.75));

    // No setter registered: writes are rejected.
    let err = g
        .set_index(Value::from("level"), Value::from(0.5f64))
        .unwrap_err();
    assert!(err.to_string().contains("read-only"));
}

// ============================================================================
// Overloads and keyword arguments through class dispatch
// ============================================================================

#[test]
fn test_method_overloads_on_a_class() {
    struct Calc;
    // Overloads are tried in registration order with trial-casting, so the
    // float overload is registered first; an int-first chain would accept a
    // float argument by truncating it through double.__int__.
    let class = ClassBuilder::<Calc>::new("Calc")
        .def_static("scale", |x: f64| x * 10.0)
        .def_static("scale", |x: i64| x * 10)
        .def_static("scale", |x: String| format!("{x}{x}"))
        .build();

    assert_eq!(
        class
            .call_method("scale", vec![Value::from(0.5f64)])
            .unwrap()
            .as_float(),
        Some(5.0)
    );
    // An int argument also lands on the first overload, via int.__double__.
    assert_eq!(
        class.call_method("scale", vec![Value::from(3i64)]).unwrap().as_float(),
        Some(30.0)
    );
    assert_eq!(
        class
            .call_method("scale", vec![Value::from("ab")])
            .unwrap()
            .as_str(),
        Some("abab")
    );

    struct Narrow;
    let narrow = ClassBuilder::<Narrow>::new("Narrow")
        .def_static("scale", |x: i64| x * 10)
        .def_static("scale", |x: f64| x * 10.0)
        .build();

    // With the int overload first, a float argument trial-casts through
    // double.__int__ and truncates rather than reaching the float overload.
    assert_eq!(
        narrow
            .call_method("scale", vec![Value::from(0.5f64)])
            .unwrap()
            .as_int(),
        Some(0)
    );

    let err = class
        .call_method("scale", vec![Value::array(vec![])])
        .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("no overload matched"));
    assert!(msg.contains("scale(arg0: str) -> str"));
}

#[test]
fn test_keyword_arguments_through_registration() {
    struct Greeter;
    let greet = Function::new("greet", |name: String, greeting: String| {
        format!("{greeting}, {name}")
    })
    .with_kwargs(vec![
        ("name", Value::undefined()),
        ("greeting", Value::from("hello")),
    ]);
    let class = ClassBuilder::<Greeter>::new("Greeter")
        .def_raw("greet", greet, false)
        .build();

    assert_eq!(
        class
            .call_method("greet", vec![Value::from("Ada")])
            .unwrap()
            .as_str(),
        Some("hello, Ada")
    );
    assert_eq!(
        class
            .call_method("greet", vec![named("greeting", "hi"), named("name", "Ada")])
            .unwrap()
            .as_str(),
        Some("hi, Ada")
    );
    assert!(class.call_method("greet", vec![]).is_err());
}

// ============================================================================
// Root instance and paths
// ============================================================================

#[test]
fn test_instance_holds_configuration_paths() {
    let root = instance();
    root.set("integration.window.width", Value::from(640i64), true)
        .unwrap();
    let width = root
        .get_or("integration.window.width", Value::from(0i64), true)
        .unwrap();
    assert_eq!(width.as_int(), Some(640));

    // A miss stores and returns the default.
    let height = root
        .get_or("integration.window.height", Value::from(480i64), true)
        .unwrap();
    assert_eq!(height.as_int(), Some(480));
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_container_mutation() {
    let shared = Value::array(vec![]);
    let counters = Value::object_empty();

    let threads: Vec<_> = (0..8)
        .map(|t| {
            let arr = shared.clone();
            let obj = counters.clone();
            std::thread::spawn(move || {
                for i in 0..100 {
                    if let Some(a) = arr.as_array() {
                        a.push(Value::from(i as i64));
                    }
                }
                obj.set(&format!("thread{t}"), Value::from(t as i64), false)
                    .unwrap();
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    assert_eq!(shared.len(), 800);
    assert_eq!(counters.len(), 8);
}

#[test]
fn test_class_registry_is_thread_safe() {
    struct Registered;
    let handles: Vec<_> = (0..8)
        .map(|_| std::thread::spawn(unival_core::class_of::<Registered>))
        .collect();
    let classes: Vec<Value> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for pair in classes.windows(2) {
        assert!(pair[0].value_eq(&pair[1]));
    }
}

// ============================================================================
// Copying
// ============================================================================

#[test]
fn test_clone_value_depth_for_objects() {
    let inner = Value::object_empty();
    inner.set("n", Value::from(1i64), false).unwrap();
    let outer = Value::object_empty();
    outer.set("inner", inner.clone(), false).unwrap();

    let deep = outer.clone_value(16);
    inner.set("n", Value::from(99i64), false).unwrap();

    let kept = deep
        .get_or("inner", Value::undefined(), false)
        .unwrap()
        .get_or("n", Value::undefined(), false)
        .unwrap();
    assert_eq!(kept.as_int(), Some(1));

    // Functions and classes always share through copies.
    let f = Value::function(Function::new("id", |v: Value| v));
    assert!(f.clone_value(4).is_function());
}
