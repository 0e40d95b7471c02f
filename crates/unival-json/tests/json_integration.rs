use unival_core::{Kind, Value};
use unival_json::{dump, dump_pretty, parse};

// ============================================================================
// Round trips
// ============================================================================

fn build_document() -> Value {
    let root = Value::object_empty();
    root.set("name", Value::from("unival"), false).unwrap();
    root.set("version", Value::from(2i64), false).unwrap();
    root.set("pi", Value::from(3.25f64), false).unwrap();
    root.set("flags", Value::array(vec![
        Value::from(true),
        Value::from(false),
        Value::null(),
    ]), false)
    .unwrap();
    let nested = Value::object_empty();
    nested
        .set("path", Value::from("a/b \"quoted\"\n"), false)
        .unwrap();
    root.set("meta", nested, false).unwrap();
    root
}

#[test]
fn test_round_trip_preserves_structure() {
    let doc = build_document();
    let text = dump(&doc);
    let back = parse(&text).unwrap();
    assert!(doc.deep_eq(&back));
    // A second pass produces byte-identical output.
    assert_eq!(dump(&back), text);
}

#[test]
fn test_pretty_and_compact_parse_to_the_same_value() {
    let doc = build_document();
    let compact = parse(&dump(&doc)).unwrap();
    let pretty = parse(&dump_pretty(&doc, 4)).unwrap();
    assert!(compact.deep_eq(&pretty));
}

#[test]
fn test_document_survives_a_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");

    let doc = build_document();
    std::fs::write(&path, dump_pretty(&doc, 2)).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    let back = parse(&text).unwrap();
    assert!(doc.deep_eq(&back));
}

#[test]
fn test_integers_and_floats_stay_distinct() {
    let v = parse(r#"{"count": 7, "ratio": 7.0}"#).unwrap();
    let count = v.index(&Value::from("count")).unwrap();
    let ratio = v.index(&Value::from("ratio")).unwrap();
    assert_eq!(count.kind(), Kind::Integer);
    assert_eq!(ratio.kind(), Kind::Float);

    let text = dump(&v);
    assert_eq!(text, r#"{"count":7,"ratio":7.0}"#);
    let back = parse(&text).unwrap();
    assert_eq!(back.index(&Value::from("count")).unwrap().kind(), Kind::Integer);
    assert_eq!(back.index(&Value::from("ratio")).unwrap().kind(), Kind::Float);
}

#[test]
fn test_float_values_survive_the_text_form() {
    for &d in &[0.1f64, -0.5, 2.0, 1e20, 1e-7, f64::MAX, f64::MIN_POSITIVE] {
        let text = dump(&Value::from(d));
        let back = parse(&text).unwrap();
        assert_eq!(back.as_float(), Some(d), "text was {text}");
    }
}

#[test]
fn test_keys_are_emitted_sorted() {
    let v = parse(r#"{"zeta":1,"alpha":2,"mid":3}"#).unwrap();
    assert_eq!(dump(&v), r#"{"alpha":2,"mid":3,"zeta":1}"#);
}

// ============================================================================
// Lenient input forms
// ============================================================================

#[test]
fn test_configuration_style_input() {
    let text = r#"
        // window placement
        {
            width: 640,
            height: 480, /* device pixels */
            title: untitled
        }
    "#;
    let v = parse(text).unwrap();
    assert_eq!(v.index(&Value::from("width")).unwrap().as_int(), Some(640));
    assert_eq!(
        v.index(&Value::from("title")).unwrap().as_str(),
        Some("untitled")
    );

    // The lenient forms normalize to strict output.
    assert_eq!(
        dump(&v),
        r#"{"height":480,"title":"untitled","width":640}"#
    );
}

#[test]
fn test_surrogate_pair_escapes_decode() {
    let v = parse(r#""😀""#).unwrap();
    assert_eq!(v.as_str(), Some("\u{1f600}"));
    // The astral character re-parses from whichever form dump emits.
    let back = parse(&dump(&v)).unwrap();
    assert_eq!(back.as_str(), v.as_str());
}

#[test]
fn test_unicode_escapes_round_trip() {
    let v = parse(r#""line sep 😀""#).unwrap();
    assert_eq!(v.as_str(), Some("line\u{2028}sep 😀"));
    let text = dump(&v);
    assert!(text.contains("\\u2028"));
    let back = parse(&text).unwrap();
    assert_eq!(back.as_str(), v.as_str());
}

// ============================================================================
// Limits and failures
// ============================================================================

#[test]
fn test_deep_nesting_round_trips_under_the_limit() {
    let mut text = String::new();
    for _ in 0..150 {
        text.push('[');
    }
    text.push('1');
    for _ in 0..150 {
        text.push(']');
    }
    let v = parse(&text).unwrap();
    assert_eq!(dump(&v), text);
}

#[test]
fn test_parse_errors_carry_offsets() {
    let err = parse("{\"a\": 1,}").unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("parse error at byte"), "unexpected message: {msg}");

    assert!(parse("").is_err());
    assert!(parse("[1, 2] trailing").is_err());
    assert!(parse("\"unterminated").is_err());
}
