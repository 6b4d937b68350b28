//! The surface a scripting host sees: properties and methods by name,
//! values as JSON.

use asar_bridge::harness::{ScriptedDiagnostic, ScriptedEngine};
use asar_bridge::host::{METHODS, PROPERTIES};
use asar_bridge::{Asar, BridgeError};
use serde_json::{json, Value};

#[test]
fn scalar_properties_are_integers() {
    let asar = Asar::new(ScriptedEngine::new().with_version(10901, 303));
    assert_eq!(asar.property("version").unwrap(), json!(10901));
    assert_eq!(asar.property("apiVersion").unwrap(), json!(303));
    assert_eq!(asar.property("maxRomSize").unwrap(), json!(16 * 1024 * 1024));
}

#[test]
fn errors_property_uses_host_field_names() {
    let engine = ScriptedEngine::new().failing_with(vec![ScriptedDiagnostic::new(
        "main.asm",
        9,
        "lda Table,y",
        "Elabel_not_found",
    )
    .with_frame("lib/tables.asm", 2, "macro call")]);
    let asar = Asar::new(engine);
    let patched = asar
        .call("patch", &[json!({ "assemblyPath": "main.asm" })])
        .unwrap();
    assert_eq!(patched, Value::Bool(false));

    let errors = asar.property("errors").unwrap();
    let first = &errors[0];
    assert_eq!(first["filename"], "main.asm");
    assert_eq!(first["line"], 9);
    assert_eq!(first["block"], "lda Table,y");
    assert_eq!(first["errorName"], "Elabel_not_found");
    assert!(first["fullError"].as_str().unwrap().contains("main.asm:9"));
    assert!(first["rawError"].is_string());
    let frames = first["stackEntries"].as_array().unwrap();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1]["fullPath"], "/project/lib/tables.asm");
    assert_eq!(frames[1]["prettyPath"], "lib/tables.asm");
    assert_eq!(frames[1]["lineNumber"], 2);
    assert_eq!(frames[1]["details"], "macro call");
}

#[test]
fn reset_method_clears_errors_property() {
    let engine = ScriptedEngine::new().failing_with(vec![ScriptedDiagnostic::new(
        "main.asm", 1, "db", "Eerr",
    )]);
    let asar = Asar::new(engine);
    asar.call("patch", &[json!({ "assemblyPath": "main.asm" })])
        .unwrap();
    assert_eq!(asar.property("errors").unwrap().as_array().unwrap().len(), 1);
    assert_eq!(asar.call("reset", &[]).unwrap(), json!(true));
    assert_eq!(asar.property("errors").unwrap(), json!([]));
}

#[test]
fn patch_method_propagates_decode_errors() {
    let asar = Asar::new(ScriptedEngine::new());
    let err = asar.call("patch", &[json!({ "assemblyPath": null })]).unwrap_err();
    assert!(matches!(err, BridgeError::MissingOrInvalidField("assemblyPath")));
}

#[test]
fn list_properties_serialize_records() {
    let engine = ScriptedEngine::new()
        .with_prints(vec!["hello".into()])
        .with_labels(vec![("Main".into(), 0x808000)]);
    let asar = Asar::new(engine);
    asar.call(
        "patch",
        &[json!({ "assemblyPath": "main.asm", "defines": { "LEVEL": "3" } })],
    )
    .unwrap();
    assert_eq!(asar.property("prints").unwrap(), json!(["hello"]));
    assert_eq!(
        asar.property("labels").unwrap(),
        json!([{ "name": "Main", "location": 0x808000 }])
    );
    assert_eq!(
        asar.property("defines").unwrap(),
        json!([{ "name": "LEVEL", "value": "3" }])
    );
    assert_eq!(asar.property("warnings").unwrap(), json!([]));
}

#[test]
fn surface_lists_are_complete() {
    let asar = Asar::new(ScriptedEngine::new());
    for name in PROPERTIES {
        asar.property(name).unwrap();
    }
    for name in METHODS {
        let args = [json!({ "assemblyPath": "main.asm" })];
        asar.call(name, &args).unwrap();
    }
}
