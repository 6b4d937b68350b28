use asar_bridge::harness::{ScriptedDiagnostic, ScriptedEngine};
use asar_bridge::{invoke, Asar, NativePatchParams, PatchRequest};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::{json, Map, Value};

fn large_request() -> Value {
    let includes: Vec<String> = (0..64).map(|i| format!("lib/bank{:02}", i)).collect();
    let defines: Map<String, Value> = (0..256)
        .map(|i| (format!("DEF_{}", i), Value::String(i.to_string())))
        .collect();
    json!({
        "assemblyPath": "main.asm",
        "romSizeHint": 4 * 1024 * 1024,
        "includePaths": includes,
        "defines": defines,
        "generateChecksum": true,
    })
}

fn bench_marshal(c: &mut Criterion) {
    let value = large_request();
    c.bench_function("decode_and_build_4mib", |b| {
        b.iter(|| {
            let request = PatchRequest::decode(black_box(&value)).unwrap();
            let params = NativePatchParams::build(&request).unwrap();
            black_box(&params);
        })
    });
}

fn bench_invoke(c: &mut Criterion) {
    let request = PatchRequest::decode(&large_request()).unwrap();
    let engine = ScriptedEngine::new().with_output(vec![0xea; 512 * 1024]);
    c.bench_function("invoke_scripted", |b| {
        b.iter(|| {
            let mut params = NativePatchParams::build(&request).unwrap();
            black_box(invoke(&engine, &mut params));
        })
    });
}

fn bench_error_translation(c: &mut Criterion) {
    let errors: Vec<ScriptedDiagnostic> = (1..=100)
        .map(|line| {
            ScriptedDiagnostic::new("main.asm", line, "jsl Missing", "Elabel_not_found")
                .with_frame("macros.asm", line * 2, "%call()")
        })
        .collect();
    let asar = Asar::new(ScriptedEngine::new().failing_with(errors));
    asar.patch(&json!({ "assemblyPath": "main.asm", "romSizeHint": 1024 }))
        .unwrap();

    c.bench_function("errors_100x2_frames", |b| {
        b.iter(|| black_box(asar.errors()))
    });
}

criterion_group!(benches, bench_marshal, bench_invoke, bench_error_translation);
criterion_main!(benches);
