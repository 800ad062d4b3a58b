#![allow(dead_code)]

use std::sync::Arc;

use architect::{Capture, Environment, LoadError, MemoryLoader, Registry, RunError, Script, format, parse};

pub fn roundtrip(input: &str) {
    let nodes = parse(input).expect("parse failed");
    let output = format(&nodes);
    assert_eq!(
        output, input,
        "round-trip mismatch:\n--- expected ---\n{input}\n--- got ---\n{output}"
    );
}

/// Environment over in-memory `files`, capturing output.
pub fn env_with(registry: Registry, files: &[(&str, &str)]) -> (Environment, Arc<Capture>) {
    let loader = files
        .iter()
        .fold(MemoryLoader::new(), |loader, (name, source)| loader.with(name, source));
    let capture = Arc::new(Capture::default());
    let env = Environment::new(registry)
        .with_loader(loader)
        .with_output(capture.clone());
    (env, capture)
}

pub fn load(source: &str) -> (Environment, Script, Arc<Capture>) {
    let (mut env, capture) = env_with(Registry::default(), &[]);
    let script = env.load_str("architect", source).expect("script should load");
    (env, script, capture)
}

pub fn load_err(source: &str) -> LoadError {
    let (mut env, _) = env_with(Registry::default(), &[]);
    env.load_str("architect", source)
        .expect_err("script should not load")
}

/// Run `targets` and return the captured lines.
pub fn run(source: &str, targets: &[&str]) -> Vec<String> {
    let (env, script, capture) = load(source);
    env.run_all(&script, targets).expect("run should succeed");
    capture.lines()
}

/// Run `targets`, expecting failure; returns the error and the lines
/// printed before it.
pub fn run_err(source: &str, targets: &[&str]) -> (RunError, Vec<String>) {
    let (env, script, capture) = load(source);
    let err = env
        .run_all(&script, targets)
        .expect_err("run should fail");
    (err, capture.lines())
}
