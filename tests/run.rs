//! Running targets: ordering, namespace steps, scoping and errors.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use architect::command::Command;
use architect::{
    Args, CommandError, CommandType, ConfigBag, EvalError, LoadError, Registry, ResolveError,
    RunContext, RunError, Scalar, Shape, ValidationErrorKind,
};
use common::{env_with, load, run, run_err};

#[test]
fn dependencies_run_first() {
    let lines = run(
        "target compile:\n    echo compiling\ntarget build depends compile:\n    echo linking\n",
        &["build"],
    );
    assert_eq!(lines, ["compiling", "linking"]);
}

#[test]
fn namespace_steps_wrap_targets() {
    let lines = run(
        "set who \"world\"\necho \"pre\"\ntarget compile:\n    echo \"compile\" (var who)\ntarget build depends compile:\n    echo \"build\"\necho \"post\"\n",
        &["build"],
    );
    assert_eq!(lines, ["pre", "compile world", "build", "post"]);
}

#[test]
fn ties_break_by_declaration_order() {
    let lines = run(
        "target c:\n    echo c\ntarget a:\n    echo a\ntarget b:\n    echo b\ntarget all depends b a c:\n    echo all\n",
        &["all"],
    );
    assert_eq!(lines, ["c", "a", "b", "all"]);
}

#[test]
fn shared_dependency_runs_once() {
    let lines = run(
        "target base:\n    echo base\ntarget left depends base:\n    echo left\ntarget right depends base:\n    echo right\n",
        &["left", "right"],
    );
    assert_eq!(lines, ["base", "left", "right"]);
}

#[test]
fn requesting_a_target_twice_runs_it_once() {
    let lines = run("target a:\n    echo a\n", &["a", "a"]);
    assert_eq!(lines, ["a"]);
}

// -----------------------------------------------------------
// Resolution errors happen before anything runs.
// -----------------------------------------------------------

#[test]
fn unknown_dependency() {
    let (err, lines) = run_err(
        "echo \"pre\"\ntarget build depends missing:\n    echo build\n",
        &["build"],
    );
    assert!(matches!(
        err,
        RunError::Resolve(ResolveError::UnknownTarget { ref name, ref referenced_by })
            if name == "missing" && referenced_by.as_deref() == Some("build")
    ));
    assert!(lines.is_empty());
}

#[test]
fn unknown_requested_target() {
    let (err, _) = run_err("target a:\n    echo a\n", &["nope"]);
    assert!(matches!(
        err,
        RunError::Resolve(ResolveError::UnknownTarget { referenced_by: None, .. })
    ));
}

#[test]
fn dependency_cycle_lists_members() {
    let (err, lines) = run_err(
        "target a depends b:\n    echo a\ntarget b depends a:\n    echo b\n",
        &["a"],
    );
    let RunError::Resolve(ResolveError::DependencyCycle { members }) = err else {
        panic!("expected a cycle, got {err}");
    };
    assert_eq!(members, ["a", "b"]);
    assert!(lines.is_empty());
}

#[test]
fn self_dependency_is_a_cycle() {
    let (err, _) = run_err("target a depends a:\n    echo a\n", &["a"]);
    assert!(matches!(
        err,
        RunError::Resolve(ResolveError::DependencyCycle { ref members }) if members == &["a"]
    ));
}

// -----------------------------------------------------------
// Scoping.
// -----------------------------------------------------------

#[test]
fn target_locals_do_not_leak() {
    let (err, lines) = run_err(
        "target a:\n    set secret 1\n    echo (var secret)\ntarget b depends a:\n    echo (var secret)\n",
        &["b"],
    );
    assert_eq!(lines, ["1"]);
    let RunError::Eval { target, source, .. } = err else {
        panic!("expected an evaluation error, got {err}");
    };
    assert_eq!(target.as_deref(), Some("b"));
    assert_eq!(
        source,
        EvalError::UnresolvedName {
            name: "secret".to_string()
        }
    );
}

#[test]
fn superlocals_name_the_running_target() {
    let lines = run(
        "target build:\n    echo (var target) (var namespace)\n",
        &["build"],
    );
    assert_eq!(lines, ["build architect"]);
}

#[test]
fn globals_are_shadowed_locally() {
    let (mut env, capture) = env_with(Registry::default(), &[]);
    env.define("mode", Scalar::Text("release".to_string()));
    let script = env
        .load_str(
            "architect",
            "target a:\n    set mode \"debug\"\n    echo (var mode)\ntarget b depends a:\n    echo (var mode)\n",
        )
        .expect("load");
    env.run(&script, "b").expect("run");
    assert_eq!(capture.lines(), ["debug", "release"]);
}

#[test]
fn arithmetic_and_assignment() {
    let lines = run(
        "set base 40\ntarget a:\n    assign n (add base 2)\n    echo (var n) (sub n 50) (add \"v\" n)\n",
        &["a"],
    );
    assert_eq!(lines, ["42 -8 v42"]);
}

#[test]
fn nested_namespaces_see_outer_frames() {
    let lines = run(
        "set level \"outer\"\nset shared \"root\"\nnamespace tools:\n    set level \"inner\"\n    target fmt:\n        echo (var level) (var shared) (var namespace)\ntarget build depends \"tools.fmt\":\n    echo (var level)\n",
        &["build"],
    );
    assert_eq!(lines, ["inner root tools", "outer"]);
}

#[test]
fn post_steps_run_in_reverse_entry_order() {
    let lines = run(
        "echo \"root pre\"\nnamespace inner:\n    echo \"inner pre\"\n    target t:\n        echo t\n    echo \"inner post\"\ntarget main depends \"inner.t\":\n    echo main\necho \"root post\"\n",
        &["main"],
    );
    assert_eq!(
        lines,
        ["root pre", "inner pre", "t", "main", "inner post", "root post"]
    );
}

#[test]
fn imported_namespaces_keep_their_own_frames() {
    let (mut env, capture) = env_with(
        Registry::default(),
        &[(
            "common",
            "set cc \"gcc\"\ntarget lib:\n    echo \"lib\" (var cc)\n",
        )],
    );
    let script = env
        .load_str(
            "architect",
            "use common\ntarget app depends lib:\n    echo \"app\"\ntarget leak depends lib:\n    echo (var cc)\n",
        )
        .expect("load");
    env.run(&script, "app").expect("run app");
    assert_eq!(capture.lines(), ["lib gcc", "app"]);

    let err = env.run(&script, "leak").unwrap_err();
    assert!(matches!(err, RunError::Eval { .. }));
}

#[test]
fn runs_are_independent() {
    let (env, script, capture) = load("set n 1\ntarget a:\n    echo (var n)\n");
    env.run(&script, "a").expect("first run");
    env.run(&script, "a").expect("second run");
    assert_eq!(capture.lines(), ["1", "1"]);
}

// -----------------------------------------------------------
// Parallel mode.
// -----------------------------------------------------------

const DIAMOND: &str = "set tag \"x\"\ntarget base:\n    echo base\ntarget left depends base:\n    echo left (var tag)\ntarget right depends base:\n    echo right (var tag)\ntarget top depends left right:\n    echo top\necho done\n";

#[test]
fn parallel_respects_dependencies() {
    let (env, script, capture) = load(DIAMOND);
    env.run_parallel(&script, &["top"], 2).expect("run");
    let lines = capture.lines();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0], "base");
    let mut middle = lines[1..3].to_vec();
    middle.sort();
    assert_eq!(middle, ["left x", "right x"]);
    assert_eq!(lines[3], "top");
    assert_eq!(lines[4], "done");
}

#[test]
fn parallel_stops_after_failure() {
    let (env, script, capture) = load(
        "target bad:\n    echo (var missing)\ntarget after depends bad:\n    echo after\n",
    );
    let err = env
        .run_parallel(&script, &["after"], 4)
        .unwrap_err();
    assert!(matches!(err, RunError::Eval { .. }));
    assert!(capture.lines().is_empty());
}

#[test]
fn parallel_failure_skips_unstarted_siblings() {
    // With one worker the wave runs in declaration order, so `ok` has
    // not started when `bad` fails.
    let (env, script, capture) = load(
        "target bad:\n    echo (var missing)\ntarget ok:\n    echo ok\ntarget top depends bad ok:\n    echo top\n",
    );
    let err = env.run_parallel(&script, &["top"], 1).unwrap_err();
    assert!(matches!(err, RunError::Eval { ref target, .. } if target.as_deref() == Some("bad")));
    assert!(capture.lines().is_empty());
}

#[test]
fn parallel_reports_resolution_errors() {
    let (env, script, _) = load("target a depends b:\n    echo a\ntarget b depends a:\n    echo b\n");
    assert!(matches!(
        env.run_parallel(&script, &["a"], 2),
        Err(RunError::Resolve(ResolveError::DependencyCycle { .. }))
    ));
}

// -----------------------------------------------------------
// Custom commands and the configure hook.
// -----------------------------------------------------------

#[derive(Clone, Default)]
struct ToolType {
    configured: Arc<AtomicUsize>,
}

#[derive(Debug)]
struct Tool {
    name: String,
}

impl CommandType for ToolType {
    fn shape(&self) -> Shape {
        Shape {
            positional: &[architect::ArgumentType::String],
            ..Shape::EMPTY
        }
    }

    fn configure(&self, values: Option<ConfigBag>) -> Result<Option<ConfigBag>, CommandError> {
        self.configured.fetch_add(1, Ordering::SeqCst);
        let mut values = values.unwrap_or_default();
        values.insert("path".to_string(), "/opt/tool".to_string());
        Ok(Some(values))
    }

    fn build(&self, args: Args) -> Result<Box<dyn Command>, ValidationErrorKind> {
        let name = args
            .positional
            .first()
            .and_then(architect::types::Arg::as_text)
            .ok_or_else(|| ValidationErrorKind::NotLiteral("tool".to_string()))?;
        Ok(Box::new(Tool {
            name: name.to_string(),
        }))
    }
}

impl Command for Tool {
    fn run(&self, ctx: &mut RunContext<'_, '_>) -> Result<(), CommandError> {
        if self.name == "fail" {
            return Err(CommandError::Failed("tool exited with status 1".to_string()));
        }
        let target = ctx.target().unwrap_or("-").to_string();
        ctx.bind("last_tool", Scalar::Text(self.name.clone()));
        ctx.output().line(&format!("{target}: {}", self.name))?;
        Ok(())
    }
}

#[test]
fn configure_runs_once_per_type() {
    let tool = ToolType::default();
    let mut registry = Registry::default();
    assert!(registry.register("tool", tool.clone()));
    let (mut env, capture) = env_with(registry, &[]);
    let script = env
        .load_str(
            "architect",
            "target a:\n    tool cc\n    tool ld\n    echo (var last_tool)\ntarget b:\n    tool ar\n",
        )
        .expect("load");
    assert_eq!(tool.configured.load(Ordering::SeqCst), 1);

    env.run_all(&script, &["a", "b"]).expect("run");
    assert_eq!(capture.lines(), ["a: cc", "a: ld", "ld", "b: ar"]);

    let config = env.into_config();
    assert!(config.is_configured("tool"));
    assert_eq!(
        config.bag("tool").and_then(|b| b.get("path")).map(String::as_str),
        Some("/opt/tool")
    );
}

#[test]
fn command_failures_carry_context() {
    let mut registry = Registry::default();
    registry.register("tool", ToolType::default());
    let (mut env, _) = env_with(registry, &[]);
    let script = env
        .load_str("architect", "target a:\n    echo ok\n    tool fail\n")
        .expect("load");
    let err = env.run(&script, "a").unwrap_err();
    let RunError::Command {
        target, node, span, ..
    } = &err
    else {
        panic!("expected a command error, got {err}");
    };
    assert_eq!(target.as_deref(), Some("a"));
    assert_eq!(node, "tool");
    assert_eq!(span.line, 3);
    assert!(err.to_string().contains("status 1"));
}

#[test]
fn configure_failure_stops_loading() {
    struct Broken;

    impl CommandType for Broken {
        fn shape(&self) -> Shape {
            Shape::EMPTY
        }

        fn configure(&self, _: Option<ConfigBag>) -> Result<Option<ConfigBag>, CommandError> {
            Err(CommandError::Failed("no compiler found".to_string()))
        }

        fn build(&self, _: Args) -> Result<Box<dyn Command>, ValidationErrorKind> {
            Err(ValidationErrorKind::UnexpectedArgument("broken".to_string()))
        }
    }

    let mut registry = Registry::default();
    registry.register("broken", Broken);
    let (mut env, _) = env_with(registry, &[]);
    let err = env.load_str("architect", "broken\n").unwrap_err();
    assert!(matches!(
        err,
        LoadError::Build(architect::BuildError::Configure { ref name, .. }) if name == "broken"
    ));
}

#[test]
fn run_str_reports_each_stage() {
    architect::run_str("target default:\n    set x 1\n", &["default"]).expect("run");
    assert!(matches!(
        architect::run_str("target a:\n  echo (\n", &["a"]),
        Err(architect::Error::Load(LoadError::Syntax(_)))
    ));
    assert!(matches!(
        architect::run_str("target a:\n    set x 1\n", &["b"]),
        Err(architect::Error::Run(RunError::Resolve(_)))
    ));
}

#[test]
fn long_argument_lines_run() {
    let words = vec!["w"; 5_000];
    let source = format!("target a:\n    echo {}\n", words.join(" "));
    let lines = run(&source, &["a"]);
    assert_eq!(lines, [words.join(" ")]);
}
