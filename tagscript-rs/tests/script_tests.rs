/// End-to-end tests: scripts driven through the public [`Scheduler`] API, and
/// script files run through the `tagscript` binary.
///
/// Each library case is a set of named scripts, the first of which is started;
/// the binary cases write scripts to a temporary directory and check stdout.
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;

use tagscript::{DebugMode, Engine, EngineConfig, ExecutionMode, QueueStatus, Scheduler, Value};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn scheduler(mode: ExecutionMode, scripts: &[(&str, &str)]) -> Scheduler {
    let engine = Engine::new(EngineConfig { execution: mode, ..EngineConfig::default() });
    for (name, src) in scripts {
        engine.load(name, src).unwrap_or_else(|e| panic!("{name}: {e}"));
    }
    Scheduler::new(Rc::new(engine))
}

/// Run the first script to completion in both modes; return its output.
fn run_all(scripts: &[(&str, &str)]) -> Vec<String> {
    let mut outputs = Vec::new();
    for mode in [ExecutionMode::Interpret, ExecutionMode::Compile] {
        let mut sched = scheduler(mode, scripts);
        sched.create_queue_named(scripts[0].0).expect("main script");
        let mut lines = Vec::new();
        for _ in 0..100 {
            if !sched.has_live() {
                break;
            }
            sched.advance_all(0.1);
            lines.extend(sched.drain_all_output().into_iter().map(|(_, l)| l));
        }
        assert!(!sched.has_live(), "{mode:?}: queues still live");
        outputs.push(lines);
    }
    assert_eq!(outputs[0], outputs[1], "modes disagree");
    outputs.swap_remove(0)
}

fn run(src: &str) -> Vec<String> {
    run_all(&[("main", src)])
}

// ── Tags ──────────────────────────────────────────────────────────────────────

#[test]
fn text_and_number_tags() {
    assert_eq!(run("echo <{text[hello].to_upper}> <{text[hello].length}>"), ["HELLO 5"]);
    assert_eq!(run("echo <{number[2.5].add[1].multiply[2]}>"), ["7"]);
    assert_eq!(run("echo <{integer[7].modulo[3]}> <{integer[7].divide[2]}>"), ["1 3"]);
}

#[test]
fn list_tags() {
    let out = run("define l <{list[a|b|c]}>\necho <{var[l].size}> <{var[l].first}> <{var[l].last}> <{var[l].get[2]}>");
    assert_eq!(out, ["3 a c b"]);
    assert_eq!(run("echo <{list[a|b].include[c].join[-]}>"), ["a-b-c"]);
}

#[test]
fn binary_tags() {
    assert_eq!(run("echo <{binary[6869].to_utf8}> <{binary[6869].length}>"), ["hi 2"]);
}

#[test]
fn fallback_hides_errors() {
    assert_eq!(run("echo <{var[nope] || fine}>"), ["fine"]);
    assert_eq!(run("echo <{list[a].get[5] || none}>"), ["none"]);
}

#[test]
fn unknown_starter_renders_raw() {
    assert_eq!(run("echo <{nonsense[x]}>"), ["nonsense[x]"]);
}

#[test]
fn huge_repeat_counts_are_rejected() {
    let out = run("repeat <{number[1e30]}> { repeat stop }\necho after");
    assert_eq!(out.len(), 1, "{out:?}");
    assert!(out[0].starts_with("main:1: '"), "{out:?}");
    assert!(out[0].ends_with("' is not a valid repeat count"), "{out:?}");
}

#[test]
fn integer_overflow_reports() {
    let out = run("echo <{integer[9223372036854775807].add[1] || overflow}>");
    assert_eq!(out, ["overflow"]);
}

// ── Commands ──────────────────────────────────────────────────────────────────

#[test]
fn fizzbuzz() {
    let src = "repeat 15 i {\n\
                 if <{var[i].modulo[15]}> == 0 { echo FizzBuzz }\n\
                 else if <{var[i].modulo[3]}> == 0 { echo Fizz }\n\
                 else if <{var[i].modulo[5]}> == 0 { echo Buzz }\n\
                 else { echo <{var[i]}> }\n\
               }";
    let out = run(src);
    assert_eq!(out.len(), 15);
    assert_eq!(out[2], "Fizz");
    assert_eq!(out[4], "Buzz");
    assert_eq!(out[14], "FizzBuzz");
    assert_eq!(out[6], "7");
}

#[test]
fn call_registered_script() {
    let out = run_all(&[("main", "call helper who=x\necho back"), ("helper", "echo helping <{var[who]}>")]);
    assert_eq!(out, ["helping x", "back"]);
}

#[test]
fn quoted_assignment_values() {
    let out = run_all(&[("main", "call helper who=\"bob smith\""), ("helper", "echo hello <{var[who]}>")]);
    assert_eq!(out, ["hello bob smith"]);
}

#[test]
fn run_and_wait_for_child() {
    let out = run_all(&[("main", "&run child\necho joined"), ("child", "echo c1\nwait 0.2\necho c2")]);
    assert_eq!(out, ["c1", "c2", "joined"]);
}

#[test]
fn run_without_waiting() {
    let out = run_all(&[("main", "run child\necho parent"), ("child", "echo child")]);
    assert_eq!(out, ["parent", "child"]);
}

#[test]
fn unknown_script_is_an_error() {
    assert_eq!(run("run ghost\necho x"), ["main:1: unknown script 'ghost'"]);
}

#[test]
fn unknown_command_is_an_error() {
    assert_eq!(run("frobnicate now\necho x"), ["main:1: Unknown command 'frobnicate'"]);
}

// ── Scheduling ────────────────────────────────────────────────────────────────

#[test]
fn wait_spans_ticks() {
    let mut sched = scheduler(ExecutionMode::Interpret, &[("main", "echo a\nwait 0.5\necho b")]);
    let id = sched.create_queue_named("main").unwrap();

    sched.advance_all(0.25);
    assert_eq!(sched.take_output(id), ["a"]);
    assert_eq!(sched.queue(id).unwrap().status(), QueueStatus::WaitingOnTimer);

    sched.advance_all(0.25);
    assert!(sched.take_output(id).is_empty());

    sched.advance_all(0.25);
    assert_eq!(sched.take_output(id), ["b"]);
    assert!(!sched.is_live(id));
}

#[test]
fn queues_share_nothing_but_the_engine() {
    let mut sched = scheduler(ExecutionMode::Compile, &[("main", "define x <{var[x].add[1] || 1}>\nfunction f { echo f }")]);
    let a = sched.create_queue_named("main").unwrap();
    let b = sched.create_queue_named("main").unwrap();
    sched.advance_all(0.1);
    for id in [a, b] {
        let x = sched.queue(id).unwrap().var("x").map(Value::to_string);
        assert_eq!(x.as_deref(), Some("1"));
    }
    assert!(sched.engine().function("f").is_some());
}

#[test]
fn stop_all_completes_everything() {
    let mut sched = scheduler(ExecutionMode::Interpret, &[("main", "wait 10")]);
    let ids: Vec<_> = (0..3).map(|_| sched.create_queue_named("main").unwrap()).collect();
    sched.advance_all(0.1);
    assert_eq!(sched.live_count(), 3);
    sched.stop_all();
    assert!(!sched.has_live());
    for id in ids {
        assert!(sched.queue(id).unwrap().is_completed());
    }
}

#[test]
fn debug_none_silences_errors() {
    let engine = Engine::new(EngineConfig { default_debug: DebugMode::None, ..EngineConfig::default() });
    engine.load("main", "error quiet").unwrap();
    let mut sched = Scheduler::new(Rc::new(engine));
    let id = sched.create_queue_named("main").unwrap();
    sched.advance_all(0.1);
    assert!(sched.take_output(id).is_empty());
}

// ── Binary ────────────────────────────────────────────────────────────────────

/// Path to the `tagscript` binary built by this Cargo workspace.
fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_tagscript"))
}

fn write(dir: &Path, name: &str, src: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, src).expect("write script");
    path
}

/// Run the binary with `-f` (no rc file) and a 1ms tick.
fn run_binary(args: &[&Path], extra: &[&str]) -> (i32, String, String) {
    let out = Command::new(binary())
        .args(["-f", "-t", "1"])
        .args(extra)
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to spawn tagscript binary");
    (
        out.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&out.stdout).into_owned(),
        String::from_utf8_lossy(&out.stderr).into_owned(),
    )
}

#[test]
fn binary_runs_first_script() {
    let dir = tempfile::tempdir().unwrap();
    let main = write(dir.path(), "main.tag", "repeat 3 i { echo line <{var[i]}> }\ncall lib\nwait 0.01\necho end");
    let lib = write(dir.path(), "lib.tag", "echo from lib");
    let (code, stdout, stderr) = run_binary(&[&main, &lib], &[]);
    assert_eq!(code, 0, "stderr: {stderr}");
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, ["line 1", "line 2", "line 3", "from lib", "end"]);
}

#[test]
fn binary_compiled_mode_matches() {
    let dir = tempfile::tempdir().unwrap();
    let main = write(dir.path(), "main.tag", "foreach a|b item { echo <{var[item].to_upper}> }");
    let (_, interpreted, _) = run_binary(&[&main], &[]);
    let (code, compiled, _) = run_binary(&[&main], &["-c"]);
    assert_eq!(code, 0);
    assert_eq!(interpreted, compiled);
    assert_eq!(compiled.lines().collect::<Vec<_>>(), ["A", "B"]);
}

#[test]
fn binary_reports_parse_errors() {
    let dir = tempfile::tempdir().unwrap();
    let main = write(dir.path(), "bad.tag", "repeat 2 {\necho never");
    let (code, stdout, stderr) = run_binary(&[&main], &[]);
    assert_eq!(code, 1);
    assert!(stdout.is_empty());
    assert!(!stderr.is_empty());
}

#[test]
fn binary_usage_errors() {
    let out = Command::new(binary()).output().expect("spawn");
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Usage"));
}

#[test]
fn binary_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run_binary(&[&dir.path().join("absent.tag")], &[]);
    assert_eq!(code, 1);
    assert!(!stderr.is_empty());
}
