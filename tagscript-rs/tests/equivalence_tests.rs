/// Interpreted and compiled execution must be observably identical.
///
/// Every script in the corpus is driven through a [`Scheduler`] tick by tick
/// in both execution modes.  Output is collected per tick, with a marker line
/// between ticks, so a step that yields one tick early or late shows up as a
/// mismatch even when the final output agrees.
use std::collections::BTreeMap;
use std::rc::Rc;

use tagscript::{DebugMode, Engine, EngineConfig, ErrorMode, ExecutionMode, Scheduler, Value};

// ── Helpers ───────────────────────────────────────────────────────────────────

const DT: f64 = 0.25;
const MAX_TICKS: usize = 200;

struct Trace {
    lines: Vec<String>,
    vars: BTreeMap<String, Value>,
    ticks: usize,
}

fn trace(mode: ExecutionMode, error_mode: ErrorMode, scripts: &[(&str, &str)]) -> Trace {
    let config = EngineConfig { execution: mode, error_mode, default_debug: DebugMode::Full, ..EngineConfig::default() };
    let engine = Engine::new(config);
    for (name, src) in scripts {
        engine.load(name, src).unwrap_or_else(|e| panic!("{name}: {e}"));
    }
    let mut sched = Scheduler::new(Rc::new(engine));
    let main = sched.create_queue_named(scripts[0].0).expect("main script");

    let mut lines = Vec::new();
    let mut ticks = 0;
    while sched.has_live() && ticks < MAX_TICKS {
        sched.advance_all(DT);
        ticks += 1;
        lines.push(format!("-- tick {ticks}"));
        lines.extend(sched.drain_all_output().into_iter().map(|(id, line)| format!("{id} {line}")));
    }
    assert!(!sched.has_live(), "still running after {MAX_TICKS} ticks");

    let vars = sched
        .queue(main)
        .expect("retired main queue")
        .variables()
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.clone()))
        .collect();
    Trace { lines, vars, ticks }
}

fn check_with(error_mode: ErrorMode, scripts: &[(&str, &str)]) -> Trace {
    let interpreted = trace(ExecutionMode::Interpret, error_mode, scripts);
    let compiled = trace(ExecutionMode::Compile, error_mode, scripts);
    assert_eq!(
        interpreted.lines, compiled.lines,
        "\n--- output differs ---\nScripts:\n{scripts:#?}\nInterpreted:\n{:#?}\nCompiled:\n{:#?}",
        interpreted.lines, compiled.lines
    );
    assert_eq!(interpreted.vars, compiled.vars, "variables differ for:\n{scripts:#?}");
    assert_eq!(interpreted.ticks, compiled.ticks);
    interpreted
}

fn check(scripts: &[(&str, &str)]) -> Trace {
    check_with(ErrorMode::Strict, scripts)
}

// ── Corpus ────────────────────────────────────────────────────────────────────

#[test]
fn counters_and_arithmetic() {
    let t = check(&[(
        "main",
        "define total 0\n\
         repeat 10 i {\n\
           define total <{var[total].add[<{var[i]}>]}>\n\
         }\n\
         echo <{var[total]}>",
    )]);
    assert_eq!(t.vars["total"], Value::Integer(55));
}

#[test]
fn nested_loops_with_jumps() {
    check(&[(
        "main",
        "foreach <{list[a|b|c]}> letter {\n\
           repeat 4 n {\n\
             if <{var[n]}> == 2 { repeat next }\n\
             if <{var[n]}> == 4 { repeat stop }\n\
             echo <{var[letter]}><{var[n]}>\n\
           }\n\
           if <{var[letter]}> == b { foreach stop }\n\
         }\n\
         echo done",
    )]);
}

#[test]
fn while_with_waits_spans_ticks() {
    let t = check(&[(
        "main",
        "define n 0\n\
         while <{var[n]}> < 3 {\n\
           define n <{var[n].add[1]}>\n\
           echo n=<{var[n]}>\n\
           wait 0.5\n\
         }\n\
         echo finished",
    )]);
    assert!(t.ticks > 6, "waits should spread the loop over ticks, got {}", t.ticks);
}

#[test]
fn goto_loop() {
    check(&[(
        "main",
        "define i 0\n\
         mark again\n\
         define i <{var[i].add[1]}>\n\
         echo pass <{var[i]}>\n\
         if <{var[i]}> < 4 { goto again }\n\
         echo out",
    )]);
}

#[test]
fn try_catch_across_frames() {
    check(&[(
        "main",
        "function risky {\n\
           echo risky <{var[level]}>\n\
           if <{var[level]}> > 1 { error too deep }\n\
           call risky level=<{var[level].add[1]}>\n\
         }\n\
         try {\n\
           call risky level=0\n\
         } catch {\n\
           echo caught: <{var[error_message]}>\n\
         }\n\
         echo after",
    )]);
}

#[test]
fn tag_fallbacks_and_errors() {
    check(&[(
        "main",
        "echo <{var[missing] || default}>\n\
         echo <{var[missing]}>\n\
         echo <{text[Hello].to_upper.length}>\n\
         define l <{list[3|1|2]}>\n\
         echo <{var[l].reversed.join[,]}> <{var[l].get[9] || none}>\n\
         echo <{dynamic[<{integer[4]}>].add[1]}>",
    )]);
}

#[test]
fn strict_and_lenient_error_modes() {
    let src = [("main", "echo a\nerror boom\necho b\nbogus command\necho c")];
    let strict = check_with(ErrorMode::Strict, &src);
    assert!(!strict.lines.iter().any(|l| l.ends_with(" b")));
    let lenient = check_with(ErrorMode::Lenient, &src);
    assert!(lenient.lines.iter().any(|l| l.ends_with(" c")));
}

#[test]
fn lenient_failures_skip_guarded_blocks() {
    let t = check_with(
        ErrorMode::Lenient,
        &[(
            "main",
            "if maybe { echo if-body } else { echo else-body }\n\
             repeat <{text[x]}> { echo repeat-body }\n\
             while maybe { echo while-body }\n\
             define go true\n\
             while <{var[go]}> {\n\
               echo loop-body\n\
               define go maybe\n\
             }\n\
             echo end",
        )],
    );
    assert!(!t.lines.iter().any(|l| l.ends_with("if-body") || l.ends_with("repeat-body") || l.ends_with("while-body")));
    assert!(t.lines.iter().any(|l| l.ends_with("else-body")));
    assert_eq!(t.lines.iter().filter(|l| l.ends_with("loop-body")).count(), 1);
    assert!(t.lines.iter().any(|l| l.ends_with("main:5: 'maybe' is not a boolean")));
    assert!(t.lines.last().is_some_and(|l| l.ends_with(" end")));
}

#[test]
fn retest_errors_report_the_header_line() {
    let t = check(&[("main", "define go true\nwhile <{var[go]}> {\n undefine go\n echo x\n}")]);
    assert!(t.lines.iter().any(|l| l.ends_with("main:2: <{var[go]}>: variable 'go' is not defined")));
    assert!(!t.lines.iter().any(|l| l.contains("main:5:")));
}

#[test]
fn spawned_queues() {
    check(&[
        ("main", "run worker id=1\n&run worker id=2\necho joined\nrun worker id=3"),
        ("worker", "echo worker <{var[id]}> start\nwait 0.5\necho worker <{var[id]}> end"),
    ]);
}

#[test]
fn debug_modes_switch_per_frame() {
    check(&[(
        "main",
        "function quiet {\n debug none\n define hidden 1\n echo <{var[nope]}>\n}\n\
         define x 1\n\
         call quiet\n\
         debug minimal\n\
         define y 2\n\
         echo <{var[x]}><{var[y]}>",
    )]);
}

#[test]
fn if_else_ladders_inside_loops() {
    check(&[(
        "main",
        "repeat 6 i {\n\
           define m <{var[i].modulo[3]}>\n\
           if <{var[m]}> == 0 { echo fizz } else if <{var[m]}> == 1 { echo one } else { echo two }\n\
         }",
    )]);
}

#[test]
fn stop_inside_function() {
    let t = check(&[("main", "function halt {\n echo halting\n stop\n}\necho a\ncall halt\necho never")]);
    assert!(!t.lines.iter().any(|l| l.ends_with("never")));
}
