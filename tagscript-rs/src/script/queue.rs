//! Script instances and the tick loop.
//!
//! A [`Queue`] is one running instance of a script: a stack of [`Frame`]s,
//! a flat variable namespace shared by every frame, and a suspension state.
//! [`Queue::advance`] is called once per scheduler tick and runs steps until
//! the stack empties or a step suspends:
//!
//! ```text
//! Idle ──start──▶ Running ──▶ WaitingOnTimer ───(delay elapsed)──▶ Running
//!                    │    └──▶ WaitingOnExternal ─(latch cleared)─▶ Running
//!                    └──(stack empty / stop)──▶ Completed
//! ```
//!
//! Commands steer execution by moving the frame cursor through [`Exec`].
//! The cursor always names the step considered *done*: after a step returns
//! [`Flow::Continue`] the cursor advances by one, so a command that wants to
//! run step `k` next sets the cursor to `k - 1` (in practice to a block
//! header or continuation, which is exactly what the flow commands need).

use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

use indexmap::IndexMap;
use log::{debug, trace, warn};

use crate::config::{DebugMode, ErrorMode, ExecutionMode};

use super::command::{CommandEntry, CommandError, ErrorKind, Flow, VarRef};
use super::compile::CompiledProcedure;
use super::engine::{Engine, Script};
use super::eval::{eval_argument, eval_condition, lex_condition, TagContext};
use super::tag::Argument;
use super::value::Value;

/// Set by an outstanding `&run`, cleared when the child queue completes.
pub type Latch = Rc<Cell<bool>>;

/// Variable `catch` stores the caught error message in.
pub const ERROR_MESSAGE_VAR: &str = "error_message";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Idle,
    Running,
    WaitingOnTimer,
    WaitingOnExternal,
    Completed,
}

/// Per-frame state a step keeps between executions.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryData {
    /// `if`/`else`: whether this link of the chain ran its block.
    Branch(bool),
    Repeat { count: i64, index: i64 },
    While { index: i64 },
    Foreach { items: Rc<Vec<Value>>, index: usize },
    /// `try`: the error its block raised.
    Caught(String),
}

// ── Frame ─────────────────────────────────────────────────────────────────────

/// One script or function body being executed.
pub struct Frame {
    script: Rc<Script>,
    pub cursor: usize,
    pub debug: DebugMode,
    data: Vec<Option<EntryData>>,
    compiled: Option<Rc<CompiledProcedure>>,
    /// Compiled slot number → index into the queue's variable map.
    slots: Vec<usize>,
}

impl Frame {
    pub fn script(&self) -> &Rc<Script> {
        &self.script
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.is_some()
    }
}

/// What the run loop does after a step.
pub(crate) enum Control {
    /// Keep running within this tick.
    Next,
    /// The queue suspended; return from `advance`.
    Yield,
}

// ── Queue ─────────────────────────────────────────────────────────────────────

pub struct Queue {
    name: String,
    frames: Vec<Frame>,
    /// Undefined variables keep their entry (as `None`) so compiled slot
    /// indices stay valid.
    vars: IndexMap<String, Option<Value>>,
    status: QueueStatus,
    error_mode: ErrorMode,
    delay: f64,
    latch: Option<Latch>,
    on_complete: Vec<Box<dyn FnOnce(&Queue)>>,
    output: Vec<String>,
}

impl Queue {
    /// A new, idle queue running `script`.
    pub fn new(engine: &Engine, script: Rc<Script>) -> Self {
        let mut queue = Queue {
            name: script.name().to_owned(),
            frames: Vec::new(),
            vars: IndexMap::new(),
            status: QueueStatus::Idle,
            error_mode: engine.config().error_mode,
            delay: 0.0,
            latch: None,
            on_complete: Vec::new(),
            output: Vec::new(),
        };
        queue.push_frame(engine, script, engine.config().default_debug);
        queue
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> QueueStatus {
        self.status
    }

    pub fn is_completed(&self) -> bool {
        self.status == QueueStatus::Completed
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Remaining timer delay in seconds.
    pub fn delay(&self) -> f64 {
        self.delay
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    pub fn var(&self, name: &str) -> Option<&Value> {
        self.vars.get(name).and_then(Option::as_ref)
    }

    pub fn set_var(&mut self, name: &str, value: Value) {
        self.vars.insert(name.to_owned(), Some(value));
    }

    /// Every defined variable, by name.
    pub fn variables(&self) -> BTreeMap<&str, &Value> {
        self.vars
            .iter()
            .filter_map(|(k, v)| v.as_ref().map(|v| (k.as_str(), v)))
            .collect()
    }

    /// Register a callback fired once when the queue completes.  Fires
    /// immediately if it already has.
    pub fn on_complete(&mut self, callback: impl FnOnce(&Queue) + 'static) {
        if self.is_completed() {
            callback(self);
        } else {
            self.on_complete.push(Box::new(callback));
        }
    }

    pub fn start(&mut self) {
        if self.status == QueueStatus::Idle {
            debug!("queue '{}' started", self.name);
            self.status = QueueStatus::Running;
        }
    }

    /// Hard stop: clear the stack and complete.
    pub fn stop(&mut self) {
        if !self.is_completed() {
            debug!("queue '{}' stopped", self.name);
            self.frames.clear();
            self.finish();
        }
    }

    /// Run one scheduler tick.  `dt` is the time since the last tick, in
    /// seconds.
    pub fn advance(&mut self, engine: &Engine, dt: f64) {
        match self.status {
            QueueStatus::Idle | QueueStatus::Completed => return,
            QueueStatus::WaitingOnExternal => {
                if self.latch.as_ref().is_some_and(|l| l.get()) {
                    return;
                }
                self.latch = None;
                self.status = QueueStatus::Running;
            }
            QueueStatus::WaitingOnTimer => {
                self.delay -= dt;
                if self.delay > 0.0 {
                    return;
                }
                self.delay = 0.0;
                self.status = QueueStatus::Running;
            }
            QueueStatus::Running => {}
        }
        self.run(engine);
    }

    fn run(&mut self, engine: &Engine) {
        loop {
            let Some(t) = self.frames.len().checked_sub(1) else {
                self.finish();
                return;
            };
            let frame = &self.frames[t];
            if frame.cursor >= frame.script.len() {
                self.frames.pop();
                continue;
            }
            let control = match frame.compiled.clone() {
                Some(procedure) => procedure.run(self, engine, t),
                None => {
                    let script = Rc::clone(&frame.script);
                    let index = frame.cursor;
                    let result = self.interpret(engine, t, &script, index);
                    self.after_step(t, result)
                }
            };
            if let Control::Yield = control {
                return;
            }
        }
    }

    fn interpret(&mut self, engine: &Engine, t: usize, script: &Rc<Script>, index: usize) -> Result<Flow, CommandError> {
        let entry = &script.entries()[index];
        trace!("{}:{}: {} (step {index})", script.name(), entry.line, entry.name);
        let mut exec = Exec::new(self, engine, t, script, index);
        match &entry.command {
            Some(command) => command.execute(&mut exec, entry),
            None => Err(unknown_command(entry)),
        }
    }

    pub(crate) fn advance_cursor(&mut self, t: usize) {
        self.frames[t].cursor += 1;
    }

    /// Apply a step's result to frame `t`.
    pub(crate) fn after_step(&mut self, t: usize, result: Result<Flow, CommandError>) -> Control {
        match result {
            Ok(Flow::Continue) => {
                self.frames[t].cursor += 1;
                Control::Next
            }
            Ok(Flow::Delay(seconds)) => {
                self.frames[t].cursor += 1;
                self.delay = seconds;
                self.status = QueueStatus::WaitingOnTimer;
                debug!("queue '{}' waiting {seconds}s", self.name);
                Control::Yield
            }
            Ok(Flow::Await(latch)) => {
                self.frames[t].cursor += 1;
                self.latch = Some(latch);
                self.status = QueueStatus::WaitingOnExternal;
                debug!("queue '{}' waiting on a child queue", self.name);
                Control::Yield
            }
            Ok(Flow::Return) => {
                self.frames.truncate(t);
                Control::Next
            }
            Ok(Flow::Stop) => {
                debug!("queue '{}' stopped by script", self.name);
                self.frames.clear();
                Control::Next
            }
            Err(e) => self.fail(t, e),
        }
    }

    fn fail(&mut self, t: usize, e: CommandError) -> Control {
        let frame = &self.frames[t];
        let line = frame.script.entries().get(frame.cursor).map_or(0, |e| e.line);
        let script = frame.script.name().to_owned();
        let shown = frame.debug.shows_errors();
        if !e.reported {
            self.report(&script, line, &e.message, shown);
        }

        if e.kind == ErrorKind::Jump {
            self.frames[t].cursor += 1;
            return Control::Next;
        }
        if let Some((f, header, end)) = self.find_try(t) {
            self.frames.truncate(f + 1);
            let frame = &mut self.frames[f];
            frame.data[header] = Some(EntryData::Caught(e.message));
            frame.cursor = end;
            return Control::Next;
        }
        match self.error_mode {
            ErrorMode::Strict => {
                debug!("queue '{}' stopped by an error", self.name);
                self.frames.clear();
            }
            ErrorMode::Lenient => self.skip_failed(t),
        }
        Control::Next
    }

    /// Move past a step that failed in lenient mode.  A failed header skips
    /// its whole block and drops its state; a failed loop re-test leaves
    /// the loop.
    fn skip_failed(&mut self, t: usize) {
        let frame = &mut self.frames[t];
        let index = frame.cursor;
        let entry = frame.script.entries().get(index);
        let (state, next) = match (entry.and_then(|e| e.block), entry.and_then(CommandEntry::continuation_of)) {
            (Some(block), _) => (index, block.end + 1),
            (None, Some(header)) => (header, index + 1),
            (None, None) => {
                frame.cursor += 1;
                return;
            }
        };
        if let Some(slot) = frame.data.get_mut(state) {
            *slot = None;
        }
        frame.cursor = next;
    }

    /// The innermost `try` whose block encloses the failing position,
    /// searching caller frames outward.  Returns (frame, header, block end).
    fn find_try(&self, t: usize) -> Option<(usize, usize, usize)> {
        (0..=t).rev().find_map(|f| {
            let frame = &self.frames[f];
            // Callers have already advanced past their `call` step.
            let pos = if f == t { frame.cursor } else { frame.cursor.saturating_sub(1) };
            frame
                .script
                .entries()
                .iter()
                .enumerate()
                .filter(|(_, e)| e.is_header("try"))
                .filter_map(|(h, e)| e.block.filter(|b| b.contains(pos)).map(|b| (f, h, b.end)))
                .last()
        })
    }

    fn report(&mut self, script: &str, line: usize, message: &str, shown: bool) {
        let text = format!("{script}:{line}: {message}");
        warn!("{text}");
        if shown {
            self.output.push(text);
        }
    }

    fn finish(&mut self) {
        if self.is_completed() {
            return;
        }
        self.status = QueueStatus::Completed;
        debug!("queue '{}' completed", self.name);
        for callback in std::mem::take(&mut self.on_complete) {
            callback(self);
        }
    }

    fn push_frame(&mut self, engine: &Engine, script: Rc<Script>, debug: DebugMode) {
        let compiled = (engine.config().execution == ExecutionMode::Compile).then(|| script.compiled(engine));
        let slots = match &compiled {
            Some(procedure) => procedure.slot_names().iter().map(|n| self.intern(n)).collect(),
            None => Vec::new(),
        };
        let data = std::iter::repeat_with(|| None).take(script.len()).collect();
        self.frames.push(Frame { script, cursor: 0, debug, data, compiled, slots });
    }

    fn intern(&mut self, name: &str) -> usize {
        match self.vars.get_index_of(name) {
            Some(i) => i,
            None => self.vars.insert_full(name.to_owned(), None).0,
        }
    }
}

pub(crate) fn unknown_command(entry: &CommandEntry) -> CommandError {
    CommandError::execution(format!("Unknown command '{}'", entry.name))
}

// ── Exec ──────────────────────────────────────────────────────────────────────

/// A step's view of its queue while it executes.
pub struct Exec<'q> {
    queue: &'q mut Queue,
    engine: &'q Engine,
    script: &'q Rc<Script>,
    frame: usize,
    index: usize,
}

impl<'q> Exec<'q> {
    pub(crate) fn new(
        queue: &'q mut Queue,
        engine: &'q Engine,
        frame: usize,
        script: &'q Rc<Script>,
        index: usize,
    ) -> Self {
        Exec { queue, engine, script, frame, index }
    }

    pub fn engine(&self) -> &'q Engine {
        self.engine
    }

    pub fn script(&self) -> &'q Rc<Script> {
        self.script
    }

    /// Every step of the executing frame.
    pub fn entries(&self) -> &'q [CommandEntry] {
        self.script.entries()
    }

    /// Index of the executing step.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn queue_name(&self) -> &str {
        &self.queue.name
    }

    // -- Cursor and step data -------------------------------------------------

    pub fn set_cursor(&mut self, index: usize) {
        self.queue.frames[self.frame].cursor = index;
    }

    pub fn data(&self, index: usize) -> Option<&EntryData> {
        self.queue.frames[self.frame].data.get(index).and_then(Option::as_ref)
    }

    pub fn data_mut(&mut self, index: usize) -> Option<&mut EntryData> {
        self.queue.frames[self.frame].data.get_mut(index).and_then(Option::as_mut)
    }

    pub fn set_data(&mut self, index: usize, data: Option<EntryData>) {
        if let Some(slot) = self.queue.frames[self.frame].data.get_mut(index) {
            *slot = data;
        }
    }

    pub fn take_data(&mut self, index: usize) -> Option<EntryData> {
        self.queue.frames[self.frame].data.get_mut(index).and_then(Option::take)
    }

    // -- Variables ------------------------------------------------------------

    pub fn set_var(&mut self, name: &str, value: Value) {
        self.queue.set_var(name, value);
    }

    pub fn unset_var(&mut self, name: &str) {
        if let Some(v) = self.queue.vars.get_mut(name) {
            *v = None;
        }
    }

    fn slot_index(&self, slot: usize) -> usize {
        self.queue.frames[self.frame].slots[slot]
    }

    pub fn slot(&self, slot: usize) -> Option<Value> {
        let i = self.slot_index(slot);
        self.queue.vars.get_index(i).and_then(|(_, v)| v.clone())
    }

    pub fn set_slot(&mut self, slot: usize, value: Value) {
        let i = self.slot_index(slot);
        if let Some((_, v)) = self.queue.vars.get_index_mut(i) {
            *v = Some(value);
        }
    }

    pub fn unset_slot(&mut self, slot: usize) {
        let i = self.slot_index(slot);
        if let Some((_, v)) = self.queue.vars.get_index_mut(i) {
            *v = None;
        }
    }

    pub fn read(&self, var: &VarRef) -> Option<Value> {
        match var {
            VarRef::Name(name) => self.var(name),
            VarRef::Slot(slot) => self.slot(*slot),
        }
    }

    pub fn assign(&mut self, var: &VarRef, value: Value) {
        match var {
            VarRef::Name(name) => self.set_var(name, value),
            VarRef::Slot(slot) => self.set_slot(*slot, value),
        }
    }

    pub fn unassign(&mut self, var: &VarRef) {
        match var {
            VarRef::Name(name) => self.unset_var(name),
            VarRef::Slot(slot) => self.unset_slot(*slot),
        }
    }

    // -- Evaluation -----------------------------------------------------------

    pub fn eval(&mut self, arg: &Argument) -> Value {
        let engine = self.engine;
        eval_argument(arg, engine.tags(), self)
    }

    pub fn text(&mut self, arg: &Argument) -> String {
        self.eval(arg).to_string()
    }

    /// Evaluate condition arguments (`if`, `while`).
    pub fn condition(&mut self, args: &[Argument]) -> Result<bool, CommandError> {
        let parts = lex_condition(args);
        eval_condition(&parts, |a| self.eval(a)).map_err(CommandError::execution)
    }

    // -- Output ---------------------------------------------------------------

    pub fn debug_mode(&self) -> DebugMode {
        self.queue.frames[self.frame].debug
    }

    pub fn set_debug_mode(&mut self, mode: DebugMode) {
        self.queue.frames[self.frame].debug = mode;
    }

    /// Script output, shown regardless of debug mode.
    pub fn echo(&mut self, line: String) {
        self.queue.output.push(line);
    }

    /// A `+>` line, shown only in full debug mode.
    pub fn info(&mut self, message: impl std::fmt::Display) {
        if self.debug_mode().shows_info() {
            self.queue.output.push(format!("+> {message}"));
        }
    }

    // -- Frames and queues ----------------------------------------------------

    pub fn frame_depth(&self) -> usize {
        self.queue.frames.len()
    }

    /// Push a frame for `script`; it runs next.  The new frame inherits this
    /// frame's debug mode.
    pub fn push_frame(&mut self, script: Rc<Script>) -> Result<(), CommandError> {
        let max = self.engine.config().max_call_depth;
        if self.queue.frames.len() >= max {
            return Err(CommandError::execution(format!("call depth limit of {max} exceeded")));
        }
        let debug = self.debug_mode();
        self.queue.push_frame(self.engine, script, debug);
        Ok(())
    }

    /// Hand a new queue to the scheduler; it starts in the next round.
    pub fn spawn(&mut self, queue: Queue) {
        self.engine.spawn(queue);
    }
}

impl TagContext for Exec<'_> {
    fn var(&self, name: &str) -> Option<Value> {
        self.queue.vars.get(name).and_then(Clone::clone)
    }

    fn tag_error(&mut self, message: String) {
        let line = self.script.entries()[self.index].line;
        let shown = self.debug_mode().shows_errors();
        self.queue.report(self.script.name(), line, &message, shown);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn engine(src: &str) -> (Engine, Rc<Script>) {
        let engine = Engine::new(EngineConfig::default());
        let script = engine.load("main", src).expect("parse failed");
        (engine, script)
    }

    fn run(src: &str) -> Queue {
        let (engine, script) = engine(src);
        let mut q = Queue::new(&engine, script);
        q.start();
        q.advance(&engine, 0.0);
        q
    }

    #[test]
    fn idle_queue_does_not_run() {
        let (engine, script) = engine("echo hi");
        let mut q = Queue::new(&engine, script);
        q.advance(&engine, 1.0);
        assert_eq!(q.status(), QueueStatus::Idle);
        assert!(q.output().is_empty());
    }

    #[test]
    fn runs_to_completion_in_one_tick() {
        let q = run("echo a\nrepeat 3 { echo b }\necho c");
        assert!(q.is_completed());
        assert_eq!(q.output(), ["a", "b", "b", "b", "c"]);
    }

    #[test]
    fn timer_suspends_and_resumes() {
        let (engine, script) = engine("echo a\nwait 1\necho b");
        let mut q = Queue::new(&engine, script);
        q.start();
        q.advance(&engine, 0.0);
        assert_eq!(q.status(), QueueStatus::WaitingOnTimer);
        assert_eq!(q.output(), ["a"]);
        q.advance(&engine, 0.6);
        assert_eq!(q.status(), QueueStatus::WaitingOnTimer);
        q.advance(&engine, 0.6);
        assert!(q.is_completed());
        assert_eq!(q.output(), ["a", "b"]);
    }

    #[test]
    fn completion_callbacks_fire_once() {
        let (engine, script) = engine("echo a");
        let mut q = Queue::new(&engine, script);
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        q.on_complete(move |_| h.set(h.get() + 1));
        q.start();
        q.advance(&engine, 0.0);
        q.advance(&engine, 0.0);
        q.stop();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn strict_error_stops_queue() {
        let q = run("echo a\nerror boom\necho b");
        assert!(q.is_completed());
        assert_eq!(q.output(), ["a", "main:2: boom"]);
    }

    #[test]
    fn unknown_command_is_runtime_error() {
        let q = run("frobnicate\necho after");
        assert_eq!(q.output(), ["main:1: Unknown command 'frobnicate'"]);
    }

    #[test]
    fn jump_errors_continue() {
        let q = run("goto nowhere\necho after");
        assert_eq!(q.output(), ["main:1: unknown mark 'nowhere'", "after"]);
    }

    #[test]
    fn lenient_mode_continues() {
        let engine = Engine::new(EngineConfig { error_mode: ErrorMode::Lenient, ..EngineConfig::default() });
        let script = engine.load("main", "error boom\necho b").unwrap();
        let mut q = Queue::new(&engine, script);
        q.start();
        q.advance(&engine, 0.0);
        assert_eq!(q.output(), ["main:1: boom", "b"]);
    }

    fn run_lenient(src: &str) -> Queue {
        let engine = Engine::new(EngineConfig { error_mode: ErrorMode::Lenient, ..EngineConfig::default() });
        let script = engine.load("main", src).unwrap();
        let mut q = Queue::new(&engine, script);
        q.start();
        q.advance(&engine, 0.0);
        q
    }

    #[test]
    fn lenient_mode_skips_blocks_of_failed_headers() {
        let q = run_lenient(
            "if maybe { echo if-body }\n\
             repeat <{text[x]}> { echo repeat-body }\n\
             while maybe { echo while-body }\n\
             echo end",
        );
        assert_eq!(
            q.output(),
            [
                "main:1: 'maybe' is not a boolean",
                "main:2: 'x' is not a valid repeat count",
                "main:3: 'maybe' is not a boolean",
                "end",
            ]
        );
        assert!(q.is_completed());
    }

    #[test]
    fn lenient_failed_if_falls_through_to_else() {
        let q = run_lenient("if maybe { echo yes } else { echo no }\necho end");
        assert_eq!(q.output(), ["main:1: 'maybe' is not a boolean", "no", "end"]);
    }

    #[test]
    fn lenient_failed_retest_leaves_the_loop() {
        let q = run_lenient("define go true\nwhile <{var[go]}> {\n echo body\n define go maybe\n}\necho end");
        assert_eq!(q.output(), ["body", "main:2: 'maybe' is not a boolean", "end"]);
    }

    #[test]
    fn loop_retest_errors_name_the_header_line() {
        let q = run("define go true\nwhile <{var[go]}> {\n undefine go\n echo x\n}");
        assert_eq!(q.output()[0], "x");
        assert_eq!(q.output()[1], "main:2: <{var[go]}>: variable 'go' is not defined");
        assert!(q.output().iter().all(|l| !l.starts_with("main:5")));
    }

    #[test]
    fn debug_none_hides_errors_but_not_echo() {
        let q = run("debug none\ngoto nowhere\necho x");
        assert_eq!(q.output(), ["x"]);
    }

    #[test]
    fn tag_errors_are_attributed_and_continue() {
        let q = run("echo start\necho <{var[nope]}>");
        assert_eq!(q.output(), ["start", "main:2: <{var[nope]}>: variable 'nope' is not defined", "null"]);
        assert!(q.is_completed());
    }

    #[test]
    fn variables_are_shared_across_frames() {
        let q = run("function f { define y <{var[x]}> }\ndefine x 5\ncall f");
        assert_eq!(q.var("y"), Some(&Value::Integer(5)));
    }
}
