//! The command contract and registry.
//!
//! Every statement in a script names a [`Command`].  The parser validates
//! arguments against the command's [`CommandMeta`]; the queue calls
//! [`Command::execute`] when the step is reached; the compiler asks
//! [`Command::compile`] for a specialised op and falls back to `execute`
//! when it gets none.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use super::compile::{CompileCx, Op};
use super::queue::Exec;
use super::tag::{ArgBit, Argument};
use super::value::Value;

// ── Steps ─────────────────────────────────────────────────────────────────────

/// Range of steps belonging to a block: `start` is the first step inside it,
/// `end` is one past the last, and is also the index of the block's
/// continuation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub start: usize,
    pub end: usize,
}

impl Block {
    pub fn contains(&self, index: usize) -> bool {
        (self.start..self.end).contains(&index)
    }
}

/// Marks steps the parser synthesises.  User text can never produce one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMarker {
    /// Reached when control leaves the block of the step at `header`.
    Continuation { header: usize },
}

/// One parsed step.
#[derive(Clone)]
pub struct CommandEntry {
    /// Command name as written (without any `&` prefix).
    pub name: String,
    /// `None` for an unknown command, which fails when reached.
    pub command: Option<Rc<dyn Command>>,
    pub args: Vec<Argument>,
    pub block: Option<Block>,
    pub marker: Option<EntryMarker>,
    /// 1-based source line.
    pub line: usize,
    /// Written with a leading `&`.
    pub wait: bool,
}

impl CommandEntry {
    /// The header this continuation belongs to, if it is one.
    pub fn continuation_of(&self) -> Option<usize> {
        match self.marker {
            Some(EntryMarker::Continuation { header }) => Some(header),
            None => None,
        }
    }

    /// Whether this is the header step (not the continuation) of `name`.
    pub fn is_header(&self, name: &str) -> bool {
        self.marker.is_none() && self.name == name
    }

    /// Static text of argument `i`.
    pub fn static_arg(&self, i: usize) -> Option<String> {
        self.args.get(i).and_then(Argument::static_text)
    }

    /// Shift every step index by `-offset`; used when a block is lifted out
    /// into its own script.
    pub(crate) fn rebased(&self, offset: usize) -> CommandEntry {
        let mut entry = self.clone();
        if let Some(b) = &mut entry.block {
            b.start -= offset;
            b.end -= offset;
        }
        if let Some(EntryMarker::Continuation { header }) = &mut entry.marker {
            *header -= offset;
        }
        entry
    }
}

impl fmt::Debug for CommandEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandEntry")
            .field("name", &self.name)
            .field("known", &self.command.is_some())
            .field("args", &self.args.iter().map(ToString::to_string).collect::<Vec<_>>())
            .field("block", &self.block)
            .field("marker", &self.marker)
            .field("line", &self.line)
            .field("wait", &self.wait)
            .finish()
    }
}

// ── Metadata ──────────────────────────────────────────────────────────────────

/// Converts a tag-free argument into a typed value at parse time, or
/// rejects it.
pub type ArgPredicate = fn(&str) -> Option<Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockUse {
    None,
    Optional,
    Required,
}

#[derive(Debug, Clone, Copy)]
pub struct CommandMeta {
    pub name: &'static str,
    pub usage: &'static str,
    pub min_args: usize,
    /// `None` for no upper limit.
    pub max_args: Option<usize>,
    /// Per-position predicates; positions past the end are unchecked.
    pub predicates: &'static [Option<ArgPredicate>],
    pub block: BlockUse,
    /// Manipulates the cursor.
    pub flow: bool,
    /// Honours a leading `&` by suspending until the work it starts is done.
    pub waitable: bool,
}

impl CommandMeta {
    pub const fn new(name: &'static str, usage: &'static str) -> Self {
        CommandMeta {
            name,
            usage,
            min_args: 0,
            max_args: Some(0),
            predicates: &[],
            block: BlockUse::None,
            flow: false,
            waitable: false,
        }
    }

    pub const fn args(mut self, min: usize, max: Option<usize>) -> Self {
        self.min_args = min;
        self.max_args = max;
        self
    }

    pub const fn predicates(mut self, p: &'static [Option<ArgPredicate>]) -> Self {
        self.predicates = p;
        self
    }

    pub const fn block(mut self, b: BlockUse) -> Self {
        self.block = b;
        self
    }

    pub const fn flow(mut self) -> Self {
        self.flow = true;
        self
    }

    pub const fn waitable(mut self) -> Self {
        self.waitable = true;
        self
    }
}

// ── Predicates ────────────────────────────────────────────────────────────────

pub fn integer_arg(s: &str) -> Option<Value> {
    s.trim().parse::<i64>().ok().map(Value::Integer)
}

pub fn number_arg(s: &str) -> Option<Value> {
    s.trim().parse::<f64>().ok().filter(|x| x.is_finite()).map(Value::Number)
}

/// Variable, mark and function names: letters, digits, `_`, `-`, `.`.
pub fn name_arg(s: &str) -> Option<Value> {
    let ok = !s.is_empty()
        && s.chars().all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'));
    ok.then(|| Value::text(s))
}

/// Infer the type of a literal: integer, then number, then boolean, else
/// text.  Never rejects.
pub fn typed_arg(s: &str) -> Option<Value> {
    let v = integer_arg(s)
        .or_else(|| number_arg(s))
        .or_else(|| match s {
            "true" => Some(Value::Boolean(true)),
            "false" => Some(Value::Boolean(false)),
            _ => None,
        })
        .unwrap_or_else(|| Value::text(s));
    Some(v)
}

/// A loop count, or the `stop`/`next` keywords.
pub fn count_or_keyword_arg(s: &str) -> Option<Value> {
    match s {
        "stop" | "next" => Some(Value::text(s)),
        _ => integer_arg(s),
    }
}

pub fn debug_mode_arg(s: &str) -> Option<Value> {
    crate::config::DebugMode::from_name(s).map(|_| Value::text(s.to_ascii_lowercase()))
}

// ── Execution contract ────────────────────────────────────────────────────────

/// What the queue should do after a step.
#[derive(Debug, Clone)]
pub enum Flow {
    /// Advance the cursor and keep going within this tick.
    Continue,
    /// Advance, then suspend for this many seconds.
    Delay(f64),
    /// Advance, then suspend until the latch is cleared.
    Await(Rc<std::cell::Cell<bool>>),
    /// Pop the current frame.
    Return,
    /// Clear the frame stack.
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A command failed; unwinds to the nearest `try` or stops the queue.
    Execution,
    /// A jump target could not be found; reported, and the queue continues.
    Jump,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct CommandError {
    pub kind: ErrorKind,
    pub message: String,
    /// Already written to the queue output.
    pub reported: bool,
}

impl CommandError {
    pub fn execution(message: impl Into<String>) -> Self {
        CommandError { kind: ErrorKind::Execution, message: message.into(), reported: false }
    }

    pub fn jump(message: impl Into<String>) -> Self {
        CommandError { kind: ErrorKind::Jump, message: message.into(), reported: false }
    }
}

pub trait Command {
    fn meta(&self) -> &CommandMeta;

    /// Parse-time validation beyond argument counts and predicates; runs
    /// once the whole script is parsed, so neighbouring steps are visible.
    fn check(&self, _entries: &[CommandEntry], _index: usize) -> Result<(), String> {
        Ok(())
    }

    fn execute(&self, exec: &mut Exec<'_>, entry: &CommandEntry) -> Result<Flow, CommandError>;

    /// A specialised op for the step at `index`.  `None` means the compiled
    /// procedure calls [`Command::execute`] for this step.
    fn compile(&self, _cx: &mut CompileCx<'_>, _index: usize) -> Option<Op> {
        None
    }
}

// ── Operands ──────────────────────────────────────────────────────────────────

/// Something a command can evaluate: a plain [`Argument`] or its compiled
/// form.  Lets command logic be written once for both execution paths.
pub trait Operand {
    fn value(&self, exec: &mut Exec<'_>) -> Value;

    fn text(&self, exec: &mut Exec<'_>) -> String {
        self.value(exec).to_string()
    }
}

impl Operand for Argument {
    fn value(&self, exec: &mut Exec<'_>) -> Value {
        exec.eval(self)
    }
}

/// Where a variable lives: by name, or in a fixed slot of a compiled
/// procedure.
#[derive(Debug, Clone)]
pub enum VarRef {
    Name(String),
    Slot(usize),
}

/// Split `name=value` into the name and an argument for the value.  A
/// plain unquoted value gets its type inferred like a `define` literal.
pub fn split_assignment(arg: &Argument) -> Option<(String, Argument)> {
    let Some(ArgBit::Text(first)) = arg.bits.first() else {
        return None;
    };
    let (name, rest) = first.split_once('=')?;
    if name_arg(name).is_none() {
        return None;
    }
    let mut bits = arg.bits.clone();
    bits[0] = ArgBit::Text(rest.to_owned());
    if bits.len() > 1 && rest.is_empty() {
        bits.remove(0);
    }
    let mut value = Argument { bits, quoted: arg.quoted, literal: None };
    if !value.quoted {
        value.literal = value.static_text().as_deref().and_then(typed_arg);
    }
    Some((name.to_owned(), value))
}

// ── Registry ──────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<&'static str, Rc<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        super::commands::register_builtins(&mut reg);
        reg
    }

    pub fn register(&mut self, command: Rc<dyn Command>) {
        self.commands.insert(command.meta().name, command);
    }

    pub fn get(&self, name: &str) -> Option<&Rc<dyn Command>> {
        self.commands.get(name)
    }

    /// Usage lines for every command, sorted by name.
    pub fn usage_lines(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.commands.values().map(|c| c.meta().usage).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.commands.keys().collect();
        names.sort();
        f.debug_struct("CommandRegistry").field("commands", &names).finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
