//! Flow-control commands.
//!
//! Everything here works by moving the frame cursor (see the
//! [queue module docs](crate::script::queue)).  Branches and loops keep
//! their state in the header step's [`EntryData`]; the continuation step
//! after each block is where loops re-test and where `try` hands over to
//! `catch`.

use std::cell::Cell;
use std::rc::Rc;

use crate::script::command::{
    count_or_keyword_arg, name_arg, number_arg, split_assignment, ArgPredicate, Block, BlockUse, Command,
    CommandEntry, CommandError, CommandMeta, ErrorKind, Flow, Operand, VarRef,
};
use crate::script::compile::{eval_compiled_condition, CompileCx, Op};
use crate::script::queue::{EntryData, Exec, Latch, Queue, ERROR_MESSAGE_VAR};
use crate::script::value::Value;

use super::{apply_loop_jump, check_loop, find_mark, iterate, loop_position, loop_target, LoopJump};

pub const REPEAT_INDEX: &str = "repeat_index";
pub const WHILE_INDEX: &str = "while_index";
pub const FOREACH_VALUE: &str = "foreach_value";
pub const FOREACH_INDEX: &str = "foreach_index";

const NAME: &[Option<ArgPredicate>] = &[Some(name_arg)];
const COUNT_AND_NAME: &[Option<ArgPredicate>] = &[Some(count_or_keyword_arg), Some(name_arg)];
const ITEMS_AND_NAME: &[Option<ArgPredicate>] = &[None, Some(name_arg)];
const SECONDS: &[Option<ArgPredicate>] = &[Some(number_arg)];

fn no_block(entry: &CommandEntry) -> CommandError {
    CommandError::execution(format!("'{}' has no block", entry.name))
}

fn continue_op() -> Op {
    Box::new(|_: &mut Exec<'_>, _: &CommandEntry| Ok(Flow::Continue))
}

/// `stop`/`next` resolved once; an unresolvable keyword becomes a step that
/// always reports the jump error.
fn compile_loop_jump(entries: &[CommandEntry], index: usize, name: &str, jump: LoopJump) -> Op {
    match loop_target(entries, index, name, jump) {
        Ok((header, block)) => {
            Box::new(move |exec: &mut Exec<'_>, _: &CommandEntry| Ok(apply_loop_jump(exec, header, block, jump)))
        }
        Err(e) => Box::new(move |_: &mut Exec<'_>, _: &CommandEntry| Err(e.clone())),
    }
}

/// `name=value` arguments starting at `from`.
fn check_assignments(entries: &[CommandEntry], index: usize, from: usize) -> Result<(), String> {
    for arg in entries[index].args.iter().skip(from) {
        if split_assignment(arg).is_none() {
            return Err(format!("'{arg}' is not a name=value assignment"));
        }
    }
    Ok(())
}

fn assignments(exec: &mut Exec<'_>, args: &[crate::script::tag::Argument]) -> Vec<(String, Value)> {
    args.iter()
        .filter_map(split_assignment)
        .map(|(name, value)| {
            let v = exec.eval(&value);
            (name, v)
        })
        .collect()
}

// ── if / else ─────────────────────────────────────────────────────────────────

/// Record whether a link of an `if`/`else` chain has run its block, and skip
/// the block (with its continuation) unless this link runs it.
fn branch(exec: &mut Exec<'_>, header: usize, block: Block, chain_taken: bool, run_block: bool) -> Flow {
    exec.set_data(header, Some(EntryData::Branch(chain_taken)));
    if !run_block {
        exec.set_cursor(block.end);
    }
    Flow::Continue
}

static IF: CommandMeta = CommandMeta::new("if", "if <condition> { ... }")
    .args(1, None)
    .block(BlockUse::Required)
    .flow();

pub struct If;

impl Command for If {
    fn meta(&self) -> &CommandMeta {
        &IF
    }

    fn execute(&self, exec: &mut Exec<'_>, entry: &CommandEntry) -> Result<Flow, CommandError> {
        if entry.marker.is_some() {
            return Ok(Flow::Continue);
        }
        let index = exec.index();
        let block = entry.block.ok_or_else(|| no_block(entry))?;
        let taken = exec.condition(&entry.args)?;
        Ok(branch(exec, index, block, taken, taken))
    }

    fn compile(&self, cx: &mut CompileCx<'_>, index: usize) -> Option<Op> {
        let entry = &cx.entries()[index];
        if entry.marker.is_some() {
            return Some(continue_op());
        }
        let block = entry.block?;
        let condition = cx.condition(&entry.args);
        Some(Box::new(move |exec: &mut Exec<'_>, _: &CommandEntry| {
            let taken = eval_compiled_condition(&condition, exec)?;
            Ok(branch(exec, index, block, taken, taken))
        }))
    }
}

static ELSE: CommandMeta = CommandMeta::new("else", "else [if <condition>] { ... }")
    .args(0, None)
    .block(BlockUse::Required)
    .flow();

pub struct Else;

impl Else {
    /// Header of the `if`/`else` link this `else` follows.
    fn previous_link(entries: &[CommandEntry], index: usize) -> Option<usize> {
        let prev = entries.get(index.checked_sub(1)?)?;
        let header = prev.continuation_of()?;
        matches!(entries[header].name.as_str(), "if" | "else").then_some(header)
    }
}

impl Command for Else {
    fn meta(&self) -> &CommandMeta {
        &ELSE
    }

    fn check(&self, entries: &[CommandEntry], index: usize) -> Result<(), String> {
        if Else::previous_link(entries, index).is_none() {
            return Err("'else' must follow an if or else block".into());
        }
        let args = &entries[index].args;
        if !args.is_empty() && (args.len() < 2 || args[0].static_text().as_deref() != Some("if")) {
            return Err("expected 'else { ... }' or 'else if <condition> { ... }'".into());
        }
        Ok(())
    }

    fn execute(&self, exec: &mut Exec<'_>, entry: &CommandEntry) -> Result<Flow, CommandError> {
        if entry.marker.is_some() {
            return Ok(Flow::Continue);
        }
        let index = exec.index();
        let block = entry.block.ok_or_else(|| no_block(entry))?;
        let earlier = Else::previous_link(exec.entries(), index)
            .is_some_and(|p| matches!(exec.data(p), Some(EntryData::Branch(true))));
        let taken = match (earlier, entry.args.get(1..)) {
            (true, _) => false,
            (false, Some(cond)) if !cond.is_empty() => exec.condition(cond)?,
            (false, _) => true,
        };
        Ok(branch(exec, index, block, earlier || taken, taken))
    }

    fn compile(&self, cx: &mut CompileCx<'_>, index: usize) -> Option<Op> {
        let entry = &cx.entries()[index];
        if entry.marker.is_some() {
            return Some(continue_op());
        }
        let block = entry.block?;
        let previous = Else::previous_link(cx.entries(), index)?;
        let condition = match entry.args.get(1..) {
            Some(cond) if !cond.is_empty() => Some(cx.condition(cond)),
            _ => None,
        };
        Some(Box::new(move |exec: &mut Exec<'_>, _: &CommandEntry| {
            let earlier = matches!(exec.data(previous), Some(EntryData::Branch(true)));
            let taken = match (earlier, &condition) {
                (true, _) => false,
                (false, Some(cond)) => eval_compiled_condition(cond, exec)?,
                (false, None) => true,
            };
            Ok(branch(exec, index, block, earlier || taken, taken))
        }))
    }
}

// ── repeat ────────────────────────────────────────────────────────────────────

fn repeat_count(v: Value) -> Result<i64, CommandError> {
    v.as_integer()
        .ok_or_else(|| CommandError::execution(format!("'{v}' is not a valid repeat count")))
}

/// Count one more iteration, if any are left.
fn repeat_test(exec: &mut Exec<'_>, header: usize, counter: &VarRef) -> bool {
    let Some(&EntryData::Repeat { count, index }) = exec.data(header) else {
        return false;
    };
    if index >= count {
        exec.take_data(header);
        return false;
    }
    exec.set_data(header, Some(EntryData::Repeat { count, index: index + 1 }));
    exec.assign(counter, Value::Integer(index + 1));
    true
}

static REPEAT: CommandMeta = CommandMeta::new("repeat", "repeat <count> [counter] { ... } | repeat stop|next")
    .args(1, Some(2))
    .predicates(COUNT_AND_NAME)
    .block(BlockUse::Optional)
    .flow();

pub struct Repeat;

impl Command for Repeat {
    fn meta(&self) -> &CommandMeta {
        &REPEAT
    }

    fn check(&self, entries: &[CommandEntry], index: usize) -> Result<(), String> {
        check_loop(entries, index)
    }

    fn execute(&self, exec: &mut Exec<'_>, entry: &CommandEntry) -> Result<Flow, CommandError> {
        if let Some(jump) = LoopJump::of(entry) {
            let (header, block) = loop_target(exec.entries(), exec.index(), "repeat", jump)?;
            return Ok(apply_loop_jump(exec, header, block, jump));
        }
        let (h, block, at_continuation) = loop_position(exec.entries(), exec.index()).ok_or_else(|| no_block(entry))?;
        let header = &exec.entries()[h];
        let counter = VarRef::Name(match header.args.get(1) {
            Some(name) => exec.text(name),
            None => REPEAT_INDEX.to_owned(),
        });
        if !at_continuation {
            let count = repeat_count(exec.eval(&header.args[0]))?;
            exec.set_data(h, Some(EntryData::Repeat { count, index: 0 }));
        }
        let entered = repeat_test(exec, h, &counter);
        Ok(iterate(exec, h, block, at_continuation, entered))
    }

    fn compile(&self, cx: &mut CompileCx<'_>, index: usize) -> Option<Op> {
        let entries = cx.entries();
        if let Some(jump) = LoopJump::of(&entries[index]) {
            return Some(compile_loop_jump(entries, index, "repeat", jump));
        }
        let (h, block, at_continuation) = loop_position(entries, index)?;
        let header = &entries[h];
        let counter = cx.var_ref_or(header.args.get(1), REPEAT_INDEX)?;
        if at_continuation {
            return Some(Box::new(move |exec: &mut Exec<'_>, _: &CommandEntry| {
                let entered = repeat_test(exec, h, &counter);
                Ok(iterate(exec, h, block, true, entered))
            }));
        }
        let count = cx.arg(&header.args[0]);
        Some(Box::new(move |exec: &mut Exec<'_>, _: &CommandEntry| {
            let count = repeat_count(count.value(exec))?;
            exec.set_data(h, Some(EntryData::Repeat { count, index: 0 }));
            let entered = repeat_test(exec, h, &counter);
            Ok(iterate(exec, h, block, false, entered))
        }))
    }
}

// ── while ─────────────────────────────────────────────────────────────────────

fn while_test(exec: &mut Exec<'_>, header: usize, counter: &VarRef, condition: bool) -> bool {
    if !condition {
        exec.take_data(header);
        return false;
    }
    let index = match exec.data(header) {
        Some(EntryData::While { index }) => index + 1,
        _ => 1,
    };
    exec.set_data(header, Some(EntryData::While { index }));
    exec.assign(counter, Value::Integer(index));
    true
}

static WHILE: CommandMeta = CommandMeta::new("while", "while <condition> { ... } | while stop|next")
    .args(1, None)
    .block(BlockUse::Optional)
    .flow();

pub struct While;

impl Command for While {
    fn meta(&self) -> &CommandMeta {
        &WHILE
    }

    fn check(&self, entries: &[CommandEntry], index: usize) -> Result<(), String> {
        check_loop(entries, index)
    }

    fn execute(&self, exec: &mut Exec<'_>, entry: &CommandEntry) -> Result<Flow, CommandError> {
        if let Some(jump) = LoopJump::of(entry) {
            let (header, block) = loop_target(exec.entries(), exec.index(), "while", jump)?;
            return Ok(apply_loop_jump(exec, header, block, jump));
        }
        let (h, block, at_continuation) = loop_position(exec.entries(), exec.index()).ok_or_else(|| no_block(entry))?;
        if !at_continuation {
            exec.set_data(h, Some(EntryData::While { index: 0 }));
        }
        let condition = exec.condition(&exec.entries()[h].args)?;
        let entered = while_test(exec, h, &VarRef::Name(WHILE_INDEX.to_owned()), condition);
        Ok(iterate(exec, h, block, at_continuation, entered))
    }

    fn compile(&self, cx: &mut CompileCx<'_>, index: usize) -> Option<Op> {
        let entries = cx.entries();
        if let Some(jump) = LoopJump::of(&entries[index]) {
            return Some(compile_loop_jump(entries, index, "while", jump));
        }
        let (h, block, at_continuation) = loop_position(entries, index)?;
        let counter = cx.var_ref_or(None, WHILE_INDEX)?;
        let condition = cx.condition(&entries[h].args);
        Some(Box::new(move |exec: &mut Exec<'_>, _: &CommandEntry| {
            if !at_continuation {
                exec.set_data(h, Some(EntryData::While { index: 0 }));
            }
            let holds = eval_compiled_condition(&condition, exec)?;
            let entered = while_test(exec, h, &counter, holds);
            Ok(iterate(exec, h, block, at_continuation, entered))
        }))
    }
}

// ── foreach ───────────────────────────────────────────────────────────────────

fn foreach_test(exec: &mut Exec<'_>, header: usize, item: &VarRef, counter: &VarRef) -> bool {
    let (items, index) = match exec.data(header) {
        Some(EntryData::Foreach { items, index }) => (Rc::clone(items), *index),
        _ => return false,
    };
    let Some(value) = items.get(index).cloned() else {
        exec.take_data(header);
        return false;
    };
    exec.set_data(header, Some(EntryData::Foreach { items, index: index + 1 }));
    exec.assign(item, value);
    exec.assign(counter, Value::Integer(index as i64 + 1));
    true
}

static FOREACH: CommandMeta = CommandMeta::new("foreach", "foreach <list> [item] { ... } | foreach stop|next")
    .args(1, Some(2))
    .predicates(ITEMS_AND_NAME)
    .block(BlockUse::Optional)
    .flow();

pub struct Foreach;

impl Command for Foreach {
    fn meta(&self) -> &CommandMeta {
        &FOREACH
    }

    fn check(&self, entries: &[CommandEntry], index: usize) -> Result<(), String> {
        check_loop(entries, index)
    }

    fn execute(&self, exec: &mut Exec<'_>, entry: &CommandEntry) -> Result<Flow, CommandError> {
        if let Some(jump) = LoopJump::of(entry) {
            let (header, block) = loop_target(exec.entries(), exec.index(), "foreach", jump)?;
            return Ok(apply_loop_jump(exec, header, block, jump));
        }
        let (h, block, at_continuation) = loop_position(exec.entries(), exec.index()).ok_or_else(|| no_block(entry))?;
        let header = &exec.entries()[h];
        let item = VarRef::Name(match header.args.get(1) {
            Some(name) => exec.text(name),
            None => FOREACH_VALUE.to_owned(),
        });
        if !at_continuation {
            let items = exec.eval(&header.args[0]).to_list();
            exec.set_data(h, Some(EntryData::Foreach { items, index: 0 }));
        }
        let entered = foreach_test(exec, h, &item, &VarRef::Name(FOREACH_INDEX.to_owned()));
        Ok(iterate(exec, h, block, at_continuation, entered))
    }

    fn compile(&self, cx: &mut CompileCx<'_>, index: usize) -> Option<Op> {
        let entries = cx.entries();
        if let Some(jump) = LoopJump::of(&entries[index]) {
            return Some(compile_loop_jump(entries, index, "foreach", jump));
        }
        let (h, block, at_continuation) = loop_position(entries, index)?;
        let header = &entries[h];
        let item = cx.var_ref_or(header.args.get(1), FOREACH_VALUE)?;
        let counter = cx.var_ref_or(None, FOREACH_INDEX)?;
        if at_continuation {
            return Some(Box::new(move |exec: &mut Exec<'_>, _: &CommandEntry| {
                let entered = foreach_test(exec, h, &item, &counter);
                Ok(iterate(exec, h, block, true, entered))
            }));
        }
        let list = cx.arg(&header.args[0]);
        Some(Box::new(move |exec: &mut Exec<'_>, _: &CommandEntry| {
            let items = list.value(exec).to_list();
            exec.set_data(h, Some(EntryData::Foreach { items, index: 0 }));
            let entered = foreach_test(exec, h, &item, &counter);
            Ok(iterate(exec, h, block, false, entered))
        }))
    }
}

// ── goto / mark ───────────────────────────────────────────────────────────────

fn unknown_mark(name: &str) -> CommandError {
    CommandError::jump(format!("unknown mark '{name}'"))
}

static GOTO: CommandMeta = CommandMeta::new("goto", "goto <mark>").args(1, Some(1)).predicates(NAME).flow();

pub struct Goto;

impl Command for Goto {
    fn meta(&self) -> &CommandMeta {
        &GOTO
    }

    fn execute(&self, exec: &mut Exec<'_>, entry: &CommandEntry) -> Result<Flow, CommandError> {
        let name = exec.text(&entry.args[0]);
        let target = find_mark(exec.entries(), &name).ok_or_else(|| unknown_mark(&name))?;
        exec.set_cursor(target);
        Ok(Flow::Continue)
    }

    fn compile(&self, cx: &mut CompileCx<'_>, index: usize) -> Option<Op> {
        let name = cx.entries()[index].static_arg(0)?;
        Some(match find_mark(cx.entries(), &name) {
            Some(target) => Box::new(move |exec: &mut Exec<'_>, _: &CommandEntry| {
                exec.set_cursor(target);
                Ok(Flow::Continue)
            }) as Op,
            None => {
                let err = unknown_mark(&name);
                Box::new(move |_: &mut Exec<'_>, _: &CommandEntry| Err(err.clone()))
            }
        })
    }
}

static MARK: CommandMeta = CommandMeta::new("mark", "mark <name>").args(1, Some(1)).predicates(NAME);

pub struct Mark;

impl Command for Mark {
    fn meta(&self) -> &CommandMeta {
        &MARK
    }

    fn check(&self, entries: &[CommandEntry], index: usize) -> Result<(), String> {
        match entries[index].static_arg(0) {
            Some(_) => Ok(()),
            None => Err("mark names must be plain text".into()),
        }
    }

    fn execute(&self, _exec: &mut Exec<'_>, _entry: &CommandEntry) -> Result<Flow, CommandError> {
        Ok(Flow::Continue)
    }

    fn compile(&self, _cx: &mut CompileCx<'_>, _index: usize) -> Option<Op> {
        Some(continue_op())
    }
}

// ── try / catch ───────────────────────────────────────────────────────────────

static TRY: CommandMeta = CommandMeta::new("try", "try { ... } [catch { ... }]")
    .block(BlockUse::Required)
    .flow();

pub struct Try;

impl Command for Try {
    fn meta(&self) -> &CommandMeta {
        &TRY
    }

    fn execute(&self, exec: &mut Exec<'_>, entry: &CommandEntry) -> Result<Flow, CommandError> {
        let index = exec.index();
        let Some(header) = entry.continuation_of() else {
            exec.set_data(index, None);
            return Ok(Flow::Continue);
        };
        // A following `catch` consumes the caught error itself.
        if exec.entries().get(index + 1).is_some_and(|e| e.is_header("catch")) {
            return Ok(Flow::Continue);
        }
        match exec.take_data(header) {
            Some(EntryData::Caught(message)) => {
                Err(CommandError { kind: ErrorKind::Execution, message, reported: true })
            }
            _ => Ok(Flow::Continue),
        }
    }
}

static CATCH: CommandMeta = CommandMeta::new("catch", "catch { ... }")
    .block(BlockUse::Required)
    .flow();

pub struct Catch;

impl Catch {
    fn try_header(entries: &[CommandEntry], index: usize) -> Option<usize> {
        let prev = entries.get(index.checked_sub(1)?)?;
        let header = prev.continuation_of()?;
        entries[header].is_header("try").then_some(header)
    }
}

impl Command for Catch {
    fn meta(&self) -> &CommandMeta {
        &CATCH
    }

    fn check(&self, entries: &[CommandEntry], index: usize) -> Result<(), String> {
        match Catch::try_header(entries, index) {
            Some(_) => Ok(()),
            None => Err("'catch' must follow a try block".into()),
        }
    }

    fn execute(&self, exec: &mut Exec<'_>, entry: &CommandEntry) -> Result<Flow, CommandError> {
        if entry.marker.is_some() {
            return Ok(Flow::Continue);
        }
        let block = entry.block.ok_or_else(|| no_block(entry))?;
        let caught = Catch::try_header(exec.entries(), exec.index()).and_then(|h| exec.take_data(h));
        match caught {
            Some(EntryData::Caught(message)) => {
                exec.info(format_args!("caught: {message}"));
                exec.set_var(ERROR_MESSAGE_VAR, Value::Text(message));
            }
            _ => exec.set_cursor(block.end),
        }
        Ok(Flow::Continue)
    }
}

// ── function / call / return ──────────────────────────────────────────────────

static FUNCTION: CommandMeta = CommandMeta::new("function", "function <name> { ... }")
    .args(1, Some(1))
    .predicates(NAME)
    .block(BlockUse::Required)
    .flow();

pub struct Function;

impl Command for Function {
    fn meta(&self) -> &CommandMeta {
        &FUNCTION
    }

    fn execute(&self, exec: &mut Exec<'_>, entry: &CommandEntry) -> Result<Flow, CommandError> {
        if entry.marker.is_some() {
            return Ok(Flow::Continue);
        }
        let block = entry.block.ok_or_else(|| no_block(entry))?;
        let name = exec.text(&entry.args[0]);
        let body = Rc::new(exec.script().extract(block));
        exec.engine().define_function(&name, body);
        exec.info(format_args!("function '{name}' defined"));
        exec.set_cursor(block.end);
        Ok(Flow::Continue)
    }
}

static CALL: CommandMeta = CommandMeta::new("call", "call <function> [name=value ...]")
    .args(1, None)
    .predicates(NAME)
    .flow();

pub struct Call;

impl Command for Call {
    fn meta(&self) -> &CommandMeta {
        &CALL
    }

    fn check(&self, entries: &[CommandEntry], index: usize) -> Result<(), String> {
        check_assignments(entries, index, 1)
    }

    fn execute(&self, exec: &mut Exec<'_>, entry: &CommandEntry) -> Result<Flow, CommandError> {
        let name = exec.text(&entry.args[0]);
        let body = exec
            .engine()
            .function(&name)
            .or_else(|| exec.engine().script(&name))
            .ok_or_else(|| CommandError::execution(format!("unknown function '{name}'")))?;
        for (var, value) in assignments(exec, &entry.args[1..]) {
            exec.set_var(&var, value);
        }
        exec.push_frame(body)?;
        Ok(Flow::Continue)
    }
}

static RETURN: CommandMeta = CommandMeta::new("return", "return").flow();

pub struct Return;

impl Command for Return {
    fn meta(&self) -> &CommandMeta {
        &RETURN
    }

    fn execute(&self, _exec: &mut Exec<'_>, _entry: &CommandEntry) -> Result<Flow, CommandError> {
        Ok(Flow::Return)
    }

    fn compile(&self, _cx: &mut CompileCx<'_>, _index: usize) -> Option<Op> {
        Some(Box::new(|_: &mut Exec<'_>, _: &CommandEntry| Ok(Flow::Return)))
    }
}

// ── run / wait / stop ─────────────────────────────────────────────────────────

static RUN: CommandMeta = CommandMeta::new("run", "[&]run <script> [name=value ...]")
    .args(1, None)
    .predicates(NAME)
    .waitable();

/// Start another script as a queue of its own.  `&run` suspends this queue
/// until that one completes.
pub struct Run;

impl Command for Run {
    fn meta(&self) -> &CommandMeta {
        &RUN
    }

    fn check(&self, entries: &[CommandEntry], index: usize) -> Result<(), String> {
        check_assignments(entries, index, 1)
    }

    fn execute(&self, exec: &mut Exec<'_>, entry: &CommandEntry) -> Result<Flow, CommandError> {
        let name = exec.text(&entry.args[0]);
        let script = exec
            .engine()
            .script(&name)
            .ok_or_else(|| CommandError::execution(format!("unknown script '{name}'")))?;
        let mut child = Queue::new(exec.engine(), script);
        for (var, value) in assignments(exec, &entry.args[1..]) {
            child.set_var(&var, value);
        }
        exec.info(format_args!("started '{name}'"));

        if !entry.wait {
            exec.spawn(child);
            return Ok(Flow::Continue);
        }
        let latch: Latch = Rc::new(Cell::new(true));
        let flag = Rc::clone(&latch);
        child.on_complete(move |_| flag.set(false));
        exec.spawn(child);
        Ok(Flow::Await(latch))
    }
}

fn wait_time(v: Value) -> Result<f64, CommandError> {
    v.as_number()
        .filter(|s| s.is_finite() && *s >= 0.0)
        .ok_or_else(|| CommandError::execution(format!("'{v}' is not a valid wait time")))
}

static WAIT: CommandMeta = CommandMeta::new("wait", "wait <seconds>").args(1, Some(1)).predicates(SECONDS);

pub struct Wait;

impl Command for Wait {
    fn meta(&self) -> &CommandMeta {
        &WAIT
    }

    fn execute(&self, exec: &mut Exec<'_>, entry: &CommandEntry) -> Result<Flow, CommandError> {
        let seconds = wait_time(exec.eval(&entry.args[0]))?;
        Ok(Flow::Delay(seconds))
    }

    fn compile(&self, cx: &mut CompileCx<'_>, index: usize) -> Option<Op> {
        let seconds = cx.arg(&cx.entries()[index].args[0]);
        Some(Box::new(move |exec: &mut Exec<'_>, _: &CommandEntry| {
            Ok(Flow::Delay(wait_time(seconds.value(exec))?))
        }))
    }
}

static STOP: CommandMeta = CommandMeta::new("stop", "stop").flow();

pub struct Stop;

impl Command for Stop {
    fn meta(&self) -> &CommandMeta {
        &STOP
    }

    fn execute(&self, _exec: &mut Exec<'_>, _entry: &CommandEntry) -> Result<Flow, CommandError> {
        Ok(Flow::Stop)
    }

    fn compile(&self, _cx: &mut CompileCx<'_>, _index: usize) -> Option<Op> {
        Some(Box::new(|_: &mut Exec<'_>, _: &CommandEntry| Ok(Flow::Stop)))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
