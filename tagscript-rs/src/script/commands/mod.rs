//! Built-in commands.
//!
//! | Module | Commands |
//! |--------|----------|
//! | [`flow`] | `if` `else` `repeat` `while` `foreach` `goto` `mark` `try` `catch` `function` `call` `return` `run` `wait` `stop` |
//! | [`common`] | `echo` `define` `undefine` `debug` `error` |
//!
//! Loops share one shape.  The header stores the loop's state in its step
//! data and tests it; the continuation step the parser places after the
//! block tests it again.  Entering the block from the header is just
//! `Continue`; from the continuation it moves the cursor back to the header.
//! Leaving from the header skips past the continuation; leaving from the
//! continuation falls through.

use std::rc::Rc;

use super::command::{Block, CommandEntry, CommandError, CommandRegistry, Flow};
use super::queue::Exec;

pub mod common;
pub mod flow;

pub fn register_builtins(reg: &mut CommandRegistry) {
    reg.register(Rc::new(flow::If));
    reg.register(Rc::new(flow::Else));
    reg.register(Rc::new(flow::Repeat));
    reg.register(Rc::new(flow::While));
    reg.register(Rc::new(flow::Foreach));
    reg.register(Rc::new(flow::Goto));
    reg.register(Rc::new(flow::Mark));
    reg.register(Rc::new(flow::Try));
    reg.register(Rc::new(flow::Catch));
    reg.register(Rc::new(flow::Function));
    reg.register(Rc::new(flow::Call));
    reg.register(Rc::new(flow::Return));
    reg.register(Rc::new(flow::Run));
    reg.register(Rc::new(flow::Wait));
    reg.register(Rc::new(flow::Stop));
    reg.register(Rc::new(common::Echo));
    reg.register(Rc::new(common::Define));
    reg.register(Rc::new(common::Undefine));
    reg.register(Rc::new(common::Debug));
    reg.register(Rc::new(common::ErrorCommand));
}

// ── Shared step logic ─────────────────────────────────────────────────────────

/// The innermost `name` header whose block contains step `pos`.
pub(crate) fn enclosing(entries: &[CommandEntry], pos: usize, name: &str) -> Option<(usize, Block)> {
    entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_header(name))
        .filter_map(|(h, e)| e.block.filter(|b| b.contains(pos)).map(|b| (h, b)))
        .last()
}

/// The first `mark` step named `name`.
pub(crate) fn find_mark(entries: &[CommandEntry], name: &str) -> Option<usize> {
    entries
        .iter()
        .position(|e| e.is_header("mark") && e.static_arg(0).as_deref() == Some(name))
}

/// The header/continuation pair a step belongs to: `(header, block, at_continuation)`.
pub(crate) fn loop_position(entries: &[CommandEntry], index: usize) -> Option<(usize, Block, bool)> {
    let entry = &entries[index];
    match entry.continuation_of() {
        Some(h) => entries[h].block.map(|b| (h, b, true)),
        None => entry.block.map(|b| (index, b, false)),
    }
}

/// Move the cursor after a loop test.  See the module docs.
pub(crate) fn iterate(exec: &mut Exec<'_>, header: usize, block: Block, at_continuation: bool, entered: bool) -> Flow {
    match (entered, at_continuation) {
        (true, true) => exec.set_cursor(header),
        (false, false) => exec.set_cursor(block.end),
        _ => {}
    }
    Flow::Continue
}

/// `stop`/`next` inside a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopJump {
    Stop,
    Next,
}

impl LoopJump {
    /// The keyword form of a loop command: one static `stop`/`next` argument
    /// and no block.
    pub(crate) fn of(entry: &CommandEntry) -> Option<LoopJump> {
        if entry.block.is_some() || entry.marker.is_some() || entry.args.len() != 1 {
            return None;
        }
        match entry.static_arg(0).as_deref() {
            Some("stop") => Some(LoopJump::Stop),
            Some("next") => Some(LoopJump::Next),
            _ => None,
        }
    }

    fn keyword(self) -> &'static str {
        match self {
            LoopJump::Stop => "stop",
            LoopJump::Next => "next",
        }
    }
}

/// Resolve a loop keyword at step `index` to its loop's header and block.
pub(crate) fn loop_target(
    entries: &[CommandEntry],
    index: usize,
    name: &str,
    jump: LoopJump,
) -> Result<(usize, Block), CommandError> {
    enclosing(entries, index, name).ok_or_else(|| {
        CommandError::jump(format!("'{name} {}' outside of a {name} loop", jump.keyword()))
    })
}

pub(crate) fn apply_loop_jump(exec: &mut Exec<'_>, header: usize, block: Block, jump: LoopJump) -> Flow {
    match jump {
        LoopJump::Stop => {
            exec.take_data(header);
            exec.set_cursor(block.end);
        }
        // The continuation runs next and decides.
        LoopJump::Next => exec.set_cursor(block.end - 1),
    }
    Flow::Continue
}

/// Parse-time shape of a loop command: the keyword form takes no block,
/// every other form needs one.
pub(crate) fn check_loop(entries: &[CommandEntry], index: usize) -> Result<(), String> {
    let entry = &entries[index];
    if LoopJump::of(entry).is_some() {
        return Ok(());
    }
    match entry.block {
        Some(_) => Ok(()),
        None => Err(format!("'{}' needs a block", entry.name)),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parser::parse;

    fn entries(src: &str) -> Vec<CommandEntry> {
        parse(src, "t", &CommandRegistry::with_builtins()).unwrap()
    }

    #[test]
    fn innermost_enclosing_loop_wins() {
        let e = entries("repeat 2 {\n repeat 3 {\n  repeat stop\n }\n}");
        assert_eq!(enclosing(&e, 2, "repeat").map(|(h, _)| h), Some(1));
        assert_eq!(enclosing(&e, 3, "repeat").map(|(h, _)| h), Some(0));
        assert_eq!(enclosing(&e, 4, "repeat"), None);
    }

    #[test]
    fn marks_by_name() {
        let e = entries("mark a\necho x\nmark b");
        assert_eq!(find_mark(&e, "b"), Some(2));
        assert_eq!(find_mark(&e, "c"), None);
    }

    #[test]
    fn keyword_form_detection() {
        let e = entries("repeat 1 {\n repeat next\n}");
        assert_eq!(LoopJump::of(&e[0]), None);
        assert_eq!(LoopJump::of(&e[1]), Some(LoopJump::Next));
        assert_eq!(LoopJump::of(&e[2]), None);
    }

    #[test]
    fn loop_keyword_outside_loop() {
        let e = entries("while stop");
        let err = loop_target(&e, 0, "while", LoopJump::Stop).unwrap_err();
        assert_eq!(err.message, "'while stop' outside of a while loop");
    }
}
