//! Script text → step list.
//!
//! Parsing runs in two passes.  The lexer turns text into words, braces and
//! separators, keeping quoted words and `<{...}>` tags intact.  The block
//! builder then groups words into statements, resolves each statement
//! against the [`CommandRegistry`], and lays nested blocks out flat:
//!
//! ```text
//! 0  repeat 2 {          block = 1..3
//! 1    echo a
//! 2    echo b
//! 3  }                   continuation of 0
//! 4  echo done
//! ```
//!
//! Every block is followed by a synthetic continuation step that shares its
//! header's command and carries an [`EntryMarker`].  Loops use it to jump
//! back; everything else treats it as a no-op.

use thiserror::Error;

use super::command::{Block, BlockUse, CommandEntry, CommandRegistry, EntryMarker};
use super::tag::Argument;

// ── Errors ────────────────────────────────────────────────────────────────────

/// A script that cannot run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("{script}:{line}: {message}")]
    Parse { script: String, line: usize, message: String },

    #[error("{script}:{line}: {message} (usage: {usage})")]
    ArgumentValidation { script: String, line: usize, message: String, usage: String },
}

impl ScriptError {
    pub fn line(&self) -> usize {
        match self {
            ScriptError::Parse { line, .. } | ScriptError::ArgumentValidation { line, .. } => *line,
        }
    }
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Word { text: String, quoted: bool },
    Open,
    Close,
    Sep,
}

struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    script: &'a str,
    toks: Vec<(Tok, usize)>,
    word: Option<(String, usize)>,
}

impl<'a> Lexer<'a> {
    fn new(src: &str, script: &'a str) -> Self {
        Lexer { chars: src.chars().collect(), pos: 0, line: 1, script, toks: Vec::new(), word: None }
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Parse { script: self.script.to_owned(), line: self.line, message: message.into() }
    }

    fn flush(&mut self) {
        if let Some((text, line)) = self.word.take() {
            let tok = match text.as_str() {
                "{" => Tok::Open,
                "}" => Tok::Close,
                _ => Tok::Word { text, quoted: false },
            };
            self.toks.push((tok, line));
        }
    }

    fn word_mut(&mut self) -> &mut String {
        let line = self.line;
        &mut self.word.get_or_insert_with(|| (String::new(), line)).0
    }

    fn run(mut self) -> Result<Vec<(Tok, usize)>, ScriptError> {
        while let Some(c) = self.peek_at(0) {
            match c {
                '\n' => {
                    self.flush();
                    self.toks.push((Tok::Sep, self.line));
                    self.line += 1;
                    self.pos += 1;
                }
                ';' => {
                    self.flush();
                    self.toks.push((Tok::Sep, self.line));
                    self.pos += 1;
                }
                c if c.is_whitespace() => {
                    self.flush();
                    self.pos += 1;
                }
                '/' if self.word.is_none() && self.peek_at(1) == Some('/') => {
                    while self.peek_at(0).is_some_and(|c| c != '\n') {
                        self.pos += 1;
                    }
                }
                '"' if self.word.is_none() => {
                    let line = self.line;
                    let text = self.quoted()?;
                    self.toks.push((Tok::Word { text, quoted: true }, line));
                }
                // `name="a b"` stays one word.
                '"' if self.word.as_ref().is_some_and(|(w, _)| w.ends_with('=')) => {
                    let text = self.quoted()?;
                    self.word_mut().push_str(&text);
                }
                '<' if self.peek_at(1) == Some('{') => {
                    let mut tag = String::new();
                    self.tag(&mut tag)?;
                    self.word_mut().push_str(&tag);
                }
                c => {
                    self.word_mut().push(c);
                    self.pos += 1;
                }
            }
        }
        self.flush();
        Ok(self.toks)
    }

    /// Read a `"..."` word starting at the opening quote.
    fn quoted(&mut self) -> Result<String, ScriptError> {
        let mut out = String::new();
        self.pos += 1;
        loop {
            match self.peek_at(0) {
                None | Some('\n') => return Err(self.error("unterminated quote")),
                Some('\\') if matches!(self.peek_at(1), Some('"' | '\\')) => {
                    out.extend(self.peek_at(1));
                    self.pos += 2;
                }
                Some('"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some('<') if self.peek_at(1) == Some('{') => self.tag(&mut out)?,
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    /// Copy a `<{...}>` tag, nested tags included, into `out`.
    fn tag(&mut self, out: &mut String) -> Result<(), ScriptError> {
        let mut depth = 0usize;
        loop {
            match (self.peek_at(0), self.peek_at(1)) {
                (Some('<'), Some('{')) => {
                    depth += 1;
                    out.push_str("<{");
                    self.pos += 2;
                }
                (Some('}'), Some('>')) => {
                    depth -= 1;
                    out.push_str("}>");
                    self.pos += 2;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                (None | Some('\n'), _) => return Err(self.error("unterminated tag")),
                (Some(c), _) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }
}

// ── Block builder ─────────────────────────────────────────────────────────────

struct Statement {
    words: Vec<(String, bool)>,
    line: usize,
}

struct Builder<'a> {
    toks: std::vec::IntoIter<(Tok, usize)>,
    script: &'a str,
    commands: &'a CommandRegistry,
    entries: Vec<CommandEntry>,
}

/// Parse `src` into steps.  `script` names the script in error messages.
pub fn parse(src: &str, script: &str, commands: &CommandRegistry) -> Result<Vec<CommandEntry>, ScriptError> {
    let toks = Lexer::new(src, script).run()?;
    let mut builder = Builder { toks: toks.into_iter(), script, commands, entries: Vec::new() };
    builder.block(None)?;
    let entries = builder.entries;

    for (i, entry) in entries.iter().enumerate() {
        if entry.marker.is_some() {
            continue;
        }
        if let Some(command) = &entry.command {
            command.check(&entries, i).map_err(|message| ScriptError::ArgumentValidation {
                script: script.to_owned(),
                line: entry.line,
                message,
                usage: command.meta().usage.to_owned(),
            })?;
        }
    }
    Ok(entries)
}

impl Builder<'_> {
    fn parse_error(&self, line: usize, message: impl Into<String>) -> ScriptError {
        ScriptError::Parse { script: self.script.to_owned(), line, message: message.into() }
    }

    /// Parse statements until the matching `}` (or the end, at top level).
    fn block(&mut self, opened_on: Option<usize>) -> Result<(), ScriptError> {
        let mut pending: Option<Statement> = None;
        let mut complete = false;

        while let Some((tok, line)) = self.toks.next() {
            match tok {
                Tok::Sep => complete = pending.is_some(),
                Tok::Word { text, quoted } => {
                    if complete {
                        if let Some(stmt) = pending.take() {
                            self.emit(stmt, false)?;
                        }
                        complete = false;
                    }
                    pending
                        .get_or_insert_with(|| Statement { words: Vec::new(), line })
                        .words
                        .push((text, quoted));
                }
                Tok::Open => {
                    let Some(stmt) = pending.take() else {
                        return Err(self.parse_error(line, "block without a command"));
                    };
                    complete = false;
                    self.emit_with_block(stmt, line)?;
                }
                Tok::Close => {
                    if opened_on.is_none() {
                        return Err(self.parse_error(line, "unmatched '}'"));
                    }
                    if let Some(stmt) = pending.take() {
                        self.emit(stmt, false)?;
                    }
                    return Ok(());
                }
            }
        }

        if let Some(stmt) = pending.take() {
            self.emit(stmt, false)?;
        }
        match opened_on {
            Some(open) => Err(self.parse_error(open, "block is never closed")),
            None => Ok(()),
        }
    }

    fn emit(&mut self, stmt: Statement, has_block: bool) -> Result<(), ScriptError> {
        let entry = self.build(stmt, has_block)?;
        self.entries.push(entry);
        Ok(())
    }

    fn emit_with_block(&mut self, stmt: Statement, open_line: usize) -> Result<(), ScriptError> {
        let header = self.entries.len();
        self.emit(stmt, true)?;
        self.block(Some(open_line))?;
        let end = self.entries.len();

        let head = &mut self.entries[header];
        head.block = Some(Block { start: header + 1, end });
        let continuation = CommandEntry {
            name: head.name.clone(),
            command: head.command.clone(),
            args: Vec::new(),
            block: None,
            marker: Some(EntryMarker::Continuation { header }),
            // Re-tests report against the header.
            line: head.line,
            wait: false,
        };
        self.entries.push(continuation);
        Ok(())
    }

    fn build(&self, stmt: Statement, has_block: bool) -> Result<CommandEntry, ScriptError> {
        let line = stmt.line;
        let mut words = stmt.words.into_iter();
        let Some((head, _)) = words.next() else {
            return Err(self.parse_error(line, "empty statement"));
        };
        let (name, wait) = match head.strip_prefix('&') {
            Some(rest) => (rest.to_owned(), true),
            None => (head, false),
        };

        let mut args = Vec::new();
        for (text, quoted) in words {
            args.push(Argument::parse(&text, quoted).map_err(|m| self.parse_error(line, m))?);
        }

        let command = self.commands.get(&name).cloned();
        let mut entry = CommandEntry { name, command, args, block: None, marker: None, line, wait };
        if let Some(command) = entry.command.clone() {
            self.validate(&mut entry, command.meta(), has_block)?;
        }
        Ok(entry)
    }

    fn validate(
        &self,
        entry: &mut CommandEntry,
        meta: &super::command::CommandMeta,
        has_block: bool,
    ) -> Result<(), ScriptError> {
        let invalid = |message: String| ScriptError::ArgumentValidation {
            script: self.script.to_owned(),
            line: entry.line,
            message,
            usage: meta.usage.to_owned(),
        };

        let n = entry.args.len();
        if n < meta.min_args || meta.max_args.is_some_and(|max| n > max) {
            let expected = match meta.max_args {
                Some(max) if max == meta.min_args => format!("{max}"),
                Some(max) => format!("{} to {max}", meta.min_args),
                None => format!("at least {}", meta.min_args),
            };
            return Err(invalid(format!("'{}' takes {expected} argument(s), got {n}", meta.name)));
        }

        for (i, arg) in entry.args.iter_mut().enumerate() {
            let Some(Some(predicate)) = meta.predicates.get(i) else { continue };
            let Some(text) = arg.static_text() else { continue };
            match predicate(&text) {
                Some(value) => arg.literal = Some(value),
                None => return Err(invalid(format!("invalid argument {} '{text}'", i + 1))),
            }
        }

        if entry.wait && !meta.waitable {
            return Err(invalid(format!("'{}' cannot be waited on", meta.name)));
        }
        match (meta.block, has_block) {
            (BlockUse::None, true) => Err(invalid(format!("'{}' does not take a block", meta.name))),
            (BlockUse::Required, false) => Err(invalid(format!("'{}' needs a block", meta.name))),
            _ => Ok(()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
