//! The engine: registries, named scripts and functions, shared settings.
//!
//! An [`Engine`] is shared (immutably) by every queue it runs.  Scripts and
//! functions can be (re)defined while queues run, so those maps sit behind
//! `RefCell`s; a redefinition replaces the `Rc<Script>`, and queues already
//! executing the old body keep it alive until their frame pops.

use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use log::debug;

use crate::config::EngineConfig;

use super::command::{Block, CommandEntry, CommandRegistry};
use super::compile::{compile, CompiledProcedure};
use super::handlers::TagRegistry;
use super::parser::{parse, ScriptError};
use super::queue::Queue;

// ── Script ────────────────────────────────────────────────────────────────────

/// A parsed script: its steps and, once built, its compiled procedure.
pub struct Script {
    name: String,
    entries: Vec<CommandEntry>,
    compiled: OnceCell<Rc<CompiledProcedure>>,
}

impl Script {
    pub fn new(name: impl Into<String>, entries: Vec<CommandEntry>) -> Self {
        Script { name: name.into(), entries, compiled: OnceCell::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entries(&self) -> &[CommandEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The compiled procedure, built on first use.
    pub fn compiled(&self, engine: &Engine) -> Rc<CompiledProcedure> {
        let procedure = self.compiled.get_or_init(|| {
            debug!("compiling '{}' ({} steps)", self.name, self.entries.len());
            Rc::new(compile(engine, self))
        });
        Rc::clone(procedure)
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.get().is_some()
    }

    /// The steps of `block` as a script of their own, indices rebased to 0.
    /// Errors inside it are still attributed to this script's name.
    pub fn extract(&self, block: Block) -> Script {
        let entries = self.entries[block.start..block.end]
            .iter()
            .map(|e| e.rebased(block.start))
            .collect();
        Script::new(self.name.clone(), entries)
    }
}

impl std::fmt::Debug for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Script")
            .field("name", &self.name)
            .field("steps", &self.entries.len())
            .field("compiled", &self.is_compiled())
            .finish()
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

pub struct Engine {
    commands: CommandRegistry,
    tags: TagRegistry,
    config: EngineConfig,
    scripts: RefCell<HashMap<String, Rc<Script>>>,
    functions: RefCell<HashMap<String, Rc<Script>>>,
    /// Queues started by `run`, waiting to join the scheduler.
    spawned: RefCell<Vec<Queue>>,
}

impl Engine {
    /// An engine with the built-in commands and tag handlers.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_registries(config, CommandRegistry::with_builtins(), TagRegistry::with_builtins())
    }

    pub fn with_registries(config: EngineConfig, commands: CommandRegistry, tags: TagRegistry) -> Self {
        Engine {
            commands,
            tags,
            config,
            scripts: RefCell::new(HashMap::new()),
            functions: RefCell::new(HashMap::new()),
            spawned: RefCell::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    pub fn tags(&self) -> &TagRegistry {
        &self.tags
    }

    /// Parse `src` without registering it.
    pub fn parse(&self, name: &str, src: &str) -> Result<Script, ScriptError> {
        let entries = parse(src, name, &self.commands)?;
        debug!("parsed '{name}' ({} steps)", entries.len());
        Ok(Script::new(name, entries))
    }

    /// Parse and register `src` under `name`, replacing any previous script
    /// (and with it, its compiled procedure).
    pub fn load(&self, name: &str, src: &str) -> Result<Rc<Script>, ScriptError> {
        let script = Rc::new(self.parse(name, src)?);
        self.scripts.borrow_mut().insert(name.to_owned(), Rc::clone(&script));
        Ok(script)
    }

    /// Load a script file, registered under its file stem.
    pub fn load_file(&self, path: &Path) -> Result<Rc<Script>, crate::Error> {
        let src = std::fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(self.load(&name, &src)?)
    }

    pub fn script(&self, name: &str) -> Option<Rc<Script>> {
        self.scripts.borrow().get(name).cloned()
    }

    pub fn define_function(&self, name: &str, body: Rc<Script>) {
        self.functions.borrow_mut().insert(name.to_owned(), body);
    }

    pub fn function(&self, name: &str) -> Option<Rc<Script>> {
        self.functions.borrow().get(name).cloned()
    }

    /// Queue a spawned queue for the scheduler, which empties the inbox at
    /// the end of every round.
    pub(crate) fn spawn(&self, queue: Queue) {
        self.spawned.borrow_mut().push(queue);
    }

    pub(crate) fn take_spawned(&self) -> Vec<Queue> {
        std::mem::take(&mut *self.spawned.borrow_mut())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut scripts: Vec<_> = self.scripts.borrow().keys().cloned().collect();
        scripts.sort();
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("scripts", &scripts)
            .finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
