//! tagscript: a tick-driven command scripting engine.
//!
//! Scripts are parsed into steps ([`script::parser`]), evaluated with an
//! embedded tag language (`<{var[x].length}>`, [`script::eval`]), and run as
//! resumable queues advanced once per scheduler tick ([`script::queue`],
//! [`script::scheduler`]).  A script can also be compiled into closure-threaded
//! ops ([`script::compile`]) that behave identically with less per-step work.
//!
//! ```rust
//! use std::rc::Rc;
//! use tagscript::{Engine, EngineConfig, Scheduler};
//!
//! let engine = Rc::new(Engine::new(EngineConfig::default()));
//! engine.load("main", "repeat 2 i { echo tick <{var[i]}> }").unwrap();
//! let mut sched = Scheduler::new(Rc::clone(&engine));
//! let id = sched.create_queue_named("main").unwrap();
//! sched.advance_all(0.05);
//! assert_eq!(sched.take_output(id), ["tick 1", "tick 2"]);
//! ```

use thiserror::Error;

pub mod cli;
pub mod config;
pub mod script;

pub use config::{Config, ConfigError, DebugMode, EngineConfig, ErrorMode, ExecutionMode};
pub use script::engine::{Engine, Script};
pub use script::parser::ScriptError;
pub use script::queue::{Queue, QueueStatus};
pub use script::scheduler::{QueueId, Scheduler};
pub use script::value::{Value, ValueType};

/// Errors from loading scripts off disk.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Script(#[from] ScriptError),
}
