//! The scripting engine.
//!
//! | Module | Role |
//! |--------|------|
//! | [`value`] | dynamically typed values |
//! | [`tag`] | argument and tag-chain syntax |
//! | [`handlers`] | static tables of tag starters and per-type handlers |
//! | [`eval`] | tag resolution and condition evaluation |
//! | [`parser`] | script text → steps |
//! | [`command`] | the command contract and registry |
//! | [`commands`] | built-in commands |
//! | [`queue`] | running instances and the tick loop |
//! | [`engine`] | registries, named scripts and functions |
//! | [`scheduler`] | the live-queue set |
//! | [`compile`] | closure-threaded compilation |
//!
//! Scripts look like this:
//!
//! ```text
//! define greeting hello
//! repeat 3 i {
//!     if <{var[i]}> == 2 { repeat next }
//!     echo <{var[greeting].to_upper}> <{var[i]}>
//! }
//! try { call missing } catch { echo failed: <{var[error_message]}> }
//! ```

pub mod command;
pub mod commands;
pub mod compile;
pub mod engine;
pub mod eval;
pub mod handlers;
pub mod parser;
pub mod queue;
pub mod scheduler;
pub mod tag;
pub mod value;

// Re-exports for convenience.
pub use command::{Command, CommandRegistry};
pub use engine::{Engine, Script};
pub use eval::TagContext;
pub use handlers::TagRegistry;
pub use queue::Queue;
pub use scheduler::{QueueId, Scheduler};
pub use value::Value;
