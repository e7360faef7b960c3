//! `tagscriptrc` configuration file parser and engine settings.
//!
//! The rc file is a list of `set` directives:
//!
//! | Directive | Action |
//! |-----------|--------|
//! | `set debug=full\|minimal\|none` | default debug verbosity for new queues |
//! | `set errors=strict\|lenient` | what an unrecovered command error does |
//! | `set execution=interpret\|compile` | which execution path queues use |
//! | `set max_call_depth=<n>` | frame stack limit for `call` |
//! | `set tick=<ms>` | runner tick interval |
//! | Lines starting with `;` or `//` | comment, ignored |
//!
//! `set name value` (space instead of `=`) is accepted too.  Problems are
//! collected as [`ConfigError`]s; the rest of the file still loads.

use std::path::Path;

use thiserror::Error;

// ── Modes ─────────────────────────────────────────────────────────────────────

/// How much a queue reports.  Error lines are shown unless `None`;
/// informational `+>` lines only with `Full`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugMode {
    Full,
    #[default]
    Minimal,
    None,
}

impl DebugMode {
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Some(DebugMode::Full),
            "minimal" => Some(DebugMode::Minimal),
            "none" => Some(DebugMode::None),
            _ => None,
        }
    }

    pub fn shows_errors(self) -> bool {
        self != DebugMode::None
    }

    pub fn shows_info(self) -> bool {
        self == DebugMode::Full
    }
}

/// What an execution error outside any `try` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    /// Stop the queue.
    #[default]
    Strict,
    /// Report it and continue with the next step.
    Lenient,
}

impl ErrorMode {
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(ErrorMode::Strict),
            "lenient" => Some(ErrorMode::Lenient),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    #[default]
    Interpret,
    Compile,
}

impl ExecutionMode {
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interpret" => Some(ExecutionMode::Interpret),
            "compile" => Some(ExecutionMode::Compile),
            _ => None,
        }
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a config file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

/// Settings every queue of an engine shares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub default_debug: DebugMode,
    pub error_mode: ErrorMode,
    pub execution: ExecutionMode,
    pub max_call_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            default_debug: DebugMode::default(),
            error_mode: ErrorMode::default(),
            execution: ExecutionMode::default(),
            max_call_depth: 64,
        }
    }
}

pub const DEFAULT_TICK_MS: u64 = 50;

/// Everything an rc file can set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub engine: EngineConfig,
    pub tick_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config { engine: EngineConfig::default(), tick_ms: DEFAULT_TICK_MS }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an rc string.  Returns the config and any errors on individual
    /// lines.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with(';') || line.starts_with("//") {
                continue;
            }

            let (cmd, rest) = line
                .split_once(|c: char| c.is_ascii_whitespace())
                .unwrap_or((line, ""));
            if cmd != "set" {
                errors.push(ConfigError { line: lineno, message: format!("unknown directive '{cmd}'") });
                continue;
            }
            if let Err(message) = config.set(rest.trim()) {
                errors.push(ConfigError { line: lineno, message });
            }
        }

        (config, errors)
    }

    /// Read and parse an rc file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    /// Apply one `name=value` (or `name value`) setting.
    pub fn set(&mut self, setting: &str) -> Result<(), String> {
        let (name, value) = setting
            .split_once('=')
            .or_else(|| setting.split_once(|c: char| c.is_ascii_whitespace()))
            .ok_or_else(|| format!("'set {setting}' has no value"))?;
        let (name, value) = (name.trim(), value.trim());
        let bad = || format!("invalid value '{value}' for '{name}'");

        match name {
            "debug" => self.engine.default_debug = DebugMode::from_name(value).ok_or_else(bad)?,
            "errors" => self.engine.error_mode = ErrorMode::from_name(value).ok_or_else(bad)?,
            "execution" => self.engine.execution = ExecutionMode::from_name(value).ok_or_else(bad)?,
            "max_call_depth" => {
                self.engine.max_call_depth = value.parse().ok().filter(|&n| n > 0).ok_or_else(bad)?;
            }
            "tick" => self.tick_ms = value.parse().ok().filter(|&n| n > 0).ok_or_else(bad)?,
            _ => return Err(format!("unknown setting '{name}'")),
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = Config::new();
        assert_eq!(c.engine.error_mode, ErrorMode::Strict);
        assert_eq!(c.engine.execution, ExecutionMode::Interpret);
        assert_eq!(c.engine.default_debug, DebugMode::Minimal);
        assert_eq!(c.tick_ms, DEFAULT_TICK_MS);
    }

    #[test]
    fn set_equals_syntax() {
        let (c, errs) = Config::load_str("set execution=compile");
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(c.engine.execution, ExecutionMode::Compile);
    }

    #[test]
    fn set_space_syntax() {
        let (c, errs) = Config::load_str("set errors lenient");
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(c.engine.error_mode, ErrorMode::Lenient);
    }

    #[test]
    fn comments_and_blank_lines() {
        let (c, errs) = Config::load_str(";; comment\n\n// another\nset debug=full\n");
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(c.engine.default_debug, DebugMode::Full);
    }

    #[test]
    fn errors_carry_line_numbers() {
        let (c, errs) = Config::load_str("set tick=20\nset colour=red\nset debug=loud\nbogus\n");
        assert_eq!(c.tick_ms, 20);
        let lines: Vec<_> = errs.iter().map(|e| e.line).collect();
        assert_eq!(lines, [2, 3, 4]);
        assert!(errs[0].to_string().starts_with("line 2:"));
    }

    #[test]
    fn rejects_zero_depth() {
        let (c, errs) = Config::load_str("set max_call_depth=0");
        assert_eq!(errs.len(), 1);
        assert_eq!(c.engine.max_call_depth, 64);
    }
}
