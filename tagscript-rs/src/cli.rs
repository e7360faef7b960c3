//! Command-line argument parsing.
//!
//! Usage:
//!   tagscript [-c] [-s] [-d full|minimal|none] [-t <ms>] [-f[<rc>]] <script>...

use std::path::PathBuf;

use directories::ProjectDirs;

use crate::config::{Config, DebugMode, ErrorMode, ExecutionMode};

pub const USAGE: &str = "Usage: tagscript [-c] [-s] [-d full|minimal|none] [-t <ms>] [-f[<rc>]] <script>...";

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Which rc file to load.
    pub config: ConfigFile,
    /// Run queues through compiled procedures (`-c`).
    pub compile: bool,
    /// Continue after unrecovered errors (`-s`).
    pub lenient: bool,
    /// Default debug verbosity (`-d <mode>`).
    pub debug: Option<DebugMode>,
    /// Tick interval in milliseconds (`-t <ms>`).
    pub tick_ms: Option<u64>,
    /// Script files.  The first one runs; the others are only loaded, so
    /// `run` and `call` can reach them by file stem.
    pub scripts: Vec<PathBuf>,
}

/// How to choose the rc file.
#[derive(Debug, Default)]
pub enum ConfigFile {
    /// Look in the platform config directory, then `./.tagscriptrc` (default).
    #[default]
    Search,
    /// `-f` with no file argument: skip the rc file.
    Skip,
    /// `-f<file>`: load this specific file.
    Explicit(PathBuf),
}

impl CliArgs {
    /// Apply the flags on top of an rc-file configuration.
    pub fn apply(&self, config: &mut Config) {
        if self.compile {
            config.engine.execution = ExecutionMode::Compile;
        }
        if self.lenient {
            config.engine.error_mode = ErrorMode::Lenient;
        }
        if let Some(mode) = self.debug {
            config.engine.default_debug = mode;
        }
        if let Some(ms) = self.tick_ms {
            config.tick_ms = ms;
        }
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        // `--` ends flag processing.
        if arg == "--" {
            args.scripts.extend(argv[i + 1..].iter().map(PathBuf::from));
            break;
        }

        // Non-flag argument.
        if !arg.starts_with('-') || arg == "-" {
            args.scripts.push(PathBuf::from(arg));
            i += 1;
            continue;
        }

        // Flag argument: iterate over characters after the leading `-`.
        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'c' => args.compile = true,
                's' => args.lenient = true,

                // -f[<file>]
                'f' => {
                    if j + 1 < chars.len() {
                        let file: String = chars[j + 1..].iter().collect();
                        args.config = ConfigFile::Explicit(PathBuf::from(file));
                        j = chars.len();
                    } else if i + 1 < argv.len() && !argv[i + 1].starts_with('-') && i + 2 < argv.len() {
                        // Separate `-f <file>`, as long as a script still follows.
                        i += 1;
                        args.config = ConfigFile::Explicit(PathBuf::from(&argv[i]));
                    } else {
                        args.config = ConfigFile::Skip;
                    }
                }

                // -d<mode> / -d <mode>
                'd' => {
                    let value = take_value(&chars, &mut j, argv, &mut i, 'd')?;
                    let mode = DebugMode::from_name(&value).ok_or_else(|| format!("invalid debug mode: {value}"))?;
                    args.debug = Some(mode);
                }

                // -t<ms> / -t <ms>
                't' => {
                    let value = take_value(&chars, &mut j, argv, &mut i, 't')?;
                    let ms = value
                        .parse::<u64>()
                        .ok()
                        .filter(|&ms| ms > 0)
                        .ok_or_else(|| format!("invalid tick interval: {value}"))?;
                    args.tick_ms = Some(ms);
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    if args.scripts.is_empty() {
        return Err("no script given".to_owned());
    }
    Ok(args)
}

/// The value of a flag: the rest of this argument, or the next one.
fn take_value(chars: &[char], j: &mut usize, argv: &[String], i: &mut usize, flag: char) -> Result<String, String> {
    if *j + 1 < chars.len() {
        let s: String = chars[*j + 1..].iter().collect();
        *j = chars.len();
        Ok(s)
    } else if *i + 1 < argv.len() {
        *i += 1;
        Ok(argv[*i].clone())
    } else {
        Err(format!("-{flag} requires an argument"))
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// The rc file in the platform config directory, e.g.
/// `~/.config/tagscript/tagscriptrc` on Linux.
pub fn platform_config() -> Option<PathBuf> {
    ProjectDirs::from("", "", "tagscript").map(|dirs| dirs.config_dir().join("tagscriptrc"))
}

/// Search for the rc file in the standard locations.
/// Returns the first path that exists, or `None`.
pub fn find_user_config() -> Option<PathBuf> {
    platform_config()
        .into_iter()
        .chain(std::iter::once(PathBuf::from("./.tagscriptrc")))
        .find(|p| p.exists())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|&s| s.to_owned()).collect()
    }

    #[test]
    fn script_required() {
        assert!(parse_argv(&argv(&[])).is_err());
        assert!(parse_argv(&argv(&["-c"])).is_err());
    }

    #[test]
    fn single_script() {
        let a = parse_argv(&argv(&["main.tag"])).unwrap();
        assert_eq!(a.scripts, [PathBuf::from("main.tag")]);
        assert!(!a.compile && !a.lenient);
        assert!(matches!(a.config, ConfigFile::Search));
    }

    #[test]
    fn combined_bool_flags() {
        let a = parse_argv(&argv(&["-cs", "a.tag", "b.tag"])).unwrap();
        assert!(a.compile && a.lenient);
        assert_eq!(a.scripts.len(), 2);
    }

    #[test]
    fn debug_and_tick_values() {
        let a = parse_argv(&argv(&["-d", "full", "-t20", "x"])).unwrap();
        assert_eq!(a.debug, Some(DebugMode::Full));
        assert_eq!(a.tick_ms, Some(20));
        assert!(parse_argv(&argv(&["-d", "loud", "x"])).is_err());
        assert!(parse_argv(&argv(&["-t", "0", "x"])).is_err());
        assert!(parse_argv(&argv(&["x", "-t"])).is_err());
    }

    #[test]
    fn config_skip() {
        let a = parse_argv(&argv(&["-f", "x"])).unwrap();
        assert!(matches!(a.config, ConfigFile::Skip));
        assert_eq!(a.scripts, [PathBuf::from("x")]);
    }

    #[test]
    fn config_explicit() {
        let a = parse_argv(&argv(&["-fmy.rc", "x"])).unwrap();
        assert!(matches!(&a.config, ConfigFile::Explicit(p) if p == &PathBuf::from("my.rc")));
        let a = parse_argv(&argv(&["-f", "my.rc", "x"])).unwrap();
        assert!(matches!(&a.config, ConfigFile::Explicit(p) if p == &PathBuf::from("my.rc")));
    }

    #[test]
    fn flags_override_config() {
        let a = parse_argv(&argv(&["-c", "-d", "none", "-t", "10", "x"])).unwrap();
        let mut config = Config::new();
        a.apply(&mut config);
        assert_eq!(config.engine.execution, ExecutionMode::Compile);
        assert_eq!(config.engine.default_debug, DebugMode::None);
        assert_eq!(config.tick_ms, 10);
        assert_eq!(config.engine.error_mode, ErrorMode::Strict);
    }

    #[test]
    fn double_dash_ends_flags() {
        let a = parse_argv(&argv(&["--", "-weird.tag"])).unwrap();
        assert_eq!(a.scripts, [PathBuf::from("-weird.tag")]);
    }

    #[test]
    fn unknown_flag() {
        assert!(parse_argv(&argv(&["-z", "x"])).is_err());
    }
}
