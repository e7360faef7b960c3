//! Leaf commands: output, variables, verbosity, raising errors.

use crate::config::DebugMode;
use crate::script::command::{
    debug_mode_arg, name_arg, typed_arg, ArgPredicate, Command, CommandEntry, CommandError, CommandMeta, Flow,
    Operand, VarRef,
};
use crate::script::compile::{CompileCx, CompiledArg, Op};
use crate::script::queue::Exec;

const NAME: &[Option<ArgPredicate>] = &[Some(name_arg)];
const NAME_AND_VALUE: &[Option<ArgPredicate>] = &[Some(name_arg), Some(typed_arg)];
const MODE: &[Option<ArgPredicate>] = &[Some(debug_mode_arg)];

/// Evaluate every argument and join them with single spaces.
fn joined<O: Operand>(exec: &mut Exec<'_>, args: &[O]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&arg.text(exec));
    }
    out
}

// ── echo ──────────────────────────────────────────────────────────────────────

static ECHO: CommandMeta = CommandMeta::new("echo", "echo [text ...]").args(0, None);

pub struct Echo;

impl Command for Echo {
    fn meta(&self) -> &CommandMeta {
        &ECHO
    }

    fn execute(&self, exec: &mut Exec<'_>, entry: &CommandEntry) -> Result<Flow, CommandError> {
        let line = joined(exec, &entry.args);
        exec.echo(line);
        Ok(Flow::Continue)
    }

    fn compile(&self, cx: &mut CompileCx<'_>, index: usize) -> Option<Op> {
        let args = cx.args(&cx.entries()[index].args);
        Some(Box::new(move |exec: &mut Exec<'_>, _: &CommandEntry| {
            let line = joined(exec, &args);
            exec.echo(line);
            Ok(Flow::Continue)
        }))
    }
}

// ── define / undefine ─────────────────────────────────────────────────────────

static DEFINE: CommandMeta = CommandMeta::new("define", "define <name> <value>")
    .args(2, Some(2))
    .predicates(NAME_AND_VALUE);

pub struct Define;

impl Define {
    fn apply(exec: &mut Exec<'_>, var: &VarRef, name: &str, value: &CompiledArg) {
        let v = value.value(exec);
        exec.info(format_args!("{name} = {v}"));
        exec.assign(var, v);
    }
}

impl Command for Define {
    fn meta(&self) -> &CommandMeta {
        &DEFINE
    }

    fn execute(&self, exec: &mut Exec<'_>, entry: &CommandEntry) -> Result<Flow, CommandError> {
        let name = exec.text(&entry.args[0]);
        let v = exec.eval(&entry.args[1]);
        exec.info(format_args!("{name} = {v}"));
        exec.set_var(&name, v);
        Ok(Flow::Continue)
    }

    fn compile(&self, cx: &mut CompileCx<'_>, index: usize) -> Option<Op> {
        let entry = &cx.entries()[index];
        let name = entry.static_arg(0)?;
        let var = cx.var_ref(&entry.args[0])?;
        let value = cx.arg(&entry.args[1]);
        Some(Box::new(move |exec: &mut Exec<'_>, _: &CommandEntry| {
            Define::apply(exec, &var, &name, &value);
            Ok(Flow::Continue)
        }))
    }
}

static UNDEFINE: CommandMeta = CommandMeta::new("undefine", "undefine <name>").args(1, Some(1)).predicates(NAME);

pub struct Undefine;

impl Command for Undefine {
    fn meta(&self) -> &CommandMeta {
        &UNDEFINE
    }

    fn execute(&self, exec: &mut Exec<'_>, entry: &CommandEntry) -> Result<Flow, CommandError> {
        let name = exec.text(&entry.args[0]);
        exec.unset_var(&name);
        exec.info(format_args!("'{name}' undefined"));
        Ok(Flow::Continue)
    }

    fn compile(&self, cx: &mut CompileCx<'_>, index: usize) -> Option<Op> {
        let entry = &cx.entries()[index];
        let name = entry.static_arg(0)?;
        let var = cx.var_ref(&entry.args[0])?;
        Some(Box::new(move |exec: &mut Exec<'_>, _: &CommandEntry| {
            exec.unassign(&var);
            exec.info(format_args!("'{name}' undefined"));
            Ok(Flow::Continue)
        }))
    }
}

// ── debug ─────────────────────────────────────────────────────────────────────

static DEBUG: CommandMeta = CommandMeta::new("debug", "debug full|minimal|none").args(1, Some(1)).predicates(MODE);

/// Set the current frame's verbosity.  Frames pushed by `call` inherit it.
pub struct Debug;

impl Command for Debug {
    fn meta(&self) -> &CommandMeta {
        &DEBUG
    }

    fn execute(&self, exec: &mut Exec<'_>, entry: &CommandEntry) -> Result<Flow, CommandError> {
        let text = exec.text(&entry.args[0]);
        let mode = DebugMode::from_name(&text)
            .ok_or_else(|| CommandError::execution(format!("'{text}' is not a debug mode")))?;
        exec.set_debug_mode(mode);
        exec.info(format_args!("debug mode {}", text.to_ascii_lowercase()));
        Ok(Flow::Continue)
    }
}

// ── error ─────────────────────────────────────────────────────────────────────

static ERROR: CommandMeta = CommandMeta::new("error", "error <message ...>").args(1, None);

/// Raise a command error with the joined arguments as its message.
pub struct ErrorCommand;

impl Command for ErrorCommand {
    fn meta(&self) -> &CommandMeta {
        &ERROR
    }

    fn execute(&self, exec: &mut Exec<'_>, entry: &CommandEntry) -> Result<Flow, CommandError> {
        Err(CommandError::execution(joined(exec, &entry.args)))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use crate::config::{DebugMode, EngineConfig, ExecutionMode};
    use crate::script::engine::Engine;
    use crate::script::queue::Queue;
    use crate::script::value::Value;

    fn run(mode: ExecutionMode, debug: DebugMode, src: &str) -> Queue {
        let engine = Engine::new(EngineConfig { execution: mode, default_debug: debug, ..EngineConfig::default() });
        let script = engine.load("main", src).expect("parse failed");
        let mut q = Queue::new(&engine, script);
        q.start();
        q.advance(&engine, 0.0);
        q
    }

    fn both(debug: DebugMode, src: &str) -> Queue {
        let a = run(ExecutionMode::Interpret, debug, src);
        let b = run(ExecutionMode::Compile, debug, src);
        assert_eq!(a.output(), b.output());
        assert_eq!(a.variables(), b.variables());
        a
    }

    #[test]
    fn echo_joins_arguments() {
        let q = both(DebugMode::Minimal, "echo a   b \"c  d\"\necho");
        assert_eq!(q.output(), ["a b c  d", ""]);
    }

    #[test]
    fn define_infers_literal_types() {
        let q = both(DebugMode::Minimal, "define a 3\ndefine b 1.5\ndefine c true\ndefine d hello");
        assert_eq!(q.var("a"), Some(&Value::Integer(3)));
        assert_eq!(q.var("b"), Some(&Value::Number(1.5)));
        assert_eq!(q.var("c"), Some(&Value::Boolean(true)));
        assert_eq!(q.var("d"), Some(&Value::text("hello")));
    }

    #[test]
    fn define_keeps_tag_type() {
        let q = both(DebugMode::Minimal, "define l <{list[a|b]}>\ndefine n <{var[l].size}>");
        assert_eq!(q.var("n"), Some(&Value::Integer(2)));
    }

    #[test]
    fn undefine_removes_variable() {
        let q = both(DebugMode::Minimal, "define x 1\nundefine x\necho <{var[x] || gone}>");
        assert_eq!(q.output(), ["gone"]);
        assert!(q.var("x").is_none());
        assert!(q.variables().is_empty());
    }

    #[test]
    fn full_debug_shows_info_lines() {
        let q = both(DebugMode::Full, "define x 1\nundefine x");
        assert_eq!(q.output(), ["+> x = 1", "+> 'x' undefined"]);
        let q = both(DebugMode::Minimal, "define x 1");
        assert!(q.output().is_empty());
    }

    #[test]
    fn debug_switches_mode_mid_script() {
        let q = both(DebugMode::Minimal, "define a 1\ndebug full\ndefine b 2\ndebug none\nerror hidden\necho x");
        assert_eq!(q.output(), ["+> debug mode full", "+> b = 2"]);
    }

    #[test]
    fn error_joins_message() {
        let q = both(DebugMode::Minimal, "echo before\nerror something <{text[bad]}> happened");
        assert_eq!(q.output(), ["before", "main:2: something bad happened"]);
    }
}
