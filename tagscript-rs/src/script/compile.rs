//! Closure-threaded compilation of step lists.
//!
//! [`compile`] turns a script's steps into one boxed closure ("op") per step
//! index.  A [`CompiledProcedure`] runs those ops in its own loop, indexing
//! them directly by cursor, and hands control back to the queue only when a
//! step does something other than continue within the same frame.
//!
//! What the ops save over interpreting:
//!
//! | Interpreter                                  | Compiled                               |
//! |----------------------------------------------|----------------------------------------|
//! | jump targets found by scanning the frame     | targets computed once                  |
//! | variables looked up by name                  | fixed slots for names known statically |
//! | every chain element dispatched by type table | statically typed chains call handlers directly |
//! | condition arguments re-lexed each time       | lexed once                             |
//!
//! Steps a command cannot specialise fall back to [`Command::execute`], so
//! every script compiles.  Output, errors (and their attribution), variable
//! state and suspension points are the same as when interpreting.
//!
//! [`Command::execute`]: super::command::Command::execute

use std::rc::Rc;

use indexmap::IndexSet;
use log::trace;

use super::command::{CommandEntry, CommandError, Flow, Operand, VarRef};
use super::engine::{Engine, Script};
use super::eval::{eval_condition, settle, walk, CondPart, TagContext};
use super::handlers::{undefined_variable, HandlerFn, ReturnType, StarterFn, TagRegistry};
use super::queue::{unknown_command, Control, Exec, Queue};
use super::tag::{ArgBit, Argument, TagChain};
use super::value::{Value, ValueType};

/// One compiled step.
pub type Op = Box<dyn Fn(&mut Exec<'_>, &CommandEntry) -> Result<Flow, CommandError>>;

// ── Procedure ─────────────────────────────────────────────────────────────────

pub struct CompiledProcedure {
    ops: Vec<Op>,
    slot_names: Vec<String>,
    specialized: usize,
}

impl CompiledProcedure {
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Variable names with fixed slots, in slot order.
    pub fn slot_names(&self) -> &[String] {
        &self.slot_names
    }

    /// How many steps got a specialised op rather than the `execute`
    /// fallback.
    pub fn specialized_count(&self) -> usize {
        self.specialized
    }

    /// Run frame `t` of `queue` until it leaves the frame's fast path.
    pub(crate) fn run(&self, queue: &mut Queue, engine: &Engine, t: usize) -> Control {
        let script = Rc::clone(queue.frames()[t].script());
        loop {
            let index = queue.frames()[t].cursor;
            let Some(op) = self.ops.get(index) else {
                return Control::Next;
            };
            let entry = &script.entries()[index];
            trace!("{}:{}: {} (compiled step {index})", script.name(), entry.line, entry.name);
            let result = {
                let mut exec = Exec::new(queue, engine, t, &script, index);
                op(&mut exec, entry)
            };
            match result {
                Ok(Flow::Continue) if queue.frames().len() == t + 1 => queue.advance_cursor(t),
                other => return queue.after_step(t, other),
            }
        }
    }
}

impl std::fmt::Debug for CompiledProcedure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledProcedure")
            .field("ops", &self.ops.len())
            .field("specialized", &self.specialized)
            .field("slots", &self.slot_names)
            .finish()
    }
}

/// Compile every step of `script`.
pub fn compile(engine: &Engine, script: &Script) -> CompiledProcedure {
    let mut cx = CompileCx { engine, entries: script.entries(), slots: IndexSet::new() };
    let mut ops: Vec<Op> = Vec::with_capacity(script.len());
    let mut specialized = 0;

    for (index, entry) in script.entries().iter().enumerate() {
        let op = match &entry.command {
            Some(command) => match command.compile(&mut cx, index) {
                Some(op) => {
                    specialized += 1;
                    op
                }
                None => {
                    let command = Rc::clone(command);
                    Box::new(move |exec: &mut Exec<'_>, entry: &CommandEntry| command.execute(exec, entry)) as Op
                }
            },
            None => Box::new(|_: &mut Exec<'_>, entry: &CommandEntry| Err(unknown_command(entry))) as Op,
        };
        ops.push(op);
    }

    CompiledProcedure { ops, slot_names: cx.slots.into_iter().collect(), specialized }
}

// ── Compile context ───────────────────────────────────────────────────────────

/// What a command sees while compiling one of its steps.
pub struct CompileCx<'a> {
    engine: &'a Engine,
    entries: &'a [CommandEntry],
    slots: IndexSet<String>,
}

impl<'a> CompileCx<'a> {
    pub fn engine(&self) -> &'a Engine {
        self.engine
    }

    pub fn entries(&self) -> &'a [CommandEntry] {
        self.entries
    }

    /// The fixed slot for variable `name`.
    pub fn slot(&mut self, name: &str) -> usize {
        match self.slots.get_index_of(name) {
            Some(i) => i,
            None => self.slots.insert_full(name.to_owned()).0,
        }
    }

    /// A slot for an argument naming a variable, if the name is static.
    pub fn var_ref(&mut self, arg: &Argument) -> Option<VarRef> {
        let name = arg.static_text()?;
        Some(VarRef::Slot(self.slot(&name)))
    }

    /// A slot for an optional name argument, or `default` when absent.
    pub fn var_ref_or(&mut self, arg: Option<&Argument>, default: &str) -> Option<VarRef> {
        match arg {
            Some(arg) => self.var_ref(arg),
            None => Some(VarRef::Slot(self.slot(default))),
        }
    }

    pub fn arg(&mut self, arg: &Argument) -> CompiledArg {
        if let Some(literal) = &arg.literal {
            return CompiledArg::Value(literal.clone());
        }
        if let Some(chain) = arg.sole_tag() {
            return CompiledArg::Tag(self.chain(chain));
        }
        if let Some(text) = arg.static_text() {
            return CompiledArg::Value(Value::Text(text));
        }
        let bits = arg
            .bits
            .iter()
            .map(|bit| match bit {
                ArgBit::Text(t) => CompiledBit::Text(t.clone()),
                ArgBit::Tag(chain) => CompiledBit::Tag(self.chain(chain)),
            })
            .collect();
        CompiledArg::Concat(bits)
    }

    pub fn args(&mut self, args: &[Argument]) -> Vec<CompiledArg> {
        args.iter().map(|a| self.arg(a)).collect()
    }

    /// Lex condition arguments once and compile their operands.
    pub fn condition(&mut self, args: &[Argument]) -> Vec<CondPart<CompiledArg>> {
        super::eval::lex_condition(args)
            .into_iter()
            .map(|part| part.map(&mut |a: Argument| self.arg(&a)))
            .collect()
    }

    fn chain(&mut self, chain: &Rc<TagChain>) -> CompiledChain {
        let tags = self.engine.tags();
        let first = &chain.elements[0];

        let (start, mut ty) = match (first.name.as_str(), first.modifier.as_ref().and_then(Argument::static_text)) {
            ("var", Some(name)) if tags.starter("var").is_some() => {
                (ChainStart::Slot(self.slot(&name), name), None)
            }
            _ => match tags.starter(&first.name) {
                Some(starter) => {
                    let modifier = first.modifier.as_ref().map(|m| Box::new(self.arg(m)));
                    let ty = match starter.returns {
                        ReturnType::Static(t) => Some(t),
                        _ => None,
                    };
                    (ChainStart::Starter(starter.func, modifier), ty)
                }
                None => (ChainStart::Unknown, None),
            },
        };

        let mut steps = Vec::new();
        for element in &chain.elements[1..] {
            let Some(handler) = ty.and_then(|t| static_handler(tags, t, &element.name)) else {
                return CompiledChain { chain: Rc::clone(chain), start, rest: ChainRest::Generic };
            };
            ty = match handler.returns {
                ReturnType::Static(t) => Some(t),
                ReturnType::Same => ty,
                ReturnType::Dynamic => None,
            };
            let modifier = element.modifier.as_ref().map(|m| self.arg(m));
            steps.push(StaticStep { func: handler.func, copies: handler.copies, modifier });
        }
        CompiledChain { chain: Rc::clone(chain), start, rest: ChainRest::Static(steps) }
    }
}

/// The handler a value of static type `ty` would dispatch `name` to.
fn static_handler<'t>(tags: &'t TagRegistry, ty: ValueType, name: &str) -> Option<&'t super::handlers::TagHandler> {
    if ty == ValueType::Dynamic {
        return None;
    }
    tags.handler_for(ty, name)
}

// ── Compiled arguments ────────────────────────────────────────────────────────

pub enum CompiledArg {
    Value(Value),
    Tag(CompiledChain),
    Concat(Vec<CompiledBit>),
}

pub enum CompiledBit {
    Text(String),
    Tag(CompiledChain),
}

impl Operand for CompiledArg {
    fn value(&self, exec: &mut Exec<'_>) -> Value {
        match self {
            CompiledArg::Value(v) => v.clone(),
            CompiledArg::Tag(chain) => chain.eval(exec),
            CompiledArg::Concat(bits) => {
                let mut out = String::new();
                for bit in bits {
                    match bit {
                        CompiledBit::Text(t) => out.push_str(t),
                        CompiledBit::Tag(chain) => out.push_str(&chain.eval(exec).to_string()),
                    }
                }
                Value::Text(out)
            }
        }
    }
}

pub struct CompiledChain {
    chain: Rc<TagChain>,
    start: ChainStart,
    rest: ChainRest,
}

enum ChainStart {
    /// `var[name]` with a static name.
    Slot(usize, String),
    Starter(StarterFn, Option<Box<CompiledArg>>),
    Unknown,
}

enum ChainRest {
    /// Every later element resolved at compile time.
    Static(Vec<StaticStep>),
    /// Dispatch through the handler tables at run time.
    Generic,
}

struct StaticStep {
    func: HandlerFn,
    copies: bool,
    modifier: Option<CompiledArg>,
}

impl CompiledChain {
    fn eval(&self, exec: &mut Exec<'_>) -> Value {
        let tags = exec.engine().tags();
        let result = match &self.start {
            ChainStart::Unknown => return Value::Text(self.chain.raw_from(0)),
            ChainStart::Slot(slot, name) => exec.slot(*slot).ok_or_else(|| undefined_variable(name)),
            ChainStart::Starter(func, modifier) => {
                let modifier = modifier.as_ref().map(|m| m.value(exec));
                func(modifier.as_ref(), &*exec as &dyn TagContext)
            }
        };
        let result = result.and_then(|value| match &self.rest {
            ChainRest::Generic => walk(&self.chain, 1, value, tags, exec),
            ChainRest::Static(steps) => {
                let mut current = value;
                for step in steps {
                    let modifier = step.modifier.as_ref().map(|m| m.value(exec));
                    current = if step.copies {
                        (step.func)(&current.duplicate(), modifier.as_ref())?
                    } else {
                        (step.func)(&current, modifier.as_ref())?
                    };
                }
                Ok(current)
            }
        });
        settle(&self.chain, result, tags, exec)
    }
}

/// Evaluate compiled condition parts.
pub fn eval_compiled_condition(parts: &[CondPart<CompiledArg>], exec: &mut Exec<'_>) -> Result<bool, CommandError> {
    eval_condition(parts, |a| a.value(exec)).map_err(CommandError::execution)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
