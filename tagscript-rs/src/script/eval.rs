//! Tag resolution and condition evaluation.
//!
//! [`resolve`] walks a [`TagChain`] left to right: the first element goes
//! through the starter table, every later element through the handler table
//! of the current value's type.  Three things can end a chain early:
//!
//! | Situation                       | Result                                        |
//! |---------------------------------|-----------------------------------------------|
//! | unknown element name            | rest of the chain appended to the value as text |
//! | handler produces no value       | the fallback, or null plus one error report   |
//! | chain ends in null, fallback set | the fallback                                 |
//!
//! Conditions (`if`, `else if`, `while`) are lexed from command arguments
//! into [`CondPart`]s and evaluated strictly left to right: `&&` and `||`
//! have equal precedence and only parentheses group.

use super::handlers::{TagRegistry, TagResult};
use super::tag::{ArgBit, Argument, TagChain};
use super::value::Value;

// ── TagContext ────────────────────────────────────────────────────────────────

/// What the evaluator needs from the running queue.
pub trait TagContext {
    /// Look up a queue variable.  `None` when it is not defined.
    fn var(&self, name: &str) -> Option<Value>;

    /// Report a chain that produced no value and had no fallback.
    fn tag_error(&mut self, message: String);
}

// ── Chains ────────────────────────────────────────────────────────────────────

/// Resolve a chain against the current runtime state.
pub fn resolve(chain: &TagChain, tags: &TagRegistry, ctx: &mut dyn TagContext) -> Value {
    let first = &chain.elements[0];
    let Some(starter) = tags.starter(&first.name) else {
        return Value::Text(chain.raw_from(0));
    };
    let modifier = first.modifier.as_ref().map(|m| eval_argument(m, tags, ctx));
    let result = (starter.func)(modifier.as_ref(), &*ctx);
    let result = result.and_then(|v| walk(chain, 1, v, tags, ctx));
    settle(chain, result, tags, ctx)
}

/// Apply elements `from..` of `chain` to `current` through the generic
/// handler tables.
pub(crate) fn walk(
    chain: &TagChain,
    from: usize,
    mut current: Value,
    tags: &TagRegistry,
    ctx: &mut dyn TagContext,
) -> TagResult {
    for (i, element) in chain.elements.iter().enumerate().skip(from) {
        let Some((handler, receiver)) = tags.lookup(&current, &element.name) else {
            return Ok(Value::Text(format!("{current}.{}", chain.raw_from(i))));
        };
        let modifier = element.modifier.as_ref().map(|m| eval_argument(m, tags, ctx));
        let next = if handler.copies {
            (handler.func)(&receiver.duplicate(), modifier.as_ref())
        } else {
            (handler.func)(receiver, modifier.as_ref())
        };
        current = next?;
    }
    Ok(current)
}

/// Turn the outcome of a chain into its final value, applying the fallback
/// or reporting the failure.
pub(crate) fn settle(
    chain: &TagChain,
    result: TagResult,
    tags: &TagRegistry,
    ctx: &mut dyn TagContext,
) -> Value {
    match (result, &chain.fallback) {
        (Ok(v), Some(fallback)) if v.is_null() => eval_argument(fallback, tags, ctx),
        (Ok(v), _) => v,
        (Err(_), Some(fallback)) => eval_argument(fallback, tags, ctx),
        (Err(reason), None) => {
            ctx.tag_error(format!("{chain}: {reason}"));
            Value::Null
        }
    }
}

// ── Arguments ─────────────────────────────────────────────────────────────────

/// Evaluate an argument.  A parse-time literal wins; an argument made of a
/// single tag keeps the tag's value type; anything else renders to text.
pub fn eval_argument(arg: &Argument, tags: &TagRegistry, ctx: &mut dyn TagContext) -> Value {
    if let Some(literal) = &arg.literal {
        return literal.clone();
    }
    if let Some(chain) = arg.sole_tag() {
        return resolve(chain, tags, ctx);
    }
    let mut out = String::new();
    for bit in &arg.bits {
        match bit {
            ArgBit::Text(t) => out.push_str(t),
            ArgBit::Tag(chain) => out.push_str(&resolve(chain, tags, ctx).to_string()),
        }
    }
    Value::Text(out)
}

// ── Conditions ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CmpOp {
    fn from_word(word: &str) -> Option<CmpOp> {
        Some(match word {
            "==" => CmpOp::Eq,
            "!=" => CmpOp::Ne,
            "<" => CmpOp::Lt,
            ">" => CmpOp::Gt,
            "<=" => CmpOp::Le,
            ">=" => CmpOp::Ge,
            _ => return None,
        })
    }

    fn apply(self, a: &Value, b: &Value) -> Result<bool, String> {
        match self {
            CmpOp::Eq => Ok(a.loose_eq(b)),
            CmpOp::Ne => Ok(!a.loose_eq(b)),
            _ => {
                let (Some(x), Some(y)) = (a.as_number(), b.as_number()) else {
                    return Err(format!("cannot compare '{a}' and '{b}' numerically"));
                };
                Ok(match self {
                    CmpOp::Lt => x < y,
                    CmpOp::Gt => x > y,
                    CmpOp::Le => x <= y,
                    _ => x >= y,
                })
            }
        }
    }
}

/// One lexical piece of a condition.  `A` is the operand representation:
/// [`Argument`] when interpreting, a pre-compiled form when compiled.
#[derive(Debug, Clone)]
pub enum CondPart<A = Argument> {
    Open,
    Close,
    And,
    Or,
    Cmp(CmpOp),
    Operand(A),
}

impl<A> CondPart<A> {
    /// Convert the operands, keeping the structure.
    pub fn map<B>(self, f: &mut impl FnMut(A) -> B) -> CondPart<B> {
        match self {
            CondPart::Open => CondPart::Open,
            CondPart::Close => CondPart::Close,
            CondPart::And => CondPart::And,
            CondPart::Or => CondPart::Or,
            CondPart::Cmp(op) => CondPart::Cmp(op),
            CondPart::Operand(a) => CondPart::Operand(f(a)),
        }
    }
}

/// Split condition arguments into parts.  Leading `(` and trailing `)` are
/// peeled off unquoted words; unquoted words spelling an operator become
/// operators.
pub fn lex_condition(args: &[Argument]) -> Vec<CondPart> {
    let mut parts = Vec::new();
    for arg in args {
        if arg.quoted || arg.literal.is_some() {
            parts.push(CondPart::Operand(arg.clone()));
            continue;
        }
        let (opens, closes, operand) = peel_parens(arg);
        parts.extend(std::iter::repeat_with(|| CondPart::Open).take(opens));
        if let Some(operand) = operand {
            let word = operand.static_text();
            match word.as_deref() {
                Some("&&") => parts.push(CondPart::And),
                Some("||") => parts.push(CondPart::Or),
                Some(w) => match CmpOp::from_word(w) {
                    Some(op) => parts.push(CondPart::Cmp(op)),
                    None => parts.push(CondPart::Operand(operand)),
                },
                None => parts.push(CondPart::Operand(operand)),
            }
        }
        parts.extend(std::iter::repeat_with(|| CondPart::Close).take(closes));
    }
    parts
}

/// Count and strip leading `(` from the first text bit and trailing `)` from
/// the last.  Returns `None` for the operand if nothing is left.
fn peel_parens(arg: &Argument) -> (usize, usize, Option<Argument>) {
    let mut bits = arg.bits.clone();
    let mut opens = 0;
    let mut closes = 0;

    if let Some(ArgBit::Text(t)) = bits.first_mut() {
        let trimmed = t.trim_start_matches('(');
        opens = t.len() - trimmed.len();
        *t = trimmed.to_owned();
    }
    if let Some(ArgBit::Text(t)) = bits.last_mut() {
        let trimmed = t.trim_end_matches(')');
        closes = t.len() - trimmed.len();
        *t = trimmed.to_owned();
    }
    bits.retain(|b| !matches!(b, ArgBit::Text(t) if t.is_empty()));

    if bits.is_empty() {
        return (opens, closes, None);
    }
    (opens, closes, Some(Argument { bits, quoted: false, literal: None }))
}

/// Evaluate lexed condition parts.  `operand` produces the value of each
/// operand as it is reached.
pub fn eval_condition<A>(
    parts: &[CondPart<A>],
    operand: impl FnMut(&A) -> Value,
) -> Result<bool, String> {
    if parts.is_empty() {
        return Err("empty condition".into());
    }
    let mut cx = CondEval { parts, pos: 0, operand };
    let result = cx.expr()?;
    if cx.pos < parts.len() {
        return Err("unexpected ')' or operator in condition".into());
    }
    Ok(result)
}

struct CondEval<'p, A, F> {
    parts: &'p [CondPart<A>],
    pos: usize,
    operand: F,
}

impl<'p, A, F: FnMut(&A) -> Value> CondEval<'p, A, F> {
    fn peek(&self) -> Option<&'p CondPart<A>> {
        self.parts.get(self.pos)
    }

    // expr := clause (('&&' | '||') clause)*
    fn expr(&mut self) -> Result<bool, String> {
        let mut acc = self.clause()?;
        loop {
            match self.peek() {
                Some(CondPart::And) => {
                    self.pos += 1;
                    let rhs = self.clause()?;
                    acc = acc && rhs;
                }
                Some(CondPart::Or) => {
                    self.pos += 1;
                    let rhs = self.clause()?;
                    acc = acc || rhs;
                }
                _ => return Ok(acc),
            }
        }
    }

    // clause := operand [cmp operand]
    fn clause(&mut self) -> Result<bool, String> {
        let lhs = self.operand()?;
        if let Some(CondPart::Cmp(op)) = self.peek() {
            self.pos += 1;
            let rhs = self.operand()?;
            return op.apply(&lhs, &rhs);
        }
        lhs.as_bool().ok_or_else(|| format!("'{lhs}' is not a boolean"))
    }

    // operand := '(' expr ')' | value
    fn operand(&mut self) -> Result<Value, String> {
        match self.peek() {
            Some(CondPart::Open) => {
                self.pos += 1;
                let inner = self.expr()?;
                match self.peek() {
                    Some(CondPart::Close) => {
                        self.pos += 1;
                        Ok(Value::Boolean(inner))
                    }
                    _ => Err("missing ')' in condition".into()),
                }
            }
            Some(CondPart::Operand(a)) => {
                self.pos += 1;
                Ok((self.operand)(a))
            }
            Some(_) => Err("expected a value in condition".into()),
            None => Err("condition ends unexpectedly".into()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
