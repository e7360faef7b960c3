//! Tag handler tables.
//!
//! Every tag element resolves through one of these tables: the first element
//! of a chain through the *starter* table, later elements through the table
//! of the current value's type (falling back to the handlers shared by every
//! type).  Each entry carries its static return type so the compiler can
//! resolve whole chains ahead of time.
//!
//! The tables are plain `const` slices collected into a [`TagRegistry`] when
//! an engine is built; embedders may register more entries on top.

use std::borrow::Cow;
use std::collections::HashMap;
use std::rc::Rc;

use aho_corasick::AhoCorasickBuilder;
use regex::Regex;

use super::eval::TagContext;
use super::value::{from_hex, to_hex, Value, ValueType};

// ── Types ─────────────────────────────────────────────────────────────────────

/// `Err` carries the reason the element produced no value.
pub type TagResult = Result<Value, String>;

/// Handler for the first element of a chain.
pub type StarterFn = fn(Option<&Value>, &dyn TagContext) -> TagResult;

/// Handler for a later element: receives the current value and modifier.
pub type HandlerFn = fn(&Value, Option<&Value>) -> TagResult;

/// What a handler is known to return before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    Static(ValueType),
    /// Same type as the value the handler was called on.
    Same,
    Dynamic,
}

#[derive(Debug, Clone, Copy)]
pub struct TagStarter {
    pub name: &'static str,
    pub func: StarterFn,
    pub returns: ReturnType,
    pub doc: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct TagHandler {
    pub name: &'static str,
    pub func: HandlerFn,
    pub returns: ReturnType,
    /// The handler must receive an independent copy of the current value.
    pub copies: bool,
    pub doc: &'static str,
}

const fn starter(name: &'static str, func: StarterFn, returns: ReturnType, doc: &'static str) -> TagStarter {
    TagStarter { name, func, returns, doc }
}

const fn tag(name: &'static str, func: HandlerFn, returns: ReturnType, doc: &'static str) -> TagHandler {
    TagHandler { name, func, returns, copies: false, doc }
}

const fn copying(h: TagHandler) -> TagHandler {
    TagHandler { copies: true, ..h }
}

use ReturnType::{Dynamic, Same, Static};
use ValueType as T;

// ── Registry ──────────────────────────────────────────────────────────────────

/// Name → handler lookup for starters and per-type handlers.
#[derive(Debug, Default)]
pub struct TagRegistry {
    starters: HashMap<&'static str, TagStarter>,
    by_type: HashMap<ValueType, HashMap<&'static str, TagHandler>>,
    common: HashMap<&'static str, TagHandler>,
}

impl TagRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in table.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        for s in STARTERS {
            reg.register_starter(*s);
        }
        for h in COMMON_TAGS {
            reg.register_common(*h);
        }
        for (ty, table) in [
            (T::Text, TEXT_TAGS),
            (T::Number, NUMBER_TAGS),
            (T::Integer, INTEGER_TAGS),
            (T::Boolean, BOOLEAN_TAGS),
            (T::List, LIST_TAGS),
            (T::Binary, BINARY_TAGS),
            (T::Type, TYPE_TAGS),
            (T::Dynamic, DYNAMIC_TAGS),
        ] {
            for h in table {
                reg.register_handler(ty, *h);
            }
        }
        reg
    }

    pub fn register_starter(&mut self, s: TagStarter) {
        self.starters.insert(s.name, s);
    }

    pub fn register_handler(&mut self, ty: ValueType, h: TagHandler) {
        self.by_type.entry(ty).or_default().insert(h.name, h);
    }

    /// Register a handler available on every type.
    pub fn register_common(&mut self, h: TagHandler) {
        self.common.insert(h.name, h);
    }

    pub fn starter(&self, name: &str) -> Option<&TagStarter> {
        self.starters.get(name)
    }

    /// Handler `name` for values of type `ty` (type table first, then the
    /// common table).
    pub fn handler_for(&self, ty: ValueType, name: &str) -> Option<&TagHandler> {
        self.by_type
            .get(&ty)
            .and_then(|t| t.get(name))
            .or_else(|| self.common.get(name))
    }

    /// Find the handler for `name` on `current`, and the value it should
    /// receive.  Dynamic wrappers answer their own handlers and delegate
    /// everything else to the wrapped value.
    pub fn lookup<'v>(&self, current: &'v Value, name: &str) -> Option<(&TagHandler, &'v Value)> {
        if let Value::Dynamic(_) = current {
            if let Some(h) = self.by_type.get(&T::Dynamic).and_then(|t| t.get(name)) {
                return Some((h, current));
            }
        }
        let inner = current.unwrapped();
        self.handler_for(inner.value_type(), name).map(|h| (h, inner))
    }

    /// Documentation lines for every handler of `ty`, sorted by name.
    pub fn describe(&self, ty: ValueType) -> Vec<String> {
        let mut lines: Vec<String> = self
            .by_type
            .get(&ty)
            .into_iter()
            .flat_map(|t| t.values())
            .chain(self.common.values())
            .map(|h| format!("{}.{}: {}", ty.name(), h.name, h.doc))
            .collect();
        lines.sort();
        lines
    }
}

// ── Modifier helpers ──────────────────────────────────────────────────────────

fn need<'m>(m: Option<&'m Value>, what: &str) -> Result<&'m Value, String> {
    m.ok_or_else(|| format!("'{what}' needs a modifier"))
}

fn need_number(m: Option<&Value>, what: &str) -> Result<f64, String> {
    let v = need(m, what)?;
    v.as_number().ok_or_else(|| format!("'{what}' expects a number, got '{v}'"))
}

fn need_integer(m: Option<&Value>, what: &str) -> Result<i64, String> {
    let v = need(m, what)?;
    v.as_integer().ok_or_else(|| format!("'{what}' expects an integer, got '{v}'"))
}

fn need_bool(m: Option<&Value>, what: &str) -> Result<bool, String> {
    let v = need(m, what)?;
    v.as_bool().ok_or_else(|| format!("'{what}' expects a boolean, got '{v}'"))
}

fn text_of(v: &Value) -> Cow<'_, str> {
    match v {
        Value::Text(s) => Cow::Borrowed(s),
        other => Cow::Owned(other.to_string()),
    }
}

fn number_of(v: &Value) -> f64 {
    v.as_number().unwrap_or(f64::NAN)
}

fn integer_of(v: &Value) -> i64 {
    match v {
        Value::Integer(n) => *n,
        other => other.as_integer().unwrap_or_default(),
    }
}

/// Reason given when `var[name]` finds nothing.
pub fn undefined_variable(name: &str) -> String {
    format!("variable '{name}' is not defined")
}

// ── Starters ──────────────────────────────────────────────────────────────────

pub const STARTERS: &[TagStarter] = &[
    starter("var", |m, ctx| {
        let name = need(m, "var")?.to_string();
        ctx.var(&name).ok_or_else(|| undefined_variable(&name))
    }, Dynamic, "The value of a queue variable."),
    starter("text", |m, _| Ok(Value::Text(m.map(Value::to_string).unwrap_or_default())),
        Static(T::Text), "The modifier as text."),
    starter("number", |m, _| need_number(m, "number").map(Value::Number),
        Static(T::Number), "The modifier as a number."),
    starter("integer", |m, _| need_integer(m, "integer").map(Value::Integer),
        Static(T::Integer), "The modifier as an integer."),
    starter("boolean", |m, _| need_bool(m, "boolean").map(Value::Boolean),
        Static(T::Boolean), "The modifier as a boolean."),
    starter("list", |m, _| Ok(Value::List(m.map(Value::to_list).unwrap_or_default())),
        Static(T::List), "The modifier as a list (`a|b|c`)."),
    starter("binary", |m, _| {
        let hex = need(m, "binary")?.to_string();
        from_hex(hex.trim())
            .map(|b| Value::Binary(b.into()))
            .ok_or_else(|| format!("'{hex}' is not valid hex"))
    }, Static(T::Binary), "Binary data from hex text."),
    starter("null", |_, _| Ok(Value::Null), Static(T::Null), "The null value."),
    starter("type", |m, _| {
        let name = need(m, "type")?.to_string();
        ValueType::from_name(&name)
            .map(Value::Type)
            .ok_or_else(|| format!("unknown type '{name}'"))
    }, Static(T::Type), "A type descriptor by name."),
    starter("dynamic", |m, _| Ok(Value::Dynamic(Rc::new(m.cloned().unwrap_or_default()))),
        Dynamic, "The modifier wrapped so that its type is only known at run time."),
];

// ── Shared handlers ───────────────────────────────────────────────────────────

pub const COMMON_TAGS: &[TagHandler] = &[
    tag("type", |v, _| Ok(Value::Type(v.value_type())), Static(T::Type), "The value's type."),
    tag("to_text", |v, _| Ok(Value::Text(v.to_string())), Static(T::Text), "The canonical text form."),
    tag("is_null", |v, _| Ok(Value::Boolean(v.is_null())), Static(T::Boolean), "Whether the value is null."),
    copying(tag("duplicate", |v, _| Ok(v.clone()), Same, "An independent copy of the value.")),
];

// ── Text ──────────────────────────────────────────────────────────────────────

pub const TEXT_TAGS: &[TagHandler] = &[
    tag("length", |v, _| Ok(Value::Integer(text_of(v).chars().count() as i64)),
        Static(T::Integer), "Number of characters."),
    tag("to_upper", |v, _| Ok(Value::Text(text_of(v).to_uppercase())), Static(T::Text), "Upper-cased text."),
    tag("to_lower", |v, _| Ok(Value::Text(text_of(v).to_lowercase())), Static(T::Text), "Lower-cased text."),
    tag("contains_text", |v, m| {
        let needle = need(m, "contains_text")?.to_string();
        Ok(Value::Boolean(text_of(v).contains(&needle)))
    }, Static(T::Boolean), "Whether the text contains the modifier."),
    tag("contains_any_text", |v, m| {
        let needles: Vec<String> = need(m, "contains_any_text")?
            .to_list()
            .iter()
            .map(Value::to_string)
            .filter(|s| !s.is_empty())
            .collect();
        if needles.is_empty() {
            return Ok(Value::Boolean(false));
        }
        let ac = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .build(&needles);
        Ok(Value::Boolean(ac.is_match(text_of(v).as_ref())))
    }, Static(T::Boolean), "Whether the text contains any of a list of texts (ASCII case-insensitive)."),
    tag("matches", |v, m| {
        let pattern = need(m, "matches")?.to_string();
        let re = Regex::new(&pattern).map_err(|e| format!("invalid regex '{pattern}': {e}"))?;
        Ok(Value::Boolean(re.is_match(&text_of(v))))
    }, Static(T::Boolean), "Whether the text matches a regular expression."),
    tag("equals", |v, m| Ok(Value::Boolean(text_of(v) == need(m, "equals")?.to_string())),
        Static(T::Boolean), "Exact text comparison."),
    tag("append", |v, m| Ok(Value::Text(format!("{}{}", text_of(v), need(m, "append")?))),
        Static(T::Text), "The text with the modifier appended."),
    tag("split", |v, m| {
        let sep = need(m, "split")?.to_string();
        if sep.is_empty() {
            return Err("'split' needs a non-empty separator".into());
        }
        Ok(Value::list(text_of(v).split(sep.as_str()).map(Value::text).collect()))
    }, Static(T::List), "The text split on a separator."),
    tag("as_number", |v, _| v.as_number().map(Value::Number).ok_or_else(|| format!("'{v}' is not a number")),
        Static(T::Number), "The text parsed as a number."),
    tag("as_integer", |v, _| v.as_integer().map(Value::Integer).ok_or_else(|| format!("'{v}' is not an integer")),
        Static(T::Integer), "The text parsed as an integer."),
    tag("as_boolean", |v, _| v.as_bool().map(Value::Boolean).ok_or_else(|| format!("'{v}' is not a boolean")),
        Static(T::Boolean), "The text parsed as a boolean."),
];

// ── Number ────────────────────────────────────────────────────────────────────

pub const NUMBER_TAGS: &[TagHandler] = &[
    tag("add", |v, m| Ok(Value::Number(number_of(v) + need_number(m, "add")?)), Static(T::Number), "Sum."),
    tag("subtract", |v, m| Ok(Value::Number(number_of(v) - need_number(m, "subtract")?)),
        Static(T::Number), "Difference."),
    tag("multiply", |v, m| Ok(Value::Number(number_of(v) * need_number(m, "multiply")?)),
        Static(T::Number), "Product."),
    tag("divide", |v, m| {
        let d = need_number(m, "divide")?;
        if d == 0.0 {
            return Err("division by zero".into());
        }
        Ok(Value::Number(number_of(v) / d))
    }, Static(T::Number), "Quotient; no value when dividing by zero."),
    tag("round", |v, _| {
        let x = number_of(v).round();
        if !x.is_finite() || x.abs() > i64::MAX as f64 {
            return Err(format!("cannot round '{v}' to an integer"));
        }
        Ok(Value::Integer(x as i64))
    }, Static(T::Integer), "Nearest integer."),
    tag("absolute_value", |v, _| Ok(Value::Number(number_of(v).abs())), Static(T::Number), "Absolute value."),
    tag("is_greater_than", |v, m| Ok(Value::Boolean(number_of(v) > need_number(m, "is_greater_than")?)),
        Static(T::Boolean), "Numeric `>`."),
    tag("is_less_than", |v, m| Ok(Value::Boolean(number_of(v) < need_number(m, "is_less_than")?)),
        Static(T::Boolean), "Numeric `<`."),
];

// ── Integer ───────────────────────────────────────────────────────────────────

fn checked(r: Option<i64>, op: &str) -> TagResult {
    r.map(Value::Integer).ok_or_else(|| format!("integer {op} overflowed or divided by zero"))
}

pub const INTEGER_TAGS: &[TagHandler] = &[
    tag("add", |v, m| checked(integer_of(v).checked_add(need_integer(m, "add")?), "add"),
        Static(T::Integer), "Sum."),
    tag("subtract", |v, m| checked(integer_of(v).checked_sub(need_integer(m, "subtract")?), "subtract"),
        Static(T::Integer), "Difference."),
    tag("multiply", |v, m| checked(integer_of(v).checked_mul(need_integer(m, "multiply")?), "multiply"),
        Static(T::Integer), "Product."),
    tag("divide", |v, m| checked(integer_of(v).checked_div(need_integer(m, "divide")?), "divide"),
        Static(T::Integer), "Truncating quotient; no value when dividing by zero."),
    tag("modulo", |v, m| checked(integer_of(v).checked_rem(need_integer(m, "modulo")?), "modulo"),
        Static(T::Integer), "Remainder; no value when dividing by zero."),
    tag("to_number", |v, _| Ok(Value::Number(integer_of(v) as f64)), Static(T::Number), "As a number."),
    tag("is_greater_than", |v, m| Ok(Value::Boolean(integer_of(v) > need_integer(m, "is_greater_than")?)),
        Static(T::Boolean), "Integer `>`."),
    tag("is_less_than", |v, m| Ok(Value::Boolean(integer_of(v) < need_integer(m, "is_less_than")?)),
        Static(T::Boolean), "Integer `<`."),
    tag("equals", |v, m| Ok(Value::Boolean(v.loose_eq(need(m, "equals")?))),
        Static(T::Boolean), "Numeric equality."),
];

// ── Boolean ───────────────────────────────────────────────────────────────────

pub const BOOLEAN_TAGS: &[TagHandler] = &[
    tag("not", |v, _| Ok(Value::Boolean(!v.as_bool().unwrap_or_default())), Static(T::Boolean), "Negation."),
    tag("and", |v, m| Ok(Value::Boolean(v.as_bool().unwrap_or_default() && need_bool(m, "and")?)),
        Static(T::Boolean), "Logical and."),
    tag("or", |v, m| Ok(Value::Boolean(v.as_bool().unwrap_or_default() || need_bool(m, "or")?)),
        Static(T::Boolean), "Logical or."),
];

// ── List ──────────────────────────────────────────────────────────────────────

fn items_of(v: &Value) -> Rc<Vec<Value>> {
    v.to_list()
}

pub const LIST_TAGS: &[TagHandler] = &[
    tag("size", |v, _| Ok(Value::Integer(items_of(v).len() as i64)), Static(T::Integer), "Number of items."),
    tag("get", |v, m| {
        let i = need_integer(m, "get")?;
        let items = items_of(v);
        usize::try_from(i)
            .ok()
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| items.get(i).cloned())
            .ok_or_else(|| format!("index {i} is out of range for a list of {}", items.len()))
    }, Dynamic, "The item at a 1-based index."),
    tag("first", |v, _| items_of(v).first().cloned().ok_or_else(|| "the list is empty".into()),
        Dynamic, "The first item."),
    tag("last", |v, _| items_of(v).last().cloned().ok_or_else(|| "the list is empty".into()),
        Dynamic, "The last item."),
    tag("join", |v, m| {
        let sep = m.map(Value::to_string).unwrap_or_default();
        let parts: Vec<String> = items_of(v).iter().map(Value::to_string).collect();
        Ok(Value::Text(parts.join(&sep)))
    }, Static(T::Text), "Items rendered and joined with the modifier."),
    copying(tag("include", |v, m| {
        let extra = need(m, "include")?.clone();
        let mut items = match v {
            Value::List(items) => Rc::try_unwrap(Rc::clone(items)).unwrap_or_else(|rc| (*rc).clone()),
            other => other.to_list().to_vec(),
        };
        items.push(extra);
        Ok(Value::list(items))
    }, Static(T::List), "A new list with the modifier appended.")),
    tag("reversed", |v, _| {
        let mut items = items_of(v).to_vec();
        items.reverse();
        Ok(Value::list(items))
    }, Static(T::List), "The items in reverse order."),
    tag("contains", |v, m| {
        let needle = need(m, "contains")?;
        Ok(Value::Boolean(items_of(v).iter().any(|i| i.loose_eq(needle))))
    }, Static(T::Boolean), "Whether any item equals the modifier."),
];

// ── Binary ────────────────────────────────────────────────────────────────────

fn bytes_of(v: &Value) -> &[u8] {
    match v {
        Value::Binary(b) => b,
        _ => &[],
    }
}

pub const BINARY_TAGS: &[TagHandler] = &[
    tag("length", |v, _| Ok(Value::Integer(bytes_of(v).len() as i64)), Static(T::Integer), "Number of bytes."),
    tag("to_hex", |v, _| Ok(Value::Text(to_hex(bytes_of(v)))), Static(T::Text), "Lowercase hex text."),
    tag("to_utf8", |v, _| {
        String::from_utf8(bytes_of(v).to_vec())
            .map(Value::Text)
            .map_err(|e| format!("invalid UTF-8: {e}"))
    }, Static(T::Text), "The bytes decoded as UTF-8."),
];

// ── Type / Dynamic ────────────────────────────────────────────────────────────

pub const TYPE_TAGS: &[TagHandler] = &[
    tag("name", |v, _| Ok(Value::Text(v.to_string())), Static(T::Text), "The type's name."),
    tag("is", |v, m| {
        let other = need(m, "is")?.to_string();
        Ok(Value::Boolean(matches!(v, Value::Type(t) if ValueType::from_name(&other) == Some(*t))))
    }, Static(T::Boolean), "Whether this is the named type."),
];

pub const DYNAMIC_TAGS: &[TagHandler] = &[
    tag("unwrap", |v, _| Ok(v.unwrapped().clone()), Dynamic, "The wrapped value."),
];

// ── Tests ─────────────────────────────────────────────────────────────────────
