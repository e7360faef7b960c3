//! Runtime value type for tagscript.
//!
//! Values are immutable once built; operations that "change" a value return
//! a new one.  Lists and binary blobs are reference-counted, so storing the
//! same value in several variables shares the allocation.  Handlers that need
//! a private copy call [`Value::duplicate`].

use std::fmt;
use std::rc::Rc;

// ── ValueType ─────────────────────────────────────────────────────────────────

/// The closed set of value variants, used as a type descriptor and as the
/// static return type of tag handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Text,
    Number,
    Integer,
    Boolean,
    List,
    Binary,
    Null,
    Type,
    Dynamic,
}

impl ValueType {
    /// Every variant, in declaration order.
    pub const ALL: &'static [ValueType] = &[
        ValueType::Text,
        ValueType::Number,
        ValueType::Integer,
        ValueType::Boolean,
        ValueType::List,
        ValueType::Binary,
        ValueType::Null,
        ValueType::Type,
        ValueType::Dynamic,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ValueType::Text => "text",
            ValueType::Number => "number",
            ValueType::Integer => "integer",
            ValueType::Boolean => "boolean",
            ValueType::List => "list",
            ValueType::Binary => "binary",
            ValueType::Null => "null",
            ValueType::Type => "type",
            ValueType::Dynamic => "dynamic",
        }
    }

    /// Look a type up by name (case-insensitive).
    pub fn from_name(name: &str) -> Option<ValueType> {
        let name = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(name))
    }

    /// Convert canonical text back into a value of this type.
    ///
    /// This is the inverse of [`Value`]'s `Display` for the scalar types:
    /// `ty.parse(&v.to_string()) == Some(v)` whenever `v.value_type() == ty`.
    pub fn parse(self, text: &str) -> Option<Value> {
        match self {
            ValueType::Text => Some(Value::Text(text.to_owned())),
            ValueType::Number => text.trim().parse::<f64>().ok().map(Value::Number),
            ValueType::Integer => text.trim().parse::<i64>().ok().map(Value::Integer),
            ValueType::Boolean => parse_bool(text).map(Value::Boolean),
            ValueType::List => Some(Value::List(Rc::new(split_list(text)))),
            ValueType::Binary => from_hex(text.trim()).map(|b| Value::Binary(b.into())),
            ValueType::Null => text.trim().eq_ignore_ascii_case("null").then_some(Value::Null),
            ValueType::Type => ValueType::from_name(text).map(Value::Type),
            ValueType::Dynamic => Some(Value::Dynamic(Rc::new(Value::Text(text.to_owned())))),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Value ─────────────────────────────────────────────────────────────────────

/// A tagscript runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Number(f64),
    Integer(i64),
    Boolean(bool),
    List(Rc<Vec<Value>>),
    Binary(Rc<[u8]>),
    Null,
    Type(ValueType),
    /// Hides the static type of the wrapped value; tag dispatch delegates
    /// to the inner value.
    Dynamic(Rc<Value>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            // Rust's float formatting is the shortest text that parses back
            // to the same f64, which keeps the round-trip exact.
            Value::Number(x) => write!(f, "{x}"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str("|")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::Binary(bytes) => f.write_str(&to_hex(bytes)),
            Value::Null => f.write_str("null"),
            Value::Type(t) => f.write_str(t.name()),
            Value::Dynamic(inner) => write!(f, "{inner}"),
        }
    }
}

impl Value {
    pub fn text(s: impl Into<String>) -> Value {
        Value::Text(s.into())
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(items))
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Text(_) => ValueType::Text,
            Value::Number(_) => ValueType::Number,
            Value::Integer(_) => ValueType::Integer,
            Value::Boolean(_) => ValueType::Boolean,
            Value::List(_) => ValueType::List,
            Value::Binary(_) => ValueType::Binary,
            Value::Null => ValueType::Null,
            Value::Type(_) => ValueType::Type,
            Value::Dynamic(_) => ValueType::Dynamic,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.unwrapped(), Value::Null)
    }

    /// Strip any number of [`Value::Dynamic`] wrappers.
    pub fn unwrapped(&self) -> &Value {
        let mut v = self;
        while let Value::Dynamic(inner) = v {
            v = inner;
        }
        v
    }

    /// Boolean view: `Boolean`, or text spelling `true`/`false`.
    pub fn as_bool(&self) -> Option<bool> {
        match self.unwrapped() {
            Value::Boolean(b) => Some(*b),
            Value::Text(s) => parse_bool(s),
            _ => None,
        }
    }

    /// Numeric view (integers widen, numeric text parses).
    pub fn as_number(&self) -> Option<f64> {
        match self.unwrapped() {
            Value::Number(x) => Some(*x),
            Value::Integer(n) => Some(*n as f64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Integer view.  Numbers convert only when they hold a whole value.
    pub fn as_integer(&self) -> Option<i64> {
        match self.unwrapped() {
            Value::Integer(n) => Some(*n),
            Value::Number(x) => whole_integer(*x),
            Value::Text(s) => {
                let s = s.trim();
                s.parse().ok().or_else(|| s.parse::<f64>().ok().and_then(whole_integer))
            }
            _ => None,
        }
    }

    /// List view: lists as-is, `|`-separated text split into items, any
    /// other value as a one-item list.
    pub fn to_list(&self) -> Rc<Vec<Value>> {
        match self.unwrapped() {
            Value::List(items) => Rc::clone(items),
            Value::Text(s) => Rc::new(split_list(s)),
            Value::Null => Rc::new(Vec::new()),
            other => Rc::new(vec![other.clone()]),
        }
    }

    /// An independent deep copy that shares no reference-counted storage
    /// with `self`.
    pub fn duplicate(&self) -> Value {
        match self {
            Value::List(items) => Value::List(Rc::new(items.iter().map(Value::duplicate).collect())),
            Value::Binary(bytes) => Value::Binary(bytes.to_vec().into()),
            Value::Dynamic(inner) => Value::Dynamic(Rc::new(inner.duplicate())),
            other => other.clone(),
        }
    }

    /// Loose equality used by `==` in conditions and the `equals` tags:
    /// numeric when both sides are numeric, textual otherwise.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => a == b,
            _ => self.to_string() == other.to_string(),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Number(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(Rc::new(items))
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// A whole float that fits an `i64` without clamping.
fn whole_integer(x: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is already out of range.
    (x.fract() == 0.0 && x >= i64::MIN as f64 && x < i64::MAX as f64).then_some(x as i64)
}

fn parse_bool(s: &str) -> Option<bool> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Split `a|b|c` into text items.  A trailing `|` does not add an empty item.
fn split_list(s: &str) -> Vec<Value> {
    if s.is_empty() {
        return Vec::new();
    }
    let s = s.strip_suffix('|').unwrap_or(s);
    s.split('|').map(Value::text).collect()
}

pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

pub fn from_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 || !s.is_ascii() {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_scalars() {
        assert_eq!(Value::Integer(-7).to_string(), "-7");
        assert_eq!(Value::Number(3.25).to_string(), "3.25");
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::Type(ValueType::List).to_string(), "list");
    }

    #[test]
    fn display_containers() {
        let l = Value::list(vec![Value::text("a"), Value::Integer(2)]);
        assert_eq!(l.to_string(), "a|2");
        assert_eq!(Value::Binary(vec![0x0f, 0xa0].into()).to_string(), "0fa0");
        let d = Value::Dynamic(Rc::new(Value::Integer(5)));
        assert_eq!(d.to_string(), "5");
    }

    #[test]
    fn parse_round_trip_scalars() {
        for v in [
            Value::text("hello world"),
            Value::Number(0.1),
            Value::Number(-12.5e10),
            Value::Integer(i64::MIN),
            Value::Boolean(false),
        ] {
            let ty = v.value_type();
            assert_eq!(ty.parse(&v.to_string()), Some(v));
        }
    }

    #[test]
    fn parse_rejects_bad_text() {
        assert_eq!(ValueType::Integer.parse("1.5"), None);
        assert_eq!(ValueType::Boolean.parse("yes"), None);
        assert_eq!(ValueType::Binary.parse("abc"), None);
        assert_eq!(ValueType::Null.parse("nil"), None);
    }

    #[test]
    fn bool_views() {
        assert_eq!(Value::text("TRUE").as_bool(), Some(true));
        assert_eq!(Value::Boolean(false).as_bool(), Some(false));
        assert_eq!(Value::Integer(1).as_bool(), None);
    }

    #[test]
    fn integer_views() {
        assert_eq!(Value::Number(4.0).as_integer(), Some(4));
        assert_eq!(Value::Number(4.5).as_integer(), None);
        assert_eq!(Value::text(" 12 ").as_integer(), Some(12));
        assert_eq!(Value::text("3.0").as_integer(), Some(3));
    }

    #[test]
    fn out_of_range_numbers_are_not_integers() {
        assert_eq!(Value::Number(1e30).as_integer(), None);
        assert_eq!(Value::Number(-1e30).as_integer(), None);
        assert_eq!(Value::Number(9_223_372_036_854_775_808.0).as_integer(), None);
        assert_eq!(Value::Number(f64::INFINITY).as_integer(), None);
        assert_eq!(Value::Number(f64::NAN).as_integer(), None);
        assert_eq!(Value::Number(-9_223_372_036_854_775_808.0).as_integer(), Some(i64::MIN));
        assert_eq!(Value::text("1e30").as_integer(), None);
    }

    #[test]
    fn list_views() {
        assert_eq!(Value::text("a|b|").to_list().len(), 2);
        assert!(Value::Null.to_list().is_empty());
        assert_eq!(Value::Integer(3).to_list().len(), 1);
    }

    #[test]
    fn duplicate_breaks_sharing() {
        let l = Value::list(vec![Value::Integer(1)]);
        let copy = l.duplicate();
        assert_eq!(l, copy);
        if let (Value::List(a), Value::List(b)) = (&l, &copy) {
            assert!(!Rc::ptr_eq(a, b));
        } else {
            panic!("expected lists");
        }
    }

    #[test]
    fn loose_equality() {
        assert!(Value::text("3").loose_eq(&Value::Integer(3)));
        assert!(Value::Number(3.0).loose_eq(&Value::Integer(3)));
        assert!(!Value::text("abc").loose_eq(&Value::text("abd")));
    }

    #[test]
    fn type_names() {
        assert_eq!(ValueType::from_name("Integer"), Some(ValueType::Integer));
        assert_eq!(ValueType::from_name("widget"), None);
    }
}
