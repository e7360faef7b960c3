//! Argument and tag-chain syntax.
//!
//! An argument is a run of literal text with embedded tags.  Tags are written
//! `<{chain}>` where a chain is a `.`-separated list of elements:
//!
//! | Form                      | Meaning                                        |
//! |---------------------------|------------------------------------------------|
//! | `<{var[x]}>`              | starter `var` with modifier `x`                |
//! | `<{var[x].to_upper}>`     | then the `to_upper` handler of the result      |
//! | `<{list[a|b].get[2]}>`    | modifiers are arguments and may hold tags      |
//! | `<{var[x]||"none"}>`      | fallback used when the chain yields no value   |
//!
//! Parsing happens once when a script is loaded; evaluation happens on every
//! execution (see [`super::eval`]).

use std::fmt;
use std::rc::Rc;

use super::value::Value;

// ── Syntax tree ───────────────────────────────────────────────────────────────

/// One element of a chain: a handler name and an optional `[modifier]`.
#[derive(Debug, Clone)]
pub struct TagElement {
    pub name: String,
    pub modifier: Option<Argument>,
    /// Source text of the element, used when an unknown element degrades to
    /// literal text.
    pub raw: String,
}

/// A parsed `<{...}>` expression.
#[derive(Debug, Clone)]
pub struct TagChain {
    pub elements: Vec<TagElement>,
    pub fallback: Option<Argument>,
    /// Source text between `<{` and `}>`.
    pub source: String,
}

impl TagChain {
    /// Source text of elements `from..`, joined back with `.`.
    pub fn raw_from(&self, from: usize) -> String {
        self.elements[from..]
            .iter()
            .map(|e| e.raw.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for TagChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{{{}}}>", self.source)
    }
}

/// A piece of an argument.
#[derive(Debug, Clone)]
pub enum ArgBit {
    Text(String),
    Tag(Rc<TagChain>),
}

/// A command argument: literal text and tags, built once at parse time.
#[derive(Debug, Clone, Default)]
pub struct Argument {
    pub bits: Vec<ArgBit>,
    /// Written in double quotes in the script.
    pub quoted: bool,
    /// Typed value produced by the command's argument predicate at parse
    /// time.  Only set for tag-free arguments.
    pub literal: Option<Value>,
}

impl Argument {
    /// Parse argument text (quotes already removed).
    pub fn parse(src: &str, quoted: bool) -> Result<Argument, String> {
        let mut bits = Vec::new();
        let mut text = String::new();
        let mut rest = src;

        while let Some(open) = rest.find("<{") {
            text.push_str(&rest[..open]);
            let body_start = open + 2;
            let close = find_tag_end(&rest[body_start..])
                .ok_or_else(|| format!("unterminated tag in '{src}'"))?;
            let inner = &rest[body_start..body_start + close];
            if !text.is_empty() {
                bits.push(ArgBit::Text(std::mem::take(&mut text)));
            }
            bits.push(ArgBit::Tag(Rc::new(parse_chain(inner)?)));
            rest = &rest[body_start + close + 2..];
        }
        text.push_str(rest);
        if !text.is_empty() || bits.is_empty() {
            bits.push(ArgBit::Text(text));
        }
        Ok(Argument { bits, quoted, literal: None })
    }

    /// An argument holding plain text.
    pub fn literal_text(text: impl Into<String>) -> Argument {
        Argument { bits: vec![ArgBit::Text(text.into())], quoted: false, literal: None }
    }

    /// `true` when the argument holds no tags.
    pub fn is_static(&self) -> bool {
        self.bits.iter().all(|b| matches!(b, ArgBit::Text(_)))
    }

    /// The argument's text if it holds no tags.
    pub fn static_text(&self) -> Option<String> {
        let mut out = String::new();
        for bit in &self.bits {
            match bit {
                ArgBit::Text(t) => out.push_str(t),
                ArgBit::Tag(_) => return None,
            }
        }
        Some(out)
    }

    /// The single tag this argument consists of, if any.
    pub fn sole_tag(&self) -> Option<&Rc<TagChain>> {
        match self.bits.as_slice() {
            [ArgBit::Tag(chain)] => Some(chain),
            _ => None,
        }
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in &self.bits {
            match bit {
                ArgBit::Text(t) => f.write_str(t)?,
                ArgBit::Tag(chain) => write!(f, "{chain}")?,
            }
        }
        Ok(())
    }
}

// ── Chain parsing ─────────────────────────────────────────────────────────────

/// Find the byte offset of the `}>` closing a tag whose body starts at `s`,
/// honouring nested tags.
pub(crate) fn find_tag_end(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 1usize;
    let mut i = 0;
    while i + 1 < bytes.len() {
        match (bytes[i], bytes[i + 1]) {
            (b'<', b'{') => {
                depth += 1;
                i += 2;
            }
            (b'}', b'>') => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
                i += 2;
            }
            _ => i += 1,
        }
    }
    None
}

/// Parse the text between `<{` and `}>`.
pub fn parse_chain(src: &str) -> Result<TagChain, String> {
    let (chain_src, fallback_src) = split_fallback(src);
    let mut elements = Vec::new();
    for raw in split_elements(chain_src) {
        elements.push(parse_element(raw.trim())?);
    }
    if elements.is_empty() {
        return Err(format!("empty tag <{{{src}}}>"));
    }

    let fallback = match fallback_src.map(str::trim) {
        None => None,
        Some(fb) if fb.len() >= 2 && fb.starts_with('"') && fb.ends_with('"') => {
            Some(Argument::parse(&fb[1..fb.len() - 1], true)?)
        }
        Some(fb) => Some(Argument::parse(fb, false)?),
    };

    Ok(TagChain { elements, fallback, source: src.trim().to_owned() })
}

fn parse_element(raw: &str) -> Result<TagElement, String> {
    let Some(open) = raw.find('[') else {
        if raw.is_empty() {
            return Err("empty tag element".into());
        }
        return Ok(TagElement { name: raw.to_owned(), modifier: None, raw: raw.to_owned() });
    };
    if !raw.ends_with(']') {
        return Err(format!("unexpected text after ']' in tag element '{raw}'"));
    }
    let name = raw[..open].trim();
    if name.is_empty() {
        return Err(format!("tag element '{raw}' has no name"));
    }
    let modifier = Argument::parse(&raw[open + 1..raw.len() - 1], false)?;
    Ok(TagElement { name: name.to_owned(), modifier: Some(modifier), raw: raw.to_owned() })
}

/// Split off a `||` fallback at depth 0.
fn split_fallback(src: &str) -> (&str, Option<&str>) {
    let bytes = src.as_bytes();
    let mut depth = 0i32;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'[' => depth += 1,
            b']' => depth -= 1,
            b'<' if bytes.get(i + 1) == Some(&b'{') => {
                depth += 1;
                i += 1;
            }
            b'}' if bytes.get(i + 1) == Some(&b'>') => {
                depth -= 1;
                i += 1;
            }
            b'|' if depth == 0 && bytes.get(i + 1) == Some(&b'|') => {
                return (&src[..i], Some(&src[i + 2..]));
            }
            _ => {}
        }
        i += 1;
    }
    (src, None)
}

/// Split a chain on `.` at depth 0.
fn split_elements(src: &str) -> Vec<&str> {
    let bytes = src.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'[' => depth += 1,
            b']' => depth -= 1,
            b'<' if bytes.get(i + 1) == Some(&b'{') => {
                depth += 1;
                i += 1;
            }
            b'}' if bytes.get(i + 1) == Some(&b'>') => {
                depth -= 1;
                i += 1;
            }
            b'.' if depth == 0 => {
                parts.push(&src[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    if start < src.len() || !parts.is_empty() {
        parts.push(&src[start..]);
    }
    parts
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(src: &str) -> TagChain {
        parse_chain(src).expect("chain parse failed")
    }

    #[test]
    fn plain_text_argument() {
        let a = Argument::parse("hello", false).unwrap();
        assert!(a.is_static());
        assert_eq!(a.static_text().as_deref(), Some("hello"));
    }

    #[test]
    fn empty_argument_has_one_empty_bit() {
        let a = Argument::parse("", true).unwrap();
        assert_eq!(a.static_text().as_deref(), Some(""));
    }

    #[test]
    fn mixed_argument() {
        let a = Argument::parse("x=<{var[x]}>!", false).unwrap();
        assert_eq!(a.bits.len(), 3);
        assert!(a.sole_tag().is_none());
        assert_eq!(a.to_string(), "x=<{var[x]}>!");
    }

    #[test]
    fn sole_tag_argument() {
        let a = Argument::parse("<{var[x]}>", false).unwrap();
        assert!(a.sole_tag().is_some());
    }

    #[test]
    fn chain_elements_and_modifiers() {
        let c = chain("list[a|b].get[2].to_upper");
        let names: Vec<_> = c.elements.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["list", "get", "to_upper"]);
        assert!(c.elements[2].modifier.is_none());
        assert_eq!(c.raw_from(1), "get[2].to_upper");
    }

    #[test]
    fn dots_inside_modifiers_do_not_split() {
        let c = chain("number[3.5].round");
        assert_eq!(c.elements.len(), 2);
    }

    #[test]
    fn nested_tag_in_modifier() {
        let a = Argument::parse("<{var[<{var[name]}>].length}>", false).unwrap();
        let c = a.sole_tag().unwrap();
        assert_eq!(c.elements.len(), 2);
        let m = c.elements[0].modifier.as_ref().unwrap();
        assert!(m.sole_tag().is_some());
    }

    #[test]
    fn quoted_fallback() {
        let c = chain("var[missing] || \"default value\"");
        let fb = c.fallback.as_ref().unwrap();
        assert!(fb.quoted);
        assert_eq!(fb.static_text().as_deref(), Some("default value"));
    }

    #[test]
    fn list_pipe_is_not_a_fallback() {
        let c = chain("list[a|b]");
        assert!(c.fallback.is_none());
    }

    #[test]
    fn unterminated_tag_is_error() {
        assert!(Argument::parse("<{var[x]", false).is_err());
    }

    #[test]
    fn empty_tag_is_error() {
        assert!(parse_chain("").is_err());
        assert!(parse_chain("var[x]..length").is_err());
    }
}
