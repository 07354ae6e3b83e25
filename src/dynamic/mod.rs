//! Dynamic-side values
//!
//! The scripting runtime's view of data: an owned, cheaply clonable value
//! enum. Argument lists are slices of values addressed by 1-based position.

use crate::catalog::InfoRef;
use crate::compound::Compound;
use crate::invoke::Callable;
use smallvec::SmallVec;
use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Results of one bridge operation (usually zero to three values)
pub type Values = SmallVec<[Value; 4]>;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(Rc<str>),
    Sequence(Rc<[Value]>),
    Compound(Compound),
    Callable(Rc<Callable>),
    Info(InfoRef),
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Self {
        Self::String(Rc::from(s.as_ref()))
    }

    pub fn sequence(items: impl IntoIterator<Item = Value>) -> Self {
        Self::Sequence(items.into_iter().collect())
    }

    /// Name of the value's dynamic type, as used in argument errors
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) | Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Sequence(_) => "sequence",
            Self::Compound(_) => "compound",
            Self::Callable(_) => "function",
            Self::Info(_) => "info",
        }
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Scripting truthiness: only nil and false are false
    #[inline]
    pub fn truthy(&self) -> bool {
        !matches!(self, Self::Nil | Self::Boolean(false))
    }

    /// Integer view, accepting integral numbers and numeric strings
    pub fn as_integer(&self) -> Option<i128> {
        match self {
            Self::Integer(i) => Some(*i as i128),
            Self::Number(n) => float_to_integer(*n),
            Self::String(s) => {
                let s = s.trim();
                s.parse::<i128>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(float_to_integer))
            }
            _ => None,
        }
    }

    /// Number view, accepting integers and numeric strings
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Number(n) => Some(*n),
            Self::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// String view, accepting numbers
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::String(s) => Some(Cow::Borrowed(s)),
            Self::Integer(i) => Some(Cow::Owned(i.to_string())),
            Self::Number(n) => Some(Cow::Owned(n.to_string())),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Self::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_compound(&self) -> Option<&Compound> {
        match self {
            Self::Compound(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_callable(&self) -> Option<&Rc<Callable>> {
        match self {
            Self::Callable(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_info(&self) -> Option<&InfoRef> {
        match self {
            Self::Info(i) => Some(i),
            _ => None,
        }
    }
}

fn float_to_integer(n: f64) -> Option<i128> {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1.7e38 {
        Some(n as i128)
    } else {
        None
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Integer(a), Self::Number(b)) | (Self::Number(b), Self::Integer(a)) => *a as f64 == *b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Sequence(a), Self::Sequence(b)) => a == b,
            (Self::Compound(a), Self::Compound(b)) => a.same(b),
            (Self::Callable(a), Self::Callable(b)) => Rc::ptr_eq(a, b),
            (Self::Info(a), Self::Info(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => write!(f, "nil"),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Number(n) => write!(f, "{:?}", n),
            Self::String(s) => write!(f, "{:?}", s),
            Self::Sequence(items) => f.debug_list().entries(items.iter()).finish(),
            Self::Compound(c) => write!(f, "{}", c),
            Self::Callable(c) => write!(f, "{}", c),
            Self::Info(i) => write!(f, "<{}>", i),
        }
    }
}

/// Scripting-side rendering (`tostring`)
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => f.write_str(s),
            Self::Sequence(items) => write!(f, "sequence: {:p}", Rc::as_ptr(items) as *const Value),
            Self::Compound(c) => write!(f, "{}", c),
            Self::Callable(c) => write!(f, "{}", c),
            Self::Info(i) => write!(f, "{}", i),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Integer(i as i64)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(Rc::from(s))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Sequence(Rc::from(items))
    }
}

impl From<Compound> for Value {
    fn from(c: Compound) -> Self {
        Self::Compound(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Nil.type_name(), "nil");
        assert_eq!(Value::from(1.5).type_name(), "number");
        assert_eq!(Value::from("x").type_name(), "string");
        assert_eq!(Value::sequence(vec![]).type_name(), "sequence");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.truthy());
        assert!(!Value::Boolean(false).truthy());
        assert!(Value::Integer(0).truthy());
        assert!(Value::from("").truthy());
    }

    #[test]
    fn test_integer_coercions() {
        assert_eq!(Value::Integer(5).as_integer(), Some(5));
        assert_eq!(Value::Number(6.0).as_integer(), Some(6));
        assert_eq!(Value::Number(6.5).as_integer(), None);
        assert_eq!(Value::from(" 42 ").as_integer(), Some(42));
        assert_eq!(Value::from("1e3").as_integer(), Some(1000));
        assert_eq!(Value::from("forty").as_integer(), None);
        assert_eq!(Value::Boolean(true).as_integer(), None);
    }

    #[test]
    fn test_text_coercions() {
        assert_eq!(Value::from("abc").as_text().as_deref(), Some("abc"));
        assert_eq!(Value::Integer(10).as_text().as_deref(), Some("10"));
        assert_eq!(Value::Number(2.5).as_text().as_deref(), Some("2.5"));
        assert!(Value::Nil.as_text().is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Nil.to_string(), "nil");
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(Value::Integer(-3).to_string(), "-3");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::from("plain").to_string(), "plain");
        assert!(Value::sequence(vec![]).to_string().starts_with("sequence: 0x"));
    }

    #[test]
    fn test_equality() {
        assert_eq!(Value::Integer(3), Value::Number(3.0));
        assert_ne!(Value::Integer(3), Value::from("3"));
        assert_eq!(
            Value::sequence(vec![Value::from(1), Value::from("a")]),
            Value::from(vec![Value::Integer(1), Value::string("a")])
        );
    }
}
