//! Operator attributes.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::OpError;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Float(f32),
    Int(i64),
    Str(String),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "\"{v}\""),
        }
    }
}

impl FromStr for AttrValue {
    type Err = std::convert::Infallible;

    /// Integers first, then floats; anything else is a string.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(v) = s.parse::<i64>() {
            return Ok(Self::Int(v));
        }
        if let Ok(v) = s.parse::<f32>() {
            return Ok(Self::Float(v));
        }
        Ok(Self::Str(s.to_string()))
    }
}

/// Named attributes of one operator invocation.
///
/// Lookups take the operator's default, so an absent attribute and an
/// explicitly defaulted one behave the same.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attrs {
    values: BTreeMap<String, AttrValue>,
}

impl Attrs {
    /// Creates an empty attribute set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, value: AttrValue) -> Self {
        self.set(name, value);
        self
    }

    /// Inserts or replaces an attribute.
    pub fn set(&mut self, name: &str, value: AttrValue) {
        self.values.insert(name.to_string(), value);
    }

    /// Parses a `key=value` pair, as given on the command line.
    pub fn parse_pair(pair: &str) -> Result<(String, AttrValue), OpError> {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| OpError::invalid_attr(pair, "expected key=value"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(OpError::invalid_attr(pair, "empty attribute name"));
        }
        let Ok(value) = value.trim().parse::<AttrValue>();
        Ok((key.to_string(), value))
    }

    /// Raw lookup.
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.values.get(name)
    }

    /// A float attribute; integers are widened.
    pub fn f32_or(&self, name: &str, default: f32) -> Result<f32, OpError> {
        match self.values.get(name) {
            None => Ok(default),
            Some(AttrValue::Float(v)) => Ok(*v),
            Some(AttrValue::Int(v)) => Ok(*v as f32),
            Some(AttrValue::Str(s)) => Err(OpError::invalid_attr(
                name,
                format!("expected a number, got \"{s}\""),
            )),
        }
    }

    /// A required float attribute.
    pub fn f32_required(&self, name: &str) -> Result<f32, OpError> {
        if !self.values.contains_key(name) {
            return Err(OpError::invalid_attr(name, "required attribute is missing"));
        }
        self.f32_or(name, 0.0)
    }

    /// An integer attribute.
    pub fn i64_or(&self, name: &str, default: i64) -> Result<i64, OpError> {
        match self.values.get(name) {
            None => Ok(default),
            Some(AttrValue::Int(v)) => Ok(*v),
            Some(other) => Err(OpError::invalid_attr(
                name,
                format!("expected an integer, got {other}"),
            )),
        }
    }

    /// A string attribute.
    pub fn str_or<'a>(&'a self, name: &str, default: &'a str) -> Result<&'a str, OpError> {
        match self.values.get(name) {
            None => Ok(default),
            Some(AttrValue::Str(s)) => Ok(s),
            Some(other) => Err(OpError::invalid_attr(
                name,
                format!("expected a string, got {other}"),
            )),
        }
    }

    /// Returns `true` when no attributes are set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for Attrs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        f.write_str("}")
    }
}
