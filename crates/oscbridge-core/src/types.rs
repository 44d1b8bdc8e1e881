//! Decoded OSC message types

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single OSC argument
///
/// Serializes to the bare JSON value (`2.5`, `7`, `"text"`, `true`, `null`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Argument {
    /// `N`
    Nil,
    /// `T` / `F`
    Bool(bool),
    /// `i`
    Int(i32),
    /// `h`
    Long(i64),
    /// `f`
    Float(f32),
    /// `d`
    Double(f64),
    /// `s`
    String(String),
}

impl Argument {
    /// The OSC type tag character for this argument
    pub fn type_tag(&self) -> u8 {
        match self {
            Argument::Nil => b'N',
            Argument::Bool(true) => b'T',
            Argument::Bool(false) => b'F',
            Argument::Int(_) => b'i',
            Argument::Long(_) => b'h',
            Argument::Float(_) => b'f',
            Argument::Double(_) => b'd',
            Argument::String(_) => b's',
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Argument::Int(i) => Some(*i as f64),
            Argument::Long(l) => Some(*l as f64),
            Argument::Float(f) => Some(*f as f64),
            Argument::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Argument::Int(i) => Some(*i as i64),
            Argument::Long(l) => Some(*l),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Argument::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Nil => write!(f, "nil"),
            Argument::Bool(b) => write!(f, "{}", b),
            Argument::Int(i) => write!(f, "{}", i),
            Argument::Long(l) => write!(f, "{}", l),
            Argument::Float(v) => write!(f, "{}", v),
            Argument::Double(v) => write!(f, "{}", v),
            Argument::String(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<f32> for Argument {
    fn from(v: f32) -> Self {
        Argument::Float(v)
    }
}

impl From<f64> for Argument {
    fn from(v: f64) -> Self {
        Argument::Double(v)
    }
}

impl From<i32> for Argument {
    fn from(v: i32) -> Self {
        Argument::Int(v)
    }
}

impl From<i64> for Argument {
    fn from(v: i64) -> Self {
        Argument::Long(v)
    }
}

impl From<bool> for Argument {
    fn from(v: bool) -> Self {
        Argument::Bool(v)
    }
}

impl From<String> for Argument {
    fn from(v: String) -> Self {
        Argument::String(v)
    }
}

impl From<&str> for Argument {
    fn from(v: &str) -> Self {
        Argument::String(v.to_string())
    }
}

/// A decoded OSC message
///
/// An empty address marks a packet that could not be parsed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub address: String,
    #[serde(default)]
    pub args: Vec<Argument>,
}

impl Message {
    pub fn new(address: impl Into<String>, args: Vec<Argument>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }

    /// Message with the given address and no arguments
    pub fn bare(address: impl Into<String>) -> Self {
        Self::new(address, Vec::new())
    }

    /// The placeholder returned for unparseable input
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether this message carries a usable address
    pub fn is_empty(&self) -> bool {
        self.address.is_empty()
    }

    /// The type tag string without the leading comma
    pub fn type_tags(&self) -> String {
        self.args.iter().map(|a| a.type_tag() as char).collect()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}
