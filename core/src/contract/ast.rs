//! Abstract syntax for the contract sandbox's toy language (spec §4.5, §9).
//!
//! A program is a flat set of named functions operating on a shared
//! `storage: BTreeMap<String, Value>` environment plus a bound `MSGSENDER`.
//! There are no closures, no classes, no imports — enough to express
//! arithmetic, storage reads/writes and straight-line/branching control
//! flow, which is all the sandbox interface (§4.5) requires.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::TryFrom;

/// A storage or expression value. Deliberately small: integers, UTF-8
/// strings (used for addresses bound via `MSGSENDER`), and string-keyed maps
/// (nested, for token-ledger-shaped contracts).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Value {
    Int(i64),
    Str(String),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Truthiness: zero is false, everything else (including empty maps and
    /// strings) is true. Mirrors the interpreter's need for a boolean-ish
    /// value out of `if` conditions without a dedicated bool type.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Int(i) => *i != 0,
            Value::Str(s) => !s.is_empty(),
            Value::Map(_) => true,
        }
    }

    /// The string a `Value` renders to when used as a map key (e.g.
    /// `balances[addr]` where `addr` evaluated to a `Value::Str`).
    pub fn as_map_key(&self) -> String {
        match self {
            Value::Int(i) => i.to_string(),
            Value::Str(s) => s.clone(),
            Value::Map(_) => String::new(),
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serde_json::Value::from(self.clone()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let json = serde_json::Value::deserialize(deserializer)?;
        Value::try_from(json).map_err(serde::de::Error::custom)
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Int(i) => serde_json::Value::from(i),
            Value::Str(s) => serde_json::Value::String(s),
            Value::Map(m) => {
                let map = m.into_iter().map(|(k, v)| (k, serde_json::Value::from(v))).collect();
                serde_json::Value::Object(map)
            }
        }
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = String;

    fn try_from(json: serde_json::Value) -> Result<Self, Self::Error> {
        match json {
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .ok_or_else(|| format!("unsupported contract value: {n}")),
            serde_json::Value::String(s) => Ok(Value::Str(s)),
            serde_json::Value::Object(map) => {
                let mut out = BTreeMap::new();
                for (k, v) in map {
                    out.insert(k, Value::try_from(v)?);
                }
                Ok(Value::Map(out))
            }
            other => Err(format!("unsupported contract value: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    IntLit(i64),
    StrLit(String),
    EmptyMap,
    Ident(String),
    Index(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    BinOp(Box<Expr>, BinOp, Box<Expr>),
    Neg(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Expr(Expr),
    Assign(Expr, Expr),
    If(Expr, Vec<Stmt>, Vec<Stmt>),
    Return(Option<Expr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    pub functions: BTreeMap<String, Function>,
}
