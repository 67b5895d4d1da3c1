//! Contract sandbox (spec §4.5, §9): a small, deterministic, resource-bounded
//! VM that replaces the source implementation's raw host `eval`.
//!
//! The only operation a chain-visible contract call performs is
//! [`run`]: parse `code`, evaluate `invocation` against `storage` with
//! `MSGSENDER` bound to `caller`, and return the storage restricted to the
//! keys that existed before the call.

mod ast;
mod interpreter;
mod parser;

pub use ast::Value;

use crate::address::Address;
use interpreter::Interpreter;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ContractError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("undefined function: {0}")]
    UndefinedFunction(String),
    #[error("undefined name: {0}")]
    UndefinedName(String),
    #[error("function {function} expected {expected} argument(s), got {got}")]
    ArityMismatch { function: String, expected: usize, got: usize },
    #[error("value is not indexable")]
    NotIndexable,
    #[error("expression is not assignable")]
    NotAssignable,
    #[error("MSGSENDER is reserved and cannot be assigned")]
    ReservedName,
    #[error("type mismatch in arithmetic or comparison")]
    TypeMismatch,
    #[error("arithmetic overflow")]
    Overflow,
    #[error("division by zero")]
    DivideByZero,
    #[error("step limit exceeded")]
    StepLimitExceeded,
}

impl From<parser::ParseError> for ContractError {
    fn from(e: parser::ParseError) -> Self {
        ContractError::Parse(e.0)
    }
}

/// Runs `code`'s top-level functions against `storage`, evaluates
/// `invocation` (e.g. `"constructor()"` or `"set_a(5)"`) with `MSGSENDER`
/// bound to `caller`, and returns the storage restricted to the keys that
/// were present before the call — new top-level names introduced by `code`
/// do not persist (spec §4.5).
pub fn run(
    code: &str,
    storage: &BTreeMap<String, Value>,
    caller: Address,
    invocation: &str,
) -> Result<BTreeMap<String, Value>, ContractError> {
    let program = parser::parse(code)?;
    let invocation_expr = parser::parse_call(invocation)?;
    let original_keys: Vec<String> = storage.keys().cloned().collect();
    let mut working = storage.clone();

    {
        let mut interp = Interpreter::new(&program, &mut working, caller.to_string());
        match invocation_expr {
            ast::Expr::Call(name, args) => {
                let mut evaluated = Vec::with_capacity(args.len());
                for arg in &args {
                    evaluated.push(eval_literal_arg(arg)?);
                }
                interp.call(&name, evaluated)?;
            }
            _ => return Err(ContractError::Parse("invocation must be a function call".into())),
        }
    }

    working.retain(|k, _| original_keys.contains(k));
    Ok(working)
}

/// Invocation-expression arguments are evaluated in an empty environment
/// (there is no caller-side state to read from): only literals are valid.
fn eval_literal_arg(expr: &ast::Expr) -> Result<Value, ContractError> {
    match expr {
        ast::Expr::IntLit(n) => Ok(Value::Int(*n)),
        ast::Expr::StrLit(s) => Ok(Value::Str(s.clone())),
        ast::Expr::Neg(inner) => match eval_literal_arg(inner)? {
            Value::Int(n) => Ok(Value::Int(-n)),
            _ => Err(ContractError::TypeMismatch),
        },
        _ => Err(ContractError::Parse("invocation arguments must be literals".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_then_call_sets_storage() {
        let code = "fn constructor() {\n}\nfn set_a(n) {\n  a = n + 1;\n}\n";
        let mut storage = BTreeMap::new();
        storage.insert("a".to_string(), Value::Int(0));
        let caller: Address = "0x0000000000000000000000000000000000000001".parse().unwrap();

        let after_ctor = run(code, &storage, caller, "constructor()").unwrap();
        assert_eq!(after_ctor.get("a"), Some(&Value::Int(0)));

        let after_call = run(code, &after_ctor, caller, "set_a(5)").unwrap();
        assert_eq!(after_call.get("a"), Some(&Value::Int(6)));
    }

    #[test]
    fn new_top_level_names_do_not_persist() {
        let code = "fn constructor() {\n  scratch = 99;\n}\n";
        let storage = BTreeMap::new();
        let caller: Address = "0x0000000000000000000000000000000000000001".parse().unwrap();
        let after = run(code, &storage, caller, "constructor()").unwrap();
        assert!(!after.contains_key("scratch"));
    }

    #[test]
    fn msgsender_is_visible_to_calls() {
        let code = "fn who_called() {\n  last_caller = MSGSENDER;\n}\n";
        let mut storage = BTreeMap::new();
        storage.insert("last_caller".to_string(), Value::Str(String::new()));
        let caller: Address = "0x0000000000000000000000000000000000000002".parse().unwrap();
        let after = run(code, &storage, caller, "who_called()").unwrap();
        assert_eq!(after.get("last_caller"), Some(&Value::Str(caller.to_string())));
    }
}
