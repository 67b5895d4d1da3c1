//! Tree-walking interpreter for the contract sandbox.
//!
//! No I/O, no reflection, no wall-clock access, no visibility into other
//! accounts — the only inputs are the parsed [`Program`], the caller's
//! storage map, and the bound `MSGSENDER`. A fixed step budget bounds
//! runtime so a pathological program cannot hang block execution (spec §9).

use super::ast::{BinOp, Expr, Function, Program, Stmt, Value};
use super::ContractError;
use std::collections::BTreeMap;

/// Maximum statement/expression evaluation steps per invocation.
const STEP_BUDGET: u32 = 100_000;

enum Flow {
    Normal,
    Return(Value),
}

pub struct Interpreter<'a> {
    program: &'a Program,
    storage: &'a mut BTreeMap<String, Value>,
    msgsender: String,
    locals: Vec<BTreeMap<String, Value>>,
    steps: u32,
}

impl<'a> Interpreter<'a> {
    pub fn new(program: &'a Program, storage: &'a mut BTreeMap<String, Value>, msgsender: String) -> Self {
        Interpreter {
            program,
            storage,
            msgsender,
            locals: Vec::new(),
            steps: 0,
        }
    }

    fn tick(&mut self) -> Result<(), ContractError> {
        self.steps += 1;
        if self.steps > STEP_BUDGET {
            return Err(ContractError::StepLimitExceeded);
        }
        Ok(())
    }

    pub fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Value, ContractError> {
        let function: Function = self
            .program
            .functions
            .get(name)
            .cloned()
            .ok_or_else(|| ContractError::UndefinedFunction(name.to_string()))?;
        if function.params.len() != args.len() {
            return Err(ContractError::ArityMismatch {
                function: name.to_string(),
                expected: function.params.len(),
                got: args.len(),
            });
        }
        let mut frame = BTreeMap::new();
        for (param, value) in function.params.iter().zip(args.into_iter()) {
            frame.insert(param.clone(), value);
        }
        self.locals.push(frame);
        let result = self.exec_block(&function.body);
        self.locals.pop();
        match result? {
            Flow::Return(v) => Ok(v),
            Flow::Normal => Ok(Value::Int(0)),
        }
    }

    fn exec_block(&mut self, stmts: &[Stmt]) -> Result<Flow, ContractError> {
        for stmt in stmts {
            self.tick()?;
            match stmt {
                Stmt::Expr(expr) => {
                    self.eval(expr)?;
                }
                Stmt::Assign(target, value_expr) => {
                    let value = self.eval(value_expr)?;
                    self.assign(target, value)?;
                }
                Stmt::If(cond, then_block, else_block) => {
                    let branch = if self.eval(cond)?.is_truthy() { then_block } else { else_block };
                    match self.exec_block(branch)? {
                        Flow::Normal => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Stmt::Return(expr) => {
                    let value = match expr {
                        Some(e) => self.eval(e)?,
                        None => Value::Int(0),
                    };
                    return Ok(Flow::Return(value));
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, ContractError> {
        self.tick()?;
        match expr {
            Expr::IntLit(n) => Ok(Value::Int(*n)),
            Expr::StrLit(s) => Ok(Value::Str(s.clone())),
            Expr::EmptyMap => Ok(Value::Map(BTreeMap::new())),
            Expr::Ident(name) => self.read_ident(name),
            Expr::Index(base, key) => {
                let base_value = self.eval(base)?;
                let key_value = self.eval(key)?;
                match base_value {
                    Value::Map(map) => Ok(map.get(&key_value.as_map_key()).cloned().unwrap_or(Value::Int(0))),
                    _ => Err(ContractError::NotIndexable),
                }
            }
            Expr::Call(name, args) => {
                if name == "MSGSENDER" {
                    return Err(ContractError::UndefinedFunction(name.clone()));
                }
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                self.call(name, values)
            }
            Expr::BinOp(lhs, op, rhs) => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                eval_binop(*op, l, r)
            }
            Expr::Neg(inner) => {
                let v = self.eval(inner)?;
                let i = v.as_int().ok_or(ContractError::TypeMismatch)?;
                Ok(Value::Int(-i))
            }
        }
    }

    fn read_ident(&self, name: &str) -> Result<Value, ContractError> {
        if name == "MSGSENDER" {
            return Ok(Value::Str(self.msgsender.clone()));
        }
        if let Some(frame) = self.locals.last() {
            if let Some(v) = frame.get(name) {
                return Ok(v.clone());
            }
        }
        if let Some(v) = self.storage.get(name) {
            return Ok(v.clone());
        }
        Err(ContractError::UndefinedName(name.to_string()))
    }

    fn assign(&mut self, target: &Expr, value: Value) -> Result<(), ContractError> {
        match target {
            Expr::Ident(name) => {
                if name == "MSGSENDER" {
                    return Err(ContractError::ReservedName);
                }
                if self.storage.contains_key(name) {
                    self.storage.insert(name.clone(), value);
                    return Ok(());
                }
                // Not an existing storage key: a local temporary, scoped to
                // this call. Never persists — this is what keeps the
                // sandbox from growing new top-level storage names.
                if let Some(frame) = self.locals.last_mut() {
                    frame.insert(name.clone(), value);
                    return Ok(());
                }
                Err(ContractError::UndefinedName(name.clone()))
            }
            Expr::Index(base, key) => {
                let key_value = self.eval(key)?;
                let map = self.resolve_map_mut(base)?;
                map.insert(key_value.as_map_key(), value);
                Ok(())
            }
            _ => Err(ContractError::NotAssignable),
        }
    }

    fn resolve_map_mut(&mut self, expr: &Expr) -> Result<&mut BTreeMap<String, Value>, ContractError> {
        match expr {
            Expr::Ident(name) => {
                if self.storage.contains_key(name) {
                    match self.storage.get_mut(name) {
                        Some(Value::Map(m)) => Ok(m),
                        Some(_) => Err(ContractError::NotIndexable),
                        None => unreachable!(),
                    }
                } else if let Some(frame) = self.locals.last_mut() {
                    match frame.entry(name.clone()).or_insert_with(|| Value::Map(BTreeMap::new())) {
                        Value::Map(m) => Ok(m),
                        _ => Err(ContractError::NotIndexable),
                    }
                } else {
                    Err(ContractError::UndefinedName(name.clone()))
                }
            }
            Expr::Index(inner_base, inner_key) => {
                let key_value = self.eval(inner_key)?;
                let key = key_value.as_map_key();
                let parent = self.resolve_map_mut(inner_base)?;
                match parent.entry(key).or_insert_with(|| Value::Map(BTreeMap::new())) {
                    Value::Map(m) => Ok(m),
                    _ => Err(ContractError::NotIndexable),
                }
            }
            _ => Err(ContractError::NotAssignable),
        }
    }
}

fn eval_binop(op: BinOp, lhs: Value, rhs: Value) -> Result<Value, ContractError> {
    if matches!(op, BinOp::Eq | BinOp::Ne) {
        let equal = lhs == rhs;
        let truth = if op == BinOp::Eq { equal } else { !equal };
        return Ok(Value::Int(truth as i64));
    }
    let l = lhs.as_int().ok_or(ContractError::TypeMismatch)?;
    let r = rhs.as_int().ok_or(ContractError::TypeMismatch)?;
    let result = match op {
        BinOp::Add => l.checked_add(r).ok_or(ContractError::Overflow)?,
        BinOp::Sub => l.checked_sub(r).ok_or(ContractError::Overflow)?,
        BinOp::Mul => l.checked_mul(r).ok_or(ContractError::Overflow)?,
        BinOp::Div => l.checked_div(r).ok_or(ContractError::DivideByZero)?,
        BinOp::Lt => return Ok(Value::Int((l < r) as i64)),
        BinOp::Le => return Ok(Value::Int((l <= r) as i64)),
        BinOp::Gt => return Ok(Value::Int((l > r) as i64)),
        BinOp::Ge => return Ok(Value::Int((l >= r) as i64)),
        BinOp::Eq | BinOp::Ne => unreachable!(),
    };
    Ok(Value::Int(result))
}
