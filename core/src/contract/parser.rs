//! Recursive-descent parser for the contract sandbox's toy language.

use super::ast::{BinOp, Expr, Function, Program, Stmt};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Ident(String),
    Int(i64),
    Str(String),
    Sym(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(pub String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error: {}", self.0)
    }
}

fn lex(src: &str) -> Result<Vec<Tok>, ParseError> {
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    let mut toks = Vec::new();
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '#' {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            toks.push(Tok::Int(text.parse().map_err(|_| ParseError(format!("bad integer literal {text}")))?));
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            toks.push(Tok::Ident(chars[start..i].iter().collect()));
            continue;
        }
        if c == '"' {
            i += 1;
            let start = i;
            while i < chars.len() && chars[i] != '"' {
                i += 1;
            }
            if i >= chars.len() {
                return Err(ParseError("unterminated string literal".into()));
            }
            let text: String = chars[start..i].iter().collect();
            i += 1;
            toks.push(Tok::Str(text));
            continue;
        }
        let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
        if matches!(two.as_str(), "==" | "!=" | "<=" | ">=") {
            toks.push(Tok::Sym(match two.as_str() {
                "==" => "==",
                "!=" => "!=",
                "<=" => "<=",
                _ => ">=",
            }));
            i += 2;
            continue;
        }
        let one = match c {
            '(' => "(",
            ')' => ")",
            '{' => "{",
            '}' => "}",
            '[' => "[",
            ']' => "]",
            ',' => ",",
            ';' => ";",
            '=' => "=",
            '+' => "+",
            '-' => "-",
            '*' => "*",
            '/' => "/",
            '<' => "<",
            '>' => ">",
            _ => return Err(ParseError(format!("unexpected character {c:?}"))),
        };
        toks.push(Tok::Sym(one));
        i += 1;
    }
    toks.push(Tok::Eof);
    Ok(toks)
}

struct Parser {
    toks: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Tok {
        &self.toks[self.pos]
    }

    fn advance(&mut self) -> Tok {
        let t = self.toks[self.pos].clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn expect_sym(&mut self, sym: &str) -> Result<(), ParseError> {
        match self.advance() {
            Tok::Sym(s) if s == sym => Ok(()),
            other => Err(ParseError(format!("expected {sym:?}, got {other:?}"))),
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.advance() {
            Tok::Ident(name) => Ok(name),
            other => Err(ParseError(format!("expected identifier, got {other:?}"))),
        }
    }

    fn at_sym(&self, sym: &str) -> bool {
        matches!(self.peek(), Tok::Sym(s) if *s == sym)
    }

    fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut functions = BTreeMap::new();
        while !matches!(self.peek(), Tok::Eof) {
            let (name, function) = self.parse_function()?;
            functions.insert(name, function);
        }
        Ok(Program { functions })
    }

    fn parse_function(&mut self) -> Result<(String, Function), ParseError> {
        match self.advance() {
            Tok::Ident(kw) if kw == "fn" => {}
            other => return Err(ParseError(format!("expected 'fn', got {other:?}"))),
        }
        let name = self.expect_ident()?;
        self.expect_sym("(")?;
        let mut params = Vec::new();
        if !self.at_sym(")") {
            loop {
                params.push(self.expect_ident()?);
                if self.at_sym(",") {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.expect_sym(")")?;
        let body = self.parse_block()?;
        Ok((name, Function { params, body }))
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect_sym("{")?;
        let mut stmts = Vec::new();
        while !self.at_sym("}") {
            stmts.push(self.parse_stmt()?);
        }
        self.expect_sym("}")?;
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        if let Tok::Ident(kw) = self.peek() {
            if kw == "if" {
                self.advance();
                self.expect_sym("(")?;
                let cond = self.parse_expr()?;
                self.expect_sym(")")?;
                let then_block = self.parse_block()?;
                let else_block = if let Tok::Ident(kw2) = self.peek() {
                    if kw2 == "else" {
                        self.advance();
                        self.parse_block()?
                    } else {
                        Vec::new()
                    }
                } else {
                    Vec::new()
                };
                return Ok(Stmt::If(cond, then_block, else_block));
            }
            if kw == "return" {
                self.advance();
                if self.at_sym(";") {
                    self.advance();
                    return Ok(Stmt::Return(None));
                }
                let expr = self.parse_expr()?;
                self.expect_sym(";")?;
                return Ok(Stmt::Return(Some(expr)));
            }
        }
        let expr = self.parse_expr()?;
        if self.at_sym("=") {
            self.advance();
            let value = self.parse_expr()?;
            self.expect_sym(";")?;
            return Ok(Stmt::Assign(expr, value));
        }
        self.expect_sym(";")?;
        Ok(Stmt::Expr(expr))
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_equality()
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                Tok::Sym("==") => BinOp::Eq,
                Tok::Sym("!=") => BinOp::Ne,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            left = Expr::BinOp(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Tok::Sym("<") => BinOp::Lt,
                Tok::Sym("<=") => BinOp::Le,
                Tok::Sym(">") => BinOp::Gt,
                Tok::Sym(">=") => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::BinOp(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Tok::Sym("+") => BinOp::Add,
                Tok::Sym("-") => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = Expr::BinOp(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Tok::Sym("*") => BinOp::Mul,
                Tok::Sym("/") => BinOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::BinOp(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.at_sym("-") {
            self.advance();
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.at_sym("[") {
                self.advance();
                let index = self.parse_expr()?;
                self.expect_sym("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
                continue;
            }
            if self.at_sym("(") {
                let name = match &expr {
                    Expr::Ident(name) => name.clone(),
                    _ => return Err(ParseError("call target must be a plain name".into())),
                };
                self.advance();
                let mut args = Vec::new();
                if !self.at_sym(")") {
                    loop {
                        args.push(self.parse_expr()?);
                        if self.at_sym(",") {
                            self.advance();
                            continue;
                        }
                        break;
                    }
                }
                self.expect_sym(")")?;
                expr = Expr::Call(name, args);
                continue;
            }
            break;
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.advance() {
            Tok::Int(n) => Ok(Expr::IntLit(n)),
            Tok::Str(s) => Ok(Expr::StrLit(s)),
            Tok::Ident(name) => Ok(Expr::Ident(name)),
            Tok::Sym("(") => {
                let inner = self.parse_expr()?;
                self.expect_sym(")")?;
                Ok(inner)
            }
            Tok::Sym("{") => {
                self.expect_sym("}")?;
                Ok(Expr::EmptyMap)
            }
            other => Err(ParseError(format!("unexpected token {other:?}"))),
        }
    }
}

/// Parses contract source text into a [`Program`].
pub fn parse(source: &str) -> Result<Program, ParseError> {
    let toks = lex(source)?;
    let mut parser = Parser { toks, pos: 0 };
    let program = parser.parse_program()?;
    if !matches!(parser.peek(), Tok::Eof) {
        return Err(ParseError("trailing input after last function".into()));
    }
    Ok(program)
}

/// Parses a single call expression, e.g. the invocation text `"set_a(5)"`.
pub fn parse_call(source: &str) -> Result<Expr, ParseError> {
    let toks = lex(source)?;
    let mut parser = Parser { toks, pos: 0 };
    let expr = parser.parse_expr()?;
    if !matches!(parser.peek(), Tok::Eof) {
        return Err(ParseError("trailing input after invocation expression".into()));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_empty_constructor() {
        let program = parse("fn constructor() {\n}\n").unwrap();
        assert!(program.functions.contains_key("constructor"));
    }

    #[test]
    fn parses_setter_with_arithmetic() {
        let program = parse("fn set_a(n) {\n  a = n + 1;\n}\n").unwrap();
        let f = &program.functions["set_a"];
        assert_eq!(f.params, vec!["n".to_string()]);
        assert_eq!(f.body.len(), 1);
    }

    #[test]
    fn parses_invocation_expression() {
        let expr = parse_call("set_a(5)").unwrap();
        match expr {
            Expr::Call(name, args) => {
                assert_eq!(name, "set_a");
                assert_eq!(args, vec![Expr::IntLit(5)]);
            }
            other => panic!("expected call, got {other:?}"),
        }
    }
}
