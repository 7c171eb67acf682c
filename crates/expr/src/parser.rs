//! Expression parser.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr       := and (OR and)*
//! and        := not (AND not)*
//! not        := NOT not | comparison
//! comparison := additive [ op additive | [NOT] LIKE additive
//!                        | [NOT] IN '(' expr, ... ')' | IS [NOT] NULL ]
//! additive   := term (('+' | '-') term)*
//! term       := unary (('*' | '/' | '%') unary)*
//! unary      := ('-' | '+') unary | primary
//! primary    := number | 'string' | #datetime# | TRUE | FALSE | NULL
//!             | '(' expr ')' | name | [any name] | `any name`
//!             | function '(' args ')' | aggregate '(' column ')'
//! ```
//!
//! Keywords and function names are case-insensitive.

use crate::ast::{AggregateFunc, BinaryOp, ColumnRef, Expr, Function, UnaryOp};
use tabula_core::{DataType, Error, Result, Value};

/// Parser state.
struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(offset)
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::expression(message, self.pos)
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        self.skip_whitespace();
        match self.peek() {
            Some(c) if c == expected => {
                self.advance();
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected '{}', found '{}'", expected, c))),
            None => Err(self.error(format!("expected '{}', found end of input", expected))),
        }
    }

    /// Consumes `word` if the next token is that keyword.
    fn eat_keyword(&mut self, word: &str) -> bool {
        self.skip_whitespace();
        let rest = &self.input[self.pos..];
        match rest.get(..word.len()) {
            Some(head) if head.eq_ignore_ascii_case(word) => {}
            _ => return false,
        }
        let boundary = rest[word.len()..]
            .chars()
            .next()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '_'));
        if boundary {
            self.pos += word.len();
        }
        boundary
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_whitespace();
        if self.input[self.pos..].starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn parse_identifier(&mut self) -> Result<String> {
        self.skip_whitespace();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(self.error("expected identifier"));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    /// `[name]` or `` `name` ``; `\]` escapes inside brackets.
    fn parse_quoted_identifier(&mut self, close: char) -> Result<String> {
        let start = self.pos;
        self.advance();
        let mut name = String::new();
        while let Some(c) = self.peek() {
            self.advance();
            if c == '\\' {
                if let Some(next) = self.peek() {
                    name.push(next);
                    self.advance();
                    continue;
                }
            }
            if c == close {
                return Ok(name);
            }
            name.push(c);
        }
        Err(Error::expression("unterminated column name", start))
    }

    fn parse_number(&mut self) -> Result<Value> {
        let start = self.pos;
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.advance();
            } else if c == '.' && !is_float {
                is_float = true;
                self.advance();
            } else if (c == 'e' || c == 'E') && self.peek_at(1).is_some_and(|n| n.is_ascii_digit() || n == '-' || n == '+') {
                is_float = true;
                self.advance();
                if matches!(self.peek(), Some('-') | Some('+')) {
                    self.advance();
                }
            } else {
                break;
            }
        }
        let text = &self.input[start..self.pos];
        if !is_float {
            if let Ok(v) = text.parse::<i32>() {
                return Ok(Value::Int32(v));
            }
            if let Ok(v) = text.parse::<i64>() {
                return Ok(Value::Int64(v));
            }
        }
        text.parse::<f64>()
            .map(Value::Float64)
            .map_err(|_| Error::expression(format!("invalid number '{}'", text), start))
    }

    /// Single-quoted string; `''` is an escaped quote.
    fn parse_string_literal(&mut self) -> Result<String> {
        let start = self.pos;
        self.advance();
        let mut out = String::new();
        while let Some(c) = self.peek() {
            self.advance();
            if c == '\'' {
                if self.peek() == Some('\'') {
                    self.advance();
                    out.push('\'');
                    continue;
                }
                return Ok(out);
            }
            out.push(c);
        }
        Err(Error::expression("unterminated string", start))
    }

    fn parse_datetime_literal(&mut self) -> Result<Value> {
        let start = self.pos;
        self.advance();
        let body_start = self.pos;
        while let Some(c) = self.peek() {
            if c == '#' {
                let body = self.input[body_start..self.pos].trim();
                self.advance();
                return body
                    .parse::<i64>()
                    .map(Value::DateTime)
                    .map_err(|_| Error::expression(format!("invalid datetime '{}'", body), start));
            }
            self.advance();
        }
        Err(Error::expression("unterminated datetime literal", start))
    }

    fn at_end(&mut self) -> bool {
        self.skip_whitespace();
        self.pos >= self.input.len()
    }
}

/// Parses a filter or computed-column expression.
pub fn parse(input: &str) -> Result<Expr> {
    let mut parser = Parser::new(input);
    if parser.at_end() {
        return Err(Error::expression("empty expression", 0));
    }
    let expr = parse_or(&mut parser)?;
    if !parser.at_end() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

fn parse_or(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_and(p)?;
    while p.eat_keyword("OR") {
        let right = parse_and(p)?;
        left = Expr::binary(left, BinaryOp::Or, right);
    }
    Ok(left)
}

fn parse_and(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_not(p)?;
    while p.eat_keyword("AND") {
        let right = parse_not(p)?;
        left = Expr::binary(left, BinaryOp::And, right);
    }
    Ok(left)
}

fn parse_not(p: &mut Parser) -> Result<Expr> {
    if p.eat_keyword("NOT") {
        let inner = parse_not(p)?;
        return Ok(Expr::UnaryOp {
            op: UnaryOp::Not,
            expr: Box::new(inner),
        });
    }
    parse_comparison(p)
}

fn parse_comparison(p: &mut Parser) -> Result<Expr> {
    let left = parse_additive(p)?;

    // Two-character operators first.
    let op = if p.eat("<>") || p.eat("!=") {
        Some(BinaryOp::Ne)
    } else if p.eat("<=") {
        Some(BinaryOp::Le)
    } else if p.eat(">=") {
        Some(BinaryOp::Ge)
    } else if p.eat("=") {
        Some(BinaryOp::Eq)
    } else if p.eat("<") {
        Some(BinaryOp::Lt)
    } else if p.eat(">") {
        Some(BinaryOp::Gt)
    } else {
        None
    };
    if let Some(op) = op {
        let right = parse_additive(p)?;
        return Ok(Expr::binary(left, op, right));
    }

    if p.eat_keyword("IS") {
        let negated = p.eat_keyword("NOT");
        if !p.eat_keyword("NULL") {
            return Err(p.error("expected NULL after IS"));
        }
        return Ok(Expr::IsNull {
            expr: Box::new(left),
            negated,
        });
    }

    let save = p.pos;
    let negated = p.eat_keyword("NOT");
    if p.eat_keyword("LIKE") {
        let pattern = parse_additive(p)?;
        return Ok(Expr::Like {
            expr: Box::new(left),
            pattern: Box::new(pattern),
            negated,
        });
    }
    if p.eat_keyword("IN") {
        p.expect('(')?;
        let mut list = vec![parse_or(p)?];
        while p.eat(",") {
            list.push(parse_or(p)?);
        }
        p.expect(')')?;
        return Ok(Expr::In {
            expr: Box::new(left),
            list,
            negated,
        });
    }
    if negated {
        p.pos = save;
        return Err(p.error("expected LIKE or IN after NOT"));
    }
    Ok(left)
}

fn parse_additive(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_term(p)?;
    loop {
        let op = if p.eat("+") {
            BinaryOp::Add
        } else if p.eat("-") {
            BinaryOp::Sub
        } else {
            break;
        };
        let right = parse_term(p)?;
        left = Expr::binary(left, op, right);
    }
    Ok(left)
}

fn parse_term(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_unary(p)?;
    loop {
        let op = if p.eat("*") {
            BinaryOp::Mul
        } else if p.eat("/") {
            BinaryOp::Div
        } else if p.eat("%") {
            BinaryOp::Mod
        } else {
            break;
        };
        let right = parse_unary(p)?;
        left = Expr::binary(left, op, right);
    }
    Ok(left)
}

fn parse_unary(p: &mut Parser) -> Result<Expr> {
    if p.eat("-") {
        let inner = parse_unary(p)?;
        return Ok(match inner {
            Expr::Literal(Value::Int32(v)) => Expr::Literal(Value::Int32(-v)),
            Expr::Literal(Value::Int64(v)) => Expr::Literal(Value::Int64(-v)),
            Expr::Literal(Value::Float64(v)) => Expr::Literal(Value::Float64(-v)),
            other => Expr::UnaryOp {
                op: UnaryOp::Neg,
                expr: Box::new(other),
            },
        });
    }
    if p.eat("+") {
        return parse_unary(p);
    }
    parse_primary(p)
}

fn parse_primary(p: &mut Parser) -> Result<Expr> {
    p.skip_whitespace();
    match p.peek() {
        None => Err(p.error("unexpected end of input")),
        Some('(') => {
            p.advance();
            let inner = parse_or(p)?;
            p.expect(')')?;
            Ok(inner)
        }
        Some('\'') => Ok(Expr::Literal(Value::String(p.parse_string_literal()?))),
        Some('#') => Ok(Expr::Literal(p.parse_datetime_literal()?)),
        Some('[') => Ok(Expr::column(p.parse_quoted_identifier(']')?)),
        Some('`') => Ok(Expr::column(p.parse_quoted_identifier('`')?)),
        Some(c) if c.is_ascii_digit() || c == '.' => Ok(Expr::Literal(p.parse_number()?)),
        Some(c) if c.is_alphabetic() || c == '_' => {
            let start = p.pos;
            let name = p.parse_identifier()?;
            match name.to_ascii_lowercase().as_str() {
                "true" => return Ok(Expr::literal(true)),
                "false" => return Ok(Expr::literal(false)),
                "null" => return Ok(Expr::Literal(Value::Null)),
                _ => {}
            }
            p.skip_whitespace();
            if p.peek() == Some('(') {
                p.advance();
                return parse_call(p, &name, start);
            }
            Ok(Expr::column(name))
        }
        Some(c) => Err(p.error(format!("unexpected character '{}'", c))),
    }
}

fn parse_call(p: &mut Parser, name: &str, start: usize) -> Result<Expr> {
    if let Some(func) = AggregateFunc::from_name(name) {
        p.skip_whitespace();
        let column = match p.peek() {
            Some('[') => p.parse_quoted_identifier(']')?,
            Some('`') => p.parse_quoted_identifier('`')?,
            _ => p.parse_identifier()?,
        };
        p.expect(')')?;
        return Ok(Expr::Aggregate {
            func,
            column: ColumnRef::new(column),
        });
    }

    let func = Function::from_name(name)
        .ok_or_else(|| Error::expression(format!("unknown function '{}'", name), start))?;
    let mut args = Vec::new();
    if !p.eat(")") {
        loop {
            args.push(parse_or(p)?);
            if p.eat(",") {
                continue;
            }
            p.expect(')')?;
            break;
        }
    }
    if args.len() != func.arity() {
        return Err(Error::expression(
            format!("{} expects {} arguments, got {}", name, func.arity(), args.len()),
            start,
        ));
    }
    if func == Function::Convert {
        let target = match &args[1] {
            Expr::Literal(Value::String(s)) => parse_type_name(s)
                .ok_or_else(|| Error::expression(format!("unknown type '{}'", s), start))?,
            _ => return Err(Error::expression("Convert expects a type name", start)),
        };
        args[1] = Expr::Type(target);
    }
    Ok(Expr::Function { func, args })
}

fn parse_type_name(name: &str) -> Option<DataType> {
    let short = name.rsplit('.').next().unwrap_or(name);
    match short.to_ascii_lowercase().as_str() {
        "boolean" | "bool" => Some(DataType::Boolean),
        "int32" | "int" => Some(DataType::Int32),
        "int64" | "long" => Some(DataType::Int64),
        "float64" | "double" => Some(DataType::Float64),
        "string" => Some(DataType::String),
        "datetime" => Some(DataType::DateTime),
        _ => None,
    }
}
