//! Restricted condition grammar.
//!
//! Literals, variables, arithmetic, comparisons, membership and boolean
//! operators. There are no calls, attribute lookups or indexing: an
//! expression can only read the namespace it is evaluated against.

use serde_json::{Map, Value};
use std::cmp::Ordering;

use super::ScriptError;

/// Variables visible to an expression. `extra` shadows `variables`.
#[derive(Debug, Clone, Copy)]
pub struct Namespace<'a> {
    pub variables: &'a Map<String, Value>,
    pub extra: Option<&'a Map<String, Value>>,
}

impl<'a> Namespace<'a> {
    pub fn new(variables: &'a Map<String, Value>, extra: Option<&'a Map<String, Value>>) -> Self {
        Self { variables, extra }
    }

    pub fn lookup(&self, name: &str) -> Option<&'a Value> {
        self.extra
            .and_then(|extra| extra.get(name))
            .or_else(|| self.variables.get(name))
    }
}

/// Parse and evaluate `source`, returning the resulting value.
pub fn evaluate(source: &str, namespace: &Namespace<'_>) -> Result<Value, ScriptError> {
    let expr = parse(source)?;
    eval(&expr, namespace)
}

/// `left + right` with the grammar's rules (numbers add, strings and lists concatenate).
pub fn add_values(left: Value, right: Value) -> Result<Value, ScriptError> {
    arithmetic(BinOp::Add, left, right)
}

/// Falsy values: null, false, 0, "", [] and {}.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

// --- Lexer ---

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
}

fn tokenize(source: &str) -> Result<Vec<Token>, ScriptError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && next.is_some_and(|n| n.is_ascii_digit())) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let token = if text.contains('.') {
                text.parse().map(Token::Float).ok()
            } else {
                text.parse().map(Token::Int).ok()
            };
            tokens.push(token.ok_or_else(|| ScriptError::Syntax(format!("bad number '{}'", text)))?);
            continue;
        }

        if c == '"' || c == '\'' {
            let (text, end) = read_string(&chars, i)?;
            tokens.push(Token::Str(text));
            i = end;
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
            continue;
        }

        let (token, width) = match (c, next) {
            ('=', Some('=')) => (Token::Eq, 2),
            ('!', Some('=')) => (Token::Ne, 2),
            ('<', Some('=')) => (Token::Le, 2),
            ('>', Some('=')) => (Token::Ge, 2),
            ('&', Some('&')) => (Token::AndAnd, 2),
            ('|', Some('|')) => (Token::OrOr, 2),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            ('!', _) => (Token::Bang, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            _ => {
                return Err(ScriptError::Syntax(format!(
                    "unexpected character '{}' at {}",
                    c, i
                )))
            }
        };
        tokens.push(token);
        i += width;
    }

    Ok(tokens)
}

/// Read a quoted string starting at `start`; returns the text and the index after the closing quote.
fn read_string(chars: &[char], start: usize) -> Result<(String, usize), ScriptError> {
    let quote = chars[start];
    let mut text = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            c if c == quote => return Ok((text, i + 1)),
            '\\' if i + 1 < chars.len() => {
                text.push(match chars[i + 1] {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                i += 2;
            }
            c => {
                text.push(c);
                i += 1;
            }
        }
    }

    Err(ScriptError::Syntax("unterminated string".to_string()))
}

// --- Parser ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinOp {
    fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Var(String),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// Chained comparison: `a < b <= c` means `a < b and b <= c`.
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

fn parse(source: &str) -> Result<Expr, ScriptError> {
    let mut parser = Parser {
        tokens: tokenize(source)?,
        pos: 0,
    };
    let expr = parser.parse_or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(ScriptError::Syntax(format!("unexpected {:?}", token))),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn is_keyword(token: Option<&Token>, keyword: &str) -> bool {
        matches!(token, Some(Token::Ident(name)) if name == keyword)
    }

    fn parse_or(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(Token::OrOr)) || Self::is_keyword(self.peek(), "or") {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.parse_not()?;
        while matches!(self.peek(), Some(Token::AndAnd)) || Self::is_keyword(self.peek(), "and") {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ScriptError> {
        if matches!(self.peek(), Some(Token::Bang)) || Self::is_keyword(self.peek(), "not") {
            self.advance();
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ScriptError> {
        let first = self.parse_additive()?;
        let mut rest = Vec::new();

        loop {
            let (op, width) = match self.peek() {
                Some(Token::Eq) => (CmpOp::Eq, 1),
                Some(Token::Ne) => (CmpOp::Ne, 1),
                Some(Token::Lt) => (CmpOp::Lt, 1),
                Some(Token::Le) => (CmpOp::Le, 1),
                Some(Token::Gt) => (CmpOp::Gt, 1),
                Some(Token::Ge) => (CmpOp::Ge, 1),
                token if Self::is_keyword(token, "in") => (CmpOp::In, 1),
                token if Self::is_keyword(token, "not") && Self::is_keyword(self.peek_at(1), "in") => {
                    (CmpOp::NotIn, 2)
                }
                _ => break,
            };
            self.pos += width;
            rest.push((op, self.parse_additive()?));
        }

        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), rest))
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ScriptError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            Some(Token::Plus) => {
                self.advance();
                self.parse_unary()
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ScriptError> {
        match self.advance() {
            Some(Token::Int(i)) => Ok(Expr::Literal(Value::from(i))),
            Some(Token::Float(f)) => Ok(Expr::Literal(float_value(f)?)),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Ident(name)) => match name.as_str() {
                "true" | "True" => Ok(Expr::Literal(Value::Bool(true))),
                "false" | "False" => Ok(Expr::Literal(Value::Bool(false))),
                "null" | "None" => Ok(Expr::Literal(Value::Null)),
                "and" | "or" | "not" | "in" => {
                    Err(ScriptError::Syntax(format!("unexpected keyword '{}'", name)))
                }
                _ => Ok(Expr::Var(name)),
            },
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(ScriptError::Syntax("expected ')'".to_string())),
                }
            }
            Some(token) => Err(ScriptError::Syntax(format!("unexpected {:?}", token))),
            None => Err(ScriptError::Syntax("unexpected end of expression".to_string())),
        }
    }
}

// --- Evaluator ---

fn eval(expr: &Expr, namespace: &Namespace<'_>) -> Result<Value, ScriptError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Var(name) => namespace
            .lookup(name)
            .cloned()
            .ok_or_else(|| ScriptError::UnknownVariable(name.clone())),
        Expr::Neg(inner) => match number(&eval(inner, namespace)?) {
            Some(Num::Int(i)) => i
                .checked_neg()
                .map(Value::from)
                .ok_or_else(|| ScriptError::InvalidOperation("integer overflow".to_string())),
            Some(Num::Float(f)) => float_value(-f),
            None => Err(ScriptError::InvalidOperation("bad operand for unary -".to_string())),
        },
        Expr::Not(inner) => Ok(Value::Bool(!is_truthy(&eval(inner, namespace)?))),
        Expr::Binary(op, left, right) => {
            arithmetic(*op, eval(left, namespace)?, eval(right, namespace)?)
        }
        Expr::Compare(first, rest) => {
            let mut left = eval(first, namespace)?;
            for (op, expr) in rest {
                let right = eval(expr, namespace)?;
                if !compare(*op, &left, &right)? {
                    return Ok(Value::Bool(false));
                }
                left = right;
            }
            Ok(Value::Bool(true))
        }
        Expr::And(left, right) => {
            let left = eval(left, namespace)?;
            if is_truthy(&left) {
                eval(right, namespace)
            } else {
                Ok(left)
            }
        }
        Expr::Or(left, right) => {
            let left = eval(left, namespace)?;
            if is_truthy(&left) {
                Ok(left)
            } else {
                eval(right, namespace)
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

/// Numeric view; booleans count as 0 and 1.
fn number(value: &Value) -> Option<Num> {
    match value {
        Value::Number(n) => n.as_i64().map(Num::Int).or_else(|| n.as_f64().map(Num::Float)),
        Value::Bool(b) => Some(Num::Int(i64::from(*b))),
        _ => None,
    }
}

fn float_value(f: f64) -> Result<Value, ScriptError> {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| ScriptError::InvalidOperation("non-finite result".to_string()))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn arithmetic(op: BinOp, left: Value, right: Value) -> Result<Value, ScriptError> {
    match (op, &left, &right) {
        (BinOp::Add, Value::String(a), Value::String(b)) => {
            return Ok(Value::String(format!("{}{}", a, b)))
        }
        (BinOp::Add, Value::Array(a), Value::Array(b)) => {
            return Ok(Value::Array(a.iter().chain(b).cloned().collect()))
        }
        _ => {}
    }

    let (Some(a), Some(b)) = (number(&left), number(&right)) else {
        return Err(ScriptError::InvalidOperation(format!(
            "unsupported operands for {}: {} and {}",
            op.symbol(),
            type_name(&left),
            type_name(&right)
        )));
    };
    let overflow = || ScriptError::InvalidOperation("integer overflow".to_string());
    let division_by_zero = || ScriptError::InvalidOperation("division by zero".to_string());

    match (op, a, b) {
        (BinOp::Div, _, _) => {
            if b.as_f64() == 0.0 {
                return Err(division_by_zero());
            }
            float_value(a.as_f64() / b.as_f64())
        }
        (BinOp::Mod, Num::Int(x), Num::Int(y)) => {
            if y == 0 {
                return Err(division_by_zero());
            }
            let r = x.checked_rem(y).ok_or_else(overflow)?;
            // Result takes the sign of the divisor.
            Ok(Value::from(if r != 0 && (r < 0) != (y < 0) { r + y } else { r }))
        }
        (BinOp::Mod, _, _) => {
            let (x, y) = (a.as_f64(), b.as_f64());
            if y == 0.0 {
                return Err(division_by_zero());
            }
            let r = x % y;
            float_value(if r != 0.0 && (r < 0.0) != (y < 0.0) { r + y } else { r })
        }
        (BinOp::Add, Num::Int(x), Num::Int(y)) => x.checked_add(y).map(Value::from).ok_or_else(overflow),
        (BinOp::Sub, Num::Int(x), Num::Int(y)) => x.checked_sub(y).map(Value::from).ok_or_else(overflow),
        (BinOp::Mul, Num::Int(x), Num::Int(y)) => x.checked_mul(y).map(Value::from).ok_or_else(overflow),
        (BinOp::Add, _, _) => float_value(a.as_f64() + b.as_f64()),
        (BinOp::Sub, _, _) => float_value(a.as_f64() - b.as_f64()),
        (BinOp::Mul, _, _) => float_value(a.as_f64() * b.as_f64()),
    }
}

/// Equality that treats `1`, `1.0` and `true` alike.
fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (number(left), number(right)) {
        (Some(Num::Int(a)), Some(Num::Int(b))) => a == b,
        (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn order(left: &Value, right: &Value) -> Result<Ordering, ScriptError> {
    let ordering = match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => match (number(left), number(right)) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => Some(a.cmp(&b)),
            (Some(a), Some(b)) => a.as_f64().partial_cmp(&b.as_f64()),
            _ => None,
        },
    };
    ordering.ok_or_else(|| {
        ScriptError::InvalidOperation(format!(
            "cannot order {} and {}",
            type_name(left),
            type_name(right)
        ))
    })
}

fn contains(container: &Value, item: &Value) -> Result<bool, ScriptError> {
    match (container, item) {
        (Value::Array(items), _) => Ok(items.iter().any(|v| loosely_equal(v, item))),
        (Value::Object(map), Value::String(key)) => Ok(map.contains_key(key)),
        (Value::String(text), Value::String(needle)) => Ok(text.contains(needle.as_str())),
        _ => Err(ScriptError::InvalidOperation(format!(
            "cannot test {} membership in {}",
            type_name(item),
            type_name(container)
        ))),
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, ScriptError> {
    Ok(match op {
        CmpOp::Eq => loosely_equal(left, right),
        CmpOp::Ne => !loosely_equal(left, right),
        CmpOp::In => contains(right, left)?,
        CmpOp::NotIn => !contains(right, left)?,
        CmpOp::Lt => order(left, right)? == Ordering::Less,
        CmpOp::Le => order(left, right)? != Ordering::Greater,
        CmpOp::Gt => order(left, right)? == Ordering::Greater,
        CmpOp::Ge => order(left, right)? != Ordering::Less,
    })
}
