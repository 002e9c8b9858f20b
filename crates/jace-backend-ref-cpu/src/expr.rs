//! Parser and evaluator for tasklet code.
//!
//! Tasklets carry a single assignment `out = <expression>` in a small Python-like
//! language: arithmetic, comparisons, boolean and bitwise operators, conditional
//! expressions, calls of math and cast functions, and subscripts of array connectors.
//! Integer division truncates toward zero and `%` keeps the sign of the dividend.

use jace::backend::{BackendError, BackendResult};
use jace::{DType, ScalarValue};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Ident(String),
    Op(&'static str),
}

const OPERATORS: &[&str] = &[
    "**", "==", "!=", "<=", ">=", "<", ">", "+", "-", "*", "/", "%", "|", "&", "^", "~", "(",
    ")", ",", "[", "]", "=",
];

fn tokenize(code: &str) -> BackendResult<Vec<Token>> {
    let bytes = code.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let c = bytes[pos] as char;
        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }
        if c.is_ascii_digit() || (c == '.' && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit)) {
            let start = pos;
            let mut is_float = false;
            while pos < bytes.len() {
                let d = bytes[pos] as char;
                if d.is_ascii_digit() {
                    pos += 1;
                } else if d == '.' {
                    is_float = true;
                    pos += 1;
                } else if d == 'e' || d == 'E' {
                    is_float = true;
                    pos += 1;
                    if matches!(bytes.get(pos), Some(b'+') | Some(b'-')) {
                        pos += 1;
                    }
                } else {
                    break;
                }
            }
            let text = &code[start..pos];
            let token = if is_float {
                Token::Float(text.parse().map_err(|_| syntax(code, "bad float literal"))?)
            } else {
                Token::Int(text.parse().map_err(|_| syntax(code, "bad integer literal"))?)
            };
            tokens.push(token);
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let start = pos;
            while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
                pos += 1;
            }
            tokens.push(Token::Ident(code[start..pos].to_string()));
            continue;
        }
        let op = OPERATORS
            .iter()
            .find(|op| code[pos..].starts_with(**op))
            .ok_or_else(|| syntax(code, &format!("unexpected character '{c}'")))?;
        tokens.push(Token::Op(op));
        pos += op.len();
    }
    Ok(tokens)
}

fn syntax(code: &str, message: &str) -> BackendError {
    BackendError::execution(format!("can not parse tasklet `{code}`: {message}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BitOr,
    BitAnd,
    BitXor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Invert,
    Not,
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(ScalarValue),
    Name(String),
    Subscript(String, Vec<Expr>),
    Call(String, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    IfElse {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

/// `target = value`, the body of a tasklet.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub target: String,
    pub value: Expr,
}

impl Assignment {
    pub fn parse(code: &str) -> BackendResult<Self> {
        let tokens = tokenize(code)?;
        let mut parser = Parser {
            code,
            tokens,
            pos: 0,
        };
        let target = match parser.next() {
            Some(Token::Ident(name)) => name,
            _ => return Err(syntax(code, "expected an assignment target")),
        };
        parser.expect("=")?;
        let value = parser.expression()?;
        if parser.pos != parser.tokens.len() {
            return Err(syntax(code, "trailing tokens"));
        }
        Ok(Self { target, value })
    }
}

struct Parser<'a> {
    code: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn peek_op(&self, op: &str) -> bool {
        matches!(self.peek(), Some(Token::Op(o)) if *o == op)
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(name)) if name == keyword)
    }

    fn expect(&mut self, op: &str) -> BackendResult<()> {
        if self.peek_op(op) {
            self.pos += 1;
            Ok(())
        } else {
            Err(syntax(self.code, &format!("expected '{op}'")))
        }
    }

    fn expression(&mut self) -> BackendResult<Expr> {
        let then = self.or()?;
        if !self.peek_keyword("if") {
            return Ok(then);
        }
        self.pos += 1;
        let cond = self.or()?;
        if !self.peek_keyword("else") {
            return Err(syntax(self.code, "expected 'else'"));
        }
        self.pos += 1;
        let otherwise = self.expression()?;
        Ok(Expr::IfElse {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn or(&mut self) -> BackendResult<Expr> {
        let mut lhs = self.and()?;
        while self.peek_keyword("or") {
            self.pos += 1;
            lhs = Expr::Or(Box::new(lhs), Box::new(self.and()?));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> BackendResult<Expr> {
        let mut lhs = self.not()?;
        while self.peek_keyword("and") {
            self.pos += 1;
            lhs = Expr::And(Box::new(lhs), Box::new(self.not()?));
        }
        Ok(lhs)
    }

    fn not(&mut self) -> BackendResult<Expr> {
        if self.peek_keyword("not") {
            self.pos += 1;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(self.not()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> BackendResult<Expr> {
        let mut lhs = self.bit_or()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op("==")) => BinaryOp::Eq,
                Some(Token::Op("!=")) => BinaryOp::Ne,
                Some(Token::Op("<")) => BinaryOp::Lt,
                Some(Token::Op("<=")) => BinaryOp::Le,
                Some(Token::Op(">")) => BinaryOp::Gt,
                Some(Token::Op(">=")) => BinaryOp::Ge,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(self.bit_or()?));
        }
    }

    fn bit_or(&mut self) -> BackendResult<Expr> {
        let mut lhs = self.bit_xor()?;
        while self.peek_op("|") {
            self.pos += 1;
            lhs = Expr::Binary(BinaryOp::BitOr, Box::new(lhs), Box::new(self.bit_xor()?));
        }
        Ok(lhs)
    }

    fn bit_xor(&mut self) -> BackendResult<Expr> {
        let mut lhs = self.bit_and()?;
        while self.peek_op("^") {
            self.pos += 1;
            lhs = Expr::Binary(BinaryOp::BitXor, Box::new(lhs), Box::new(self.bit_and()?));
        }
        Ok(lhs)
    }

    fn bit_and(&mut self) -> BackendResult<Expr> {
        let mut lhs = self.sum()?;
        while self.peek_op("&") {
            self.pos += 1;
            lhs = Expr::Binary(BinaryOp::BitAnd, Box::new(lhs), Box::new(self.sum()?));
        }
        Ok(lhs)
    }

    fn sum(&mut self) -> BackendResult<Expr> {
        let mut lhs = self.product()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op("+")) => BinaryOp::Add,
                Some(Token::Op("-")) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(self.product()?));
        }
    }

    fn product(&mut self) -> BackendResult<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op("*")) => BinaryOp::Mul,
                Some(Token::Op("/")) => BinaryOp::Div,
                Some(Token::Op("%")) => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(self.unary()?));
        }
    }

    fn unary(&mut self) -> BackendResult<Expr> {
        let op = match self.peek() {
            Some(Token::Op("-")) => UnaryOp::Neg,
            Some(Token::Op("+")) => UnaryOp::Pos,
            Some(Token::Op("~")) => UnaryOp::Invert,
            _ => return self.power(),
        };
        self.pos += 1;
        Ok(Expr::Unary(op, Box::new(self.unary()?)))
    }

    fn power(&mut self) -> BackendResult<Expr> {
        let base = self.primary()?;
        if self.peek_op("**") {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn arguments(&mut self, close: &str) -> BackendResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.peek_op(close) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            if self.peek_op(",") {
                self.pos += 1;
                continue;
            }
            self.expect(close)?;
            return Ok(args);
        }
    }

    fn primary(&mut self) -> BackendResult<Expr> {
        match self.next() {
            Some(Token::Int(v)) => Ok(Expr::Const(ScalarValue::Int(v))),
            Some(Token::Float(v)) => Ok(Expr::Const(ScalarValue::Float(v))),
            Some(Token::Op("(")) => {
                let inner = self.expression()?;
                self.expect(")")?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "True" => Ok(Expr::Const(ScalarValue::Bool(true))),
                "False" => Ok(Expr::Const(ScalarValue::Bool(false))),
                "nan" => Ok(Expr::Const(ScalarValue::Float(f64::NAN))),
                "inf" => Ok(Expr::Const(ScalarValue::Float(f64::INFINITY))),
                _ if self.peek_op("(") => {
                    self.pos += 1;
                    Ok(Expr::Call(name, self.arguments(")")?))
                }
                _ if self.peek_op("[") => {
                    self.pos += 1;
                    Ok(Expr::Subscript(name, self.arguments("]")?))
                }
                _ => Ok(Expr::Name(name)),
            },
            _ => Err(syntax(self.code, "expected an operand")),
        }
    }
}

/// Source of names while evaluating an expression.
pub trait Scope {
    /// Value of a scalar connector, map parameter or symbol.
    fn value(&self, name: &str) -> Option<ScalarValue>;

    /// Element `index` of the array connector `name`.
    fn element(&self, name: &str, index: &[i64]) -> BackendResult<ScalarValue>;
}

impl Expr {
    pub fn eval(&self, scope: &dyn Scope) -> BackendResult<ScalarValue> {
        match self {
            Expr::Const(value) => Ok(*value),
            Expr::Name(name) => scope
                .value(name)
                .ok_or_else(|| BackendError::execution(format!("unbound name '{name}'"))),
            Expr::Subscript(name, indices) => {
                let index = indices
                    .iter()
                    .map(|expr| expr.eval(scope).map(ScalarValue::as_i64))
                    .collect::<BackendResult<Vec<_>>>()?;
                scope.element(name, &index)
            }
            Expr::Call(name, args) => {
                let args = args
                    .iter()
                    .map(|arg| arg.eval(scope))
                    .collect::<BackendResult<Vec<_>>>()?;
                call(name, &args)
            }
            Expr::Unary(op, operand) => unary(*op, operand.eval(scope)?),
            Expr::Binary(op, lhs, rhs) => binary(*op, lhs.eval(scope)?, rhs.eval(scope)?),
            Expr::And(lhs, rhs) => {
                let lhs = lhs.eval(scope)?;
                if !lhs.as_bool() {
                    return Ok(ScalarValue::Bool(false));
                }
                Ok(ScalarValue::Bool(rhs.eval(scope)?.as_bool()))
            }
            Expr::Or(lhs, rhs) => {
                let lhs = lhs.eval(scope)?;
                if lhs.as_bool() {
                    return Ok(ScalarValue::Bool(true));
                }
                Ok(ScalarValue::Bool(rhs.eval(scope)?.as_bool()))
            }
            Expr::IfElse {
                cond,
                then,
                otherwise,
            } => {
                if cond.eval(scope)?.as_bool() {
                    then.eval(scope)
                } else {
                    otherwise.eval(scope)
                }
            }
        }
    }
}

/// Common category two operands are computed in.
enum Promoted {
    Bool(bool, bool),
    Int(i64, i64),
    UInt(u64, u64),
    Float(f64, f64),
}

fn promote(lhs: ScalarValue, rhs: ScalarValue) -> Promoted {
    use ScalarValue::*;
    match (lhs, rhs) {
        (Float(_), _) | (_, Float(_)) => Promoted::Float(lhs.as_f64(), rhs.as_f64()),
        (Bool(a), Bool(b)) => Promoted::Bool(a, b),
        (UInt(a), UInt(b)) => Promoted::UInt(a, b),
        (UInt(a), Bool(b)) => Promoted::UInt(a, u64::from(b)),
        (Bool(a), UInt(b)) => Promoted::UInt(u64::from(a), b),
        _ => Promoted::Int(lhs.as_i64(), rhs.as_i64()),
    }
}

fn division_by_zero() -> BackendError {
    BackendError::execution("integer division by zero")
}

fn binary(op: BinaryOp, lhs: ScalarValue, rhs: ScalarValue) -> BackendResult<ScalarValue> {
    use ScalarValue::{Bool, Float, Int, UInt};

    if let Some(ordering) = compare(op, lhs, rhs) {
        return Ok(Bool(ordering));
    }
    let value = match (op, promote(lhs, rhs)) {
        (BinaryOp::BitOr, Promoted::Bool(a, b)) => Bool(a | b),
        (BinaryOp::BitAnd, Promoted::Bool(a, b)) => Bool(a & b),
        (BinaryOp::BitXor, Promoted::Bool(a, b)) => Bool(a ^ b),
        (op, Promoted::Bool(a, b)) => return binary(op, Int(i64::from(a)), Int(i64::from(b))),

        (BinaryOp::Add, Promoted::Int(a, b)) => Int(a.wrapping_add(b)),
        (BinaryOp::Sub, Promoted::Int(a, b)) => Int(a.wrapping_sub(b)),
        (BinaryOp::Mul, Promoted::Int(a, b)) => Int(a.wrapping_mul(b)),
        (BinaryOp::Div, Promoted::Int(_, 0)) | (BinaryOp::Rem, Promoted::Int(_, 0)) => {
            return Err(division_by_zero())
        }
        (BinaryOp::Div, Promoted::Int(a, b)) => Int(a.wrapping_div(b)),
        (BinaryOp::Rem, Promoted::Int(a, b)) => Int(a.wrapping_rem(b)),
        (BinaryOp::Pow, Promoted::Int(a, b)) if b >= 0 => {
            Int(a.wrapping_pow(u32::try_from(b).unwrap_or(u32::MAX)))
        }
        (BinaryOp::Pow, Promoted::Int(a, b)) => Float((a as f64).powf(b as f64)),
        (BinaryOp::BitOr, Promoted::Int(a, b)) => Int(a | b),
        (BinaryOp::BitAnd, Promoted::Int(a, b)) => Int(a & b),
        (BinaryOp::BitXor, Promoted::Int(a, b)) => Int(a ^ b),

        (BinaryOp::Add, Promoted::UInt(a, b)) => UInt(a.wrapping_add(b)),
        (BinaryOp::Sub, Promoted::UInt(a, b)) => UInt(a.wrapping_sub(b)),
        (BinaryOp::Mul, Promoted::UInt(a, b)) => UInt(a.wrapping_mul(b)),
        (BinaryOp::Div, Promoted::UInt(_, 0)) | (BinaryOp::Rem, Promoted::UInt(_, 0)) => {
            return Err(division_by_zero())
        }
        (BinaryOp::Div, Promoted::UInt(a, b)) => UInt(a / b),
        (BinaryOp::Rem, Promoted::UInt(a, b)) => UInt(a % b),
        (BinaryOp::Pow, Promoted::UInt(a, b)) => {
            UInt(a.wrapping_pow(u32::try_from(b).unwrap_or(u32::MAX)))
        }
        (BinaryOp::BitOr, Promoted::UInt(a, b)) => UInt(a | b),
        (BinaryOp::BitAnd, Promoted::UInt(a, b)) => UInt(a & b),
        (BinaryOp::BitXor, Promoted::UInt(a, b)) => UInt(a ^ b),

        (BinaryOp::Add, Promoted::Float(a, b)) => Float(a + b),
        (BinaryOp::Sub, Promoted::Float(a, b)) => Float(a - b),
        (BinaryOp::Mul, Promoted::Float(a, b)) => Float(a * b),
        (BinaryOp::Div, Promoted::Float(a, b)) => Float(a / b),
        (BinaryOp::Rem, Promoted::Float(a, b)) => Float(a % b),
        (BinaryOp::Pow, Promoted::Float(a, b)) => Float(a.powf(b)),
        (op @ (BinaryOp::BitOr | BinaryOp::BitAnd | BinaryOp::BitXor), Promoted::Float(..)) => {
            return Err(BackendError::execution(format!(
                "bitwise {op:?} on floating point operands"
            )))
        }
        (op, _) => {
            return Err(BackendError::execution(format!(
                "operator {op:?} can not be applied to {lhs:?} and {rhs:?}"
            )))
        }
    };
    Ok(value)
}

fn compare(op: BinaryOp, lhs: ScalarValue, rhs: ScalarValue) -> Option<bool> {
    let ordering = match promote(lhs, rhs) {
        Promoted::Bool(a, b) => a.partial_cmp(&b),
        Promoted::Int(a, b) => a.partial_cmp(&b),
        Promoted::UInt(a, b) => a.partial_cmp(&b),
        Promoted::Float(a, b) => a.partial_cmp(&b),
    };
    use std::cmp::Ordering::*;
    let result = match op {
        BinaryOp::Eq => ordering == Some(Equal),
        BinaryOp::Ne => ordering != Some(Equal),
        BinaryOp::Lt => ordering == Some(Less),
        BinaryOp::Le => matches!(ordering, Some(Less | Equal)),
        BinaryOp::Gt => ordering == Some(Greater),
        BinaryOp::Ge => matches!(ordering, Some(Greater | Equal)),
        _ => return None,
    };
    Some(result)
}

fn unary(op: UnaryOp, value: ScalarValue) -> BackendResult<ScalarValue> {
    use ScalarValue::{Bool, Float, Int, UInt};
    let result = match (op, value) {
        (UnaryOp::Not, v) => Bool(!v.as_bool()),
        (UnaryOp::Pos, Bool(v)) => Int(i64::from(v)),
        (UnaryOp::Pos, v) => v,
        (UnaryOp::Neg, Float(v)) => Float(-v),
        (UnaryOp::Neg, UInt(v)) => UInt(v.wrapping_neg()),
        (UnaryOp::Neg, v) => Int(v.as_i64().wrapping_neg()),
        (UnaryOp::Invert, UInt(v)) => UInt(!v),
        (UnaryOp::Invert, Float(_)) => {
            return Err(BackendError::execution("bitwise inversion of a float"))
        }
        (UnaryOp::Invert, v) => Int(!v.as_i64()),
    };
    Ok(result)
}

fn arity(name: &str, args: &[ScalarValue], expected: usize) -> BackendResult<()> {
    if args.len() != expected {
        return Err(BackendError::execution(format!(
            "'{name}' takes {expected} arguments, got {}",
            args.len()
        )));
    }
    Ok(())
}

fn float_fn(args: &[ScalarValue], f: impl Fn(f64) -> f64) -> ScalarValue {
    ScalarValue::Float(f(args[0].as_f64()))
}

fn call(name: &str, args: &[ScalarValue]) -> BackendResult<ScalarValue> {
    use ScalarValue::{Bool, Float, Int, UInt};

    if let Some(dtype) = DType::from_name(name) {
        arity(name, args, 1)?;
        return Ok(args[0].cast(dtype));
    }
    let binary_fn = matches!(name, "min" | "max" | "atan2" | "nextafter");
    arity(name, args, if binary_fn { 2 } else { 1 })?;

    let value = match name {
        "floor" | "ceil" | "round" => match args[0] {
            Float(v) => Float(match name {
                "floor" => v.floor(),
                "ceil" => v.ceil(),
                _ => v.round(),
            }),
            other => other,
        },
        "abs" => match args[0] {
            Float(v) => Float(v.abs()),
            Int(v) => Int(v.wrapping_abs()),
            other => other,
        },
        "sign" => match args[0] {
            Float(v) if v.is_nan() || v == 0.0 => Float(v),
            Float(v) => Float(v.signum()),
            Int(v) => Int(v.signum()),
            UInt(v) => UInt(u64::from(v != 0)),
            Bool(v) => Bool(v),
        },
        "conj" => args[0],
        "isfinite" => Bool(args[0].as_f64().is_finite()),
        "exp" => float_fn(args, f64::exp),
        "exp2" => float_fn(args, f64::exp2),
        "expm1" => float_fn(args, f64::exp_m1),
        "log" => float_fn(args, f64::ln),
        "log1p" => float_fn(args, f64::ln_1p),
        "sqrt" => float_fn(args, f64::sqrt),
        "cbrt" => float_fn(args, f64::cbrt),
        "sin" => float_fn(args, f64::sin),
        "asin" => float_fn(args, f64::asin),
        "cos" => float_fn(args, f64::cos),
        "acos" => float_fn(args, f64::acos),
        "tan" => float_fn(args, f64::tan),
        "atan" => float_fn(args, f64::atan),
        "sinh" => float_fn(args, f64::sinh),
        "asinh" => float_fn(args, f64::asinh),
        "cosh" => float_fn(args, f64::cosh),
        "acosh" => float_fn(args, f64::acosh),
        "tanh" => float_fn(args, f64::tanh),
        "atanh" => float_fn(args, f64::atanh),
        "min" | "max" => min_max(name == "max", args[0], args[1]),
        "atan2" => Float(args[0].as_f64().atan2(args[1].as_f64())),
        "nextafter" => Float(next_after(args[0].as_f64(), args[1].as_f64())),
        _ => {
            return Err(BackendError::execution(format!(
                "unknown tasklet function '{name}'"
            )))
        }
    };
    Ok(value)
}

fn min_max(max: bool, lhs: ScalarValue, rhs: ScalarValue) -> ScalarValue {
    use ScalarValue::{Bool, Float, Int, UInt};
    match promote(lhs, rhs) {
        Promoted::Float(a, b) if a.is_nan() || b.is_nan() => Float(f64::NAN),
        Promoted::Float(a, b) => Float(if max { a.max(b) } else { a.min(b) }),
        Promoted::Int(a, b) => Int(if max { a.max(b) } else { a.min(b) }),
        Promoted::UInt(a, b) => UInt(if max { a.max(b) } else { a.min(b) }),
        Promoted::Bool(a, b) => Bool(if max { a | b } else { a & b }),
    }
}

fn next_after(from: f64, to: f64) -> f64 {
    if from.is_nan() || to.is_nan() {
        return f64::NAN;
    }
    if from == to {
        return to;
    }
    if from == 0.0 {
        let smallest = f64::from_bits(1);
        return if to > 0.0 { smallest } else { -smallest };
    }
    let bits = from.to_bits();
    let away_from_zero = (to > from) == (from > 0.0);
    f64::from_bits(if away_from_zero { bits + 1 } else { bits - 1 })
}
