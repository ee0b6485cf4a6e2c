//! Expression AST, parser, and evaluator.
//!
//! Expressions are parsed once into an AST and evaluated per row against a
//! [`VarContext`]. Two semantic rules are load-bearing and reproduced
//! exactly:
//!
//! - numeric missing propagates through arithmetic (any operand missing ⇒
//!   result missing), but in comparisons missing sorts below every finite
//!   number, so `. < 5` is true and `where age > 5` excludes missing ages;
//! - character comparison is case-sensitive with the shorter operand
//!   blank-padded to the longer operand's length.
//!
//! # Precedence
//!
//! `-`/`not` (unary) > `**` (right-assoc) > `*` `/` > `+` `-` >
//! relational > `and` > `or`; left-associative within a level.

use std::collections::HashMap;

use crate::error::{ErrorKind, InterpResult, InterpreterError};
use crate::table::Value;
use crate::token::{Token, TokenKind};

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

/// An expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal.
    Number(f64),
    /// String literal.
    Str(String),
    /// The missing-value literal `.`.
    Missing,
    /// Variable reference (includes dotted names like `first.x`).
    Var(String),
    /// Unary operator application.
    Unary(UnaryOp, Box<Expr>),
    /// Binary operator application.
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// Function call.
    Call(String, Vec<Expr>),
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Numeric negation.
    Neg,
    /// Logical NOT.
    Not,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    const fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse a whole token slice as one expression.
///
/// Fails if tokens remain after the expression.
pub fn parse_expression(tokens: &[Token]) -> InterpResult<Expr> {
    let mut parser = ExprParser { tokens, pos: 0 };
    let expr = parser.or_level()?;
    if parser.pos < tokens.len() {
        return Err(parse_err(format!(
            "unexpected token after expression: {:?}",
            tokens[parser.pos].kind
        )));
    }
    Ok(expr)
}

fn parse_err(message: impl Into<String>) -> InterpreterError {
    InterpreterError::new(ErrorKind::Parse, message)
}

struct ExprParser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl ExprParser<'_> {
    fn peek(&self) -> &TokenKind {
        self.tokens.get(self.pos).map_or(&TokenKind::Eof, |t| &t.kind)
    }

    fn bump(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        self.pos += 1;
        kind
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.peek().is_op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_ident(&mut self, name: &str) -> bool {
        if self.peek().is_ident(name) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or_level(&mut self) -> InterpResult<Expr> {
        let mut lhs = self.and_level()?;
        while self.eat_ident("or") {
            let rhs = self.and_level()?;
            lhs = Expr::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_level(&mut self) -> InterpResult<Expr> {
        let mut lhs = self.rel_level()?;
        while self.eat_ident("and") {
            let rhs = self.rel_level()?;
            lhs = Expr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn rel_level(&mut self) -> InterpResult<Expr> {
        let lhs = self.add_level()?;
        let Some(op) = self.relational_op() else {
            return Ok(lhs);
        };
        let rhs = self.add_level()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    /// Consume a relational operator (symbol or word form), if present.
    fn relational_op(&mut self) -> Option<BinaryOp> {
        let op = match self.peek() {
            TokenKind::Op("=") => BinaryOp::Eq,
            TokenKind::Op("^=" | "~=") => BinaryOp::Ne,
            TokenKind::Op("<") => BinaryOp::Lt,
            TokenKind::Op("<=") => BinaryOp::Le,
            TokenKind::Op(">") => BinaryOp::Gt,
            TokenKind::Op(">=") => BinaryOp::Ge,
            TokenKind::Ident(word) => match word.as_str() {
                "eq" => BinaryOp::Eq,
                "ne" => BinaryOp::Ne,
                "lt" => BinaryOp::Lt,
                "le" => BinaryOp::Le,
                "gt" => BinaryOp::Gt,
                "ge" => BinaryOp::Ge,
                _ => return None,
            },
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    fn add_level(&mut self) -> InterpResult<Expr> {
        let mut lhs = self.mul_level()?;
        loop {
            let op = if self.eat_op("+") {
                BinaryOp::Add
            } else if self.eat_op("-") {
                BinaryOp::Sub
            } else {
                return Ok(lhs);
            };
            let rhs = self.mul_level()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn mul_level(&mut self) -> InterpResult<Expr> {
        let mut lhs = self.pow_level()?;
        loop {
            let op = if self.eat_op("*") {
                BinaryOp::Mul
            } else if self.eat_op("/") {
                BinaryOp::Div
            } else {
                return Ok(lhs);
            };
            let rhs = self.pow_level()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    /// `**` binds tighter than `*`/`/` and associates to the right.
    fn pow_level(&mut self) -> InterpResult<Expr> {
        let base = self.unary_level()?;
        if self.eat_op("**") {
            let exp = self.pow_level()?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn unary_level(&mut self) -> InterpResult<Expr> {
        if self.eat_op("-") {
            let inner = self.unary_level()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)));
        }
        if self.eat_op("+") {
            return self.unary_level();
        }
        if self.eat_ident("not") {
            let inner = self.unary_level()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> InterpResult<Expr> {
        match self.bump() {
            TokenKind::Number(v) => Ok(Expr::Number(v)),
            TokenKind::Str(s) => Ok(Expr::Str(s)),
            TokenKind::Dot => Ok(Expr::Missing),
            TokenKind::Op("(") => {
                let inner = self.or_level()?;
                if !self.eat_op(")") {
                    return Err(parse_err("expected `)`"));
                }
                Ok(inner)
            }
            TokenKind::Ident(name) => self.ident_primary(name),
            other => Err(parse_err(format!("unexpected token: {other:?}"))),
        }
    }

    /// An identifier starts a variable reference, a dotted reference
    /// (`first.x`), or a function call.
    fn ident_primary(&mut self, name: String) -> InterpResult<Expr> {
        if matches!(self.peek(), TokenKind::Dot) {
            self.pos += 1;
            let TokenKind::Ident(suffix) = self.bump() else {
                return Err(parse_err(format!("expected name after `{name}.`")));
            };
            return Ok(Expr::Var(format!("{name}.{suffix}")));
        }

        if self.eat_op("(") {
            let mut args = Vec::new();
            if !self.peek().is_op(")") {
                loop {
                    args.push(self.or_level()?);
                    if !self.eat_op(",") {
                        break;
                    }
                }
            }
            if !self.eat_op(")") {
                return Err(parse_err(format!("expected `)` after {name}(...")));
            }
            return Ok(Expr::Call(name, args));
        }

        Ok(Expr::Var(name))
    }
}

// ---------------------------------------------------------------------------
// Evaluation context
// ---------------------------------------------------------------------------

/// Row context the evaluator resolves variable references against.
pub trait VarContext {
    /// The value bound to `name`, or `None` if the context has no such
    /// variable (an [`ErrorKind::Eval`] error).
    fn lookup(&self, name: &str) -> Option<Value>;
}

/// A context over a plain map; used by WHERE filtering and in tests.
impl VarContext for HashMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

fn eval_err(message: impl Into<String>) -> InterpreterError {
    InterpreterError::new(ErrorKind::Eval, message)
}

/// Evaluate an expression against a row context.
pub fn evaluate(
    expr: &Expr,
    ctx: &dyn VarContext,
    funcs: &FunctionTable,
) -> InterpResult<Value> {
    match expr {
        Expr::Number(v) => Ok(Value::num(*v)),
        Expr::Str(s) => Ok(Value::Char(s.clone())),
        Expr::Missing => Ok(Value::MISSING),
        Expr::Var(name) => ctx
            .lookup(name)
            .ok_or_else(|| eval_err(format!("variable {name} is not defined"))),
        Expr::Unary(op, inner) => {
            let v = evaluate(inner, ctx, funcs)?;
            apply_unary(*op, &v)
        }
        Expr::Binary(op, lhs, rhs) => {
            let l = evaluate(lhs, ctx, funcs)?;
            // AND/OR short-circuit on the left operand.
            match op {
                BinaryOp::And if !l.is_truthy() => return Ok(Value::num(0.0)),
                BinaryOp::Or if l.is_truthy() => return Ok(Value::num(1.0)),
                _ => {}
            }
            let r = evaluate(rhs, ctx, funcs)?;
            apply_binary(*op, &l, &r)
        }
        Expr::Call(name, args) => {
            let values = args
                .iter()
                .map(|a| evaluate(a, ctx, funcs))
                .collect::<InterpResult<Vec<_>>>()?;
            funcs.call(name, &values)
        }
    }
}

fn apply_unary(op: UnaryOp, v: &Value) -> InterpResult<Value> {
    match op {
        UnaryOp::Neg => match v {
            Value::Number(n) => Ok(Value::Number(n.map(|x| -x))),
            Value::Char(_) => Err(eval_err("cannot negate a character value")),
        },
        UnaryOp::Not => Ok(Value::num(if v.is_truthy() { 0.0 } else { 1.0 })),
    }
}

fn apply_binary(op: BinaryOp, l: &Value, r: &Value) -> InterpResult<Value> {
    if op.is_comparison() {
        return compare(op, l, r);
    }
    match op {
        BinaryOp::And | BinaryOp::Or => {
            // Left short-circuit handled by the caller; here the left
            // operand did not decide the result.
            Ok(Value::num(if r.is_truthy() { 1.0 } else { 0.0 }))
        }
        _ => arithmetic(op, l, r),
    }
}

/// Arithmetic: both operands numeric; missing propagates.
fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> InterpResult<Value> {
    let (Value::Number(a), Value::Number(b)) = (l, r) else {
        return Err(eval_err("arithmetic on a character value"));
    };
    let (Some(a), Some(b)) = (a, b) else {
        return Ok(Value::MISSING);
    };
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if *b == 0.0 {
                return Err(eval_err("division by zero"));
            }
            a / b
        }
        BinaryOp::Pow => a.powf(*b),
        _ => return Err(eval_err("internal: non-arithmetic operator")),
    };
    Ok(Value::num(result))
}

/// Comparison: missing numerics sort below every finite number; character
/// comparison blank-pads the shorter operand.
fn compare(op: BinaryOp, l: &Value, r: &Value) -> InterpResult<Value> {
    let ordering = match (l, r) {
        (Value::Number(a), Value::Number(b)) => {
            let a = a.unwrap_or(f64::NEG_INFINITY);
            let b = b.unwrap_or(f64::NEG_INFINITY);
            a.partial_cmp(&b)
                .ok_or_else(|| eval_err("unordered numeric comparison"))?
        }
        (Value::Char(a), Value::Char(b)) => {
            let width = a.len().max(b.len());
            let a = format!("{a:<width$}");
            let b = format!("{b:<width$}");
            a.cmp(&b)
        }
        _ => return Err(eval_err("comparison between numeric and character values")),
    };
    let holds = match op {
        BinaryOp::Eq => ordering.is_eq(),
        BinaryOp::Ne => ordering.is_ne(),
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        BinaryOp::Ge => ordering.is_ge(),
        _ => return Err(eval_err("internal: non-comparison operator")),
    };
    Ok(Value::num(if holds { 1.0 } else { 0.0 }))
}

// ---------------------------------------------------------------------------
// Builtin functions
// ---------------------------------------------------------------------------

/// A builtin function over already-evaluated arguments.
pub type BuiltinFn = fn(&[Value]) -> InterpResult<Value>;

/// Name → implementation registry; extensible by the procedure layer.
pub struct FunctionTable {
    map: HashMap<String, BuiltinFn>,
}

impl FunctionTable {
    /// The standard function set.
    #[must_use]
    pub fn standard() -> Self {
        let mut table = Self {
            map: HashMap::new(),
        };
        table.register("abs", fn_abs);
        table.register("sqrt", fn_sqrt);
        table.register("int", fn_int);
        table.register("round", fn_round);
        table.register("min", fn_min);
        table.register("max", fn_max);
        table.register("sum", fn_sum);
        table.register("mean", fn_mean);
        table.register("length", fn_length);
        table.register("substr", fn_substr);
        table.register("upcase", fn_upcase);
        table.register("lowcase", fn_lowcase);
        table.register("trim", fn_trim);
        table.register("index", fn_index);
        table.register("compress", fn_compress);
        table.register("ifc", fn_ifc);
        table.register("ifn", fn_ifn);
        table
    }

    /// Register (or replace) a function.
    pub fn register(&mut self, name: &str, f: BuiltinFn) {
        self.map.insert(name.to_ascii_lowercase(), f);
    }

    /// Invoke a function by name.
    pub fn call(&self, name: &str, args: &[Value]) -> InterpResult<Value> {
        let Some(f) = self.map.get(name) else {
            return Err(eval_err(format!("unknown function {name}")));
        };
        f(args)
    }
}

impl Default for FunctionTable {
    fn default() -> Self {
        Self::standard()
    }
}

fn one_number(args: &[Value], name: &str) -> InterpResult<Option<f64>> {
    match args {
        [Value::Number(v)] => Ok(*v),
        _ => Err(eval_err(format!("{name} expects one numeric argument"))),
    }
}

fn one_string(args: &[Value], name: &str) -> InterpResult<String> {
    match args {
        [Value::Char(s)] => Ok(s.clone()),
        _ => Err(eval_err(format!("{name} expects one character argument"))),
    }
}

/// Known numeric arguments, skipping missing (the row-wise SAS rule for
/// `sum`/`mean`/`min`/`max`).
fn known_numbers(args: &[Value], name: &str) -> InterpResult<Vec<f64>> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Value::Number(Some(v)) => out.push(*v),
            Value::Number(None) => {}
            Value::Char(_) => {
                return Err(eval_err(format!("{name} expects numeric arguments")));
            }
        }
    }
    Ok(out)
}

fn fn_abs(args: &[Value]) -> InterpResult<Value> {
    Ok(Value::Number(one_number(args, "abs")?.map(f64::abs)))
}

fn fn_sqrt(args: &[Value]) -> InterpResult<Value> {
    match one_number(args, "sqrt")? {
        Some(v) if v < 0.0 => Err(eval_err("sqrt of a negative number")),
        v => Ok(Value::Number(v.map(f64::sqrt))),
    }
}

fn fn_int(args: &[Value]) -> InterpResult<Value> {
    Ok(Value::Number(one_number(args, "int")?.map(f64::trunc)))
}

fn fn_round(args: &[Value]) -> InterpResult<Value> {
    match args {
        [Value::Number(v)] => Ok(Value::Number(v.map(f64::round))),
        [Value::Number(v), Value::Number(Some(unit))] if *unit > 0.0 => {
            Ok(Value::Number(v.map(|x| (x / unit).round() * unit)))
        }
        _ => Err(eval_err("round expects (number) or (number, unit)")),
    }
}

fn fn_min(args: &[Value]) -> InterpResult<Value> {
    let known = known_numbers(args, "min")?;
    Ok(Value::Number(known.into_iter().reduce(f64::min)))
}

fn fn_max(args: &[Value]) -> InterpResult<Value> {
    let known = known_numbers(args, "max")?;
    Ok(Value::Number(known.into_iter().reduce(f64::max)))
}

fn fn_sum(args: &[Value]) -> InterpResult<Value> {
    let known = known_numbers(args, "sum")?;
    if known.is_empty() {
        return Ok(Value::MISSING);
    }
    Ok(Value::num(known.iter().sum()))
}

#[expect(clippy::cast_precision_loss, reason = "argument counts are small")]
fn fn_mean(args: &[Value]) -> InterpResult<Value> {
    let known = known_numbers(args, "mean")?;
    if known.is_empty() {
        return Ok(Value::MISSING);
    }
    Ok(Value::num(known.iter().sum::<f64>() / known.len() as f64))
}

#[expect(clippy::cast_precision_loss, reason = "string lengths are small")]
fn fn_length(args: &[Value]) -> InterpResult<Value> {
    let s = one_string(args, "length")?;
    // Trailing blanks don't count; the empty string has length 1.
    Ok(Value::num(s.trim_end().len().max(1) as f64))
}

fn fn_substr(args: &[Value]) -> InterpResult<Value> {
    let (s, start, len) = match args {
        [Value::Char(s), Value::Number(Some(start))] => (s, *start, None),
        [Value::Char(s), Value::Number(Some(start)), Value::Number(Some(len))] => {
            (s, *start, Some(*len))
        }
        _ => return Err(eval_err("substr expects (string, start[, length])")),
    };
    if start < 1.0 {
        return Err(eval_err("substr start position must be >= 1"));
    }
    // 1-based start.
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "validated above")]
    let begin = (start as usize) - 1;
    let chars: Vec<char> = s.chars().collect();
    if begin >= chars.len() {
        return Ok(Value::Char(String::new()));
    }
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "negative lengths rejected")]
    let end = match len {
        Some(l) if l >= 0.0 => (begin + l as usize).min(chars.len()),
        Some(_) => return Err(eval_err("substr length must be >= 0")),
        None => chars.len(),
    };
    Ok(Value::Char(chars[begin..end].iter().collect()))
}

fn fn_upcase(args: &[Value]) -> InterpResult<Value> {
    Ok(Value::Char(one_string(args, "upcase")?.to_uppercase()))
}

fn fn_lowcase(args: &[Value]) -> InterpResult<Value> {
    Ok(Value::Char(one_string(args, "lowcase")?.to_lowercase()))
}

fn fn_trim(args: &[Value]) -> InterpResult<Value> {
    Ok(Value::Char(one_string(args, "trim")?.trim_end().to_owned()))
}

#[expect(clippy::cast_precision_loss, reason = "string positions are small")]
fn fn_index(args: &[Value]) -> InterpResult<Value> {
    match args {
        [Value::Char(s), Value::Char(pat)] => {
            let pos = s.find(pat.as_str()).map_or(0, |i| i + 1);
            Ok(Value::num(pos as f64))
        }
        _ => Err(eval_err("index expects (string, substring)")),
    }
}

fn fn_ifc(args: &[Value]) -> InterpResult<Value> {
    match args {
        [cond, Value::Char(t), Value::Char(f)] => {
            let picked = if cond.is_truthy() { t } else { f };
            Ok(Value::Char(picked.clone()))
        }
        _ => Err(eval_err("ifc expects (condition, string, string)")),
    }
}

fn fn_ifn(args: &[Value]) -> InterpResult<Value> {
    match args {
        [cond, Value::Number(t), Value::Number(f)] => {
            Ok(Value::Number(if cond.is_truthy() { *t } else { *f }))
        }
        _ => Err(eval_err("ifn expects (condition, number, number)")),
    }
}

fn fn_compress(args: &[Value]) -> InterpResult<Value> {
    match args {
        [Value::Char(s)] => Ok(Value::Char(s.chars().filter(|c| *c != ' ').collect())),
        [Value::Char(s), Value::Char(drop)] => Ok(Value::Char(
            s.chars().filter(|c| !drop.contains(*c)).collect(),
        )),
        _ => Err(eval_err("compress expects (string[, characters])")),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
