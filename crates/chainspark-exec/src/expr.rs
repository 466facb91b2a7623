//! Whitelisted arithmetic expressions for `INJECT(...)` sites.
//!
//! Expression text ultimately originates from LLM output, so this is a
//! hard security boundary: a closed grammar (numbers, strings, the four
//! arithmetic operators plus `%`, unary minus, parentheses), variables
//! resolved only against the chain's `previous_results`, and exactly the
//! functions `int, float, round, abs, min, max, ceil, floor`. There is no
//! name resolution beyond that, no attribute access, no call through
//! anything but the fixed function list.

use std::collections::HashMap;
use std::fmt;

use nom::branch::alt;
use nom::bytes::complete::{take_while, take_while1};
use nom::character::complete::{char as pchar, digit1, multispace0};
use nom::combinator::{all_consuming, map, map_res, opt, recognize};
use nom::multi::{many0, separated_list0};
use nom::sequence::{delimited, pair, preceded, tuple};
use nom::IResult;
use thiserror::Error;

/// Function names callable from an expression. Everything else is
/// rejected, including anything that merely *looks* like a builtin.
pub const ALLOWED_FUNCTIONS: &[&str] =
    &["int", "float", "round", "abs", "min", "max", "ceil", "floor"];

/// A scalar carried between chain steps or produced by evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    /// Parse a SPARQL binding value: integer, then float, then raw text.
    pub fn parse_scalar(text: &str) -> Value {
        if let Ok(i) = text.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = text.parse::<f64>() {
            return Value::Float(f);
        }
        Value::Str(text.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    #[error("expression syntax error: {0}")]
    Syntax(String),
    #[error("unknown variable `{0}`")]
    UnknownVariable(String),
    #[error("function `{0}` is not allowed")]
    UnknownFunction(String),
    #[error("`{func}` expects {expected} argument(s), got {got}")]
    Arity {
        func: String,
        expected: usize,
        got: usize,
    },
    #[error("type error: {0}")]
    Type(String),
    #[error("division by zero")]
    DivisionByZero,
}

/// Evaluate an expression against the chain's accumulated bindings.
pub fn evaluate(expr: &str, env: &HashMap<String, Value>) -> Result<Value, EvalError> {
    let ast = parse_expression(expr)?;
    eval_node(&ast, env)
}

// ============================================================================
// Grammar
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Var(String),
    Call(String, Vec<Expr>),
    Neg(Box<Expr>),
    Binary(Op, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

fn parse_expression(input: &str) -> Result<Expr, EvalError> {
    let (_, expr) = all_consuming(ws(additive))(input)
        .map_err(|e| EvalError::Syntax(format!("{e:?}")))?;
    Ok(expr)
}

fn additive(input: &str) -> IResult<&str, Expr> {
    let (input, first) = multiplicative(input)?;
    let (input, rest) = many0(pair(ws(alt((pchar('+'), pchar('-')))), multiplicative))(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn multiplicative(input: &str) -> IResult<&str, Expr> {
    let (input, first) = unary(input)?;
    let (input, rest) = many0(pair(
        ws(alt((pchar('*'), pchar('/'), pchar('%')))),
        unary,
    ))(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn fold_binary(first: Expr, rest: Vec<(char, Expr)>) -> Expr {
    rest.into_iter().fold(first, |lhs, (op, rhs)| {
        let op = match op {
            '+' => Op::Add,
            '-' => Op::Sub,
            '*' => Op::Mul,
            '/' => Op::Div,
            _ => Op::Rem,
        };
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    })
}

fn unary(input: &str) -> IResult<&str, Expr> {
    preceded(
        multispace0,
        alt((
            map(preceded(pair(pchar('-'), multispace0), unary), |e| {
                Expr::Neg(Box::new(e))
            }),
            atom,
        )),
    )(input)
}

fn atom(input: &str) -> IResult<&str, Expr> {
    alt((
        delimited(ws(pchar('(')), additive, ws(pchar(')'))),
        string_literal,
        number,
        call_or_var,
    ))(input)
}

fn number(input: &str) -> IResult<&str, Expr> {
    map_res(
        recognize(tuple((digit1, opt(tuple((pchar('.'), digit1)))))),
        |text: &str| -> Result<Expr, String> {
            if text.contains('.') {
                text.parse::<f64>().map(Expr::Float).map_err(|e| e.to_string())
            } else {
                text.parse::<i64>().map(Expr::Int).map_err(|e| e.to_string())
            }
        },
    )(input)
}

fn string_literal(input: &str) -> IResult<&str, Expr> {
    alt((
        map(
            delimited(pchar('\''), take_while(|c| c != '\''), pchar('\'')),
            |s: &str| Expr::Str(s.to_string()),
        ),
        map(
            delimited(pchar('"'), take_while(|c| c != '"'), pchar('"')),
            |s: &str| Expr::Str(s.to_string()),
        ),
    ))(input)
}

fn call_or_var(input: &str) -> IResult<&str, Expr> {
    let (input, name) = identifier(input)?;
    let (input, args) = opt(preceded(
        multispace0,
        delimited(
            pchar('('),
            separated_list0(ws(pchar(',')), additive),
            ws(pchar(')')),
        ),
    ))(input)?;
    let expr = match args {
        Some(args) => Expr::Call(name.to_string(), args),
        None => Expr::Var(name.to_string()),
    };
    Ok((input, expr))
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)
}

fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

// ============================================================================
// Evaluation
// ============================================================================

fn eval_node(node: &Expr, env: &HashMap<String, Value>) -> Result<Value, EvalError> {
    match node {
        Expr::Int(i) => Ok(Value::Int(*i)),
        Expr::Float(f) => Ok(Value::Float(*f)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Var(name) => env
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnknownVariable(name.clone())),
        Expr::Neg(inner) => match eval_node(inner, env)? {
            Value::Int(i) => Ok(Value::Int(-i)),
            Value::Float(f) => Ok(Value::Float(-f)),
            Value::Str(_) => Err(EvalError::Type("cannot negate a string".to_string())),
        },
        Expr::Binary(op, lhs, rhs) => {
            let lhs = eval_node(lhs, env)?;
            let rhs = eval_node(rhs, env)?;
            apply_binary(*op, lhs, rhs)
        }
        Expr::Call(name, args) => {
            let values = args
                .iter()
                .map(|a| eval_node(a, env))
                .collect::<Result<Vec<_>, _>>()?;
            apply_function(name, values)
        }
    }
}

fn apply_binary(op: Op, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    use Value::{Float, Int, Str};
    match (op, lhs, rhs) {
        (Op::Add, Str(a), Str(b)) => Ok(Str(format!("{a}{b}"))),
        (_, Str(_), _) | (_, _, Str(_)) => Err(EvalError::Type(
            "arithmetic on a string value".to_string(),
        )),

        (Op::Add, Int(a), Int(b)) => Ok(Int(a.wrapping_add(b))),
        (Op::Sub, Int(a), Int(b)) => Ok(Int(a.wrapping_sub(b))),
        (Op::Mul, Int(a), Int(b)) => Ok(Int(a.wrapping_mul(b))),
        (Op::Rem, Int(a), Int(b)) => {
            if b == 0 {
                Err(EvalError::DivisionByZero)
            } else {
                Ok(Int(a.wrapping_rem(b)))
            }
        }
        // Division always produces a float; the engine re-integerizes at
        // the injection boundary.
        (Op::Div, a, b) => {
            let b = as_f64(&b)?;
            if b == 0.0 {
                Err(EvalError::DivisionByZero)
            } else {
                Ok(Float(as_f64(&a)? / b))
            }
        }

        (op, a, b) => {
            let (a, b) = (as_f64(&a)?, as_f64(&b)?);
            let out = match op {
                Op::Add => a + b,
                Op::Sub => a - b,
                Op::Mul => a * b,
                Op::Rem => {
                    if b == 0.0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    a % b
                }
                Op::Div => unreachable!("division handled above"),
            };
            Ok(Float(out))
        }
    }
}

fn apply_function(name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
    if !ALLOWED_FUNCTIONS.contains(&name) {
        return Err(EvalError::UnknownFunction(name.to_string()));
    }

    let arity = |expected: usize| -> Result<(), EvalError> {
        if args.len() == expected {
            Ok(())
        } else {
            Err(EvalError::Arity {
                func: name.to_string(),
                expected,
                got: args.len(),
            })
        }
    };

    match name {
        "int" => {
            arity(1)?;
            match &args[0] {
                Value::Int(i) => Ok(Value::Int(*i)),
                Value::Float(f) => Ok(Value::Int(f.trunc() as i64)),
                Value::Str(s) => s
                    .trim()
                    .parse::<i64>()
                    .or_else(|_| s.trim().parse::<f64>().map(|f| f.trunc() as i64))
                    .map(Value::Int)
                    .map_err(|_| EvalError::Type(format!("int() cannot parse `{s}`"))),
            }
        }
        "float" => {
            arity(1)?;
            match &args[0] {
                Value::Int(i) => Ok(Value::Float(*i as f64)),
                Value::Float(f) => Ok(Value::Float(*f)),
                Value::Str(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| EvalError::Type(format!("float() cannot parse `{s}`"))),
            }
        }
        "round" => {
            arity(1)?;
            Ok(Value::Int(as_f64(&args[0])?.round() as i64))
        }
        "abs" => {
            arity(1)?;
            match &args[0] {
                Value::Int(i) => Ok(Value::Int(i.wrapping_abs())),
                other => Ok(Value::Float(as_f64(other)?.abs())),
            }
        }
        "ceil" => {
            arity(1)?;
            Ok(Value::Int(as_f64(&args[0])?.ceil() as i64))
        }
        "floor" => {
            arity(1)?;
            Ok(Value::Int(as_f64(&args[0])?.floor() as i64))
        }
        "min" | "max" => {
            if args.is_empty() {
                return Err(EvalError::Arity {
                    func: name.to_string(),
                    expected: 1,
                    got: 0,
                });
            }
            let any_float = args.iter().any(|v| matches!(v, Value::Float(_)));
            let mut best = as_f64(&args[0])?;
            for arg in &args[1..] {
                let v = as_f64(arg)?;
                best = if name == "min" { best.min(v) } else { best.max(v) };
            }
            if any_float {
                Ok(Value::Float(best))
            } else {
                Ok(Value::Int(best as i64))
            }
        }
        _ => unreachable!("whitelist checked above"),
    }
}

fn as_f64(value: &Value) -> Result<f64, EvalError> {
    match value {
        Value::Int(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        Value::Str(s) => Err(EvalError::Type(format!("`{s}` is not numeric"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn arithmetic_with_precedence() {
        let e = env(&[]);
        assert_eq!(evaluate("2 + 3 * 4", &e), Ok(Value::Int(14)));
        assert_eq!(evaluate("(2 + 3) * 4", &e), Ok(Value::Int(20)));
        assert_eq!(evaluate("10 % 3", &e), Ok(Value::Int(1)));
        assert_eq!(evaluate("-5 + 2", &e), Ok(Value::Int(-3)));
    }

    #[test]
    fn division_is_float() {
        assert_eq!(evaluate("7 / 2", &env(&[])), Ok(Value::Float(3.5)));
    }

    #[test]
    fn variables_resolve_from_the_environment() {
        let e = env(&[("total", Value::Int(120)), ("rate", Value::Float(0.5))]);
        assert_eq!(evaluate("total * rate", &e), Ok(Value::Float(60.0)));
    }

    #[test]
    fn missing_variable_is_a_typed_error() {
        assert_eq!(
            evaluate("missingVar * 2", &env(&[])),
            Err(EvalError::UnknownVariable("missingVar".to_string()))
        );
    }

    #[test]
    fn whitelisted_functions_work() {
        let e = env(&[]);
        assert_eq!(evaluate("min(4, 9, 2)", &e), Ok(Value::Int(2)));
        assert_eq!(evaluate("max(4, 9.5)", &e), Ok(Value::Float(9.5)));
        assert_eq!(evaluate("round(2.6)", &e), Ok(Value::Int(3)));
        assert_eq!(evaluate("floor(2.6)", &e), Ok(Value::Int(2)));
        assert_eq!(evaluate("ceil(2.1)", &e), Ok(Value::Int(3)));
        assert_eq!(evaluate("abs(-7)", &e), Ok(Value::Int(7)));
        assert_eq!(evaluate("int('42')", &e), Ok(Value::Int(42)));
        assert_eq!(evaluate("float(3)", &e), Ok(Value::Float(3.0)));
    }

    #[test]
    fn unlisted_functions_are_rejected() {
        assert_eq!(
            evaluate("exec('rm -rf')", &env(&[])),
            Err(EvalError::UnknownFunction("exec".to_string()))
        );
        assert_eq!(
            evaluate("__import__('os')", &env(&[])),
            Err(EvalError::UnknownFunction("__import__".to_string()))
        );
    }

    #[test]
    fn attribute_access_does_not_parse() {
        assert!(matches!(
            evaluate("x.__class__", &env(&[("x", Value::Int(1))])),
            Err(EvalError::Syntax(_))
        ));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(evaluate("1 / 0", &env(&[])), Err(EvalError::DivisionByZero));
        assert_eq!(evaluate("1 % 0", &env(&[])), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn string_values_only_concatenate() {
        let e = env(&[("name", Value::Str("pool".to_string()))]);
        assert_eq!(
            evaluate("name + '_a'", &e),
            Ok(Value::Str("pool_a".to_string()))
        );
        assert!(matches!(evaluate("name * 2", &e), Err(EvalError::Type(_))));
    }

    #[test]
    fn scalar_parsing_prefers_int_then_float() {
        assert_eq!(Value::parse_scalar("42"), Value::Int(42));
        assert_eq!(Value::parse_scalar("4.5"), Value::Float(4.5));
        assert_eq!(Value::parse_scalar("blk_42"), Value::Str("blk_42".to_string()));
    }
}
