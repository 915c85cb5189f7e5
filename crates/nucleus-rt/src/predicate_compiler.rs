//! The safe predicate/expression compiler (§4.8).
//!
//! Handle operations accept a short user-supplied expression source (e.g.
//! `"item.line.includes('ERROR')"` for a `filter`, or `"item.score * 2"`
//! for a `map`) and need to turn it into something callable *without*
//! `eval`-ing arbitrary code. The accepted language is a closed subset:
//! dot-access, numeric/string literals, comparison operators, logical
//! `and`/`or`/`not` (spelled either as words or `&& || !`), calls to a
//! small fixed set of helpers (`includes`, `match`), and numeric
//! arithmetic. Anything outside this subset is a compile-time failure,
//! never a runtime surprise.

use nucleus_core::{NucleusError, NucleusResult, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Mutex;

/// The closed set of callable helpers. Extending this set is the only way
/// to grow the language — there is no escape hatch to general evaluation.
const ALLOWED_CALLS: &[&str] = &["includes", "match", "startsWith", "endsWith"];

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Root,
    Field(Box<Expr>, String),
    Number(f64),
    Str(String),
    Bool(bool),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    Call(String, Box<Expr>, Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// A compiled expression, ready to evaluate against the current element
/// (bound as the expression's implicit root, i.e. whatever identifier
/// the source used in the leftmost position — `item`, `x`, `r`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpr {
    source: String,
    expr: Expr,
}

impl CompiledExpr {
    /// Evaluates against `element`, the current item in a `filter`/`map`.
    pub fn eval(&self, element: &Value) -> NucleusResult<Value> {
        eval_expr(&self.expr, element)
    }

    /// Like [`eval`](Self::eval) but requires a boolean result, per the
    /// `filter` contract ("predicate returns non-boolean -> TypeError").
    pub fn eval_predicate(&self, element: &Value) -> NucleusResult<bool> {
        match self.eval(element)? {
            Value::Boolean(b) => Ok(b),
            other => Err(NucleusError::Type(format!(
                "predicate '{}' returned {}, expected boolean",
                self.source,
                other.type_name()
            ))),
        }
    }
}

static COMPILE_CACHE: Lazy<Mutex<HashMap<String, CompiledExpr>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Compiles `source`, consulting a source-text cache first (§4.8
/// "Compilation is cached by source text").
pub fn compile(source: &str) -> NucleusResult<CompiledExpr> {
    if let Some(cached) = COMPILE_CACHE.lock().unwrap().get(source) {
        return Ok(cached.clone());
    }
    let expr = Parser::new(source).parse_full()?;
    let compiled = CompiledExpr {
        source: source.to_string(),
        expr,
    };
    COMPILE_CACHE
        .lock()
        .unwrap()
        .insert(source.to_string(), compiled.clone());
    Ok(compiled)
}

fn eval_expr(expr: &Expr, root: &Value) -> NucleusResult<Value> {
    Ok(match expr {
        Expr::Root => root.clone(),
        Expr::Field(base, name) => field_of(&eval_expr(base, root)?, name),
        Expr::Number(n) => Value::Number(*n),
        Expr::Str(s) => Value::String(s.clone()),
        Expr::Bool(b) => Value::Boolean(*b),
        Expr::Not(inner) => Value::Boolean(!eval_expr(inner, root)?.is_truthy()),
        Expr::And(a, b) => {
            let av = eval_expr(a, root)?;
            if !av.is_truthy() {
                Value::Boolean(false)
            } else {
                Value::Boolean(eval_expr(b, root)?.is_truthy())
            }
        }
        Expr::Or(a, b) => {
            let av = eval_expr(a, root)?;
            if av.is_truthy() {
                Value::Boolean(true)
            } else {
                Value::Boolean(eval_expr(b, root)?.is_truthy())
            }
        }
        Expr::Cmp(op, a, b) => Value::Boolean(compare(*op, &eval_expr(a, root)?, &eval_expr(b, root)?)),
        Expr::Arith(op, a, b) => {
            let a = numeric_of(&eval_expr(a, root)?)?;
            let b = numeric_of(&eval_expr(b, root)?)?;
            Value::Number(match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div => a / b,
            })
        }
        Expr::Call(name, recv, args) => eval_call(name, &eval_expr(recv, root)?, args, root)?,
    })
}

fn eval_call(name: &str, receiver: &Value, args: &[Expr], root: &Value) -> NucleusResult<Value> {
    let arg_values: Vec<Value> = args
        .iter()
        .map(|a| eval_expr(a, root))
        .collect::<NucleusResult<_>>()?;
    let haystack = value_as_text(receiver);
    Ok(match name {
        "includes" => {
            let needle = arg_values.first().map(value_as_text).unwrap_or_default();
            Value::Boolean(haystack.contains(&needle))
        }
        "startsWith" => {
            let needle = arg_values.first().map(value_as_text).unwrap_or_default();
            Value::Boolean(haystack.starts_with(&needle))
        }
        "endsWith" => {
            let needle = arg_values.first().map(value_as_text).unwrap_or_default();
            Value::Boolean(haystack.ends_with(&needle))
        }
        "match" => {
            let pattern = arg_values.first().map(value_as_text).unwrap_or_default();
            let re = Regex::new(&pattern)
                .map_err(|e| NucleusError::InvalidPattern(format!("{pattern}: {e}")))?;
            Value::Boolean(re.is_match(&haystack))
        }
        other => {
            return Err(NucleusError::internal(format!(
                "call to unsupported helper '{other}' survived compilation"
            )))
        }
    })
}

fn value_as_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.principal_text(),
    }
}

fn numeric_of(v: &Value) -> NucleusResult<f64> {
    v.as_number()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
        .ok_or_else(|| NucleusError::Type(format!("expected a number, found {}", v.type_name())))
}

fn compare(op: CmpOp, a: &Value, b: &Value) -> bool {
    let ord = match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => value_as_text(a).partial_cmp(&value_as_text(b)),
    };
    match op {
        CmpOp::Eq => a == b || matches!(ord, Some(std::cmp::Ordering::Equal)),
        CmpOp::Ne => !(a == b || matches!(ord, Some(std::cmp::Ordering::Equal))),
        CmpOp::Lt => matches!(ord, Some(std::cmp::Ordering::Less)),
        CmpOp::Le => matches!(ord, Some(std::cmp::Ordering::Less) | Some(std::cmp::Ordering::Equal)),
        CmpOp::Gt => matches!(ord, Some(std::cmp::Ordering::Greater)),
        CmpOp::Ge => matches!(ord, Some(std::cmp::Ordering::Greater) | Some(std::cmp::Ordering::Equal)),
    }
}

/// Looks up a named field on a `Map`/`GrepRecord`/`FuzzyRecord` value,
/// the same projection `item.<name>` uses inside a compiled expression.
/// Exposed so handle operations (`sum`, `sort`, `describe`) can read a
/// field without going through the expression compiler.
pub fn field_value(v: &Value, name: &str) -> Value {
    field_of(v, name)
}

fn field_of(v: &Value, name: &str) -> Value {
    match v {
        Value::Map(m) => m.get(name).cloned().unwrap_or(Value::Null),
        Value::GrepRecord(r) => match name {
            "match" => Value::String(r.matched.clone()),
            "line" => Value::String(r.line.clone()),
            "lineNum" => Value::Number(r.line_num as f64),
            "index" => Value::Number(r.index as f64),
            "groups" => Value::Array(
                r.groups
                    .iter()
                    .map(|g| g.clone().map(Value::String).unwrap_or(Value::Null))
                    .collect(),
            ),
            _ => Value::Null,
        },
        Value::FuzzyRecord(r) => match name {
            "line" => Value::String(r.line.clone()),
            "lineNum" => Value::Number(r.line_num as f64),
            "score" => Value::Number(r.score),
            _ => Value::Null,
        },
        _ => Value::Null,
    }
}

/// A small hand-rolled recursive-descent parser. No operator-precedence
/// table library is warranted for a language this small; precedence is
/// expressed directly in the grammar (or > and > comparison > additive >
/// multiplicative > unary > postfix/dot > atom).
struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    source: &'a str,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            source,
        }
    }

    fn parse_full(mut self) -> NucleusResult<Expr> {
        self.skip_ws();
        let expr = self.parse_or()?;
        self.skip_ws();
        if self.pos != self.chars.len() {
            return Err(self.err(format!(
                "unexpected trailing input at byte {}",
                self.pos
            )));
        }
        Ok(expr)
    }

    fn err(&self, message: String) -> NucleusError {
        NucleusError::Type(format!("cannot compile expression '{}': {message}", self.source))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat_str(&mut self, s: &str) -> bool {
        self.skip_ws();
        let chars: Vec<char> = s.chars().collect();
        if self.chars[self.pos..].starts_with(&chars[..]) {
            // require a word boundary for alphabetic keywords
            if chars[0].is_alphabetic() {
                let next = self.chars.get(self.pos + chars.len());
                if matches!(next, Some(c) if c.is_alphanumeric() || *c == '_') {
                    return false;
                }
            }
            self.pos += chars.len();
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> NucleusResult<Expr> {
        let mut left = self.parse_and()?;
        loop {
            self.skip_ws();
            if self.eat_str("||") || self.eat_str("or") {
                let right = self.parse_and()?;
                left = Expr::Or(Box::new(left), Box::new(right));
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> NucleusResult<Expr> {
        let mut left = self.parse_not()?;
        loop {
            self.skip_ws();
            if self.eat_str("&&") || self.eat_str("and") {
                let right = self.parse_not()?;
                left = Expr::And(Box::new(left), Box::new(right));
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> NucleusResult<Expr> {
        self.skip_ws();
        if self.eat_str("!") || self.eat_str("not") {
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> NucleusResult<Expr> {
        let left = self.parse_additive()?;
        self.skip_ws();
        let op = if self.eat_str("==") {
            Some(CmpOp::Eq)
        } else if self.eat_str("!=") {
            Some(CmpOp::Ne)
        } else if self.eat_str("<=") {
            Some(CmpOp::Le)
        } else if self.eat_str(">=") {
            Some(CmpOp::Ge)
        } else if self.eat_str("<") {
            Some(CmpOp::Lt)
        } else if self.eat_str(">") {
            Some(CmpOp::Gt)
        } else {
            None
        };
        match op {
            Some(op) => {
                let right = self.parse_additive()?;
                Ok(Expr::Cmp(op, Box::new(left), Box::new(right)))
            }
            None => Ok(left),
        }
    }

    fn parse_additive(&mut self) -> NucleusResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            self.skip_ws();
            if self.eat_str("+") {
                let right = self.parse_multiplicative()?;
                left = Expr::Arith(ArithOp::Add, Box::new(left), Box::new(right));
            } else if self.eat_str("-") {
                let right = self.parse_multiplicative()?;
                left = Expr::Arith(ArithOp::Sub, Box::new(left), Box::new(right));
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> NucleusResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            self.skip_ws();
            if self.eat_str("*") {
                let right = self.parse_unary()?;
                left = Expr::Arith(ArithOp::Mul, Box::new(left), Box::new(right));
            } else if self.eat_str("/") {
                let right = self.parse_unary()?;
                left = Expr::Arith(ArithOp::Div, Box::new(left), Box::new(right));
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> NucleusResult<Expr> {
        self.skip_ws();
        if self.eat_str("-") {
            let inner = self.parse_unary()?;
            return Ok(Expr::Arith(ArithOp::Sub, Box::new(Expr::Number(0.0)), Box::new(inner)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> NucleusResult<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            self.skip_ws();
            if self.peek() == Some('.') {
                self.pos += 1;
                let name = self.parse_ident()?;
                self.skip_ws();
                if self.peek() == Some('(') {
                    self.pos += 1;
                    if !ALLOWED_CALLS.contains(&name.as_str()) {
                        return Err(self.err(format!("'{name}' is not an allowed call")));
                    }
                    let args = self.parse_args()?;
                    expr = Expr::Call(name, Box::new(expr), args);
                } else {
                    expr = Expr::Field(Box::new(expr), name);
                }
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> NucleusResult<Vec<Expr>> {
        let mut args = Vec::new();
        self.skip_ws();
        if self.peek() == Some(')') {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.pos += 1;
                }
                Some(')') => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(self.err("expected ',' or ')' in argument list".into())),
            }
        }
        Ok(args)
    }

    fn parse_atom(&mut self) -> NucleusResult<Expr> {
        self.skip_ws();
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let inner = self.parse_or()?;
                self.skip_ws();
                if self.peek() != Some(')') {
                    return Err(self.err("expected closing ')'".into()));
                }
                self.pos += 1;
                Ok(inner)
            }
            Some('\'') | Some('"') => self.parse_string(),
            Some(c) if c.is_ascii_digit() => self.parse_number(),
            Some(c) if c.is_alphabetic() || c == '_' => {
                let ident = self.parse_ident()?;
                match ident.as_str() {
                    "true" => Ok(Expr::Bool(true)),
                    "false" => Ok(Expr::Bool(false)),
                    _ => Ok(Expr::Root),
                }
            }
            Some(c) => Err(self.err(format!("unexpected character '{c}'"))),
            None => Err(self.err("unexpected end of expression".into())),
        }
    }

    fn parse_string(&mut self) -> NucleusResult<Expr> {
        let quote = self.peek().unwrap();
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.err("unterminated string literal".into())),
                Some(c) if c == quote => {
                    self.pos += 1;
                    break;
                }
                Some('\\') => {
                    self.pos += 1;
                    if let Some(c) = self.peek() {
                        out.push(c);
                        self.pos += 1;
                    }
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
        Ok(Expr::Str(out))
    }

    fn parse_number(&mut self) -> NucleusResult<Expr> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse()
            .map(Expr::Number)
            .map_err(|_| self.err(format!("invalid number literal '{text}'")))
    }

    fn parse_ident(&mut self) -> NucleusResult<String> {
        self.skip_ws();
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.err("expected an identifier".into()));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nucleus_core::GrepRecord;
    use std::collections::BTreeMap;

    fn record(line: &str) -> Value {
        Value::GrepRecord(GrepRecord {
            matched: line.to_string(),
            line: line.to_string(),
            line_num: 1,
            index: 0,
            groups: vec![],
        })
    }

    #[test]
    fn includes_on_a_field_compiles_and_evaluates() {
        let compiled = compile("item.line.includes('ERROR')").unwrap();
        assert!(compiled.eval_predicate(&record("[ERROR] boom")).unwrap());
        assert!(!compiled.eval_predicate(&record("[INFO] ok")).unwrap());
    }

    #[test]
    fn arithmetic_map_expression() {
        let compiled = compile("item.lineNum * 2").unwrap();
        assert_eq!(compiled.eval(&record("x")).unwrap(), Value::Number(2.0));
    }

    #[test]
    fn comparison_and_logical_combination() {
        let compiled = compile("item.lineNum > 0 and not item.line.includes('skip')").unwrap();
        assert!(compiled.eval_predicate(&record("keep")).unwrap());
    }

    #[test]
    fn non_boolean_predicate_result_is_a_type_error() {
        let compiled = compile("item.lineNum").unwrap();
        assert!(compiled.eval_predicate(&record("x")).is_err());
    }

    #[test]
    fn unsupported_call_is_a_compile_error() {
        assert!(compile("item.line.exec('rm -rf')").is_err());
    }

    #[test]
    fn arbitrary_identifiers_outside_the_closed_subset_do_not_escape_to_eval() {
        // `eval` itself is simply not a recognized token shape; it parses
        // as a bare root reference, never as code execution.
        let compiled = compile("eval").unwrap();
        assert_eq!(compiled.eval(&Value::Number(5.0)).unwrap(), Value::Number(5.0));
    }

    #[test]
    fn map_field_lookup() {
        let mut m = BTreeMap::new();
        m.insert("count".to_string(), Value::Number(3.0));
        let compiled = compile("item.count == 3").unwrap();
        assert!(compiled.eval_predicate(&Value::Map(m)).unwrap());
    }

    #[test]
    fn compiled_expressions_are_cached_by_source_text() {
        let a = compile("item.lineNum > 1").unwrap();
        let b = compile("item.lineNum > 1").unwrap();
        assert_eq!(a, b);
    }
}
