//! Builds typed `Term` trees from a token stream (§4.1 "Grammar").
//!
//! ```text
//! Term        := Atom | List | Constrained
//! Atom        := Symbol | Number | String | Boolean
//! Constrained := '[' Symbol ']' '⊗' Term
//! List        := '(' Symbol Term* ')'
//! ```

use crate::lexer::tokenize;
use crate::tokens::{Token, TokenKind};
use nucleus_core::{Example, Literal, Term, TypeTag};

/// The outcome of parsing: either a term (with a note if trailing tokens
/// were left over) or a human-readable parse error. Never thrown.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseResult {
    pub term: Option<Term>,
    pub trailing: bool,
    pub error: Option<String>,
}

impl ParseResult {
    fn ok(term: Term, trailing: bool) -> Self {
        Self {
            term: Some(term),
            trailing,
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            term: None,
            trailing: false,
            error: Some(message.into()),
        }
    }
}

pub fn parse(source: &str) -> ParseResult {
    let tokens = tokenize(source);
    let mut parser = Parser::new(tokens);
    if parser.at_eof() {
        return ParseResult::err("empty input");
    }
    match parser.parse_term() {
        Ok(term) => {
            let trailing = !parser.at_eof();
            ParseResult::ok(term, trailing)
        }
        Err(message) => ParseResult::err(message),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type PResult<T> = Result<T, String>;

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.tokens[self.pos.min(self.tokens.len() - 1)].kind.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        kind
    }

    fn expect(&mut self, expected: &TokenKind) -> PResult<()> {
        if self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(format!("expected {expected}, found {}", self.peek()))
        }
    }

    fn expect_symbol(&mut self) -> PResult<String> {
        match self.advance() {
            TokenKind::Symbol(s) => Ok(s),
            other => Err(format!("expected symbol, found {other}")),
        }
    }

    fn parse_term(&mut self) -> PResult<Term> {
        match self.peek().clone() {
            TokenKind::LBracket => self.parse_constrained(),
            TokenKind::LParen => self.parse_list(),
            TokenKind::Symbol(_) => {
                let name = self.expect_symbol()?;
                Ok(Term::Var(name))
            }
            TokenKind::NumberLit(n) => {
                self.advance();
                Ok(Term::lit_num(n))
            }
            TokenKind::StringLit(s) => {
                self.advance();
                Ok(Term::lit_str(s))
            }
            TokenKind::BoolLit(b) => {
                self.advance();
                Ok(Term::lit_bool(b))
            }
            TokenKind::RParen => Err("unexpected ')'".into()),
            TokenKind::RBracket => Err("unexpected ']'".into()),
            TokenKind::Otimes => Err("unexpected '⊗' outside a constraint bracket".into()),
            TokenKind::Eof => Err("unexpected end of input".into()),
        }
    }

    fn parse_constrained(&mut self) -> PResult<Term> {
        self.expect(&TokenKind::LBracket)?;
        let constraint = self.expect_symbol()?;
        self.expect(&TokenKind::RBracket)?;
        self.expect(&TokenKind::Otimes)
            .map_err(|_| "malformed constraint: expected '⊗' after ']'".to_string())?;
        let inner = self.parse_term()?;
        Ok(Term::Constrained(constraint, Box::new(inner)))
    }

    fn parse_list(&mut self) -> PResult<Term> {
        self.expect(&TokenKind::LParen)?;
        if matches!(self.peek(), TokenKind::RParen) {
            return Err("empty list has no head operator".into());
        }
        let head = self.expect_symbol()?;
        let mut args = Vec::new();
        while !matches!(self.peek(), TokenKind::RParen | TokenKind::Eof) {
            args.push(self.parse_term()?);
        }
        if matches!(self.peek(), TokenKind::Eof) {
            return Err(format!("unterminated list starting with '{head}'"));
        }
        self.expect(&TokenKind::RParen)?;
        build_term(&head, args)
    }
}

fn arg(args: &mut Vec<Term>, head: &str, index: usize) -> PResult<Term> {
    if index >= args.len() {
        return Err(format!(
            "'{head}' expects at least {} argument(s), got {}",
            index + 1,
            args.len()
        ));
    }
    Ok(std::mem::replace(&mut args[index], Term::Input))
}

fn expect_str_lit(t: &Term, head: &str) -> PResult<()> {
    match t {
        Term::Lit(Literal::String(_)) | Term::Var(_) => Ok(()),
        other => Err(format!(
            "'{head}' requires a string argument, found {}",
            other.head_symbol()
        )),
    }
}

/// Splits an `:examples` trailing keyword block (a sequence of
/// `(lit input) (lit output)` pairs, represented at the call site as a
/// flat run of literal-pair terms) out of a raw argument list. The DSL
/// has no dedicated keyword-argument syntax; by convention, trailing
/// `(example input output)` list forms are recognized and lifted out
/// before head-specific arity checks run.
fn split_examples(mut args: Vec<Term>) -> (Vec<Term>, Vec<Example>) {
    let mut examples = Vec::new();
    // `example` is parsed as an ordinary list head (see build_term) and
    // collected here from the tail of the argument list.
    let mut rest = Vec::new();
    for t in args.drain(..) {
        match t {
            Term::Constrained(tag, inner) if tag == "__example__" => {
                if let Term::App(input, output) = *inner {
                    if let (Term::Lit(Literal::String(s)), Term::Lit(lit)) = (*input, *output) {
                        examples.push(Example::new(s, lit));
                        continue;
                    }
                }
            }
            other => rest.push(other),
        }
    }
    (rest, examples)
}

fn build_term(head: &str, args: Vec<Term>) -> PResult<Term> {
    let (mut args, examples) = split_examples(args);
    match head {
        "input" => Ok(Term::Input),
        "text_stats" => Ok(Term::TextStats),
        "example" => {
            let input = arg(&mut args, head, 0)?;
            let output = arg(&mut args, head, 1)?;
            expect_str_lit(&input, head)?;
            Ok(Term::Constrained(
                "__example__".into(),
                Box::new(Term::App(Box::new(input), Box::new(output))),
            ))
        }
        "grep" => {
            let pattern = arg(&mut args, head, 0)?;
            expect_str_lit(&pattern, head)?;
            Ok(Term::Grep(Box::new(pattern)))
        }
        "fuzzy_search" => {
            let query = arg(&mut args, head, 0)?;
            let limit = if args.len() > 1 {
                Some(Box::new(arg(&mut args, head, 1)?))
            } else {
                None
            };
            Ok(Term::FuzzySearch(Box::new(query), limit))
        }
        "lines" => {
            let start = arg(&mut args, head, 0)?;
            let end = arg(&mut args, head, 1)?;
            Ok(Term::Lines(Box::new(start), Box::new(end)))
        }
        "parseInt" => Ok(Term::ParseInt(Box::new(arg(&mut args, head, 0)?), examples)),
        "parseFloat" => Ok(Term::ParseFloat(Box::new(arg(&mut args, head, 0)?), examples)),
        "parseCurrency" => Ok(Term::ParseCurrency(Box::new(arg(&mut args, head, 0)?), examples)),
        "parseNumber" => Ok(Term::ParseNumber(Box::new(arg(&mut args, head, 0)?), examples)),
        "parseDate" => {
            let s = arg(&mut args, head, 0)?;
            let format = if !args.is_empty() { Some(Box::new(arg(&mut args, head, 1)?)) } else { None };
            Ok(Term::ParseDate(Box::new(s), format, examples))
        }
        "count" => Ok(Term::Count(Box::new(arg(&mut args, head, 0)?))),
        "sum" => Ok(Term::Sum(Box::new(arg(&mut args, head, 0)?))),
        "add" => Ok(Term::Add(
            Box::new(arg(&mut args, head, 0)?),
            Box::new(arg(&mut args, head, 1)?),
        )),
        "match" => Ok(Term::Match(
            Box::new(arg(&mut args, head, 0)?),
            Box::new(arg(&mut args, head, 1)?),
            Box::new(arg(&mut args, head, 2)?),
        )),
        "replace" => Ok(Term::Replace(
            Box::new(arg(&mut args, head, 0)?),
            Box::new(arg(&mut args, head, 1)?),
            Box::new(arg(&mut args, head, 2)?),
        )),
        "split" => Ok(Term::Split(
            Box::new(arg(&mut args, head, 0)?),
            Box::new(arg(&mut args, head, 1)?),
            Box::new(arg(&mut args, head, 2)?),
        )),
        "filter" => Ok(Term::Filter(
            Box::new(arg(&mut args, head, 0)?),
            Box::new(arg(&mut args, head, 1)?),
        )),
        "map" => Ok(Term::Map(
            Box::new(arg(&mut args, head, 0)?),
            Box::new(arg(&mut args, head, 1)?),
        )),
        "reduce" => Ok(Term::Reduce(
            Box::new(arg(&mut args, head, 0)?),
            Box::new(arg(&mut args, head, 1)?),
            Box::new(arg(&mut args, head, 2)?),
        )),
        "if" => Ok(Term::If(
            Box::new(arg(&mut args, head, 0)?),
            Box::new(arg(&mut args, head, 1)?),
            Box::new(arg(&mut args, head, 2)?),
        )),
        "lambda" | "λ" => {
            let param = arg(&mut args, head, 0)?;
            let body = arg(&mut args, head, 1)?;
            match param {
                Term::Var(name) => Ok(Term::Lambda(name, Box::new(body))),
                other => Err(format!(
                    "'lambda' expects a parameter symbol, found {}",
                    other.head_symbol()
                )),
            }
        }
        "classify" => {
            if examples.len() < 2 {
                return Err("'classify' requires at least two examples".into());
            }
            Ok(Term::Classify(examples))
        }
        "predicate" => {
            let s = arg(&mut args, head, 0)?;
            Ok(Term::Predicate(Box::new(s), examples))
        }
        "define-fn" => {
            let name = arg(&mut args, head, 0)?;
            match name {
                Term::Var(n) => Ok(Term::DefineFn(n, examples)),
                Term::Lit(Literal::String(n)) => Ok(Term::DefineFn(n, examples)),
                other => Err(format!(
                    "'define-fn' expects a name, found {}",
                    other.head_symbol()
                )),
            }
        }
        "apply-fn" => {
            let name = arg(&mut args, head, 0)?;
            let value = arg(&mut args, head, 1)?;
            let name = match name {
                Term::Var(n) => n,
                Term::Lit(Literal::String(n)) => n,
                other => {
                    return Err(format!(
                        "'apply-fn' expects a name, found {}",
                        other.head_symbol()
                    ))
                }
            };
            Ok(Term::ApplyFn(name, Box::new(value)))
        }
        "extract" => {
            let s = arg(&mut args, head, 0)?;
            let pattern = arg(&mut args, head, 1)?;
            let group = arg(&mut args, head, 2)?;
            let target = args.get(3).and_then(type_tag_of);
            Ok(Term::Extract(
                Box::new(s),
                Box::new(pattern),
                Box::new(group),
                target,
                examples,
            ))
        }
        "coerce" => {
            let term = arg(&mut args, head, 0)?;
            let target = args
                .get(1)
                .and_then(type_tag_of)
                .ok_or_else(|| "'coerce' requires a target type symbol".to_string())?;
            Ok(Term::Coerce(Box::new(term), target))
        }
        "synthesize" => Ok(Term::Synthesize(examples)),
        "list_symbols" => {
            let kind = match args.first() {
                Some(Term::Var(k)) => Some(k.clone()),
                Some(Term::Lit(Literal::String(k))) => Some(k.clone()),
                _ => None,
            };
            Ok(Term::ListSymbols(kind))
        }
        "get_symbol_body" => Ok(Term::GetSymbolBody(Box::new(arg(&mut args, head, 0)?))),
        "find_references" => Ok(Term::FindReferences(Box::new(arg(&mut args, head, 0)?))),
        other => {
            // Unknown head: degrade to a function application over the
            // symbol as a variable reference (§4.1).
            let callee = Term::Var(other.to_string());
            if args.is_empty() {
                Ok(callee)
            } else {
                let mut iter = args.into_iter();
                let mut acc = Term::App(Box::new(callee), Box::new(iter.next().unwrap()));
                for next in iter {
                    acc = Term::App(Box::new(acc), Box::new(next));
                }
                Ok(acc)
            }
        }
    }
}

fn type_tag_of(t: &Term) -> Option<TypeTag> {
    match t {
        Term::Var(name) => TypeTag::parse(name),
        Term::Lit(Literal::String(name)) => TypeTag::parse(name),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_grep_call() {
        let result = parse(r#"(grep "Sales")"#);
        assert_eq!(
            result.term,
            Some(Term::Grep(Box::new(Term::lit_str("Sales"))))
        );
        assert!(!result.trailing);
        assert!(result.error.is_none());
    }

    #[test]
    fn parses_lambda_with_greek_alias() {
        let result = parse("(λ x (match x \"Network\" 0))");
        assert!(matches!(result.term, Some(Term::Lambda(ref p, _)) if p == "x"));
    }

    #[test]
    fn unknown_head_degrades_to_application() {
        let result = parse(r#"(frobnicate "x")"#);
        assert_eq!(
            result.term,
            Some(Term::App(
                Box::new(Term::Var("frobnicate".into())),
                Box::new(Term::lit_str("x"))
            ))
        );
    }

    #[test]
    fn unknown_head_with_no_args_degrades_to_var() {
        let result = parse("(standalone)");
        assert_eq!(result.term, Some(Term::Var("standalone".into())));
    }

    #[test]
    fn empty_input_is_a_parse_error() {
        let result = parse("");
        assert!(result.term.is_none());
        assert_eq!(result.error.as_deref(), Some("empty input"));
    }

    #[test]
    fn unterminated_list_is_a_parse_error() {
        let result = parse("(grep \"x\"");
        assert!(result.term.is_none());
        assert!(result.error.unwrap().contains("unterminated"));
    }

    #[test]
    fn constraint_bracket_parses_to_constrained_node() {
        let result = parse("[Σ⚡μ] ⊗ (grep \"x\")");
        assert_eq!(
            result.term,
            Some(Term::Constrained(
                "Σ⚡μ".into(),
                Box::new(Term::Grep(Box::new(Term::lit_str("x"))))
            ))
        );
    }

    #[test]
    fn grep_without_string_argument_is_a_parse_error() {
        let result = parse("(grep 5)");
        assert!(result.term.is_none());
    }

    #[test]
    fn coerce_resolves_type_symbol() {
        let result = parse("(coerce (input) number)");
        assert_eq!(
            result.term,
            Some(Term::Coerce(Box::new(Term::Input), TypeTag::Number))
        );
    }
}
