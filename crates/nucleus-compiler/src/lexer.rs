//! Turns source text into a token stream (§4.1 "Lexical grammar").

use crate::tokens::{is_symbol_continue, is_symbol_start, Span, Token, TokenKind};

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn byte_offset(&self, char_pos: usize) -> usize {
        self.chars[..char_pos].iter().map(|c| c.len_utf8()).sum()
    }

    /// Tokenizes the entire source, always ending with a trailing `Eof`.
    /// Per §4.1, characters outside the recognized grammar are silently
    /// skipped rather than raising a lexical error.
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            self.skip_insignificant();
            let start_char = self.pos;
            let start_line = self.line;
            let start_col = self.col;
            let Some(c) = self.peek() else {
                let off = self.byte_offset(self.pos);
                tokens.push(Token::new(
                    TokenKind::Eof,
                    Span::new(off, off, start_line, start_col),
                ));
                break;
            };

            let kind = match c {
                '(' => {
                    self.advance();
                    Some(TokenKind::LParen)
                }
                ')' => {
                    self.advance();
                    Some(TokenKind::RParen)
                }
                '[' => {
                    self.advance();
                    Some(TokenKind::LBracket)
                }
                ']' => {
                    self.advance();
                    Some(TokenKind::RBracket)
                }
                '⊗' => {
                    self.advance();
                    Some(TokenKind::Otimes)
                }
                '"' => Some(self.lex_string()),
                '-' if self.peek_at(1).map(|n| n.is_ascii_digit()).unwrap_or(false) => {
                    Some(self.lex_number())
                }
                c if c.is_ascii_digit() => Some(self.lex_number()),
                c if is_symbol_start(c) => Some(self.lex_symbol()),
                _ => {
                    // Not part of the recognized grammar: skip one character
                    // and keep scanning (stray formatting is expected).
                    self.advance();
                    None
                }
            };

            if let Some(kind) = kind {
                let start_byte = self.byte_offset(start_char);
                let end_byte = self.byte_offset(self.pos);
                tokens.push(Token::new(
                    kind,
                    Span::new(start_byte, end_byte, start_line, start_col),
                ));
            }
        }
        tokens
    }

    fn skip_insignificant(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn lex_string(&mut self) -> TokenKind {
        self.advance(); // opening quote
        let mut out = String::new();
        loop {
            match self.advance() {
                None => break, // unterminated: parser reports ParseError
                Some('"') => break,
                Some('\\') => match self.advance() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('\\') => out.push('\\'),
                    Some('"') => out.push('"'),
                    Some(other) => out.push(other),
                    None => break,
                },
                Some(c) => out.push(c),
            }
        }
        TokenKind::StringLit(out)
    }

    fn lex_number(&mut self) -> TokenKind {
        let mut out = String::new();
        if self.peek() == Some('-') {
            out.push('-');
            self.advance();
        }
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' {
                out.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let value: f64 = out.parse().unwrap_or(f64::NAN);
        TokenKind::NumberLit(value)
    }

    fn lex_symbol(&mut self) -> TokenKind {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if is_symbol_continue(c) {
                out.push(c);
                self.advance();
            } else {
                break;
            }
        }
        match out.as_str() {
            "true" => TokenKind::BoolLit(true),
            "false" => TokenKind::BoolLit(false),
            _ => TokenKind::Symbol(out),
        }
    }
}

pub fn tokenize(source: &str) -> Vec<Token> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn tokenizes_simple_grep_call() {
        assert_eq!(
            kinds(r#"(grep "Sales")"#),
            vec![
                TokenKind::LParen,
                TokenKind::Symbol("grep".into()),
                TokenKind::StringLit("Sales".into()),
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn negative_number_vs_hyphenated_symbol() {
        assert_eq!(
            kinds("-5 define-fn"),
            vec![
                TokenKind::NumberLit(-5.0),
                TokenKind::Symbol("define-fn".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn constraint_bracket_with_greek_markers() {
        assert_eq!(
            kinds("[Σ⚡μ] ⊗ (grep \"x\")"),
            vec![
                TokenKind::LBracket,
                TokenKind::Symbol("Σ⚡μ".into()),
                TokenKind::RBracket,
                TokenKind::Otimes,
                TokenKind::LParen,
                TokenKind::Symbol("grep".into()),
                TokenKind::StringLit("x".into()),
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_escapes_are_interpreted() {
        assert_eq!(
            kinds(r#""a\nb\"c""#),
            vec![TokenKind::StringLit("a\nb\"c".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn stray_characters_are_silently_skipped() {
        assert_eq!(
            kinds("(grep `#%$ \"x\")"),
            vec![
                TokenKind::LParen,
                TokenKind::Symbol("grep".into()),
                TokenKind::StringLit("x".into()),
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn booleans_lex_from_symbols() {
        assert_eq!(
            kinds("true false"),
            vec![TokenKind::BoolLit(true), TokenKind::BoolLit(false), TokenKind::Eof]
        );
    }
}
