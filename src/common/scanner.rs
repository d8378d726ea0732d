use std::rc::Rc;

use crate::common::source::{Source, Span, Spanned};
use crate::common::token::{Literal, SpannedToken, Token, TokenKind};

/// Scans a [`Source`] into tokens, one at a time.
///
/// The scanner is lazy: nothing is allocated up front beyond the byte
/// offset into the source. Both the tree parser and the bytecode compiler
/// pull tokens from the same `Scanner`, which is the "shared 8%" the spec
/// describes — neither engine owns its own lexical analysis.
pub struct Scanner {
    source: Rc<Source>,
    offset: usize,
}

impl Scanner {
    pub fn new(source: Rc<Source>) -> Scanner {
        Scanner { source, offset: 0 }
    }

    fn rest(&self) -> &str {
        &self.source.contents[self.offset..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.offset += c.len_utf8();
        Some(c)
    }

    fn matches(&mut self, expect: char) -> bool {
        if self.peek() == Some(expect) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => { self.advance(); },
                Some('/') if self.peek_at(1) == Some('/') => {
                    while self.peek().is_some() && self.peek() != Some('\n') {
                        self.advance();
                    }
                },
                _ => break,
            }
        }
    }

    fn make(&self, kind: TokenKind, start: usize) -> SpannedToken {
        let lexeme = &self.source.contents[start..self.offset];
        Spanned::new(Token::simple(kind, lexeme), Span::new(&self.source, start, self.offset - start))
    }

    fn string(&mut self, start: usize) -> SpannedToken {
        // Strings may span newlines; the line counter is recovered lazily
        // from byte offsets, so nothing special has to happen here beyond
        // consuming through the closing quote.
        while let Some(c) = self.peek() {
            if c == '"' { break; }
            self.advance();
        }

        if self.peek().is_none() {
            return Spanned::new(Token::error("Unterminated string."), Span::new(&self.source, start, self.offset - start));
        }

        // contents without the surrounding quotes; no escape processing (Non-goal)
        let value = self.source.contents[start + 1..self.offset].to_string();
        self.advance(); // closing quote

        let lexeme = &self.source.contents[start..self.offset];
        Spanned::new(Token::string(lexeme, value), Span::new(&self.source, start, self.offset - start))
    }

    fn number(&mut self, start: usize) -> SpannedToken {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.advance(); // '.'
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let lexeme = &self.source.contents[start..self.offset];
        let value: f64 = lexeme.parse().expect("scanner only admits well-formed number lexemes");
        Spanned::new(Token::number(lexeme, value), Span::new(&self.source, start, self.offset - start))
    }

    fn identifier(&mut self, start: usize) -> SpannedToken {
        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
            self.advance();
        }

        let lexeme = &self.source.contents[start..self.offset];
        let kind = Token::keyword(lexeme).unwrap_or(TokenKind::Identifier);
        self.make(kind, start)
    }

    /// Scans and returns the next token, including a final `Eof` token.
    /// The scanner never aborts: unrecognized input produces an `Error`
    /// token carrying a diagnostic, and scanning continues from there.
    pub fn next_token(&mut self) -> SpannedToken {
        self.skip_whitespace_and_comments();
        let start = self.offset;

        let c = match self.advance() {
            Some(c) => c,
            None => return Spanned::new(Token::simple(TokenKind::Eof, ""), Span::point(&self.source, start)),
        };

        use TokenKind::*;
        match c {
            '(' => self.make(LeftParen, start),
            ')' => self.make(RightParen, start),
            '{' => self.make(LeftBrace, start),
            '}' => self.make(RightBrace, start),
            ',' => self.make(Comma, start),
            '.' => self.make(Dot, start),
            '-' => self.make(Minus, start),
            '+' => self.make(Plus, start),
            ';' => self.make(Semicolon, start),
            '*' => self.make(Star, start),
            '/' => self.make(Slash, start),
            '!' => { let k = if self.matches('=') { BangEqual } else { Bang }; self.make(k, start) },
            '=' => { let k = if self.matches('=') { EqualEqual } else { Equal }; self.make(k, start) },
            '<' => { let k = if self.matches('=') { LessEqual } else { Less }; self.make(k, start) },
            '>' => { let k = if self.matches('=') { GreaterEqual } else { Greater }; self.make(k, start) },
            '"' => self.string(start),
            d if d.is_ascii_digit() => self.number(start),
            a if a.is_ascii_alphabetic() || a == '_' => self.identifier(start),
            _ => Spanned::new(
                Token::error(&format!("Unexpected character '{}'.", c)),
                Span::new(&self.source, start, self.offset - start),
            ),
        }
    }

    /// Scans the entire source up front into a `Vec`, ending with `Eof`.
    /// Convenient for the tree parser, which looks ahead freely; the
    /// bytecode compiler instead pulls tokens one at a time via
    /// `next_token` to stay single-pass.
    pub fn scan_all(source: Rc<Source>) -> Vec<SpannedToken> {
        let mut scanner = Scanner::new(source);
        let mut tokens = vec![];
        loop {
            let token = scanner.next_token();
            let done = token.item.kind == TokenKind::Eof;
            tokens.push(token);
            if done { break; }
        }
        tokens
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;
    use crate::common::token::TokenKind::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Scanner::scan_all(Source::source(src)).into_iter().map(|t| t.item.kind).collect()
    }

    #[test]
    fn arithmetic() {
        assert_eq!(kinds("1 + 2 * 3"), vec![Number, Plus, Number, Star, Number, Eof]);
    }

    #[test]
    fn keywords_vs_identifiers() {
        assert_eq!(kinds("for form fun funny"), vec![For, Identifier, Fun, Identifier, Eof]);
    }

    #[test]
    fn line_counting_matches_newline_count() {
        let src = "1\n2\n3\n4";
        let tokens = Scanner::scan_all(Source::source(src));
        let max_line = tokens.iter().map(|t| t.span.line()).max().unwrap();
        let newline_count = src.matches('\n').count();
        assert_eq!(max_line, newline_count + 1);
    }

    #[test]
    fn unterminated_string_is_error_token() {
        assert_eq!(kinds("\"abc"), vec![Error, Eof]);
    }

    #[test]
    fn string_may_span_lines() {
        let tokens = Scanner::scan_all(Source::source("\"a\nb\""));
        assert_eq!(tokens[0].item.kind, TokenKind::String);
        if let Some(Literal::Str(s)) = &tokens[0].item.literal {
            assert_eq!(s, "a\nb");
        } else {
            panic!("expected string literal");
        }
    }

    proptest! {
        // §8 property 1: scanning never panics, on any input, and the
        // highest line any token reports equals the LF count plus one.
        #[test]
        fn doesnt_crash(s in "\\PC*") {
            let tokens = Scanner::scan_all(Source::source(&s));
            format!("{:?}", tokens);
        }

        #[test]
        fn max_token_line_matches_newline_count(s in "[a-zA-Z0-9_ \n\t+*/.;(){}\"-]*") {
            let newline_count = s.matches('\n').count();
            let tokens = Scanner::scan_all(Source::source(&s));
            let max_line = tokens.iter().map(|t| t.span.line()).max().unwrap();
            prop_assert_eq!(max_line, newline_count + 1);
        }
    }
}
