//! Hand-rolled lexer (scanner) for the Mica language.
//!
//! The [`Lexer`] consumes a source string and produces a flat `Vec<Token>`.
//! Tokens carry [`Span`] information for precise error reporting.
//!
//! # Error Handling
//!
//! Lexer errors are collected into an internal list rather than immediately
//! aborting.  This lets the lexer report multiple problems in a single pass.
//! Call [`Lexer::scan`] to get both the token stream and the error list; the
//! token stream always ends with a [`TokenKind::Eof`] sentinel even when
//! errors were recorded.

use crate::token::{keyword, Span, Token, TokenKind};

// ─────────────────────────────────────────────────────────────────────────────
// Lexer struct
// ─────────────────────────────────────────────────────────────────────────────

/// The Mica lexical scanner.
///
/// Construct one with [`Lexer::new`] and then call [`Lexer::scan`] to obtain
/// the full token stream.  The lexer itself is consumed after scanning.
pub struct Lexer<'src> {
    /// Iterator over `(byte_offset, char)` pairs.
    chars: std::str::CharIndices<'src>,
    /// The current character and its byte offset, or `None` at EOF.
    current: Option<(usize, char)>,
    /// The next character peeked without consuming (for `==` and `!=`).
    peeked: Option<(usize, char)>,
    /// Current source line (1-indexed).
    line: u32,
    /// Current source column in *characters* (1-indexed).
    col: u32,
    /// Byte offset of the character immediately after the most recently consumed one.
    /// Used to set `span.end` after consuming a token.
    pos: usize,
    /// Accumulated lex errors.  Non-fatal; scanning continues after recording.
    errors: Vec<LexError>,
}

/// A non-fatal lexical error.  Lexing continues after recording these so
/// the parser sees as many tokens as possible.
#[derive(Debug, Clone)]
pub struct LexError {
    pub message: String,
    pub span: Span,
}

/// Lex an entire source string, returning `(tokens, errors)`.
pub fn lex(src: &str) -> (Vec<Token>, Vec<LexError>) {
    Lexer::new(src).scan()
}

impl<'src> Lexer<'src> {
    /// Create a new lexer for the given source text.
    pub fn new(src: &'src str) -> Self {
        let mut chars = src.char_indices();
        let current = chars.next();
        let peeked = chars.next();
        Self {
            chars,
            current,
            peeked,
            line: 1,
            col: 1,
            pos: 0,
            errors: Vec::new(),
        }
    }

    /// Run the full scan, returning `(tokens, errors)`.
    ///
    /// `tokens` always ends with an [`TokenKind::Eof`] sentinel.
    /// `errors` is empty on a clean input.
    pub fn scan(mut self) -> (Vec<Token>, Vec<LexError>) {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();

            if self.current.is_none() {
                let span = Span::new(self.pos, self.pos, self.line, self.col);
                tokens.push(Token::new(TokenKind::Eof, span));
                break;
            }

            tokens.push(self.next_token());
        }

        (tokens, self.errors)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal scanning helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// Return the current character without consuming it.
    #[inline]
    fn peek(&self) -> Option<char> {
        self.current.map(|(_, c)| c)
    }

    /// Consume the current character and advance the iterator.
    /// Updates line/column counters and `self.pos`.
    fn advance(&mut self) -> Option<char> {
        let result = self.current;
        self.current = self.peeked;
        self.peeked = self.chars.next();

        if let Some((offset, ch)) = result {
            // Update position to the byte offset AFTER this character.
            self.pos = offset + ch.len_utf8();
            if ch == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
            Some(ch)
        } else {
            None
        }
    }

    /// Consume the current character only if it equals `expected`.
    /// Returns whether the character was consumed.
    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Build a [`Span`] that begins at `start_pos/start_line/start_col` and
    /// ends at the current `self.pos`.
    #[inline]
    fn make_span(&self, start_pos: usize, start_line: u32, start_col: u32) -> Span {
        Span::new(start_pos, self.pos, start_line, start_col)
    }

    /// Skip spaces, tabs, carriage returns and newlines.
    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t' | '\r' | '\n')) {
            self.advance();
        }
    }

    /// Lex the next token from the current position.  The caller has already
    /// checked that the input is non-empty.
    fn next_token(&mut self) -> Token {
        let (start_pos, _) = self.current.unwrap_or((self.pos, '\0'));
        let (start_line, start_col) = (self.line, self.col);

        let ch = match self.advance() {
            Some(c) => c,
            None => {
                let span = self.make_span(start_pos, start_line, start_col);
                return Token::new(TokenKind::Eof, span);
            }
        };

        let kind = match ch {
            '=' => {
                if self.eat('=') {
                    TokenKind::Eq
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if self.eat('=') {
                    TokenKind::NotEq
                } else {
                    TokenKind::Bang
                }
            }
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Asterisk,
            '/' => TokenKind::Slash,
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            ':' => TokenKind::Colon,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '"' => self.scan_string(start_pos, start_line, start_col),
            c if c.is_ascii_digit() => self.scan_number(c),
            c if is_ident_start(c) => self.scan_identifier(c),
            c => {
                let span = self.make_span(start_pos, start_line, start_col);
                self.errors.push(LexError {
                    message: format!("unexpected character {c:?}"),
                    span,
                });
                TokenKind::Illegal(c)
            }
        };

        let span = self.make_span(start_pos, start_line, start_col);
        Token::new(kind, span)
    }

    /// Scan the remainder of a string literal; the opening `"` has been
    /// consumed.  Strings have no escape sequences: they run to the next `"`.
    /// An unterminated string records a [`LexError`] and yields the partial
    /// content so the parser can keep going.
    fn scan_string(&mut self, start_pos: usize, start_line: u32, start_col: u32) -> TokenKind {
        let mut content = String::new();
        loop {
            match self.advance() {
                Some('"') => break,
                Some(c) => content.push(c),
                None => {
                    let span = self.make_span(start_pos, start_line, start_col);
                    self.errors.push(LexError {
                        message: "unterminated string literal".to_string(),
                        span,
                    });
                    break;
                }
            }
        }
        TokenKind::Str(content)
    }

    /// Scan the remainder of an integer literal; `first` has been consumed.
    fn scan_number(&mut self, first: char) -> TokenKind {
        let mut text = String::from(first);
        while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            // advance() returned Some because peek() did.
            if let Some(c) = self.advance() {
                text.push(c);
            }
        }
        TokenKind::Int(text)
    }

    /// Scan the remainder of an identifier or keyword; `first` has been consumed.
    fn scan_identifier(&mut self, first: char) -> TokenKind {
        let mut text = String::from(first);
        while self.peek().map(is_ident_continue).unwrap_or(false) {
            if let Some(c) = self.advance() {
                text.push(c);
            }
        }
        keyword(&text).unwrap_or(TokenKind::Ident(text))
    }
}

/// Characters that may begin an identifier.
#[inline]
fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

/// Characters that may continue an identifier.
#[inline]
fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let (tokens, errors) = lex(src);
        assert!(errors.is_empty(), "unexpected lex errors: {errors:?}");
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_operators_and_delimiters() {
        assert_eq!(
            kinds("=+-*/!<>==!=,;:(){}[]"),
            vec![
                Assign, Plus, Minus, Asterisk, Slash, Bang, Lt, Gt, Eq, NotEq, Comma, Semicolon,
                Colon, LParen, RParen, LBrace, RBrace, LBracket, RBracket, Eof,
            ]
        );
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            kinds("let add = fn(x, y) { if (true) { return x } else { y } };"),
            vec![
                Let,
                Ident("add".into()),
                Assign,
                Function,
                LParen,
                Ident("x".into()),
                Comma,
                Ident("y".into()),
                RParen,
                LBrace,
                If,
                LParen,
                True,
                RParen,
                LBrace,
                Return,
                Ident("x".into()),
                RBrace,
                Else,
                LBrace,
                Ident("y".into()),
                RBrace,
                RBrace,
                Semicolon,
                Eof,
            ]
        );
    }

    #[test]
    fn test_integer_and_string_literals() {
        assert_eq!(
            kinds("5 10 \"hello\" \"\""),
            vec![
                Int("5".into()),
                Int("10".into()),
                Str("hello".into()),
                Str("".into()),
                Eof,
            ]
        );
    }

    #[test]
    fn test_spans_track_lines_and_columns() {
        let (tokens, errors) = lex("let x = 5;\nx");
        assert!(errors.is_empty());
        // `let` starts at 1:1.
        assert_eq!(tokens[0].span.line, 1);
        assert_eq!(tokens[0].span.col, 1);
        assert_eq!(tokens[0].span.start, 0);
        assert_eq!(tokens[0].span.end, 3);
        // The trailing `x` is on line 2.
        let last_x = &tokens[tokens.len() - 2];
        assert_eq!(last_x.kind, Ident("x".into()));
        assert_eq!(last_x.span.line, 2);
        assert_eq!(last_x.span.col, 1);
    }

    #[test]
    fn test_unterminated_string_is_recoverable() {
        let (tokens, errors) = lex("\"abc");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("unterminated"));
        assert_eq!(tokens[0].kind, Str("abc".into()));
        assert_eq!(tokens[1].kind, Eof);
    }

    #[test]
    fn test_illegal_character() {
        let (tokens, errors) = lex("1 @ 2");
        assert_eq!(errors.len(), 1);
        assert_eq!(tokens[1].kind, Illegal('@'));
        // Scanning continued past the bad character.
        assert_eq!(tokens[2].kind, Int("2".into()));
    }
}
