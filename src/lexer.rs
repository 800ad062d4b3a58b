use std::collections::VecDeque;
use std::fmt;

use crate::token::{Span, Token, TokenKind};

/// Tab stop used when measuring indentation.
pub const DEFAULT_TAB_WIDTH: usize = 8;

/// Classifies a lexer error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexErrorKind {
    /// Unterminated double-quoted string.
    UnterminatedString,
    /// Character that cannot start any token.
    UnexpectedCharacter(char),
    /// Dedent to a width that matches no open indentation level.
    BrokenIndentation { width: usize },
    /// `expect` was called and the lookahead did not match.
    Expected {
        expected: Vec<TokenKind>,
        found: TokenKind,
    },
}

impl fmt::Display for LexErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnterminatedString => write!(f, "unterminated quoted string"),
            Self::UnexpectedCharacter(ch) => {
                write!(f, "unexpected character: {ch:?}")
            }
            Self::BrokenIndentation { width } => {
                write!(
                    f,
                    "broken indentation, width {width} \
                     matches no enclosing block"
                )
            }
            Self::Expected { expected, found } => {
                write!(f, "expected ")?;
                for (i, kind) in expected.iter().enumerate() {
                    if i > 0 {
                        write!(f, " or ")?;
                    }
                    write!(f, "{kind}")?;
                }
                write!(f, ", got {found}")
            }
        }
    }
}

/// Error produced during lexing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at {span}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub span: Span,
}

/// Knobs for a single lexer run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexOptions {
    pub tab_width: usize,
    /// File name stamped into every span.
    pub file: Option<String>,
}

impl Default for LexOptions {
    fn default() -> Self {
        Self {
            tab_width: DEFAULT_TAB_WIDTH,
            file: None,
        }
    }
}

/// Tokenize a script into a sequence of tokens, excluding the final
/// `EOF`.
///
/// # Errors
///
/// Returns `LexError` on unknown characters, unterminated strings,
/// or broken indentation.
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer::new(input)?;
    let mut tokens = Vec::new();
    while !lexer.check(&[TokenKind::Eof]) {
        tokens.push(lexer.next()?);
    }
    Ok(tokens)
}

/// Token stream with structural `INDENT`/`OUTDENT`/`NEWLINE` tokens.
///
/// Keeps one token of lookahead in [`Lexer::current`]. Once the input
/// is exhausted every further call yields another `EOF`.
pub struct Lexer<'a> {
    scanner: Scanner<'a>,
    indents: Vec<usize>,
    pending: VecDeque<Token>,
    current: Token,
    started: bool,
    eof: Option<Token>,
}

impl<'a> Lexer<'a> {
    /// Create a lexer and read the first token.
    pub fn new(input: &'a str) -> Result<Self, LexError> {
        Self::with_options(input, LexOptions::default())
    }

    pub fn with_options(input: &'a str, options: LexOptions) -> Result<Self, LexError> {
        let mut lexer = Self {
            scanner: Scanner::new(input, options),
            indents: vec![0],
            pending: VecDeque::new(),
            current: Token {
                kind: TokenKind::Eof,
                text: String::new(),
                span: Span::default(),
            },
            started: false,
            eof: None,
        };
        lexer.current = lexer.pull()?;
        Ok(lexer)
    }

    /// The lookahead token.
    #[must_use]
    pub const fn current(&self) -> &Token {
        &self.current
    }

    /// Consume the lookahead and return it.
    pub fn next(&mut self) -> Result<Token, LexError> {
        let next = self.pull()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    /// Whether the lookahead is one of `kinds`.
    #[must_use]
    pub fn check(&self, kinds: &[TokenKind]) -> bool {
        kinds.contains(&self.current.kind)
    }

    /// Consume the lookahead if it is one of `kinds`.
    pub fn expect(&mut self, kinds: &[TokenKind]) -> Result<Token, LexError> {
        if self.check(kinds) {
            self.next()
        } else {
            Err(LexError {
                kind: LexErrorKind::Expected {
                    expected: kinds.to_vec(),
                    found: self.current.kind,
                },
                span: self.current.span.clone(),
            })
        }
    }

    fn pull(&mut self) -> Result<Token, LexError> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Ok(token);
            }
            if let Some(eof) = &self.eof {
                return Ok(eof.clone());
            }
            self.fill()?;
        }
    }

    fn fill(&mut self) -> Result<(), LexError> {
        if !self.started {
            self.started = true;
            return self.line_start(None);
        }
        loop {
            match self.scanner.next_raw()? {
                Raw::Whitespace(_) => {}
                Raw::Newline(span) => return self.line_start(Some(span)),
                Raw::Eof(span) => {
                    self.close(None, span);
                    return Ok(());
                }
                Raw::Token(token) => {
                    self.pending.push_back(token);
                    return Ok(());
                }
            }
        }
    }

    /// Skip blank lines after a line break and measure the next
    /// substantive line.
    ///
    /// At the very start of input there is no preceding break; the
    /// first blank line then stands in for it.
    fn line_start(&mut self, mut newline: Option<Span>) -> Result<(), LexError> {
        let mut width = 0;
        loop {
            match self.scanner.next_raw()? {
                Raw::Whitespace(w) => width = w,
                Raw::Newline(span) => {
                    width = 0;
                    if newline.is_none() {
                        newline = Some(span);
                    }
                }
                Raw::Eof(span) => {
                    self.close(newline, span);
                    return Ok(());
                }
                Raw::Token(token) => {
                    self.indent_to(width, newline, &token.span)?;
                    self.pending.push_back(token);
                    return Ok(());
                }
            }
        }
    }

    fn indent_to(
        &mut self,
        width: usize,
        newline: Option<Span>,
        at: &Span,
    ) -> Result<(), LexError> {
        let top = self.top();
        if width == top {
            if let Some(span) = newline {
                self.pending.push_back(structural(TokenKind::Newline, span));
            }
        } else if width > top {
            self.indents.push(width);
            self.pending
                .push_back(structural(TokenKind::Indent, at.clone()));
        } else {
            if !self.indents.contains(&width) {
                return Err(LexError {
                    kind: LexErrorKind::BrokenIndentation { width },
                    span: at.clone(),
                });
            }
            while self.top() != width {
                self.indents.pop();
                self.pending
                    .push_back(structural(TokenKind::Outdent, at.clone()));
            }
        }
        Ok(())
    }

    /// Close every open block and park on `EOF`.
    fn close(&mut self, newline: Option<Span>, at: Span) {
        if self.indents.len() == 1 {
            if let Some(span) = newline {
                self.pending.push_back(structural(TokenKind::Newline, span));
            }
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.pending
                .push_back(structural(TokenKind::Outdent, at.clone()));
        }
        self.eof = Some(structural(TokenKind::Eof, at));
    }

    fn top(&self) -> usize {
        self.indents.last().copied().unwrap_or(0)
    }
}

fn structural(kind: TokenKind, span: Span) -> Token {
    let text = if kind == TokenKind::Newline { "\n" } else { "" };
    Token {
        kind,
        text: text.to_string(),
        span,
    }
}

/// Raw lexeme before indentation processing.
enum Raw {
    Token(Token),
    /// Run of spaces/tabs, measured in columns after tab expansion.
    Whitespace(usize),
    Newline(Span),
    Eof(Span),
}

struct Scanner<'a> {
    source: &'a str,
    input: &'a [u8],
    pos: usize,
    line: usize,
    col: usize,
    options: LexOptions,
}

impl<'a> Scanner<'a> {
    fn new(source: &'a str, options: LexOptions) -> Self {
        let bytes = source.as_bytes();
        let start = if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
            3
        } else {
            0
        };
        Self {
            source,
            input: bytes,
            pos: start,
            line: 1,
            col: 1,
            options,
        }
    }

    fn next_raw(&mut self) -> Result<Raw, LexError> {
        loop {
            let Some(ch) = self.peek() else {
                return Ok(Raw::Eof(self.span()));
            };

            return match ch {
                b'\n' => {
                    let span = self.span();
                    self.advance();
                    Ok(Raw::Newline(span))
                }
                b'\r' if self.peek_at(1) == Some(b'\n') => {
                    let span = self.span();
                    self.advance();
                    self.advance();
                    Ok(Raw::Newline(span))
                }
                b' ' | b'\t' => Ok(Raw::Whitespace(self.read_whitespace())),
                b'#' => {
                    self.skip_comment();
                    continue;
                }
                b':' => Ok(Raw::Token(self.single(TokenKind::Colon))),
                b'(' => Ok(Raw::Token(self.single(TokenKind::LBracket))),
                b')' => Ok(Raw::Token(self.single(TokenKind::RBracket))),
                b'"' => self.read_quoted_string().map(Raw::Token),
                b'0'..=b'9' => Ok(Raw::Token(
                    self.read_while(TokenKind::Number, |c| c.is_ascii_digit()),
                )),
                c if c == b'_' || c.is_ascii_alphabetic() => Ok(Raw::Token(
                    self.read_while(TokenKind::Name, |c| c == b'_' || c.is_ascii_alphanumeric()),
                )),
                _ => {
                    let found = self.source[self.pos..].chars().next().unwrap_or('\u{FFFD}');
                    Err(LexError {
                        kind: LexErrorKind::UnexpectedCharacter(found),
                        span: self.span(),
                    })
                }
            };
        }
    }

    fn span(&self) -> Span {
        Span::new(self.line, self.col).in_file(self.options.file.as_deref())
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) {
        if self.pos < self.input.len() {
            if self.input[self.pos] == b'\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
            self.pos += 1;
        }
    }

    fn single(&mut self, kind: TokenKind) -> Token {
        let span = self.span();
        let text = char::from(self.input[self.pos]).to_string();
        self.advance();
        Token { kind, text, span }
    }

    fn read_whitespace(&mut self) -> usize {
        let tab = self.options.tab_width.max(1);
        let mut width = 0;
        while let Some(ch) = self.peek() {
            match ch {
                b' ' => width += 1,
                b'\t' => width = (width / tab + 1) * tab,
                _ => break,
            }
            self.advance();
        }
        width
    }

    fn skip_comment(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos] != b'\n' {
            if self.input[self.pos] == b'\r' && self.peek_at(1) == Some(b'\n') {
                break;
            }
            self.advance();
        }
    }

    fn read_while(&mut self, kind: TokenKind, accept: impl Fn(u8) -> bool) -> Token {
        let span = self.span();
        let start = self.pos;
        while self.peek().is_some_and(&accept) {
            self.advance();
        }
        Token {
            kind,
            text: self.source[start..self.pos].to_string(),
            span,
        }
    }

    fn read_quoted_string(&mut self) -> Result<Token, LexError> {
        let span = self.span();
        self.advance(); // skip opening quote

        let mut value = String::new();
        let mut run = self.pos;
        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    return Err(LexError {
                        kind: LexErrorKind::UnterminatedString,
                        span,
                    });
                }
                Some(b'\\') => {
                    value.push_str(&self.source[run..self.pos]);
                    self.advance();
                    match self.peek() {
                        Some(b'n') => value.push('\n'),
                        Some(b't') => value.push('\t'),
                        Some(b'r') => value.push('\r'),
                        Some(b'"') => value.push('"'),
                        Some(b'\\') => value.push('\\'),
                        Some(_) => {
                            value.push('\\');
                            run = self.pos;
                            continue;
                        }
                        None => {
                            return Err(LexError {
                                kind: LexErrorKind::UnterminatedString,
                                span,
                            });
                        }
                    }
                    self.advance();
                    run = self.pos;
                }
                Some(b'"') => {
                    value.push_str(&self.source[run..self.pos]);
                    self.advance();
                    break;
                }
                Some(_) => self.advance(),
            }
        }

        Ok(Token {
            kind: TokenKind::Str,
            text: value,
            span,
        })
    }
}
