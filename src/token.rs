use std::fmt;

/// Source location for error reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Span {
    pub file: Option<String>,
    pub line: usize,
    pub column: usize,
}

impl Span {
    #[must_use]
    pub const fn new(line: usize, column: usize) -> Self {
        Self {
            file: None,
            line,
            column,
        }
    }

    /// Attach a file name to this span.
    #[must_use]
    pub fn in_file(mut self, file: Option<&str>) -> Self {
        self.file = file.map(str::to_string);
        self
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{file}:{}:{}", self.line, self.column),
            None => write!(f, "line {}, column {}", self.line, self.column),
        }
    }
}

/// Token kinds produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Identifier (`[A-Za-z_][A-Za-z0-9_]*`).
    Name,
    /// Decimal integer literal.
    Number,
    /// Double-quoted string (`"..."`).
    Str,
    /// `:` introducing a child block.
    Colon,
    /// Opening bracket `(`.
    LBracket,
    /// Closing bracket `)`.
    RBracket,
    /// Line break at unchanged indentation.
    Newline,
    /// Line break into a deeper indentation level.
    Indent,
    /// One closed indentation level.
    Outdent,
    /// End of input. Repeats forever once reached.
    Eof,
}

impl TokenKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Name => "NAME",
            Self::Number => "NUMBER",
            Self::Str => "STRING",
            Self::Colon => "COLON",
            Self::LBracket => "LBRACKET",
            Self::RBracket => "RBRACKET",
            Self::Newline => "NEWLINE",
            Self::Indent => "INDENT",
            Self::Outdent => "OUTDENT",
            Self::Eof => "EOF",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single token with its kind, text, and source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.text.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{} '{}'", self.kind, self.text)
        }
    }
}
