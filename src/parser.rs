use std::fmt;

use crate::ast::{SyntaxNode, Value};
use crate::lexer::{LexError, LexOptions, Lexer};
use crate::token::{Span, Token, TokenKind};

/// Classifies a parser error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A specific token kind was required here.
    Expected {
        expected: Vec<TokenKind>,
        found: TokenKind,
        text: String,
    },
    /// Token that cannot start a value or node here.
    Unexpected { found: TokenKind, text: String },
    /// Integer literal that does not fit in 64 bits.
    NumberOutOfRange(String),
    /// Brackets nested deeper than [`MAX_NESTING`].
    TooDeep { limit: usize },
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expected {
                expected,
                found,
                text,
            } => {
                write!(f, "expected ")?;
                for (i, kind) in expected.iter().enumerate() {
                    if i > 0 {
                        write!(f, " or ")?;
                    }
                    write!(f, "{kind}")?;
                }
                write!(f, ", got {found}")?;
                if !text.is_empty() && *found != TokenKind::Newline {
                    write!(f, " '{text}'")?;
                }
                Ok(())
            }
            Self::Unexpected { found, text } => {
                write!(f, "unexpected token {found}")?;
                if !text.is_empty() && *found != TokenKind::Newline {
                    write!(f, " '{text}'")?;
                }
                Ok(())
            }
            Self::NumberOutOfRange(text) => {
                write!(f, "number out of range: {text}")
            }
            Self::TooDeep { limit } => {
                write!(f, "brackets nested deeper than {limit}")
            }
        }
    }
}

/// Error produced during parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at {span}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Span,
}

/// Any failure while turning text into syntax.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyntaxError {
    #[error("{0}")]
    Lex(#[from] LexError),
    #[error("{0}")]
    Parse(#[from] ParseError),
}

impl SyntaxError {
    #[must_use]
    pub const fn span(&self) -> &Span {
        match self {
            Self::Lex(e) => &e.span,
            Self::Parse(e) => &e.span,
        }
    }
}

/// Deepest bracket nesting accepted inside one line.
pub const MAX_NESTING: usize = 64;

/// Tokens that end an argument list.
const EXPRESSION_END: [TokenKind; 5] = [
    TokenKind::Colon,
    TokenKind::Outdent,
    TokenKind::Newline,
    TokenKind::Eof,
    TokenKind::RBracket,
];

/// Structural marker emitted by [`Parser`] in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A node without its children. `has_children` announces that an
    /// `Enter` follows.
    Node {
        node: SyntaxNode,
        has_children: bool,
    },
    /// The child block of the previous node begins.
    Enter,
    /// The innermost open child block ends.
    Exit,
}

/// Parse a script into its top-level syntax nodes.
///
/// # Errors
///
/// Returns the first lexer or parser error in document order.
pub fn parse(input: &str) -> Result<Vec<SyntaxNode>, SyntaxError> {
    parse_with(input, LexOptions::default())
}

/// [`parse`] with explicit lexer options (file name, tab width).
pub fn parse_with(input: &str, options: LexOptions) -> Result<Vec<SyntaxNode>, SyntaxError> {
    let parser = Parser::new(Lexer::with_options(input, options)?);
    assemble(parser)
}

/// Rebuild the nested tree from an event stream with an explicit stack.
pub fn assemble(
    events: impl IntoIterator<Item = Result<Event, SyntaxError>>,
) -> Result<Vec<SyntaxNode>, SyntaxError> {
    // Each frame holds the siblings collected so far at that depth.
    let mut stack: Vec<Vec<SyntaxNode>> = vec![Vec::new()];
    for event in events {
        match event? {
            Event::Node { node, .. } => {
                if let Some(siblings) = stack.last_mut() {
                    siblings.push(node);
                }
            }
            Event::Enter => stack.push(Vec::new()),
            Event::Exit => {
                let children = stack.pop().unwrap_or_default();
                if let Some(owner) = stack.last_mut().and_then(|s| s.last_mut()) {
                    owner.children = children;
                }
            }
        }
    }
    Ok(stack.into_iter().next().unwrap_or_default())
}

/// Recursive-descent parser over a [`Lexer`], exposed as an iterator
/// of [`Event`]s.
///
/// Child blocks are tracked with a depth counter instead of recursion,
/// so consumers see nodes (and errors) strictly in document order. The
/// iterator stops after the first error.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    depth: usize,
    nesting: usize,
    queued: Option<Event>,
    done: bool,
}

impl<'a> Parser<'a> {
    #[must_use]
    pub const fn new(lexer: Lexer<'a>) -> Self {
        Self {
            lexer,
            depth: 0,
            nesting: 0,
            queued: None,
            done: false,
        }
    }

    fn step(&mut self) -> Result<Option<Event>, SyntaxError> {
        if let Some(event) = self.queued.take() {
            return Ok(Some(event));
        }

        loop {
            let kind = self.lexer.current().kind;
            match kind {
                TokenKind::Newline => {
                    self.lexer.next()?;
                }
                TokenKind::Eof if self.depth == 0 => return Ok(None),
                TokenKind::Eof => return Err(self.expected(&[TokenKind::Outdent]).into()),
                TokenKind::Outdent if self.depth > 0 => {
                    self.lexer.next()?;
                    self.depth -= 1;
                    return Ok(Some(Event::Exit));
                }
                _ => return self.node().map(Some),
            }
        }
    }

    /// `node := call [ COLON INDENT ... ]`
    fn node(&mut self) -> Result<Event, SyntaxError> {
        let node = self.call()?;

        if self.lexer.check(&[TokenKind::Colon]) {
            self.lexer.next()?;
            self.expect(&[TokenKind::Indent])?;
            self.depth += 1;
            self.queued = Some(Event::Enter);
            return Ok(Event::Node {
                node,
                has_children: true,
            });
        }

        if !self
            .lexer
            .check(&[TokenKind::Newline, TokenKind::Outdent, TokenKind::Eof])
        {
            return Err(self.unexpected().into());
        }

        Ok(Event::Node {
            node,
            has_children: false,
        })
    }

    /// `call := NAME expression`
    ///
    /// A word in argument position is itself a call that takes the rest
    /// of the expression. The links of such a chain are read in a loop
    /// and nested afterwards, so line length does not grow the stack.
    fn call(&mut self) -> Result<SyntaxNode, SyntaxError> {
        let mut links = Vec::new();
        loop {
            let name = self.expect(&[TokenKind::Name])?;
            let mut link = SyntaxNode {
                name: name.text,
                arguments: Vec::new(),
                children: Vec::new(),
                span: name.span,
            };
            while !self.lexer.check(&EXPRESSION_END) && !self.lexer.check(&[TokenKind::Name]) {
                link.arguments.push(self.single_value()?);
            }
            links.push(link);
            if !self.lexer.check(&[TokenKind::Name]) {
                break;
            }
        }

        let mut chain: Option<SyntaxNode> = None;
        while let Some(mut link) = links.pop() {
            if let Some(inner) = chain.take() {
                link.arguments.push(Value::Call(inner));
            }
            chain = Some(link);
        }
        chain.ok_or_else(|| self.unexpected().into())
    }

    fn expression(&mut self) -> Result<Vec<Value>, SyntaxError> {
        let mut values = Vec::new();
        while !self.lexer.check(&EXPRESSION_END) {
            values.push(self.single_value()?);
        }
        Ok(values)
    }

    fn single_value(&mut self) -> Result<Value, SyntaxError> {
        match self.lexer.current().kind {
            TokenKind::Number => {
                let token = self.lexer.next()?;
                let n = token.text.parse::<i64>().map_err(|_| ParseError {
                    kind: ParseErrorKind::NumberOutOfRange(token.text.clone()),
                    span: token.span.clone(),
                })?;
                Ok(Value::Number(n))
            }
            TokenKind::Str => Ok(Value::Str(self.lexer.next()?.text)),
            TokenKind::LBracket => {
                if self.nesting == MAX_NESTING {
                    let current = self.lexer.current();
                    return Err(ParseError {
                        kind: ParseErrorKind::TooDeep { limit: MAX_NESTING },
                        span: current.span.clone(),
                    }
                    .into());
                }
                self.lexer.next()?;
                self.nesting += 1;
                let inner = self.expression()?;
                self.expect(&[TokenKind::RBracket])?;
                self.nesting -= 1;
                Ok(Value::List(inner))
            }
            TokenKind::Name => Ok(Value::Call(self.call()?)),
            _ => Err(self.unexpected().into()),
        }
    }

    fn expect(&mut self, kinds: &[TokenKind]) -> Result<Token, SyntaxError> {
        if self.lexer.check(kinds) {
            Ok(self.lexer.next()?)
        } else {
            Err(self.expected(kinds).into())
        }
    }

    fn expected(&self, kinds: &[TokenKind]) -> ParseError {
        let current = self.lexer.current();
        ParseError {
            kind: ParseErrorKind::Expected {
                expected: kinds.to_vec(),
                found: current.kind,
                text: current.text.clone(),
            },
            span: current.span.clone(),
        }
    }

    fn unexpected(&self) -> ParseError {
        let current = self.lexer.current();
        ParseError {
            kind: ParseErrorKind::Unexpected {
                found: current.kind,
                text: current.text.clone(),
            },
            span: current.span.clone(),
        }
    }
}

impl Iterator for Parser<'_> {
    type Item = Result<Event, SyntaxError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(input: &str) -> Vec<Event> {
        Parser::new(Lexer::new(input).expect("lex"))
            .collect::<Result<_, _>>()
            .expect("parse")
    }

    #[test]
    fn flat_calls() {
        let nodes = parse("a 34 (b) 12\nc\n").expect("parse");
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].name, "a");
        assert_eq!(
            nodes[0].arguments,
            vec![
                Value::Number(34),
                Value::List(vec![Value::word("b")]),
                Value::Number(12),
            ]
        );
        assert_eq!(nodes[1].name, "c");
    }

    #[test]
    fn child_blocks() {
        let nodes = parse("a 34 (b) 12:\n    rm 12 34\nb").expect("parse");
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].children.len(), 1);
        assert_eq!(nodes[0].children[0].name, "rm");
        assert_eq!(nodes[1].name, "b");
    }

    #[test]
    fn event_order() {
        let names: Vec<String> = events("a:\n  b:\n    c\n  d\ne\n")
            .into_iter()
            .map(|e| match e {
                Event::Node {
                    node,
                    has_children: true,
                } => format!("{}:", node.name),
                Event::Node { node, .. } => node.name.clone(),
                Event::Enter => ">".to_string(),
                Event::Exit => "<".to_string(),
            })
            .collect();
        assert_eq!(names, ["a:", ">", "b:", ">", "c", "<", "d", "<", "e"]);
    }

    #[test]
    fn nested_call_chain() {
        let nodes = parse("target build depends compile").expect("parse");
        assert_eq!(
            nodes[0].arguments,
            vec![Value::chain(&["build", "depends", "compile"]).expect("chain")]
        );
    }

    #[test]
    fn unterminated_bracket() {
        let err = parse("a (").unwrap_err();
        assert!(matches!(
            err,
            SyntaxError::Parse(ParseError {
                kind: ParseErrorKind::Expected { .. },
                ..
            })
        ));
        assert!(matches!(parse("(").unwrap_err(), SyntaxError::Parse(_)));
    }

    #[test]
    fn missing_block_after_colon() {
        let err = parse("a:\nb\n").unwrap_err();
        let SyntaxError::Parse(e) = err else {
            panic!("expected parse error");
        };
        assert!(matches!(
            e.kind,
            ParseErrorKind::Expected { ref expected, .. } if expected == &[TokenKind::Indent]
        ));
    }

    #[test]
    fn indent_without_colon() {
        assert!(parse("a\n    b\n").is_err());
    }

    #[test]
    fn stray_closing_bracket() {
        assert!(parse("a b)\n").is_err());
    }

    #[test]
    fn number_out_of_range() {
        let err = parse("a 99999999999999999999").unwrap_err();
        assert!(matches!(
            err,
            SyntaxError::Parse(ParseError {
                kind: ParseErrorKind::NumberOutOfRange(_),
                ..
            })
        ));
    }

    #[test]
    fn long_word_chain() {
        let line = format!("echo{}\n", " w".repeat(20_000));
        let nodes = parse(&line).expect("parse");
        let mut depth = 0;
        let mut value = nodes[0].arguments.last();
        while let Some(Value::Call(link)) = value {
            depth += 1;
            value = link.arguments.last();
        }
        assert_eq!(depth, 20_000);
    }

    #[test]
    fn bracket_nesting_is_limited() {
        let ok = format!("a {}b{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert!(parse(&ok).is_ok());
        let deep = format!("a {}b{}", "(".repeat(MAX_NESTING + 1), ")".repeat(MAX_NESTING + 1));
        let err = parse(&deep).unwrap_err();
        let SyntaxError::Parse(e) = err else {
            panic!("expected parse error");
        };
        assert_eq!(e.kind, ParseErrorKind::TooDeep { limit: MAX_NESTING });
        assert_eq!(e.span.column, 3 + MAX_NESTING);
    }

    #[test]
    fn events_before_error_are_delivered() {
        let mut parser = Parser::new(Lexer::new("a\nb\n)\nc\n").expect("lex"));
        assert!(matches!(parser.next(), Some(Ok(Event::Node { .. }))));
        assert!(matches!(parser.next(), Some(Ok(Event::Node { .. }))));
        assert!(matches!(parser.next(), Some(Err(_))));
        assert!(parser.next().is_none());
    }
}
