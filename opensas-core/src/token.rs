//! Word-level lexer shared by the statement parser and expression parser.
//!
//! The statement scanner (see [`crate::scanner`]) splits source text into
//! semicolon-terminated statements; this lexer then breaks one statement
//! into words. Identifiers are lowercased (the language is
//! case-insensitive); string literals keep their exact contents.
//!
//! # Token production rules
//!
//! | Input              | Token produced                         |
//! |--------------------|----------------------------------------|
//! | `age`, `_n_`       | `Ident("age")`, `Ident("_n_")`         |
//! | `3`, `2.5`, `.5`   | `Number(3.0)`, `Number(2.5)`, `Number(0.5)` |
//! | `'abc'`, `"abc"`   | `Str("abc")`                           |
//! | `**`, `<=`, `^=`   | `Op("**")`, `Op("<=")`, `Op("^=")`     |
//! | lone `.`           | `Dot` (missing literal / name separator) |
//! | end of statement   | `Eof`                                  |

// ---------------------------------------------------------------------------
// Span
// ---------------------------------------------------------------------------

/// A byte-offset span within one statement's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Start byte offset (inclusive).
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
}

impl Span {
    /// Create a new span.
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// A zero-length span at the given position.
    #[must_use]
    pub const fn at(pos: usize) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }
}

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// A lexical token.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind and value of the token.
    pub kind: TokenKind,
    /// Location within the statement text.
    pub span: Span,
}

/// The kind and payload of a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// An identifier or keyword, lowercased.
    Ident(String),
    /// A non-negative numeric constant (`-3` is unary minus applied to `3`).
    Number(f64),
    /// A string literal; contents between the quotes.
    Str(String),
    /// An operator or punctuation: `+ - * / ** = ^= ~= < <= > >= ( ) , $ @`.
    Op(&'static str),
    /// A lone period: missing-value literal or qualified-name separator.
    Dot,
    /// End of the statement.
    Eof,
}

impl TokenKind {
    /// Returns `true` if this is the given identifier.
    #[must_use]
    pub fn is_ident(&self, name: &str) -> bool {
        matches!(self, Self::Ident(s) if s == name)
    }

    /// Returns `true` if this is the given operator.
    #[must_use]
    pub fn is_op(&self, op: &str) -> bool {
        matches!(self, Self::Op(s) if *s == op)
    }

    /// Returns `true` if this is end-of-statement.
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        matches!(self, Self::Eof)
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

/// Lexer over one statement's text.
pub struct Lexer {
    src: Vec<u8>,
    pos: usize,
}

impl Lexer {
    /// Create a new lexer over the given statement text.
    #[must_use]
    pub fn new(text: &str) -> Self {
        Self {
            src: text.as_bytes().to_vec(),
            pos: 0,
        }
    }

    /// Tokenize the whole statement (excluding the trailing `Eof`).
    #[must_use]
    pub fn tokenize(text: &str) -> Vec<Token> {
        let mut lexer = Self::new(text);
        let mut tokens = Vec::new();
        loop {
            let tok = lexer.next_token();
            if tok.kind.is_eof() {
                break;
            }
            tokens.push(tok);
        }
        tokens
    }

    /// Scan the next token.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        if self.pos >= self.src.len() {
            return Token {
                kind: TokenKind::Eof,
                span: Span::at(self.pos),
            };
        }

        let start = self.pos;
        let c = self.src[self.pos];

        match c {
            b'0'..=b'9' => self.scan_number(start),
            b'.' => {
                // `.5` is a number; `.` alone is the missing/dot token.
                if self.pos + 1 < self.src.len() && self.src[self.pos + 1].is_ascii_digit() {
                    self.scan_number(start)
                } else {
                    self.pos += 1;
                    Token {
                        kind: TokenKind::Dot,
                        span: Span::new(start, self.pos),
                    }
                }
            }
            b'\'' | b'"' => self.scan_string(start, c),
            b'A'..=b'Z' | b'a'..=b'z' | b'_' => self.scan_ident(start),
            _ => self.scan_operator(start),
        }
    }

    // -- internal helpers --

    fn skip_whitespace(&mut self) {
        while self.pos < self.src.len() && self.src[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn scan_number(&mut self, start: usize) -> Token {
        while self.pos < self.src.len() && self.src[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        if self.pos < self.src.len()
            && self.src[self.pos] == b'.'
            && self.pos + 1 < self.src.len()
            && self.src[self.pos + 1].is_ascii_digit()
        {
            self.pos += 1;
            while self.pos < self.src.len() && self.src[self.pos].is_ascii_digit() {
                self.pos += 1;
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("0");
        let value = text.parse::<f64>().unwrap_or(0.0);
        Token {
            kind: TokenKind::Number(value),
            span: Span::new(start, self.pos),
        }
    }

    fn scan_string(&mut self, start: usize, quote: u8) -> Token {
        self.pos += 1; // opening quote
        let mut content = Vec::new();
        while self.pos < self.src.len() {
            let c = self.src[self.pos];
            if c == quote {
                // Doubled quote is an escaped literal quote.
                if self.pos + 1 < self.src.len() && self.src[self.pos + 1] == quote {
                    content.push(quote);
                    self.pos += 2;
                    continue;
                }
                self.pos += 1;
                break;
            }
            content.push(c);
            self.pos += 1;
        }
        Token {
            kind: TokenKind::Str(String::from_utf8_lossy(&content).into_owned()),
            span: Span::new(start, self.pos),
        }
    }

    fn scan_ident(&mut self, start: usize) -> Token {
        while self.pos < self.src.len()
            && (self.src[self.pos].is_ascii_alphanumeric() || self.src[self.pos] == b'_')
        {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("");
        Token {
            kind: TokenKind::Ident(text.to_ascii_lowercase()),
            span: Span::new(start, self.pos),
        }
    }

    fn scan_operator(&mut self, start: usize) -> Token {
        let rest = &self.src[self.pos..];
        // Longest match first.
        const TWO: [(&[u8; 2], &str); 5] =
            [(b"**", "**"), (b"<=", "<="), (b">=", ">="), (b"^=", "^="), (b"~=", "~=")];
        for (pat, op) in TWO {
            if rest.starts_with(pat) {
                self.pos += 2;
                return Token {
                    kind: TokenKind::Op(op),
                    span: Span::new(start, self.pos),
                };
            }
        }
        let op = match rest[0] {
            b'+' => "+",
            b'-' => "-",
            b'*' => "*",
            b'/' => "/",
            b'=' => "=",
            b'<' => "<",
            b'>' => ">",
            b'(' => "(",
            b')' => ")",
            b',' => ",",
            b'$' => "$",
            b'@' => "@",
            _ => {
                // Unknown byte: emit a placeholder the parser will reject.
                self.pos += 1;
                return Token {
                    kind: TokenKind::Op("?"),
                    span: Span::new(start, self.pos),
                };
            }
        };
        self.pos += 1;
        Token {
            kind: TokenKind::Op(op),
            span: Span::new(start, self.pos),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
