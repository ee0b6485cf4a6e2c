//! Statement scanner: splits raw source into semicolon-terminated
//! statements.
//!
//! The scanner is quote- and comment-aware: semicolons inside `'...'` or
//! `"..."` literals, inside `/* ... */` block comments, or inside `* ...;`
//! comment statements never terminate a statement. Each statement records
//! the 1-based source line where it starts, for diagnostics.
//!
//! After a `datalines;` (or `cards;`) statement the scanner switches to raw
//! mode: following lines are captured verbatim, up to a line containing
//! only `;`, and attached to the `datalines` statement as its body.

// ---------------------------------------------------------------------------
// Raw statement
// ---------------------------------------------------------------------------

/// One semicolon-terminated statement, not yet parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStatement {
    /// Statement text, trimmed, without the terminating semicolon.
    pub text: String,
    /// 1-based line where the statement starts.
    pub line: u32,
    /// Raw data body, present only for `datalines`/`cards` statements.
    pub body: Option<String>,
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

/// Split source text into statements.
#[must_use]
pub fn split_statements(source: &str) -> Vec<RawStatement> {
    let mut scanner = Scanner::new(source);
    scanner.run();
    scanner.statements
}

struct Scanner<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
    /// Line of the first non-whitespace byte of the current statement.
    stmt_line: u32,
    current: String,
    statements: Vec<RawStatement>,
}

impl<'a> Scanner<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            src: source.as_bytes(),
            pos: 0,
            line: 1,
            stmt_line: 1,
            current: String::new(),
            statements: Vec::new(),
        }
    }

    fn run(&mut self) {
        while self.pos < self.src.len() {
            let c = self.src[self.pos];

            // Block comment.
            if c == b'/' && self.peek(1) == Some(b'*') {
                self.skip_block_comment();
                continue;
            }

            // `* comment ;` is recognized only at the start of a statement.
            if c == b'*' && self.current.trim().is_empty() {
                self.skip_to_semicolon();
                self.current.clear();
                continue;
            }

            if c == b'\'' || c == b'"' {
                self.copy_string(c);
                continue;
            }

            if c == b';' {
                self.pos += 1;
                self.finish_statement();
                continue;
            }

            if self.current.trim().is_empty() && !c.is_ascii_whitespace() {
                self.stmt_line = self.line;
            }
            if c == b'\n' {
                self.line += 1;
            }
            self.current.push(char::from(c));
            self.pos += 1;
        }
        // Trailing text without a semicolon still forms a statement.
        self.finish_statement();
    }

    fn peek(&self, ahead: usize) -> Option<u8> {
        self.src.get(self.pos + ahead).copied()
    }

    fn skip_block_comment(&mut self) {
        self.pos += 2;
        while self.pos < self.src.len() {
            if self.src[self.pos] == b'\n' {
                self.line += 1;
            }
            if self.src[self.pos] == b'*' && self.peek(1) == Some(b'/') {
                self.pos += 2;
                return;
            }
            self.pos += 1;
        }
    }

    fn skip_to_semicolon(&mut self) {
        while self.pos < self.src.len() && self.src[self.pos] != b';' {
            if self.src[self.pos] == b'\n' {
                self.line += 1;
            }
            self.pos += 1;
        }
        if self.pos < self.src.len() {
            self.pos += 1; // the ';'
        }
    }

    fn copy_string(&mut self, quote: u8) {
        self.current.push(char::from(quote));
        self.pos += 1;
        while self.pos < self.src.len() {
            let c = self.src[self.pos];
            if c == b'\n' {
                self.line += 1;
            }
            self.current.push(char::from(c));
            self.pos += 1;
            if c == quote {
                return;
            }
        }
    }

    fn finish_statement(&mut self) {
        let text = self.current.trim().to_owned();
        self.current.clear();
        if text.is_empty() {
            return;
        }

        let lowered = text.to_ascii_lowercase();
        let body = if lowered == "datalines" || lowered == "cards" {
            Some(self.capture_datalines())
        } else {
            None
        };

        self.statements.push(RawStatement {
            text,
            line: self.stmt_line,
            body,
        });
    }

    /// Capture raw data up to (not including) the terminating `;`.
    ///
    /// Data values never contain semicolons, so the next `;` (on its own
    /// line or inline) always ends the body.
    fn capture_datalines(&mut self) -> String {
        let mut body = String::new();
        while self.pos < self.src.len() {
            let c = self.src[self.pos];
            self.pos += 1;
            if c == b';' {
                break;
            }
            if c == b'\n' {
                self.line += 1;
            }
            body.push(char::from(c));
        }
        body
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
