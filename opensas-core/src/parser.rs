//! Statement parser: raw statements → [`Program`].
//!
//! The parser walks the scanner's statement list and groups statements
//! into top-level steps: `data ... run;`, `proc ... run;`/`quit;`, and
//! `libname`. DATA-step statements are parsed fully (including IF/ELSE
//! chains and `do; ... end;` groups, which span several raw statements);
//! PROC sub-statements are kept as raw `(keyword, args)` pairs for the
//! procedure implementations to interpret.
//!
//! Errors here are recoverable per statement: a malformed or unknown
//! statement is reported and skipped, and parsing continues with the next
//! statement.

use crate::ast::{
    DataStep, IfBranch, InputVar, LibraryBinding, MergeMode, ProcStep, Program, SetSource,
    Statement, Step, SubStatement,
};
use crate::error::{Diagnostics, ErrorKind, InterpResult, InterpreterError};
use crate::expr;
use crate::scanner::RawStatement;
use crate::table::{format_number, Value};
use crate::token::{Lexer, Token, TokenKind};

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Parse scanned statements into a program, reporting recoverable errors
/// through `diags`.
#[must_use]
pub fn parse_program(statements: &[RawStatement], diags: &mut Diagnostics) -> Program {
    let mut parser = Parser {
        stmts: statements,
        pos: 0,
    };
    parser.run(diags)
}

/// Qualify a table name: `member` → `work.member`.
#[must_use]
pub fn qualify(name: &str) -> String {
    if name.contains('.') {
        name.to_owned()
    } else {
        format!("work.{name}")
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// What closes the current DATA-step statement group.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Terminator {
    /// Top level of the step: `run;`.
    Run,
    /// Inside a `do; ... end;` group: `end;`.
    End,
}

struct Parser<'a> {
    stmts: &'a [RawStatement],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&RawStatement> {
        self.stmts.get(self.pos)
    }

    fn bump(&mut self) -> Option<&RawStatement> {
        let stmt = self.stmts.get(self.pos)?;
        self.pos += 1;
        Some(stmt)
    }

    fn run(&mut self, diags: &mut Diagnostics) -> Program {
        let mut program = Program::default();
        while let Some(raw) = self.peek() {
            let line = raw.line;
            let text = raw.text.clone();
            let tokens = Lexer::tokenize(&text);
            let keyword = match tokens.first().map(|t| &t.kind) {
                Some(TokenKind::Ident(w)) => w.clone(),
                _ => String::new(),
            };
            match keyword.as_str() {
                "data" => {
                    self.pos += 1;
                    match self.parse_data_step(&tokens, line, diags) {
                        Ok(step) => program.steps.push(Step::Data(step)),
                        Err(err) => {
                            diags.push_error(&err);
                            self.skip_to_step_end();
                        }
                    }
                }
                "proc" => {
                    self.pos += 1;
                    match self.parse_proc_step(&tokens, line) {
                        Ok(step) => program.steps.push(Step::Proc(step)),
                        Err(err) => {
                            diags.push_error(&err);
                            self.skip_to_step_end();
                        }
                    }
                }
                "libname" => {
                    self.pos += 1;
                    match parse_libname(&tokens, line) {
                        Ok(binding) => program.steps.push(Step::Libname(binding)),
                        Err(err) => diags.push_error(&err),
                    }
                }
                // Stray step terminators are harmless.
                "run" | "quit" => {
                    self.pos += 1;
                }
                _ => {
                    self.pos += 1;
                    diags.push_error(
                        &InterpreterError::new(
                            ErrorKind::UnknownStatement,
                            format!("statement `{text}` is not valid here"),
                        )
                        .at_line(line),
                    );
                }
            }
        }
        program
    }

    /// Consume statements up to and including the next `run`/`quit`.
    fn skip_to_step_end(&mut self) {
        while let Some(raw) = self.bump() {
            let lowered = raw.text.to_ascii_lowercase();
            if lowered == "run" || lowered == "quit" {
                return;
            }
        }
    }

    // -- DATA step --

    fn parse_data_step(
        &mut self,
        header: &[Token],
        line: u32,
        diags: &mut Diagnostics,
    ) -> InterpResult<DataStep> {
        let mut words = Words::new(&header[1..]);
        let mut targets = Vec::new();
        while !words.at_end() {
            let name = words
                .take_qualified_name()
                .ok_or_else(|| parse_error("data: expected an output table name", line))?;
            targets.push(qualify(&name));
        }
        if targets.is_empty() {
            return Err(parse_error("data: at least one output table is required", line));
        }
        let statements = self.parse_data_body(Terminator::Run, diags);
        Ok(DataStep {
            targets,
            statements,
            line,
        })
    }

    fn parse_data_body(&mut self, term: Terminator, diags: &mut Diagnostics) -> Vec<Statement> {
        let mut out = Vec::new();
        loop {
            let Some(raw) = self.peek() else {
                if term == Terminator::End {
                    diags.push_error(&InterpreterError::new(
                        ErrorKind::Parse,
                        "do group is not closed by `end;`",
                    ));
                }
                return out;
            };
            let line = raw.line;
            let lowered = raw.text.to_ascii_lowercase();

            if lowered == "run" {
                match term {
                    Terminator::Run => {
                        self.pos += 1;
                        return out;
                    }
                    Terminator::End => {
                        // Leave `run` for the enclosing step.
                        diags.push_error(
                            &InterpreterError::new(
                                ErrorKind::Parse,
                                "do group is not closed by `end;`",
                            )
                            .at_line(line),
                        );
                        return out;
                    }
                }
            }
            if lowered == "end" && term == Terminator::End {
                self.pos += 1;
                return out;
            }

            let body = raw.body.clone();
            let text = raw.text.clone();
            self.pos += 1;
            match self.parse_data_statement(&text, body, line, diags) {
                Ok(Some(stmt)) => out.push(stmt),
                Ok(None) => {}
                Err(err) => diags.push_error(&err),
            }
        }
    }

    /// Parse one DATA-step statement. IF chains may consume further raw
    /// statements for their branches.
    fn parse_data_statement(
        &mut self,
        text: &str,
        body: Option<String>,
        line: u32,
        diags: &mut Diagnostics,
    ) -> InterpResult<Option<Statement>> {
        let tokens = Lexer::tokenize(text);
        let Some(first) = tokens.first() else {
            return Ok(None);
        };
        let TokenKind::Ident(keyword) = &first.kind else {
            return Err(parse_error(format!("cannot parse statement `{text}`"), line));
        };

        match keyword.as_str() {
            "if" => {
                let stmt = self.parse_if_chain(&tokens, line, diags)?;
                Ok(Some(stmt))
            }
            "datalines" | "cards" => Ok(Some(Statement::Datalines {
                body: body.unwrap_or_default(),
            })),
            _ => parse_simple_statement(&tokens, line).map(Some),
        }
    }

    /// `if cond then ...` with any chain of `else if` / `else` statements.
    fn parse_if_chain(
        &mut self,
        tokens: &[Token],
        line: u32,
        diags: &mut Diagnostics,
    ) -> InterpResult<Statement> {
        let mut branches = Vec::new();
        let mut else_body = Vec::new();

        branches.push(self.parse_if_branch(&tokens[1..], line, diags)?);

        // Chain: `else if ...` / `else ...` immediately following.
        while let Some(raw) = self.peek() {
            let next = Lexer::tokenize(&raw.text);
            if !next.first().is_some_and(|t| t.kind.is_ident("else")) {
                break;
            }
            let else_line = raw.line;
            self.pos += 1;
            if next.get(1).is_some_and(|t| t.kind.is_ident("if")) {
                branches.push(self.parse_if_branch(&next[2..], else_line, diags)?);
            } else {
                else_body = self.parse_branch_body(&next[1..], else_line, diags)?;
                break;
            }
        }

        Ok(Statement::If {
            branches,
            else_body,
            line,
        })
    }

    /// Parse `cond then <body>` (the part after `if` / `else if`).
    fn parse_if_branch(
        &mut self,
        tokens: &[Token],
        line: u32,
        diags: &mut Diagnostics,
    ) -> InterpResult<IfBranch> {
        let then_idx = tokens
            .iter()
            .position(|t| t.kind.is_ident("then"))
            .ok_or_else(|| parse_error("if: expected `then`", line))?;
        let cond = expr::parse_expression(&tokens[..then_idx]).map_err(|e| e.at_line(line))?;
        let body = self.parse_branch_body(&tokens[then_idx + 1..], line, diags)?;
        Ok(IfBranch { cond, body })
    }

    /// A branch body: `do` (block over following statements) or one inline
    /// statement.
    fn parse_branch_body(
        &mut self,
        tokens: &[Token],
        line: u32,
        diags: &mut Diagnostics,
    ) -> InterpResult<Vec<Statement>> {
        if tokens.len() == 1 && tokens[0].kind.is_ident("do") {
            return Ok(self.parse_data_body(Terminator::End, diags));
        }
        if tokens.is_empty() {
            return Err(parse_error("expected a statement after `then`/`else`", line));
        }
        parse_simple_statement(tokens, line).map(|s| vec![s])
    }

    // -- PROC step --

    fn parse_proc_step(&mut self, header: &[Token], line: u32) -> InterpResult<ProcStep> {
        let mut words = Words::new(&header[1..]);
        let Some(name) = words.take_ident() else {
            return Err(parse_error("proc: expected a procedure name", line));
        };

        let mut data = None;
        let mut out = None;
        let mut noprint = false;
        let mut options = Vec::new();
        while let Some(key) = words.take_ident() {
            if words.eat_op("=") {
                let value = words
                    .take_option_value()
                    .ok_or_else(|| parse_error(format!("proc {name}: {key}= needs a value"), line))?;
                match key.as_str() {
                    "data" => data = Some(qualify(&value)),
                    "out" => out = Some(qualify(&value)),
                    _ => options.push((key, Some(value))),
                }
            } else if key == "noprint" {
                noprint = true;
            } else {
                options.push((key, None));
            }
        }
        if !words.at_end() {
            return Err(parse_error(format!("proc {name}: malformed options"), line));
        }

        let mut substatements = Vec::new();
        while let Some(raw) = self.bump() {
            let lowered = raw.text.to_ascii_lowercase();
            if lowered == "run" || lowered == "quit" {
                break;
            }
            let tokens = Lexer::tokenize(&raw.text);
            let Some(TokenKind::Ident(keyword)) = tokens.first().map(|t| &t.kind) else {
                return Err(parse_error(
                    format!("proc {name}: cannot parse `{}`", raw.text),
                    raw.line,
                ));
            };
            substatements.push(SubStatement {
                keyword: keyword.clone(),
                args: render_args(&tokens[1..]),
                line: raw.line,
            });
        }

        Ok(ProcStep {
            name,
            data,
            out,
            noprint,
            options,
            substatements,
            line,
        })
    }
}

// ---------------------------------------------------------------------------
// Single-statement parsing
// ---------------------------------------------------------------------------

fn parse_simple_statement(tokens: &[Token], line: u32) -> InterpResult<Statement> {
    let TokenKind::Ident(keyword) = &tokens[0].kind else {
        return Err(parse_error("cannot parse statement", line));
    };

    // Assignment beats keyword: `where = 1;` assigns to a variable named
    // `where`.
    if tokens.get(1).is_some_and(|t| t.kind.is_op("=")) {
        let expr = expr::parse_expression(&tokens[2..]).map_err(|e| e.at_line(line))?;
        return Ok(Statement::Assign {
            target: keyword.clone(),
            expr,
            line,
        });
    }

    let rest = &tokens[1..];
    match keyword.as_str() {
        "set" | "merge" => {
            let mode = if keyword == "set" {
                MergeMode::Set
            } else {
                MergeMode::Merge
            };
            let mut words = Words::new(rest);
            let mut tables = Vec::new();
            while let Some(name) = words.take_qualified_name() {
                tables.push(qualify(&name));
            }
            if tables.is_empty() || !words.at_end() {
                return Err(parse_error(format!("{keyword}: expected table names"), line));
            }
            Ok(Statement::Set(SetSource { tables, mode }))
        }
        "where" => {
            let expr = expr::parse_expression(rest).map_err(|e| e.at_line(line))?;
            Ok(Statement::Where(expr))
        }
        "input" => parse_input(rest, line),
        "drop" => Ok(Statement::Drop(take_name_list(rest, "drop", line)?)),
        "keep" => Ok(Statement::Keep(take_name_list(rest, "keep", line)?)),
        "by" => Ok(Statement::By {
            vars: take_name_list(rest, "by", line)?,
        }),
        "rename" => parse_rename(rest, line),
        "retain" => parse_retain(rest, line),
        "output" => {
            let mut words = Words::new(rest);
            let mut targets = Vec::new();
            while let Some(name) = words.take_qualified_name() {
                targets.push(qualify(&name));
            }
            if !words.at_end() {
                return Err(parse_error("output: expected table names", line));
            }
            Ok(Statement::Output { targets })
        }
        other => Err(InterpreterError::new(
            ErrorKind::UnknownStatement,
            format!("statement `{other}` is not recognized"),
        )
        .at_line(line)),
    }
}

/// `input x y $ z;`, names with an optional `$` character marker.
fn parse_input(tokens: &[Token], line: u32) -> InterpResult<Statement> {
    let mut words = Words::new(tokens);
    let mut vars = Vec::new();
    while let Some(name) = words.take_ident() {
        let is_char = words.eat_op("$");
        vars.push(InputVar { name, is_char });
    }
    if vars.is_empty() || !words.at_end() {
        return Err(parse_error("input: expected variable names", line));
    }
    Ok(Statement::Input { vars })
}

/// `rename old=new old2=new2;`
fn parse_rename(tokens: &[Token], line: u32) -> InterpResult<Statement> {
    let mut words = Words::new(tokens);
    let mut pairs = Vec::new();
    while let Some(old) = words.take_ident() {
        if !words.eat_op("=") {
            return Err(parse_error("rename: expected `old=new` pairs", line));
        }
        let Some(new) = words.take_ident() else {
            return Err(parse_error("rename: expected `old=new` pairs", line));
        };
        pairs.push((old, new));
    }
    if pairs.is_empty() || !words.at_end() {
        return Err(parse_error("rename: expected `old=new` pairs", line));
    }
    Ok(Statement::Rename(pairs))
}

/// `retain total 0 label 'none' flag;`, names with optional initial
/// values (number, string, `.` for missing, possibly negated).
fn parse_retain(tokens: &[Token], line: u32) -> InterpResult<Statement> {
    let mut words = Words::new(tokens);
    let mut vars = Vec::new();
    while let Some(name) = words.take_ident() {
        let value = words.take_literal_value();
        vars.push((name, value));
    }
    if vars.is_empty() || !words.at_end() {
        return Err(parse_error("retain: expected variable names", line));
    }
    Ok(Statement::Retain { vars })
}

fn take_name_list(tokens: &[Token], keyword: &str, line: u32) -> InterpResult<Vec<String>> {
    let mut words = Words::new(tokens);
    let mut names = Vec::new();
    while let Some(name) = words.take_ident() {
        names.push(name);
    }
    if names.is_empty() || !words.at_end() {
        return Err(parse_error(format!("{keyword}: expected variable names"), line));
    }
    Ok(names)
}

fn parse_libname(tokens: &[Token], line: u32) -> InterpResult<LibraryBinding> {
    let mut words = Words::new(&tokens[1..]);
    let Some(libref) = words.take_ident() else {
        return Err(parse_error("libname: expected a libref", line));
    };
    let Some(path) = words.take_string() else {
        return Err(parse_error("libname: expected a quoted directory path", line));
    };
    if !words.at_end() {
        return Err(parse_error("libname: unexpected trailing text", line));
    }
    Ok(LibraryBinding { libref, path, line })
}

fn parse_error(message: impl Into<String>, line: u32) -> InterpreterError {
    InterpreterError::new(ErrorKind::Parse, message).at_line(line)
}

// ---------------------------------------------------------------------------
// Token-slice cursor
// ---------------------------------------------------------------------------

/// Cursor over one statement's tokens.
struct Words<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Words<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn take_ident(&mut self) -> Option<String> {
        if let Some(TokenKind::Ident(name)) = self.peek() {
            let name = name.clone();
            self.pos += 1;
            return Some(name);
        }
        None
    }

    fn take_string(&mut self) -> Option<String> {
        if let Some(TokenKind::Str(s)) = self.peek() {
            let s = s.clone();
            self.pos += 1;
            return Some(s);
        }
        None
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.peek().is_some_and(|k| k.is_op(op)) {
            self.pos += 1;
            return true;
        }
        false
    }

    /// `name` or `lib.member`.
    fn take_qualified_name(&mut self) -> Option<String> {
        let first = self.take_ident()?;
        if matches!(self.peek(), Some(TokenKind::Dot)) {
            if let Some(TokenKind::Ident(member)) = self.tokens.get(self.pos + 1).map(|t| &t.kind) {
                let qualified = format!("{first}.{member}");
                self.pos += 2;
                return Some(qualified);
            }
        }
        Some(first)
    }

    /// An option value: qualified name, number, or string.
    fn take_option_value(&mut self) -> Option<String> {
        match self.peek() {
            Some(TokenKind::Number(v)) => {
                let text = format_number(*v);
                self.pos += 1;
                Some(text)
            }
            Some(TokenKind::Str(_)) => self.take_string(),
            Some(TokenKind::Ident(_)) => self.take_qualified_name(),
            _ => None,
        }
    }

    /// A literal initial value for RETAIN: number, `-number`, string, or
    /// `.` for missing.
    fn take_literal_value(&mut self) -> Option<Value> {
        match self.peek() {
            Some(TokenKind::Number(v)) => {
                let value = Value::num(*v);
                self.pos += 1;
                Some(value)
            }
            Some(TokenKind::Str(s)) => {
                let value = Value::Char(s.clone());
                self.pos += 1;
                Some(value)
            }
            Some(TokenKind::Dot) => {
                self.pos += 1;
                Some(Value::MISSING)
            }
            Some(TokenKind::Op("-")) => {
                if let Some(TokenKind::Number(v)) = self.tokens.get(self.pos + 1).map(|t| &t.kind) {
                    let value = Value::num(-v);
                    self.pos += 2;
                    return Some(value);
                }
                None
            }
            _ => None,
        }
    }
}

/// Render PROC sub-statement tokens as words. `=` and `.` glue their
/// neighbors together, so `out=work.stats` stays one word.
fn render_args(tokens: &[Token]) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    let mut glue_next = false;
    for tok in tokens {
        let (piece, glues) = match &tok.kind {
            TokenKind::Ident(s) => (s.clone(), false),
            TokenKind::Number(v) => (format_number(*v), false),
            TokenKind::Str(s) => (s.clone(), false),
            TokenKind::Op("=") => ("=".to_owned(), true),
            TokenKind::Dot => (".".to_owned(), true),
            TokenKind::Op(op) => ((*op).to_owned(), false),
            TokenKind::Eof => continue,
        };
        if (glue_next || glues) && !words.is_empty() {
            if let Some(last) = words.last_mut() {
                last.push_str(&piece);
            }
        } else {
            words.push(piece);
        }
        glue_next = glues;
    }
    words
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::split_statements;

    fn parse_ok(source: &str) -> Program {
        let mut diags = Diagnostics::new();
        let program = parse_program(&split_statements(source), &mut diags);
        assert!(!diags.has_errors(), "diagnostics: {:?}", diags.entries());
        program
    }

    fn only_data_step(program: &Program) -> &DataStep {
        assert_eq!(program.steps.len(), 1);
        match &program.steps[0] {
            Step::Data(ds) => ds,
            other => panic!("expected a data step, got {other:?}"),
        }
    }

    #[test]
    fn data_step_header_and_targets() {
        let p = parse_ok("data out1 w.out2; run;");
        let ds = only_data_step(&p);
        assert_eq!(ds.targets, vec!["work.out1".to_owned(), "w.out2".to_owned()]);
        assert!(ds.statements.is_empty());
    }

    #[test]
    fn assignment_statement() {
        let p = parse_ok("data a; y = x * 2; run;");
        let ds = only_data_step(&p);
        assert_eq!(ds.statements.len(), 1);
        assert!(matches!(
            &ds.statements[0],
            Statement::Assign { target, .. } if target == "y"
        ));
    }

    #[test]
    fn set_and_merge() {
        let p = parse_ok("data a; set b w.c; run; data d; merge e f; by id; run;");
        let Step::Data(first) = &p.steps[0] else { panic!() };
        let Statement::Set(src) = &first.statements[0] else {
            panic!("expected set")
        };
        assert_eq!(src.mode, MergeMode::Set);
        assert_eq!(src.tables, vec!["work.b".to_owned(), "w.c".to_owned()]);

        let Step::Data(second) = &p.steps[1] else { panic!() };
        let Statement::Set(src) = &second.statements[0] else {
            panic!("expected merge")
        };
        assert_eq!(src.mode, MergeMode::Merge);
        assert!(matches!(&second.statements[1], Statement::By { vars } if vars == &["id"]));
    }

    #[test]
    fn input_with_char_markers() {
        let p = parse_ok("data a; input name $ age; datalines; x 1 ; run;");
        let ds = only_data_step(&p);
        let Statement::Input { vars } = &ds.statements[0] else {
            panic!("expected input")
        };
        assert_eq!(
            vars,
            &[
                InputVar {
                    name: "name".into(),
                    is_char: true
                },
                InputVar {
                    name: "age".into(),
                    is_char: false
                },
            ]
        );
        let Statement::Datalines { body } = &ds.statements[1] else {
            panic!("expected datalines")
        };
        assert_eq!(body.trim(), "x 1");
    }

    #[test]
    fn if_then_inline_with_else() {
        let p = parse_ok("data a; if x > 1 then y = 1; else y = 0; run;");
        let ds = only_data_step(&p);
        let Statement::If {
            branches,
            else_body,
            ..
        } = &ds.statements[0]
        else {
            panic!("expected if")
        };
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].body.len(), 1);
        assert_eq!(else_body.len(), 1);
    }

    #[test]
    fn if_then_do_groups() {
        let p = parse_ok(
            "data a;\n if x > 1 then do;\n y = 1;\n z = 2;\n end;\n else do;\n y = 0;\n end;\n run;",
        );
        let ds = only_data_step(&p);
        assert_eq!(ds.statements.len(), 1);
        let Statement::If {
            branches,
            else_body,
            ..
        } = &ds.statements[0]
        else {
            panic!("expected if")
        };
        assert_eq!(branches[0].body.len(), 2);
        assert_eq!(else_body.len(), 1);
    }

    #[test]
    fn else_if_chain() {
        let p = parse_ok(
            "data a; if x > 2 then g = 'high'; else if x > 1 then g = 'mid'; else g = 'low'; run;",
        );
        let ds = only_data_step(&p);
        let Statement::If {
            branches,
            else_body,
            ..
        } = &ds.statements[0]
        else {
            panic!("expected if")
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(else_body.len(), 1);
    }

    #[test]
    fn nested_do_groups() {
        let p = parse_ok(
            "data a; if x then do; if y then do; z = 1; end; w = 2; end; run;",
        );
        let ds = only_data_step(&p);
        let Statement::If { branches, .. } = &ds.statements[0] else {
            panic!("expected if")
        };
        assert_eq!(branches[0].body.len(), 2);
        let Statement::If { branches: inner, .. } = &branches[0].body[0] else {
            panic!("expected nested if")
        };
        assert_eq!(inner[0].body.len(), 1);
    }

    #[test]
    fn drop_keep_rename_retain_output() {
        let p = parse_ok(
            "data a; drop x y; keep z; rename old=new; retain total 0 label 'none' flag; output; run;",
        );
        let ds = only_data_step(&p);
        assert!(matches!(&ds.statements[0], Statement::Drop(v) if v == &["x", "y"]));
        assert!(matches!(&ds.statements[1], Statement::Keep(v) if v == &["z"]));
        assert!(
            matches!(&ds.statements[2], Statement::Rename(v) if v == &[("old".to_owned(), "new".to_owned())])
        );
        let Statement::Retain { vars } = &ds.statements[3] else {
            panic!("expected retain")
        };
        assert_eq!(
            vars,
            &[
                ("total".to_owned(), Some(Value::num(0.0))),
                ("label".to_owned(), Some(Value::Char("none".into()))),
                ("flag".to_owned(), None),
            ]
        );
        assert!(matches!(&ds.statements[4], Statement::Output { targets } if targets.is_empty()));
    }

    #[test]
    fn output_with_targets() {
        let p = parse_ok("data a b; output a; output w.b; run;");
        let ds = only_data_step(&p);
        assert!(
            matches!(&ds.statements[0], Statement::Output { targets } if targets == &["work.a"])
        );
        assert!(matches!(&ds.statements[1], Statement::Output { targets } if targets == &["w.b"]));
    }

    #[test]
    fn where_statement() {
        let p = parse_ok("data a; set b; where age > 20; run;");
        let ds = only_data_step(&p);
        assert!(matches!(&ds.statements[1], Statement::Where(_)));
    }

    #[test]
    fn assignment_to_keyword_named_variable() {
        let p = parse_ok("data a; where = 1; run;");
        let ds = only_data_step(&p);
        assert!(matches!(
            &ds.statements[0],
            Statement::Assign { target, .. } if target == "where"
        ));
    }

    #[test]
    fn proc_header_options() {
        let p = parse_ok("proc means data=w.class noprint out=stats; var age; run;");
        let Step::Proc(proc) = &p.steps[0] else {
            panic!("expected proc")
        };
        assert_eq!(proc.name, "means");
        assert_eq!(proc.data.as_deref(), Some("w.class"));
        assert_eq!(proc.out.as_deref(), Some("work.stats"));
        assert!(proc.noprint);
        assert_eq!(proc.substatements.len(), 1);
        assert_eq!(proc.substatements[0].keyword, "var");
        assert_eq!(proc.substatements[0].args, vec!["age"]);
    }

    #[test]
    fn proc_substatement_args_glue_equals_and_dots() {
        let p = parse_ok("proc means; output out=w.stats mean=avg; run;");
        let Step::Proc(proc) = &p.steps[0] else {
            panic!("expected proc")
        };
        let output = proc.substatement("output").expect("output substatement");
        assert_eq!(output.args, vec!["out=w.stats", "mean=avg"]);
    }

    #[test]
    fn proc_quit_terminator() {
        let p = parse_ok("proc print; quit;");
        assert!(matches!(&p.steps[0], Step::Proc(proc) if proc.name == "print"));
    }

    #[test]
    fn libname_binding() {
        let p = parse_ok("libname mylib '/tmp/data';");
        let Step::Libname(binding) = &p.steps[0] else {
            panic!("expected libname")
        };
        assert_eq!(binding.libref, "mylib");
        assert_eq!(binding.path, "/tmp/data");
    }

    #[test]
    fn unknown_top_level_statement_is_recoverable() {
        let mut diags = Diagnostics::new();
        let p = parse_program(
            &split_statements("frobnicate all; data a; run;"),
            &mut diags,
        );
        assert!(diags.has_errors());
        assert_eq!(p.steps.len(), 1);
    }

    #[test]
    fn bad_data_header_skips_its_body() {
        // One error for the header; the body statements must not each
        // produce their own diagnostic.
        let mut diags = Diagnostics::new();
        let p = parse_program(
            &split_statements("data; x = 1; y = 2; run; data b; z = 3; run;"),
            &mut diags,
        );
        let errors = diags
            .entries()
            .iter()
            .filter(|d| d.severity == crate::error::Severity::Error)
            .count();
        assert_eq!(errors, 1, "diagnostics: {:?}", diags.entries());
        assert_eq!(p.steps.len(), 1);
        let Step::Data(ds) = &p.steps[0] else { panic!() };
        assert_eq!(ds.targets, vec!["work.b".to_owned()]);
    }

    #[test]
    fn unknown_data_statement_is_recoverable() {
        let mut diags = Diagnostics::new();
        let p = parse_program(
            &split_statements("data a; nonsense here; x = 1; run;"),
            &mut diags,
        );
        assert!(diags.has_errors());
        let Step::Data(ds) = &p.steps[0] else { panic!() };
        assert_eq!(ds.statements.len(), 1);
    }

    #[test]
    fn malformed_expression_is_recoverable() {
        let mut diags = Diagnostics::new();
        let p = parse_program(
            &split_statements("data a; y = * 2; z = 1; run;"),
            &mut diags,
        );
        assert!(diags.has_errors());
        let Step::Data(ds) = &p.steps[0] else { panic!() };
        assert_eq!(ds.statements.len(), 1);
    }

    #[test]
    fn qualify_defaults_to_work() {
        assert_eq!(qualify("class"), "work.class");
        assert_eq!(qualify("mylib.class"), "mylib.class");
    }
}
