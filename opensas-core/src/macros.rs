//! Macro preprocessor: textual substitution before parsing.
//!
//! Resolves `%let`, `&name` references, `%macro ... %mend` definitions,
//! `%name(args)` calls, and `%if ... %then ... %else ...` branching. Macro
//! bodies are stored unexpanded and re-expanded on every call, which makes
//! recursion possible; an explicit depth counter bounds it at
//! [`RECURSION_LIMIT`] instead of relying on the native call stack alone.
//!
//! The preprocessor knows nothing about tables or PROC semantics. Text
//! inside single-quoted literals is never touched; `&name` references in
//! double-quoted literals are expanded.
//!
//! Scoping is strictly lexical: a scope is pushed per macro invocation and
//! `&name` resolves innermost-to-outermost. Unresolved references become
//! the empty string with a WARNING; execution continues.

use std::collections::HashMap;

use crate::error::{Diagnostics, ErrorKind, InterpResult, InterpreterError, Severity};
use crate::expr;
use crate::table::Value;
use crate::token::{Lexer, TokenKind};

/// Maximum macro expansion depth.
pub const RECURSION_LIMIT: usize = 50;

// ---------------------------------------------------------------------------
// Preprocessor state
// ---------------------------------------------------------------------------

/// A macro definition: parameter names plus the unexpanded body text.
#[derive(Debug, Clone)]
struct MacroDef {
    params: Vec<String>,
    body: String,
}

/// The macro preprocessor.
pub struct Preprocessor {
    /// Scope stack: `[0]` is the global scope, one frame per active call.
    scopes: Vec<HashMap<String, String>>,
    /// Registered macro definitions.
    macros: HashMap<String, MacroDef>,
}

impl Preprocessor {
    /// Create a preprocessor with an empty global scope.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
            macros: HashMap::new(),
        }
    }

    /// Expand all macro constructs in `source`.
    ///
    /// Recoverable problems (unresolved references) are recorded in
    /// `diags`; malformed macro syntax and runaway recursion are fatal.
    pub fn expand(&mut self, source: &str, diags: &mut Diagnostics) -> InterpResult<String> {
        self.expand_text(source, 0, diags)
    }

    /// Set a macro variable in the current (innermost) scope.
    pub fn set_variable(&mut self, name: &str, value: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_ascii_lowercase(), value.to_owned());
        }
    }

    /// Resolve a macro variable, innermost scope first.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&str> {
        let key = name.to_ascii_lowercase();
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(&key))
            .map(String::as_str)
    }

    // -- core expansion --

    fn expand_text(
        &mut self,
        text: &str,
        depth: usize,
        diags: &mut Diagnostics,
    ) -> InterpResult<String> {
        let mut cur = Cursor::new(text);
        let mut out = String::with_capacity(text.len());

        while let Some(c) = cur.peek() {
            match c {
                '\'' => cur.copy_quoted(&mut out, '\''),
                '"' => {
                    // Expand `&` references inside double quotes.
                    out.push('"');
                    cur.bump();
                    while let Some(qc) = cur.peek() {
                        if qc == '"' {
                            out.push('"');
                            cur.bump();
                            break;
                        }
                        if qc == '&' {
                            self.substitute_reference(&mut cur, &mut out, diags);
                        } else {
                            out.push(qc);
                            cur.bump();
                        }
                    }
                }
                '&' => self.substitute_reference(&mut cur, &mut out, diags),
                '%' => self.directive(&mut cur, &mut out, depth, diags)?,
                _ => {
                    out.push(c);
                    cur.bump();
                }
            }
        }
        Ok(out)
    }

    /// Handle `&name` (with optional trailing `.` delimiter).
    fn substitute_reference(&self, cur: &mut Cursor, out: &mut String, diags: &mut Diagnostics) {
        cur.bump(); // '&'
        let name = cur.take_ident();
        if name.is_empty() {
            out.push('&');
            return;
        }
        // A trailing `.` delimits the reference and is consumed.
        if cur.peek() == Some('.') {
            cur.bump();
        }
        match self.resolve(&name) {
            Some(value) => out.push_str(value),
            None => {
                diags.push(
                    Severity::Warning,
                    format!("apparent symbolic reference &{name} not resolved"),
                    None,
                );
            }
        }
    }

    /// Handle a `%` directive: `%let`, `%macro`, `%if`, or a macro call.
    fn directive(
        &mut self,
        cur: &mut Cursor,
        out: &mut String,
        depth: usize,
        diags: &mut Diagnostics,
    ) -> InterpResult<()> {
        cur.bump(); // '%'
        let word = cur.take_ident();
        match word.as_str() {
            "" => {
                out.push('%');
                Ok(())
            }
            "let" => self.do_let(cur, diags),
            "macro" => self.do_macro_def(cur),
            "mend" => Err(macro_syntax("%mend without a matching %macro")),
            "if" => self.do_if(cur, out, depth, diags),
            "then" | "else" | "do" | "end" => Err(macro_syntax(format!(
                "%{word} outside of a %if construct"
            ))),
            name => self.do_call(name, cur, out, depth, diags),
        }
    }

    /// `%let name = value;`. The value is expanded at %let time.
    fn do_let(&mut self, cur: &mut Cursor, diags: &mut Diagnostics) -> InterpResult<()> {
        cur.skip_whitespace();
        let name = cur.take_ident();
        if name.is_empty() {
            return Err(macro_syntax("%let: expected a variable name"));
        }
        cur.skip_whitespace();
        if cur.peek() != Some('=') {
            return Err(macro_syntax(format!("%let {name}: expected `=`")));
        }
        cur.bump();
        let raw = cur.take_until_semicolon()?;
        let value = self.expand_text(raw.trim(), 0, diags)?;
        self.set_variable(&name, value.trim());
        Ok(())
    }

    /// `%macro name(p1, p2); body %mend;`. The body is stored verbatim.
    fn do_macro_def(&mut self, cur: &mut Cursor) -> InterpResult<()> {
        cur.skip_whitespace();
        let name = cur.take_ident();
        if name.is_empty() {
            return Err(macro_syntax("%macro: expected a macro name"));
        }
        cur.skip_whitespace();
        let mut params = Vec::new();
        if cur.peek() == Some('(') {
            cur.bump();
            loop {
                cur.skip_whitespace();
                let param = cur.take_ident();
                if !param.is_empty() {
                    params.push(param);
                }
                cur.skip_whitespace();
                match cur.peek() {
                    Some(',') => {
                        cur.bump();
                    }
                    Some(')') => {
                        cur.bump();
                        break;
                    }
                    _ => return Err(macro_syntax(format!("%macro {name}: malformed parameter list"))),
                }
            }
        }
        cur.skip_whitespace();
        if cur.peek() == Some(';') {
            cur.bump();
        }
        let body = cur.take_macro_body(&name)?;
        self.macros.insert(name, MacroDef { params, body });
        Ok(())
    }

    /// `%if cond %then branch [%else branch]`. Only the taken branch is
    /// expanded and emitted.
    fn do_if(
        &mut self,
        cur: &mut Cursor,
        out: &mut String,
        depth: usize,
        diags: &mut Diagnostics,
    ) -> InterpResult<()> {
        let cond_raw = cur.take_until_directive("then")?;
        let cond_text = self.expand_text(cond_raw.trim(), depth, diags)?;
        let truth = self.condition_holds(&cond_text, diags);

        let then_branch = cur.take_branch()?;

        // Optional %else.
        let mut else_branch = None;
        let mark = cur.pos;
        cur.skip_whitespace();
        if cur.peek() == Some('%') {
            cur.bump();
            if cur.take_ident() == "else" {
                else_branch = Some(cur.take_branch()?);
            }
        }
        if else_branch.is_none() {
            cur.pos = mark;
        }

        let taken = if truth {
            Some(then_branch)
        } else {
            else_branch
        };
        if let Some(branch) = taken {
            let expanded = self.expand_text(&branch, depth, diags)?;
            out.push_str(&expanded);
        }
        Ok(())
    }

    /// Evaluate a macro condition over already-expanded text.
    ///
    /// Words that are not operators are treated as string literals, so
    /// `&name = bob` compares as strings after substitution. An
    /// unevaluable condition is a WARNING and counts as false.
    fn condition_holds(&self, cond: &str, diags: &mut Diagnostics) -> bool {
        const WORD_OPS: [&str; 9] = ["and", "or", "not", "eq", "ne", "lt", "le", "gt", "ge"];
        let mut tokens = Lexer::tokenize(cond);
        for tok in &mut tokens {
            if let TokenKind::Ident(word) = &tok.kind {
                if !WORD_OPS.contains(&word.as_str()) {
                    tok.kind = TokenKind::Str(word.clone());
                }
            }
        }
        let parsed = match expr::parse_expression(&tokens) {
            Ok(e) => e,
            Err(err) => {
                diags.push(
                    Severity::Warning,
                    format!("cannot parse macro condition `{cond}`: {}", err.message),
                    None,
                );
                return false;
            }
        };
        let ctx: HashMap<String, Value> = HashMap::new();
        match expr::evaluate(&parsed, &ctx, &expr::FunctionTable::standard()) {
            Ok(v) => v.is_truthy(),
            Err(err) => {
                diags.push(
                    Severity::Warning,
                    format!("cannot evaluate macro condition `{cond}`: {}", err.message),
                    None,
                );
                false
            }
        }
    }

    /// `%name(args)`: expand a macro call.
    fn do_call(
        &mut self,
        name: &str,
        cur: &mut Cursor,
        out: &mut String,
        depth: usize,
        diags: &mut Diagnostics,
    ) -> InterpResult<()> {
        // The argument list is consumed whether or not the macro resolves.
        let mut raw_args = Vec::new();
        if cur.peek() == Some('(') {
            raw_args = cur.take_call_args()?;
        }

        let Some(def) = self.macros.get(name).cloned() else {
            diags.push(
                Severity::Warning,
                format!("apparent macro invocation %{name} not resolved"),
                None,
            );
            return Ok(());
        };

        if depth + 1 > RECURSION_LIMIT {
            return Err(InterpreterError::new(
                ErrorKind::MacroRecursionLimit,
                format!("macro %{name} exceeded the expansion depth limit of {RECURSION_LIMIT}"),
            ));
        }

        // Arguments are expanded before the parameter scope is pushed.
        let mut args = Vec::with_capacity(raw_args.len());
        for raw in raw_args {
            args.push(self.expand_text(raw.trim(), depth, diags)?);
        }

        let mut scope = HashMap::new();
        for (i, param) in def.params.iter().enumerate() {
            let value = args.get(i).cloned().unwrap_or_default();
            scope.insert(param.to_ascii_lowercase(), value);
        }

        self.scopes.push(scope);
        let result = self.expand_text(&def.body, depth + 1, diags);
        self.scopes.pop();

        out.push_str(&result?);
        Ok(())
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

fn macro_syntax(message: impl Into<String>) -> InterpreterError {
    InterpreterError::new(ErrorKind::MacroSyntax, message)
}

// ---------------------------------------------------------------------------
// Text cursor
// ---------------------------------------------------------------------------

/// A character cursor over macro text.
struct Cursor {
    chars: Vec<char>,
    pos: usize,
}

impl Cursor {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    /// Take an identifier `[A-Za-z_][A-Za-z0-9_]*`, lowercased.
    fn take_ident(&mut self) -> String {
        let mut out = String::new();
        if matches!(self.peek(), Some(c) if c.is_ascii_alphabetic() || c == '_') {
            while let Some(c) = self.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    out.push(c.to_ascii_lowercase());
                    self.bump();
                } else {
                    break;
                }
            }
        }
        out
    }

    /// Copy a quoted literal verbatim, including the quotes.
    fn copy_quoted(&mut self, out: &mut String, quote: char) {
        out.push(quote);
        self.bump();
        while let Some(c) = self.peek() {
            out.push(c);
            self.bump();
            if c == quote {
                return;
            }
        }
    }

    /// Take raw text up to (consuming) the next top-level `;`.
    fn take_until_semicolon(&mut self) -> InterpResult<String> {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c == ';' {
                self.bump();
                return Ok(out);
            }
            if c == '\'' || c == '"' {
                self.copy_quoted(&mut out, c);
                continue;
            }
            out.push(c);
            self.bump();
        }
        Err(macro_syntax("unterminated statement: expected `;`"))
    }

    /// Take raw text up to (consuming) the `%word` directive.
    fn take_until_directive(&mut self, word: &str) -> InterpResult<String> {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c == '\'' || c == '"' {
                self.copy_quoted(&mut out, c);
                continue;
            }
            if c == '%' {
                let mark = self.pos;
                self.bump();
                let name = self.take_ident();
                if name == word {
                    return Ok(out);
                }
                self.pos = mark;
                out.push('%');
                self.bump();
                continue;
            }
            out.push(c);
            self.bump();
        }
        Err(macro_syntax(format!("expected %{word}")))
    }

    /// Take a `%then`/`%else` branch: either a `%do ... %end;` block or
    /// bare text up to and including the next `;`.
    fn take_branch(&mut self) -> InterpResult<String> {
        self.skip_whitespace();
        let mark = self.pos;
        if self.peek() == Some('%') {
            self.bump();
            if self.take_ident() == "do" {
                // Optional `;` after %do.
                self.skip_whitespace();
                if self.peek() == Some(';') {
                    self.bump();
                }
                let body = self.take_do_body()?;
                // Optional `;` after %end.
                self.skip_whitespace();
                if self.peek() == Some(';') {
                    self.bump();
                }
                return Ok(body);
            }
            self.pos = mark;
        }
        let mut text = self.take_until_semicolon()?;
        text.push(';');
        Ok(text)
    }

    /// Take text up to the matching `%end`, tracking nested `%do` blocks.
    fn take_do_body(&mut self) -> InterpResult<String> {
        let mut out = String::new();
        let mut nesting = 0usize;
        while let Some(c) = self.peek() {
            if c == '\'' || c == '"' {
                self.copy_quoted(&mut out, c);
                continue;
            }
            if c == '%' {
                let mark = self.pos;
                self.bump();
                let name = self.take_ident();
                match name.as_str() {
                    "do" => {
                        nesting += 1;
                        out.push_str("%do");
                        continue;
                    }
                    "end" => {
                        if nesting == 0 {
                            return Ok(out);
                        }
                        nesting -= 1;
                        out.push_str("%end");
                        continue;
                    }
                    _ => {
                        self.pos = mark;
                        out.push('%');
                        self.bump();
                        continue;
                    }
                }
            }
            out.push(c);
            self.bump();
        }
        Err(macro_syntax("unterminated %do block: expected %end"))
    }

    /// Take the body of a `%macro` definition up to the matching `%mend`,
    /// tracking nested definitions. Consumes an optional trailing name
    /// and `;` after `%mend`.
    fn take_macro_body(&mut self, name: &str) -> InterpResult<String> {
        let mut out = String::new();
        let mut nesting = 0usize;
        while let Some(c) = self.peek() {
            if c == '\'' || c == '"' {
                self.copy_quoted(&mut out, c);
                continue;
            }
            if c == '%' {
                let mark = self.pos;
                self.bump();
                let word = self.take_ident();
                match word.as_str() {
                    "macro" => {
                        nesting += 1;
                        out.push_str("%macro");
                        continue;
                    }
                    "mend" => {
                        if nesting == 0 {
                            self.skip_whitespace();
                            let _ = self.take_ident(); // optional name echo
                            self.skip_whitespace();
                            if self.peek() == Some(';') {
                                self.bump();
                            }
                            return Ok(out);
                        }
                        nesting -= 1;
                        out.push_str("%mend");
                        continue;
                    }
                    _ => {
                        self.pos = mark;
                        out.push('%');
                        self.bump();
                        continue;
                    }
                }
            }
            out.push(c);
            self.bump();
        }
        Err(macro_syntax(format!(
            "%macro {name}: unterminated definition, expected %mend"
        )))
    }

    /// Take the raw arguments of a call: `(a, b(c,d), e)` → `["a", "b(c,d)", "e"]`.
    ///
    /// Commas split only at parenthesis depth zero.
    fn take_call_args(&mut self) -> InterpResult<Vec<String>> {
        debug_assert_eq!(self.peek(), Some('('));
        self.bump();
        let mut args = Vec::new();
        let mut current = String::new();
        let mut paren_depth = 0usize;
        while let Some(c) = self.peek() {
            match c {
                '\'' | '"' => {
                    self.copy_quoted(&mut current, c);
                    continue;
                }
                '(' => {
                    paren_depth += 1;
                    current.push(c);
                }
                ')' => {
                    if paren_depth == 0 {
                        self.bump();
                        args.push(current);
                        return Ok(args);
                    }
                    paren_depth -= 1;
                    current.push(c);
                }
                ',' if paren_depth == 0 => {
                    args.push(std::mem::take(&mut current));
                }
                _ => current.push(c),
            }
            self.bump();
        }
        Err(macro_syntax("unterminated macro call: expected `)`"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn expand_ok(source: &str) -> (String, Diagnostics) {
        let mut pre = Preprocessor::new();
        let mut diags = Diagnostics::new();
        let out = pre.expand(source, &mut diags).expect("expand");
        (out, diags)
    }

    fn expand_fatal(source: &str) -> InterpreterError {
        let mut pre = Preprocessor::new();
        let mut diags = Diagnostics::new();
        pre.expand(source, &mut diags).unwrap_err()
    }

    // -- %let and references --

    #[test]
    fn let_and_reference() {
        let (out, diags) = expand_ok("%let cutoff = 21; where age > &cutoff;");
        assert_eq!(out.trim(), "where age > 21;");
        assert!(!diags.has_errors());
    }

    #[test]
    fn reference_with_dot_delimiter() {
        let (out, _) = expand_ok("%let lib = work; set &lib..class;");
        assert_eq!(out.trim(), "set work.class;");
    }

    #[test]
    fn let_value_is_expanded_at_let_time() {
        let (out, _) = expand_ok("%let a = 1; %let b = &a + 1; x = &b;");
        assert_eq!(out.trim(), "x = 1 + 1;");
    }

    #[test]
    fn unresolved_reference_warns_and_becomes_empty() {
        let (out, diags) = expand_ok("x = &nosuch;");
        assert_eq!(out.trim(), "x = ;");
        assert!(diags
            .entries()
            .iter()
            .any(|d| d.severity == Severity::Warning && d.message.contains("&nosuch")));
    }

    #[test]
    fn single_quotes_are_opaque() {
        let (out, diags) = expand_ok("%let x = 1; msg = '&x';");
        assert_eq!(out.trim(), "msg = '&x';");
        assert!(diags.entries().is_empty());
    }

    #[test]
    fn double_quotes_expand() {
        let (out, _) = expand_ok("%let x = 1; msg = \"v=&x\";");
        assert_eq!(out.trim(), "msg = \"v=1\";");
    }

    #[test]
    fn expansion_is_idempotent_on_plain_text() {
        let source = "data a; set b; y = x * 2; run;";
        let (once, _) = expand_ok(source);
        let (twice, _) = expand_ok(&once);
        assert_eq!(once, source);
        assert_eq!(twice, once);
    }

    // -- macro definitions and calls --

    #[test]
    fn simple_macro_call() {
        let (out, _) = expand_ok("%macro double(x); y = &x * 2; %mend; %double(7)");
        assert_eq!(out.trim(), "y = 7 * 2;");
    }

    #[test]
    fn macro_without_params() {
        let (out, _) = expand_ok("%macro header; data out; %mend header; %header");
        assert_eq!(out.trim(), "data out;");
    }

    #[test]
    fn parameters_are_scoped_to_the_call() {
        // After the call, &x must no longer resolve.
        let (out, diags) = expand_ok("%macro m(x); a = &x; %mend; %m(1) b = &x;");
        assert_eq!(out.split_whitespace().collect::<Vec<_>>(), vec![
            "a", "=", "1;", "b", "=", ";"
        ]);
        assert!(diags
            .entries()
            .iter()
            .any(|d| d.message.contains("&x")));
    }

    #[test]
    fn inner_scope_wins() {
        let (out, _) =
            expand_ok("%let x = outer; %macro m(x); v = &x; %mend; %m(inner) w = &x;");
        assert!(out.contains("v = inner;"), "{out}");
        assert!(out.contains("w = outer;"), "{out}");
    }

    #[test]
    fn arguments_are_expanded_before_binding() {
        let (out, _) = expand_ok("%let n = 5; %macro m(v); x = &v; %mend; %m(&n)");
        assert_eq!(out.trim(), "x = 5;");
    }

    #[test]
    fn nested_calls() {
        let (out, _) = expand_ok(
            "%macro inner(a); &a + 1 %mend; %macro outer(b); x = %inner(&b); %mend; %outer(2)",
        );
        assert_eq!(
            out.split_whitespace().collect::<Vec<_>>(),
            vec!["x", "=", "2", "+", "1", ";"]
        );
    }

    #[test]
    fn recursion_limit_is_fatal() {
        let err = expand_fatal("%macro loop; %loop %mend; %loop");
        assert_eq!(err.kind, ErrorKind::MacroRecursionLimit);
    }

    #[test]
    fn unterminated_macro_is_fatal() {
        let err = expand_fatal("%macro broken; x = 1;");
        assert_eq!(err.kind, ErrorKind::MacroSyntax);
    }

    #[test]
    fn stray_mend_is_fatal() {
        let err = expand_fatal("%mend;");
        assert_eq!(err.kind, ErrorKind::MacroSyntax);
    }

    #[test]
    fn unknown_call_warns() {
        let (out, diags) = expand_ok("%nosuch(1)");
        assert_eq!(out.trim(), "");
        assert!(diags
            .entries()
            .iter()
            .any(|d| d.message.contains("%nosuch")));
    }

    // -- %if --

    #[test]
    fn if_true_takes_then_branch() {
        let (out, _) = expand_ok("%let flag = 1; %if &flag = 1 %then %do; x = 1; %end;");
        assert_eq!(out.trim(), "x = 1;");
    }

    #[test]
    fn if_false_takes_else_branch() {
        let (out, _) = expand_ok(
            "%let flag = 0; %if &flag = 1 %then %do; x = 1; %end; %else %do; x = 2; %end;",
        );
        assert_eq!(out.trim(), "x = 2;");
    }

    #[test]
    fn if_false_without_else_emits_nothing() {
        let (out, _) = expand_ok("%if 0 %then %do; x = 1; %end;");
        assert_eq!(out.trim(), "");
    }

    #[test]
    fn if_with_bare_branches() {
        let (out, _) = expand_ok("%let v = 2; %if &v > 1 %then y = 10; %else y = 20;");
        assert_eq!(out.trim(), "y = 10;");
    }

    #[test]
    fn if_compares_words_as_strings() {
        let (out, _) =
            expand_ok("%let name = bob; %if &name = bob %then %do; hit = 1; %end;");
        assert_eq!(out.trim(), "hit = 1;");
    }

    #[test]
    fn if_inside_macro_body() {
        let (out, _) = expand_ok(
            "%macro pick(n); %if &n > 0 %then %do; sign = 1; %end; %else %do; sign = -1; %end; %mend; %pick(-3)",
        );
        assert_eq!(out.trim(), "sign = -1;");
    }

    #[test]
    fn unterminated_do_is_fatal() {
        let err = expand_fatal("%if 1 %then %do; x = 1;");
        assert_eq!(err.kind, ErrorKind::MacroSyntax);
    }

    #[test]
    fn stray_end_is_fatal() {
        let err = expand_fatal("%end;");
        assert_eq!(err.kind, ErrorKind::MacroSyntax);
    }
}
