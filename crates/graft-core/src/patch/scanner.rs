//! Structural scanner for host compiler source files.
//!
//! Patch rules anchor on structure: top-level declarations, function
//! bodies, statement boundaries, call sites. The scanner tokenizes just
//! enough JavaScript to locate those anchors reliably; string literals,
//! template literals, and comments are consumed whole so their contents
//! can never be mistaken for structure.

use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokKind {
    Ident,
    LBrace,
    RBrace,
    LParen,
    RParen,
    Semi,
    Comma,
    Str,
    Punct,
}

#[derive(Debug, Clone)]
pub struct Tok {
    pub kind: TokKind,
    pub span: Range<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Function,
    Variable,
}

/// A top-level `function` or `var`/`const`/`let` declaration.
#[derive(Debug, Clone)]
pub struct TopLevelDecl {
    pub kind: DeclKind,
    pub name: String,
    /// Source span of the whole declaration.
    pub span: Range<usize>,
}

/// A named function declaration located anywhere in the file.
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    /// Span of the name identifier.
    pub name_span: Range<usize>,
    /// Source span between the parameter-list parentheses.
    pub params: Range<usize>,
    /// Source span between the body braces.
    pub body: Range<usize>,
    /// Span of the whole declaration, `function` through closing brace.
    pub span: Range<usize>,
    /// Token indices of the body contents.
    body_toks: Range<usize>,
}

/// One call site of a named function.
#[derive(Debug, Clone)]
pub struct CallSite {
    /// Span of the callee identifier.
    pub callee: Range<usize>,
    /// Source span between the argument parentheses.
    pub args: Range<usize>,
}

pub struct Scanner<'a> {
    src: &'a str,
    toks: Vec<Tok>,
}

impl<'a> Scanner<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            toks: tokenize(src),
        }
    }

    pub fn text(&self, span: &Range<usize>) -> &'a str {
        &self.src[span.clone()]
    }

    fn tok_text(&self, idx: usize) -> &'a str {
        &self.src[self.toks[idx].span.clone()]
    }

    fn is_ident(&self, idx: usize, word: &str) -> bool {
        self.toks
            .get(idx)
            .is_some_and(|t| t.kind == TokKind::Ident && &self.src[t.span.clone()] == word)
    }

    fn kind(&self, idx: usize) -> Option<TokKind> {
        self.toks.get(idx).map(|t| t.kind)
    }

    /// Token index of the brace matching the opener at `open_idx`.
    fn matching_brace(&self, open_idx: usize) -> Option<usize> {
        let mut depth = 0i32;
        for (offset, tok) in self.toks[open_idx..].iter().enumerate() {
            match tok.kind {
                TokKind::LBrace => depth += 1,
                TokKind::RBrace => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(open_idx + offset);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Token index of the parenthesis matching the opener at `open_idx`.
    fn matching_paren(&self, open_idx: usize) -> Option<usize> {
        let mut depth = 0i32;
        for (offset, tok) in self.toks[open_idx..].iter().enumerate() {
            match tok.kind {
                TokKind::LParen => depth += 1,
                TokKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(open_idx + offset);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Find a named `function` declaration at any nesting depth.
    pub fn find_function(&self, name: &str) -> Option<FunctionDecl> {
        for i in 0..self.toks.len() {
            if !self.is_ident(i, "function") || !self.is_ident(i + 1, name) {
                continue;
            }
            if self.kind(i + 2) != Some(TokKind::LParen) {
                continue;
            }
            let close_paren = self.matching_paren(i + 2)?;
            if self.kind(close_paren + 1) != Some(TokKind::LBrace) {
                continue;
            }
            let close_brace = self.matching_brace(close_paren + 1)?;

            return Some(FunctionDecl {
                name_span: self.toks[i + 1].span.clone(),
                params: self.toks[i + 2].span.end..self.toks[close_paren].span.start,
                body: self.toks[close_paren + 1].span.end..self.toks[close_brace].span.start,
                span: self.toks[i].span.start..self.toks[close_brace].span.end,
                body_toks: close_paren + 2..close_brace,
            });
        }
        None
    }

    /// Top-level function and variable declarations, in source order.
    pub fn top_level_decls(&self) -> Vec<TopLevelDecl> {
        let mut decls = Vec::new();
        let mut depth = 0i32;
        let mut i = 0;

        while i < self.toks.len() {
            match self.toks[i].kind {
                TokKind::LBrace | TokKind::LParen => {
                    depth += 1;
                    i += 1;
                }
                TokKind::RBrace | TokKind::RParen => {
                    depth -= 1;
                    i += 1;
                }
                TokKind::Ident if depth == 0 => {
                    let word = self.tok_text(i);
                    if word == "function"
                        && self.kind(i + 1) == Some(TokKind::Ident)
                        && self.kind(i + 2) == Some(TokKind::LParen)
                    {
                        if let Some(end) = self
                            .matching_paren(i + 2)
                            .filter(|&cp| self.kind(cp + 1) == Some(TokKind::LBrace))
                            .and_then(|cp| self.matching_brace(cp + 1))
                        {
                            decls.push(TopLevelDecl {
                                kind: DeclKind::Function,
                                name: self.tok_text(i + 1).to_string(),
                                span: self.toks[i].span.start..self.toks[end].span.end,
                            });
                            i = end + 1;
                            continue;
                        }
                        i += 1;
                    } else if matches!(word, "var" | "const" | "let")
                        && self.kind(i + 1) == Some(TokKind::Ident)
                    {
                        let end = self.statement_end(i);
                        decls.push(TopLevelDecl {
                            kind: DeclKind::Variable,
                            name: self.tok_text(i + 1).to_string(),
                            span: self.toks[i].span.start..self.toks[end].span.end,
                        });
                        i = end + 1;
                    } else {
                        i += 1;
                    }
                }
                _ => i += 1,
            }
        }
        decls
    }

    /// Token index of the semicolon ending the statement starting at `start`.
    /// Falls back to the last token of the initializer when no semicolon is
    /// present.
    fn statement_end(&self, start: usize) -> usize {
        let mut depth = 0i32;
        for i in start..self.toks.len() {
            match self.toks[i].kind {
                TokKind::LBrace | TokKind::LParen => depth += 1,
                TokKind::RBrace | TokKind::RParen => depth -= 1,
                TokKind::Semi if depth == 0 => return i,
                _ => {}
            }
        }
        self.toks.len() - 1
    }

    /// Direct statements of a function body, as source spans.
    ///
    /// A statement ends at a semicolon at body depth, or at the closing
    /// brace of a block opened at body depth. That is coarse but exact
    /// enough for anchor-prefix matching and `return` rewriting.
    pub fn statements_in(&self, function: &FunctionDecl) -> Vec<Range<usize>> {
        let mut stmts = Vec::new();
        let mut depth = 0i32;
        let mut start: Option<usize> = None;

        for i in function.body_toks.clone() {
            match self.toks[i].kind {
                TokKind::LBrace | TokKind::LParen => {
                    if depth == 0 && start.is_none() {
                        start = Some(i);
                    }
                    depth += 1;
                }
                TokKind::RBrace => {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(s) = start.take() {
                            stmts.push(self.toks[s].span.start..self.toks[i].span.end);
                        }
                    }
                }
                TokKind::RParen => depth -= 1,
                TokKind::Semi if depth == 0 => {
                    if let Some(s) = start.take() {
                        stmts.push(self.toks[s].span.start..self.toks[i].span.end);
                    }
                }
                _ => {
                    if depth == 0 && start.is_none() {
                        start = Some(i);
                    }
                }
            }
        }
        if let Some(s) = start {
            let last = function.body_toks.end - 1;
            stmts.push(self.toks[s].span.start..self.toks[last].span.end);
        }
        stmts
    }

    /// Direct `return` statements of a function body.
    pub fn return_statements(&self, function: &FunctionDecl) -> Vec<Range<usize>> {
        self.statements_in(function)
            .into_iter()
            .filter(|span| {
                let rest = self.text(span).trim_start();
                rest.strip_prefix("return")
                    .is_some_and(|after| !after.as_bytes().first().copied().is_some_and(is_ident_continue))
            })
            .collect()
    }

    /// Call sites of `name`, excluding the declaration itself and property
    /// accesses (`obj.name(...)`).
    pub fn call_sites(&self, name: &str) -> Vec<CallSite> {
        let mut sites = Vec::new();
        for i in 0..self.toks.len() {
            if !self.is_ident(i, name) || self.kind(i + 1) != Some(TokKind::LParen) {
                continue;
            }
            if i > 0 {
                let prev = &self.toks[i - 1];
                if prev.kind == TokKind::Ident && self.tok_text(i - 1) == "function" {
                    continue;
                }
                if prev.kind == TokKind::Punct && self.text(&prev.span) == "." {
                    continue;
                }
            }
            if let Some(close) = self.matching_paren(i + 1) {
                sites.push(CallSite {
                    callee: self.toks[i].span.clone(),
                    args: self.toks[i + 1].span.end..self.toks[close].span.start,
                });
            }
        }
        sites
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

fn tokenize(src: &str) -> Vec<Tok> {
    let bytes = src.as_bytes();
    let mut toks = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b' ' | b'\t' | b'\r' | b'\n' => i += 1,
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let mut j = i + 2;
                while j + 1 < bytes.len() && !(bytes[j] == b'*' && bytes[j + 1] == b'/') {
                    j += 1;
                }
                i = (j + 2).min(bytes.len());
            }
            b'"' | b'\'' => {
                let end = scan_string(bytes, i, b);
                toks.push(Tok {
                    kind: TokKind::Str,
                    span: i..end,
                });
                i = end;
            }
            b'`' => {
                let end = scan_template(bytes, i);
                toks.push(Tok {
                    kind: TokKind::Str,
                    span: i..end,
                });
                i = end;
            }
            b'{' => {
                toks.push(tok(TokKind::LBrace, i));
                i += 1;
            }
            b'}' => {
                toks.push(tok(TokKind::RBrace, i));
                i += 1;
            }
            b'(' => {
                toks.push(tok(TokKind::LParen, i));
                i += 1;
            }
            b')' => {
                toks.push(tok(TokKind::RParen, i));
                i += 1;
            }
            b';' => {
                toks.push(tok(TokKind::Semi, i));
                i += 1;
            }
            b',' => {
                toks.push(tok(TokKind::Comma, i));
                i += 1;
            }
            _ if is_ident_start(b) => {
                let mut j = i + 1;
                while j < bytes.len() && is_ident_continue(bytes[j]) {
                    j += 1;
                }
                toks.push(Tok {
                    kind: TokKind::Ident,
                    span: i..j,
                });
                i = j;
            }
            _ if b.is_ascii_digit() => {
                let mut j = i + 1;
                while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'.') {
                    j += 1;
                }
                toks.push(Tok {
                    kind: TokKind::Punct,
                    span: i..j,
                });
                i = j;
            }
            _ => {
                toks.push(tok(TokKind::Punct, i));
                i += 1;
            }
        }
    }
    toks
}

fn tok(kind: TokKind, pos: usize) -> Tok {
    Tok {
        kind,
        span: pos..pos + 1,
    }
}

/// End position (exclusive) of a quoted string starting at `start`.
fn scan_string(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return i + 1,
            b'\n' => return i + 1, // unterminated; never scan past the line
            _ => i += 1,
        }
    }
    bytes.len()
}

/// End position (exclusive) of a template literal starting at `start`,
/// including `${}` interpolations with nested braces and strings.
fn scan_template(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'`' => return i + 1,
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                let mut depth = 1;
                i += 2;
                while i < bytes.len() && depth > 0 {
                    match bytes[i] {
                        b'{' => {
                            depth += 1;
                            i += 1;
                        }
                        b'}' => {
                            depth -= 1;
                            i += 1;
                        }
                        b'"' | b'\'' => i = scan_string(bytes, i, bytes[i]),
                        b'`' => i = scan_template(bytes, i),
                        _ => i += 1,
                    }
                }
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn test_strings_and_comments_are_opaque() {
        let src = indoc! {r#"
            // function ignored() {}
            var message = "function notReal() {";
            /* var ghost = 1; */
            var real = `template ${nested("){")} end`;
        "#};
        let scanner = Scanner::new(src);
        let decls = scanner.top_level_decls();

        let names: Vec<_> = decls.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["message", "real"]);
        assert!(scanner.find_function("ignored").is_none());
        assert!(scanner.find_function("notReal").is_none());
    }

    #[test]
    fn test_find_function_nested() {
        let src = indoc! {r#"
            var ts = (function () {
                function createProgram(rootNames, options) {
                    return { rootNames: rootNames, options: options };
                }
                return { createProgram: createProgram };
            })();
        "#};
        let scanner = Scanner::new(src);
        let f = scanner.find_function("createProgram").unwrap();

        assert_eq!(scanner.text(&f.name_span), "createProgram");
        assert_eq!(scanner.text(&f.params).trim(), "rootNames, options");
        assert!(scanner.text(&f.body).contains("return"));
    }

    #[test]
    fn test_top_level_decls() {
        let src = indoc! {r#"
            var ts = {};
            function parse(text) { return text; }
            const LIMIT = 10;
            helper();
            let cache = new Map();
        "#};
        let scanner = Scanner::new(src);
        let decls = scanner.top_level_decls();

        let names: Vec<_> = decls.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["ts", "parse", "LIMIT", "cache"]);
        assert_eq!(decls[1].kind, DeclKind::Function);
        assert_eq!(decls[0].kind, DeclKind::Variable);
    }

    #[test]
    fn test_statements_and_returns() {
        let src = indoc! {r#"
            function emit(program) {
                var result = program.emit();
                var diagnostics = result.diagnostics.concat(extra);
                if (result.skipped) { bail(); }
                return { result: result, diagnostics: diagnostics };
            }
        "#};
        let scanner = Scanner::new(src);
        let f = scanner.find_function("emit").unwrap();
        let stmts = scanner.statements_in(&f);

        assert!(scanner.text(&stmts[0]).starts_with("var result"));
        assert!(scanner.text(&stmts[1]).starts_with("var diagnostics"));

        let returns = scanner.return_statements(&f);
        assert_eq!(returns.len(), 1);
        assert!(scanner.text(&returns[0]).starts_with("return {"));
    }

    #[test]
    fn test_call_sites_exclude_declaration_and_members() {
        let src = indoc! {r#"
            function createSourceFile(name, text) { return parse(name, text); }
            var a = createSourceFile("a.ts", "");
            var b = host.createSourceFile("b.ts", "");
            var c = createSourceFile();
        "#};
        let scanner = Scanner::new(src);
        let sites = scanner.call_sites("createSourceFile");

        assert_eq!(sites.len(), 2);
        assert_eq!(scanner.text(&sites[0].args), r#""a.ts", """#);
        assert_eq!(scanner.text(&sites[1].args), "");
    }
}
