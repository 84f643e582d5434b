//! Module Outline
//!
//! Top-level view of a preview module that the rewriter and locator work from:
//! import statements, export keywords to strip, classified entry-point
//! declarations, top-level bindings, and referenced component names.
//!
//! The outline is built from the oxc AST. Sources oxc rejects fall back to a
//! line-oriented lexical scan that recognises the same shapes at column 0.

use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use oxc_ast::ast::{self, BindingPattern, ExportDefaultDeclarationKind, Expression, Statement};
use oxc_ast_visit::Visit;
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};
use regex::Regex;
use std::collections::BTreeSet;

use crate::locator::{Declaration, DeclarationKind, SourceHints};

/// Binding introduced for an anonymous default export.
pub const SYNTHETIC_DEFAULT: &str = "__PreviewDefault";

// ═══════════════════════════════════════════════════════════════════════════════
// TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Syntax,
    Lexical,
}

/// Byte range `[start, end)` into the outlined text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
}

impl TextSpan {
    pub fn new(start: usize, end: usize) -> Self {
        TextSpan { start, end }
    }
}

impl From<Span> for TextSpan {
    fn from(span: Span) -> Self {
        TextSpan::new(span.start as usize, span.end as usize)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub span: TextSpan,
    pub replacement: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Function,
    Variable,
    Class,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopLevelBinding {
    pub name: String,
    pub kind: BindingKind,
    /// Whole declaring statement, `export` keywords included.
    pub statement: TextSpan,
    /// False when the statement declares other names too (`const a = 1, B = 2`).
    pub sole: bool,
}

#[derive(Debug, Clone)]
pub struct ModuleOutline {
    pub strategy: Strategy,
    pub imports: Vec<TextSpan>,
    pub export_edits: Vec<Edit>,
    pub declarations: Vec<Declaration>,
    pub bindings: Vec<TopLevelBinding>,
    /// Capitalised identifiers the module reads, JSX tag names included.
    pub references: BTreeSet<String>,
    /// Every name the module binds, at any depth.
    pub local_names: BTreeSet<String>,
}

impl ModuleOutline {
    /// Syntax outline when the source parses, lexical otherwise.
    pub fn of(text: &str) -> Self {
        match Self::syntax(text) {
            Some(outline) => outline,
            None => {
                tracing::debug!(target: "preview", "source did not parse; using lexical outline");
                Self::lexical(text)
            }
        }
    }

    pub fn syntax(text: &str) -> Option<Self> {
        let allocator = Allocator::default();
        let source_type = SourceType::default()
            .with_module(true)
            .with_typescript(true)
            .with_jsx(true);
        let ret = Parser::new(&allocator, text, source_type).parse();
        if !ret.errors.is_empty() {
            return None;
        }

        let mut builder = OutlineBuilder::new(text);
        for stmt in &ret.program.body {
            builder.statement(stmt);
        }

        let mut collector = ReferenceCollector::default();
        collector.visit_program(&ret.program);

        Some(builder.finish(Strategy::Syntax, collector.references, collector.bindings))
    }

    pub fn lexical(text: &str) -> Self {
        let mut builder = OutlineBuilder::new(text);

        for caps in LEX_BINDING_RE.captures_iter(text) {
            let (Some(whole), Some(keyword), Some(name)) = (caps.get(0), caps.get(1), caps.get(2)) else {
                continue;
            };
            let kind = if keyword.as_str().contains("function") {
                BindingKind::Function
            } else if keyword.as_str().starts_with("class") {
                BindingKind::Class
            } else {
                BindingKind::Variable
            };
            let statement = TextSpan::new(whole.start(), statement_end(text, whole.start()));
            builder.bind(name.as_str(), kind, statement, true);
            if kind == BindingKind::Function && !whole.as_str().contains("default") {
                builder.declare(DeclarationKind::TopLevelFunction, name.as_str(), whole.start());
            }
        }

        for caps in LEX_DEFAULT_NAMED_RE.captures_iter(text) {
            if let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) {
                builder.declare(DeclarationKind::DefaultFunction, name.as_str(), whole.start());
            }
        }

        for caps in LEX_DEFAULT_IDENT_RE.captures_iter(text) {
            if let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) {
                if !is_reserved(name.as_str()) {
                    builder
                        .default_idents
                        .push((name.as_str().to_string(), whole.start()));
                }
            }
        }

        for m in LEX_DEFAULT_ANY_RE.find_iter(text) {
            let named = builder.declarations.iter().any(|d| d.offset == m.start())
                || builder.default_idents.iter().any(|(_, offset)| *offset == m.start());
            if !named {
                let statement = TextSpan::new(m.start(), statement_end(text, m.start()));
                builder.bind(SYNTHETIC_DEFAULT, BindingKind::Variable, statement, true);
                builder.declare(DeclarationKind::DefaultConst, SYNTHETIC_DEFAULT, m.start());
            }
        }

        for caps in LEX_CONST_FN_RE.captures_iter(text) {
            if let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) {
                builder.declare(DeclarationKind::TopLevelConst, name.as_str(), whole.start());
            }
        }

        let references = LEX_JSX_TAG_RE
            .captures_iter(text)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect();

        let mut outline = builder.finish(Strategy::Lexical, references, BTreeSet::new());
        outline.declarations.sort_by_key(|d| d.offset);
        outline.local_names = outline.bindings.iter().map(|b| b.name.clone()).collect();
        outline
    }

    pub fn binding(&self, name: &str) -> Option<&TopLevelBinding> {
        self.bindings.iter().find(|b| b.name == name)
    }

    /// Top-level value names in declaration order, without duplicates.
    pub fn binding_names(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.bindings
            .iter()
            .filter(|b| seen.insert(b.name.clone()))
            .map(|b| b.name.clone())
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SYNTAX OUTLINE
// ═══════════════════════════════════════════════════════════════════════════════

struct OutlineBuilder<'t> {
    text: &'t str,
    imports: Vec<TextSpan>,
    export_edits: Vec<Edit>,
    declarations: Vec<Declaration>,
    bindings: Vec<TopLevelBinding>,
    /// `export default Name;` targets, classified once all bindings are known.
    default_idents: Vec<(String, usize)>,
}

impl<'t> OutlineBuilder<'t> {
    fn new(text: &'t str) -> Self {
        OutlineBuilder {
            text,
            imports: Vec::new(),
            export_edits: Vec::new(),
            declarations: Vec::new(),
            bindings: Vec::new(),
            default_idents: Vec::new(),
        }
    }

    fn statement(&mut self, stmt: &Statement) {
        let span = TextSpan::from(stmt.span());
        match stmt {
            Statement::ImportDeclaration(_) | Statement::TSImportEqualsDeclaration(_) => {
                self.imports.push(span)
            }
            Statement::ExportDefaultDeclaration(decl) => self.export_default(decl, span),
            Statement::ExportNamedDeclaration(decl) => match &decl.declaration {
                Some(inner) => {
                    self.strip(span.start, inner.span().start as usize);
                    self.declaration(inner, span);
                }
                None => {
                    // `export { Name as default };` names the default export.
                    if decl.source.is_none() {
                        for spec in &decl.specifiers {
                            if spec.exported.name().as_str() == "default" {
                                self.default_idents
                                    .push((spec.local.name().to_string(), span.start));
                            }
                        }
                    }
                    self.remove(span)
                }
            },
            Statement::ExportAllDeclaration(_)
            | Statement::TSExportAssignment(_)
            | Statement::TSNamespaceExportDeclaration(_) => self.remove(span),
            Statement::FunctionDeclaration(func) => self.function(func, span),
            Statement::ClassDeclaration(class) => self.class(class, span),
            Statement::VariableDeclaration(var) => self.variables(var, span),
            _ => {}
        }
    }

    fn declaration(&mut self, decl: &ast::Declaration, statement: TextSpan) {
        match decl {
            ast::Declaration::FunctionDeclaration(func) => self.function(func, statement),
            ast::Declaration::ClassDeclaration(class) => self.class(class, statement),
            ast::Declaration::VariableDeclaration(var) => self.variables(var, statement),
            _ => {}
        }
    }

    fn function(&mut self, func: &ast::Function, statement: TextSpan) {
        // Overload signatures and `declare function` carry no body.
        if func.body.is_none() {
            return;
        }
        if let Some(id) = &func.id {
            self.bind(&id.name, BindingKind::Function, statement, true);
            self.declare(DeclarationKind::TopLevelFunction, &id.name, statement.start);
        }
    }

    fn class(&mut self, class: &ast::Class, statement: TextSpan) {
        if class.declare {
            return;
        }
        if let Some(id) = &class.id {
            self.bind(&id.name, BindingKind::Class, statement, true);
        }
    }

    fn variables(&mut self, var: &ast::VariableDeclaration, statement: TextSpan) {
        if var.declare {
            return;
        }
        let sole = var.declarations.len() == 1;
        for declarator in &var.declarations {
            let BindingPattern::BindingIdentifier(id) = &declarator.id else {
                continue;
            };
            self.bind(&id.name, BindingKind::Variable, statement, sole);
            if declarator.init.as_ref().is_some_and(is_function_like) {
                self.declare(DeclarationKind::TopLevelConst, &id.name, statement.start);
            }
        }
    }

    fn export_default(&mut self, decl: &ast::ExportDefaultDeclaration, statement: TextSpan) {
        let target = decl.declaration.span().start as usize;
        match &decl.declaration {
            ExportDefaultDeclarationKind::FunctionDeclaration(func) => match &func.id {
                Some(id) => {
                    self.strip(statement.start, target);
                    self.bind(&id.name, BindingKind::Function, statement, true);
                    self.declare(DeclarationKind::DefaultFunction, &id.name, statement.start);
                }
                None => self.bind_synthetic(statement, target),
            },
            ExportDefaultDeclarationKind::ClassDeclaration(class) => match &class.id {
                Some(id) => {
                    self.strip(statement.start, target);
                    self.bind(&id.name, BindingKind::Class, statement, true);
                    self.declare(DeclarationKind::DefaultFunction, &id.name, statement.start);
                }
                None => self.bind_synthetic(statement, target),
            },
            ExportDefaultDeclarationKind::TSInterfaceDeclaration(_) => {
                self.strip(statement.start, target)
            }
            kind => match kind.as_expression() {
                Some(Expression::Identifier(ident)) => {
                    self.strip(statement.start, target);
                    self.default_idents
                        .push((ident.name.to_string(), statement.start));
                }
                Some(_) => self.bind_synthetic(statement, target),
                None => self.strip(statement.start, target),
            },
        }
    }

    /// `export default <anonymous>` becomes `const __PreviewDefault = <anonymous>;`.
    fn bind_synthetic(&mut self, statement: TextSpan, target: usize) {
        self.export_edits.push(Edit {
            span: TextSpan::new(statement.start, target),
            replacement: format!("const {} = ", SYNTHETIC_DEFAULT),
        });
        let body = &self.text[statement.start..statement.end];
        if !body.trim_end().ends_with(';') {
            self.export_edits.push(Edit {
                span: TextSpan::new(statement.end, statement.end),
                replacement: ";".to_string(),
            });
        }
        self.bind(SYNTHETIC_DEFAULT, BindingKind::Variable, statement, true);
        self.declare(DeclarationKind::DefaultConst, SYNTHETIC_DEFAULT, statement.start);
    }

    fn strip(&mut self, start: usize, end: usize) {
        self.export_edits.push(Edit {
            span: TextSpan::new(start, end),
            replacement: String::new(),
        });
    }

    fn remove(&mut self, span: TextSpan) {
        self.export_edits.push(Edit {
            span,
            replacement: blank(&self.text[span.start..span.end]),
        });
    }

    fn bind(&mut self, name: &str, kind: BindingKind, statement: TextSpan, sole: bool) {
        self.bindings.push(TopLevelBinding {
            name: name.to_string(),
            kind,
            statement,
            sole,
        });
    }

    fn declare(&mut self, kind: DeclarationKind, name: &str, offset: usize) {
        self.declarations.push(Declaration::new(kind, name, offset));
    }

    fn finish(
        mut self,
        strategy: Strategy,
        references: BTreeSet<String>,
        local_names: BTreeSet<String>,
    ) -> ModuleOutline {
        for (name, offset) in std::mem::take(&mut self.default_idents) {
            let kind = match self.bindings.iter().find(|b| b.name == name).map(|b| b.kind) {
                Some(BindingKind::Function) | Some(BindingKind::Class) => {
                    DeclarationKind::DefaultFunction
                }
                _ => DeclarationKind::DefaultConst,
            };
            self.declare(kind, &name, offset);
        }
        ModuleOutline {
            strategy,
            imports: self.imports,
            export_edits: self.export_edits,
            declarations: self.declarations,
            bindings: self.bindings,
            references,
            local_names,
        }
    }
}

/// Arrow or function expressions, seen through parentheses, type assertions
/// and wrapping calls such as `memo(...)` or `forwardRef(...)`.
fn is_function_like(expr: &Expression) -> bool {
    match expr {
        Expression::ArrowFunctionExpression(_) | Expression::FunctionExpression(_) => true,
        Expression::ParenthesizedExpression(paren) => is_function_like(&paren.expression),
        Expression::TSAsExpression(as_expr) => is_function_like(&as_expr.expression),
        Expression::TSSatisfiesExpression(sat) => is_function_like(&sat.expression),
        Expression::CallExpression(call) => call
            .arguments
            .iter()
            .any(|arg| arg.as_expression().is_some_and(|e| is_function_like(e))),
        _ => false,
    }
}

#[derive(Default)]
struct ReferenceCollector {
    references: BTreeSet<String>,
    bindings: BTreeSet<String>,
}

impl<'a> Visit<'a> for ReferenceCollector {
    fn visit_identifier_reference(&mut self, ident: &oxc_ast::ast::IdentifierReference) {
        if ident.name.starts_with(|c: char| c.is_ascii_uppercase()) {
            self.references.insert(ident.name.to_string());
        }
    }

    fn visit_binding_identifier(&mut self, ident: &oxc_ast::ast::BindingIdentifier) {
        self.bindings.insert(ident.name.to_string());
    }

    // Type positions vanish after compilation.
    fn visit_ts_type(&mut self, _ty: &oxc_ast::ast::TSType<'a>) {}
}

// ═══════════════════════════════════════════════════════════════════════════════
// LEXICAL OUTLINE
// ═══════════════════════════════════════════════════════════════════════════════

lazy_static! {
    static ref LEX_BINDING_RE: Regex = Regex::new(
        r"(?m)^(?:export[ \t]+(?:default[ \t]+)?)?((?:async[ \t]+)?function[ \t]*\*?[ \t]*|class[ \t]+|(?:const|let|var)[ \t]+)([A-Za-z_$][\w$]*)"
    )
    .unwrap();

    static ref LEX_DEFAULT_NAMED_RE: Regex = Regex::new(
        r"(?m)^[ \t]*export\s+default\s+(?:async\s+)?(?:function\s*\*?\s*|class\s+)([A-Za-z_$][\w$]*)"
    )
    .unwrap();

    static ref LEX_DEFAULT_IDENT_RE: Regex =
        Regex::new(r"(?m)^[ \t]*export\s+default\s+([A-Za-z_$][\w$]*)\s*;?[ \t]*$").unwrap();

    static ref LEX_DEFAULT_ANY_RE: Regex = Regex::new(r"(?m)^[ \t]*export\s+default\b").unwrap();

    static ref LEX_CONST_FN_RE: Regex = Regex::new(
        r"(?m)^(?:export[ \t]+)?(?:const|let|var)[ \t]+([A-Za-z_$][\w$]*)[^=\n]*=\s*(?:async\s+)?(?:function\b|\([^)]*\)\s*(?::[^=\n]+)?=>|[A-Za-z_$][\w$]*\s*=>|(?:React\s*\.\s*)?(?:memo|forwardRef)\s*[(<])"
    )
    .unwrap();

    static ref LEX_JSX_TAG_RE: Regex = Regex::new(r"<([A-Z][\w$]*)").unwrap();
}

/// Default-export names read straight off the submitted text, independent of
/// whether the module parses.
pub fn lexical_hints(text: &str) -> SourceHints {
    let named: Vec<(usize, String)> = LEX_DEFAULT_NAMED_RE
        .captures_iter(text)
        .filter_map(|c| Some((c.get(0)?.start(), c.get(1)?.as_str().to_string())))
        .collect();
    let idents: Vec<(usize, String)> = LEX_DEFAULT_IDENT_RE
        .captures_iter(text)
        .filter_map(|c| Some((c.get(0)?.start(), c.get(1)?.as_str().to_string())))
        .filter(|(_, name)| !is_reserved(name))
        .collect();
    let anonymous = LEX_DEFAULT_ANY_RE.find_iter(text).any(|m| {
        !named.iter().any(|(at, _)| *at == m.start()) && !idents.iter().any(|(at, _)| *at == m.start())
    });

    let default_function = named.into_iter().next().map(|(_, name)| name);
    let default_const = idents
        .into_iter()
        .next()
        .map(|(_, name)| name)
        .or_else(|| anonymous.then(|| SYNTHETIC_DEFAULT.to_string()));
    SourceHints {
        default_function,
        default_const,
    }
}

fn is_reserved(word: &str) -> bool {
    matches!(
        word,
        "function" | "class" | "async" | "const" | "let" | "var" | "new" | "null" | "true" | "false"
    )
}

/// Keeps only the newlines of `text`, so line numbers survive removal.
pub fn blank(text: &str) -> String {
    text.chars().filter(|c| *c == '\n').collect()
}

/// Applies non-overlapping edits, last first. An edit overlapping one
/// already applied is dropped.
pub fn apply_edits(text: &str, edits: &[Edit]) -> String {
    let mut ordered: Vec<&Edit> = edits.iter().collect();
    ordered.sort_by(|a, b| {
        b.span
            .start
            .cmp(&a.span.start)
            .then(b.span.end.cmp(&a.span.end))
    });

    let mut result = text.to_string();
    let mut floor = usize::MAX;
    for edit in ordered {
        let TextSpan { start, end } = edit.span;
        if end > floor || start > end || end > text.len() {
            continue;
        }
        result.replace_range(start..end, &edit.replacement);
        floor = start;
    }
    result
}

fn continues_expression(prev: u8, last: u8) -> bool {
    match last {
        0 => true,
        b'>' => prev == b'=',
        b'=' | b',' | b'(' | b'[' | b'{' | b'+' | b'-' | b'*' | b'/' | b'%' | b'&' | b'|'
        | b'?' | b':' | b'<' | b'!' | b'.' => true,
        _ => false,
    }
}

/// End offset of the statement starting at `start`, found by bracket depth.
/// Ends after a `;` at depth zero, or at a depth-zero newline the previous
/// token cannot continue past. Quoted strings stop at end of line so stray
/// apostrophes in JSX text do not swallow the module.
pub fn statement_end(text: &str, start: usize) -> usize {
    let bytes = text.as_bytes();
    let mut depth: i32 = 0;
    let mut prev: u8 = 0;
    let mut last: u8 = 0;
    let mut i = start;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'\'' | b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b && bytes[i] != b'\n' {
                    i += if bytes[i] == b'\\' { 2 } else { 1 };
                }
                if i < bytes.len() && bytes[i] == b {
                    i += 1;
                }
                prev = last;
                last = b;
                continue;
            }
            b'`' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'`' {
                    i += if bytes[i] == b'\\' { 2 } else { 1 };
                }
                i += 1;
                prev = last;
                last = b;
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = text[i + 2..]
                    .find("*/")
                    .map(|p| i + 2 + p + 2)
                    .unwrap_or(bytes.len());
                continue;
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => {
                depth -= 1;
                if depth < 0 {
                    return i;
                }
            }
            b';' if depth == 0 => return i + 1,
            b'\n' if depth == 0 && !continues_expression(prev, last) => return i,
            _ => {}
        }
        if !b.is_ascii_whitespace() {
            prev = last;
            last = b;
        }
        i += 1;
    }
    bytes.len()
}
