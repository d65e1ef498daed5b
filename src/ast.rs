use crate::errors::{ArgusError, ArgusResult};
use phf::phf_map;
use std::cell::RefCell;
use tree_sitter::{Language, Node};

thread_local! {
    static PARSER: RefCell<tree_sitter::Parser> = RefCell::new(tree_sitter::Parser::new());
}

/// -------------------------------------------------------------------------
///  Internal arena AST
/// -------------------------------------------------------------------------
///
/// The external parser (tree-sitter) hands us a concrete syntax tree; the
/// adapter lowers it into the small node-kind set the analysis passes agree
/// on. Downstream stages only ever see `NodeId`s into this arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start_line: usize, // 1-based
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameCtx {
    Load,
    Store,
}

#[derive(Debug, Clone)]
pub struct WithItem {
    pub context: NodeId,
    pub binding: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Module {
        body: Vec<NodeId>,
    },
    FunctionDef {
        name: String,
        params: Vec<NodeId>,
        body: Vec<NodeId>,
        is_async: bool,
        returns: Option<String>,
    },
    ClassDef {
        name: String,
        body: Vec<NodeId>,
    },
    If {
        test: NodeId,
        body: Vec<NodeId>,
        orelse: Vec<NodeId>,
    },
    While {
        test: NodeId,
        body: Vec<NodeId>,
    },
    For {
        target: NodeId,
        iter: NodeId,
        body: Vec<NodeId>,
        is_async: bool,
    },
    With {
        items: Vec<WithItem>,
        body: Vec<NodeId>,
        is_async: bool,
    },
    Assign {
        targets: Vec<NodeId>,
        value: NodeId,
    },
    AugAssign {
        target: NodeId,
        value: NodeId,
    },
    Return {
        value: Option<NodeId>,
    },
    ExprStmt {
        value: NodeId,
    },
    Await {
        value: NodeId,
    },
    Call {
        func: NodeId,
        args: Vec<NodeId>,
        keywords: Vec<(String, NodeId)>,
    },
    Name {
        id: String,
        ctx: NameCtx,
    },
    Attribute {
        value: NodeId,
        attr: String,
    },
    Constant {
        repr: String,
    },
    TupleBind {
        elts: Vec<NodeId>,
    },
    Param {
        name: String,
        annotation: Option<String>,
    },
    Global {
        names: Vec<String>,
    },
    Opaque,
}

#[derive(Debug, Clone)]
pub struct AstNode {
    pub span: Span,
    pub kind: NodeKind,
}

#[derive(Debug, Default)]
pub struct Ast {
    nodes: Vec<AstNode>,
    pub root: NodeId,
}

impl Ast {
    pub fn node(&self, id: NodeId) -> &AstNode {
        &self.nodes[id.0 as usize]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0 as usize].kind
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.nodes[id.0 as usize].span
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push(&mut self, span: Span, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(AstNode { span, kind });
        id
    }

    /// Visit the direct children of `id`.
    pub fn for_each_child(&self, id: NodeId, f: &mut impl FnMut(NodeId)) {
        match self.kind(id) {
            NodeKind::Module { body } | NodeKind::ClassDef { body, .. } => {
                body.iter().copied().for_each(f)
            }
            NodeKind::FunctionDef { params, body, .. } => {
                params.iter().copied().for_each(&mut *f);
                body.iter().copied().for_each(f);
            }
            NodeKind::If { test, body, orelse } => {
                f(*test);
                body.iter().copied().for_each(&mut *f);
                orelse.iter().copied().for_each(f);
            }
            NodeKind::While { test, body } => {
                f(*test);
                body.iter().copied().for_each(f);
            }
            NodeKind::For {
                target, iter, body, ..
            } => {
                f(*target);
                f(*iter);
                body.iter().copied().for_each(f);
            }
            NodeKind::With { items, body, .. } => {
                for item in items {
                    f(item.context);
                    if let Some(b) = item.binding {
                        f(b);
                    }
                }
                body.iter().copied().for_each(f);
            }
            NodeKind::Assign { targets, value } => {
                targets.iter().copied().for_each(&mut *f);
                f(*value);
            }
            NodeKind::AugAssign { target, value } => {
                f(*target);
                f(*value);
            }
            NodeKind::Return { value } => {
                if let Some(v) = value {
                    f(*v);
                }
            }
            NodeKind::ExprStmt { value } | NodeKind::Await { value } => f(*value),
            NodeKind::Call {
                func,
                args,
                keywords,
            } => {
                f(*func);
                args.iter().copied().for_each(&mut *f);
                keywords.iter().for_each(|(_, v)| f(*v));
            }
            NodeKind::Attribute { value, .. } => f(*value),
            NodeKind::TupleBind { elts } => elts.iter().copied().for_each(f),
            NodeKind::Name { .. }
            | NodeKind::Constant { .. }
            | NodeKind::Param { .. }
            | NodeKind::Global { .. }
            | NodeKind::Opaque => {}
        }
    }

    /// Pre-order walk of the subtree rooted at `id`.
    pub fn walk(&self, id: NodeId, f: &mut impl FnMut(NodeId)) {
        f(id);
        let mut kids = Vec::new();
        self.for_each_child(id, &mut |c| kids.push(c));
        for c in kids {
            self.walk(c, f);
        }
    }

    /// Every `Call` node inside the subtree rooted at `id` (inclusive).
    pub fn collect_calls(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.walk(id, &mut |n| {
            if matches!(self.kind(n), NodeKind::Call { .. }) {
                out.push(n);
            }
        });
        out
    }

    /// Every `Name` with the requested context inside the subtree at `id`.
    pub fn collect_names(&self, id: NodeId, ctx: NameCtx) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.walk(id, &mut |n| {
            if matches!(self.kind(n), NodeKind::Name { ctx: c, .. } if *c == ctx) {
                out.push(n);
            }
        });
        out
    }

    /// Dotted name of an expression, e.g. `html.escape` for an attribute
    /// chain, or the bare identifier for a `Name`. `None` when the base is
    /// something we cannot spell (a call result, a subscript, …).
    pub fn qualified_name(&self, id: NodeId) -> Option<String> {
        match self.kind(id) {
            NodeKind::Name { id: name, .. } => Some(name.clone()),
            NodeKind::Attribute { value, attr } => self
                .qualified_name(*value)
                .map(|base| format!("{base}.{attr}")),
            _ => None,
        }
    }

    /// Callee name of a `Call` node: dotted when spellable, otherwise the
    /// trailing attribute.
    pub fn callee_name(&self, call: NodeId) -> Option<String> {
        let NodeKind::Call { func, .. } = self.kind(call) else {
            return None;
        };
        self.qualified_name(*func).or_else(|| match self.kind(*func) {
            NodeKind::Attribute { attr, .. } => Some(attr.clone()),
            _ => None,
        })
    }

    pub fn contains_await(&self, id: NodeId) -> bool {
        let mut found = false;
        self.walk(id, &mut |n| {
            if matches!(self.kind(n), NodeKind::Await { .. }) {
                found = true;
            }
        });
        found
    }
}

/// -------------------------------------------------------------------------
///  tree-sitter lowering
/// -------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TsKind {
    Module,
    FunctionDef,
    ClassDef,
    Decorated,
    If,
    While,
    For,
    With,
    ExprStmt,
    Return,
    Global,
    Trivia,
    Other,
}

static KINDS: phf::Map<&'static str, TsKind> = phf_map! {
    "module" => TsKind::Module,
    "function_definition" => TsKind::FunctionDef,
    "class_definition" => TsKind::ClassDef,
    "decorated_definition" => TsKind::Decorated,
    "if_statement" => TsKind::If,
    "while_statement" => TsKind::While,
    "for_statement" => TsKind::For,
    "with_statement" => TsKind::With,
    "expression_statement" => TsKind::ExprStmt,
    "return_statement" => TsKind::Return,
    "global_statement" => TsKind::Global,
    "comment" => TsKind::Trivia,
};

#[inline(always)]
fn lookup(raw: &str) -> TsKind {
    KINDS.get(raw).copied().unwrap_or(TsKind::Other)
}

#[inline]
fn text_of(n: Node<'_>, code: &[u8]) -> Option<String> {
    std::str::from_utf8(&code[n.start_byte()..n.end_byte()])
        .ok()
        .map(|s| s.to_string())
}

fn span_of(n: Node<'_>) -> Span {
    let s = n.start_position();
    let e = n.end_position();
    Span {
        start_line: s.row + 1,
        start_col: s.column + 1,
        end_line: e.row + 1,
        end_col: e.column + 1,
    }
}

/// Parse one Python source file into the internal AST.
///
/// The parser itself is an external collaborator; a tree containing syntax
/// errors surfaces as `MalformedAst` and aborts the file.
pub fn parse_module(source: &[u8]) -> ArgusResult<Ast> {
    let tree = PARSER.with(|cell| {
        let mut parser = cell.borrow_mut();
        parser.set_language(&Language::from(tree_sitter_python::LANGUAGE))?;
        parser
            .parse(source, None)
            .ok_or_else(|| ArgusError::MalformedAst("parser produced no tree".into()))
    })?;

    let root = tree.root_node();
    if root.has_error() {
        return Err(ArgusError::MalformedAst(format!(
            "syntax error near line {}",
            first_error_line(root)
        )));
    }

    let mut lowerer = Lowerer {
        ast: Ast::default(),
        code: source,
    };
    let body = lowerer.lower_body(root);
    let root_id = lowerer.ast.push(span_of(root), NodeKind::Module { body });
    lowerer.ast.root = root_id;
    Ok(lowerer.ast)
}

fn first_error_line(root: Node<'_>) -> usize {
    let mut cursor = root.walk();
    let mut line = root.start_position().row + 1;
    let mut stack = vec![root];
    while let Some(n) = stack.pop() {
        if n.is_error() || n.is_missing() {
            line = n.start_position().row + 1;
            break;
        }
        stack.extend(n.children(&mut cursor));
    }
    line
}

struct Lowerer<'a> {
    ast: Ast,
    code: &'a [u8],
}

impl<'a> Lowerer<'a> {
    fn lower_body(&mut self, block: Node<'a>) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = block.walk();
        for child in block.named_children(&mut cursor) {
            self.lower_stmt(child, &mut out);
        }
        out
    }

    fn lower_stmt(&mut self, n: Node<'a>, out: &mut Vec<NodeId>) {
        match lookup(n.kind()) {
            TsKind::Trivia => {}
            TsKind::Decorated => {
                if let Some(def) = n.child_by_field_name("definition") {
                    self.lower_stmt(def, out);
                }
            }
            TsKind::FunctionDef => out.push(self.lower_function(n)),
            TsKind::ClassDef => out.push(self.lower_class(n)),
            TsKind::If => out.push(self.lower_if(n)),
            TsKind::While => out.push(self.lower_while(n)),
            TsKind::For => out.push(self.lower_for(n)),
            TsKind::With => out.push(self.lower_with(n)),
            TsKind::Return => {
                let value = n.named_child(0).map(|v| self.lower_expr(v, NameCtx::Load));
                out.push(self.ast.push(span_of(n), NodeKind::Return { value }));
            }
            TsKind::Global => {
                let mut names = Vec::new();
                let mut cursor = n.walk();
                for c in n.named_children(&mut cursor) {
                    if c.kind() == "identifier"
                        && let Some(t) = text_of(c, self.code)
                    {
                        names.push(t);
                    }
                }
                out.push(self.ast.push(span_of(n), NodeKind::Global { names }));
            }
            TsKind::ExprStmt => {
                // `a = 1; b = 2` parses as one expression_statement with
                // several named children.
                let mut cursor = n.walk();
                for c in n.named_children(&mut cursor) {
                    let id = match c.kind() {
                        "assignment" => self.lower_assignment(c),
                        "augmented_assignment" => self.lower_aug_assignment(c),
                        _ => {
                            let value = self.lower_expr(c, NameCtx::Load);
                            self.ast.push(span_of(c), NodeKind::ExprStmt { value })
                        }
                    };
                    out.push(id);
                }
            }
            TsKind::Module => {
                let mut body = self.lower_body(n);
                out.append(&mut body);
            }
            // Unsupported statement kinds lower to opaque linear statements.
            TsKind::Other => out.push(self.ast.push(span_of(n), NodeKind::Opaque)),
        }
    }

    fn lower_function(&mut self, n: Node<'a>) -> NodeId {
        let is_async = self.has_async_keyword(n);
        let name = n
            .child_by_field_name("name")
            .and_then(|c| text_of(c, self.code))
            .unwrap_or_else(|| "<anon>".to_string());
        let returns = n
            .child_by_field_name("return_type")
            .and_then(|c| text_of(c, self.code));

        let mut params = Vec::new();
        if let Some(plist) = n.child_by_field_name("parameters") {
            let mut cursor = plist.walk();
            for p in plist.named_children(&mut cursor) {
                if let Some(param) = self.lower_param(p) {
                    params.push(param);
                }
            }
        }

        let body = n
            .child_by_field_name("body")
            .map(|b| self.lower_body(b))
            .unwrap_or_default();

        self.ast.push(
            span_of(n),
            NodeKind::FunctionDef {
                name,
                params,
                body,
                is_async,
                returns,
            },
        )
    }

    fn lower_param(&mut self, p: Node<'a>) -> Option<NodeId> {
        let (ident, annotation) = match p.kind() {
            "identifier" => (Some(p), None),
            "typed_parameter" | "typed_default_parameter" => {
                let ident = p
                    .child_by_field_name("name")
                    .or_else(|| p.named_child(0).filter(|c| c.kind() == "identifier"));
                let ann = p
                    .child_by_field_name("type")
                    .and_then(|t| text_of(t, self.code));
                (ident, ann)
            }
            "default_parameter" => (p.child_by_field_name("name"), None),
            "list_splat_pattern" | "dictionary_splat_pattern" => (p.named_child(0), None),
            _ => (None, None),
        };
        let ident = ident?;
        let name = text_of(ident, self.code)?;
        Some(
            self.ast
                .push(span_of(p), NodeKind::Param { name, annotation }),
        )
    }

    fn lower_class(&mut self, n: Node<'a>) -> NodeId {
        let name = n
            .child_by_field_name("name")
            .and_then(|c| text_of(c, self.code))
            .unwrap_or_else(|| "<anon>".to_string());
        let body = n
            .child_by_field_name("body")
            .map(|b| self.lower_body(b))
            .unwrap_or_default();
        self.ast.push(span_of(n), NodeKind::ClassDef { name, body })
    }

    fn lower_if(&mut self, n: Node<'a>) -> NodeId {
        let test = n
            .child_by_field_name("condition")
            .map(|c| self.lower_expr(c, NameCtx::Load))
            .unwrap_or_else(|| self.opaque(n));
        let body = n
            .child_by_field_name("consequence")
            .map(|b| self.lower_body(b))
            .unwrap_or_default();

        // An elif chain nests right-to-left: each elif becomes an If whose
        // orelse is everything that follows it.
        let alts: Vec<Node<'a>> = {
            let mut cursor = n.walk();
            n.children_by_field_name("alternative", &mut cursor).collect()
        };
        let mut orelse: Vec<NodeId> = Vec::new();
        for alt in alts.into_iter().rev() {
            match alt.kind() {
                "else_clause" => {
                    if let Some(b) = alt.child_by_field_name("body") {
                        orelse = self.lower_body(b);
                    }
                }
                "elif_clause" => {
                    let elif_test = alt
                        .child_by_field_name("condition")
                        .map(|c| self.lower_expr(c, NameCtx::Load))
                        .unwrap_or_else(|| self.opaque(alt));
                    let elif_body = alt
                        .child_by_field_name("consequence")
                        .map(|b| self.lower_body(b))
                        .unwrap_or_default();
                    let nested = self.ast.push(
                        span_of(alt),
                        NodeKind::If {
                            test: elif_test,
                            body: elif_body,
                            orelse,
                        },
                    );
                    orelse = vec![nested];
                }
                _ => {}
            }
        }

        self.ast
            .push(span_of(n), NodeKind::If { test, body, orelse })
    }

    fn lower_while(&mut self, n: Node<'a>) -> NodeId {
        let test = n
            .child_by_field_name("condition")
            .map(|c| self.lower_expr(c, NameCtx::Load))
            .unwrap_or_else(|| self.opaque(n));
        let body = n
            .child_by_field_name("body")
            .map(|b| self.lower_body(b))
            .unwrap_or_default();
        self.ast.push(span_of(n), NodeKind::While { test, body })
    }

    fn lower_for(&mut self, n: Node<'a>) -> NodeId {
        let is_async = self.has_async_keyword(n);
        let target = n
            .child_by_field_name("left")
            .map(|t| self.lower_expr(t, NameCtx::Store))
            .unwrap_or_else(|| self.opaque(n));
        let iter = n
            .child_by_field_name("right")
            .map(|i| self.lower_expr(i, NameCtx::Load))
            .unwrap_or_else(|| self.opaque(n));
        let body = n
            .child_by_field_name("body")
            .map(|b| self.lower_body(b))
            .unwrap_or_default();
        self.ast.push(
            span_of(n),
            NodeKind::For {
                target,
                iter,
                body,
                is_async,
            },
        )
    }

    fn lower_with(&mut self, n: Node<'a>) -> NodeId {
        let is_async = self.has_async_keyword(n);
        let mut items = Vec::new();

        let mut cursor = n.walk();
        for clause in n.children(&mut cursor) {
            if clause.kind() != "with_clause" {
                continue;
            }
            let mut ccur = clause.walk();
            for item in clause.named_children(&mut ccur) {
                if item.kind() != "with_item" {
                    continue;
                }
                let Some(value) = item.child_by_field_name("value") else {
                    continue;
                };
                if value.kind() == "as_pattern" {
                    let context = value
                        .named_child(0)
                        .map(|c| self.lower_expr(c, NameCtx::Load))
                        .unwrap_or_else(|| self.opaque(value));
                    let binding = value
                        .child_by_field_name("alias")
                        .and_then(|a| a.named_child(0).or(Some(a)))
                        .map(|b| self.lower_expr(b, NameCtx::Store));
                    items.push(WithItem { context, binding });
                } else {
                    let context = self.lower_expr(value, NameCtx::Load);
                    items.push(WithItem {
                        context,
                        binding: None,
                    });
                }
            }
        }

        let body = n
            .child_by_field_name("body")
            .map(|b| self.lower_body(b))
            .unwrap_or_default();
        self.ast.push(
            span_of(n),
            NodeKind::With {
                items,
                body,
                is_async,
            },
        )
    }

    fn lower_assignment(&mut self, n: Node<'a>) -> NodeId {
        let mut targets = Vec::new();
        let mut value_node = n;

        // Chained `a = b = expr` nests assignments on the right.
        loop {
            if let Some(left) = value_node.child_by_field_name("left") {
                targets.push(self.lower_expr(left, NameCtx::Store));
            }
            match value_node.child_by_field_name("right") {
                Some(r) if r.kind() == "assignment" => value_node = r,
                Some(r) => {
                    let value = self.lower_expr(r, NameCtx::Load);
                    return self.ast.push(span_of(n), NodeKind::Assign { targets, value });
                }
                // Bare annotation (`x: int`) has no right-hand side.
                None => {
                    let value = self.opaque(n);
                    return self.ast.push(span_of(n), NodeKind::Assign { targets, value });
                }
            }
        }
    }

    fn lower_aug_assignment(&mut self, n: Node<'a>) -> NodeId {
        let target = n
            .child_by_field_name("left")
            .map(|t| self.lower_expr(t, NameCtx::Store))
            .unwrap_or_else(|| self.opaque(n));
        let value = n
            .child_by_field_name("right")
            .map(|v| self.lower_expr(v, NameCtx::Load))
            .unwrap_or_else(|| self.opaque(n));
        self.ast
            .push(span_of(n), NodeKind::AugAssign { target, value })
    }

    fn lower_expr(&mut self, n: Node<'a>, ctx: NameCtx) -> NodeId {
        match n.kind() {
            // `as_pattern_target` aliases the bound expression in
            // `with ... as x` / `except ... as x`; for our purposes it is a
            // plain name binding.
            "identifier" | "as_pattern_target" => {
                let id = text_of(n, self.code).unwrap_or_default();
                self.ast.push(span_of(n), NodeKind::Name { id, ctx })
            }
            "attribute" => {
                let value = n
                    .child_by_field_name("object")
                    .map(|v| self.lower_expr(v, NameCtx::Load))
                    .unwrap_or_else(|| self.opaque(n));
                let attr = n
                    .child_by_field_name("attribute")
                    .and_then(|a| text_of(a, self.code))
                    .unwrap_or_default();
                self.ast.push(span_of(n), NodeKind::Attribute { value, attr })
            }
            "call" => self.lower_call(n),
            "await" => {
                let value = n
                    .named_child(0)
                    .map(|v| self.lower_expr(v, NameCtx::Load))
                    .unwrap_or_else(|| self.opaque(n));
                self.ast.push(span_of(n), NodeKind::Await { value })
            }
            // Containers keep their elements reachable for def/use
            // collection; the elements carry the context.
            "tuple" | "pattern_list" | "tuple_pattern" | "list" | "list_pattern" => {
                let mut elts = Vec::new();
                let mut cursor = n.walk();
                for c in n.named_children(&mut cursor) {
                    elts.push(self.lower_expr(c, ctx));
                }
                self.ast.push(span_of(n), NodeKind::TupleBind { elts })
            }
            "string" | "integer" | "float" | "true" | "false" | "none" => {
                let repr = text_of(n, self.code).unwrap_or_default();
                self.ast.push(span_of(n), NodeKind::Constant { repr })
            }
            "parenthesized_expression" => match n.named_child(0) {
                Some(inner) => self.lower_expr(inner, ctx),
                None => self.opaque(n),
            },
            _ => {
                // Generic expression: lower the named children so uses inside
                // (binary ops, comparisons, subscripts, …) stay visible.
                let mut elts = Vec::new();
                let mut cursor = n.walk();
                for c in n.named_children(&mut cursor) {
                    elts.push(self.lower_expr(c, NameCtx::Load));
                }
                if elts.is_empty() {
                    self.opaque(n)
                } else {
                    self.ast.push(span_of(n), NodeKind::TupleBind { elts })
                }
            }
        }
    }

    fn lower_call(&mut self, n: Node<'a>) -> NodeId {
        let func = n
            .child_by_field_name("function")
            .map(|f| self.lower_expr(f, NameCtx::Load))
            .unwrap_or_else(|| self.opaque(n));

        let mut args = Vec::new();
        let mut keywords = Vec::new();
        if let Some(alist) = n.child_by_field_name("arguments") {
            let mut cursor = alist.walk();
            for a in alist.named_children(&mut cursor) {
                if a.kind() == "keyword_argument" {
                    let name = a
                        .child_by_field_name("name")
                        .and_then(|k| text_of(k, self.code))
                        .unwrap_or_default();
                    let value = a
                        .child_by_field_name("value")
                        .map(|v| self.lower_expr(v, NameCtx::Load))
                        .unwrap_or_else(|| self.opaque(a));
                    keywords.push((name, value));
                } else {
                    args.push(self.lower_expr(a, NameCtx::Load));
                }
            }
        }

        self.ast.push(
            span_of(n),
            NodeKind::Call {
                func,
                args,
                keywords,
            },
        )
    }

    fn opaque(&mut self, n: Node<'a>) -> NodeId {
        self.ast.push(span_of(n), NodeKind::Opaque)
    }

    fn has_async_keyword(&self, n: Node<'a>) -> bool {
        let mut cursor = n.walk();
        n.children(&mut cursor).any(|c| c.kind() == "async")
    }
}

// -------------------------------------------------------------------------
//  Tests
// -------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowers_linear_module() {
        let ast = parse_module(b"x = 1\ny = x\n").unwrap();
        let NodeKind::Module { body } = ast.kind(ast.root) else {
            panic!("root must be a module");
        };
        assert_eq!(body.len(), 2);
        assert!(matches!(ast.kind(body[0]), NodeKind::Assign { .. }));
    }

    #[test]
    fn detects_async_function() {
        let ast = parse_module(b"async def f():\n    await g()\n").unwrap();
        let NodeKind::Module { body } = ast.kind(ast.root) else {
            unreachable!()
        };
        let NodeKind::FunctionDef { is_async, body, .. } = ast.kind(body[0]) else {
            panic!("expected function def");
        };
        assert!(is_async);
        assert!(ast.contains_await(body[0]));
    }

    #[test]
    fn qualified_names_follow_attribute_chains() {
        let ast = parse_module(b"html.escape(x)\n").unwrap();
        let calls = ast.collect_calls(ast.root);
        assert_eq!(calls.len(), 1);
        assert_eq!(ast.callee_name(calls[0]).as_deref(), Some("html.escape"));
    }

    #[test]
    fn keyword_arguments_are_separated() {
        let ast =
            parse_module(b"ch.basic_consume(queue='q', on_message_callback=handler)\n").unwrap();
        let calls = ast.collect_calls(ast.root);
        let NodeKind::Call { keywords, args, .. } = ast.kind(calls[0]) else {
            unreachable!()
        };
        assert!(args.is_empty());
        assert_eq!(keywords.len(), 2);
        assert_eq!(keywords[0].0, "queue");
    }

    #[test]
    fn tuple_targets_lower_to_bindings() {
        let ast = parse_module(b"a, b = pair()\n").unwrap();
        let NodeKind::Module { body } = ast.kind(ast.root) else {
            unreachable!()
        };
        let NodeKind::Assign { targets, .. } = ast.kind(body[0]) else {
            panic!("expected assignment");
        };
        assert!(matches!(ast.kind(targets[0]), NodeKind::TupleBind { elts } if elts.len() == 2));
    }

    #[test]
    fn syntax_error_surfaces_as_malformed_ast() {
        let err = parse_module(b"def broken(:\n").unwrap_err();
        assert!(matches!(err, ArgusError::MalformedAst(_)));
    }

    #[test]
    fn elif_chain_nests_into_orelse() {
        let src = b"if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n";
        let ast = parse_module(src).unwrap();
        let NodeKind::Module { body } = ast.kind(ast.root) else {
            unreachable!()
        };
        let NodeKind::If { orelse, .. } = ast.kind(body[0]) else {
            panic!("expected if");
        };
        assert_eq!(orelse.len(), 1);
        assert!(matches!(ast.kind(orelse[0]), NodeKind::If { .. }));
    }
}
