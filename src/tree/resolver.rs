use std::collections::HashMap;

use crate::error::Syntax;
use crate::tree::ast::*;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Binding { NotReady, Ready }

#[derive(Clone, Copy, PartialEq, Eq)]
enum FunctionKind { None, Function, Method, Initializer }

#[derive(Clone, Copy, PartialEq, Eq)]
enum ClassKind { None, Class, Subclass }

/// The resolver's sole output: for every `Variable`/`Assign`/`This`/`Super`
/// node, how many enclosing local scopes to walk at runtime. A node with
/// no entry here is a global lookup (§4.3).
pub type Depths = HashMap<NodeId, usize>;

/// A static, side-effect-only pass over the AST (§4.3). Walks the tree in
/// lockstep with how the evaluator will walk it, pushing and popping a
/// stack of scope maps exactly where the evaluator will push and pop
/// environment frames.
pub struct Resolver {
    scopes: Vec<HashMap<String, Binding>>,
    depths: Depths,
    errors: Vec<Syntax>,
    current_function: FunctionKind,
    current_class: ClassKind,
}

impl Resolver {
    pub fn resolve(statements: &[Stmt]) -> (Depths, Vec<Syntax>) {
        let mut resolver = Resolver {
            scopes: vec![],
            depths: HashMap::new(),
            errors: vec![],
            current_function: FunctionKind::None,
            current_class: ClassKind::None,
        };
        resolver.resolve_stmts(statements);
        (resolver.depths, resolver.errors)
    }

    fn begin_scope(&mut self) { self.scopes.push(HashMap::new()); }
    fn end_scope(&mut self) { self.scopes.pop(); }

    fn declare(&mut self, name: &str, span_for_error: &crate::common::source::Span) {
        let Some(scope) = self.scopes.last_mut() else { return }; // global: no-op

        if scope.contains_key(name) {
            self.errors.push(Syntax::new(
                "Already a variable with this name in this scope.",
                span_for_error.clone(),
                Some(name.to_string()),
            ));
        }
        scope.insert(name.to_string(), Binding::NotReady);
    }

    fn define(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), Binding::Ready);
        }
    }

    fn resolve_local(&mut self, id: NodeId, name: &str) {
        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            if scope.contains_key(name) {
                self.depths.insert(id, depth);
                return;
            }
        }
        // not found locally: treat as global, no distance recorded
    }

    fn resolve_stmts(&mut self, statements: &[Stmt]) {
        for stmt in statements { self.resolve_stmt(stmt); }
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Expression(e) => self.resolve_expr(e),
            StmtKind::Print(e) => self.resolve_expr(e),
            StmtKind::Var(name, init) => {
                self.declare(name, &stmt.span);
                if let Some(init) = init { self.resolve_expr(init); }
                self.define(name);
            },
            StmtKind::Block(body) => {
                self.begin_scope();
                self.resolve_stmts(body);
                self.end_scope();
            },
            StmtKind::If(cond, then_branch, else_branch) => {
                self.resolve_expr(cond);
                self.resolve_stmt(then_branch);
                if let Some(else_branch) = else_branch { self.resolve_stmt(else_branch); }
            },
            StmtKind::While(cond, body) => {
                self.resolve_expr(cond);
                self.resolve_stmt(body);
            },
            StmtKind::Return(value) => {
                if self.current_function == FunctionKind::None {
                    self.errors.push(Syntax::new("Can't return from top-level code.", stmt.span.clone(), None));
                }
                if let Some(value) = value {
                    if self.current_function == FunctionKind::Initializer {
                        self.errors.push(Syntax::new("Can't return a value from an initializer.", value.span.clone(), None));
                    }
                    self.resolve_expr(value);
                }
            },
            StmtKind::Function(decl) => {
                // declared and defined immediately, to permit recursion
                self.declare(&decl.name, &stmt.span);
                self.define(&decl.name);
                self.resolve_function(decl, FunctionKind::Function);
            },
            StmtKind::Class(decl) => self.resolve_class(decl, &stmt.span),
        }
    }

    fn resolve_function(&mut self, decl: &FunctionDecl, kind: FunctionKind) {
        let enclosing_function = self.current_function;
        self.current_function = kind;

        self.begin_scope();
        for (param, span) in &decl.params {
            self.declare(param, span);
            self.define(param);
        }
        self.resolve_stmts(&decl.body);
        self.end_scope();

        self.current_function = enclosing_function;
    }

    fn resolve_class(&mut self, decl: &ClassDecl, span: &crate::common::source::Span) {
        let enclosing_class = self.current_class;
        self.current_class = ClassKind::Class;

        self.declare(&decl.name, span);
        self.define(&decl.name);

        if let Some(superclass) = &decl.superclass {
            if let ExprKind::Variable(super_name) = &superclass.kind {
                if super_name == &decl.name {
                    self.errors.push(Syntax::new("A class can't inherit from itself.", superclass.span.clone(), None));
                }
            }
            self.current_class = ClassKind::Subclass;
            self.resolve_expr(superclass);

            self.begin_scope();
            self.scopes.last_mut().unwrap().insert("super".to_string(), Binding::Ready);
        }

        self.begin_scope();
        self.scopes.last_mut().unwrap().insert("this".to_string(), Binding::Ready);

        for method in &decl.methods {
            let kind = if method.is_initializer { FunctionKind::Initializer } else { FunctionKind::Method };
            self.resolve_function(method, kind);
        }

        self.end_scope(); // this

        if decl.superclass.is_some() { self.end_scope(); } // super

        self.current_class = enclosing_class;
    }

    fn resolve_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Literal(_) => {},
            ExprKind::Unary(_, right) => self.resolve_expr(right),
            ExprKind::Binary(left, _, right) | ExprKind::Logical(left, _, right) => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            },
            ExprKind::Grouping(inner) => self.resolve_expr(inner),
            ExprKind::Variable(name) => {
                if let Some(scope) = self.scopes.last() {
                    if scope.get(name) == Some(&Binding::NotReady) {
                        self.errors.push(Syntax::new(
                            "Can't read local variable in its own initializer.",
                            expr.span.clone(),
                            Some(name.clone()),
                        ));
                    }
                }
                self.resolve_local(expr.id, name);
            },
            ExprKind::Assign(name, value) => {
                self.resolve_expr(value);
                self.resolve_local(expr.id, name);
            },
            ExprKind::Call(callee, args) => {
                self.resolve_expr(callee);
                for arg in args { self.resolve_expr(arg); }
            },
            ExprKind::Get(object, _) => self.resolve_expr(object),
            ExprKind::Set(object, _, value) => {
                self.resolve_expr(value);
                self.resolve_expr(object);
            },
            ExprKind::This => {
                if self.current_class == ClassKind::None {
                    self.errors.push(Syntax::new("Can't use 'this' outside of a class.", expr.span.clone(), None));
                } else {
                    self.resolve_local(expr.id, "this");
                }
            },
            ExprKind::Super(_) => {
                if self.current_class == ClassKind::None {
                    self.errors.push(Syntax::new("Can't use 'super' outside of a class.", expr.span.clone(), None));
                } else if self.current_class != ClassKind::Subclass {
                    self.errors.push(Syntax::new("Can't use 'super' in a class with no superclass.", expr.span.clone(), None));
                } else {
                    self.resolve_local(expr.id, "super");
                }
            },
        }
    }
}
