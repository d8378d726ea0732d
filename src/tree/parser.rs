use std::rc::Rc;

use crate::common::source::{Span, Spanned};
use crate::common::token::{SpannedToken, Token, TokenKind};
use crate::error::Syntax;
use crate::tree::ast::*;

/// Recursive-descent parser producing an AST, per the grammar in §4.2.
///
/// Errors are collected rather than aborting immediately: on a syntax
/// error we record the diagnostic, enter panic mode, and synchronize at
/// the next likely statement boundary, so that a single file can report
/// more than one mistake per run.
pub struct Parser {
    tokens: Vec<SpannedToken>,
    current: usize,
    ids: NodeIdGen,
    errors: Vec<Syntax>,
    panic_mode: bool,
}

type PResult<T> = Result<T, ()>;

impl Parser {
    pub fn new(tokens: Vec<SpannedToken>) -> Parser {
        Parser { tokens, current: 0, ids: NodeIdGen::default(), errors: vec![], panic_mode: false }
    }

    /// Parses a whole program; returns the statements and any syntax
    /// errors encountered. A non-empty error list means the program must
    /// not be executed (§7: "execution does not start if any occurred").
    pub fn parse(tokens: Vec<SpannedToken>) -> (Vec<Stmt>, Vec<Syntax>) {
        let mut parser = Parser::new(tokens);
        let mut statements = vec![];

        while !parser.is_at_end() {
            match parser.declaration() {
                Ok(stmt) => statements.push(stmt),
                Err(()) => parser.synchronize(),
            }
        }

        (statements, parser.errors)
    }

    // --- token stream helpers ---

    fn peek(&self) -> &SpannedToken { &self.tokens[self.current] }
    fn previous(&self) -> &SpannedToken { &self.tokens[self.current - 1] }
    fn is_at_end(&self) -> bool { self.peek().item.kind == TokenKind::Eof }

    fn advance(&mut self) -> &SpannedToken {
        if !self.is_at_end() { self.current += 1; }
        self.previous()
    }

    fn check(&self, kind: TokenKind) -> bool {
        !self.is_at_end() && self.peek().item.kind == kind
    }

    fn matches(&mut self, kinds: &[TokenKind]) -> bool {
        for &k in kinds {
            if self.check(k) { self.advance(); return true; }
        }
        false
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> PResult<&SpannedToken> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            self.error_at_current(message);
            Err(())
        }
    }

    fn error_at_current(&mut self, message: &str) {
        if self.panic_mode { return; }
        self.panic_mode = true;

        let token = self.peek().clone();
        let at = if token.item.kind == TokenKind::Eof { None } else { Some(token.item.lexeme.clone()) };
        self.errors.push(Syntax::new(message, token.span, at));
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        self.advance();

        while !self.is_at_end() {
            if self.previous().item.kind == TokenKind::Semicolon { return; }

            use TokenKind::*;
            if matches!(self.peek().item.kind, Class | Fun | Var | For | If | While | Print | Return) {
                return;
            }

            self.advance();
        }
    }

    fn spanned_expr(&self, kind: ExprKind, span: Span) -> Expr {
        Expr { id: self.ids.next(), span, kind }
    }

    fn spanned_stmt(&self, kind: StmtKind, span: Span) -> Stmt {
        Stmt { id: self.ids.next(), span, kind }
    }

    // --- declarations & statements ---

    fn declaration(&mut self) -> PResult<Stmt> {
        if self.matches(&[TokenKind::Class]) {
            self.class_declaration()
        } else if self.matches(&[TokenKind::Fun]) {
            self.fun_declaration("function")
        } else if self.matches(&[TokenKind::Var]) {
            self.var_declaration()
        } else {
            self.statement()
        }
    }

    fn class_declaration(&mut self) -> PResult<Stmt> {
        let start = self.previous().span.clone();
        let name = self.consume(TokenKind::Identifier, "Expect class name.")?.item.lexeme.clone();

        let superclass = if self.matches(&[TokenKind::Less]) {
            let tok = self.consume(TokenKind::Identifier, "Expect superclass name.")?;
            let name = tok.item.lexeme.clone();
            let span = tok.span.clone();
            Some(self.spanned_expr(ExprKind::Variable(name), span))
        } else {
            None
        };

        self.consume(TokenKind::LeftBrace, "Expect '{' before class body.")?;

        let mut methods = vec![];
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            methods.push(self.method()?);
        }

        let end = self.consume(TokenKind::RightBrace, "Expect '}' after class body.")?.span.clone();

        let decl = Rc::new(ClassDecl { name, superclass, methods });
        Ok(self.spanned_stmt(StmtKind::Class(decl), Span::combine(&start, &end)))
    }

    fn method(&mut self) -> PResult<Rc<FunctionDecl>> {
        let name = self.consume(TokenKind::Identifier, "Expect method name.")?.item.lexeme.clone();
        self.function_body(name)
    }

    fn fun_declaration(&mut self, kind: &str) -> PResult<Stmt> {
        let start = self.previous().span.clone();
        let name = self.consume(TokenKind::Identifier, &format!("Expect {} name.", kind))?.item.lexeme.clone();
        let decl = self.function_body(name)?;
        let end = decl.body.last().map(|s| s.span.clone()).unwrap_or_else(|| start.clone());
        Ok(self.spanned_stmt(StmtKind::Function(decl), Span::combine(&start, &end)))
    }

    fn function_body(&mut self, name: String) -> PResult<Rc<FunctionDecl>> {
        self.consume(TokenKind::LeftParen, "Expect '(' after name.")?;
        let mut params = vec![];

        if !self.check(TokenKind::RightParen) {
            loop {
                if params.len() >= 255 {
                    self.error_at_current("Can't have more than 255 parameters.");
                    return Err(());
                }
                let tok = self.consume(TokenKind::Identifier, "Expect parameter name.")?;
                params.push((tok.item.lexeme.clone(), tok.span.clone()));
                if !self.matches(&[TokenKind::Comma]) { break; }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.")?;

        self.consume(TokenKind::LeftBrace, "Expect '{' before body.")?;
        let body = self.block()?;

        let is_initializer = name == "init";
        Ok(Rc::new(FunctionDecl { name, params, body, is_initializer }))
    }

    fn var_declaration(&mut self) -> PResult<Stmt> {
        let start = self.previous().span.clone();
        let name = self.consume(TokenKind::Identifier, "Expect variable name.")?.item.lexeme.clone();

        let initializer = if self.matches(&[TokenKind::Equal]) {
            Some(self.expression()?)
        } else {
            None
        };

        let end = self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.")?.span.clone();
        Ok(self.spanned_stmt(StmtKind::Var(name, initializer), Span::combine(&start, &end)))
    }

    fn statement(&mut self) -> PResult<Stmt> {
        if self.matches(&[TokenKind::For]) { return self.for_statement(); }
        if self.matches(&[TokenKind::If]) { return self.if_statement(); }
        if self.matches(&[TokenKind::Print]) { return self.print_statement(); }
        if self.matches(&[TokenKind::Return]) { return self.return_statement(); }
        if self.matches(&[TokenKind::While]) { return self.while_statement(); }
        if self.matches(&[TokenKind::LeftBrace]) {
            let start = self.previous().span.clone();
            let body = self.block()?;
            let end = body.last().map(|s| s.span.clone()).unwrap_or_else(|| start.clone());
            return Ok(self.spanned_stmt(StmtKind::Block(body), Span::combine(&start, &end)));
        }
        self.expression_statement()
    }

    fn block(&mut self) -> PResult<Vec<Stmt>> {
        let mut statements = vec![];
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            match self.declaration() {
                Ok(stmt) => statements.push(stmt),
                Err(()) => self.synchronize(),
            }
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.")?;
        Ok(statements)
    }

    fn for_statement(&mut self) -> PResult<Stmt> {
        let start = self.previous().span.clone();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.")?;

        let initializer = if self.matches(&[TokenKind::Semicolon]) {
            None
        } else if self.matches(&[TokenKind::Var]) {
            Some(self.var_declaration()?)
        } else {
            Some(self.expression_statement()?)
        };

        let condition = if !self.check(TokenKind::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.")?;

        let increment = if !self.check(TokenKind::RightParen) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenKind::RightParen, "Expect ')' after for clauses.")?;

        let mut body = self.statement()?;

        if let Some(increment) = increment {
            let span = increment.span.clone();
            body = self.spanned_stmt(
                StmtKind::Block(vec![body, self.spanned_stmt(StmtKind::Expression(increment), span.clone())]),
                span,
            );
        }

        let cond_span = condition.as_ref().map(|c| c.span.clone()).unwrap_or_else(|| start.clone());
        let condition = condition.unwrap_or_else(|| self.spanned_expr(ExprKind::Literal(Literal::Bool(true)), cond_span.clone()));
        body = self.spanned_stmt(StmtKind::While(condition, Box::new(body)), cond_span);

        if let Some(initializer) = initializer {
            body = self.spanned_stmt(StmtKind::Block(vec![initializer, body]), start.clone());
        }

        Ok(body)
    }

    fn if_statement(&mut self) -> PResult<Stmt> {
        let start = self.previous().span.clone();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.")?;
        let condition = self.expression()?;
        self.consume(TokenKind::RightParen, "Expect ')' after if condition.")?;

        let then_branch = Box::new(self.statement()?);
        let mut end = then_branch.span.clone();
        let else_branch = if self.matches(&[TokenKind::Else]) {
            let stmt = self.statement()?;
            end = stmt.span.clone();
            Some(Box::new(stmt))
        } else {
            None
        };

        Ok(self.spanned_stmt(StmtKind::If(condition, then_branch, else_branch), Span::combine(&start, &end)))
    }

    fn print_statement(&mut self) -> PResult<Stmt> {
        let start = self.previous().span.clone();
        let value = self.expression()?;
        let end = self.consume(TokenKind::Semicolon, "Expect ';' after value.")?.span.clone();
        Ok(self.spanned_stmt(StmtKind::Print(value), Span::combine(&start, &end)))
    }

    fn return_statement(&mut self) -> PResult<Stmt> {
        let start = self.previous().span.clone();
        let value = if !self.check(TokenKind::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };
        let end = self.consume(TokenKind::Semicolon, "Expect ';' after return value.")?.span.clone();
        Ok(self.spanned_stmt(StmtKind::Return(value), Span::combine(&start, &end)))
    }

    fn while_statement(&mut self) -> PResult<Stmt> {
        let start = self.previous().span.clone();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.")?;
        let condition = self.expression()?;
        self.consume(TokenKind::RightParen, "Expect ')' after condition.")?;
        let body = Box::new(self.statement()?);
        let end = body.span.clone();
        Ok(self.spanned_stmt(StmtKind::While(condition, body), Span::combine(&start, &end)))
    }

    fn expression_statement(&mut self) -> PResult<Stmt> {
        let expr = self.expression()?;
        let start = expr.span.clone();
        let end = self.consume(TokenKind::Semicolon, "Expect ';' after expression.")?.span.clone();
        Ok(self.spanned_stmt(StmtKind::Expression(expr), Span::combine(&start, &end)))
    }

    // --- expressions ---

    fn expression(&mut self) -> PResult<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> PResult<Expr> {
        let expr = self.or()?;

        if self.matches(&[TokenKind::Equal]) {
            let equals_span = self.previous().span.clone();
            let value = self.assignment()?;
            let span = Span::combine(&expr.span, &value.span);

            return Ok(match expr.kind {
                ExprKind::Variable(name) => self.spanned_expr(ExprKind::Assign(name, Box::new(value)), span),
                ExprKind::Get(object, name) => self.spanned_expr(ExprKind::Set(object, name, Box::new(value)), span),
                _ => {
                    self.errors.push(Syntax::new("Invalid assignment target.", equals_span, None));
                    expr
                },
            });
        }

        Ok(expr)
    }

    fn or(&mut self) -> PResult<Expr> {
        let mut expr = self.and()?;
        while self.matches(&[TokenKind::Or]) {
            let right = self.and()?;
            let span = Span::combine(&expr.span, &right.span);
            expr = self.spanned_expr(ExprKind::Logical(Box::new(expr), LogicalOp::Or, Box::new(right)), span);
        }
        Ok(expr)
    }

    fn and(&mut self) -> PResult<Expr> {
        let mut expr = self.equality()?;
        while self.matches(&[TokenKind::And]) {
            let right = self.equality()?;
            let span = Span::combine(&expr.span, &right.span);
            expr = self.spanned_expr(ExprKind::Logical(Box::new(expr), LogicalOp::And, Box::new(right)), span);
        }
        Ok(expr)
    }

    fn equality(&mut self) -> PResult<Expr> {
        let mut expr = self.comparison()?;
        loop {
            let op = if self.matches(&[TokenKind::BangEqual]) { BinaryOp::NotEq }
                else if self.matches(&[TokenKind::EqualEqual]) { BinaryOp::Eq }
                else { break };
            let right = self.comparison()?;
            let span = Span::combine(&expr.span, &right.span);
            expr = self.spanned_expr(ExprKind::Binary(Box::new(expr), op, Box::new(right)), span);
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> PResult<Expr> {
        let mut expr = self.term()?;
        loop {
            let op = if self.matches(&[TokenKind::Greater]) { BinaryOp::Greater }
                else if self.matches(&[TokenKind::GreaterEqual]) { BinaryOp::GreaterEq }
                else if self.matches(&[TokenKind::Less]) { BinaryOp::Less }
                else if self.matches(&[TokenKind::LessEqual]) { BinaryOp::LessEq }
                else { break };
            let right = self.term()?;
            let span = Span::combine(&expr.span, &right.span);
            expr = self.spanned_expr(ExprKind::Binary(Box::new(expr), op, Box::new(right)), span);
        }
        Ok(expr)
    }

    fn term(&mut self) -> PResult<Expr> {
        let mut expr = self.factor()?;
        loop {
            let op = if self.matches(&[TokenKind::Minus]) { BinaryOp::Sub }
                else if self.matches(&[TokenKind::Plus]) { BinaryOp::Add }
                else { break };
            let right = self.factor()?;
            let span = Span::combine(&expr.span, &right.span);
            expr = self.spanned_expr(ExprKind::Binary(Box::new(expr), op, Box::new(right)), span);
        }
        Ok(expr)
    }

    fn factor(&mut self) -> PResult<Expr> {
        let mut expr = self.unary()?;
        loop {
            let op = if self.matches(&[TokenKind::Slash]) { BinaryOp::Div }
                else if self.matches(&[TokenKind::Star]) { BinaryOp::Mul }
                else { break };
            let right = self.unary()?;
            let span = Span::combine(&expr.span, &right.span);
            expr = self.spanned_expr(ExprKind::Binary(Box::new(expr), op, Box::new(right)), span);
        }
        Ok(expr)
    }

    fn unary(&mut self) -> PResult<Expr> {
        let op = if self.matches(&[TokenKind::Bang]) { Some(UnaryOp::Not) }
            else if self.matches(&[TokenKind::Minus]) { Some(UnaryOp::Neg) }
            else { None };

        if let Some(op) = op {
            let start = self.previous().span.clone();
            let right = self.unary()?;
            let span = Span::combine(&start, &right.span);
            return Ok(self.spanned_expr(ExprKind::Unary(op, Box::new(right)), span));
        }

        self.call()
    }

    fn call(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;

        loop {
            if self.matches(&[TokenKind::LeftParen]) {
                expr = self.finish_call(expr)?;
            } else if self.matches(&[TokenKind::Dot]) {
                let name_tok = self.consume(TokenKind::Identifier, "Expect property name after '.'.")?;
                let name = name_tok.item.lexeme.clone();
                let span = Span::combine(&expr.span, &name_tok.span.clone());
                expr = self.spanned_expr(ExprKind::Get(Box::new(expr), name), span);
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> PResult<Expr> {
        let mut args = vec![];

        if !self.check(TokenKind::RightParen) {
            loop {
                if args.len() >= 255 {
                    self.error_at_current("Can't have more than 255 arguments.");
                    return Err(());
                }
                args.push(self.expression()?);
                if !self.matches(&[TokenKind::Comma]) { break; }
            }
        }

        let end = self.consume(TokenKind::RightParen, "Expect ')' after arguments.")?.span.clone();
        let span = Span::combine(&callee.span, &end);
        Ok(self.spanned_expr(ExprKind::Call(Box::new(callee), args), span))
    }

    fn primary(&mut self) -> PResult<Expr> {
        let token = self.peek().clone();

        let expr = match token.item.kind {
            TokenKind::False => { self.advance(); self.spanned_expr(ExprKind::Literal(Literal::Bool(false)), token.span) },
            TokenKind::True => { self.advance(); self.spanned_expr(ExprKind::Literal(Literal::Bool(true)), token.span) },
            TokenKind::Nil => { self.advance(); self.spanned_expr(ExprKind::Literal(Literal::Nil), token.span) },
            TokenKind::Number => {
                self.advance();
                let v = match &token.item.literal { Some(crate::common::token::Literal::Number(n)) => *n, _ => unreachable!() };
                self.spanned_expr(ExprKind::Literal(Literal::Number(v)), token.span)
            },
            TokenKind::String => {
                self.advance();
                let v = match &token.item.literal { Some(crate::common::token::Literal::Str(s)) => s.clone(), _ => unreachable!() };
                self.spanned_expr(ExprKind::Literal(Literal::Str(v)), token.span)
            },
            TokenKind::This => { self.advance(); self.spanned_expr(ExprKind::This, token.span) },
            TokenKind::Super => {
                self.advance();
                self.consume(TokenKind::Dot, "Expect '.' after 'super'.")?;
                let method = self.consume(TokenKind::Identifier, "Expect superclass method name.")?;
                let name = method.item.lexeme.clone();
                let span = Span::combine(&token.span, &method.span.clone());
                self.spanned_expr(ExprKind::Super(name), span)
            },
            TokenKind::Identifier => { self.advance(); self.spanned_expr(ExprKind::Variable(token.item.lexeme.clone()), token.span) },
            TokenKind::LeftParen => {
                self.advance();
                let inner = self.expression()?;
                let end = self.consume(TokenKind::RightParen, "Expect ')' after expression.")?.span.clone();
                self.spanned_expr(ExprKind::Grouping(Box::new(inner)), Span::combine(&token.span, &end))
            },
            _ => {
                self.error_at_current("Expect expression.");
                return Err(());
            },
        };

        Ok(expr)
    }
}

/// Convenience wrapper used by the evaluator/tests that want a token
/// stream straight from source text.
pub fn parse_source(tokens: Vec<SpannedToken>) -> Result<Vec<Stmt>, Vec<Syntax>> {
    let (stmts, errors) = Parser::parse(tokens);
    if errors.is_empty() { Ok(stmts) } else { Err(errors) }
}
