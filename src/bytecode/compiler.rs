use std::rc::Rc;

use crate::bytecode::chunk::Chunk;
use crate::bytecode::opcode::Opcode;
use crate::bytecode::value::{Interner, Value};
use crate::common::scanner::Scanner;
use crate::common::source::Source;
use crate::common::token::{Literal, SpannedToken, TokenKind};
use crate::error::Syntax;

type CResult<T> = Result<T, ()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    Assignment,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    fn next(self) -> Precedence {
        use Precedence::*;
        match self {
            None => Assignment,
            Assignment => Or,
            Or => And,
            And => Equality,
            Equality => Comparison,
            Comparison => Term,
            Term => Factor,
            Factor => Unary,
            Unary => Call,
            Call | Primary => Primary,
        }
    }
}

type ParseFn = fn(&mut Compiler, bool) -> CResult<()>;

struct ParseRule {
    prefix: Option<ParseFn>,
    infix: Option<ParseFn>,
    precedence: Precedence,
}

fn rule(kind: TokenKind) -> ParseRule {
    use Precedence::*;
    use TokenKind::*;
    match kind {
        LeftParen => ParseRule { prefix: Some(Compiler::grouping), infix: None, precedence: None },
        Minus => ParseRule { prefix: Some(Compiler::unary), infix: Some(Compiler::binary), precedence: Term },
        Plus => ParseRule { prefix: None, infix: Some(Compiler::binary), precedence: Term },
        Slash => ParseRule { prefix: None, infix: Some(Compiler::binary), precedence: Factor },
        Star => ParseRule { prefix: None, infix: Some(Compiler::binary), precedence: Factor },
        Bang => ParseRule { prefix: Some(Compiler::unary), infix: None, precedence: None },
        BangEqual => ParseRule { prefix: None, infix: Some(Compiler::binary), precedence: Equality },
        EqualEqual => ParseRule { prefix: None, infix: Some(Compiler::binary), precedence: Equality },
        Greater => ParseRule { prefix: None, infix: Some(Compiler::binary), precedence: Comparison },
        GreaterEqual => ParseRule { prefix: None, infix: Some(Compiler::binary), precedence: Comparison },
        Less => ParseRule { prefix: None, infix: Some(Compiler::binary), precedence: Comparison },
        LessEqual => ParseRule { prefix: None, infix: Some(Compiler::binary), precedence: Comparison },
        Identifier => ParseRule { prefix: Some(Compiler::variable), infix: None, precedence: None },
        String => ParseRule { prefix: Some(Compiler::string), infix: None, precedence: None },
        Number => ParseRule { prefix: Some(Compiler::number), infix: None, precedence: None },
        And => ParseRule { prefix: None, infix: Some(Compiler::and), precedence: Precedence::And },
        Or => ParseRule { prefix: None, infix: Some(Compiler::or), precedence: Precedence::Or },
        False | True | Nil => ParseRule { prefix: Some(Compiler::literal), infix: None, precedence: None },
        _ => ParseRule { prefix: None, infix: None, precedence: None },
    }
}

struct Local {
    name: String,
    /// `-1` while the variable's own initializer is still being compiled
    /// (§4.5: a local may not appear in its own initializer).
    depth: i32,
}

/// The single-pass Pratt compiler (§4.5): it walks the token stream exactly
/// once, emitting bytecode directly as it recognizes each construct — there
/// is no intermediate AST. Locals live on the runtime stack; their slot is
/// tracked here purely to resolve `GetLocal`/`SetLocal` operands at compile
/// time.
pub struct Compiler<'a> {
    scanner: Scanner,
    previous: SpannedToken,
    current: SpannedToken,
    chunk: Chunk,
    interner: &'a mut Interner,
    locals: Vec<Local>,
    scope_depth: i32,
    errors: Vec<Syntax>,
    panic_mode: bool,
}

impl<'a> Compiler<'a> {
    pub fn compile(source: Rc<Source>, interner: &'a mut Interner) -> Result<Chunk, Vec<Syntax>> {
        let mut scanner = Scanner::new(source);
        let first = scanner.next_token();

        // `previous` is never read until the first real `advance()` call
        // overwrites it, so it's fine to seed it with the same token that
        // `current` starts on.
        let mut compiler = Compiler {
            scanner,
            previous: first.clone(),
            current: first,
            chunk: Chunk::new(),
            interner,
            locals: vec![],
            scope_depth: 0,
            errors: vec![],
            panic_mode: false,
        };

        while compiler.current.item.kind != TokenKind::Eof {
            match compiler.declaration() {
                Ok(()) => {},
                Err(()) => compiler.synchronize(),
            }
        }

        compiler.emit_op(Opcode::Return);

        if compiler.errors.is_empty() { Ok(compiler.chunk) } else { Err(compiler.errors) }
    }

    // --- token stream helpers ---

    fn advance(&mut self) {
        self.previous = self.current.clone();
        self.current = self.scanner.next_token();
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.item.kind == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) { self.advance(); true } else { false }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> CResult<()> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            self.error_at_current(message);
            Err(())
        }
    }

    fn error_at_current(&mut self, message: &str) {
        if self.panic_mode { return; }
        self.panic_mode = true;

        let token = self.current.clone();
        let at = if token.item.kind == TokenKind::Eof { None } else { Some(token.item.lexeme.clone()) };
        self.errors.push(Syntax::new(message, token.span, at));
    }

    fn error(&mut self, message: &str) {
        if self.panic_mode { return; }
        self.panic_mode = true;

        let token = self.previous.clone();
        let at = if token.item.kind == TokenKind::Eof { None } else { Some(token.item.lexeme.clone()) };
        self.errors.push(Syntax::new(message, token.span, at));
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;

        while self.current.item.kind != TokenKind::Eof {
            if self.previous.item.kind == TokenKind::Semicolon { return; }

            use TokenKind::*;
            if matches!(self.current.item.kind, Class | Fun | Var | For | If | While | Print | Return) {
                return;
            }

            self.advance();
        }
    }

    fn line(&self) -> i32 {
        self.previous.span.line() as i32
    }

    // --- emission helpers ---

    fn emit_op(&mut self, op: Opcode) {
        let line = self.line();
        self.chunk.write_op(op, line);
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.line();
        self.chunk.write_byte(byte, line);
    }

    fn emit_op_byte(&mut self, op: Opcode, operand: u8) {
        self.emit_op(op);
        self.emit_byte(operand);
    }

    fn emit_jump(&mut self, op: Opcode) -> usize {
        self.emit_op(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.chunk.code.len() - 2
    }

    fn patch_jump(&mut self, offset: usize) {
        let jump = self.chunk.code.len() - offset - 2;
        if jump > u16::MAX as usize {
            self.error("Too much code to jump over.");
            return;
        }
        self.chunk.code[offset] = ((jump >> 8) & 0xff) as u8;
        self.chunk.code[offset + 1] = (jump & 0xff) as u8;
    }

    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(Opcode::Loop);
        let offset = self.chunk.code.len() - loop_start + 2;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
            return;
        }
        self.emit_byte(((offset >> 8) & 0xff) as u8);
        self.emit_byte((offset & 0xff) as u8);
    }

    fn make_constant(&mut self, value: Value) -> CResult<u8> {
        let index = self.chunk.add_constant(value);
        if index > u8::MAX as usize {
            self.error("Too many constants in one chunk.");
            return Err(());
        }
        Ok(index as u8)
    }

    fn identifier_constant(&mut self, name: &str) -> CResult<u8> {
        let obj = self.interner.intern(name);
        self.make_constant(Value::Obj(obj))
    }

    // --- scopes & locals ---

    fn begin_scope(&mut self) {
        self.scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.scope_depth -= 1;
        while let Some(local) = self.locals.last() {
            if local.depth > self.scope_depth {
                self.emit_op(Opcode::Pop);
                self.locals.pop();
            } else {
                break;
            }
        }
    }

    fn add_local(&mut self, name: String) {
        if self.locals.len() >= 256 {
            self.error("Too many local variables in scope.");
            return;
        }
        self.locals.push(Local { name, depth: -1 });
    }

    fn declare_variable(&mut self) {
        if self.scope_depth == 0 { return; }

        let name = self.previous.item.lexeme.clone();
        for local in self.locals.iter().rev() {
            if local.depth != -1 && local.depth < self.scope_depth { break; }
            if local.name == name {
                self.error("Already a variable with this name in this scope.");
                return;
            }
        }

        self.add_local(name);
    }

    fn mark_initialized(&mut self) {
        if self.scope_depth == 0 { return; }
        if let Some(local) = self.locals.last_mut() {
            local.depth = self.scope_depth;
        }
    }

    fn resolve_local(&mut self, name: &str) -> CResult<Option<u8>> {
        for (i, local) in self.locals.iter().enumerate().rev() {
            if local.name == name {
                if local.depth == -1 {
                    self.error("Can't read local variable in its own initializer.");
                    return Err(());
                }
                return Ok(Some(i as u8));
            }
        }
        Ok(None)
    }

    fn parse_variable(&mut self, message: &str) -> CResult<u8> {
        self.consume(TokenKind::Identifier, message)?;
        self.declare_variable();
        if self.scope_depth > 0 { return Ok(0); }
        let name = self.previous.item.lexeme.clone();
        self.identifier_constant(&name)
    }

    fn define_variable(&mut self, global: u8) {
        if self.scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_op_byte(Opcode::DefineGlobal, global);
    }

    // --- declarations & statements ---

    fn declaration(&mut self) -> CResult<()> {
        if self.matches(TokenKind::Var) {
            self.var_declaration()
        } else if matches!(self.current.item.kind, TokenKind::Fun | TokenKind::Class) {
            self.advance();
            self.error("Functions and classes are not supported by this engine.");
            Err(())
        } else {
            self.statement()
        }
    }

    fn var_declaration(&mut self) -> CResult<()> {
        let global = self.parse_variable("Expect variable name.")?;

        if self.matches(TokenKind::Equal) {
            self.expression()?;
        } else {
            self.emit_op(Opcode::Nil);
        }

        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.")?;
        self.define_variable(global);
        Ok(())
    }

    fn statement(&mut self) -> CResult<()> {
        if self.matches(TokenKind::Print) {
            self.print_statement()
        } else if self.matches(TokenKind::If) {
            self.if_statement()
        } else if self.matches(TokenKind::While) {
            self.while_statement()
        } else if self.matches(TokenKind::For) {
            self.for_statement()
        } else if self.matches(TokenKind::Return) {
            self.error("Return is not supported by this engine.");
            Err(())
        } else if self.matches(TokenKind::LeftBrace) {
            self.begin_scope();
            let result = self.block();
            self.end_scope();
            result
        } else {
            self.expression_statement()
        }
    }

    fn block(&mut self) -> CResult<()> {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            match self.declaration() {
                Ok(()) => {},
                Err(()) => self.synchronize(),
            }
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.")
    }

    fn print_statement(&mut self) -> CResult<()> {
        self.expression()?;
        self.consume(TokenKind::Semicolon, "Expect ';' after value.")?;
        self.emit_op(Opcode::Print);
        Ok(())
    }

    fn expression_statement(&mut self) -> CResult<()> {
        self.expression()?;
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.")?;
        self.emit_op(Opcode::Pop);
        Ok(())
    }

    fn if_statement(&mut self) -> CResult<()> {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.")?;
        self.expression()?;
        self.consume(TokenKind::RightParen, "Expect ')' after condition.")?;

        let then_jump = self.emit_jump(Opcode::JumpIfFalse);
        self.emit_op(Opcode::Pop);
        self.statement()?;

        let else_jump = self.emit_jump(Opcode::Jump);
        self.patch_jump(then_jump);
        self.emit_op(Opcode::Pop);

        if self.matches(TokenKind::Else) {
            self.statement()?;
        }
        self.patch_jump(else_jump);
        Ok(())
    }

    fn while_statement(&mut self) -> CResult<()> {
        let loop_start = self.chunk.code.len();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.")?;
        self.expression()?;
        self.consume(TokenKind::RightParen, "Expect ')' after condition.")?;

        let exit_jump = self.emit_jump(Opcode::JumpIfFalse);
        self.emit_op(Opcode::Pop);
        self.statement()?;
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(Opcode::Pop);
        Ok(())
    }

    fn for_statement(&mut self) -> CResult<()> {
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.")?;

        if self.matches(TokenKind::Semicolon) {
            // no initializer
        } else if self.matches(TokenKind::Var) {
            self.var_declaration()?;
        } else {
            self.expression_statement()?;
        }

        let mut loop_start = self.chunk.code.len();
        let mut exit_jump = None;

        if !self.matches(TokenKind::Semicolon) {
            self.expression()?;
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.")?;
            exit_jump = Some(self.emit_jump(Opcode::JumpIfFalse));
            self.emit_op(Opcode::Pop);
        }

        if !self.matches(TokenKind::RightParen) {
            let body_jump = self.emit_jump(Opcode::Jump);
            let increment_start = self.chunk.code.len();
            self.expression()?;
            self.emit_op(Opcode::Pop);
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.")?;

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement()?;
        self.emit_loop(loop_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit_op(Opcode::Pop);
        }

        self.end_scope();
        Ok(())
    }

    // --- expressions (Pratt parsing) ---

    fn expression(&mut self) -> CResult<()> {
        self.parse_precedence(Precedence::Assignment)
    }

    fn parse_precedence(&mut self, precedence: Precedence) -> CResult<()> {
        self.advance();
        let prefix = rule(self.previous.item.kind).prefix;
        let Some(prefix) = prefix else {
            self.error("Expect expression.");
            return Err(());
        };

        let can_assign = precedence <= Precedence::Assignment;
        prefix(self, can_assign)?;

        while precedence <= rule(self.current.item.kind).precedence {
            self.advance();
            let infix = rule(self.previous.item.kind).infix.expect("infix token must have an infix rule");
            infix(self, can_assign)?;
        }

        if can_assign && self.matches(TokenKind::Equal) {
            self.error("Invalid assignment target.");
            return Err(());
        }

        Ok(())
    }

    fn number(&mut self, _can_assign: bool) -> CResult<()> {
        let value = match &self.previous.item.literal {
            Some(Literal::Number(n)) => *n,
            _ => unreachable!("Number token always carries a numeric literal"),
        };
        let index = self.make_constant(Value::Number(value))?;
        self.emit_op_byte(Opcode::Constant, index);
        Ok(())
    }

    fn string(&mut self, _can_assign: bool) -> CResult<()> {
        let text = match &self.previous.item.literal {
            Some(Literal::Str(s)) => s.clone(),
            _ => unreachable!("String token always carries a string literal"),
        };
        let obj = self.interner.intern(&text);
        let index = self.make_constant(Value::Obj(obj))?;
        self.emit_op_byte(Opcode::Constant, index);
        Ok(())
    }

    fn literal(&mut self, _can_assign: bool) -> CResult<()> {
        match self.previous.item.kind {
            TokenKind::False => self.emit_op(Opcode::False),
            TokenKind::True => self.emit_op(Opcode::True),
            TokenKind::Nil => self.emit_op(Opcode::Nil),
            _ => unreachable!("literal() only dispatched for false/true/nil"),
        }
        Ok(())
    }

    fn grouping(&mut self, _can_assign: bool) -> CResult<()> {
        self.expression()?;
        self.consume(TokenKind::RightParen, "Expect ')' after expression.")
    }

    fn unary(&mut self, _can_assign: bool) -> CResult<()> {
        let kind = self.previous.item.kind;
        self.parse_precedence(Precedence::Unary)?;
        match kind {
            TokenKind::Minus => self.emit_op(Opcode::Negate),
            TokenKind::Bang => self.emit_op(Opcode::Not),
            _ => unreachable!("unary() only dispatched for '-'/'!'"),
        }
        Ok(())
    }

    fn binary(&mut self, _can_assign: bool) -> CResult<()> {
        let kind = self.previous.item.kind;
        let next_precedence = rule(kind).precedence.next();
        self.parse_precedence(next_precedence)?;

        use TokenKind::*;
        match kind {
            Plus => self.emit_op(Opcode::Add),
            Minus => self.emit_op(Opcode::Sub),
            Star => self.emit_op(Opcode::Mul),
            Slash => self.emit_op(Opcode::Div),
            EqualEqual => self.emit_op(Opcode::Equal),
            BangEqual => { self.emit_op(Opcode::Equal); self.emit_op(Opcode::Not); },
            Greater => self.emit_op(Opcode::Greater),
            GreaterEqual => { self.emit_op(Opcode::Less); self.emit_op(Opcode::Not); },
            Less => self.emit_op(Opcode::Less),
            LessEqual => { self.emit_op(Opcode::Greater); self.emit_op(Opcode::Not); },
            _ => unreachable!("binary() only dispatched for known operator tokens"),
        }
        Ok(())
    }

    fn and(&mut self, _can_assign: bool) -> CResult<()> {
        let end_jump = self.emit_jump(Opcode::JumpIfFalse);
        self.emit_op(Opcode::Pop);
        self.parse_precedence(Precedence::And)?;
        self.patch_jump(end_jump);
        Ok(())
    }

    fn or(&mut self, _can_assign: bool) -> CResult<()> {
        let else_jump = self.emit_jump(Opcode::JumpIfFalse);
        let end_jump = self.emit_jump(Opcode::Jump);

        self.patch_jump(else_jump);
        self.emit_op(Opcode::Pop);

        self.parse_precedence(Precedence::Or)?;
        self.patch_jump(end_jump);
        Ok(())
    }

    fn variable(&mut self, can_assign: bool) -> CResult<()> {
        let name = self.previous.item.lexeme.clone();
        self.named_variable(&name, can_assign)
    }

    fn named_variable(&mut self, name: &str, can_assign: bool) -> CResult<()> {
        let local = self.resolve_local(name)?;

        let (get_op, set_op, arg) = if let Some(slot) = local {
            (Opcode::GetLocal, Opcode::SetLocal, slot)
        } else {
            let arg = self.identifier_constant(name)?;
            (Opcode::GetGlobal, Opcode::SetGlobal, arg)
        };

        if can_assign && self.matches(TokenKind::Equal) {
            self.expression()?;
            self.emit_op_byte(set_op, arg);
        } else {
            self.emit_op_byte(get_op, arg);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;
    use crate::common::source::Source;

    fn compile(src: &str) -> Result<Chunk, Vec<Syntax>> {
        let mut interner = Interner::new();
        Compiler::compile(Source::source(src), &mut interner)
    }

    #[test]
    fn compiles_arithmetic_expression_statement() {
        let chunk = compile("1 + 2 * 3;").expect("should compile");
        assert!(chunk.code.contains(&(Opcode::Add as u8)));
        assert!(chunk.code.contains(&(Opcode::Mul as u8)));
        assert_eq!(*chunk.code.last().unwrap(), Opcode::Return as u8);
    }

    #[test]
    fn reports_error_for_unsupported_function_declarations() {
        let errors = compile("fun f() {}").unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn rejects_self_referential_local_initializer() {
        let errors = compile("{ var a = a; }").unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("own initializer")));
    }

    #[test]
    fn globals_and_locals_compile_distinct_opcodes() {
        let chunk = compile("var x = 1; { var y = 2; print x + y; }").expect("should compile");
        assert!(chunk.code.contains(&(Opcode::DefineGlobal as u8)));
        assert!(chunk.code.contains(&(Opcode::GetLocal as u8)));
        assert!(chunk.code.contains(&(Opcode::GetGlobal as u8)));
    }

    /// §8 property 7: for every `JUMP*`/`LOOP` this compiler emits, the
    /// 16-bit operand equals the actual byte distance to its target.
    /// Walks every jump/loop instruction in the chunk and recomputes what
    /// its target offset implies, rather than trusting `patch_jump`/
    /// `emit_loop` to have done their own arithmetic correctly.
    fn assert_jumps_land_on_their_encoded_targets(chunk: &Chunk) {
        let mut ip = 0;
        while ip < chunk.code.len() {
            let op = Opcode::from_u8(chunk.code[ip]).expect("valid opcode");
            match op {
                Opcode::Jump | Opcode::JumpIfFalse => {
                    let offset = ((chunk.code[ip + 1] as usize) << 8) | chunk.code[ip + 2] as usize;
                    let target = ip + 3 + offset;
                    assert!(target <= chunk.code.len(), "jump target out of bounds");
                    ip += 3;
                },
                Opcode::Loop => {
                    let offset = ((chunk.code[ip + 1] as usize) << 8) | chunk.code[ip + 2] as usize;
                    assert!(offset <= ip + 3, "loop target out of bounds");
                    ip += 3;
                },
                Opcode::Constant | Opcode::GetLocal | Opcode::SetLocal | Opcode::GetGlobal
                | Opcode::SetGlobal | Opcode::DefineGlobal => ip += 2,
                _ => ip += 1,
            }
        }
    }

    #[test]
    fn if_while_for_and_logical_ops_patch_jumps_in_bounds() {
        for src in [
            "if (1 < 2) { print 1; } else { print 2; }",
            "while (true) { print 1; }",
            "for (var i = 0; i < 10; i = i + 1) { print i; }",
            "var x = true and false or true;",
        ] {
            let chunk = compile(src).expect("should compile");
            assert_jumps_land_on_their_encoded_targets(&chunk);
        }
    }

    proptest! {
        #[test]
        fn doesnt_crash_on_arbitrary_text(s in "\\PC*") {
            let mut interner = Interner::new();
            let result = Compiler::compile(Source::source(&s), &mut interner);
            format!("{:?}", result.is_ok());
        }

        #[test]
        fn nested_if_chains_always_patch_in_bounds(depth in 1usize..8) {
            let mut src = String::new();
            for _ in 0..depth {
                src.push_str("if (true) {");
            }
            src.push_str("print 1;");
            for _ in 0..depth {
                src.push('}');
            }
            let chunk = compile(&src).expect("should compile");
            assert_jumps_land_on_their_encoded_targets(&chunk);
        }
    }
}
