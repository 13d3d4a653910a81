//! The single-pass compiler: a precedence-climbing parser that emits bytecode
//! as it goes. No AST is ever built; expressions are translated to stack
//! operations in the order the parser discovers them.

use crate::chunk::PendingJump;
use crate::prelude::{Chunk, InterpretationError, OpCode, Value};
use crate::scanner::{Scanner, Token, TokenType};
use crate::strings::ActiveStrings;

/// Compiles Atto source code into a [Chunk] of bytecode.
///
/// On any compile error a diagnostic is written to standard error,
/// compilation continues to surface further errors, and the whole call
/// returns `Err(CompileError)` at the end. String and identifier constants
/// in the returned chunk point into `strings`, so the chunk must not outlive
/// the token.
pub fn compile(source: &str, strings: &ActiveStrings) -> crate::Result<Chunk> {
    let mut compiler = Compiler::new(source, strings);

    compiler.advance();
    while !compiler.match_token(TokenType::Eof) {
        compiler.declaration();
    }
    compiler.finish();

    if compiler.parser.had_error {
        Err(InterpretationError::CompileError)
    } else {
        Ok(compiler.chunk)
    }
}

/// Binding strength of an operator, loosest first. Each infix rule re-enters
/// the parser one level higher than its own, which is what makes binary
/// operators left-associative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    /// `=`
    Assignment,
    /// `or`
    Or,
    /// `and`
    And,
    /// `==` `!=`
    Equality,
    /// `<` `>` `<=` `>=`
    Comparison,
    /// `+` `-`
    Term,
    /// `*` `/`
    Factor,
    /// `!` unary `-`
    Unary,
    Call,
    Primary,
}

impl Precedence {
    /// The next-tightest binding level.
    fn one_higher(self) -> Precedence {
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
            Call => Primary,
            Primary => Primary,
        }
    }
}

/// What to do with a token found in prefix position.
#[derive(Debug, Clone, Copy)]
enum Prefix {
    Grouping,
    Unary,
    Number,
    StrLiteral,
    Literal,
    Variable,
}

/// What to do with a token found in infix position.
#[derive(Debug, Clone, Copy)]
enum Infix {
    Binary,
    And,
    Or,
}

/// One row of the parse table: how a token behaves in prefix and infix
/// position, and how tightly it binds as an infix operator.
struct Rule {
    prefix: Option<Prefix>,
    infix: Option<Infix>,
    precedence: Precedence,
}

impl Rule {
    const fn new(prefix: Option<Prefix>, infix: Option<Infix>, precedence: Precedence) -> Rule {
        Rule {
            prefix,
            infix,
            precedence,
        }
    }
}

/// The parse table. Tokens absent from the expression grammar get a rule
/// with no parse functions and no binding strength.
fn rule_for(ttype: TokenType) -> Rule {
    use TokenType as T;
    match ttype {
        T::LeftParen => Rule::new(Some(Prefix::Grouping), None, Precedence::None),
        T::Minus => Rule::new(Some(Prefix::Unary), Some(Infix::Binary), Precedence::Term),
        T::Plus => Rule::new(None, Some(Infix::Binary), Precedence::Term),
        T::Slash => Rule::new(None, Some(Infix::Binary), Precedence::Factor),
        T::Star => Rule::new(None, Some(Infix::Binary), Precedence::Factor),
        T::Bang => Rule::new(Some(Prefix::Unary), None, Precedence::None),
        T::BangEqual => Rule::new(None, Some(Infix::Binary), Precedence::Equality),
        T::EqualEqual => Rule::new(None, Some(Infix::Binary), Precedence::Equality),
        T::Greater => Rule::new(None, Some(Infix::Binary), Precedence::Comparison),
        T::GreaterEqual => Rule::new(None, Some(Infix::Binary), Precedence::Comparison),
        T::Less => Rule::new(None, Some(Infix::Binary), Precedence::Comparison),
        T::LessEqual => Rule::new(None, Some(Infix::Binary), Precedence::Comparison),
        T::Identifier => Rule::new(Some(Prefix::Variable), None, Precedence::None),
        T::StrLiteral => Rule::new(Some(Prefix::StrLiteral), None, Precedence::None),
        T::Number => Rule::new(Some(Prefix::Number), None, Precedence::None),
        T::And => Rule::new(None, Some(Infix::And), Precedence::And),
        T::Or => Rule::new(None, Some(Infix::Or), Precedence::Or),
        T::True => Rule::new(Some(Prefix::Literal), None, Precedence::None),
        T::False => Rule::new(Some(Prefix::Literal), None, Precedence::None),
        T::None => Rule::new(Some(Prefix::Literal), None, Precedence::None),
        _ => Rule::new(None, None, Precedence::None),
    }
}

/// Single-token lookahead plus the error flags for panic-mode recovery.
struct ParserState<'a> {
    previous: Token<'a>,
    current: Token<'a>,
    had_error: bool,
    panic_mode: bool,
}

/// A named local and the scope depth it was declared at. `depth` stays `None`
/// from the declaration until the initializer has been compiled; reading the
/// local in that window is a compile error.
struct Local<'a> {
    name: &'a str,
    depth: Option<usize>,
}

/// Compile-time bookkeeping for locals. The index of a local in `locals` is,
/// by construction, the operand-stack slot its value occupies at runtime.
#[derive(Default)]
struct LocalStack<'a> {
    locals: Vec<Local<'a>>,
    scope_depth: usize,
}

/// Local slots are single-byte operands.
const MAX_LOCALS: usize = 256;

struct Compiler<'a> {
    scanner: Scanner<'a>,
    parser: ParserState<'a>,
    chunk: Chunk,
    locals: LocalStack<'a>,
    strings: &'a ActiveStrings,
}

impl<'a> Compiler<'a> {
    fn new(source: &'a str, strings: &'a ActiveStrings) -> Compiler<'a> {
        let placeholder = Token {
            ttype: TokenType::Eof,
            lexeme: "",
            line: 0,
        };

        Compiler {
            scanner: Scanner::new(source),
            parser: ParserState {
                previous: placeholder,
                current: placeholder,
                had_error: false,
                panic_mode: false,
            },
            chunk: Chunk::new(),
            locals: LocalStack::default(),
            strings,
        }
    }

    ////////////////////////////////////// Token plumbing //////////////////////////////////////

    /// Moves the lookahead one token forward, reporting (and skipping) any
    /// error tokens the scanner yields along the way.
    fn advance(&mut self) {
        self.parser.previous = self.parser.current;

        loop {
            self.parser.current = self.scanner.scan_token();
            if self.parser.current.ttype != TokenType::Error {
                break;
            }

            let message = self.parser.current.lexeme;
            self.error_at_current(message);
        }
    }

    /// Consumes the current token if it has the expected type; reports
    /// `message` otherwise.
    fn eat(&mut self, ttype: TokenType, message: &str) {
        if self.parser.current.ttype == ttype {
            self.advance();
            return;
        }

        self.error_at_current(message);
    }

    /// Consumes the current token iff it has the given type.
    fn match_token(&mut self, ttype: TokenType) -> bool {
        if !self.check_token(ttype) {
            return false;
        }
        self.advance();
        true
    }

    fn check_token(&self, ttype: TokenType) -> bool {
        self.parser.current.ttype == ttype
    }

    ////////////////////////////////////// Declarations //////////////////////////////////////

    fn declaration(&mut self) {
        if self.match_token(TokenType::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }

        if self.parser.panic_mode {
            self.synchronize();
        }
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expected a variable name");

        if self.match_token(TokenType::Equal) {
            self.expression();
        } else {
            self.emit(OpCode::None);
        }

        self.eat(TokenType::Semicolon, "Expected ';' after expression");

        self.define_variable(global);
    }

    fn statement(&mut self) {
        if self.match_token(TokenType::Print) {
            self.print_statement();
        } else if self.match_token(TokenType::If) {
            self.if_statement();
        } else if self.match_token(TokenType::While) {
            self.while_statement();
        } else if self.match_token(TokenType::For) {
            self.for_statement();
        } else if self.match_token(TokenType::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !self.check_token(TokenType::RightBrace) && !self.check_token(TokenType::Eof) {
            self.declaration();
        }

        self.eat(TokenType::RightBrace, "Expected '}' after declaration");
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.eat(TokenType::Semicolon, "Expected ';' after expression");
        self.emit(OpCode::Pop);
    }

    fn print_statement(&mut self) {
        self.eat(TokenType::LeftParen, "Expected a '('");
        self.expression();
        self.eat(TokenType::RightParen, "Expected a ')'");
        self.eat(TokenType::Semicolon, "Expected ';' after expression");
        self.emit(OpCode::Print);
    }

    fn if_statement(&mut self) {
        self.eat(TokenType::LeftParen, "Expected a '('");
        self.expression();
        self.eat(TokenType::RightParen, "Expected a ')'");

        // The condition is peeked, not popped, by JumpIfFalse; both arms of
        // the branch discard it themselves.
        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit(OpCode::Pop);
        self.statement();

        let else_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(then_jump);
        self.emit(OpCode::Pop);

        if self.match_token(TokenType::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.chunk.len();

        self.eat(TokenType::LeftParen, "Expected a '('");
        self.expression();
        self.eat(TokenType::RightParen, "Expected a ')'");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit(OpCode::Pop);
        self.statement();

        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit(OpCode::Pop);
    }

    fn for_statement(&mut self) {
        // A variable declared in the initializer clause is scoped to the loop.
        self.begin_scope();

        self.eat(TokenType::LeftParen, "Expected a '('");

        if self.match_token(TokenType::Semicolon) {
            // No initializer.
        } else if self.match_token(TokenType::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.chunk.len();
        let mut exit_jump = None;

        if !self.match_token(TokenType::Semicolon) {
            self.expression();
            self.eat(TokenType::Semicolon, "Expected a ';' after loop condition");

            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit(OpCode::Pop);
        }

        if !self.match_token(TokenType::RightParen) {
            // The increment clause textually precedes the body but runs after
            // it: jump over it now, and have the body loop back to it.
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.chunk.len();

            self.expression();
            self.emit(OpCode::Pop);
            self.eat(TokenType::RightParen, "Expected a ')'");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit(OpCode::Pop);
        }

        self.end_scope();
    }

    /// Emits the final [OpCode::Return] that stops the VM.
    fn finish(&mut self) {
        self.emit(OpCode::Return);

        if cfg!(feature = "trace_compilation") && !self.parser.had_error {
            crate::debug::disassemble_chunk(&self.chunk, "code");
        }
    }

    ////////////////////////////////////// Expressions //////////////////////////////////////

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    /// The heart of the parser: parses anything at least as tightly binding
    /// as `precedence`, dispatching through the rule table.
    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();

        let Some(prefix) = rule_for(self.parser.previous.ttype).prefix else {
            self.error_at_current("Expected expression");
            return;
        };

        // Assignment binds loosest of all; only a parse that started loose
        // enough may treat `=` as assignment rather than as a stray token.
        let can_assign = precedence <= Precedence::Assignment;
        self.run_prefix(prefix, can_assign);

        while precedence <= rule_for(self.parser.current.ttype).precedence {
            self.advance();
            if let Some(infix) = rule_for(self.parser.previous.ttype).infix {
                self.run_infix(infix, can_assign);
            }
        }

        if can_assign && self.match_token(TokenType::Equal) {
            self.error_at_current("Invalid assignment target.");
        }
    }

    fn run_prefix(&mut self, rule: Prefix, can_assign: bool) {
        match rule {
            Prefix::Grouping => self.grouping(),
            Prefix::Unary => self.unary(),
            Prefix::Number => self.number(),
            Prefix::StrLiteral => self.string(),
            Prefix::Literal => self.literal(),
            Prefix::Variable => self.variable(can_assign),
        }
    }

    fn run_infix(&mut self, rule: Infix, _can_assign: bool) {
        match rule {
            Infix::Binary => self.binary(),
            Infix::And => self.and_operator(),
            Infix::Or => self.or_operator(),
        }
    }

    fn grouping(&mut self) {
        self.expression();
        self.eat(TokenType::RightParen, "Expected ')' after expression");
    }

    fn unary(&mut self) {
        let operator = self.parser.previous.ttype;

        // Compile the operand first; the operator applies to its result.
        self.parse_precedence(Precedence::Unary);

        match operator {
            TokenType::Minus => self.emit(OpCode::Negate),
            TokenType::Bang => self.emit(OpCode::Not),
            _ => unreachable!("only '-' and '!' have a unary rule"),
        }
    }

    fn binary(&mut self) {
        let operator = self.parser.previous.ttype;
        let rule = rule_for(operator);

        self.parse_precedence(rule.precedence.one_higher());

        match operator {
            TokenType::Plus => self.emit(OpCode::Add),
            TokenType::Minus => self.emit(OpCode::Subtract),
            TokenType::Star => self.emit(OpCode::Multiply),
            TokenType::Slash => self.emit(OpCode::Divide),
            TokenType::EqualEqual => self.emit(OpCode::Equal),
            TokenType::BangEqual => {
                // a != b  ≡  !(a == b); same for the derived comparisons.
                self.emit(OpCode::Equal);
                self.emit(OpCode::Not);
            }
            TokenType::Greater => self.emit(OpCode::Greater),
            TokenType::GreaterEqual => {
                self.emit(OpCode::Less);
                self.emit(OpCode::Not);
            }
            TokenType::Less => self.emit(OpCode::Less),
            TokenType::LessEqual => {
                self.emit(OpCode::Greater);
                self.emit(OpCode::Not);
            }
            _ => unreachable!("only binary operators have a binary rule"),
        }
    }

    /// `and` short-circuits: when the left side is falsy the right side is
    /// never evaluated, and the left value is the result.
    fn and_operator(&mut self) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);

        self.emit(OpCode::Pop);
        self.parse_precedence(Precedence::And);

        self.patch_jump(end_jump);
    }

    /// `or` short-circuits: when the left side is truthy it is the result and
    /// the right side is never evaluated.
    fn or_operator(&mut self) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);

        self.patch_jump(else_jump);
        self.emit(OpCode::Pop);

        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    fn number(&mut self) {
        let value: f64 = self
            .parser
            .previous
            .lexeme
            .parse()
            .expect("the scanner only yields valid number lexemes");
        self.emit_constant(value.into());
    }

    fn string(&mut self) {
        let lexeme = self.parser.previous.lexeme;
        // Strip the surrounding quotes.
        let text = &lexeme[1..lexeme.len() - 1];
        let interned = self.strings.store(text.to_owned());
        self.emit_constant(Value::Str(interned));
    }

    fn literal(&mut self) {
        match self.parser.previous.ttype {
            TokenType::None => self.emit(OpCode::None),
            TokenType::True => self.emit(OpCode::True),
            TokenType::False => self.emit(OpCode::False),
            _ => unreachable!("only literal keywords have a literal rule"),
        }
    }

    fn variable(&mut self, can_assign: bool) {
        self.named_variable(self.parser.previous, can_assign);
    }

    /// Compiles a read of, or an assignment to, a named variable, deciding
    /// between the local and global opcode pairs.
    fn named_variable(&mut self, name: Token<'a>, can_assign: bool) {
        let (get_op, set_op, argument) = match self.resolve_local(name.lexeme) {
            Some(slot) => (OpCode::GetLocal, OpCode::SetLocal, slot as u8),
            None => {
                let index = self.identifier_constant(name.lexeme);
                (OpCode::GetGlobal, OpCode::SetGlobal, index)
            }
        };

        if can_assign && self.match_token(TokenType::Equal) {
            self.expression();
            self.emit_with_operand(set_op, argument);
        } else {
            self.emit_with_operand(get_op, argument);
        }
    }

    ////////////////////////////////////// Variables and scope //////////////////////////////////////

    /// Consumes an identifier. For a global, interns the name in the constant
    /// pool and returns its index; for a local, records it on the locals
    /// stack and the returned index is unused.
    fn parse_variable(&mut self, message: &str) -> u8 {
        self.eat(TokenType::Identifier, message);

        self.declare_variable();
        if self.locals.scope_depth > 0 {
            return 0;
        }

        self.identifier_constant(self.parser.previous.lexeme)
    }

    /// Interns `name` and adds it to the constant pool, so the VM can look
    /// the variable up by name at runtime.
    fn identifier_constant(&mut self, name: &str) -> u8 {
        let interned = self.strings.store(name.to_owned());
        match self.chunk.add_constant(Value::Str(interned)) {
            Some(index) => index,
            None => {
                self.error_at_current("Too many constants in one chunk");
                0
            }
        }
    }

    /// Records a local declaration. Globals are late-bound by name and need
    /// no declaration step.
    fn declare_variable(&mut self) {
        if self.locals.scope_depth == 0 {
            return;
        }

        let name = self.parser.previous.lexeme;

        // Only the current scope is checked for redeclaration; shadowing an
        // outer scope's name is fine.
        let mut duplicate = false;
        for local in self.locals.locals.iter().rev() {
            if local.depth.is_some_and(|depth| depth < self.locals.scope_depth) {
                break;
            }
            if local.name == name {
                duplicate = true;
            }
        }
        if duplicate {
            self.error_at_current("A variable assigned to this name already exists in this scope");
        }

        self.add_local(name);
    }

    fn add_local(&mut self, name: &'a str) {
        if self.locals.locals.len() >= MAX_LOCALS {
            self.error_at_current("Too many local variables in scope");
            return;
        }

        // The depth stays unset until the initializer has been compiled.
        self.locals.locals.push(Local { name, depth: None });
    }

    /// Finds the stack slot of the innermost local with this name, or `None`
    /// if the name must be a global.
    fn resolve_local(&mut self, name: &str) -> Option<usize> {
        let found = self.locals.locals.iter().rposition(|l| l.name == name);

        if let Some(slot) = found {
            if self.locals.locals[slot].depth.is_none() {
                self.error_at_current("Unable to read local variable in its own initializer.");
            }
            return Some(slot);
        }

        None
    }

    /// Makes the innermost local visible; called once its initializer is done.
    fn mark_initialized(&mut self) {
        let depth = self.locals.scope_depth;
        if let Some(local) = self.locals.locals.last_mut() {
            local.depth = Some(depth);
        }
    }

    fn define_variable(&mut self, global: u8) {
        if self.locals.scope_depth > 0 {
            // A local's value is already sitting in its slot on the stack;
            // nothing to emit.
            self.mark_initialized();
            return;
        }

        self.emit_with_operand(OpCode::DefineGlobal, global);
    }

    fn begin_scope(&mut self) {
        self.locals.scope_depth += 1;
    }

    /// Leaves a scope, popping every local declared inside it so the runtime
    /// stack shrinks back to its depth from before the block.
    fn end_scope(&mut self) {
        self.locals.scope_depth -= 1;
        let depth = self.locals.scope_depth;

        while self
            .locals
            .locals
            .last()
            .is_some_and(|local| local.depth.is_some_and(|d| d > depth))
        {
            self.emit(OpCode::Pop);
            self.locals.locals.pop();
        }
    }

    ////////////////////////////////////// Bytecode emission //////////////////////////////////////

    fn emit(&mut self, opcode: OpCode) {
        self.chunk.write_opcode(opcode, self.parser.previous.line);
    }

    fn emit_with_operand(&mut self, opcode: OpCode, operand: u8) {
        self.chunk
            .write_opcode(opcode, self.parser.previous.line)
            .with_operand(operand);
    }

    fn emit_constant(&mut self, value: Value) {
        let line = self.parser.previous.line;
        match self.chunk.add_constant(value) {
            Some(index) => self
                .chunk
                .write_opcode(OpCode::Constant, line)
                .with_operand(index),
            None => self.error_at_current("Too many constants in one chunk"),
        }
    }

    fn emit_jump(&mut self, opcode: OpCode) -> PendingJump {
        self.chunk.write_jump(opcode, self.parser.previous.line)
    }

    fn patch_jump(&mut self, jump: PendingJump) {
        if self.chunk.patch_jump(jump).is_err() {
            self.error_at_current("The previous jump offset was too large");
        }
    }

    fn emit_loop(&mut self, loop_start: usize) {
        if self
            .chunk
            .write_loop(loop_start, self.parser.previous.line)
            .is_err()
        {
            self.error_at_current("The previous while offset was too large");
        }
    }

    ////////////////////////////////////// Error handling //////////////////////////////////////

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.parser.current, message);
    }

    /// Reports one diagnostic and sets panic mode. While panicking, further
    /// reports are swallowed until [Compiler::synchronize] runs.
    fn error_at(&mut self, token: Token<'a>, message: &str) {
        if self.parser.panic_mode {
            return;
        }
        self.parser.panic_mode = true;

        eprint!("<Line {}> Error ", token.line);
        match token.ttype {
            TokenType::Eof => eprint!("at the end of the file"),
            // The message of an error token already says what went wrong.
            TokenType::Error => {}
            _ => eprint!("at '{}'", token.lexeme),
        }
        eprintln!(": {message}");

        self.parser.had_error = true;
    }

    /// Skips tokens until a statement boundary, then leaves panic mode, so
    /// that one syntax error doesn't drown the rest of the file in noise.
    fn synchronize(&mut self) {
        self.parser.panic_mode = false;

        while self.parser.current.ttype != TokenType::Eof {
            if self.parser.previous.ttype == TokenType::Semicolon {
                return;
            }

            use TokenType::*;
            match self.parser.current.ttype {
                Class | Func | Var | For | If | While | Print | Return => return,
                _ => {}
            }

            self.advance();
        }
    }
}
