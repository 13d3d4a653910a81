//! The bytecode virtual machine.

use std::collections::HashMap;

use crate::chunk::BytecodeEntry;
use crate::compiler;
use crate::prelude::{Chunk, InterpretationError, OpCode, Value};
use crate::strings::ActiveStrings;

/// Used as the minimum capacity of the stack.
/// Since we're using a growable [Vec], the stack size can be arbitrarily
/// large.
const STACK_SIZE: usize = 256;

/// The Atto virtual machine.
///
/// The machine itself is stateless between calls: each [VM::interpret]
/// installs fresh string storage, compiles, and runs to completion. The state
/// that *does* exist during a run lives in [RunningVm], which can rely on
/// having a chunk.
#[derive(Default)]
pub struct VM {}

/// A VM with an active chunk.
struct RunningVm<'a> {
    /// Instruction pointer — index into the chunk for the next byte to be
    /// fetched.
    ip: usize,
    /// Value stack — modified as elements are pushed and popped by opcodes.
    stack: Vec<Value>,
    chunk: &'a Chunk,
    /// The global variables in this program, late-bound by name.
    globals: HashMap<&'a str, Value>,
    /// We don't touch the string table directly, but string values in the
    /// chunk point into it, so it must outlive the run.
    _strings: &'a ActiveStrings,
}

/// Gets the value of the current instruction pointer. To be used in
/// conjunction with [RunningVm::next_bytecode].
macro_rules! current_ip {
    ($self: ident) => {
        $self.ip - 1
    };
}

impl VM {
    /// Compiles and runs one piece of Atto source code.
    ///
    /// Program output goes to standard out; diagnostics go to standard error.
    pub fn interpret(&mut self, source: &str) -> crate::Result<()> {
        let strings = ActiveStrings::install();
        let chunk = compiler::compile(source, &strings)?;
        let mut vm = RunningVm {
            ip: 0,
            stack: Vec::with_capacity(STACK_SIZE),
            chunk: &chunk,
            globals: HashMap::default(),
            _strings: &strings,
        };
        vm.run()
    }
}

impl<'a> RunningVm<'a> {
    /// The main opcode interpreter loop.
    fn run(&mut self) -> crate::Result<()> {
        let chunk = self.chunk;

        loop {
            if cfg!(feature = "trace_execution") {
                use crate::debug::disassemble_instruction;

                // Prints the current stack:
                print!("        ");
                if self.stack.is_empty() {
                    print!("<empty>");
                } else {
                    for value in self.stack.iter() {
                        print!("[ {value:?} ]")
                    }
                }
                println!();

                // Print the next instruction:
                disassemble_instruction(chunk, self.ip);
            }

            let Some(opcode) = self
                .next_bytecode()
                .expect("I have an instruction pointer within range")
                .as_opcode()
            else {
                panic!("fetched invalid opcode at {}", current_ip!(self));
            };

            match opcode {
                OpCode::Constant => {
                    let constant = self
                        .next_bytecode()
                        .expect("there should be an operand")
                        .resolve_constant()
                        .expect("there should be a constant at this index");
                    self.push(constant);
                }
                OpCode::None => self.push(Value::None),
                OpCode::True => self.push(true.into()),
                OpCode::False => self.push(false.into()),
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::GetLocal => {
                    let slot = self.next_bytecode().expect("operand").as_operand();
                    self.push(*self.stack.get(slot).expect("local variable"));
                }
                OpCode::SetLocal => {
                    let slot = self.next_bytecode().expect("operand").as_operand();
                    // Assignment is an expression: the value stays on top of
                    // the stack as its result.
                    let value = self.peek(0);
                    self.stack[slot] = value;
                }
                OpCode::GetGlobal => {
                    let name = self.next_string_constant();
                    match self.globals.get(name) {
                        Some(&value) => self.push(value),
                        None => {
                            let message = format!("Undefined variable '{name}'");
                            return self.runtime_error(&message);
                        }
                    }
                }
                OpCode::DefineGlobal => {
                    let name = self.next_string_constant();
                    if self.globals.contains_key(name) {
                        let message = format!("Variable '{name}' is already defined");
                        return self.runtime_error(&message);
                    }
                    let value = self.pop();
                    self.globals.insert(name, value);
                }
                OpCode::SetGlobal => {
                    let name = self.next_string_constant();
                    if !self.globals.contains_key(name) {
                        let message = format!("Undefined variable '{name}'");
                        return self.runtime_error(&message);
                    }
                    // Like SetLocal, this leaves the value on the stack.
                    let value = self.peek(0);
                    self.globals.insert(name, value);
                }
                OpCode::Equal => {
                    let rhs = self.pop();
                    let lhs = self.pop();
                    // Equality is total: mismatched tags are simply unequal.
                    self.push((lhs == rhs).into());
                }
                OpCode::Greater => self.binary_op(|a, b| a > b)?,
                OpCode::Less => self.binary_op(|a, b| a < b)?,
                OpCode::Add => {
                    let rhs = self.pop();
                    let lhs = self.pop();

                    match (&lhs, &rhs) {
                        (Value::Number(a), Value::Number(b)) => self.push((a + b).into()),
                        (Value::Str(a), Value::Str(b)) => {
                            self.push(format!("{a}{b}").into());
                        }
                        _ => self.runtime_error("Can only add numbers or strings")?,
                    }
                }
                OpCode::Subtract => self.binary_op(|a, b| a - b)?,
                OpCode::Multiply => self.binary_op(|a, b| a * b)?,
                OpCode::Divide => self.binary_op(|a, b| a / b)?,
                OpCode::Not => {
                    let value = self.pop();
                    self.push(value.is_falsy().into());
                }
                OpCode::Negate => {
                    if let Value::Number(number) = self.pop() {
                        self.push((-number).into());
                    } else {
                        return self.runtime_error("Operand must be a number");
                    }
                }
                OpCode::Print => {
                    println!("{}", self.pop());
                }
                OpCode::Jump => {
                    let distance = self.read_short();
                    self.ip += distance;
                }
                OpCode::JumpIfFalse => {
                    // The distance is consumed either way; the condition is
                    // peeked and left for the branch arms to pop.
                    let distance = self.read_short();
                    if self.peek(0).is_falsy() {
                        self.ip += distance;
                    }
                }
                OpCode::Loop => {
                    let distance = self.read_short();
                    self.ip -= distance;
                }
                OpCode::Return => {
                    return Ok(());
                }
            }
        }
    }

    /// Raises a runtime error.
    fn runtime_error<T>(&mut self, message: &str) -> crate::Result<T> {
        eprintln!("{message}");

        let line = self
            .chunk
            .line_number_for(current_ip!(self))
            .expect("line number");
        eprintln!("[line {line}] in script");

        self.reset_stack();

        Err(InterpretationError::RuntimeError)
    }

    /// Pops two operands from the stack to perform a binary operation.
    fn binary_op<F, T>(&mut self, op: F) -> crate::Result<()>
    where
        F: Fn(f64, f64) -> T,
        T: Into<Value>,
    {
        let rhs = self.pop();
        let lhs = self.pop();

        use Value::Number;
        match (lhs, rhs) {
            (Number(a), Number(b)) => self.push(op(a, b).into()),
            (_, _) => self.runtime_error("Operands must be numbers")?,
        };

        Ok(())
    }

    /// Pushes a [Value] on to the value stack.
    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// Pops and returns the top [Value] on the value stack.
    ///
    /// # Panics
    ///
    /// Panics when the value stack is empty. Given well-formed Atto bytecode,
    /// a pop cannot occur when the value stack is empty; therefore the
    /// interpreter panics if it is in this state.
    #[inline(always)]
    fn pop(&mut self) -> Value {
        self.stack.pop().expect("value stack is empty")
    }

    /// Peek the nth value on the stack, starting from the top.
    ///
    /// # Panics
    ///
    /// Panics when trying to get a value too far down the stack.
    #[inline(always)]
    fn peek(&self, n: usize) -> Value {
        *self.stack.iter().rev().nth(n).expect("ran off the stack")
    }

    /// Clears the stack.
    #[inline(always)]
    fn reset_stack(&mut self) {
        self.stack.clear()
    }

    /// Fetches the next bytecode in the chunk, **AND** increments the
    /// instruction pointer.
    ///
    /// Note: use [current_ip] to get the "current" value of the instruction
    /// pointer being executed right now.
    #[inline]
    fn next_bytecode(&mut self) -> Option<BytecodeEntry<'_>> {
        let byte = self.chunk.get(self.ip);
        self.ip += 1;
        byte
    }

    /// Fetches a 16-bit big-endian jump distance, advancing the instruction
    /// pointer past both bytes.
    #[inline]
    fn read_short(&mut self) -> usize {
        let hi = self.next_bytecode().expect("jump operand").as_operand();
        let lo = self.next_bytecode().expect("jump operand").as_operand();
        (hi << 8) | lo
    }

    /// Fetches the next bytecode in the chunk and uses it to index the
    /// constant pool. The constant pulled out should be a string (such as a
    /// global variable name).
    ///
    /// Note: like [RunningVm::next_bytecode], this advances the instruction
    /// pointer.
    #[inline]
    fn next_string_constant(&mut self) -> &'static str {
        self.next_bytecode()
            .expect("there should be an operand")
            .resolve_constant()
            .expect("there should be a constant here")
            .to_str()
            .expect("the name must be a string")
    }
}
