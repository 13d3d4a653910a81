//! Helpers to print a debug representation of compiled bytecode.

use crate::chunk::{Chunk, OpCode};

/// Given a chunk, prints its disassembly to `stdout`.
pub fn disassemble_chunk(c: &Chunk, name: &str) {
    println!("== {name} ==");

    let mut offset = 0;
    while offset < c.len() {
        offset = disassemble_instruction(c, offset);
    }
}

/// Print one instruction from the [Chunk] to `stdout`, taking into account
/// its operands. Returns the offset of the next instruction.
pub fn disassemble_instruction(c: &Chunk, offset: usize) -> usize {
    print!("{:04} ", offset);

    if offset > 0 && at_same_line_as_previous_offset(c, offset) {
        print!("   | ");
    } else {
        let line_no = c.line_number_for(offset).unwrap();
        print!("{line_no:4} ")
    }

    let instruction = c
        .get(offset)
        .expect("offset too large")
        .as_opcode()
        .expect("Invalid byte for opcode");

    let name = mnemonic(instruction);
    use OpCode::*;
    match instruction {
        Constant | DefineGlobal | GetGlobal | SetGlobal => constant_instruction(name, c, offset),
        GetLocal | SetLocal => byte_instruction(name, c, offset),
        Jump | JumpIfFalse => jump_instruction(name, 1, c, offset),
        Loop => jump_instruction(name, -1, c, offset),
        _ => simple_instruction(name, offset),
    }
}

/// The conventional all-caps name of an opcode.
fn mnemonic(opcode: OpCode) -> &'static str {
    use OpCode::*;
    match opcode {
        Constant => "OP_CONSTANT",
        None => "OP_NONE",
        True => "OP_TRUE",
        False => "OP_FALSE",
        Pop => "OP_POP",
        GetLocal => "OP_GET_LOCAL",
        SetLocal => "OP_SET_LOCAL",
        GetGlobal => "OP_GET_GLOBAL",
        DefineGlobal => "OP_DEFINE_GLOBAL",
        SetGlobal => "OP_SET_GLOBAL",
        Equal => "OP_EQUAL",
        Greater => "OP_GREATER",
        Less => "OP_LESS",
        Add => "OP_ADD",
        Subtract => "OP_SUBTRACT",
        Multiply => "OP_MULTIPLY",
        Divide => "OP_DIVIDE",
        Not => "OP_NOT",
        Negate => "OP_NEGATE",
        Print => "OP_PRINT",
        Jump => "OP_JUMP",
        JumpIfFalse => "OP_JUMP_IF_FALSE",
        Loop => "OP_LOOP",
        Return => "OP_RETURN",
    }
}

/////////////////////////////////////// Instruction printers ///////////////////////////////////////

fn simple_instruction(name: &str, offset: usize) -> usize {
    println!("{name:>18}");
    offset + 1
}

fn constant_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    print!("{name:>18}");

    let (index, value) = chunk
        .get(offset + 1)
        .expect("ran out of bytes")
        .resolve_constant_with_index()
        .expect("Invalid constant index");

    println!("{index:4} '{value}'");

    offset + 2
}

fn byte_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let slot = chunk
        .get(offset + 1)
        .expect("ran out of bytes")
        .as_operand();
    println!("{name:>18}{slot:4}");
    offset + 2
}

fn jump_instruction(name: &str, sign: i64, chunk: &Chunk, offset: usize) -> usize {
    let hi = chunk
        .get(offset + 1)
        .expect("ran out of bytes")
        .as_operand();
    let lo = chunk
        .get(offset + 2)
        .expect("ran out of bytes")
        .as_operand();
    let distance = ((hi << 8) | lo) as i64;

    let target = offset as i64 + 3 + sign * distance;
    println!("{name:>18} {offset:4} -> {target}");

    offset + 3
}

//////////////////////////////////////////// Utilities ////////////////////////////////////////////

/// Returns true if the given offset is at the same line number as the
/// previous offset.
fn at_same_line_as_previous_offset(chunk: &Chunk, offset: usize) -> bool {
    assert!(offset > 0);

    chunk
        .line_number_for(offset)
        .zip(chunk.line_number_for(offset - 1))
        .map(|(current_line, previous_line)| current_line == previous_line)
        .unwrap()
}
