//! Contains a [Chunk] of [OpCode].

use thiserror::Error;

use crate::byte_enum::byte_enum;
use crate::value::{Value, ValueArray};

/// The constant pool is addressed by single-byte operands, so one chunk can
/// hold at most this many distinct constants.
const MAX_CONSTANTS: usize = 256;

byte_enum! {
    /// A one-byte operation code for Atto.
    ///
    /// Operands, where present, follow the opcode in the byte stream: one
    /// byte for pool indices and stack slots, two big-endian bytes for jump
    /// distances.
    #[repr(u8)]
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub enum OpCode {
        /// Push `constants[operand]`.
        Constant,
        /// Push the `none` literal.
        None,
        True,
        False,
        Pop,
        GetLocal,
        SetLocal,
        GetGlobal,
        DefineGlobal,
        SetGlobal,
        Equal,
        Greater,
        Less,
        Add,
        Subtract,
        Multiply,
        Divide,
        Not,
        Negate,
        Print,
        /// Unconditional forward jump by a 16-bit distance.
        Jump,
        /// Forward jump taken when the top of the stack is falsy. Peeks; the
        /// condition stays on the stack.
        JumpIfFalse,
        /// Backward jump: the distance is subtracted from the instruction
        /// pointer.
        Loop,
        Return,
    }
}

/// A chunk of code, with metadata.
#[derive(Default)]
pub struct Chunk {
    code: Vec<u8>,
    pub constants: ValueArray,
    pub lines: Vec<usize>,
}

/// A valid byte from a chunk. This byte can then be interpreted as required.
#[derive(Clone, Copy)]
pub struct BytecodeEntry<'a> {
    byte: u8,
    provenance: &'a Chunk,
}

/// An [OpCode] that has already been written to the bytestream.
///
/// This opcode can be augmented with an additional operand.
pub struct WrittenOpcode<'a> {
    line: usize,
    provenance: &'a mut Chunk,
}

/// A forward jump whose 16-bit distance is still the `0xFFFF` placeholder.
/// Hand it back to [Chunk::patch_jump] once the target is known.
#[must_use]
pub struct PendingJump {
    site: usize,
}

/// A jump distance did not fit in 16 bits.
#[derive(Debug, Error)]
#[error("jump distance exceeds 16 bits")]
pub struct OffsetTooLarge;

///////////////////////////////////////// Implementation //////////////////////////////////////////

impl Chunk {
    /// Return a new, empty [Chunk].
    pub fn new() -> Self {
        Chunk::default()
    }

    /// Get an entry from the bytecode stream.
    ///
    /// Returns `Some(entry)` when the offset is in [0, self.len()).
    pub fn get(&self, offset: usize) -> Option<BytecodeEntry> {
        self.code.get(offset).copied().map(|byte| BytecodeEntry {
            byte,
            provenance: self,
        })
    }

    /// Append a single [OpCode] to the chunk.
    pub fn write_opcode(&mut self, opcode: OpCode, line: usize) -> WrittenOpcode {
        self.write(opcode as u8, line);

        WrittenOpcode {
            line,
            provenance: self,
        }
    }

    /// Adds a constant to the pool and returns its index. An existing entry
    /// with the same content is reused instead of being appended again.
    ///
    /// Returns `None` when a new entry would not fit — the pool is capped at
    /// 256 constants because operands are a single byte.
    pub fn add_constant(&mut self, value: Value) -> Option<u8> {
        if let Some(existing) = self.constants.position_of(&value) {
            return u8::try_from(existing).ok();
        }

        let index = self.constants.len();
        if index >= MAX_CONSTANTS {
            return None;
        }
        self.constants.write(value);
        Some(index as u8)
    }

    /// Appends a jump instruction with a placeholder distance, to be patched
    /// via [Chunk::patch_jump] once the target offset is known.
    pub fn write_jump(&mut self, opcode: OpCode, line: usize) -> PendingJump {
        self.write(opcode as u8, line);
        self.write(0xFF, line);
        self.write(0xFF, line);
        PendingJump {
            site: self.code.len() - 2,
        }
    }

    /// Overwrites a pending jump's placeholder so that it lands on the next
    /// byte to be written.
    pub fn patch_jump(&mut self, jump: PendingJump) -> Result<(), OffsetTooLarge> {
        let PendingJump { site } = jump;
        // The VM has already consumed the two operand bytes by the time it
        // applies the distance, hence the -2.
        let distance = self.code.len() - site - 2;
        let distance = u16::try_from(distance).map_err(|_| OffsetTooLarge)?;

        let [hi, lo] = distance.to_be_bytes();
        self.code[site] = hi;
        self.code[site + 1] = lo;
        Ok(())
    }

    /// Appends a [OpCode::Loop] jumping backwards to `target`, an offset that
    /// must already be written.
    pub fn write_loop(&mut self, target: usize, line: usize) -> Result<(), OffsetTooLarge> {
        self.write(OpCode::Loop as u8, line);

        // +2 skips back over the operand bytes the VM will have consumed.
        let distance = self.code.len() - target + 2;
        let distance = u16::try_from(distance).map_err(|_| OffsetTooLarge)?;

        let [hi, lo] = distance.to_be_bytes();
        self.write(hi, line);
        self.write(lo, line);
        Ok(())
    }

    /// Returns the length of the byte stream.
    #[inline]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Returns true if nothing has been appended to the byte stream.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Returns the source line that produced the byte at `offset`.
    #[inline]
    pub fn line_number_for(&self, offset: usize) -> Option<usize> {
        self.lines.get(offset).copied()
    }

    /// Actually writes to the byte stream.
    fn write(&mut self, payload: u8, line: usize) {
        debug_assert_eq!(self.code.len(), self.lines.len());
        self.code.push(payload);
        self.lines.push(line)
    }
}

impl<'a> BytecodeEntry<'a> {
    /// Returns the byte as a plain one-byte operand (a pool index or a stack
    /// slot, depending on the opcode it follows).
    #[inline(always)]
    pub fn as_operand(self) -> usize {
        self.byte as usize
    }

    /// Returns the byte decoded as an [OpCode].
    /// Returns `None` if the byte is not a valid opcode.
    #[inline]
    pub fn as_opcode(self) -> Option<OpCode> {
        self.byte.try_into().ok()
    }

    /// Yanks out a constant from the constant pool.
    #[inline]
    pub fn resolve_constant(self) -> Option<Value> {
        self.provenance.constants.get(self.as_operand())
    }

    /// Same as [BytecodeEntry::resolve_constant], but returns (index, value).
    #[inline]
    pub fn resolve_constant_with_index(self) -> Option<(usize, Value)> {
        self.resolve_constant()
            .map(|value| (self.as_operand(), value))
    }
}

impl<'a> WrittenOpcode<'a> {
    /// Consumes `self` and appends the operand to the byte stream for the
    /// last written instruction.
    #[inline]
    pub fn with_operand(self, index: u8) {
        self.provenance.write(index, self.line);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn boring_test_of_chunk() {
        let c = Chunk::default();
        assert_eq!(0, c.len());
        assert!(c.is_empty());
    }

    #[test]
    fn mess_around_with_bytecode() {
        let mut c = Chunk::new();
        let i = c.add_constant(Value::Number(1.0)).unwrap();
        c.write_opcode(OpCode::Constant, 123).with_operand(i);
        c.write_opcode(OpCode::Return, 123);

        assert_eq!(3, c.len());
        assert_eq!(c.len(), c.lines.len());

        // Constant
        assert_eq!(Some(OpCode::Constant), c.get(0).unwrap().as_opcode());
        assert_eq!(Some(0), c.get(1).map(|b| b.as_operand()));
        assert_eq!(
            Some(Value::Number(1.0)),
            c.get(1).and_then(|b| b.resolve_constant())
        );

        // Return
        assert_eq!(Some(OpCode::Return), c.get(2).unwrap().as_opcode());
    }

    #[test]
    fn constants_are_deduplicated_by_content() {
        let mut c = Chunk::new();
        let first = c.add_constant(Value::Number(2.0)).unwrap();
        let second = c.add_constant(Value::Number(2.0)).unwrap();
        assert_eq!(first, second);
        assert_eq!(1, c.constants.len());

        let other = c.add_constant(Value::Str("a")).unwrap();
        assert_ne!(first, other);
        assert_eq!(2, c.constants.len());
    }

    #[test]
    fn pool_overflows_on_the_257th_distinct_constant() {
        let mut c = Chunk::new();
        for i in 0..256 {
            assert_eq!(Some(i as u8), c.add_constant(Value::Number(i as f64)));
        }
        assert_eq!(None, c.add_constant(Value::Number(999.0)));

        // Reusing an existing entry still works once the pool is full.
        assert_eq!(Some(3), c.add_constant(Value::Number(3.0)));
    }

    #[test]
    fn forward_jumps_patch_to_the_next_byte() {
        let mut c = Chunk::new();
        c.write_opcode(OpCode::True, 1);
        let jump = c.write_jump(OpCode::JumpIfFalse, 1);
        let site = 2; // first operand byte
        c.write_opcode(OpCode::Pop, 1);
        c.write_opcode(OpCode::Pop, 1);
        c.patch_jump(jump).unwrap();

        let hi = c.get(site).unwrap().as_operand();
        let lo = c.get(site + 1).unwrap().as_operand();
        let distance = (hi << 8) | lo;

        // target == patch_site + 2 + distance
        assert_eq!(c.len(), site + 2 + distance);
    }

    #[test]
    fn loops_jump_back_to_their_target() {
        let mut c = Chunk::new();
        c.write_opcode(OpCode::None, 1);
        let target = c.len();
        c.write_opcode(OpCode::Pop, 2);
        let loop_site = c.len();
        c.write_loop(target, 3).unwrap();

        let hi = c.get(loop_site + 1).unwrap().as_operand();
        let lo = c.get(loop_site + 2).unwrap().as_operand();
        let distance = (hi << 8) | lo;

        assert!(distance > 0);
        // target == loop_site + 3 - distance
        assert_eq!(target, loop_site + 3 - distance);
    }

    #[test]
    fn every_opcode_round_trips_through_a_byte() {
        for byte in 0..=u8::MAX {
            if let Ok(opcode) = OpCode::try_from(byte) {
                assert_eq!(byte, opcode as u8);
            }
        }
        assert!(OpCode::try_from(OpCode::Return as u8).is_ok());
        assert!(OpCode::try_from(0xFF).is_err());
    }
}
