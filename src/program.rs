//! VM program representation.
//!
//! A RandomX instruction is 8 bytes on the wire: opcode, dst, src, mod and a
//! 32-bit little-endian immediate. Register operands are taken modulo the
//! register count at emission time, so the raw bytes are stored unmasked.

use crate::consts::{RANDOMX_PROGRAM_SIZE, SUPERSCALAR_MAX_SIZE};

/// Wire size of one instruction.
pub const INSTRUCTION_SIZE: usize = 8;

/// One decoded VM instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: u8,
    pub dst: u8,
    pub src: u8,
    pub mod_: u8,
    pub imm32: u32,
}

impl Instruction {
    pub fn from_bytes(bytes: [u8; INSTRUCTION_SIZE]) -> Self {
        Self {
            opcode: bytes[0],
            dst: bytes[1],
            src: bytes[2],
            mod_: bytes[3],
            imm32: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }

    /// Memory-mask selector, bits 0-1 of mod.
    pub fn mod_mem(&self) -> u8 {
        self.mod_ & 3
    }

    /// IADD_RS shift amount, bits 2-3 of mod.
    pub fn mod_shift(&self) -> u8 {
        (self.mod_ >> 2) & 3
    }

    /// CBRANCH/ISTORE condition selector, bits 4-7 of mod.
    pub fn mod_cond(&self) -> u8 {
        self.mod_ >> 4
    }
}

/// A fixed-length RandomX program.
#[derive(Clone)]
pub struct Program {
    instructions: [Instruction; RANDOMX_PROGRAM_SIZE],
}

impl Program {
    pub fn new(instructions: [Instruction; RANDOMX_PROGRAM_SIZE]) -> Self {
        Self { instructions }
    }

    /// Decode a program from its wire form (256 x 8 bytes).
    pub fn from_bytes(bytes: &[u8; RANDOMX_PROGRAM_SIZE * INSTRUCTION_SIZE]) -> Self {
        let mut instructions = [Instruction::default(); RANDOMX_PROGRAM_SIZE];
        for (i, chunk) in bytes.chunks_exact(INSTRUCTION_SIZE).enumerate() {
            let mut raw = [0u8; INSTRUCTION_SIZE];
            raw.copy_from_slice(chunk);
            instructions[i] = Instruction::from_bytes(raw);
        }
        Self { instructions }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }
}

impl std::ops::Index<usize> for Program {
    type Output = Instruction;

    fn index(&self, i: usize) -> &Instruction {
        &self.instructions[i]
    }
}

/// Per-program configuration derived from the program entropy.
#[derive(Debug, Clone)]
pub struct ProgramConfiguration {
    /// Integer registers mixed into the dataset address (two pairs).
    pub read_reg0: u8,
    pub read_reg1: u8,
    pub read_reg2: u8,
    pub read_reg3: u8,
    /// Group E exponent mask, patched into the xmm-constants area.
    pub e_mask: [u64; 2],
}

impl Default for ProgramConfiguration {
    fn default() -> Self {
        Self {
            read_reg0: 0,
            read_reg1: 1,
            read_reg2: 2,
            read_reg3: 3,
            e_mask: [0x3B00000000000000; 2],
        }
    }
}

/// Superscalar instruction set, used by the light-mode dataset routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuperscalarOp {
    IsubR,
    IxorR,
    IaddRs,
    ImulR,
    IrorC,
    IaddC7,
    IxorC7,
    IaddC8,
    IxorC8,
    IaddC9,
    IxorC9,
    ImulhR,
    IsmulhR,
    ImulRcp,
}

impl SuperscalarOp {
    pub fn from_opcode(opcode: u8) -> Option<Self> {
        Some(match opcode {
            0 => SuperscalarOp::IsubR,
            1 => SuperscalarOp::IxorR,
            2 => SuperscalarOp::IaddRs,
            3 => SuperscalarOp::ImulR,
            4 => SuperscalarOp::IrorC,
            5 => SuperscalarOp::IaddC7,
            6 => SuperscalarOp::IxorC7,
            7 => SuperscalarOp::IaddC8,
            8 => SuperscalarOp::IxorC8,
            9 => SuperscalarOp::IaddC9,
            10 => SuperscalarOp::IxorC9,
            11 => SuperscalarOp::ImulhR,
            12 => SuperscalarOp::IsmulhR,
            13 => SuperscalarOp::ImulRcp,
            _ => return None,
        })
    }
}

/// One superscalar program: an instruction list plus the register whose value
/// addresses the next cache line to prefetch.
#[derive(Clone)]
pub struct SuperscalarProgram {
    instructions: Vec<Instruction>,
    address_register: u8,
}

impl SuperscalarProgram {
    pub fn new(instructions: Vec<Instruction>, address_register: u8) -> Self {
        debug_assert!(instructions.len() <= SUPERSCALAR_MAX_SIZE);
        debug_assert!(address_register < 8);
        Self {
            instructions,
            address_register,
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn address_register(&self) -> u8 {
        self.address_register
    }
}
