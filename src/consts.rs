//! RandomX virtual-machine parameters.
//!
//! These values must match the VM specification; the JIT derives its buffer
//! sizing and all scratchpad address masks from them.

/// Number of instructions in a RandomX program.
pub const RANDOMX_PROGRAM_SIZE: usize = 256;

/// Number of random cache accesses per dataset item (light mode).
pub const RANDOMX_CACHE_ACCESSES: usize = 8;

/// Maximum number of instructions in a superscalar program.
pub const SUPERSCALAR_MAX_SIZE: usize = 512;

/// Number of integer VM registers (r0-r7, mapped to r8-r15).
pub const REGISTERS_COUNT: usize = 8;

/// Number of floating-point register pairs per group (f0-f3 / e0-e3 / a0-a3).
pub const REGISTER_COUNT_FLT: usize = 4;

pub const SCRATCHPAD_L1: u32 = 16 * 1024;
pub const SCRATCHPAD_L2: u32 = 256 * 1024;
pub const SCRATCHPAD_L3: u32 = 2048 * 1024;

/// Scratchpad masks select an 8-byte aligned offset within each level.
pub const SCRATCHPAD_L1_MASK: u32 = (SCRATCHPAD_L1 / 8 - 1) * 8;
pub const SCRATCHPAD_L2_MASK: u32 = (SCRATCHPAD_L2 / 8 - 1) * 8;
pub const SCRATCHPAD_L3_MASK: u32 = (SCRATCHPAD_L3 / 8 - 1) * 8;

pub const CACHE_LINE_SIZE: u32 = 64;

/// Bit offset of the CBRANCH condition window within the register.
pub const CONDITION_OFFSET: u32 = 8;

/// Width mask of the CBRANCH condition window (8 bits).
pub const CONDITION_MASK: u32 = 0xFF;

/// ISTORE mod.cond values at or above this select the L3 mask.
pub const STORE_L3_CONDITION: u8 = 14;

/// VM register index that encodes as r12: base-only addressing needs a SIB byte.
pub const REGISTER_NEEDS_SIB: u8 = 4;

/// VM register index that encodes as r13: base-only addressing needs a displacement.
pub const REGISTER_NEEDS_DISPLACEMENT: u8 = 5;

/// The VM instruction set. Each opcode byte of an instruction selects one of
/// these through the frequency-weighted dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmOp {
    IaddRs,
    IaddM,
    IsubR,
    IsubM,
    ImulR,
    ImulM,
    ImulhR,
    ImulhM,
    IsmulhR,
    IsmulhM,
    ImulRcp,
    InegR,
    IxorR,
    IxorM,
    IrorR,
    IrolR,
    IswapR,
    FswapR,
    FaddR,
    FaddM,
    FsubR,
    FsubM,
    FscalR,
    FmulR,
    FdivM,
    FsqrtR,
    Cbranch,
    Cfround,
    Istore,
    Nop,
}

/// Opcode weights. For each entry `(op, w)`, the next `w` slots of the
/// 256-entry dispatch table map to `op`. Weights must sum to 256.
pub const INSTRUCTION_WEIGHTS: [(VmOp, u8); 30] = [
    (VmOp::IaddRs, 16),
    (VmOp::IaddM, 7),
    (VmOp::IsubR, 16),
    (VmOp::IsubM, 7),
    (VmOp::ImulR, 16),
    (VmOp::ImulM, 4),
    (VmOp::ImulhR, 4),
    (VmOp::ImulhM, 1),
    (VmOp::IsmulhR, 4),
    (VmOp::IsmulhM, 1),
    (VmOp::ImulRcp, 8),
    (VmOp::InegR, 2),
    (VmOp::IxorR, 15),
    (VmOp::IxorM, 5),
    (VmOp::IrorR, 8),
    (VmOp::IrolR, 2),
    (VmOp::IswapR, 4),
    (VmOp::FswapR, 4),
    (VmOp::FaddR, 16),
    (VmOp::FaddM, 5),
    (VmOp::FsubR, 16),
    (VmOp::FsubM, 5),
    (VmOp::FscalR, 6),
    (VmOp::FmulR, 32),
    (VmOp::FdivM, 4),
    (VmOp::FsqrtR, 6),
    (VmOp::Cbranch, 25),
    (VmOp::Cfround, 1),
    (VmOp::Istore, 16),
    (VmOp::Nop, 0),
];
