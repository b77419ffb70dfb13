//! randomx-jit - a JIT compiler for RandomX virtual-machine programs.
//!
//! This library translates 256-instruction RandomX programs into directly
//! callable x86-64 machine code: precompiled prologue/loop/epilogue
//! fragments around a per-opcode generated body, plus the SuperscalarHash
//! routine used by the dataset-less light mode.

pub mod config;
pub mod consts;
pub mod jit;
pub mod program;
pub mod reciprocal;

// Re-export commonly used types
pub use config::{JitConfig, PagePolicy};
pub use jit::{DatasetInitFunc, JitCompiler, MemoryError, ProgramFunc, RegisterFile};
pub use program::{Instruction, Program, ProgramConfiguration, SuperscalarProgram};
