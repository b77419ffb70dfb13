//! JIT compiler for RandomX programs on x86-64.
//!
//! One compilation walks the 256-instruction program once, dispatching each
//! instruction through a frequency-weighted table of emitters. Emitters
//! append encoded bytes at the write cursor and maintain the tracking state
//! the conditional-branch emitter needs: per-register last-written indices
//! and the index of the previous branch.

use super::codebuf::CodeBuffer;
use super::fragments;
use super::memory::MemoryError;
use super::x86::*;
use super::{
    DatasetInitFunc, ProgramFunc, CODE_SIZE, EPILOGUE_OFFSET, SUPERSCALAR_HASH_OFFSET,
};
use crate::config::{JitConfig, PagePolicy};
use crate::consts::{
    VmOp, CACHE_LINE_SIZE, CONDITION_MASK, CONDITION_OFFSET, INSTRUCTION_WEIGHTS,
    RANDOMX_PROGRAM_SIZE, REGISTERS_COUNT, REGISTER_COUNT_FLT, REGISTER_NEEDS_DISPLACEMENT,
    REGISTER_NEEDS_SIB, SCRATCHPAD_L1_MASK, SCRATCHPAD_L2_MASK, SCRATCHPAD_L3_MASK,
    STORE_L3_CONDITION,
};
use crate::program::{Instruction, Program, ProgramConfiguration, SuperscalarOp, SuperscalarProgram};
use crate::reciprocal::{is_zero_or_power_of_2, reciprocal};

/// Maps mod.mem values to the scratchpad mask to emit.
static SCRATCHPAD_MASK: [u32; 4] = [
    SCRATCHPAD_L2_MASK,
    SCRATCHPAD_L1_MASK,
    SCRATCHPAD_L1_MASK,
    SCRATCHPAD_L1_MASK,
];

type InstructionGenerator = fn(&mut JitCompiler, &Instruction, usize);

/// JIT compiler instance. Owns one code buffer; not safe for concurrent
/// compilation, but distinct instances are independent.
pub struct JitCompiler {
    code: CodeBuffer,
    config: JitConfig,
    engine: [InstructionGenerator; 256],
    instruction_offsets: [usize; RANDOMX_PROGRAM_SIZE],
    register_modified_at: [i32; REGISTERS_COUNT],
    last_branch_at: i32,
}

impl JitCompiler {
    pub fn new() -> Result<Self, MemoryError> {
        Self::with_config(JitConfig::default())
    }

    pub fn with_config(config: JitConfig) -> Result<Self, MemoryError> {
        Self::with_weights(config, &INSTRUCTION_WEIGHTS)
    }

    /// Construct with an alternate opcode weight table. The dispatch table
    /// is fixed for the lifetime of the instance.
    pub fn with_weights(
        config: JitConfig,
        weights: &[(VmOp, u8)],
    ) -> Result<Self, MemoryError> {
        let mut code = CodeBuffer::new(CODE_SIZE)?;
        code.write_at(0, &fragments::PROLOGUE);
        code.write_at(fragments::PROLOGUE.len(), &fragments::LOOP_LOAD);
        code.write_at(EPILOGUE_OFFSET, &fragments::EPILOGUE);
        if config.pages == PagePolicy::ReadWriteExecute {
            code.make_writable_and_executable()?;
        }

        Ok(Self {
            code,
            config,
            engine: Self::build_engine(weights),
            instruction_offsets: [0; RANDOMX_PROGRAM_SIZE],
            register_modified_at: [-1; REGISTERS_COUNT],
            last_branch_at: -1,
        })
    }

    /// Expand the `(opcode, weight)` table into 256 dispatch slots.
    fn build_engine(weights: &[(VmOp, u8)]) -> [InstructionGenerator; 256] {
        let mut engine: [InstructionGenerator; 256] = [Self::h_nop; 256];
        let mut slot = 0usize;
        for &(op, weight) in weights {
            let generator = Self::generator_for(op);
            for _ in 0..weight {
                engine[slot] = generator;
                slot += 1;
            }
        }
        assert_eq!(slot, 256, "instruction weights must sum to 256");
        engine
    }

    fn generator_for(op: VmOp) -> InstructionGenerator {
        match op {
            VmOp::IaddRs => Self::h_iadd_rs,
            VmOp::IaddM => Self::h_iadd_m,
            VmOp::IsubR => Self::h_isub_r,
            VmOp::IsubM => Self::h_isub_m,
            VmOp::ImulR => Self::h_imul_r,
            VmOp::ImulM => Self::h_imul_m,
            VmOp::ImulhR => Self::h_imulh_r,
            VmOp::ImulhM => Self::h_imulh_m,
            VmOp::IsmulhR => Self::h_ismulh_r,
            VmOp::IsmulhM => Self::h_ismulh_m,
            VmOp::ImulRcp => Self::h_imul_rcp,
            VmOp::InegR => Self::h_ineg_r,
            VmOp::IxorR => Self::h_ixor_r,
            VmOp::IxorM => Self::h_ixor_m,
            VmOp::IrorR => Self::h_iror_r,
            VmOp::IrolR => Self::h_irol_r,
            VmOp::IswapR => Self::h_iswap_r,
            VmOp::FswapR => Self::h_fswap_r,
            VmOp::FaddR => Self::h_fadd_r,
            VmOp::FaddM => Self::h_fadd_m,
            VmOp::FsubR => Self::h_fsub_r,
            VmOp::FsubM => Self::h_fsub_m,
            VmOp::FscalR => Self::h_fscal_r,
            VmOp::FmulR => Self::h_fmul_r,
            VmOp::FdivM => Self::h_fdiv_m,
            VmOp::FsqrtR => Self::h_fsqrt_r,
            VmOp::Cbranch => Self::h_cbranch,
            VmOp::Cfround => Self::h_cfround,
            VmOp::Istore => Self::h_istore,
            VmOp::Nop => Self::h_nop,
        }
    }

    // ==================== buffer access & permissions ====================

    pub fn code(&self) -> &[u8] {
        self.code.code()
    }

    pub fn code_size(&self) -> usize {
        CODE_SIZE
    }

    /// Current write cursor (end of the last emission).
    pub fn code_pos(&self) -> usize {
        self.code.pos()
    }

    pub fn instruction_offsets(&self) -> &[usize; RANDOMX_PROGRAM_SIZE] {
        &self.instruction_offsets
    }

    pub fn register_modified_at(&self) -> &[i32; REGISTERS_COUNT] {
        &self.register_modified_at
    }

    /// Make the buffer writable for the next compilation.
    pub fn enable_writing(&mut self) -> Result<(), MemoryError> {
        self.code.make_writable()
    }

    /// Make the buffer executable before calling the produced function.
    pub fn enable_execution(&mut self) -> Result<(), MemoryError> {
        self.code.make_executable()
    }

    /// Make the buffer writable and executable at once (RWX hosts).
    pub fn enable_all(&mut self) -> Result<(), MemoryError> {
        self.code.make_writable_and_executable()
    }

    /// Entry point of the compiled program.
    ///
    /// # Safety
    /// The buffer must be executable and hold a completed compilation.
    pub unsafe fn program_func(&self) -> ProgramFunc {
        unsafe { std::mem::transmute(self.code.as_ptr()) }
    }

    /// Entry point of the dataset-initialization routine.
    ///
    /// # Safety
    /// The buffer must be executable; `generate_dataset_init_code` and
    /// `generate_superscalar_hash` must both have run.
    pub unsafe fn dataset_init_func(&self) -> DatasetInitFunc {
        unsafe { std::mem::transmute(self.code.as_ptr()) }
    }

    // ==================== program assembly ====================

    /// Compile a program for full (dataset) mode.
    pub fn generate_program(&mut self, prog: &Program, pcfg: &ProgramConfiguration) {
        self.generate_program_prologue(prog, pcfg);
        self.code.emit(&fragments::READ_DATASET);
        self.generate_program_epilogue(pcfg);
    }

    /// Compile a program for light mode: the dataset read becomes a call
    /// into the SuperscalarHash routine.
    pub fn generate_program_light(
        &mut self,
        prog: &Program,
        pcfg: &ProgramConfiguration,
        dataset_offset: u32,
    ) {
        self.generate_program_prologue(prog, pcfg);
        self.code.emit(&fragments::READ_DATASET_SSHASH_INIT);
        self.code.emit(&ADD_EBX_I);
        self.code.emit_u32(dataset_offset / CACHE_LINE_SIZE);
        self.code.emit_u8(CALL);
        self.code
            .emit_u32((SUPERSCALAR_HASH_OFFSET as i32 - (self.code.pos() as i32 + 4)) as u32);
        self.code.emit(&fragments::READ_DATASET_SSHASH_FIN);
        self.generate_program_epilogue(pcfg);
    }

    /// Overwrite the program entry with the dataset-initialization routine.
    pub fn generate_dataset_init_code(&mut self) {
        self.code.write_at(0, &fragments::DATASET_INIT);
    }

    fn generate_program_prologue(&mut self, prog: &Program, pcfg: &ProgramConfiguration) {
        self.register_modified_at = [-1; REGISTERS_COUNT];
        self.last_branch_at = -1;

        // group E masks are quadwords 14 & 15 of the xmm-constants island
        let mut e_mask = [0u8; 16];
        e_mask[..8].copy_from_slice(&pcfg.e_mask[0].to_le_bytes());
        e_mask[8..].copy_from_slice(&pcfg.e_mask[1].to_le_bytes());
        self.code
            .write_at(fragments::XMM_CONSTANTS_OFFSET + 16, &e_mask);

        self.code
            .set_pos(fragments::PROLOGUE.len() + fragments::LOOP_LOAD.len());

        for i in 0..prog.len() {
            self.generate_code(&prog[i], i);
        }

        // mov eax, readReg2; xor eax, readReg3 (dataset address mix)
        self.code.emit(&REX_MOV_RR);
        self.code.emit_u8(0xc0 + pcfg.read_reg2);
        self.code.emit(&REX_XOR_EAX);
        self.code.emit_u8(0xc0 + pcfg.read_reg3);
    }

    fn generate_program_epilogue(&mut self, pcfg: &ProgramConfiguration) {
        // mov rax, readReg0; xor rax, readReg1 (scratchpad store address)
        self.code.emit(&REX_MOV_RR64);
        self.code.emit_u8(0xc0 + pcfg.read_reg0);
        self.code.emit(&REX_XOR_RAX_R64);
        self.code.emit_u8(0xc0 + pcfg.read_reg1);
        self.code.emit(&fragments::LOOP_STORE);
        self.code.emit(&SUB_EBX_JNZ);
        self.code
            .emit_u32((fragments::PROLOGUE.len() as i32 - self.code.pos() as i32 - 4) as u32);
        self.code.emit_u8(JMP);
        self.code
            .emit_u32((EPILOGUE_OFFSET as i32 - self.code.pos() as i32 - 4) as u32);
    }

    fn generate_code(&mut self, instr: &Instruction, i: usize) {
        self.instruction_offsets[i] = self.code.pos();
        let generator = self.engine[instr.opcode as usize];
        generator(self, instr, i);
    }

    // ==================== SuperscalarHash assembly ====================

    /// Emit the SuperscalarHash routine: the given programs back-to-back
    /// with interleaved load/prefetch fragments, at the fixed secondary
    /// entry point.
    pub fn generate_superscalar_hash(
        &mut self,
        programs: &[SuperscalarProgram],
        reciprocal_cache: &[u64],
    ) {
        self.code
            .write_at(SUPERSCALAR_HASH_OFFSET, &fragments::SSHASH_INIT);
        self.code
            .set_pos(SUPERSCALAR_HASH_OFFSET + fragments::SSHASH_INIT.len());
        for (j, prog) in programs.iter().enumerate() {
            for instr in prog.instructions() {
                self.generate_superscalar_code(instr, reciprocal_cache);
            }
            self.code.emit(&fragments::SSHASH_LOAD);
            if j + 1 < programs.len() {
                self.code.emit(&REX_MOV_RR64);
                self.code.emit_u8(0xd8 + prog.address_register());
                self.code.emit(&fragments::SSHASH_PREFETCH);
                if self.config.align_superscalar {
                    self.align_superscalar_program();
                }
            }
        }
        self.code.emit_u8(RET);
    }

    /// Pad to a 16-byte boundary with multi-byte NOPs (at most 9 bytes each).
    fn align_superscalar_program(&mut self) {
        loop {
            let misalign = self.code.pos() % 16;
            if misalign == 0 {
                break;
            }
            let nop_size = (16 - misalign).min(9);
            self.code.emit(NOPX[nop_size - 1]);
        }
    }

    fn generate_superscalar_code(&mut self, instr: &Instruction, reciprocal_cache: &[u64]) {
        let Some(op) = SuperscalarOp::from_opcode(instr.opcode) else {
            // only reachable through upstream corruption of the program
            unreachable!("invalid superscalar opcode {}", instr.opcode);
        };
        match op {
            SuperscalarOp::IsubR => {
                self.code.emit(&REX_SUB_RR);
                self.code.emit_u8(0xc0 + 8 * instr.dst + instr.src);
            }
            SuperscalarOp::IxorR => {
                self.code.emit(&REX_XOR_RR);
                self.code.emit_u8(0xc0 + 8 * instr.dst + instr.src);
            }
            SuperscalarOp::IaddRs => {
                self.code.emit(&REX_LEA);
                self.code.emit_u8(0x04 + 8 * instr.dst);
                self.gen_sib(instr.mod_shift(), instr.src, instr.dst);
            }
            SuperscalarOp::ImulR => {
                self.code.emit(&REX_IMUL_RR);
                self.code.emit_u8(0xc0 + 8 * instr.dst + instr.src);
            }
            SuperscalarOp::IrorC => {
                self.code.emit(&REX_ROT_I8);
                self.code.emit_u8(0xc8 + instr.dst);
                self.code.emit_u8((instr.imm32 & 63) as u8);
            }
            SuperscalarOp::IaddC7 => {
                self.code.emit(&REX_81);
                self.code.emit_u8(0xc0 + instr.dst);
                self.code.emit_u32(instr.imm32);
            }
            SuperscalarOp::IxorC7 => {
                self.code.emit(&REX_XOR_RI);
                self.code.emit_u8(0xf0 + instr.dst);
                self.code.emit_u32(instr.imm32);
            }
            SuperscalarOp::IaddC8 => {
                self.code.emit(&REX_81);
                self.code.emit_u8(0xc0 + instr.dst);
                self.code.emit_u32(instr.imm32);
                if self.config.align_superscalar {
                    self.code.emit(&NOP1);
                }
            }
            SuperscalarOp::IxorC8 => {
                self.code.emit(&REX_XOR_RI);
                self.code.emit_u8(0xf0 + instr.dst);
                self.code.emit_u32(instr.imm32);
                if self.config.align_superscalar {
                    self.code.emit(&NOP1);
                }
            }
            SuperscalarOp::IaddC9 => {
                self.code.emit(&REX_81);
                self.code.emit_u8(0xc0 + instr.dst);
                self.code.emit_u32(instr.imm32);
                if self.config.align_superscalar {
                    self.code.emit(&NOP2);
                }
            }
            SuperscalarOp::IxorC9 => {
                self.code.emit(&REX_XOR_RI);
                self.code.emit_u8(0xf0 + instr.dst);
                self.code.emit_u32(instr.imm32);
                if self.config.align_superscalar {
                    self.code.emit(&NOP2);
                }
            }
            SuperscalarOp::ImulhR => {
                self.code.emit(&REX_MOV_RR64);
                self.code.emit_u8(0xc0 + instr.dst);
                self.code.emit(&REX_MUL_R);
                self.code.emit_u8(0xe0 + instr.src);
                self.code.emit(&REX_MOV_R64R);
                self.code.emit_u8(0xc2 + 8 * instr.dst);
            }
            SuperscalarOp::IsmulhR => {
                self.code.emit(&REX_MOV_RR64);
                self.code.emit_u8(0xc0 + instr.dst);
                self.code.emit(&REX_MUL_R);
                self.code.emit_u8(0xe8 + instr.src);
                self.code.emit(&REX_MOV_R64R);
                self.code.emit_u8(0xc2 + 8 * instr.dst);
            }
            SuperscalarOp::ImulRcp => {
                self.code.emit(&MOV_RAX_I);
                self.code.emit_u64(reciprocal_cache[instr.imm32 as usize]);
                self.code.emit(&REX_IMUL_RM);
                self.code.emit_u8(0xc0 + 8 * instr.dst);
            }
        }
    }

    // ==================== address generation ====================

    /// Compute `(src_low32 + imm32) & mask` into eax: a 32-bit LEA (SIB
    /// escape when the base register demands one) followed by an AND.
    fn gen_address_reg_rax(&mut self, instr: &Instruction, src: u8) {
        self.code.emit(&LEA_32);
        self.code.emit_u8(0x80 + src);
        if src == REGISTER_NEEDS_SIB {
            self.code.emit_u8(0x24);
        }
        self.code.emit_u32(instr.imm32);
        self.code.emit_u8(AND_EAX_I);
        self.code.emit_u32(SCRATCHPAD_MASK[instr.mod_mem() as usize]);
    }

    /// Immediate-only address for the src == dst memory forms.
    fn gen_address_imm(&mut self, instr: &Instruction) {
        self.code.emit_u32(instr.imm32 & SCRATCHPAD_L3_MASK);
    }

    fn gen_sib(&mut self, scale: u8, index: u8, base: u8) {
        self.code.emit_u8(sib(scale, index, base));
    }

    // ==================== per-opcode emitters ====================

    fn h_iadd_rs(&mut self, instr: &Instruction, i: usize) {
        let dst = instr.dst % REGISTERS_COUNT as u8;
        self.register_modified_at[dst as usize] = i as i32;
        self.code.emit(&REX_LEA);
        if dst == REGISTER_NEEDS_DISPLACEMENT {
            self.code.emit_u8(0xac);
            self.gen_sib(instr.mod_shift(), instr.src % REGISTERS_COUNT as u8, dst);
            self.code.emit_u32(instr.imm32);
        } else {
            self.code.emit_u8(0x04 + 8 * dst);
            self.gen_sib(instr.mod_shift(), instr.src % REGISTERS_COUNT as u8, dst);
        }
    }

    fn h_iadd_m(&mut self, instr: &Instruction, i: usize) {
        let dst = instr.dst % REGISTERS_COUNT as u8;
        self.register_modified_at[dst as usize] = i as i32;
        let src = instr.src % REGISTERS_COUNT as u8;
        if src != dst {
            self.gen_address_reg_rax(instr, src);
            self.code.emit(&REX_ADD_RM);
            self.code.emit_u8(0x04 + 8 * dst);
            self.code.emit_u8(0x06);
        } else {
            self.code.emit(&REX_ADD_RM);
            self.code.emit_u8(0x86 + 8 * dst);
            self.gen_address_imm(instr);
        }
    }

    fn h_isub_r(&mut self, instr: &Instruction, i: usize) {
        let dst = instr.dst % REGISTERS_COUNT as u8;
        self.register_modified_at[dst as usize] = i as i32;
        let src = instr.src % REGISTERS_COUNT as u8;
        if src != dst {
            self.code.emit(&REX_SUB_RR);
            self.code.emit_u8(0xc0 + 8 * dst + src);
        } else {
            self.code.emit(&REX_81);
            self.code.emit_u8(0xe8 + dst);
            self.code.emit_u32(instr.imm32);
        }
    }

    fn h_isub_m(&mut self, instr: &Instruction, i: usize) {
        let dst = instr.dst % REGISTERS_COUNT as u8;
        self.register_modified_at[dst as usize] = i as i32;
        let src = instr.src % REGISTERS_COUNT as u8;
        if src != dst {
            self.gen_address_reg_rax(instr, src);
            self.code.emit(&REX_SUB_RM);
            self.code.emit_u8(0x04 + 8 * dst);
            self.code.emit_u8(0x06);
        } else {
            self.code.emit(&REX_SUB_RM);
            self.code.emit_u8(0x86 + 8 * dst);
            self.gen_address_imm(instr);
        }
    }

    fn h_imul_r(&mut self, instr: &Instruction, i: usize) {
        let dst = instr.dst % REGISTERS_COUNT as u8;
        self.register_modified_at[dst as usize] = i as i32;
        let src = instr.src % REGISTERS_COUNT as u8;
        if src != dst {
            self.code.emit(&REX_IMUL_RR);
            self.code.emit_u8(0xc0 + 8 * dst + src);
        } else {
            self.code.emit(&REX_IMUL_RRI);
            self.code.emit_u8(0xc0 + 9 * dst);
            self.code.emit_u32(instr.imm32);
        }
    }

    fn h_imul_m(&mut self, instr: &Instruction, i: usize) {
        let dst = instr.dst % REGISTERS_COUNT as u8;
        self.register_modified_at[dst as usize] = i as i32;
        let src = instr.src % REGISTERS_COUNT as u8;
        if src != dst {
            self.gen_address_reg_rax(instr, src);
            self.code.emit(&REX_IMUL_RM);
            self.code.emit_u8(0x04 + 8 * dst);
            self.code.emit_u8(0x06);
        } else {
            self.code.emit(&REX_IMUL_RM);
            self.code.emit_u8(0x86 + 8 * dst);
            self.gen_address_imm(instr);
        }
    }

    fn h_imulh_r(&mut self, instr: &Instruction, i: usize) {
        let dst = instr.dst % REGISTERS_COUNT as u8;
        self.register_modified_at[dst as usize] = i as i32;
        self.code.emit(&REX_MOV_RR64);
        self.code.emit_u8(0xc0 + dst);
        self.code.emit(&REX_MUL_R);
        self.code.emit_u8(0xe0 + instr.src % REGISTERS_COUNT as u8);
        self.code.emit(&REX_MOV_R64R);
        self.code.emit_u8(0xc2 + 8 * dst);
    }

    fn h_imulh_m(&mut self, instr: &Instruction, i: usize) {
        let dst = instr.dst % REGISTERS_COUNT as u8;
        self.register_modified_at[dst as usize] = i as i32;
        let src = instr.src % REGISTERS_COUNT as u8;
        if src != dst {
            // address into ecx; rax and rdx belong to the multiply
            self.code.emit(&LEA_32);
            self.code.emit_u8(0x80 + src + 8);
            if src == REGISTER_NEEDS_SIB {
                self.code.emit_u8(0x24);
            }
            self.code.emit_u32(instr.imm32);
            self.code.emit(&AND_ECX_I);
            self.code.emit_u32(SCRATCHPAD_MASK[instr.mod_mem() as usize]);
            self.code.emit(&REX_MOV_RR64);
            self.code.emit_u8(0xc0 + dst);
            self.code.emit(&REX_IMUL_MEM);
            self.code.emit(&REX_MOV_RR64);
            self.code.emit_u8(0xc0 + dst);
            self.code.emit(&REX_MUL_MEM);
        } else {
            self.code.emit(&REX_MOV_RR64);
            self.code.emit_u8(0xc0 + dst);
            self.code.emit(&REX_MUL_M);
            self.code.emit_u8(0xa6);
            self.gen_address_imm(instr);
        }
        self.code.emit(&REX_MOV_R64R);
        self.code.emit_u8(0xc2 + 8 * dst);
    }

    fn h_ismulh_r(&mut self, instr: &Instruction, i: usize) {
        let dst = instr.dst % REGISTERS_COUNT as u8;
        self.register_modified_at[dst as usize] = i as i32;
        self.code.emit(&REX_MOV_RR64);
        self.code.emit_u8(0xc0 + dst);
        self.code.emit(&REX_MUL_R);
        self.code.emit_u8(0xe8 + instr.src % REGISTERS_COUNT as u8);
        self.code.emit(&REX_MOV_R64R);
        self.code.emit_u8(0xc2 + 8 * dst);
    }

    fn h_ismulh_m(&mut self, instr: &Instruction, i: usize) {
        let dst = instr.dst % REGISTERS_COUNT as u8;
        self.register_modified_at[dst as usize] = i as i32;
        let src = instr.src % REGISTERS_COUNT as u8;
        if src != dst {
            self.code.emit(&LEA_32);
            self.code.emit_u8(0x80 + src + 8);
            if src == REGISTER_NEEDS_SIB {
                self.code.emit_u8(0x24);
            }
            self.code.emit_u32(instr.imm32);
            self.code.emit(&AND_ECX_I);
            self.code.emit_u32(SCRATCHPAD_MASK[instr.mod_mem() as usize]);
            self.code.emit(&REX_MOV_RR64);
            self.code.emit_u8(0xc0 + dst);
            self.code.emit(&REX_IMUL_MEM);
        } else {
            self.code.emit(&REX_MOV_RR64);
            self.code.emit_u8(0xc0 + dst);
            self.code.emit(&REX_MUL_M);
            self.code.emit_u8(0xae);
            self.gen_address_imm(instr);
        }
        self.code.emit(&REX_MOV_R64R);
        self.code.emit_u8(0xc2 + 8 * dst);
    }

    fn h_imul_rcp(&mut self, instr: &Instruction, i: usize) {
        let divisor = instr.imm32 as u64;
        if is_zero_or_power_of_2(divisor) {
            return;
        }
        let dst = instr.dst % REGISTERS_COUNT as u8;
        self.register_modified_at[dst as usize] = i as i32;
        self.code.emit(&MOV_RAX_I);
        self.code.emit_u64(reciprocal(divisor));
        self.code.emit(&REX_IMUL_RM);
        self.code.emit_u8(0xc0 + 8 * dst);
    }

    fn h_ineg_r(&mut self, instr: &Instruction, i: usize) {
        let dst = instr.dst % REGISTERS_COUNT as u8;
        self.register_modified_at[dst as usize] = i as i32;
        self.code.emit(&REX_NEG);
        self.code.emit_u8(0xd8 + dst);
    }

    fn h_ixor_r(&mut self, instr: &Instruction, i: usize) {
        let dst = instr.dst % REGISTERS_COUNT as u8;
        self.register_modified_at[dst as usize] = i as i32;
        let src = instr.src % REGISTERS_COUNT as u8;
        if src != dst {
            self.code.emit(&REX_XOR_RR);
            self.code.emit_u8(0xc0 + 8 * dst + src);
        } else {
            self.code.emit(&REX_XOR_RI);
            self.code.emit_u8(0xf0 + dst);
            self.code.emit_u32(instr.imm32);
        }
    }

    fn h_ixor_m(&mut self, instr: &Instruction, i: usize) {
        let dst = instr.dst % REGISTERS_COUNT as u8;
        self.register_modified_at[dst as usize] = i as i32;
        let src = instr.src % REGISTERS_COUNT as u8;
        if src != dst {
            self.gen_address_reg_rax(instr, src);
            self.code.emit(&REX_XOR_RM);
            self.code.emit_u8(0x04 + 8 * dst);
            self.code.emit_u8(0x06);
        } else {
            self.code.emit(&REX_XOR_RM);
            self.code.emit_u8(0x86 + 8 * dst);
            self.gen_address_imm(instr);
        }
    }

    fn h_iror_r(&mut self, instr: &Instruction, i: usize) {
        let dst = instr.dst % REGISTERS_COUNT as u8;
        // marked even when the rotate is elided; branch offsets depend on
        // this table recording instruction indices, not emissions
        self.register_modified_at[dst as usize] = i as i32;
        let src = instr.src % REGISTERS_COUNT as u8;
        if src != dst {
            self.code.emit(&REX_MOV_RR);
            self.code.emit_u8(0xc8 + src);
            self.code.emit(&REX_ROT_CL);
            self.code.emit_u8(0xc8 + dst);
            return;
        }
        let amount = instr.imm32 & 63;
        if amount == 0 {
            return;
        }
        self.code.emit(&REX_ROT_I8);
        self.code.emit_u8(0xc8 + dst);
        self.code.emit_u8(amount as u8);
    }

    fn h_irol_r(&mut self, instr: &Instruction, i: usize) {
        let dst = instr.dst % REGISTERS_COUNT as u8;
        // marked even when the rotate is elided, as in h_iror_r
        self.register_modified_at[dst as usize] = i as i32;
        let src = instr.src % REGISTERS_COUNT as u8;
        if src != dst {
            self.code.emit(&REX_MOV_RR);
            self.code.emit_u8(0xc8 + src);
            self.code.emit(&REX_ROT_CL);
            self.code.emit_u8(0xc0 + dst);
            return;
        }
        let amount = instr.imm32 & 63;
        if amount == 0 {
            return;
        }
        self.code.emit(&REX_ROT_I8);
        self.code.emit_u8(0xc0 + dst);
        self.code.emit_u8(amount as u8);
    }

    fn h_iswap_r(&mut self, instr: &Instruction, i: usize) {
        let dst = instr.dst % REGISTERS_COUNT as u8;
        let src = instr.src % REGISTERS_COUNT as u8;
        if src == dst {
            return;
        }
        self.register_modified_at[dst as usize] = i as i32;
        self.register_modified_at[src as usize] = i as i32;
        self.code.emit(&REX_XCHG);
        self.code.emit_u8(0xc0 + src + 8 * dst);
    }

    fn h_fswap_r(&mut self, instr: &Instruction, _i: usize) {
        self.code.emit(&SHUFPD);
        self.code.emit_u8(0xc0 + 9 * (instr.dst % REGISTERS_COUNT as u8));
        self.code.emit_u8(1);
    }

    fn h_fadd_r(&mut self, instr: &Instruction, _i: usize) {
        self.code.emit(&REX_ADDPD);
        self.code.emit_u8(
            0xc0 + instr.src % REGISTER_COUNT_FLT as u8
                + 8 * (instr.dst % REGISTER_COUNT_FLT as u8),
        );
    }

    fn h_fadd_m(&mut self, instr: &Instruction, _i: usize) {
        self.gen_address_reg_rax(instr, instr.src % REGISTERS_COUNT as u8);
        self.code.emit(&REX_CVTDQ2PD_XMM12_ADDPD);
        self.code
            .emit_u8(0xc4 + 8 * (instr.dst % REGISTER_COUNT_FLT as u8));
    }

    fn h_fsub_r(&mut self, instr: &Instruction, _i: usize) {
        self.code.emit(&REX_SUBPD);
        self.code.emit_u8(
            0xc0 + instr.src % REGISTER_COUNT_FLT as u8
                + 8 * (instr.dst % REGISTER_COUNT_FLT as u8),
        );
    }

    fn h_fsub_m(&mut self, instr: &Instruction, _i: usize) {
        self.gen_address_reg_rax(instr, instr.src % REGISTERS_COUNT as u8);
        self.code.emit(&REX_CVTDQ2PD_XMM12_SUBPD);
        self.code
            .emit_u8(0xc4 + 8 * (instr.dst % REGISTER_COUNT_FLT as u8));
    }

    fn h_fscal_r(&mut self, instr: &Instruction, _i: usize) {
        self.code.emit(&REX_XORPS);
        self.code
            .emit_u8(0xc7 + 8 * (instr.dst % REGISTER_COUNT_FLT as u8));
    }

    fn h_fmul_r(&mut self, instr: &Instruction, _i: usize) {
        self.code.emit(&REX_MULPD);
        self.code.emit_u8(
            0xe0 + instr.src % REGISTER_COUNT_FLT as u8
                + 8 * (instr.dst % REGISTER_COUNT_FLT as u8),
        );
    }

    fn h_fdiv_m(&mut self, instr: &Instruction, _i: usize) {
        self.gen_address_reg_rax(instr, instr.src % REGISTERS_COUNT as u8);
        self.code.emit(&REX_CVTDQ2PD_XMM12_ANDPS_ORPS_DIVPD);
        self.code
            .emit_u8(0xe4 + 8 * (instr.dst % REGISTER_COUNT_FLT as u8));
    }

    fn h_fsqrt_r(&mut self, instr: &Instruction, _i: usize) {
        self.code.emit(&SQRTPD);
        self.code
            .emit_u8(0xe4 + 9 * (instr.dst % REGISTER_COUNT_FLT as u8));
    }

    fn h_cfround(&mut self, instr: &Instruction, _i: usize) {
        let src = instr.src % REGISTERS_COUNT as u8;
        self.code.emit(&REX_MOV_RR64);
        self.code.emit_u8(0xc0 + src);
        let rotate = ((instr.imm32 & 63) as i32 - 2) & 63;
        if rotate != 0 {
            self.code.emit(&ROR_RAX);
            self.code.emit_u8(rotate as u8);
        }
        // and eax, 0x0C; ldmxcsr [rsp+rax]
        self.code.emit(&AND_LDMXCSR);
    }

    fn h_cbranch(&mut self, instr: &Instruction, i: usize) {
        let dst = instr.dst % REGISTERS_COUNT as u8;
        let mut branch_destination_at = self.register_modified_at[dst as usize];
        if branch_destination_at < self.last_branch_at {
            // a branch may not target a point before the previous branch
            branch_destination_at = self.last_branch_at + 1;
        } else {
            branch_destination_at += 1;
        }
        self.last_branch_at = i as i32;

        self.code.emit(&REX_ADD_I);
        self.code.emit_u8(0xc0 + dst);
        let shift = instr.mod_cond() as u32 + CONDITION_OFFSET;
        let mut imm = instr.imm32 | (1 << shift);
        if CONDITION_OFFSET > 0 || shift > 0 {
            imm &= !(1u32 << (shift - 1));
        }
        self.code.emit_u32(imm);
        self.code.emit(&REX_TEST);
        self.code.emit_u8(0xc0 + dst);
        self.code.emit_u32(CONDITION_MASK << shift);

        let target = self.instruction_offsets[branch_destination_at as usize];
        let offset = target as i32 - self.code.pos() as i32 - 2;
        if offset >= -128 {
            self.code.emit_u8(SHORT_JZ);
            self.code.emit_u8(offset as u8);
        } else {
            self.code.emit(&JZ);
            self.code.emit_u32((offset - 4) as u32);
        }
    }

    fn h_istore(&mut self, instr: &Instruction, _i: usize) {
        self.code.emit(&LEA_32);
        let dst = instr.dst % REGISTERS_COUNT as u8;
        self.code.emit_u8(0x80 + dst);
        if dst == REGISTER_NEEDS_SIB {
            self.code.emit_u8(0x24);
        }
        self.code.emit_u32(instr.imm32);
        self.code.emit_u8(AND_EAX_I);
        if instr.mod_cond() < STORE_L3_CONDITION {
            self.code.emit_u32(SCRATCHPAD_MASK[instr.mod_mem() as usize]);
        } else {
            self.code.emit_u32(SCRATCHPAD_L3_MASK);
        }
        self.code.emit(&REX_MOV_MR);
        self.code.emit_u8(0x04 + 8 * (instr.src % REGISTERS_COUNT as u8));
        self.code.emit_u8(0x06);
    }

    fn h_nop(&mut self, _instr: &Instruction, _i: usize) {
        self.code.emit(&NOP1);
    }
}
