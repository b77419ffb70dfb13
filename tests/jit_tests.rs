//! In-process integration tests for the JIT compiler.
//!
//! These exercise whole-program compilation through the public API and
//! check the generated buffer byte-for-byte: scenario programs with known
//! output shapes plus the structural invariants of the code layout.

use randomx_jit::consts::{
    VmOp, CACHE_LINE_SIZE, INSTRUCTION_WEIGHTS, RANDOMX_PROGRAM_SIZE, SCRATCHPAD_L3_MASK,
};
use randomx_jit::jit::fragments::{
    EPILOGUE, LOOP_LOAD, LOOP_STORE, PROLOGUE, READ_DATASET, READ_DATASET_SSHASH_FIN,
    READ_DATASET_SSHASH_INIT, XMM_CONSTANTS_OFFSET,
};
use randomx_jit::jit::{
    CODE_SIZE, EPILOGUE_OFFSET, RANDOMX_CODE_SIZE, SUPERSCALAR_HASH_OFFSET,
};
use randomx_jit::program::{Instruction, Program, INSTRUCTION_SIZE};
use randomx_jit::{JitCompiler, JitConfig, ProgramConfiguration};

fn body_start() -> usize {
    PROLOGUE.len() + LOOP_LOAD.len()
}

fn instr(opcode: u8, dst: u8, src: u8, mod_: u8, imm32: u32) -> Instruction {
    Instruction {
        opcode,
        dst,
        src,
        mod_,
        imm32,
    }
}

fn program_of(instructions: &[(usize, Instruction)], filler: Instruction) -> Program {
    let mut all = [filler; RANDOMX_PROGRAM_SIZE];
    for &(i, ins) in instructions {
        all[i] = ins;
    }
    Program::new(all)
}

/// A weight table where every opcode byte is a NOP.
const NOP_WEIGHTS: [(VmOp, u8); 2] = [(VmOp::Nop, 128), (VmOp::Nop, 128)];

/// Resolve an opcode byte to its VM operation under the default weights.
fn default_op(opcode: u8) -> VmOp {
    let mut slot = 0u32;
    for &(op, weight) in INSTRUCTION_WEIGHTS.iter() {
        slot += weight as u32;
        if (opcode as u32) < slot {
            return op;
        }
    }
    unreachable!("weights do not cover opcode {opcode}");
}

/// Opcode bytes that dispatch to a given operation under default weights.
fn opcode_for(op: VmOp) -> u8 {
    (0..=255u8).find(|&b| default_op(b) == op).unwrap()
}

/// Deterministic byte stream for pseudo-random programs.
fn seeded_program(seed: u64) -> Program {
    let mut state = seed | 1;
    let mut bytes = [0u8; RANDOMX_PROGRAM_SIZE * INSTRUCTION_SIZE];
    for chunk in bytes.chunks_exact_mut(8) {
        state ^= state >> 12;
        state ^= state << 25;
        state ^= state >> 27;
        chunk.copy_from_slice(&state.wrapping_mul(0x2545F4914F6CDD1D).to_le_bytes());
    }
    Program::from_bytes(&bytes)
}

/// Decode the backward target of the CBRANCH generated at instruction `i`.
fn branch_target(jit: &JitCompiler, i: usize) -> usize {
    let offsets = jit.instruction_offsets();
    let code = jit.code();
    // add (7 bytes) + test (7 bytes), then the conditional jump
    let jz = offsets[i] + 14;
    if code[jz] == 0x74 {
        let disp = code[jz + 1] as i8 as isize;
        ((jz + 2) as isize + disp) as usize
    } else {
        assert_eq!(&code[jz..jz + 2], &[0x0F, 0x84]);
        let disp = i32::from_le_bytes(code[jz + 2..jz + 6].try_into().unwrap()) as isize;
        ((jz + 6) as isize + disp) as usize
    }
}

// ==================== scenarios ====================

#[test]
fn s1_program_of_nops() {
    let mut jit = JitCompiler::with_weights(JitConfig::default(), &NOP_WEIGHTS).unwrap();
    let prog = program_of(&[], instr(0, 0, 0, 0, 0));
    let pcfg = ProgramConfiguration::default();
    jit.generate_program(&prog, &pcfg);

    let start = body_start();
    let code = jit.code();

    // 256 single-byte NOPs
    assert!(code[start..start + 256].iter().all(|&b| b == 0x90));
    for (i, &off) in jit.instruction_offsets().iter().enumerate() {
        assert_eq!(off, start + i);
    }

    // no integer register was ever written
    assert_eq!(jit.register_modified_at(), &[-1; 8]);

    // address-mix glue: mov eax, r2d; xor eax, r3d
    let mut pos = start + 256;
    assert_eq!(&code[pos..pos + 6], &[0x41, 0x8B, 0xC2, 0x41, 0x33, 0xC3]);
    pos += 6;
    assert_eq!(&code[pos..pos + READ_DATASET.len()], &READ_DATASET[..]);
    pos += READ_DATASET.len();
    // mov rax, r0; xor rax, r1
    assert_eq!(&code[pos..pos + 6], &[0x49, 0x8B, 0xC0, 0x49, 0x33, 0xC1]);
    pos += 6;
    assert_eq!(&code[pos..pos + LOOP_STORE.len()], &LOOP_STORE[..]);
    pos += LOOP_STORE.len();

    // sub ebx, 1; jnz back to the loop start (right after the prologue)
    assert_eq!(&code[pos..pos + 5], &[0x83, 0xEB, 0x01, 0x0F, 0x85]);
    let jnz_disp = i32::from_le_bytes(code[pos + 5..pos + 9].try_into().unwrap());
    assert_eq!(pos as i32 + 9 + jnz_disp, PROLOGUE.len() as i32);
    pos += 9;

    // jmp to the preloaded epilogue
    assert_eq!(code[pos], 0xE9);
    let jmp_disp = i32::from_le_bytes(code[pos + 1..pos + 5].try_into().unwrap());
    assert_eq!(pos as i32 + 5 + jmp_disp, EPILOGUE_OFFSET as i32);
    assert_eq!(jit.code_pos(), pos + 5);
}

#[test]
fn s2_power_of_two_imul_rcp_is_elided() {
    let weights = [(VmOp::ImulRcp, 1), (VmOp::Nop, 255)];
    let mut jit = JitCompiler::with_weights(JitConfig::default(), &weights).unwrap();
    // opcode 0 dispatches to IMUL_RCP, everything else to NOP
    let prog = program_of(&[(0, instr(0, 2, 0, 0, 8))], instr(1, 0, 0, 0, 0));
    jit.generate_program(&prog, &ProgramConfiguration::default());

    let offsets = jit.instruction_offsets();
    assert_eq!(offsets[0], body_start());
    assert_eq!(offsets[1], offsets[0]);
    assert_eq!(offsets[2], offsets[1] + 1);
    // the elided multiply did not mark its destination
    assert_eq!(jit.register_modified_at()[2], -1);
}

#[test]
fn s3_self_swap_is_elided_and_unmarked() {
    let weights = [(VmOp::IswapR, 1), (VmOp::Nop, 255)];
    let mut jit = JitCompiler::with_weights(JitConfig::default(), &weights).unwrap();
    let prog = program_of(&[(0, instr(0, 3, 3, 0, 0))], instr(1, 0, 0, 0, 0));
    jit.generate_program(&prog, &ProgramConfiguration::default());

    let offsets = jit.instruction_offsets();
    assert_eq!(offsets[1], offsets[0]);
    assert_eq!(jit.register_modified_at()[3], -1);
}

#[test]
fn s4_branch_targets_one_past_the_register_write() {
    let iadd_rs = opcode_for(VmOp::IaddRs);
    let cbranch = opcode_for(VmOp::Cbranch);
    let filler = instr(opcode_for(VmOp::FswapR), 0, 0, 0, 0);

    let mut jit = JitCompiler::new().unwrap();
    let prog = program_of(
        &[
            (0, instr(iadd_rs, 2, 1, 0, 0)),
            (5, instr(cbranch, 2, 0, 0, 0)),
        ],
        filler,
    );
    jit.generate_program(&prog, &ProgramConfiguration::default());

    // r2 was last written at index 0, so the branch re-enters at index 1
    let offsets = jit.instruction_offsets();
    let target = branch_target(&jit, 5);
    assert_eq!(target, offsets[1]);
    assert!(target < offsets[5], "branch must be backward");
}

#[test]
fn s5_branch_may_not_cross_the_previous_branch() {
    let ineg = opcode_for(VmOp::InegR);
    let cbranch = opcode_for(VmOp::Cbranch);
    let filler = instr(opcode_for(VmOp::FswapR), 0, 0, 0, 0);

    let mut jit = JitCompiler::new().unwrap();
    let prog = program_of(
        &[
            (3, instr(ineg, 5, 0, 0, 0)),
            (10, instr(cbranch, 0, 0, 0, 0)),
            (20, instr(cbranch, 5, 0, 0, 0)),
        ],
        filler,
    );
    jit.generate_program(&prog, &ProgramConfiguration::default());

    // r5 was written at index 3, before the branch at 10: the second branch
    // is clamped to lastBranch + 1
    let offsets = jit.instruction_offsets();
    assert_eq!(branch_target(&jit, 20), offsets[11]);
}

#[test]
fn s6_light_mode_wires_the_superscalar_call() {
    const DATASET_OFFSET: u32 = 0x40000;

    let mut jit = JitCompiler::with_weights(JitConfig::default(), &NOP_WEIGHTS).unwrap();
    let prog = program_of(&[], instr(0, 0, 0, 0, 0));
    jit.generate_program_light(&prog, &ProgramConfiguration::default(), DATASET_OFFSET);

    let code = jit.code();
    let mut pos = body_start() + 256 + 6; // body + address-mix glue
    assert_eq!(
        &code[pos..pos + READ_DATASET_SSHASH_INIT.len()],
        &READ_DATASET_SSHASH_INIT[..]
    );
    pos += READ_DATASET_SSHASH_INIT.len();

    // add ebx, datasetOffset / CacheLineSize
    assert_eq!(&code[pos..pos + 2], &[0x81, 0xC3]);
    let item = u32::from_le_bytes(code[pos + 2..pos + 6].try_into().unwrap());
    assert_eq!(item, DATASET_OFFSET / CACHE_LINE_SIZE);
    pos += 6;

    // call SuperscalarHash with a displacement relative to the next instruction
    assert_eq!(code[pos], 0xE8);
    let disp = i32::from_le_bytes(code[pos + 1..pos + 5].try_into().unwrap());
    assert_eq!(pos as i32 + 5 + disp, SUPERSCALAR_HASH_OFFSET as i32);
    pos += 5;

    assert_eq!(
        &code[pos..pos + READ_DATASET_SSHASH_FIN.len()],
        &READ_DATASET_SSHASH_FIN[..]
    );
}

// ==================== invariants ====================

#[test]
fn compilation_stays_within_the_reserved_region() {
    for seed in [1u64, 42, 0xFEED, u64::MAX] {
        let mut jit = JitCompiler::new().unwrap();
        jit.generate_program(&seeded_program(seed), &ProgramConfiguration::default());
        assert!(jit.code_pos() <= RANDOMX_CODE_SIZE);
    }
}

#[test]
fn instruction_offsets_are_monotonic_with_elisions_flat() {
    let prog = seeded_program(7);
    let mut jit = JitCompiler::new().unwrap();
    jit.generate_program(&prog, &ProgramConfiguration::default());

    let offsets = jit.instruction_offsets();
    for i in 0..RANDOMX_PROGRAM_SIZE - 1 {
        let ins = prog[i];
        let elided = match default_op(ins.opcode) {
            VmOp::IswapR => ins.src % 8 == ins.dst % 8,
            VmOp::ImulRcp => {
                let d = ins.imm32 as u64;
                d & d.wrapping_sub(1) == 0
            }
            VmOp::IrorR | VmOp::IrolR => ins.src % 8 == ins.dst % 8 && ins.imm32 & 63 == 0,
            _ => false,
        };
        if elided {
            assert_eq!(offsets[i + 1], offsets[i], "instruction {i} should emit nothing");
        } else {
            assert!(offsets[i + 1] > offsets[i], "instruction {i} emitted nothing");
        }
    }
}

#[test]
fn double_compilation_is_idempotent() {
    let prog = seeded_program(99);
    let pcfg = ProgramConfiguration::default();

    let mut jit = JitCompiler::new().unwrap();
    jit.generate_program(&prog, &pcfg);
    let first = jit.code().to_vec();
    jit.generate_program(&prog, &pcfg);
    assert_eq!(jit.code(), &first[..]);
}

#[test]
fn fragments_survive_compilation() {
    let prog = seeded_program(1234);
    let mut jit = JitCompiler::new().unwrap();
    // default configuration's eMask equals the island's preloaded value,
    // so the whole prologue region must round-trip
    jit.generate_program(&prog, &ProgramConfiguration::default());

    let code = jit.code();
    assert_eq!(&code[..PROLOGUE.len()], &PROLOGUE[..]);
    assert_eq!(
        &code[PROLOGUE.len()..PROLOGUE.len() + LOOP_LOAD.len()],
        &LOOP_LOAD[..]
    );
    assert_eq!(&code[EPILOGUE_OFFSET..CODE_SIZE], &EPILOGUE[..]);
}

#[test]
fn e_mask_is_patched_per_compilation() {
    let prog = seeded_program(5);
    let pcfg = ProgramConfiguration {
        e_mask: [0x3F00112233445566, 0x3C00AABBCCDDEEFF],
        ..ProgramConfiguration::default()
    };
    let mut jit = JitCompiler::new().unwrap();
    jit.generate_program(&prog, &pcfg);

    let slot = &jit.code()[XMM_CONSTANTS_OFFSET + 16..XMM_CONSTANTS_OFFSET + 32];
    assert_eq!(
        u64::from_le_bytes(slot[..8].try_into().unwrap()),
        pcfg.e_mask[0]
    );
    assert_eq!(
        u64::from_le_bytes(slot[8..].try_into().unwrap()),
        pcfg.e_mask[1]
    );
}

#[test]
fn light_and_full_modes_share_the_body() {
    let prog = seeded_program(0xC0FFEE);
    let pcfg = ProgramConfiguration::default();

    let mut full = JitCompiler::new().unwrap();
    full.generate_program(&prog, &pcfg);
    let mut light = JitCompiler::new().unwrap();
    light.generate_program_light(&prog, &pcfg, 0);

    // identical bytes up to the start of the last instruction; only the
    // dataset-read tail differs
    let end = full.instruction_offsets()[RANDOMX_PROGRAM_SIZE - 1];
    assert_eq!(&full.code()[body_start()..end], &light.code()[body_start()..end]);
}

#[test]
fn every_branch_lands_on_a_recorded_offset() {
    let prog = seeded_program(0xBADC0DE);
    let mut jit = JitCompiler::new().unwrap();
    jit.generate_program(&prog, &ProgramConfiguration::default());

    let offsets = jit.instruction_offsets();
    for i in 0..RANDOMX_PROGRAM_SIZE {
        if default_op(prog[i].opcode) == VmOp::Cbranch {
            let target = branch_target(&jit, i);
            // at most the branch's own start (re-executing itself is legal)
            assert!(target <= offsets[i], "branch at {i} must be backward");
            assert!(
                offsets[..=i].contains(&target),
                "branch at {i} targets an unrecorded offset"
            );
        }
    }
}

#[test]
fn aliased_memory_operands_premask_to_l3() {
    // IADD_M with src == dst folds the masked immediate into the operand
    let iadd_m = opcode_for(VmOp::IaddM);
    let filler = instr(opcode_for(VmOp::FswapR), 0, 0, 0, 0);
    let mut jit = JitCompiler::new().unwrap();
    let prog = program_of(&[(0, instr(iadd_m, 1, 1, 0, 0xFFFF_FFFF))], filler);
    jit.generate_program(&prog, &ProgramConfiguration::default());

    let start = jit.instruction_offsets()[0];
    let code = jit.code();
    assert_eq!(&code[start..start + 3], &[0x4C, 0x03, 0x8E]);
    let disp = u32::from_le_bytes(code[start + 3..start + 7].try_into().unwrap());
    assert_eq!(disp, 0xFFFF_FFFF & SCRATCHPAD_L3_MASK);
}
