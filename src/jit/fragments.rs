//! Precompiled code fragments.
//!
//! The generated program is stitched together from fixed native fragments
//! with the per-instruction body emitted in between. Each fragment is a
//! static byte array; region sizes are the array lengths and the layout
//! offsets below are derived from them.
//!
//! Register conventions shared by the fragments and the emitters:
//!
//! ```text
//! rax, rcx, rdx  temporaries
//! rbx            iteration counter "ic"
//! rsi            scratchpad pointer
//! rdi            dataset (or cache) pointer
//! rbp            memory registers "ma" (high 32 bits), "mx" (low 32 bits)
//! rsp            points at the 4-entry MXCSR table during the loop
//! r8-r15         integer registers r0-r7
//! xmm0-xmm3      group F
//! xmm4-xmm7      group E
//! xmm8-xmm11     group A
//! xmm12          temporary
//! xmm13          group E 'and' mask
//! xmm14          group E 'or' mask (eMask, patched per compilation)
//! xmm15          scale mask
//! ```

/// Function prologue: entry from `ProgramFunc(regfile, mem, scratchpad, ic)`.
/// Saves callee-saved registers, pushes the MXCSR rounding table, loads the
/// group A registers and the xmm constants, zeroes r0-r7 and stages the
/// scratchpad/dataset/loop-counter registers.
///
/// The 48-byte xmm-constants island lives inside this fragment at
/// `XMM_CONSTANTS_OFFSET` (16-byte aligned, jumped over by the entry path):
/// +0 the group E 'and' mask, +16 the eMask slot, +32 the scale mask.
pub const PROLOGUE: [u8; 203] = [
    0x53, // push rbx
    0x55, // push rbp
    0x41, 0x54, // push r12
    0x41, 0x55, // push r13
    0x41, 0x56, // push r14
    0x41, 0x57, // push r15
    0x57, // push rdi              ; register file, reloaded by the epilogue
    // MXCSR table: nearest 0x9FC0, down 0xBFC0, up 0xDFC0, zero 0xFFC0
    0x48, 0xb8, 0xc0, 0xdf, 0x00, 0x00, 0xc0, 0xff, 0x00, 0x00, // mov rax, 0x0000FFC00000DFC0
    0x50, // push rax
    0x48, 0xb8, 0xc0, 0x9f, 0x00, 0x00, 0xc0, 0xbf, 0x00, 0x00, // mov rax, 0x0000BFC000009FC0
    0x50, // push rax
    0x0f, 0xae, 0x14, 0x24, // ldmxcsr [rsp]        ; start in round-to-nearest
    0x66, 0x44, 0x0f, 0x28, 0x87, 0xc0, 0x00, 0x00, 0x00, // movapd xmm8,  [rdi+0xC0]
    0x66, 0x44, 0x0f, 0x28, 0x8f, 0xd0, 0x00, 0x00, 0x00, // movapd xmm9,  [rdi+0xD0]
    0x66, 0x44, 0x0f, 0x28, 0x97, 0xe0, 0x00, 0x00, 0x00, // movapd xmm10, [rdi+0xE0]
    0x66, 0x44, 0x0f, 0x28, 0x9f, 0xf0, 0x00, 0x00, 0x00, // movapd xmm11, [rdi+0xF0]
    0x45, 0x33, 0xc0, // xor r8d, r8d
    0x45, 0x33, 0xc9, // xor r9d, r9d
    0x45, 0x33, 0xd2, // xor r10d, r10d
    0x45, 0x33, 0xdb, // xor r11d, r11d
    0x45, 0x33, 0xe4, // xor r12d, r12d
    0x45, 0x33, 0xed, // xor r13d, r13d
    0x45, 0x33, 0xf6, // xor r14d, r14d
    0x45, 0x33, 0xff, // xor r15d, r15d
    0x48, 0x8b, 0xd9, // mov rbx, rcx         ; iteration counter
    0x48, 0x8b, 0x06, // mov rax, [rsi]       ; ma/mx pair
    0x48, 0x8b, 0x7e, 0x08, // mov rdi, [rsi+8]     ; dataset pointer
    0x48, 0x8b, 0xf2, // mov rsi, rdx         ; scratchpad pointer
    0x48, 0x8b, 0xe8, // mov rbp, rax
    0xeb, 0x3d, // jmp +0x3D            ; skip the constants island
    // pad to the 16-byte aligned island at offset 128
    0x66, 0x0f, 0x1f, 0x84, 0x00, 0x00, 0x00, 0x00, 0x00, // nop9
    0x0f, 0x1f, 0x40, 0x00, // nop4
    // xmm-constants island (offset 128)
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00, // E 'and' mask lo
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00, // E 'and' mask hi
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x3b, // eMask slot lo (overwritten)
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x3b, // eMask slot hi (overwritten)
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xf0, 0x81, // scale mask lo
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xf0, 0x81, // scale mask hi
    // (offset 176)
    0x66, 0x44, 0x0f, 0x28, 0x2d, 0xc7, 0xff, 0xff, 0xff, // movapd xmm13, [rip-57]
    0x66, 0x44, 0x0f, 0x28, 0x35, 0xce, 0xff, 0xff, 0xff, // movapd xmm14, [rip-50]
    0x66, 0x44, 0x0f, 0x28, 0x3d, 0xd5, 0xff, 0xff, 0xff, // movapd xmm15, [rip-43]
];

/// Offset of the xmm-constants island within [`PROLOGUE`].
pub const XMM_CONSTANTS_OFFSET: usize = 128;

/// Loop header: derive the two scratchpad addresses from ma/mx, mix the
/// scratchpad line into r0-r7 and load the F/E groups (E masked into its
/// valid exponent range). The loop-back branch in the generated tail targets
/// the start of this fragment.
pub const LOOP_LOAD: [u8; 138] = [
    0x48, 0x8b, 0xc5, // mov rax, rbp
    0x48, 0xc1, 0xe8, 0x20, // shr rax, 32          ; ma
    0x8b, 0xcd, // mov ecx, ebp         ; mx
    0x81, 0xe1, 0xc0, 0xff, 0x1f, 0x00, // and ecx, 0x001FFFC0
    0x25, 0xc0, 0xff, 0x1f, 0x00, // and eax, 0x001FFFC0
    0x4c, 0x33, 0x04, 0x0e, // xor r8,  [rsi+rcx]
    0x4c, 0x33, 0x4c, 0x0e, 0x08, // xor r9,  [rsi+rcx+8]
    0x4c, 0x33, 0x54, 0x0e, 0x10, // xor r10, [rsi+rcx+16]
    0x4c, 0x33, 0x5c, 0x0e, 0x18, // xor r11, [rsi+rcx+24]
    0x4c, 0x33, 0x64, 0x0e, 0x20, // xor r12, [rsi+rcx+32]
    0x4c, 0x33, 0x6c, 0x0e, 0x28, // xor r13, [rsi+rcx+40]
    0x4c, 0x33, 0x74, 0x0e, 0x30, // xor r14, [rsi+rcx+48]
    0x4c, 0x33, 0x7c, 0x0e, 0x38, // xor r15, [rsi+rcx+56]
    0xf3, 0x0f, 0xe6, 0x04, 0x06, // cvtdq2pd xmm0, [rsi+rax]
    0xf3, 0x0f, 0xe6, 0x4c, 0x06, 0x08, // cvtdq2pd xmm1, [rsi+rax+8]
    0xf3, 0x0f, 0xe6, 0x54, 0x06, 0x10, // cvtdq2pd xmm2, [rsi+rax+16]
    0xf3, 0x0f, 0xe6, 0x5c, 0x06, 0x18, // cvtdq2pd xmm3, [rsi+rax+24]
    0xf3, 0x0f, 0xe6, 0x64, 0x06, 0x20, // cvtdq2pd xmm4, [rsi+rax+32]
    0xf3, 0x0f, 0xe6, 0x6c, 0x06, 0x28, // cvtdq2pd xmm5, [rsi+rax+40]
    0xf3, 0x0f, 0xe6, 0x74, 0x06, 0x30, // cvtdq2pd xmm6, [rsi+rax+48]
    0xf3, 0x0f, 0xe6, 0x7c, 0x06, 0x38, // cvtdq2pd xmm7, [rsi+rax+56]
    0x41, 0x0f, 0x54, 0xe5, // andps xmm4, xmm13
    0x41, 0x0f, 0x54, 0xed, // andps xmm5, xmm13
    0x41, 0x0f, 0x54, 0xf5, // andps xmm6, xmm13
    0x41, 0x0f, 0x54, 0xfd, // andps xmm7, xmm13
    0x41, 0x0f, 0x56, 0xe6, // orps xmm4, xmm14
    0x41, 0x0f, 0x56, 0xee, // orps xmm5, xmm14
    0x41, 0x0f, 0x56, 0xf6, // orps xmm6, xmm14
    0x41, 0x0f, 0x56, 0xfe, // orps xmm7, xmm14
];

/// Full-mode dataset read: swap ma/mx, fold the dataset line at ma into
/// r0-r7 and prefetch the line at the new mx. Entered with the mixed
/// address in eax.
pub const READ_DATASET: [u8; 59] = [
    0x8b, 0xd0, // mov edx, eax
    0x81, 0xe2, 0xc0, 0xff, 0xff, 0x3f, // and edx, 0x3FFFFFC0
    0x33, 0xea, // xor ebp, edx         ; mx ^= addr
    0x48, 0xc1, 0xcd, 0x20, // ror rbp, 32          ; swap ma <-> mx
    0x8b, 0xd5, // mov edx, ebp         ; ma
    0x4c, 0x33, 0x04, 0x17, // xor r8,  [rdi+rdx]
    0x4c, 0x33, 0x4c, 0x17, 0x08, // xor r9,  [rdi+rdx+8]
    0x4c, 0x33, 0x54, 0x17, 0x10, // xor r10, [rdi+rdx+16]
    0x4c, 0x33, 0x5c, 0x17, 0x18, // xor r11, [rdi+rdx+24]
    0x4c, 0x33, 0x64, 0x17, 0x20, // xor r12, [rdi+rdx+32]
    0x4c, 0x33, 0x6c, 0x17, 0x28, // xor r13, [rdi+rdx+40]
    0x4c, 0x33, 0x74, 0x17, 0x30, // xor r14, [rdi+rdx+48]
    0x4c, 0x33, 0x7c, 0x17, 0x38, // xor r15, [rdi+rdx+56]
    0x0f, 0x18, 0x04, 0x17, // prefetchnta [rdi+rdx]
];

/// Light-mode preamble: spill the VM state and convert the mixed address in
/// eax to a dataset item number in ebx for the SuperscalarHash call.
pub const READ_DATASET_SSHASH_INIT: [u8; 25] = [
    0x53, // push rbx
    0x55, // push rbp
    0x56, // push rsi
    0x57, // push rdi
    0x41, 0x50, // push r8
    0x41, 0x51, // push r9
    0x41, 0x52, // push r10
    0x41, 0x53, // push r11
    0x41, 0x54, // push r12
    0x41, 0x55, // push r13
    0x41, 0x56, // push r14
    0x41, 0x57, // push r15
    0x89, 0xc3, // mov ebx, eax
    0xc1, 0xeb, 0x06, // shr ebx, 6           ; address -> item number
];

/// Light-mode postamble: the dataset item is in r0-r7; fold in the saved VM
/// registers from the stack and restore the spilled state.
pub const READ_DATASET_SSHASH_FIN: [u8; 63] = [
    0x4c, 0x33, 0x3c, 0x24, // xor r15, [rsp]
    0x4c, 0x33, 0x74, 0x24, 0x08, // xor r14, [rsp+8]
    0x4c, 0x33, 0x6c, 0x24, 0x10, // xor r13, [rsp+16]
    0x4c, 0x33, 0x64, 0x24, 0x18, // xor r12, [rsp+24]
    0x4c, 0x33, 0x5c, 0x24, 0x20, // xor r11, [rsp+32]
    0x4c, 0x33, 0x54, 0x24, 0x28, // xor r10, [rsp+40]
    0x4c, 0x33, 0x4c, 0x24, 0x30, // xor r9,  [rsp+48]
    0x4c, 0x33, 0x44, 0x24, 0x38, // xor r8,  [rsp+56]
    0x48, 0x8b, 0x7c, 0x24, 0x40, // mov rdi, [rsp+64]
    0x48, 0x8b, 0x74, 0x24, 0x48, // mov rsi, [rsp+72]
    0x48, 0x8b, 0x6c, 0x24, 0x50, // mov rbp, [rsp+80]
    0x48, 0x8b, 0x5c, 0x24, 0x58, // mov rbx, [rsp+88]
    0x48, 0x83, 0xc4, 0x60, // add rsp, 96
];

/// Loop footer: store r0-r7 at the address in eax, fold E into F and store
/// the float registers at the ma-derived address.
pub const LOOP_STORE: [u8; 87] = [
    0x25, 0xc0, 0xff, 0x1f, 0x00, // and eax, 0x001FFFC0
    0x4c, 0x89, 0x04, 0x06, // mov [rsi+rax],    r8
    0x4c, 0x89, 0x4c, 0x06, 0x08, // mov [rsi+rax+8],  r9
    0x4c, 0x89, 0x54, 0x06, 0x10, // mov [rsi+rax+16], r10
    0x4c, 0x89, 0x5c, 0x06, 0x18, // mov [rsi+rax+24], r11
    0x4c, 0x89, 0x64, 0x06, 0x20, // mov [rsi+rax+32], r12
    0x4c, 0x89, 0x6c, 0x06, 0x28, // mov [rsi+rax+40], r13
    0x4c, 0x89, 0x74, 0x06, 0x30, // mov [rsi+rax+48], r14
    0x4c, 0x89, 0x7c, 0x06, 0x38, // mov [rsi+rax+56], r15
    0x0f, 0x57, 0xc4, // xorps xmm0, xmm4
    0x0f, 0x57, 0xcd, // xorps xmm1, xmm5
    0x0f, 0x57, 0xd6, // xorps xmm2, xmm6
    0x0f, 0x57, 0xdf, // xorps xmm3, xmm7
    0x8b, 0xd5, // mov edx, ebp
    0x81, 0xe2, 0xc0, 0xff, 0x1f, 0x00, // and edx, 0x001FFFC0
    0x66, 0x0f, 0x29, 0x04, 0x16, // movapd [rsi+rdx],    xmm0
    0x66, 0x0f, 0x29, 0x4c, 0x16, 0x10, // movapd [rsi+rdx+16], xmm1
    0x66, 0x0f, 0x29, 0x54, 0x16, 0x20, // movapd [rsi+rdx+32], xmm2
    0x66, 0x0f, 0x29, 0x5c, 0x16, 0x30, // movapd [rsi+rdx+48], xmm3
];

/// Function epilogue: drop the MXCSR table, write all register groups back
/// to the register file and restore callee-saved registers.
pub const EPILOGUE: [u8; 99] = [
    0x48, 0x83, 0xc4, 0x10, // add rsp, 16          ; drop the MXCSR table
    0x5f, // pop rdi              ; register file
    0x4c, 0x89, 0x07, // mov [rdi],    r8
    0x4c, 0x89, 0x4f, 0x08, // mov [rdi+8],  r9
    0x4c, 0x89, 0x57, 0x10, // mov [rdi+16], r10
    0x4c, 0x89, 0x5f, 0x18, // mov [rdi+24], r11
    0x4c, 0x89, 0x67, 0x20, // mov [rdi+32], r12
    0x4c, 0x89, 0x6f, 0x28, // mov [rdi+40], r13
    0x4c, 0x89, 0x77, 0x30, // mov [rdi+48], r14
    0x4c, 0x89, 0x7f, 0x38, // mov [rdi+56], r15
    0x66, 0x0f, 0x29, 0x47, 0x40, // movapd [rdi+0x40], xmm0
    0x66, 0x0f, 0x29, 0x4f, 0x50, // movapd [rdi+0x50], xmm1
    0x66, 0x0f, 0x29, 0x57, 0x60, // movapd [rdi+0x60], xmm2
    0x66, 0x0f, 0x29, 0x5f, 0x70, // movapd [rdi+0x70], xmm3
    0x66, 0x0f, 0x29, 0xa7, 0x80, 0x00, 0x00, 0x00, // movapd [rdi+0x80], xmm4
    0x66, 0x0f, 0x29, 0xaf, 0x90, 0x00, 0x00, 0x00, // movapd [rdi+0x90], xmm5
    0x66, 0x0f, 0x29, 0xb7, 0xa0, 0x00, 0x00, 0x00, // movapd [rdi+0xA0], xmm6
    0x66, 0x0f, 0x29, 0xbf, 0xb0, 0x00, 0x00, 0x00, // movapd [rdi+0xB0], xmm7
    0x41, 0x5f, // pop r15
    0x41, 0x5e, // pop r14
    0x41, 0x5d, // pop r13
    0x41, 0x5c, // pop r12
    0x5d, // pop rbp
    0x5b, // pop rbx
    0xc3, // ret
];

/// Dataset initialization: `DatasetInitFunc(cache, dataset, start, end)`
/// loops items through the SuperscalarHash routine and stores each 64-byte
/// item. The CALL displacement is a literal because this fragment is always
/// placed at offset 0 and the routine at `SUPERSCALAR_HASH_OFFSET`.
pub const DATASET_INIT: [u8; 63] = [
    0x53, // push rbx
    0x55, // push rbp
    0x51, // push rcx             ; end item kept on the stack
    0x48, 0x8b, 0xda, // mov rbx, rdx         ; first item
    0x48, 0x8b, 0xee, // mov rbp, rsi         ; output pointer
    // loop:
    0xe8, 0xf2, 0x2f, 0x00, 0x00, // call +0x2FF2         ; SuperscalarHash routine
    0x4c, 0x89, 0x45, 0x00, // mov [rbp],    r8
    0x4c, 0x89, 0x4d, 0x08, // mov [rbp+8],  r9
    0x4c, 0x89, 0x55, 0x10, // mov [rbp+16], r10
    0x4c, 0x89, 0x5d, 0x18, // mov [rbp+24], r11
    0x4c, 0x89, 0x65, 0x20, // mov [rbp+32], r12
    0x4c, 0x89, 0x6d, 0x28, // mov [rbp+40], r13
    0x4c, 0x89, 0x75, 0x30, // mov [rbp+48], r14
    0x4c, 0x89, 0x7d, 0x38, // mov [rbp+56], r15
    0x48, 0x83, 0xc5, 0x40, // add rbp, 64
    0x48, 0xff, 0xc3, // inc rbx
    0x48, 0x3b, 0x1c, 0x24, // cmp rbx, [rsp]
    0x75, 0xce, // jne loop
    0x59, // pop rcx
    0x5d, // pop rbp
    0x5b, // pop rbx
    0xc3, // ret
];

/// SuperscalarHash entry: seed r0-r7 from the item number in rbx.
pub const SSHASH_INIT: [u8; 76] = [
    0x4c, 0x8d, 0x43, 0x01, // lea r8, [rbx+1]
    0x48, 0xb8, 0x2d, 0x7f, 0x95, 0x4c, 0x2d, 0xf4, 0x51, 0x58, // mov rax, 6364136223846793005
    0x4c, 0x0f, 0xaf, 0xc0, // imul r8, rax
    0x4d, 0x8b, 0xc8, // mov r9, r8
    0x49, 0xc1, 0xc9, 0x20, // ror r9, 32
    0x4d, 0x8b, 0xd1, // mov r10, r9
    0x49, 0x81, 0xf2, 0x11, 0x33, 0x55, 0x77, // xor r10, 0x77553311
    0x4d, 0x8b, 0xda, // mov r11, r10
    0x49, 0xc1, 0xcb, 0x15, // ror r11, 21
    0x4d, 0x8b, 0xe3, // mov r12, r11
    0x49, 0x81, 0xf4, 0xaa, 0xbb, 0xcc, 0x0d, // xor r12, 0x0DCCBBAA
    0x4d, 0x8b, 0xec, // mov r13, r12
    0x49, 0xc1, 0xcd, 0x0b, // ror r13, 11
    0x4d, 0x8b, 0xf5, // mov r14, r13
    0x49, 0x81, 0xf6, 0x77, 0x55, 0x33, 0x11, // xor r14, 0x11335577
    0x4d, 0x8b, 0xfe, // mov r15, r14
    0x49, 0xc1, 0xcf, 0x07, // ror r15, 7
];

/// Fold the cache line addressed by the current item registers into r0-r7,
/// emitted after each superscalar program.
pub const SSHASH_LOAD: [u8; 51] = [
    0x48, 0x8b, 0xc3, // mov rax, rbx
    0x25, 0xff, 0xff, 0x3f, 0x00, // and eax, 0x003FFFFF  ; cache item mask
    0x48, 0xc1, 0xe0, 0x06, // shl rax, 6
    0x4c, 0x33, 0x04, 0x07, // xor r8,  [rdi+rax]
    0x4c, 0x33, 0x4c, 0x07, 0x08, // xor r9,  [rdi+rax+8]
    0x4c, 0x33, 0x54, 0x07, 0x10, // xor r10, [rdi+rax+16]
    0x4c, 0x33, 0x5c, 0x07, 0x18, // xor r11, [rdi+rax+24]
    0x4c, 0x33, 0x64, 0x07, 0x20, // xor r12, [rdi+rax+32]
    0x4c, 0x33, 0x6c, 0x07, 0x28, // xor r13, [rdi+rax+40]
    0x4c, 0x33, 0x74, 0x07, 0x30, // xor r14, [rdi+rax+48]
    0x4c, 0x33, 0x7c, 0x07, 0x38, // xor r15, [rdi+rax+56]
];

/// Prefetch the cache line for the next superscalar program. The assembler
/// loads rbx from the program's address register immediately before this.
pub const SSHASH_PREFETCH: [u8; 16] = [
    0x48, 0x8b, 0xc3, // mov rax, rbx
    0x25, 0xff, 0xff, 0x3f, 0x00, // and eax, 0x003FFFFF
    0x48, 0xc1, 0xe0, 0x06, // shl rax, 6
    0x0f, 0x18, 0x04, 0x07, // prefetchnta [rdi+rax]
];
