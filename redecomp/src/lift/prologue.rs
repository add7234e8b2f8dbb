use iced_x86::{Instruction, Mnemonic, OpKind, Register};

use super::engine::is_immediate_kind;
use super::registers::is_nonvolatile_gpr;

pub struct PrologueMatch {
    /// Number of leading instructions the prologue consumed.
    pub instruction_count: usize,
    pub uses_frame_pointer: bool,
    pub local_size: i64,
}

/// Recognizes the canonical MSVC x64 prologue: a run of `push` of
/// non-volatile registers, an optional `sub rsp, K`, an optional
/// `lea rbp, [rsp+K']`, and XMM saves at `[rbp±offset]`. Matches only a
/// leading run; anything not matching the shape stops the scan and the
/// already-matched prefix is still reported.
pub fn detect_prologue(instructions: &[Instruction]) -> Option<PrologueMatch> {
    let mut i = 0;
    let mut local_size: i64 = 0;
    let mut uses_frame_pointer = false;

    while i < instructions.len() {
        let instr = &instructions[i];
        if instr.mnemonic() == Mnemonic::Push
            && instr.op0_kind() == OpKind::Register
            && is_nonvolatile_gpr(instr.op0_register())
        {
            i += 1;
            continue;
        }
        // MSVC sometimes homes a non-volatile register to shadow space with
        // a plain store (`mov [rsp+K], rbx`) ahead of the `sub rsp`, rather
        // than a `push` — same spill, different encoding.
        if instr.mnemonic() == Mnemonic::Mov
            && instr.op0_kind() == OpKind::Memory
            && instr.memory_base() == Register::RSP
            && instr.memory_index() == Register::None
            && instr.op1_kind() == OpKind::Register
            && is_nonvolatile_gpr(instr.op1_register())
        {
            i += 1;
            continue;
        }
        break;
    }

    if i == 0 {
        return None;
    }

    if i < instructions.len() {
        let instr = &instructions[i];
        if instr.mnemonic() == Mnemonic::Sub
            && instr.op0_kind() == OpKind::Register
            && instr.op0_register() == Register::RSP
            && is_immediate_kind(instr.op1_kind())
        {
            local_size = instr.immediate(1) as i64;
            i += 1;
        }
    }

    if i < instructions.len() {
        let instr = &instructions[i];
        if instr.mnemonic() == Mnemonic::Lea
            && instr.op0_kind() == OpKind::Register
            && instr.op0_register() == Register::RBP
            && instr.memory_base() == Register::RSP
        {
            uses_frame_pointer = true;
            i += 1;
        }
    }

    while i < instructions.len() {
        let instr = &instructions[i];
        let is_xmm_save = matches!(instr.mnemonic(), Mnemonic::Movaps | Mnemonic::Movdqa)
            && instr.op0_kind() == OpKind::Memory
            && instr.memory_base() == Register::RBP;
        if is_xmm_save {
            i += 1;
        } else {
            break;
        }
    }

    Some(PrologueMatch { instruction_count: i, uses_frame_pointer, local_size })
}
