use iced_x86::{Instruction, Mnemonic, Register};

use crate::ir::{CallTarget, Expr, IrType, Stmt};

fn plain_memory_address(instr: &Instruction) -> Expr {
    let base = instr.memory_base();
    let disp = instr.memory_displacement64() as i64;
    let base_expr = if base == Register::None { Expr::const_u(0, 64) } else { Expr::reg(super::registers::register_name(base)) };
    if disp == 0 {
        base_expr
    } else if disp > 0 {
        Expr::bin(crate::ir::BinOp::Add, base_expr, Expr::const_i(disp, 64), 64)
    } else {
        Expr::bin(crate::ir::BinOp::Sub, base_expr, Expr::const_i(-disp, 64), 64)
    }
}

fn void_ptr(value: Expr) -> Expr {
    Expr::cast(IrType::pointer_to(IrType::Void), value)
}

/// Looks back through the statements already emitted in the current block
/// for the most recent value assigned to register `reg`, so idiom
/// coalescing can print the value a register held rather than the register
/// itself (e.g. `rdi` holding `&local_40` from a preceding `lea`). Looks the
/// statement up under the same alias the translator assigns it under
/// (`register_name` — `rcx` reads back as `p1`, etc.), since that is the
/// name any preceding `Stmt::Assign` for it was actually emitted with.
fn last_assigned_value(preceding: &[Stmt], reg: Register) -> Option<Expr> {
    let name = super::registers::register_name(reg);
    preceding.iter().rev().find_map(|s| match s {
        Stmt::Assign { dest: Expr::RegExpr { name: n }, value } if *n == name => Some(value.clone()),
        _ => None,
    })
}

fn reg_or_last_value(preceding: &[Stmt], reg: Register) -> Expr {
    last_assigned_value(preceding, reg).unwrap_or_else(|| Expr::reg(super::registers::register_name(reg)))
}

fn memset_call(dst: Expr, value: Expr, len: Expr) -> Stmt {
    Stmt::Call {
        dest: None,
        target: CallTarget::Symbol("memset".to_string()),
        args: vec![void_ptr(dst), value, len],
    }
}

fn memcpy_call(dst: Expr, src: Expr, len: Expr) -> Stmt {
    Stmt::Call {
        dest: None,
        target: CallTarget::Symbol("memcpy".to_string()),
        args: vec![void_ptr(dst), void_ptr(src), len],
    }
}

/// Looks for a multi-instruction idiom starting at `instructions[0]`.
/// `preceding` is every statement already emitted in the current block,
/// consulted to resolve what value a register (`rdi`, `rax`, `rcx`, ...)
/// currently holds. Returns the number of leading instructions consumed and
/// the single statement that replaces them, or `None` if nothing matched.
pub fn try_coalesce(instructions: &[Instruction], preceding: &[Stmt]) -> Option<(usize, Stmt)> {
    if instructions.is_empty() {
        return None;
    }
    let first = &instructions[0];

    if matches!(first.mnemonic(), Mnemonic::Movsb | Mnemonic::Movsw | Mnemonic::Movsd | Mnemonic::Movsq) && first.has_rep_prefix() {
        let elem_len = match first.mnemonic() {
            Mnemonic::Movsb => 1,
            Mnemonic::Movsw => 2,
            Mnemonic::Movsd => 4,
            Mnemonic::Movsq => 8,
            _ => unreachable!(),
        };
        let count = Expr::bin(crate::ir::BinOp::Mul, reg_or_last_value(preceding, Register::RCX), Expr::const_i(elem_len, 64), 64);
        let stmt = memcpy_call(reg_or_last_value(preceding, Register::RDI), reg_or_last_value(preceding, Register::RSI), count);
        return Some((1, stmt));
    }

    if matches!(first.mnemonic(), Mnemonic::Stosb | Mnemonic::Stosw | Mnemonic::Stosd | Mnemonic::Stosq) && first.has_rep_prefix() {
        let elem_len = match first.mnemonic() {
            Mnemonic::Stosb => 1,
            Mnemonic::Stosw => 2,
            Mnemonic::Stosd => 4,
            Mnemonic::Stosq => 8,
            _ => unreachable!(),
        };
        let count = Expr::bin(crate::ir::BinOp::Mul, reg_or_last_value(preceding, Register::RCX), Expr::const_i(elem_len, 64), 64);
        let stmt = memset_call(reg_or_last_value(preceding, Register::RDI), reg_or_last_value(preceding, Register::RAX), count);
        return Some((1, stmt));
    }

    if first.mnemonic() == Mnemonic::Xorps
        && first.op0_kind() == iced_x86::OpKind::Register
        && first.op1_kind() == iced_x86::OpKind::Register
        && first.op0_register() == first.op1_register()
    {
        let xmm = first.op0_register();
        let mut count = 0usize;
        let mut base_addr: Option<Expr> = None;
        let mut next_disp: Option<i64> = None;
        for instr in &instructions[1..] {
            let is_store = matches!(instr.mnemonic(), Mnemonic::Movups | Mnemonic::Movdqu | Mnemonic::Movaps | Mnemonic::Movdqa)
                && instr.op0_kind() == iced_x86::OpKind::Memory
                && instr.op1_kind() == iced_x86::OpKind::Register
                && instr.op1_register() == xmm
                && instr.memory_base() == Register::RSP;
            if !is_store {
                break;
            }
            let disp = instr.memory_displacement64() as i64;
            match next_disp {
                Some(expected) if expected != disp => break,
                _ => {}
            }
            if base_addr.is_none() {
                base_addr = Some(plain_memory_address(instr));
            }
            next_disp = Some(disp + 16);
            count += 1;
        }
        if count > 0 {
            let total_bytes = count as i64 * 16;
            return Some((1 + count, memset_call(base_addr.unwrap(), Expr::const_u(0, 8), Expr::const_i(total_bytes, 64))));
        }
    }

    if matches!(first.mnemonic(), Mnemonic::Movdqu | Mnemonic::Movups) && first.op1_kind() == iced_x86::OpKind::Memory {
        let xmm = first.op0_register();
        let mut total = 0i64;
        let mut pairs = 0usize;
        let mut i = 0;
        let mut dst_base: Option<Expr> = None;
        let mut src_base: Option<Expr> = None;
        while i + 1 < instructions.len() {
            let load = &instructions[i];
            let store = &instructions[i + 1];
            let load_ok = matches!(load.mnemonic(), Mnemonic::Movdqu | Mnemonic::Movups)
                && load.op0_kind() == iced_x86::OpKind::Register
                && load.op0_register() == xmm
                && load.op1_kind() == iced_x86::OpKind::Memory;
            let store_ok = matches!(store.mnemonic(), Mnemonic::Movdqu | Mnemonic::Movups)
                && store.op0_kind() == iced_x86::OpKind::Memory
                && store.op1_kind() == iced_x86::OpKind::Register
                && store.op1_register() == xmm;
            if !load_ok || !store_ok {
                break;
            }
            if pairs == 0 {
                src_base = Some(plain_memory_address(load));
                dst_base = Some(plain_memory_address(store));
            }
            total += 16;
            pairs += 1;
            i += 2;
        }
        if total >= 32 {
            return Some((pairs * 2, memcpy_call(dst_base.unwrap(), src_base.unwrap(), Expr::const_i(total, 64))));
        }
    }

    None
}
