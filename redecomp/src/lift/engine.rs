use std::collections::BTreeMap;

use iced_x86::{Decoder, DecoderOptions, Instruction, Mnemonic, OpKind, Register};

use crate::error::{EngineError, Result};
use crate::ir::{BasicBlock, CallTarget, CompareOp, Expr, FunctionIR, IrType, LabelSymbol, LocalInfo, ParamInfo, Segment, Stmt, TagValue};

use super::idioms;
use super::options::Options;
use super::prologue;
use super::registers::{gpr_name, is_xmm_family, register_bits, register_name};

struct CompareFact {
    left: Expr,
    right: Expr,
}

/// Lifts the bytes of one function starting at `options.base_address` into
/// a `FunctionIR`. Decodes the whole slice (bounded by `options.max_bytes`)
/// rather than stopping at the first `ret`, since a function can have
/// multiple return points reachable only via a later branch target.
pub fn lift_function(code: &[u8], options: &Options) -> Result<FunctionIR> {
    if code.is_empty() {
        return Err(EngineError::NoFunctionBytes);
    }

    let slice = &code[..code.len().min(options.max_bytes)];
    let instructions = decode_all(slice, options.base_address, options.cancellation.as_ref())?;

    let labels = discover_labels(&instructions, options);

    let mut func = FunctionIR::new(options.function_name.clone(), 0);
    func.return_type = IrType::default_int();

    let prologue_match = if options.detect_prologue {
        prologue::detect_prologue(&instructions)
    } else {
        None
    };

    let mut start_index = 0;
    if let Some(p) = &prologue_match {
        func.set_tag("UsesFramePointer", TagValue::Bool(p.uses_frame_pointer));
        func.set_tag("LocalSize", TagValue::Int(p.local_size));
        start_index = p.instruction_count;
    } else {
        func.set_tag("UsesFramePointer", TagValue::Bool(false));
    }

    assign_params(&mut func, &instructions);

    let mut block = BasicBlock::new(LabelSymbol::new("entry"));
    if let Some(p) = &prologue_match {
        if p.instruction_count > 0 {
            for ins in &instructions[..p.instruction_count] {
                block.stmts.push(Stmt::AsmComment { text: asm_comment_text(ins) });
            }
            block.stmts.push(Stmt::Pseudo { kind: "prologue".to_string(), args: Vec::new() });
        }
    }

    let mut compare_fact: Option<CompareFact> = None;
    let mut bit_test_fact: Option<Expr> = None;

    let mut i = start_index;
    while i < instructions.len() {
        let instr = &instructions[i];

        if let Some(name) = labels.get(&instr.ip()) {
            if !block.stmts.is_empty() {
                func.blocks.push(std::mem::replace(&mut block, BasicBlock::new(LabelSymbol::new(name.clone()))));
            } else {
                block.label = LabelSymbol::new(name.clone());
            }
        }

        block.stmts.push(Stmt::AsmComment { text: asm_comment_text(instr) });

        if let Some((consumed, pseudo)) = idioms::try_coalesce(&instructions[i..], &block.stmts) {
            // Every consumed instruction still gets its own comment, even
            // though only one pseudo statement represents the idiom.
            for extra in &instructions[i + 1..i + consumed] {
                block.stmts.push(Stmt::AsmComment { text: asm_comment_text(extra) });
            }
            block.stmts.push(pseudo);
            i += consumed;
            continue;
        }

        translate_one(instr, options, &labels, &mut func, &mut block, &mut compare_fact, &mut bit_test_fact);

        i += 1;
    }

    if !block.stmts.is_empty() || func.blocks.is_empty() {
        func.blocks.push(block);
    }

    Ok(func)
}

/// `rax` carries the return value by MSVC x64 convention; once a `ret` is
/// reached, the most recent assignment to `rax` in this block *is* the
/// return value, so rename its destination to `ret` to match the
/// `ReturnStmt(ret)` it feeds.
fn rename_last_rax_write_to_ret(block: &mut BasicBlock) {
    for stmt in block.stmts.iter_mut().rev() {
        if let Stmt::Assign { dest, .. } = stmt {
            if matches!(dest, Expr::RegExpr { name } if name == "rax") {
                *dest = Expr::reg("ret");
                return;
            }
        }
    }
}

fn asm_comment_text(instr: &Instruction) -> String {
    format!("{:#010x}: {}", instr.ip(), instr)
}

fn decode_all(slice: &[u8], base_address: u64, cancellation: Option<&crate::cancel::CancellationToken>) -> Result<Vec<Instruction>> {
    let mut decoder = Decoder::with_ip(64, slice, base_address, DecoderOptions::NONE);
    let mut out = Vec::new();
    let mut instr = Instruction::default();
    while decoder.can_decode() {
        if cancellation.is_some_and(|c| c.is_cancelled()) {
            return Err(EngineError::Cancelled);
        }
        decoder.decode_out(&mut instr);
        if instr.is_invalid() {
            return Err(EngineError::DecodeError { ip: instr.ip() });
        }
        out.push(instr);
    }
    Ok(out)
}

/// Assigns `L1, L2, ...` to every near-branch target within the decoded
/// slice, in the order those targets are first referenced.
fn discover_labels(instructions: &[Instruction], options: &Options) -> BTreeMap<u64, String> {
    let mut labels = BTreeMap::new();
    if !options.emit_labels {
        return labels;
    }
    let lo = instructions.first().map(|i| i.ip()).unwrap_or(0);
    let hi = instructions.last().map(|i| i.next_ip()).unwrap_or(0);
    let mut next_index = 1;
    for instr in instructions {
        if is_near_branch(instr.mnemonic()) {
            let target = instr.near_branch_target();
            if target >= lo && target < hi && !labels.contains_key(&target) {
                labels.insert(target, format!("L{}", next_index));
                next_index += 1;
            }
        }
    }
    labels
}

pub(super) fn is_immediate_kind(kind: OpKind) -> bool {
    matches!(
        kind,
        OpKind::Immediate8
            | OpKind::Immediate16
            | OpKind::Immediate32
            | OpKind::Immediate64
            | OpKind::Immediate8to16
            | OpKind::Immediate8to32
            | OpKind::Immediate8to64
            | OpKind::Immediate32to64
            | OpKind::Immediate8_2nd
    )
}

fn is_near_branch_kind(kind: OpKind) -> bool {
    matches!(kind, OpKind::NearBranch16 | OpKind::NearBranch32 | OpKind::NearBranch64)
}

fn is_near_branch(mnemonic: Mnemonic) -> bool {
    matches!(
        mnemonic,
        Mnemonic::Jmp
            | Mnemonic::Je
            | Mnemonic::Jne
            | Mnemonic::Jb
            | Mnemonic::Jae
            | Mnemonic::Ja
            | Mnemonic::Jbe
            | Mnemonic::Jl
            | Mnemonic::Jge
            | Mnemonic::Jg
            | Mnemonic::Jle
            | Mnemonic::Js
            | Mnemonic::Jns
            | Mnemonic::Jp
            | Mnemonic::Jnp
    )
}

fn compare_op_for_jcc(mnemonic: Mnemonic) -> Option<CompareOp> {
    match mnemonic {
        Mnemonic::Je => Some(CompareOp::Eq),
        Mnemonic::Jne => Some(CompareOp::Ne),
        Mnemonic::Jl => Some(CompareOp::Slt),
        Mnemonic::Jge => Some(CompareOp::Sge),
        Mnemonic::Jg => Some(CompareOp::Sgt),
        Mnemonic::Jle => Some(CompareOp::Sle),
        Mnemonic::Jb => Some(CompareOp::Ult),
        Mnemonic::Jae => Some(CompareOp::Uge),
        Mnemonic::Ja => Some(CompareOp::Ugt),
        Mnemonic::Jbe => Some(CompareOp::Ule),
        _ => None,
    }
}

/// Populates parameters from the highest-numbered integer and XMM
/// parameter register referenced anywhere in the function: with no
/// prototype available, this is the best a pure disassembly-level lifter
/// can infer.
fn assign_params(func: &mut FunctionIR, instructions: &[Instruction]) {
    let mut max_int_param = 0;
    let mut max_fp_param = 0;
    for instr in instructions {
        for op in 0..instr.op_count() {
            let reg = operand_register(instr, op);
            if reg == Register::None {
                continue;
            }
            if is_xmm_family(reg) {
                let name = super::registers::xmm_name(reg);
                if let Some(n) = name.strip_prefix("fp") {
                    if let Ok(n) = n.parse::<u32>() {
                        max_fp_param = max_fp_param.max(n);
                    }
                }
            } else {
                let name = gpr_name(reg.full_register());
                if let Some(n) = name.strip_prefix('p') {
                    if let Ok(n) = n.parse::<u32>() {
                        max_int_param = max_int_param.max(n);
                    }
                }
            }
        }
    }
    for n in 1..=max_int_param {
        func.params.push(ParamInfo {
            index: n - 1,
            name: format!("p{}", n),
            ty: IrType::default_int(),
            source_reg: format!("p{}", n),
        });
    }
    for n in 1..=max_fp_param {
        func.params.push(ParamInfo {
            index: max_int_param + n - 1,
            name: format!("fp{}", n),
            ty: IrType::Float { bits: 64 },
            source_reg: format!("fp{}", n),
        });
    }
}

fn operand_register(instr: &Instruction, op: u32) -> Register {
    match op {
        0 if instr.op0_kind() == OpKind::Register => instr.op0_register(),
        1 if instr.op1_kind() == OpKind::Register => instr.op1_register(),
        2 if instr.op2_kind() == OpKind::Register => instr.op2_register(),
        _ => Register::None,
    }
}

fn register_local_if_frame_slot(func: &mut FunctionIR, offset: i64) -> Expr {
    let name = format!("local_{:x}", offset.unsigned_abs());
    if !func.locals.iter().any(|l| l.name == name) {
        func.locals.push(LocalInfo { name: name.clone(), ty: IrType::default_int(), initializer: None, frame_offset: Some(offset) });
    }
    Expr::AddrOf { operand: Box::new(Expr::local(name)) }
}

fn memory_operand_expr(func: &mut FunctionIR, instr: &Instruction, options: &Options, elem_bits: u32) -> (Expr, Option<Segment>) {
    let segment = match instr.memory_segment() {
        Register::FS => Some(Segment::Fs),
        Register::GS => Some(Segment::Gs),
        _ => None,
    };

    if segment == Some(Segment::Gs) && instr.memory_displacement64() == 0x60 && instr.memory_base() == Register::None {
        func.set_tag("HasPebAccess", TagValue::Bool(true));
        return (Expr::local("peb"), None);
    }

    if instr.is_ip_rel_memory_operand() {
        let addr = instr.ip_rel_memory_address();
        return (Expr::const_u(addr, 64), segment);
    }

    let base = instr.memory_base();
    if base == Register::RBP && instr.memory_index() == Register::None {
        let disp = instr.memory_displacement64() as i64;
        if disp < 0 {
            return (register_local_if_frame_slot(func, disp), segment);
        }
    }

    let mut addr = if base != Register::None {
        Expr::reg(register_name(base))
    } else {
        Expr::const_u(0, 64)
    };

    let index = instr.memory_index();
    if index != Register::None {
        let scale = instr.memory_index_scale() as u64;
        let scaled = Expr::bin(crate::ir::BinOp::Mul, Expr::reg(register_name(index)), Expr::const_u(scale, 64), 64);
        addr = Expr::bin(crate::ir::BinOp::Add, addr, scaled, 64);
    }

    let disp = instr.memory_displacement64();
    if disp != 0 {
        addr = Expr::bin(crate::ir::BinOp::Add, addr, Expr::const_u(disp, 64), 64);
    }

    let _ = elem_bits;
    let _ = options;
    (addr, segment)
}

fn immediate_of(instr: &Instruction, op: u32) -> i64 {
    instr.immediate(op) as i64
}

fn translate_one(
    instr: &Instruction,
    options: &Options,
    labels: &BTreeMap<u64, String>,
    func: &mut FunctionIR,
    block: &mut BasicBlock,
    compare_fact: &mut Option<CompareFact>,
    bit_test_fact: &mut Option<Expr>,
) {
    let _ = labels;
    match instr.mnemonic() {
        Mnemonic::Mov if instr.op0_kind() == OpKind::Register && instr.op1_kind() == OpKind::Register => {
            let bits = register_bits(instr.op0_register());
            block.stmts.push(Stmt::assign(Expr::reg(register_name(instr.op0_register())), Expr::reg(register_name(instr.op1_register()))));
            let _ = bits;
        }
        Mnemonic::Mov if instr.op0_kind() == OpKind::Register && instr.op1_kind() == OpKind::Memory => {
            let bits = register_bits(instr.op0_register());
            let (addr, segment) = memory_operand_expr(func, instr, options, bits);
            block.stmts.push(Stmt::assign(
                Expr::reg(register_name(instr.op0_register())),
                Expr::load(IrType::Int { bits, signed: false }, addr, segment),
            ));
        }
        Mnemonic::Mov if instr.op0_kind() == OpKind::Memory && instr.op1_kind() == OpKind::Register => {
            let bits = register_bits(instr.op1_register());
            let (addr, segment) = memory_operand_expr(func, instr, options, bits);
            block.stmts.push(Stmt::store(
                IrType::Int { bits, signed: false },
                addr,
                Expr::reg(register_name(instr.op1_register())),
                segment,
            ));
        }
        Mnemonic::Mov if instr.op0_kind() == OpKind::Register && is_immediate_kind(instr.op1_kind()) => {
            let bits = register_bits(instr.op0_register());
            block.stmts.push(Stmt::assign(Expr::reg(register_name(instr.op0_register())), Expr::const_i(immediate_of(instr, 1), bits)));
        }
        Mnemonic::Lea if instr.op0_kind() == OpKind::Register => {
            let (addr, _segment) = memory_operand_expr(func, instr, options, 64);
            block.stmts.push(Stmt::assign(Expr::reg(register_name(instr.op0_register())), addr));
        }
        Mnemonic::Push if instr.op0_kind() == OpKind::Register => {
            block.stmts.push(Stmt::Pseudo { kind: "push".to_string(), args: vec![Expr::reg(register_name(instr.op0_register()))] });
        }
        Mnemonic::Pop if instr.op0_kind() == OpKind::Register => {
            block.stmts.push(Stmt::Pseudo { kind: "pop".to_string(), args: vec![Expr::reg(register_name(instr.op0_register()))] });
        }
        Mnemonic::Add | Mnemonic::Sub | Mnemonic::And | Mnemonic::Or | Mnemonic::Xor
            if instr.op0_kind() == OpKind::Register =>
        {
            let bits = register_bits(instr.op0_register());
            let dest = Expr::reg(register_name(instr.op0_register()));
            let rhs = operand_value_expr(func, instr, options, 1, bits);
            let op = match instr.mnemonic() {
                Mnemonic::Add => crate::ir::BinOp::Add,
                Mnemonic::Sub => crate::ir::BinOp::Sub,
                Mnemonic::And => crate::ir::BinOp::And,
                Mnemonic::Or => crate::ir::BinOp::Or,
                Mnemonic::Xor => crate::ir::BinOp::Xor,
                _ => unreachable!(),
            };
            if instr.mnemonic() == Mnemonic::Xor && instr.op1_kind() == OpKind::Register && instr.op1_register() == instr.op0_register() {
                block.stmts.push(Stmt::assign(dest, Expr::const_u(0, bits)));
            } else {
                block.stmts.push(Stmt::assign(dest.clone(), Expr::bin(op, dest, rhs, bits)));
            }
        }
        Mnemonic::Shl | Mnemonic::Shr | Mnemonic::Sar if instr.op0_kind() == OpKind::Register => {
            let bits = register_bits(instr.op0_register());
            let dest = Expr::reg(register_name(instr.op0_register()));
            let rhs = operand_value_expr(func, instr, options, 1, bits);
            let op = match instr.mnemonic() {
                Mnemonic::Shl => crate::ir::BinOp::Shl,
                Mnemonic::Shr => crate::ir::BinOp::Shr,
                Mnemonic::Sar => crate::ir::BinOp::Sar,
                _ => unreachable!(),
            };
            block.stmts.push(Stmt::assign(dest.clone(), Expr::bin(op, dest, rhs, bits)));
        }
        Mnemonic::Not if instr.op0_kind() == OpKind::Register => {
            let bits = register_bits(instr.op0_register());
            let dest = Expr::reg(register_name(instr.op0_register()));
            block.stmts.push(Stmt::assign(dest.clone(), Expr::un(crate::ir::UnOp::Not, dest, bits)));
        }
        Mnemonic::Neg if instr.op0_kind() == OpKind::Register => {
            let bits = register_bits(instr.op0_register());
            let dest = Expr::reg(register_name(instr.op0_register()));
            block.stmts.push(Stmt::assign(dest.clone(), Expr::un(crate::ir::UnOp::Neg, dest, bits)));
        }
        Mnemonic::Cmp if instr.op0_kind() == OpKind::Register => {
            let bits = register_bits(instr.op0_register());
            let left = Expr::reg(register_name(instr.op0_register()));
            let right = operand_value_expr(func, instr, options, 1, bits);
            if options.comment_compare {
                block.stmts.push(Stmt::Pseudo { kind: "cmp".to_string(), args: vec![left.clone(), right.clone()] });
            }
            *compare_fact = Some(CompareFact { left, right });
        }
        Mnemonic::Test if instr.op0_kind() == OpKind::Register => {
            let bits = register_bits(instr.op0_register());
            let left = Expr::reg(register_name(instr.op0_register()));
            let is_self_test = instr.op1_kind() == OpKind::Register && instr.op1_register() == instr.op0_register();
            let right = if is_self_test { Expr::const_u(0, bits) } else { operand_value_expr(func, instr, options, 1, bits) };
            if options.comment_compare {
                block.stmts.push(Stmt::Pseudo { kind: "test".to_string(), args: vec![left.clone(), right.clone()] });
            }
            *compare_fact = Some(CompareFact { left, right });
        }
        Mnemonic::Bt | Mnemonic::Bts | Mnemonic::Btr | Mnemonic::Btc if instr.op0_kind() == OpKind::Register => {
            let bitpos = operand_value_expr(func, instr, options, 1, 32);
            let x = Expr::reg(register_name(instr.op0_register()));
            let note = Expr::Intrinsic { name: "bit".to_string(), args: vec![x, bitpos] };
            block.stmts.push(Stmt::Pseudo { kind: "bittest".to_string(), args: vec![note.clone()] });
            *bit_test_fact = Some(note);
        }
        mnemonic if is_near_branch(mnemonic) => {
            let target = instr.near_branch_target();
            let label = labels.get(&target).cloned().unwrap_or_else(|| format!("L_{:x}", target));
            if mnemonic == Mnemonic::Jmp {
                block.stmts.push(Stmt::goto(label));
            } else if let (Mnemonic::Jb, Some(fact)) = (mnemonic, bit_test_fact.take()) {
                block.stmts.push(Stmt::if_goto(fact, label));
            } else if let (Mnemonic::Jae, Some(fact)) = (mnemonic, bit_test_fact.take()) {
                block.stmts.push(Stmt::if_goto(Expr::un(crate::ir::UnOp::LNot, fact, 1), label));
            } else if let Some(fact) = compare_fact.take() {
                if let Some(op) = compare_op_for_jcc(mnemonic) {
                    block.stmts.push(Stmt::if_goto(Expr::compare(op, fact.left, fact.right), label));
                } else {
                    block.stmts.push(Stmt::Pseudo { kind: "cond_jump".to_string(), args: vec![] });
                    block.stmts.push(Stmt::if_goto(Expr::reg("flags"), label));
                }
            } else {
                block.stmts.push(Stmt::Pseudo { kind: "cond_jump".to_string(), args: vec![] });
                block.stmts.push(Stmt::if_goto(Expr::reg("flags"), label));
            }
        }
        Mnemonic::Call if is_near_branch_kind(instr.op0_kind()) => {
            let target = instr.near_branch_target();
            let symbol = format!("sub_{:08x}", target);
            let dest = Some(Expr::reg("rax"));
            block.stmts.push(Stmt::Call { dest, target: CallTarget::Symbol(symbol), args: call_arg_exprs() });
        }
        Mnemonic::Call if instr.op0_kind() == OpKind::Memory && instr.is_ip_rel_memory_operand() => {
            let iat_address = instr.ip_rel_memory_address();
            let resolved = options.resolve_import_name.as_ref().and_then(|r| r.resolve_import_name(iat_address));
            let target = match resolved {
                Some(name) => CallTarget::Symbol(name),
                None => CallTarget::Address(iat_address),
            };
            block.stmts.push(Stmt::Call { dest: Some(Expr::reg("rax")), target, args: call_arg_exprs() });
        }
        Mnemonic::Ret => {
            rename_last_rax_write_to_ret(block);
            block.stmts.push(Stmt::Return { value: Some(Expr::reg("ret")) });
        }
        Mnemonic::Nop => {
            block.stmts.push(Stmt::Nop);
        }
        _ => {
            block.stmts.push(Stmt::Pseudo { kind: "no_semantic_translation".to_string(), args: Vec::new() });
        }
    }
}

fn operand_value_expr(func: &mut FunctionIR, instr: &Instruction, options: &Options, op: u32, bits: u32) -> Expr {
    let kind = match op {
        0 => instr.op0_kind(),
        1 => instr.op1_kind(),
        2 => instr.op2_kind(),
        _ => OpKind::Register,
    };
    match kind {
        OpKind::Register => Expr::reg(register_name(operand_register(instr, op))),
        OpKind::Memory => {
            let (addr, segment) = memory_operand_expr(func, instr, options, bits);
            Expr::load(IrType::Int { bits, signed: false }, addr, segment)
        }
        k if is_immediate_kind(k) => Expr::const_i(immediate_of(instr, op), bits),
        _ => Expr::UConst { value: 0, bits },
    }
}

fn call_arg_exprs() -> Vec<Expr> {
    vec![Expr::param("p1"), Expr::param("p2"), Expr::param("p3"), Expr::param("p4")]
}
