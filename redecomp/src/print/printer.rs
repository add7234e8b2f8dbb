use crate::ir::{BinOp, CallTarget, Expr, FunctionIR, HiNode, IrType, Segment, Stmt, TagValue};

use super::options::PrintOptions;
use super::precedence::precedence;

/// Renders a lifted and passed-over `FunctionIR` as C-like pseudocode. Holds
/// no state across calls; every call starts from a fresh `String`.
pub fn print_function(func: &FunctionIR, opts: &PrintOptions) -> String {
    let mut out = String::new();

    if opts.emit_header_comment {
        out.push_str("// Decompiled pseudocode; signatures and types are best-effort.\n");
        out.push_str("// Branch structure follows the decoded control flow, not necessarily\n");
        out.push_str("// the original source layout.\n");
        out.push_str(&format!("// entry RVA: {:#x}\n", func.entry_rva));
    }

    out.push_str(&func.return_type.c_name(opts.use_stdint_names));
    out.push(' ');
    out.push_str(&func.name);
    out.push('(');
    for (i, p) in func.params.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&p.ty.c_name(opts.use_stdint_names));
        out.push(' ');
        out.push_str(&p.name);
    }
    out.push_str(") {\n");

    if let Some(TagValue::Int(size)) = func.tags.get("LocalSize") {
        out.push_str(&opts.indent);
        out.push_str(&format!("// stack frame size: {:#x}\n", size));
    }

    for local in &func.locals {
        out.push_str(&opts.indent);
        out.push_str(&local.ty.c_name(opts.use_stdint_names));
        out.push(' ');
        out.push_str(&local.name);
        if let Some(init) = &local.initializer {
            out.push_str(" = ");
            out.push_str(&format_expr(init, 0, opts));
        }
        out.push_str(";\n");
    }

    if let Some(structured) = &func.structured {
        print_hi(structured, 1, &mut out, opts);
    } else {
        for block in &func.blocks {
            if opts.emit_block_labels {
                out.push_str(&format!("{}:\n", block.label.as_str()));
            }
            for stmt in &block.stmts {
                print_stmt(stmt, 1, &mut out, opts);
            }
        }
    }

    out.push_str("}\n");
    out
}

fn indent_str(opts: &PrintOptions, depth: usize) -> String {
    opts.indent.repeat(depth)
}

fn print_hi(node: &HiNode, depth: usize, out: &mut String, opts: &PrintOptions) {
    match node {
        HiNode::Seq(children) => {
            for c in children {
                print_hi(c, depth, out, opts);
            }
        }
        HiNode::Stmt(stmt) => print_stmt(stmt, depth, out, opts),
        HiNode::If { cond, then_branch, else_branch } => {
            out.push_str(&indent_str(opts, depth));
            out.push_str(&format!("if ({}) {{\n", format_expr(cond, 0, opts)));
            print_hi(then_branch, depth + 1, out, opts);
            out.push_str(&indent_str(opts, depth));
            out.push_str("}\n");
            if let Some(else_node) = else_branch {
                out.push_str(&indent_str(opts, depth));
                out.push_str("else {\n");
                print_hi(else_node, depth + 1, out, opts);
                out.push_str(&indent_str(opts, depth));
                out.push_str("}\n");
            }
        }
        HiNode::While { cond, body } => {
            out.push_str(&indent_str(opts, depth));
            out.push_str(&format!("while ({}) {{\n", format_expr(cond, 0, opts)));
            print_hi(body, depth + 1, out, opts);
            out.push_str(&indent_str(opts, depth));
            out.push_str("}\n");
        }
        HiNode::DoWhile { body, cond } => {
            out.push_str(&indent_str(opts, depth));
            out.push_str("do {\n");
            print_hi(body, depth + 1, out, opts);
            out.push_str(&indent_str(opts, depth));
            out.push_str(&format!("}} while ({});\n", format_expr(cond, 0, opts)));
        }
        HiNode::Switch { scrutinee, cases, default } => {
            out.push_str(&indent_str(opts, depth));
            out.push_str(&format!("switch ({}) {{\n", format_expr(scrutinee, 0, opts)));
            for (values, body) in cases {
                for v in values {
                    out.push_str(&indent_str(opts, depth + 1));
                    out.push_str(&format!("case {}:\n", v));
                }
                print_hi(body, depth + 2, out, opts);
            }
            if let Some(d) = default {
                out.push_str(&indent_str(opts, depth + 1));
                out.push_str("default:\n");
                print_hi(d, depth + 2, out, opts);
            }
            out.push_str(&indent_str(opts, depth));
            out.push_str("}\n");
        }
    }
}

fn print_stmt(stmt: &Stmt, depth: usize, out: &mut String, opts: &PrintOptions) {
    let pad = indent_str(opts, depth);
    match stmt {
        Stmt::Assign { dest, value } => {
            out.push_str(&pad);
            out.push_str(&format_expr(dest, 0, opts));
            out.push_str(" = ");
            out.push_str(&format_expr(value, 0, opts));
            out.push(';');
            if is_call(value) && is_rax_or_ret(dest) {
                out.push_str(" // RAX");
            }
            out.push('\n');
        }
        Stmt::Store { elem, address, value, segment } => {
            out.push_str(&pad);
            out.push_str(&format_memory(elem, address, *segment, opts));
            out.push_str(" = ");
            out.push_str(&format_expr(value, 0, opts));
            out.push_str(";\n");
        }
        Stmt::Call { dest, target, args } => {
            out.push_str(&pad);
            if let Some(d) = dest {
                out.push_str(&format_expr(d, 0, opts));
                out.push_str(" = ");
            }
            out.push_str(&format_call(target, args, opts));
            out.push_str(";\n");
        }
        Stmt::IfGoto { cond, label } => {
            out.push_str(&pad);
            out.push_str(&format!("if ({}) goto {};\n", format_expr(cond, 0, opts), label));
        }
        Stmt::Goto { label } => {
            out.push_str(&pad);
            out.push_str(&format!("goto {};\n", label));
        }
        Stmt::Label { name } => {
            out.push_str(&format!("{}:\n", name));
        }
        Stmt::Return { value } => {
            out.push_str(&pad);
            match value {
                Some(v) => out.push_str(&format!("return {};\n", format_expr(v, 0, opts))),
                None => out.push_str("return;\n"),
            }
        }
        Stmt::AsmComment { text } => {
            out.push_str(&pad);
            out.push_str(&format!("// {}\n", text));
        }
        Stmt::Pseudo { kind, args } => {
            out.push_str(&pad);
            let rendered: Vec<String> = args.iter().map(|a| format_expr(a, 0, opts)).collect();
            out.push_str(&format!("// {}({})\n", kind, rendered.join(", ")));
        }
        Stmt::Nop => {}
    }
}

fn is_call(e: &Expr) -> bool {
    matches!(e, Expr::Call { .. })
}

fn is_rax_or_ret(e: &Expr) -> bool {
    matches!(e, Expr::RegExpr { name } if name == "rax" || name == "ret")
}

fn format_call(target: &CallTarget, args: &[Expr], opts: &PrintOptions) -> String {
    let callee_symbol = match target {
        CallTarget::Symbol(name) => name.clone(),
        CallTarget::Address(addr) => format!("(*(void (*)()){:#x})", addr),
    };
    let rendered: Vec<String> = args
        .iter()
        .enumerate()
        .map(|(i, arg)| format_call_arg(&callee_symbol, i as u32, arg, opts))
        .collect();
    format!("{}({})", callee_symbol, rendered.join(", "))
}

fn format_call_arg(callee_symbol: &str, arg_index: u32, arg: &Expr, opts: &PrintOptions) -> String {
    if let Some(enum_name) = opts.constant_provider.try_get_arg_expected_enum_type(callee_symbol, arg_index) {
        if let Some(value) = arg.as_literal() {
            let (found, formatted) = opts.constant_provider.try_format_value(&enum_name, value);
            if found {
                return formatted;
            }
        }
    }
    format_expr(arg, 0, opts)
}

fn format_const(value: u64, bits: u32) -> String {
    if value < 10 {
        value.to_string()
    } else {
        let digits = (bits.max(8) / 4) as usize;
        format!("0x{:0width$X}", value, width = digits.min(16))
    }
}

fn format_memory(elem: &IrType, address: &Expr, segment: Option<Segment>, opts: &PrintOptions) -> String {
    let prefix = match segment {
        Some(Segment::Fs) => "fs:",
        Some(Segment::Gs) => "gs:",
        None => "",
    };
    format!(
        "*(({}*)({}{}))",
        elem.c_name(opts.use_stdint_names),
        prefix,
        format_expr(address, 0, opts)
    )
}

/// Renders `expr` requesting at least `min_prec`; wraps in parentheses when
/// the expression's own precedence is lower than what the caller needs.
pub fn format_expr(expr: &Expr, min_prec: u8, opts: &PrintOptions) -> String {
    let own_prec = precedence(expr);
    let body = format_expr_body(expr, opts);
    if own_prec < min_prec {
        format!("({})", body)
    } else {
        body
    }
}

fn format_expr_body(expr: &Expr, opts: &PrintOptions) -> String {
    let own_prec = precedence(expr);
    match expr {
        Expr::Const { value, bits } => format_const(*value as u64 & mask(*bits), *bits),
        Expr::UConst { value, bits } => format_const(*value, *bits),
        Expr::SymConst { name, .. } => name.clone(),
        Expr::RegExpr { name } | Expr::ParamExpr { name } | Expr::LocalExpr { name } => name.clone(),
        Expr::SegmentBaseExpr { segment: Segment::Fs } => "fsbase".to_string(),
        Expr::SegmentBaseExpr { segment: Segment::Gs } => "gsbase".to_string(),
        Expr::AddrOf { operand } => format!("&{}", format_expr(operand, own_prec, opts)),
        Expr::Load { elem, address, segment } => format_memory(elem, address, *segment, opts),
        Expr::BinOp { op, left, right, .. } => {
            let l = format_expr(left, own_prec, opts);
            let r = format_expr(right, own_prec + 1, opts);
            format!("{} {} {}", l, bin_op_symbol(*op), r)
        }
        Expr::UnOp { op, operand, .. } => {
            let symbol = match op {
                crate::ir::UnOp::Neg => "-",
                crate::ir::UnOp::Not => "~",
                crate::ir::UnOp::LNot => "!",
            };
            format!("{}{}", symbol, format_expr(operand, own_prec, opts))
        }
        Expr::Compare { op, left, right } => {
            let hint = if opts.comment_signedness_on_cmp {
                if op.is_signed() {
                    "/* signed */ "
                } else {
                    "/* unsigned */ "
                }
            } else {
                ""
            };
            let l = format_expr(left, own_prec, opts);
            let r = format_expr(right, own_prec + 1, opts);
            format!("{}{} {} {}", hint, l, op.c_symbol(), r)
        }
        Expr::Ternary { cond, when_true, when_false } => {
            let c = format_expr(cond, own_prec + 1, opts);
            let t = format_expr(when_true, own_prec + 1, opts);
            let f = format_expr(when_false, own_prec, opts);
            format!("{} ? {} : {}", c, t, f)
        }
        Expr::Cast { target, value } => {
            format!("({}){}", target.c_name(opts.use_stdint_names), format_expr(value, own_prec, opts))
        }
        Expr::Call { target, args } => format_call(target, args, opts),
        Expr::Intrinsic { name, args } => {
            let rendered: Vec<String> = args.iter().map(|a| format_expr(a, 0, opts)).collect();
            format!("{}({})", name, rendered.join(", "))
        }
        Expr::LabelRef { label } => label.clone(),
    }
}

fn bin_op_symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Mul => "*",
        BinOp::UDiv | BinOp::SDiv => "/",
        BinOp::URem | BinOp::SRem => "%",
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Shl => "<<",
        BinOp::Shr | BinOp::Sar => ">>",
        BinOp::And => "&",
        BinOp::Xor => "^",
        BinOp::Or => "|",
    }
}

fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}
