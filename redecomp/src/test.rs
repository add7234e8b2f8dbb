use std::sync::Arc;

use super::constdb::{AssemblyEnumLoader, ConstantDatabase, RawEnumDef};
use super::ir::{BasicBlock, CallTarget, Expr, FunctionIR, IrType, LabelSymbol, Stmt};
use super::lift::{lift_function, Options};
use super::passes::{default_pipeline, PassContext};
use super::print::{print_function, PrintOptions};

fn run_pipeline(func: &mut FunctionIR, db: &ConstantDatabase) {
    let ctx = PassContext {
        constant_provider: db,
        return_enum_type_full_name: "Windows.Win32.Foundation.NTSTATUS",
    };
    default_pipeline().run_all(func, &ctx, None).unwrap();
}

/// Scenario 1: MSVC prologue (two register-homing stores plus a `push`),
/// `sub rsp`, `xor eax, eax`, epilogue, `ret`.
#[test]
fn scenario_prologue_and_return_zero() {
    let code = [
        0x48, 0x89, 0x5C, 0x24, 0x08, // mov [rsp+8], rbx
        0x48, 0x89, 0x74, 0x24, 0x10, // mov [rsp+10h], rsi
        0x57, // push rdi
        0x48, 0x83, 0xEC, 0x20, // sub rsp, 20h
        0x33, 0xC0, // xor eax, eax
        0x48, 0x83, 0xC4, 0x20, // add rsp, 20h
        0x5F, // pop rdi
        0xC3, // ret
    ];

    let db = Arc::new(ConstantDatabase::new());
    let options = Options::new(0x1_8000_1000, "foo", db.clone());
    let mut func = lift_function(&code, &options).expect("well-formed prologue should lift");

    assert!(!func.tag_bool("UsesFramePointer"));
    assert!(func.blocks.iter().flat_map(|b| &b.stmts).any(|s| matches!(s, Stmt::Pseudo { kind, .. } if kind == "prologue")));
    assert!(func
        .blocks
        .iter()
        .flat_map(|b| &b.stmts)
        .any(|s| matches!(s, Stmt::Return { value: Some(v) } if matches!(v, Expr::RegExpr { name } if name == "ret"))));
    assert!(func.blocks.iter().flat_map(|b| &b.stmts).any(|s| matches!(
        s,
        Stmt::Assign { dest: Expr::RegExpr { name }, value: Expr::UConst { value: 0, .. } } if name == "ret"
    )));

    let printed = print_function(&func, &PrintOptions::new(db));
    assert!(printed.starts_with("// Decompiled pseudocode") || printed.contains("uint64_t foo("));
    assert!(printed.contains("ret = 0;"));
    assert!(printed.contains("return ret;"));

    let total_instructions = 8; // two stores, push, sub, xor, add, pop, ret
    let comment_count = func.blocks.iter().flat_map(|b| &b.stmts).filter(|s| matches!(s, Stmt::AsmComment { .. })).count();
    assert_eq!(comment_count, total_instructions);
}

/// Scenario 3: `cmp rcx, rdx; jae L1; mov eax, 1; ret; L1: mov eax, 2; ret`.
#[test]
fn scenario_compare_and_conditional_jump() {
    let code = [
        0x48, 0x3B, 0xCA, // cmp rcx, rdx
        0x73, 0x06, // jae +6 (-> L1)
        0xB8, 0x01, 0x00, 0x00, 0x00, // mov eax, 1
        0xC3, // ret
        0xB8, 0x02, 0x00, 0x00, 0x00, // L1: mov eax, 2
        0xC3, // ret
    ];

    let db = Arc::new(ConstantDatabase::new());
    let options = Options::new(0x1400, "cmp_example", db.clone());
    let mut func = lift_function(&code, &options).expect("should lift");
    run_pipeline(&mut func, &db);

    let printed = print_function(&func, &PrintOptions::new(db));
    assert!(printed.contains("if (/* unsigned */ p1 >= p2) goto L1;"), "printed was:\n{printed}");
    assert_eq!(printed.matches("return ret;").count(), 2);
    assert!(printed.contains("L1:\n"));
}

/// Scenario 4: `VirtualAlloc`'s 4th argument formats through a pre-mapped
/// `PAGE_PROTECTION_FLAGS` enum instead of printing as a bare hex literal.
#[test]
fn scenario_flag_enum_argument() {
    let mut db = AssemblyEnumLoader::load(vec![RawEnumDef {
        full_name: "Windows.Win32.System.Memory.PAGE_PROTECTION_FLAGS".into(),
        underlying_bits: 32,
        is_flags: true,
        members: vec![("PAGE_READWRITE".into(), 0x04), ("PAGE_READONLY".into(), 0x02)],
    }]);
    db.map_arg_enum("VirtualAlloc", 3, "Windows.Win32.System.Memory.PAGE_PROTECTION_FLAGS");
    let db = Arc::new(db);

    let mut func = FunctionIR::new("allocates", 0);
    let mut block = BasicBlock::new(LabelSymbol::new("entry"));
    block.stmts.push(Stmt::Call {
        dest: Some(Expr::reg("rax")),
        target: CallTarget::Symbol("VirtualAlloc".to_string()),
        args: vec![
            Expr::const_u(0, 64),
            Expr::const_u(0x1000, 64),
            Expr::const_u(0x1000, 32),
            Expr::const_u(0x04, 32),
        ],
    });
    func.blocks.push(block);

    let printed = print_function(&func, &PrintOptions::new(db));
    assert!(printed.contains("PAGE_READWRITE"), "printed was:\n{printed}");
    assert!(!printed.contains("0x4"));
}

/// Scenario 5: `lea rdi, [rbp-0x40]; xor eax, eax; mov ecx, 64; rep stosb`
/// coalesces into one `memset` call over the resolved destination, value,
/// and (once `FoldConstants` has run) the folded byte count.
#[test]
fn scenario_rep_stos_idiom() {
    let code = [
        0x48, 0x8D, 0x7D, 0xC0, // lea rdi, [rbp-0x40]
        0x31, 0xC0, // xor eax, eax
        0xB9, 0x40, 0x00, 0x00, 0x00, // mov ecx, 64
        0xF3, 0xAA, // rep stosb
    ];

    let db = Arc::new(ConstantDatabase::new());
    let options = Options::new(0x2000, "zero_local", db.clone());
    let mut func = lift_function(&code, &options).expect("should lift");
    run_pipeline(&mut func, &db);

    assert!(func.locals.iter().any(|l| l.name == "local_40" && l.frame_offset == Some(-0x40)));

    let call = func
        .blocks
        .iter()
        .flat_map(|b| &b.stmts)
        .find_map(|s| match s {
            Stmt::Call { target: CallTarget::Symbol(name), args, .. } if name == "memset" => Some(args),
            _ => None,
        })
        .expect("rep stosb should coalesce into a single memset call");

    assert_eq!(call.len(), 3);
    assert!(matches!(&call[0], Expr::Cast { target: IrType::Pointer { element }, value } if **element == IrType::Void && matches!(&**value, Expr::AddrOf { operand } if matches!(&**operand, Expr::LocalExpr { name } if name == "local_40"))));
    assert_eq!(call[1].as_literal(), Some(0));
    assert_eq!(call[2].as_literal(), Some(64));

    // Every instruction the idiom consumed still left its disassembly
    // comment behind, even though only one statement represents it.
    let comment_count = func.blocks.iter().flat_map(|b| &b.stmts).filter(|s| matches!(s, Stmt::AsmComment { .. })).count();
    assert_eq!(comment_count, 4);
}

/// Scenario 6: a value shared by two unrelated enums resolves to both.
#[test]
fn scenario_find_by_value_multiple_matches() {
    let db = AssemblyEnumLoader::load(vec![
        RawEnumDef {
            full_name: "Windows.Win32.Storage.FileSystem.FILE_FLAGS_AND_ATTRIBUTES".into(),
            underlying_bits: 32,
            is_flags: true,
            members: vec![("FILE_FLAG_OVERLAPPED".into(), 0x4000_0000)],
        },
        RawEnumDef {
            full_name: "Some.Unrelated.Enum".into(),
            underlying_bits: 32,
            is_flags: false,
            members: vec![("SAME_BITS".into(), 0x4000_0000)],
        },
    ]);

    let matches = db.find_by_value(0x4000_0000, 32);
    assert!(matches.len() >= 2);
    assert!(matches.iter().any(|m| m.enum_full_name == "Windows.Win32.Storage.FileSystem.FILE_FLAGS_AND_ATTRIBUTES"));
    assert!(matches.iter().any(|m| m.enum_full_name == "Some.Unrelated.Enum"));
}

/// Quantified invariant: every decoded instruction leaves exactly one
/// `AsmCommentStmt`, regardless of idiom coalescing or prologue detection.
#[test]
fn invariant_asm_comment_count_matches_decoded_instructions() {
    let code = [
        0x48, 0x89, 0x5C, 0x24, 0x08, // mov [rsp+8], rbx
        0x57, // push rdi
        0x48, 0x83, 0xEC, 0x20, // sub rsp, 20h
        0x48, 0x8B, 0xD9, // mov rbx, rcx
        0x33, 0xC0, // xor eax, eax
        0x48, 0x83, 0xC4, 0x20, // add rsp, 20h
        0x5F, // pop rdi
        0xC3, // ret
    ];
    let db = Arc::new(ConstantDatabase::new());
    let options = Options::new(0x3000, "counts", db);
    let func = lift_function(&code, &options).expect("should lift");

    let comment_count = func.blocks.iter().flat_map(|b| &b.stmts).filter(|s| matches!(s, Stmt::AsmComment { .. })).count();
    assert_eq!(comment_count, 8);
}

/// Quantified invariant: constant folding is idempotent.
#[test]
fn invariant_fold_constants_is_idempotent() {
    let db = ConstantDatabase::new();
    let mut func = FunctionIR::new("folds", 0);
    let mut block = BasicBlock::new(LabelSymbol::new("entry"));
    block.stmts.push(Stmt::assign(
        Expr::reg("rax"),
        Expr::bin(crate::ir::BinOp::Add, Expr::const_u(2, 32), Expr::const_u(3, 32), 32),
    ));
    func.blocks.push(block);

    let mut once = func.clone();
    run_pipeline(&mut once, &db);
    let mut twice = once.clone();
    run_pipeline(&mut twice, &db);

    assert_eq!(once, twice);
}

/// Boundary: a forwarder chain of exactly `max_forwarder_hops` hops is the
/// furthest that can succeed (covered end-to-end in `engine`'s test module
/// via `forwarder_chain_boundary_is_exact`); here we pin the arg-hint
/// resolution's module-prefix stripping that the CLI relies on when a host
/// supplies `kernel32!VirtualAlloc`-style symbol names.
#[test]
fn arg_hint_resolution_strips_module_prefix_for_flag_formatting() {
    let mut db = AssemblyEnumLoader::load(vec![RawEnumDef {
        full_name: "Windows.Win32.System.Memory.PAGE_PROTECTION_FLAGS".into(),
        underlying_bits: 32,
        is_flags: true,
        members: vec![("PAGE_READWRITE".into(), 0x04)],
    }]);
    db.map_arg_enum("VirtualAlloc", 3, "Windows.Win32.System.Memory.PAGE_PROTECTION_FLAGS");
    assert_eq!(
        db.try_get_arg_expected_enum_type("kernel32!VirtualAlloc", 3).as_deref(),
        Some("Windows.Win32.System.Memory.PAGE_PROTECTION_FLAGS")
    );
}
