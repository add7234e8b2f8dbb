use iced_x86::Register;

/// Maps a decoded register to the name it prints under. The first four
/// integer parameter registers and the first four XMM registers get the
/// conventional Microsoft x64 calling-convention aliases (`p1`..`p4`,
/// `fp1`..`fp4`); `rax` becomes `ret` only where it is read back as a
/// return value (the lifter decides that, not this mapping) — everywhere
/// else it keeps its architectural name.
pub fn gpr_name(reg: Register) -> &'static str {
    match reg.full_register() {
        Register::RAX => "rax",
        Register::RCX => "p1",
        Register::RDX => "p2",
        Register::RBX => "rbx",
        Register::RSP => "rsp",
        Register::RBP => "rbp",
        Register::RSI => "rsi",
        Register::RDI => "rdi",
        Register::R8 => "p3",
        Register::R9 => "p4",
        Register::R10 => "r10",
        Register::R11 => "r11",
        Register::R12 => "r12",
        Register::R13 => "r13",
        Register::R14 => "r14",
        Register::R15 => "r15",
        _ => "reg",
    }
}

pub fn xmm_name(reg: Register) -> &'static str {
    match reg {
        Register::XMM0 | Register::YMM0 | Register::ZMM0 => "fp1",
        Register::XMM1 | Register::YMM1 | Register::ZMM1 => "fp2",
        Register::XMM2 | Register::YMM2 | Register::ZMM2 => "fp3",
        Register::XMM3 | Register::YMM3 | Register::ZMM3 => "fp4",
        _ => "xmm",
    }
}

pub fn is_xmm_family(reg: Register) -> bool {
    matches!(
        reg.full_register(),
        Register::ZMM0
            | Register::ZMM1
            | Register::ZMM2
            | Register::ZMM3
            | Register::ZMM4
            | Register::ZMM5
            | Register::ZMM6
            | Register::ZMM7
    ) || matches!(
        reg,
        Register::XMM0
            | Register::XMM1
            | Register::XMM2
            | Register::XMM3
            | Register::XMM4
            | Register::XMM5
            | Register::XMM6
            | Register::XMM7
            | Register::YMM0
            | Register::YMM1
            | Register::YMM2
            | Register::YMM3
            | Register::YMM4
            | Register::YMM5
            | Register::YMM6
            | Register::YMM7
    )
}

pub fn register_name(reg: Register) -> String {
    if is_xmm_family(reg) {
        xmm_name(reg).to_string()
    } else {
        gpr_name(reg).to_string()
    }
}

pub fn register_bits(reg: Register) -> u32 {
    reg.size() as u32 * 8
}

/// Non-volatile GPRs the MSVC x64 convention requires a callee to preserve;
/// used by prologue detection to recognize the boilerplate `push` sequence.
pub fn is_nonvolatile_gpr(reg: Register) -> bool {
    matches!(
        reg,
        Register::RBX
            | Register::RBP
            | Register::RDI
            | Register::RSI
            | Register::R12
            | Register::R13
            | Register::R14
            | Register::R15
    )
}
