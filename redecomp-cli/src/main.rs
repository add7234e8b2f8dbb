use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use redecomp::{constdb::ConstantDatabase, decompile_export, EngineSettings, Windows32Host};

/// Decompiles one PE export into readable C-like pseudocode.
#[derive(Parser, Debug)]
#[command(name = "redecomp", about = "Decompile a PE export to pseudocode")]
struct Cli {
    /// Path to the DLL containing the export.
    dll_path: PathBuf,

    /// Name of the exported function to decompile.
    export_name: String,

    /// Override the image base used for RIP-relative and branch arithmetic.
    #[arg(long, value_parser = parse_hex)]
    base_address: Option<u64>,

    /// Maximum number of bytes to decode for the function body.
    #[arg(long)]
    max_bytes: Option<usize>,

    /// Suppress `L1:`/`L2:` block-label lines.
    #[arg(long)]
    no_labels: bool,

    /// Skip MSVC prologue detection.
    #[arg(long)]
    no_prologue_detect: bool,

    /// Suppress the `cmp`/`test` pseudo-comments the lifter emits before a branch.
    #[arg(long)]
    no_compare_comments: bool,

    /// Use `unsigned int`/`int` style names instead of `uint32_t`/`int32_t`.
    #[arg(long)]
    no_stdint_names: bool,

    /// Prefix signed/unsigned hint comments on comparisons.
    #[arg(long)]
    signedness_hints: bool,

    /// Maximum forwarder-chain hop count before failing.
    #[arg(long, default_value_t = 8)]
    max_forwarder_hops: u32,
}

fn parse_hex(s: &str) -> Result<u64, std::num::ParseIntError> {
    u64::from_str_radix(s.trim_start_matches("0x").trim_start_matches("0X"), 16)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let constant_provider = Arc::new(ConstantDatabase::new());
    let host = Windows32Host::from_environment();

    let settings = EngineSettings {
        base_address_override: cli.base_address,
        max_bytes: cli.max_bytes,
        emit_labels: !cli.no_labels,
        detect_prologue: !cli.no_prologue_detect,
        comment_compare: !cli.no_compare_comments,
        use_stdint_names: !cli.no_stdint_names,
        comment_signedness_on_cmp: cli.signedness_hints,
        max_forwarder_hops: cli.max_forwarder_hops,
    };

    let pseudocode = decompile_export(&cli.dll_path, &cli.export_name, &host, &settings, constant_provider, None)?;

    print!("{}", pseudocode);
    Ok(())
}
