use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pe::{ExportInfo, PeImage};

use crate::cancel::CancellationToken;
use crate::constdb::ConstantDatabase;
use crate::error::{EngineError, Result};
use crate::lift::{self, Options as LiftOptions};
use crate::passes;
use crate::print::{self, PrintOptions};

/// Resolves a forwarder's module name to the bytes of that module, the way a
/// real loader would consult `System32`/`Sysnative`. Kept as a capability
/// trait rather than a closure so hosts can swap in a sandboxed or virtual
/// filesystem without touching the engine.
pub trait ForwarderHost {
    fn load_module(&self, module_name: &str) -> Result<Vec<u8>>;
}

/// Resolves forwarders against the local machine's `System32` directory.
/// Pure path arithmetic plus `std::fs::read` — no registry lookups, no
/// process spawning.
pub struct Windows32Host {
    system32_dir: PathBuf,
}

impl Windows32Host {
    pub fn new(system32_dir: impl Into<PathBuf>) -> Windows32Host {
        Windows32Host { system32_dir: system32_dir.into() }
    }

    /// Uses `%SystemRoot%\System32` if set, else the conventional default.
    pub fn from_environment() -> Windows32Host {
        let root = std::env::var("SystemRoot").unwrap_or_else(|_| "C:\\Windows".to_string());
        Windows32Host { system32_dir: Path::new(&root).join("System32") }
    }

    fn module_path(&self, module_name: &str) -> PathBuf {
        let file_name = if module_name.to_ascii_lowercase().ends_with(".dll") {
            module_name.to_string()
        } else {
            format!("{}.dll", module_name)
        };
        self.system32_dir.join(file_name)
    }
}

impl ForwarderHost for Windows32Host {
    fn load_module(&self, module_name: &str) -> Result<Vec<u8>> {
        let path = self.module_path(module_name);
        log::debug!("resolving forwarder module {} -> {}", module_name, path.display());
        Ok(std::fs::read(path)?)
    }
}

/// Presentation and behavior knobs exposed at the `decompile_export`
/// boundary — the surface `redecomp-cli` maps its flags onto. Lifting and
/// printing each have their own richer `Options`/`PrintOptions` for callers
/// that bypass the forwarder-following entry point via `decompile_bytes`.
#[derive(Clone)]
pub struct EngineSettings {
    pub base_address_override: Option<u64>,
    pub max_bytes: Option<usize>,
    pub emit_labels: bool,
    pub detect_prologue: bool,
    pub comment_compare: bool,
    pub use_stdint_names: bool,
    pub comment_signedness_on_cmp: bool,
    pub max_forwarder_hops: u32,
}

impl Default for EngineSettings {
    fn default() -> EngineSettings {
        EngineSettings {
            base_address_override: None,
            max_bytes: None,
            emit_labels: true,
            detect_prologue: true,
            comment_compare: true,
            use_stdint_names: true,
            comment_signedness_on_cmp: false,
            max_forwarder_hops: 8,
        }
    }
}

/// End-to-end decompilation of one export out of a DLL on disk: resolves
/// forwarder chains (up to `settings.max_forwarder_hops`), slices the
/// function's bytes, lifts, runs the pass pipeline, and pretty-prints.
/// Returns the pseudocode prefixed by a 5-line header naming the resolved
/// DLL path, export, image base, function RVA, and decoded byte count.
pub fn decompile_export(
    dll_path: &Path,
    export_name: &str,
    host: &dyn ForwarderHost,
    settings: &EngineSettings,
    constant_provider: Arc<ConstantDatabase>,
    cancellation: Option<CancellationToken>,
) -> Result<String> {
    let max_forwarder_hops = settings.max_forwarder_hops;
    let mut current_path = dll_path.to_path_buf();
    let mut current_name = export_name.to_string();
    let mut bytes = std::fs::read(&current_path)?;
    let mut visited: HashSet<(String, String)> = HashSet::new();
    let mut hops_taken = 0u32;

    let (resolved_path, resolved_name, rva, image_base) = loop {
        let key = (current_path.to_string_lossy().to_string(), current_name.clone());
        if !visited.insert(key) {
            return Err(EngineError::ForwarderCycle);
        }

        let image = PeImage::parse(&bytes)?;
        match image.find_export(&current_name)? {
            ExportInfo::Direct(rva) => {
                let base = image.image_base();
                break (current_path.clone(), current_name.clone(), rva, base);
            }
            ExportInfo::Forwarder(forwarder) => {
                if hops_taken >= max_forwarder_hops {
                    return Err(EngineError::ForwarderCycle);
                }
                hops_taken += 1;
                let (module, symbol) = pe::parse_forwarder(&forwarder)?;
                current_path = PathBuf::from(format!("{}.dll", module));
                current_name = symbol;
                bytes = host.load_module(&module)?;
            }
        }
    };

    let function_name = sanitize_function_name(&resolved_name);
    let base_address = settings.base_address_override.unwrap_or(image_base.wrapping_add(rva as u64));
    let mut lift_options = LiftOptions::new(base_address, function_name, constant_provider.clone());
    lift_options.emit_labels = settings.emit_labels;
    lift_options.detect_prologue = settings.detect_prologue;
    lift_options.comment_compare = settings.comment_compare;
    lift_options.cancellation = cancellation.clone();
    if let Some(max_bytes) = settings.max_bytes {
        lift_options.max_bytes = max_bytes;
    }

    let mut print_options = PrintOptions::new(constant_provider);
    print_options.use_stdint_names = settings.use_stdint_names;
    print_options.comment_signedness_on_cmp = settings.comment_signedness_on_cmp;
    print_options.emit_block_labels = settings.emit_labels;

    let image = PeImage::parse(&bytes)?;
    let offset = image.rva_to_offset(rva)?;
    let section_end = image
        .section_containing_offset(offset)
        .map(|s| s.file_end())
        .unwrap_or(image.raw().len() as u32);
    let available = section_end.saturating_sub(offset) as usize;
    if available == 0 {
        return Err(EngineError::NoFunctionBytes);
    }
    let max_bytes = lift_options.max_bytes.min(available);
    let code = &image.raw()[offset as usize..offset as usize + max_bytes];

    let pseudocode = decompile_bytes_with_options(code, &lift_options, &print_options, cancellation.as_ref())?;

    let header = format!(
        "// source: {}\n// export: {}\n// image base: {:#x}\n// function RVA: {:#x}\n// bytes decoded: {}\n",
        resolved_path.display(),
        resolved_name,
        image_base,
        rva,
        max_bytes,
    );
    Ok(header + &pseudocode)
}

/// Lifts and prints `bytes` directly, with no PE involvement; `options.base_address`
/// supplies the assumed load address for RIP-relative and branch-target arithmetic.
pub fn decompile_bytes(bytes: &[u8], options: &LiftOptions) -> Result<String> {
    let print_options = PrintOptions::new(options.constant_provider.clone());
    decompile_bytes_with_options(bytes, options, &print_options, options.cancellation.as_ref())
}

fn decompile_bytes_with_options(
    bytes: &[u8],
    options: &LiftOptions,
    print_options: &PrintOptions,
    cancellation: Option<&CancellationToken>,
) -> Result<String> {
    let mut func = lift::lift_function(bytes, options)?;

    let ctx = passes::PassContext {
        constant_provider: &options.constant_provider,
        return_enum_type_full_name: &options.return_enum_type_full_name,
    };
    passes::default_pipeline().run_all(&mut func, &ctx, cancellation)?;

    if cancellation.is_some_and(|c| c.is_cancelled()) {
        return Err(EngineError::Cancelled);
    }

    Ok(print::print_function(&func, print_options))
}

/// `sub_` + RVA style names aren't available for an export (we have the
/// symbolic name already); strip characters that would be awkward as a C
/// identifier so the printed signature stays readable.
fn sanitize_function_name(name: &str) -> String {
    name.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }).collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use byteorder::{LittleEndian, WriteBytesExt};
    use std::io::Write;

    struct NoModules;
    impl ForwarderHost for NoModules {
        fn load_module(&self, _module_name: &str) -> Result<Vec<u8>> {
            Err(EngineError::NoFunctionBytes)
        }
    }

    #[test]
    fn windows32_host_appends_dll_extension() {
        let host = Windows32Host::new("C:\\Windows\\System32");
        assert_eq!(host.module_path("KERNELBASE"), PathBuf::from("C:\\Windows\\System32\\KERNELBASE.dll"));
        assert_eq!(host.module_path("KERNELBASE.DLL"), PathBuf::from("C:\\Windows\\System32\\KERNELBASE.DLL"));
    }

    #[test]
    fn sanitize_keeps_identifier_characters() {
        assert_eq!(sanitize_function_name("CreateFileW"), "CreateFileW");
        assert_eq!(sanitize_function_name("??0Widget@@"), "__0Widget__");
    }

    /// What one export in a synthetic test PE resolves to.
    enum ExportKind {
        Direct(Vec<u8>),
        Forwarder(String),
    }

    /// Builds a minimal synthetic PE32+ image with a single `.edata`
    /// section holding one named export, either a direct code RVA or a
    /// forwarder string — just enough for `decompile_export`'s
    /// forwarder-following loop to exercise a real `PeImage`.
    fn build_test_pe(export_name: &str, kind: ExportKind, image_base: u64) -> Vec<u8> {
        const SECTION_RVA: u32 = 0x1000;
        const SECTION_FILE_OFFSET: u32 = 0x400;

        let dir_header_len = 40u32;
        let functions_len = 4u32;
        let names_len = 4u32;
        let ordinals_len = 2u32;

        let functions_start = dir_header_len;
        let names_start = functions_start + functions_len;
        let ordinals_start = names_start + names_len;
        let strings_start = ordinals_start + ordinals_len;

        let mut strings_blob = Vec::new();
        let name_rva = SECTION_RVA + strings_start + strings_blob.len() as u32;
        strings_blob.extend_from_slice(export_name.as_bytes());
        strings_blob.push(0);

        let (function_rva, code): (u32, Vec<u8>) = match &kind {
            ExportKind::Forwarder(target) => {
                let fwd_rva = SECTION_RVA + strings_start + strings_blob.len() as u32;
                strings_blob.extend_from_slice(target.as_bytes());
                strings_blob.push(0);
                (fwd_rva, Vec::new())
            }
            ExportKind::Direct(bytes) => {
                // Placeholder; patched below once `code_start` is known.
                (0, bytes.clone())
            }
        };

        let code_start = strings_start + strings_blob.len() as u32;
        let export_dir_size = dir_header_len + functions_len + names_len + ordinals_len + strings_blob.len() as u32;

        let function_rva = if let ExportKind::Direct(_) = kind { SECTION_RVA + code_start } else { function_rva };

        let mut section_data = Vec::new();
        section_data.write_u32::<LittleEndian>(0).unwrap();
        section_data.write_u32::<LittleEndian>(0).unwrap();
        section_data.write_u16::<LittleEndian>(0).unwrap();
        section_data.write_u16::<LittleEndian>(0).unwrap();
        section_data.write_u32::<LittleEndian>(0).unwrap();
        section_data.write_u32::<LittleEndian>(1).unwrap();
        section_data.write_u32::<LittleEndian>(1).unwrap();
        section_data.write_u32::<LittleEndian>(1).unwrap();
        section_data.write_u32::<LittleEndian>(SECTION_RVA + functions_start).unwrap();
        section_data.write_u32::<LittleEndian>(SECTION_RVA + names_start).unwrap();
        section_data.write_u32::<LittleEndian>(SECTION_RVA + ordinals_start).unwrap();
        assert_eq!(section_data.len() as u32, dir_header_len);

        section_data.write_u32::<LittleEndian>(function_rva).unwrap();
        section_data.write_u32::<LittleEndian>(name_rva).unwrap();
        section_data.write_u16::<LittleEndian>(0).unwrap();
        section_data.write_all(&strings_blob).unwrap();
        while (section_data.len() as u32) < code_start {
            section_data.push(0);
        }
        section_data.extend_from_slice(&code);

        let mut image = Vec::new();
        image.write_u16::<LittleEndian>(0x5A4D).unwrap();
        image.resize(0x3c, 0);
        image.write_u32::<LittleEndian>(0x40).unwrap();
        image.resize(0x40, 0);

        image.write_u32::<LittleEndian>(0x0000_4550).unwrap();
        image.write_u16::<LittleEndian>(0x8664).unwrap();
        image.write_u16::<LittleEndian>(1).unwrap();
        image.write_u32::<LittleEndian>(0).unwrap();
        image.write_u32::<LittleEndian>(0).unwrap();
        image.write_u32::<LittleEndian>(0).unwrap();
        let opt_header_size_pos = image.len();
        image.write_u16::<LittleEndian>(0).unwrap();
        image.write_u16::<LittleEndian>(0x22).unwrap();

        let opt_header_start = image.len();
        image.write_u16::<LittleEndian>(0x20b).unwrap();
        image.write_u8(0).unwrap();
        image.write_u8(0).unwrap();
        image.write_u32::<LittleEndian>(0).unwrap();
        image.write_u32::<LittleEndian>(0).unwrap();
        image.write_u32::<LittleEndian>(0).unwrap();
        image.write_u32::<LittleEndian>(0).unwrap();
        image.write_u32::<LittleEndian>(0).unwrap();
        image.write_u64::<LittleEndian>(image_base).unwrap();
        image.write_u32::<LittleEndian>(0x1000).unwrap();
        image.write_u32::<LittleEndian>(0x200).unwrap();
        image.write_u16::<LittleEndian>(0).unwrap();
        image.write_u16::<LittleEndian>(0).unwrap();
        image.write_u16::<LittleEndian>(0).unwrap();
        image.write_u16::<LittleEndian>(0).unwrap();
        image.write_u16::<LittleEndian>(0).unwrap();
        image.write_u16::<LittleEndian>(0).unwrap();
        image.write_u32::<LittleEndian>(0).unwrap();
        image.write_u32::<LittleEndian>(0x2000).unwrap();
        image.write_u32::<LittleEndian>(SECTION_FILE_OFFSET).unwrap();
        image.write_u32::<LittleEndian>(0).unwrap();
        image.write_u16::<LittleEndian>(3).unwrap();
        image.write_u16::<LittleEndian>(0).unwrap();
        image.write_u64::<LittleEndian>(0x10_0000).unwrap();
        image.write_u64::<LittleEndian>(0x1000).unwrap();
        image.write_u64::<LittleEndian>(0x10_0000).unwrap();
        image.write_u64::<LittleEndian>(0x1000).unwrap();
        image.write_u32::<LittleEndian>(0).unwrap();
        image.write_u32::<LittleEndian>(16).unwrap();

        image.write_u32::<LittleEndian>(SECTION_RVA).unwrap();
        image.write_u32::<LittleEndian>(export_dir_size).unwrap();
        for _ in 1..16 {
            image.write_u32::<LittleEndian>(0).unwrap();
            image.write_u32::<LittleEndian>(0).unwrap();
        }

        let opt_header_len = image.len() - opt_header_start;
        image[opt_header_size_pos..opt_header_size_pos + 2].copy_from_slice(&(opt_header_len as u16).to_le_bytes());

        let mut name = [0u8; 8];
        name[..6].copy_from_slice(b".edata");
        image.extend_from_slice(&name);
        image.write_u32::<LittleEndian>(section_data.len() as u32).unwrap();
        image.write_u32::<LittleEndian>(SECTION_RVA).unwrap();
        image.write_u32::<LittleEndian>(section_data.len() as u32).unwrap();
        image.write_u32::<LittleEndian>(SECTION_FILE_OFFSET).unwrap();
        image.write_u32::<LittleEndian>(0).unwrap();
        image.write_u32::<LittleEndian>(0).unwrap();
        image.write_u16::<LittleEndian>(0).unwrap();
        image.write_u16::<LittleEndian>(0).unwrap();
        image.write_u32::<LittleEndian>(0x6000_0020).unwrap();

        image.resize(SECTION_FILE_OFFSET as usize, 0);
        image.extend_from_slice(&section_data);
        image
    }

    struct SingleModuleHost {
        dll_bytes: Vec<u8>,
    }

    impl ForwarderHost for SingleModuleHost {
        fn load_module(&self, _module_name: &str) -> Result<Vec<u8>> {
            Ok(self.dll_bytes.clone())
        }
    }

    /// Scenario: "Forwarder follow" — the export resolves to a forwarder
    /// string naming another module, and the emitted header names the
    /// resolved DLL path and export, not the original ones.
    #[test]
    fn decompile_export_follows_one_forwarder_hop() {
        let target_code = vec![0x33, 0xC0, 0xC3]; // xor eax, eax; ret
        let kernelbase = build_test_pe("GetVersionExA", ExportKind::Direct(target_code), 0x1_8000_0000);
        let forwarding = build_test_pe("GetVersionExA", ExportKind::Forwarder("KERNELBASE.GetVersionExA".to_string()), 0x1_8000_1000);

        std::fs::write("/tmp/redecomp_test_forwarding.dll", &forwarding).unwrap();

        let host = SingleModuleHost { dll_bytes: kernelbase };
        let db = Arc::new(ConstantDatabase::new());
        let settings = EngineSettings::default();

        let out = decompile_export(
            Path::new("/tmp/redecomp_test_forwarding.dll"),
            "GetVersionExA",
            &host,
            &settings,
            db,
            None,
        )
        .expect("forwarder chain of length 1 should resolve");

        assert!(out.contains("KERNELBASE.dll"));
        assert!(out.contains("export: GetVersionExA"));
    }

    /// A forwarder chain of exactly `max_forwarder_hops` hops must still
    /// succeed; one hop more must fail with `ForwarderCycle`.
    #[test]
    fn forwarder_chain_boundary_is_exact() {
        let code = vec![0xC3];
        let chain_len = 3u32;

        // module_0 forwards to module_1, ..., module_{chain_len-1} forwards
        // to module_{chain_len}, which resolves directly.
        let mut modules = std::collections::HashMap::new();
        modules.insert(
            format!("module_{chain_len}.dll"),
            build_test_pe("f", ExportKind::Direct(code.clone()), 0x1000),
        );
        for i in (0..chain_len).rev() {
            let next = format!("module_{}", i + 1);
            modules.insert(format!("module_{i}.dll"), build_test_pe("f", ExportKind::Forwarder(format!("{next}.f")), 0x1000));
        }

        struct MapHost(std::collections::HashMap<String, Vec<u8>>);
        impl ForwarderHost for MapHost {
            fn load_module(&self, module_name: &str) -> Result<Vec<u8>> {
                self.0
                    .get(&format!("{module_name}.dll"))
                    .cloned()
                    .ok_or(EngineError::NoFunctionBytes)
            }
        }

        let entry_path = format!("/tmp/redecomp_test_chain_entry_{chain_len}.dll");
        std::fs::write(&entry_path, modules.get("module_0.dll").unwrap()).unwrap();
        let host = MapHost(modules);

        let mut settings = EngineSettings::default();
        settings.max_forwarder_hops = chain_len;
        let db = Arc::new(ConstantDatabase::new());
        assert!(decompile_export(Path::new(&entry_path), "f", &host, &settings, db.clone(), None).is_ok());

        settings.max_forwarder_hops = chain_len - 1;
        assert!(matches!(
            decompile_export(Path::new(&entry_path), "f", &host, &settings, db, None),
            Err(EngineError::ForwarderCycle)
        ));
    }
}
