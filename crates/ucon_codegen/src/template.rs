//! Source templates for generated programs.

use std::fmt::Write;
use ucon_policy::RuleProfile;

pub(crate) const HEADER: &str = "Generated by ucon-codegen. Do not edit.";

/// Rust module name for an algorithm, `alg_` plus its snake-case form
#[must_use]
pub fn module_name(algorithm: &str) -> String {
    let chars: Vec<char> = algorithm.chars().collect();
    let mut out = String::from("alg_");
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev = i.checked_sub(1).and_then(|p| chars.get(p)).copied();
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                None | Some('_') => false,
                Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit() => true,
                Some(p) => p.is_ascii_uppercase() && next.is_some_and(|n| n.is_ascii_lowercase()),
            };
            if boundary {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

pub(crate) fn build_descriptor(package: &str, runtime_dependency: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}", HEADER);
    out.push_str("[package]\n");
    let _ = writeln!(out, "name = \"{}\"", package);
    out.push_str("version = \"0.1.0\"\n");
    out.push_str("edition = \"2024\"\n");
    out.push_str("publish = false\n\n");
    out.push_str("[[bin]]\n");
    out.push_str("name = \"trusted-app\"\n");
    out.push_str("path = \"main.rs\"\n\n");
    out.push_str("[dependencies]\n");
    let _ = writeln!(out, "ucon_runtime = {}", runtime_dependency);
    out.push_str("\n[workspace]\n");
    out
}

pub(crate) fn main_source(
    fingerprint_hex: &str,
    algorithms: &[(String, String)],
    profile: &RuleProfile,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "// {}", HEADER);
    let _ = writeln!(out, "// Trusted application for policy class {}", fingerprint_hex);
    out.push('\n');

    for (name, module) in algorithms {
        let _ = writeln!(out, "#[path = \"algorithms/{}.rs\"]", name);
        let _ = writeln!(out, "mod {};", module);
    }
    out.push('\n');

    out.push_str("use std::process::ExitCode;\n");
    out.push_str("use ucon_runtime::host::{self, ProgramSpec};\n");
    out.push_str("use ucon_runtime::{AlgorithmRegistry, RuleProfile};\n\n");

    let _ = writeln!(out, "const FINGERPRINT: &str = \"{}\";", fingerprint_hex);
    let names: Vec<String> = algorithms
        .iter()
        .map(|(name, _)| format!("\"{}\"", name))
        .collect();
    let _ = writeln!(
        out,
        "const ALLOWED_ALGORITHMS: &[&str] = &[{}];",
        names.join(", ")
    );
    out.push_str("const PROFILE: RuleProfile = RuleProfile {\n");
    let _ = writeln!(out, "    attribute_exclusion: {},", profile.attribute_exclusion);
    let _ = writeln!(out, "    log_time_range: {},", profile.log_time_range);
    let _ = writeln!(out, "    semantic_constraints: {},", profile.semantic_constraints);
    let _ = writeln!(out, "    output_time_range: {},", profile.output_time_range);
    out.push_str("};\n\n");

    out.push_str("fn main() -> ExitCode {\n");
    out.push_str("    let mut registry = AlgorithmRegistry::new();\n");
    for (name, module) in algorithms {
        let _ = writeln!(out, "    registry.register(\"{}\", {}::run);", name, module);
    }
    if profile.transforms_log() {
        out.push_str("    // Log reads are parsed and filtered before release\n");
    } else {
        out.push_str("    // Log reads are released verbatim\n");
    }
    out.push_str("    host::run(ProgramSpec {\n");
    out.push_str("        fingerprint: FINGERPRINT,\n");
    out.push_str("        allowed_algorithms: ALLOWED_ALGORITHMS,\n");
    out.push_str("        profile: PROFILE,\n");
    out.push_str("        manifest_dir: env!(\"CARGO_MANIFEST_DIR\"),\n");
    out.push_str("        registry,\n");
    out.push_str("    })\n");
    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_names() {
        assert_eq!(module_name("HeuristicMiner"), "alg_heuristic_miner");
        assert_eq!(module_name("AlphaMiner"), "alg_alpha_miner");
        assert_eq!(module_name("ILPMiner"), "alg_ilp_miner");
        assert_eq!(module_name("inductive_miner2"), "alg_inductive_miner2");
        assert_eq!(module_name("Type"), "alg_type");
    }

    #[test]
    fn test_build_descriptor_shape() {
        let toml = build_descriptor("ta-abc", "{ version = \"0.1\" }");
        assert!(toml.contains("name = \"ta-abc\""));
        assert!(toml.contains("[[bin]]\nname = \"trusted-app\"\npath = \"main.rs\""));
        assert!(toml.contains("ucon_runtime = { version = \"0.1\" }"));
        assert!(toml.ends_with("[workspace]\n"));
    }

    #[test]
    fn test_main_registers_each_algorithm() {
        let algorithms = vec![
            ("AlphaMiner".to_string(), "alg_alpha_miner".to_string()),
            ("HeuristicMiner".to_string(), "alg_heuristic_miner".to_string()),
        ];
        let src = main_source("ff00", &algorithms, &RuleProfile::default());
        assert!(src.contains("#[path = \"algorithms/AlphaMiner.rs\"]\nmod alg_alpha_miner;"));
        assert!(src.contains("registry.register(\"HeuristicMiner\", alg_heuristic_miner::run);"));
        assert!(src.contains("const ALLOWED_ALGORITHMS: &[&str] = &[\"AlphaMiner\", \"HeuristicMiner\"];"));
        assert!(src.contains("released verbatim"));
    }
}
