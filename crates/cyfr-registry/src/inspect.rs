//! WASM binary inspection.
//!
//! Publish-time checks: magic and binary version, export-section names,
//! and the suggested component type inferred from those names.

use cyfr_core::ComponentType;
use wasmparser::{Parser, Payload};

use crate::error::{RegistryError, RegistryResult};

/// The `\0asm` magic.
const WASM_MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6d];
/// Binary format version 1, little-endian.
const WASM_VERSION_1: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

/// What inspection learned about a module.
#[derive(Debug, Clone)]
pub struct WasmInfo {
    /// Function export names, in section order.
    pub exports: Vec<String>,
    /// Type suggested by the export names.
    pub suggested_type: ComponentType,
}

/// Check magic bytes and binary version.
///
/// # Errors
///
/// Returns [`RegistryError::InvalidWasm`] with `invalid_magic_bytes` for
/// wrong magic and `unsupported_version` for anything but version 1.
pub fn validate_wasm(bytes: &[u8]) -> RegistryResult<()> {
    if bytes.len() < 8 || bytes[..4] != WASM_MAGIC {
        return Err(RegistryError::InvalidWasm("invalid_magic_bytes".to_string()));
    }
    if bytes[4..8] != WASM_VERSION_1 {
        return Err(RegistryError::InvalidWasm("unsupported_version".to_string()));
    }
    Ok(())
}

/// Infer a component type from export names: an `execute` export makes a
/// formula; any export mentioning `http` or `socket` makes a catalyst;
/// everything else is a reagent.
#[must_use]
pub fn infer_component_type(exports: &[String]) -> ComponentType {
    if exports.iter().any(|name| name == "execute") {
        return ComponentType::Formula;
    }
    if exports
        .iter()
        .any(|name| name.contains("http") || name.contains("socket"))
    {
        return ComponentType::Catalyst;
    }
    ComponentType::Reagent
}

/// Validate and inspect a module.
///
/// # Errors
///
/// Returns [`RegistryError::InvalidWasm`] when the header or the export
/// section cannot be parsed.
pub fn inspect_wasm(bytes: &[u8]) -> RegistryResult<WasmInfo> {
    validate_wasm(bytes)?;

    let mut exports = Vec::new();
    for payload in Parser::new(0).parse_all(bytes) {
        let payload = payload.map_err(|e| RegistryError::InvalidWasm(e.to_string()))?;
        if let Payload::ExportSection(reader) = payload {
            for export in reader {
                let export = export.map_err(|e| RegistryError::InvalidWasm(e.to_string()))?;
                if export.kind == wasmparser::ExternalKind::Func {
                    exports.push(export.name.to_string());
                }
            }
        }
    }

    let suggested_type = infer_component_type(&exports);
    Ok(WasmInfo {
        exports,
        suggested_type,
    })
}

/// Build a minimal module exporting the named functions (test fixture).
#[cfg(test)]
pub(crate) fn module_with_exports(names: &[&str]) -> Vec<u8> {
    use wasm_encoder::{
        CodeSection, ExportKind, ExportSection, Function, FunctionSection, Instruction, Module,
        TypeSection,
    };

    let mut types = TypeSection::new();
    types.ty().function([], []);
    let mut functions = FunctionSection::new();
    let mut exports = ExportSection::new();
    let mut codes = CodeSection::new();
    for (i, name) in names.iter().enumerate() {
        functions.function(0);
        exports.export(name, ExportKind::Func, u32::try_from(i).unwrap());
        let mut body = Function::new([]);
        body.instruction(&Instruction::End);
        codes.function(&body);
    }
    let mut module = Module::new();
    module.section(&types);
    module.section(&functions);
    module.section(&exports);
    module.section(&codes);
    module.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_validation() {
        assert!(matches!(
            validate_wasm(b"not a module"),
            Err(RegistryError::InvalidWasm(msg)) if msg == "invalid_magic_bytes"
        ));
        // Magic `\0asm` with version 1 passes.
        assert!(validate_wasm(b"\0asm\x01\0\0\0").is_ok());
        // Wrong binary version.
        assert!(matches!(
            validate_wasm(b"\0asm\x02\0\0\0"),
            Err(RegistryError::InvalidWasm(msg)) if msg == "unsupported_version"
        ));
    }

    #[test]
    fn test_export_parsing() {
        let bytes = module_with_exports(&["add", "sub"]);
        let info = inspect_wasm(&bytes).unwrap();
        assert_eq!(info.exports, vec!["add", "sub"]);
    }

    #[test]
    fn test_type_inference() {
        assert_eq!(
            infer_component_type(&["execute".to_string(), "http_request".to_string()]),
            ComponentType::Formula
        );
        assert_eq!(
            infer_component_type(&["http_get".to_string()]),
            ComponentType::Catalyst
        );
        assert_eq!(
            infer_component_type(&["open_socket".to_string()]),
            ComponentType::Catalyst
        );
        assert_eq!(
            infer_component_type(&["add".to_string()]),
            ComponentType::Reagent
        );
        assert_eq!(infer_component_type(&[]), ComponentType::Reagent);
    }
}
