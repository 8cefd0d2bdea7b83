//! High-level pipeline entry points.
//!
//! Thin wrappers over the staged pipeline for drivers and tests:
//! lower a program, interpret the module, or emit the native executable.

use std::path::Path;

use crate::ast::Program;
use crate::ir::IrModule;
use crate::lower::{self, LowerError};
use crate::native::{EmitError, NativeEmitter};
use crate::vm::{Vm, VmError};

/// Lower `program` to an IR module rooted at `entry_path`.
pub fn compile(program: &Program, entry_path: &str) -> Result<IrModule, LowerError> {
    lower::lower(program, entry_path)
}

/// Interpret `module` and return its 64-bit result. The driver maps the
/// low 32 bits to the process exit code.
pub fn run(module: &IrModule) -> Result<u64, VmError> {
    Vm::new().execute(module)
}

/// Emit `module` as a signed arm64 Mach-O executable at `output_path`.
pub fn emit_native<P: AsRef<Path>>(module: &IrModule, output_path: P) -> Result<(), EmitError> {
    NativeEmitter::new().emit_executable(module, output_path)
}

/// Render `module` as pretty-printed JSON (the `--dump-stage ir` payload).
pub fn module_to_json(module: &IrModule) -> serde_json::Result<String> {
    serde_json::to_string_pretty(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{IrFunction, IrInstruction, IrOpcode};

    fn sample_module() -> IrModule {
        IrModule {
            functions: vec![IrFunction {
                name: "/main".to_string(),
                instructions: vec![
                    IrInstruction::new(IrOpcode::PushI32, 7),
                    IrInstruction::new(IrOpcode::ReturnI32, 0),
                ],
            }],
            entry_index: 0,
            string_table: Vec::new(),
        }
    }

    #[test]
    fn test_run_sample() {
        assert_eq!(run(&sample_module()).unwrap(), 7);
    }

    #[test]
    fn test_module_to_json_round_trips() {
        let module = sample_module();
        let json = module_to_json(&module).unwrap();
        let parsed: IrModule = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, module);
    }
}
