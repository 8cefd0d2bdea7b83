//! Compiler core for the Prime surface language.
//!
//! One abstract syntax feeds two executable backends through a shared
//! typed stack bytecode:
//!
//! ```text
//! Program (AST) --> lower --> IrModule --+--> Vm            (interpret)
//!                                        +--> NativeEmitter (arm64 Mach-O)
//! ```
//!
//! The front end (include resolution, text filters, parsing, validation,
//! template monomorphization) is an external collaborator: it produces the
//! [`ast::Program`] consumed here. Lowering inlines every user call,
//! assigns 16-byte local slots, and encodes all backend policy; the VM
//! interprets the pure-compute opcode subset, and the native emitter
//! produces a signed arm64 Mach-O executable without invoking an external
//! linker.
//!
//! # Example
//!
//! ```no_run
//! use primec::{api, ast::Program};
//!
//! # fn load_program() -> Program { Program::default() }
//! let program = load_program();
//! let module = api::compile(&program, "/main")?;
//! let result = api::run(&module)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod api;
pub mod ast;
pub mod ir;
pub mod lower;
pub mod native;
pub mod vm;

pub use ir::{IrFunction, IrInstruction, IrModule, IrOpcode};
pub use lower::{lower, LowerError};
pub use native::{EmitError, NativeEmitter};
pub use vm::{Vm, VmError};
