//! Context assembly: raw conversation log in, bounded context window out.

pub mod assembler;

pub use assembler::{ContextAssembler, entry_bytes};
