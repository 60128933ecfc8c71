//! Code generation: chunks, the fusion optimizer and script rendering.

macro_rules! chunk_boilerplate {
    () => {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn box_clone(&self) -> Box<dyn $crate::codegen::CodeChunk> {
            Box::new(self.clone())
        }
    };
}

mod chunk;
pub mod chunks;
mod optimizer;
mod render;

pub use chunk::{downcast, imports_for, renamed, Code, CodeChunk, Renames, TableSet};
pub use optimizer::{hoist_renames, optimize};
pub use render::{render, GeneratedCode};
