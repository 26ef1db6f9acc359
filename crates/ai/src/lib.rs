//! `matterflow-ai` — AI extraction boundary and tool invocation surface.
//!
//! The extraction backend itself (prompting, models) is an external
//! collaborator; this crate defines the contract handlers call through,
//! plus the synchronous tool-handler layer an orchestrating agent uses to
//! invoke capabilities directly.

pub mod extraction;
pub mod tool;
pub mod truncate;

pub use extraction::{
    ExtractionBackend, ExtractionError, ScriptedExtraction, StructuredFacts,
};
pub use tool::{ToolHandler, ToolParameters, ToolRegistry, ToolResult};
pub use truncate::truncate_with_marker;
