//! Renderer tools for the Tether gateway
//!
//! A [`ToolCatalog`] describes each tool's input contract; the
//! [`RendererToolBackend`] validates arguments against it and runs the tool on
//! the renderer through a [`tether_core::RendererBridge`].

pub mod backend;
pub mod catalog;
pub mod schema;
pub mod validation;

pub use backend::RendererToolBackend;
pub use catalog::{RendererTool, ToolCatalog};
pub use schema::{ParamType, ToolParameter, ToolSchema};
pub use validation::{FieldError, validate_arguments};
