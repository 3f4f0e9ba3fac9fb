#![allow(clippy::needless_return, clippy::collapsible_if, clippy::missing_safety_doc,
         clippy::new_without_default)]

// Engine host: module loading, interface resolution and the frame loop.

pub mod sys;
pub mod module;
pub mod factory;
pub mod context;
pub mod host;

pub use context::{ContextOptions, EngineContext, SubsystemSpec};
pub use factory::Capability;
pub use host::{EngineHost, FrameHook, FrameStatus, HostError};
pub use module::{ModuleError, ModuleHandle, ModuleLoader};
