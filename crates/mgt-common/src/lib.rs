#![allow(clippy::needless_return, clippy::too_many_arguments, clippy::collapsible_if,
         clippy::collapsible_else_if, clippy::manual_range_contains, clippy::float_cmp,
         clippy::missing_safety_doc, clippy::new_without_default)]

// Shared engine code, used by the host and by every subsystem module.

pub mod q_shared;
pub mod qcommon;
pub mod common;
pub mod cvar;
pub mod interface;
