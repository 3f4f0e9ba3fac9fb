#![allow(clippy::needless_return, clippy::too_many_arguments, clippy::collapsible_if,
         clippy::collapsible_else_if, clippy::manual_range_contains, clippy::float_cmp,
         clippy::new_without_default, clippy::comparison_chain)]

// Sound scheduling and spatialization: which samples play, when, and at
// what volume. Mixing and output are left to the platform layer.

pub mod slot;
pub mod sample;
pub mod shader;
pub mod channel;
pub mod demo;
pub mod spatial;
pub mod emitter;
pub mod world;
pub mod system;

pub use channel::{LogicalChannel, SoundChannel, DB_SILENCE};
pub use emitter::{Emitter, EmitterId, SoundEmitter};
pub use shader::{SoundShader, SoundShaderFlags, SoundShaderParms};
pub use system::{SoundSystem, WorldId};
pub use world::{SoundToggles, SoundWorld, SoundWorldConfig};
