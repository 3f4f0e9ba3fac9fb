// shader.rs — sound shaders and their layered playback parameters

use std::collections::HashMap;
use std::sync::Arc;

use crate::sample::SoundSample;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SoundShaderFlags: i32 {
        /// Only heard when the emitter is the listener.
        const PRIVATE         = 0x0001;
        /// Heard by everyone except the listener that owns the emitter.
        const ANTI_PRIVATE    = 0x0002;
        /// Never routed through portals.
        const NO_OCCLUSION    = 0x0004;
        /// Full volume everywhere, no distance culling.
        const GLOBAL          = 0x0008;
        const OMNIDIRECTIONAL = 0x0010;
        const LOOPING         = 0x0020;
        /// Refuse to start while the same shader is still playing on the emitter.
        const PLAY_ONCE       = 0x0040;
        const UNCLAMPED       = 0x0080;
        const NO_FLICKER      = 0x0100;
        /// Never pick the most recently played entry twice in a row.
        const NO_DUPS         = 0x0200;
        const VO              = 0x0400;
        const MUSIC           = 0x0800;
    }
}

/// Playback parameters. Zero means "unset" for every numeric field, which is
/// what lets emitter and per-call overrides be layered over shader defaults.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SoundShaderParms {
    /// Meters. Full volume inside this distance.
    pub min_distance: f32,
    /// Meters. Silent at or past this distance.
    pub max_distance: f32,
    /// dB.
    pub volume: f32,
    pub shakes: f32,
    pub sound_class: i32,
    pub flags: SoundShaderFlags,
}

impl SoundShaderParms {
    /// Defaults given to a shader that does not specify its own.
    pub const SHADER_DEFAULT: SoundShaderParms = SoundShaderParms {
        min_distance: 1.0,
        max_distance: 10.0,
        volume: 0.0,
        shakes: 0.0,
        sound_class: 0,
        flags: SoundShaderFlags::empty(),
    };

    /// Layer `over` on top of `self`: every non-zero field of `over` wins,
    /// flags are the union of both.
    pub fn override_with(&self, over: &SoundShaderParms) -> SoundShaderParms {
        fn pick(base: f32, over: f32) -> f32 {
            if over != 0.0 {
                over
            } else {
                base
            }
        }

        SoundShaderParms {
            min_distance: pick(self.min_distance, over.min_distance),
            max_distance: pick(self.max_distance, over.max_distance),
            volume: pick(self.volume, over.volume),
            shakes: pick(self.shakes, over.shakes),
            sound_class: if over.sound_class != 0 { over.sound_class } else { self.sound_class },
            flags: self.flags | over.flags,
        }
    }
}

/// A named set of candidate samples with default parameters.
#[derive(Debug)]
pub struct SoundShader {
    name: String,
    pub parms: SoundShaderParms,
    /// Entry 0 is a lead-in and entry 1 the loop body when set.
    pub leadin: bool,
    entries: Vec<Arc<SoundSample>>,
}

impl SoundShader {
    pub fn new(name: &str, parms: SoundShaderParms, entries: Vec<Arc<SoundSample>>) -> Self {
        Self {
            name: name.to_string(),
            parms,
            leadin: false,
            entries,
        }
    }

    pub fn with_leadin(mut self) -> Self {
        self.leadin = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entries(&self) -> &[Arc<SoundSample>] {
        &self.entries
    }

    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, i: usize) -> Option<&Arc<SoundSample>> {
        self.entries.get(i)
    }
}

/// Resolves shader names, for demo replay.
pub trait ShaderLookup {
    fn find_shader(&self, name: &str) -> Option<Arc<SoundShader>>;
}

#[derive(Default)]
pub struct ShaderTable {
    shaders: HashMap<String, Arc<SoundShader>>,
}

impl ShaderTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, shader: SoundShader) -> Arc<SoundShader> {
        let shader = Arc::new(shader);
        self.shaders.insert(shader.name().to_string(), shader.clone());
        shader
    }

    pub fn len(&self) -> usize {
        self.shaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shaders.is_empty()
    }
}

impl ShaderLookup for ShaderTable {
    fn find_shader(&self, name: &str) -> Option<Arc<SoundShader>> {
        self.shaders.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_override_takes_nonzero_fields() {
        let base = SoundShaderParms {
            min_distance: 1.0,
            max_distance: 20.0,
            volume: -6.0,
            shakes: 0.5,
            sound_class: 1,
            flags: SoundShaderFlags::LOOPING,
        };
        let over = SoundShaderParms {
            volume: -12.0,
            flags: SoundShaderFlags::NO_DUPS,
            ..Default::default()
        };
        let out = base.override_with(&over);
        assert_eq!(out.min_distance, 1.0);
        assert_eq!(out.max_distance, 20.0);
        assert_eq!(out.volume, -12.0);
        assert_eq!(out.shakes, 0.5);
        assert_eq!(out.sound_class, 1);
        assert_eq!(out.flags, SoundShaderFlags::LOOPING | SoundShaderFlags::NO_DUPS);
    }

    #[test]
    fn test_flags_never_cleared_by_override() {
        let base = SoundShaderParms { flags: SoundShaderFlags::GLOBAL, ..Default::default() };
        let out = base.override_with(&SoundShaderParms::default());
        assert!(out.flags.contains(SoundShaderFlags::GLOBAL));
    }

    #[test]
    fn test_shader_table_lookup() {
        let mut table = ShaderTable::new();
        let s = table.register(SoundShader::new("door_open", SoundShaderParms::SHADER_DEFAULT, vec![]));
        assert!(Arc::ptr_eq(&s, &table.find_shader("door_open").unwrap()));
        assert!(table.find_shader("door_close").is_none());
    }

    fn field() -> impl Strategy<Value = f32> {
        prop_oneof![Just(0.0f32), -100.0f32..100.0]
    }

    fn parms() -> impl Strategy<Value = SoundShaderParms> {
        (field(), field(), field(), field(), prop_oneof![Just(0), 1..4], 0..0x1000i32).prop_map(
            |(min_distance, max_distance, volume, shakes, sound_class, bits)| SoundShaderParms {
                min_distance,
                max_distance,
                volume,
                shakes,
                sound_class,
                flags: SoundShaderFlags::from_bits_truncate(bits),
            },
        )
    }

    proptest! {
        #[test]
        fn prop_override_parms(base in parms(), over in parms()) {
            let out = base.override_with(&over);
            let expect = |b: f32, o: f32| if o == 0.0 { b } else { o };
            prop_assert_eq!(out.min_distance, expect(base.min_distance, over.min_distance));
            prop_assert_eq!(out.max_distance, expect(base.max_distance, over.max_distance));
            prop_assert_eq!(out.volume, expect(base.volume, over.volume));
            prop_assert_eq!(out.shakes, expect(base.shakes, over.shakes));
            prop_assert_eq!(out.sound_class, if over.sound_class == 0 { base.sound_class } else { over.sound_class });
            prop_assert_eq!(out.flags, base.flags | over.flags);
        }
    }
}
