// system.rs — owner of the sound worlds and the sample/shader caches

use mgt_common::common::com_printf;
use mgt_common::cvar::CvarContext;

use crate::sample::SampleCache;
use crate::shader::ShaderTable;
use crate::world::{SoundToggles, SoundWorld, SoundWorldConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WorldId(usize);

pub struct SoundSystem {
    worlds: Vec<Option<SoundWorld>>,
    current: Option<WorldId>,
    muted: bool,
    toggles: SoundToggles,
    config: SoundWorldConfig,
    pub samples: SampleCache,
    pub shaders: ShaderTable,
}

impl SoundSystem {
    pub fn new(config: SoundWorldConfig) -> Self {
        Self {
            worlds: Vec::new(),
            current: None,
            muted: false,
            toggles: SoundToggles::default(),
            config,
            samples: SampleCache::new(),
            shaders: ShaderTable::new(),
        }
    }

    /// Channel pool size and jitter seed from `s_maxChannels`.
    pub fn config_from_cvars(cvars: &CvarContext) -> SoundWorldConfig {
        let max_channels = cvars.variable_int("s_maxChannels");
        SoundWorldConfig {
            max_channels: if max_channels > 0 { max_channels as usize } else { SoundWorldConfig::default().max_channels },
            ..SoundWorldConfig::default()
        }
    }

    /// New worlds start inactive until made current.
    pub fn alloc_world(&mut self) -> WorldId {
        let mut world = SoundWorld::new(self.config);
        world.set_muted(self.muted);
        world.set_toggles(self.toggles);
        world.set_active(false);

        let slot = match self.worlds.iter().position(|w| w.is_none()) {
            Some(i) => i,
            None => {
                self.worlds.push(None);
                self.worlds.len() - 1
            }
        };
        self.worlds[slot] = Some(world);
        WorldId(slot)
    }

    pub fn free_world(&mut self, id: WorldId) {
        if self.current == Some(id) {
            self.current = None;
        }
        if let Some(slot) = self.worlds.get_mut(id.0) {
            if let Some(mut world) = slot.take() {
                world.clear();
            }
        }
    }

    pub fn world(&self, id: WorldId) -> Option<&SoundWorld> {
        self.worlds.get(id.0)?.as_ref()
    }

    pub fn world_mut(&mut self, id: WorldId) -> Option<&mut SoundWorld> {
        self.worlds.get_mut(id.0)?.as_mut()
    }

    pub fn current_world(&self) -> Option<WorldId> {
        self.current
    }

    pub fn current_world_mut(&mut self) -> Option<&mut SoundWorld> {
        let id = self.current?;
        self.world_mut(id)
    }

    /// Only the current world produces audio.
    pub fn set_current_world(&mut self, id: Option<WorldId>) {
        let id = id.filter(|id| self.world(*id).is_some());
        self.current = id;
        for (i, world) in self.worlds.iter_mut().enumerate() {
            if let Some(world) = world {
                world.set_active(Some(WorldId(i)) == id);
            }
        }
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set_mute(&mut self, muted: bool) {
        if self.muted != muted {
            com_printf(if muted { "sound muted\n" } else { "sound unmuted\n" });
        }
        self.muted = muted;
        for world in self.worlds.iter_mut().flatten() {
            world.set_muted(muted);
        }
    }

    pub fn toggles(&self) -> SoundToggles {
        self.toggles
    }

    pub fn set_toggles(&mut self, toggles: SoundToggles) {
        self.toggles = toggles;
        for world in self.worlds.iter_mut().flatten() {
            world.set_toggles(toggles);
        }
    }

    /// Advance the current world's clock by `msec` and update it.
    pub fn update(&mut self, msec: i32) {
        if let Some(world) = self.current_world_mut() {
            let time = world.sound_time() + msec.max(0);
            world.update(time);
        }
    }

    pub fn stop_all_sounds(&mut self) {
        for world in self.worlds.iter_mut().flatten() {
            world.stop_all_sounds();
        }
    }

    pub fn num_worlds(&self) -> usize {
        self.worlds.iter().flatten().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{LogicalChannel, DB_SILENCE};
    use crate::sample::SoundSample;
    use crate::shader::{ShaderLookup, SoundShader, SoundShaderFlags, SoundShaderParms};

    fn system_with_hum() -> SoundSystem {
        let mut sys = SoundSystem::new(SoundWorldConfig::default());
        let sample = sys.samples.insert(SoundSample::new("hum", 1000, vec![]));
        sys.shaders.register(SoundShader::new(
            "hum",
            SoundShaderParms { flags: SoundShaderFlags::LOOPING, ..SoundShaderParms::SHADER_DEFAULT },
            vec![sample],
        ));
        sys
    }

    fn start_hum(sys: &mut SoundSystem, world: WorldId) {
        let hum = sys.shaders.find_shader("hum");
        let w = sys.world_mut(world).unwrap();
        let id = w.alloc_emitter();
        w.emitter(id)
            .unwrap()
            .start_sound(hum.as_ref(), LogicalChannel::Static, 0.0, SoundShaderFlags::empty(), false);
    }

    #[test]
    fn test_only_current_world_is_audible() {
        let mut sys = system_with_hum();
        let a = sys.alloc_world();
        let b = sys.alloc_world();
        start_hum(&mut sys, a);
        start_hum(&mut sys, b);
        sys.set_current_world(Some(a));

        sys.update(16);
        sys.world_mut(b).unwrap().update(16);
        assert!(sys.world(a).unwrap().channels().all(|c| c.volume_db > DB_SILENCE));
        assert!(sys.world(b).unwrap().channels().all(|c| c.volume_db == DB_SILENCE));
        assert_eq!(sys.world(a).unwrap().sound_time(), 16);
    }

    #[test]
    fn test_mute_propagates() {
        let mut sys = system_with_hum();
        let a = sys.alloc_world();
        sys.set_current_world(Some(a));
        start_hum(&mut sys, a);
        sys.set_mute(true);
        sys.update(16);
        assert!(sys.world(a).unwrap().is_muted());
        assert!(sys.world(a).unwrap().channels().all(|c| c.volume_db == DB_SILENCE));
        // worlds allocated while muted start muted
        let b = sys.alloc_world();
        assert!(sys.world(b).unwrap().is_muted());
    }

    #[test]
    fn test_free_world_reuses_slot() {
        let mut sys = SoundSystem::new(SoundWorldConfig::default());
        let a = sys.alloc_world();
        sys.set_current_world(Some(a));
        sys.free_world(a);
        assert_eq!(sys.current_world(), None);
        assert!(sys.world(a).is_none());
        let b = sys.alloc_world();
        assert_eq!(a, b);
        assert_eq!(sys.num_worlds(), 1);
    }

    #[test]
    fn test_toggles_reach_worlds() {
        let mut sys = SoundSystem::new(SoundWorldConfig::default());
        let a = sys.alloc_world();
        sys.set_toggles(SoundToggles { no_sound: true, ..SoundToggles::default() });
        assert!(sys.world(a).unwrap().toggles().no_sound);
    }

    #[test]
    fn test_config_from_cvars() {
        let mut cvars = CvarContext::new();
        SoundToggles::register_cvars(&mut cvars);
        cvars.set("s_maxChannels", "32");
        assert_eq!(SoundSystem::config_from_cvars(&cvars).max_channels, 32);
        cvars.set("s_maxChannels", "-1");
        assert_eq!(SoundSystem::config_from_cvars(&cvars).max_channels, 256);
    }

    #[test]
    fn test_stop_all_sounds() {
        let mut sys = system_with_hum();
        let a = sys.alloc_world();
        start_hum(&mut sys, a);
        sys.stop_all_sounds();
        assert_eq!(sys.world(a).unwrap().num_channels(), 0);
    }
}
