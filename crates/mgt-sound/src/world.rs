// world.rs — sound world: emitters, the shared channel pool and the listener

use rand::rngs::StdRng;
use rand::SeedableRng;

use mgt_common::common::com_dprintf;
use mgt_common::cvar::{CvarContext, CvarFlags};
use mgt_common::q_shared::Vec3;

use crate::channel::SoundChannel;
use crate::demo::{DemoSink, SoundDemoCommand};
use crate::emitter::{ChannelId, Emitter, EmitterId, SoundEmitter};
use crate::shader::ShaderLookup;
use crate::slot::SlotTable;
use crate::spatial::{Listener, SpatialQuery};

pub const DEFAULT_MAX_CHANNELS: usize = 256;

// ============================================================
// Toggles
// ============================================================

/// Debug switches, read from cvars once per frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SoundToggles {
    /// Mute every emitter but this index when > 0.
    pub single_emitter: i32,
    /// Print every start, stop, modify and fade.
    pub show_start_sound: bool,
    pub use_occlusion: bool,
    pub no_sound: bool,
}

impl Default for SoundToggles {
    fn default() -> Self {
        Self {
            single_emitter: 0,
            show_start_sound: false,
            use_occlusion: true,
            no_sound: false,
        }
    }
}

impl SoundToggles {
    pub fn register_cvars(cvars: &mut CvarContext) {
        cvars.register("s_singleEmitter", "0", CvarFlags::CHEAT);
        cvars.register("s_showStartSound", "0", CvarFlags::CHEAT);
        cvars.register("s_useOcclusion", "1", CvarFlags::empty());
        cvars.register("s_noSound", "0", CvarFlags::CHEAT);
        cvars.register("s_maxChannels", &DEFAULT_MAX_CHANNELS.to_string(), CvarFlags::LATCH);
    }

    pub fn from_cvars(cvars: &CvarContext) -> Self {
        Self {
            single_emitter: cvars.variable_int("s_singleEmitter"),
            show_start_sound: cvars.variable_bool("s_showStartSound"),
            use_occlusion: cvars.variable_bool("s_useOcclusion"),
            no_sound: cvars.variable_bool("s_noSound"),
        }
    }
}

// ============================================================
// WorldState
// ============================================================

#[derive(Clone, Copy, Debug)]
pub struct SoundWorldConfig {
    /// Capacity of the channel pool shared by all emitters.
    pub max_channels: usize,
    /// Seed for loop start jitter.
    pub seed: u64,
}

impl Default for SoundWorldConfig {
    fn default() -> Self {
        Self {
            max_channels: DEFAULT_MAX_CHANNELS,
            seed: 0x5eed,
        }
    }
}

/// Everything in a world except the emitter table, so an emitter can be
/// borrowed mutably alongside it.
pub struct WorldState {
    pub(crate) listener: Listener,
    pub(crate) channels: SlotTable<SoundChannel>,
    /// Pool capacity; live channels never exceed it.
    pub(crate) max_channels: usize,
    pub(crate) sound_time: i32,
    pub(crate) toggles: SoundToggles,
    pub(crate) muted: bool,
    /// False while another world is current.
    pub(crate) active: bool,
    pub(crate) demo: Option<Box<dyn DemoSink>>,
    pub(crate) spatial: Option<Box<dyn SpatialQuery>>,
    pub(crate) rng: StdRng,
}

impl WorldState {
    /// Write one demo record if recording.
    pub(crate) fn record<F: FnOnce() -> SoundDemoCommand>(&mut self, cmd: F) {
        if let Some(sink) = self.demo.as_mut() {
            sink.write_command(&cmd());
        }
    }
}

// ============================================================
// SoundWorld
// ============================================================

pub struct SoundWorld {
    state: WorldState,
    emitters: SlotTable<SoundEmitter>,
}

impl SoundWorld {
    pub fn new(config: SoundWorldConfig) -> Self {
        Self {
            state: WorldState {
                listener: Listener::default(),
                channels: SlotTable::with_capacity(config.max_channels),
                max_channels: config.max_channels,
                sound_time: 0,
                toggles: SoundToggles::default(),
                muted: false,
                active: true,
                demo: None,
                spatial: None,
                rng: StdRng::seed_from_u64(config.seed),
            },
            emitters: SlotTable::new(),
        }
    }

    pub fn sound_time(&self) -> i32 {
        self.state.sound_time
    }

    pub fn set_sound_time(&mut self, time: i32) {
        self.state.sound_time = time;
    }

    pub fn toggles(&self) -> SoundToggles {
        self.state.toggles
    }

    pub fn set_toggles(&mut self, toggles: SoundToggles) {
        self.state.toggles = toggles;
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.state.muted = muted;
    }

    pub fn is_muted(&self) -> bool {
        self.state.muted
    }

    pub fn set_active(&mut self, active: bool) {
        self.state.active = active;
    }

    pub fn is_active(&self) -> bool {
        self.state.active
    }

    /// Start or stop recording. Returns the previous sink.
    pub fn set_demo_sink(&mut self, sink: Option<Box<dyn DemoSink>>) -> Option<Box<dyn DemoSink>> {
        std::mem::replace(&mut self.state.demo, sink)
    }

    pub fn set_spatial(&mut self, spatial: Option<Box<dyn SpatialQuery>>) {
        self.state.spatial = spatial;
    }

    pub fn listener(&self) -> &Listener {
        &self.state.listener
    }

    /// Move the listener. The area comes from the spatial query when one is
    /// attached, otherwise the whole world is area 0.
    pub fn place_listener(&mut self, origin: &Vec3, listener_id: i32) {
        let area = match self.state.spatial.as_deref() {
            Some(spatial) => spatial.point_in_area(origin),
            None => Some(0),
        };
        self.set_listener(origin, listener_id, area);
    }

    fn set_listener(&mut self, origin: &Vec3, listener_id: i32, area: Option<i32>) {
        let time = self.state.sound_time;
        self.state.record(|| SoundDemoCommand::PlaceListener {
            origin: *origin,
            listener_id,
            area,
            time,
        });
        self.state.listener = Listener { origin: *origin, area, id: listener_id };
    }

    pub fn alloc_emitter(&mut self) -> EmitterId {
        let id = self.emitters.insert_with(SoundEmitter::new);
        let index = id.index() as u32;
        self.state.record(|| SoundDemoCommand::AllocEmitter { index });
        id
    }

    pub fn emitter(&mut self, id: EmitterId) -> Option<Emitter<'_>> {
        let emitter = self.emitters.get_mut(id)?;
        debug_assert_eq!(emitter.id, id);
        Some(Emitter { emitter, world: &mut self.state })
    }

    pub fn emitter_state(&self, id: EmitterId) -> Option<&SoundEmitter> {
        self.emitters.get(id)
    }

    pub fn emitter_at(&mut self, index: u32) -> Option<Emitter<'_>> {
        let id = self.emitters.id_at(index as usize)?;
        self.emitter(id)
    }

    pub fn emitter_ids(&self) -> Vec<EmitterId> {
        self.emitters.ids()
    }

    pub fn num_emitters(&self) -> usize {
        self.emitters.len()
    }

    pub fn channel(&self, id: ChannelId) -> Option<&SoundChannel> {
        self.state.channels.get(id)
    }

    pub fn num_channels(&self) -> usize {
        self.state.channels.len()
    }

    pub fn max_channels(&self) -> usize {
        self.state.max_channels
    }

    pub fn channels(&self) -> impl Iterator<Item = &SoundChannel> {
        self.state.channels.iter().map(|(_, chan)| chan)
    }

    /// Advance the clock to `current_time` and run one frame: drop finished
    /// channels, recycle drained emitters, then spatialize the rest.
    pub fn update(&mut self, current_time: i32) {
        self.state.record(|| SoundDemoCommand::Frame { time: current_time });
        self.state.sound_time = current_time;

        let mut drained = Vec::new();
        for (id, emitter) in self.emitters.iter_mut() {
            let mut e = Emitter { emitter, world: &mut self.state };
            if e.check_for_completion(current_time) {
                drained.push(id);
            } else {
                e.update(current_time);
            }
        }

        for id in drained {
            self.emitters.remove(id);
        }
    }

    /// Stop everything at once; emitters stay allocated.
    pub fn stop_all_sounds(&mut self) {
        for (_, emitter) in self.emitters.iter_mut() {
            Emitter { emitter, world: &mut self.state }.reset();
        }
    }

    /// Release every emitter and channel.
    pub fn clear(&mut self) {
        self.stop_all_sounds();
        for id in self.emitters.ids() {
            self.emitters.remove(id);
        }
    }

    /// Apply one recorded operation.
    pub fn process_demo_command(&mut self, cmd: &SoundDemoCommand, shaders: &dyn ShaderLookup) {
        let index = match cmd {
            SoundDemoCommand::AllocEmitter { index } => {
                let id = self.alloc_emitter();
                if id.index() as u32 != *index {
                    com_dprintf(&format!("sound demo: emitter {} allocated as {}\n", index, id.index()));
                }
                return;
            }
            SoundDemoCommand::PlaceListener { origin, listener_id, area, time } => {
                self.state.sound_time = *time;
                self.set_listener(origin, *listener_id, *area);
                return;
            }
            SoundDemoCommand::Frame { time } => {
                self.update(*time);
                return;
            }
            SoundDemoCommand::Free { index, .. }
            | SoundDemoCommand::Update { index, .. }
            | SoundDemoCommand::Start { index, .. }
            | SoundDemoCommand::Stop { index, .. }
            | SoundDemoCommand::Modify { index, .. }
            | SoundDemoCommand::Fade { index, .. } => *index,
        };

        let Some(mut e) = self.emitter_at(index) else {
            com_dprintf(&format!("sound demo: no emitter {}\n", index));
            return;
        };

        match cmd {
            SoundDemoCommand::Free { immediate, .. } => e.free(*immediate),
            SoundDemoCommand::Update { origin, listener_id, parms, .. } => {
                e.update_emitter(origin, *listener_id, parms)
            }
            SoundDemoCommand::Start { shader, channel, diversity, flags, .. } => {
                let shader = shaders.find_shader(shader);
                if shader.is_none() {
                    com_dprintf(&format!("sound demo: unknown shader in start on emitter {}\n", index));
                }
                e.start_sound(shader.as_ref(), *channel, *diversity, *flags, false);
            }
            SoundDemoCommand::Stop { channel, .. } => e.stop_sound(*channel),
            SoundDemoCommand::Modify { channel, parms, .. } => e.modify_sound(*channel, parms),
            SoundDemoCommand::Fade { channel, to, over, .. } => e.fade_sound(*channel, *to, *over),
            SoundDemoCommand::AllocEmitter { .. }
            | SoundDemoCommand::PlaceListener { .. }
            | SoundDemoCommand::Frame { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelEnd, LogicalChannel, DB_SILENCE};
    use crate::demo::DemoLog;
    use crate::sample::SoundSample;
    use crate::shader::{ShaderTable, SoundShader, SoundShaderFlags, SoundShaderParms};
    use crate::spatial::PortalPath;
    use mgt_common::q_shared::METERS_TO_UNITS;
    use std::sync::Arc;

    fn shader_with(name: &str, parms: SoundShaderParms, length_ms: i32) -> Arc<SoundShader> {
        let sample = Arc::new(SoundSample::new(name, length_ms, vec![1.0; 60]));
        Arc::new(SoundShader::new(name, parms, vec![sample]))
    }

    fn one_shot(name: &str, length_ms: i32) -> Arc<SoundShader> {
        shader_with(name, SoundShaderParms::SHADER_DEFAULT, length_ms)
    }

    fn start(w: &mut SoundWorld, id: EmitterId, s: &Arc<SoundShader>, slot: LogicalChannel) -> i32 {
        w.emitter(id).unwrap().start_sound(Some(s), slot, 0.0, SoundShaderFlags::empty(), false)
    }

    /// Two areas split at x = 0; the portal path goes through (0, 100, 0).
    struct TwoRooms;

    impl SpatialQuery for TwoRooms {
        fn point_in_area(&self, p: &Vec3) -> Option<i32> {
            if p[2] < -1000.0 {
                None
            } else if p[0] < 0.0 {
                Some(0)
            } else {
                Some(1)
            }
        }

        fn resolve_portal_path(&self, _l: i32, _s: i32, origin: &Vec3, max_distance: f32) -> Option<PortalPath> {
            let portal = [0.0, 100.0, 0.0];
            let d = mgt_common::q_shared::distance(origin, &portal) + 100.0;
            (d < max_distance).then_some(PortalPath { origin: portal, distance: d })
        }
    }

    #[test]
    fn test_update_leaves_every_channel_finite_or_silent() {
        let mut w = SoundWorld::new(SoundWorldConfig::default());
        w.place_listener(&[0.0; 3], 1);
        let near = w.alloc_emitter();
        let far = w.alloc_emitter();
        w.emitter(far).unwrap().update_emitter(&[10_000.0, 0.0, 0.0], 0, &SoundShaderParms::default());
        let s = one_shot("step", 500);
        start(&mut w, near, &s, LogicalChannel::Body);
        start(&mut w, far, &s, LogicalChannel::Body);
        w.update(10);

        for chan in w.channels() {
            assert!(chan.volume_db.is_finite());
            assert!(chan.volume_db >= DB_SILENCE);
        }
        let far_chan = w.emitter_state(far).unwrap().channel_ids()[0];
        assert_eq!(w.channel(far_chan).unwrap().volume_db, DB_SILENCE);
        let near_chan = w.emitter_state(near).unwrap().channel_ids()[0];
        assert_eq!(w.channel(near_chan).unwrap().volume_db, 0.0);
    }

    #[test]
    fn test_distance_cull_without_occlusion() {
        let mut w = SoundWorld::new(SoundWorldConfig::default());
        let parms = SoundShaderParms {
            max_distance: 1000.0,
            flags: SoundShaderFlags::NO_OCCLUSION,
            ..SoundShaderParms::SHADER_DEFAULT
        };
        let s = shader_with("far", parms, 5000);
        let id = w.alloc_emitter();
        w.place_listener(&[1500.0 * METERS_TO_UNITS, 0.0, 0.0], 1);
        start(&mut w, id, &s, LogicalChannel::Any);
        w.update(10);
        assert!(w.channels().all(|c| c.volume_db == DB_SILENCE));
        assert!((w.emitter_state(id).unwrap().direct_distance - 1500.0).abs() < 0.1);
    }

    #[test]
    fn test_listener_outside_world_silences() {
        let mut w = SoundWorld::new(SoundWorldConfig::default());
        w.set_spatial(Some(Box::new(TwoRooms)));
        w.place_listener(&[0.0, 0.0, -5000.0], 1);
        assert_eq!(w.listener().area, None);
        let id = w.alloc_emitter();
        let s = one_shot("x", 500);
        start(&mut w, id, &s, LogicalChannel::Any);
        w.update(0);
        assert!(w.channels().all(|c| c.volume_db == DB_SILENCE));
    }

    #[test]
    fn test_muted_and_inactive_world_silence() {
        let mut w = SoundWorld::new(SoundWorldConfig::default());
        let id = w.alloc_emitter();
        let s = one_shot("x", 500);
        start(&mut w, id, &s, LogicalChannel::Any);

        w.set_muted(true);
        w.update(0);
        assert!(w.channels().all(|c| c.volume_db == DB_SILENCE));

        w.set_muted(false);
        w.set_active(false);
        w.update(0);
        assert!(w.channels().all(|c| c.volume_db == DB_SILENCE));

        w.set_active(true);
        w.update(0);
        assert!(w.channels().all(|c| c.volume_db == 0.0));
    }

    #[test]
    fn test_single_emitter_solo() {
        let mut w = SoundWorld::new(SoundWorldConfig::default());
        let a = w.alloc_emitter();
        let b = w.alloc_emitter();
        let s = one_shot("x", 500);
        start(&mut w, a, &s, LogicalChannel::Any);
        start(&mut w, b, &s, LogicalChannel::Any);
        w.set_toggles(SoundToggles { single_emitter: b.index() as i32, ..SoundToggles::default() });
        w.update(0);
        let vol = |w: &SoundWorld, id| w.channel(w.emitter_state(id).unwrap().channel_ids()[0]).unwrap().volume_db;
        assert_eq!(vol(&w, a), DB_SILENCE);
        assert_eq!(vol(&w, b), 0.0);
    }

    #[test]
    fn test_occlusion_routes_through_portal() {
        let mut w = SoundWorld::new(SoundWorldConfig::default());
        w.set_spatial(Some(Box::new(TwoRooms)));
        w.place_listener(&[-100.0, 0.0, 0.0], 1);
        let id = w.alloc_emitter();
        w.emitter(id).unwrap().update_emitter(&[100.0, 0.0, 0.0], 0, &SoundShaderParms::default());
        let parms = SoundShaderParms { min_distance: 1.0, max_distance: 100.0, ..Default::default() };
        let s = shader_with("x", parms, 5000);
        start(&mut w, id, &s, LogicalChannel::Any);
        w.update(0);

        let e = w.emitter_state(id).unwrap();
        assert_eq!(e.last_valid_portal_area, Some(1));
        assert_eq!(e.spatialized_origin, [0.0, 100.0, 0.0]);
        assert!(e.spatialized_distance > e.direct_distance);

        // emitter drops out of queryable space: the last area still applies
        w.emitter(id).unwrap().update_emitter(&[100.0, 0.0, -2000.0], 0, &SoundShaderParms::default());
        w.update(1);
        assert_eq!(w.emitter_state(id).unwrap().last_valid_portal_area, Some(1));
    }

    #[test]
    fn test_unreachable_portal_is_max_distance() {
        let mut w = SoundWorld::new(SoundWorldConfig::default());
        w.set_spatial(Some(Box::new(TwoRooms)));
        w.place_listener(&[-10.0, 0.0, 0.0], 1);
        let id = w.alloc_emitter();
        w.emitter(id).unwrap().update_emitter(&[10.0, 0.0, 0.0], 0, &SoundShaderParms::default());
        // max distance 4m is ~157 units; the portal route is longer
        let parms = SoundShaderParms { min_distance: 1.0, max_distance: 4.0, ..Default::default() };
        let s = shader_with("x", parms, 5000);
        start(&mut w, id, &s, LogicalChannel::Any);
        w.update(0);
        assert_eq!(w.emitter_state(id).unwrap().spatialized_distance, 4.0);
        assert!(w.channels().all(|c| c.volume_db == DB_SILENCE));

        // with occlusion off the straight line applies
        w.set_toggles(SoundToggles { use_occlusion: false, ..SoundToggles::default() });
        w.update(1);
        assert!(w.channels().all(|c| c.volume_db > DB_SILENCE));
    }

    #[test]
    fn test_listener_own_emitter_is_not_culled() {
        let mut w = SoundWorld::new(SoundWorldConfig::default());
        w.place_listener(&[0.0; 3], 7);
        let id = w.alloc_emitter();
        let parms = SoundShaderParms {
            max_distance: 1.0,
            flags: SoundShaderFlags::PRIVATE,
            ..SoundShaderParms::SHADER_DEFAULT
        };
        w.emitter(id).unwrap().update_emitter(&[500.0, 0.0, 0.0], 7, &SoundShaderParms::default());
        let s = shader_with("breath", parms, 5000);
        start(&mut w, id, &s, LogicalChannel::Voice);
        w.update(0);
        assert!(w.channels().all(|c| c.volume_db == 0.0));
    }

    #[test]
    fn test_play_once() {
        let mut w = SoundWorld::new(SoundWorldConfig::default());
        let id = w.alloc_emitter();
        let parms = SoundShaderParms { flags: SoundShaderFlags::PLAY_ONCE, ..SoundShaderParms::SHADER_DEFAULT };
        let s = shader_with("alarm", parms, 200);
        assert_eq!(start(&mut w, id, &s, LogicalChannel::Any), 200);
        w.set_sound_time(50);
        assert_eq!(start(&mut w, id, &s, LogicalChannel::Any), 0);
        assert_eq!(w.num_channels(), 1);

        // finished (200 + tail) but not yet pruned: still accepted
        w.set_sound_time(300);
        assert_eq!(start(&mut w, id, &s, LogicalChannel::Any), 200);
    }

    #[test]
    fn test_same_frame_double_start() {
        let mut w = SoundWorld::new(SoundWorldConfig::default());
        let id = w.alloc_emitter();
        let s = one_shot("shot", 300);
        assert_eq!(start(&mut w, id, &s, LogicalChannel::Any), 300);
        assert_eq!(start(&mut w, id, &s, LogicalChannel::Weapon), 0);
        assert_eq!(w.num_channels(), 1);

        // a stopped channel does not block a restart in the same frame
        w.emitter(id).unwrap().stop_sound(LogicalChannel::Any);
        assert_eq!(start(&mut w, id, &s, LogicalChannel::Weapon), 300);
    }

    #[test]
    fn test_stop_is_deferred() {
        let mut w = SoundWorld::new(SoundWorldConfig::default());
        let id = w.alloc_emitter();
        let s = shader_with(
            "loop",
            SoundShaderParms { flags: SoundShaderFlags::LOOPING, ..SoundShaderParms::SHADER_DEFAULT },
            1000,
        );
        start(&mut w, id, &s, LogicalChannel::Voice);
        {
            let mut e = w.emitter(id).unwrap();
            assert!(e.currently_playing(LogicalChannel::Voice));
            e.stop_sound(LogicalChannel::Voice);
            assert!(!e.currently_playing(LogicalChannel::Voice));
            // still listed until the next completion pass
            assert!(e.currently_playing(LogicalChannel::Any));
            assert_eq!(e.state().num_channels(), 1);
            assert_eq!(e.channels().next().unwrap().end, ChannelEnd::ForceStop);
        }
        w.update(1);
        assert_eq!(w.emitter_state(id).unwrap().num_channels(), 0);
        assert_eq!(w.num_channels(), 0);
    }

    #[test]
    fn test_free_deferred_until_drained() {
        let mut w = SoundWorld::new(SoundWorldConfig::default());
        let id = w.alloc_emitter();
        let s = one_shot("x", 200);
        start(&mut w, id, &s, LogicalChannel::Any);
        w.emitter(id).unwrap().free(false);
        assert_eq!(w.emitter_state(id).unwrap().num_channels(), 1);

        let mut t = 0;
        while w.emitter_state(id).is_some() {
            t += 50;
            w.update(t);
            assert!(t <= 1000, "emitter never drained");
        }
        assert_eq!(t, 300);
        assert_eq!(w.num_channels(), 0);
        assert_eq!(w.num_emitters(), 0);
    }

    #[test]
    fn test_check_for_completion_after_drain() {
        let mut w = SoundWorld::new(SoundWorldConfig::default());
        let id = w.alloc_emitter();
        let s = one_shot("x", 200);
        start(&mut w, id, &s, LogicalChannel::Any);
        let mut e = w.emitter(id).unwrap();
        e.free(false);
        assert!(!e.check_for_completion(100));
        assert!(e.check_for_completion(300));
    }

    #[test]
    fn test_free_immediate_empties_synchronously() {
        let mut w = SoundWorld::new(SoundWorldConfig::default());
        let id = w.alloc_emitter();
        let s = one_shot("x", 200);
        start(&mut w, id, &s, LogicalChannel::Any);
        start(&mut w, id, &one_shot("y", 100), LogicalChannel::Voice);
        let mut e = w.emitter(id).unwrap();
        e.free(true);
        assert_eq!(e.state().num_channels(), 0);
        assert!(e.state().is_pending_free());
        assert_eq!(w.num_channels(), 0);
        w.update(0);
        assert!(w.emitter_state(id).is_none());
    }

    #[test]
    fn test_stale_emitter_id_after_recycle() {
        let mut w = SoundWorld::new(SoundWorldConfig::default());
        let old = w.alloc_emitter();
        w.emitter(old).unwrap().free(true);
        w.update(0);
        let new = w.alloc_emitter();
        assert_eq!(old.index(), new.index());
        assert!(w.emitter(old).is_none());
        assert!(w.emitter(new).is_some());
    }

    #[test]
    fn test_modify_during_fade_keeps_timing() {
        let mut w = SoundWorld::new(SoundWorldConfig::default());
        let id = w.alloc_emitter();
        let s = shader_with("x", SoundShaderParms { volume: -10.0, ..SoundShaderParms::SHADER_DEFAULT }, 10_000);
        start(&mut w, id, &s, LogicalChannel::Voice);
        w.emitter(id).unwrap().fade_sound(LogicalChannel::Voice, -30.0, 1.0);
        let before = w.channels().next().unwrap().clone();

        w.set_sound_time(500);
        w.emitter(id)
            .unwrap()
            .modify_sound(LogicalChannel::Voice, &SoundShaderParms { volume: -4.0, ..Default::default() });
        let after = w.channels().next().unwrap();
        assert_eq!(after.parms.volume, -4.0);
        assert_eq!(after.parms.min_distance, before.parms.min_distance);
        assert_eq!(after.parms.max_distance, before.parms.max_distance);
        assert_eq!(after.parms.flags, before.parms.flags);
        assert_eq!(after.volume_fade, before.volume_fade);
        assert_eq!(after.start_time, before.start_time);
        assert_eq!(after.end, before.end);
    }

    #[test]
    fn test_fade_advances_while_inaudible() {
        let mut w = SoundWorld::new(SoundWorldConfig::default());
        let id = w.alloc_emitter();
        let s = shader_with(
            "amb",
            SoundShaderParms { flags: SoundShaderFlags::LOOPING, ..SoundShaderParms::SHADER_DEFAULT },
            1000,
        );
        start(&mut w, id, &s, LogicalChannel::Static);
        w.emitter(id).unwrap().fade_sound(LogicalChannel::Static, -20.0, 1.0);

        w.set_muted(true);
        w.update(500);
        assert!(w.channels().all(|c| c.volume_db == DB_SILENCE));

        // back in range halfway through: no catch-up jump, no restart
        w.set_muted(false);
        w.update(500);
        assert!(w.channels().all(|c| (c.volume_db + 10.0).abs() < 1e-4));
        w.update(2000);
        assert!(w.channels().all(|c| c.volume_db == -20.0));
    }

    #[test]
    fn test_very_long_fade_does_not_overflow() {
        let mut w = SoundWorld::new(SoundWorldConfig::default());
        w.place_listener(&[0.0; 3], 1);
        w.set_sound_time(1000);
        let id = w.alloc_emitter();
        start(&mut w, id, &one_shot("talk", 5000), LogicalChannel::Voice);
        w.emitter(id).unwrap().fade_sound(LogicalChannel::Voice, -20.0, 1.0e7);
        w.update(2000);
        let chan = w.channels().next().unwrap();
        assert_eq!(chan.volume_fade.end_time, i32::MAX);
        assert!(chan.volume_db.is_finite());
        assert!(chan.volume_db > -0.01);
    }

    #[test]
    fn test_every_mutation_writes_one_record() {
        let log = DemoLog::new();
        let mut w = SoundWorld::new(SoundWorldConfig::default());
        w.set_demo_sink(Some(Box::new(log.clone())));

        let id = w.alloc_emitter();
        let s = one_shot("x", 100);
        let mut e = w.emitter(id).unwrap();
        e.update_emitter(&[1.0, 2.0, 3.0], 4, &SoundShaderParms::default());
        e.start_sound(Some(&s), LogicalChannel::Voice, 0.5, SoundShaderFlags::empty(), false);
        e.modify_sound(LogicalChannel::Voice, &SoundShaderParms { volume: -2.0, ..Default::default() });
        e.fade_sound(LogicalChannel::Voice, -10.0, 0.5);
        e.stop_sound(LogicalChannel::Any);
        e.free(false);
        w.place_listener(&[0.0; 3], 1);

        let ops: Vec<_> = log.commands().iter().map(|c| c.op()).collect();
        use crate::demo::SoundDemoOp::*;
        assert_eq!(ops, vec![AllocEmitter, Update, Start, Modify, Fade, Stop, Free, PlaceListener]);
    }

    #[test]
    fn test_start_is_recorded_even_when_no_sound() {
        let log = DemoLog::new();
        let mut w = SoundWorld::new(SoundWorldConfig::default());
        w.set_toggles(SoundToggles { no_sound: true, ..SoundToggles::default() });
        let id = w.alloc_emitter();
        w.set_demo_sink(Some(Box::new(log.clone())));
        assert_eq!(start(&mut w, id, &one_shot("x", 100), LogicalChannel::Any), 0);
        assert_eq!(log.len(), 1);

        // a missing shader writes nothing
        w.emitter(id).unwrap().start_sound(None, LogicalChannel::Any, 0.0, SoundShaderFlags::empty(), false);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_demo_replay_rebuilds_channels() {
        let mut shaders = ShaderTable::new();
        let hum = shaders.register(SoundShader::new(
            "hum",
            SoundShaderParms { flags: SoundShaderFlags::LOOPING, ..SoundShaderParms::SHADER_DEFAULT },
            vec![Arc::new(SoundSample::new("hum", 900, vec![]))],
        ));
        let shot = shaders.register(SoundShader::new(
            "shot",
            SoundShaderParms::SHADER_DEFAULT,
            vec![Arc::new(SoundSample::new("shot", 300, vec![]))],
        ));

        let log = DemoLog::new();
        let mut rec = SoundWorld::new(SoundWorldConfig::default());
        rec.set_demo_sink(Some(Box::new(log.clone())));
        rec.place_listener(&[0.0; 3], 1);
        let a = rec.alloc_emitter();
        let b = rec.alloc_emitter();
        rec.emitter(a).unwrap().update_emitter(&[64.0, 0.0, 0.0], 0, &SoundShaderParms::default());
        rec.emitter(a).unwrap().start_sound(Some(&hum), LogicalChannel::Static, 0.0, SoundShaderFlags::empty(), false);
        rec.emitter(b).unwrap().start_sound(Some(&shot), LogicalChannel::Weapon, 0.0, SoundShaderFlags::empty(), false);
        rec.update(100);
        rec.place_listener(&[0.0; 3], 1);
        rec.emitter(b).unwrap().stop_sound(LogicalChannel::Weapon);
        rec.emitter(a).unwrap().fade_sound(LogicalChannel::Static, -12.0, 2.0);
        rec.update(200);

        let mut play = SoundWorld::new(SoundWorldConfig::default());
        for cmd in log.commands() {
            play.process_demo_command(&cmd, &shaders);
        }

        let summary = |w: &SoundWorld| {
            let mut v: Vec<_> = w
                .channels()
                .map(|c| (c.emitter.index(), c.shader.as_ref().unwrap().name().to_string(), c.start_time, c.end, c.volume_fade))
                .collect();
            v.sort_by_key(|x| x.0);
            v
        };
        assert_eq!(summary(&rec), summary(&play));
        assert_eq!(play.num_emitters(), 2);
    }

    #[test]
    fn test_demo_replay_after_emitter_recycle() {
        let mut shaders = ShaderTable::new();
        let hum = shaders.register(SoundShader::new(
            "hum",
            SoundShaderParms { flags: SoundShaderFlags::LOOPING, ..SoundShaderParms::SHADER_DEFAULT },
            vec![Arc::new(SoundSample::new("hum", 900, vec![]))],
        ));
        let shot = shaders.register(SoundShader::new(
            "shot",
            SoundShaderParms::SHADER_DEFAULT,
            vec![Arc::new(SoundSample::new("shot", 300, vec![]))],
        ));

        let log = DemoLog::new();
        let mut rec = SoundWorld::new(SoundWorldConfig::default());
        rec.set_demo_sink(Some(Box::new(log.clone())));
        let a = rec.alloc_emitter();
        start(&mut rec, a, &shot, LogicalChannel::Weapon);
        rec.emitter(a).unwrap().free(false);
        rec.update(500);
        rec.place_listener(&[0.0; 3], 1);
        // the drained slot is reused
        let b = rec.alloc_emitter();
        assert_eq!(b.index(), a.index());
        start(&mut rec, b, &hum, LogicalChannel::Static);
        rec.update(600);

        let mut play = SoundWorld::new(SoundWorldConfig::default());
        for cmd in log.commands() {
            play.process_demo_command(&cmd, &shaders);
        }

        let emitters = |w: &SoundWorld| {
            w.emitter_ids()
                .into_iter()
                .map(|id| {
                    let e = w.emitter_state(id).unwrap();
                    (id.index(), e.is_pending_free(), e.num_channels())
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(emitters(&rec), vec![(0, false, 1)]);
        assert_eq!(emitters(&play), emitters(&rec));
        assert_eq!(play.sound_time(), 600);
        let names: Vec<_> = play.channels().map(|c| c.shader.as_ref().unwrap().name().to_string()).collect();
        assert_eq!(names, vec!["hum".to_string()]);
    }

    #[test]
    fn test_toggles_from_cvars() {
        let mut cvars = CvarContext::new();
        SoundToggles::register_cvars(&mut cvars);
        assert_eq!(SoundToggles::from_cvars(&cvars), SoundToggles::default());
        cvars.set("s_useOcclusion", "0");
        cvars.set("s_singleEmitter", "3");
        let t = SoundToggles::from_cvars(&cvars);
        assert!(!t.use_occlusion);
        assert_eq!(t.single_emitter, 3);
        assert_eq!(cvars.variable_int("s_maxChannels"), DEFAULT_MAX_CHANNELS as i32);
    }

    #[test]
    fn test_stop_all_keeps_emitters() {
        let mut w = SoundWorld::new(SoundWorldConfig::default());
        let id = w.alloc_emitter();
        start(&mut w, id, &one_shot("x", 100), LogicalChannel::Any);
        w.stop_all_sounds();
        assert_eq!(w.num_channels(), 0);
        assert!(w.emitter(id).is_some());
        w.clear();
        assert_eq!(w.num_emitters(), 0);
    }
}
