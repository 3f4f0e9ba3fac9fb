// emitter.rs — a world-space sound source and the channels it schedules

use std::sync::Arc;

use rand::Rng;

use mgt_common::common::{com_dprintf, com_printf};
use mgt_common::q_shared::*;

use crate::channel::*;
use crate::demo::SoundDemoCommand;
use crate::sample::SoundSample;
use crate::shader::*;
use crate::slot::SlotId;
use crate::world::WorldState;

/// Most channels one emitter may hold at once.
pub const MAX_CHANNELS_PER_EMITTER: usize = 16;

pub type EmitterId = SlotId;
pub type ChannelId = SlotId;

/// Emitter data kept in the world's emitter table. Operations go through
/// [`Emitter`], which pairs this with the world it lives in.
#[derive(Debug)]
pub struct SoundEmitter {
    pub(crate) id: EmitterId,
    pub(crate) channels: Vec<ChannelId>,
    pub(crate) can_free: bool,

    pub origin: Vec3,
    /// Compared against the listener id to find the listener's own sounds.
    pub listener_id: i32,
    /// Overrides layered over every shader started here.
    pub parms: SoundShaderParms,

    /// Meters, straight line to the listener.
    pub direct_distance: f32,
    /// Meters, routed through portals when occluded.
    pub spatialized_distance: f32,
    pub spatialized_origin: Vec3,
    pub last_valid_portal_area: Option<i32>,
}

impl SoundEmitter {
    pub(crate) fn new(id: EmitterId) -> Self {
        Self {
            id,
            channels: Vec::with_capacity(MAX_CHANNELS_PER_EMITTER),
            can_free: false,
            origin: VEC3_ORIGIN,
            listener_id: 0,
            parms: SoundShaderParms::default(),
            direct_distance: 0.0,
            spatialized_distance: 0.0,
            spatialized_origin: VEC3_ORIGIN,
            last_valid_portal_area: None,
        }
    }

    /// Back to the freshly allocated state. The channel list must already be empty.
    pub(crate) fn init(&mut self, id: EmitterId) {
        debug_assert!(self.channels.is_empty(), "emitter {} init with live channels", id);
        *self = SoundEmitter::new(id);
    }

    pub fn id(&self) -> EmitterId {
        self.id
    }

    pub fn index(&self) -> u32 {
        self.id.index() as u32
    }

    pub fn channel_ids(&self) -> &[ChannelId] {
        &self.channels
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn is_pending_free(&self) -> bool {
        self.can_free
    }
}

/// An emitter borrowed together with its world.
pub struct Emitter<'w> {
    pub(crate) emitter: &'w mut SoundEmitter,
    pub(crate) world: &'w mut WorldState,
}

impl<'w> Emitter<'w> {
    pub fn id(&self) -> EmitterId {
        self.emitter.id
    }

    pub fn state(&self) -> &SoundEmitter {
        self.emitter
    }

    pub fn channels(&self) -> impl Iterator<Item = &SoundChannel> + '_ {
        let world = &*self.world;
        self.emitter.channels.iter().filter_map(move |&id| world.channels.get(id))
    }

    /// Return every channel to the pool and re-init.
    pub fn reset(&mut self) {
        for id in self.emitter.channels.drain(..) {
            self.world.channels.remove(id);
        }
        self.emitter.init(self.emitter.id);
    }

    /// Mark for recycling once the channels drain. `immediate` stops them now.
    pub fn free(&mut self, immediate: bool) {
        if self.emitter.can_free {
            com_dprintf(&format!("emitter {} freed twice\n", self.emitter.id));
            return;
        }
        let index = self.emitter.index();
        self.world.record(|| SoundDemoCommand::Free { index, immediate });

        if immediate {
            self.reset();
        }
        self.emitter.can_free = true;
    }

    pub fn update_emitter(&mut self, origin: &Vec3, listener_id: i32, parms: &SoundShaderParms) {
        let index = self.emitter.index();
        self.world.record(|| SoundDemoCommand::Update {
            index,
            origin: *origin,
            listener_id,
            parms: *parms,
        });

        self.emitter.origin = *origin;
        self.emitter.listener_id = listener_id;
        self.emitter.parms = *parms;
    }

    /// Remove finished channels. True when the emitter is empty and may be recycled.
    pub fn check_for_completion(&mut self, current_time: i32) -> bool {
        let world = &mut *self.world;
        for i in (0..self.emitter.channels.len()).rev() {
            let id = self.emitter.channels[i];
            let done = world.channels.get(id).map_or(true, |chan| chan.check_for_completion(current_time));
            if done {
                self.emitter.channels.remove(i);
                world.channels.remove(id);
            }
        }
        self.emitter.can_free && self.emitter.channels.is_empty()
    }

    /// Spatialize and compute this frame's channel volumes.
    pub fn update(&mut self, current_time: i32) {
        let emitter = &mut *self.emitter;
        let world = &mut *self.world;

        if emitter.channels.is_empty() {
            return;
        }

        emitter.direct_distance = distance(&world.listener.origin, &emitter.origin) * UNITS_TO_METERS;
        emitter.spatialized_distance = emitter.direct_distance;
        emitter.spatialized_origin = emitter.origin;

        // anything that returns early below leaves the channels silent
        for &id in &emitter.channels {
            if let Some(chan) = world.channels.get_mut(id) {
                chan.volume_db = DB_SILENCE;
            }
        }

        let solo = world.toggles.single_emitter;
        if solo > 0 && solo as u32 != emitter.index() {
            return;
        }
        let Some(listener_area) = world.listener.area else {
            return;
        };
        if world.muted || !world.active {
            return;
        }

        let is_listener = emitter.listener_id == world.listener.id;
        let mut max_distance = 0.0f32;
        let mut max_distance_valid = false;
        let mut use_occlusion = false;
        if !is_listener {
            for chan in emitter.channels.iter().filter_map(|&id| world.channels.get(id)) {
                if chan.parms.flags.contains(SoundShaderFlags::GLOBAL) {
                    continue;
                }
                use_occlusion |= !chan.parms.flags.contains(SoundShaderFlags::NO_OCCLUSION);
                max_distance_valid = true;
                max_distance = max_distance.max(chan.parms.max_distance);
            }
        }
        if max_distance_valid && emitter.direct_distance >= max_distance {
            return;
        }

        if use_occlusion && world.toggles.use_occlusion {
            if let Some(spatial) = world.spatial.as_deref() {
                let sound_area = match spatial.point_in_area(&emitter.origin) {
                    Some(area) => {
                        emitter.last_valid_portal_area = Some(area);
                        Some(area)
                    }
                    None => emitter.last_valid_portal_area,
                };
                if let Some(sound_area) = sound_area {
                    if sound_area != listener_area {
                        let max_units = max_distance * METERS_TO_UNITS;
                        match spatial.resolve_portal_path(listener_area, sound_area, &emitter.origin, max_units) {
                            Some(path) => {
                                emitter.spatialized_origin = path.origin;
                                emitter.spatialized_distance = path.distance.min(max_units) * UNITS_TO_METERS;
                            }
                            None => emitter.spatialized_distance = max_distance,
                        }
                    }
                }
            }
        }

        let ctx = VolumeContext {
            spatialized_distance: emitter.spatialized_distance,
            is_listener,
        };
        for &id in &emitter.channels {
            if let Some(chan) = world.channels.get_mut(id) {
                chan.update_volume(current_time, &ctx);
            }
        }
    }

    /// Start `shader` on `channel`. Returns the length in milliseconds of
    /// what will play, 0 when nothing was started.
    pub fn start_sound(
        &mut self,
        shader: Option<&Arc<SoundShader>>,
        channel: LogicalChannel,
        diversity: f32,
        shader_flags: SoundShaderFlags,
        allow_slow: bool,
    ) -> i32 {
        let Some(shader) = shader else {
            return 0;
        };

        let index = self.emitter.index();
        self.world.record(|| SoundDemoCommand::Start {
            index,
            shader: shader.name().to_string(),
            channel,
            diversity,
            flags: shader_flags,
        });

        if self.world.toggles.no_sound {
            return 0;
        }

        let current_time = self.world.sound_time;
        let show = self.world.toggles.show_start_sound;
        if show {
            com_printf(&format!(
                "{}ms: StartSound({}:{:?}): {}: ",
                current_time,
                index,
                channel,
                shader.name()
            ));
        }

        let mut chan_parms = shader.parms.override_with(&self.emitter.parms);
        chan_parms.flags |= shader_flags;

        if shader.num_entries() == 0 {
            if show {
                com_printf("No Entries\n");
            }
            return 0;
        }

        if chan_parms.flags.contains(SoundShaderFlags::PLAY_ONCE)
            && self.channels().any(|c| c.plays(shader) && !c.check_for_completion(current_time))
        {
            if show {
                com_printf("Not started because of playOnce\n");
            }
            return 0;
        }

        // never the same sound twice with the same start time, on any channel
        if self
            .channels()
            .any(|c| c.plays(shader) && c.start_time == current_time && !c.is_force_stopped())
        {
            if show {
                com_printf("Already started this frame\n");
            }
            return 0;
        }

        if channel != LogicalChannel::Any {
            let occupied = self.emitter.channels.iter().position(|&id| {
                self.world
                    .channels
                    .get(id)
                    .is_some_and(|c| c.shader.is_some() && c.logical_channel == channel)
            });
            if let Some(i) = occupied {
                let id = self.emitter.channels.remove(i);
                if let Some(old) = self.world.channels.remove(id) {
                    if show {
                        let name = old.shader.as_ref().map_or("", |s| s.name());
                        com_printf(&format!("OVERRIDE {}: ", name));
                    }
                }
            }
        }

        let (leadin, looping) = select_samples(shader, &chan_parms, diversity, current_time);

        if self.emitter.channels.len() >= MAX_CHANNELS_PER_EMITTER {
            // last chance to release finished sounds
            self.check_for_completion(current_time);
            if self.emitter.channels.len() >= MAX_CHANNELS_PER_EMITTER {
                if show {
                    com_printf("No free emitter channels!\n");
                }
                com_dprintf(&format!("emitter {}: no free emitter channels for {}\n", index, shader.name()));
                return 0;
            }
        }

        if self.world.channels.len() >= self.world.max_channels {
            if show {
                com_printf("No free global channels!\n");
            }
            com_dprintf(&format!("no free global channels for {}\n", shader.name()));
            return 0;
        }

        let length = leadin.length_ms();
        let mut chan = SoundChannel::new(self.emitter.id);
        chan.parms = chan_parms;
        chan.shader = Some(shader.clone());
        chan.logical_channel = channel;
        chan.leadin_sample = Some(leadin.clone());
        chan.looping_sample = looping.clone();
        chan.allow_slow = allow_slow;

        // loops without an explicit leadin start at a random offset; a zero
        // length sample has no range to pick from
        let mut start_offset = 0;
        if chan.is_looping() && !shader.leadin && length > 0 {
            start_offset = self.world.rng.gen_range(0..length);
        }
        chan.start_time = current_time - start_offset;
        chan.end = if chan_parms.flags.contains(SoundShaderFlags::LOOPING) {
            ChannelEnd::Never
        } else {
            ChannelEnd::At(chan.start_time.saturating_add(length).saturating_add(CHANNEL_TAIL_MS))
        };

        let id = self.world.channels.insert(chan);
        self.emitter.channels.push(id);

        if show {
            match &looping {
                Some(l) if !Arc::ptr_eq(l, &leadin) => {
                    com_printf(&format!("Playing {} then looping {}\n", leadin.name(), l.name()))
                }
                _ => com_printf(&format!("Playing {} @ {}\n", leadin.name(), start_offset)),
            }
        }

        length
    }

    /// Stop matching channels. They are removed by the next completion pass.
    pub fn stop_sound(&mut self, channel: LogicalChannel) {
        let index = self.emitter.index();
        self.world.record(|| SoundDemoCommand::Stop { index, channel });

        let world = &mut *self.world;
        for &id in &self.emitter.channels {
            let Some(chan) = world.channels.get_mut(id) else {
                continue;
            };
            if !chan.logical_channel.matches(channel) {
                continue;
            }
            if world.toggles.show_start_sound {
                com_printf(&format!(
                    "{}ms: StopSound({}:{:?}): {}\n",
                    world.sound_time,
                    index,
                    channel,
                    chan.shader.as_ref().map_or("", |s| s.name())
                ));
            }
            chan.end = ChannelEnd::ForceStop;
        }
    }

    /// Layer `parms` over the parameters of matching channels.
    pub fn modify_sound(&mut self, channel: LogicalChannel, parms: &SoundShaderParms) {
        let index = self.emitter.index();
        self.world.record(|| SoundDemoCommand::Modify { index, channel, parms: *parms });

        let world = &mut *self.world;
        for &id in self.emitter.channels.iter().rev() {
            let Some(chan) = world.channels.get_mut(id) else {
                continue;
            };
            if !chan.logical_channel.matches(channel) {
                continue;
            }
            if world.toggles.show_start_sound {
                com_printf(&format!(
                    "{}ms: ModifySound({}:{:?}): {}\n",
                    world.sound_time,
                    index,
                    channel,
                    chan.shader.as_ref().map_or("", |s| s.name())
                ));
            }
            chan.parms = chan.parms.override_with(parms);
        }
    }

    /// Fade matching channels to `to` dB over `over` seconds, from now.
    pub fn fade_sound(&mut self, channel: LogicalChannel, to: f32, over: f32) {
        let index = self.emitter.index();
        self.world.record(|| SoundDemoCommand::Fade { index, channel, to, over });

        let over_ms = sec_to_ms(over);
        let world = &mut *self.world;
        let now = world.sound_time;
        for &id in &self.emitter.channels {
            let Some(chan) = world.channels.get_mut(id) else {
                continue;
            };
            if !chan.logical_channel.matches(channel) {
                continue;
            }
            if world.toggles.show_start_sound {
                com_printf(&format!(
                    "{}ms: FadeSound({}:{:?}): {} to {:.2}db over {:.2} seconds\n",
                    now,
                    index,
                    channel,
                    chan.shader.as_ref().map_or("", |s| s.name()),
                    to,
                    over
                ));
            }
            chan.volume_fade.fade(to - chan.parms.volume, over_ms, now);
        }
    }

    /// `Any` asks whether the emitter holds any channel at all; a specific
    /// slot asks whether its channel has not been stopped.
    pub fn currently_playing(&self, channel: LogicalChannel) -> bool {
        if channel == LogicalChannel::Any {
            return !self.emitter.channels.is_empty();
        }
        match self.channels().find(|c| c.logical_channel == channel) {
            Some(chan) => !chan.is_force_stopped(),
            None => false,
        }
    }

    /// Loudest envelope value over the channels playing now.
    pub fn current_amplitude(&self) -> f32 {
        let now = self.world.sound_time;
        let mut amplitude = 0.0f32;
        for chan in self.channels() {
            if !chan.is_active_at(now) {
                continue;
            }
            let Some(leadin) = chan.leadin_sample.as_ref() else {
                continue;
            };
            let relative = now - chan.start_time;
            let leadin_length = leadin.length_ms();
            if relative < leadin_length {
                amplitude = amplitude.max(leadin.amplitude_at(relative));
            } else if let Some(looping) = chan.looping_sample.as_ref() {
                let loop_length = looping.length_ms();
                if loop_length > 0 {
                    amplitude = amplitude.max(looping.amplitude_at((relative - leadin_length) % loop_length));
                }
            }
        }
        amplitude
    }
}

/// Pick the lead-in and loop samples for a start. Records the pick's
/// last-played time when choosing among several entries.
fn select_samples(
    shader: &SoundShader,
    parms: &SoundShaderParms,
    diversity: f32,
    current_time: i32,
) -> (Arc<SoundSample>, Option<Arc<SoundSample>>) {
    let entries = shader.entries();
    let looping = parms.flags.contains(SoundShaderFlags::LOOPING);

    if shader.leadin && looping {
        return (entries[0].clone(), entries.get(1).cloned());
    }

    let leadin = if entries.len() == 1 {
        entries[0].clone()
    } else {
        let n = entries.len() as i32;
        let mut choice;
        if parms.flags.contains(SoundShaderFlags::NO_DUPS) {
            let mut most_recent_time = 0;
            let mut most_recent = 0;
            for (i, entry) in entries.iter().enumerate() {
                let t = entry.last_played();
                if t > most_recent_time {
                    most_recent_time = t;
                    most_recent = i as i32;
                }
            }
            choice = (diversity * (n - 1) as f32) as i32;
            if choice >= most_recent {
                choice += 1;
            }
        } else {
            choice = (diversity * n as f32) as i32;
        }
        let sample = entries[choice.clamp(0, n - 1) as usize].clone();
        sample.set_last_played(current_time);
        sample
    };

    let loop_sample = looping.then(|| leadin.clone());
    (leadin, loop_sample)
}
