// channel.rs — one scheduled playback of a shader on an emitter

use std::sync::Arc;

use crate::sample::SoundSample;
use crate::shader::{SoundShader, SoundShaderFlags, SoundShaderParms};
use crate::slot::SlotId;

/// Volume floor. Anything at or below this is inaudible.
pub const DB_SILENCE: f32 = -60.0;

/// Extra time a one-shot channel is kept after its sample ends.
pub const CHANNEL_TAIL_MS: i32 = 100;

pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 || !linear.is_finite() {
        return DB_SILENCE;
    }
    (20.0 * linear.log10()).max(DB_SILENCE)
}

/// Logical channel slot used for preemption and queries.
#[repr(i32)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LogicalChannel {
    /// Matches every slot, never preempts.
    #[default]
    Any = 0,
    Weapon = 1,
    Voice = 2,
    Item = 3,
    Body = 4,
    Stream = 5,
    Static = 6,
}

impl LogicalChannel {
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(Self::Any),
            1 => Some(Self::Weapon),
            2 => Some(Self::Voice),
            3 => Some(Self::Item),
            4 => Some(Self::Body),
            5 => Some(Self::Stream),
            6 => Some(Self::Static),
            _ => None,
        }
    }

    /// True when a channel on `self` is selected by a request for `slot`.
    pub fn matches(self, slot: LogicalChannel) -> bool {
        slot == LogicalChannel::Any || self == slot
    }
}

/// When a channel stops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChannelEnd {
    /// Looping; plays until stopped.
    #[default]
    Never,
    /// Stopped; removed by the next completion pass.
    ForceStop,
    At(i32),
}

/// Linear dB envelope, evaluated purely from timestamps.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VolumeFade {
    pub start_volume: f32,
    pub end_volume: f32,
    pub start_time: i32,
    pub end_time: i32,
}

impl VolumeFade {
    pub fn clear(&mut self) {
        *self = VolumeFade::default();
    }

    /// Fade from wherever the envelope is at `now` to `to_db` over `length_ms`.
    pub fn fade(&mut self, to_db: f32, length_ms: i32, now: i32) {
        let length_ms = length_ms.max(0);
        // already heading there at this rate
        if self.end_time == now.saturating_add(length_ms) && self.end_volume == to_db {
            return;
        }
        self.start_volume = self.volume_at(now);
        self.end_volume = to_db;
        self.start_time = now;
        self.end_time = now.saturating_add(length_ms);
    }

    pub fn volume_at(&self, time: i32) -> f32 {
        let duration = self.end_time - self.start_time;
        if duration <= 0 || time >= self.end_time {
            self.end_volume
        } else if time > self.start_time {
            let t = (time - self.start_time) as f32 / duration as f32;
            self.start_volume + (self.end_volume - self.start_volume) * t
        } else {
            self.start_volume
        }
    }
}

/// Emitter state a channel needs to finish its volume.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VolumeContext {
    /// Meters, after portal routing.
    pub spatialized_distance: f32,
    /// The emitter is the listener itself.
    pub is_listener: bool,
}

#[derive(Clone, Debug)]
pub struct SoundChannel {
    pub emitter: SlotId,
    pub parms: SoundShaderParms,
    pub shader: Option<Arc<SoundShader>>,
    pub logical_channel: LogicalChannel,
    pub leadin_sample: Option<Arc<SoundSample>>,
    pub looping_sample: Option<Arc<SoundSample>>,
    pub allow_slow: bool,
    pub start_time: i32,
    pub end: ChannelEnd,
    pub volume_fade: VolumeFade,
    /// Result of the last UpdateVolume.
    pub volume_db: f32,
}

impl SoundChannel {
    pub fn new(emitter: SlotId) -> Self {
        Self {
            emitter,
            parms: SoundShaderParms::default(),
            shader: None,
            logical_channel: LogicalChannel::Any,
            leadin_sample: None,
            looping_sample: None,
            allow_slow: false,
            start_time: 0,
            end: ChannelEnd::Never,
            volume_fade: VolumeFade::default(),
            volume_db: DB_SILENCE,
        }
    }

    pub fn plays(&self, shader: &Arc<SoundShader>) -> bool {
        self.shader.as_ref().is_some_and(|s| Arc::ptr_eq(s, shader))
    }

    pub fn is_looping(&self) -> bool {
        self.parms.flags.contains(SoundShaderFlags::LOOPING) && self.looping_sample.is_some()
    }

    pub fn is_force_stopped(&self) -> bool {
        self.end == ChannelEnd::ForceStop
    }

    pub fn check_for_completion(&self, current_time: i32) -> bool {
        match self.end {
            ChannelEnd::Never => false,
            ChannelEnd::ForceStop => true,
            ChannelEnd::At(end) => current_time >= end,
        }
    }

    /// Inside [start, end) at `time`.
    pub fn is_active_at(&self, time: i32) -> bool {
        if time < self.start_time {
            return false;
        }
        match self.end {
            ChannelEnd::Never => true,
            ChannelEnd::ForceStop => false,
            ChannelEnd::At(end) => time < end,
        }
    }

    pub fn update_volume(&mut self, current_time: i32, ctx: &VolumeContext) {
        self.volume_db = self.compute_volume(current_time, ctx);
    }

    fn compute_volume(&self, current_time: i32, ctx: &VolumeContext) -> f32 {
        if self.leadin_sample.is_none() || !self.is_active_at(current_time) {
            return DB_SILENCE;
        }

        let flags = self.parms.flags;
        if flags.contains(SoundShaderFlags::PRIVATE) && !ctx.is_listener {
            return DB_SILENCE;
        }
        if flags.contains(SoundShaderFlags::ANTI_PRIVATE) && ctx.is_listener {
            return DB_SILENCE;
        }

        let mut volume = self.parms.volume + self.volume_fade.volume_at(current_time);

        // the listener's own sounds are never attenuated
        if !flags.contains(SoundShaderFlags::GLOBAL) && !ctx.is_listener {
            let d = ctx.spatialized_distance;
            let min = self.parms.min_distance;
            let max = self.parms.max_distance;
            if d >= max {
                return DB_SILENCE;
            }
            if d > min && max > min {
                let f = (d - min) / (max - min);
                volume += linear_to_db((1.0 - f) * (1.0 - f));
            }
        }

        if !volume.is_finite() {
            return DB_SILENCE;
        }
        volume.max(DB_SILENCE)
    }
}
