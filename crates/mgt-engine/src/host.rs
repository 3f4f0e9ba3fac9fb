// host.rs — the host frame loop
//
// `frame` is called with the real time elapsed since the last call. Time is
// filtered into a clamped frame time, then each subsystem and the gameplay
// hooks run once. Errors raised inside a frame come back as `HostError`:
// `Drop` and `EndGame` abandon only the current frame.

use thiserror::Error;

use mgt_common::common::{com_printf, com_set_developer};
use mgt_common::cvar::{CvarContext, CvarFlags};

use crate::context::EngineContext;
use crate::module::ModuleError;
use crate::sys::sys_double_time;

pub const MIN_FRAMETIME: f64 = 0.001;
pub const MAX_FRAMETIME: f64 = 0.1;

/// Frames averaged per `host_profile` report.
const PROFILE_FRAMES: u32 = 1000;

/// Variables owned by the sound module; changes here are forwarded to it.
pub const SOUND_CVARS: &[&str] = &[
    "s_singleEmitter",
    "s_showStartSound",
    "s_useOcclusion",
    "s_noSound",
    "s_maxChannels",
];

#[derive(Error, Debug)]
pub enum HostError {
    /// Abandon the current frame (server dropped, map failed to load, ...).
    #[error("{0}")]
    Drop(String),

    /// The game ended normally; abandon the current frame.
    #[error("end game: {0}")]
    EndGame(String),

    #[error("fatal: {0}")]
    Fatal(String),

    #[error(transparent)]
    Module(#[from] ModuleError),
}

impl HostError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, HostError::Fatal(_) | HostError::Module(_))
    }
}

/// Gameplay-side work run once per host frame.
pub trait FrameHook {
    fn frame(&mut self, ctx: &EngineContext, frametime: f64) -> Result<(), HostError>;

    /// Called after a frame was abandoned, to disconnect or reset.
    fn on_error(&mut self, _ctx: &EngineContext, _err: &HostError) -> Result<(), HostError> {
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    /// Too soon since the last frame; nothing ran.
    Skipped,
    Ran,
    /// A `Drop` or `EndGame` error cut the frame short.
    Aborted,
}

#[derive(Default)]
struct Speeds {
    time3: f64,
    profile_total: f64,
    profile_count: u32,
}

pub struct EngineHost {
    ctx: EngineContext,
    pub cvars: CvarContext,
    hooks: Vec<Box<dyn FrameHook>>,
    dedicated: bool,
    realtime: f64,
    oldrealtime: f64,
    frametime: f64,
    framecount: u64,
    in_error: bool,
    speeds: Speeds,
}

impl EngineHost {
    pub fn new(ctx: EngineContext, mut cvars: CvarContext, dedicated: bool) -> Self {
        Self::register_cvars(&mut cvars);
        Self {
            ctx,
            cvars,
            hooks: Vec::new(),
            dedicated,
            realtime: 0.0,
            oldrealtime: 0.0,
            frametime: 0.0,
            framecount: 0,
            in_error: false,
            speeds: Speeds::default(),
        }
    }

    pub fn register_cvars(cvars: &mut CvarContext) {
        cvars.register("developer", "0", CvarFlags::empty());
        cvars.register("host_framerate", "0", CvarFlags::empty());
        cvars.register("host_maxfps", "72", CvarFlags::empty());
        cvars.register("host_speeds", "0", CvarFlags::empty());
        cvars.register("host_profile", "0", CvarFlags::empty());
    }

    pub fn add_hook(&mut self, hook: Box<dyn FrameHook>) {
        self.hooks.push(hook);
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn frametime(&self) -> f64 {
        self.frametime
    }

    pub fn realtime(&self) -> f64 {
        self.realtime
    }

    pub fn framecount(&self) -> u64 {
        self.framecount
    }

    /// Accumulate `time`; false when a frame should not run yet.
    pub fn filter_time(&mut self, time: f64) -> bool {
        self.realtime += time;

        let elapsed = self.realtime - self.oldrealtime;
        let maxfps = self.cvars.variable_value("host_maxfps") as f64;
        if maxfps > 0.0 && elapsed < 1.0 / maxfps {
            return false;
        }

        self.frametime = elapsed;
        self.oldrealtime = self.realtime;

        let framerate = self.cvars.variable_value("host_framerate") as f64;
        if framerate > 0.0 {
            self.frametime = framerate;
        } else {
            self.frametime = self.frametime.clamp(MIN_FRAMETIME, MAX_FRAMETIME);
        }
        true
    }

    /// Run one host frame. `Err` is returned only for errors that must stop
    /// the host.
    pub fn frame(&mut self, time: f64) -> Result<FrameStatus, HostError> {
        if !self.cvars.variable_bool("host_profile") {
            return self.run_frame(time);
        }

        let time1 = sys_double_time();
        let status = self.run_frame(time)?;
        let time2 = sys_double_time();

        self.speeds.profile_total += time2 - time1;
        self.speeds.profile_count += 1;
        if self.speeds.profile_count >= PROFILE_FRAMES {
            let msec = (self.speeds.profile_total * 1000.0 / self.speeds.profile_count as f64) as i32;
            self.speeds.profile_total = 0.0;
            self.speeds.profile_count = 0;
            com_printf(&format!("host_profile: {:2} msec\n", msec));
        }
        Ok(status)
    }

    fn run_frame(&mut self, time: f64) -> Result<FrameStatus, HostError> {
        if !self.filter_time(time) {
            return Ok(FrameStatus::Skipped);
        }

        match self.run_subsystems() {
            Ok(()) => {
                self.framecount += 1;
                Ok(FrameStatus::Ran)
            }
            Err(err) => self.host_error(err),
        }
    }

    /// Push changed variables to the console layer and the sound module.
    fn sync_cvars(&mut self) {
        if self.cvars.take_modified("developer") {
            com_set_developer(self.cvars.variable_bool("developer"));
        }
        for name in SOUND_CVARS {
            if self.cvars.take_modified(name) {
                self.ctx.sound_cvar_set(name, self.cvars.variable_string(name));
            }
        }
    }

    fn run_subsystems(&mut self) -> Result<(), HostError> {
        self.sync_cvars();
        let speeds = self.cvars.variable_bool("host_speeds");
        let frametime = self.frametime;

        self.ctx.network_frame(frametime);
        self.ctx.input_frame(frametime);

        for hook in self.hooks.iter_mut() {
            hook.frame(&self.ctx, frametime)?;
        }

        let time1 = if speeds { sys_double_time() } else { 0.0 };
        self.ctx.game_ui_run_frame();
        let time2 = if speeds { sys_double_time() } else { 0.0 };
        self.ctx.sound_update(frametime);

        if speeds {
            let pass1 = ((time1 - self.speeds.time3) * 1000.0) as i32;
            self.speeds.time3 = sys_double_time();
            let pass2 = ((time2 - time1) * 1000.0) as i32;
            let pass3 = ((self.speeds.time3 - time2) * 1000.0) as i32;
            com_printf(&format!(
                "{:3} tot {:3} game {:3} ui {:3} snd\n",
                pass1 + pass2 + pass3,
                pass1,
                pass2,
                pass3
            ));
        }
        Ok(())
    }

    /// Recover from an error raised inside a frame.
    fn host_error(&mut self, err: HostError) -> Result<FrameStatus, HostError> {
        if self.in_error {
            return Err(HostError::Fatal(format!("host_error: recursively entered ({})", err)));
        }
        if err.is_fatal() {
            tracing::error!(error = %err, "fatal host error");
            return Err(err);
        }
        if self.dedicated {
            // dedicated servers exit on any error
            return Err(HostError::Fatal(err.to_string()));
        }

        self.in_error = true;
        match &err {
            HostError::EndGame(msg) => com_printf(&format!("host_endgame: {}\n", msg)),
            _ => com_printf(&format!("host_error: {}\n", err)),
        }
        tracing::warn!(error = %err, "frame aborted");

        for hook in self.hooks.iter_mut() {
            if let Err(inner) = hook.on_error(&self.ctx, &err) {
                return Err(HostError::Fatal(format!("host_error: recursively entered ({})", inner)));
            }
        }
        self.in_error = false;
        Ok(FrameStatus::Aborted)
    }

    /// Run frames until `max_frames` have run or a fatal error occurs.
    /// `clock` returns seconds since the previous call.
    pub fn run(&mut self, max_frames: Option<u64>, mut clock: impl FnMut() -> f64) -> Result<(), HostError> {
        loop {
            if max_frames.is_some_and(|max| self.framecount >= max) {
                return Ok(());
            }
            self.frame(clock())?;
        }
    }

    pub fn shutdown(mut self) {
        self.ctx.shutdown();
    }
}
