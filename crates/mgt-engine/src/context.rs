// context.rs — subsystems the host resolved at startup
//
// Built once, then passed to everything that talks to another subsystem.
// Optional subsystems are `Option`s and every wrapper below degrades to a
// no-op (or a default answer) when the module is absent.

use std::ffi::CString;

use mgt_common::cvar::CvarContext;
use mgt_common::interface::{
    GameConsoleExport, GameUiExport, InputExport, Interface, NetworkExport, SoundSystemExport,
    GAMECONSOLE_INTERFACE_VERSION, GAMEUI_INTERFACE_VERSION, INPUT_INTERFACE_VERSION,
    NETWORK_INTERFACE_VERSION, SOUNDSYSTEM_INTERFACE_VERSION,
};

use crate::factory::Capability;
use crate::host::SOUND_CVARS;
use crate::module::{ModuleError, ModuleLoader};
use crate::sys::engine_factory;

/// One entry of the startup manifest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubsystemSpec {
    pub module: &'static str,
    pub version: &'static str,
    pub required: bool,
}

pub const SOUND_SUBSYSTEM: SubsystemSpec = SubsystemSpec {
    module: "soundsystem",
    version: SOUNDSYSTEM_INTERFACE_VERSION,
    required: true,
};
pub const NETWORK_SUBSYSTEM: SubsystemSpec = SubsystemSpec {
    module: "network",
    version: NETWORK_INTERFACE_VERSION,
    required: false,
};
pub const INPUT_SUBSYSTEM: SubsystemSpec = SubsystemSpec {
    module: "input",
    version: INPUT_INTERFACE_VERSION,
    required: false,
};
pub const GAMEUI_SUBSYSTEM: SubsystemSpec = SubsystemSpec {
    module: "gameui",
    version: GAMEUI_INTERFACE_VERSION,
    required: false,
};
/// The console lives in the GameUI module.
pub const GAMECONSOLE_SUBSYSTEM: SubsystemSpec = SubsystemSpec {
    module: "gameui",
    version: GAMECONSOLE_INTERFACE_VERSION,
    required: false,
};

#[derive(Clone, Copy, Debug, Default)]
pub struct ContextOptions {
    /// `-nosound`: the sound module becomes optional and is not loaded.
    pub no_sound: bool,
    /// `-dedicated`: no input or UI.
    pub dedicated: bool,
}

impl ContextOptions {
    /// Manifest for these options, in init order.
    pub fn manifest(&self) -> Vec<SubsystemSpec> {
        let mut specs = Vec::new();
        if !self.no_sound {
            specs.push(SOUND_SUBSYSTEM);
        }
        specs.push(NETWORK_SUBSYSTEM);
        if !self.dedicated {
            specs.push(INPUT_SUBSYSTEM);
            specs.push(GAMEUI_SUBSYSTEM);
            specs.push(GAMECONSOLE_SUBSYSTEM);
        }
        specs
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Subsystem {
    Sound,
    Network,
    Input,
    GameUi,
}

pub struct EngineContext {
    loader: ModuleLoader,
    sound: Option<Capability<SoundSystemExport>>,
    network: Option<Capability<NetworkExport>>,
    input: Option<Capability<InputExport>>,
    game_ui: Option<Capability<GameUiExport>>,
    game_console: Option<Capability<GameConsoleExport>>,
    /// Successfully initialized subsystems, in init order.
    started: Vec<Subsystem>,
}

/// Load `spec.module` and resolve `T`. Failures of optional subsystems are
/// logged and become `None`.
fn load_capability<T: Interface>(
    loader: &mut ModuleLoader,
    spec: &SubsystemSpec,
) -> Result<Option<Capability<T>>, ModuleError> {
    debug_assert_eq!(spec.version, T::VERSION);
    let resolved = loader
        .load_module(spec.module)
        .and_then(|module| Capability::<T>::resolve(&module));
    match resolved {
        Ok(cap) => Ok(Some(cap)),
        Err(err) if spec.required => {
            tracing::error!(module = spec.module, version = spec.version, error = %err, "required subsystem unavailable");
            Err(err)
        }
        Err(err) => {
            tracing::info!(module = spec.module, version = spec.version, error = %err, "optional subsystem unavailable");
            Ok(None)
        }
    }
}

/// `Init` returns nonzero on success; an absent entry counts as success.
fn init_ok(rc: Option<i32>) -> bool {
    rc.map_or(true, |rc| rc != 0)
}

impl EngineContext {
    pub fn init(loader: ModuleLoader, options: ContextOptions) -> Result<Self, ModuleError> {
        Self::init_with_cvars(loader, options, &CvarContext::new())
    }

    /// As `init`, but sound variables already present in `cvars` (from
    /// `+set`) reach the sound module before its Init.
    pub fn init_with_cvars(
        mut loader: ModuleLoader,
        options: ContextOptions,
        cvars: &CvarContext,
    ) -> Result<Self, ModuleError> {
        let mut ctx = Self {
            loader: ModuleLoader::default(),
            sound: None,
            network: None,
            input: None,
            game_ui: None,
            game_console: None,
            started: Vec::new(),
        };

        for spec in options.manifest() {
            match spec.version {
                SOUNDSYSTEM_INTERFACE_VERSION => {
                    ctx.sound = load_capability(&mut loader, &spec)?;
                }
                NETWORK_INTERFACE_VERSION => {
                    ctx.network = load_capability(&mut loader, &spec)?;
                }
                INPUT_INTERFACE_VERSION => {
                    ctx.input = load_capability(&mut loader, &spec)?;
                }
                GAMEUI_INTERFACE_VERSION => {
                    ctx.game_ui = load_capability(&mut loader, &spec)?;
                }
                GAMECONSOLE_INTERFACE_VERSION => {
                    ctx.game_console = load_capability(&mut loader, &spec)?;
                }
                _ => {}
            }
        }
        ctx.loader = loader;

        if let Err(err) = ctx.start_subsystems(cvars) {
            ctx.shutdown();
            return Err(err);
        }
        Ok(ctx)
    }

    fn start_subsystems(&mut self, cvars: &CvarContext) -> Result<(), ModuleError> {
        for name in SOUND_CVARS {
            if let Some(var) = cvars.find_var(name) {
                self.sound_cvar_set(name, &var.string);
            }
        }
        if let Some(sound) = &self.sound {
            // SAFETY: engine_factory outlives every module.
            let rc = sound.Init.map(|f| unsafe { f(engine_factory) });
            if !init_ok(rc) {
                return Err(ModuleError::InitFailed(SOUND_SUBSYSTEM.module.to_string()));
            }
            self.started.push(Subsystem::Sound);
        }

        if let Some(net) = &self.network {
            let rc = net.0.Init.map(|f| unsafe { f(engine_factory) });
            if init_ok(rc) {
                self.started.push(Subsystem::Network);
            } else {
                tracing::warn!(module = NETWORK_SUBSYSTEM.module, "init failed, continuing without it");
                self.network = None;
            }
        }

        if let Some(input) = &self.input {
            let rc = input.0.Init.map(|f| unsafe { f(engine_factory) });
            if init_ok(rc) {
                self.started.push(Subsystem::Input);
            } else {
                tracing::warn!(module = INPUT_SUBSYSTEM.module, "init failed, continuing without it");
                self.input = None;
            }
        }

        if let Some(ui) = &self.game_ui {
            let rc = ui.Initialize.map(|f| unsafe { f(engine_factory) });
            if init_ok(rc) {
                self.started.push(Subsystem::GameUi);
            } else {
                tracing::warn!(module = GAMEUI_SUBSYSTEM.module, "init failed, continuing without it");
                self.game_ui = None;
                self.game_console = None;
            }
        }
        Ok(())
    }

    /// Shut started subsystems down in reverse order, then release modules.
    /// Safe to call more than once.
    pub fn shutdown(&mut self) {
        while let Some(sub) = self.started.pop() {
            tracing::debug!(subsystem = ?sub, "shutdown");
            let shutdown = match sub {
                Subsystem::Sound => self.sound.as_ref().and_then(|s| s.Shutdown),
                Subsystem::Network => self.network.as_ref().and_then(|n| n.0.Shutdown),
                Subsystem::Input => self.input.as_ref().and_then(|i| i.0.Shutdown),
                Subsystem::GameUi => self.game_ui.as_ref().and_then(|u| u.Shutdown),
            };
            if let Some(f) = shutdown {
                unsafe { f() };
            }
        }

        self.game_console = None;
        self.game_ui = None;
        self.input = None;
        self.network = None;
        self.sound = None;
        let names: Vec<String> = self.loader.loaded_names().into_iter().map(str::to_string).collect();
        for name in names {
            self.loader.unload_module(&name);
        }
    }

    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    pub fn has_sound(&self) -> bool {
        self.sound.is_some()
    }

    pub fn has_network(&self) -> bool {
        self.network.is_some()
    }

    pub fn has_input(&self) -> bool {
        self.input.is_some()
    }

    pub fn has_game_ui(&self) -> bool {
        self.game_ui.is_some()
    }

    pub fn has_game_console(&self) -> bool {
        self.game_console.is_some()
    }

    // ============================================================
    // Sound
    // ============================================================

    pub fn sound_update(&self, frametime: f64) {
        if let Some(f) = self.sound.as_ref().and_then(|s| s.Update) {
            unsafe { f(frametime) };
        }
    }

    pub fn sound_set_mute(&self, mute: bool) {
        if let Some(f) = self.sound.as_ref().and_then(|s| s.SetMute) {
            unsafe { f(mute as i32) };
        }
    }

    pub fn sound_cvar_set(&self, name: &str, value: &str) {
        let Some(f) = self.sound.as_ref().and_then(|s| s.CvarSet) else {
            return;
        };
        let (Ok(name), Ok(value)) = (CString::new(name), CString::new(value)) else {
            return;
        };
        unsafe { f(name.as_ptr(), value.as_ptr()) };
    }

    // ============================================================
    // Network / input
    // ============================================================

    pub fn network_frame(&self, frametime: f64) {
        if let Some(f) = self.network.as_ref().and_then(|n| n.0.Frame) {
            unsafe { f(frametime) };
        }
    }

    pub fn input_frame(&self, frametime: f64) {
        if let Some(f) = self.input.as_ref().and_then(|i| i.0.Frame) {
            unsafe { f(frametime) };
        }
    }

    // ============================================================
    // GameUI / console
    // ============================================================

    pub fn game_ui_run_frame(&self) {
        if let Some(f) = self.game_ui.as_ref().and_then(|u| u.RunFrame) {
            unsafe { f() };
        }
    }

    pub fn activate_game_ui(&self) -> bool {
        self.game_ui
            .as_ref()
            .and_then(|u| u.ActivateGameUI)
            .is_some_and(|f| unsafe { f() } != 0)
    }

    pub fn activate_demo_ui(&self) -> bool {
        self.game_ui
            .as_ref()
            .and_then(|u| u.ActivateDemoUI)
            .is_some_and(|f| unsafe { f() } != 0)
    }

    /// False when no UI is loaded.
    pub fn has_exclusive_input(&self) -> bool {
        self.game_ui
            .as_ref()
            .and_then(|u| u.HasExclusiveInput)
            .is_some_and(|f| unsafe { f() } != 0)
    }

    pub fn console_activate(&self) {
        if let Some(f) = self.game_console.as_ref().and_then(|c| c.Activate) {
            unsafe { f() };
        }
    }

    pub fn console_visible(&self) -> bool {
        self.game_console
            .as_ref()
            .and_then(|c| c.IsConsoleVisible)
            .is_some_and(|f| unsafe { f() } != 0)
    }

    pub fn console_printf(&self, msg: &str) {
        let Some(f) = self.game_console.as_ref().and_then(|c| c.Printf) else {
            return;
        };
        if let Ok(msg) = CString::new(msg) {
            unsafe { f(msg.as_ptr()) };
        }
    }
}

impl Drop for EngineContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}
