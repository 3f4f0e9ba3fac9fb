// mgt-soundsystem — the sound system module (libsoundsystem)
//
// Built as a dynamic library the engine host loads at startup. The module
// exports a single function `CreateInterface`; asking it for
// `MGTSoundSystem001` yields the `SoundSystemExport` table below. During
// `Init` the module asks the engine's factory for `MGTSystem001` and routes
// its console output through it.

#![allow(non_snake_case)]

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;

use mgt_common::common::{com_dprintf, com_printf, com_set_print_hook};
use mgt_common::cvar::CvarContext;
use mgt_common::interface::{
    CreateInterfaceFn, InterfaceRegistry, SoundSystemExport, SystemExport, IFACE_OK,
    SYSTEM_INTERFACE_VERSION,
};
use mgt_sound::system::SoundSystem;
use mgt_sound::world::SoundToggles;

// ============================================================
// Global state
// ============================================================

/// Engine functions resolved from `MGTSystem001`.
#[derive(Clone, Copy)]
struct EngineImport {
    printf: Option<unsafe extern "C" fn(msg: *const c_char)>,
    dev_printf: Option<unsafe extern "C" fn(msg: *const c_char)>,
}

/// A running sound system, between Init and Shutdown.
struct Running {
    system: SoundSystem,
    /// Sub-millisecond remainder carried between updates.
    msec_frac: f64,
}

/// Module variables outlive a Shutdown, so latched values reach the next Init.
struct ModuleState {
    cvars: CvarContext,
    running: Option<Running>,
}

impl ModuleState {
    fn new() -> Self {
        let mut cvars = CvarContext::new();
        SoundToggles::register_cvars(&mut cvars);
        Self { cvars, running: None }
    }
}

static STATE: LazyLock<Mutex<ModuleState>> = LazyLock::new(|| Mutex::new(ModuleState::new()));

static SOUND_EXPORT: SoundSystemExport = SoundSystemExport {
    Init: Some(snd_init),
    Shutdown: Some(snd_shutdown),
    Update: Some(snd_update),
    SetMute: Some(snd_set_mute),
    CvarSet: Some(snd_cvar_set),
};

static EXPOSED: LazyLock<InterfaceRegistry> = LazyLock::new(|| {
    let mut r = InterfaceRegistry::new();
    r.expose(&SOUND_EXPORT);
    r
});

// ============================================================
// CreateInterface: the module entry point
// ============================================================

/// # Safety
/// `name` must be null or a NUL-terminated string; `return_code` must be null
/// or valid for a write.
#[no_mangle]
pub unsafe extern "C" fn CreateInterface(name: *const c_char, return_code: *mut c_int) -> *mut c_void {
    EXPOSED.create_interface(name, return_code)
}

/// Run `f` against the live sound system, if the module is initialized.
/// In-process callers (the client game layer) use this instead of the C table.
pub fn with_sound_system<R>(f: impl FnOnce(&mut SoundSystem) -> R) -> Option<R> {
    let mut state = STATE.lock();
    state.running.as_mut().map(|running| f(&mut running.system))
}

// ============================================================
// Export table functions
// ============================================================

unsafe fn resolve_engine(engine_factory: CreateInterfaceFn) -> Option<EngineImport> {
    let Ok(version) = CString::new(SYSTEM_INTERFACE_VERSION) else {
        return None;
    };
    let mut rc: c_int = 0;
    let ptr = engine_factory(version.as_ptr(), &mut rc) as *const SystemExport;
    if ptr.is_null() || rc != IFACE_OK {
        return None;
    }
    let sys = &*ptr;
    Some(EngineImport {
        printf: sys.Printf,
        dev_printf: sys.DevPrintf,
    })
}

fn install_print_hook(engine: EngineImport) {
    com_set_print_hook(Some(Arc::new(move |msg: &str, developer: bool| {
        let func = if developer { engine.dev_printf } else { engine.printf };
        let Some(func) = func else {
            return;
        };
        let c_msg = CString::new(msg.replace('\0', "")).unwrap_or_default();
        unsafe { func(c_msg.as_ptr()) };
    })));
}

/// Returns 1 on success, 0 when the engine does not provide `MGTSystem001`.
unsafe extern "C" fn snd_init(engine_factory: CreateInterfaceFn) -> c_int {
    let Some(engine) = resolve_engine(engine_factory) else {
        tracing::error!(version = SYSTEM_INTERFACE_VERSION, "soundsystem: engine interface missing");
        return 0;
    };

    let mut state = STATE.lock();
    if state.running.is_some() {
        return 1;
    }

    install_print_hook(engine);

    state.cvars.get_latched_vars();
    let mut system = SoundSystem::new(SoundSystem::config_from_cvars(&state.cvars));
    system.set_toggles(SoundToggles::from_cvars(&state.cvars));
    let world = system.alloc_world();
    system.set_current_world(Some(world));

    com_printf(&format!(
        "------- sound initialization -------\n{} channels\n",
        system.world(world).map_or(0, |w| w.max_channels())
    ));

    state.running = Some(Running { system, msec_frac: 0.0 });
    1
}

unsafe extern "C" fn snd_shutdown() {
    let running = STATE.lock().running.take();
    if let Some(mut running) = running {
        running.system.stop_all_sounds();
        com_printf("sound shutdown\n");
    }
    com_set_print_hook(None);
}

unsafe extern "C" fn snd_update(frametime: f64) {
    let mut state = STATE.lock();
    let ModuleState { cvars, running } = &mut *state;
    let Some(running) = running.as_mut() else {
        return;
    };
    if !frametime.is_finite() || frametime < 0.0 {
        com_dprintf(&format!("sound update: bad frametime {}\n", frametime));
        return;
    }

    let total = running.msec_frac + frametime * 1000.0;
    let msec = total.floor();
    running.msec_frac = total - msec;

    running.system.set_toggles(SoundToggles::from_cvars(cvars));
    running.system.update(msec as i32);
}

unsafe extern "C" fn snd_set_mute(mute: c_int) {
    if let Some(running) = STATE.lock().running.as_mut() {
        running.system.set_mute(mute != 0);
    }
}

/// Accepted before Init as well. While running, latched variables
/// (`s_maxChannels`) wait for the next Init.
unsafe extern "C" fn snd_cvar_set(name: *const c_char, value: *const c_char) {
    if name.is_null() || value.is_null() {
        return;
    }
    let name = CStr::from_ptr(name).to_string_lossy();
    let value = CStr::from_ptr(value).to_string_lossy();
    let mut state = STATE.lock();
    if state.running.is_some() {
        state.cvars.set_latched(&name, &value);
    } else {
        state.cvars.set(&name, &value);
    }
}
