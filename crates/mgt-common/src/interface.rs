// interface.rs — versioned interface factory ABI
//
// Every subsystem module exports a single `CreateInterface` entry point.
// The engine (and other modules) ask it for an interface by an opaque ASCII
// version token; the module answers with a pointer to a `#[repr(C)]` table of
// function pointers, or null if it does not know that exact token.

#![allow(non_snake_case)]

use std::ffi::{c_char, c_int, c_void, CStr};
use std::ptr::NonNull;

// ============================================================
// Factory ABI
// ============================================================

/// `void *CreateInterface(const char *name, int *returnCode)`
pub type CreateInterfaceFn =
    unsafe extern "C" fn(name: *const c_char, return_code: *mut c_int) -> *mut c_void;

pub const IFACE_OK: c_int = 0;
pub const IFACE_FAILED: c_int = 1;

/// Symbol every module exports.
pub const CREATE_INTERFACE_PROC_NAME: &str = "CreateInterface";

// Version tokens. Opaque; only exact matches resolve.
pub const SYSTEM_INTERFACE_VERSION: &str = "MGTSystem001";
pub const SOUNDSYSTEM_INTERFACE_VERSION: &str = "MGTSoundSystem001";
pub const NETWORK_INTERFACE_VERSION: &str = "MGTNetwork001";
pub const INPUT_INTERFACE_VERSION: &str = "MGTInput001";
pub const GAMEUI_INTERFACE_VERSION: &str = "MGTGameUI001";
pub const GAMECONSOLE_INTERFACE_VERSION: &str = "MGTGameConsole001";

/// A `#[repr(C)]` interface table that can be handed across a module boundary.
///
/// # Safety
/// Implementors must be `#[repr(C)]` (or transparent over such a type) and
/// `VERSION` must name exactly one layout.
pub unsafe trait Interface: 'static {
    const VERSION: &'static str;
}

// ============================================================
// Interface tables
// ============================================================

/// Exposed by the engine to its modules.
#[repr(C)]
pub struct SystemExport {
    pub Printf: Option<unsafe extern "C" fn(msg: *const c_char)>,
    pub DevPrintf: Option<unsafe extern "C" fn(msg: *const c_char)>,
    pub GetDoubleTime: Option<unsafe extern "C" fn() -> f64>,
}

unsafe impl Interface for SystemExport {
    const VERSION: &'static str = SYSTEM_INTERFACE_VERSION;
}

#[repr(C)]
pub struct SoundSystemExport {
    pub Init: Option<unsafe extern "C" fn(engine_factory: CreateInterfaceFn) -> c_int>,
    pub Shutdown: Option<unsafe extern "C" fn()>,
    /// Advance the sound clock by `frametime` seconds and update the current world.
    pub Update: Option<unsafe extern "C" fn(frametime: f64)>,
    pub SetMute: Option<unsafe extern "C" fn(mute: c_int)>,
    pub CvarSet: Option<unsafe extern "C" fn(name: *const c_char, value: *const c_char)>,
}

unsafe impl Interface for SoundSystemExport {
    const VERSION: &'static str = SOUNDSYSTEM_INTERFACE_VERSION;
}

/// Common shape of the simple per-frame subsystems.
#[repr(C)]
pub struct SubsystemExport {
    pub Init: Option<unsafe extern "C" fn(engine_factory: CreateInterfaceFn) -> c_int>,
    pub Shutdown: Option<unsafe extern "C" fn()>,
    pub Frame: Option<unsafe extern "C" fn(frametime: f64)>,
}

#[repr(transparent)]
pub struct NetworkExport(pub SubsystemExport);

unsafe impl Interface for NetworkExport {
    const VERSION: &'static str = NETWORK_INTERFACE_VERSION;
}

#[repr(transparent)]
pub struct InputExport(pub SubsystemExport);

unsafe impl Interface for InputExport {
    const VERSION: &'static str = INPUT_INTERFACE_VERSION;
}

#[repr(C)]
pub struct GameUiExport {
    pub Initialize: Option<unsafe extern "C" fn(engine_factory: CreateInterfaceFn) -> c_int>,
    pub Shutdown: Option<unsafe extern "C" fn()>,
    pub RunFrame: Option<unsafe extern "C" fn()>,
    pub ActivateGameUI: Option<unsafe extern "C" fn() -> c_int>,
    pub ActivateDemoUI: Option<unsafe extern "C" fn() -> c_int>,
    pub HasExclusiveInput: Option<unsafe extern "C" fn() -> c_int>,
}

unsafe impl Interface for GameUiExport {
    const VERSION: &'static str = GAMEUI_INTERFACE_VERSION;
}

#[repr(C)]
pub struct GameConsoleExport {
    pub Activate: Option<unsafe extern "C" fn()>,
    pub IsConsoleVisible: Option<unsafe extern "C" fn() -> c_int>,
    pub Printf: Option<unsafe extern "C" fn(msg: *const c_char)>,
}

unsafe impl Interface for GameConsoleExport {
    const VERSION: &'static str = GAMECONSOLE_INTERFACE_VERSION;
}

// ============================================================
// InterfaceRegistry: what a factory exposes
// ============================================================

/// Untyped pointer to a `'static` interface table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InterfacePtr(NonNull<c_void>);

// Interface tables are immutable statics.
unsafe impl Send for InterfacePtr {}
unsafe impl Sync for InterfacePtr {}

impl InterfacePtr {
    pub fn from_static<T: Interface>(table: &'static T) -> Self {
        Self(NonNull::from(table).cast())
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// Version token -> interface table. Backs a module's `CreateInterface`.
#[derive(Default)]
pub struct InterfaceRegistry {
    entries: Vec<(&'static str, InterfacePtr)>,
}

impl InterfaceRegistry {
    pub const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Register `ptr` under `version`, replacing an earlier registration.
    pub fn register(&mut self, version: &'static str, ptr: InterfacePtr) {
        if let Some(entry) = self.entries.iter_mut().find(|(v, _)| *v == version) {
            entry.1 = ptr;
            return;
        }
        self.entries.push((version, ptr));
    }

    pub fn expose<T: Interface>(&mut self, table: &'static T) {
        self.register(T::VERSION, InterfacePtr::from_static(table));
    }

    /// Exact-match lookup.
    pub fn find(&self, version: &str) -> Option<InterfacePtr> {
        self.entries.iter().find(|(v, _)| *v == version).map(|(_, p)| *p)
    }

    /// The body of a `CreateInterface` export.
    ///
    /// # Safety
    /// `name` must be null or a valid NUL-terminated string; `return_code`
    /// must be null or valid for a write.
    pub unsafe fn create_interface(&self, name: *const c_char, return_code: *mut c_int) -> *mut c_void {
        let found = if name.is_null() {
            None
        } else {
            CStr::from_ptr(name).to_str().ok().and_then(|v| self.find(v))
        };

        if !return_code.is_null() {
            *return_code = if found.is_some() { IFACE_OK } else { IFACE_FAILED };
        }

        match found {
            Some(ptr) => ptr.as_ptr(),
            None => std::ptr::null_mut(),
        }
    }
}
