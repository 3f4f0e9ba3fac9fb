// sys.rs — process clock and the engine's own interface factory
//
// Modules receive `engine_factory` in their Init call and query it for
// `MGTSystem001` to print through the engine's console layer.

use std::ffi::{c_char, c_int, c_void, CStr};
use std::sync::{LazyLock, OnceLock};
use std::time::Instant;

use mgt_common::common::com_print_local;
use mgt_common::interface::{InterfaceRegistry, SystemExport};

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Seconds since the first call.
pub fn sys_double_time() -> f64 {
    EPOCH.get_or_init(Instant::now).elapsed().as_secs_f64()
}

// ============================================================
// MGTSystem001
// ============================================================

unsafe fn c_message<'a>(msg: *const c_char) -> Option<std::borrow::Cow<'a, str>> {
    if msg.is_null() {
        return None;
    }
    Some(CStr::from_ptr(msg).to_string_lossy())
}

unsafe extern "C" fn sys_printf(msg: *const c_char) {
    if let Some(msg) = c_message(msg) {
        com_print_local(&msg, false);
    }
}

unsafe extern "C" fn sys_dev_printf(msg: *const c_char) {
    if let Some(msg) = c_message(msg) {
        com_print_local(&msg, true);
    }
}

unsafe extern "C" fn sys_get_double_time() -> f64 {
    sys_double_time()
}

static SYSTEM_EXPORT: SystemExport = SystemExport {
    Printf: Some(sys_printf),
    DevPrintf: Some(sys_dev_printf),
    GetDoubleTime: Some(sys_get_double_time),
};

static EXPOSED: LazyLock<InterfaceRegistry> = LazyLock::new(|| {
    let mut r = InterfaceRegistry::new();
    r.expose(&SYSTEM_EXPORT);
    r
});

/// Interfaces the engine itself provides to modules.
///
/// # Safety
/// Same contract as any module's `CreateInterface`.
pub unsafe extern "C" fn engine_factory(name: *const c_char, return_code: *mut c_int) -> *mut c_void {
    EXPOSED.create_interface(name, return_code)
}
