// common.rs — console print layer used by the host and by every module
//
// Everything printed goes out as a tracing event on the "console" target, so
// the installed subscriber decides where it lands. A redirect buffer can
// capture output instead (used to hand command output back to a caller).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

pub const MAXPRINTMSG: usize = 4096;

/// Distribution name and version.
pub const DISTNAME: &str = "MGT";
pub const DISTVER: f32 = 0.1;

// ============================================================
// Redirect buffer for Com_Printf
// ============================================================

static RD_BUFFER: Mutex<Option<String>> = parking_lot::const_mutex(None);

/// Mirrors the "developer" cvar so modules without a cvar table can gate output.
static DEVELOPER: AtomicBool = AtomicBool::new(false);

/// Receives printed text instead of the local tracing dispatcher. A loaded
/// module installs one that forwards to the engine's `MGTSystem001` printer;
/// the second argument is true for developer prints.
pub type PrintHook = Arc<dyn Fn(&str, bool) + Send + Sync>;

static PRINT_HOOK: Mutex<Option<PrintHook>> = parking_lot::const_mutex(None);

pub fn com_set_print_hook(hook: Option<PrintHook>) {
    *PRINT_HOOK.lock() = hook;
}

/// Begin redirecting printf output into a buffer.
pub fn com_begin_redirect() {
    *RD_BUFFER.lock() = Some(String::new());
}

/// End redirect and return the captured output.
pub fn com_end_redirect() -> Option<String> {
    RD_BUFFER.lock().take()
}

pub fn com_set_developer(enabled: bool) {
    DEVELOPER.store(enabled, Ordering::Relaxed);
}

pub fn com_developer() -> bool {
    DEVELOPER.load(Ordering::Relaxed)
}

// ============================================================
// Com_Printf / Com_DPrintf
// ============================================================

/// General-purpose print. Appends to the redirect buffer when one is active,
/// otherwise emits an info event.
pub fn com_printf(msg: &str) {
    let msg = truncate(msg);
    {
        let mut buf = RD_BUFFER.lock();
        if let Some(ref mut s) = *buf {
            s.push_str(msg);
            return;
        }
    }
    let hook = PRINT_HOOK.lock().clone();
    if let Some(hook) = hook {
        hook(msg, false);
        return;
    }
    emit(msg, false);
}

/// Developer-only print. With a print hook installed the receiving side
/// decides whether developer output is shown.
pub fn com_dprintf(msg: &str) {
    let msg = truncate(msg);
    let hook = PRINT_HOOK.lock().clone();
    if let Some(hook) = hook {
        hook(msg, true);
        return;
    }
    com_print_local(msg, true);
}

/// Print on this side of the module boundary, ignoring any print hook. The
/// engine's `MGTSystem001` printers land here so a statically linked module
/// forwarding to them cannot loop back into its own hook.
pub fn com_print_local(msg: &str, developer: bool) {
    let msg = truncate(msg);
    if developer && !com_developer() {
        return;
    }
    {
        let mut buf = RD_BUFFER.lock();
        if let Some(ref mut s) = *buf {
            s.push_str(msg);
            return;
        }
    }
    emit(msg, developer);
}

fn emit(msg: &str, developer: bool) {
    let line = msg.trim_end_matches('\n');
    if line.is_empty() {
        return;
    }
    if developer {
        tracing::debug!(target: "console", "{}", line);
    } else {
        tracing::info!(target: "console", "{}", line);
    }
}

fn truncate(msg: &str) -> &str {
    if msg.len() < MAXPRINTMSG {
        return msg;
    }
    let mut end = MAXPRINTMSG - 1;
    while !msg.is_char_boundary(end) {
        end -= 1;
    }
    &msg[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    // The redirect buffer and developer flag are process-wide.
    static SERIAL: Mutex<()> = parking_lot::const_mutex(());

    #[test]
    fn test_redirect_captures_printf() {
        let _g = SERIAL.lock();
        com_begin_redirect();
        com_printf("hello ");
        com_printf("world\n");
        assert_eq!(com_end_redirect().as_deref(), Some("hello world\n"));
        assert!(com_end_redirect().is_none());
    }

    #[test]
    fn test_dprintf_gated_on_developer() {
        let _g = SERIAL.lock();
        com_set_developer(false);
        com_begin_redirect();
        com_dprintf("hidden\n");
        assert_eq!(com_end_redirect().as_deref(), Some(""));

        com_set_developer(true);
        com_begin_redirect();
        com_dprintf("shown\n");
        assert_eq!(com_end_redirect().as_deref(), Some("shown\n"));
        com_set_developer(false);
    }

    #[test]
    fn test_print_hook_receives_output() {
        let _g = SERIAL.lock();
        let seen: Arc<Mutex<Vec<(String, bool)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        com_set_print_hook(Some(Arc::new(move |msg: &str, dev: bool| sink.lock().push((msg.to_string(), dev)))));
        com_printf("loaded\n");
        com_dprintf("detail\n");
        com_set_print_hook(None);

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], ("loaded\n".to_string(), false));
        assert_eq!(seen[1], ("detail\n".to_string(), true));
    }

    #[test]
    fn test_print_local_skips_hook() {
        let _g = SERIAL.lock();
        let hits = Arc::new(Mutex::new(0));
        let sink = hits.clone();
        com_set_print_hook(Some(Arc::new(move |_: &str, _: bool| *sink.lock() += 1)));
        com_begin_redirect();
        com_print_local("engine side\n", false);
        com_print_local("dev only\n", true);
        let out = com_end_redirect();
        com_set_print_hook(None);

        assert_eq!(*hits.lock(), 0);
        assert_eq!(out.as_deref(), Some("engine side\n"));
    }

    #[test]
    fn test_truncate_long_message() {
        let long = "x".repeat(MAXPRINTMSG * 2);
        assert_eq!(truncate(&long).len(), MAXPRINTMSG - 1);
        assert_eq!(truncate("short"), "short");
    }
}
