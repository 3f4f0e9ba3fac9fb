// mgt-host — engine entry point
//
//   mgt-host [-basedir dir] [-game mod] [-nosound] [-dedicated] [-frames N]
//            [+set name value ...]
//
// Modules are searched for in <basedir>/<game>/bin, then <basedir>/bin, then
// <basedir>. The sound system is also linked in and used when no
// libsoundsystem is found on disk.

use std::path::PathBuf;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use mgt_common::common::{com_printf, com_set_developer, DISTNAME, DISTVER};
use mgt_common::cvar::CvarContext;
use mgt_engine::context::{ContextOptions, EngineContext};
use mgt_engine::host::EngineHost;
use mgt_engine::module::ModuleLoader;
use mgt_engine::sys::sys_double_time;

#[derive(Debug, PartialEq)]
struct HostArgs {
    basedir: PathBuf,
    game: String,
    no_sound: bool,
    dedicated: bool,
    frames: Option<u64>,
    /// Everything, for `+set` processing.
    args: Vec<String>,
}

fn parse_args(args: Vec<String>) -> HostArgs {
    let mut parsed = HostArgs {
        basedir: PathBuf::from("."),
        game: "valve".to_string(),
        no_sound: false,
        dedicated: false,
        frames: None,
        args: Vec::new(),
    };

    let mut i = 0;
    while i < args.len() {
        let next = args.get(i + 1);
        match (args[i].as_str(), next) {
            ("-basedir", Some(dir)) => {
                parsed.basedir = PathBuf::from(dir);
                i += 1;
            }
            ("-game", Some(game)) => {
                parsed.game = game.clone();
                i += 1;
            }
            ("-frames", Some(n)) => {
                parsed.frames = n.parse().ok();
                i += 1;
            }
            ("-nosound", _) => parsed.no_sound = true,
            ("-dedicated", _) => parsed.dedicated = true,
            _ => {}
        }
        i += 1;
    }
    parsed.args = args;
    parsed
}

fn module_loader(args: &HostArgs) -> ModuleLoader {
    let mut loader = ModuleLoader::new(vec![
        args.basedir.join(&args.game).join("bin"),
        args.basedir.join("bin"),
        args.basedir.clone(),
    ]);
    loader.register_builtin("soundsystem", soundsystem::CreateInterface);
    loader
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = parse_args(std::env::args().skip(1).collect());

    let mut cvars = CvarContext::new();
    EngineHost::register_cvars(&mut cvars);
    cvars.apply_command_line(&args.args);
    com_set_developer(cvars.variable_bool("developer"));

    com_printf(&format!("{} v{:.1}\n", DISTNAME, DISTVER));

    let options = ContextOptions {
        no_sound: args.no_sound,
        dedicated: args.dedicated,
    };
    let ctx = match EngineContext::init_with_cvars(module_loader(&args), options, &cvars) {
        Ok(ctx) => ctx,
        Err(err) => {
            tracing::error!(error = %err, "engine init failed");
            return ExitCode::FAILURE;
        }
    };

    let mut host = EngineHost::new(ctx, cvars, args.dedicated);
    com_printf("====== engine initialized ======\n");

    let mut last = sys_double_time();
    let result = host.run(args.frames, || {
        let now = sys_double_time();
        let elapsed = now - last;
        last = now;
        if elapsed < 0.001 {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        elapsed
    });
    host.shutdown();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "host stopped");
            ExitCode::FAILURE
        }
    }
}
