// Latched sound variables from the command line size the channel pool.

use mgt_common::cvar::CvarContext;
use mgt_engine::context::{ContextOptions, EngineContext};
use mgt_engine::host::EngineHost;
use mgt_engine::module::ModuleLoader;

fn loader() -> ModuleLoader {
    let dir = std::env::temp_dir().join("mgt-no-modules-here");
    let mut loader = ModuleLoader::new(vec![dir]);
    loader.register_builtin("soundsystem", soundsystem::CreateInterface);
    loader
}

fn max_channels() -> Option<usize> {
    soundsystem::with_sound_system(|sys| sys.current_world_mut().map_or(0, |w| w.max_channels()))
}

#[test]
fn test_command_line_max_channels() {
    let mut cvars = CvarContext::new();
    EngineHost::register_cvars(&mut cvars);
    cvars.apply_command_line(&["+set".to_string(), "s_maxChannels".to_string(), "8".to_string()]);

    let options = ContextOptions { no_sound: false, dedicated: true };
    let ctx = EngineContext::init_with_cvars(loader(), options, &cvars).unwrap();
    assert_eq!(max_channels(), Some(8));

    let mut host = EngineHost::new(ctx, cvars, true);
    host.cvars.set("host_maxfps", "0");
    host.frame(0.02).unwrap();
    // the first frame forwards the same value again; nothing is latched
    assert_eq!(max_channels(), Some(8));

    host.shutdown();
    assert_eq!(max_channels(), None);
}
