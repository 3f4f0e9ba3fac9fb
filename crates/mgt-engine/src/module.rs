// module.rs — locating and loading subsystem modules
//
// A module is a dynamic library exporting `CreateInterface`. Modules linked
// into the host binary can be registered as builtins under the same name;
// they resolve exactly like a loaded library but have nothing to unload.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;
use thiserror::Error;

use mgt_common::interface::{CreateInterfaceFn, CREATE_INTERFACE_PROC_NAME};

#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("module {0} not found")]
    NotFound(String),

    #[error("failed to load module {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("module {0} has no CreateInterface export")]
    MissingFactory(String),

    #[error("module {module} does not provide interface {version}")]
    InterfaceMissing { module: String, version: &'static str },

    #[error("module {0} failed to initialize")]
    InitFailed(String),
}

// ============================================================
// Module
// ============================================================

/// A loaded module. The library stays mapped while any handle is alive.
pub struct Module {
    name: String,
    path: Option<PathBuf>,
    factory: CreateInterfaceFn,
    _library: Option<Library>,
}

pub type ModuleHandle = Arc<Module>;

impl Module {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File the module was loaded from; `None` for builtins.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn factory(&self) -> CreateInterfaceFn {
        self.factory
    }

    pub fn is_builtin(&self) -> bool {
        self._library.is_none()
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

/// File names tried for `name` on this platform, most specific first.
pub fn platform_names(name: &str) -> Vec<String> {
    let mut names = Vec::with_capacity(2);
    if cfg!(target_os = "windows") {
        names.push(format!("{}.dll", name));
    } else if cfg!(target_os = "macos") {
        names.push(format!("lib{}.dylib", name));
    } else {
        names.push(format!("lib{}.so", name));
    }
    names.push(name.to_string());
    names
}

// ============================================================
// ModuleLoader
// ============================================================

#[derive(Default)]
pub struct ModuleLoader {
    search_paths: Vec<PathBuf>,
    builtins: HashMap<String, CreateInterfaceFn>,
    loaded: HashMap<String, ModuleHandle>,
}

impl ModuleLoader {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self {
            search_paths,
            ..Self::default()
        }
    }

    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        self.search_paths.push(path.into());
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// A module compiled into the host. Files on the search path still win.
    pub fn register_builtin(&mut self, name: &str, factory: CreateInterfaceFn) {
        self.builtins.insert(name.to_string(), factory);
    }

    fn find_file(&self, name: &str) -> Option<PathBuf> {
        let candidates = platform_names(name);
        self.search_paths
            .iter()
            .flat_map(|dir| candidates.iter().map(move |file| dir.join(file)))
            .find(|path| path.is_file())
    }

    /// Load `name`, or return the handle already loaded under that name.
    pub fn load_module(&mut self, name: &str) -> Result<ModuleHandle, ModuleError> {
        if let Some(module) = self.loaded.get(name) {
            return Ok(module.clone());
        }

        let module = match self.find_file(name) {
            Some(path) => Self::open(name, path)?,
            None => match self.builtins.get(name) {
                Some(&factory) => Module {
                    name: name.to_string(),
                    path: None,
                    factory,
                    _library: None,
                },
                None => {
                    tracing::debug!(module = name, paths = ?self.search_paths, "module not found");
                    return Err(ModuleError::NotFound(name.to_string()));
                }
            },
        };

        tracing::info!(module = name, path = ?module.path, "loaded module");
        let module = Arc::new(module);
        self.loaded.insert(name.to_string(), module.clone());
        Ok(module)
    }

    fn open(name: &str, path: PathBuf) -> Result<Module, ModuleError> {
        // SAFETY: loading runs the library's initializers; modules are trusted
        // parts of the installation.
        let library = unsafe { Library::new(&path) }.map_err(|source| ModuleError::Load {
            path: path.clone(),
            source,
        })?;

        let factory = unsafe {
            library
                .get::<CreateInterfaceFn>(CREATE_INTERFACE_PROC_NAME.as_bytes())
                .map(|sym| *sym)
        }
        .map_err(|_| ModuleError::MissingFactory(name.to_string()))?;

        Ok(Module {
            name: name.to_string(),
            path: Some(path),
            factory,
            _library: Some(library),
        })
    }

    /// Forget `name`. The library unloads once the last handle is dropped.
    pub fn unload_module(&mut self, name: &str) -> bool {
        let removed = self.loaded.remove(name);
        if let Some(ref module) = removed {
            tracing::info!(module = name, handles = Arc::strong_count(module) - 1, "unloading module");
        }
        removed.is_some()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.contains_key(name)
    }

    pub fn loaded_names(&self) -> Vec<&str> {
        self.loaded.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::{c_char, c_int, c_void};

    unsafe extern "C" fn null_factory(_name: *const c_char, _rc: *mut c_int) -> *mut c_void {
        std::ptr::null_mut()
    }

    #[test]
    fn test_platform_names() {
        let names = platform_names("soundsystem");
        assert_eq!(names.len(), 2);
        assert_eq!(names[1], "soundsystem");
        #[cfg(target_os = "linux")]
        assert_eq!(names[0], "libsoundsystem.so");
        #[cfg(target_os = "windows")]
        assert_eq!(names[0], "soundsystem.dll");
    }

    #[test]
    fn test_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = ModuleLoader::new(vec![dir.path().to_path_buf()]);
        let err = loader.load_module("network").unwrap_err();
        assert!(matches!(err, ModuleError::NotFound(ref n) if n == "network"));
        assert!(!loader.is_loaded("network"));
    }

    #[test]
    fn test_bad_file_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(&platform_names("input")[0]);
        std::fs::write(&file, b"not a shared object").unwrap();

        let mut loader = ModuleLoader::new(vec![dir.path().to_path_buf()]);
        match loader.load_module("input") {
            Err(ModuleError::Load { path, .. }) => assert_eq!(path, file),
            other => panic!("expected load error, got {:?}", other),
        }
    }

    #[test]
    fn test_builtin_is_cached() {
        let mut loader = ModuleLoader::default();
        loader.register_builtin("gameui", null_factory);
        let a = loader.load_module("gameui").unwrap();
        let b = loader.load_module("gameui").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.is_builtin());
        assert!(a.path().is_none());
        assert_eq!(a.name(), "gameui");
        assert_eq!(loader.loaded_names(), vec!["gameui"]);

        assert!(loader.unload_module("gameui"));
        assert!(!loader.unload_module("gameui"));
        // the old handle stays usable after the loader forgets it
        assert_eq!(a.name(), "gameui");
        let c = loader.load_module("gameui").unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
