// factory.rs — typed interface resolution through a module factory

use std::ffi::{c_int, c_void, CString};
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;

use mgt_common::interface::{CreateInterfaceFn, Interface, IFACE_OK};

use crate::module::{ModuleError, ModuleHandle};

/// Ask `factory` for `version`. Exact token match; anything else is `None`.
pub fn query_interface(factory: CreateInterfaceFn, version: &str) -> Option<NonNull<c_void>> {
    let name = CString::new(version).ok()?;
    let mut rc: c_int = !IFACE_OK;
    // SAFETY: `name` is NUL-terminated and `rc` is a valid out pointer.
    let ptr = unsafe { factory(name.as_ptr(), &mut rc) };
    match NonNull::new(ptr) {
        Some(ptr) if rc == IFACE_OK => Some(ptr),
        _ => {
            tracing::debug!(version, rc, "interface not provided");
            None
        }
    }
}

/// A resolved interface table. Holds the module that provided it, so the
/// table cannot outlive its library.
pub struct Capability<T: Interface> {
    table: NonNull<T>,
    module: Option<ModuleHandle>,
    _marker: PhantomData<&'static T>,
}

// Interface tables are immutable statics inside the module.
unsafe impl<T: Interface> Send for Capability<T> {}
unsafe impl<T: Interface> Sync for Capability<T> {}

impl<T: Interface> Capability<T> {
    /// Resolve `T::VERSION` from a bare factory (the engine's own, or a test's).
    pub fn from_factory(factory: CreateInterfaceFn) -> Option<Self> {
        query_interface(factory, T::VERSION).map(|ptr| Self {
            table: ptr.cast(),
            module: None,
            _marker: PhantomData,
        })
    }

    pub fn resolve(module: &ModuleHandle) -> Result<Self, ModuleError> {
        let mut cap = Self::from_factory(module.factory()).ok_or_else(|| ModuleError::InterfaceMissing {
            module: module.name().to_string(),
            version: T::VERSION,
        })?;
        cap.module = Some(module.clone());
        tracing::debug!(module = module.name(), version = T::VERSION, "resolved interface");
        Ok(cap)
    }

    pub fn module(&self) -> Option<&ModuleHandle> {
        self.module.as_ref()
    }
}

impl<T: Interface> Deref for Capability<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the factory returned a pointer to a `'static` table of the
        // layout named by `T::VERSION`, and `module` keeps it mapped.
        unsafe { self.table.as_ref() }
    }
}
