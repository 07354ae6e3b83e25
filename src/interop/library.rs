//! Dynamic library loading and symbol resolution
//!
//! Platform-agnostic wrapper around dlopen/LoadLibrary, plus the
//! [`SymbolResolver`] seam the invoker uses to find native entry points.

use core::ffi::c_void;
use core::ptr::NonNull;
use std::collections::HashMap;
use std::ffi::CString;
use thiserror::Error;

/// Resolves native symbol names to function addresses
pub trait SymbolResolver {
    fn resolve(&self, symbol: &str) -> Result<*const (), SymbolError>;
}

/// Handle to dynamically loaded library
pub struct Library {
    handle: NonNull<c_void>,
    name: String,
}

impl Library {
    /// Load library by name
    ///
    /// Searches standard library paths. Use `load_path` for absolute paths.
    pub fn load(name: &str) -> Result<Self, LoadError> {
        Self::load_impl(name)
    }

    /// Load library from absolute path
    pub fn load_path(path: &std::path::Path) -> Result<Self, LoadError> {
        let name = path.to_str().ok_or(LoadError::InvalidName)?;
        Self::load_impl(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[cfg(unix)]
    fn load_impl(name: &str) -> Result<Self, LoadError> {
        let cname = CString::new(name).map_err(|_| LoadError::InvalidName)?;

        unsafe {
            let handle = libc::dlopen(cname.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL);
            NonNull::new(handle)
                .map(|h| Self { handle: h, name: name.to_string() })
                .ok_or_else(|| {
                    let err = libc::dlerror();
                    let msg = if !err.is_null() {
                        std::ffi::CStr::from_ptr(err)
                            .to_string_lossy()
                            .into_owned()
                    } else {
                        "unknown error".into()
                    };
                    LoadError::LoadFailed(msg)
                })
        }
    }

    #[cfg(windows)]
    fn load_impl(name: &str) -> Result<Self, LoadError> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;

        extern "system" {
            fn LoadLibraryW(filename: *const u16) -> *mut c_void;
            fn GetLastError() -> u32;
        }

        let wide: Vec<u16> = OsStr::new(name)
            .encode_wide()
            .chain(Some(0))
            .collect();

        unsafe {
            let handle = LoadLibraryW(wide.as_ptr());
            NonNull::new(handle)
                .map(|h| Self { handle: h, name: name.to_string() })
                .ok_or_else(|| {
                    let code = GetLastError();
                    LoadError::LoadFailed(format!("error code: {}", code))
                })
        }
    }

    /// Get function pointer by symbol name
    pub fn symbol(&self, name: &str) -> Result<*const (), SymbolError> {
        let cname = CString::new(name).map_err(|_| SymbolError::InvalidName(name.to_string()))?;
        let ptr = self.symbol_impl(&cname);
        if ptr.is_null() {
            Err(SymbolError::NotFound(name.to_string()))
        } else {
            Ok(ptr as *const ())
        }
    }

    #[cfg(unix)]
    fn symbol_impl(&self, name: &CString) -> *mut c_void {
        unsafe { libc::dlsym(self.handle.as_ptr(), name.as_ptr()) }
    }

    #[cfg(windows)]
    fn symbol_impl(&self, name: &CString) -> *mut c_void {
        extern "system" {
            fn GetProcAddress(module: *mut c_void, name: *const u8) -> *mut c_void;
        }
        unsafe { GetProcAddress(self.handle.as_ptr(), name.as_ptr() as *const u8) }
    }
}

impl SymbolResolver for Library {
    fn resolve(&self, symbol: &str) -> Result<*const (), SymbolError> {
        self.symbol(symbol)
    }
}

impl Drop for Library {
    #[cfg(unix)]
    fn drop(&mut self) {
        unsafe {
            libc::dlclose(self.handle.as_ptr());
        }
    }

    #[cfg(windows)]
    fn drop(&mut self) {
        extern "system" {
            fn FreeLibrary(module: *mut c_void) -> i32;
        }
        unsafe {
            FreeLibrary(self.handle.as_ptr());
        }
    }
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library").field("name", &self.name).finish()
    }
}

/// Explicit registrations, falling back to loaded libraries in order
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, usize>,
    libraries: Vec<Library>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an address under a symbol name, replacing any previous one
    pub fn register(&mut self, symbol: impl Into<String>, address: *const ()) -> &mut Self {
        self.symbols.insert(symbol.into(), address as usize);
        self
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>, address: *const ()) -> Self {
        self.register(symbol, address);
        self
    }

    pub fn with_library(mut self, library: Library) -> Self {
        self.libraries.push(library);
        self
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty() && self.libraries.is_empty()
    }
}

impl SymbolResolver for SymbolTable {
    fn resolve(&self, symbol: &str) -> Result<*const (), SymbolError> {
        if let Some(&address) = self.symbols.get(symbol) {
            return Ok(address as *const ());
        }
        self.libraries
            .iter()
            .find_map(|lib| lib.symbol(symbol).ok())
            .ok_or_else(|| SymbolError::NotFound(symbol.to_string()))
    }
}

/// Library loading errors
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid library name")]
    InvalidName,

    #[error("failed to load library: {0}")]
    LoadFailed(String),
}

/// Symbol lookup errors
#[derive(Debug, Error)]
pub enum SymbolError {
    #[error("invalid symbol name `{0}'")]
    InvalidName(String),

    #[error("symbol `{0}' not found")]
    NotFound(String),
}

impl SymbolError {
    pub fn symbol(&self) -> &str {
        match self {
            Self::InvalidName(s) | Self::NotFound(s) => s,
        }
    }
}
