//! Location of the native PKCS#11 module
//!
//! The core only needs a path. Where it comes from (flag, environment or a
//! probe of the usual install locations) is resolved here.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Environment variable consulted for the module path
pub const MODULE_PATH_ENV: &str = "PKCS11_LIB_PATH";

#[cfg(target_os = "linux")]
const CANDIDATES: &[&str] = &[
    // SoftHSM
    "/usr/lib/x86_64-linux-gnu/softhsm/libsofthsm2.so",
    "/usr/lib/softhsm/libsofthsm2.so",
    // OpenSC
    "/usr/lib/x86_64-linux-gnu/opensc-pkcs11.so",
    // Yubico
    "/usr/lib/x86_64-linux-gnu/libykcs11.so",
];

#[cfg(target_os = "macos")]
const CANDIDATES: &[&str] = &[
    "/usr/local/lib/opensc-pkcs11.so",
    "/usr/local/lib/libykcs11.dylib",
    "/opt/homebrew/lib/softhsm/libsofthsm2.so",
];

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const CANDIDATES: &[&str] = &[];

/// Path of a PKCS#11 shared library
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModulePath(PathBuf);

impl ModulePath {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, ModulePathError> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(ModulePathError::Empty);
        }
        Ok(Self(path))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Path from the value of `PKCS11_LIB_PATH`, if set and non-empty
    fn from_env_value(value: Option<OsString>) -> Option<Self> {
        value.and_then(|value| Self::new(value).ok())
    }

    /// First well-known module location present on this machine
    pub fn detect() -> Option<Self> {
        Self::probe(candidates())
    }

    /// Explicit path if given, then the environment, then auto-detection
    pub fn resolve(explicit: Option<PathBuf>) -> Result<Self, ModulePathError> {
        Self::resolve_from(explicit, std::env::var_os(MODULE_PATH_ENV), Self::detect)
    }

    fn resolve_from(
        explicit: Option<PathBuf>,
        env: Option<OsString>,
        detect: impl FnOnce() -> Option<Self>,
    ) -> Result<Self, ModulePathError> {
        if let Some(path) = explicit {
            return Self::new(path);
        }
        Self::from_env_value(env)
            .or_else(detect)
            .ok_or(ModulePathError::NotFound)
    }

    fn probe<I, P>(paths: I) -> Option<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        paths.into_iter().map(Into::into).find_map(|path: PathBuf| {
            if path.is_file() {
                debug!("Detected PKCS#11 module at {}", path.display());
                Some(Self(path))
            } else {
                None
            }
        })
    }
}

#[cfg(not(target_os = "windows"))]
fn candidates() -> Vec<PathBuf> {
    CANDIDATES.iter().map(PathBuf::from).collect()
}

#[cfg(target_os = "windows")]
fn candidates() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(root) = std::env::var_os("SystemRoot") {
        paths.push(Path::new(&root).join("System32").join("opensc-pkcs11.dll"));
    }
    if let Some(programs) = std::env::var_os("ProgramFiles") {
        paths.push(
            Path::new(&programs)
                .join("Yubico")
                .join("Yubico PIV Tool")
                .join("bin")
                .join("lib")
                .join("libykcs11.dll"),
        );
    }
    paths
}

impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModulePathError {
    #[error("module path must not be empty")]
    Empty,

    #[error("no PKCS#11 module found; pass --module or set {MODULE_PATH_ENV}")]
    NotFound,
}
