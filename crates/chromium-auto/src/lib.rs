//! # chromium-auto
//!
//! Locate a Chromium (or Google Chrome) executable that can run in headless
//! mode, so callers that print HTML to PDF do not have to hard-code browser
//! paths per platform.
//!
//! ## How it works
//!
//! On first call to [`locate_chromium`]:
//!
//! 1. `CHROMIUM_PATH` is honoured if it points to an existing file.
//! 2. Every directory on `PATH` is searched for the well-known executable
//!    names of the current platform (`chromium`, `google-chrome`, …).
//! 3. Platform install locations are checked (`/Applications/...` on macOS,
//!    `Program Files` on Windows, snap/flatpak shims on Linux).
//!
//! The resolved path is cached for the lifetime of the process.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chromium_auto::locate_chromium;
//!
//! let chrome = locate_chromium().expect("no Chromium installed");
//! println!("using {}", chrome.display());
//! ```
//!
//! ## Environment variable overrides
//!
//! - `CHROMIUM_PATH`: path to a specific browser executable; skips the search.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Environment variable that pins the browser executable.
pub const CHROMIUM_PATH_ENV: &str = "CHROMIUM_PATH";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by chromium-auto operations.
#[derive(Error, Debug)]
pub enum ChromiumAutoError {
    /// `CHROMIUM_PATH` is set but does not point to a file.
    #[error("CHROMIUM_PATH '{}' does not exist", path.display())]
    EnvPathMissing { path: PathBuf },

    /// Nothing usable was found on `PATH` or in the platform locations.
    #[error(
        "No Chromium/Chrome executable found (looked for: {}).\n\
Install Chromium or set CHROMIUM_PATH=/path/to/chrome.",
        searched.join(", ")
    )]
    NotFound { searched: Vec<String> },
}

// ── Internal: platform metadata ──────────────────────────────────────────────

/// Executable names searched for on `PATH`, in preference order.
fn executable_names() -> &'static [&'static str] {
    match std::env::consts::OS {
        "windows" => &["chrome.exe", "chromium.exe", "msedge.exe"],
        "macos" => &["chromium", "google-chrome", "chrome"],
        _ => &[
            "chromium",
            "chromium-browser",
            "google-chrome",
            "google-chrome-stable",
            "chrome",
            "headless_shell",
        ],
    }
}

/// Absolute install locations checked after the `PATH` search.
fn platform_locations() -> Vec<PathBuf> {
    match std::env::consts::OS {
        "macos" => vec![
            PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"),
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
        ],
        "windows" => {
            let mut v = Vec::new();
            for var in ["ProgramFiles", "ProgramFiles(x86)", "LOCALAPPDATA"] {
                if let Some(base) = std::env::var_os(var) {
                    let base = PathBuf::from(base);
                    v.push(base.join("Google/Chrome/Application/chrome.exe"));
                    v.push(base.join("Chromium/Application/chrome.exe"));
                }
            }
            v
        }
        _ => vec![
            PathBuf::from("/usr/bin/chromium"),
            PathBuf::from("/usr/bin/chromium-browser"),
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/snap/bin/chromium"),
            PathBuf::from("/opt/google/chrome/chrome"),
        ],
    }
}

// ── Thread-safe singleton path cache ─────────────────────────────────────────

static RESOLVED_PATH: OnceLock<PathBuf> = OnceLock::new();

// ── Public API ───────────────────────────────────────────────────────────────

/// Returns the browser executable to use, searching once per process.
///
/// Safe to call from multiple threads; concurrent first calls may both
/// search, but they resolve to the same path.
pub fn locate_chromium() -> Result<PathBuf, ChromiumAutoError> {
    if let Some(path) = RESOLVED_PATH.get() {
        return Ok(path.clone());
    }

    let path = resolve_with(
        std::env::var_os(CHROMIUM_PATH_ENV).map(PathBuf::from),
        std::env::var_os("PATH"),
        &platform_locations(),
    )?;

    let _ = RESOLVED_PATH.set(path.clone());
    Ok(path)
}

/// Returns `true` if a browser executable can be located.
pub fn is_chromium_available() -> bool {
    locate_chromium().is_ok()
}

/// Search the directories of a `PATH`-style value for `name`.
pub fn find_in_path(name: &str, path_var: &OsString) -> Option<PathBuf> {
    std::env::split_paths(path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable_file(candidate))
}

/// Resolution with every input passed explicitly.
///
/// `env_override` wins when it exists. A set-but-missing override is an
/// error, never a fallback to the search.
pub fn resolve_with(
    env_override: Option<PathBuf>,
    path_var: Option<OsString>,
    locations: &[PathBuf],
) -> Result<PathBuf, ChromiumAutoError> {
    // An empty override counts as unset.
    if let Some(p) = env_override.filter(|p| !p.as_os_str().is_empty()) {
        if p.is_file() {
            return Ok(p);
        }
        return Err(ChromiumAutoError::EnvPathMissing { path: p });
    }

    if let Some(ref path_var) = path_var {
        for name in executable_names() {
            if let Some(found) = find_in_path(name, path_var) {
                return Ok(found);
            }
        }
    }

    if let Some(found) = locations.iter().find(|p| is_executable_file(p)) {
        return Ok(found.clone());
    }

    let mut searched: Vec<String> = executable_names().iter().map(|s| s.to_string()).collect();
    searched.extend(locations.iter().map(|p| p.display().to_string()));
    Err(ChromiumAutoError::NotFound { searched })
}

// ── Internal helpers ─────────────────────────────────────────────────────────

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn make_executable(dir: &Path, name: &str) -> PathBuf {
        let p = dir.join(name);
        fs::write(&p, b"#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&p, fs::Permissions::from_mode(0o755)).unwrap();
        }
        p
    }

    #[test]
    fn env_override_wins() {
        let dir = tempfile::tempdir().unwrap();
        let pinned = make_executable(dir.path(), "my-browser");
        let found = resolve_with(Some(pinned.clone()), None, &[]).unwrap();
        assert_eq!(found, pinned);
    }

    #[test]
    fn missing_env_override_is_an_error() {
        let err = resolve_with(Some(PathBuf::from("/definitely/not/chrome")), None, &[])
            .unwrap_err();
        assert!(matches!(err, ChromiumAutoError::EnvPathMissing { .. }));
    }

    #[test]
    fn path_search_finds_known_name() {
        let dir = tempfile::tempdir().unwrap();
        let name = executable_names()[0];
        let exe = make_executable(dir.path(), name);
        let path_var = std::env::join_paths([dir.path()]).unwrap();
        let found = resolve_with(None, Some(path_var), &[]).unwrap();
        assert_eq!(found, exe);
    }

    #[test]
    fn platform_location_used_when_path_empty() {
        let dir = tempfile::tempdir().unwrap();
        let exe = make_executable(dir.path(), "chrome-somewhere");
        let found = resolve_with(None, None, &[exe.clone()]).unwrap();
        assert_eq!(found, exe);
    }

    #[test]
    fn not_found_lists_what_was_searched() {
        let err = resolve_with(None, None, &[PathBuf::from("/nope/chrome")]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("/nope/chrome"), "got: {msg}");
        assert!(msg.contains("CHROMIUM_PATH"));
    }
}
