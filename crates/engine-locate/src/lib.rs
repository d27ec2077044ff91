//! # engine-locate
//!
//! Find the office engine executable (LibreOffice, or a legacy OpenOffice.org
//! install) that `oowrap` launches in headless mode.
//!
//! ## Resolution order
//!
//! 1. An explicit path passed by the caller (e.g. the `--engine` CLI flag).
//! 2. The `OOWRAP_ENGINE` environment variable.
//! 3. Well-known install locations for the current platform.
//! 4. `soffice` / `libreoffice` on `PATH`.
//!
//! Steps 1 and 2 are authoritative: if they name a file that does not exist the
//! lookup fails instead of silently picking some other engine.
//!
//! [`locate_python`] finds the interpreter that can import the engine's UNO
//! bindings: an explicit path, `OOWRAP_PYTHON`, the interpreter bundled in
//! the engine's `program` directory, then `python3` / `python` on `PATH`.
//!
//! ```rust,no_run
//! let engine = engine_locate::locate_engine(None).expect("no office engine installed");
//! println!("using {}", engine.display());
//! ```
//!
//! ## Platform support
//!
//! | OS      | Well-known locations                                           |
//! |---------|----------------------------------------------------------------|
//! | Linux   | `/usr/bin/libreoffice`, `/usr/lib/libreoffice/program/soffice`, `/opt/libreoffice*/program/soffice`, `/opt/openoffice.org3/program/soffice` |
//! | macOS   | `/Applications/LibreOffice.app/…/soffice`, `~/Applications/…`  |
//! | Windows | `%ProgramFiles%\LibreOffice\program\soffice.exe`               |

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Environment variable naming the engine executable.
pub const ENGINE_ENV: &str = "OOWRAP_ENGINE";

/// Environment variable naming the Python interpreter for the UNO helper.
pub const PYTHON_ENV: &str = "OOWRAP_PYTHON";

/// Executable names searched for on `PATH`, most specific first.
#[cfg(windows)]
const PATH_NAMES: &[&str] = &["soffice.exe", "soffice.com"];
#[cfg(not(windows))]
const PATH_NAMES: &[&str] = &["soffice", "libreoffice"];

#[cfg(windows)]
const PYTHON_NAMES: &[&str] = &["python.exe", "python3.exe"];
#[cfg(not(windows))]
const PYTHON_NAMES: &[&str] = &["python3", "python"];

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by engine lookup.
#[derive(Error, Debug)]
pub enum LocateError {
    /// The caller named an engine path that does not exist.
    #[error("Engine executable not found at '{path}'")]
    Missing { path: PathBuf },

    /// `OOWRAP_ENGINE` is set but points nowhere.
    #[error("{var}='{path}' does not exist", var = ENGINE_ENV)]
    EnvMissing { path: PathBuf },

    /// The file exists but is not executable by this user.
    #[error("Engine '{path}' is not executable")]
    NotExecutable { path: PathBuf },

    /// No interpreter for the UNO helper was found.
    #[error(
        "No Python interpreter found for the UNO bridge.\nSearched: {}\nInstall the engine's Python bindings (e.g. python3-uno) or set {}=/path/to/python.",
        display_list(.searched),
        PYTHON_ENV
    )]
    PythonNotFound { searched: Vec<PathBuf> },

    /// Nothing was found anywhere.
    #[error(
        "No office engine found.\nSearched: {}\nInstall LibreOffice or set {}=/path/to/soffice.",
        display_list(.searched),
        ENGINE_ENV
    )]
    NotFound { searched: Vec<PathBuf> },
}

fn display_list(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Platform candidates ──────────────────────────────────────────────────────

/// Well-known install locations for the current platform, in search order.
pub fn candidate_paths() -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = Vec::new();

    #[cfg(target_os = "linux")]
    {
        out.push(PathBuf::from("/usr/bin/libreoffice"));
        out.push(PathBuf::from("/usr/bin/soffice"));
        out.push(PathBuf::from("/usr/lib/libreoffice/program/soffice"));
        out.push(PathBuf::from("/snap/bin/libreoffice"));
        // Upstream tarball installs are versioned: /opt/libreoffice24.8/...
        if let Ok(entries) = std::fs::read_dir("/opt") {
            let mut versioned: Vec<PathBuf> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with("libreoffice"))
                })
                .map(|p| p.join("program").join("soffice"))
                .collect();
            // Newest version first.
            versioned.sort();
            versioned.reverse();
            out.extend(versioned);
        }
        out.push(PathBuf::from("/opt/openoffice.org3/program/soffice"));
    }

    #[cfg(target_os = "macos")]
    {
        const BUNDLE: &str = "LibreOffice.app/Contents/MacOS/soffice";
        out.push(Path::new("/Applications").join(BUNDLE));
        if let Some(home) = dirs::home_dir() {
            out.push(home.join("Applications").join(BUNDLE));
        }
    }

    #[cfg(windows)]
    {
        for var in ["ProgramFiles", "ProgramFiles(x86)"] {
            if let Ok(base) = std::env::var(var) {
                out.push(
                    Path::new(&base)
                        .join("LibreOffice")
                        .join("program")
                        .join("soffice.exe"),
                );
            }
        }
    }

    #[cfg(all(unix, not(target_os = "linux"), not(target_os = "macos")))]
    {
        out.push(PathBuf::from("/usr/local/bin/libreoffice"));
        out.push(PathBuf::from("/usr/local/bin/soffice"));
    }

    // Per-user installs (e.g. extracted AppImage symlinked into ~/.local/bin).
    #[cfg(not(windows))]
    if let Some(home) = dirs::home_dir() {
        out.push(home.join(".local").join("bin").join("soffice"));
    }

    out
}

// ── Thread-safe singleton path cache ─────────────────────────────────────────

static RESOLVED_DEFAULT: OnceLock<PathBuf> = OnceLock::new();

// ── Public API ───────────────────────────────────────────────────────────────

/// Resolve the engine executable.
///
/// `explicit` takes precedence over everything else. See the crate docs for
/// the full order.
pub fn locate_engine(explicit: Option<&Path>) -> Result<PathBuf, LocateError> {
    if let Some(path) = explicit {
        return check_executable(path).map_err(|e| match e {
            LocateError::EnvMissing { path } => LocateError::Missing { path },
            other => other,
        });
    }

    if let Some(path) = RESOLVED_DEFAULT.get() {
        return Ok(path.clone());
    }

    let path = resolve_default()?;
    let _ = RESOLVED_DEFAULT.set(path.clone());
    Ok(path)
}

/// Returns `true` if [`locate_engine`] would succeed without an explicit path.
pub fn is_engine_installed() -> bool {
    locate_engine(None).is_ok()
}

/// Search a `PATH`-style variable for the first executable among `names`.
pub fn search_path(names: &[&str], path_var: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(path_var)
        .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
        .find(|candidate| is_executable(candidate))
}

/// The engine's `program` directory: the directory of the real executable
/// after following symlinks such as `/usr/bin/libreoffice`.
pub fn program_dir(engine: &Path) -> Option<PathBuf> {
    let real = std::fs::canonicalize(engine).ok()?;
    real.parent().map(Path::to_path_buf)
}

/// Interpreters shipped inside an engine install, in search order.
pub fn bundled_python_paths(engine: &Path) -> Vec<PathBuf> {
    let Some(program) = program_dir(engine) else {
        return Vec::new();
    };
    let mut out = vec![program.join(if cfg!(windows) { "python.exe" } else { "python" })];
    // macOS bundles keep the interpreter next to MacOS/, under Resources/.
    if let Some(contents) = program.parent() {
        out.push(contents.join("Resources").join("python"));
    }
    out
}

/// Resolve the Python interpreter that runs the UNO helper for `engine`.
pub fn locate_python(engine: &Path, explicit: Option<&Path>) -> Result<PathBuf, LocateError> {
    if let Some(path) = explicit {
        return check_executable(path).map_err(|e| match e {
            LocateError::EnvMissing { path } => LocateError::Missing { path },
            other => other,
        });
    }
    if let Some(raw) = std::env::var_os(PYTHON_ENV).filter(|v| !v.is_empty()) {
        return check_executable(Path::new(&raw));
    }

    let bundled = bundled_python_paths(engine);
    if let Some(found) = bundled.iter().find(|p| is_executable(p)) {
        return Ok(found.clone());
    }

    if let Some(path_var) = std::env::var_os("PATH") {
        if let Some(found) = search_path(PYTHON_NAMES, &path_var) {
            return Ok(found);
        }
    }

    Err(LocateError::PythonNotFound { searched: bundled })
}

// ── Internal helpers ─────────────────────────────────────────────────────────

fn resolve_default() -> Result<PathBuf, LocateError> {
    // 1. Environment variable override.
    if let Some(raw) = std::env::var_os(ENGINE_ENV).filter(|v| !v.is_empty()) {
        return check_executable(Path::new(&raw));
    }

    // 2. Well-known locations.
    let candidates = candidate_paths();
    if let Some(found) = candidates.iter().find(|p| is_executable(p)) {
        return Ok(found.clone());
    }

    // 3. PATH.
    if let Some(path_var) = std::env::var_os("PATH") {
        if let Some(found) = search_path(PATH_NAMES, &path_var) {
            return Ok(found);
        }
    }

    Err(LocateError::NotFound {
        searched: candidates,
    })
}

fn check_executable(path: &Path) -> Result<PathBuf, LocateError> {
    if !path.exists() {
        return Err(LocateError::EnvMissing {
            path: path.to_path_buf(),
        });
    }
    if !is_executable(path) {
        return Err(LocateError::NotExecutable {
            path: path.to_path_buf(),
        });
    }
    Ok(path.to_path_buf())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
