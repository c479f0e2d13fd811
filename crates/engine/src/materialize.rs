//! Installing action code into the working directory.
//!
//! Whatever form the payload takes, the entry module ends up at `main__.js`
//! so the rest of the engine never cares how the code arrived.

use std::path::{Component, Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use protocol::{InitPayload, StartupError};

/// The entry module file name in the working directory.
pub const ENTRY_FILE: &str = "main__.js";
/// Conventional entry file name inside uploaded archives.
pub const ARCHIVE_ENTRY_FILE: &str = "__main__.js";

const VIRTUALENV_DIR: &str = "virtualenv";
const ACTIVATE_FILE: &str = "activate_this.js";

/// Write or expand the init payload into `workdir`. On success the entry
/// module exists at [`ENTRY_FILE`].
pub fn install_payload(workdir: &Path, payload: &InitPayload) -> Result<(), StartupError> {
    if payload.binary {
        let bytes = BASE64
            .decode(payload.code.as_bytes())
            .map_err(|err| StartupError::new(format!("Invalid binary payload: {err}")))?;
        extract_archive(workdir, &bytes)?;

        let conventional = workdir.join(ARCHIVE_ENTRY_FILE);
        if conventional.is_file() {
            std::fs::rename(&conventional, workdir.join(ENTRY_FILE)).map_err(|err| {
                StartupError::new(format!("Failed to install entry module: {err}"))
            })?;
        }
        if !workdir.join(ENTRY_FILE).is_file() {
            return Err(StartupError::new(format!(
                "Zip file does not include '{ARCHIVE_ENTRY_FILE}'."
            )));
        }
        Ok(())
    } else {
        std::fs::write(workdir.join(ENTRY_FILE), &payload.code)
            .map_err(|err| StartupError::new(format!("Failed to write entry module: {err}")))
    }
}

fn extract_archive(workdir: &Path, bytes: &[u8]) -> Result<(), StartupError> {
    let reader = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(reader)
        .map_err(|err| StartupError::new(format!("Invalid zip archive: {err}")))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|err| StartupError::new(format!("Invalid zip archive: {err}")))?;
        let name = entry.name().to_string();
        let rel = sanitize_member_path(&name)
            .ok_or_else(|| StartupError::new(format!("Unsafe zip member path '{name}'")))?;
        let target = workdir.join(rel);

        if entry.is_dir() {
            std::fs::create_dir_all(&target).map_err(|err| {
                StartupError::new(format!("Failed to expand archive: {err}"))
            })?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|err| {
                StartupError::new(format!("Failed to expand archive: {err}"))
            })?;
        }
        let mut out = std::fs::File::create(&target)
            .map_err(|err| StartupError::new(format!("Failed to expand archive: {err}")))?;
        std::io::copy(&mut entry, &mut out)
            .map_err(|err| StartupError::new(format!("Failed to expand archive: {err}")))?;
    }

    tracing::debug!("expanded {} archive members", archive.len());
    Ok(())
}

/// Strip `.` components; reject absolute paths and any `..` traversal.
fn sanitize_member_path(name: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::ParentDir => return None,
            Component::CurDir => {}
            Component::Normal(part) => out.push(part),
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Locate the dependency-environment activation script, when the payload
/// ships one. `Ok(None)` means there is no `virtualenv/` directory at all;
/// a directory without an activation script is a startup failure.
pub fn locate_activation_script(workdir: &Path) -> Result<Option<PathBuf>, StartupError> {
    let venv = workdir.join(VIRTUALENV_DIR);
    if !venv.is_dir() {
        return Ok(None);
    }
    let posix = venv.join("bin").join(ACTIVATE_FILE);
    if posix.is_file() {
        return Ok(Some(posix));
    }
    let windows = venv.join("Scripts").join(ACTIVATE_FILE);
    if windows.is_file() {
        return Ok(Some(windows));
    }
    Err(StartupError::new(format!(
        "Invalid virtualenv: Zip file does not include '{ACTIVATE_FILE}'."
    )))
}
