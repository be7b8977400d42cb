//! File-based staging of verified updates with atomic writes.
//!
//! Stages packages under `dirs::data_dir()/<namespace>/updates/`.
//! Uses temp file + rename so a staged installer is never half-written.

use super::verifier::VerifiedUpdate;
use crate::crypto::digest::checksum_matches;
use crate::DepotGuardError;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};

/// Arguments passed to the installer when none are given.
pub const DEFAULT_INSTALLER_ARGS: &[&str] = &["/SILENT"];

const STAGED_PREFIX: &str = "update_";

/// A verified package written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedUpdate {
    version: String,
    path: PathBuf,
    sha256: String,
}

impl StagedUpdate {
    /// Version of the staged package.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Location of the staged installer.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// SHA-256 recorded when the package was verified.
    pub fn sha256(&self) -> &str {
        &self.sha256
    }
}

/// Staging directory for verified updates.
#[derive(Debug)]
pub struct UpdateStager {
    /// Directory for staged files.
    stage_dir: PathBuf,
}

impl UpdateStager {
    /// Create a stager with the given namespace.
    ///
    /// Files are stored under `dirs::data_dir()/<namespace>/updates/`.
    pub fn new(namespace: &str) -> Result<Self, DepotGuardError> {
        let base_dir = dirs::data_dir()
            .ok_or_else(|| DepotGuardError::UpdateIO("Could not find data directory".to_string()))?;
        Self::with_path(base_dir.join(namespace).join("updates"))
    }

    /// Create a stager at a specific directory.
    pub fn with_path(stage_dir: PathBuf) -> Result<Self, DepotGuardError> {
        fs::create_dir_all(&stage_dir)
            .map_err(|e| DepotGuardError::UpdateIO(format!("Failed to create stage dir: {}", e)))?;
        Ok(Self { stage_dir })
    }

    /// Directory packages are staged into.
    pub fn dir(&self) -> &Path {
        &self.stage_dir
    }

    fn staged_path(&self, version: &str) -> PathBuf {
        self.stage_dir.join(format!(
            "{}{}{}",
            STAGED_PREFIX,
            sanitize_version(version),
            std::env::consts::EXE_SUFFIX
        ))
    }

    /// Write a verified package atomically.
    pub fn stage(&self, update: &VerifiedUpdate) -> Result<StagedUpdate, DepotGuardError> {
        let target_path = self.staged_path(update.version());
        let temp_path = self
            .stage_dir
            .join(format!(".{}{}.tmp", STAGED_PREFIX, sanitize_version(update.version())));

        // Write to temp file, then rename into place. The temp file never
        // outlives a failure.
        let written = fs::write(&temp_path, update.payload())
            .map_err(|e| DepotGuardError::UpdateIO(format!("Failed to write temp file: {}", e)))
            .and_then(|()| set_executable(&temp_path))
            .and_then(|()| {
                fs::rename(&temp_path, &target_path).map_err(|e| {
                    DepotGuardError::UpdateIO(format!("Failed to rename staged update: {}", e))
                })
            });
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        tracing::info!(
            version = %update.version(),
            path = %target_path.display(),
            "Update staged"
        );

        Ok(StagedUpdate {
            version: update.version().to_string(),
            path: target_path,
            sha256: update.sha256().to_string(),
        })
    }

    /// Remove the staged package for `version`, if any.
    pub fn discard(&self, version: &str) -> Result<(), DepotGuardError> {
        let path = self.staged_path(version);
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| DepotGuardError::UpdateIO(format!("Failed to discard update: {}", e)))?;
            tracing::info!(version, "Staged update discarded");
        }
        Ok(())
    }

    /// Remove every staged package and leftover temp file.
    pub fn clear(&self) -> Result<(), DepotGuardError> {
        for entry in fs::read_dir(&self.stage_dir)
            .map_err(|e| DepotGuardError::UpdateIO(format!("Failed to read stage dir: {}", e)))?
        {
            let entry = entry
                .map_err(|e| DepotGuardError::UpdateIO(format!("Failed to read entry: {}", e)))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(STAGED_PREFIX) || name.starts_with(&format!(".{}", STAGED_PREFIX)) {
                fs::remove_file(entry.path())
                    .map_err(|e| DepotGuardError::UpdateIO(format!("Failed to delete: {}", e)))?;
            }
        }
        Ok(())
    }

    /// Launch a staged installer.
    ///
    /// The file is re-hashed first; if it changed since staging it is not run.
    pub fn launch(&self, staged: &StagedUpdate, args: &[&str]) -> Result<Child, DepotGuardError> {
        let bytes = fs::read(staged.path())
            .map_err(|e| DepotGuardError::UpdateIO(format!("Failed to read staged update: {}", e)))?;
        if !checksum_matches(&bytes, staged.sha256()) {
            tracing::error!(
                path = %staged.path().display(),
                "Staged update changed on disk; refusing to launch"
            );
            return Err(DepotGuardError::InvalidUpdate);
        }

        let child = Command::new(staged.path())
            .args(args)
            .spawn()
            .map_err(|e| DepotGuardError::UpdateIO(format!("Failed to launch installer: {}", e)))?;
        tracing::info!(version = %staged.version(), "Update installer launched");
        Ok(child)
    }
}

/// Keep only filename-safe characters of a version string.
fn sanitize_version(version: &str) -> String {
    let cleaned: String = version
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<(), DepotGuardError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .map_err(|e| DepotGuardError::UpdateIO(format!("Failed to set permissions: {}", e)))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<(), DepotGuardError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::verify::SignatureVerifier;
    use crate::update::{UpdatePackage, UpdateVerifier};
    use tempfile::TempDir;

    const UPDATE_PUB: &str = include_str!("../../tests/fixtures/update_public_key.pem");
    const PACKAGE: &[u8] = include_bytes!("../../tests/fixtures/update_package.bin");
    const PACKAGE_SIG: &[u8] = include_bytes!("../../tests/fixtures/update_package.sig");

    fn sealed(version: &str) -> VerifiedUpdate {
        let verifier = UpdateVerifier::new(SignatureVerifier::from_pem(UPDATE_PUB).unwrap());
        verifier
            .seal(UpdatePackage {
                payload: PACKAGE.to_vec(),
                signature: PACKAGE_SIG.to_vec(),
                declared_version: version.to_string(),
                checksum: None,
            })
            .unwrap()
    }

    #[test]
    fn test_stage_writes_exact_bytes() {
        let temp = TempDir::new().unwrap();
        let stager = UpdateStager::with_path(temp.path().join("updates")).unwrap();
        let staged = stager.stage(&sealed("2.1.0")).unwrap();

        assert_eq!(fs::read(staged.path()).unwrap(), PACKAGE);
        assert_eq!(staged.version(), "2.1.0");
        assert!(staged
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("update_2.1.0"));
        // No temp file left behind
        let names: Vec<_> = fs::read_dir(stager.dir()).unwrap().collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_failed_stage_leaves_no_temp_file() {
        let temp = TempDir::new().unwrap();
        let stager = UpdateStager::with_path(temp.path().to_path_buf()).unwrap();
        // A non-empty directory where the package should land blocks the rename.
        let blocker = stager.staged_path("2.1.0");
        fs::create_dir_all(blocker.join("occupied")).unwrap();

        assert!(matches!(
            stager.stage(&sealed("2.1.0")),
            Err(DepotGuardError::UpdateIO(_))
        ));
        let leftovers: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_version_is_sanitized() {
        let temp = TempDir::new().unwrap();
        let stager = UpdateStager::with_path(temp.path().to_path_buf()).unwrap();
        let staged = stager.stage(&sealed("../../etc/passwd")).unwrap();
        assert_eq!(staged.path().parent().unwrap(), temp.path());
        assert_eq!(sanitize_version("2.1.0 beta/1"), "2.1.0_beta_1");
        assert_eq!(sanitize_version(""), "unknown");
    }

    #[test]
    fn test_discard_and_clear() {
        let temp = TempDir::new().unwrap();
        let stager = UpdateStager::with_path(temp.path().to_path_buf()).unwrap();
        let a = stager.stage(&sealed("2.1.0")).unwrap();
        let b = stager.stage(&sealed("2.2.0")).unwrap();
        fs::write(temp.path().join("keep.txt"), b"x").unwrap();

        stager.discard("2.1.0").unwrap();
        assert!(!a.path().exists());
        assert!(b.path().exists());
        // Discarding twice is fine
        stager.discard("2.1.0").unwrap();

        stager.clear().unwrap();
        assert!(!b.path().exists());
        assert!(temp.path().join("keep.txt").exists());
    }

    #[test]
    fn test_launch_refuses_modified_file() {
        let temp = TempDir::new().unwrap();
        let stager = UpdateStager::with_path(temp.path().to_path_buf()).unwrap();
        let staged = stager.stage(&sealed("2.1.0")).unwrap();
        fs::write(staged.path(), b"swapped after staging").unwrap();

        assert!(matches!(
            stager.launch(&staged, DEFAULT_INSTALLER_ARGS),
            Err(DepotGuardError::InvalidUpdate)
        ));
    }
}
