//! Keystore provisioning.
//!
//! A keystore is generated at most once per path by shelling out to
//! `keytool`. Existing files are never inspected or regenerated, so a
//! placeholder written while keytool was missing stays in place until it is
//! deleted by hand.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::process::Command;

use crate::config::{MissingToolPolicy, Settings};
use crate::error::{Error, Result};
use crate::utils::{FileLock, resolve_cmd};

/// Contents of the stub written when keytool is unavailable.
pub const PLACEHOLDER_CONTENTS: &str = "# Placeholder keystore file\n";

const KEY_ALGORITHM: &str = "RSA";
const KEY_SIZE: &str = "2048";
const VALIDITY_DAYS: &str = "10000";

/// State of a keystore file after [`KeystoreProvisioner::ensure_keystore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeystoreState {
    /// A file was already there and was left untouched.
    Existing,
    /// keytool generated a new keystore.
    Generated,
    /// keytool was missing and a placeholder stub was written.
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioned {
    pub path: PathBuf,
    pub state: KeystoreState,
}

#[derive(Debug, Clone)]
pub struct KeystoreProvisioner {
    settings: Settings,
}

impl KeystoreProvisioner {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Turn a recorded keystore path into an absolute location.
    ///
    /// Paths starting with `..` are rebased onto the project root; other
    /// relative paths are taken relative to the base directory.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        let mut rest = path.components();
        let mut rebased = false;
        while rest.clone().next() == Some(Component::ParentDir) {
            rest.next();
            rebased = true;
        }
        if rebased {
            return self.settings.project_root.join(rest.as_path());
        }
        self.settings.base_dir.join(path)
    }

    /// Make sure a keystore exists at `path`, generating one for `domain`
    /// if not. Both store and key use `password`.
    pub fn ensure_keystore(
        &self,
        domain: &str,
        path: &Path,
        password: &str,
        alias: &str,
    ) -> Result<Provisioned> {
        let path = self.resolve_path(path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        let _lock = FileLock::acquire(&keystore_lock_path(&path))?;
        if path.exists() {
            tracing::info!(domain, keystore = %path.display(), "keystore already exists");
            return Ok(Provisioned {
                path,
                state: KeystoreState::Existing,
            });
        }

        let keytool = match resolve_cmd(&self.settings.keytool) {
            Ok(keytool) => keytool,
            Err(err) => return self.handle_missing_tool(domain, path, err),
        };

        let dname = self.settings.dname.render(domain);
        let output = Command::new(&keytool)
            .args(["-genkeypair", "-v", "-keystore"])
            .arg(&path)
            .args(["-alias", alias])
            .args(["-keyalg", KEY_ALGORITHM])
            .args(["-keysize", KEY_SIZE])
            .args(["-validity", VALIDITY_DAYS])
            .args(["-storepass", password])
            .args(["-keypass", password])
            .args(["-dname", &dname])
            .output()
            .map_err(|e| Error::io(&keytool, e))?;

        if !output.status.success() {
            // keytool may leave a truncated store behind; don't let it count
            // as provisioned on the next run.
            let _ = fs::remove_file(&path);
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::error!(domain, status = %output.status, "keytool failed: {stderr}");
            return Err(Error::KeytoolFailed {
                status: output.status,
                stderr,
            });
        }

        tracing::info!(domain, keystore = %path.display(), "generated keystore");
        Ok(Provisioned {
            path,
            state: KeystoreState::Generated,
        })
    }

    fn handle_missing_tool(&self, domain: &str, path: PathBuf, err: Error) -> Result<Provisioned> {
        match self.settings.missing_keytool {
            MissingToolPolicy::Fail => Err(err),
            MissingToolPolicy::Placeholder => {
                tracing::warn!(
                    domain,
                    keystore = %path.display(),
                    "{err}; writing placeholder keystore"
                );
                fs::write(&path, PLACEHOLDER_CONTENTS).map_err(|e| Error::io(&path, e))?;
                Ok(Provisioned {
                    path,
                    state: KeystoreState::Placeholder,
                })
            }
        }
    }
}

/// Lock file guarding generation of the keystore at `path`. Locks are kept
/// together in a `.locks` directory beside the keystores and are not removed.
fn keystore_lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.parent()
        .unwrap_or(Path::new("."))
        .join(".locks")
        .join(name)
}

/// True when `path` holds the stub written in place of a real keystore.
pub fn is_placeholder(path: &Path) -> bool {
    fs::read(path).is_ok_and(|bytes| bytes == PLACEHOLDER_CONTENTS.as_bytes())
}
