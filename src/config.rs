use serde::Deserialize;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Name of the optional settings file looked up in the base directory.
pub const SETTINGS_FILE: &str = "apk_domain_config.toml";

/// How `keystore_path` is recorded in the config document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PathStyle {
    /// Resolved absolute path on the host.
    #[default]
    Absolute,
    /// Relative to the base directory (`keystores/<file>`), or `../`-prefixed
    /// when the keystores live elsewhere under the project root. For builds
    /// that mount the project somewhere else (e.g. a container).
    Relative,
}

/// What to do when the certificate tool cannot be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MissingToolPolicy {
    /// Write a placeholder text file and carry on.
    #[default]
    Placeholder,
    /// Return an error.
    Fail,
}

/// Organizational fields of the certificate subject. The common name is
/// always the domain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DistinguishedName {
    pub ou: String,
    pub o: String,
    pub l: String,
    pub st: String,
    pub c: String,
}

impl Default for DistinguishedName {
    fn default() -> Self {
        Self {
            ou: "WebApp".to_string(),
            o: "AutoBuild".to_string(),
            l: "City".to_string(),
            st: "State".to_string(),
            c: "CN".to_string(),
        }
    }
}

impl DistinguishedName {
    pub fn render(&self, common_name: &str) -> String {
        format!(
            "CN={common_name}, OU={}, O={}, L={}, ST={}, C={}",
            self.ou, self.o, self.l, self.st, self.c
        )
    }
}

/// On-disk settings file. Every field is optional; relative paths are
/// resolved against the base directory.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsFile {
    #[serde(default)]
    pub keystores_dir: Option<String>,
    #[serde(default)]
    pub config_file: Option<String>,
    #[serde(default)]
    pub project_root: Option<String>,
    #[serde(default)]
    pub path_style: Option<PathStyle>,
    #[serde(default)]
    pub missing_keytool: Option<MissingToolPolicy>,
    #[serde(default)]
    pub keytool: Option<String>,
    #[serde(default)]
    pub dname: Option<DistinguishedName>,
}

/// Resolved settings shared by the store and the provisioner.
#[derive(Debug, Clone)]
pub struct Settings {
    pub base_dir: PathBuf,
    pub keystores_dir: PathBuf,
    pub config_file: PathBuf,
    /// Root that `../`-prefixed keystore paths are rebased onto.
    pub project_root: PathBuf,
    pub path_style: PathStyle,
    pub missing_keytool: MissingToolPolicy,
    pub keytool: String,
    pub dname: DistinguishedName,
}

impl Settings {
    /// Defaults rooted at `base_dir`: `keystores/`, `domain_configs.json`
    /// and the parent directory as project root. A relative `base_dir` is
    /// made absolute against the current directory.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let base_dir = normalize(&std::path::absolute(&base_dir).unwrap_or(base_dir));
        let project_root = base_dir
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| base_dir.clone());
        Self {
            keystores_dir: base_dir.join("keystores"),
            config_file: base_dir.join("domain_configs.json"),
            project_root,
            path_style: PathStyle::default(),
            missing_keytool: MissingToolPolicy::default(),
            keytool: "keytool".to_string(),
            dname: DistinguishedName::default(),
            base_dir,
        }
    }

    /// Build settings for `base_dir`, layering `file` on top of the defaults.
    pub fn from_file(base_dir: impl Into<PathBuf>, file: SettingsFile) -> Result<Self> {
        let mut settings = Self::new(base_dir);
        let base = settings.base_dir.clone();
        let resolve =
            |value: &str| -> Result<PathBuf> { Ok(normalize(&base.join(expand_env_vars(value)?))) };

        if let Some(value) = file.keystores_dir.as_deref() {
            settings.keystores_dir = resolve(value)?;
        }
        if let Some(value) = file.config_file.as_deref() {
            settings.config_file = resolve(value)?;
        }
        if let Some(value) = file.project_root.as_deref() {
            settings.project_root = resolve(value)?;
        }
        if let Some(value) = file.keytool.as_deref() {
            settings.keytool = expand_env_vars(value)?;
        }
        if let Some(style) = file.path_style {
            settings.path_style = style;
        }
        if let Some(policy) = file.missing_keytool {
            settings.missing_keytool = policy;
        }
        if let Some(dname) = file.dname {
            settings.dname = DistinguishedName {
                ou: expand_env_vars(&dname.ou)?,
                o: expand_env_vars(&dname.o)?,
                l: expand_env_vars(&dname.l)?,
                st: expand_env_vars(&dname.st)?,
                c: expand_env_vars(&dname.c)?,
            };
        }
        Ok(settings)
    }

    /// Load settings for `base_dir`. An explicit `path` must exist; otherwise
    /// `<base_dir>/apk_domain_config.toml` is used when present.
    pub fn load(base_dir: impl Into<PathBuf>, path: Option<&Path>) -> Result<Self> {
        let base_dir = base_dir.into();
        let default_path = base_dir.join(SETTINGS_FILE);
        let path = match path {
            Some(p) => p.to_path_buf(),
            None if default_path.exists() => default_path,
            None => return Ok(Self::new(base_dir)),
        };

        let content = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        let file: SettingsFile = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        tracing::debug!(settings = %path.display(), "loaded settings file");
        Self::from_file(base_dir, file)
    }

    /// Location `keystore_path` is written as in the config document.
    ///
    /// Relative paths are either under the base directory or `../`-prefixed
    /// and under the project root, matching how
    /// [`KeystoreProvisioner::resolve_path`](crate::keystore::KeystoreProvisioner::resolve_path)
    /// reads them back. Keystore directories outside both cannot be recorded
    /// relatively.
    pub fn recorded_keystore_path(&self, file_name: &str) -> Result<PathBuf> {
        if self.path_style == PathStyle::Absolute {
            return Ok(self.keystores_dir.join(file_name));
        }
        if let Ok(dir) = self.keystores_dir.strip_prefix(&self.base_dir) {
            return Ok(dir.join(file_name));
        }
        if let Ok(dir) = self.keystores_dir.strip_prefix(&self.project_root) {
            return Ok(Path::new("..").join(dir).join(file_name));
        }
        Err(Error::Config(format!(
            "keystores_dir {} is outside both {} and {}; use path_style = \"absolute\"",
            self.keystores_dir.display(),
            self.base_dir.display(),
            self.project_root.display()
        )))
    }
}

/// Lexically drop `.` components and fold `..` into the preceding one.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Expand `${VAR}` and `$VAR` references from the environment.
fn expand_env_vars(input: &str) -> Result<String> {
    let mut out = String::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '$' {
            if i + 1 < chars.len() && chars[i + 1] == '{' {
                let Some(len) = chars[i + 2..].iter().position(|c| *c == '}') else {
                    return Err(Error::Config(format!(
                        "unclosed env var in settings value: {input}"
                    )));
                };
                let end = i + 2 + len;
                let key: String = chars[i + 2..end].iter().collect();
                out.push_str(&lookup_env(&key)?);
                i = end + 1;
                continue;
            }

            let mut end = i + 1;
            while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
                end += 1;
            }
            if end > i + 1 {
                let key: String = chars[i + 1..end].iter().collect();
                out.push_str(&lookup_env(&key)?);
                i = end;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    Ok(out)
}

fn lookup_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| Error::Config(format!("missing env var: {key}")))
}
