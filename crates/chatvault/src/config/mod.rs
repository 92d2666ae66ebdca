use std::path::{Component, Path, PathBuf};

use anyhow::{Result, bail};

use crate::notion::SyncConfig;

pub const TOKEN_ENV_VAR: &str = "NOTION_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    pub home_dir: PathBuf,
    pub cwd: PathBuf,
    pub out_dir: PathBuf,
}

impl RuntimePaths {
    /// Resolves a user-supplied path (`~`, relative or absolute) against
    /// these runtime paths.
    pub fn resolve(&self, path: &Path) -> Result<PathBuf> {
        resolve_user_path(path, &self.home_dir, &self.cwd)
    }
}

pub fn resolve_runtime_paths(
    home_dir: &Path,
    cwd: &Path,
    out_dir_override: Option<&Path>,
) -> Result<RuntimePaths> {
    if !home_dir.is_absolute() {
        bail!("home_dir must be absolute: {}", home_dir.display());
    }
    if !cwd.is_absolute() {
        bail!("cwd must be absolute: {}", cwd.display());
    }

    let home_dir = normalize_lexical(home_dir);
    let cwd = normalize_lexical(cwd);
    let out_dir = match out_dir_override {
        Some(path) => resolve_user_path(path, &home_dir, &cwd)?,
        None => home_dir.join(".chatvault").join("output"),
    };

    Ok(RuntimePaths {
        home_dir,
        cwd,
        out_dir: normalize_lexical(&out_dir),
    })
}

/// No integration token was given on the command line or in the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingTokenError;

impl std::fmt::Display for MissingTokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "missing Notion integration token; pass --token or set {TOKEN_ENV_VAR}"
        )
    }
}

impl std::error::Error for MissingTokenError {}

/// Builds the sync configuration from flags, falling back to the token from
/// the environment. Blank values count as absent.
pub fn resolve_sync_config(
    token_flag: Option<&str>,
    token_env: Option<&str>,
    proxy_url: Option<&str>,
    assistant_database_id: Option<&str>,
    topic_database_id: Option<&str>,
) -> Result<SyncConfig> {
    let Some(token) = non_blank(token_flag).or_else(|| non_blank(token_env)) else {
        return Err(MissingTokenError.into());
    };

    Ok(SyncConfig {
        token: token.to_string(),
        proxy_url: non_blank(proxy_url).map(str::to_string),
        assistant_database_id: non_blank(assistant_database_id).map(str::to_string),
        topic_database_id: non_blank(topic_database_id).map(str::to_string),
    })
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn resolve_user_path(path: &Path, home_dir: &Path, cwd: &Path) -> Result<PathBuf> {
    let expanded = expand_tilde(path, home_dir)?;
    let resolved = if expanded.is_absolute() {
        expanded
    } else {
        cwd.join(expanded)
    };

    Ok(normalize_lexical(&resolved))
}

fn expand_tilde(path: &Path, home_dir: &Path) -> Result<PathBuf> {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "~" => {
            let mut expanded = home_dir.to_path_buf();
            for component in components {
                expanded.push(component.as_os_str());
            }
            Ok(expanded)
        }
        Some(Component::Normal(first))
            if first
                .to_str()
                .is_some_and(|segment| segment.starts_with('~')) =>
        {
            bail!(
                "unsupported home expansion syntax (only `~` and `~/...` are supported): {}",
                path.display()
            )
        }
        _ => Ok(path.to_path_buf()),
    }
}

fn normalize_lexical(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component.as_os_str());
                }
            }
            _ => normalized.push(component.as_os_str()),
        }
    }

    normalized
}
