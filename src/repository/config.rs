// src/repository/config.rs

//! `.repo` files
//!
//! Each file in the repo directory holds either a single record or a list of
//! records:
//!
//! ```yaml
//! - name: stable
//!   url: https://packages.example.com/stable
//! - name: rollback
//!   url: https://packages.example.com/rollback
//!   priority: Rollback
//! ```

use crate::error::{Error, Result};
use crate::repository::{PRIORITY_DEFAULT, Priority, parse_priority};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Required extension of repo files
pub const REPO_EXT: &str = "repo";

/// A single repository definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoEntry {
    pub name: String,
    pub url: String,
    #[serde(
        default = "default_priority",
        deserialize_with = "deserialize_priority"
    )]
    pub priority: Priority,
}

impl RepoEntry {
    pub fn new(name: impl Into<String>, url: impl Into<String>, priority: Priority) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            priority,
        }
    }
}

fn default_priority() -> Priority {
    PRIORITY_DEFAULT
}

fn deserialize_priority<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Priority, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(Priority),
        Name(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(n) => Ok(n),
        Raw::Name(s) => parse_priority(&s).map_err(serde::de::Error::custom),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Records {
    One(RepoEntry),
    Many(Vec<RepoEntry>),
}

/// A parsed `.repo` file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoFile {
    pub path: PathBuf,
    pub entries: Vec<RepoEntry>,
}

impl RepoFile {
    /// Parse a repo file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let entries = if content.trim().is_empty() {
            Vec::new()
        } else {
            match serde_yaml::from_str::<Records>(&content)
                .map_err(|e| Error::ParseError(format!("{}: {}", path.display(), e)))?
            {
                Records::One(entry) => vec![entry],
                Records::Many(entries) => entries,
            }
        };

        for entry in &entries {
            if entry.name.trim().is_empty() || entry.url.trim().is_empty() {
                return Err(Error::ParseError(format!(
                    "{}: every repo needs a name and a url",
                    path.display()
                )));
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Write the file back atomically
    pub fn save(&self) -> Result<()> {
        let dir = self.path.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(dir)?;
        let yaml = serde_yaml::to_string(&self.entries)
            .map_err(|e| Error::ParseError(format!("{}: {}", self.path.display(), e)))?;

        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(yaml.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        debug!("Wrote {} repo(s) to {}", self.entries.len(), self.path.display());
        Ok(())
    }
}

/// Load every `*.repo` file in `dir`, sorted by file name
///
/// A missing directory means no repositories.
pub fn load_dir(dir: &Path) -> Result<Vec<RepoFile>> {
    let read_dir = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut paths = Vec::new();
    for entry in read_dir {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == REPO_EXT) {
            paths.push(path);
        }
    }
    paths.sort();

    paths.iter().map(|p| RepoFile::load(p)).collect()
}

/// All repository entries with the file that defines them
pub fn list_repos(dir: &Path) -> Result<Vec<(PathBuf, RepoEntry)>> {
    Ok(load_dir(dir)?
        .into_iter()
        .flat_map(|file| {
            let path = file.path;
            file.entries.into_iter().map(move |e| (path.clone(), e))
        })
        .collect())
}

/// Append a repository to `file_name` (default `<name>.repo`)
///
/// Fails with [`Error::ConflictError`] if a repository with the same name
/// already exists in any file.
pub fn add_repo(dir: &Path, file_name: Option<&str>, entry: RepoEntry) -> Result<PathBuf> {
    url::Url::parse(&entry.url)
        .map_err(|e| Error::ParseError(format!("invalid repository URL '{}': {}", entry.url, e)))?;

    let file_name = match file_name {
        Some(f) if f.ends_with(&format!(".{}", REPO_EXT)) => f.to_string(),
        Some(f) => {
            return Err(Error::ParseError(format!(
                "repo file name '{}' must end in .{}",
                f, REPO_EXT
            )));
        }
        None => format!("{}.{}", entry.name, REPO_EXT),
    };
    if file_name.contains(['/', '\\']) {
        return Err(Error::ParseError(format!(
            "repo file name '{}' must not contain a path",
            file_name
        )));
    }

    if let Some((path, _)) = list_repos(dir)?
        .into_iter()
        .find(|(_, e)| e.name == entry.name)
    {
        return Err(Error::ConflictError(format!(
            "repo '{}' already defined in {}",
            entry.name,
            path.display()
        )));
    }

    let path = dir.join(file_name);
    let mut file = if path.exists() {
        RepoFile::load(&path)?
    } else {
        RepoFile {
            path: path.clone(),
            entries: Vec::new(),
        }
    };
    info!("Adding repo {} ({}) to {}", entry.name, entry.url, path.display());
    file.entries.push(entry);
    file.save()?;
    Ok(path)
}

/// Remove the repository called `name`; the file is deleted once empty
pub fn remove_repo(dir: &Path, name: &str) -> Result<PathBuf> {
    for mut file in load_dir(dir)? {
        let before = file.entries.len();
        file.entries.retain(|e| e.name != name);
        if file.entries.len() == before {
            continue;
        }

        if file.entries.is_empty() {
            fs::remove_file(&file.path)?;
        } else {
            file.save()?;
        }
        info!("Removed repo {} from {}", name, file.path.display());
        return Ok(file.path);
    }

    Err(Error::NotFoundError(format!("no repo named '{}'", name)))
}
