//! Resolved reference metadata, keyed by assembly path.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceInfo {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    /// Hex md5 of the assembly bytes.
    pub digest: String,
}

impl ReferenceInfo {
    pub fn inspect(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("reading reference: {}", path.display()))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            path: path.to_path_buf(),
            name,
            size: bytes.len() as u64,
            digest: format!("{:x}", md5::compute(&bytes)),
        })
    }
}

/// Blocking; meant to run off the session loop. Unreadable references are
/// logged and left out.
pub fn load_references(paths: &[PathBuf]) -> Vec<ReferenceInfo> {
    paths
        .iter()
        .filter_map(|p| match ReferenceInfo::inspect(p) {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::warn!(path = %p.display(), error = %e, "skipping reference");
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceCache {
    entries: BTreeMap<PathBuf, ReferenceInfo>,
    storage_path: Option<PathBuf>,
}

impl ReferenceCache {
    pub fn from_config(cfg: &Config) -> Self {
        let storage_path = cfg.store_dir().join("references.json");
        let mut cache = Self { entries: BTreeMap::new(), storage_path: Some(storage_path) };
        if let Err(e) = cache.read() {
            tracing::debug!(error = %e, "no usable reference cache on disk");
        }
        cache
    }

    pub fn get(&self, path: &Path) -> Option<&ReferenceInfo> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store freshly loaded entries and persist them when the cache is
    /// file-backed.
    pub fn apply(&mut self, infos: Vec<ReferenceInfo>) -> Result<()> {
        for info in infos {
            self.entries.insert(info.path.clone(), info);
        }
        self.write()
    }

    fn read(&mut self) -> Result<()> {
        let Some(p) = &self.storage_path else { return Ok(()) };
        if !p.exists() {
            return Ok(());
        }
        let text = fs::read_to_string(p)?;
        let infos: Vec<ReferenceInfo> = serde_json::from_str(&text)?;
        self.entries = infos.into_iter().map(|i| (i.path.clone(), i)).collect();
        Ok(())
    }

    fn write(&self) -> Result<()> {
        let Some(p) = &self.storage_path else { return Ok(()) };
        if self.is_empty() && !p.exists() {
            return Ok(());
        }
        if let Some(dir) = p.parent() {
            fs::create_dir_all(dir)?;
        }
        let infos: Vec<&ReferenceInfo> = self.entries.values().collect();
        fs::write(p, serde_json::to_string(&infos)?)
            .with_context(|| format!("writing reference cache: {}", p.display()))?;
        Ok(())
    }
}
