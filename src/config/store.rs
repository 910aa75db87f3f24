//! Persisted connection, project and per-project file lists.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::target::FragmentKind;

const PROJECT_FOLDER: &str = ".protopad";
const PROJECT_FILE: &str = "project.toml";
const GLOBAL_FILE: &str = "protopad.toml";

/// Key/value persistence grouped into sections.
pub trait ConfigStore {
    fn load(&self, section: &str, key: &str) -> Option<String>;
    fn save(&mut self, section: &str, key: &str, value: &str) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
struct Sections(BTreeMap<String, BTreeMap<String, String>>);

/// TOML-backed store: one table per section, string values. Section and
/// key lookups ignore case.
#[derive(Debug, Clone)]
pub struct TomlStore {
    path: PathBuf,
    sections: Sections,
}

impl TomlStore {
    /// Open `path`; a missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let sections = match fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "ignoring malformed config store");
                Sections::default()
            }),
            Err(_) => Sections::default(),
        };
        Self { path, sections }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn section_name(&self, section: &str) -> Option<&String> {
        self.sections.0.keys().find(|name| name.eq_ignore_ascii_case(section))
    }
}

impl ConfigStore for TomlStore {
    fn load(&self, section: &str, key: &str) -> Option<String> {
        let entries = self.sections.0.get(self.section_name(section)?)?;
        entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.clone())
    }

    fn save(&mut self, section: &str, key: &str, value: &str) -> Result<()> {
        let name = self.section_name(section).cloned().unwrap_or_else(|| section.to_string());
        let entries = self.sections.0.entry(name).or_default();
        let key = entries
            .keys()
            .find(|k| k.eq_ignore_ascii_case(key))
            .cloned()
            .unwrap_or_else(|| key.to_string());
        entries.insert(key, value.to_string());

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating config folder: {}", dir.display()))?;
        }
        let text = toml::to_string_pretty(&self.sections).context("serializing config store")?;
        fs::write(&self.path, text)
            .with_context(|| format!("writing config: {}", self.path.display()))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigItem {
    Ip,
    Port,
    Projects,
    Sources,
    References,
    /// Extra `using` lines for one fragment kind.
    Imports(FragmentKind),
}

impl ConfigItem {
    pub fn section(self) -> &'static str {
        match self {
            ConfigItem::Ip | ConfigItem::Port => "Connect",
            ConfigItem::Sources | ConfigItem::References => "Files",
            ConfigItem::Projects => "Projects",
            ConfigItem::Imports(_) => "Imports",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            ConfigItem::Ip => "IP",
            ConfigItem::Port => "PORT",
            ConfigItem::Projects => "Projects",
            ConfigItem::Sources => "Sources",
            ConfigItem::References => "References",
            ConfigItem::Imports(kind) => match kind {
                FragmentKind::Expression => "Expression",
                FragmentKind::Statements => "Statements",
                FragmentKind::Program => "Program",
                FragmentKind::SourceFile => "SourceFile",
                FragmentKind::StyleSheet => "StyleSheet",
            },
        }
    }

    /// Items that follow the working project when one is active.
    fn is_project_level(self) -> bool {
        !matches!(self, ConfigItem::Projects)
    }
}

/// A folder the user works in; its settings live in `.protopad/project.toml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub path: PathBuf,
}

impl Project {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let folder = path.join(PROJECT_FOLDER);
        fs::create_dir_all(&folder)
            .with_context(|| format!("creating project folder: {}", folder.display()))?;
        Ok(Self { name, path })
    }

    pub fn store_path(&self) -> PathBuf {
        self.path.join(PROJECT_FOLDER).join(PROJECT_FILE)
    }
}

/// Routes config items to the global store or the working project's store.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    global: TomlStore,
    project: Option<(Project, TomlStore)>,
}

impl ProjectConfig {
    pub fn open(store_dir: &Path) -> Self {
        Self { global: TomlStore::open(store_dir.join(GLOBAL_FILE)), project: None }
    }

    pub fn set_working_project(&mut self, project: Option<Project>) {
        self.project = project.map(|p| {
            let store = TomlStore::open(p.store_path());
            (p, store)
        });
    }

    pub fn working_project(&self) -> Option<&Project> {
        self.project.as_ref().map(|(p, _)| p)
    }

    pub fn load(&self, item: ConfigItem) -> Option<String> {
        self.store_for(item).load(item.section(), item.key())
    }

    pub fn save(&mut self, item: ConfigItem, value: &str) -> Result<()> {
        let (section, key) = (item.section(), item.key());
        self.store_for_mut(item).save(section, key, value)
    }

    pub fn projects(&self) -> Vec<String> {
        self.load(ConfigItem::Projects)
            .map(|s| crate::utils::split_path_list(&s))
            .unwrap_or_default()
    }

    /// Remember a project folder; missing folders are ignored.
    pub fn add_project(&mut self, folder: &Path) -> Result<()> {
        if !folder.is_dir() {
            return Ok(());
        }
        let mut projects = self.projects();
        let entry = folder.display().to_string();
        if !projects.contains(&entry) {
            projects.push(entry);
        }
        self.save(ConfigItem::Projects, &crate::utils::join_path_list(&projects))
    }

    fn store_for(&self, item: ConfigItem) -> &TomlStore {
        match &self.project {
            Some((_, store)) if item.is_project_level() => store,
            _ => &self.global,
        }
    }

    fn store_for_mut(&mut self, item: ConfigItem) -> &mut TomlStore {
        match &mut self.project {
            Some((_, store)) if item.is_project_level() => store,
            _ => &mut self.global,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_store_saves_and_reloads_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("protopad.toml");
        let mut store = TomlStore::open(&path);
        store.save("Connect", "IP", "10.0.0.5").unwrap();
        store.save("Files", "Sources", "a.cs|b.cs|").unwrap();
        store.save("Connect", "IP", "10.0.0.6").unwrap();

        let reopened = TomlStore::open(&path);
        assert_eq!(reopened.load("Connect", "IP").as_deref(), Some("10.0.0.6"));
        assert_eq!(reopened.load("files", "sources").as_deref(), Some("a.cs|b.cs|"));
        assert!(reopened.load("Connect", "PORT").is_none());

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("[Connect]"));
        assert!(text.contains("IP = \"10.0.0.6\""));
    }

    #[test]
    fn malformed_store_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("protopad.toml");
        fs::write(&path, "[Connect\nIP = ").unwrap();
        let mut store = TomlStore::open(&path);
        assert!(store.load("Connect", "IP").is_none());
        store.save("Connect", "IP", "10.0.0.7").unwrap();
        assert_eq!(TomlStore::open(&path).load("Connect", "IP").as_deref(), Some("10.0.0.7"));
    }

    #[test]
    fn imports_are_kept_per_fragment_kind() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = ProjectConfig::open(dir.path());
        cfg.save(ConfigItem::Imports(FragmentKind::Statements), "using System.Net;|").unwrap();
        let reopened = ProjectConfig::open(dir.path());
        assert_eq!(
            reopened.load(ConfigItem::Imports(FragmentKind::Statements)).as_deref(),
            Some("using System.Net;|")
        );
        assert!(reopened.load(ConfigItem::Imports(FragmentKind::Program)).is_none());
    }

    #[test]
    fn project_level_items_follow_working_project() {
        let dir = tempfile::tempdir().unwrap();
        let project_dir = dir.path().join("demo");
        fs::create_dir_all(&project_dir).unwrap();

        let mut cfg = ProjectConfig::open(dir.path());
        cfg.save(ConfigItem::Sources, "global.cs|").unwrap();
        cfg.add_project(&project_dir).unwrap();

        cfg.set_working_project(Some(Project::open(&project_dir).unwrap()));
        assert!(cfg.load(ConfigItem::Sources).is_none());
        cfg.save(ConfigItem::Sources, "local.cs|").unwrap();
        assert_eq!(cfg.load(ConfigItem::Sources).as_deref(), Some("local.cs|"));
        assert_eq!(cfg.projects(), vec![project_dir.display().to_string()]);

        cfg.set_working_project(None);
        assert_eq!(cfg.load(ConfigItem::Sources).as_deref(), Some("global.cs|"));
        assert!(project_dir.join(".protopad").join("project.toml").exists());
    }
}
