//! Fragment kinds and execution targets.

use std::path::{Path, PathBuf};

use clap::ValueEnum;

use crate::config::Config;

/// Address that means "run in this process"; every other address names a
/// remote runtime.
pub const LOCAL_ADDRESS: &str = "__LOCAL__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum FragmentKind {
    /// A single expression whose value gets dumped.
    Expression,
    /// A statement list, the body of `Main`.
    Statements,
    /// Class members including a `void Main()`.
    Program,
    /// A complete source file, compiled without wrapping.
    SourceFile,
    /// A style sheet edited on the device; never compiled.
    StyleSheet,
}

impl FragmentKind {
    pub fn is_compiled(self) -> bool {
        !matches!(self, FragmentKind::StyleSheet)
    }

    /// Whether the fragment is instrumented and wrapped before compiling.
    pub fn is_wrapped(self) -> bool {
        matches!(
            self,
            FragmentKind::Expression | FragmentKind::Statements | FragmentKind::Program
        )
    }

    pub fn display_name(self) -> &'static str {
        match self {
            FragmentKind::Expression => "C# Expression",
            FragmentKind::Statements => "C# Statements",
            FragmentKind::Program => "C# Program",
            FragmentKind::SourceFile => "C# Source File",
            FragmentKind::StyleSheet => "Pixate CSS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum DeviceKind {
    Local,
    Android,
    Ios,
}

/// The runtime a compiled artifact is sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionTarget {
    pub kind: DeviceKind,
    pub name: String,
    pub address: String,
    /// Main application assembly reported by the device during connect.
    pub main_assembly: Option<String>,
    /// Style-sheet paths the device exposes; `Some` means the styling
    /// runtime is available.
    pub style_sheets: Option<Vec<String>>,
}

impl ExecutionTarget {
    pub fn local() -> Self {
        Self {
            kind: DeviceKind::Local,
            name: "Local".into(),
            address: LOCAL_ADDRESS.into(),
            main_assembly: None,
            style_sheets: None,
        }
    }

    pub fn remote(kind: DeviceKind, name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            address: address.into(),
            main_assembly: None,
            style_sheets: None,
        }
    }

    pub fn is_local(&self) -> bool {
        self.kind == DeviceKind::Local || self.address == LOCAL_ADDRESS
    }

    pub fn has_style_sheets(&self) -> bool {
        self.style_sheets.is_some()
    }
}

/// Reference assemblies the compiler needs for a target, plus the alternate
/// base library that replaces the default one when present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaseReferences {
    pub assemblies: Vec<PathBuf>,
    pub base_library: Option<PathBuf>,
}

pub fn base_references(cfg: &Config, target: &ExecutionTarget) -> BaseReferences {
    let root = cfg.reference_assemblies_dir();
    match target.kind {
        DeviceKind::Local => BaseReferences {
            assemblies: ["System.dll", "System.Core.dll", "System.Data.dll", "System.Xml.dll", "Microsoft.CSharp.dll"]
                .iter()
                .map(PathBuf::from)
                .collect(),
            base_library: None,
        },
        DeviceKind::Android => {
            let dir = root.join("MonoAndroid").join("v1.0");
            let mut assemblies = framework_set(&dir, &["System.dll", "System.Core.dll", "System.Xml.dll"]);
            assemblies.push(root.join("MonoAndroid").join("v4.0.3").join("Mono.Android.dll"));
            push_main_assembly(&mut assemblies, target);
            BaseReferences {
                assemblies,
                base_library: Some(dir.join("mscorlib.dll")),
            }
        }
        DeviceKind::Ios => {
            let dir = root.join("MonoTouch").join("v4.0");
            let mut assemblies =
                framework_set(&dir, &["System.dll", "System.Core.dll", "System.Xml.dll", "monotouch.dll"]);
            push_main_assembly(&mut assemblies, target);
            if target.has_style_sheets() {
                if let Some(pixate) = cfg.get_path("PIXATE_DLL").filter(|p| p.exists()) {
                    assemblies.push(pixate);
                }
            }
            BaseReferences {
                assemblies,
                base_library: Some(dir.join("mscorlib.dll")),
            }
        }
    }
}

fn framework_set(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    names.iter().map(|n| dir.join(n)).collect()
}

fn push_main_assembly(assemblies: &mut Vec<PathBuf>, target: &ExecutionTarget) {
    if let Some(main) = target.main_assembly.as_deref().filter(|s| !s.trim().is_empty()) {
        assemblies.push(PathBuf::from(main.trim()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_style_sheets_skip_compilation() {
        assert!(!FragmentKind::StyleSheet.is_compiled());
        assert!(FragmentKind::SourceFile.is_compiled());
        assert!(!FragmentKind::SourceFile.is_wrapped());
        assert!(FragmentKind::Statements.is_wrapped());
    }

    #[test]
    fn ios_references_use_alternate_base_library_and_main_assembly() {
        let cfg = Config::default();
        let mut target = ExecutionTarget::remote(DeviceKind::Ios, "phone", "10.0.0.2:8080");
        target.main_assembly = Some("App.exe".into());
        let refs = base_references(&cfg, &target);
        assert!(refs.base_library.is_some());
        assert!(refs.assemblies.iter().any(|p| p.ends_with("monotouch.dll")));
        assert_eq!(refs.assemblies.last(), Some(&PathBuf::from("App.exe")));
    }

    #[test]
    fn local_target_keeps_regular_base_library() {
        let refs = base_references(&Config::default(), &ExecutionTarget::local());
        assert!(refs.base_library.is_none());
        assert!(ExecutionTarget::local().is_local());
    }
}
