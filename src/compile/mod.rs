//! Compilation requests, diagnostics and the two-phase build.

use std::{
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use thiserror::Error;

use crate::execution::Artifact;

pub mod external;

pub use external::ExternalCompiler;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompilationUnit {
    /// Wrapped fragment text. Diagnostics are shifted back by `header_lines`.
    Inline { source: String, header_lines: usize },
    /// Source files compiled as they are.
    Files(Vec<PathBuf>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileRequest {
    pub unit: CompilationUnit,
    pub references: Vec<PathBuf>,
    /// Replaces the compiler's default base library when set.
    pub base_library: Option<PathBuf>,
    pub output: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub file: Option<String>,
    /// Line as reported by the compiler until [`remap`] runs; afterwards
    /// relative to the fragment for inline units (0-based) and unchanged
    /// for files.
    pub line: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    Artifact(Artifact),
    Diagnostics(Vec<Diagnostic>),
}

impl CompileOutcome {
    pub fn artifact(&self) -> Option<&Artifact> {
        match self {
            CompileOutcome::Artifact(a) => Some(a),
            CompileOutcome::Diagnostics(_) => None,
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            CompileOutcome::Artifact(_) => &[],
            CompileOutcome::Diagnostics(d) => d,
        }
    }
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("failed to start compiler {program}: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("compiler timed out after {0}s")]
    Timeout(u64),
    #[error("compiler reported success but wrote no output at {0}")]
    MissingOutput(PathBuf),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The external compiler capability. Returned diagnostics carry raw
/// compiler line numbers.
#[async_trait]
pub trait Compiler: Send + Sync {
    async fn compile(&self, request: &CompileRequest) -> Result<CompileOutcome, CompileError>;
}

/// Shift inline diagnostics back by the header's line count. Their file is
/// the scratch copy of the wrapped fragment, so it is dropped.
pub fn remap(unit: &CompilationUnit, diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
    match unit {
        CompilationUnit::Inline { header_lines, .. } => diagnostics
            .into_iter()
            .map(|d| Diagnostic { file: None, line: d.line - *header_lines as i64, ..d })
            .collect(),
        CompilationUnit::Files(_) => diagnostics,
    }
}

/// Compile one unit and remap its diagnostics. Any diagnostic means no
/// artifact, even if the compiler left one behind.
pub async fn compile_unit(
    compiler: &dyn Compiler,
    request: &CompileRequest,
) -> Result<CompileOutcome, CompileError> {
    tracing::debug!(output = %request.output.display(), refs = request.references.len(), "compiling");
    match compiler.compile(request).await? {
        CompileOutcome::Diagnostics(d) if !d.is_empty() => {
            tracing::info!(count = d.len(), "compile produced diagnostics");
            Ok(CompileOutcome::Diagnostics(remap(&request.unit, d)))
        }
        CompileOutcome::Diagnostics(_) => Err(CompileError::MissingOutput(request.output.clone())),
        ok => Ok(ok),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    pub outcome: CompileOutcome,
    /// Artifact of the auxiliary sources, when they were built.
    pub aux_artifact: Option<Artifact>,
    pub aux_diagnostics: Vec<Diagnostic>,
}

/// Build `main`, first compiling `aux_sources` into `aux_output` and adding
/// that artifact to the references when it succeeds. A failed auxiliary
/// build does not stop the main one.
pub async fn build(
    compiler: &dyn Compiler,
    aux_sources: &[PathBuf],
    aux_output: &Path,
    mut main: CompileRequest,
) -> Result<BuildOutput, CompileError> {
    let mut aux_artifact = None;
    let mut aux_diagnostics = Vec::new();

    if !aux_sources.is_empty() {
        let aux = CompileRequest {
            unit: CompilationUnit::Files(aux_sources.to_vec()),
            references: main.references.clone(),
            base_library: main.base_library.clone(),
            output: aux_output.to_path_buf(),
        };
        match compile_unit(compiler, &aux).await? {
            CompileOutcome::Artifact(a) => {
                main.references.push(a.path.clone());
                aux_artifact = Some(a);
            }
            CompileOutcome::Diagnostics(d) => {
                tracing::warn!(count = d.len(), "auxiliary sources failed to compile");
                aux_diagnostics = d;
            }
        }
    }

    let outcome = compile_unit(compiler, &main).await?;
    Ok(BuildOutput { outcome, aux_artifact, aux_diagnostics })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records requests; fails file units when `fail_files` is set and
    /// inline units with one diagnostic on raw line 12.
    struct FakeCompiler {
        fail_files: bool,
        fail_inline: bool,
        seen: Mutex<Vec<CompileRequest>>,
    }

    impl FakeCompiler {
        fn new(fail_files: bool, fail_inline: bool) -> Self {
            Self { fail_files, fail_inline, seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl Compiler for FakeCompiler {
        async fn compile(&self, request: &CompileRequest) -> Result<CompileOutcome, CompileError> {
            self.seen.lock().unwrap().push(request.clone());
            let fail = match request.unit {
                CompilationUnit::Files(_) => self.fail_files,
                CompilationUnit::Inline { .. } => self.fail_inline,
            };
            if fail {
                return Ok(CompileOutcome::Diagnostics(vec![Diagnostic {
                    file: Some("unit.cs".into()),
                    line: 12,
                    message: "CS0103: The name 'x' does not exist".into(),
                }]));
            }
            Ok(CompileOutcome::Artifact(Artifact { path: request.output.clone(), bytes: vec![1] }))
        }
    }

    fn inline_request(header_lines: usize) -> CompileRequest {
        CompileRequest {
            unit: CompilationUnit::Inline { source: "x".into(), header_lines },
            references: vec![PathBuf::from("System.dll")],
            base_library: None,
            output: PathBuf::from("snippet.dll"),
        }
    }

    #[tokio::test]
    async fn inline_diagnostics_are_shifted_by_header() {
        let compiler = FakeCompiler::new(false, true);
        let out = compile_unit(&compiler, &inline_request(9)).await.unwrap();
        assert_eq!(out.diagnostics()[0].line, 3);
        assert_eq!(out.diagnostics()[0].file, None);
        assert!(out.artifact().is_none());
    }

    #[tokio::test]
    async fn file_diagnostics_pass_through() {
        let compiler = FakeCompiler::new(true, false);
        let req = CompileRequest {
            unit: CompilationUnit::Files(vec![PathBuf::from("a.cs")]),
            ..inline_request(9)
        };
        let out = compile_unit(&compiler, &req).await.unwrap();
        assert_eq!(out.diagnostics()[0].line, 12);
        assert_eq!(out.diagnostics()[0].file.as_deref(), Some("unit.cs"));
    }

    #[tokio::test]
    async fn successful_aux_build_is_referenced() {
        let compiler = FakeCompiler::new(false, false);
        let out = build(&compiler, &[PathBuf::from("Helpers.cs")], Path::new("aux.dll"), inline_request(3))
            .await
            .unwrap();
        assert!(out.outcome.artifact().is_some());
        assert!(out.aux_artifact.is_some());

        let seen = compiler.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[1].references.contains(&PathBuf::from("aux.dll")));
    }

    #[tokio::test]
    async fn failed_aux_build_does_not_stop_main_compile() {
        let compiler = FakeCompiler::new(true, false);
        let out = build(&compiler, &[PathBuf::from("Broken.cs")], Path::new("aux.dll"), inline_request(3))
            .await
            .unwrap();
        assert!(out.outcome.artifact().is_some());
        assert!(out.aux_artifact.is_none());
        assert_eq!(out.aux_diagnostics.len(), 1);

        let seen = compiler.seen.lock().unwrap();
        assert!(!seen[1].references.contains(&PathBuf::from("aux.dll")));
    }

    #[tokio::test]
    async fn no_aux_sources_means_single_compile() {
        let compiler = FakeCompiler::new(false, false);
        build(&compiler, &[], Path::new("aux.dll"), inline_request(3)).await.unwrap();
        assert_eq!(compiler.seen.lock().unwrap().len(), 1);
    }
}
