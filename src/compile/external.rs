//! Drives a command-line C# compiler (`mcs` or `csc`).

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use async_trait::async_trait;
use tokio::{process::Command, time::timeout};

use super::{CompilationUnit, CompileError, CompileOutcome, CompileRequest, Compiler, Diagnostic};
use crate::config::Config;
use crate::execution::Artifact;

#[derive(Debug, Clone)]
pub struct ExternalCompiler {
    pub program: String,
    pub timeout: Duration,
    /// Where inline sources are written before compiling.
    pub work_dir: PathBuf,
}

impl ExternalCompiler {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            program: cfg.get("COMPILER").unwrap_or_else(|| "mcs".into()),
            timeout: cfg.timeout("COMPILE_TIMEOUT"),
            work_dir: cfg.work_dir(),
        }
    }
}

pub fn compiler_args(request: &CompileRequest, sources: &[PathBuf]) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-target:library".into(), "-nologo".into(), "-debug-".into()];
    args.push(format!("-out:{}", request.output.display()).into());
    if let Some(base) = &request.base_library {
        args.push("-nostdlib".into());
        args.push(format!("-r:{}", base.display()).into());
    }
    for r in &request.references {
        args.push(format!("-r:{}", r.display()).into());
    }
    args.extend(sources.iter().map(|s| s.as_os_str().to_owned()));
    args
}

#[async_trait]
impl Compiler for ExternalCompiler {
    async fn compile(&self, request: &CompileRequest) -> Result<CompileOutcome, CompileError> {
        // The temp file must outlive the compiler run.
        let (sources, _inline_file) = match &request.unit {
            CompilationUnit::Inline { source, .. } => {
                std::fs::create_dir_all(&self.work_dir)?;
                let file = tempfile::Builder::new()
                    .prefix("snippet")
                    .suffix(".cs")
                    .tempfile_in(&self.work_dir)?;
                std::fs::write(file.path(), source)?;
                (vec![file.path().to_path_buf()], Some(file))
            }
            CompilationUnit::Files(files) => (files.clone(), None),
        };
        if let Some(dir) = request.output.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let _ = std::fs::remove_file(&request.output);

        let mut cmd = Command::new(&self.program);
        cmd.args(compiler_args(request, &sources));
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|source| CompileError::Spawn { program: self.program.clone(), source })?;
        let out = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| CompileError::Timeout(self.timeout.as_secs()))??;

        let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&out.stderr));
        let mut diagnostics: Vec<Diagnostic> = text.lines().filter_map(parse_diagnostic).collect();

        if diagnostics.is_empty() && !out.status.success() {
            diagnostics.push(Diagnostic {
                file: None,
                line: 0,
                message: format!(
                    "{} exited with code {}: {}",
                    self.program,
                    out.status.code().unwrap_or(-1),
                    text.trim()
                ),
            });
        }
        if !diagnostics.is_empty() {
            return Ok(CompileOutcome::Diagnostics(diagnostics));
        }
        read_output(&request.output).await
    }
}

async fn read_output(path: &Path) -> Result<CompileOutcome, CompileError> {
    if !path.exists() {
        return Err(CompileError::MissingOutput(path.to_path_buf()));
    }
    let bytes = tokio::fs::read(path).await?;
    Ok(CompileOutcome::Artifact(Artifact { path: path.to_path_buf(), bytes }))
}

/// Parse one compiler output line of the form
/// `file(line,col): error CODE: text`. Warnings are not diagnostics here.
pub fn parse_diagnostic(line: &str) -> Option<Diagnostic> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix("error ") {
        return Some(Diagnostic { file: None, line: 0, message: rest.trim().to_string() });
    }
    let (location, rest) = line.split_once("): ")?;
    let message = rest.strip_prefix("error ")?;
    let (file, pos) = location.rsplit_once('(')?;
    let line_no = pos.split(',').next()?.trim().parse::<i64>().ok()?;
    Some(Diagnostic {
        file: Some(file.to_string()),
        line: line_no,
        message: message.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_located_errors() {
        let d = parse_diagnostic("/tmp/snippet1.cs(14,9): error CS0103: The name `x' does not exist in the current context")
            .unwrap();
        assert_eq!(d.file.as_deref(), Some("/tmp/snippet1.cs"));
        assert_eq!(d.line, 14);
        assert_eq!(d.message, "CS0103: The name `x' does not exist in the current context");
    }

    #[test]
    fn warnings_and_noise_are_ignored() {
        assert!(parse_diagnostic("a.cs(3,1): warning CS0168: The variable `e' is declared but never used").is_none());
        assert!(parse_diagnostic("Compilation failed: 1 error(s), 0 warnings").is_none());
        assert!(parse_diagnostic("").is_none());
    }

    #[test]
    fn unlocated_errors_use_line_zero() {
        let d = parse_diagnostic("error CS2001: Source file `x.cs' could not be found").unwrap();
        assert_eq!(d.file, None);
        assert_eq!(d.line, 0);
    }

    #[test]
    fn alternate_base_library_disables_stdlib() {
        let req = CompileRequest {
            unit: CompilationUnit::Files(vec![]),
            references: vec![PathBuf::from("monotouch.dll")],
            base_library: Some(PathBuf::from("/fw/mscorlib.dll")),
            output: PathBuf::from("out.dll"),
        };
        let args: Vec<String> = compiler_args(&req, &[PathBuf::from("a.cs")])
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-target:library",
                "-nologo",
                "-debug-",
                "-out:out.dll",
                "-nostdlib",
                "-r:/fw/mscorlib.dll",
                "-r:monotouch.dll",
                "a.cs"
            ]
        );
    }

    #[tokio::test]
    async fn missing_compiler_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = ExternalCompiler {
            program: "protopad-no-such-compiler".into(),
            timeout: Duration::from_secs(5),
            work_dir: dir.path().to_path_buf(),
        };
        let req = CompileRequest {
            unit: CompilationUnit::Inline { source: "class A {}".into(), header_lines: 0 },
            references: vec![],
            base_library: None,
            output: dir.path().join("out.dll"),
        };
        let err = compiler.compile(&req).await.unwrap_err();
        assert!(matches!(err, CompileError::Spawn { .. }));
    }
}
