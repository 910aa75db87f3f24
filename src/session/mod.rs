//! The owning session context: current target, fragment kind, references
//! and auxiliary sources, plus the compile/execute pipeline that runs
//! against them.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::cache::{load_references, ReferenceCache, ReferenceInfo};
use crate::compile::{self, CompilationUnit, CompileOutcome, CompileRequest, Compiler, Diagnostic, ExternalCompiler};
use crate::config::{Config, ConfigItem, ProjectConfig};
use crate::dump::DumpNode;
use crate::execution::{Artifact, ExecutionResult, Executor, LocalExecutor};
use crate::instrument::{instrument_source, Instrumented};
use crate::mapper::{self, LineTable, MappedError};
use crate::target::{base_references, DeviceKind, ExecutionTarget, FragmentKind};
use crate::template::{self, Wrap};
use crate::transport::Transport;
use crate::utils::{collect_source_files, join_path_list, split_path_list};

/// Asks the device for the app's documents folder during connect.
const DOCUMENTS_QUERY: &str = "Environment.GetFolderPath(Environment.SpecialFolder.Personal)";

#[derive(Debug)]
pub enum SessionEvent {
    ReferencesLoaded(Vec<ReferenceInfo>),
}

/// A fragment after wrapping and instrumentation, ready to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    pub wrap: Wrap,
    pub instrumented: Instrumented,
    pub source: String,
}

/// Outcome of one compile-and-run. Auxiliary source diagnostics keep their
/// file and compiler line; fragment diagnostics have no file and are
/// relative to the fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    /// Compile failed; auxiliary diagnostics come first.
    Diagnostics(Vec<Diagnostic>),
    Executed {
        result: ExecutionResult,
        location: Option<MappedError>,
        aux_diagnostics: Vec<Diagnostic>,
    },
    /// The runtime answered with nothing usable.
    NoResult { aux_diagnostics: Vec<Diagnostic> },
}

impl Report {
    /// Errors from auxiliary sources that did not stop the run.
    pub fn aux_diagnostics(&self) -> &[Diagnostic] {
        match self {
            Report::Diagnostics(_) => &[],
            Report::Executed { aux_diagnostics, .. } | Report::NoResult { aux_diagnostics } => aux_diagnostics,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Report::Executed { result, .. } if result.is_success())
    }
}

pub struct Session {
    cfg: Config,
    target: ExecutionTarget,
    kind: FragmentKind,
    extra_imports: Vec<String>,
    aux_sources: Vec<PathBuf>,
    references: Vec<PathBuf>,
    /// References compiled against; a subset of `references`.
    loaded: Vec<PathBuf>,
    cache: ReferenceCache,
    store: Option<ProjectConfig>,
    diagnostics: Vec<Diagnostic>,
    last_artifact: Option<Artifact>,
    status: Option<String>,
    compiler: Box<dyn Compiler>,
    local: Box<dyn Executor>,
    events_tx: UnboundedSender<SessionEvent>,
    events_rx: UnboundedReceiver<SessionEvent>,
    builds: u64,
}

impl Session {
    pub fn new(cfg: Config, compiler: Box<dyn Compiler>, local: Box<dyn Executor>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            cfg,
            target: ExecutionTarget::local(),
            kind: FragmentKind::Statements,
            extra_imports: Vec::new(),
            aux_sources: Vec::new(),
            references: Vec::new(),
            loaded: Vec::new(),
            cache: ReferenceCache::default(),
            store: None,
            diagnostics: Vec::new(),
            last_artifact: None,
            status: None,
            compiler,
            local,
            events_tx,
            events_rx,
            builds: 0,
        }
    }

    pub fn from_config(cfg: Config) -> Self {
        let compiler = Box::new(ExternalCompiler::from_config(&cfg));
        let local = Box::new(LocalExecutor::from_config(&cfg));
        let cache = ReferenceCache::from_config(&cfg);
        let mut session = Self::new(cfg, compiler, local);
        session.cache = cache;
        session
    }

    /// Restore sources, references and imports from a config store and
    /// persist later changes to it.
    pub fn with_store(mut self, store: ProjectConfig) -> Self {
        let load = |item| {
            store
                .load(item)
                .map(|s| split_path_list(&s).into_iter().map(PathBuf::from).collect::<Vec<_>>())
                .unwrap_or_default()
        };
        self.aux_sources = load(ConfigItem::Sources);
        self.references = load(ConfigItem::References);
        self.loaded = self.references.clone();
        self.store = Some(store);
        self.restore_imports();
        self
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn target(&self) -> &ExecutionTarget {
        &self.target
    }

    pub fn kind(&self) -> FragmentKind {
        self.kind
    }

    /// Switch fragment kind; imports saved for that kind replace the
    /// current ones when a store is attached.
    pub fn set_kind(&mut self, kind: FragmentKind) {
        self.kind = kind;
        self.restore_imports();
    }

    fn restore_imports(&mut self) {
        let Some(store) = self.store.as_ref() else { return };
        self.extra_imports = store
            .load(ConfigItem::Imports(self.kind))
            .map(|s| split_path_list(&s))
            .unwrap_or_default();
        template::augment_imports(&mut self.extra_imports, &self.target);
    }

    /// Add a `using` line for the current kind. Bare namespaces are
    /// accepted.
    pub fn add_import(&mut self, import: &str) -> Result<()> {
        let line = normalize_import(import);
        if !self.extra_imports.contains(&line) {
            self.extra_imports.push(line);
            self.persist_imports()?;
        }
        Ok(())
    }

    pub fn remove_import(&mut self, import: &str) -> Result<bool> {
        let line = normalize_import(import);
        let before = self.extra_imports.len();
        self.extra_imports.retain(|i| *i != line);
        if self.extra_imports.len() == before {
            return Ok(false);
        }
        self.persist_imports()?;
        Ok(true)
    }

    fn persist_imports(&mut self) -> Result<()> {
        let Some(store) = self.store.as_mut() else { return Ok(()) };
        store.save(ConfigItem::Imports(self.kind), &join_path_list(&self.extra_imports))
    }

    pub fn extra_imports(&self) -> &[String] {
        &self.extra_imports
    }

    pub fn aux_sources(&self) -> &[PathBuf] {
        &self.aux_sources
    }

    pub fn references(&self) -> &[PathBuf] {
        &self.references
    }

    pub fn loaded_references(&self) -> &[PathBuf] {
        &self.loaded
    }

    pub fn reference_cache(&self) -> &ReferenceCache {
        &self.cache
    }

    /// Diagnostics of the last compile; cleared when a new one starts.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn last_artifact(&self) -> Option<&Artifact> {
        self.last_artifact.as_ref()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Wrap and instrument `code` for the current kind and target.
    pub fn prepare(&mut self, code: &str) -> Result<Prepared> {
        self.prepare_as(code, self.kind, true)
    }

    fn prepare_as(&mut self, code: &str, kind: FragmentKind, instrument: bool) -> Result<Prepared> {
        if !kind.is_compiled() {
            bail!("{} fragments are not compiled", kind.display_name());
        }
        let mut wrap = template::wrap(kind, &self.target, &mut self.extra_imports, self.cfg.dump_limits())?;
        wrap.header = publish_main(&wrap.header);
        let instrumented = if instrument {
            instrument_source(code, kind)
        } else {
            Instrumented { text: code.to_string(), offsets: Vec::new() }
        };
        let body = if kind.is_wrapped() { publish_main(&instrumented.text) } else { instrumented.text.clone() };
        let source = wrap.apply(&body);
        Ok(Prepared { wrap, instrumented, source })
    }

    /// Compile `code` as the current kind, run it on the current target and
    /// map any failure back onto `code`.
    pub async fn send_code(&mut self, code: &str) -> Result<Report> {
        let kind = self.kind;
        self.run(code, kind, true).await
    }

    async fn run(&mut self, code: &str, kind: FragmentKind, instrument: bool) -> Result<Report> {
        self.diagnostics.clear();
        self.last_artifact = None;

        let prepared = self.prepare_as(code, kind, instrument)?;
        tracing::debug!(kind = ?kind, statements = prepared.instrumented.offsets.len(), "prepared fragment");

        let base = base_references(&self.cfg, &self.target);
        let mut references = base.assemblies;
        references.extend(self.loaded.iter().cloned());

        let work_dir = self.cfg.work_dir();
        self.builds += 1;
        let request = CompileRequest {
            unit: CompilationUnit::Inline {
                header_lines: prepared.wrap.header_lines(),
                source: prepared.source,
            },
            references,
            base_library: base.base_library,
            output: work_dir.join(format!("snippet-{}-{}.dll", std::process::id(), self.builds)),
        };
        let aux_output = work_dir.join(format!("aux-{}.dll", std::process::id()));
        let build = compile::build(self.compiler.as_ref(), &self.aux_sources, &aux_output, request).await?;

        let aux_diagnostics = build.aux_diagnostics;
        self.diagnostics = aux_diagnostics.clone();
        let artifact = match build.outcome {
            CompileOutcome::Diagnostics(d) => {
                self.diagnostics.extend(d);
                return Ok(Report::Diagnostics(self.diagnostics.clone()));
            }
            CompileOutcome::Artifact(a) => a,
        };

        let reply = if self.target.is_local() {
            self.local.execute(&artifact).await?
        } else {
            let transport = Transport::from_config(&self.cfg, &self.target.address)?;
            transport.execute(&artifact).await?
        };
        self.last_artifact = Some(artifact);

        Ok(match reply {
            Some(result) => {
                let location = mapper::locate(&result, &LineTable::new(code));
                Report::Executed { result, location, aux_diagnostics }
            }
            None => Report::NoResult { aux_diagnostics },
        })
    }

    /// Switch to `target` without talking to it.
    pub fn set_target(&mut self, target: ExecutionTarget) {
        template::augment_imports(&mut self.extra_imports, &target);
        self.target = target;
        self.status = None;
    }

    /// Switch to `target`, running the handshake for remote devices.
    pub async fn connect(&mut self, mut target: ExecutionTarget) -> Result<()> {
        if !target.is_local() {
            let transport = Transport::from_config(&self.cfg, &target.address)?;
            target.main_assembly = transport
                .main_assembly()
                .await
                .with_context(|| format!("connecting to {}", target.address))?;
            if target.kind == DeviceKind::Ios {
                target.style_sheets = transport.style_sheet_files().await?;
            }
        }
        tracing::info!(target = %target.name, address = %target.address, "connected");
        self.set_target(target);

        if self.target.kind == DeviceKind::Ios {
            match self.run(DOCUMENTS_QUERY, FragmentKind::Expression, false).await {
                Ok(Report::Executed { result: ExecutionResult::Success(values), .. }) => {
                    if let Some((_, DumpNode::Primitive { value })) = values.first() {
                        self.status = Some(format!("Documents folder: {}", value));
                    }
                }
                Ok(other) => tracing::warn!(?other, "documents folder query gave no value"),
                Err(e) => tracing::warn!(error = %e, "documents folder query failed"),
            }
        }
        self.start_reference_loading();
        Ok(())
    }

    /// Send a style sheet to the device.
    pub async fn push_style_sheet(&self, path: &str, css: &str) -> Result<()> {
        if !self.target.has_style_sheets() {
            bail!("{} does not expose style sheets", self.target.name);
        }
        let transport = Transport::from_config(&self.cfg, &self.target.address)?;
        transport.update_style_sheet(path, css).await?;
        tracing::info!(path, bytes = css.len(), "style sheet pushed");
        Ok(())
    }

    /// Fetch a file from the device, e.g. one of its style sheets.
    pub async fn fetch_file(&self, path: &str) -> Result<String> {
        if self.target.is_local() {
            bail!("fetching files needs a remote target");
        }
        let transport = Transport::from_config(&self.cfg, &self.target.address)?;
        let bytes = transport.get_file_contents(path).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Remove everything from the device's root view.
    pub async fn clear_window(&mut self) -> Result<Report> {
        let Some(code) = template::clear_window_statements(self.target.kind) else {
            bail!("the local target has no window to clear");
        };
        self.run(code, FragmentKind::Statements, false).await
    }

    /// Add a reference assembly. Remote runtimes receive its bytes so they
    /// load it before the next fragment needs it.
    pub async fn load_reference(&mut self, path: &Path) -> Result<()> {
        let path = path.to_path_buf();
        if !self.references.contains(&path) {
            self.references.push(path.clone());
            self.persist(ConfigItem::References, &self.references.clone())?;
        }
        if !self.loaded.contains(&path) {
            self.loaded.push(path.clone());
        }
        if !self.target.is_local() {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("reading reference: {}", path.display()))?;
            let transport = Transport::from_config(&self.cfg, &self.target.address)?;
            if let Some(ExecutionResult::Failure { message, .. }) = transport.execute_assembly(bytes).await? {
                tracing::warn!(path = %path.display(), %message, "device failed to load reference");
            }
        }
        self.start_reference_loading();
        Ok(())
    }

    /// Stop compiling against `path` but keep it in the reference list.
    /// Returns whether it was loaded.
    pub fn unload_reference(&mut self, path: &Path) -> bool {
        let before = self.loaded.len();
        self.loaded.retain(|p| p != path);
        let unloaded = self.loaded.len() != before;
        if unloaded {
            tracing::info!(path = %path.display(), "reference unloaded");
        }
        unloaded
    }

    /// Drop `path` from the reference list altogether.
    pub fn remove_reference(&mut self, path: &Path) -> Result<bool> {
        self.unload_reference(path);
        let before = self.references.len();
        self.references.retain(|p| p != path);
        if self.references.len() == before {
            return Ok(false);
        }
        self.persist(ConfigItem::References, &self.references.clone())?;
        Ok(true)
    }

    /// Add auxiliary source files or folders, compiled ahead of each
    /// fragment.
    pub fn add_sources(&mut self, items: &[String]) -> Result<usize> {
        let added = collect_source_files(items, &self.aux_sources);
        let count = added.len();
        if count > 0 {
            self.aux_sources.extend(added);
            self.persist(ConfigItem::Sources, &self.aux_sources.clone())?;
        }
        Ok(count)
    }

    /// Remove auxiliary sources; returns how many were dropped.
    pub fn remove_sources(&mut self, items: &[PathBuf]) -> Result<usize> {
        let before = self.aux_sources.len();
        self.aux_sources.retain(|p| !items.contains(p));
        let removed = before - self.aux_sources.len();
        if removed > 0 {
            self.persist(ConfigItem::Sources, &self.aux_sources.clone())?;
        }
        Ok(removed)
    }

    fn persist(&mut self, item: ConfigItem, paths: &[PathBuf]) -> Result<()> {
        let Some(store) = self.store.as_mut() else { return Ok(()) };
        let list: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        store.save(item, &join_path_list(&list))
    }

    /// Resolve metadata for all current references off the session loop.
    /// Completion arrives as a [`SessionEvent`].
    pub fn start_reference_loading(&self) {
        let mut paths = base_references(&self.cfg, &self.target).assemblies;
        paths.extend(self.references.iter().cloned());
        paths.retain(|p| p.is_absolute());
        let tx = self.events_tx.clone();
        tracing::debug!(count = paths.len(), "loading reference metadata");
        tokio::task::spawn_blocking(move || {
            let infos = load_references(&paths);
            let _ = tx.send(SessionEvent::ReferencesLoaded(infos));
        });
    }

    /// Apply events that have already arrived; returns how many.
    pub fn poll_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply(event);
            applied += 1;
        }
        applied
    }

    /// Wait for the next event and apply it.
    pub async fn next_event(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => {
                self.apply(event);
                true
            }
            None => false,
        }
    }

    fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::ReferencesLoaded(infos) => {
                tracing::debug!(count = infos.len(), cached = self.cache.len(), "reference metadata loaded");
                if let Err(e) = self.cache.apply(infos) {
                    tracing::warn!(error = %e, "could not persist reference cache");
                }
            }
        }
    }
}

fn normalize_import(import: &str) -> String {
    let import = import.trim().trim_end_matches(';').trim_end();
    match import.strip_prefix("using ") {
        Some(ns) => format!("using {};", ns.trim()),
        None => format!("using {};", import),
    }
}

/// The runner calls `Main` through reflection and needs it public.
fn publish_main(text: &str) -> String {
    text.replace("public void Main(", "void Main(").replace("void Main(", "public void Main(")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    use crate::compile::CompileError;

    struct Recorder {
        sources: Arc<Mutex<Vec<String>>>,
        diagnostics: Vec<Diagnostic>,
    }

    #[async_trait]
    impl Compiler for Recorder {
        async fn compile(&self, request: &CompileRequest) -> Result<CompileOutcome, CompileError> {
            if let CompilationUnit::Inline { source, .. } = &request.unit {
                self.sources.lock().unwrap().push(source.clone());
            }
            if !self.diagnostics.is_empty() {
                return Ok(CompileOutcome::Diagnostics(self.diagnostics.clone()));
            }
            Ok(CompileOutcome::Artifact(Artifact { path: request.output.clone(), bytes: vec![0] }))
        }
    }

    struct Canned(Option<ExecutionResult>);

    #[async_trait]
    impl Executor for Canned {
        async fn execute(&self, _artifact: &Artifact) -> Result<Option<ExecutionResult>> {
            Ok(self.0.clone())
        }
    }

    fn session(diagnostics: Vec<Diagnostic>, reply: Option<ExecutionResult>) -> (Session, Arc<Mutex<Vec<String>>>) {
        let sources = Arc::new(Mutex::new(Vec::new()));
        let compiler = Recorder { sources: sources.clone(), diagnostics };
        let mut cfg = Config::default();
        cfg.set("WORK_DIR", std::env::temp_dir().join("protopad-test").display().to_string());
        (Session::new(cfg, Box::new(compiler), Box::new(Canned(reply))), sources)
    }

    #[test]
    fn main_is_made_public_once() {
        assert_eq!(publish_main("void Main()"), "public void Main()");
        assert_eq!(publish_main("public void Main()"), "public void Main()");
    }

    #[tokio::test]
    async fn failure_is_located_in_raw_fragment() {
        let (mut s, sources) = session(
            vec![],
            Some(ExecutionResult::Failure { offset: Some(11), message: "boom".into() }),
        );
        let report = s.send_code("var a = 1;\nFoo(a);").await.unwrap();
        match report {
            Report::Executed { location: Some(loc), .. } => {
                assert_eq!((loc.line, loc.column), (1, 0));
                assert_eq!(loc.message, "boom");
            }
            other => panic!("unexpected report: {:?}", other),
        }
        let compiled = sources.lock().unwrap()[0].clone();
        assert!(compiled.contains("____TrackStatementOffset(11);Foo(a);"));
        assert!(compiled.contains("public void Main()"));
        assert!(s.last_artifact().is_some());
    }

    #[tokio::test]
    async fn diagnostics_replace_previous_ones_and_drop_artifact() {
        let diag = Diagnostic { file: None, line: 14, message: "CS1002: ; expected".into() };
        let (mut s, _) = session(vec![diag], None);
        let report = s.send_code("var a = 1").await.unwrap();
        let Report::Diagnostics(d) = report else { panic!("expected diagnostics") };
        assert_eq!(d.len(), 1);
        assert_eq!(s.diagnostics().len(), 1);
        assert!(s.last_artifact().is_none());

        let report = s.send_code("var a = 1").await.unwrap();
        assert!(matches!(report, Report::Diagnostics(_)));
        assert_eq!(s.diagnostics().len(), 1);
    }

    #[tokio::test]
    async fn empty_reply_is_no_result() {
        let (mut s, _) = session(vec![], None);
        assert_eq!(s.send_code("1 + 1;").await.unwrap(), Report::NoResult { aux_diagnostics: vec![] });
    }

    #[tokio::test]
    async fn style_sheets_are_never_compiled() {
        let (mut s, sources) = session(vec![], None);
        s.set_kind(FragmentKind::StyleSheet);
        assert!(s.send_code("body{}").await.is_err());
        assert!(sources.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn local_target_has_no_window() {
        let (mut s, _) = session(vec![], None);
        assert!(s.clear_window().await.is_err());
    }

    #[tokio::test]
    async fn references_load_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let dll = dir.path().join("Lib.dll");
        std::fs::write(&dll, b"lib").unwrap();

        let (mut s, _) = session(vec![], None);
        s.load_reference(&dll).await.unwrap();
        assert!(s.next_event().await);
        assert_eq!(s.reference_cache().get(&dll).map(|i| i.size), Some(3));
        assert_eq!(s.references(), &[dll]);
    }

    #[tokio::test]
    async fn removals_and_imports_survive_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b, dll) = (dir.path().join("A.cs"), dir.path().join("B.cs"), dir.path().join("Lib.dll"));
        for f in [&a, &b, &dll] {
            std::fs::write(f, b"x").unwrap();
        }

        let mut s = session(vec![], None).0.with_store(ProjectConfig::open(dir.path()));
        s.add_sources(&[a.display().to_string(), b.display().to_string()]).unwrap();
        s.load_reference(&dll).await.unwrap();
        s.add_import("System.Net").unwrap();
        let first = s.aux_sources()[0].clone();
        assert_eq!(s.remove_sources(&[first.clone()]).unwrap(), 1);
        assert_eq!(s.remove_sources(&[first.clone()]).unwrap(), 0);

        let mut restored = session(vec![], None).0.with_store(ProjectConfig::open(dir.path()));
        assert_eq!(restored.aux_sources().len(), 1);
        assert!(!restored.aux_sources().contains(&first));
        assert_eq!(restored.references(), &[dll.clone()]);
        assert_eq!(restored.loaded_references(), &[dll.clone()]);
        assert_eq!(restored.extra_imports(), &["using System.Net;".to_string()]);
        restored.set_kind(FragmentKind::Program);
        assert!(restored.extra_imports().is_empty());
        restored.set_kind(FragmentKind::Statements);
        assert!(s.remove_import("System.Net").unwrap());

        assert!(s.unload_reference(&dll));
        assert!(!s.unload_reference(&dll));
        assert!(s.loaded_references().is_empty());
        assert_eq!(s.references(), &[dll.clone()]);
        assert!(s.remove_reference(&dll).unwrap());
        assert!(!s.remove_reference(&dll).unwrap());

        let reopened = session(vec![], None).0.with_store(ProjectConfig::open(dir.path()));
        assert!(reopened.references().is_empty());
        assert!(reopened.extra_imports().is_empty());
    }

    #[test]
    fn imports_are_normalized() {
        let (mut s, _) = session(vec![], None);
        s.add_import("System.Net").unwrap();
        s.add_import("using System.Net;").unwrap();
        s.add_import(" using System.Net ").unwrap();
        assert_eq!(s.extra_imports(), &["using System.Net;".to_string()]);
    }
}
