use std::{
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use is_terminal::IsTerminal;
use tracing_subscriber::EnvFilter;

use protopad::{
    cli,
    config::{Config, ConfigItem, Project, ProjectConfig},
    handlers,
    printer::{Paint, TextPrinter},
    session::Session,
    target::{DeviceKind, ExecutionTarget, FragmentKind},
    template,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let args = cli::Cli::parse();

    // Load config; CLI flags override it
    let mut cfg = Config::load();
    if let Some(depth) = args.depth {
        cfg.set("DUMP_DEPTH", depth.to_string());
    }
    if let Some(max_items) = args.max_items {
        cfg.set("DUMP_MAX_ITEMS", max_items.to_string());
    }

    // Global store, optionally routed to a working project
    let mut store = ProjectConfig::open(&cfg.store_dir());
    if let Some(dir) = &args.project {
        let project = Project::open(dir)?;
        store.add_project(&project.path)?;
        store.set_working_project(Some(project));
    }
    if let Some(project) = store.working_project() {
        tracing::info!(project = %project.name, path = %project.path.display(), "working project");
    }

    let device = match args.target {
        Some(d) => d,
        None => parse_device(&cfg.get("DEFAULT_TARGET").unwrap_or_default())?,
    };
    let target = resolve_target(device, args.address.clone(), &cfg, &mut store)?;

    let md = if args.no_md {
        false
    } else if args.md {
        true
    } else {
        cfg.get_bool("PRETTIFY_MARKDOWN")
    };
    let color = io::stdout().is_terminal();

    let mut session = Session::from_config(cfg).with_store(store);
    session.set_kind(args.kind);
    for u in &args.using {
        session.add_import(u)?;
    }
    for u in &args.remove_using {
        if !session.remove_import(u)? {
            tracing::warn!(import = %u, "no such import");
        }
    }
    if !args.remove_source.is_empty() {
        let paths: Vec<PathBuf> = args.remove_source.iter().map(|p| absolute(p)).collect();
        let removed = session.remove_sources(&paths)?;
        tracing::info!(removed, "auxiliary sources removed");
    }
    for r in &args.remove_reference {
        if !session.remove_reference(&absolute(r))? {
            tracing::warn!(path = %r.display(), "no such reference");
        }
    }
    for r in &args.unload_reference {
        if !session.unload_reference(&absolute(r)) {
            tracing::warn!(path = %r.display(), "reference was not loaded");
        }
    }
    if !args.source.is_empty() {
        let added = session.add_sources(&args.source)?;
        tracing::info!(added, "auxiliary sources");
    }
    if args.show_wrap || args.instrument_only {
        session.set_target(target);
    } else {
        session.connect(target).await?;
        if let Some(status) = session.status() {
            TextPrinter { color }.paint(status, Paint::Dim);
        }
    }
    for r in &args.reference {
        let path = fs::canonicalize(r).with_context(|| format!("reference not found: {}", r.display()))?;
        session.load_reference(&path).await?;
    }

    // Device-only modes need no fragment
    if let Some(path) = &args.fetch {
        return handlers::device::fetch(&session, path).await;
    }
    if args.clear_window {
        let ok = handlers::device::clear_window(&mut session, color).await?;
        finish(&mut session, ok);
        return Ok(());
    }

    let code = read_fragment(args.file.as_ref(), args.kind, session.target().kind)?;

    let ok = if args.show_wrap {
        handlers::inspect::show_wrap(&mut session, &code)?;
        true
    } else if args.instrument_only {
        handlers::inspect::instrument_only(&mut session, &code)?;
        true
    } else if args.kind == FragmentKind::StyleSheet {
        handlers::device::push_style_sheet(&session, args.css_path.as_deref(), &code).await?;
        true
    } else {
        handlers::run::run(&mut session, &code, md, color).await?
    };
    finish(&mut session, ok);
    Ok(())
}

fn finish(session: &mut Session, ok: bool) {
    let applied = session.poll_events();
    tracing::debug!(applied, "session events applied");
    if !ok {
        std::process::exit(1);
    }
}

fn absolute(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn parse_device(name: &str) -> Result<DeviceKind> {
    match name.trim().to_ascii_lowercase().as_str() {
        "" | "local" => Ok(DeviceKind::Local),
        "android" => Ok(DeviceKind::Android),
        "ios" => Ok(DeviceKind::Ios),
        other => bail!("unknown target: {}", other),
    }
}

fn resolve_target(
    device: DeviceKind,
    address: Option<String>,
    cfg: &Config,
    store: &mut ProjectConfig,
) -> Result<ExecutionTarget> {
    if device == DeviceKind::Local {
        return Ok(ExecutionTarget::local());
    }
    let saved = match (store.load(ConfigItem::Ip), store.load(ConfigItem::Port)) {
        (Some(ip), Some(port)) if !ip.is_empty() => Some(format!("{}:{}", ip, port)),
        (Some(ip), _) if !ip.is_empty() => Some(ip),
        _ => None,
    };
    let Some(address) = address.or_else(|| cfg.get("DEVICE_ADDRESS")).or(saved) else {
        bail!("no device address: pass --address or set DEVICE_ADDRESS");
    };
    if let Some((ip, port)) = address.rsplit_once(':') {
        store.save(ConfigItem::Ip, ip)?;
        store.save(ConfigItem::Port, port)?;
    } else {
        store.save(ConfigItem::Ip, &address)?;
    }
    let name = match device {
        DeviceKind::Android => "Android device",
        DeviceKind::Ios => "iOS device",
        DeviceKind::Local => "Local",
    };
    Ok(ExecutionTarget::remote(device, name, address))
}

fn read_fragment(file: Option<&PathBuf>, kind: FragmentKind, device: DeviceKind) -> Result<String> {
    if let Some(path) = file {
        return fs::read_to_string(path).with_context(|| format!("reading fragment: {}", path.display()));
    }
    let stdin_is_tty = io::stdin().is_terminal();
    if stdin_is_tty {
        let code = template::default_code(kind, device);
        if code.is_empty() {
            bail!("no fragment given: pass a file or pipe it on stdin");
        }
        return Ok(code.to_string());
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}
