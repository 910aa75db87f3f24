//! Device handlers: style-sheet push, file fetch and window clearing.

use anyhow::{bail, Result};

use super::run::print_report;
use crate::session::{Report, Session};

pub async fn push_style_sheet(session: &Session, css_path: Option<&str>, css: &str) -> Result<()> {
    let Some(path) = css_path.filter(|p| !p.trim().is_empty()) else {
        bail!("--css-path is required to push a style sheet");
    };
    session.push_style_sheet(path, css).await?;
    println!("Updated {}", path);
    Ok(())
}

pub async fn fetch(session: &Session, path: &str) -> Result<()> {
    let text = session.fetch_file(path).await?;
    print!("{}", text);
    if !text.ends_with('\n') {
        println!();
    }
    Ok(())
}

pub async fn clear_window(session: &mut Session, color: bool) -> Result<bool> {
    let report = session.clear_window().await?;
    let ok = report.is_success() || matches!(report, Report::NoResult { .. });
    if !ok {
        print_report(&report, "", false, color);
    }
    Ok(ok)
}
