//! Run handler: compiles and executes a fragment, then prints the report.

use anyhow::Result;

use crate::{
    printer::{MarkdownPrinter, TextPrinter},
    session::{Report, Session},
};

/// Returns whether the run succeeded.
pub async fn run(session: &mut Session, code: &str, markdown: bool, color: bool) -> Result<bool> {
    let report = session.send_code(code).await?;
    print_report(&report, code, markdown, color);
    Ok(report.is_success())
}

pub fn print_report(report: &Report, code: &str, markdown: bool, color: bool) {
    if markdown {
        MarkdownPrinter::default().report(report, code);
    } else {
        TextPrinter { color }.report(report, code);
    }
}
