//! Shows what the pipeline would compile without running it.

use anyhow::Result;

use crate::session::Session;

pub fn show_wrap(session: &mut Session, code: &str) -> Result<()> {
    let prepared = session.prepare(code)?;
    println!("// header ({} lines)", prepared.wrap.header_lines());
    print!("{}", prepared.wrap.header);
    println!("// fragment");
    println!("// footer");
    print!("{}", prepared.wrap.footer);
    Ok(())
}

pub fn instrument_only(session: &mut Session, code: &str) -> Result<()> {
    let prepared = session.prepare(code)?;
    println!("{}", prepared.instrumented.text);
    tracing::info!(offsets = ?prepared.instrumented.offsets, "tracked statements");
    Ok(())
}
