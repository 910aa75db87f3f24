//! Printers: text and markdown (termimad).

use owo_colors::OwoColorize;
use termimad::MadSkin;
use unicode_width::UnicodeWidthStr;

use crate::compile::Diagnostic;
use crate::dump::DumpNode;
use crate::execution::ExecutionResult;
use crate::mapper::{LineTable, MappedError};
use crate::session::Report;

pub struct TextPrinter {
    pub color: bool,
}

impl TextPrinter {
    pub fn report(&self, report: &Report, code: &str) {
        let table = LineTable::new(code);
        for line in diagnostic_lines(report.aux_diagnostics(), &table) {
            self.paint(&line, Paint::Error);
        }
        match report {
            Report::Diagnostics(diags) => {
                for line in diagnostic_lines(diags, &table) {
                    self.paint(&line, Paint::Error);
                }
            }
            Report::Executed { result: ExecutionResult::Success(values), .. } => {
                for (label, node) in values {
                    if !label.is_empty() {
                        self.paint(label, Paint::Label);
                    }
                    print!("{}", render_tree(node));
                }
            }
            Report::Executed { result: ExecutionResult::Failure { message, .. }, location, .. } => {
                match location {
                    Some(loc) => {
                        for line in failure_lines(loc, code) {
                            self.paint(&line, Paint::Error);
                        }
                    }
                    None => self.paint(message, Paint::Error),
                }
            }
            Report::NoResult { .. } => self.paint("(no result)", Paint::Dim),
        }
    }

    pub fn paint(&self, text: &str, paint: Paint) {
        if !self.color {
            println!("{}", text);
            return;
        }
        match paint {
            Paint::Error => println!("{}", text.red()),
            Paint::Label => println!("{}", text.cyan().bold()),
            Paint::Dim => println!("{}", text.dimmed()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Paint {
    Error,
    Label,
    Dim,
}

pub struct MarkdownPrinter {
    pub skin: MadSkin,
    pub width: usize,
}

impl Default for MarkdownPrinter {
    fn default() -> Self {
        Self { skin: MadSkin::default(), width: 100 }
    }
}

impl MarkdownPrinter {
    pub fn print(&self, text: &str) {
        self.skin.print_text(text);
        println!();
    }

    pub fn report(&self, report: &Report, code: &str) {
        self.print(&report_markdown(report, code));
    }
}

/// Indented plain-text rendering of a dump tree.
pub fn render_tree(node: &DumpNode) -> String {
    fn walk(node: &DumpNode, indent: usize, out: &mut String) {
        let pad = "  ".repeat(indent);
        match node {
            DumpNode::Primitive { value } => out.push_str(&format!("{}{}\n", pad, value)),
            DumpNode::Composite { label, children } => {
                out.push_str(&format!("{}{}\n", pad, label));
                for child in children {
                    walk(child, indent + 1, out);
                }
            }
            DumpNode::Member { name, value } => match value.as_ref() {
                DumpNode::Primitive { value } => out.push_str(&format!("{}{}: {}\n", pad, name, value)),
                DumpNode::Error { message } => out.push_str(&format!("{}{}: <error: {}>\n", pad, name, message)),
                other => {
                    out.push_str(&format!("{}{}:\n", pad, name));
                    walk(other, indent + 1, out);
                }
            },
            DumpNode::Truncated { remaining } => out.push_str(&format!("{}... ({} more)\n", pad, remaining)),
            DumpNode::Error { message } => out.push_str(&format!("{}<error: {}>\n", pad, message)),
        }
    }

    let mut out = String::new();
    walk(node, 0, &mut out);
    out
}

/// `line N: message` with 1-based lines clamped into the fragment, or
/// `file(N): message` for diagnostics in auxiliary sources.
pub fn diagnostic_lines(diags: &[Diagnostic], table: &LineTable) -> Vec<String> {
    diags
        .iter()
        .map(|d| match &d.file {
            Some(file) => format!("{}({}): {}", file, d.line, d.message),
            None => format!("line {}: {}", table.map_line(d.line) + 1, d.message),
        })
        .collect()
}

/// The failing line with a caret under the failing column.
pub fn failure_lines(loc: &MappedError, code: &str) -> Vec<String> {
    let text = code.lines().nth(loc.line).unwrap_or_default();
    let prefix: String = text.chars().take(loc.column).collect();
    let caret = format!("{}^", " ".repeat(UnicodeWidthStr::width(prefix.as_str())));
    vec![
        format!("line {}, column {}: {}", loc.line + 1, loc.column + 1, loc.message),
        format!("  {}", text),
        format!("  {}", caret),
    ]
}

pub fn report_markdown(report: &Report, code: &str) -> String {
    let table = LineTable::new(code);
    let mut md = String::new();
    if !report.aux_diagnostics().is_empty() {
        md.push_str("**Auxiliary source errors**\n\n");
        for line in diagnostic_lines(report.aux_diagnostics(), &table) {
            md.push_str(&format!("- {}\n", line));
        }
        md.push('\n');
    }
    match report {
        Report::Diagnostics(diags) => {
            md.push_str("**Compile errors**\n\n");
            for line in diagnostic_lines(diags, &table) {
                md.push_str(&format!("- {}\n", line));
            }
        }
        Report::Executed { result: ExecutionResult::Success(values), .. } => {
            for (label, node) in values {
                if !label.is_empty() {
                    md.push_str(&format!("**{}**\n\n", label));
                }
                md.push_str(&format!("```\n{}```\n\n", render_tree(node)));
            }
        }
        Report::Executed { result: ExecutionResult::Failure { message, .. }, location, .. } => match location {
            Some(loc) => md.push_str(&format!(
                "**Runtime error**\n\n```\n{}\n```\n",
                failure_lines(loc, code).join("\n")
            )),
            None => md.push_str(&format!("**Runtime error**: {}\n", message)),
        },
        Report::NoResult { .. } => md.push_str("_no result_\n"),
    }
    md
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_shows_members_and_truncation() {
        let node = DumpNode::composite(
            "Point",
            vec![
                DumpNode::member("X", DumpNode::primitive("1")),
                DumpNode::member("Tags", DumpNode::composite("list", vec![DumpNode::Truncated { remaining: 4 }])),
                DumpNode::member("Y", DumpNode::error("getter threw")),
            ],
        );
        assert_eq!(
            render_tree(&node),
            "Point\n  X: 1\n  Tags:\n    list\n      ... (4 more)\n  Y: <error: getter threw>\n"
        );
    }

    #[test]
    fn caret_accounts_for_wide_characters() {
        let loc = MappedError { line: 1, column: 4, message: "boom".into() };
        let lines = failure_lines(&loc, "a();\n\"日本\"+x;");
        assert_eq!(lines[0], "line 2, column 5: boom");
        assert_eq!(lines[2], "        ^");
    }

    #[test]
    fn diagnostics_are_one_based_and_clamped() {
        let table = LineTable::new("a\nb");
        let diags = vec![
            Diagnostic { file: None, line: 1, message: "x".into() },
            Diagnostic { file: None, line: -3, message: "y".into() },
        ];
        assert_eq!(diagnostic_lines(&diags, &table), vec!["line 2: x", "line 1: y"]);
    }

    #[test]
    fn auxiliary_diagnostics_keep_file_and_line() {
        let report = Report::NoResult {
            aux_diagnostics: vec![Diagnostic {
                file: Some("Helpers.cs".into()),
                line: 12,
                message: "CS1002: ; expected".into(),
            }],
        };
        let md = report_markdown(&report, "x();");
        assert!(md.starts_with("**Auxiliary source errors**\n\n- Helpers.cs(12): CS1002: ; expected\n"));
        assert!(md.ends_with("_no result_\n"));
    }
}
