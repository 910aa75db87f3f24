//! Wrap templates: the header/footer that turn a bare fragment into a
//! compilable unit, per fragment kind and execution target.

use thiserror::Error;

use crate::dump::DumpLimits;
use crate::target::{DeviceKind, ExecutionTarget, FragmentKind};

/// Placeholder the fragment body replaces.
pub const STATEMENTS_PLACEHOLDER: &str = "__STATEMENTSHERE__";

/// Import needed by fragments when the target exposes style sheets.
pub const STYLE_SHEET_IMPORT: &str = "using PixateLib;";

/// Name of the injected helper class and its offset-tracking method.
pub const HELPER_CLASS: &str = "DumpHelpers";
pub const TRACK_METHOD: &str = "____TrackStatementOffset";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("wrap template must contain the placeholder exactly once, found {0}")]
    Placeholder(usize),
}

/// A template split around its placeholder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Wrap {
    pub header: String,
    pub footer: String,
}

impl Wrap {
    pub fn split(template: &str) -> Result<Self, TemplateError> {
        let count = template.matches(STATEMENTS_PLACEHOLDER).count();
        if count != 1 {
            return Err(TemplateError::Placeholder(count));
        }
        let (header, footer) = template
            .split_once(STATEMENTS_PLACEHOLDER)
            .ok_or(TemplateError::Placeholder(0))?;
        Ok(Self { header: header.to_string(), footer: footer.to_string() })
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_empty() && self.footer.is_empty()
    }

    pub fn apply(&self, body: &str) -> String {
        format!("{}{}{}", self.header, body, self.footer)
    }

    /// Lines the header occupies before the body starts, counted the way
    /// compiler line numbers are offset: one more than the newlines.
    pub fn header_lines(&self) -> usize {
        self.header.split('\n').count()
    }
}

/// Add the style-sheet import when the target needs it. Calling this again
/// with an already augmented list leaves it unchanged.
pub fn augment_imports(imports: &mut Vec<String>, target: &ExecutionTarget) -> bool {
    if !target.has_style_sheets() {
        return false;
    }
    if imports.iter().any(|s| s.trim() == STYLE_SHEET_IMPORT) {
        return false;
    }
    imports.push(STYLE_SHEET_IMPORT.to_string());
    true
}

/// Build the header/footer for a fragment.
///
/// `extra_imports` is augmented in place (see [`augment_imports`]) so the
/// caller's list stays in sync with what the template contains.
pub fn wrap(
    kind: FragmentKind,
    target: &ExecutionTarget,
    extra_imports: &mut Vec<String>,
    limits: DumpLimits,
) -> Result<Wrap, TemplateError> {
    if !kind.is_wrapped() {
        return Ok(Wrap::default());
    }
    augment_imports(extra_imports, target);
    let text = template_text(kind, target.kind, extra_imports, limits);
    tracing::debug!(?kind, device = ?target.kind, "built wrap template");
    Wrap::split(&text)
}

/// Raw template text, placeholder included.
pub fn template_text(
    kind: FragmentKind,
    device: DeviceKind,
    extra_imports: &[String],
    limits: DumpLimits,
) -> String {
    if !kind.is_wrapped() {
        return STATEMENTS_PLACEHOLDER.to_string();
    }
    let mut usings = default_imports(device);
    for extra in extra_imports {
        let extra = extra.trim();
        if !extra.is_empty() && !usings.iter().any(|u| u == extra) {
            usings.push(extra.to_string());
        }
    }
    let mut text = usings.join("\n");
    text.push_str("\n\n");
    text.push_str(&class_open(device));
    match kind {
        FragmentKind::Expression => {
            text.push_str("    void Main()\n    {\n        (");
            text.push_str(STATEMENTS_PLACEHOLDER);
            text.push_str(").Dump();\n    }\n");
        }
        FragmentKind::Statements => {
            text.push_str("    void Main()\n    {\n");
            text.push_str(STATEMENTS_PLACEHOLDER);
            text.push_str("\n    }\n");
        }
        FragmentKind::Program | FragmentKind::SourceFile | FragmentKind::StyleSheet => {
            text.push_str(STATEMENTS_PLACEHOLDER);
            text.push('\n');
        }
    }
    text.push_str("}\n\n");
    text.push_str(
        &HELPERS
            .replace("__DUMPDEPTH__", &limits.depth.to_string())
            .replace("__DUMPMAXITEMS__", &limits.max_items.to_string()),
    );
    text
}

fn default_imports(device: DeviceKind) -> Vec<String> {
    let common = ["using System;", "using System.Collections.Generic;", "using System.Linq;", "using System.Text;"];
    let platform: &[&str] = match device {
        DeviceKind::Local => &["using System.IO;"],
        DeviceKind::Android => &["using Android.App;", "using Android.Content;", "using Android.Views;", "using Android.Widget;"],
        DeviceKind::Ios => &["using MonoTouch.Foundation;", "using MonoTouch.UIKit;", "using System.Drawing;"],
    };
    common.iter().chain(platform.iter()).map(|s| s.to_string()).collect()
}

fn class_open(device: DeviceKind) -> String {
    match device {
        DeviceKind::Local => "public class __MainClass\n{\n".to_string(),
        DeviceKind::Android => {
            "public class __MainClass\n{\n    public Activity activity;\n    public ViewGroup window;\n\n".to_string()
        }
        DeviceKind::Ios => {
            "public class __MainClass\n{\n    public UIApplicationDelegate appDelegate;\n    public UIWindow window;\n\n".to_string()
        }
    }
}

const HELPERS: &str = r#"public static class DumpHelpers
{
    public const int MaxDepth = __DUMPDEPTH__;
    public const int MaxItems = __DUMPMAXITEMS__;
    public static int LastOffset;
    public static List<Tuple<string, object, int>> DumpList = new List<Tuple<string, object, int>>();

    public static T Dump<T>(this T o, string description = "", int depth = MaxDepth)
    {
        DumpList.Add(Tuple.Create(description, (object)o, depth));
        return o;
    }

    public static void ____TrackStatementOffset(int offset)
    {
        LastOffset = offset;
    }
}
"#;

/// Starter code shown for a fresh fragment.
pub fn default_code(kind: FragmentKind, device: DeviceKind) -> &'static str {
    match (kind, device) {
        (FragmentKind::Expression, _) => "DateTime.Now",
        (FragmentKind::Statements, DeviceKind::Ios) => {
            "var label = new UILabel(new RectangleF(20, 40, 280, 40));\nlabel.Text = \"Hello!\";\nwindow.AddSubview(label);"
        }
        (FragmentKind::Statements, DeviceKind::Android) => {
            "var label = new TextView(activity);\nlabel.Text = \"Hello!\";\nwindow.AddView(label);"
        }
        (FragmentKind::Statements, DeviceKind::Local) => "var items = new[] { 1, 2, 3 };\nitems.Dump(\"items\");",
        (FragmentKind::Program, _) => "void Main()\n{\n    Helper().Dump();\n}\n\nstring Helper()\n{\n    return \"Hello\";\n}",
        (FragmentKind::SourceFile, _) | (FragmentKind::StyleSheet, _) => "",
    }
}

/// Statements that reset the device's root view; `None` for local runs.
pub fn clear_window_statements(device: DeviceKind) -> Option<&'static str> {
    match device {
        DeviceKind::Local => None,
        DeviceKind::Android => Some("window.RemoveAllViews();"),
        DeviceKind::Ios => Some("foreach (var v in window.Subviews) v.RemoveFromSuperview();"),
    }
}
