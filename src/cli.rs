use std::path::PathBuf;

use clap::{ArgGroup, Parser};

use crate::target::{DeviceKind, FragmentKind};

#[derive(Parser, Debug, Clone)]
#[command(name = "protopad", about = "Compile and run C# fragments locally or on a connected device", version)]
#[command(group(ArgGroup::new("mode").args(["fetch", "clear_window", "show_wrap", "instrument_only"]).multiple(false)))]
#[command(group(ArgGroup::new("md_switch").args(["md", "no_md"]).multiple(false)))]
pub struct Cli {
    /// File holding the fragment; read from stdin when omitted.
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// How the fragment is wrapped before compiling.
    #[arg(short = 'k', long, value_enum, default_value_t = FragmentKind::Statements)]
    pub kind: FragmentKind,

    /// Where the fragment runs (default from DEFAULT_TARGET).
    #[arg(short = 't', long, value_enum)]
    pub target: Option<DeviceKind>,

    /// Device address as host:port (default from DEVICE_ADDRESS or the saved connection).
    #[arg(short = 'a', long)]
    pub address: Option<String>,

    /// Extra namespace import, e.g. `System.Net`. Repeatable.
    #[arg(short = 'u', long = "using", action = clap::ArgAction::Append)]
    pub using: Vec<String>,

    /// Auxiliary source file or folder compiled ahead of the fragment. Repeatable.
    #[arg(short = 's', long = "source", action = clap::ArgAction::Append)]
    pub source: Vec<String>,

    /// Reference assembly. Repeatable.
    #[arg(short = 'r', long = "reference", action = clap::ArgAction::Append)]
    pub reference: Vec<PathBuf>,

    /// Forget a saved namespace import for this kind. Repeatable.
    #[arg(long = "remove-using", action = clap::ArgAction::Append)]
    pub remove_using: Vec<String>,

    /// Forget a saved auxiliary source file. Repeatable.
    #[arg(long = "remove-source", action = clap::ArgAction::Append)]
    pub remove_source: Vec<PathBuf>,

    /// Forget a saved reference assembly. Repeatable.
    #[arg(long = "remove-reference", action = clap::ArgAction::Append)]
    pub remove_reference: Vec<PathBuf>,

    /// Keep a saved reference but leave it out of this run. Repeatable.
    #[arg(long = "unload-reference", action = clap::ArgAction::Append)]
    pub unload_reference: Vec<PathBuf>,

    /// Maximum dump depth.
    #[arg(long)]
    pub depth: Option<usize>,

    /// Maximum items listed per sequence.
    #[arg(long = "max-items")]
    pub max_items: Option<usize>,

    /// Device path the style sheet is pushed to (with `--kind style-sheet`).
    #[arg(long = "css-path")]
    pub css_path: Option<String>,

    /// Print a file from the device and exit.
    #[arg(long, value_name = "PATH")]
    pub fetch: Option<String>,

    /// Clear the device's window and exit.
    #[arg(long = "clear-window")]
    pub clear_window: bool,

    /// Print the wrap header and footer instead of running.
    #[arg(long = "show-wrap")]
    pub show_wrap: bool,

    /// Print the instrumented fragment instead of running.
    #[arg(long = "instrument-only")]
    pub instrument_only: bool,

    /// Project folder whose settings (sources, references, connection) are used.
    #[arg(short = 'p', long)]
    pub project: Option<PathBuf>,

    /// Render output as Markdown.
    #[arg(long)]
    pub md: bool,
    /// Plain output even when PRETTIFY_MARKDOWN is set.
    #[arg(long = "no-md")]
    pub no_md: bool,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
