use std::{num::NonZeroUsize, path::PathBuf};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the fencerun binary.
#[derive(Debug, Parser)]
#[command(
    name = "fencerun",
    version,
    about = "Render markdown and run its `--run--` code blocks"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "FENCERUN_CONFIG_FILE",
        value_name = "PATH",
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Render a markdown file to HTML, showing results cached by earlier runs.
    Render(RenderArgs),
    /// Run the runnable blocks of a markdown file and render the results.
    Run(RunArgs),
    /// Run one block in the terminal through the `xterm.run-code` action.
    Terminal(TerminalArgs),
    /// Remove every cached run result.
    #[command(name = "clear-cache")]
    ClearCache,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    /// Markdown file to render.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    /// Write HTML here instead of stdout.
    #[arg(long, short = 'o', value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// Markdown file whose blocks should run.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    /// Run only the Nth runnable block (1-based).
    #[arg(long, value_name = "N")]
    pub block: Option<NonZeroUsize>,

    /// Write the rendered HTML here once all runs finished.
    #[arg(long, short = 'o', value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct TerminalArgs {
    /// Markdown file containing the block.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    /// Runnable block to launch (1-based).
    #[arg(long, value_name = "N")]
    pub block: NonZeroUsize,

    /// Keep the interpreter open after the code finished.
    #[arg(long = "keep-alive", action = clap::ArgAction::SetTrue)]
    pub keep_alive: bool,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the logging level (e.g. info, debug).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Force JSON logging on or off.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the path of the run result store.
    #[arg(
        long = "cache-path",
        value_name = "PATH",
        value_hint = ValueHint::FilePath,
        global = true
    )]
    pub cache_path: Option<PathBuf>,
}
