use std::{fs, num::NonZeroUsize, path::Path, process, sync::Arc};

use async_trait::async_trait;
use fencerun::{
    application::{
        error::AppError,
        plugin::{PluginHost, RunCodePlugin},
        render::{MarkdownPipeline, RenderEnv, RenderedDocument},
        run::{
            ActionRegistry, CodeExecutor, ExecutionError, Interpreters, ProcessExecutor,
            RunController, RunOptions, RunServices, TERMINAL_RUN_ACTION,
        },
    },
    cache::{FileStore, ResultCache},
    config::{self, Command, RenderArgs, RunArgs, TerminalArgs},
    infra::{error::InfraError, telemetry, terminal::TerminalLauncher},
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    let store = FileStore::open(&settings.cache.path)?;
    let cache = ResultCache::new(Arc::new(store));
    let interpreters = Interpreters::from_settings(&settings.execution.interpreters);

    let actions = ActionRegistry::new();
    actions.register(
        TERMINAL_RUN_ACTION,
        TerminalLauncher::new(interpreters.clone()).into_action(),
    );
    let executor: Arc<dyn CodeExecutor> = Arc::new(EchoingExecutor {
        inner: ProcessExecutor::new(interpreters),
    });

    let mut host = PluginHost::new(MarkdownPipeline::new());
    host.install(&RunCodePlugin::new(RunServices::new(
        cache.clone(),
        executor,
        actions,
    )));

    match cli_args.command {
        Command::Render(args) => run_render(&host, args),
        Command::Run(args) => run_blocks(&host, args).await,
        Command::Terminal(args) => run_terminal(&host, args).await,
        Command::ClearCache => cache.clear_all().map_err(AppError::from),
    }
}

fn run_render(host: &PluginHost, args: RenderArgs) -> Result<(), AppError> {
    let document = render_file(host, &args.file)?;
    write_output(args.output.as_deref(), &document.to_html())?;
    document.unmount();
    Ok(())
}

async fn run_blocks(host: &PluginHost, args: RunArgs) -> Result<(), AppError> {
    host.startup()?;

    let document = render_file(host, &args.file)?;
    let controls = match args.block {
        Some(number) => vec![select_control(&document, &args.file, number)?],
        None => document.controls(),
    };

    info!(
        target = "fencerun::cli",
        file = %args.file.display(),
        blocks = controls.len(),
        "Running code blocks"
    );
    for control in &controls {
        control.run().await;
    }

    write_output(args.output.as_deref(), &document.to_html())?;
    document.unmount();
    Ok(())
}

async fn run_terminal(host: &PluginHost, args: TerminalArgs) -> Result<(), AppError> {
    let document = render_file(host, &args.file)?;
    let control = select_control(&document, &args.file, args.block)?;
    let keep_alive = args.keep_alive;

    tokio::task::spawn_blocking(move || control.run_in_terminal(keep_alive))
        .await
        .map_err(|err| AppError::unexpected(format!("terminal task failed: {err}")))??;

    document.unmount();
    Ok(())
}

fn render_file(host: &PluginHost, path: &Path) -> Result<RenderedDocument, AppError> {
    let markdown = fs::read_to_string(path).map_err(InfraError::from)?;
    let slug = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(host.render(&markdown, &RenderEnv::new(slug))?)
}

fn select_control(
    document: &RenderedDocument,
    path: &Path,
    number: NonZeroUsize,
) -> Result<Arc<RunController>, AppError> {
    let controls = document.controls();
    let count = controls.len();
    controls.into_iter().nth(number.get() - 1).ok_or_else(|| {
        AppError::validation(format!(
            "{} has {count} runnable block(s); block {number} does not exist",
            path.display()
        ))
    })
}

fn write_output(path: Option<&Path>, html: &str) -> Result<(), AppError> {
    match path {
        Some(path) => fs::write(path, html).map_err(InfraError::from)?,
        None => print!("{html}"),
    }
    Ok(())
}

/// Prints every chunk to stdout as it arrives, then hands it to the control.
struct EchoingExecutor {
    inner: ProcessExecutor,
}

#[async_trait]
impl CodeExecutor for EchoingExecutor {
    async fn execute(
        &self,
        language: Option<&str>,
        code: &str,
        options: RunOptions,
    ) -> Result<(), ExecutionError> {
        let forward = options.handler.clone();
        let options = RunOptions {
            name: options.name,
            handler: Arc::new(move |chunk: String| {
                println!("{chunk}");
                forward(chunk);
            }),
        };
        self.inner.execute(language, code, options).await
    }
}
