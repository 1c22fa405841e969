use std::{collections::BTreeMap, io::Write, path::Path, process::Stdio, time::Instant};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
};
use tracing::{debug, info, warn};

use crate::config::{InterpreterSettings, default_interpreters};

use super::executor::{ChunkHandler, CodeExecutor, ExecutionError, RunOptions};

/// Command line used to execute one language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    pub command: String,
    pub args: Vec<String>,
    /// Extra arguments that keep the interpreter open after the script ends.
    pub interactive_args: Vec<String>,
}

impl Interpreter {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            interactive_args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_interactive_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interactive_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Arguments for running `script`, optionally staying interactive afterwards.
    pub fn command_args(&self, script: &Path, keep_alive: bool) -> Vec<String> {
        let mut args = self.args.clone();
        if keep_alive {
            args.extend(self.interactive_args.iter().cloned());
        }
        args.push(script.display().to_string());
        args
    }
}

impl From<&InterpreterSettings> for Interpreter {
    fn from(settings: &InterpreterSettings) -> Self {
        Self {
            command: settings.command.clone(),
            args: settings.args.clone(),
            interactive_args: settings.interactive_args.clone(),
        }
    }
}

/// Language tag to interpreter table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreters {
    by_language: BTreeMap<String, Interpreter>,
}

impl Interpreters {
    pub fn empty() -> Self {
        Self {
            by_language: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, language: impl Into<String>, interpreter: Interpreter) {
        self.by_language
            .insert(language.into().to_ascii_lowercase(), interpreter);
    }

    pub fn from_settings(settings: &BTreeMap<String, InterpreterSettings>) -> Self {
        let mut interpreters = Self::empty();
        for (language, interpreter) in settings {
            interpreters.insert(language.as_str(), Interpreter::from(interpreter));
        }
        interpreters
    }

    /// Look up the interpreter for a fence info string. Only the first token
    /// counts, compared case-insensitively.
    pub fn resolve(&self, language: Option<&str>) -> Result<&Interpreter, ExecutionError> {
        let token = language
            .and_then(|info| info.split_whitespace().next())
            .ok_or(ExecutionError::MissingLanguage)?;
        self.by_language
            .get(&token.to_ascii_lowercase())
            .ok_or_else(|| ExecutionError::UnsupportedLanguage {
                language: token.to_string(),
            })
    }
}

impl Default for Interpreters {
    fn default() -> Self {
        Self::from_settings(&default_interpreters())
    }
}

/// Executes blocks as local child processes and streams stdout and stderr
/// line by line.
///
/// A non-zero exit status is a normal outcome: whatever the program printed
/// is the result. Only failing to launch or read the process is an error.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    interpreters: Interpreters,
}

impl ProcessExecutor {
    pub fn new(interpreters: Interpreters) -> Self {
        Self { interpreters }
    }

    pub fn interpreters(&self) -> &Interpreters {
        &self.interpreters
    }
}

#[async_trait]
impl CodeExecutor for ProcessExecutor {
    async fn execute(
        &self,
        language: Option<&str>,
        code: &str,
        options: RunOptions,
    ) -> Result<(), ExecutionError> {
        let started_at = Instant::now();
        let interpreter = self.interpreters.resolve(language)?;

        let script = write_script(code)?;
        let args = interpreter.command_args(script.path(), false);

        debug!(
            target = "fencerun::run::process",
            run = %options.name,
            command = %interpreter.command,
            ?args,
            "Spawning interpreter"
        );

        let mut child = Command::new(&interpreter.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| {
                warn!(
                    target = "fencerun::run::process",
                    op = "process::spawn",
                    run = %options.name,
                    result = "error",
                    command = %interpreter.command,
                    error = %source,
                    "Failed to spawn interpreter"
                );
                ExecutionError::Spawn {
                    command: interpreter.command.clone(),
                    source,
                }
            })?;

        let stdout_task = child
            .stdout
            .take()
            .map(|stdout| tokio::spawn(forward_lines(stdout, options.handler.clone())));
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(forward_lines(stderr, options.handler.clone())));

        let status = child.wait().await?;
        for task in [stdout_task, stderr_task].into_iter().flatten() {
            if let Err(err) = task.await {
                warn!(
                    target = "fencerun::run::process",
                    run = %options.name,
                    error = %err,
                    "Output forwarding task failed"
                );
            }
        }
        drop(script);

        info!(
            target = "fencerun::run::process",
            op = "process::execute",
            run = %options.name,
            result = "ok",
            exit_code = status.code(),
            success = status.success(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Interpreter exited"
        );
        Ok(())
    }
}

/// Persist `code` into a temporary script file that lives as long as the
/// returned handle.
pub(crate) fn write_script(code: &str) -> Result<NamedTempFile, ExecutionError> {
    let mut script = tempfile::Builder::new().prefix("fencerun-").tempfile()?;
    script.write_all(code.as_bytes())?;
    if !code.ends_with('\n') {
        script.write_all(b"\n")?;
    }
    script.flush()?;
    Ok(script)
}

/// Forward each line of `stream` to `handler`. Invalid UTF-8 is replaced
/// rather than ending the stream.
async fn forward_lines<R>(stream: R, handler: ChunkHandler)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => handler(decode_line(&buf)),
            Err(err) => {
                warn!(
                    target = "fencerun::run::process",
                    error = %err,
                    "Stopped reading interpreter output"
                );
                break;
            }
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{application::run::executor::RunName, domain::digest::ContentDigest};
    use std::sync::{Arc, Mutex};

    fn collecting_options() -> (RunOptions, Arc<Mutex<Vec<String>>>) {
        let chunks = Arc::new(Mutex::new(Vec::new()));
        let sink = chunks.clone();
        let options = RunOptions {
            name: RunName::fresh(&ContentDigest::of("test")),
            handler: Arc::new(move |chunk| sink.lock().expect("lock").push(chunk)),
        };
        (options, chunks)
    }

    #[test]
    fn resolve_uses_first_token_case_insensitively() {
        let interpreters = Interpreters::default();
        let python = interpreters
            .resolve(Some("Python title=demo"))
            .expect("python");
        assert_eq!(python.command, "python3");
        assert_eq!(interpreters.resolve(Some("js")).expect("js").command, "node");
    }

    #[test]
    fn resolve_reports_missing_and_unknown_languages() {
        let interpreters = Interpreters::default();
        assert!(matches!(
            interpreters.resolve(None),
            Err(ExecutionError::MissingLanguage)
        ));
        assert!(matches!(
            interpreters.resolve(Some("   ")),
            Err(ExecutionError::MissingLanguage)
        ));
        match interpreters.resolve(Some("cobol")) {
            Err(ExecutionError::UnsupportedLanguage { language }) => assert_eq!(language, "cobol"),
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn keep_alive_inserts_interactive_args_before_script() {
        let interpreter = Interpreter::new("python3")
            .with_args(["-u"])
            .with_interactive_args(["-i"]);
        let script = Path::new("/tmp/script.py");

        assert_eq!(
            interpreter.command_args(script, false),
            vec!["-u".to_string(), "/tmp/script.py".to_string()]
        );
        assert_eq!(
            interpreter.command_args(script, true),
            vec![
                "-u".to_string(),
                "-i".to_string(),
                "/tmp/script.py".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn unknown_language_fails_before_spawning() {
        let executor = ProcessExecutor::default();
        let (options, chunks) = collecting_options();

        let err = executor
            .execute(Some("brainfuck"), "+++", options)
            .await
            .expect_err("unsupported");
        assert!(matches!(err, ExecutionError::UnsupportedLanguage { .. }));
        assert!(chunks.lock().expect("lock").is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shell_output_is_streamed_line_by_line() {
        let executor = ProcessExecutor::default();
        let (options, chunks) = collecting_options();

        executor
            .execute(Some("sh"), "# --run--\necho a\necho b", options)
            .await
            .expect("execute");

        let chunks = chunks.lock().expect("lock");
        assert_eq!(*chunks, vec!["a".to_string(), "b".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn invalid_utf8_lines_do_not_truncate_output() {
        let executor = ProcessExecutor::default();
        let (options, chunks) = collecting_options();

        executor
            .execute(Some("sh"), "echo before\nprintf '\\377\\n'\necho after", options)
            .await
            .expect("execute");

        assert_eq!(
            *chunks.lock().expect("lock"),
            vec![
                "before".to_string(),
                "\u{FFFD}".to_string(),
                "after".to_string()
            ]
        );
    }

    #[test]
    fn line_endings_are_stripped() {
        assert_eq!(decode_line(b"crlf\r\n"), "crlf");
        assert_eq!(decode_line(b"lf\n"), "lf");
        assert_eq!(decode_line(b"last"), "last");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_not_an_error() {
        let executor = ProcessExecutor::default();
        let (options, chunks) = collecting_options();

        executor
            .execute(Some("sh"), "echo oops >&2\nexit 3", options)
            .await
            .expect("non-zero exit still resolves");

        assert_eq!(*chunks.lock().expect("lock"), vec!["oops".to_string()]);
    }

    #[tokio::test]
    async fn missing_command_is_a_spawn_error() {
        let mut interpreters = Interpreters::empty();
        interpreters.insert("ghost", Interpreter::new("fencerun-definitely-not-installed"));
        let executor = ProcessExecutor::new(interpreters);
        let (options, _) = collecting_options();

        let err = executor
            .execute(Some("ghost"), "anything", options)
            .await
            .expect_err("spawn should fail");
        assert!(matches!(err, ExecutionError::Spawn { .. }), "got {err:?}");
    }
}
