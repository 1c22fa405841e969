//! Host side of the `xterm.run-code` action.

use std::{
    process::{Command, Stdio},
    sync::Arc,
    time::Instant,
};

use tracing::{info, warn};

use crate::application::run::{
    ActionError, Interpreters, RunCodeAction, RunCodeArgs, TERMINAL_RUN_ACTION, write_script,
};

/// Runs a block attached to the current terminal.
///
/// Blocking: the call returns once the interpreter exits. With `keep_alive`
/// the interpreter's interactive arguments are added so it stays open after
/// the code ran.
#[derive(Debug, Clone)]
pub struct TerminalLauncher {
    interpreters: Interpreters,
}

impl TerminalLauncher {
    pub fn new(interpreters: Interpreters) -> Self {
        Self { interpreters }
    }

    pub fn launch(&self, args: RunCodeArgs) -> Result<(), ActionError> {
        let started_at = Instant::now();
        let interpreter = self
            .interpreters
            .resolve(args.language.as_deref())
            .map_err(|err| ActionError::failed(TERMINAL_RUN_ACTION, err.to_string()))?;
        let script = write_script(&args.code)
            .map_err(|err| ActionError::failed(TERMINAL_RUN_ACTION, err.to_string()))?;

        let status = Command::new(&interpreter.command)
            .args(interpreter.command_args(script.path(), args.keep_alive))
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|err| {
                warn!(
                    target = "fencerun::terminal",
                    op = "terminal::launch",
                    result = "error",
                    command = %interpreter.command,
                    error = %err,
                    "Failed to start interpreter in terminal"
                );
                ActionError::failed(
                    TERMINAL_RUN_ACTION,
                    format!("failed to start `{}`: {err}", interpreter.command),
                )
            })?;

        info!(
            target = "fencerun::terminal",
            op = "terminal::launch",
            result = "ok",
            command = %interpreter.command,
            keep_alive = args.keep_alive,
            exit_code = status.code(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Terminal session ended"
        );
        Ok(())
    }

    /// Wrap the launcher as a named action handler.
    pub fn into_action(self) -> RunCodeAction {
        Arc::new(move |args: RunCodeArgs| self.launch(args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::run::ActionRegistry;

    #[test]
    fn unknown_language_fails_the_action() {
        let actions = ActionRegistry::new();
        actions.register(
            TERMINAL_RUN_ACTION,
            TerminalLauncher::new(Interpreters::default()).into_action(),
        );

        let err = actions
            .invoke(
                TERMINAL_RUN_ACTION,
                RunCodeArgs {
                    language: Some("klingon".into()),
                    code: "Qapla'".into(),
                    keep_alive: false,
                },
            )
            .expect_err("no interpreter");
        assert!(matches!(err, ActionError::Failed { .. }));
        assert!(err.to_string().contains("klingon"), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn runs_code_to_completion() {
        let launcher = TerminalLauncher::new(Interpreters::default());
        launcher
            .launch(RunCodeArgs {
                language: Some("sh".into()),
                code: "# --run--\nexit 0".into(),
                keep_alive: true,
            })
            .expect("sh runs");
    }
}
