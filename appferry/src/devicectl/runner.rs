//! Subprocess execution for the device tool.

use std::io;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::BoxFuture;

/// How a finished process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Normal exit with this status code.
    Exited(i32),
    /// Killed by a signal; no status code.
    Signalled,
}

/// Runs a program to completion.
///
/// The bridge only needs the exit outcome; the tool's real output goes to
/// the JSON file named on its command line.
pub trait CommandRunner: Send + Sync {
    fn run<'a>(&'a self, program: &'a Path, args: &'a [String])
        -> BoxFuture<'a, io::Result<ExitOutcome>>;
}

/// Runs commands with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

impl CommandRunner for TokioCommandRunner {
    fn run<'a>(
        &'a self,
        program: &'a Path,
        args: &'a [String],
    ) -> BoxFuture<'a, io::Result<ExitOutcome>> {
        Box::pin(async move {
            let output = Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output()
                .await?;

            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.trim().is_empty() {
                debug!(program = %program.display(), stderr = %stderr.trim(), "Device tool stderr");
            }

            Ok(match output.status.code() {
                Some(code) => ExitOutcome::Exited(code),
                None => ExitOutcome::Signalled,
            })
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exit_codes() {
        let runner = TokioCommandRunner;
        let sh = Path::new("/bin/sh");

        let ok = runner
            .run(sh, &["-c".to_string(), "exit 0".to_string()])
            .await
            .unwrap();
        assert_eq!(ok, ExitOutcome::Exited(0));

        let failed = runner
            .run(sh, &["-c".to_string(), "exit 3".to_string()])
            .await
            .unwrap();
        assert_eq!(failed, ExitOutcome::Exited(3));
    }

    #[tokio::test]
    async fn test_signalled() {
        let runner = TokioCommandRunner;
        let outcome = runner
            .run(
                Path::new("/bin/sh"),
                &["-c".to_string(), "kill -9 $$".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(outcome, ExitOutcome::Signalled);
    }

    #[tokio::test]
    async fn test_missing_program_is_io_error() {
        let runner = TokioCommandRunner;
        let result = runner.run(Path::new("/nonexistent/tool"), &[]).await;
        assert!(result.is_err());
    }
}
