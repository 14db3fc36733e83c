//! Execution of external encoder processes.

use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::debug;

/// Number of trailing stderr lines kept in failure messages
const STDERR_TAIL_LINES: usize = 8;

/// Error type for encoding operations
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Encoder exited with non-zero status
    #[error("{tool} failed with exit code {code}: {stderr}")]
    ToolFailed {
        tool: String,
        code: i32,
        stderr: String,
    },

    /// Encoder was terminated by signal
    #[error("{tool} was terminated by signal")]
    ToolTerminated { tool: String },

    /// SVG could not be parsed or serialised
    #[error("SVG optimisation failed: {0}")]
    Svg(String),

    /// IO error during encoding (includes failure to spawn the tool)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs a fully built encoder command to completion.
///
/// Called from blocking threads; implementations must not assume an async
/// context.
pub trait ToolRunner: Send + Sync + 'static {
    fn run(&self, cmd: Command) -> Result<(), EncodeError>;
}

/// Name of the program a command will execute
pub fn program_name(cmd: &Command) -> String {
    cmd.get_program().to_string_lossy().into_owned()
}

/// Spawns encoders as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run(&self, mut cmd: Command) -> Result<(), EncodeError> {
        let tool = program_name(&cmd);
        debug!(command = ?cmd, "running encoder");

        let output = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()?;

        if output.status.success() {
            return Ok(());
        }

        match output.status.code() {
            Some(code) => Err(EncodeError::ToolFailed {
                tool,
                code,
                stderr: stderr_tail(&output.stderr),
            }),
            None => Err(EncodeError::ToolTerminated { tool }),
        }
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr: String = (0..20).map(|i| format!("line {i}\n")).collect();
        let tail = stderr_tail(stderr.as_bytes());
        assert_eq!(tail.lines().count(), STDERR_TAIL_LINES);
        assert!(tail.ends_with("line 19"));
        assert!(tail.starts_with("line 12"));
    }

    #[test]
    fn test_stderr_tail_skips_blank_lines() {
        assert_eq!(stderr_tail(b"\n\nerror: bad input\n\n"), "error: bad input");
    }

    #[test]
    fn test_missing_program_is_io_error() {
        let cmd = Command::new("assetopt-definitely-not-a-real-encoder");
        let result = SystemRunner.run(cmd);
        assert!(matches!(result, Err(EncodeError::Io(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_zero_exit_is_reported() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo 'broken frame' >&2; exit 3");

        match SystemRunner.run(cmd) {
            Err(EncodeError::ToolFailed { tool, code, stderr }) => {
                assert_eq!(tool, "sh");
                assert_eq!(code, 3);
                assert_eq!(stderr, "broken frame");
            }
            other => panic!("expected ToolFailed, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_success() {
        let cmd = Command::new("true");
        assert!(SystemRunner.run(cmd).is_ok());
    }
}
