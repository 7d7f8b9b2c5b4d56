use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use crate::config::MorphologyConfig;
use crate::context::EvalContext;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("io error while reading child output: {0}")]
    Io(#[from] io::Error),
}

/// Program and arguments of a child process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Exit status plus the non-empty stdout lines seen while draining
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub status: ExitStatus,
    pub lines: Vec<String>,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Spawns a child, streams its stdout line by line and reports how it ended.
/// Whether a failure matters is up to the caller.
pub struct ProcessRunner {
    context: EvalContext,
}

impl ProcessRunner {
    pub fn new(context: EvalContext) -> Self {
        Self { context }
    }

    pub fn run(&self, cmd: &ProcessCommand) -> Result<ProcessOutcome, ProcessError> {
        let _span = self.context.span.enter();
        let mut child = Command::new(&cmd.program)
            .args(&cmd.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: cmd.program.display().to_string(),
                source,
            })?;

        let mut lines = Vec::new();
        let drained = match child.stdout.take() {
            Some(stdout) => drain_lines(io::BufReader::new(stdout), &mut lines),
            None => Ok(()),
        };
        let status = child.wait()?;
        drained?;
        if status.success() {
            tracing::info!("Subprogram success");
        } else {
            tracing::warn!("Subprogram failed ({})", status);
        }
        Ok(ProcessOutcome { status, lines })
    }
}

/// Log and collect non-empty stdout lines; invalid UTF-8 is replaced, not fatal
fn drain_lines(mut reader: impl BufRead, lines: &mut Vec<String>) -> io::Result<()> {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        let text = String::from_utf8_lossy(&buf);
        let line = text.trim();
        if !line.is_empty() {
            tracing::info!("Subprogram output: [{}]", line);
            lines.push(line.to_string());
        }
    }
}

/// `python <script> -g <gt> -o <output>`
pub fn morphology_command(config: &MorphologyConfig, gt_root: &Path, output: &Path) -> ProcessCommand {
    ProcessCommand {
        program: PathBuf::from(&config.interpreter),
        args: vec![
            config.script.display().to_string(),
            "-g".into(),
            gt_root.display().to_string(),
            "-o".into(),
            output.display().to_string(),
        ],
    }
}
