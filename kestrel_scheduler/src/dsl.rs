//! Client for the scheduling DSL compiler.
//!
//! The compiler is a separate process speaking a line protocol over its standard
//! streams. On startup it is sent `ping` and must answer `pong`. After that each
//! request is one line of JSON, and each reply is a status line (`success`, `error`
//! or `panic`) followed by exactly one payload line.

use crate::config::DslCompilerConfig;
use crate::error::DslError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tracing::{debug, warn};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeLocation {
    pub line: u32,
    pub column: u32,
}

/// A mistake in the user's goal code, as reported by the compiler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCodeError {
    pub message: String,
    pub stack: String,
    pub location: CodeLocation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilationRequest {
    pub goal_code: String,
    pub scheduler_generated_code: String,
    pub constraints_generated_code: String,
    pub expected_return_type: String,
}

/// Not re-entrant; one request at a time.
pub struct DslCompiler<R, W> {
    reader: R,
    writer: W,
    child: Option<Child>,
}

impl<R: BufRead, W: Write> DslCompiler<R, W> {
    /// Performs the handshake over the given streams.
    pub fn new(reader: R, writer: W) -> Result<Self, DslError> {
        Self {
            reader,
            writer,
            child: None,
        }
        .handshake()
    }

    fn handshake(mut self) -> Result<Self, DslError> {
        self.write_line("ping")?;
        let reply = self.read_line()?;
        if reply != "pong" {
            return Err(DslError::Handshake { reply });
        }
        Ok(self)
    }

    fn write_line(&mut self, line: &str) -> Result<(), DslError> {
        writeln!(self.writer, "{line}")?;
        self.writer.flush()?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, DslError> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(DslError::Closed);
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Sends one request. The outer error is a protocol failure; the inner one means
    /// the compiler ran fine but rejected the user's code.
    pub fn compile<Req: Serialize, Res: DeserializeOwned>(
        &mut self,
        request: &Req,
    ) -> Result<Result<Res, Vec<UserCodeError>>, DslError> {
        let message = serde_json::to_string(request)?;
        self.write_line(&message)?;

        let status = self.read_line()?;
        match status.as_str() {
            "success" => {
                let payload = self.read_line()?;
                Ok(Ok(serde_json::from_str(&payload)?))
            }
            "error" => {
                let payload = self.read_line()?;
                let errors: Vec<UserCodeError> = serde_json::from_str(&payload)?;
                debug!(errors = errors.len(), "goal code rejected");
                Ok(Err(errors))
            }
            "panic" => Err(DslError::Panic {
                message: self.read_line()?,
            }),
            _ => Err(DslError::UnexpectedStatus { status }),
        }
    }
}

impl DslCompiler<BufReader<ChildStdout>, ChildStdin> {
    /// Starts the compiler process and shakes hands with it. The process is killed
    /// when the compiler is dropped.
    pub fn spawn(config: &DslCompilerConfig) -> Result<Self, DslError> {
        let mut command = Command::new(&config.program);
        command
            .args(&config.arguments)
            .arg(&config.script)
            .envs(&config.environment)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(directory) = &config.working_directory {
            command.current_dir(directory);
        }

        let mut child = command.spawn()?;
        let (Some(writer), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(DslError::Closed);
        };
        debug!(program = %config.program, script = %config.script.display(), "started DSL compiler");
        Self {
            reader: BufReader::new(stdout),
            writer,
            child: Some(child),
        }
        .handshake()
    }
}

impl<R, W> Drop for DslCompiler<R, W> {
    fn drop(&mut self) {
        if let Some(child) = &mut self.child {
            if let Err(error) = child.kill().and_then(|_| child.wait()) {
                warn!(%error, "could not stop the DSL compiler");
            }
        }
    }
}
