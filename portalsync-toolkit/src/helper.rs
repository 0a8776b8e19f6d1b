//! Subprocess protocol of the packaging helper.
//!
//! The helper is an external program (typically a script run by the GIS
//! desktop's Python) that owns every project-file operation. Each call is one
//! process:
//!
//! - argv: the configured command followed by the operation name
//! - stdin: one JSON request object
//! - stdout: one JSON reply `{ "ok": bool, "error": str?, "messages": [str], "missing": bool? }`
//!
//! Stderr is captured and logged at debug level.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use portalsync_engine::BuildError;

#[derive(Debug, Error)]
pub enum ToolkitError {
    #[error("no packaging helper configured (set \"toolkit\" in the settings file)")]
    NotConfigured,

    #[error("packaging helper '{program}' not found: {source}")]
    NotFound {
        program: String,
        #[source]
        source: which::Error,
    },

    #[error("cannot run packaging helper {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The helper exited non-zero without a readable reply.
    #[error("helper exited with {status}")]
    Exit {
        operation: &'static str,
        status: String,
        messages: Vec<String>,
    },

    #[error("unreadable helper reply: {message}")]
    Reply {
        operation: &'static str,
        message: String,
    },

    /// The helper answered `ok: false`.
    #[error("{error}")]
    Refused {
        operation: &'static str,
        error: String,
        messages: Vec<String>,
    },
}

impl From<ToolkitError> for BuildError {
    fn from(err: ToolkitError) -> Self {
        let message = err.to_string();
        match err {
            ToolkitError::NotConfigured
            | ToolkitError::NotFound { .. }
            | ToolkitError::Spawn { .. } => BuildError::Unavailable(message),
            ToolkitError::Exit {
                operation,
                messages,
                ..
            }
            | ToolkitError::Refused {
                operation,
                messages,
                ..
            } => BuildError::Failed {
                operation: operation.to_string(),
                message,
                messages,
            },
            ToolkitError::Reply { operation, .. } => BuildError::Failed {
                operation: operation.to_string(),
                message,
                messages: Vec::new(),
            },
        }
    }
}

/// What the helper printed on stdout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Reply {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub messages: Vec<String>,
    /// Set with `ok: false` when the named project, map or layer does not exist.
    #[serde(default)]
    pub missing: bool,
}

/// A resolved helper command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Helper {
    program: PathBuf,
    args: Vec<String>,
}

impl Helper {
    /// Resolve `argv[0]` on `PATH` (or as a path) and keep the rest as
    /// leading arguments.
    pub fn resolve(argv: &[String]) -> Result<Self, ToolkitError> {
        let Some((program, args)) = argv.split_first() else {
            return Err(ToolkitError::NotConfigured);
        };
        let resolved = which::which(program).map_err(|source| ToolkitError::NotFound {
            program: program.clone(),
            source,
        })?;
        Ok(Self {
            program: resolved,
            args: args.to_vec(),
        })
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    /// Run one operation. A reply with `ok: false` is returned as-is when it
    /// says `missing`; otherwise it becomes [`ToolkitError::Refused`].
    pub fn call(&self, operation: &'static str, request: &Value) -> Result<Reply, ToolkitError> {
        tracing::debug!("toolkit {operation}: {}", self.program.display());
        let spawn_err = |source| ToolkitError::Spawn {
            program: self.program.clone(),
            source,
        };

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(operation)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_err)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(request.to_string().as_bytes())
                .map_err(spawn_err)?;
        }

        let output = child.wait_with_output().map_err(spawn_err)?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            tracing::debug!("toolkit {operation}: {line}");
        }

        let parsed = serde_json::from_slice::<Reply>(&output.stdout);
        let reply = match (output.status.success(), parsed) {
            (true, Ok(reply)) => reply,
            // A failing exit overrides whatever the reply claims.
            (false, Ok(reply)) if reply.ok => {
                return Err(ToolkitError::Exit {
                    operation,
                    status: output.status.to_string(),
                    messages: reply.messages,
                })
            }
            (false, Ok(reply)) => reply,
            (true, Err(e)) => {
                return Err(ToolkitError::Reply {
                    operation,
                    message: e.to_string(),
                })
            }
            (false, Err(_)) => {
                return Err(ToolkitError::Exit {
                    operation,
                    status: output.status.to_string(),
                    messages: stderr.lines().map(str::to_string).collect(),
                })
            }
        };

        if reply.ok || reply.missing {
            Ok(reply)
        } else {
            Err(ToolkitError::Refused {
                operation,
                error: reply
                    .error
                    .unwrap_or_else(|| format!("{operation} reported failure")),
                messages: reply.messages,
            })
        }
    }
}
