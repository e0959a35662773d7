pub mod access;
pub mod bootstrap;
pub mod cloudformation;
pub mod config;
pub mod error;
pub mod info;
pub mod instance;
pub mod network;
pub mod ranges;
pub mod ssh;
pub mod stack;
pub mod template;
pub mod types;

use std::process::{Command, Stdio};

use execute::Execute;
use log::{debug, info};

use error::Error;

/// Run `command` and return its stdout, or its stderr as the error.
fn sh(mut command: Command) -> Result<String, Error> {
    debug!("run: {:?}", command);
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let output = command.execute_output().map_err(|e| Error::Command {
        command: format!("{:?}", command),
        details: e.to_string(),
    })?;

    match output.status.code() {
        Some(0) => Ok(String::from_utf8_lossy(&output.stdout).to_string()),
        Some(_) => Err(Error::Command {
            command: format!("{:?}", command),
            details: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }),
        None => Err(Error::Command {
            command: format!("{:?}", command),
            details: "interrupted".to_string(),
        }),
    }
}

/// Run `cmd` with inherited stdio, failing on a non-zero exit.
fn check_cmd(cmd: &mut Command) -> Result<(), Error> {
    info!("run: {:?}", cmd);
    let status = cmd.status()?;
    if status.success() {
        Ok(())
    } else {
        Err(Error::Command {
            command: format!("{:?}", cmd),
            details: status.to_string(),
        })
    }
}
