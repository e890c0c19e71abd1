//! Running external filter processes

use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::thread;

use log::debug;

use crate::error::Result;

/// Result of trying to run a filter tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The executable does not exist
    NotFound,
    /// The process ran to completion
    Finished {
        /// Exit code, `None` when killed by a signal
        code: Option<i32>,
        stdout: Vec<u8>,
    },
}

/// Runs a program with `input` on stdin and captures stdout
pub trait ProcessRunner {
    fn run(&self, program: &str, args: &[&str], input: &[u8]) -> Result<RunOutcome>;
}

/// [`ProcessRunner`] backed by real child processes
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str], input: &[u8]) -> Result<RunOutcome> {
        debug!("running {program} {}", args.join(" "));

        let spawned = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(RunOutcome::NotFound),
            Err(e) => return Err(e.into()),
        };

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("child stdin not captured"))?;

        // stdin is fed from a second thread so a tool that fills its stdout
        // pipe before draining stdin cannot deadlock us.
        let output = thread::scope(|s| {
            let feeder = s.spawn(move || match stdin.write_all(input) {
                Err(e) if e.kind() != io::ErrorKind::BrokenPipe => Err(e),
                _ => Ok(()),
            });
            let output = child.wait_with_output();
            let fed = feeder
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("stdin feeder panicked")));
            fed.and(output)
        })?;

        Ok(RunOutcome::Finished {
            code: output.status.code(),
            stdout: output.stdout,
        })
    }
}
