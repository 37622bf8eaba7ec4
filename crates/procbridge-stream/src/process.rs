use std::ffi::OsString;
use std::io::{self, BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use crate::context::Diagnostics;

/// Launches or attaches the external process once the control port is known.
pub trait ProcessSetup {
    /// Start the process and tell it to report to `host_port`.
    ///
    /// Side-channel output (typically stderr) should be appended to
    /// `diagnostics` so failures can report it.
    fn setup(&mut self, host_port: u16, diagnostics: &Diagnostics) -> io::Result<()>;

    /// Release whatever `setup` acquired. Called once from `close()`.
    fn teardown(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<F> ProcessSetup for F
where
    F: FnMut(u16, &Diagnostics) -> io::Result<()>,
{
    fn setup(&mut self, host_port: u16, diagnostics: &Diagnostics) -> io::Result<()> {
        self(host_port, diagnostics)
    }
}

/// Spawns a command, passing the host port as its last argument.
///
/// The child's stderr is forwarded line by line into the diagnostics
/// buffer. The child is killed on teardown if it is still running.
#[derive(Debug)]
pub struct CommandSetup {
    program: OsString,
    args: Vec<OsString>,
    child: Option<Child>,
    stderr_reader: Option<JoinHandle<()>>,
}

impl CommandSetup {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            child: None,
            stderr_reader: None,
        }
    }

    /// Append an argument placed before the host port.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments placed before the host port.
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// OS process id of the running child.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }
}

impl ProcessSetup for CommandSetup {
    fn setup(&mut self, host_port: u16, diagnostics: &Diagnostics) -> io::Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(host_port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(stderr) = child.stderr.take() {
            let diagnostics = diagnostics.clone();
            self.stderr_reader = Some(std::thread::spawn(move || {
                for line in BufReader::new(stderr).lines() {
                    match line {
                        Ok(line) => {
                            debug!(line = %line, "external process stderr");
                            diagnostics.append_line(&line);
                        }
                        Err(_) => break,
                    }
                }
            }));
        }

        info!(
            program = ?self.program,
            pid = child.id(),
            host_port,
            "spawned external process"
        );
        self.child = Some(child);
        Ok(())
    }

    fn teardown(&mut self) -> io::Result<()> {
        if let Some(mut child) = self.child.take() {
            match child.try_wait()? {
                Some(status) => debug!(%status, "external process already exited"),
                None => {
                    if let Err(err) = child.kill() {
                        warn!(error = %err, "failed to kill external process");
                    }
                    let status = child.wait()?;
                    debug!(%status, "external process killed");
                }
            }
        }
        if let Some(reader) = self.stderr_reader.take() {
            let _ = reader.join();
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn stderr_lines_reach_diagnostics() {
        let diagnostics = Diagnostics::new();
        let mut setup = CommandSetup::new("sh")
            .arg("-c")
            .arg("echo \"port=$0\" >&2");

        setup.setup(4242, &diagnostics).unwrap();
        let status = setup.child.as_mut().unwrap().wait().unwrap();
        assert!(status.success());
        setup.teardown().unwrap();

        assert_eq!(diagnostics.snapshot(), "port=4242\n");
    }

    #[test]
    fn teardown_kills_running_child() {
        let diagnostics = Diagnostics::new();
        let mut setup = CommandSetup::new("sh").args(["-c", "sleep 30"]);

        setup.setup(1, &diagnostics).unwrap();
        assert!(setup.pid().is_some());
        setup.teardown().unwrap();
        assert!(setup.pid().is_none());
        setup.teardown().unwrap();
    }

    #[test]
    fn missing_program_fails_setup() {
        let mut setup = CommandSetup::new("/nonexistent/procbridge-worker");
        let err = setup.setup(1, &Diagnostics::new()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn closures_are_process_setups() {
        let mut seen = None;
        let mut setup = |port: u16, _diagnostics: &Diagnostics| -> io::Result<()> {
            seen = Some(port);
            Ok(())
        };
        ProcessSetup::setup(&mut setup, 9, &Diagnostics::new()).unwrap();
        assert_eq!(seen, Some(9));
    }
}
