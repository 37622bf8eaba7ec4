use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use procbridge_frame::{put_i32, Group, RawRecordCodec, INT_SIZE, SIGNAL_ERROR};
use procbridge_stream::{RemoteWorker, WorkerConfig};
use procbridge_transport::ControlSocket;

use crate::cmd::EchoWorkerArgs;
use crate::exit::{stream_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS};

type Worker = RemoteWorker<RawRecordCodec, RawRecordCodec>;

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Drained,
    Stopped,
}

struct Echo {
    echoed: usize,
    fail_after: Option<usize>,
    running: Arc<AtomicBool>,
}

impl Echo {
    fn should_stop(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
            || self.fail_after.is_some_and(|limit| self.echoed >= limit)
    }

    /// Echo every record of one input until its last chunk.
    fn drain(&mut self, worker: &mut Worker, group: Option<Group>) -> CliResult<Flow> {
        loop {
            let (records, last) = worker
                .next_chunk(group)
                .map_err(|err| stream_error("buffer request failed", err))?;
            for record in records {
                if self.should_stop() {
                    return Ok(Flow::Stopped);
                }
                worker
                    .send_result(&record)
                    .map_err(|err| stream_error("result send failed", err))?;
                self.echoed += 1;
            }
            if last {
                tracing::debug!(group = ?group.map(Group::index), echoed = self.echoed, "input drained");
                return Ok(Flow::Drained);
            }
        }
    }
}

pub fn run(args: EchoWorkerArgs) -> CliResult<i32> {
    let config = WorkerConfig {
        timeout: Duration::from_millis(args.timeout_ms),
        ..WorkerConfig::default()
    };
    let mut worker =
        match RemoteWorker::connect_files(args.host_port, &args.input, &args.output, &config) {
            Ok(worker) => worker,
            Err(err) => {
                report_startup_failure(args.host_port);
                return Err(stream_error("connect failed", err));
            }
        };
    tracing::info!(host_port = args.host_port, groups = args.groups, "echo worker connected");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let variables = worker
        .receive_broadcast_variables()
        .map_err(|err| stream_error("broadcast transfer failed", err))?;
    for variable in &variables {
        tracing::info!(
            name = %variable.name,
            values = variable.values.len(),
            "received broadcast variable"
        );
    }

    let inputs: &[Option<Group>] = if args.groups {
        &[Some(Group::First), Some(Group::Second)]
    } else {
        &[None]
    };

    let mut echo = Echo {
        echoed: 0,
        fail_after: args.fail_after,
        running,
    };
    for &group in inputs {
        if echo.drain(&mut worker, group)? == Flow::Stopped {
            tracing::error!(echoed = echo.echoed, "failing after {} records", echo.echoed);
            worker
                .fail()
                .map_err(|err| stream_error("error signal failed", err))?;
            return Ok(FAILURE);
        }
    }

    worker
        .finish()
        .map_err(|err| stream_error("finish signal failed", err))?;
    tracing::info!(echoed = echo.echoed, "echo worker finished");
    Ok(SUCCESS)
}

/// Tell the host not to wait out its handshake timeout.
fn report_startup_failure(host_port: u16) {
    let mut raw = [0u8; INT_SIZE];
    put_i32(&mut raw, 0, SIGNAL_ERROR);
    let sent = ControlSocket::bind_loopback().and_then(|socket| socket.send_to(host_port, &raw));
    if let Err(err) = sent {
        tracing::warn!(error = %err, "could not report startup failure to host");
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo(fail_after: Option<usize>, running: bool) -> Echo {
        Echo {
            echoed: 0,
            fail_after,
            running: Arc::new(AtomicBool::new(running)),
        }
    }

    #[test]
    fn stops_once_limit_reached() {
        let mut state = echo(Some(2), true);
        assert!(!state.should_stop());
        state.echoed = 2;
        assert!(state.should_stop());
    }

    #[test]
    fn zero_limit_stops_immediately() {
        assert!(echo(Some(0), true).should_stop());
    }

    #[test]
    fn interrupt_stops() {
        assert!(echo(None, false).should_stop());
        assert!(!echo(None, true).should_stop());
    }
}
