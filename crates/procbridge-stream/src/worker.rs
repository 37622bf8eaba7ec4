//! The external process's end of the protocol.
//!
//! A worker announces its two ports, then pulls chunks by sending buffer
//! requests and pushes results by announcing their size and waiting for
//! the host's read confirmation.

use std::path::Path;
use std::time::Duration;

use procbridge_frame::{
    record_as_i32, ControlCode, Group, Notification, RawRecordCodec, Receiver, RecordDecoder,
    RecordEncoder, Sender, Signal, NOTIFICATION_SIZE,
};
use procbridge_transport::{ChunkSink, ChunkSource, ControlSocket, SharedFile};
use tracing::{debug, trace};

use crate::config::DEFAULT_BUFFER_SIZE;
use crate::error::{Result, StreamError};
use crate::handshake::{announce_ports, PortPair};

/// Worker-side settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Read timeout for notifications and confirmations from the host.
    pub timeout: Duration,
    /// Maximum size of one result chunk.
    pub chunk_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            chunk_capacity: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// A broadcast variable as received by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastVariable<T> {
    pub name: String,
    pub values: Vec<T>,
}

/// Worker end of a procbridge session.
pub struct RemoteWorker<E, D, O = SharedFile, I = SharedFile> {
    data: ControlSocket,
    confirm: ControlSocket,
    host_port: u16,
    records: Receiver<D, I>,
    results: Sender<E, O>,
    notification: [u8; NOTIFICATION_SIZE],
}

impl RemoteWorker<RawRecordCodec, RawRecordCodec> {
    /// Connect using file-backed buffers created by the host.
    ///
    /// `records_path` carries host-to-worker chunks, `results_path` the
    /// worker-to-host ones.
    pub fn connect_files(
        host_port: u16,
        records_path: impl AsRef<Path>,
        results_path: impl AsRef<Path>,
        config: &WorkerConfig,
    ) -> Result<Self> {
        let records = SharedFile::open(records_path)?;
        let results = SharedFile::open(results_path)?;
        Self::connect(
            host_port,
            RawRecordCodec::new(),
            RawRecordCodec::new(),
            results,
            records,
            config,
        )
    }
}

impl<E, D, O, I> RemoteWorker<E, D, O, I>
where
    D: RecordDecoder,
    O: ChunkSink,
    I: ChunkSource,
{
    /// Bind both worker ports and announce them to the host.
    pub fn connect(
        host_port: u16,
        encoder: E,
        decoder: D,
        results: O,
        records: I,
        config: &WorkerConfig,
    ) -> Result<Self> {
        let data = ControlSocket::bind_loopback()?;
        data.set_timeout(config.timeout)?;
        let confirm = ControlSocket::bind_loopback()?;
        confirm.set_timeout(config.timeout)?;

        let ports = PortPair {
            data: data.local_port()?,
            confirm: confirm.local_port()?,
        };
        announce_ports(&data, host_port, ports)?;

        Ok(Self {
            data,
            confirm,
            host_port,
            records: Receiver::new(decoder, records),
            results: Sender::new(encoder, results, config.chunk_capacity),
            notification: [0u8; NOTIFICATION_SIZE],
        })
    }

    /// The ports announced during the handshake.
    pub fn ports(&self) -> Result<PortPair> {
        Ok(PortPair {
            data: self.data.local_port()?,
            confirm: self.confirm.local_port()?,
        })
    }

    /// Send a raw signal to the host.
    pub fn signal(&self, signal: Signal) -> Result<()> {
        let raw = signal.encode()?;
        self.data.send_to(self.host_port, &raw)?;
        trace!(?signal, "sent signal");
        Ok(())
    }

    /// Block until the host sends a size notification.
    pub fn wait_notification(&mut self) -> Result<Notification> {
        self.data.recv_exact(&mut self.notification)?;
        Ok(Notification::decode(&self.notification)?)
    }

    /// Ask for the next chunk, of `group` or of the single input.
    pub fn request_buffer(&mut self, group: Option<Group>) -> Result<Notification> {
        let code = match group {
            None => ControlCode::BufferRequest,
            Some(group) => ControlCode::GroupRequest(group),
        };
        self.signal(Signal::Control(code))?;
        self.wait_notification()
    }

    /// Decode the chunk announced by `notification`.
    ///
    /// Records split across chunks are returned with the chunk that
    /// completes them.
    pub fn read_records(&mut self, notification: Notification) -> Result<Vec<D::Item>> {
        let mut out = Vec::new();
        if notification.size > 0 {
            self.records
                .collect_buffer(notification.size, |record| out.push(record))?;
        }
        Ok(out)
    }

    /// Request and decode one chunk; the flag is the "last" marker.
    pub fn next_chunk(&mut self, group: Option<Group>) -> Result<(Vec<D::Item>, bool)> {
        let notification = self.request_buffer(group)?;
        let records = self.read_records(notification)?;
        Ok((records, notification.last))
    }

    /// Hand one result record to the host and wait until it has been read.
    pub fn send_result<T: ?Sized>(&mut self, record: &T) -> Result<()>
    where
        E: RecordEncoder<T>,
    {
        let size = self.results.send_record(record)?;
        self.signal(Signal::PayloadSize(size))?;
        let mut ack = [0u8; 1];
        self.confirm.recv_exact(&mut ack)?;
        trace!(size, "result confirmed");
        Ok(())
    }

    /// Report normal completion.
    pub fn finish(&self) -> Result<()> {
        self.signal(Signal::Control(ControlCode::Finished))
    }

    /// Report failure.
    pub fn fail(&self) -> Result<()> {
        self.signal(Signal::Control(ControlCode::Error))
    }

    /// Receive the full broadcast-variable set sent before streaming.
    pub fn receive_broadcast_variables(&mut self) -> Result<Vec<BroadcastVariable<D::Item>>>
    where
        D::Item: AsRef<[u8]>,
    {
        let count = self.next_single_record()?;
        let count = record_as_i32(count.as_ref())?;
        let count = usize::try_from(count)
            .map_err(|_| StreamError::Protocol(format!("negative broadcast count {count}")))?;

        let mut variables = Vec::with_capacity(count);
        for _ in 0..count {
            let name = self.next_single_record()?;
            let name = String::from_utf8(name.as_ref().to_vec())
                .map_err(|_| StreamError::Protocol("broadcast name is not UTF-8".to_string()))?;

            let mut values = Vec::new();
            loop {
                let (records, last) = self.next_chunk(None)?;
                values.extend(records);
                if last {
                    break;
                }
            }
            debug!(name = %name, values = values.len(), "received broadcast variable");
            variables.push(BroadcastVariable { name, values });
        }
        Ok(variables)
    }

    fn next_single_record(&mut self) -> Result<D::Item> {
        let (mut records, _) = self.next_chunk(None)?;
        if records.len() != 1 {
            return Err(StreamError::Protocol(format!(
                "expected a single record, got {}",
                records.len()
            )));
        }
        records
            .pop()
            .ok_or_else(|| StreamError::Protocol("missing record".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use procbridge_frame::get_i32;

    use super::*;

    #[test]
    fn connect_announces_both_ports() {
        let host = ControlSocket::bind_loopback().unwrap();
        host.set_timeout(Duration::from_secs(2)).unwrap();
        let dir = std::env::temp_dir();
        let tag = format!(
            "procbridge-worker-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        );
        let records = dir.join(format!("{tag}.records"));
        let results = dir.join(format!("{tag}.results"));
        SharedFile::create(&records).unwrap();
        SharedFile::create(&results).unwrap();

        let worker = RemoteWorker::connect_files(
            host.local_port().unwrap(),
            &records,
            &results,
            &WorkerConfig::default(),
        )
        .unwrap();
        let ports = worker.ports().unwrap();

        let mut raw = [0u8; 4];
        host.recv_exact(&mut raw).unwrap();
        assert_eq!(get_i32(&raw, 0), i32::from(ports.data));
        host.recv_exact(&mut raw).unwrap();
        assert_eq!(get_i32(&raw, 0), i32::from(ports.confirm));
        assert_ne!(ports.data, ports.confirm);

        worker.finish().unwrap();
        host.recv_exact(&mut raw).unwrap();
        assert_eq!(get_i32(&raw, 0), -1);

        let _ = std::fs::remove_file(&records);
        let _ = std::fs::remove_file(&results);
    }

    #[test]
    fn connect_fails_without_buffers() {
        let missing = std::env::temp_dir().join(format!(
            "procbridge-worker-missing-{}",
            std::process::id()
        ));
        let result =
            RemoteWorker::connect_files(1, &missing, &missing, &WorkerConfig::default());
        assert!(matches!(result, Err(StreamError::Transport(_))));
    }
}
