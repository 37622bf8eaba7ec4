//! Host-side session driver.

use std::iter::Peekable;
use std::path::Path;

use procbridge_frame::{
    ControlCode, Group, Notification, Receiver, RecordDecoder, RecordEncoder, Sender, Signal,
};
use procbridge_transport::{ChunkSink, ChunkSource, SharedFile};
use tracing::{debug, info, trace, warn};

use crate::channel::ControlChannel;
use crate::config::{StreamerConfig, TaskConfig};
use crate::context::{BroadcastVariables, Collector, Diagnostics};
use crate::error::{Result, StreamError};
use crate::handshake::{self, PortPair};
use crate::process::ProcessSetup;

/// Which request codes the worker may send during a streaming call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Ungrouped,
    Grouped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Serve(Group),
    Collect(usize),
    Finish,
    Fail,
}

impl Mode {
    fn resolve(self, signal: Signal) -> Result<Action> {
        match (self, signal) {
            (_, Signal::PayloadSize(size)) => Ok(Action::Collect(size)),
            (_, Signal::Control(ControlCode::Finished)) => Ok(Action::Finish),
            (_, Signal::Control(ControlCode::Error)) => Ok(Action::Fail),
            (Mode::Ungrouped, Signal::Control(ControlCode::BufferRequest)) => {
                Ok(Action::Serve(Group::First))
            }
            (Mode::Grouped, Signal::Control(ControlCode::GroupRequest(group))) => {
                Ok(Action::Serve(group))
            }
            (mode, Signal::Control(code)) => Err(StreamError::Protocol(format!(
                "signal {} is not valid in {mode:?} mode",
                code.code()
            ))),
        }
    }
}

/// Drives one external process through the streaming protocol.
///
/// Lifecycle: [`open`](Self::open), optionally
/// [`send_broadcast_variables`](Self::send_broadcast_variables), any number
/// of streaming calls, then [`close`](Self::close). Dropping the streamer
/// closes it.
pub struct Streamer<E, D, O = SharedFile, I = SharedFile> {
    task: String,
    config: StreamerConfig,
    diagnostics: Diagnostics,
    channel: Option<ControlChannel>,
    process: Option<Box<dyn ProcessSetup + Send>>,
    sender: Sender<E, O>,
    receiver: Receiver<D, I>,
}

impl<E, D> Streamer<E, D, SharedFile, SharedFile>
where
    D: RecordDecoder,
{
    /// Create a streamer whose data buffers are files at the given paths.
    ///
    /// Both files are created (or truncated) here so the worker can open
    /// them as soon as it is launched.
    pub fn with_files(
        task: impl Into<String>,
        config: StreamerConfig,
        encoder: E,
        decoder: D,
        records_path: impl AsRef<Path>,
        results_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let records = SharedFile::create(records_path)?;
        let results = SharedFile::create(results_path)?;
        Ok(Self::new(task, config, encoder, decoder, records, results))
    }
}

impl<E, D, O, I> Streamer<E, D, O, I>
where
    D: RecordDecoder,
    O: ChunkSink,
    I: ChunkSource,
{
    /// Create a streamer writing input chunks to `records` and reading
    /// result chunks from `results`.
    pub fn new(
        task: impl Into<String>,
        config: StreamerConfig,
        encoder: E,
        decoder: D,
        records: O,
        results: I,
    ) -> Self {
        let sender = Sender::new(encoder, records, config.buffer_size);
        Self {
            task: task.into(),
            config,
            diagnostics: Diagnostics::new(),
            channel: None,
            process: None,
            sender,
            receiver: Receiver::new(decoder, results),
        }
    }

    /// Bind the control port, launch the process and run the port handshake.
    ///
    /// The channel and process are retained even when a later step fails,
    /// so [`close`](Self::close) can still release them.
    pub fn open<P>(&mut self, setup: P) -> Result<()>
    where
        P: ProcessSetup + Send + 'static,
    {
        if self.channel.is_some() {
            return Err(StreamError::Protocol(format!(
                "streamer for task {} is already open",
                self.task
            )));
        }

        let channel = self.channel.insert(ControlChannel::bind(
            &self.task,
            self.diagnostics.clone(),
            self.config.error_grace,
            self.config.handshake_timeout,
        )?);
        let host_port = channel.local_port()?;
        debug!(task = %self.task, host_port, "control port bound");

        let process = self.process.insert(Box::new(setup));
        process
            .setup(host_port, &self.diagnostics)
            .map_err(StreamError::Setup)?;

        let ports = handshake::receive_ports(channel)?;
        channel.set_timeout(self.config.stream_timeout)?;
        info!(
            task = %self.task,
            host_port,
            data = ports.data,
            confirm = ports.confirm,
            "streamer open"
        );
        Ok(())
    }

    /// Transfer every broadcast variable named in `config`.
    ///
    /// Each transfer step waits for one request from the worker: first the
    /// count, then per variable its name followed by its values, which may
    /// span several chunks. A variable with no values still produces one
    /// empty final chunk.
    pub fn send_broadcast_variables<T, B>(&mut self, config: &TaskConfig, variables: &B) -> Result<()>
    where
        B: BroadcastVariables<T> + ?Sized,
        E: RecordEncoder<i32> + RecordEncoder<str> + RecordEncoder<T>,
    {
        let names = config.broadcast_names()?;
        let count = i32::try_from(names.len()).map_err(|_| {
            StreamError::Config(format!("too many broadcast variables: {}", names.len()))
        })?;
        let channel = self.channel.as_mut().ok_or(StreamError::NotOpen)?;

        channel.recv_checked()?;
        let size = self.sender.send_record(&count)?;
        channel.notify(Notification::new(size, true))?;

        for name in &names {
            let values = variables.broadcast_variable(name).ok_or_else(|| {
                StreamError::Config(format!("broadcast variable {name} is not available"))
            })?;

            channel.recv_checked()?;
            let size = self.sender.send_record(name.as_str())?;
            channel.notify(Notification::new(size, true))?;

            // At least one chunk per variable, so an empty one still ends
            // with a zero-size last chunk the worker can stop on.
            let mut values = values.iter().peekable();
            loop {
                channel.recv_checked()?;
                let size = self.sender.send_buffer(&mut values, Group::First)?;
                let more = values.peek().is_some() || self.sender.has_remaining(Group::First);
                channel.notify(Notification::new(size, !more))?;
                if !more {
                    break;
                }
            }
            self.sender.reset();
            debug!(task = %self.task, name = %name, "broadcast variable sent");
        }

        info!(task = %self.task, count, "broadcast variables sent");
        Ok(())
    }

    /// Stream a single input to the worker, collecting its results.
    ///
    /// An empty input returns immediately without any traffic.
    pub fn stream_buffer_without_groups<R, T, C>(
        &mut self,
        records: R,
        collector: &mut C,
    ) -> Result<()>
    where
        R: IntoIterator<Item = T>,
        E: RecordEncoder<T>,
        C: Collector<D::Item> + ?Sized,
    {
        let mut records = records.into_iter().peekable();
        if records.peek().is_none() {
            debug!(task = %self.task, "input is empty, skipping stream");
            return Ok(());
        }
        let mut input = Input::new(records);
        self.run(Mode::Ungrouped, collector, |sender, group| {
            input.serve(sender, group)
        })
    }

    /// Stream two inputs, served independently on the worker's group
    /// requests, collecting its results.
    ///
    /// Returns immediately when both inputs are empty. If only one is, the
    /// first request for it is answered with a zero-size last chunk.
    pub fn stream_buffer_with_groups<R1, R2, A, B, C>(
        &mut self,
        first: R1,
        second: R2,
        collector: &mut C,
    ) -> Result<()>
    where
        R1: IntoIterator<Item = A>,
        R2: IntoIterator<Item = B>,
        E: RecordEncoder<A> + RecordEncoder<B>,
        C: Collector<D::Item> + ?Sized,
    {
        let mut first = first.into_iter().peekable();
        let mut second = second.into_iter().peekable();
        if first.peek().is_none() && second.peek().is_none() {
            debug!(task = %self.task, "both inputs are empty, skipping stream");
            return Ok(());
        }
        let (mut first, mut second) = (Input::new(first), Input::new(second));
        self.run(Mode::Grouped, collector, |sender, group| match group {
            Group::First => first.serve(sender, group),
            Group::Second => second.serve(sender, group),
        })
    }

    fn run<C, F>(&mut self, mode: Mode, collector: &mut C, mut fill: F) -> Result<()>
    where
        C: Collector<D::Item> + ?Sized,
        F: FnMut(&mut Sender<E, O>, Group) -> Result<Option<Notification>>,
    {
        let channel = self.channel.as_mut().ok_or(StreamError::NotOpen)?;
        let mut collected = 0usize;
        loop {
            match mode.resolve(channel.recv_signal()?)? {
                Action::Serve(group) => match fill(&mut self.sender, group)? {
                    Some(notification) => channel.notify(notification)?,
                    None => trace!(
                        group = group.index(),
                        "ignoring request for exhausted input"
                    ),
                },
                Action::Collect(size) => {
                    collected += self
                        .receiver
                        .collect_buffer(size, |record| collector.collect(record))?;
                    channel.confirm_read()?;
                }
                Action::Finish => {
                    debug!(task = %self.task, collected, "external process finished");
                    return Ok(());
                }
                Action::Fail => return Err(channel.terminated()),
            }
        }
    }
}

/// One input of a streaming call.
struct Input<It: Iterator> {
    records: Peekable<It>,
    served: bool,
}

impl<It: Iterator> Input<It> {
    fn new(records: Peekable<It>) -> Self {
        Self {
            records,
            served: false,
        }
    }

    /// Fill the next chunk for `group`, or `None` once the last chunk has
    /// gone out and nothing is left.
    ///
    /// An input that is empty from the start still answers its first
    /// request, with a zero-size last chunk.
    fn serve<E, S>(&mut self, sender: &mut Sender<E, S>, group: Group) -> Result<Option<Notification>>
    where
        S: ChunkSink,
        E: RecordEncoder<It::Item>,
    {
        let exhausted = self.records.peek().is_none() && !sender.has_remaining(group);
        if exhausted && self.served {
            return Ok(None);
        }
        let size = sender.send_buffer(&mut self.records, group)?;
        self.served = true;
        let last = self.records.peek().is_none() && !sender.has_remaining(group);
        Ok(Some(Notification::new(size, last)))
    }
}

impl<E, D, O, I> Streamer<E, D, O, I> {
    /// Release the control socket, the data buffers and the process.
    ///
    /// Safe to call more than once and after a failed [`open`](Self::open).
    pub fn close(&mut self) -> Result<()> {
        let was_open = self.channel.take().is_some();
        self.sender.close();
        self.receiver.close();
        if let Some(mut process) = self.process.take() {
            process.teardown().map_err(StreamError::Setup)?;
        }
        if was_open {
            debug!(task = %self.task, "streamer closed");
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    /// Side-channel output gathered from the process.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Worker ports, once the handshake has completed.
    pub fn ports(&self) -> Option<PortPair> {
        self.channel.as_ref().and_then(ControlChannel::ports)
    }

    /// Host control port, while open.
    pub fn local_port(&self) -> Option<u16> {
        self.channel
            .as_ref()
            .and_then(|channel| channel.local_port().ok())
    }
}

impl<E, D, O, I> Drop for Streamer<E, D, O, I> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(task = %self.task, error = %err, "failed to close streamer");
        }
    }
}
