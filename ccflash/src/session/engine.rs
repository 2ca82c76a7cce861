//! Flash session state machine.
//!
//! The engine is a pure state-transition function: it consumes [`Event`]s
//! and returns the [`Action`]s the driver must apply, in order. It never
//! touches the serial port or a clock itself, which keeps the whole
//! command-sequencing logic testable by injecting synthetic events.
//!
//! ```text
//! Idle --start()--> Opening --Ready--> Running --+--> Succeeded
//!                      |                  ^  |   |
//!                      |                  +--+   +--> Failed
//!                      +------------------------------^
//! ```
//!
//! The `Running` self-loop is lock-step: exactly one frame is outstanding,
//! and the next one is written only after the current one is acknowledged.

use std::collections::VecDeque;

use log::trace;

use crate::error::Error;
use crate::image::FirmwareImage;
use crate::protocol::{ChunkCursor, Command, CommandFrame, Response, classify};
use crate::session::progress::SessionProgress;

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, transport not yet touched.
    Idle,
    /// Transport is being opened and prepared.
    Opening,
    /// Frames are in flight.
    Running,
    /// Terminal: every command acknowledged.
    Succeeded,
    /// Terminal: the session failed.
    Failed,
}

/// Inputs consumed by the state machine.
#[derive(Debug)]
pub enum Event {
    /// The transport is open and ready for the first frame.
    Ready,
    /// A chunk of bytes arrived from the transport.
    ///
    /// No chunking granularity is assumed: a logical response may be spread
    /// over any number of these events.
    Data(Vec<u8>),
    /// The transport reported an I/O error.
    TransportError(std::io::Error),
    /// The watchdog deadline passed without a valid response.
    WatchdogExpired,
    /// Periodic progress sampling tick.
    ProgressTick,
    /// The user asked to abort the session.
    Abort,
}

/// Side effects the driver must apply, in the order returned.
#[derive(Debug)]
pub enum Action {
    /// Write a frame to the transport.
    WriteFrame(Vec<u8>),
    /// Restart the watchdog deadline.
    RestartWatchdog,
    /// Emit a log line to the session observer.
    Log(String),
    /// Emit a progress percentage to the session observer.
    Progress(u8),
    /// The session reached a terminal state; tear everything down.
    Finish(Outcome),
}

/// Terminal session outcome, produced exactly once.
#[derive(Debug)]
pub enum Outcome {
    /// Every command was acknowledged.
    Success,
    /// The session failed with the given reason.
    Failed(Error),
}

/// Pure flash session state machine.
pub struct Engine {
    image: FirmwareImage,
    image_len: u32,
    queue: VecDeque<Command>,
    cursor: ChunkCursor,
    progress: SessionProgress,
    state: SessionState,
    watchdog_ms: u64,
}

impl Engine {
    /// Create an engine for one session over `image`.
    ///
    /// Fails only when the image cannot be described by the download
    /// frame's 32-bit length field.
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(image: FirmwareImage, watchdog_timeout: std::time::Duration) -> crate::Result<Self> {
        let image_len = image.len_u32()?;
        let cursor = ChunkCursor::new(image.len());
        let progress = SessionProgress::new(cursor.packet_count());
        Ok(Self {
            image,
            image_len,
            queue: VecDeque::from([
                Command::Sync,
                Command::BankErase,
                Command::Download,
                Command::SendData,
                Command::Reset,
            ]),
            cursor,
            progress,
            state: SessionState::Idle,
            watchdog_ms: watchdog_timeout.as_millis() as u64,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True once the session reached `Succeeded` or `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, SessionState::Succeeded | SessionState::Failed)
    }

    /// Commands not yet acknowledged to completion, front first.
    pub fn remaining_commands(&self) -> impl Iterator<Item = Command> + '_ {
        self.queue.iter().copied()
    }

    /// Step counter snapshot.
    pub fn progress(&self) -> SessionProgress {
        self.progress
    }

    /// Begin the session: the driver is about to open the transport.
    pub fn start(&mut self) {
        debug_assert_eq!(self.state, SessionState::Idle);
        self.state = SessionState::Opening;
    }

    /// Feed one event and collect the resulting actions.
    pub fn handle(&mut self, event: Event) -> Vec<Action> {
        if self.is_terminal() {
            trace!("event after terminal state ignored: {event:?}");
            return Vec::new();
        }

        match event {
            Event::Ready => self.on_ready(),
            Event::Data(bytes) => self.on_data(&bytes),
            Event::TransportError(err) => self.finish(Outcome::Failed(Error::Io(err))),
            Event::WatchdogExpired => self.finish(Outcome::Failed(Error::WatchdogTimeout {
                ms: self.watchdog_ms,
            })),
            Event::ProgressTick => {
                if self.state == SessionState::Running {
                    vec![Action::Progress(self.progress.percent())]
                } else {
                    Vec::new()
                }
            },
            Event::Abort => self.finish(Outcome::Failed(Error::Aborted)),
        }
    }

    /// Transport is open: write the first frame and arm the watchdog.
    fn on_ready(&mut self) -> Vec<Action> {
        if self.state != SessionState::Opening {
            trace!("Ready event outside Opening state ignored");
            return Vec::new();
        }
        self.state = SessionState::Running;

        let mut actions = vec![Action::Log("Start executing commands:".to_string())];
        if let Some(&front) = self.queue.front() {
            actions.push(Action::WriteFrame(self.encode(front)));
        }
        actions.push(Action::RestartWatchdog);
        actions
    }

    /// Classify a received chunk and advance the session on acknowledge.
    fn on_data(&mut self, bytes: &[u8]) -> Vec<Action> {
        if self.state != SessionState::Running {
            trace!("data before Running state ignored: {bytes:02X?}");
            return Vec::new();
        }

        match classify(bytes) {
            // The acknowledge may still be in flight; touch nothing, not
            // even the watchdog.
            Response::Pending => Vec::new(),
            Response::Nack(byte) => self.finish(Outcome::Failed(Error::Nack { byte })),
            Response::Ack => self.on_ack(),
        }
    }

    /// One frame acknowledged: bookkeeping, then the next frame.
    fn on_ack(&mut self) -> Vec<Action> {
        let mut actions = vec![Action::RestartWatchdog];
        self.progress.advance();

        let Some(&front) = self.queue.front() else {
            // An acknowledge with nothing outstanding means the bookkeeping
            // is broken; never report that as success.
            return self.step_mismatch();
        };

        if front != Command::SendData {
            actions.push(Action::Log(format!("\u{2713} Command \"{front}\"")));
            self.queue.pop_front();
            if self.queue.front() == Some(&Command::SendData) {
                actions.push(Action::Log(format!(
                    "Start sending {} data packets:",
                    self.cursor.packet_count()
                )));
            }
        } else {
            // The acknowledged packet is the one the cursor still points at.
            self.cursor.advance();
            actions.push(Action::Log(format!(
                "Sent {}/{} data packets",
                self.cursor.packet_index(),
                self.cursor.packet_count()
            )));
            if self.cursor.is_exhausted() {
                actions.push(Action::Log(format!("\u{2713} Command \"{front}\"")));
                self.queue.pop_front();
            }
        }

        if let Some(&next) = self.queue.front() {
            actions.push(Action::WriteFrame(self.encode(next)));
            actions
        } else if self.progress.is_complete() {
            self.state = SessionState::Succeeded;
            actions.push(Action::Progress(100));
            actions.push(Action::Finish(Outcome::Success));
            actions
        } else {
            self.step_mismatch()
        }
    }

    fn step_mismatch(&mut self) -> Vec<Action> {
        self.finish(Outcome::Failed(Error::StepMismatch {
            completed: self.progress.current_step(),
            expected: self.progress.total_steps(),
        }))
    }

    fn finish(&mut self, outcome: Outcome) -> Vec<Action> {
        self.state = match outcome {
            Outcome::Success => SessionState::Succeeded,
            Outcome::Failed(_) => SessionState::Failed,
        };
        vec![Action::Finish(outcome)]
    }

    /// Encode the frame for a queued command.
    fn encode(&self, cmd: Command) -> Vec<u8> {
        match cmd {
            Command::Sync => CommandFrame::sync(),
            Command::BankErase => CommandFrame::bank_erase(),
            Command::Download => CommandFrame::download(self.image_len),
            Command::SendData => {
                CommandFrame::send_data(self.cursor.current_chunk(self.image.bytes()))
            },
            Command::Reset => CommandFrame::reset(),
        }
        .build()
    }

    #[cfg(test)]
    pub(crate) fn rewind_step_for_test(&mut self) {
        let step = self.progress.current_step().saturating_sub(1);
        self.progress.set_step(step);
    }
}
