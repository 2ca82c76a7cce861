//! Flash session driver.
//!
//! [`Flasher`] owns the transport for the session's duration and runs the
//! pure [`Engine`] against it: a single-threaded event loop reads the port
//! with a timeout bounded by the nearest deadline (watchdog expiry, next
//! progress tick) and feeds the resulting events through the state machine.
//! The port is closed on every exit path.

use std::collections::VecDeque;
use std::io::{Read as _, Write as _};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{debug, trace, warn};

use crate::error::Result;
use crate::image::FirmwareImage;
use crate::port::{NativePort, Port, SerialConfig};
use crate::session::{
    Action, Engine, Event, Outcome, SessionConfig, SessionEvent, Watchdog,
};

/// Upper bound on one blocking read, so aborts stay responsive.
const MAX_POLL: Duration = Duration::from_millis(50);

/// Lower bound on one blocking read, to avoid busy-spinning the port.
const MIN_POLL: Duration = Duration::from_millis(5);

/// Read buffer size; bootloader responses are at most two bytes.
const READ_CHUNK: usize = 64;

/// Drives one flash session over a [`Port`].
///
/// Generic over the port type so the session can run against a scripted
/// mock in tests.
pub struct Flasher<P: Port> {
    port: P,
    config: SessionConfig,
    abort: Option<Arc<AtomicBool>>,
}

impl<P: Port> Flasher<P> {
    /// Create a flasher over an already-open port.
    pub fn new(port: P, config: SessionConfig) -> Self {
        Self {
            port,
            config,
            abort: None,
        }
    }

    /// Attach an abort flag; when it turns true the session fails with
    /// [`crate::Error::Aborted`] and the port is closed.
    #[must_use]
    pub fn with_abort_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.abort = Some(flag);
        self
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Consume the flasher and return the underlying port.
    pub fn into_port(self) -> P {
        self.port
    }

    /// Flash `image`, reporting session events through `notify`.
    ///
    /// The transport is closed before this returns, on success and on every
    /// failure path alike.
    pub fn flash<F>(&mut self, image: FirmwareImage, mut notify: F) -> Result<()>
    where
        F: FnMut(SessionEvent),
    {
        let outcome = self.run_session(image, &mut notify);

        notify(SessionEvent::Log("Closing serial port...".to_string()));
        if let Err(e) = self.port.close() {
            warn!("Failed to close port {}: {e}", self.port.name());
        }

        match outcome {
            Outcome::Success => {
                notify(SessionEvent::Success(
                    "Flashing process has been successfully completed!".to_string(),
                ));
                Ok(())
            },
            Outcome::Failed(err) => {
                notify(SessionEvent::Error(err.to_string()));
                Err(err)
            },
        }
    }

    fn run_session<F>(&mut self, image: FirmwareImage, notify: &mut F) -> Outcome
    where
        F: FnMut(SessionEvent),
    {
        let mut engine = match Engine::new(image, self.config.watchdog_timeout) {
            Ok(engine) => engine,
            Err(err) => return Outcome::Failed(err),
        };
        let mut watchdog = Watchdog::new(self.config.watchdog_timeout);

        engine.start();
        notify(SessionEvent::Log(format!(
            "-- Firmware flashing has started! --\nSerial port {} with baud rate {} is open!",
            self.port.name(),
            self.port.baud_rate()
        )));

        // Stale bytes from a previous session would confuse classification.
        if let Err(err) = self.port.clear_buffers() {
            return Outcome::Failed(err);
        }

        if let Some(outcome) = self.apply(&mut engine, &mut watchdog, notify, Event::Ready) {
            return outcome;
        }

        let mut next_tick = Instant::now() + self.config.progress_period;
        loop {
            let now = Instant::now();

            if self.abort_requested() {
                if let Some(o) = self.apply(&mut engine, &mut watchdog, notify, Event::Abort) {
                    return o;
                }
            }
            if watchdog.expired(now) {
                if let Some(o) =
                    self.apply(&mut engine, &mut watchdog, notify, Event::WatchdogExpired)
                {
                    return o;
                }
            }
            if now >= next_tick {
                next_tick += self.config.progress_period;
                if let Some(o) = self.apply(&mut engine, &mut watchdog, notify, Event::ProgressTick)
                {
                    return o;
                }
            }

            // Bound the blocking read by whichever deadline comes first.
            let wait = watchdog
                .remaining(now)
                .unwrap_or(MAX_POLL)
                .min(next_tick.saturating_duration_since(now))
                .clamp(MIN_POLL, MAX_POLL);
            if let Err(err) = self.port.set_timeout(wait) {
                return Outcome::Failed(err);
            }

            let mut buf = [0u8; READ_CHUNK];
            match self.port.read(&mut buf) {
                Ok(0) => {},
                Ok(n) => {
                    trace!("received {n} bytes: {:02X?}", &buf[..n]);
                    let event = Event::Data(buf[..n].to_vec());
                    if let Some(o) = self.apply(&mut engine, &mut watchdog, notify, event) {
                        return o;
                    }
                },
                Err(e)
                    if e.kind() == std::io::ErrorKind::TimedOut
                        || e.kind() == std::io::ErrorKind::Interrupted => {},
                Err(e) => {
                    let event = Event::TransportError(e);
                    if let Some(o) = self.apply(&mut engine, &mut watchdog, notify, event) {
                        return o;
                    }
                },
            }
        }
    }

    /// Feed one event through the engine and carry out the actions.
    ///
    /// Returns the outcome once the engine finishes. A frame write that
    /// fails is fed back as a transport error so the engine decides the
    /// terminal transition, exactly once.
    fn apply<F>(
        &mut self,
        engine: &mut Engine,
        watchdog: &mut Watchdog,
        notify: &mut F,
        event: Event,
    ) -> Option<Outcome>
    where
        F: FnMut(SessionEvent),
    {
        let mut actions: VecDeque<Action> = engine.handle(event).into();

        while let Some(action) = actions.pop_front() {
            match action {
                Action::RestartWatchdog => watchdog.restart(Instant::now()),
                Action::Log(line) => {
                    debug!("{line}");
                    notify(SessionEvent::Log(line));
                },
                Action::Progress(percent) => notify(SessionEvent::Progress(percent)),
                Action::WriteFrame(frame) => {
                    trace!("writing frame: {:02X?}", frame);
                    let written = self
                        .port
                        .write_all(&frame)
                        .and_then(|()| self.port.flush());
                    if let Err(e) = written {
                        actions.extend(engine.handle(Event::TransportError(e)));
                    }
                },
                Action::Finish(outcome) => {
                    watchdog.disarm();
                    return Some(outcome);
                },
            }
        }
        None
    }

    fn abort_requested(&self) -> bool {
        self.abort
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

impl Flasher<NativePort> {
    /// Open the configured serial port and build a flasher for it.
    ///
    /// A failure here corresponds to the session ending before any frame is
    /// sent; the caller reports it through its own channel.
    pub fn open(config: SessionConfig) -> Result<Self> {
        let serial = SerialConfig::new(config.port_name.as_str(), config.baud_rate)
            .with_timeout(MAX_POLL);
        let port = NativePort::open(&serial)?;
        Ok(Self::new(port, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::io::Read;

    /// Scripted serial port with independent read/write sides.
    ///
    /// Each queued chunk is handed out by one `read` call; an empty queue
    /// behaves like a silent device (timeout).
    struct MockPort {
        reads: VecDeque<Vec<u8>>,
        written: Vec<Vec<u8>>,
        close_calls: usize,
        timeout: Duration,
    }

    impl MockPort {
        fn new(reads: Vec<Vec<u8>>) -> Self {
            Self {
                reads: reads.into_iter().collect(),
                written: Vec::new(),
                close_calls: 0,
                timeout: Duration::from_millis(10),
            }
        }

        fn silent() -> Self {
            Self::new(Vec::new())
        }
    }

    impl Read for MockPort {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.reads.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                },
                None => {
                    std::thread::sleep(self.timeout);
                    Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "no data"))
                },
            }
        }
    }

    impl std::io::Write for MockPort {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.push(buf.to_vec());
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Port for MockPort {
        fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
            self.timeout = timeout;
            Ok(())
        }
        fn timeout(&self) -> Duration {
            self.timeout
        }
        fn baud_rate(&self) -> u32 {
            115200
        }
        fn clear_buffers(&mut self) -> Result<()> {
            Ok(())
        }
        fn name(&self) -> &str {
            "mock"
        }
        fn close(&mut self) -> Result<()> {
            self.close_calls += 1;
            Ok(())
        }
    }

    fn fast_config() -> SessionConfig {
        SessionConfig::new("mock", 115200)
            .with_watchdog_timeout(Duration::from_millis(200))
            .with_progress_period(Duration::from_millis(50))
    }

    fn ack() -> Vec<u8> {
        vec![0x00, 0xCC]
    }

    #[test]
    fn test_full_flash_session_succeeds() {
        // 504-byte image: sync, bankErase, download, 3 data packets, reset.
        let port = MockPort::new(vec![ack(); 7]);
        let image = FirmwareImage::from_raw(vec![0xA5; 504]);
        let mut flasher = Flasher::new(port, fast_config());

        let mut events = Vec::new();
        let result = flasher.flash(image, |e| events.push(e));
        assert!(result.is_ok(), "{result:?}");

        let port = flasher.into_port();
        assert_eq!(port.close_calls, 1);

        // Lock-step frame sequence, bit-exact.
        assert_eq!(port.written.len(), 7);
        assert_eq!(port.written[0], vec![0x55, 0x55]);
        assert_eq!(port.written[1], vec![0x03, 0x2C, 0x2C]);
        assert_eq!(port.written[2][2], 0x21);
        assert_eq!(port.written[3].len(), 255);
        assert_eq!(port.written[4].len(), 255);
        assert_eq!(port.written[5], vec![0x03, 0x24, 0x24]);
        assert_eq!(port.written[6], vec![0x03, 0x25, 0x25]);

        assert!(events.contains(&SessionEvent::Progress(100)));
        assert!(
            events
                .iter()
                .any(|e| matches!(e, SessionEvent::Success(_)))
        );
    }

    #[test]
    fn test_split_acknowledge_delivery() {
        // First acknowledge arrives as [0x00] then [0xCC].
        let mut reads = vec![vec![0x00], vec![0xCC]];
        reads.extend(vec![ack(); 6]);
        let port = MockPort::new(reads);
        let image = FirmwareImage::from_raw(vec![0xA5; 504]);
        let mut flasher = Flasher::new(port, fast_config());

        let result = flasher.flash(image, |_| {});
        assert!(result.is_ok(), "{result:?}");
        assert_eq!(flasher.into_port().written.len(), 7);
    }

    #[test]
    fn test_nack_fails_and_closes_port_once() {
        let port = MockPort::new(vec![vec![0x33]]);
        let image = FirmwareImage::from_raw(vec![0xA5; 504]);
        let mut flasher = Flasher::new(port, fast_config());

        let mut events = Vec::new();
        let result = flasher.flash(image, |e| events.push(e));
        assert!(matches!(result, Err(Error::Nack { byte: 0x33 })));

        let port = flasher.into_port();
        assert_eq!(port.close_calls, 1);
        // Only the sync pattern went out before the rejection.
        assert_eq!(port.written, vec![vec![0x55, 0x55]]);
        assert!(events.iter().any(|e| matches!(e, SessionEvent::Error(_))));
    }

    #[test]
    fn test_silent_device_trips_watchdog() {
        let port = MockPort::silent();
        let image = FirmwareImage::from_raw(vec![0xA5; 504]);
        let mut flasher = Flasher::new(port, fast_config());

        let result = flasher.flash(image, |_| {});
        assert!(matches!(result, Err(Error::WatchdogTimeout { ms: 200 })));
        assert_eq!(flasher.into_port().close_calls, 1);
    }

    #[test]
    fn test_device_that_stops_answering_after_sync_trips_watchdog() {
        // Sync acknowledged, then the device goes quiet.
        let port = MockPort::new(vec![ack()]);
        let image = FirmwareImage::from_raw(vec![0xA5; 504]);
        let mut flasher = Flasher::new(port, fast_config());

        let result = flasher.flash(image, |_| {});
        assert!(matches!(result, Err(Error::WatchdogTimeout { .. })));

        let port = flasher.into_port();
        assert_eq!(port.close_calls, 1);
        assert_eq!(port.written.len(), 2); // sync, bankErase
    }

    #[test]
    fn test_abort_flag_stops_session() {
        let port = MockPort::silent();
        let image = FirmwareImage::from_raw(vec![0xA5; 504]);
        let flag = Arc::new(AtomicBool::new(true));
        let mut flasher = Flasher::new(port, fast_config()).with_abort_flag(Arc::clone(&flag));

        let result = flasher.flash(image, |_| {});
        assert!(matches!(result, Err(Error::Aborted)));
        assert_eq!(flasher.into_port().close_calls, 1);
    }

    #[test]
    fn test_progress_is_monotone_over_session() {
        let port = MockPort::new(vec![ack(); 7]);
        let image = FirmwareImage::from_raw(vec![0xA5; 504]);
        let mut flasher = Flasher::new(port, fast_config());

        let mut percents = Vec::new();
        flasher
            .flash(image, |e| {
                if let SessionEvent::Progress(p) = e {
                    percents.push(p);
                }
            })
            .unwrap();

        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(percents.last(), Some(&100));
    }
}
