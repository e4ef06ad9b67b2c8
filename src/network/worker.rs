//! Ingestion worker: accepts the producer connection and feeds the range store
//!
//! One producer is served at a time. Each session reads the byte stream,
//! splits it into newline-delimited JSON frames and applies the contained
//! ranges for configured anchors. Malformed frames are logged and skipped;
//! only the end of the stream or a socket failure ends a session, after which
//! the worker goes back to accepting.

use crate::algorithms::geometry::AnchorLayout;
use crate::core::{RangeReading, READ_CHUNK_BYTES};
use crate::network::error::{is_transient, peer_label, ConnectionError, ConnectionResult, RecoveryStrategy};
use crate::processing::framing::{FrameEvent, LineFramer};
use crate::processing::parser::{parse_frame, ParseError};
use crate::processing::store::RangeStore;
use crate::utils::config::{Config, IngestMode};
use crate::utils::shutdown::Shutdown;
use std::io::Read;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// How often the listener is polled for connections and shutdown
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Ingestion behaviour, usually derived from [`Config`]
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub ingest_mode: IngestMode,
    pub clear_on_disconnect: bool,
    pub single_session: bool,
    pub read_timeout: Duration,
    pub max_frame_bytes: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        WorkerSettings::from(&Config::default())
    }
}

impl From<&Config> for WorkerSettings {
    fn from(config: &Config) -> Self {
        Self {
            ingest_mode: config.ingest_mode,
            clear_on_disconnect: config.clear_on_disconnect,
            single_session: config.single_session,
            read_timeout: config.read_timeout(),
            max_frame_bytes: config.max_frame_bytes,
        }
    }
}

/// Counters for one producer session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub bytes_read: usize,
    pub frames_applied: u32,
    pub frames_rejected: u32,
    pub readings_applied: u32,
    pub links_ignored: u32,
    pub link_errors: u32,
}

/// Why a session ended
#[derive(Debug)]
pub enum SessionEnd {
    /// Zero-byte read: the producer closed the stream
    PeerClosed,
    /// Shutdown was requested
    Shutdown,
    /// The socket failed
    Failed(ConnectionError),
}

#[derive(Debug)]
pub struct SessionOutcome {
    pub end: SessionEnd,
    pub stats: SessionStats,
}

/// What a single frame contributed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameSummary {
    pub applied: usize,
    pub ignored: usize,
    pub link_errors: usize,
}

/// Applies frames from one byte stream to the range store
#[derive(Debug, Clone)]
pub struct SessionProcessor {
    layout: Arc<AnchorLayout>,
    store: RangeStore,
    settings: WorkerSettings,
}

impl SessionProcessor {
    pub fn new(layout: Arc<AnchorLayout>, store: RangeStore, settings: WorkerSettings) -> Self {
        Self { layout, store, settings }
    }

    /// Parse one complete frame and fold its ranges into the store.
    ///
    /// Links for anchors outside the layout are ignored. Invalid links are
    /// reported and skipped without discarding the rest of the frame.
    pub fn apply_frame(&self, frame: &[u8]) -> Result<FrameSummary, ParseError> {
        let report = parse_frame(frame)?;
        let (readings, errors) = report.into_readings();

        for error in &errors {
            warn!(%error, "skipping link");
        }

        let mut summary = FrameSummary {
            link_errors: errors.len(),
            ..FrameSummary::default()
        };

        let known: Vec<RangeReading> = readings
            .into_iter()
            .filter(|reading| {
                let known = self.layout.contains(&reading.anchor_id);
                if !known {
                    trace!(anchor = %reading.anchor_id, "ignoring unconfigured anchor");
                    summary.ignored += 1;
                }
                known
            })
            .collect();

        summary.applied = known.len();

        match self.settings.ingest_mode {
            IngestMode::Merge => self.store.merge(known),
            IngestMode::Replace => self.store.replace_all(known),
        }

        Ok(summary)
    }

    /// Read `reader` until it closes, fails or shutdown is requested.
    ///
    /// Readers with a timeout may return `WouldBlock`/`TimedOut`; those only
    /// give the loop a chance to observe shutdown.
    pub fn run_session<R: Read>(&self, mut reader: R, peer: &str, shutdown: &Shutdown) -> SessionOutcome {
        let mut framer = LineFramer::new(self.settings.max_frame_bytes);
        let mut buf = [0u8; READ_CHUNK_BYTES];
        let mut stats = SessionStats::default();

        let end = loop {
            if shutdown.is_triggered() {
                break SessionEnd::Shutdown;
            }

            let n = match reader.read(&mut buf) {
                Ok(0) => {
                    if framer.pending() > 0 {
                        debug!(peer, bytes = framer.pending(), "dropping incomplete trailing frame");
                    }
                    break SessionEnd::PeerClosed;
                }
                Ok(n) => n,
                Err(e) if is_transient(&e) => continue,
                Err(e) => break SessionEnd::Failed(ConnectionError::read(peer, e)),
            };

            stats.bytes_read += n;

            for event in framer.push(&buf[..n]) {
                match event {
                    FrameEvent::Complete(frame) => match self.apply_frame(&frame) {
                        Ok(summary) => {
                            stats.frames_applied += 1;
                            stats.readings_applied += summary.applied as u32;
                            stats.links_ignored += summary.ignored as u32;
                            stats.link_errors += summary.link_errors as u32;
                        }
                        Err(error) => {
                            stats.frames_rejected += 1;
                            warn!(peer, %error, "dropping frame");
                        }
                    },
                    FrameEvent::Oversized { discarded } => {
                        stats.frames_rejected += 1;
                        let error = ParseError::FrameTooLong { bytes: discarded };
                        warn!(peer, %error, "dropping frame");
                    }
                }
            }
        };

        SessionOutcome { end, stats }
    }
}

/// Accepts producer connections and runs one session at a time
#[derive(Debug)]
pub struct IngestionWorker {
    listener: TcpListener,
    processor: SessionProcessor,
    settings: WorkerSettings,
}

impl IngestionWorker {
    /// Bind the listening socket. Failure here is a fatal startup error.
    pub fn bind(
        address: &str,
        layout: Arc<AnchorLayout>,
        store: RangeStore,
        settings: WorkerSettings,
    ) -> ConnectionResult<Self> {
        let listener = TcpListener::bind(address).map_err(|source| ConnectionError::Bind {
            address: address.to_string(),
            source,
        })?;
        listener.set_nonblocking(true).map_err(ConnectionError::Configure)?;

        info!(address = %peer_label(listener.local_addr().ok()), "listening for range reports");

        Ok(Self {
            listener,
            processor: SessionProcessor::new(layout, store, settings.clone()),
            settings,
        })
    }

    pub fn local_addr(&self) -> ConnectionResult<SocketAddr> {
        self.listener.local_addr().map_err(ConnectionError::Configure)
    }

    pub fn processor(&self) -> &SessionProcessor {
        &self.processor
    }

    /// Accept loop. Returns once shutdown is requested, or after the first
    /// session when `single_session` is set.
    pub fn run(&self, shutdown: &Shutdown) -> ConnectionResult<()> {
        while !shutdown.is_triggered() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    self.serve(stream, peer, shutdown);
                    if self.settings.single_session {
                        info!("single session finished, ingestion stopping");
                        break;
                    }
                }
                Err(e) if is_transient(&e) => {
                    if !shutdown.sleep(ACCEPT_POLL_INTERVAL) {
                        break;
                    }
                }
                Err(e) => {
                    let error = ConnectionError::Accept(e);
                    warn!(%error, "accept failed");
                    match error.recovery_strategy() {
                        RecoveryStrategy::RetryWithDelay { delay_ms } => {
                            if !shutdown.sleep(Duration::from_millis(u64::from(delay_ms))) {
                                break;
                            }
                        }
                        RecoveryStrategy::ReturnToAccept => {}
                        RecoveryStrategy::Fail => return Err(error),
                    }
                }
            }
        }

        info!("ingestion worker stopped");
        Ok(())
    }

    fn serve(&self, stream: TcpStream, peer: SocketAddr, shutdown: &Shutdown) {
        let peer = peer.to_string();
        info!(%peer, "producer connected");

        let configured = stream
            .set_nonblocking(false)
            .and_then(|_| stream.set_read_timeout(Some(self.settings.read_timeout)));

        let outcome = match configured {
            Ok(()) => self.processor.run_session(&stream, &peer, shutdown),
            Err(e) => SessionOutcome {
                end: SessionEnd::Failed(ConnectionError::Configure(e)),
                stats: SessionStats::default(),
            },
        };

        let stats = &outcome.stats;
        match &outcome.end {
            SessionEnd::PeerClosed => info!(
                %peer,
                frames = stats.frames_applied,
                rejected = stats.frames_rejected,
                "producer disconnected"
            ),
            SessionEnd::Shutdown => info!(%peer, frames = stats.frames_applied, "session closed for shutdown"),
            SessionEnd::Failed(error) => warn!(
                %peer,
                %error,
                frames = stats.frames_applied,
                "session ended"
            ),
        }

        if self.settings.clear_on_disconnect {
            self.processor.store.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AnchorId, AnchorPosition};
    use std::collections::VecDeque;
    use std::io::{self, Write};
    use std::thread;
    use std::time::Instant;

    fn layout() -> Arc<AnchorLayout> {
        Arc::new(
            AnchorLayout::literal(vec![
                (AnchorId::from("50"), AnchorPosition::new(0.0, 0.0)),
                (AnchorId::from("51"), AnchorPosition::new(10.0, 0.0)),
                (AnchorId::from("52"), AnchorPosition::new(6.4, 4.8)),
            ])
            .unwrap(),
        )
    }

    fn processor(settings: WorkerSettings) -> (SessionProcessor, RangeStore) {
        let store = RangeStore::new();
        (SessionProcessor::new(layout(), store.clone(), settings), store)
    }

    /// Reader that hands out pre-split chunks, then reports end of stream
    struct ChunkedReader {
        chunks: VecDeque<io::Result<Vec<u8>>>,
    }

    impl ChunkedReader {
        fn new(chunks: Vec<io::Result<Vec<u8>>>) -> Self {
            Self { chunks: chunks.into() }
        }
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                None => Ok(0),
                Some(Err(e)) => Err(e),
                Some(Ok(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
            }
        }
    }

    fn chunk(text: &str) -> io::Result<Vec<u8>> {
        Ok(text.as_bytes().to_vec())
    }

    #[test]
    fn test_frame_split_across_reads() {
        let (processor, store) = processor(WorkerSettings::default());
        let reader = ChunkedReader::new(vec![
            chunk(r#"{"links":[{"A":"50","R":"6"},"#),
            chunk(r#"{"A":"51","R":"6"}]}"#),
            chunk("\n"),
        ]);

        let outcome = processor.run_session(reader, "test", &Shutdown::new());

        assert!(matches!(outcome.end, SessionEnd::PeerClosed));
        assert_eq!(outcome.stats.frames_applied, 1);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.get(&"50".into()), Some(6.0));
        assert_eq!(snapshot.get(&"51".into()), Some(6.0));
    }

    #[test]
    fn test_incomplete_frame_not_applied() {
        let (processor, store) = processor(WorkerSettings::default());
        let reader = ChunkedReader::new(vec![chunk(r#"{"links":[{"A":"50","R":"6"}]}"#)]);

        let outcome = processor.run_session(reader, "test", &Shutdown::new());

        assert_eq!(outcome.stats.frames_applied, 0);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_malformed_frame_followed_by_good_frame() {
        let (processor, store) = processor(WorkerSettings::default());
        let reader = ChunkedReader::new(vec![
            chunk("{\"links\":[{\"A\":\"50\",\n"),
            chunk("{\"links\":[{\"A\":\"52\",\"R\":\"5\"}]}\n"),
        ]);

        let outcome = processor.run_session(reader, "test", &Shutdown::new());

        assert!(matches!(outcome.end, SessionEnd::PeerClosed));
        assert_eq!(outcome.stats.frames_rejected, 1);
        assert_eq!(outcome.stats.frames_applied, 1);
        assert_eq!(store.snapshot().get(&"52".into()), Some(5.0));
    }

    #[test]
    fn test_unknown_anchor_ignored() {
        let (processor, store) = processor(WorkerSettings::default());

        let summary = processor
            .apply_frame(br#"{"links":[{"A":"99","R":"1.5"},{"A":"50","R":"2.5"}]}"#)
            .unwrap();

        assert_eq!(summary, FrameSummary { applied: 1, ignored: 1, link_errors: 0 });
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get(&"99".into()), None);
    }

    #[test]
    fn test_mistyped_link_keeps_rest_of_frame() {
        let (processor, store) = processor(WorkerSettings::default());

        let summary = processor
            .apply_frame(br#"{"links":[{"A":"50","R":true},7,{"A":"51","R":"2"},{"A":52.0,"R":3}]}"#)
            .unwrap();

        assert_eq!(summary, FrameSummary { applied: 2, ignored: 0, link_errors: 2 });
        let snapshot = store.snapshot();
        assert_eq!(snapshot.get(&"50".into()), None);
        assert_eq!(snapshot.get(&"51".into()), Some(2.0));
        assert_eq!(snapshot.get(&"52".into()), Some(3.0));
    }

    #[test]
    fn test_merge_and_replace_modes() {
        let (merge, merge_store) = processor(WorkerSettings::default());
        merge.apply_frame(br#"{"links":[{"A":"50","R":1},{"A":"51","R":2}]}"#).unwrap();
        merge.apply_frame(br#"{"links":[{"A":"52","R":3}]}"#).unwrap();
        assert_eq!(merge_store.snapshot().len(), 3);

        let settings = WorkerSettings {
            ingest_mode: IngestMode::Replace,
            ..WorkerSettings::default()
        };
        let (replace, replace_store) = processor(settings);
        replace.apply_frame(br#"{"links":[{"A":"50","R":1},{"A":"51","R":2}]}"#).unwrap();
        replace.apply_frame(br#"{"links":[{"A":"52","R":3}]}"#).unwrap();

        let snapshot = replace_store.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get(&"52".into()), Some(3.0));
    }

    #[test]
    fn test_timeouts_do_not_end_session() {
        let (processor, store) = processor(WorkerSettings::default());
        let reader = ChunkedReader::new(vec![
            Err(io::Error::from(io::ErrorKind::WouldBlock)),
            chunk("{\"links\":[{\"A\":\"50\",\"R\":\"4\"}]}"),
            Err(io::Error::from(io::ErrorKind::TimedOut)),
            chunk("\n"),
        ]);

        let outcome = processor.run_session(reader, "test", &Shutdown::new());

        assert!(matches!(outcome.end, SessionEnd::PeerClosed));
        assert_eq!(store.snapshot().get(&"50".into()), Some(4.0));
    }

    #[test]
    fn test_read_error_ends_session() {
        let (processor, _store) = processor(WorkerSettings::default());
        let reader = ChunkedReader::new(vec![Err(io::Error::from(io::ErrorKind::ConnectionReset))]);

        let outcome = processor.run_session(reader, "test", &Shutdown::new());

        match outcome.end {
            SessionEnd::Failed(error) => assert!(error.is_recoverable()),
            other => panic!("unexpected session end: {:?}", other),
        }
    }

    #[test]
    fn test_shutdown_ends_session() {
        let (processor, _store) = processor(WorkerSettings::default());
        let shutdown = Shutdown::new();
        shutdown.trigger();

        let reader = ChunkedReader::new(vec![chunk("{}\n")]);
        let outcome = processor.run_session(reader, "test", &shutdown);

        assert!(matches!(outcome.end, SessionEnd::Shutdown));
    }

    fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_tcp_sessions_reconnect_and_clear() {
        let store = RangeStore::new();
        let settings = WorkerSettings {
            read_timeout: Duration::from_millis(20),
            ..WorkerSettings::default()
        };
        let worker = IngestionWorker::bind("127.0.0.1:0", layout(), store.clone(), settings).unwrap();
        let address = worker.local_addr().unwrap();
        let shutdown = Shutdown::new();

        let handle = {
            let shutdown = shutdown.clone();
            thread::spawn(move || worker.run(&shutdown))
        };

        // First producer: frame written in two pieces
        let mut producer = TcpStream::connect(address).unwrap();
        producer.write_all(br#"{"links":[{"A":"50","R":"6"},"#).unwrap();
        producer.flush().unwrap();
        thread::sleep(Duration::from_millis(30));
        producer.write_all(b"{\"A\":\"51\",\"R\":\"6\"}]}\n").unwrap();
        assert!(wait_for(|| store.snapshot().len() == 2));

        drop(producer);
        assert!(wait_for(|| store.snapshot().is_empty()));

        // Second producer is accepted after the first disconnects
        let mut producer = TcpStream::connect(address).unwrap();
        producer.write_all(b"not json\n{\"links\":[{\"A\":\"52\",\"R\":5}]}\n").unwrap();
        assert!(wait_for(|| store.snapshot().get(&"52".into()) == Some(5.0)));

        shutdown.trigger();
        assert!(handle.join().unwrap().is_ok());
    }

    #[test]
    fn test_single_session_stops_after_disconnect() {
        let settings = WorkerSettings {
            single_session: true,
            read_timeout: Duration::from_millis(20),
            ..WorkerSettings::default()
        };
        let worker = IngestionWorker::bind("127.0.0.1:0", layout(), RangeStore::new(), settings).unwrap();
        let address = worker.local_addr().unwrap();

        let handle = thread::spawn(move || worker.run(&Shutdown::new()));

        let producer = TcpStream::connect(address).unwrap();
        drop(producer);

        assert!(handle.join().unwrap().is_ok());
    }

    #[test]
    fn test_bind_conflict_is_reported() {
        let first = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = first.local_addr().unwrap().to_string();

        let result = IngestionWorker::bind(&address, layout(), RangeStore::new(), WorkerSettings::default());
        assert!(matches!(result, Err(ConnectionError::Bind { .. })));
    }
}
