//! In-memory range source with failure injection for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream;

use crate::plan::ByteRange;
use crate::source::{ByteStream, FetchError, RangeSource, SourceFuture};

/// Deterministic, non-repeating-looking test payload.
pub(crate) fn sample_data(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + i / 251) % 251) as u8).collect()
}

#[derive(Debug, Clone, Copy)]
enum Fault {
    Status(u16),
    TruncateOnce(u64),
    IoErrorOnce(u64),
    Stall,
}

struct InFlight {
    current: Arc<AtomicUsize>,
}

impl InFlight {
    fn enter(current: &Arc<AtomicUsize>, peak: &AtomicUsize) -> Self {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self {
            current: Arc::clone(current),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) struct ScriptedSource {
    data: Bytes,
    piece_size: usize,
    faults: Mutex<HashMap<usize, Fault>>,
    delays: HashMap<usize, Duration>,
    whole_delay: Duration,
    probe: Option<u64>,
    ignore_ranges: bool,
    requested: Mutex<Vec<ByteRange>>,
    in_flight: Arc<AtomicUsize>,
    peak: AtomicUsize,
}

impl ScriptedSource {
    pub(crate) fn new(data: Vec<u8>) -> Self {
        let len = data.len() as u64;
        Self {
            data: Bytes::from(data),
            piece_size: 8,
            faults: Mutex::new(HashMap::new()),
            delays: HashMap::new(),
            whole_delay: Duration::ZERO,
            probe: Some(len),
            ignore_ranges: false,
            requested: Mutex::new(Vec::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: AtomicUsize::new(0),
        }
    }

    pub(crate) fn piece_size(mut self, size: usize) -> Self {
        self.piece_size = size;
        self
    }

    /// Every request for range `index` fails with `status`.
    pub(crate) fn fail_range(self, index: usize, status: u16) -> Self {
        self.fault(index, Fault::Status(status))
    }

    /// The first request for range `index` ends after `after` bytes.
    pub(crate) fn truncate_once(self, index: usize, after: u64) -> Self {
        self.fault(index, Fault::TruncateOnce(after))
    }

    /// The first request for range `index` fails with an I/O error after
    /// `after` bytes.
    pub(crate) fn io_error_once(self, index: usize, after: u64) -> Self {
        self.fault(index, Fault::IoErrorOnce(after))
    }

    /// Requests for range `index` never deliver a byte.
    pub(crate) fn stall_range(self, index: usize) -> Self {
        self.fault(index, Fault::Stall)
    }

    pub(crate) fn delay_range(mut self, index: usize, delay: Duration) -> Self {
        self.delays.insert(index, delay);
        self
    }

    /// Delays the start of whole-object (unranged) requests.
    pub(crate) fn delay_whole(mut self, delay: Duration) -> Self {
        self.whole_delay = delay;
        self
    }

    pub(crate) fn probe(mut self, size: Option<u64>) -> Self {
        self.probe = size;
        self
    }

    pub(crate) fn ignore_ranges(mut self) -> Self {
        self.ignore_ranges = true;
        self
    }

    pub(crate) fn requested(&self) -> Vec<ByteRange> {
        self.requested.lock().unwrap().clone()
    }

    pub(crate) fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn fault(self, index: usize, fault: Fault) -> Self {
        self.faults.lock().unwrap().insert(index, fault);
        self
    }

    fn pieces(&self, body: Bytes) -> Vec<Result<Bytes, FetchError>> {
        let mut out = Vec::new();
        let mut offset = 0;
        while offset < body.len() {
            let end = (offset + self.piece_size).min(body.len());
            out.push(Ok(body.slice(offset..end)));
            offset = end;
        }
        out
    }
}

impl RangeSource for ScriptedSource {
    fn fetch(&self, range: Option<ByteRange>) -> SourceFuture<'_, Result<ByteStream, FetchError>> {
        Box::pin(async move {
            let guard = InFlight::enter(&self.in_flight, &self.peak);

            let Some(r) = range else {
                if !self.whole_delay.is_zero() {
                    tokio::time::sleep(self.whole_delay).await;
                }
                let pieces = self.pieces(self.data.clone());
                return Ok(stream::iter(pieces)
                    .map(move |p| {
                        let _held = &guard;
                        p
                    })
                    .boxed());
            };

            self.requested.lock().unwrap().push(r);
            if let Some(delay) = self.delays.get(&r.index) {
                tokio::time::sleep(*delay).await;
            }

            let fault = {
                let mut faults = self.faults.lock().unwrap();
                match faults.get(&r.index).copied() {
                    Some(once @ (Fault::TruncateOnce(_) | Fault::IoErrorOnce(_))) => {
                        faults.remove(&r.index);
                        Some(once)
                    }
                    other => other,
                }
            };

            let body = if self.ignore_ranges {
                self.data.clone()
            } else {
                self.data.slice(r.start as usize..=r.end as usize)
            };

            match fault {
                Some(Fault::Status(status)) => Err(FetchError::Status {
                    status,
                    range: r.header_value(),
                }),
                Some(Fault::Stall) => Ok(stream::pending::<Result<Bytes, FetchError>>()
                    .map(move |p| {
                        let _held = &guard;
                        p
                    })
                    .boxed()),
                Some(Fault::TruncateOnce(n)) => {
                    let cut = body.slice(..(n as usize).min(body.len()));
                    Ok(stream::iter(self.pieces(cut))
                        .map(move |p| {
                            let _held = &guard;
                            p
                        })
                        .boxed())
                }
                Some(Fault::IoErrorOnce(n)) => {
                    let cut = body.slice(..(n as usize).min(body.len()));
                    let mut pieces = self.pieces(cut);
                    pieces.push(Err(FetchError::Io(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        "connection reset",
                    ))));
                    Ok(stream::iter(pieces)
                        .map(move |p| {
                            let _held = &guard;
                            p
                        })
                        .boxed())
                }
                None => Ok(stream::iter(self.pieces(body))
                    .map(move |p| {
                        let _held = &guard;
                        p
                    })
                    .boxed()),
            }
        })
    }

    fn probe_size(&self) -> SourceFuture<'_, Result<Option<u64>, FetchError>> {
        Box::pin(async move { Ok(self.probe) })
    }
}
