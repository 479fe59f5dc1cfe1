use metriken::AtomicHistogram;

/// Command round-trip latency histograms (nanoseconds). Not globally registered.
///
/// One histogram per exchange type, plus a combined `request` histogram
/// that records every exchange. Values are recorded by the command channel
/// as `sent_at.elapsed().as_nanos()`.
pub struct ClientLatency {
    request: AtomicHistogram,
    fixed: AtomicHistogram,
    extended: AtomicHistogram,
    payload: AtomicHistogram,
}

impl ClientLatency {
    pub(crate) fn new() -> Self {
        Self {
            request: AtomicHistogram::new(7, 64),
            fixed: AtomicHistogram::new(7, 64),
            extended: AtomicHistogram::new(7, 64),
            payload: AtomicHistogram::new(7, 64),
        }
    }

    /// All request/response exchanges combined.
    pub fn request(&self) -> &AtomicHistogram {
        &self.request
    }

    /// Fixed 16-byte requests.
    pub fn fixed(&self) -> &AtomicHistogram {
        &self.fixed
    }

    /// Requests carrying extents.
    pub fn extended(&self) -> &AtomicHistogram {
        &self.extended
    }

    /// Secondary payload reads.
    pub fn payload(&self) -> &AtomicHistogram {
        &self.payload
    }
}
