//! Segmented accumulation for outputs of unknown final length.
//!
//! A [`SegmentedBuffer`] collects elements into fixed-capacity segments and
//! only concatenates once, when the final count is known, producing an output
//! sized exactly. Segment allocations are retained across uses, and whole
//! buffers are recycled through a [`BufferPool`] owned by the decode context,
//! so a long-lived context stops allocating after warm-up.
//!
//! One buffer serves exactly one in-flight decode; it is not shareable.

/// Capacity of the first segment handed out by [`SegmentedBuffer::begin`].
const FIRST_SEGMENT_CAPACITY: usize = 12;

/// Upper bound on the capacity of any single follow-up segment.
const MAX_SEGMENT_CAPACITY: usize = 4096;

/// How many drained segment allocations a buffer keeps for reuse.
const MAX_SPARE_SEGMENTS: usize = 16;

/// Growable, pooled, append-only element accumulator.
///
/// Protocol:
/// 1. [`begin`](Self::begin) returns the initial segment.
/// 2. When the current segment is full, hand it to [`grow`](Self::grow) and
///    continue appending into the returned next segment.
/// 3. [`complete`](Self::complete) (or [`complete_boxed`](Self::complete_boxed))
///    concatenates everything, in order, into one exactly-sized output.
#[derive(Debug)]
pub struct SegmentedBuffer<T> {
    full: Vec<Vec<T>>,
    spare: Vec<Vec<T>>,
    buffered: usize,
    in_flight: bool,
}

impl<T> Default for SegmentedBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SegmentedBuffer<T> {
    pub fn new() -> Self {
        Self {
            full: Vec::new(),
            spare: Vec::new(),
            buffered: 0,
            in_flight: false,
        }
    }

    /// Start an accumulation run and return the initial segment.
    pub fn begin(&mut self) -> Vec<T> {
        debug_assert!(
            !self.in_flight,
            "segmented buffer reused while an accumulation is in flight"
        );
        self.in_flight = true;
        self.buffered = 0;
        self.take_segment(FIRST_SEGMENT_CAPACITY)
    }

    /// Accept a full segment and return the next one to fill.
    ///
    /// The next segment's capacity grows with the amount buffered so far
    /// (about half of it), bounded below by the initial capacity and above by
    /// a fixed cap, which keeps the append amortized O(1) without letting a
    /// single allocation balloon.
    pub fn grow(&mut self, segment: Vec<T>) -> Vec<T> {
        self.buffered += segment.len();
        self.full.push(segment);
        let next_capacity = (self.buffered / 2).clamp(FIRST_SEGMENT_CAPACITY, MAX_SEGMENT_CAPACITY);
        self.take_segment(next_capacity)
    }

    /// Number of elements accumulated so far, including `last`, the segment
    /// currently being filled by the caller.
    pub fn len_with(&self, last: &[T]) -> usize {
        self.buffered + last.len()
    }

    /// Concatenate all buffered segments plus `last` into one exactly-sized
    /// vector, in append order, and return this buffer to its idle state.
    pub fn complete(&mut self, last: Vec<T>) -> Vec<T> {
        let total = self.buffered + last.len();
        let mut out = Vec::with_capacity(total);
        for mut segment in self.full.drain(..) {
            out.append(&mut segment);
            if self.spare.len() < MAX_SPARE_SEGMENTS {
                self.spare.push(segment);
            }
        }
        let mut last = last;
        out.append(&mut last);
        if self.spare.len() < MAX_SPARE_SEGMENTS {
            self.spare.push(last);
        }
        debug_assert_eq!(out.len(), total);
        self.buffered = 0;
        self.in_flight = false;
        out
    }

    /// [`complete`](Self::complete), densely boxed.
    pub fn complete_boxed(&mut self, last: Vec<T>) -> Box<[T]> {
        self.complete(last).into_boxed_slice()
    }

    /// Abandon an accumulation run, dropping buffered elements but keeping
    /// segment allocations.
    pub fn abandon(&mut self, last: Vec<T>) {
        let _ = self.complete(last);
    }

    fn take_segment(&mut self, capacity: usize) -> Vec<T> {
        // Reuse the largest retained allocation when it is big enough.
        if let Some(pos) = self.spare.iter().position(|seg| seg.capacity() >= capacity) {
            return self.spare.swap_remove(pos);
        }
        Vec::with_capacity(capacity)
    }
}

/// Freelist of one spare buffer, owned by the calling context.
///
/// Leasing from an empty pool allocates; releasing puts the buffer back for
/// the next lease. Releasing a buffer that is still mid-accumulation is a
/// caller bug and is only debug-asserted, never checked on the hot path.
#[derive(Debug)]
pub struct BufferPool<T> {
    parked: Option<SegmentedBuffer<T>>,
}

impl<T> Default for BufferPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BufferPool<T> {
    pub fn new() -> Self {
        Self { parked: None }
    }

    /// Take a buffer out of the pool, or allocate a fresh one.
    pub fn lease(&mut self) -> SegmentedBuffer<T> {
        self.parked.take().unwrap_or_default()
    }

    /// Return a buffer for reuse by the next lease.
    pub fn release(&mut self, buffer: SegmentedBuffer<T>) {
        debug_assert!(
            !buffer.in_flight,
            "buffer released while an accumulation is in flight"
        );
        self.parked = Some(buffer);
    }
}
