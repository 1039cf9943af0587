//! Streaming decode limits.
//!
//! The tracker inspects the token stream as it is consumed and enforces
//! simple limits to stop pathological inputs (token storms, runaway nesting,
//! unbounded deferred references, oversized scalar payloads).

use serde::{Deserialize, Serialize};

use crate::tokens::{Scalar, Token};

/// Limits for one decode call.
///
/// The defaults are intentionally permissive for typical documents while
/// stopping obvious resource-amplifying inputs. Tune these per your
/// application if you regularly decode very large streams.
///
/// ```rust
/// let limits = graft::limits! {
///     max_depth: 64,
/// };
/// assert_eq!(limits.max_depth, 64);
/// ```
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Limits {
    /// Maximum total tokens consumed (counting every token).
    ///
    /// Default: 1,000,000
    pub max_events: usize,
    /// Maximum structural nesting depth (objects + arrays). Nesting costs
    /// heap, not call stack, so the default is far above what a recursive
    /// decoder could survive.
    ///
    /// Default: 250,000
    pub max_depth: usize,
    /// Maximum number of simultaneously unresolved forward references.
    ///
    /// Default: 50,000
    pub max_pending_refs: usize,
    /// Maximum total bytes of scalar contents (text, binary and field-name
    /// payloads summed over the stream).
    ///
    /// Default: 67,108,864 (64 MiB)
    pub max_total_scalar_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_events: 1_000_000,
            max_depth: 250_000,
            max_pending_refs: 50_000,
            max_total_scalar_bytes: 64 * 1024 * 1024,
        }
    }
}

/// What tripped a limit (if anything).
#[derive(Clone, Debug)]
pub enum LimitBreach {
    /// The total number of tokens exceeded [`Limits::max_events`].
    Events {
        /// Total tokens observed at the moment of the breach.
        events: usize,
    },
    /// The structural nesting depth exceeded [`Limits::max_depth`].
    Depth {
        /// Depth reached when the breach occurred.
        depth: usize,
    },
    /// The number of unresolved forward references exceeded
    /// [`Limits::max_pending_refs`].
    PendingRefs {
        /// Unresolved references outstanding at the moment of the breach.
        pending: usize,
    },
    /// The cumulative size of scalar contents exceeded
    /// [`Limits::max_total_scalar_bytes`].
    ScalarBytes {
        /// Sum of scalar payload lengths over all tokens seen so far.
        total_scalar_bytes: usize,
    },
}

/// Summary of what one decode consumed (even if no breach).
#[derive(Clone, Copy, Debug, Default)]
pub struct LimitReport {
    /// Total tokens observed.
    pub events: usize,
    /// Maximum nesting depth reached at any point.
    pub max_depth: usize,
    /// High-water mark of simultaneously unresolved references.
    pub max_pending_refs: usize,
    /// Total scalar payload bytes observed.
    pub total_scalar_bytes: usize,
}

/// Stateful helper that enforces [`Limits`] while consuming tokens.
///
/// One tracker serves one decode call: feed every consumed token through
/// [`observe`](Self::observe), and report deferred-reference registration and
/// resolution through [`on_defer`](Self::on_defer) / [`on_resolve`](Self::on_resolve).
#[derive(Clone, Debug)]
pub struct LimitTracker {
    limits: Option<Limits>,
    report: LimitReport,
    depth: usize,
    pending: usize,
}

impl LimitTracker {
    /// A tracker enforcing `limits`; `None` only counts, never breaches.
    pub fn new(limits: Option<Limits>) -> Self {
        Self {
            limits,
            report: LimitReport::default(),
            depth: 0,
            pending: 0,
        }
    }

    /// Account for one consumed token.
    pub fn observe(&mut self, token: &Token) -> Result<(), LimitBreach> {
        self.report.events += 1;
        match token {
            Token::ObjectStart | Token::ArrayStart => {
                self.depth += 1;
                if self.depth > self.report.max_depth {
                    self.report.max_depth = self.depth;
                }
            }
            Token::ObjectEnd | Token::ArrayEnd => {
                self.depth = self.depth.saturating_sub(1);
            }
            Token::FieldName(name) => {
                self.add_scalar_bytes(name.len());
            }
            Token::Scalar(scalar) => match scalar {
                Scalar::Text(text) => self.add_scalar_bytes(text.len()),
                Scalar::Binary(data) => self.add_scalar_bytes(data.len()),
                _ => {}
            },
            Token::Null => {}
        }
        let Some(limits) = &self.limits else {
            return Ok(());
        };
        if self.report.events > limits.max_events {
            return Err(LimitBreach::Events {
                events: self.report.events,
            });
        }
        if self.depth > limits.max_depth {
            return Err(LimitBreach::Depth { depth: self.depth });
        }
        if self.report.total_scalar_bytes > limits.max_total_scalar_bytes {
            return Err(LimitBreach::ScalarBytes {
                total_scalar_bytes: self.report.total_scalar_bytes,
            });
        }
        Ok(())
    }

    /// Account for one newly registered unresolved reference.
    pub fn on_defer(&mut self) -> Result<(), LimitBreach> {
        self.pending += 1;
        if self.pending > self.report.max_pending_refs {
            self.report.max_pending_refs = self.pending;
        }
        if let Some(limits) = &self.limits {
            if self.pending > limits.max_pending_refs {
                return Err(LimitBreach::PendingRefs {
                    pending: self.pending,
                });
            }
        }
        Ok(())
    }

    /// Account for one resolved reference.
    pub fn on_resolve(&mut self) {
        self.pending = self.pending.saturating_sub(1);
    }

    /// Snapshot of the counters so far.
    pub fn report(&self) -> LimitReport {
        self.report
    }

    fn add_scalar_bytes(&mut self, len: usize) {
        self.report.total_scalar_bytes = self.report.total_scalar_bytes.saturating_add(len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens_for_depth(depth: usize) -> Vec<Token> {
        let mut out = Vec::new();
        for _ in 0..depth {
            out.push(Token::ArrayStart);
        }
        for _ in 0..depth {
            out.push(Token::ArrayEnd);
        }
        out
    }

    #[test]
    fn defaults_are_permissive() {
        let limits = Limits::default();
        assert_eq!(limits.max_events, 1_000_000);
        assert_eq!(limits.max_depth, 250_000);
        assert_eq!(limits.max_pending_refs, 50_000);
        assert_eq!(limits.max_total_scalar_bytes, 64 * 1024 * 1024);
    }

    #[test]
    fn depth_breach_fires_on_entry() {
        let mut tracker = LimitTracker::new(Some(Limits {
            max_depth: 3,
            ..Limits::default()
        }));
        let mut result = Ok(());
        for token in tokens_for_depth(4) {
            result = tracker.observe(&token);
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(LimitBreach::Depth { depth: 4 })));
    }

    #[test]
    fn depth_recovers_after_end_tokens() {
        let mut tracker = LimitTracker::new(Some(Limits {
            max_depth: 2,
            ..Limits::default()
        }));
        for token in tokens_for_depth(2) {
            tracker.observe(&token).unwrap();
        }
        for token in tokens_for_depth(2) {
            tracker.observe(&token).unwrap();
        }
        assert_eq!(tracker.report().max_depth, 2);
    }

    #[test]
    fn scalar_bytes_accumulate_across_tokens() {
        let mut tracker = LimitTracker::new(Some(Limits {
            max_total_scalar_bytes: 8,
            ..Limits::default()
        }));
        tracker
            .observe(&Token::Scalar(Scalar::Text("abcd".into())))
            .unwrap();
        let breach = tracker.observe(&Token::Scalar(Scalar::Text("efghi".into())));
        assert!(matches!(
            breach,
            Err(LimitBreach::ScalarBytes {
                total_scalar_bytes: 9
            })
        ));
    }

    #[test]
    fn pending_refs_tracked_with_high_water_mark() {
        let mut tracker = LimitTracker::new(Some(Limits {
            max_pending_refs: 2,
            ..Limits::default()
        }));
        tracker.on_defer().unwrap();
        tracker.on_defer().unwrap();
        tracker.on_resolve();
        tracker.on_defer().unwrap();
        assert_eq!(tracker.report().max_pending_refs, 2);
        assert!(matches!(
            tracker.on_defer(),
            Err(LimitBreach::PendingRefs { pending: 3 })
        ));
    }

    #[test]
    fn untracked_mode_never_breaches() {
        let mut tracker = LimitTracker::new(None);
        for token in tokens_for_depth(10_000) {
            tracker.observe(&token).unwrap();
        }
        assert_eq!(tracker.report().events, 20_000);
    }
}
