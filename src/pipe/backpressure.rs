//! Backpressure accounting for a single pipe direction.
//!
//! The [`BackpressureController`] tracks how many flushed bytes the reader has
//! not consumed yet. Crossing the pause watermark pauses the writer; dropping
//! below the resume watermark releases it again. The gap between the two
//! watermarks keeps the writer from flapping on every small read.
//!
//! # Configuration
//!
//! - `pause_writer_threshold`: unconsumed bytes at which flush suspends (default: 64 KiB)
//! - `resume_writer_threshold`: unconsumed bytes below which flush resumes (default: 32 KiB)

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::config::PipeOptions;

/// Unconsumed byte counter with pause/resume watermarks.
#[derive(Debug)]
pub(crate) struct BackpressureController {
    /// Bytes flushed but not yet consumed by the reader.
    unconsumed: AtomicUsize,
    /// Whether a writer should currently suspend in flush.
    paused: AtomicBool,
    pause_threshold: usize,
    resume_threshold: usize,
}

impl BackpressureController {
    pub(crate) fn new(options: PipeOptions) -> Self {
        Self {
            unconsumed: AtomicUsize::new(0),
            paused: AtomicBool::new(false),
            pause_threshold: options.pause_writer_threshold,
            resume_threshold: options.resume_writer_threshold,
        }
    }

    /// Whether backpressure applies at all.
    #[inline]
    pub(crate) fn is_enabled(&self) -> bool {
        self.pause_threshold > 0
    }

    /// Check if a flush should currently suspend.
    #[inline]
    pub(crate) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Get current unconsumed byte count.
    #[inline]
    pub(crate) fn unconsumed(&self) -> usize {
        self.unconsumed.load(Ordering::Acquire)
    }

    /// Record `count` freshly flushed bytes.
    pub(crate) fn add(&self, count: usize) {
        let total = self.unconsumed.fetch_add(count, Ordering::AcqRel) + count;
        if self.is_enabled() && total >= self.pause_threshold {
            self.paused.store(true, Ordering::Release);
        }
    }

    /// Record `count` consumed bytes.
    ///
    /// Returns `true` if this released a paused writer.
    pub(crate) fn release(&self, count: usize) -> bool {
        let before = self.unconsumed.load(Ordering::Acquire);
        let count = count.min(before);
        let total = self.unconsumed.fetch_sub(count, Ordering::AcqRel) - count;

        if self.is_paused() && (total < self.resume_threshold || total == 0) {
            self.paused.store(false, Ordering::Release);
            return true;
        }
        false
    }

    /// Drop all accounting, e.g. when the reader goes away.
    ///
    /// Returns `true` if a paused writer was released.
    pub(crate) fn reset(&self) -> bool {
        self.unconsumed.store(0, Ordering::Release);
        self.paused.swap(false, Ordering::AcqRel)
    }
}
