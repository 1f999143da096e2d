//! Property-Based Tests for the CrabRecord frame queue and recording clock
//!
//! These tests verify invariants and contracts of the recording subsystem
//! using proptest for input generation and shrinking.
//!
//! Run with: cargo test --test recording_props

use proptest::prelude::*;
use std::time::{Duration, Instant};
use tempfile::tempdir;

use crabrecord::recording::{frame_queue, BacklogPolicy, Recorder, RecordingConfig};
use crabrecord::testing::{MemorySinkHandle, MemorySinkOpener};
use crabrecord::timing::RecordingClock;

// ═══════════════════════════════════════════════════════════════════════════
// FRAME QUEUE INVARIANTS
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    /// INVARIANT: Frames come out in the order they went in
    #[test]
    fn queue_preserves_order(items in prop::collection::vec(any::<u32>(), 0..200)) {
        let (producer, consumer) = frame_queue(BacklogPolicy::Unbounded);
        for &item in &items {
            prop_assert!(producer.produce(item));
        }

        let mut out = Vec::new();
        while let Some(item) = consumer.consume() {
            out.push(item);
        }
        prop_assert_eq!(out, items);
    }

    /// INVARIANT: size() is produced minus consumed
    #[test]
    fn queue_size_tracks_backlog(produced in 0usize..100, consumed in 0usize..100) {
        let (producer, consumer) = frame_queue(BacklogPolicy::Unbounded);
        for i in 0..produced {
            producer.produce(i);
        }
        let taken = (0..consumed).filter_map(|_| consumer.consume()).count();

        prop_assert_eq!(taken, consumed.min(produced));
        prop_assert_eq!(consumer.size(), produced - taken);
        prop_assert_eq!(producer.size(), produced - taken);
    }

    /// INVARIANT: Interleaved produce/consume never loses or reorders frames
    #[test]
    fn queue_interleaving_keeps_order(ops in prop::collection::vec(any::<bool>(), 0..300)) {
        let (producer, consumer) = frame_queue(BacklogPolicy::Unbounded);
        let mut next = 0u64;
        let mut out = Vec::new();

        for produce in ops {
            if produce {
                producer.produce(next);
                next += 1;
            } else if let Some(item) = consumer.consume() {
                out.push(item);
            }
        }
        while let Some(item) = consumer.consume() {
            out.push(item);
        }

        prop_assert_eq!(out, (0..next).collect::<Vec<_>>());
    }

    /// INVARIANT: Drop-oldest keeps the newest frames, as a strictly
    /// increasing subsequence, and never more than max_backlog of them
    #[test]
    fn drop_oldest_keeps_increasing_tail(
        count in 1u64..200,
        max_backlog in 1usize..16,
    ) {
        let (producer, consumer) = frame_queue(BacklogPolicy::DropOldest { max_backlog });
        for i in 0..count {
            producer.produce(i);
            prop_assert!(producer.size() <= max_backlog);
        }

        let mut out = Vec::new();
        while let Some(item) = consumer.consume() {
            out.push(item);
        }

        let kept = (count as usize).min(max_backlog);
        prop_assert_eq!(out.len(), kept);
        prop_assert!(out.windows(2).all(|w| w[0] < w[1]));
        prop_assert_eq!(out.last().copied(), Some(count - 1));
        prop_assert_eq!(consumer.evicted(), count - kept as u64);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// RECORDING CLOCK INVARIANTS
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    /// INVARIANT: Active time equals total time minus every pause
    #[test]
    fn clock_excludes_pauses(
        segments in prop::collection::vec((1u64..1000, 1u64..1000), 1..10),
        tail in 0u64..1000,
    ) {
        let base = Instant::now();
        let mut clock = RecordingClock::new();
        clock.start_at(base);

        let mut now = base;
        let mut active = Duration::ZERO;
        for (run_ms, pause_ms) in segments {
            now += Duration::from_millis(run_ms);
            active += Duration::from_millis(run_ms);
            clock.pause_at(now).unwrap();
            now += Duration::from_millis(pause_ms);
            clock.resume_at(now).unwrap();
        }
        now += Duration::from_millis(tail);
        active += Duration::from_millis(tail);

        prop_assert_eq!(clock.elapsed_active_at(now), active);
    }

    /// INVARIANT: Stopping freezes the active time
    #[test]
    fn clock_frozen_after_stop(run_ms in 0u64..10_000, later_ms in 1u64..10_000) {
        let base = Instant::now();
        let mut clock = RecordingClock::new();
        clock.start_at(base);
        let stop = base + Duration::from_millis(run_ms);
        clock.stop_at(stop);

        let later = stop + Duration::from_millis(later_ms);
        prop_assert_eq!(clock.elapsed_active_at(later), Duration::from_millis(run_ms));
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// RECORDER CONTRACTS
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// CONTRACT: Every admitted frame reaches the sink, in order, on stop
    #[test]
    fn recorder_forwards_every_admitted_frame(count in 0u8..40) {
        let dir = tempdir().unwrap();
        let config = RecordingConfig::new(2, 2, 30.0).with_output_path(dir.path().join("out.mp4"));
        let handle = MemorySinkHandle::new();
        let mut recorder = Recorder::new(config)
            .unwrap()
            .with_sink_opener(MemorySinkOpener::new(handle.clone()));

        recorder.start_custom_record().unwrap();
        for i in 0..count {
            recorder.add_frame(&[i; 12]);
        }
        let stats = recorder.stop().unwrap();

        prop_assert_eq!(stats.admitted_frames, u64::from(count));
        prop_assert_eq!(stats.forwarded_frames, u64::from(count));
        let firsts: Vec<u8> = handle.frames().iter().map(|f| f[0]).collect();
        prop_assert_eq!(firsts, (0..count).collect::<Vec<_>>());
    }
}
