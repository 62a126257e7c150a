//! End-to-end admission scenarios against the public API.

use flowgate_admission::{
    AdmissionConfig, AdmissionController, AdmissionPermit, CompletionReason, Decision,
    ManualClock, NullSink, RejectCause, RejectionOutcome, RejectionPolicy, ResponseSink,
};
use std::io;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

/// Sink that records every call made on it.
#[derive(Default)]
struct ChannelOutput {
    written: Vec<u8>,
    writes: usize,
    closed: bool,
}

impl ResponseSink for ChannelOutput {
    fn write_payload(&mut self, payload: &[u8]) -> io::Result<()> {
        self.written.extend_from_slice(payload);
        self.writes += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

fn with_manual_clock(config: AdmissionConfig) -> (AdmissionController, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let controller = AdmissionController::with_clock(config, clock.clone()).unwrap();
    (controller, clock)
}

#[test]
fn concurrency_cap_without_rate_limit() {
    let config = AdmissionConfig::default().with_max_concurrency(10);
    let (controller, _) = with_manual_clock(config);

    let decisions: Vec<Decision> = (0..20).map(|_| controller.try_admit(&mut NullSink)).collect();

    let admitted = decisions.iter().filter(|d| d.is_admitted()).count();
    let by_concurrency = decisions
        .iter()
        .filter_map(Decision::rejection)
        .filter(|r| r.cause == RejectCause::Concurrency)
        .count();
    assert_eq!(admitted, 10);
    assert_eq!(by_concurrency, 10);

    let snapshot = controller.metrics();
    assert_eq!(snapshot.accepted, 10);
    assert_eq!(snapshot.rejected_by_concurrency, 10);
    assert_eq!(snapshot.rejected_by_rate, 0);
    assert_eq!(snapshot.currently_active, 10);
}

#[test]
fn rate_window_rollover_admits_remainder() {
    let config = AdmissionConfig::default().with_rate(100, Duration::from_secs(1));
    let (controller, clock) = with_manual_clock(config);

    let mut pending = 200usize;
    let mut permits: Vec<AdmissionPermit> = Vec::new();
    let mut first_window = None;
    let mut windows = 0;

    while pending > 0 {
        let mut admitted_now = 0;
        for _ in 0..pending {
            if let Decision::Admitted(permit) = controller.try_admit(&mut NullSink) {
                permits.push(permit);
                admitted_now += 1;
            }
        }
        first_window.get_or_insert(admitted_now);
        assert!(admitted_now <= 100);
        pending -= admitted_now;
        windows += 1;
        clock.advance(Duration::from_secs(1));
    }

    assert_eq!(first_window, Some(100));
    assert_eq!(windows, 2);
    assert_eq!(permits.len(), 200);
}

#[test]
fn completion_hook_fired_twice_concurrently() {
    let (controller, _) = with_manual_clock(AdmissionConfig::default().with_max_concurrency(4));
    let _other = controller.try_admit(&mut NullSink).into_permit().unwrap();
    let permit = controller.try_admit(&mut NullSink).into_permit().unwrap();
    assert_eq!(controller.active(), 2);

    let barrier = Arc::new(Barrier::new(2));
    let hooks: Vec<_> = [CompletionReason::Success, CompletionReason::Closed]
        .into_iter()
        .map(|reason| {
            let permit = permit.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                permit.complete_with(reason)
            })
        })
        .collect();
    let winners = hooks
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|released| *released)
        .count();

    assert_eq!(winners, 1);
    assert_eq!(controller.active(), 1);
    drop(permit);
    assert_eq!(controller.active(), 1);
}

#[test]
fn respond_policy_writes_exact_payload() {
    let config = AdmissionConfig::default()
        .with_max_concurrency(1)
        .with_rejection(RejectionPolicy::respond("429"));
    let (controller, _) = with_manual_clock(config);
    let _held = controller.try_admit(&mut NullSink).into_permit().unwrap();

    let mut output = ChannelOutput::default();
    let decision = controller.try_admit(&mut output);

    assert!(!decision.is_admitted());
    assert_eq!(output.written, b"429");
    assert_eq!(output.writes, 1);
    assert!(output.closed);
}

#[test]
fn drop_policy_writes_nothing() {
    let config = AdmissionConfig::default()
        .with_max_concurrency(1)
        .with_rate(1, Duration::from_secs(1));
    let (controller, _) = with_manual_clock(config);
    let _held = controller.try_admit(&mut NullSink).into_permit().unwrap();

    for _ in 0..5 {
        let mut output = ChannelOutput::default();
        let decision = controller.try_admit(&mut output);
        assert_eq!(
            decision.rejection().map(|r| r.outcome),
            Some(RejectionOutcome::Dropped)
        );
        assert!(output.written.is_empty());
        assert_eq!(output.writes, 0);
        assert!(!output.closed);
    }
}

#[test]
fn steady_overload_converges_to_window_limit() {
    let max_per_window = 50u64;
    let windows = 40u64;
    let config = AdmissionConfig::default().with_rate(max_per_window as u32, Duration::from_millis(100));
    let (controller, clock) = with_manual_clock(config);

    // 3x the permitted rate, evenly spread through each window.
    let arrivals_per_window = max_per_window * 3;
    let step = Duration::from_micros(100_000 / arrivals_per_window);
    for _ in 0..windows * arrivals_per_window {
        let _ = controller.try_admit(&mut NullSink);
        clock.advance(step);
    }

    let accepted = controller.metrics().accepted;
    assert!(accepted <= (windows + 1) * max_per_window);
    assert!(accepted >= (windows - 1) * max_per_window);
}

#[test]
fn metrics_account_for_every_decision_under_contention() {
    let config = AdmissionConfig::new(16, 1_000, Duration::from_millis(5))
        .with_rejection(RejectionPolicy::respond("busy"));
    let controller = AdmissionController::new(config).unwrap();
    let threads = 8;
    let per_thread = 2_000;

    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let controller = controller.clone();
            thread::spawn(move || {
                let mut held = Vec::new();
                for n in 0..per_thread {
                    let mut out: Vec<u8> = Vec::new();
                    if let Decision::Admitted(permit) = controller.try_admit(&mut out) {
                        assert!(controller.active() <= 16);
                        held.push(permit);
                    } else {
                        assert_eq!(out, b"busy");
                    }
                    if (n + i) % 3 == 0 {
                        held.clear();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let snapshot = controller.metrics();
    assert_eq!(snapshot.decisions(), (threads * per_thread) as u64);
    assert_eq!(snapshot.completed, snapshot.accepted);
    assert_eq!(snapshot.currently_active, 0);
}

#[test]
fn zero_window_is_a_configuration_error() {
    let config = AdmissionConfig::default().with_rate(10, Duration::ZERO);
    assert!(AdmissionController::new(config).is_err());
}
