//! Integration tests for CaptureWorker against a mocked capture source
//!
//! These tests verify that the worker:
//! - Opens, verifies and closes the source in the right order
//! - Never captures from a target that failed to open or verify
//! - Keeps running through capture errors and reports each one

use gazeview::capture::{
    CaptureError, CaptureSource, CaptureWorker, Frame, WorkerError, WorkerOptions, WorkerState,
};
use mockall::predicate::eq;
use mockall::{Sequence, mock};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

mock! {
    pub Camera {}

    impl CaptureSource for Camera {
        type Target = u32;

        fn open(&mut self, target: &u32) -> Result<(), CaptureError>;
        fn is_open(&self) -> bool;
        fn capture_one(&mut self) -> Result<Option<Frame>, CaptureError>;
        fn close(&mut self);
    }
}

fn frame(sequence: u64) -> Frame {
    Frame::new(sequence, 2, 2, Arc::from(vec![7u8; 12]))
}

/// A capture that yields a fresh frame every millisecond.
fn steady_frames() -> impl FnMut() -> Result<Option<Frame>, CaptureError> + Send + 'static {
    let mut sequence = 0;
    move || {
        thread::sleep(Duration::from_millis(1));
        sequence += 1;
        Ok(Some(frame(sequence)))
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn test_open_failure_never_captures() {
    let mut camera = MockCamera::new();
    camera
        .expect_open()
        .with(eq(4))
        .times(1)
        .returning(|_| Err(CaptureError::DeviceUnavailable("4".into())));
    camera.expect_capture_one().never();
    camera.expect_is_open().return_const(false);
    camera.expect_close().return_const(());

    let worker = CaptureWorker::new(camera).unwrap();
    let err = worker.run(4).unwrap_err();

    assert!(matches!(err, WorkerError::OpenFailed { ref target, .. } if target == "4"));
    assert_eq!(worker.state(), WorkerState::Paused);
}

#[test]
fn test_empty_first_frame_closes_device() {
    let mut camera = MockCamera::new();
    let mut seq = Sequence::new();
    camera
        .expect_open()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    camera
        .expect_capture_one()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| Ok(None));
    camera
        .expect_close()
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());
    camera.expect_is_open().return_const(false);

    let worker = CaptureWorker::new(camera).unwrap();
    let err = worker.run(0).unwrap_err();

    assert!(matches!(err, WorkerError::NoInitialFrame { .. }));
    assert_eq!(worker.target(), None);
}

#[test]
fn test_zero_sized_first_frame_is_rejected() {
    let mut camera = MockCamera::new();
    camera.expect_open().times(1).returning(|_| Ok(()));
    camera
        .expect_capture_one()
        .times(1)
        .returning(|| Ok(Some(Frame::new(0, 0, 0, Arc::from(Vec::new())))));
    camera.expect_close().times(1).return_const(());
    camera.expect_is_open().return_const(false);

    let worker = CaptureWorker::new(camera).unwrap();
    let err = worker.run(0).unwrap_err();

    assert!(matches!(err, WorkerError::NoInitialFrame { .. }));
    assert_eq!(worker.state(), WorkerState::Paused);
    assert_eq!(worker.target(), None);
}

#[test]
fn test_source_gone_quiet_is_backed_off() {
    let mut camera = MockCamera::new();
    camera.expect_open().returning(|_| Ok(()));
    camera.expect_is_open().return_const(true);
    camera.expect_close().return_const(());

    let mut calls = 0u64;
    camera.expect_capture_one().returning(move || {
        calls += 1;
        match calls {
            1 => Ok(Some(frame(0))),
            2 => Ok(Some(Frame::new(1, 2, 0, Arc::from(Vec::new())))),
            _ => Ok(None),
        }
    });

    let options = WorkerOptions {
        error_backoff: Duration::from_millis(10),
        ..WorkerOptions::default()
    };
    let worker = CaptureWorker::with_options(camera, options).unwrap();
    let frames = Arc::new(AtomicU64::new(0));
    let sink = Arc::clone(&frames);
    let _conn = worker.frames().connect(move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
    });

    worker.run(0).unwrap();
    thread::sleep(Duration::from_millis(100));

    let empty = worker.metrics().empty_frames.load(Ordering::Relaxed);
    assert!(empty >= 1, "empty captures should be counted");
    assert!(empty <= 20, "{empty} empty captures in 100ms");
    assert_eq!(frames.load(Ordering::SeqCst), 0);
    assert_eq!(worker.state(), WorkerState::Running);
}

#[test]
fn test_failed_verification_is_reported() {
    let mut camera = MockCamera::new();
    camera.expect_open().returning(|_| Ok(()));
    camera
        .expect_capture_one()
        .times(1)
        .returning(|| Err(CaptureError::ReadFailed("sensor timeout".into())));
    camera.expect_close().return_const(());
    camera.expect_is_open().return_const(false);

    let worker = CaptureWorker::new(camera).unwrap();
    let err = worker.run(0).unwrap_err();

    assert!(matches!(err, WorkerError::VerifyFailed { .. }));
    assert!(err.to_string().contains("failed to deliver a frame"));
}

#[test]
fn test_same_target_is_opened_once() {
    let mut camera = MockCamera::new();
    camera.expect_open().with(eq(1)).times(1).returning(|_| Ok(()));
    camera.expect_is_open().return_const(true);
    camera.expect_capture_one().returning(steady_frames());
    camera.expect_close().return_const(());

    let worker = CaptureWorker::new(camera).unwrap();
    worker.run(1).unwrap();
    worker.pause();
    worker.run(1).unwrap();

    assert_eq!(worker.state(), WorkerState::Running);
}

#[test]
fn test_switch_closes_previous_before_opening_next() {
    let mut camera = MockCamera::new();
    let mut seq = Sequence::new();
    camera
        .expect_open()
        .with(eq(0))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    camera
        .expect_close()
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());
    camera
        .expect_open()
        .with(eq(1))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    camera
        .expect_close()
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());
    camera.expect_is_open().return_const(true);
    camera.expect_capture_one().returning(steady_frames());

    let mut worker = CaptureWorker::new(camera).unwrap();
    worker.run(0).unwrap();
    worker.run(1).unwrap();
    assert_eq!(worker.target(), Some(1));

    // The final close comes from shutdown
    worker.shutdown();
}

#[test]
fn test_capture_errors_reach_subscribers() {
    let mut camera = MockCamera::new();
    camera.expect_open().returning(|_| Ok(()));
    camera.expect_is_open().return_const(true);
    camera.expect_close().return_const(());

    let mut calls = 0u64;
    camera.expect_capture_one().returning(move || {
        calls += 1;
        thread::sleep(Duration::from_millis(1));
        if calls > 1 && calls % 2 == 0 {
            Err(CaptureError::ReadFailed(format!("call {calls}")))
        } else {
            Ok(Some(frame(calls)))
        }
    });

    let options = WorkerOptions {
        error_backoff: Duration::from_millis(1),
        ..WorkerOptions::default()
    };
    let worker = CaptureWorker::with_options(camera, options).unwrap();

    let errors = Arc::new(AtomicU64::new(0));
    let frames = Arc::new(AtomicU64::new(0));
    let error_sink = Arc::clone(&errors);
    let frame_sink = Arc::clone(&frames);
    let _errors = worker.errors().connect(move |err| {
        assert!(matches!(err, CaptureError::ReadFailed(_)));
        error_sink.fetch_add(1, Ordering::SeqCst);
    });
    let _frames = worker.frames().connect(move |_| {
        frame_sink.fetch_add(1, Ordering::SeqCst);
    });

    worker.run(0).unwrap();

    wait_until(|| errors.load(Ordering::SeqCst) >= 3 && frames.load(Ordering::SeqCst) >= 3);
    assert!(worker.metrics().capture_errors.load(Ordering::Relaxed) >= 3);
}

#[test]
fn test_device_closing_underneath_is_an_error() {
    let mut camera = MockCamera::new();
    camera.expect_open().returning(|_| Ok(()));
    camera.expect_capture_one().times(1).returning(|| Ok(Some(frame(0))));
    camera.expect_is_open().return_const(false);
    camera.expect_close().return_const(());

    let options = WorkerOptions {
        error_backoff: Duration::from_millis(1),
        ..WorkerOptions::default()
    };
    let worker = CaptureWorker::with_options(camera, options).unwrap();
    let not_open = Arc::new(AtomicU64::new(0));
    let sink = Arc::clone(&not_open);
    let _conn = worker.errors().connect(move |err| {
        if matches!(err, CaptureError::NotOpen) {
            sink.fetch_add(1, Ordering::SeqCst);
        }
    });

    worker.run(0).unwrap();

    wait_until(|| not_open.load(Ordering::SeqCst) >= 1);
}

#[test]
fn test_drop_joins_capture_thread() {
    let mut camera = MockCamera::new();
    camera.expect_open().returning(|_| Ok(()));
    camera.expect_is_open().return_const(true);
    camera.expect_capture_one().returning(steady_frames());
    camera.expect_close().times(1).return_const(());

    let worker = CaptureWorker::new(camera).unwrap();
    let frames = Arc::new(AtomicU64::new(0));
    let sink = Arc::clone(&frames);
    let _conn = worker.frames().connect(move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
    });
    worker.run(0).unwrap();
    wait_until(|| frames.load(Ordering::SeqCst) > 0);

    drop(worker);
    let after_drop = frames.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(20));

    assert_eq!(frames.load(Ordering::SeqCst), after_drop);
}
