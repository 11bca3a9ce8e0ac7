//! gazeview - headless demo of the gaze viewer's concurrency core
//!
//! # Overview
//!
//! Wires the library together the way a real viewer would, with a synthetic
//! camera and a simulated tracker standing in for hardware:
//! - Logging infrastructure (file rotation + optional console output)
//! - Configuration loading ([`ConfigManager`])
//! - Shared view ([`SharedView`]) written by callbacks, read by the render loop
//! - Capture worker ([`CaptureWorker`]) on a [`SyntheticCamera`]
//! - Tracking signal hub ([`TrackingEvents`]) fed by a simulator thread
//!
//! # Threads
//!
//! - **Main thread**: render loop, reads the view through the high-priority facet
//! - **Capture thread**: owned by the worker, stores frames in the view
//! - **Tracker thread**: publishes gaze samples and runs one calibration
//!
//! # Usage
//!
//! `gazeview [CONFIG_DIR]` (default `gazeview-data`). A default
//! `gazeview.yaml` is written on first run.

use anyhow::{Context, Result, anyhow};
use gazeview::capture::WorkerOptions;
use gazeview::metrics::Metrics;
use gazeview::models::{DemoSettings, Drawable};
use gazeview::tracking::{self, WindowOrigin};
use gazeview::{
    APP_NAME, CaptureWorker, ConfigManager, SharedView, SyntheticCamera, TrackingEvents, VERSION,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const DEFAULT_CONFIG_DIR: &str = "gazeview-data";

/// Calibration targets as fractions of the window size
const CALIBRATION_TARGETS: [(f32, f32); 5] =
    [(0.5, 0.5), (0.1, 0.1), (0.9, 0.1), (0.1, 0.9), (0.9, 0.9)];

fn main() -> Result<()> {
    let config_dir = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_DIR.to_string());

    let config_manager = ConfigManager::new(&config_dir)?;
    if config_manager.ensure_default_config()? {
        eprintln!("Wrote default config to {}", config_manager.config_path());
    }
    let config = config_manager.load()?;

    let log_dir = config_manager.resolve(&config.logging.directory);
    let _log_guard = gazeview::logging::setup_logging(&log_dir, &config.logging)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let metrics = Arc::new(Metrics::new());
    let view = Arc::new(SharedView::with_metrics(&config.view, Arc::clone(&metrics)));
    let events = Arc::new(TrackingEvents::new());
    events.set_window_origin(WindowOrigin::new(0, 0));

    let camera = SyntheticCamera::new(config.camera.width, config.camera.height)
        .with_devices(&[config.camera.index])
        .with_fps(config.camera.fps);
    let mut worker = CaptureWorker::with_options(
        camera,
        WorkerOptions::from_settings(&config.camera, Arc::clone(&metrics)),
    )?;

    let _view_bindings = tracking::bind_view(&events, &view);
    let _frame_binding = tracking::bind_frames(&worker, &view);
    let _error_log = worker
        .errors()
        .connect(|err| tracing::debug!(error = %err, "Capture error observed"))
        .scoped();

    worker
        .run(config.camera.index)
        .with_context(|| format!("Failed to start camera {}", config.camera.index))?;

    let stop = Arc::new(AtomicBool::new(false));
    let simulator = {
        let events = Arc::clone(&events);
        let stop = Arc::clone(&stop);
        let (width, height) = (config.view.width as f32, config.view.height as f32);
        thread::Builder::new()
            .name("gazeview-tracker".to_string())
            .spawn(move || simulate_tracker(&events, &stop, width, height))
            .context("Failed to spawn tracker thread")?
    };

    render_loop(&view, &metrics, &config.demo);

    tracing::info!("Render loop finished, shutting down");
    stop.store(true, Ordering::Release);
    simulator
        .join()
        .map_err(|_| anyhow!("Tracker thread panicked"))?;
    worker.shutdown();

    metrics.log_summary();
    tracing::info!("Application shutdown complete");
    Ok(())
}

/// Read the view at the configured interval until the run time is over.
fn render_loop(view: &SharedView, metrics: &Metrics, demo: &DemoSettings) {
    let deadline = Instant::now() + Duration::from_secs(demo.run_seconds);
    let interval = Duration::from_millis(demo.render_interval_ms);
    let mut last_report = Instant::now();

    while Instant::now() < deadline {
        let drawn = {
            let model = view.render_guard();
            let items = model.visible_drawables();
            if tracing::enabled!(tracing::Level::TRACE) {
                for item in &items {
                    tracing::trace!("draw {}", item.describe());
                }
            }
            items.len()
        };

        if last_report.elapsed() >= Duration::from_secs(1) {
            tracing::debug!(drawn, "Rendered frame");
            metrics.log_periodic();
            last_report = Instant::now();
        }

        thread::sleep(interval);
    }
}

/// Stand-in for a gaze tracker: a circling gaze with periodic tracking loss,
/// and one five-point calibration after a short warm-up.
fn simulate_tracker(events: &TrackingEvents, stop: &AtomicBool, width: f32, height: f32) {
    let started = Instant::now();
    let mut calibrated = false;
    let mut tick: u32 = 0;

    while !stop.load(Ordering::Acquire) {
        let angle = tick as f32 * 0.05;
        let x = width / 2.0 + angle.cos() * width / 4.0;
        let y = height / 2.0 + angle.sin() * height / 4.0;
        events.publish_gaze(x, y, tick % 100 < 90);

        if !calibrated && started.elapsed() >= Duration::from_secs(2) {
            run_calibration(events, stop, width, height);
            calibrated = true;
        }

        tick = tick.wrapping_add(1);
        thread::sleep(Duration::from_millis(33));
    }
}

fn run_calibration(events: &TrackingEvents, stop: &AtomicBool, width: f32, height: f32) {
    if !events.start_calibration() {
        return;
    }
    thread::sleep(Duration::from_millis(500));

    for (fx, fy) in CALIBRATION_TARGETS {
        if stop.load(Ordering::Acquire) {
            break;
        }
        events.next_calibration_point(fx * width, fy * height);
        for step in 1..=10 {
            events.report_calibration_progress(step as f32 / 10.0);
            thread::sleep(Duration::from_millis(40));
        }
    }

    let data = CALIBRATION_TARGETS
        .iter()
        .flat_map(|&(fx, fy)| [fx, fy])
        .collect();
    events.finish_calibration(data);
}
