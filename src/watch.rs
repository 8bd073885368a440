use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::camera::{CameraStream, HttpCamera};
use crate::config::CameraConfig;
use crate::detector::Detector;
use crate::frame;
use crate::pipeline;
use crate::ui::{AlertOptions, UiSink};

/// An active camera session: the periodic tick task plus exclusive ownership
/// of the stream (held inside the task). Both live and die together.
struct CameraSession {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Periodic camera-mode driver.
///
/// Two states: Idle (no session) and Running (session held). `start` is a
/// guarded no-op while running; `stop` is idempotent. Each tick captures a
/// frame, submits it, and reports through the UI collaborators; a failed
/// tick is logged and swallowed without stopping the loop. Ticks are
/// serialized: a tick that outlasts the period delays the next one rather
/// than overlapping it.
pub struct CaptureLoop<D, U> {
    detector: Arc<D>,
    ui: Arc<U>,
    period: Duration,
    alert_options: AlertOptions,
    session: Option<CameraSession>,
}

impl<D, U> CaptureLoop<D, U>
where
    D: Detector + 'static,
    U: UiSink + 'static,
{
    pub fn new(
        detector: Arc<D>,
        ui: Arc<U>,
        period: Duration,
        alert_options: AlertOptions,
    ) -> Self {
        Self {
            detector,
            ui,
            period,
            alert_options,
            session: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// Acquire the configured camera and start ticking.
    ///
    /// Acquisition failure is reported through alert + status and the loop
    /// stays idle; nothing is retried until the next start request.
    pub async fn start_camera(&mut self, config: &CameraConfig) {
        if self.session.is_some() {
            debug!("Capture loop already running; ignoring start");
            return;
        }

        match HttpCamera::acquire(config).await {
            Ok(stream) => self.start(stream),
            Err(e) => {
                warn!("Camera acquisition failed: {}", e);
                self.ui
                    .raise_alert("Camera unavailable", self.alert_options)
                    .await;
                self.ui
                    .set_status(&format!("Camera unavailable: {}", e), true)
                    .await;
            }
        }
    }

    /// Start ticking over an already-acquired stream. No-op while running.
    pub fn start<S>(&mut self, stream: S)
    where
        S: CameraStream + 'static,
    {
        if self.session.is_some() {
            debug!("Capture loop already running; ignoring start");
            return;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_ticks(
            stream,
            Arc::clone(&self.detector),
            Arc::clone(&self.ui),
            self.period,
            self.alert_options,
            cancel.clone(),
        ));

        self.session = Some(CameraSession { cancel, task });
        info!("Capture loop started ({}ms period)", self.period.as_millis());
    }

    /// Stop ticking and release the stream. Idempotent; stopping while idle
    /// is a no-op.
    pub async fn stop(&mut self) {
        let Some(session) = self.session.take() else {
            debug!("Capture loop already idle; ignoring stop");
            return;
        };

        session.cancel.cancel();
        if let Err(e) = session.task.await {
            if !e.is_cancelled() {
                warn!("Capture task ended abnormally: {}", e);
            }
        }

        info!("Capture loop stopped");
    }
}

async fn run_ticks<S, D, U>(
    mut stream: S,
    detector: Arc<D>,
    ui: Arc<U>,
    period: Duration,
    alert_options: AlertOptions,
    cancel: CancellationToken,
) where
    S: CameraStream,
    D: Detector,
    U: UiSink,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                tick(&mut stream, detector.as_ref(), ui.as_ref(), alert_options, &cancel).await;
            }
        }
    }

    // Timer and stream go down together
    stream.stop().await;
    debug!("Camera session released");
}

/// One capture cycle: frame → payload → submit → report.
///
/// Any failure is contained here; the loop keeps ticking. The cancellation
/// check after the submit keeps a response that outlived `stop` from
/// touching the UI.
async fn tick<S, D, U>(
    stream: &mut S,
    detector: &D,
    ui: &U,
    alert_options: AlertOptions,
    cancel: &CancellationToken,
) where
    S: CameraStream,
    D: Detector + ?Sized,
    U: UiSink + ?Sized,
{
    let frame = match stream.next_frame().await {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Camera frame unavailable: {}", e);
            return;
        }
    };

    let negotiated = stream.settings().map(|s| (s.width, s.height));
    let Some(payload) = frame::capture_stream_frame(&frame, negotiated) else {
        debug!("Frame capture failed; skipping tick");
        return;
    };

    let result = detector.submit(payload).await;
    if cancel.is_cancelled() {
        debug!("Discarding detection result that arrived after stop");
        return;
    }

    pipeline::report_result(ui, &result, alert_options).await;
}
