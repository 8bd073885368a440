use tracing::debug;

use crate::detector::{Detection, DetectionResult, Detector};
use crate::frame::FramePayload;
use crate::policy;
use crate::ui::{AlertOptions, UiSink};

/// Submit one payload and report the outcome through the UI collaborators.
///
/// This is the shared path behind both the one-shot detect command and
/// every capture-loop tick.
pub async fn submit_and_report<D, U>(
    detector: &D,
    ui: &U,
    payload: FramePayload,
    alert_options: AlertOptions,
) where
    D: Detector + ?Sized,
    U: UiSink + ?Sized,
{
    let result = detector.submit(payload).await;
    report_result(ui, &result, alert_options).await;
}

/// Route a normalized detection result to the render/status/alert
/// collaborators.
///
/// The modern shape goes through the alert policy; the legacy shape alerts
/// straight off the helmet flag (the policy never sees it), and an absent
/// flag makes no alert decision at all.
pub async fn report_result<U>(ui: &U, result: &DetectionResult, alert_options: AlertOptions)
where
    U: UiSink + ?Sized,
{
    match result {
        DetectionResult::Annotated { image, detections } => {
            let decision = policy::evaluate(detections);
            ui.render(image.as_deref(), &summarize(detections)).await;
            if decision.should_alert {
                ui.raise_alert(&decision.message, alert_options).await;
            }
            ui.set_status("Detection complete", false).await;
        }
        DetectionResult::LegacyFlag {
            image,
            helmet_present,
        } => {
            let summary = match helmet_present {
                Some(true) => "Helmet detected",
                Some(false) => "No helmet detected",
                None => "Annotated image received",
            };
            ui.render(Some(image), summary).await;
            if *helmet_present == Some(false) {
                ui.raise_alert(policy::VIOLATION_MESSAGE, alert_options).await;
            }
            ui.set_status("Detection complete", false).await;
        }
        DetectionResult::Failure { message } => {
            debug!("Reporting detection failure: {}", message);
            ui.set_status(message, true).await;
        }
    }
}

fn summarize(detections: &[Detection]) -> String {
    if detections.is_empty() {
        return "No detections".to_string();
    }
    let labels: Vec<&str> = detections.iter().map(|d| d.label.as_str()).collect();
    format!("{} detection(s): {}", detections.len(), labels.join(", "))
}
