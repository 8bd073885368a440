use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::AlertConfig;

/// Presentation options for a raised alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertOptions {
    /// How long the alert stays up before auto-dismissal
    pub duration: Duration,
    /// Compact rendering
    pub compact: bool,
    /// Audible cue on raise
    pub play_sound: bool,
}

impl AlertOptions {
    pub fn from_config(config: &AlertConfig) -> Self {
        Self {
            duration: Duration::from_millis(config.duration_ms),
            compact: config.compact,
            play_sound: config.play_sound,
        }
    }
}

/// UI collaborator surface the detection core reports through.
///
/// The core never renders anything itself; hosts implement this trait
/// (terminal, test recorder, or a real front-end).
#[async_trait]
pub trait UiSink: Send + Sync {
    /// Show the latest annotated image (when present) and a one-line summary
    async fn render(&self, image: Option<&[u8]>, summary: &str);

    /// Update the status line
    async fn set_status(&self, text: &str, is_error: bool);

    /// Raise a violation alert
    async fn raise_alert(&self, message: &str, options: AlertOptions);
}

/// Auto-dismiss timer for the active alert.
///
/// Scheduling a new dismissal always cancels the pending one first, so at
/// most one dismissal is ever pending.
#[derive(Debug, Default)]
pub struct DismissTimer {
    handle: Option<JoinHandle<()>>,
}

impl DismissTimer {
    pub fn new() -> Self {
        Self { handle: None }
    }

    /// Schedule `on_dismiss` to run after `delay`, replacing any pending
    /// dismissal.
    pub fn schedule<F>(&mut self, delay: Duration, on_dismiss: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_dismiss.await;
        }));
    }

    /// Cancel a pending dismissal, if any
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

/// Terminal implementation of the UI collaborators.
///
/// Renders summaries and alerts as timestamped lines; optionally writes the
/// latest annotated image to a file.
pub struct ConsoleUi {
    output_path: Option<PathBuf>,
    active_alert: Arc<Mutex<Option<String>>>,
    dismiss: Mutex<DismissTimer>,
}

impl ConsoleUi {
    pub fn new(output_path: Option<PathBuf>) -> Self {
        Self {
            output_path,
            active_alert: Arc::new(Mutex::new(None)),
            dismiss: Mutex::new(DismissTimer::new()),
        }
    }

    /// Message of the currently displayed alert, if one is up
    pub async fn active_alert(&self) -> Option<String> {
        self.active_alert.lock().await.clone()
    }

    fn stamp() -> String {
        Local::now().format("%H:%M:%S").to_string()
    }
}

#[async_trait]
impl UiSink for ConsoleUi {
    async fn render(&self, image: Option<&[u8]>, summary: &str) {
        if let (Some(path), Some(bytes)) = (&self.output_path, image) {
            match tokio::fs::write(path, bytes).await {
                Ok(()) => debug!("Annotated image written to {}", path.display()),
                Err(e) => warn!("Failed to write annotated image: {}", e),
            }
        }
        println!("[{}] {}", Self::stamp(), summary);
    }

    async fn set_status(&self, text: &str, is_error: bool) {
        if is_error {
            eprintln!("[{}] error: {}", Self::stamp(), text);
        } else {
            println!("[{}] {}", Self::stamp(), text);
        }
    }

    async fn raise_alert(&self, message: &str, options: AlertOptions) {
        {
            let mut active = self.active_alert.lock().await;
            *active = Some(message.to_string());
        }

        let bell = if options.play_sound { "\x07" } else { "" };
        if options.compact {
            println!("[{}] !! {}{}", Self::stamp(), message, bell);
        } else {
            println!("[{}] ======== ALERT ========", Self::stamp());
            println!("[{}] {}{}", Self::stamp(), message, bell);
            println!("[{}] =======================", Self::stamp());
        }

        let active = Arc::clone(&self.active_alert);
        self.dismiss.lock().await.schedule(options.duration, async move {
            let mut active = active.lock().await;
            if active.take().is_some() {
                debug!("Alert dismissed");
            }
        });
    }
}
