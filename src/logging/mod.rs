//! Output control for the command-line tool
//!
//! This module provides the [`Logger`] for controlling output verbosity and formatting
//! messages. The logger also renders [`SyncEvent`]s, so it can be handed to the
//! synchronizer as its observer.

use crate::sync::{SyncEvent, SyncObserver};
use std::time::{Duration, Instant};

/// Logger responsible for all user-visible output
#[derive(Debug, Clone)]
pub struct Logger {
    pub verbose: bool,
    pub quiet: bool,
    pub start_time: Option<Instant>,
}

impl Logger {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            quiet: false,
            start_time: Some(Instant::now()),
        }
    }

    pub fn new_quiet() -> Self {
        Self {
            verbose: false,
            quiet: true,
            start_time: Some(Instant::now()),
        }
    }

    /// Main section heading
    pub fn section(&self, title: &str) {
        if !self.quiet {
            println!("\n=== {} ===", title);
        }
    }

    /// Sub-section heading
    pub fn subsection(&self, title: &str) {
        if !self.quiet {
            println!("\n--- {} ---", title);
        }
    }

    pub fn debug(&self, message: &str) {
        if self.verbose && !self.quiet {
            println!("🐛 DEBUG: {}", message);
        }
    }

    pub fn verbose(&self, message: &str) {
        if self.verbose && !self.quiet {
            println!("📝 {}", message);
        }
    }

    /// Information message
    pub fn info(&self, message: &str) {
        if !self.quiet {
            println!("ℹ️  {}", message);
        }
    }

    /// Success message
    pub fn success(&self, message: &str) {
        if !self.quiet {
            println!("✅ {}", message);
        }
    }

    /// Warning message
    pub fn warning(&self, message: &str) {
        if !self.quiet {
            println!("⚠️  WARNING: {}", message);
        }
    }

    /// Error message
    pub fn error(&self, message: &str) {
        eprintln!("❌ ERROR: {}", message);
    }

    /// Step information
    pub fn step(&self, message: &str) {
        if !self.quiet {
            println!("▶️  {}", message);
        }
    }

    /// Detailed information (only shown in verbose mode)
    pub fn detail(&self, message: &str) {
        if self.verbose && !self.quiet {
            println!("   {}", message);
        }
    }

    /// Key-value pair summary display
    pub fn summary_kv(&self, title: &str, items: &[(&str, String)]) {
        if !self.quiet {
            self.subsection(title);
            for (key, value) in items {
                println!("  {}: {}", key, value);
            }
        }
    }

    /// Time since the logger was created
    pub fn elapsed(&self) -> Duration {
        self.start_time
            .map(|start| start.elapsed())
            .unwrap_or_default()
    }

    /// Format file size in human-readable units
    pub fn format_size(&self, bytes: u64) -> String {
        if bytes < 1024 {
            format!("{} B", bytes)
        } else if bytes < 1024 * 1024 {
            format!("{:.1} KB", bytes as f64 / 1024.0)
        } else if bytes < 1024 * 1024 * 1024 {
            format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
        } else {
            format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
        }
    }

    /// Format duration in human-readable format
    pub fn format_duration(&self, duration: Duration) -> String {
        let secs = duration.as_secs();
        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m{}s", secs / 60, secs % 60)
        } else {
            format!("{}h{}m{}s", secs / 3600, (secs % 3600) / 60, secs % 60)
        }
    }
}

impl SyncObserver for Logger {
    fn on_event(&self, event: &SyncEvent) {
        match event {
            SyncEvent::StateChanged { from, to } => {
                self.debug(&format!("Sync state {:?} -> {:?}", from, to));
            }
            SyncEvent::PlanStarted { origin, entries } => {
                self.step(&format!(
                    "Checking {} manifest image(s) against {} origin",
                    entries, origin
                ));
            }
            SyncEvent::ImagePresent { image } => {
                self.verbose(&format!("[PULL] Image {} already exists locally.", image));
            }
            SyncEvent::ImageMissing { image } => {
                self.info(&format!("[PULL] Image {} is missing and will be pulled.", image));
            }
            SyncEvent::DuplicateImage { image } => {
                self.detail(&format!("Image {} is listed more than once", image));
            }
            SyncEvent::CredentialConflict { image } => {
                self.warning(&format!(
                    "Image {} resolves to different credentials; keeping the first one",
                    image
                ));
            }
            SyncEvent::PullStarted {
                image,
                index,
                total,
            } => {
                self.step(&format!("[PULL] ({}/{}) Pulling {}", index, total, image));
            }
            SyncEvent::ImagePulled { image, elapsed } => {
                self.detail(&format!(
                    "Pulled {} in {}",
                    image,
                    self.format_duration(*elapsed)
                ));
            }
            SyncEvent::AllPulled { count, elapsed } => {
                self.success(&format!(
                    "[PULL] All images have been pulled! ({} pulled in {})",
                    count,
                    self.format_duration(*elapsed)
                ));
            }
        }
    }
}
