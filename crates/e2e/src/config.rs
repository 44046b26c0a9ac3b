//! Harness configuration: target, timeouts, and named settle windows

use std::path::PathBuf;
use std::time::Duration;

/// Default deployment under test.
pub const DEPLOYED_URL: &str = "https://future-you-six.vercel.app";

/// Top-level harness configuration
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Base URL of the deployed application
    pub base_url: String,

    /// Run the browser headless
    pub headless: bool,

    /// Viewport dimensions
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Directory for checkpoint screenshots (debugging aid, never asserted on)
    pub screenshot_dir: PathBuf,

    /// Capture checkpoint screenshots at all
    pub screenshots: bool,

    /// Directory for the structured results artifact
    pub artifact_dir: PathBuf,

    pub timeouts: Timeouts,
    pub settle: SettleWindows,
}

/// Bounded waits for condition-polling. None of these are sleeps: each is a
/// deadline for a poll loop that exits as soon as its condition holds.
#[derive(Debug, Clone)]
pub struct Timeouts {
    /// Waiting for the URL to change after onboarding
    pub navigation: Duration,

    /// Waiting for an element to become visible and enabled
    pub interaction: Duration,

    /// Extra grace for a submit control that stays disabled while the form
    /// validates
    pub submit_grace: Duration,

    /// Interval between polls
    pub poll_interval: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(10),
            interaction: Duration::from_secs(5),
            submit_grace: Duration::from_secs(2),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Fixed waits for asynchronous effects that have no client-observable
/// completion signal (backend persistence, response streaming, render
/// settling). Each one is a known source of flakiness; they exist here,
/// named, rather than as literals scattered through the flows.
#[derive(Debug, Clone)]
pub struct SettleWindows {
    /// After a navigation lands, before inspecting the page
    pub after_navigation: Duration,

    /// After opening the create-persona form
    pub after_form_open: Duration,

    /// After submitting a form, before re-counting page state
    pub after_submit: Duration,

    /// Window granted for a chat response to stream in
    pub chat_response: Duration,

    /// Before reading a session's console log, so late events land
    pub console_drain: Duration,
}

impl Default for SettleWindows {
    fn default() -> Self {
        Self {
            after_navigation: Duration::from_secs(2),
            after_form_open: Duration::from_secs(1),
            after_submit: Duration::from_secs(2),
            chat_response: Duration::from_secs(10),
            console_drain: Duration::from_secs(3),
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: DEPLOYED_URL.to_string(),
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            screenshot_dir: PathBuf::from("test-results/screenshots"),
            screenshots: false,
            artifact_dir: PathBuf::from("test-results"),
            timeouts: Timeouts::default(),
            settle: SettleWindows::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigation_deadline_is_longer_than_interaction() {
        let t = Timeouts::default();
        assert!(t.navigation > t.interaction);
        assert!(t.poll_interval < t.interaction);
    }

    #[test]
    fn default_target_is_the_deployed_site() {
        let config = HarnessConfig::default();
        assert_eq!(config.base_url, DEPLOYED_URL);
        assert!(config.headless);
    }
}
