//! Browser session management
//!
//! One shared headless Chromium process hosts all sessions; each session
//! gets its own CDP browser context, so two sessions share no cookies,
//! localStorage, or caches. A fresh context standing in for a fresh guest
//! identity is the mechanism behind every "two different users" check.

use std::collections::BTreeMap;
use std::path::Path;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams,
};
use chromiumoxide::cdp::js_protocol::runtime::{
    ConsoleApiCalledType, EventConsoleApiCalled, EventExceptionThrown,
};
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::HarnessConfig;
use crate::driver::Driver;
use crate::error::{HarnessError, HarnessResult};
use crate::events::{ConsoleLog, EventKind, ObservedEvent};

/// Owns the browser process and provisions isolated sessions.
pub struct SessionManager {
    browser: Browser,
    handler_task: JoinHandle<()>,
    config: HarnessConfig,
}

impl SessionManager {
    /// Launch the shared browser.
    pub async fn launch(config: HarnessConfig) -> HarnessResult<Self> {
        info!("launching browser (headless: {})", config.headless);

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .window_size(config.viewport_width, config.viewport_height);
        if !config.headless {
            builder = builder.with_head();
        }
        let browser_config = builder.build().map_err(HarnessError::Session)?;

        let (browser, mut handler) = Browser::launch(browser_config).await?;

        // Pump CDP messages until the connection closes.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    debug!("CDP handler loop ended");
                    break;
                }
            }
        });

        Ok(Self {
            browser,
            handler_task,
            config,
        })
    }

    /// Provision a fresh, storage-isolated session. Observers attach before
    /// any navigation so early emissions are not missed.
    pub async fn create_session(&mut self, label: &str) -> HarnessResult<Session> {
        let context_id = self
            .browser
            .create_browser_context(CreateBrowserContextParams::default())
            .await?;

        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(HarnessError::Session)?;
        let page = self.browser.new_page(params).await?;

        let console = ConsoleLog::new();
        let listener_tasks = attach_observer(&page, console.clone()).await?;

        let session = Session {
            id: Uuid::new_v4(),
            label: label.to_string(),
            context_id,
            page,
            console,
            listener_tasks,
        };
        info!("session {} created ({})", session.label, session.id);
        Ok(session)
    }

    /// Release a session's page and browser context. Must be called exactly
    /// once per created session, including on early failure paths.
    pub async fn teardown(&mut self, session: Session) -> HarnessResult<()> {
        let Session {
            label,
            context_id,
            page,
            listener_tasks,
            ..
        } = session;

        for task in listener_tasks {
            task.abort();
        }
        if let Err(e) = page.close().await {
            warn!("session {}: page close failed: {}", label, e);
        }
        self.browser.dispose_browser_context(context_id).await?;
        debug!("session {} torn down", label);
        Ok(())
    }

    /// Close the browser process.
    pub async fn shutdown(mut self) -> HarnessResult<()> {
        if let Err(e) = self.browser.close().await {
            warn!("browser close failed: {}", e);
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        Ok(())
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }
}

/// One isolated client identity: a browser context, its page, and the
/// console log it exclusively owns.
pub struct Session {
    id: Uuid,
    label: String,
    context_id: BrowserContextId,
    page: Page,
    console: ConsoleLog,
    listener_tasks: Vec<JoinHandle<()>>,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Short human label ("user-a", "user-b") used in logs and issues.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn console(&self) -> &ConsoleLog {
        &self.console
    }

    /// Driver bound to this session's page.
    pub fn driver<'a>(&'a self, config: &HarnessConfig) -> Driver<'a> {
        Driver::new(&self.page, config.timeouts.clone())
    }

    /// Navigate and wait for the load to finish.
    pub async fn goto(&self, url: &str) -> HarnessResult<()> {
        self.page.goto(url).await?.wait_for_navigation().await?;
        Ok(())
    }

    /// Reload the current page. The reload itself waits out the
    /// navigation; callers add a settle window before inspecting.
    pub async fn reload(&self) -> HarnessResult<()> {
        self.page.reload().await?;
        Ok(())
    }

    /// The page's persisted client state (localStorage). Empty for a fresh
    /// session before any workflow step runs.
    pub async fn storage_snapshot(&self) -> HarnessResult<BTreeMap<String, String>> {
        let raw: String = self
            .page
            .evaluate("JSON.stringify(localStorage)")
            .await?
            .into_value()?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Checkpoint screenshot. Debugging aid only; nothing asserts on it.
    pub async fn screenshot(&self, path: &Path) -> HarnessResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.page
            .save_screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(true)
                    .build(),
                path,
            )
            .await?;
        debug!("screenshot saved: {}", path.display());
        Ok(())
    }
}

/// Subscribe to the page's console and exception streams, appending typed
/// events to `log` as they arrive.
async fn attach_observer(page: &Page, log: ConsoleLog) -> HarnessResult<Vec<JoinHandle<()>>> {
    let mut console_events = page.event_listener::<EventConsoleApiCalled>().await?;
    let console_log = log.clone();
    let console_task = tokio::spawn(async move {
        while let Some(event) = console_events.next().await {
            let kind = match event.r#type {
                ConsoleApiCalledType::Error => EventKind::Error,
                ConsoleApiCalledType::Warning => EventKind::Warning,
                _ => EventKind::Log,
            };
            console_log.push(ObservedEvent {
                kind,
                text: console_text(&event),
                location: None,
            });
        }
    });

    let mut exceptions = page.event_listener::<EventExceptionThrown>().await?;
    let exception_task = tokio::spawn(async move {
        while let Some(event) = exceptions.next().await {
            let details = &event.exception_details;
            let text = details
                .exception
                .as_ref()
                .and_then(|ex| ex.description.clone())
                .unwrap_or_else(|| details.text.clone());
            let location = details.url.as_ref().map(|url| {
                format!("{}:{}:{}", url, details.line_number, details.column_number)
            });
            log.push(ObservedEvent {
                kind: EventKind::UncaughtException,
                text,
                location,
            });
        }
    });

    Ok(vec![console_task, exception_task])
}

/// Best-effort rendering of a console call's arguments.
fn console_text(event: &EventConsoleApiCalled) -> String {
    event
        .args
        .iter()
        .map(|arg| {
            arg.value
                .as_ref()
                .map(|v| match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .or_else(|| arg.description.clone())
                .unwrap_or_default()
        })
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
