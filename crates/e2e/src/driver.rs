//! UI interaction driver: locate, wait, act
//!
//! Every wait here is a bounded poll loop (100ms interval against a
//! deadline), never an unbounded block. Failures come back as values so the
//! flow layer can decide between recording an issue and aborting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use tokio::time::sleep;
use tracing::{debug, trace};

use crate::config::Timeouts;
use crate::error::{HarnessError, HarnessResult};
use crate::locator::{marked_selector, Strategy, Target};

/// Readiness of a located element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Actionable {
    Missing,
    Hidden,
    Disabled,
    Ready,
}

/// A resolved target: the protocol element handle plus which candidate won.
pub struct Located {
    pub element: Element,
    pub strategy: Strategy,
    marker: String,
}

/// Driver over one session's page.
pub struct Driver<'a> {
    page: &'a Page,
    timeouts: Timeouts,
    marker_seq: AtomicU64,
}

impl<'a> Driver<'a> {
    pub fn new(page: &'a Page, timeouts: Timeouts) -> Self {
        Self {
            page,
            timeouts,
            marker_seq: AtomicU64::new(0),
        }
    }

    /// Evaluate candidates left to right; first with a match count > 0 is
    /// marked and resolved to an element handle. No waiting.
    pub async fn locate(&self, target: &Target) -> HarnessResult<Located> {
        match self.try_locate(target).await? {
            Some(located) => Ok(located),
            None => Err(HarnessError::NotFound {
                target: target.description.clone(),
            }),
        }
    }

    async fn try_locate(&self, target: &Target) -> HarnessResult<Option<Located>> {
        for (index, strategy) in target.candidates.iter().enumerate() {
            let count: u64 = self.eval(&strategy.count_js()).await?;
            trace!("{}: candidate {} matches {}", target, strategy, count);
            if count == 0 {
                continue;
            }

            let marker = format!("qa-{}", self.marker_seq.fetch_add(1, Ordering::Relaxed));
            let marked: bool = self.eval(&strategy.mark_js(&marker)).await?;
            if !marked {
                // Matched the count probe but detached before marking;
                // treat as a miss and let the caller retry.
                continue;
            }

            let element = self.page.find_element(marked_selector(&marker)).await?;
            debug!(
                "{}: matched candidate #{} ({}), {} element(s)",
                target, index, strategy, count
            );
            return Ok(Some(Located {
                element,
                strategy: strategy.clone(),
                marker,
            }));
        }
        Ok(None)
    }

    /// Locate and wait until visible and enabled, then click.
    pub async fn wait_and_click(&self, target: &Target, timeout: Duration) -> HarnessResult<()> {
        let located = self.await_actionable(target, timeout).await?;
        located.element.scroll_into_view().await?;
        located.element.click().await?;
        debug!("{}: clicked via {}", target, located.strategy);
        Ok(())
    }

    /// Locate, wait for readiness, then replace the field's content with
    /// `value`: the field is cleared (with an input event so controlled
    /// inputs observe it) before the new value is typed in.
    pub async fn wait_and_fill(
        &self,
        target: &Target,
        value: &str,
        timeout: Duration,
    ) -> HarnessResult<()> {
        let located = self.await_actionable(target, timeout).await?;
        located.element.scroll_into_view().await?;
        located.element.click().await?;
        self.clear_field(&located.marker).await?;
        located.element.type_str(value).await?;
        debug!("{}: filled via {}", target, located.strategy);
        Ok(())
    }

    /// Locate and send a key press to the element (e.g. Enter to submit).
    pub async fn press(&self, target: &Target, key: &str, timeout: Duration) -> HarnessResult<()> {
        let located = self.await_actionable(target, timeout).await?;
        located.element.press_key(key).await?;
        debug!("{}: pressed {} via {}", target, key, located.strategy);
        Ok(())
    }

    /// Block until the current URL contains `fragment`, or fail reporting
    /// the URL actually reached.
    pub async fn wait_for_url(&self, fragment: &str, timeout: Duration) -> HarnessResult<String> {
        let deadline = Instant::now() + timeout;
        loop {
            let url = self.current_url().await?;
            if url.contains(fragment) {
                debug!("navigation reached {}", url);
                return Ok(url);
            }
            if Instant::now() >= deadline {
                return Err(HarnessError::NavigationTimeout {
                    expected: fragment.to_string(),
                    reached: url,
                });
            }
            sleep(self.timeouts.poll_interval).await;
        }
    }

    pub async fn current_url(&self) -> HarnessResult<String> {
        Ok(self
            .page
            .url()
            .await?
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    pub async fn page_title(&self) -> HarnessResult<String> {
        self.eval("document.title || ''").await
    }

    /// Occurrences of the literal `needle` in the rendered body text.
    pub async fn text_occurrences(&self, needle: &str) -> HarnessResult<u64> {
        let js = format!(
            "document.body ? document.body.innerText.split({}).length - 1 : 0",
            js_str(needle)
        );
        self.eval(&js).await
    }

    /// Whether the rendered body contains `needle`, case-insensitively.
    pub async fn body_contains(&self, needle: &str) -> HarnessResult<bool> {
        let js = format!(
            "document.body ? document.body.innerText.toLowerCase().includes({}) : false",
            js_str(&needle.to_lowercase())
        );
        self.eval(&js).await
    }

    /// How many attached elements a single strategy matches right now.
    pub async fn count(&self, strategy: &Strategy) -> HarnessResult<u64> {
        self.eval(&strategy.count_js()).await
    }

    /// Non-empty trimmed text chunks of message-like nodes, for response
    /// inspection.
    pub async fn visible_text_chunks(&self, selector: &str) -> HarnessResult<Vec<String>> {
        let js = format!(
            "Array.from(document.querySelectorAll({})).map(el => (el.textContent || '').trim()).filter(t => t.length > 0)",
            js_str(selector)
        );
        self.eval(&js).await
    }

    /// Fixed wait for effects with no client-observable completion signal.
    pub async fn settle(&self, window: Duration) {
        trace!("settling for {:?}", window);
        sleep(window).await;
    }

    async fn await_actionable(&self, target: &Target, timeout: Duration) -> HarnessResult<Located> {
        let deadline = Instant::now() + timeout;
        let mut last_state = Actionable::Missing;

        loop {
            if let Some(located) = self.try_locate(target).await? {
                last_state = self.probe_state(&located.marker).await?;
                if last_state == Actionable::Ready {
                    return Ok(located);
                }
            } else {
                last_state = Actionable::Missing;
            }

            if Instant::now() >= deadline {
                break;
            }
            sleep(self.timeouts.poll_interval).await;
        }

        Err(match last_state {
            Actionable::Missing => HarnessError::NotFound {
                target: target.description.clone(),
            },
            Actionable::Disabled => HarnessError::InteractionBlocked {
                target: target.description.clone(),
            },
            _ => HarnessError::InteractionTimeout {
                target: target.description.clone(),
                timeout_ms: timeout.as_millis() as u64,
            },
        })
    }

    async fn probe_state(&self, marker: &str) -> HarnessResult<Actionable> {
        let js = format!(
            "(() => {{ const el = document.querySelector({sel}); \
             if (!el) return 'missing'; \
             const style = window.getComputedStyle(el); \
             const visible = el.offsetParent !== null || style.position === 'fixed'; \
             if (!visible || style.visibility === 'hidden' || style.display === 'none') return 'hidden'; \
             if (el.disabled || el.getAttribute('disabled') !== null) return 'disabled'; \
             return 'ready'; }})()",
            sel = js_str(&marked_selector(marker))
        );
        let state: String = self.eval(&js).await?;
        Ok(match state.as_str() {
            "ready" => Actionable::Ready,
            "disabled" => Actionable::Disabled,
            "hidden" => Actionable::Hidden,
            _ => Actionable::Missing,
        })
    }

    async fn clear_field(&self, marker: &str) -> HarnessResult<()> {
        let js = format!(
            "(() => {{ const el = document.querySelector({sel}); \
             if (!el) return false; \
             el.value = ''; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             return true; }})()",
            sel = js_str(&marked_selector(marker))
        );
        let cleared: bool = self.eval(&js).await?;
        if !cleared {
            return Err(HarnessError::Session(format!(
                "marked element {} detached before clear",
                marker
            )));
        }
        Ok(())
    }

    async fn eval<T: serde::de::DeserializeOwned>(&self, js: &str) -> HarnessResult<T> {
        Ok(self.page.evaluate(js).await?.into_value()?)
    }
}

fn js_str(s: &str) -> String {
    serde_json::to_string(s).expect("string serialization is infallible")
}
