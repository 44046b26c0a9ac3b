//! Typed locator strategies with ordered fallback
//!
//! A logical UI target carries an ordered list of candidate strategies.
//! Candidates are evaluated left to right and the first one that matches at
//! least one attached element wins — first-match-wins, not highest match
//! count. The trade is robustness to markup drift for predictability: the
//! driver logs which candidate matched so a replayed run can be compared.

use std::fmt;

/// Attribute used to hand a matched element back to the protocol layer as a
/// real element handle.
pub const MARKER_ATTR: &str = "data-esperit-qa";

/// One way of identifying a UI element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Plain CSS selector
    Css(String),
    /// Elements of `tag` whose rendered text contains `needle`
    Text { tag: String, needle: String },
    /// Elements of `tag` whose `attribute` contains `needle`,
    /// case-insensitively
    Attr {
        tag: String,
        attribute: String,
        needle: String,
    },
}

impl Strategy {
    pub fn css(selector: &str) -> Self {
        Strategy::Css(selector.to_string())
    }

    pub fn text(tag: &str, needle: &str) -> Self {
        Strategy::Text {
            tag: tag.to_string(),
            needle: needle.to_string(),
        }
    }

    pub fn attr(tag: &str, attribute: &str, needle: &str) -> Self {
        Strategy::Attr {
            tag: tag.to_string(),
            attribute: attribute.to_string(),
            needle: needle.to_string(),
        }
    }

    /// Expression yielding how many attached elements this strategy matches.
    pub fn count_js(&self) -> String {
        match self {
            Strategy::Css(sel) => {
                format!("document.querySelectorAll({}).length", js_str(sel))
            }
            Strategy::Text { tag, needle } => format!(
                "Array.from(document.querySelectorAll({})).filter(el => (el.textContent || '').includes({})).length",
                js_str(tag),
                js_str(needle)
            ),
            Strategy::Attr {
                tag,
                attribute,
                needle,
            } => format!(
                "Array.from(document.querySelectorAll({})).filter(el => (el.getAttribute({}) || '').toLowerCase().includes({})).length",
                js_str(tag),
                js_str(attribute),
                js_str(&needle.to_lowercase())
            ),
        }
    }

    /// Expression that tags the first match with `marker` under
    /// [`MARKER_ATTR`] and yields whether a match existed. The caller then
    /// resolves the marked element through the protocol to get an element
    /// handle it can click or type into.
    pub fn mark_js(&self, marker: &str) -> String {
        let finder = match self {
            Strategy::Css(sel) => format!("document.querySelector({})", js_str(sel)),
            Strategy::Text { tag, needle } => format!(
                "Array.from(document.querySelectorAll({})).find(el => (el.textContent || '').includes({}))",
                js_str(tag),
                js_str(needle)
            ),
            Strategy::Attr {
                tag,
                attribute,
                needle,
            } => format!(
                "Array.from(document.querySelectorAll({})).find(el => (el.getAttribute({}) || '').toLowerCase().includes({}))",
                js_str(tag),
                js_str(attribute),
                js_str(&needle.to_lowercase())
            ),
        };
        format!(
            "(() => {{ const el = {finder}; if (!el) return false; el.setAttribute('{MARKER_ATTR}', {marker}); return true; }})()",
            finder = finder,
            marker = js_str(marker),
        )
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Css(sel) => write!(f, "css:{}", sel),
            Strategy::Text { tag, needle } => write!(f, "{}:has-text({})", tag, needle),
            Strategy::Attr {
                tag,
                attribute,
                needle,
            } => write!(f, "{}[{}*={} i]", tag, attribute, needle),
        }
    }
}

/// A logical UI target: a description plus its ordered candidate list.
#[derive(Debug, Clone)]
pub struct Target {
    pub description: String,
    pub candidates: Vec<Strategy>,
}

impl Target {
    pub fn new(description: &str, candidates: Vec<Strategy>) -> Self {
        Self {
            description: description.to_string(),
            candidates,
        }
    }

    /// Candidate list rendered for issue context.
    pub fn candidates_tried(&self) -> String {
        self.candidates
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// First candidate with a non-zero match count, if any.
pub fn first_match(counts: &[u64]) -> Option<usize> {
    counts.iter().position(|&c| c > 0)
}

/// Selector resolving a previously marked element.
pub fn marked_selector(marker: &str) -> String {
    format!("[{}=\"{}\"]", MARKER_ATTR, marker)
}

fn js_str(s: &str) -> String {
    serde_json::to_string(s).expect("string serialization is infallible")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_match_wins_over_higher_counts() {
        // The second candidate matches more elements, but the first
        // candidate with any match is selected.
        assert_eq!(first_match(&[0, 1, 7]), Some(1));
        assert_eq!(first_match(&[2, 9, 0]), Some(0));
    }

    #[test]
    fn no_candidate_matching_yields_none() {
        assert_eq!(first_match(&[]), None);
        assert_eq!(first_match(&[0, 0, 0]), None);
    }

    #[test]
    fn count_js_escapes_quotes() {
        let strategy = Strategy::text("button", r#"Say "hi""#);
        let js = strategy.count_js();
        assert!(js.contains(r#""Say \"hi\"""#));
    }

    #[test]
    fn attr_matching_is_case_insensitive() {
        let strategy = Strategy::attr("input", "placeholder", "Name");
        let js = strategy.count_js();
        // The needle is lowered at build time and the attribute at runtime.
        assert!(js.contains(r#""name""#));
        assert!(js.contains(".toLowerCase()"));
    }

    #[test]
    fn mark_js_sets_the_marker_attribute() {
        let strategy = Strategy::css("button.save");
        let js = strategy.mark_js("qa-3");
        assert!(js.contains(MARKER_ATTR));
        assert!(js.contains(r#""qa-3""#));
        assert_eq!(marked_selector("qa-3"), "[data-esperit-qa=\"qa-3\"]");
    }

    #[test]
    fn target_renders_candidates_for_issue_context() {
        let target = Target::new(
            "the guest entry button",
            vec![
                Strategy::text("button", "Continue as Guest"),
                Strategy::css("[data-testid=\"guest-login\"]"),
            ],
        );
        assert_eq!(
            target.candidates_tried(),
            "button:has-text(Continue as Guest) | css:[data-testid=\"guest-login\"]"
        );
    }
}
