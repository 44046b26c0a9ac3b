//! Esperit acceptance harness
//!
//! Black-box acceptance testing for the deployed Esperit web app, driven
//! through a real headless browser over CDP. The harness has no access to
//! the application's source: it observes DOM state, navigation, console
//! and page errors, and client-side persisted storage, and nothing else.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Acceptance Harness (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SessionManager                                             │
//! │    ├── create_session() -> Session (isolated context)       │
//! │    │     └── console/exception observers attach pre-nav     │
//! │    └── teardown(session)                                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Driver (per session)                                       │
//! │    ├── locate(target)        first-match-wins candidates    │
//! │    ├── wait_and_click / wait_and_fill / press               │
//! │    └── wait_for_url / text probes / storage snapshot        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  flows                                                      │
//! │    ├── onboard_guest / create_persona / chat_round_trip     │
//! │    └── verify_isolation (two sessions, leak direction)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RunReport                                                  │
//! │    └── issues + console errors -> render() -> exit code     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod events;
pub mod flows;
pub mod locator;
pub mod probes;
pub mod report;
pub mod session;

pub use config::HarnessConfig;
pub use error::{HarnessError, HarnessResult};
pub use report::{Issue, RunReport, Severity};
pub use session::{Session, SessionManager};
