//! HTTP surface probes for the deployed application

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{HarnessError, HarnessResult};
use crate::report::{Issue, RunReport};

/// Endpoints every healthy deployment must answer with 200.
pub const REQUIRED_ENDPOINTS: &[&str] = &["/api/health", "/api/personas"];

/// Probe a single endpoint; non-2xx becomes a transport error.
pub async fn check_endpoint(
    client: &reqwest::Client,
    base_url: &str,
    path: &str,
) -> HarnessResult<()> {
    let url = format!("{}{}", base_url, path);
    let response = client.get(&url).send().await?;
    let status = response.status();
    if status.is_success() {
        debug!("{} answered {}", url, status);
        Ok(())
    } else {
        Err(HarnessError::Transport {
            url,
            status: status.as_u16(),
        })
    }
}

/// Probe the homepage and the required API endpoints, recording one issue
/// per failure. Transport failures are blocking: nothing downstream is
/// trustworthy if the HTTP surface is down.
pub async fn check_surface(base_url: &str, report: &mut RunReport) {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            report.record_issue(Issue::blocking(&format!(
                "could not build HTTP client: {}",
                e
            )));
            return;
        }
    };

    let mut paths = vec![""];
    paths.extend_from_slice(REQUIRED_ENDPOINTS);

    for path in paths {
        let shown = if path.is_empty() { "/" } else { path };
        match check_endpoint(&client, base_url, path).await {
            Ok(()) => debug!("endpoint {} ok", shown),
            Err(e) => {
                warn!("endpoint {} failed: {}", shown, e);
                report.record_issue(
                    Issue::blocking(&e.to_string()).with_url(&format!("{}{}", base_url, path)),
                );
            }
        }
    }
}
