//! Acceptance harness entry point
//!
//! Runs named scenarios against the deployed site and maps the aggregated
//! verdict to the process exit code (0 = clean, 1 = issues or console
//! errors, 2 = the harness itself failed to run).
//!
//! Run with: cargo test --package esperit-e2e --test acceptance

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use esperit_e2e::config::{HarnessConfig, DEPLOYED_URL};
use esperit_e2e::flows;
use esperit_e2e::{HarnessResult, Issue, RunReport, SessionManager};

#[derive(Parser, Debug)]
#[command(name = "esperit-acceptance")]
#[command(about = "Black-box acceptance tests for the deployed Esperit app")]
struct Args {
    /// Base URL of the deployment under test
    #[arg(long, default_value = DEPLOYED_URL)]
    url: String,

    /// Run a single scenario instead of the full set
    #[arg(short, long, value_enum)]
    scenario: Option<Scenario>,

    /// Run the browser headless
    #[arg(long, default_value = "true")]
    headless: bool,

    /// Capture checkpoint screenshots (debugging aid)
    #[arg(long)]
    screenshots: bool,

    /// Output directory for the report artifact and screenshots
    #[arg(short, long, default_value = "test-results")]
    output: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Endpoint probes and homepage checks
    Smoke,
    /// Guest onboarding into the personas page
    GuestFlow,
    /// Persona creation through the UI
    Persona,
    /// Persona creation plus a chat round-trip
    Chat,
    /// Console/page-error capture across onboarding
    Console,
    /// Cross-session persona isolation
    Privacy,
}

const FULL_SET: &[Scenario] = &[
    Scenario::Smoke,
    Scenario::GuestFlow,
    Scenario::Persona,
    Scenario::Chat,
    Scenario::Console,
    Scenario::Privacy,
];

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();

    let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
    match rt.block_on(run(args)) {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

async fn run(args: Args) -> HarnessResult<i32> {
    let config = HarnessConfig {
        base_url: args.url.clone(),
        headless: args.headless,
        screenshots: args.screenshots,
        screenshot_dir: args.output.join("screenshots"),
        artifact_dir: args.output.clone(),
        ..Default::default()
    };

    let mut report = RunReport::new(&config.base_url);
    let mut manager = SessionManager::launch(config).await?;

    let scenarios: Vec<Scenario> = match args.scenario {
        Some(s) => vec![s],
        None => FULL_SET.to_vec(),
    };

    for scenario in scenarios {
        info!("--- scenario: {:?} ---", scenario);
        // A scenario that dies mid-run still leaves its collected issues
        // in the report; the run moves on and renders everything at the
        // end rather than crashing.
        if let Err(e) = execute(scenario, &mut manager, &mut report).await {
            error!("scenario {:?} aborted: {}", scenario, e);
            report.record_issue(Issue::blocking(&format!(
                "scenario {:?} aborted: {}",
                scenario, e
            )));
        }
    }

    let artifact_dir = manager.config().artifact_dir.clone();
    manager.shutdown().await?;

    print!("{}", report.render());
    let artifact = report.write_artifact(&artifact_dir)?;
    info!("results written to: {}", artifact.display());

    Ok(report.summary().exit_code)
}

async fn execute(
    scenario: Scenario,
    manager: &mut SessionManager,
    report: &mut RunReport,
) -> HarnessResult<()> {
    match scenario {
        Scenario::Smoke => flows::deployment_smoke(manager, report).await,
        Scenario::GuestFlow => guest_flow(manager, report).await,
        Scenario::Persona => persona(manager, report).await,
        Scenario::Chat => chat(manager, report).await,
        Scenario::Console => console(manager, report).await,
        Scenario::Privacy => flows::verify_isolation(manager, report).await,
    }
}

async fn guest_flow(manager: &mut SessionManager, report: &mut RunReport) -> HarnessResult<()> {
    let config = manager.config().clone();
    let session = manager.create_session("guest").await?;

    let outcome = async {
        if flows::onboard_guest(&session, &config, report).await? {
            flows::check_personas_page(&session, &config, report).await?;
        }
        Ok(())
    }
    .await;

    flows::collect_console_errors(&session, &config, report).await;
    manager.teardown(session).await?;
    outcome
}

async fn persona(manager: &mut SessionManager, report: &mut RunReport) -> HarnessResult<()> {
    let config = manager.config().clone();
    let session = manager.create_session("creator").await?;

    let outcome = async {
        if flows::onboard_guest(&session, &config, report).await? {
            flows::create_persona(
                &session,
                &config,
                report,
                "Test Persona",
                "You are a helpful test assistant.",
            )
            .await?;
        }
        Ok(())
    }
    .await;

    flows::collect_console_errors(&session, &config, report).await;
    manager.teardown(session).await?;
    outcome
}

async fn chat(manager: &mut SessionManager, report: &mut RunReport) -> HarnessResult<()> {
    let config = manager.config().clone();
    let session = manager.create_session("chatter").await?;

    let outcome = async {
        if flows::onboard_guest(&session, &config, report).await? {
            flows::create_persona(
                &session,
                &config,
                report,
                "Test Chat Persona",
                "You are a helpful test assistant. Keep responses brief.",
            )
            .await?;
            flows::chat_round_trip(&session, &config, report).await?;
        }
        Ok(())
    }
    .await;

    flows::collect_console_errors(&session, &config, report).await;
    manager.teardown(session).await?;
    outcome
}

async fn console(manager: &mut SessionManager, report: &mut RunReport) -> HarnessResult<()> {
    let config = manager.config().clone();
    let session = manager.create_session("console").await?;

    let outcome = flows::onboard_guest(&session, &config, report).await.map(|_| ());

    flows::collect_console_errors(&session, &config, report).await;
    manager.teardown(session).await?;
    outcome
}
