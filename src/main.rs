use std::env;

use clap::{Parser, Subcommand};

use vtop_scraper::{
    CaptchaResolver, Config, ConsoleHandler, GeminiRecognizer, Orchestrator, Result, Session,
    VtopError, WebDriverPage, logging,
};

#[derive(Parser)]
#[command(name = "vtop-scraper", about = "Scrapes academic records from the VTOP portal")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape the academic calendar into one combined CSV.
    Calendar,
    /// Scrape attendance data and report a summary.
    Attendance,
    /// Log in and keep the browser open for manual use.
    Login,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    dotenvy::dotenv().ok();

    match run(cli.command).await {
        Ok(()) => tracing::info!("run completed successfully"),
        Err(e) => {
            let (status, code) = match &e {
                VtopError::Configuration(_) => ("configuration error", 2),
                VtopError::LoginExhausted { .. } | VtopError::LoginUnavailable { .. } => {
                    ("login failed", 3)
                }
                VtopError::ExtractionTimeout { .. } => ("extraction failed", 4),
                _ => ("run failed", 1),
            };
            tracing::error!(error = %e, "{status}");
            eprintln!("{status}: {e}");
            std::process::exit(code);
        }
    }
}

async fn run(command: Command) -> Result<()> {
    // Fails on missing configuration before any resource is acquired.
    let config = Config::from_env()?;
    let api_key = env::var("GEMINI_API_KEY")
        .map_err(|_| VtopError::Configuration("GEMINI_API_KEY is not set".to_string()))?;
    config.paths.prepare()?;

    let recognizer = GeminiRecognizer::new(api_key, config.timeouts.recognition);
    let resolver = CaptchaResolver::new(
        Box::new(recognizer),
        None,
        config.paths.challenge_image(),
    );

    tracing::info!(url = %config.webdriver_url, "connecting to WebDriver");
    let mut session = Session::new(Box::new(WebDriverPage::connect(&config.webdriver_url).await?));
    let orchestrator = Orchestrator::new(config, resolver, Box::new(ConsoleHandler));

    match command {
        Command::Calendar => {
            let outcome = orchestrator.run_calendar(&mut session).await?;
            tracing::info!(
                extracted = outcome.periods_extracted,
                total = outcome.periods_total,
                output = %outcome.output.display(),
                "academic calendar saved"
            );
            if !outcome.failed_periods.is_empty() {
                tracing::warn!(periods = ?outcome.failed_periods, "some periods were skipped");
            }
            println!("Academic calendar saved to {}", outcome.output.display());
        }
        Command::Attendance => {
            let outcome = orchestrator.run_attendance(&mut session).await?;
            println!("Attendance data saved to {}", outcome.output.display());
            println!("{}", outcome.summary);
        }
        Command::Login => {
            orchestrator.run_login(&mut session).await?;
            println!("Logged in. Press Enter to close the browser.");
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
            session.close().await?;
        }
    }
    Ok(())
}
