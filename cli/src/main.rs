use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use scraper::config::{DEFAULT_BASE_URL, DEFAULT_USER_AGENT};
use scraper::{snapshot_all, Plan, RunError, Soc, SocConfig};

/// Download Rutgers SOC courses/openSections samples.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    #[arg(long, default_value_t = 2026)]
    year: i32,

    /// 1=Spring, 9=Fall, etc.
    #[arg(long, default_value_t = 1)]
    term: i32,

    /// Comma separated campus codes (NB/NK/CM/ONLINE, etc.)
    #[arg(long, default_value = "NB,NK,CM")]
    campuses: String,

    /// Comma separated endpoints (courses,openSections)
    #[arg(long, default_value = "courses,openSections")]
    endpoints: String,

    #[arg(long, default_value = "data/raw")]
    out_dir: PathBuf,

    #[arg(long, env = "SOC_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    #[arg(long, env = "SOC_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    user_agent: String,

    /// Per-request timeout, covering the whole response body
    #[arg(long, env = "SOC_TIMEOUT_SECS", default_value_t = 60)]
    timeout_secs: u64,
}

impl Cli {
    fn soc_config(&self) -> SocConfig {
        SocConfig::default()
            .with_base_url(self.base_url.as_str())
            .with_user_agent(self.user_agent.as_str())
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let code = run(Cli::parse()).await?;
    Ok(ExitCode::from(code))
}

/// Filesystem failures bubble up as errors; everything else maps to an exit code.
async fn run(cli: Cli) -> Result<u8> {
    let plan = match Plan::from_lists(&cli.campuses, &cli.endpoints) {
        Ok(plan) => plan,
        Err(err) => {
            eprintln!("{err}");
            return Ok(1);
        }
    };

    let soc = Soc::new(cli.soc_config())?;
    log::info!(
        "snapshotting {} campus(es) x {} endpoint(s) from {} into {}",
        plan.campuses.len(),
        plan.endpoints.len(),
        soc.config().base_url,
        cli.out_dir.display()
    );

    match snapshot_all(&soc, &plan, cli.year, cli.term, &cli.out_dir).await {
        Ok(()) => Ok(0),
        Err(err @ RunError::Fetch { .. }) => {
            eprintln!("[ERR] {err}");
            Ok(1)
        }
        Err(err) => Err(err.into()),
    }
}
