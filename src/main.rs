use clap::Parser;
use forkgate::cache::VerificationCache;
use forkgate::config::Config;
use forkgate::github::client::GitHubClient;
use forkgate::github::transport::OctocrabTransport;
use forkgate::github::types::RepoIdentity;
use forkgate::logging;
use forkgate::pagination::PaginationEngine;
use forkgate::progress::{Progress, ProgressCallback};
use forkgate::qualify::ForkQualificationEngine;
use forkgate::rate_limit::RateLimiter;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "forkgate",
    about = "List the forks of a GitHub repository that may carry their own commits"
)]
struct Cli {
    #[arg(help = "Upstream repository as owner/name")]
    repo: String,
    #[arg(long, help = "Verify every fork with commits to get exact ahead counts")]
    exact: bool,
    #[arg(long, help = "Stop after this many pages of forks")]
    max_pages: Option<u32>,
    #[arg(long, short, help = "Path to a config file")]
    config: Option<PathBuf>,
    #[arg(long, short)]
    verbose: bool,
}

fn page_logger() -> ProgressCallback {
    Arc::new(|event: Progress| {
        if let Progress::PageQualified {
            page, total_so_far, ..
        } = event
        {
            tracing::debug!(page, total_so_far, "page qualified");
        }
    })
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    let mut config = Config::load(cli.config);
    config.exact_counts |= cli.exact;
    if cli.max_pages.is_some() {
        config.max_pages = cli.max_pages;
    }
    tracing::debug!(?config, "loaded config");

    let upstream = RepoIdentity::parse(&cli.repo)?;
    let transport = Arc::new(OctocrabTransport::new(
        config.github_token.as_deref(),
        &config.api_base,
    )?);
    let limiter = Arc::new(RateLimiter::new(config.limiter_config()));
    let client =
        GitHubClient::new(transport, limiter).with_transient_policy(config.transient_policy());
    let pagination = PaginationEngine::new(client.clone(), config.pagination_options());
    let engine = ForkQualificationEngine::new(
        client.clone(),
        Arc::new(VerificationCache::new(config.cache_ttl())),
        upstream.clone(),
        config.qualification_options(),
    )
    .with_progress(page_logger());

    let run = engine.qualify_forks(&pagination, None).await;

    for result in run.needing_inspection() {
        println!("{}", serde_json::to_string(result)?);
    }

    let cache = engine.cache().stats();
    tracing::info!(
        upstream = %upstream,
        forks = run.stats.total,
        needing_inspection = run.needing_inspection().count(),
        skipped = run.stats.skipped,
        accepted = run.stats.accepted,
        verified = run.stats.verified,
        verification_failures = run.stats.verification_failures,
        calls_saved = run.stats.calls_saved(),
        savings = %format!("{:.0}%", run.stats.savings_ratio() * 100.0),
        cache_hits = cache.hits,
        remaining_quota = ?client.remaining_quota(),
        "qualification finished"
    );

    if let Some(e) = run.interrupted {
        tracing::error!(next_page = e.checkpoint.next_page, "fork listing did not complete");
        return Err(e.into());
    }
    Ok(())
}
