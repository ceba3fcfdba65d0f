mod error;
mod firestore;
mod github;
mod model;
mod pipeline;
mod settings;
mod sources;

use std::future::Future;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use firestore::Firestore;
use github::GitHubClient;
use model::Category;
use pipeline::{Driver, Outcome};
use settings::Settings;

#[derive(Parser)]
#[command(
    name = "air_data_sync",
    about = "Publish airport and airline reference data as static JSON"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch both sources, publish changed files and record their URLs
    Run {
        /// Process a single category
        #[arg(long, value_enum)]
        only: Option<Category>,
        /// Compare against the published files without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Continue with the next category when one fails
        #[arg(long)]
        keep_going: bool,
    },
    /// Fetch and normalize one category and write the JSON locally
    Dump {
        #[arg(value_enum)]
        category: Category,
        /// Output file (default: stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let result = match cli.command {
        Commands::Run {
            only,
            dry_run,
            keep_going,
        } => {
            let categories = match only {
                Some(c) => vec![c],
                None => Category::ALL.to_vec(),
            };
            run(&settings, &categories, dry_run, keep_going).await
        }
        Commands::Dump { category, out } => dump(&settings, category, out).await,
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn run(
    settings: &Settings,
    categories: &[Category],
    dry_run: bool,
    keep_going: bool,
) -> anyhow::Result<()> {
    println!("Starting update for {}", labels(categories));

    let (owner, repo) = settings.repository()?;
    let github = GitHubClient::new(&settings.github_api_url, owner, repo, settings.github_token()?)?;
    let firestore = if dry_run {
        None
    } else {
        Some(Firestore::connect(settings.service_account_json()?, &settings.config_collection).await?)
    };
    let branch = settings.branch();
    info!("Target {}/{} on branch {}", owner, repo, branch);

    let http = reqwest::Client::new();
    let driver = Driver::new(&github, firestore.as_ref(), &branch);
    let (http, driver) = (&http, &driver);

    sync_all(categories, keep_going, move |category| {
        sync_category(http, driver, settings, category)
    })
    .await?;
    println!("\nAll updates completed successfully.");
    Ok(())
}

/// Run `sync` for each category in order. Fail-fast unless `keep_going`, in
/// which case every category is attempted and the failures are reported
/// together at the end.
async fn sync_all<F, Fut>(categories: &[Category], keep_going: bool, mut sync: F) -> anyhow::Result<()>
where
    F: FnMut(Category) -> Fut,
    Fut: Future<Output = anyhow::Result<Outcome>>,
{
    let mut failed = Vec::new();
    for &category in categories {
        println!("\nProcessing {}...", category.label());
        match sync(category).await {
            Ok(outcome) => report(category, &outcome),
            Err(e) if keep_going => {
                error!("{} failed: {:#}", category.label(), e);
                failed.push(category);
            }
            Err(e) => return Err(e),
        }
    }

    if !failed.is_empty() {
        anyhow::bail!("update failed for {}", labels(&failed));
    }
    Ok(())
}

async fn sync_category(
    http: &reqwest::Client,
    driver: &Driver<'_, GitHubClient, Firestore>,
    settings: &Settings,
    category: Category,
) -> anyhow::Result<Outcome> {
    let label = category.label().to_lowercase();
    let rendered = sources::render(http, category, settings)
        .await
        .with_context(|| format!("fetching {} data", label))?;
    driver
        .sync(category, &rendered)
        .await
        .with_context(|| format!("publishing {} data", label))
}

fn report(category: Category, outcome: &Outcome) {
    match outcome {
        Outcome::Unchanged => println!("No changes in {} data.", category.label()),
        Outcome::Published { url } => println!("{} data published: {}", category.label(), url),
        Outcome::Pending => println!("{} data changed (dry run, not published).", category.label()),
    }
}

async fn dump(settings: &Settings, category: Category, out: Option<PathBuf>) -> anyhow::Result<()> {
    let http = reqwest::Client::new();
    let rendered = sources::render(&http, category, settings).await?;
    match out {
        Some(path) => {
            std::fs::write(&path, &rendered)
                .with_context(|| format!("Failed to write {:?}", path))?;
            println!("Wrote {} data to {:?}", category.label(), path);
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

fn labels(categories: &[Category]) -> String {
    categories
        .iter()
        .map(|c| c.label().to_lowercase())
        .collect::<Vec<_>>()
        .join(" & ")
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
