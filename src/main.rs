use clap::Parser;
use itertools::Itertools;
use prospect_crawler::image::{HttpImageSource, ImageResolver};
use prospect_crawler::roster::LISTED_POSITIONS;
use prospect_crawler::{
    CrawlerError, Prospect, ProspectAggregator, ProspectStore, RosterDiscovery, RunReport,
    ScraperConfig,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_error::ErrorLayer;
use tracing_subscriber::prelude::*;

/// Scrape draft prospect profiles into JSON.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON array, JSON object of position to identifiers, or one identifier per line
    #[arg(
        short,
        long,
        env = "PROSPECT_INPUT",
        required_unless_present_any = ["page", "discover"]
    )]
    input: Option<PathBuf>,

    /// Parse a saved profile page instead of fetching; the file stem is the identifier (repeatable)
    #[arg(long, conflicts_with = "discover")]
    page: Vec<PathBuf>,

    /// Collect profile links for a draft year into prospect_urls.json and exit
    #[arg(long, value_name = "YEAR")]
    discover: Option<u16>,

    #[arg(short, long, env = "PROSPECT_OUTPUT", default_value = "output")]
    output_directory: PathBuf,

    /// Only take these positions from a position-keyed input, or discover only these (repeatable)
    #[arg(short, long)]
    position: Vec<String>,

    /// JSON configuration file
    #[arg(short, long, env = "PROSPECT_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "PROSPECT_BASE_URL")]
    base_url: Option<String>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Do not wait between page loads
    #[arg(long)]
    no_pacing: bool,

    #[arg(long)]
    max_attempts: Option<u32>,

    #[arg(long)]
    skip_images: bool,

    /// Remember completed identifiers across runs
    #[arg(long, env = "PROSPECT_DB")]
    db: Option<PathBuf>,
}

fn read_identifiers(raw: &str, positions: &[String]) -> Vec<String> {
    let ids: Vec<String> = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Ok(Value::Object(groups)) => groups
            .into_iter()
            .filter(|(position, _)| {
                positions.is_empty() || positions.iter().any(|p| p.eq_ignore_ascii_case(position))
            })
            .flat_map(|(_, items)| match items {
                Value::Array(items) => items,
                _ => vec![],
            })
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Ok(Value::String(id)) => vec![id],
        _ => raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect(),
    };

    ids.into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unique()
        .collect()
}

fn load_config(args: &Args) -> Result<ScraperConfig, CrawlerError> {
    let mut config = match &args.config {
        Some(path) => ScraperConfig::from_file(path)?,
        None => ScraperConfig::default(),
    };
    if let Some(base_url) = &args.base_url {
        config.base_url = base_url.clone();
    }
    if args.headed {
        config.session.headless = false;
    }
    if args.no_pacing {
        config.session.pacing.enabled = false;
    }
    if let Some(max_attempts) = args.max_attempts {
        config.session.retry.max_attempts = max_attempts.max(1);
    }
    if args.skip_images {
        config.images.enabled = false;
    }
    config.images.storage_dir = args.output_directory.join("player_photos");
    Ok(config)
}

/// Keyed by display name; a repeated name gets its identifier appended.
fn by_name(prospects: &[Prospect]) -> BTreeMap<String, &Prospect> {
    let mut out = BTreeMap::new();
    for prospect in prospects {
        let key = if out.contains_key(&prospect.name) {
            format!("{} ({})", prospect.name, prospect.identifier)
        } else {
            prospect.name.clone()
        };
        out.insert(key, prospect);
    }
    out
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), CrawlerError> {
    tokio::fs::write(path, serde_json::to_string_pretty(value)?).await?;
    info!("Wrote {}", path.display());
    Ok(())
}

#[cfg(feature = "browser")]
fn backend() -> Result<prospect_crawler::browser::ChromiumBackend, Box<dyn std::error::Error>> {
    Ok(prospect_crawler::browser::ChromiumBackend::new())
}

#[cfg(not(feature = "browser"))]
fn backend() -> Result<NoBrowser, Box<dyn std::error::Error>> {
    Err("built without the `browser` feature".into())
}

#[cfg(not(feature = "browser"))]
enum NoBrowser {}

#[cfg(not(feature = "browser"))]
#[async_trait::async_trait]
impl prospect_crawler::BrowserBackend for NoBrowser {
    async fn launch(
        &mut self,
        _: &prospect_crawler::SessionConfig,
    ) -> Result<(), prospect_crawler::BrowserError> {
        match *self {}
    }

    async fn load(
        &mut self,
        _: &str,
        _: &prospect_crawler::SessionConfig,
    ) -> Result<prospect_crawler::RenderedPage, prospect_crawler::BrowserError> {
        match *self {}
    }

    async fn shutdown(&mut self) -> Result<(), prospect_crawler::BrowserError> {
        match *self {}
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| {
                "debug,html5ever=error,selectors=error,hyper=warn,reqwest=info,sqlx=warn,chromiumoxide=warn".into()
            }),
        )
        .with(ErrorLayer::default())
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    tokio::fs::create_dir_all(&args.output_directory).await?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing the current page");
            on_signal.cancel();
        }
    });

    if let Some(year) = args.discover {
        let positions: Vec<String> = if args.position.is_empty() {
            LISTED_POSITIONS.iter().map(|p| p.to_string()).collect()
        } else {
            args.position.iter().map(|p| p.to_uppercase()).collect()
        };
        let discovery = RosterDiscovery::new(&config.base_url, year)?;
        let found = discovery
            .discover(backend()?, config.session.clone(), &positions, &cancel)
            .await?;
        write_json(&args.output_directory.join("prospect_urls.json"), &found).await?;
        println!(
            "Discovered {} profile(s) over {} position(s)",
            found.values().map(Vec::len).sum::<usize>(),
            found.len()
        );
        return Ok(());
    }

    let store = match &args.db {
        Some(path) => Some(ProspectStore::open(path).await?),
        None => None,
    };
    let images = if config.images.enabled {
        let source = HttpImageSource::new(config.session.user_agent())?;
        Some(ImageResolver::new(source, &config.images))
    } else {
        None
    };
    let aggregator = ProspectAggregator::new(config, images);

    let report = if args.page.is_empty() {
        let mut identifiers = match &args.input {
            Some(input) => read_identifiers(&tokio::fs::read_to_string(input).await?, &args.position),
            None => vec![],
        };
        info!("Loaded {} identifier(s)", identifiers.len());
        if let Some(store) = &store {
            let completed = store.completed().await?;
            let before = identifiers.len();
            identifiers.retain(|id| !completed.contains(id));
            if before != identifiers.len() {
                info!("Skipping {} already completed", before - identifiers.len());
            }
        }
        aggregator.process(backend()?, &identifiers, &cancel).await
    } else {
        aggregator.process_saved(&args.page, &cancel).await
    };

    finish(&args, &report, store.as_ref()).await?;
    println!("{}", report);
    Ok(())
}

async fn finish(
    args: &Args,
    report: &RunReport,
    store: Option<&ProspectStore>,
) -> Result<(), CrawlerError> {
    write_json(
        &args.output_directory.join("prospects.json"),
        &by_name(&report.prospects),
    )
    .await?;
    write_json(&args.output_directory.join("errors.json"), &report.errors).await?;
    if let Some(store) = store {
        store.record(report).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn identifiers_come_from_any_input_shape() {
        let array = r#"["Dante-Moore-QB-UCLA", " /Player/Arch-Manning-QB-Texas ", "Dante-Moore-QB-UCLA"]"#;
        assert_eq!(
            read_identifiers(array, &[]),
            vec!["Dante-Moore-QB-UCLA", "/Player/Arch-Manning-QB-Texas"]
        );

        let lines = "# 2026 class\nDante-Moore-QB-UCLA\n\nhttps://www.nfldraftbuzz.com/Player/Arch-Manning-QB-Texas\n";
        assert_eq!(
            read_identifiers(lines, &[]),
            vec![
                "Dante-Moore-QB-UCLA",
                "https://www.nfldraftbuzz.com/Player/Arch-Manning-QB-Texas"
            ]
        );
    }

    #[test]
    fn discovered_listings_read_back_as_input() {
        let discovered = r#"{"QB": ["/Player/Dante-Moore-QB-UCLA"], "WR": ["/Player/Jeremiah-Smith-WR-OhioState"]}"#;
        assert_eq!(
            read_identifiers(discovered, &["qb".to_string()]),
            vec!["/Player/Dante-Moore-QB-UCLA"]
        );
    }

    #[test]
    fn input_is_optional_only_for_saved_pages_and_discovery() {
        assert!(Args::try_parse_from(["prospect-crawler"]).is_err());
        assert!(Args::try_parse_from(["prospect-crawler", "--discover", "2026"]).is_ok());
        let args = Args::try_parse_from(["prospect-crawler", "--page", "a.html", "--page", "b.html"])
            .expect("args");
        assert_eq!(args.page.len(), 2);
        assert!(Args::try_parse_from(["prospect-crawler", "--page", "a.html", "--discover", "2026"]).is_err());
    }

    #[test]
    fn grouped_input_is_filtered_by_position() {
        let grouped = r#"{"QB": ["Dante-Moore-QB-UCLA"], "WR": ["Jeremiah-Smith-WR-OhioState"]}"#;
        assert_eq!(read_identifiers(grouped, &[]).len(), 2);
        assert_eq!(
            read_identifiers(grouped, &["wr".to_string()]),
            vec!["Jeremiah-Smith-WR-OhioState"]
        );
    }
}
