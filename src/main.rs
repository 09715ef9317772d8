use clap::{ArgAction, Parser, Subcommand};
use dialoguer::{Select, console::Term};
use linkhop::config::{DEFAULT_HOP_BUDGET, DEFAULT_RESOLUTION_TIMEOUT};
use linkhop::{
    Catalog, EpisodeRecord, ExtractorRegistry, HttpFetcher, LinkResolver, LinkhopError,
    LoadedTitle, Payload, ResolverConfig, SearchResult, SinkEvent, Sinks, SiteConfig,
    TitleContent,
};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Browse a movie listing site and resolve its download mirrors
#[derive(Debug, Parser)]
#[command(name = "linkhop", version, about)]
struct Cli {
    /// Base URL of the listing site
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Maximum pages an extractor may follow per candidate
    #[arg(long, global = true, default_value_t = DEFAULT_HOP_BUDGET)]
    hop_budget: usize,

    /// Seconds a single candidate may take before it is abandoned
    #[arg(long, global = true, default_value_t = DEFAULT_RESOLUTION_TIMEOUT.as_secs())]
    timeout: u64,

    /// More log output on stderr (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Search the site
    Search {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },

    /// List one page of a category
    Browse {
        /// Category name or path (see `categories`)
        #[arg(long, default_value = "Home")]
        category: String,

        #[arg(long, default_value_t = 1)]
        page: usize,
    },

    /// Show the available categories
    Categories,

    /// Show a title with its seasons and episodes
    Load {
        url: String,

        #[arg(long)]
        json: bool,
    },

    /// Resolve the download links of a movie or an episode
    Links {
        url: String,

        #[arg(long, requires = "episode")]
        season: Option<usize>,

        #[arg(long, requires = "season")]
        episode: Option<usize>,

        /// Print one JSON object per link
        #[arg(long)]
        json: bool,
    },

    /// Resolve a mirror URL or an HTML fragment directly
    Resolve {
        payload: String,

        #[arg(long)]
        json: bool,
    },
}

fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "warn,linkhop=info",
        1 => "warn,linkhop=debug",
        _ => "warn,linkhop=trace",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // stdout is reserved for results
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_results(results: &[SearchResult]) {
    if results.is_empty() {
        println!("No results found.");
        return;
    }

    for (index, result) in results.iter().enumerate() {
        println!("{:>3}. {}", index + 1, result.title);
        println!("     {}", result.url);
    }
}

fn print_title(title: &LoadedTitle) {
    println!("{} [{}]", title.item.title, title.item.kind);
    println!("  URL: {}", title.item.url);
    if let Some(poster) = &title.item.poster {
        println!("  Poster: {}", poster);
    }

    match &title.content {
        TitleContent::Movie { payload } => {
            println!("  Payload: {:?}", payload);
        }
        TitleContent::Series { seasons } => {
            for season in seasons {
                println!(
                    "\n  Season {}: {} ({} episode(s))",
                    season.number,
                    season.label,
                    season.episodes.len()
                );
                for episode in &season.episodes {
                    println!("    E{:02} {}", episode.episode, episode.name);
                }
            }
        }
    }
}

fn print_event(event: SinkEvent, json: bool) {
    match (event, json) {
        (SinkEvent::MediaLink(link), true) => match serde_json::to_string(&link) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "could not serialize link"),
        },
        (SinkEvent::Subtitle(subtitle), true) => match serde_json::to_string(&subtitle) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "could not serialize subtitle"),
        },
        (SinkEvent::MediaLink(link), false) => {
            let details = match (&link.name, &link.size) {
                (Some(name), Some(size)) => format!(" {name} ({size})"),
                (Some(name), None) => format!(" {name}"),
                _ => String::new(),
            };
            println!("[{}] {}{}", link.quality, link.source, details);
            println!("  {}", link.url);
        }
        (SinkEvent::Subtitle(subtitle), false) => {
            println!("[subtitle] {}", subtitle.language);
            println!("  {}", subtitle.url);
        }
    }
}

/// Picks the episode to resolve, asking interactively when none was given
fn choose_episode(
    title: &LoadedTitle,
    season: Option<usize>,
    episode: Option<usize>,
) -> Result<Payload, LinkhopError> {
    match &title.content {
        TitleContent::Movie { payload } => Ok(payload.clone()),
        TitleContent::Series { seasons } => {
            if let (Some(season), Some(episode)) = (season, episode) {
                return title
                    .episode(season, episode)
                    .map(|record| record.payload.clone())
                    .ok_or_else(|| {
                        LinkhopError::Input(format!(
                            "No episode S{season:02}E{episode:02} in '{}'",
                            title.item.title
                        ))
                    });
            }

            let episodes: Vec<&EpisodeRecord> =
                seasons.iter().flat_map(|s| s.episodes.iter()).collect();
            if episodes.is_empty() {
                return Err(LinkhopError::Input(format!(
                    "'{}' has no episodes",
                    title.item.title
                )));
            }

            let labels: Vec<String> = episodes
                .iter()
                .map(|e| format!("S{:02}E{:02} {}", e.season, e.episode, e.name))
                .collect();
            let choice = Select::new()
                .with_prompt("Episode")
                .items(&labels)
                .default(0)
                .interact_on(&Term::stderr())
                .map_err(|e| LinkhopError::Input(format!("Episode selection failed: {e}")))?;

            Ok(episodes[choice].payload.clone())
        }
    }
}

/// Resolves a payload, streaming results to stdout until every candidate
/// has finished or Ctrl-C is pressed
async fn stream_links(
    resolver: LinkResolver,
    payload: Payload,
    cancel: CancellationToken,
    json: bool,
) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling pending resolutions");
            cancel.cancel();
        }
    });

    let (sinks, mut events) = Sinks::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(event, json);
        }
    });

    let report = resolver.resolve(&payload, &sinks).await;
    drop(sinks);
    if let Err(e) = printer.await {
        warn!(error = %e, "output task failed");
    }

    if !json {
        println!(
            "\nFound {} link(s) and {} subtitle(s) from {} candidate(s).",
            report.links, report.subtitles, report.candidates
        );
    }
}

async fn run(cli: Cli) -> Result<(), LinkhopError> {
    let config = ResolverConfig::default()
        .with_hop_budget(cli.hop_budget)
        .with_resolution_timeout(Duration::from_secs(cli.timeout));
    let site = match cli.base_url {
        Some(base_url) => SiteConfig::default().with_base_url(base_url),
        None => SiteConfig::default(),
    };

    let fetcher = Arc::new(HttpFetcher::new(&config)?);
    let catalog = Catalog::new(fetcher.clone(), site.clone());
    let cancel = CancellationToken::new();
    let resolver = LinkResolver::new(
        Arc::new(ExtractorRegistry::with_default_extractors()),
        fetcher,
        config,
        site.clone(),
    )
    .with_cancellation(cancel.clone());

    match cli.command {
        Command::Search { query } => {
            let results = catalog.search(&query.join(" ")).await?;
            print_results(&results);
        }
        Command::Browse { category, page } => {
            let category = site.category(&category).cloned().ok_or_else(|| {
                LinkhopError::Input(format!("Unknown category '{category}'"))
            })?;
            let results = catalog.browse(&category, page).await?;
            print_results(&results);
        }
        Command::Categories => {
            for category in &site.categories {
                println!("{:<12} {}", category.name, category.path);
            }
        }
        Command::Load { url, json } => {
            let title = catalog.load(&url).await?;
            if json {
                let line = serde_json::to_string_pretty(&title)
                    .map_err(|e| LinkhopError::Input(format!("Could not serialize title: {e}")))?;
                println!("{line}");
            } else {
                print_title(&title);
            }
        }
        Command::Links {
            url,
            season,
            episode,
            json,
        } => {
            let title = catalog.load(&url).await?;
            let payload = choose_episode(&title, season, episode)?;
            stream_links(resolver, payload, cancel, json).await;
        }
        Command::Resolve { payload, json } => {
            let payload = resolver.payload_for(&payload);
            stream_links(resolver, payload, cancel, json).await;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("\nError: {}", e);
        process::exit(1);
    }
}
