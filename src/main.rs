use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

mod catalog;
mod config;
mod error;
mod extract;
mod fetch;
mod packer;
mod slug;
mod sources;
mod types;
mod util;

#[cfg(test)]
mod testutil;

use catalog::{CatalogClient, Listing};
use config::Config;
use error::ResolveError;
use sources::{GatedRequest, Resolver, Strategy};
use types::{EpisodePage, ResolvedUrl};

#[derive(Parser, Debug)]
#[command(name = "animex", version, about = "Resolve anime episodes to direct video URLs", long_about = None)]
struct Cli {
    /// Print debug logs to stderr
    #[arg(long, global = true)]
    debug: bool,

    /// Mirror root (overrides ANIMEX_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Request timeout in seconds (overrides ANIMEX_TIMEOUT_SECS)
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Unpack the episode's player script and print its video source
    Source {
        title: String,
        #[arg(short, long)]
        episode: u32,
        #[arg(long)]
        dub: bool,
    },

    /// Resolve a player page URL directly
    Player { url: String },

    /// Fetch the gated download link for a quality and follow its redirects
    #[command(visible_alias = "get")]
    Download {
        title: String,
        #[arg(short, long)]
        episode: u32,
        #[arg(long)]
        dub: bool,
        #[arg(short, long, default_value = "720p")]
        quality: String,
        /// MyAnimeList id; looked up from the title when omitted
        #[arg(long)]
        mal_id: Option<u64>,
    },

    /// Follow redirects and print the final URL
    Follow { url: String },

    /// Decode a packed script from FILE (or stdin)
    Unpack { file: Option<PathBuf> },

    /// Search the catalog
    Search {
        query: String,
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },

    /// Catalog listings
    Top {
        #[arg(long, value_enum, default_value_t = Listing::Popular)]
        kind: Listing,
        #[arg(long)]
        json: bool,
    },
}

fn build_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::from_env()?;
    if let Some(base) = &cli.base_url {
        config.set_base_url(base);
    }
    if let Some(secs) = cli.timeout {
        config.timeout = Duration::from_secs(secs);
    }
    util::debug(format!("mirror: {} ajax: {}", config.base_url, config.ajax_url));
    Ok(config)
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display())),
        None => std::io::read_to_string(std::io::stdin()).context("cannot read stdin"),
    }
}

fn report(err: &ResolveError) {
    match err {
        ResolveError::LinksNotPublished { mal_id, episode } => {
            eprintln!(
                "{} episode {} (MAL {}) has no download links yet",
                "Not published:".yellow().bold(),
                episode,
                mal_id
            );
        }
        _ => {
            let mut line = err.to_string();
            let mut cause = std::error::Error::source(err);
            while let Some(e) = cause {
                line.push_str(&format!(": {}", e));
                cause = e.source();
            }
            eprintln!("{} {}", "Failed:".red().bold(), line);
        }
    }
    if let Some(decoded) = err.decoded_script() {
        if util::is_debug() {
            eprintln!("{}\n{}", "Decoded script:".bold(), decoded);
        } else {
            eprintln!("rerun with --debug to print the decoded script");
        }
    }
}

fn finish(result: Result<ResolvedUrl, ResolveError>) -> Result<()> {
    println!("{}", result?);
    Ok(())
}

async fn download(
    config: Config,
    title: String,
    episode: u32,
    dub: bool,
    quality: String,
    mal_id: Option<u64>,
) -> Result<()> {
    let (mal_id, title) = match mal_id {
        Some(id) => (id, title),
        None => {
            let pb = util::spinner("looking up MAL id");
            let hits = CatalogClient::new(&config)?.search(&title, 1).await;
            pb.finish_and_clear();
            let Some(hit) = hits?.into_iter().next() else {
                bail!("no catalog match for \"{}\", pass --mal-id", title);
            };
            eprintln!("{} {} (MAL {})", "Matched".green(), hit.name.bold(), hit.id);
            (hit.id, hit.name)
        }
    };

    let page = EpisodePage::new(&title, episode, dub);
    util::debug(format!("episode slug: {}", page.slug()));
    let strategy = Strategy::GatedDownload(GatedRequest { mal_id, quality });
    let resolver = Resolver::new(config)?;
    let pb = util::spinner("resolving download link");
    let result = resolver.resolve(&page, &strategy).await;
    pb.finish_and_clear();
    finish(result)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    util::set_debug(cli.debug);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<ResolveError>() {
                Some(resolve_err) if err.chain().count() == 1 => report(resolve_err),
                _ => eprintln!("{} {:#}", "Error:".red().bold(), err),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;

    match cli.command {
        Commands::Source { title, episode, dub } => {
            let page = EpisodePage::new(&title, episode, dub);
            util::debug(format!("episode slug: {}", page.slug()));
            let resolver = Resolver::new(config)?;
            let pb = util::spinner("unpacking player");
            let result = resolver.resolve(&page, &Strategy::PlayerSource).await;
            pb.finish_and_clear();
            finish(result)
        }
        Commands::Player { url } => {
            let resolver = Resolver::new(config)?;
            let pb = util::spinner("unpacking player");
            let result = resolver.resolve_player(&url).await;
            pb.finish_and_clear();
            finish(result)
        }
        Commands::Download {
            title,
            episode,
            dub,
            quality,
            mal_id,
        } => download(config, title, episode, dub, quality, mal_id).await,
        Commands::Follow { url } => {
            let resolver = Resolver::new(config)?;
            let pb = util::spinner("following redirects");
            let result = resolver.follow(&url).await;
            pb.finish_and_clear();
            finish(result)
        }
        Commands::Unpack { file } => {
            let input = read_input(file.as_deref())?;
            println!("{}", packer::unpack(&input)?);
            Ok(())
        }
        Commands::Search { query, limit, json } => {
            let client = CatalogClient::new(&config)?;
            let pb = util::spinner("searching");
            let entries = client.search(&query, limit).await;
            pb.finish_and_clear();
            let entries = entries?;
            if json {
                util::print_json(&entries);
            } else {
                util::print_catalog_table(&entries);
            }
            Ok(())
        }
        Commands::Top { kind, json } => {
            let client = CatalogClient::new(&config)?;
            let pb = util::spinner("loading listing");
            let entries = client.listing(kind).await;
            pb.finish_and_clear();
            let entries = entries?;
            if json {
                util::print_json(&entries);
            } else {
                util::print_catalog_table(&entries);
            }
            Ok(())
        }
    }
}
