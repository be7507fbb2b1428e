use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use trackprint::engine::{DuplicatePolicy, Recognizer};
use trackprint::matcher::Match;
use trackprint::scanner::Overrides;

#[derive(Parser)]
#[command(name = "trackprint", version, about = "Identify recorded audio against a fingerprinted library")]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fingerprint audio files and add them to the library
    Save {
        /// Files or directories (defaults to config file music_dirs)
        paths: Vec<PathBuf>,

        /// Title to use instead of tags / file name (single file only)
        #[arg(long)]
        title: Option<String>,

        /// Artist to use instead of tags / file name (single file only)
        #[arg(long)]
        artist: Option<String>,

        /// External reference stored with the track (single file only)
        #[arg(long)]
        external_ref: Option<String>,

        /// Number of parallel workers (0 = auto-detect from config)
        #[arg(short = 'j', long, default_value = "0")]
        jobs: usize,

        /// Replace tracks that are already indexed under the same title and artist
        #[arg(long)]
        force: bool,
    },

    /// Identify an audio clip
    Find {
        /// WAV or FLAC file to identify
        file: PathBuf,

        /// Print matches as JSON
        #[arg(long)]
        json: bool,

        /// Number of matches to show (defaults to matcher.max_results)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Remove a track and its fingerprints
    Delete {
        /// Track id (see `list`)
        id: i64,
    },

    /// List indexed tracks
    List,

    /// Remove every track and fingerprint from the library
    Erase,

    /// Show library statistics
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = trackprint::config::AppConfig::load();

    // Resolve database path: CLI > config > XDG default
    let db_path = cli
        .db_path
        .or(config.db_path.clone())
        .unwrap_or_else(trackprint::config::default_db_path);
    log::info!("Database: {}", db_path.display());

    let db = trackprint::db::Database::open(&db_path).context("Failed to open database")?;
    let limit = match &cli.command {
        Commands::Find { limit, .. } => *limit,
        _ => None,
    };
    let recognizer = Recognizer::with_config(db, config.matcher.with_limit(limit), &config.cache);

    match cli.command {
        Commands::Save {
            paths,
            title,
            artist,
            external_ref,
            jobs,
            force,
        } => {
            // Resolve paths: CLI args > config music_dirs
            let paths = if !paths.is_empty() {
                paths
            } else if !config.music_dirs.is_empty() {
                config.music_dirs.clone()
            } else {
                anyhow::bail!("No files to save. Pass paths as arguments or set music_dirs in config.");
            };

            let overrides = Overrides {
                title,
                artist,
                external_ref,
            };
            let has_overrides = overrides.title.is_some()
                || overrides.artist.is_some()
                || overrides.external_ref.is_some();

            let scan = trackprint::scanner::scan(&paths, &overrides);
            if has_overrides && scan.jobs.len() + scan.rejected.len() > 1 {
                anyhow::bail!("--title, --artist and --external-ref apply to a single file only");
            }
            for rejected in &scan.rejected {
                println!("Skipping {}: {}", rejected.path.display(), rejected.reason);
            }

            let workers = if jobs > 0 { jobs } else { config.resolve_workers() };
            let policy = if force {
                DuplicatePolicy::Overwrite
            } else {
                DuplicatePolicy::Reject
            };
            let result = trackprint::batch::index_files(&recognizer, &scan.jobs, workers, policy)
                .context("Indexing failed")?;

            for failure in &result.failures {
                println!(
                    "Failed: \"{}\" by {} ({}): {}",
                    failure.title,
                    failure.artist,
                    failure.path.display(),
                    failure.reason
                );
            }
            println!(
                "Save complete: {} indexed, {} skipped, {} failed, {} fingerprints",
                result.indexed,
                result.skipped + scan.rejected.len() as u64,
                result.failed,
                result.fingerprints
            );
        }

        Commands::Find { file, json, .. } => {
            let audio = trackprint::decode::load_audio(&file)
                .with_context(|| format!("Failed to decode {}", file.display()))?;
            let outcome = recognizer
                .search(&audio.samples, audio.sample_rate, audio.duration_secs)
                .context("Search failed")?;
            let matches: Vec<&Match> = outcome.matches.iter().collect();

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&matches).context("Failed to encode matches")?
                );
                return Ok(());
            }

            if matches.is_empty() {
                println!("No match found.");
                println!("\nSearch took: {:?}", outcome.elapsed);
                return Ok(());
            }

            println!("Matches:");
            for m in &matches {
                println!(
                    "  - {} by {}, score: {:.2}, at {}{}",
                    m.title,
                    m.artist,
                    m.score,
                    format_ms(m.timestamp),
                    if m.is_confident() { "" } else { " (low confidence)" }
                );
            }
            println!(
                "\nSearch took: {:?}{}",
                outcome.elapsed,
                if outcome.cached { " (cached)" } else { "" }
            );

            let top = matches[0];
            if top.is_confident() {
                println!("\nFinal prediction: {} by {}, score: {:.2}", top.title, top.artist, top.score);
                if !top.external_ref.is_empty() {
                    println!("Reference: {}", top.external_ref);
                }
            } else {
                println!("\nNo confident match.");
            }
        }

        Commands::Delete { id } => {
            let track = recognizer
                .index()
                .track_by_id(id)
                .context("Failed to look up track")?;
            let Some(track) = track else {
                anyhow::bail!("No track with id {id}");
            };
            recognizer.delete_track(id).context("Delete failed")?;
            println!("Deleted \"{}\" by {} (id {})", track.title, track.artist, id);
        }

        Commands::List => {
            let tracks = recognizer.index().list_tracks().context("Failed to list tracks")?;
            if tracks.is_empty() {
                println!("Library is empty.");
                return Ok(());
            }
            println!("{:>6}  {:<30} {:<24} {:>7} {:>8}", "Id", "Title", "Artist", "Length", "Prints");
            println!("{}", "-".repeat(80));
            for t in &tracks {
                let length = t
                    .track
                    .duration_secs
                    .map(|s| format_ms((s * 1000.0) as u32))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:>6}  {:<30} {:<24} {:>7} {:>8}",
                    t.track.id,
                    truncate(&t.track.title, 30),
                    truncate(&t.track.artist, 24),
                    length,
                    t.fingerprints
                );
            }
        }

        Commands::Erase => {
            recognizer.index().erase().context("Erase failed")?;
            recognizer.invalidate_cache();
            println!("Erase complete");
        }

        Commands::Stats => {
            let stats = recognizer.index().stats().context("Failed to get stats")?;
            println!("Library Statistics");
            println!("==================");
            println!("Total tracks:        {}", stats.total_tracks);
            println!("Total fingerprints:  {}", stats.total_fingerprints);
            println!("Distinct addresses:  {}", stats.distinct_addresses);
            println!("Prints per track:    {:.0}", stats.fingerprints_per_track());
            println!("Tracks with hash:    {}", stats.tracks_with_hash);
        }
    }

    Ok(())
}

/// `m:ss` for a millisecond offset.
fn format_ms(ms: u32) -> String {
    let secs = ms / 1000;
    format!("{}:{:02}", secs / 60, secs % 60)
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let cut: String = s.chars().take(width - 3).collect();
        format!("{cut}...")
    } else {
        s.to_string()
    }
}
