use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;

use fotosort_core::geocode::nominatim::{DEFAULT_URL, DEFAULT_USER_AGENT};
use fotosort_core::{
    CachePersistence, CancellationToken, Error, ProcessControl, ProcessOptions, RunState,
    DEFAULT_CACHE_FILENAME,
};

#[derive(Parser)]
#[command(
    name = "fotosort",
    version,
    about = "Sort photos and videos into YYYY/MM/<place> folders"
)]
struct Cli {
    /// Directory to scan for photos and videos
    source: PathBuf,

    /// Base directory of the sorted tree (created on demand)
    dest: PathBuf,

    /// Only log where files would go
    #[arg(long)]
    dry_run: bool,

    /// Address cache file
    #[arg(long, env = "FOTOSORT_CACHE", default_value = DEFAULT_CACHE_FILENAME)]
    cache: PathBuf,

    /// Run state file (default: <DEST>/.fotosort-state.bin)
    #[arg(long, env = "FOTOSORT_STATE")]
    state: Option<PathBuf>,

    /// Write the address cache only at the end of the run instead of after every lookup
    #[arg(long)]
    batched_cache: bool,

    /// ffprobe binary used to read movie metadata
    #[arg(long, env = "FOTOSORT_FFPROBE", default_value = "ffprobe")]
    ffprobe: PathBuf,

    /// Nominatim server used for reverse geocoding
    #[arg(long, env = "FOTOSORT_GEOCODER_URL", default_value = DEFAULT_URL)]
    geocoder_url: String,

    /// User-Agent sent to the geocoding service
    #[arg(long, env = "FOTOSORT_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    user_agent: String,

    /// Resume an interrupted run without asking
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Ignore an interrupted run without asking
    #[arg(long)]
    fresh: bool,

    /// Log file
    #[arg(long, default_value = "fotosort.log")]
    log_file: PathBuf,

    /// Also print info messages to the console
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let t_total = std::time::Instant::now();

    let console_level = if cli.verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };
    fotosort_core::logging::init_logger(&cli.log_file, console_level)
        .map_err(|e| anyhow::anyhow!("could not set up logging: {}", e))?;

    let options = ProcessOptions {
        source: cli.source,
        output: cli.dest,
        dry_run: cli.dry_run,
        cache_file: cli.cache,
        state_file: cli.state,
        cache_persistence: if cli.batched_cache {
            CachePersistence::Batched
        } else {
            CachePersistence::WriteThrough
        },
        ffprobe: cli.ffprobe,
        geocoder_url: cli.geocoder_url,
        user_agent: cli.user_agent,
    };

    let resume = if cli.resume {
        true
    } else if cli.fresh {
        false
    } else {
        ask_resume(&options)?
    };

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .context("could not install Ctrl-C handler")?;
    let control = ProcessControl::new()
        .with_resume(resume)
        .with_cancel_token(token);

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {wide_bar} {pos}/{len} {wide_msg}")?,
    );
    let callback = {
        let bar = bar.clone();
        move |_stage: &str, current: u64, total: u64, message: &str| {
            bar.set_length(total);
            bar.set_position(current + 1);
            bar.set_message(message.to_string());
        }
    };

    let result = fotosort_core::process_with_control(&options, &control, &callback);
    bar.finish_and_clear();

    match result {
        Ok(result) => {
            eprintln!(
                "Done! {} files, {} copied{}, {} duplicates, {} unsupported, {} without date, {} skipped ({:.2}s)",
                result.files_seen,
                result.files_copied,
                if options.dry_run { " (dry run)" } else { "" },
                result.duplicates,
                result.unsupported,
                result.undated,
                result.files_skipped,
                t_total.elapsed().as_secs_f64()
            );
            Ok(())
        }
        Err(Error::Cancelled) => {
            eprintln!(
                "Interrupted. Progress saved to {}; run again to resume.",
                options.state_path().display()
            );
            std::process::exit(130);
        }
        Err(e) => Err(e).context("sorting stopped"),
    }
}

/// Ask whether to resume when an interrupted run over the same source exists.
fn ask_resume(options: &ProcessOptions) -> anyhow::Result<bool> {
    let Some(state) = RunState::load(&options.state_path())? else {
        return Ok(false);
    };
    if !state.matches(&options.source) {
        return Ok(false);
    }

    eprint!(
        "Found an interrupted run over {} from {} ({} files done). Resume? [y/N] ",
        state.source_root.display(),
        state.timestamp.format("%Y-%m-%d %H:%M"),
        state.processed.len()
    );
    io::stderr().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
