pub mod checkpoint;
pub mod date;
pub mod error;
pub mod geocode;
pub mod location;
pub mod logging;
pub mod media;
pub mod metadata;
pub mod scan;
pub mod writer;

use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

pub use checkpoint::{CancellationToken, RunState, STATE_FILENAME};
pub use error::{Error, Result};
pub use geocode::{
    Address, AddressResolver, CachePersistence, GeocodeError, NominatimGeocoder, ReverseGeocoder,
};
pub use media::{MediaKind, MediaRecord};
pub use metadata::{MetadataExtractor, MetadataSource};
pub use writer::{Placement, PlannedCopies};

/// Default address cache file, relative to the working directory
pub const DEFAULT_CACHE_FILENAME: &str = "coordinates.bin";

fn default_cache_file() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_FILENAME)
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_geocoder_url() -> String {
    geocode::nominatim::DEFAULT_URL.to_string()
}

fn default_user_agent() -> String {
    geocode::nominatim::DEFAULT_USER_AGENT.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOptions {
    /// Directory tree to sort
    pub source: PathBuf,
    /// Base of the sorted tree
    pub output: PathBuf,
    /// Plan destinations without creating directories or copying
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_cache_file")]
    pub cache_file: PathBuf,
    /// Run state file, `<output>/.fotosort-state.bin` when unset
    #[serde(default)]
    pub state_file: Option<PathBuf>,
    #[serde(default)]
    pub cache_persistence: CachePersistence,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
    #[serde(default = "default_geocoder_url")]
    pub geocoder_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl ProcessOptions {
    pub fn new(source: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            output: output.into(),
            dry_run: false,
            cache_file: default_cache_file(),
            state_file: None,
            cache_persistence: CachePersistence::default(),
            ffprobe: default_ffprobe(),
            geocoder_url: default_geocoder_url(),
            user_agent: default_user_agent(),
        }
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| self.output.join(STATE_FILENAME))
    }
}

/// Control options for process execution (resume, cancellation).
#[derive(Debug, Clone, Default)]
pub struct ProcessControl {
    /// Whether to resume from a matching run state.
    pub resume: bool,
    /// Cancellation token checked between files.
    pub cancel_token: Option<CancellationToken>,
}

impl ProcessControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }
}

/// What happened to a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Copied { dest: PathBuf, bytes: u64 },
    /// Destination chosen in dry-run mode
    Planned { dest: PathBuf },
    Duplicate { existing: PathBuf },
    Unsupported,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResult {
    /// Files found in the source tree
    pub files_seen: u64,
    /// Files already handled by the resumed run
    pub files_skipped: u64,
    /// Files copied, or planned in dry-run mode
    pub files_copied: u64,
    pub unsupported: u64,
    /// Copied files that went to the unknown-date directory
    pub undated: u64,
    /// Duplicates over the whole run, including resumed parts
    pub duplicates: u64,
    /// Bytes of all processed files, including resumed parts
    pub bytes: u64,
}

/// Type alias for progress callback: (stage, current, total, message)
pub type ProgressCallback = dyn Fn(&str, u64, u64, &str) + Send + Sync;

/// Throttled progress reporter: emits at most every 200ms, and always on completion.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback,
    last_emit: Cell<Option<Instant>>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback) -> Self {
        Self {
            inner,
            last_emit: Cell::new(None),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = current + 1 >= total;
        if !is_done {
            if let Some(last) = self.last_emit.get() {
                if last.elapsed() < Duration::from_millis(200) {
                    return;
                }
            }
            self.last_emit.set(Some(Instant::now()));
        }
        (self.inner)(stage, current, total, message);
    }
}

/// Sort the source tree with progress reporting.
pub fn process(options: &ProcessOptions, progress_callback: &ProgressCallback) -> Result<ProcessResult> {
    process_with_control(options, &ProcessControl::default(), progress_callback)
}

/// Sort the source tree using `ffprobe`/EXIF extraction and Nominatim.
pub fn process_with_control(
    options: &ProcessOptions,
    control: &ProcessControl,
    progress_callback: &ProgressCallback,
) -> Result<ProcessResult> {
    let geocoder = NominatimGeocoder::new(&options.geocoder_url, &options.user_agent)?;
    let mut resolver =
        AddressResolver::open(&options.cache_file, geocoder, options.cache_persistence)?;
    let extractor = MetadataExtractor::new(&options.ffprobe);
    run_batch(options, control, &extractor, &mut resolver, progress_callback)
}

/// Classify, resolve, plan and copy (or plan, in dry-run mode) one file.
///
/// Conditions the batch survives come back as an [`Outcome`]; an `Err` is
/// fatal to the batch. In dry-run mode planned destinations are recorded in
/// `planned` so later files in the same batch see them as taken.
pub fn process_file<M, G>(
    path: &Path,
    options: &ProcessOptions,
    source: &M,
    resolver: &mut AddressResolver<G>,
    planned: &mut PlannedCopies,
) -> Result<(MediaRecord, Outcome)>
where
    M: MetadataSource + ?Sized,
    G: ReverseGeocoder,
{
    let mut record = MediaRecord::new(path).map_err(|e| Error::io(path, e))?;
    if !record.is_supported() {
        log::warn!("{} ignore: unsupported media", path.display());
        return Ok((record, Outcome::Unsupported));
    }

    record.resolve(source, resolver)?;

    let placement = writer::plan_destination(
        &record.path,
        &record.file_name,
        record.date,
        record.location.as_deref(),
        &options.output,
        planned,
    )
    .map_err(|e| Error::io(path, e))?;

    let outcome = match placement {
        Placement::Duplicate(existing) => {
            log::warn!(
                "{}: A file with the same name and content already exists ({}).",
                existing.display(),
                path.display()
            );
            Outcome::Duplicate { existing }
        }
        Placement::Fresh(dest) if options.dry_run => {
            log::info!(" -> {} (dry run)", dest.display());
            planned.insert(dest.clone(), record.path.clone());
            Outcome::Planned { dest }
        }
        Placement::Fresh(dest) => {
            let bytes = writer::copy_to(&record.path, &dest).map_err(|e| Error::io(&dest, e))?;
            log::info!(" -> {}", dest.display());
            Outcome::Copied { dest, bytes }
        }
    };
    Ok((record, outcome))
}

/// Run a batch over `options.source` with the given metadata source and
/// address resolver.
///
/// Files are handled one at a time. On cancellation or a fatal error the run
/// state is saved (except in dry-run mode) so a later run can resume; on
/// completion it is deleted.
pub fn run_batch<M, G>(
    options: &ProcessOptions,
    control: &ProcessControl,
    source: &M,
    resolver: &mut AddressResolver<G>,
    progress_callback: &ProgressCallback,
) -> Result<ProcessResult>
where
    M: MetadataSource + ?Sized,
    G: ReverseGeocoder,
{
    let tp = ThrottledProgress::new(progress_callback);
    let state_path = options.state_path();
    let source_root = checkpoint::normalize_root(&options.source);
    let output_root = checkpoint::normalize_root(&options.output);

    let mut state = load_run_state(options, control, &state_path)?;
    let files = scan::scan_media(&source_root, Some(&output_root))?;
    let total = files.len() as u64;
    let mut planned = PlannedCopies::new();
    let mut result = ProcessResult {
        files_seen: total,
        ..ProcessResult::default()
    };

    for (i, path) in files.iter().enumerate() {
        if let Some(ref token) = control.cancel_token {
            if let Err(e) = token.check() {
                log::warn!("Interrupted after {} of {} files", i, total);
                return Err(abort(options, &state, &state_path, resolver, e));
            }
        }

        if state.is_processed(path) {
            result.files_skipped += 1;
            continue;
        }
        tp.report("sort", i as u64, total, &path.display().to_string());

        let processed = process_file(path, options, source, resolver, &mut planned);
        let (record, outcome) = match processed {
            Ok(done) => done,
            Err(e) => {
                log::error!("{}: {}", path.display(), e);
                return Err(abort(options, &state, &state_path, resolver, e));
            }
        };

        match outcome {
            Outcome::Copied { .. } | Outcome::Planned { .. } => {
                result.files_copied += 1;
                if record.date.is_none() {
                    result.undated += 1;
                }
            }
            Outcome::Duplicate { .. } => state.mark_duplicate(),
            Outcome::Unsupported => result.unsupported += 1,
        }
        state.mark_processed(path, record.size);
    }

    resolver.flush()?;
    if !options.dry_run {
        RunState::delete(&state_path)?;
    }

    result.duplicates = state.duplicates;
    result.bytes = state.bytes;
    Ok(result)
}

fn load_run_state(
    options: &ProcessOptions,
    control: &ProcessControl,
    state_path: &Path,
) -> Result<RunState> {
    if control.resume {
        match RunState::load(state_path)? {
            Some(existing) if existing.matches(&options.source) => {
                log::info!(
                    "Resuming: {} files already processed",
                    existing.processed.len()
                );
                return Ok(existing);
            }
            Some(existing) => log::info!(
                "Run state belongs to {}, starting fresh",
                existing.source_root.display()
            ),
            None => {}
        }
    }
    Ok(RunState::new(&options.source))
}

/// Persist what is needed to resume, then hand back the error that stopped
/// the batch.
fn abort<G: ReverseGeocoder>(
    options: &ProcessOptions,
    state: &RunState,
    state_path: &Path,
    resolver: &mut AddressResolver<G>,
    error: Error,
) -> Error {
    if let Err(e) = resolver.flush() {
        log::error!("Could not write address cache: {}", e);
    }
    if !options.dry_run {
        match state.save(state_path) {
            Ok(()) => log::info!("Run state saved to {}", state_path.display()),
            Err(e) => log::error!("Could not save run state: {}", e),
        }
    }
    error
}
