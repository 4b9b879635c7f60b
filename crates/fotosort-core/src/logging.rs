use std::path::Path;

use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::filter::threshold::ThresholdFilter;

/// Environment variable overriding the log file level
pub const LOG_ENV: &str = "FOTOSORT_LOG";

/// Initialize logging to `log_file` (rotated at 10MB, 5 archives kept) and
/// to stderr at `console_level`.
pub fn init_logger(
    log_file: &Path,
    console_level: LevelFilter,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Some(parent) = log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file_level = std::env::var(LOG_ENV)
        .ok()
        .and_then(|v| v.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);

    let archived_logs_pattern = format!("{}.{{}}", log_file.display());
    let file_roller = FixedWindowRoller::builder()
        .build(&archived_logs_pattern, 5)
        .map_err(|e| format!("Failed to create log roller: {}", e))?;
    let compound_policy = CompoundPolicy::new(
        Box::new(SizeTrigger::new(10 * 1024 * 1024)),
        Box::new(file_roller),
    );

    let rolling_file = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "[{d(%Y-%m-%d %H:%M:%S)}] {{{M}:{L}}} {l:<8} - {m}{n}",
        )))
        .build(log_file, Box::new(compound_policy))
        .map_err(|e| format!("Failed to create log appender: {}", e))?;

    let console = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("{l:<8} {m}{n}")))
        .build();

    let config = Config::builder()
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(file_level)))
                .build("file", Box::new(rolling_file)),
        )
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(console_level)))
                .build("console", Box::new(console)),
        )
        .build(
            Root::builder()
                .appender("file")
                .appender("console")
                .build(file_level.max(console_level)),
        )
        .map_err(|e| format!("Failed to build log config: {}", e))?;

    log4rs::init_config(config).map_err(|e| format!("Failed to initialize log4rs: {}", e))?;

    log::info!("Logging to file: {}", log_file.display());
    Ok(())
}
