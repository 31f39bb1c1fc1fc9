use std::{
    env,
    fs::{create_dir_all, File},
    io,
    panic::set_hook,
    path::PathBuf,
    sync::Mutex,
    time::SystemTime,
};

use tracing::{error, level_filters::LevelFilter, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Debug, Clone)]
pub struct LogPaths {
    pub main: PathBuf,
}

#[cfg(not(debug_assertions))]
const FILE_LOG_LEVEL: Level = Level::DEBUG;

#[cfg(debug_assertions)]
const FILE_LOG_LEVEL: Level = Level::TRACE;

/// Log to a fresh file under the temp dir, and to stderr at a level set by
/// `verbosity` unless `RUST_LOG` says otherwise.
pub fn init_logging(verbosity: u8) -> io::Result<LogPaths> {
    let paths = make_log_paths()?;

    let main = paths.main.clone();
    set_hook(Box::new(move |p| {
        error!("{p}");

        eprintln!("An unexpected error occurred! Please report bugs and attach the following file, if it exists:");
        eprintln!(" - {}", main.to_string_lossy());
        eprintln!();
        eprintln!("{p}");
    }));

    let writer = File::create(&paths.main)?;

    let stderr_filter = EnvFilter::builder()
        .with_default_directive(stderr_level(verbosity).into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(Mutex::new(writer))
                .with_ansi(false)
                .with_filter(LevelFilter::from_level(FILE_LOG_LEVEL)),
        )
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .without_time()
                .with_filter(stderr_filter),
        )
        .init();

    Ok(paths)
}

fn stderr_level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn make_log_paths() -> io::Result<LogPaths> {
    let millis = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let dir = env::temp_dir().join("usb-creator/log");
    create_dir_all(&dir)?;

    Ok(LogPaths {
        main: dir.join(format!("{millis}.main.log")),
    })
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(0, LevelFilter::WARN)]
    #[test_case(1, LevelFilter::INFO)]
    #[test_case(2, LevelFilter::DEBUG)]
    #[test_case(9, LevelFilter::TRACE; "saturates")]
    fn verbosity_levels(v: u8, expected: LevelFilter) {
        assert_eq!(stderr_level(v), expected);
    }

    #[test]
    fn log_file_is_under_temp_dir() {
        let paths = make_log_paths().unwrap();
        assert!(paths.main.starts_with(env::temp_dir()));
        assert!(paths.main.to_string_lossy().ends_with(".main.log"));
    }
}
