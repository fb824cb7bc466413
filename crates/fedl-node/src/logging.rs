use crate::config::LoggingConfig;
use std::fs::{File, OpenOptions};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Level requested on the command line wins over the configured one
pub fn effective_level(config: &LoggingConfig, cli_verbose: u8) -> &str {
    match cli_verbose {
        0 => &config.level,
        1 => "debug",
        _ => "trace",
    }
}

/// `RUST_LOG` when set, otherwise `fedl=<level>` plus the configured module filters
pub fn build_filter(config: &LoggingConfig, cli_verbose: u8) -> anyhow::Result<EnvFilter> {
    let level = effective_level(config, cli_verbose);
    let mut filter = EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("fedl={}", level)),
    );
    for (module, level) in &config.module_filters {
        filter = filter.add_directive(format!("{}={}", module, level).parse()?);
    }
    Ok(filter)
}

fn open_log_file(config: &LoggingConfig) -> anyhow::Result<Option<File>> {
    let Some(path) = &config.file_output else {
        return Ok(None);
    };
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Some(file))
}

/// Initialize the logging system based on configuration
pub fn init_logging(config: &LoggingConfig, cli_verbose: u8) -> anyhow::Result<()> {
    let filter = build_filter(config, cli_verbose)?;
    let file = open_log_file(config)?;
    let subscriber = tracing_subscriber::registry().with(filter);

    match config.format.as_str() {
        "json" => {
            let json_layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_line_number(true)
                .with_file(true)
                .with_writer(std::io::stderr);
            let file_layer = file.map(|f| fmt::layer().json().with_writer(Mutex::new(f)).with_ansi(false));
            subscriber.with(json_layer).with(file_layer).init();
        }
        "compact" => {
            let compact_layer = fmt::layer()
                .compact()
                .with_target(false)
                .with_thread_ids(false)
                .with_writer(std::io::stderr);
            let file_layer =
                file.map(|f| fmt::layer().compact().with_writer(Mutex::new(f)).with_ansi(false));
            subscriber.with(compact_layer).with(file_layer).init();
        }
        _ => {
            // Source locations only when debugging
            let show_location = matches!(effective_level(config, cli_verbose), "debug" | "trace");
            let pretty_layer = fmt::layer()
                .with_target(show_location)
                .with_line_number(show_location)
                .with_file(show_location)
                .with_writer(std::io::stderr);
            let file_layer = file.map(|f| fmt::layer().with_writer(Mutex::new(f)).with_ansi(false));
            subscriber.with(pretty_layer).with(file_layer).init();
        }
    }

    Ok(())
}
