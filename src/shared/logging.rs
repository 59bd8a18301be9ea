use std::path::Path;
use tracing::info;
use tracing_appender::non_blocking;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize service logging: console always, plus a rotating file when the
/// log directory is writable. Filter level comes from RUST_LOG.
pub fn init_service_logging(log_dir: &str, service_name: &str) -> Result<(), anyhow::Error> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let can_write_logs = std::fs::create_dir_all(log_dir)
        .and_then(|_| std::fs::File::create(format!("{log_dir}/.test_write")))
        .map(|_| std::fs::remove_file(format!("{log_dir}/.test_write")))
        .is_ok();

    let (non_blocking_stdout, guard_stdout) = non_blocking(std::io::stdout());
    let console_layer = fmt::layer()
        .with_writer(non_blocking_stdout)
        .with_ansi(true)
        .with_target(false);

    if can_write_logs {
        let _ = rotate_logs_on_startup(log_dir, service_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, format!("{service_name}.log"));
        let (non_blocking_file, guard_file) = non_blocking(file_appender);
        let file_layer = fmt::layer()
            .with_writer(non_blocking_file)
            .with_ansi(false)
            .with_target(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(console_layer)
            .init();

        // Guards must outlive the process for the writers to keep flushing.
        std::mem::forget(guard_file);
        std::mem::forget(guard_stdout);

        info!("Logging initialized - logs will be written to {log_dir}/{service_name}.log");
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        std::mem::forget(guard_stdout);

        info!("Logging initialized - console output only (could not create log directory)");
    }

    Ok(())
}

fn rotate_logs_on_startup(log_dir: &str, service_name: &str) -> Result<(), anyhow::Error> {
    let log_file = format!("{log_dir}/{service_name}.log");
    if Path::new(&log_file).exists() {
        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let backup_file = format!("{log_dir}/{service_name}.{timestamp}.log");
        std::fs::rename(&log_file, &backup_file)?;
        info!("Previous log file backed up to: {backup_file}");
    }
    Ok(())
}
