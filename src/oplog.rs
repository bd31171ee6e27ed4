use std::path::Path;

fn level_from_env() -> simplelog::LevelFilter {
    use simplelog::LevelFilter;

    let mut level_string = match std::env::var("SISD_LOG_LEVEL") {
        Err(_) => return LevelFilter::Info,
        Ok(s) => s,
    };

    level_string.make_ascii_lowercase();
    match level_string.as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

/// Attach the append-only operational log to `<workspace>/sis.log`.
///
/// The global logger can only be installed once per process; selecting a
/// second workspace keeps logging into the first file rather than failing
/// the request.
pub fn attach(workspace: &Path) -> anyhow::Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(workspace.join("sis.log"))?;

    let cfg = simplelog::ConfigBuilder::new()
        .set_time_format_rfc3339()
        .build();

    let _ = simplelog::WriteLogger::init(level_from_env(), cfg, file);
    Ok(())
}
