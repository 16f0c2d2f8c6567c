use std::path::PathBuf;
use std::sync::OnceLock;

static EXE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the directory containing the executable.
pub fn get_exe_dir() -> &'static PathBuf {
    EXE_DIR.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// Returns the logs directory: `<exe_dir>/logs/`
pub fn get_logs_dir() -> PathBuf {
    get_exe_dir().join("logs")
}

/// Returns the shot export directory: `<exe_dir>/exports/`
pub fn get_exports_dir() -> PathBuf {
    get_exe_dir().join("exports")
}

/// Returns the layout directory: `<exe_dir>/layouts/`
pub fn get_layouts_dir() -> PathBuf {
    get_exe_dir().join("layouts")
}

/// Returns the directory diagnostic crops are written to: `<exe_dir>/debug/`
pub fn get_debug_dir() -> PathBuf {
    get_exe_dir().join("debug")
}

/// Returns the per-user tesseract directory used when none is configured.
pub fn get_tesseract_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("blm-recorder")
        .join("tesseract")
}

/// Ensures all output directories exist. Call at startup.
pub fn ensure_directories() -> std::io::Result<()> {
    std::fs::create_dir_all(get_logs_dir())?;
    std::fs::create_dir_all(get_exports_dir())?;
    Ok(())
}
