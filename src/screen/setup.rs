use anyhow::{anyhow, Result};
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::OcrConfig;
use crate::paths::{get_exe_dir, get_tesseract_dir};

#[cfg(windows)]
const TESSERACT_EXE: &str = "tesseract.exe";
#[cfg(not(windows))]
const TESSERACT_EXE: &str = "tesseract";

#[derive(Clone, Debug)]
pub struct TesseractPaths {
    pub executable: PathBuf,
    /// `None` lets tesseract use its compiled-in data directory.
    pub tessdata: Option<PathBuf>,
}

/// Locates the tesseract executable and its language data.
///
/// Search order: configured path, `<exe_dir>/tesseract/`, the per-user
/// data directory, then the system `PATH`.
pub fn find_tesseract(config: &OcrConfig) -> Result<TesseractPaths> {
    let tessdata = config
        .tessdata_dir
        .clone()
        .or_else(|| find_tessdata_dir(&get_exe_dir().join("tesseract")))
        .or_else(|| find_tessdata_dir(&get_tesseract_dir()));

    if let Some(path) = &config.tesseract_path {
        if path.exists() {
            info!("Using configured tesseract at {}", path.display());
            return Ok(TesseractPaths {
                executable: path.clone(),
                tessdata,
            });
        }
        return Err(anyhow!(
            "Configured tesseract executable not found: {}",
            path.display()
        ));
    }

    let candidates = [
        get_exe_dir().join("tesseract").join(TESSERACT_EXE),
        get_tesseract_dir().join(TESSERACT_EXE),
    ];
    for candidate in candidates {
        debug!("Looking for tesseract at {}", candidate.display());
        if candidate.exists() {
            info!("Tesseract found at: {}", candidate.display());
            return Ok(TesseractPaths {
                executable: candidate,
                tessdata,
            });
        }
    }

    if let Ok(output) = Command::new(TESSERACT_EXE).arg("--version").output() {
        if output.status.success() {
            info!("Found tesseract in system PATH");
            return Ok(TesseractPaths {
                executable: PathBuf::from(TESSERACT_EXE),
                tessdata,
            });
        }
    }

    Err(anyhow!(
        "Could not find tesseract. Install Tesseract-OCR and add it to PATH, \
         set ocr.tesseract_path in config.json, or copy it to {}",
        get_tesseract_dir().display()
    ))
}

fn find_tessdata_dir(tesseract_dir: &Path) -> Option<PathBuf> {
    let tessdata = tesseract_dir.join("tessdata");
    tessdata
        .join("eng.traineddata")
        .exists()
        .then_some(tessdata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_configured_path_must_exist() {
        let config = OcrConfig {
            tesseract_path: Some(PathBuf::from("/definitely/not/here/tesseract")),
            ..OcrConfig::default()
        };
        let err = find_tesseract(&config).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_configured_path_is_used() {
        let dir = tempdir().unwrap();
        let exe = dir.path().join(TESSERACT_EXE);
        std::fs::write(&exe, b"").unwrap();

        let config = OcrConfig {
            tesseract_path: Some(exe.clone()),
            tessdata_dir: Some(dir.path().to_path_buf()),
            ..OcrConfig::default()
        };
        let paths = find_tesseract(&config).unwrap();
        assert_eq!(paths.executable, exe);
        assert_eq!(paths.tessdata.as_deref(), Some(dir.path()));
    }

    #[test]
    fn test_find_tessdata_dir_requires_eng_data() {
        let dir = tempdir().unwrap();
        assert!(find_tessdata_dir(dir.path()).is_none());

        std::fs::create_dir_all(dir.path().join("tessdata")).unwrap();
        std::fs::write(dir.path().join("tessdata").join("eng.traineddata"), b"").unwrap();
        assert_eq!(
            find_tessdata_dir(dir.path()),
            Some(dir.path().join("tessdata"))
        );
    }
}
