//! Logger setup.
//!
//! Every line goes to stderr and, when a log directory is available, is
//! appended to `blm_recorder.log` with a millisecond timestamp.

use chrono::Local;
use env_logger::{Builder, Env, Target};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

const LOG_FILE_NAME: &str = "blm_recorder.log";

/// Writes to stderr and mirrors into the log file.
struct TeeWriter {
    file: Option<File>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        if let Some(file) = self.file.as_mut() {
            let _ = file.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

/// Installs the global logger. `RUST_LOG` overrides the default `info` filter.
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init_logging(log_dir: Option<&Path>) {
    let file = log_dir.and_then(|dir| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(LOG_FILE_NAME))
            .ok()
    });

    let _ = Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {:<5} {}",
                Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(TeeWriter { file })))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_tee_writer_mirrors_to_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        let file = File::create(&path).unwrap();

        let mut writer = TeeWriter { file: Some(file) };
        writer.write_all(b"[12:00:00.000] INFO  hello\n").unwrap();
        writer.flush().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "[12:00:00.000] INFO  hello\n");
    }
}
