//! # Engine Configuration
//!
//! Every tunable of the engine lives in [`Settings`]. Each field can be set
//! with a command-line flag or an environment variable and falls back to a
//! fixed default when neither is given.
//!
//! ## Directory Layout
//!
//! ```text
//! <data_dir>/
//! ├── uploads/            spreadsheets and template assets
//! ├── generated/          rendered certificates and archives
//! ├── data/templates.json template collection
//! └── fonts/              optional TTF/OTF files (default fonts_dir)
//! ```

use clap::{Args, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::CertError;

/// What to do when a single row fails to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FailurePolicy {
    /// Fail the whole batch on the first row failure.
    #[default]
    Abort,
    /// Record the failure on the row's item and keep going.
    Skip,
}

/// Engine settings shared by the CLI and the HTTP server.
#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Root directory holding uploads/, generated/ and data/
    #[arg(long, env = "CERTPRESS_DATA_DIR", default_value = ".")]
    pub data_dir: PathBuf,

    /// Directory scanned for TTF/OTF font files (defaults to <data_dir>/fonts)
    #[arg(long, env = "CERTPRESS_FONTS_DIR")]
    pub fonts_dir: Option<PathBuf>,

    /// Per-row render timeout in milliseconds
    #[arg(long, env = "RENDER_TIMEOUT_MS", default_value_t = 30_000)]
    pub render_timeout_ms: u64,

    /// Archive creation timeout in milliseconds
    #[arg(long, env = "ARCHIVE_TIMEOUT_MS", default_value_t = 60_000)]
    pub archive_timeout_ms: u64,

    /// Templated-PDF helper process timeout in milliseconds
    #[arg(long, env = "OVERLAY_TIMEOUT_MS", default_value_t = 20_000)]
    pub overlay_timeout_ms: u64,

    /// Log batch progress every N rows
    #[arg(long, env = "PROGRESS_EVERY", default_value_t = 10)]
    pub progress_every: usize,

    /// Maximum rows rendered per batch
    #[arg(long, env = "MAX_ROWS", default_value_t = 20)]
    pub max_rows: usize,

    /// Command line of the templated-PDF overlay helper
    #[arg(long, env = "OVERLAY_COMMAND", default_value = "python3 scripts/generate_pdf.py")]
    pub overlay_command: String,

    /// Row failure policy
    #[arg(long, env = "FAILURE_POLICY", value_enum, default_value_t = FailurePolicy::Abort)]
    pub failure_policy: FailurePolicy,

    /// Maximum batch records kept in memory (unbounded when unset)
    #[arg(long, env = "BATCH_CAPACITY")]
    pub batch_capacity: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            fonts_dir: None,
            render_timeout_ms: 30_000,
            archive_timeout_ms: 60_000,
            overlay_timeout_ms: 20_000,
            progress_every: 10,
            max_rows: 20,
            overlay_command: "python3 scripts/generate_pdf.py".to_string(),
            failure_policy: FailurePolicy::Abort,
            batch_capacity: None,
        }
    }
}

impl Settings {
    /// Settings rooted at `data_dir`, everything else default.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn generated_dir(&self) -> PathBuf {
        self.data_dir.join("generated")
    }

    pub fn templates_path(&self) -> PathBuf {
        self.data_dir.join("data").join("templates.json")
    }

    pub fn fonts_dir(&self) -> PathBuf {
        self.fonts_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("fonts"))
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    pub fn archive_timeout(&self) -> Duration {
        Duration::from_millis(self.archive_timeout_ms)
    }

    pub fn overlay_timeout(&self) -> Duration {
        Duration::from_millis(self.overlay_timeout_ms)
    }

    /// Split the overlay command line into program and leading arguments.
    pub fn overlay_program(&self) -> Result<(String, Vec<String>), CertError> {
        let mut parts = self.overlay_command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| CertError::Overlay("overlay command is empty".to_string()))?;
        Ok((program, parts.collect()))
    }

    /// Create the uploads, generated and data directories.
    pub fn ensure_dirs(&self) -> Result<(), CertError> {
        std::fs::create_dir_all(self.uploads_dir())?;
        std::fs::create_dir_all(self.generated_dir())?;
        if let Some(parent) = self.templates_path().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_paths() {
        let settings = Settings::with_data_dir("/srv/certs");
        assert_eq!(settings.uploads_dir(), PathBuf::from("/srv/certs/uploads"));
        assert_eq!(settings.generated_dir(), PathBuf::from("/srv/certs/generated"));
        assert_eq!(
            settings.templates_path(),
            PathBuf::from("/srv/certs/data/templates.json")
        );
        assert_eq!(settings.fonts_dir(), PathBuf::from("/srv/certs/fonts"));
    }

    #[test]
    fn test_overlay_program_split() {
        let settings = Settings {
            overlay_command: "python3 -u helper.py".to_string(),
            ..Default::default()
        };
        let (program, args) = settings.overlay_program().unwrap();
        assert_eq!(program, "python3");
        assert_eq!(args, vec!["-u", "helper.py"]);
    }

    #[test]
    fn test_empty_overlay_command() {
        let settings = Settings {
            overlay_command: "   ".to_string(),
            ..Default::default()
        };
        assert!(settings.overlay_program().is_err());
    }
}
