//! Document overlay: writes text boxes onto an existing PDF.
//!
//! The overlay is delegated to an external helper process invoked as
//!
//! ```text
//! <program> [args…] <source.pdf> <destination> <json-config>
//! ```
//!
//! where the config is `{"layers": [{text, x, y, w, h, fontSize, color,
//! align, cover}, …]}`. The helper writes the destination (a PDF, or a PNG of
//! the first page when the destination ends in `.png`) and prints a JSON
//! status line `{"success": true|false, "path"?, "error"?}` on stdout.
//!
//! The helper runs under a deadline. On expiry the child is killed and the
//! render fails with [`CertError::Timeout`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::CertError;

/// One text box to draw on the source document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayLayer {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub font_size: f32,
    pub color: String,
    pub align: String,
    /// Paint a white box under the text to hide what the source shows there.
    pub cover: bool,
}

#[derive(Serialize)]
struct OverlayConfig<'a> {
    layers: &'a [OverlayLayer],
}

#[derive(Debug, Deserialize)]
struct OverlayStatus {
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Strategy for writing text onto an existing document.
#[async_trait]
pub trait DocumentOverlayRenderer: Send + Sync {
    /// Draw `layers` onto `source` and write the result to `destination`.
    async fn overlay(
        &self,
        source: &Path,
        destination: &Path,
        layers: &[OverlayLayer],
    ) -> Result<(), CertError>;
}

/// Overlay via an external helper process.
#[derive(Debug, Clone)]
pub struct SubprocessOverlay {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl SubprocessOverlay {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }
}

/// Last stdout line that parses as a status object.
fn parse_status(stdout: &[u8]) -> Option<OverlayStatus> {
    String::from_utf8_lossy(stdout)
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .find_map(|line| serde_json::from_str(line).ok())
}

#[async_trait]
impl DocumentOverlayRenderer for SubprocessOverlay {
    async fn overlay(
        &self,
        source: &Path,
        destination: &Path,
        layers: &[OverlayLayer],
    ) -> Result<(), CertError> {
        let config = serde_json::to_string(&OverlayConfig { layers })
            .map_err(|e| CertError::Overlay(format!("Failed to encode layers: {}", e)))?;

        debug!(
            program = %self.program,
            source = %source.display(),
            destination = %destination.display(),
            layers = layers.len(),
            "running overlay helper"
        );

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(source)
            .arg(destination)
            .arg(&config)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CertError::Overlay(format!("Failed to start {}: {}", self.program, e)))?;

        // Dropping the wait future on expiry drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result
                .map_err(|e| CertError::Overlay(format!("Overlay helper failed: {}", e)))?,
            Err(_) => {
                warn!(program = %self.program, "overlay helper exceeded deadline, killed");
                return Err(CertError::timeout("document overlay", self.timeout));
            }
        };

        let status = parse_status(&output.stdout);
        let reported_failure = status.as_ref().is_some_and(|s| !s.success);
        if !output.status.success() || reported_failure {
            let message = status
                .and_then(|s| s.error)
                .or_else(|| {
                    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                    (!stderr.is_empty()).then_some(stderr)
                })
                .unwrap_or_else(|| format!("helper exited with {}", output.status));
            return Err(CertError::Overlay(message));
        }

        if !destination.exists() {
            return Err(CertError::Overlay(format!(
                "helper reported success but wrote no {}",
                destination.display()
            )));
        }
        Ok(())
    }
}

/// Preview destination for an overlay render inside `dir`.
pub fn preview_path(dir: &Path) -> PathBuf {
    dir.join(format!(".preview_{}.png", uuid::Uuid::new_v4()))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn script(dir: &Path, body: &str) -> String {
        let path = dir.join("helper.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn layer() -> OverlayLayer {
        OverlayLayer {
            text: "Ann".to_string(),
            x: 10.0,
            y: 20.0,
            w: 200.0,
            h: 50.0,
            font_size: 12.0,
            color: "#000000".to_string(),
            align: "left".to_string(),
            cover: false,
        }
    }

    #[test]
    fn test_layer_wire_format() {
        let json = serde_json::to_value(layer()).unwrap();
        assert_eq!(json["fontSize"], 12.0);
        assert_eq!(json["align"], "left");
    }

    #[tokio::test]
    async fn test_helper_success() {
        let dir = tempfile::tempdir().unwrap();
        let helper = script(
            dir.path(),
            r#"printf '%s' "$3" > "$2.json"; cp "$1" "$2"; echo '{"success": true}'"#,
        );
        let source = dir.path().join("in.pdf");
        std::fs::write(&source, b"%PDF-1.4").unwrap();
        let dest = dir.path().join("out.pdf");

        let overlay = SubprocessOverlay::new("sh", vec![helper], Duration::from_secs(5));
        overlay.overlay(&source, &dest, &[layer()]).await.unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"%PDF-1.4");
        let config = std::fs::read_to_string(dir.path().join("out.pdf.json")).unwrap();
        assert!(config.contains("\"text\":\"Ann\""));
    }

    #[tokio::test]
    async fn test_helper_reported_error() {
        let dir = tempfile::tempdir().unwrap();
        let helper = script(dir.path(), r#"echo '{"success": false, "error": "bad page"}'; exit 1"#);
        let overlay = SubprocessOverlay::new("sh", vec![helper], Duration::from_secs(5));
        let err = overlay
            .overlay(&dir.path().join("in.pdf"), &dir.path().join("out.pdf"), &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bad page"));
    }

    #[tokio::test]
    async fn test_helper_killed_on_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let helper = script(dir.path(), "sleep 10");
        let overlay = SubprocessOverlay::new("sh", vec![helper], Duration::from_millis(200));
        let started = std::time::Instant::now();
        let err = overlay
            .overlay(&dir.path().join("in.pdf"), &dir.path().join("out.pdf"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CertError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let overlay = SubprocessOverlay::new("/no/such/helper", vec![], Duration::from_secs(1));
        let err = overlay
            .overlay(Path::new("a.pdf"), Path::new("b.pdf"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CertError::Overlay(_)));
    }
}
