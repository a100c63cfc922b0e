//! A backend driving a headless office suite.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::process::Command;

use crate::{ConvertBackend, ConvertError, Result};

/// Converts packages by running `soffice --headless --convert-to pdf` in a
/// scratch directory.
#[derive(Debug, Clone)]
pub struct SofficeBackend {
    program: PathBuf,
}

impl Default for SofficeBackend {
    fn default() -> Self {
        Self::new("soffice")
    }
}

impl SofficeBackend {
    /// Creates a backend running the given office suite executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl ConvertBackend for SofficeBackend {
    async fn warm_up(&self) -> Result<()> {
        let output = self
            .command()
            .arg("--headless")
            .arg("--version")
            .output()
            .await
            .map_err(|err| {
                ConvertError::NotReady(format!("cannot run {}: {err}", self.program.display()))
            })?;
        if !output.status.success() {
            return Err(ConvertError::NotReady(format!(
                "{} exited with {}",
                self.program.display(),
                output.status
            )));
        }
        log::debug!(
            "SofficeBackend: {}",
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }

    async fn convert(&self, input: Bytes, name: &str) -> Result<Bytes> {
        let dir = tempfile::tempdir()?;
        let stem = file_stem(name);
        let source = dir.path().join(format!("{stem}.docx"));
        tokio::fs::write(&source, &input).await?;

        let output = self
            .command()
            .arg("--headless")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(dir.path())
            .arg(&source)
            .output()
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ConvertError::Backend(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        let target = dir.path().join(format!("{stem}.pdf"));
        match tokio::fs::read(&target).await {
            Ok(pdf) => Ok(pdf.into()),
            Err(err) => Err(ConvertError::Backend(format!(
                "no PDF was produced for {name}: {err}"
            ))),
        }
    }
}

/// A file stem safe to place in the scratch directory.
fn file_stem(name: &str) -> String {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default();
    let stem: String = stem
        .chars()
        .map(|c| match c {
            c if c.is_alphanumeric() || c == '-' || c == '_' => c,
            _ => '_',
        })
        .collect();
    if stem.is_empty() {
        "document".to_owned()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stems_are_sanitized() {
        assert_eq!(file_stem("report.docx"), "report");
        assert_eq!(file_stem("../../etc/passwd"), "passwd");
        assert_eq!(file_stem("my report (1).docx"), "my_report__1_");
        assert_eq!(file_stem(""), "document");
    }

    #[tokio::test]
    async fn missing_program_is_not_ready() {
        let backend = SofficeBackend::new("/nonexistent/soffice");
        assert!(matches!(
            backend.warm_up().await,
            Err(ConvertError::NotReady(_))
        ));
    }
}
