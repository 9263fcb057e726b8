use crate::error::{Collaborator, Result, WorkflowError};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Lays print HTML out onto pages. No business logic lives behind this.
#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render_pdf(&self, html: &str) -> Result<Vec<u8>>;
}

/// Pipes HTML into an external converter (stdin → stdout)
#[derive(Debug, Clone)]
pub struct CommandPdfRenderer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandPdfRenderer {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }
}

#[async_trait]
impl PdfRenderer for CommandPdfRenderer {
    async fn render_pdf(&self, html: &str) -> Result<Vec<u8>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                WorkflowError::transport(Collaborator::Pdf, format!("spawn {}: {err}", self.program))
            })?;

        // Feed stdin concurrently so a converter that streams output cannot stall on a full pipe
        let writer = child.stdin.take().map(|mut stdin| {
            let input = html.as_bytes().to_vec();
            tokio::spawn(async move {
                stdin.write_all(&input).await?;
                stdin.shutdown().await
            })
        });

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| WorkflowError::Timeout {
                service: Collaborator::Pdf,
            })??;

        if let Some(writer) = writer {
            writer.await.map_err(|err| {
                WorkflowError::transport(Collaborator::Pdf, format!("join stdin writer: {err}"))
            })??;
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WorkflowError::transport(
                Collaborator::Pdf,
                format!("{} exited with {}: {}", self.program, output.status, stderr.trim()),
            ));
        }
        if !output.stdout.starts_with(PDF_MAGIC) {
            return Err(WorkflowError::transport(
                Collaborator::Pdf,
                format!("{} did not produce a PDF", self.program),
            ));
        }
        Ok(output.stdout)
    }
}

/// Builds a blank single US Letter page tagged with the HTML digest
#[derive(Debug, Clone, Copy, Default)]
pub struct StubPdfRenderer;

impl StubPdfRenderer {
    fn minimal_pdf(tag: &str) -> Vec<u8> {
        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>",
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>",
        ];

        let mut out = format!("%PDF-1.4\n% html-sha256 {tag}\n").into_bytes();
        let mut offsets = Vec::with_capacity(objects.len());
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
        }

        let xref = out.len();
        let mut table = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
        for offset in offsets {
            table.push_str(&format!("{offset:010} 00000 n \n"));
        }
        table.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n",
            objects.len() + 1
        ));
        out.extend_from_slice(table.as_bytes());
        out
    }
}

#[async_trait]
impl PdfRenderer for StubPdfRenderer {
    async fn render_pdf(&self, html: &str) -> Result<Vec<u8>> {
        let digest = covenant_blocks::sha256_hex(html.as_bytes());
        Ok(Self::minimal_pdf(&digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_pdf_is_well_formed() {
        let pdf = StubPdfRenderer.render_pdf("<p>hi</p>").await.unwrap();
        let text = String::from_utf8(pdf.clone()).unwrap();
        assert!(pdf.starts_with(PDF_MAGIC));
        assert!(text.ends_with("%%EOF\n"));

        let startxref: usize = text
            .lines()
            .skip_while(|l| *l != "startxref")
            .nth(1)
            .unwrap()
            .parse()
            .unwrap();
        assert!(text[startxref..].starts_with("xref"));

        let other = StubPdfRenderer.render_pdf("<p>bye</p>").await.unwrap();
        assert_ne!(pdf, other);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_renderer_checks_output() {
        let cat = CommandPdfRenderer::new("cat", vec![], Duration::from_secs(5));
        let pdf = cat.render_pdf("%PDF-1.4 fake").await.unwrap();
        assert_eq!(pdf, b"%PDF-1.4 fake");

        let err = cat.render_pdf("<html>").await.unwrap_err();
        assert_eq!(err.code(), "transport");

        let missing = CommandPdfRenderer::new(
            "covenant-no-such-converter",
            vec![],
            Duration::from_secs(5),
        );
        assert!(missing.render_pdf("<html>").await.unwrap_err().is_retryable());
    }
}
