//! Changelog rendering and regeneration.

use std::fmt::Write as _;
use std::time::Duration;

use blobstate::{BlobMetadata, ObjectStore};

use crate::domain::Result;
use crate::publish_log::{PruneReport, PublishLogEntry, PublishLogStore};
use crate::remote::{remote_call, RemoteLayout};

/// A rendered document ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Turns publish history into an end-user document.
pub trait ChangelogRenderer: Send + Sync {
    fn render(&self, product: &str, entries: &[PublishLogEntry]) -> Result<RenderedDocument>;
}

/// Default renderer: a standalone HTML page with one table row per publish.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlChangelogRenderer;

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

impl ChangelogRenderer for HtmlChangelogRenderer {
    fn render(&self, product: &str, entries: &[PublishLogEntry]) -> Result<RenderedDocument> {
        let title = escape(&format!("{product} Change Log"));
        let mut html = String::new();
        // write! into a String cannot fail
        let _ = writeln!(html, "<!DOCTYPE html>");
        let _ = writeln!(html, "<html>\n<head>\n<meta charset=\"utf-8\">");
        let _ = writeln!(html, "<title>{title}</title>\n</head>\n<body>");
        let _ = writeln!(html, "<h1>{title}</h1>");
        let _ = writeln!(
            html,
            "<table>\n<tr><th>Date</th><th>Version</th><th>Files</th></tr>"
        );
        for entry in entries {
            let files: String = entry
                .published_files
                .iter()
                .map(|f| {
                    format!(
                        "<li>{} - {}</li>",
                        escape(f.filename()),
                        f.version()
                    )
                })
                .collect();
            let _ = writeln!(
                html,
                "<tr><td>{}</td><td>{}</td><td><ul>{}</ul></td></tr>",
                entry.timestamp.format("%Y-%m-%d %H:%M UTC"),
                escape(&entry.product_version),
                files
            );
        }
        let _ = writeln!(html, "</table>\n</body>\n</html>");

        Ok(RenderedDocument {
            content_type: "text/html".to_string(),
            body: html.into_bytes(),
        })
    }
}

/// What a changelog rebuild did.
#[derive(Debug)]
pub struct ChangelogUpdate {
    pub key: String,
    pub entries_rendered: usize,
    pub prune: PruneReport,
}

/// Re-render the changelog from the newest `retention` entries, upload it
/// over the previous one, then prune entries outside the window.
pub async fn rebuild_changelog(
    store: &dyn ObjectStore,
    layout: &RemoteLayout,
    renderer: &dyn ChangelogRenderer,
    retention: usize,
    timeout: Duration,
) -> Result<ChangelogUpdate> {
    let log = PublishLogStore::new(store, layout, timeout);
    let history = log.load_recent(retention).await?;
    let document = renderer.render(layout.product(), history.entries())?;

    let key = layout.changelog_key();
    let meta = BlobMetadata::with_content_type(&document.content_type);
    remote_call(
        "upload_changelog",
        timeout,
        store.upload(&key, &document.body, &meta),
    )
    .await?;

    let prune = log.prune(retention).await;
    Ok(ChangelogUpdate {
        key,
        entries_rendered: history.len(),
        prune,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FileVersion, FileVersionEntry, Provenance, VersionSet};
    use chrono::{TimeZone, Utc};

    fn entry(version: &str, files: &[(&str, &str)]) -> PublishLogEntry {
        PublishLogEntry {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 9, 16, 20, 0).unwrap(),
            product_version: version.to_string(),
            published_files: VersionSet::try_from_entries(
                Provenance::Local,
                files
                    .iter()
                    .map(|(n, v)| FileVersionEntry::new(*n, FileVersion::parse(v).unwrap())),
            )
            .unwrap(),
            artifact_sha256: None,
        }
    }

    #[test]
    fn test_html_contains_title_and_rows() {
        let doc = HtmlChangelogRenderer
            .render("Acme", &[entry("2.1.0.0", &[("a.exe", "2.1"), ("b.dll", "1.0")])])
            .unwrap();
        assert_eq!(doc.content_type, "text/html");
        let html = String::from_utf8(doc.body).unwrap();
        assert!(html.contains("<title>Acme Change Log</title>"));
        assert!(html.contains("<td>2024-03-09 16:20 UTC</td>"));
        assert!(html.contains("<td>2.1.0.0</td>"));
        assert!(html.contains("<li>a.exe - 2.1.0.0</li><li>b.dll - 1.0.0.0</li>"));
    }

    #[test]
    fn test_html_escapes_data() {
        let doc = HtmlChangelogRenderer
            .render("<Acme & Co>", &[entry("1.0", &[("x<y>.dll", "1.0")])])
            .unwrap();
        let html = String::from_utf8(doc.body).unwrap();
        assert!(html.contains("&lt;Acme &amp; Co&gt; Change Log"));
        assert!(html.contains("x&lt;y&gt;.dll"));
        assert!(!html.contains("<Acme"));
    }

    #[test]
    fn test_empty_history_renders_header_only() {
        let doc = HtmlChangelogRenderer.render("Acme", &[]).unwrap();
        let html = String::from_utf8(doc.body).unwrap();
        assert!(html.contains("<th>Date</th>"));
        assert!(!html.contains("<td>"));
    }
}
