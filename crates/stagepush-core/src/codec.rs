//! XML encoding for the remote manifest and publish log entries.
//!
//! Manifest: `<ArrayOfFileVersion><FileVersion><Filename/><Version/></FileVersion>...`
//! Log entry: `<UploadLogEntry><Version/><Timestamp/><Files>...</Files><ArtifactSha256/>?`

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{DeliverError, FileVersion, FileVersionEntry, Provenance, Result, VersionSet};
use crate::publish_log::PublishLogEntry;

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n";

#[derive(Debug, Serialize, Deserialize)]
struct FileVersionXml {
    #[serde(rename = "Filename")]
    filename: String,
    #[serde(rename = "Version")]
    version: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename = "ArrayOfFileVersion")]
struct ManifestXml {
    #[serde(rename = "FileVersion", default)]
    files: Vec<FileVersionXml>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FilesXml {
    #[serde(rename = "FileVersion", default)]
    files: Vec<FileVersionXml>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "UploadLogEntry")]
struct LogEntryXml {
    #[serde(rename = "Version")]
    version: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "Files", default)]
    files: FilesXml,
    #[serde(
        rename = "ArtifactSha256",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    artifact_sha256: Option<String>,
}

fn to_xml(set: &VersionSet) -> Vec<FileVersionXml> {
    set.iter()
        .map(|e| FileVersionXml {
            filename: e.filename().to_string(),
            version: e.version().to_string(),
        })
        .collect()
}

/// Versions decode leniently; a malformed version becomes an unparsed entry.
fn from_xml(provenance: Provenance, files: Vec<FileVersionXml>) -> Result<VersionSet> {
    VersionSet::try_from_entries(
        provenance,
        files.into_iter().map(|f| {
            let filename = f.filename.trim();
            match FileVersion::parse(&f.version) {
                Ok(version) => FileVersionEntry::new(filename, version),
                Err(e) => {
                    warn!(filename, error = %e, "unparseable version in manifest");
                    FileVersionEntry::unparsed(filename)
                }
            }
        }),
    )
}

fn serialize<T: Serialize>(doc: &T) -> Result<Vec<u8>> {
    let body = quick_xml::se::to_string(doc)
        .map_err(|e| DeliverError::Manifest(format!("xml encode failed: {e}")))?;
    Ok(format!("{XML_DECLARATION}{body}").into_bytes())
}

fn deserialize<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| DeliverError::Manifest(format!("document is not utf-8: {e}")))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    quick_xml::de::from_str(text)
        .map_err(|e| DeliverError::Manifest(format!("xml decode failed: {e}")))
}

pub fn encode_manifest(set: &VersionSet) -> Result<Vec<u8>> {
    serialize(&ManifestXml { files: to_xml(set) })
}

pub fn decode_manifest(bytes: &[u8]) -> Result<VersionSet> {
    let doc: ManifestXml = deserialize(bytes)?;
    from_xml(Provenance::Remote, doc.files)
}

pub fn encode_log_entry(entry: &PublishLogEntry) -> Result<Vec<u8>> {
    serialize(&LogEntryXml {
        version: entry.product_version.clone(),
        timestamp: entry
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        files: FilesXml {
            files: to_xml(&entry.published_files),
        },
        artifact_sha256: entry.artifact_sha256.clone(),
    })
}

pub fn decode_log_entry(bytes: &[u8]) -> Result<PublishLogEntry> {
    let doc: LogEntryXml = deserialize(bytes)?;
    let timestamp = DateTime::parse_from_rfc3339(doc.timestamp.trim())
        .map_err(|e| DeliverError::Manifest(format!("bad log timestamp '{}': {e}", doc.timestamp)))?
        .with_timezone(&Utc);
    Ok(PublishLogEntry {
        timestamp,
        product_version: doc.version,
        published_files: from_xml(Provenance::Remote, doc.files.files)?,
        artifact_sha256: doc.artifact_sha256,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn set(pairs: &[(&str, &str)]) -> VersionSet {
        VersionSet::try_from_entries(
            Provenance::Local,
            pairs
                .iter()
                .map(|(n, v)| FileVersionEntry::new(*n, FileVersion::parse(v).unwrap())),
        )
        .unwrap()
    }

    #[test]
    fn test_manifest_layout() {
        let xml = String::from_utf8(encode_manifest(&set(&[("App.exe", "1.2.3.4")])).unwrap())
            .unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<ArrayOfFileVersion>"));
        assert!(xml.contains("<Filename>App.exe</Filename>"));
        assert!(xml.contains("<Version>1.2.3.4</Version>"));
    }

    #[test]
    fn test_manifest_preserves_case() {
        let local = set(&[("App.EXE", "1.0"), ("b.dll", "2.0.1")]);
        let decoded = decode_manifest(&encode_manifest(&local).unwrap()).unwrap();
        assert!(decoded.same_entries(&local));
        assert_eq!(decoded.get("app.exe").unwrap().filename(), "App.EXE");
    }

    #[test]
    fn test_decode_foreign_manifest_with_namespaces_and_bom() {
        let doc = "\u{feff}<?xml version=\"1.0\" encoding=\"utf-8\"?>\
            <ArrayOfFileVersion xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" \
            xmlns:xsd=\"http://www.w3.org/2001/XMLSchema\">\
            <FileVersion><Filename>a.exe</Filename><Version>1.0.0.0</Version></FileVersion>\
            <FileVersion><Filename>b.dll</Filename><Version>garbage</Version></FileVersion>\
            </ArrayOfFileVersion>";
        let decoded = decode_manifest(doc.as_bytes()).unwrap();
        assert_eq!(decoded.len(), 2);
        let b = decoded.get("b.dll").unwrap();
        assert_eq!(b.version(), FileVersion::ZERO);
        assert_eq!(b.ordering_version(), None);
        assert_eq!(
            decoded.get("a.exe").unwrap().ordering_version(),
            Some(FileVersion::new(1, 0, 0, 0))
        );
    }

    #[test]
    fn test_empty_manifest() {
        let decoded = decode_manifest(b"<ArrayOfFileVersion/>").unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_duplicate_manifest_entries_are_rejected() {
        let doc = "<ArrayOfFileVersion>\
            <FileVersion><Filename>a.exe</Filename><Version>1.0</Version></FileVersion>\
            <FileVersion><Filename>A.EXE</Filename><Version>2.0</Version></FileVersion>\
            </ArrayOfFileVersion>";
        assert!(matches!(
            decode_manifest(doc.as_bytes()).unwrap_err(),
            DeliverError::Manifest(_)
        ));
    }

    #[test]
    fn test_malformed_document_is_manifest_error() {
        assert!(matches!(
            decode_manifest(b"\xff\xfe not xml").unwrap_err(),
            DeliverError::Manifest(_)
        ));
    }

    #[test]
    fn test_log_entry_keeps_timestamp_and_digest() {
        let entry = PublishLogEntry {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 12).unwrap(),
            product_version: "1.0.1.0".to_string(),
            published_files: set(&[("a.exe", "1.0.1.0")]),
            artifact_sha256: Some("ab".repeat(32)),
        };
        let bytes = encode_log_entry(&entry).unwrap();
        let xml = String::from_utf8(bytes.clone()).unwrap();
        assert!(xml.contains("<Timestamp>2024-05-17T09:30:12Z</Timestamp>"));

        let decoded = decode_log_entry(&bytes).unwrap();
        assert_eq!(decoded.timestamp, entry.timestamp);
        assert_eq!(decoded.product_version, "1.0.1.0");
        assert!(decoded.published_files.same_entries(&entry.published_files));
        assert_eq!(decoded.artifact_sha256, entry.artifact_sha256);
    }

    #[test]
    fn test_log_entry_without_digest() {
        let doc = "<UploadLogEntry><Version>2.0.0.0</Version>\
            <Timestamp>2023-01-02T03:04:05+00:00</Timestamp><Files/></UploadLogEntry>";
        let decoded = decode_log_entry(doc.as_bytes()).unwrap();
        assert!(decoded.published_files.is_empty());
        assert!(decoded.artifact_sha256.is_none());
    }
}
