//! Flat `key=value` files.
//!
//! One entry per line. Blank lines and lines starting with `#` are ignored.
//! Values are base64url or decimal, so no escaping is needed.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Result, StoreError};

/// Parsed key/value entries, ordered by key.
pub type Properties = BTreeMap<String, String>;

/// Parse the text of a properties file.
pub fn parse_properties(text: &str) -> Result<Properties> {
    let mut properties = Properties::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| {
            StoreError::MalformedMetadata(format!("line {}: expected key=value", index + 1))
        })?;
        properties.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(properties)
}

/// Render entries, one per line, after a comment header.
pub fn render_properties(header: &str, properties: &Properties) -> String {
    let mut out = format!("# {header}\n");
    for (key, value) in properties {
        out.push_str(key);
        out.push('=');
        out.push_str(value);
        out.push('\n');
    }
    out
}

/// Look up a required entry.
pub fn required<'a>(properties: &'a Properties, key: &str) -> Result<&'a str> {
    properties
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| StoreError::MalformedMetadata(format!("missing {key}")))
}

/// Read a properties file, or `None` if it does not exist.
pub async fn read_properties(path: &Path) -> Result<Option<Properties>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => parse_properties(&text).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write a properties file through a temporary sibling and a rename, so a
/// reader sees the old file or the new one.
pub async fn write_properties(path: &Path, header: &str, properties: &Properties) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    tokio::fs::write(&tmp, render_properties(header, properties)).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let text = "# header\n\nidentity=abc\n  handle = null \n";
        let properties = parse_properties(text).unwrap();
        assert_eq!(properties.len(), 2);
        assert_eq!(properties["identity"], "abc");
        assert_eq!(properties["handle"], "null");
    }

    #[test]
    fn test_parse_rejects_bare_line() {
        let err = parse_properties("identity\n").unwrap_err();
        assert!(matches!(err, StoreError::MalformedMetadata(_)));
    }

    #[test]
    fn test_render_then_parse() {
        let mut properties = Properties::new();
        properties.insert("counter".into(), "7".into());
        properties.insert("tag".into(), "dGFn".into());
        let text = render_properties("snapshot", &properties);
        assert!(text.starts_with("# snapshot\n"));
        assert_eq!(parse_properties(&text).unwrap(), properties);
    }

    #[test]
    fn test_required_reports_key() {
        let err = required(&Properties::new(), "handle").unwrap_err();
        assert!(err.to_string().contains("handle"));
    }

    #[tokio::test]
    async fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_properties(&dir.path().join("absent")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_replaces_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SEAL");
        let mut properties = Properties::new();
        properties.insert("a".into(), "1".into());
        write_properties(&path, "test", &properties).await.unwrap();
        properties.insert("a".into(), "2".into());
        write_properties(&path, "test", &properties).await.unwrap();

        assert_eq!(read_properties(&path).await.unwrap(), Some(properties));
        assert!(!dir.path().join("SEAL.tmp").exists());
    }
}
