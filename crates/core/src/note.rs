//! Note identity and frontmatter primitives
//!
//! Every note carries a ULID in its YAML frontmatter (`id:` key). The id is
//! what survives a rename: the watcher correlates a delete with a subsequent
//! add by extracting the id from the new file's content. Parsing here is a
//! line scanner over the `---` fences, deliberately tolerant of quoting and
//! spacing; full YAML semantics are not needed for identity extraction.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Stable note identifier, embedded in frontmatter and independent of path
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(Ulid);

impl NoteId {
    /// Generate a fresh identifier
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Parse from the canonical 26-character ULID form
    pub fn parse(s: &str) -> Result<Self> {
        let ulid = Ulid::from_string(s.trim())
            .with_context(|| format!("Invalid note id: {}", s))?;
        Ok(Self(ulid))
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NoteId({})", self.0)
    }
}

impl FromStr for NoteId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Split a note into (frontmatter, body)
///
/// Frontmatter is the block between a `---` on the first line and the next
/// `---` line. Returns None when the document has no frontmatter block.
pub fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let rest = content.strip_prefix("---")?;
    // The opening fence must be the whole first line
    let rest = rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed == "---" {
            let fm = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((fm, body));
        }
        offset += line.len();
    }
    None
}

/// Look up a scalar frontmatter value by key
///
/// Line-oriented: finds `key: value` at the top level and strips matching
/// quotes. Nested structures are not resolved.
pub fn frontmatter_value<'a>(frontmatter: &'a str, key: &str) -> Option<&'a str> {
    for line in frontmatter.lines() {
        let Some((k, v)) = line.split_once(':') else {
            continue;
        };
        if k.trim() != key {
            continue;
        }
        let v = v.trim();
        let v = v
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .or_else(|| v.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
            .unwrap_or(v);
        if v.is_empty() {
            return None;
        }
        return Some(v);
    }
    None
}

/// Extract the embedded note identity, if the content carries one
pub fn extract_note_id(content: &str) -> Option<NoteId> {
    let (frontmatter, _) = split_frontmatter(content)?;
    let raw = frontmatter_value(frontmatter, "id")?;
    NoteId::parse(raw).ok()
}

/// Derive a display title: frontmatter `title:`, else the first `#` heading,
/// else the file stem.
pub fn note_title(content: &str, path: &Path) -> String {
    let body = match split_frontmatter(content) {
        Some((frontmatter, body)) => {
            if let Some(title) = frontmatter_value(frontmatter, "title") {
                return title.to_string();
            }
            body
        }
        None => content,
    };

    for line in body.lines() {
        if let Some(rest) = line.strip_prefix("# ") {
            let t = rest.trim();
            if !t.is_empty() {
                return t.to_string();
            }
        }
    }

    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("untitled")
        .to_string()
}

/// Compose a fresh note document with identity frontmatter
pub fn compose_note(id: NoteId, title: &str, body: &str) -> String {
    let mut out = String::with_capacity(64 + title.len() + body.len());
    out.push_str("---\n");
    out.push_str(&format!("id: {}\n", id));
    out.push_str(&format!("title: {}\n", title));
    out.push_str("---\n\n");
    out.push_str(&format!("# {}\n", title));
    if !body.is_empty() {
        out.push('\n');
        out.push_str(body);
        if !body.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_note_id_roundtrip() {
        let id = NoteId::generate();
        let parsed = NoteId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_note_id_rejects_garbage() {
        assert!(NoteId::parse("not-a-ulid").is_err());
        assert!(NoteId::parse("").is_err());
    }

    #[test]
    fn test_split_frontmatter_basic() {
        let doc = "---\nid: abc\ntitle: Hello\n---\n\nBody text\n";
        let (fm, body) = split_frontmatter(doc).unwrap();
        assert!(fm.contains("id: abc"));
        assert!(fm.contains("title: Hello"));
        assert_eq!(body, "\nBody text\n");
    }

    #[test]
    fn test_split_frontmatter_missing() {
        assert!(split_frontmatter("# Just a heading\n").is_none());
        assert!(split_frontmatter("").is_none());
        // Fence must start the document
        assert!(split_frontmatter("\n---\nid: x\n---\n").is_none());
    }

    #[test]
    fn test_split_frontmatter_unclosed() {
        assert!(split_frontmatter("---\nid: abc\nno closing fence\n").is_none());
    }

    #[test]
    fn test_frontmatter_value_quoting() {
        let fm = "id: 123\ntitle: \"Quoted Title\"\nother: 'single'\nspaced :  padded  \n";
        assert_eq!(frontmatter_value(fm, "id"), Some("123"));
        assert_eq!(frontmatter_value(fm, "title"), Some("Quoted Title"));
        assert_eq!(frontmatter_value(fm, "other"), Some("single"));
        assert_eq!(frontmatter_value(fm, "spaced"), Some("padded"));
        assert_eq!(frontmatter_value(fm, "missing"), None);
    }

    #[test]
    fn test_extract_note_id() {
        let id = NoteId::generate();
        let doc = format!("---\nid: {}\ntitle: T\n---\n\nbody\n", id);
        assert_eq!(extract_note_id(&doc), Some(id));

        let quoted = format!("---\nid: \"{}\"\n---\n", id);
        assert_eq!(extract_note_id(&quoted), Some(id));

        assert_eq!(extract_note_id("no frontmatter here"), None);
        assert_eq!(extract_note_id("---\ntitle: no id\n---\n"), None);
        assert_eq!(extract_note_id("---\nid: bogus\n---\n"), None);
    }

    #[test]
    fn test_note_title_precedence() {
        let path = PathBuf::from("notes/fallback-name.md");

        let with_fm = "---\ntitle: From Frontmatter\n---\n\n# From Heading\n";
        assert_eq!(note_title(with_fm, &path), "From Frontmatter");

        let with_heading = "---\nid: x\n---\n\n# From Heading\n";
        assert_eq!(note_title(with_heading, &path), "From Heading");

        let bare_heading = "# Only Heading\n\ntext\n";
        assert_eq!(note_title(bare_heading, &path), "Only Heading");

        assert_eq!(note_title("plain text only\n", &path), "fallback-name");
    }

    #[test]
    fn test_compose_extract_roundtrip() {
        let id = NoteId::generate();
        let doc = compose_note(id, "Meeting Notes", "Agenda item one.");
        assert_eq!(extract_note_id(&doc), Some(id));
        assert_eq!(
            note_title(&doc, &PathBuf::from("whatever.md")),
            "Meeting Notes"
        );
        assert!(doc.contains("Agenda item one."));
    }

    #[test]
    fn test_compose_empty_body() {
        let id = NoteId::generate();
        let doc = compose_note(id, "Empty", "");
        let (_, body) = split_frontmatter(&doc).unwrap();
        assert_eq!(body, "\n# Empty\n");
    }
}
