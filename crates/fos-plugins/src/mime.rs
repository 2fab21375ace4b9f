//! MIME capability descriptions
//!
//! Modules describe what they handle with a string of the form
//! `mime[:ext1,ext2,...[:description]]`, entries separated by `;`.

use std::cmp::Ordering;
use std::fmt;

/// One MIME type a module claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeEntry {
    /// Lowercased MIME type
    pub mime_type: String,
    pub extensions: Vec<String>,
    pub description: String,
}

/// Parse a capability description.
///
/// Segments without a colon or with an empty MIME type are skipped. A MIME
/// type listed twice keeps its last definition.
pub fn parse_mime_description(description: &str) -> Vec<MimeEntry> {
    let mut entries: Vec<MimeEntry> = Vec::new();

    for segment in description.split(';') {
        let segment = segment.trim();
        let Some((mime, rest)) = segment.split_once(':') else {
            if !segment.is_empty() {
                tracing::debug!("Skipping MIME segment without colon: {:?}", segment);
            }
            continue;
        };

        let mime_type = mime.trim().to_ascii_lowercase();
        if mime_type.is_empty() {
            continue;
        }

        let (extensions, desc) = match rest.split_once(':') {
            Some((exts, desc)) => (exts, desc),
            None => (rest, ""),
        };

        let entry = MimeEntry {
            mime_type,
            extensions: extensions
                .split(',')
                .map(|ext| ext.trim().to_string())
                .filter(|ext| !ext.is_empty())
                .collect(),
            description: desc.to_string(),
        };

        match entries.iter_mut().find(|e| e.mime_type == entry.mime_type) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
    }

    entries
}

/// Product version taken from a module's description.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ModuleVersion {
    pub major: u16,
    pub minor: u16,
    pub micro: u16,
    pub build: u16,
}

impl ModuleVersion {
    pub const fn new(major: u16, minor: u16, micro: u16, build: u16) -> Self {
        Self { major, minor, micro, build }
    }

    /// Find the first `N[.N[.N]]` token, with an optional following
    /// `rN`/`dN`/`bN` build token, e.g. `"Shockwave Flash 10.0 r45"`.
    pub fn parse(text: &str) -> Option<Self> {
        let mut tokens = text.split_whitespace().peekable();
        while let Some(token) = tokens.next() {
            let Some(mut version) = Self::parse_dotted(token) else {
                continue;
            };
            if let Some(build) = tokens.peek().and_then(|t| Self::parse_build(t)) {
                version.build = build;
            }
            return Some(version);
        }
        None
    }

    fn parse_dotted(token: &str) -> Option<Self> {
        let token = token.trim_end_matches([',', ')']);
        let mut parts = token.split('.');
        let major = parts.next()?.parse().ok()?;
        let mut version = Self::new(major, 0, 0, 0);
        if let Some(minor) = parts.next() {
            version.minor = minor.parse().ok()?;
        }
        if let Some(micro) = parts.next() {
            version.micro = micro.parse().ok()?;
        }
        if parts.next().is_some() {
            return None;
        }
        Some(version)
    }

    fn parse_build(token: &str) -> Option<u16> {
        let rest = token.strip_prefix(['r', 'd', 'b'])?;
        rest.parse().ok()
    }
}

impl PartialOrd for ModuleVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ModuleVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.micro, self.build).cmp(&(
            other.major,
            other.minor,
            other.micro,
            other.build,
        ))
    }
}

impl fmt::Display for ModuleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.micro, self.build)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_entries_with_empty_extension_list() {
        let entries = parse_mime_description("m1:e1,e2:d1;m2::d2");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].mime_type, "m1");
        assert_eq!(entries[0].extensions, vec!["e1", "e2"]);
        assert_eq!(entries[0].description, "d1");
        assert_eq!(entries[1].mime_type, "m2");
        assert!(entries[1].extensions.is_empty());
        assert_eq!(entries[1].description, "d2");
    }

    #[test]
    fn test_malformed_segments_skipped() {
        let entries = parse_mime_description("nocolon;:ext:desc;application/x-ok:ok:Fine;");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].mime_type, "application/x-ok");
    }

    #[test]
    fn test_case_handling() {
        let entries = parse_mime_description("Application/X-Demo:DEMO,,dm:Demo File");
        assert_eq!(entries[0].mime_type, "application/x-demo");
        assert_eq!(entries[0].extensions, vec!["DEMO", "dm"]);
        assert_eq!(entries[0].description, "Demo File");
    }

    #[test]
    fn test_mime_without_description() {
        let entries = parse_mime_description("video/x-thing:thg");
        assert_eq!(entries[0].extensions, vec!["thg"]);
        assert_eq!(entries[0].description, "");
    }

    #[test]
    fn test_duplicate_mime_last_wins() {
        let entries = parse_mime_description("a/b:x:first;A/B:y:second");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].description, "second");
    }

    #[test]
    fn test_version_parse() {
        assert_eq!(
            ModuleVersion::parse("Shockwave Flash 10.0 r45"),
            Some(ModuleVersion::new(10, 0, 0, 45))
        );
        assert_eq!(
            ModuleVersion::parse("VLC Multimedia Plug-in 1.1.4"),
            Some(ModuleVersion::new(1, 1, 4, 0))
        );
        assert_eq!(ModuleVersion::parse("No digits here"), None);
        assert!(ModuleVersion::new(10, 0, 0, 0) > ModuleVersion::new(9, 0, 0, 124));
    }
}
