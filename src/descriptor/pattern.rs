//! Tag pattern strategy for descriptors that are not well-formed documents.

use std::sync::LazyLock;

use regex::Regex;

use super::{KNOWN_TAGS, ParseStrategy, RawDescriptor, file_entry};

/// Extracts tags with case-insensitive patterns, tolerating broken nesting.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternStrategy;

static PACKAGE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<Package(?:\s[^>]*)?>(.*?)</Package\s*>").expect("valid regex")
});

static FILE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<File(?:Info)?(?:\s[^>]*)?>(.*?)</File(?:Info)?\s*>").expect("valid regex")
});

/// Pattern variants for one tag, tried in order.
fn tag_patterns(tag: &str) -> Vec<Regex> {
    [
        format!(r"(?is)<{tag}(?:\s[^>]*)?>\s*<!\[CDATA\[(.*?)\]\]>\s*</{tag}\s*>"),
        format!(r"(?is)<{tag}(?:\s[^>]*)?>([^<]*)</{tag}\s*>"),
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
}

fn unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// First non-empty value of `tag` in `body`, using the first matching variant.
fn tag_value(body: &str, tag: &str) -> Option<String> {
    tag_patterns(tag).iter().find_map(|re| {
        re.captures(body)
            .and_then(|c| c.get(1))
            .map(|m| unescape(m.as_str().trim()))
            .filter(|v| !v.is_empty())
    })
}

/// Every non-empty value of `tag` in `body`.
fn tag_values(body: &str, tag: &str) -> Vec<String> {
    tag_patterns(tag)
        .iter()
        .find_map(|re| {
            let values: Vec<String> = re
                .captures_iter(body)
                .filter_map(|c| c.get(1))
                .map(|m| unescape(m.as_str().trim()))
                .filter(|v| !v.is_empty())
                .collect();
            (!values.is_empty()).then_some(values)
        })
        .unwrap_or_default()
}

impl ParseStrategy for PatternStrategy {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn extract(&self, text: &str) -> Result<RawDescriptor, String> {
        let mut raw = RawDescriptor::default();
        for tag in KNOWN_TAGS {
            if let Some(value) = tag_value(text, tag) {
                raw.set_tag(tag, value);
            }
        }

        let bulk_paths = tag_values(text, "BulkFolderPath");
        if !bulk_paths.is_empty() {
            raw.bulk_mode = true;
            raw.bulk_paths = bulk_paths;
            return Ok(raw);
        }

        let packages: Vec<&str> = PACKAGE_BLOCK
            .captures_iter(text)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        let scopes = if packages.is_empty() { vec![text] } else { packages };

        raw.files = scopes
            .into_iter()
            .flat_map(|scope| FILE_BLOCK.captures_iter(scope))
            .filter_map(|c| c.get(1))
            .filter_map(|block| {
                let block = block.as_str();
                file_entry(
                    tag_value(block, "FileName"),
                    tag_value(block, "FileSize"),
                    tag_value(block, "FileFullPath"),
                )
            })
            .collect();

        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_tags_with_attributes_and_case_noise() {
        let raw = PatternStrategy
            .extract("<sfdl><HOST id=\"1\">  ftp.example.com \n</host><Port>21<Port><Encrypted>TRUE</Encrypted>")
            .unwrap();
        assert_eq!(raw.host.as_deref(), Some("ftp.example.com"));
        assert!(raw.encrypted);
        assert!(raw.port.is_none());
    }

    #[test]
    fn first_occurrence_wins() {
        let raw = PatternStrategy
            .extract("<Host>first</Host><Host>second</Host>")
            .unwrap();
        assert_eq!(raw.host.as_deref(), Some("first"));
    }

    #[test]
    fn cdata_values() {
        let raw = PatternStrategy
            .extract("<Description><![CDATA[Movie <Extended>]]></Description>")
            .unwrap();
        assert_eq!(raw.title.as_deref(), Some("Movie <Extended>"));
    }

    #[test]
    fn bulk_paths_force_bulk_mode() {
        let raw = PatternStrategy
            .extract(
                "<BulkFolderMode>false</BulkFolderMode>\
                 <BulkFolderPath>/one</BulkFolderPath><BulkFolderPath>/two</BulkFolderPath>\
                 <Package><File><FileName>a.rar</FileName></File></Package>",
            )
            .unwrap();
        assert!(raw.bulk_mode);
        assert_eq!(raw.bulk_paths, ["/one", "/two"]);
        assert!(raw.files.is_empty());
    }

    #[test]
    fn files_inside_packages_take_precedence() {
        let raw = PatternStrategy
            .extract(
                "<File><FileName>outside.rar</FileName></File>\
                 <Packages><Package><File><FileName>inside.rar</FileName>\
                 <FileSize>42</FileSize><FileFullPath>/x/inside.rar</FileFullPath></File></Package></Packages>",
            )
            .unwrap();
        assert_eq!(raw.files.len(), 1);
        assert_eq!(raw.files[0].name, "inside.rar");
        assert_eq!(raw.files[0].size, 42);
        assert_eq!(raw.files[0].path, "/x/inside.rar");
    }

    #[test]
    fn files_in_body_without_packages() {
        let raw = PatternStrategy
            .extract(
                "<FileInfo><FileName>a.rar</FileName><FileSize>1</FileSize></FileInfo>\
                 <FileInfo><FileName>b.rar</FileName><FileSize>2</FileSize></FileInfo>",
            )
            .unwrap();
        let names: Vec<_> = raw.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["a.rar", "b.rar"]);
    }

    #[test]
    fn unescapes_entities() {
        assert_eq!(unescape("Tom &amp; Jerry &lt;3"), "Tom & Jerry <3");
        assert_eq!(unescape("&amp;lt;"), "&lt;");
    }
}
