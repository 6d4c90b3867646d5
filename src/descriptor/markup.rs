//! Well-formed document strategy.

use roxmltree::{Document, Node};

use super::{ParseStrategy, RawDescriptor, file_entry, is_true};

/// Parses the descriptor as an XML document and walks its elements.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkupStrategy;

fn text_of(node: Node<'_, '_>) -> Option<String> {
    node.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn child<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(tag))
}

fn child_text(node: Node<'_, '_>, tag: &str) -> Option<String> {
    child(node, tag).and_then(text_of)
}

fn is_file_group(node: &Node<'_, '_>) -> bool {
    node.has_tag_name("File") || node.has_tag_name("FileInfo")
}

impl ParseStrategy for MarkupStrategy {
    fn name(&self) -> &'static str {
        "markup"
    }

    fn extract(&self, text: &str) -> Result<RawDescriptor, String> {
        let doc = Document::parse(text).map_err(|e| e.to_string())?;
        let mut raw = RawDescriptor::default();

        for node in doc.descendants().filter(Node::is_element) {
            if let Some(value) = text_of(node) {
                raw.set_tag(node.tag_name().name(), value);
            }
        }

        let bulk_packages = doc.descendants().filter(|n| {
            n.has_tag_name("SFDLPackage")
                && n.parent_element().is_some_and(|p| p.has_tag_name("Packages"))
        });
        for package in bulk_packages {
            if !child_text(package, "BulkFolderMode").is_some_and(|v| is_true(&v)) {
                continue;
            }
            raw.bulk_mode = true;
            let folders = package
                .children()
                .filter(|n| n.has_tag_name("BulkFolderList"))
                .flat_map(|list| list.children().filter(|n| n.has_tag_name("BulkFolder")));
            raw.bulk_paths
                .extend(folders.filter_map(|folder| child_text(folder, "BulkFolderPath")));
        }

        if raw.bulk_mode {
            return Ok(raw);
        }

        let packages: Vec<Node<'_, '_>> = doc
            .descendants()
            .filter(|n| n.has_tag_name("Package"))
            .collect();
        let groups: Vec<Node<'_, '_>> = if packages.is_empty() {
            doc.descendants().filter(is_file_group).collect()
        } else {
            packages
                .iter()
                .flat_map(|p| p.descendants().filter(is_file_group))
                .collect()
        };

        raw.files = groups
            .into_iter()
            .filter_map(|group| {
                file_entry(
                    child_text(group, "FileName"),
                    child_text(group, "FileSize"),
                    child_text(group, "FileFullPath"),
                )
            })
            .collect();

        Ok(raw)
    }
}
