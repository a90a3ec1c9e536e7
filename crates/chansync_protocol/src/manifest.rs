//! Resource manifest parsing.
//!
//! A manifest lists the resource files of an export and their metadata:
//!
//! ```xml
//! <Resources>
//!   <ResourceFiles>
//!     <Resource id="123" action="added">
//!       <ParentEntries>
//!         <EntryCode Value="P-1" IsMainPicture="true"/>
//!       </ParentEntries>
//!       <ResourceFields>
//!         <MetaField>
//!           <Name>ResourceTitle</Name>
//!           <Data language="en" value="Front"/>
//!           <Data language="sv"><Item value="Fram"/><Item value="Sida"/></Data>
//!         </MetaField>
//!       </ResourceFields>
//!       <Paths><Path>./123/front.jpg</Path></Paths>
//!     </Resource>
//!   </ResourceFiles>
//! </Resources>
//! ```

use crate::error::{ProtocolError, ProtocolResult};
use crate::record::{ImportAction, ImportRecord, MetaField, MetaValue};
use roxmltree::Node;
use std::path::{Path, PathBuf};

/// Parses a manifest into import records, resolving file paths against
/// `base_dir`.
pub fn parse_manifest(xml: &str, base_dir: &Path) -> ProtocolResult<Vec<ImportRecord>> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| ProtocolError::manifest(e.to_string()))?;

    let Some(files) = child(doc.root_element(), "ResourceFiles") else {
        return Ok(Vec::new());
    };

    children(files, "Resource")
        .map(|resource| parse_resource(resource, base_dir))
        .collect()
}

fn parse_resource(resource: Node<'_, '_>, base_dir: &Path) -> ProtocolResult<ImportRecord> {
    let id = resource
        .attribute("id")
        .ok_or_else(|| ProtocolError::manifest("Resource element without id attribute"))?;
    let action = ImportAction::from_manifest(resource.attribute("action").unwrap_or_default());

    let mut record = ImportRecord::new(id, action);

    if let Some(entries) = child(resource, "ParentEntries") {
        for entry in children(entries, "EntryCode") {
            let code = entry
                .attribute("Value")
                .or_else(|| entry.text())
                .map(str::trim)
                .unwrap_or_default();
            if code.is_empty() {
                continue;
            }
            let is_main_picture = entry
                .attribute("IsMainPicture")
                .map(parse_flag)
                .unwrap_or(false);
            record = record.with_entry_code(code, is_main_picture);
        }
    }

    if action != ImportAction::Deleted {
        if let Some(fields) = child(resource, "ResourceFields") {
            for field in children(fields, "MetaField") {
                record = record.with_meta_field(parse_meta_field(field, id)?);
            }
        }

        let raw_path = child(resource, "Paths")
            .and_then(|paths| child(paths, "Path"))
            .and_then(|path| path.text());
        if let Some(raw_path) = raw_path {
            record.file_path = Some(resolve_resource_path(base_dir, raw_path));
        }
    }

    record.validate()?;
    Ok(record)
}

fn parse_meta_field(field: Node<'_, '_>, resource_id: &str) -> ProtocolResult<MetaField> {
    let name = child(field, "Name")
        .and_then(|name| name.text())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            ProtocolError::manifest(format!("MetaField without Name on resource {}", resource_id))
        })?;

    let values = children(field, "Data")
        .map(|data| {
            let items: Vec<&str> = children(data, "Item")
                .filter_map(|item| item.attribute("value").or_else(|| item.text()))
                .collect();
            let text = if items.is_empty() {
                data.attribute("value").unwrap_or_default().to_string()
            } else {
                items.join(";")
            };
            MetaValue {
                language_code: data.attribute("language").unwrap_or_default().to_string(),
                data: text,
            }
        })
        .collect();

    Ok(MetaField {
        id: name.to_string(),
        values,
    })
}

/// Resolves a manifest file path against the resource base directory.
///
/// The manifest writes paths relative to the export folder with a leading
/// `./` or `/`. That prefix is dropped and the remaining `/`-separated
/// segments are joined onto `base_dir` with the host separator. Any other
/// character, a backslash included, stays part of the file name.
pub fn resolve_resource_path(base_dir: &Path, raw: &str) -> PathBuf {
    let raw = raw.trim();
    let relative = raw.strip_prefix("./").unwrap_or(raw).trim_start_matches('/');

    let mut path = base_dir.to_path_buf();
    for segment in relative.split('/').filter(|s| !s.is_empty()) {
        path.push(segment);
    }
    path
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1")
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|c| c.has_tag_name(name))
}

fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children().filter(move |c| c.has_tag_name(name))
}
