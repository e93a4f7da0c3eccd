//! XML round-trip for the basemap catalog.
//!
//! The document shape is a `BaseMaps` root with repeated `BaseMapInfo`
//! children. Parsing is best-effort: unknown child elements are skipped
//! and missing ones leave their fields at type defaults, so catalogs
//! written by older or newer builds keep loading.

use super::types::{BaseMapInfo, BaseMapKind};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while reading or writing a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Reading or writing the catalog file failed.
    #[error("Catalog file {path}: {source}")]
    File {
        path: PathBuf,
        source: io::Error,
    },

    /// Writing the serialized document failed.
    #[error("Failed to serialize catalog: {0}")]
    Serialize(#[from] io::Error),

    /// The XML could not be parsed.
    #[error("Malformed catalog XML: {0}")]
    Parse(#[from] quick_xml::Error),

    /// Escaped character data could not be decoded.
    #[error("Invalid character data in catalog XML: {0}")]
    Escape(#[from] quick_xml::escape::EscapeError),

    /// The serialized document was not valid UTF-8.
    #[error("Serialized catalog is not valid UTF-8")]
    Encoding,
}

/// Parse a catalog document.
///
/// Elements other than `BaseMapInfo` children are tolerated and
/// ignored; a missing field leaves the descriptor's default in place.
pub fn parse_catalog(xml: &str) -> Result<Vec<BaseMapInfo>, CatalogError> {
    let mut reader = Reader::from_str(xml);
    let mut basemaps = Vec::new();
    let mut current: Option<BaseMapInfo> = None;
    // Child element of the BaseMapInfo we are currently inside, if any
    let mut field: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name.eq_ignore_ascii_case("BaseMapInfo") {
                    current = Some(BaseMapInfo::default());
                } else if current.is_some() {
                    field = Some(name);
                }
            }
            Event::Text(e) => {
                if let (Some(info), Some(name)) = (current.as_mut(), field.as_deref()) {
                    let text = e.unescape()?;
                    apply_field(info, name, text.trim());
                }
            }
            Event::End(e) => {
                if e.name().as_ref().eq_ignore_ascii_case(b"BaseMapInfo") {
                    if let Some(info) = current.take() {
                        basemaps.push(info);
                    }
                    field = None;
                } else {
                    field = None;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(basemaps)
}

/// Serialize a catalog to an indented XML document.
pub fn write_catalog(basemaps: &[BaseMapInfo]) -> Result<String, CatalogError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("BaseMaps")))?;

    for info in basemaps {
        writer.write_event(Event::Start(BytesStart::new("BaseMapInfo")))?;
        write_text_element(&mut writer, "DisplayName", &info.display_name)?;
        write_text_element(&mut writer, "Name", &info.name)?;
        write_text_element(&mut writer, "ThumbnailImage", &info.thumbnail)?;
        write_text_element(&mut writer, "BaseMapType", info.kind.label())?;
        write_text_element(&mut writer, "Url", &info.url)?;
        let proxy = if info.use_proxy { "true" } else { "false" };
        write_text_element(&mut writer, "UseProxy", proxy)?;
        writer.write_event(Event::End(BytesEnd::new("BaseMapInfo")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("BaseMaps")))?;

    String::from_utf8(writer.into_inner()).map_err(|_| CatalogError::Encoding)
}

/// Load a catalog from a file.
pub fn load_catalog(path: impl AsRef<Path>) -> Result<Vec<BaseMapInfo>, CatalogError> {
    let path = path.as_ref();
    let xml = std::fs::read_to_string(path).map_err(|source| CatalogError::File {
        path: path.to_path_buf(),
        source,
    })?;
    parse_catalog(&xml)
}

/// Save a catalog to a file, replacing any previous content.
pub fn save_catalog(path: impl AsRef<Path>, basemaps: &[BaseMapInfo]) -> Result<(), CatalogError> {
    let path = path.as_ref();
    let xml = write_catalog(basemaps)?;
    std::fs::write(path, xml).map_err(|source| CatalogError::File {
        path: path.to_path_buf(),
        source,
    })
}

fn write_text_element<W: io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    value: &str,
) -> Result<(), CatalogError> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn apply_field(info: &mut BaseMapInfo, name: &str, value: &str) {
    if name.eq_ignore_ascii_case("DisplayName") {
        info.display_name = value.to_string();
    } else if name.eq_ignore_ascii_case("Name") {
        info.name = value.to_string();
    } else if name.eq_ignore_ascii_case("ThumbnailImage") {
        info.thumbnail = value.to_string();
    } else if name.eq_ignore_ascii_case("BaseMapType") {
        info.kind = BaseMapKind::from_label(value);
    } else if name.eq_ignore_ascii_case("Url") {
        info.url = value.to_string();
    } else if name.eq_ignore_ascii_case("UseProxy") {
        info.use_proxy = value.eq_ignore_ascii_case("true") || value == "1";
    }
    // Unknown elements are tolerated and skipped
}
