use crate::error::{Error, Result};
use crate::record::{Placemark, RecordStore, check_coordinates};
use crate::xml::{local_name, resolve_reference};
use quick_xml::events::Event as XmlEvent;
use quick_xml::reader::Reader as XmlReader;
use std::fmt;
use std::path::Path;

/// Everything pulled out of one KML document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KmlDocument {
    /// Name of the outermost `Document`/`Folder`.
    pub title: Option<String>,
    pub description: Option<String>,
    pub placemarks: Vec<Placemark>,
    pub warnings: Vec<ExtractWarning>,
}

impl KmlDocument {
    pub fn into_store(self) -> RecordStore {
        RecordStore::new(self.placemarks).with_title(self.title)
    }
}

/// A `Placemark` element that did not yield a record.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractWarning {
    /// 1-based position among all `Placemark` elements.
    pub ordinal: usize,
    pub name: Option<String>,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    MissingName,
    MissingCoordinates,
    MalformedCoordinates { text: String, detail: String },
}

impl fmt::Display for ExtractWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "placemark #{}", self.ordinal)?;
        if let Some(name) = &self.name {
            write!(f, " ('{name}')")?;
        }
        match &self.reason {
            SkipReason::MissingName => write!(f, " has no name"),
            SkipReason::MissingCoordinates => write!(f, " has no point coordinates"),
            SkipReason::MalformedCoordinates { text, detail } => {
                write!(f, " has malformed coordinates '{text}': {detail}")
            }
        }
    }
}

const CONTAINERS: &[&str] = &["Document", "Folder"];

#[derive(Default)]
struct PlacemarkBuilder {
    ordinal: usize,
    /// Stack depth of the `Placemark` element itself.
    depth: usize,
    name: Option<String>,
    coordinates: Option<String>,
}

impl PlacemarkBuilder {
    fn finish(self) -> std::result::Result<Placemark, ExtractWarning> {
        let name = self.name.filter(|n| !n.is_empty());
        let warning = |reason| ExtractWarning {
            ordinal: self.ordinal,
            name: name.clone(),
            reason,
        };

        let Some(text) = self.coordinates.as_deref() else {
            return Err(warning(SkipReason::MissingCoordinates));
        };
        let (lon, lat, alt) = parse_coordinates(text).map_err(|detail| {
            warning(SkipReason::MalformedCoordinates {
                text: text.to_string(),
                detail,
            })
        })?;
        match &name {
            Some(n) => Ok(Placemark::new(n.clone(), lon, lat, alt)),
            None => Err(warning(SkipReason::MissingName)),
        }
    }
}

#[derive(Default)]
struct Extractor {
    stack: Vec<String>,
    text: String,
    current: Option<PlacemarkBuilder>,
    seen: usize,
    doc: KmlDocument,
}

impl Extractor {
    fn open(&mut self, name: String) {
        if name == "Placemark" && self.current.is_none() {
            self.seen += 1;
            self.current = Some(PlacemarkBuilder {
                ordinal: self.seen,
                depth: self.stack.len(),
                ..Default::default()
            });
        }
        self.stack.push(name);
        self.text.clear();
    }

    fn close(&mut self) {
        let Some(name) = self.stack.pop() else {
            return;
        };
        let text = std::mem::take(&mut self.text).trim().to_string();
        let parent = self.stack.last().map(String::as_str);

        if let Some(builder) = self.current.as_mut() {
            let depth = self.stack.len();
            match name.as_str() {
                "Placemark" if depth == builder.depth => {
                    if let Some(builder) = self.current.take() {
                        self.finish_placemark(builder);
                    }
                }
                "name" if depth == builder.depth + 1 => builder.name = Some(text),
                "coordinates" if builder.coordinates.is_none() => {
                    let in_point = self.stack[builder.depth..].iter().any(|e| e == "Point");
                    if in_point {
                        builder.coordinates = Some(text);
                    }
                }
                _ => {}
            }
            return;
        }

        if parent.is_some_and(|p| CONTAINERS.contains(&p)) {
            match name.as_str() {
                "name" if self.doc.title.is_none() && !text.is_empty() => {
                    tracing::debug!(title = %text, "document title");
                    self.doc.title = Some(text);
                }
                "description" if self.doc.description.is_none() && !text.is_empty() => {
                    tracing::debug!(description = %text, "document description");
                    self.doc.description = Some(text);
                }
                _ => {}
            }
        }
    }

    fn finish_placemark(&mut self, builder: PlacemarkBuilder) {
        match builder.finish() {
            Ok(placemark) => self.doc.placemarks.push(placemark),
            Err(warning) => {
                tracing::warn!("skipping {}", warning);
                self.doc.warnings.push(warning);
            }
        }
    }
}

/// Extracts placemarks and the document title from KML text.
///
/// Fails only when the markup itself is broken; individual placemarks
/// without a name or a usable coordinate tuple are reported in
/// [`KmlDocument::warnings`] instead.
pub fn extract(document: &str) -> Result<KmlDocument> {
    let mut reader = XmlReader::from_str(document);
    let mut extractor = Extractor::default();
    let mut saw_root = false;

    loop {
        match reader.read_event() {
            Ok(XmlEvent::Start(ref e)) => {
                saw_root = true;
                extractor.open(local_name(e.name().as_ref()));
            }
            Ok(XmlEvent::Empty(ref e)) => {
                saw_root = true;
                extractor.open(local_name(e.name().as_ref()));
                extractor.close();
            }
            Ok(XmlEvent::End(_)) => extractor.close(),
            Ok(XmlEvent::Text(ref e)) => {
                extractor.text.push_str(&e.decode().unwrap_or_default());
            }
            Ok(XmlEvent::GeneralRef(ref e)) => {
                extractor.text.push_str(&resolve_reference(e));
            }
            Ok(XmlEvent::CData(ref e)) => {
                extractor.text.push_str(&String::from_utf8_lossy(e));
            }
            Ok(XmlEvent::Eof) => break,
            Err(e) => {
                return Err(Error::Parse {
                    message: e.to_string(),
                    position: reader.error_position() as u64,
                });
            }
            _ => {}
        }
    }

    if let Some(open) = extractor.stack.last() {
        return Err(Error::Parse {
            message: format!("unexpected end of document inside <{open}>"),
            position: reader.buffer_position() as u64,
        });
    }
    if !saw_root {
        return Err(Error::Parse {
            message: "document has no root element".to_string(),
            position: 0,
        });
    }

    let doc = extractor.doc;
    tracing::debug!(
        placemarks = doc.placemarks.len(),
        skipped = doc.warnings.len(),
        "finished reading KML"
    );
    Ok(doc)
}

/// Parses a `lon,lat[,alt]` tuple; altitude defaults to 0.
pub fn parse_coordinates(text: &str) -> std::result::Result<(f64, f64, f64), String> {
    let parts: Vec<&str> = text.trim().split(',').map(str::trim).collect();
    if parts.len() != 2 && parts.len() != 3 {
        return Err(format!(
            "expected 2 or 3 comma-separated values, found {}",
            parts.len()
        ));
    }

    let number = |s: &str| {
        s.parse::<f64>()
            .map_err(|_| format!("'{s}' is not a number"))
    };
    let lon = number(parts[0])?;
    let lat = number(parts[1])?;
    let alt = match parts.get(2) {
        Some(s) => number(s)?,
        None => 0.0,
    };
    check_coordinates(lon, lat, alt)?;
    Ok((lon, lat, alt))
}

/// Reads a source file, reporting a missing path as [`Error::SourceNotFound`].
pub fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::io(path, e))
}

pub fn load_kml(path: &Path) -> Result<KmlDocument> {
    let text = read_source(path)?;
    tracing::info!(path = %path.display(), "reading KML");
    extract(&text)
}
