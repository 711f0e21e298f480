use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::BytesRef;

/// XML 1.0 valid char ranges:
/// - 0x09, 0x0A, 0x0D
/// - 0x20..=0xD7FF
/// - 0xE000..=0xFFFD
/// - 0x10000..=0x10FFFF
fn is_valid_xml_char(c: char) -> bool {
    matches!(
        c as u32,
        0x09 | 0x0A | 0x0D | 0x20..=0xD7FF | 0xE000..=0xFFFD | 0x10000..=0x10FFFF
    )
}

/// Escapes text for SVG output, dropping chars XML cannot carry.
pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars().filter(|&c| is_valid_xml_char(c)) {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Strips a namespace prefix: `kml:Placemark` -> `Placemark`.
pub fn local_name(qualified: &[u8]) -> String {
    let local = match qualified.iter().rposition(|&b| b == b':') {
        Some(idx) => &qualified[idx + 1..],
        None => qualified,
    };
    String::from_utf8_lossy(local).into_owned()
}

/// Resolves `&amp;`-style and `&#233;`/`&#xE9;` references.
///
/// Unknown named entities are kept verbatim, since KML exporters do not
/// declare a DTD that could define them.
pub fn resolve_reference(reference: &BytesRef<'_>) -> String {
    let name = reference.decode().unwrap_or_default();
    if let Some(code) = name.strip_prefix('#') {
        let parsed = match code.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => code.parse::<u32>().ok(),
        };
        if let Some(c) = parsed.and_then(char::from_u32) {
            return c.to_string();
        }
    } else if let Some(resolved) = resolve_predefined_entity(&name) {
        return resolved.to_string();
    }
    format!("&{name};")
}
