use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::model::{Point, RawPlacemark};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    FolderName,
    Name,
    Description,
    Coordinates,
    DataValue,
}

#[derive(Default)]
struct PendingPlacemark {
    name: Option<String>,
    description: String,
    coordinates: Option<String>,
    extended: BTreeMap<String, String>,
}

/// Parse a KML document into placemarks. Namespace prefixes are ignored, so
/// both `<kml xmlns=...>` and bare documents work. Each placemark carries the
/// name of its innermost enclosing folder as its group.
pub fn parse_placemarks(xml: &str) -> Result<Vec<RawPlacemark>> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut placemarks = Vec::new();
    let mut buf = Vec::new();

    // one entry per open <Folder>, holding its name once seen
    let mut folders: Vec<Option<String>> = Vec::new();
    let mut current: Option<PendingPlacemark> = None;
    let mut field: Option<Field> = None;
    let mut text = String::new();
    let mut in_point = false;
    let mut data_name: Option<String> = None;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            PipelineError::parse(format!(
                "at byte {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;
        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"Folder" => folders.push(None),
                b"Placemark" => current = Some(PendingPlacemark::default()),
                b"Point" if current.is_some() => in_point = true,
                b"Data" if current.is_some() => data_name = attribute(&e, b"name")?,
                b"name" if current.is_some() => begin(&mut field, &mut text, Field::Name),
                b"name" if matches!(folders.last(), Some(None)) => {
                    begin(&mut field, &mut text, Field::FolderName)
                }
                b"description" if current.is_some() => {
                    begin(&mut field, &mut text, Field::Description)
                }
                b"coordinates" if in_point => begin(&mut field, &mut text, Field::Coordinates),
                b"value" if data_name.is_some() => begin(&mut field, &mut text, Field::DataValue),
                _ => {}
            },
            Event::Text(e) if field.is_some() => text.push_str(&e.unescape()?),
            Event::CData(e) if field.is_some() => {
                text.push_str(&String::from_utf8_lossy(&e));
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"Folder" => {
                    folders.pop();
                }
                b"Placemark" => {
                    if let Some(pending) = current.take() {
                        let group = folders.iter().rev().flatten().next().cloned();
                        if let Some(placemark) = finish(pending, group)? {
                            placemarks.push(placemark);
                        }
                    }
                    in_point = false;
                }
                b"Point" => in_point = false,
                b"Data" => data_name = None,
                _ => {
                    if let Some(done) = field.take() {
                        let value = std::mem::take(&mut text).trim().to_string();
                        store(done, value, &mut folders, current.as_mut(), &data_name);
                    }
                }
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if current.is_some() || !folders.is_empty() {
        return Err(PipelineError::parse("unexpected end of document"));
    }
    debug!("Parsed {} placemarks", placemarks.len());
    Ok(placemarks)
}

fn begin(field: &mut Option<Field>, text: &mut String, which: Field) {
    *field = Some(which);
    text.clear();
}

fn store(
    field: Field,
    value: String,
    folders: &mut [Option<String>],
    current: Option<&mut PendingPlacemark>,
    data_name: &Option<String>,
) {
    match (field, current) {
        (Field::FolderName, _) => {
            if let Some(slot) = folders.last_mut() {
                *slot = Some(value);
            }
        }
        (Field::Name, Some(p)) if !value.is_empty() => p.name = Some(value),
        (Field::Description, Some(p)) => p.description = value,
        (Field::Coordinates, Some(p)) => p.coordinates = Some(value),
        (Field::DataValue, Some(p)) => {
            if let Some(key) = data_name {
                if !value.is_empty() {
                    p.extended.insert(key.clone(), value);
                }
            }
        }
        _ => {}
    }
}

fn attribute(e: &BytesStart, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Placemarks with neither a name nor a point carry nothing worth keeping.
fn finish(pending: PendingPlacemark, group: Option<String>) -> Result<Option<RawPlacemark>> {
    let point = match pending.coordinates.as_deref() {
        Some(raw) if !raw.is_empty() => Some(parse_point(raw)?),
        _ => None,
    };
    if pending.name.is_none() && point.is_none() {
        return Ok(None);
    }
    Ok(Some(RawPlacemark {
        name: pending.name,
        description: pending.description,
        group,
        point,
        extended: pending.extended,
    }))
}

/// `lon,lat[,alt]`; only the first tuple is used when several are present.
/// Spaces after the commas are allowed.
pub fn parse_point(raw: &str) -> Result<Point> {
    let tuple = first_tuple(raw);
    let values = tuple
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| PipelineError::parse(format!("invalid coordinates '{}'", raw)))?;
    match values.as_slice() {
        [lon, lat] => Ok(Point {
            longitude: *lon,
            latitude: *lat,
            altitude: None,
        }),
        [lon, lat, alt, ..] => Ok(Point {
            longitude: *lon,
            latitude: *lat,
            altitude: Some(*alt),
        }),
        _ => Err(PipelineError::parse(format!("invalid coordinates '{}'", raw))),
    }
}

/// Tuples are separated by whitespace; a token that ends or starts with a
/// comma belongs to the tuple being read.
fn first_tuple(raw: &str) -> String {
    let mut tuple = String::new();
    for token in raw.split_whitespace() {
        if !tuple.is_empty() && !tuple.ends_with(',') && !token.starts_with(',') {
            break;
        }
        tuple.push_str(token);
    }
    tuple
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Document>
    <name>Marrakech</name>
    <Folder>
      <name>Squares &amp; Parks</name>
      <Placemark>
        <name>Jemaa el-Fna</name>
        <description><![CDATA[Main square<br>Founded: 1070]]></description>
        <Point>
          <coordinates>
            -7.989,31.6258,0
          </coordinates>
        </Point>
        <ExtendedData>
          <Data name="gx_media_links"><value>https://example.com/a.jpg</value></Data>
        </ExtendedData>
      </Placemark>
      <Placemark>
        <name>No point here</name>
      </Placemark>
      <Placemark>
        <description>nameless and pointless</description>
      </Placemark>
    </Folder>
    <Placemark>
      <name>Loose</name>
      <Point><coordinates>-8.0,31.0</coordinates></Point>
    </Placemark>
  </Document>
</kml>"#;

    #[test]
    fn parses_folders_and_placemarks() {
        let placemarks = parse_placemarks(DOC).unwrap();
        assert_eq!(placemarks.len(), 3);

        let first = &placemarks[0];
        assert_eq!(first.name.as_deref(), Some("Jemaa el-Fna"));
        assert_eq!(first.group.as_deref(), Some("Squares & Parks"));
        assert_eq!(first.description, "Main square<br>Founded: 1070");
        let point = first.point.unwrap();
        assert_eq!(point.longitude, -7.989);
        assert_eq!(point.latitude, 31.6258);
        assert_eq!(point.altitude, Some(0.0));
        assert_eq!(
            first.extended.get("gx_media_links").map(String::as_str),
            Some("https://example.com/a.jpg")
        );

        assert_eq!(placemarks[1].name.as_deref(), Some("No point here"));
        assert!(placemarks[1].point.is_none());

        assert_eq!(placemarks[2].name.as_deref(), Some("Loose"));
        assert_eq!(placemarks[2].group, None);
        assert_eq!(placemarks[2].point.unwrap().altitude, None);
    }

    #[test]
    fn works_without_namespace() {
        let xml = "<kml><Document><Folder><name>Lakes</name><Placemark><name>Lalla Takerkoust</name>\
                   <Point><coordinates>-8.13,31.36</coordinates></Point></Placemark></Folder></Document></kml>";
        let placemarks = parse_placemarks(xml).unwrap();
        assert_eq!(placemarks.len(), 1);
        assert_eq!(placemarks[0].group.as_deref(), Some("Lakes"));
    }

    #[test]
    fn nested_folders_use_innermost_name() {
        let xml = "<kml><Folder><name>Outer</name><Folder><name>Inner</name>\
                   <Placemark><name>A</name></Placemark></Folder>\
                   <Placemark><name>B</name></Placemark></Folder></kml>";
        let placemarks = parse_placemarks(xml).unwrap();
        assert_eq!(placemarks[0].group.as_deref(), Some("Inner"));
        assert_eq!(placemarks[1].group.as_deref(), Some("Outer"));
    }

    #[test]
    fn coordinates_with_spaces_after_commas() {
        let p = parse_point(" -7.98, 31.62, 0 ").unwrap();
        assert_eq!((p.longitude, p.latitude, p.altitude), (-7.98, 31.62, Some(0.0)));

        let p = parse_point("-7.98,31.62,0 -7.5,31.0,0").unwrap();
        assert_eq!((p.longitude, p.latitude), (-7.98, 31.62));

        let p = parse_point("-7.98, 31.62 -7.5, 31.0").unwrap();
        assert_eq!((p.longitude, p.latitude, p.altitude), (-7.98, 31.62, None));
    }

    #[test]
    fn bad_coordinates_are_fatal() {
        let xml = "<kml><Placemark><name>A</name><Point><coordinates>abc</coordinates></Point></Placemark></kml>";
        assert!(matches!(parse_placemarks(xml), Err(PipelineError::Parse(_))));
    }

    #[test]
    fn malformed_markup_is_fatal() {
        let xml = "<kml><Placemark><name>A</name></Folder></kml>";
        assert!(parse_placemarks(xml).is_err());
    }

    #[test]
    fn truncated_document_is_fatal() {
        let xml = "<kml><Document><Placemark><name>A</name>";
        assert!(matches!(parse_placemarks(xml), Err(PipelineError::Parse(_))));
    }
}
