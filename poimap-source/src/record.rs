use serde::de::value::MapAccessDeserializer;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A longitude/latitude pair, in that order, as geocoders report it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub longitude: f64,
    pub latitude: f64,
}

impl Coordinates {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.longitude.is_finite() && self.latitude.is_finite()
    }
}

/// Attachment-style cell (e.g. an uploaded image), only the url is used.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attachment {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

#[derive(Deserialize)]
struct AttachmentObject {
    url: String,
    #[serde(default)]
    filename: Option<String>,
}

struct AttachmentVisitor;

impl<'de> Visitor<'de> for AttachmentVisitor {
    type Value = Attachment;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an attachment object with a url")
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Attachment, A::Error> {
        let object = AttachmentObject::deserialize(MapAccessDeserializer::new(map))?;
        Ok(Attachment {
            url: object.url,
            filename: object.filename,
        })
    }
}

// Maps only; sequences belong to `FieldValue::List`.
impl<'de> Deserialize<'de> for Attachment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(AttachmentVisitor)
    }
}

/// Raw value of one field as the backing table delivers it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Attachment(Attachment),
    Attachments(Vec<Attachment>),
    List(Vec<FieldValue>),
    Other(serde_json::Value),
}

impl FieldValue {
    /// Trimmed textual form; blank strings yield `None`.
    pub fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            FieldValue::Number(n) if n.is_finite() => Some(n.to_string()),
            _ => None,
        }
    }

    /// Finite number, accepting numeric strings.
    pub fn as_number(&self) -> Option<f64> {
        let value = match self {
            FieldValue::Number(n) => *n,
            FieldValue::Text(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        value.is_finite().then_some(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

/// One row of the backing table: opaque id plus its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl SourceRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_shapes_from_json() {
        let json = r#"{
            "id": "rec1",
            "fields": {
                "Org Name": "Queens Gallery",
                "Latitude": 40.7,
                "Longitude": "-74.0",
                "Tags": ["Art", "Gallery"],
                "Image": [{"url": "https://img.example/a.png", "filename": "a.png"}],
                "Logo": {"url": "https://img.example/logo.png"},
                "Open": true,
                "Notes": null
            }
        }"#;

        let record: SourceRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.get("Org Name"), Some(&FieldValue::Text("Queens Gallery".into())));
        assert_eq!(record.get("Latitude"), Some(&FieldValue::Number(40.7)));
        assert!(matches!(record.get("Tags"), Some(FieldValue::List(items)) if items.len() == 2));
        assert!(matches!(record.get("Image"), Some(FieldValue::Attachments(items)) if items[0].url == "https://img.example/a.png"));
        assert!(matches!(record.get("Logo"), Some(FieldValue::Attachment(_))));
        assert_eq!(record.get("Open"), Some(&FieldValue::Bool(true)));
        assert_eq!(record.get("Notes"), Some(&FieldValue::Null));
    }

    #[test]
    fn test_short_string_lists_stay_lists() {
        let one: FieldValue = serde_json::from_str(r#"["Art"]"#).unwrap();
        let two: FieldValue = serde_json::from_str(r#"["Art", "Gallery"]"#).unwrap();

        assert_eq!(one, FieldValue::List(vec![FieldValue::from("Art")]));
        assert_eq!(
            two,
            FieldValue::List(vec![FieldValue::from("Art"), FieldValue::from("Gallery")])
        );
    }

    #[test]
    fn test_attachment_requires_an_object() {
        assert!(serde_json::from_str::<Attachment>(r#"["https://img/a.png"]"#).is_err());

        let attachment: Attachment =
            serde_json::from_str(r#"{"url": "https://img/a.png", "id": "att1", "size": 12}"#).unwrap();
        assert_eq!(attachment.url, "https://img/a.png");
        assert_eq!(attachment.filename, None);
    }

    #[test]
    fn test_as_number_accepts_numeric_strings() {
        assert_eq!(FieldValue::from(" 40.7 ").as_number(), Some(40.7));
        assert_eq!(FieldValue::from(-74.0).as_number(), Some(-74.0));
        assert_eq!(FieldValue::from("north").as_number(), None);
        assert_eq!(FieldValue::from("NaN").as_number(), None);
        assert_eq!(FieldValue::Null.as_number(), None);
    }

    #[test]
    fn test_as_text_trims_and_drops_blank() {
        assert_eq!(FieldValue::from("  hi ").as_text(), Some("hi".to_string()));
        assert_eq!(FieldValue::from("   ").as_text(), None);
        assert_eq!(FieldValue::from(12.0).as_text(), Some("12".to_string()));
    }
}
