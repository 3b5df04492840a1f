// Popup content attached to every marker

use crate::normalize::NormalizedRecord;
use html_escape::{encode_double_quoted_attribute, encode_text};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Popup {
    pub title: String,
    pub address: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub tags: Option<String>,
    pub website: Option<String>,
    pub social: Option<String>,
    pub image_url: Option<String>,
}

impl Popup {
    pub fn from_record(record: &NormalizedRecord) -> Self {
        Self {
            title: record.org_name.clone(),
            address: record.address.clone(),
            email: record.email.clone(),
            phone: record.phone.clone(),
            tags: (!record.tags.is_empty()).then(|| record.tag_line()),
            website: record.website.clone(),
            social: record.social.clone(),
            image_url: record.image_url.clone(),
        }
    }

    /// Labelled rows in display order, skipping empty ones.
    pub fn rows(&self) -> Vec<(&'static str, &str)> {
        [
            ("Address", &self.address),
            ("Email", &self.email),
            ("Phone", &self.phone),
            ("Tags", &self.tags),
            ("Website", &self.website),
            ("Social", &self.social),
        ]
        .into_iter()
        .filter_map(|(label, value)| value.as_deref().map(|v| (label, v)))
        .collect()
    }

    pub fn to_html(&self) -> String {
        let mut html = String::from("<div class=\"poimap-popup\">\n");
        html.push_str(&format!("  <h3>{}</h3>\n", encode_text(&self.title)));

        for (label, value) in self.rows() {
            let body = match label {
                "Email" => format!(
                    "<a href=\"mailto:{}\">{}</a>",
                    encode_double_quoted_attribute(value),
                    encode_text(value)
                ),
                "Website" => format!(
                    "<a href=\"{}\" target=\"_blank\" rel=\"noopener\">{}</a>",
                    encode_double_quoted_attribute(value),
                    encode_text(value)
                ),
                _ => encode_text(value).to_string(),
            };
            html.push_str(&format!(
                "  <p><strong>{}:</strong><br>{}</p>\n",
                label, body
            ));
        }

        if let Some(ref image) = self.image_url {
            html.push_str(&format!(
                "  <img src=\"{}\" alt=\"{}\">\n",
                encode_double_quoted_attribute(image),
                encode_double_quoted_attribute(&self.title)
            ));
        }

        html.push_str("</div>");
        html
    }

    pub fn to_lines(&self) -> Vec<String> {
        let mut lines = vec![self.title.clone()];
        for (label, value) in self.rows() {
            lines.push(format!("{}: {}", label, value));
        }
        if let Some(ref image) = self.image_url {
            lines.push(format!("Image: {}", image));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> NormalizedRecord {
        NormalizedRecord {
            id: "rec1".to_string(),
            org_name: "Tom & Jerry's <Studio>".to_string(),
            address: Some("1 Main St".to_string()),
            email: Some("hi@example.org".to_string()),
            phone: None,
            website: Some("https://example.org/?a=1&b=2".to_string()),
            social: None,
            image_url: Some("https://img.example/a.png".to_string()),
            tags: vec!["Art".to_string(), "Music".to_string()],
            latitude: 40.7,
            longitude: -74.0,
        }
    }

    #[test]
    fn test_rows_skip_missing_fields() {
        let popup = Popup::from_record(&record());
        let labels: Vec<&str> = popup.rows().into_iter().map(|(label, _)| label).collect();
        assert_eq!(labels, vec!["Address", "Email", "Tags", "Website"]);
    }

    #[test]
    fn test_html_is_escaped() {
        let html = Popup::from_record(&record()).to_html();
        assert!(html.contains("<h3>Tom &amp; Jerry's &lt;Studio&gt;</h3>"));
        assert!(html.contains("href=\"mailto:hi@example.org\""));
        assert!(html.contains("href=\"https://example.org/?a=1&amp;b=2\""));
        assert!(html.contains("<img src=\"https://img.example/a.png\""));
    }

    #[test]
    fn test_text_lines() {
        let lines = Popup::from_record(&record()).to_lines();
        assert_eq!(lines[0], "Tom & Jerry's <Studio>");
        assert!(lines.contains(&"Tags: Art, Music".to_string()));
        assert_eq!(lines.last().unwrap(), "Image: https://img.example/a.png");
    }
}
