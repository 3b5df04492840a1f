// Report generation from a loaded session

use crate::normalize::DroppedRow;
use crate::popup::Popup;
use crate::resolver::WriteBackSummary;
use crate::session::{LoadReport, MapSession};
use crate::surface::RenderSurface;
use colored::Colorize;
use html_escape::{encode_double_quoted_attribute, encode_text};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
    Html,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            "html" => Some(ReportFormat::Html),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportData {
    pub source: String,
    pub grouping: String,
    pub generation: u64,
    pub fetched: usize,
    pub rendered: usize,
    pub geocoded: usize,
    pub visible: usize,
    pub categories: Vec<CategoryData>,
    pub markers: Vec<MarkerData>,
    pub dropped: Vec<DroppedRow>,
    pub write_back: WriteBackSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryData {
    pub key: String,
    pub color: String,
    pub checked: bool,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarkerData {
    pub id: usize,
    pub org_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub color: String,
    pub visible: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip)]
    pub popup: Popup,
}

pub fn gather_report_data<S: RenderSurface>(
    session: &MapSession<S>,
    load: &LoadReport,
    source: &str,
) -> ReportData {
    let categories = session
        .legend()
        .sections()
        .iter()
        .map(|section| CategoryData {
            key: section.key.clone(),
            color: section.color.clone(),
            checked: section.checked,
            members: section.members.iter().map(|m| m.label.clone()).collect(),
        })
        .collect();

    let markers = session
        .index()
        .entries()
        .iter()
        .map(|entry| MarkerData {
            id: entry.id.0,
            org_name: entry.record.org_name.clone(),
            latitude: entry.record.latitude,
            longitude: entry.record.longitude,
            color: entry.color.clone(),
            visible: entry.visible,
            tags: entry.record.tags.clone(),
            popup: Popup::from_record(&entry.record),
        })
        .collect();

    ReportData {
        source: source.to_string(),
        grouping: session.legend().mode.as_str().to_string(),
        generation: load.generation,
        fetched: load.fetched,
        rendered: load.rendered,
        geocoded: load.geocoded,
        visible: session.index().visible_count(),
        categories,
        markers,
        dropped: load.dropped.clone(),
        write_back: load.write_back,
    }
}

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

fn section_header(report: &mut String, title: &str) {
    report.push_str(RULE);
    report.push('\n');
    report.push_str(&format!("{}\n", title.bold()));
    report.push_str(RULE);
    report.push_str("\n\n");
}

pub fn generate_text_report(data: &ReportData) -> String {
    let mut report = String::new();

    report.push_str(RULE);
    report.push('\n');
    report.push_str("                              POIMAP LOAD REPORT\n");
    report.push_str(RULE);
    report.push_str("\n\n");

    report.push_str(&format!("Source:       {}\n", data.source));
    report.push_str(&format!("Cycle:        {}\n", data.generation));
    report.push_str(&format!("Grouping:     {}\n", data.grouping));
    report.push_str(&format!("Rows:         {}\n", data.fetched));
    report.push_str(&format!("Markers:      {} ({} visible)\n", data.rendered, data.visible));
    report.push_str(&format!("Geocoded:     {}\n", data.geocoded));
    report.push_str(&format!("Dropped:      {}\n", data.dropped.len()));
    if data.write_back.issued > 0 {
        report.push_str(&format!(
            "Write-backs:  {} issued, {} failed\n",
            data.write_back.issued, data.write_back.failed
        ));
    }
    report.push('\n');

    section_header(&mut report, "LEGEND");
    if data.categories.is_empty() {
        report.push_str("  (no categories)\n");
    }
    for category in &data.categories {
        let swatch = match crate::color::hex_to_rgb(&category.color) {
            Some((r, g, b)) => "■".truecolor(r, g, b).to_string(),
            None => "■".to_string(),
        };
        let checkbox = if category.checked { "[x]" } else { "[ ]" };
        report.push_str(&format!(
            "{} {} {}  {}  ({})\n",
            checkbox,
            swatch,
            category.key,
            category.color,
            category.members.len()
        ));
        for member in &category.members {
            report.push_str(&format!("      - {}\n", member));
        }
    }
    report.push('\n');

    section_header(&mut report, "MARKERS");
    for marker in &data.markers {
        let state = if marker.visible { "" } else { "  (hidden)" };
        report.push_str(&format!(
            "#{:<4} {}  [{:.5}, {:.5}]{}\n",
            marker.id, marker.org_name, marker.longitude, marker.latitude, state
        ));
    }
    report.push('\n');

    if !data.dropped.is_empty() {
        section_header(&mut report, "DROPPED ROWS");
        for row in &data.dropped {
            report.push_str(&format!(
                "  {} {} ({}): {}\n",
                "✗".red(),
                row.org_name,
                row.id,
                row.reason
            ));
        }
        report.push('\n');
    }

    report
}

pub fn generate_json_report(data: &ReportData) -> Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "poimap",
                "version": env!("CARGO_PKG_VERSION"),
                "format": "json"
            },
            "load": {
                "source": data.source,
                "generation": data.generation,
                "grouping": data.grouping,
                "fetched": data.fetched,
                "rendered": data.rendered,
                "visible": data.visible,
                "geocoded": data.geocoded,
                "write_back": data.write_back
            },
            "legend": data.categories,
            "markers": data.markers,
            "dropped": data.dropped
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn generate_html_report(data: &ReportData) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(&format!(
        "<title>poimap: {}</title>\n",
        encode_text(&data.source)
    ));
    html.push_str(
        "<style>\n\
         body { font-family: sans-serif; margin: 2em; }\n\
         .swatch { display: inline-block; width: 1em; height: 1em; margin-right: .5em; }\n\
         .hidden { opacity: .5; }\n\
         .poimap-popup { border: 1px solid #ccc; padding: .5em; margin: .5em 0; }\n\
         </style>\n</head>\n<body>\n",
    );
    html.push_str(&format!(
        "<h1>{}</h1>\n<p>{} markers from {} rows, {} geocoded, {} dropped.</p>\n",
        encode_text(&data.source),
        data.rendered,
        data.fetched,
        data.geocoded,
        data.dropped.len()
    ));

    html.push_str("<h2>Legend</h2>\n<ul class=\"legend\">\n");
    for category in &data.categories {
        html.push_str(&format!(
            "  <li><span class=\"swatch\" style=\"background:{}\"></span>{}<ul>\n",
            encode_double_quoted_attribute(&category.color),
            encode_text(&category.key)
        ));
        for member in &category.members {
            html.push_str(&format!("    <li>{}</li>\n", encode_text(member)));
        }
        html.push_str("  </ul></li>\n");
    }
    html.push_str("</ul>\n");

    html.push_str("<h2>Markers</h2>\n");
    for marker in &data.markers {
        let class = if marker.visible { "marker" } else { "marker hidden" };
        html.push_str(&format!(
            "<section class=\"{}\" data-lng=\"{}\" data-lat=\"{}\" data-color=\"{}\">\n{}\n</section>\n",
            class,
            marker.longitude,
            marker.latitude,
            encode_double_quoted_attribute(&marker.color),
            marker.popup.to_html()
        ));
    }

    if !data.dropped.is_empty() {
        html.push_str("<h2>Dropped rows</h2>\n<ul>\n");
        for row in &data.dropped {
            html.push_str(&format!(
                "  <li>{} ({}): {}</li>\n",
                encode_text(&row.org_name),
                encode_text(&row.id),
                encode_text(&row.reason.to_string())
            ));
        }
        html.push_str("</ul>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

pub fn generate_report(data: &ReportData, format: ReportFormat) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(data)),
        ReportFormat::Json => generate_json_report(data),
        ReportFormat::Html => Ok(generate_html_report(data)),
    }
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
