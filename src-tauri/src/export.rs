//! Spreadsheet and printable exports of the filtered registration table.
//!
//! Both renderings mirror the table's visible columns. The spreadsheet is CSV, which
//! every spreadsheet program opens; the printable document is a self-contained HTML
//! page with the signatures inlined, meant to be printed or saved as PDF from the
//! system viewer.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::form::is_valid_phone;
use crate::listing::CategoryFilter;
use crate::model::Registration;
use crate::storage::sanitize_filename;

pub const EXPORT_COLUMNS: [&str; 8] = [
    "Name",
    "Last Name",
    "Cédula",
    "Phone",
    "Email",
    "Tipo",
    "Date",
    "Signature",
];

/// Phone-shaped values in this column hold only digits and separators and are written
/// as shown; anything else in it is neutralized like the other cells.
const PHONE_COLUMN: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExportError {
    #[error("No hay registros para exportar")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportKind {
    Spreadsheet,
    Printable,
}

impl ExportKind {
    pub fn extension(self) -> &'static str {
        match self {
            ExportKind::Spreadsheet => "csv",
            ExportKind::Printable => "html",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportDocument {
    filter: CategoryFilter,
    generated_at: DateTime<Utc>,
    rows: Vec<Registration>,
    truncated: bool,
}

impl ExportDocument {
    /// `records` must already be filtered and ordered the way the table shows them.
    pub fn build(
        records: &[Registration],
        filter: CategoryFilter,
        generated_at: DateTime<Utc>,
        row_limit: usize,
    ) -> Result<Self, ExportError> {
        if records.is_empty() {
            return Err(ExportError::Empty);
        }
        let limit = row_limit.max(1);
        let rows: Vec<Registration> = records.iter().take(limit).cloned().collect();
        Ok(Self {
            filter,
            generated_at,
            truncated: records.len() > rows.len(),
            rows,
        })
    }

    pub fn rows(&self) -> &[Registration] {
        &self.rows
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn title(&self) -> String {
        match self.filter {
            CategoryFilter::All => "Registration Records".to_string(),
            CategoryFilter::Only(category) => format!("Registration Records - {}", category.label()),
        }
    }

    pub fn file_name(&self, kind: ExportKind) -> String {
        let millis = self.generated_at.timestamp_millis();
        let name = match self.filter {
            CategoryFilter::All => format!("registrations_{millis}.{}", kind.extension()),
            CategoryFilter::Only(category) => {
                format!("registrations_{}_{millis}.{}", category.as_str(), kind.extension())
            }
        };
        let fallback = format!("registrations.{}", kind.extension());
        sanitize_filename(name.as_str(), fallback.as_str())
    }

    pub fn render(&self, kind: ExportKind) -> String {
        match kind {
            ExportKind::Spreadsheet => self.to_csv(),
            ExportKind::Printable => self.to_html(),
        }
    }

    fn text_cells(record: &Registration) -> [String; 7] {
        [
            record.name.clone(),
            record.lastname.clone(),
            record.national_id.clone(),
            record.phone.clone(),
            record.email.clone(),
            record.category().label().to_string(),
            format_date(&record.timestamp),
        ]
    }

    pub fn to_csv(&self) -> String {
        let mut lines: Vec<String> = Vec::with_capacity(self.rows.len() + 1);
        lines.push(
            EXPORT_COLUMNS
                .iter()
                .map(|column| csv_escape(column))
                .collect::<Vec<_>>()
                .join(","),
        );
        for record in &self.rows {
            let mut cells: Vec<String> = Self::text_cells(record)
                .iter()
                .enumerate()
                .map(|(column, cell)| {
                    if column == PHONE_COLUMN && is_valid_phone(cell) {
                        csv_quote(cell)
                    } else {
                        csv_escape(cell)
                    }
                })
                .collect();
            let signed = if record.signature.is_empty() {
                "Not signed"
            } else {
                "Signed"
            };
            cells.push(signed.to_string());
            lines.push(cells.join(","));
        }
        lines.join("\n")
    }

    pub fn to_html(&self) -> String {
        let title = html_escape(self.title().as_str());
        let mut out = String::new();
        out.push_str("<!DOCTYPE html>\n<html lang=\"es\">\n<head>\n<meta charset=\"utf-8\">\n");
        out.push_str(format!("<title>{title}</title>\n").as_str());
        out.push_str(PRINT_STYLE);
        out.push_str("</head>\n<body>\n");
        out.push_str(format!("<h1>{title}</h1>\n").as_str());
        out.push_str(
            format!(
                "<p class=\"meta\">{} · {} registros</p>\n",
                format_date(&self.generated_at),
                self.rows.len()
            )
            .as_str(),
        );
        out.push_str("<table>\n<thead><tr>");
        for column in EXPORT_COLUMNS {
            out.push_str(format!("<th>{}</th>", html_escape(column)).as_str());
        }
        out.push_str("</tr></thead>\n<tbody>\n");
        for record in &self.rows {
            out.push_str("<tr>");
            for cell in Self::text_cells(record) {
                out.push_str(format!("<td>{}</td>", html_escape(cell.as_str())).as_str());
            }
            if record.signature.is_inline_image() {
                out.push_str(
                    format!(
                        "<td class=\"sig\"><img src=\"{}\" alt=\"Signature\"></td>",
                        html_escape(record.signature.as_str().trim())
                    )
                    .as_str(),
                );
            } else {
                out.push_str("<td class=\"sig\"></td>");
            }
            out.push_str("</tr>\n");
        }
        out.push_str("</tbody>\n</table>\n</body>\n</html>\n");
        out
    }
}

const PRINT_STYLE: &str = "<style>\n\
body { font-family: sans-serif; margin: 10mm; }\n\
h1 { text-align: center; font-size: 18pt; }\n\
.meta { text-align: center; color: #666; font-size: 9pt; }\n\
table { width: 100%; border-collapse: collapse; font-size: 10pt; }\n\
th { background: #424242; color: #fff; text-align: center; }\n\
th, td { border: 0.5pt solid #c8c8c8; padding: 4pt; vertical-align: middle; }\n\
td.sig { width: 30mm; height: 20mm; }\n\
td.sig img { width: 28mm; height: 14mm; object-fit: contain; }\n\
@media print { body { margin: 0; } }\n\
</style>\n";

fn format_date(value: &DateTime<Utc>) -> String {
    value.format("%Y-%m-%d %H:%M").to_string()
}

fn should_neutralize_csv(value: &str) -> bool {
    let trimmed = value.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('\'') {
        return false;
    }
    matches!(trimmed.chars().next(), Some('=') | Some('+') | Some('-') | Some('@'))
}

fn csv_escape(value: &str) -> String {
    if should_neutralize_csv(value) {
        csv_quote(format!("'{value}").as_str())
    } else {
        csv_quote(value)
    }
}

fn csv_quote(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn html_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
