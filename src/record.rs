use crate::catalog::{Product, find_product};
use crate::choices::{Crop, Ec, Greenhouse, OperationKind, Plot, Solution, TreatmentKind};
use crate::error::{LogbookError, Result};
use chrono::{DateTime, Local};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref WORKSHEET_KEY_REGEX: Regex = Regex::new(r"^[B-H]([1-9]|[12][0-9]|3[0-2])$").unwrap();
}

pub const LOG_HEADER: [&str; 6] = ["Date", "Serre", "Delta", "Culture", "Operation", "Details"];
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Separates products when a treatment uses several of them.
pub const PRODUCT_SEPARATOR: &str = " ; ";

/// Name of the worksheet holding the log of one plot, e.g. `B3`.
pub fn worksheet_key(greenhouse: Greenhouse, plot: Plot) -> String {
    format!("{}{}", greenhouse, plot)
}

/// Whether a worksheet title names a plot log. Other worksheets, such as
/// the default sheet of a new spreadsheet, are not part of the log.
pub fn is_worksheet_key(title: &str) -> bool {
    WORKSHEET_KEY_REGEX.is_match(title)
}

pub fn format_timestamp(at: DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// What was done, before it is resolved into a details string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum OperationDetails {
    #[serde(rename = "traitement")]
    Treatment {
        treatment: TreatmentKind,
        products: Vec<String>,
    },
    Irrigation { solution: Solution, ec: Ec },
}

impl OperationDetails {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationDetails::Treatment { .. } => OperationKind::Treatment,
            OperationDetails::Irrigation { .. } => OperationKind::Irrigation,
        }
    }
}

/// A complete form submission: where, what crop, and what was done.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub greenhouse: Greenhouse,
    pub plots: Vec<Plot>,
    pub crop: Crop,
    #[serde(flatten)]
    pub details: OperationDetails,
}

/// Renders one treatment product. Designations missing from the catalog
/// are written bare.
fn describe_product(treatment: TreatmentKind, designation: &str, product: Option<&Product>) -> String {
    match product {
        Some(p) => {
            let mut text = format!("{} - {} | {} | {}", treatment, p.designation, p.dose, p.target);
            if let Some(mode) = &p.application_mode {
                text.push_str(" | ");
                text.push_str(mode);
            }
            text
        }
        None => format!("{} - {}", treatment, designation.trim()),
    }
}

/// Builds the details column from the selection, looking treatment
/// products up in `catalog`.
pub fn compose_details(details: &OperationDetails, catalog: &[Product]) -> Result<String> {
    match details {
        OperationDetails::Treatment { treatment, products } => {
            let names: Vec<&str> = products
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect();
            if names.is_empty() {
                return Err(LogbookError::validation("select at least one product"));
            }
            Ok(names
                .iter()
                .map(|name| {
                    let found = find_product(catalog, name);
                    describe_product(*treatment, name, found)
                })
                .collect::<Vec<_>>()
                .join(PRODUCT_SEPARATOR))
        }
        OperationDetails::Irrigation { solution, ec } => Ok(format!("{} EC {}", solution, ec)),
    }
}

/// One row of a plot worksheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub timestamp: String,
    pub greenhouse: String,
    pub plot: String,
    pub crop: String,
    pub operation: String,
    pub details: String,
}

impl OperationRecord {
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.timestamp.clone(),
            self.greenhouse.clone(),
            self.plot.clone(),
            self.crop.clone(),
            self.operation.clone(),
            self.details.clone(),
        ]
    }

    /// Reads a stored row as is; cells beyond the sixth are ignored and
    /// missing ones read as empty.
    pub fn from_row(row: &[String]) -> Self {
        let cell = |i: usize| row.get(i).cloned().unwrap_or_default();
        OperationRecord {
            timestamp: cell(0),
            greenhouse: cell(1),
            plot: cell(2),
            crop: cell(3),
            operation: cell(4),
            details: cell(5),
        }
    }

    pub fn worksheet_key(&self) -> String {
        format!("{}{}", self.greenhouse, self.plot)
    }
}

/// Whether `row` is the header written at the top of each worksheet.
pub fn is_header(row: &[String]) -> bool {
    row.len() >= LOG_HEADER.len() && row.iter().zip(LOG_HEADER.iter()).all(|(a, b)| a == b)
}
