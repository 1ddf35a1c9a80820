//! Treatment product catalog stored in a local spreadsheet file.
//!
//! Every operation reads the whole file and, for mutations, rewrites it.
//! There is no locking between processes: concurrent writers race and the
//! last rewrite wins. Inside one process rewrites go through a mutex.

use crate::choices::ApplicationMode;
use crate::error::{LogbookError, Result};
use crate::workbook::{self, Sheet};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const CATALOG_SHEET: &str = "Produits";
pub const CATALOG_HEADER: [&str; 4] = ["Designation", "Dose", "Cible", "Mode d'application"];

/// Rows above the first product in the worksheet.
const HEADER_ROWS: usize = 1;

/// A treatment product. `designation` acts as a soft key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub designation: String,
    pub dose: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_mode: Option<String>,
}

impl Product {
    pub fn new(designation: &str, dose: &str, target: &str) -> Self {
        Product {
            designation: designation.to_string(),
            dose: dose.to_string(),
            target: target.to_string(),
            application_mode: None,
        }
    }

    pub fn with_mode(mut self, mode: ApplicationMode) -> Self {
        self.application_mode = Some(mode.label().to_string());
        self
    }

    /// Builds a product from a raw worksheet row. Missing cells read as
    /// empty; values are not interpreted.
    fn from_row(row: &[String]) -> Self {
        let cell = |i: usize| row.get(i).map(|s| s.trim().to_string()).unwrap_or_default();
        let mode = cell(3);
        Product {
            designation: cell(0),
            dose: cell(1),
            target: cell(2),
            application_mode: if mode.is_empty() { None } else { Some(mode) },
        }
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.designation.clone(),
            self.dose.clone(),
            self.target.clone(),
            self.application_mode.clone().unwrap_or_default(),
        ]
    }

    /// Trims every field and checks the required ones are present.
    fn normalized(&self) -> Result<Product> {
        let product = Product {
            designation: self.designation.trim().to_string(),
            dose: self.dose.trim().to_string(),
            target: self.target.trim().to_string(),
            application_mode: self
                .application_mode
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string),
        };
        if product.designation.is_empty() || product.dose.is_empty() || product.target.is_empty() {
            return Err(LogbookError::validation(
                "designation, dose and target are all required",
            ));
        }
        if let Some(mode) = &product.application_mode {
            mode.parse::<ApplicationMode>()?;
        }
        Ok(product)
    }
}

fn default_products() -> Vec<Product> {
    vec![
        Product::new("Vertimec", "50 cc/hl", "Acariens"),
        Product::new("Confidor", "30 cc/hl", "Insectes"),
    ]
}

fn same_designation(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// First product in `products` with this designation, ignoring case and
/// surrounding spaces as the duplicate check does.
pub fn find_product<'a>(products: &'a [Product], designation: &str) -> Option<&'a Product> {
    products
        .iter()
        .find(|p| same_designation(&p.designation, designation))
}

#[derive(Debug)]
pub struct ProductCatalog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ProductCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ProductCatalog {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the catalog file with its header and the default products
    /// when it does not exist yet.
    pub fn ensure_exists(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        info!("creating product catalog at {}", self.path.display());
        self.save(&default_products())
    }

    pub fn list(&self) -> Result<Vec<Product>> {
        self.ensure_exists()?;
        let sheets = workbook::read_workbook(&self.path)?;
        let Some(sheet) = sheets
            .iter()
            .find(|s| s.name == CATALOG_SHEET)
            .or_else(|| sheets.first())
        else {
            return Ok(Vec::new());
        };
        Ok(sheet
            .rows
            .iter()
            .skip(HEADER_ROWS)
            .filter(|row| !workbook::is_blank(row))
            .map(|row| Product::from_row(row))
            .collect())
    }

    pub fn find(&self, designation: &str) -> Result<Option<Product>> {
        Ok(find_product(&self.list()?, designation).cloned())
    }

    pub fn add(&self, product: &Product) -> Result<Product> {
        let product = product.normalized()?;
        let _guard = self.lock();
        let mut products = self.list()?;
        if products
            .iter()
            .any(|p| same_designation(&p.designation, &product.designation))
        {
            return Err(LogbookError::Conflict(format!(
                "product {:?} already exists",
                product.designation
            )));
        }
        products.push(product.clone());
        self.save(&products)?;
        info!(
            "product added: {} | {} | {}",
            product.designation, product.dose, product.target
        );
        Ok(product)
    }

    /// Replaces the product at `index`, keeping its position.
    ///
    /// When `expected` is given it must match the designation currently at
    /// `index`, otherwise the catalog changed since the caller listed it.
    pub fn edit(&self, index: usize, product: &Product, expected: Option<&str>) -> Result<Product> {
        let product = product.normalized()?;
        let _guard = self.lock();
        let mut products = self.list()?;
        check_index(&products, index, expected)?;
        if products
            .iter()
            .enumerate()
            .any(|(i, p)| i != index && same_designation(&p.designation, &product.designation))
        {
            return Err(LogbookError::Conflict(format!(
                "product {:?} already exists",
                product.designation
            )));
        }
        products[index] = product.clone();
        self.save(&products)?;
        info!(
            "product {} modified: {} | {} | {}",
            index, product.designation, product.dose, product.target
        );
        Ok(product)
    }

    /// Removes the product at `index`; the others keep their order.
    pub fn delete(&self, index: usize, expected: Option<&str>) -> Result<Product> {
        let _guard = self.lock();
        let mut products = self.list()?;
        check_index(&products, index, expected)?;
        let removed = products.remove(index);
        self.save(&products)?;
        info!("product {} deleted: {}", index, removed.designation);
        Ok(removed)
    }

    fn save(&self, products: &[Product]) -> Result<()> {
        let mut sheet = Sheet::with_header(CATALOG_SHEET, &CATALOG_HEADER);
        sheet.rows.extend(products.iter().map(Product::to_row));
        workbook::write_workbook(&self.path, &[sheet])
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        // the guarded data is (), so a poisoned lock carries no broken state
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn check_index(products: &[Product], index: usize, expected: Option<&str>) -> Result<()> {
    let Some(current) = products.get(index) else {
        return Err(LogbookError::NotFound(format!(
            "no product at index {} (catalog has {})",
            index,
            products.len()
        )));
    };
    if let Some(expected) = expected {
        if current.designation != expected.trim() {
            return Err(LogbookError::Conflict(format!(
                "product at index {} is now {:?}, not {:?}",
                index, current.designation, expected
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_with_missing_cells_reads_as_empty() {
        let product = Product::from_row(&["Karate".to_string()]);
        assert_eq!(product.designation, "Karate");
        assert_eq!(product.dose, "");
        assert_eq!(product.application_mode, None);
    }

    #[test]
    fn normalization_requires_all_fields() {
        assert!(Product::new("X", " ", "Y").normalized().is_err());
        let p = Product::new(" X ", "1 l/ha", "Mildiou").normalized().unwrap();
        assert_eq!(p.designation, "X");
    }

    #[test]
    fn unknown_application_mode_is_rejected() {
        let mut p = Product::new("X", "1", "Y");
        p.application_mode = Some("au hasard".into());
        assert!(matches!(p.normalized(), Err(LogbookError::Validation(_))));
    }

    #[test]
    fn find_returns_first_match_on_trimmed_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("produits.xlsx");
        let mut sheet = Sheet::with_header(CATALOG_SHEET, &CATALOG_HEADER);
        sheet.rows.push(Product::new("Switch", "1 kg/ha", "Botrytis").to_row());
        sheet.rows.push(Product::new("SWITCH", "2 kg/ha", "Botrytis").to_row());
        workbook::write_workbook(&path, &[sheet]).unwrap();
        let catalog = ProductCatalog::new(path);

        let found = catalog.find("  switch ").unwrap().unwrap();
        assert_eq!(found.dose, "1 kg/ha");
        assert!(catalog.find("Ortiva").unwrap().is_none());
    }
}
