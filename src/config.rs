#![cfg(feature = "web")]
//! Command-line and environment settings shared by both binaries.

use crate::catalog::ProductCatalog;
use crate::error::{LogbookError, Result};
use crate::history::DEFAULT_PAGE_SIZE;
use crate::journal::{LocalWorkbookLog, OperationLog};
use crate::sheets::{DEFAULT_SPREADSHEET_NAME, GoogleSheetsLog, ServiceAccountKey, SheetsClient};
use clap::{Args, Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Local `.xlsx` workbook
    Local,
    /// Hosted Google spreadsheet
    Remote,
}

/// Where the catalog and the operation log live.
#[derive(Debug, Clone, Args)]
pub struct StorageConfig {
    /// Directory holding the local spreadsheet files
    #[arg(long, env = "LOGBOOK_DATA_DIR", default_value = ".")]
    pub data_dir: PathBuf,

    /// Product catalog file, relative to the data directory
    #[arg(long, env = "LOGBOOK_CATALOG_FILE", default_value = "produits.xlsx")]
    pub catalog_file: PathBuf,

    /// Operation log backend
    #[arg(long, env = "LOGBOOK_BACKEND", value_enum, default_value_t = Backend::Local)]
    pub backend: Backend,

    /// Local operation log workbook, relative to the data directory
    #[arg(long, env = "LOGBOOK_LOG_FILE", default_value = "suivi_operations.xlsx")]
    pub log_file: PathBuf,

    /// Name of the hosted spreadsheet
    #[arg(long, env = "LOGBOOK_SPREADSHEET", default_value = DEFAULT_SPREADSHEET_NAME)]
    pub spreadsheet: String,

    /// Service-account key file
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    pub credentials_file: Option<PathBuf>,

    /// Service-account key as inline JSON (takes precedence over the file)
    #[arg(long, env = "LOGBOOK_SERVICE_ACCOUNT_JSON", hide_env_values = true)]
    pub credentials_json: Option<String>,
}

impl StorageConfig {
    /// Local storage under `data_dir` with the default file names.
    pub fn local(data_dir: impl Into<PathBuf>) -> Self {
        StorageConfig {
            data_dir: data_dir.into(),
            catalog_file: PathBuf::from("produits.xlsx"),
            backend: Backend::Local,
            log_file: PathBuf::from("suivi_operations.xlsx"),
            spreadsheet: DEFAULT_SPREADSHEET_NAME.to_string(),
            credentials_file: None,
            credentials_json: None,
        }
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir.join(&self.catalog_file)
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join(&self.log_file)
    }

    pub fn open_catalog(&self) -> ProductCatalog {
        ProductCatalog::new(self.catalog_path())
    }

    fn service_account_key(&self) -> Result<ServiceAccountKey> {
        if let Some(json) = &self.credentials_json {
            return ServiceAccountKey::from_json(json);
        }
        if let Some(path) = &self.credentials_file {
            return ServiceAccountKey::from_file(path);
        }
        Err(LogbookError::Credentials(
            "the remote backend needs --credentials-file or LOGBOOK_SERVICE_ACCOUNT_JSON".into(),
        ))
    }

    pub fn open_log(&self) -> Result<Box<dyn OperationLog>> {
        match self.backend {
            Backend::Local => Ok(Box::new(LocalWorkbookLog::new(self.log_path()))),
            Backend::Remote => {
                let client = SheetsClient::new(self.service_account_key()?, &self.spreadsheet)?;
                Ok(Box::new(GoogleSheetsLog::new(client)))
            }
        }
    }
}

/// Settings of the web server.
#[derive(Debug, Clone, Parser)]
#[command(name = "logbook-web", version, about = "Greenhouse operations logbook")]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "LOGBOOK_BIND", default_value = "127.0.0.1:3000")]
    pub bind: String,

    /// Rows per history page
    #[arg(long, env = "LOGBOOK_PAGE_SIZE", default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    /// Logo shown above the forms
    #[arg(long, env = "LOGBOOK_LOGO", default_value = "logo.png")]
    pub logo: PathBuf,

    #[command(flatten)]
    pub storage: StorageConfig,
}
