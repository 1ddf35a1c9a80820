use crate::catalog::ProductCatalog;
use crate::error::{LogbookError, Result};
use crate::journal::OperationLog;
use crate::record::{
    OperationDetails, OperationRecord, Selection, compose_details, format_timestamp, worksheet_key,
};
use chrono::{DateTime, Local};
use log::{info, warn};
use serde::Serialize;

/// Outcome of a successful submission.
#[derive(Debug, Clone, Serialize)]
pub struct Recorded {
    pub worksheets: Vec<String>,
    pub record: OperationRecord,
}

/// Turns form selections into rows of the operation log.
pub struct Recorder<'a> {
    catalog: &'a ProductCatalog,
    log: &'a dyn OperationLog,
}

impl<'a> Recorder<'a> {
    pub fn new(catalog: &'a ProductCatalog, log: &'a dyn OperationLog) -> Self {
        Recorder { catalog, log }
    }

    pub fn record(&self, selection: &Selection) -> Result<Recorded> {
        self.record_at(selection, Local::now())
    }

    /// Appends one row per selected plot, in order, all stamped `at`.
    ///
    /// Plots are written one after the other with no rollback; if one fails
    /// the error lists the worksheets that were already written.
    pub fn record_at(&self, selection: &Selection, at: DateTime<Local>) -> Result<Recorded> {
        if selection.plots.is_empty() {
            return Err(LogbookError::validation("select at least one plot"));
        }
        let products = match selection.details {
            OperationDetails::Treatment { .. } => self.catalog.list()?,
            OperationDetails::Irrigation { .. } => Vec::new(),
        };
        let details = compose_details(&selection.details, &products)?;

        let mut record = OperationRecord {
            timestamp: format_timestamp(at),
            greenhouse: selection.greenhouse.to_string(),
            plot: String::new(),
            crop: selection.crop.to_string(),
            operation: selection.details.kind().to_string(),
            details,
        };

        let mut written = Vec::with_capacity(selection.plots.len());
        for plot in &selection.plots {
            let key = worksheet_key(selection.greenhouse, *plot);
            record.plot = plot.to_string();
            if let Err(e) = self.log.append(&key, &record.to_row()) {
                if written.is_empty() {
                    return Err(e);
                }
                warn!("recording stopped at {} after writing {:?}: {}", key, written, e);
                return Err(LogbookError::PartialWrite {
                    written,
                    failed: key,
                    source: Box::new(e),
                });
            }
            written.push(key);
        }

        info!("recorded {} in {:?}: {}", record.operation, written, record.details);
        Ok(Recorded {
            worksheets: written,
            record,
        })
    }
}
