/*!
# Greenhouse Operations Logbook

A small data-entry application for a nursery: pick a greenhouse, one or
more plots, a crop and an operation (treatment or irrigation), and append a
timestamped row to the log of each plot.

## Overview

Two stores cooperate:

- **Product catalog**: treatment products (designation, dose, target,
  optional application mode) kept in a local `.xlsx` file, read whole and
  rewritten on every change.
- **Operation log**: one worksheet per (greenhouse, plot), named for
  example `B3`, append-only. It lives either in a local `.xlsx` workbook or
  in a hosted Google spreadsheet.

## Flow

1. The selection form offers the fixed lists of [`choices`].
2. The user may maintain the [`catalog`].
3. On submit the [`recorder`] builds the details string ([`record`]),
   resolves or creates the worksheet of each plot and appends one row per
   plot through a [`journal::OperationLog`].
4. The [`history`] view filters the loaded log, paginates it and the
   [`downloader`] exports the filtered rows.

## Modules

- **choices**: greenhouses, plots, crops, operation and treatment kinds,
  irrigation solutions, EC values, application modes
- **catalog**: product catalog CRUD
- **record**: details composition and the log row layout
- **journal**: the operation log trait and its local workbook backend
- **sheets**: the hosted spreadsheet backend (`web` feature)
- **recorder**: one submission, one row per plot
- **history**: filters and pagination
- **downloader**: CSV and XLSX export
- **workbook**: whole-file `.xlsx` read and rewrite
- **config**, **app**: settings and the HTTP layer (`web` feature)
*/

pub mod catalog;
pub mod choices;
pub mod downloader;
pub mod error;
pub mod history;
pub mod journal;
pub mod record;
pub mod recorder;
pub mod workbook;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod config;
#[cfg(feature = "web")]
pub mod sheets;

pub use catalog::{Product, ProductCatalog};
pub use error::{LogbookError, Result};
pub use journal::{LocalWorkbookLog, OperationLog};
pub use record::{OperationDetails, OperationRecord, Selection};
pub use recorder::{Recorded, Recorder};
