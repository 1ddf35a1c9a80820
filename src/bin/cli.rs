#![cfg(not(tarpaulin_include))]

use clap::{Parser, Subcommand};
use greenhouse_logbook::catalog::Product;
use greenhouse_logbook::choices::{Plot, choices};
use greenhouse_logbook::config::StorageConfig;
use greenhouse_logbook::downloader;
use greenhouse_logbook::history::{DEFAULT_PAGE_SIZE, FilterQuery, paginate};
use greenhouse_logbook::record::{OperationDetails, Selection};
use greenhouse_logbook::recorder::Recorder;
use std::error::Error;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "logbook-cli", version, about = "Greenhouse operations logbook from the terminal")]
struct Cli {
    #[command(flatten)]
    storage: StorageConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the fixed selection lists
    Choices,
    /// Manage the product catalog
    Products {
        #[command(subcommand)]
        action: ProductAction,
    },
    /// Record an operation on one or more plots
    Record {
        #[arg(long)]
        greenhouse: String,
        #[arg(long = "plot", required = true)]
        plots: Vec<String>,
        #[arg(long)]
        crop: String,
        #[command(subcommand)]
        operation: OperationArgs,
    },
    /// List recorded operations, optionally exporting them
    History {
        #[arg(long, default_value = "all")]
        greenhouse: String,
        #[arg(long, default_value = "all")]
        crop: String,
        #[arg(long, default_value = "all")]
        operation: String,
        #[arg(long, default_value = "all")]
        treatment: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: usize,
        /// Write the filtered operations to a .xlsx or .csv file
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

#[derive(Debug, Subcommand)]
enum ProductAction {
    List,
    /// Show the product with this designation
    Show { designation: String },
    Add {
        #[command(flatten)]
        fields: ProductFields,
    },
    Edit {
        index: usize,
        #[command(flatten)]
        fields: ProductFields,
        /// Designation expected at this index
        #[arg(long)]
        expected: Option<String>,
    },
    Delete {
        index: usize,
        #[arg(long)]
        expected: Option<String>,
    },
}

#[derive(Debug, clap::Args)]
struct ProductFields {
    #[arg(long)]
    designation: String,
    #[arg(long)]
    dose: String,
    #[arg(long)]
    target: String,
    #[arg(long)]
    mode: Option<String>,
}

impl ProductFields {
    fn product(self) -> Product {
        Product {
            designation: self.designation,
            dose: self.dose,
            target: self.target,
            application_mode: self.mode,
        }
    }
}

#[derive(Debug, Subcommand)]
enum OperationArgs {
    /// Treatment with one or more catalog products
    Treatment {
        #[arg(long)]
        kind: String,
        #[arg(long = "product", required = true)]
        products: Vec<String>,
    },
    Irrigation {
        #[arg(long)]
        solution: String,
        #[arg(long)]
        ec: String,
    },
}

fn describe(p: &Product) -> String {
    let mut text = format!("{} | {} | {}", p.designation, p.dose, p.target);
    if let Some(mode) = &p.application_mode {
        text.push_str(" | ");
        text.push_str(mode);
    }
    text
}

fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let catalog = cli.storage.open_catalog();

    match cli.command {
        Command::Choices => {
            println!("{}", serde_json::to_string_pretty(&choices())?);
        }
        Command::Products { action } => match action {
            ProductAction::List => {
                for (i, p) in catalog.list()?.iter().enumerate() {
                    println!("{:>3}  {}", i, describe(p));
                }
            }
            ProductAction::Show { designation } => match catalog.find(&designation)? {
                Some(p) => println!("{}", describe(&p)),
                None => return Err(format!("no product named {:?}", designation).into()),
            },
            ProductAction::Add { fields } => {
                let p = catalog.add(&fields.product())?;
                println!("Product added: {} | {} | {}", p.designation, p.dose, p.target);
            }
            ProductAction::Edit {
                index,
                fields,
                expected,
            } => {
                let p = catalog.edit(index, &fields.product(), expected.as_deref())?;
                println!("Product modified: {} | {} | {}", p.designation, p.dose, p.target);
            }
            ProductAction::Delete { index, expected } => {
                let p = catalog.delete(index, expected.as_deref())?;
                println!("Product deleted: {}", p.designation);
            }
        },
        Command::Record {
            greenhouse,
            plots,
            crop,
            operation,
        } => {
            let details = match operation {
                OperationArgs::Treatment { kind, products } => OperationDetails::Treatment {
                    treatment: kind.parse()?,
                    products,
                },
                OperationArgs::Irrigation { solution, ec } => OperationDetails::Irrigation {
                    solution: solution.parse()?,
                    ec: ec.parse()?,
                },
            };
            let selection = Selection {
                greenhouse: greenhouse.parse()?,
                plots: plots
                    .iter()
                    .map(|p| p.parse::<Plot>())
                    .collect::<Result<_, _>>()?,
                crop: crop.parse()?,
                details,
            };
            let log = cli.storage.open_log()?;
            let recorded = Recorder::new(&catalog, log.as_ref()).record(&selection)?;
            println!(
                "Recorded in sheet {}: {}",
                recorded.worksheets.join(", "),
                recorded.record.details
            );
        }
        Command::History {
            greenhouse,
            crop,
            operation,
            treatment,
            page,
            page_size,
            export,
        } => {
            let filter = FilterQuery {
                greenhouse: Some(greenhouse),
                crop: Some(crop),
                operation: Some(operation),
                treatment: Some(treatment),
            }
            .parse()?;
            let log = cli.storage.open_log()?;
            let records = filter.apply(&log.read_all()?);

            if let Some(path) = export {
                let is_csv = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
                if is_csv {
                    std::fs::write(&path, downloader::to_csv(&records))?;
                } else {
                    std::fs::write(&path, downloader::to_xlsx(&records)?)?;
                }
                println!("Exported {} operation(s) to {}", records.len(), path.display());
                return Ok(());
            }

            let page = paginate(&records, page, page_size);
            for r in &page.items {
                println!(
                    "{}  {}{:<3} {:<18} {:<11} {}",
                    r.timestamp, r.greenhouse, r.plot, r.crop, r.operation, r.details
                );
            }
            println!(
                "page {}/{} - {} operation(s)",
                page.page, page.total_pages, page.total_items
            );
        }
    }

    Ok(())
}
