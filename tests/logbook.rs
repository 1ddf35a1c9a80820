use chrono::{Local, TimeZone};
use greenhouse_logbook::catalog::{CATALOG_HEADER, Product, ProductCatalog};
use greenhouse_logbook::choices::{Crop, Ec, Greenhouse, Plot, Solution, TreatmentKind};
use greenhouse_logbook::downloader;
use greenhouse_logbook::history::{Filter, FilterQuery};
use greenhouse_logbook::journal::{LocalWorkbookLog, OperationLog};
use greenhouse_logbook::record::{OperationDetails, Selection, is_header};
use greenhouse_logbook::recorder::Recorder;
use greenhouse_logbook::workbook;
use greenhouse_logbook::LogbookError;

fn plots(labels: &[&str]) -> Vec<Plot> {
    labels.iter().map(|p| p.parse().unwrap()).collect()
}

fn irrigation(greenhouse: Greenhouse, plot_labels: &[&str], crop: Crop) -> Selection {
    Selection {
        greenhouse,
        plots: plots(plot_labels),
        crop,
        details: OperationDetails::Irrigation {
            solution: Solution::Ab,
            ec: Ec::Ec2,
        },
    }
}

fn treatment(greenhouse: Greenhouse, plot_labels: &[&str], products: &[&str]) -> Selection {
    Selection {
        greenhouse,
        plots: plots(plot_labels),
        crop: Crop::Tomato,
        details: OperationDetails::Treatment {
            treatment: TreatmentKind::Acaricide,
            products: products.iter().map(|p| p.to_string()).collect(),
        },
    }
}

#[test]
fn missing_catalog_is_created_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = ProductCatalog::new(dir.path().join("produits.xlsx"));

    let products = catalog.list().unwrap();

    assert_eq!(products.len(), 2);
    assert_eq!(products[0], Product::new("Vertimec", "50 cc/hl", "Acariens"));
    assert_eq!(products[1], Product::new("Confidor", "30 cc/hl", "Insectes"));

    let sheets = workbook::read_workbook(catalog.path()).unwrap();
    assert_eq!(sheets[0].name, "Produits");
    assert_eq!(sheets[0].rows[0], CATALOG_HEADER.map(String::from).to_vec());
}

#[test]
fn added_product_is_listed_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = ProductCatalog::new(dir.path().join("produits.xlsx"));

    catalog.add(&Product::new("Karate Zeon", "20 cc/hl", "Pucerons")).unwrap();
    let products = catalog.list().unwrap();

    let matches = products.iter().filter(|p| p.designation == "Karate Zeon").count();
    assert_eq!(matches, 1);
    assert_eq!(products.last().unwrap().target, "Pucerons");
}

#[test]
fn duplicate_designation_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = ProductCatalog::new(dir.path().join("produits.xlsx"));

    let err = catalog.add(&Product::new("vertimec", "1 l/ha", "Acariens")).unwrap_err();

    assert!(matches!(err, LogbookError::Conflict(_)));
    assert_eq!(catalog.list().unwrap().len(), 2);
}

#[test]
fn delete_by_index_keeps_remaining_order() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = ProductCatalog::new(dir.path().join("produits.xlsx"));
    catalog.add(&Product::new("Switch", "1 kg/ha", "Botrytis")).unwrap();
    catalog.add(&Product::new("Ortiva", "1 l/ha", "Oïdium")).unwrap();

    let removed = catalog.delete(1, None).unwrap();

    assert_eq!(removed.designation, "Confidor");
    let names: Vec<_> = catalog.list().unwrap().into_iter().map(|p| p.designation).collect();
    assert_eq!(names, vec!["Vertimec", "Switch", "Ortiva"]);
}

#[test]
fn edit_keeps_position_and_checks_expected_designation() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = ProductCatalog::new(dir.path().join("produits.xlsx"));

    let stale = catalog.edit(0, &Product::new("X", "1", "Y"), Some("Confidor"));
    assert!(matches!(stale, Err(LogbookError::Conflict(_))));

    catalog
        .edit(0, &Product::new("Vertimec", "60 cc/hl", "Acariens"), Some("Vertimec"))
        .unwrap();
    let products = catalog.list().unwrap();
    assert_eq!(products[0].dose, "60 cc/hl");
    assert_eq!(products[1].designation, "Confidor");

    assert!(matches!(catalog.delete(5, None), Err(LogbookError::NotFound(_))));
}

#[test]
fn irrigation_row_has_the_log_layout() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = ProductCatalog::new(dir.path().join("produits.xlsx"));
    let log = LocalWorkbookLog::new(dir.path().join("suivi.xlsx"));
    let at = Local.with_ymd_and_hms(2024, 5, 1, 7, 30, 0).unwrap();

    let recorded = Recorder::new(&catalog, &log)
        .record_at(&irrigation(Greenhouse::B, &["3"], Crop::Tomato), at)
        .unwrap();

    assert_eq!(recorded.worksheets, vec!["B3"]);
    let rows = log.worksheet("B3").unwrap().unwrap();
    assert_eq!(rows.len(), 2);
    assert!(is_header(&rows[0]));
    assert_eq!(
        rows[1],
        vec!["2024-05-01 07:30", "B", "3", "tomate", "irrigation", "AB EC 2"]
    );
}

#[test]
fn each_submission_adds_one_row_per_plot() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = ProductCatalog::new(dir.path().join("produits.xlsx"));
    let log = LocalWorkbookLog::new(dir.path().join("suivi.xlsx"));
    let recorder = Recorder::new(&catalog, &log);

    for greenhouse in [Greenhouse::B, Greenhouse::H] {
        recorder.record(&irrigation(greenhouse, &["1", "32"], Crop::Lettuce)).unwrap();
    }
    recorder.record(&irrigation(Greenhouse::B, &["1"], Crop::Lettuce)).unwrap();

    let b1 = log.worksheet("B1").unwrap().unwrap();
    assert_eq!(b1.len(), 3);
    assert!(b1[1..].iter().all(|row| !row[0].is_empty()));
    assert_eq!(log.worksheet("H32").unwrap().unwrap().len(), 2);
    assert_eq!(log.read_all().unwrap().len(), 5);
}

#[test]
fn treatment_details_come_from_the_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = ProductCatalog::new(dir.path().join("produits.xlsx"));
    let log = LocalWorkbookLog::new(dir.path().join("suivi.xlsx"));

    let recorded = Recorder::new(&catalog, &log)
        .record(&treatment(Greenhouse::E, &["7"], &["Vertimec", "Inconnu"]))
        .unwrap();

    assert_eq!(
        recorded.record.details,
        "acaricide - Vertimec | 50 cc/hl | Acariens ; acaricide - Inconnu"
    );
    assert_eq!(recorded.record.operation, "traitement");
}

#[test]
fn filter_then_export_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = ProductCatalog::new(dir.path().join("produits.xlsx"));
    let log = LocalWorkbookLog::new(dir.path().join("suivi.xlsx"));
    let recorder = Recorder::new(&catalog, &log);
    recorder.record(&irrigation(Greenhouse::B, &["3", "4"], Crop::Tomato)).unwrap();
    recorder.record(&irrigation(Greenhouse::C, &["3"], Crop::Tomato)).unwrap();
    recorder.record(&treatment(Greenhouse::B, &["5"], &["Confidor"])).unwrap();

    let all = log.read_all().unwrap();
    let only_b = Filter {
        greenhouse: Some(Greenhouse::B),
        ..Default::default()
    }
    .apply(&all);
    assert_eq!(only_b.len(), 3);
    assert!(only_b.iter().all(|r| r.greenhouse == "B"));

    let unfiltered = FilterQuery {
        greenhouse: Some("all".into()),
        ..Default::default()
    }
    .parse()
    .unwrap()
    .apply(&all);
    assert_eq!(unfiltered, all);

    let bytes = downloader::to_xlsx(&only_b).unwrap();
    let sheets = workbook::read_workbook_bytes(&bytes).unwrap();
    assert_eq!(sheets.len(), 1);
    assert!(is_header(&sheets[0].rows[0]));
    let exported: Vec<Vec<String>> = sheets[0].rows[1..].to_vec();
    let expected: Vec<Vec<String>> = only_b.iter().map(|r| r.to_row()).collect();
    assert_eq!(exported, expected);
}

#[test]
fn listing_during_rewrites_sees_whole_catalogs() {
    use std::sync::atomic::{AtomicBool, Ordering};

    let dir = tempfile::tempdir().unwrap();
    let catalog = ProductCatalog::new(dir.path().join("produits.xlsx"));
    catalog.ensure_exists().unwrap();
    let done = AtomicBool::new(false);

    std::thread::scope(|scope| {
        scope.spawn(|| {
            for i in 0..100 {
                let name = format!("Essai {}", i);
                catalog.add(&Product::new(&name, "1 l/ha", "Botrytis")).unwrap();
                catalog.delete(2, Some(&name)).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        });

        let mut reads = 0;
        while !done.load(Ordering::SeqCst) || reads == 0 {
            let products = catalog.list().unwrap();
            assert!(products.len() == 2 || products.len() == 3, "{:?}", products);
            assert_eq!(products[0].designation, "Vertimec");
            reads += 1;
        }
    });

    assert_eq!(catalog.list().unwrap().len(), 2);
}

#[test]
fn reading_the_log_during_appends_never_fails() {
    use std::sync::atomic::{AtomicBool, Ordering};

    let dir = tempfile::tempdir().unwrap();
    let catalog = ProductCatalog::new(dir.path().join("produits.xlsx"));
    let log = LocalWorkbookLog::new(dir.path().join("suivi.xlsx"));
    let done = AtomicBool::new(false);

    std::thread::scope(|scope| {
        scope.spawn(|| {
            let recorder = Recorder::new(&catalog, &log);
            for _ in 0..50 {
                recorder.record(&irrigation(Greenhouse::G, &["12"], Crop::Chives)).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        });

        let mut last = 0;
        while !done.load(Ordering::SeqCst) {
            let count = log.read_all().unwrap().len();
            assert!(count >= last);
            last = count;
        }
    });

    assert_eq!(log.read_all().unwrap().len(), 50);
}
