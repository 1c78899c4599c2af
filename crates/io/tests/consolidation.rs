// End-to-end runs of the batch driver against workbooks built on the fly.
// Run with: cargo test -p ratiobook-io --test consolidation

use std::fs;
use std::path::{Path, PathBuf};

use ratiobook_config::LoaderConfig;
use ratiobook_engine::store::DEFAULT_KEY_COLUMN;
use ratiobook_engine::{CellValue, MasterStore, StoreError};
use ratiobook_io::{run, FileStatus, MasterfileError, RunError};
use rust_xlsxwriter::Workbook;

#[derive(Clone, Copy)]
enum C {
    T(&'static str),
    N(f64),
}

fn write_rows(worksheet: &mut rust_xlsxwriter::Worksheet, rows: &[Vec<C>]) {
    for (r, row) in rows.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            match *cell {
                C::T(s) => {
                    worksheet.write_string(r as u32, c as u16, s).unwrap();
                }
                C::N(n) => {
                    worksheet.write_number(r as u32, c as u16, n).unwrap();
                }
            }
        }
    }
}

/// A single-sheet source export: title, sentinel, then the given rows.
fn write_source(path: &Path, data_rows: &[Vec<C>]) {
    let mut rows = vec![
        vec![C::T("Ratios sectoriales de las sociedades no financieras")],
        vec![],
        vec![C::T("Ratio"), C::T("Nombre"), C::T("Empresas"), C::T("Q1"), C::T("Q2"), C::T("Q3")],
    ];
    rows.extend_from_slice(data_rows);

    let mut workbook = Workbook::new();
    write_rows(workbook.add_worksheet(), &rows);
    workbook.save(path).unwrap();
}

fn ratio_row(code: &'static str, q: [f64; 3]) -> Vec<C> {
    vec![C::T(code), C::T("Liquidez"), C::N(120.0), C::N(q[0]), C::N(q[1]), C::N(q[2])]
}

struct SheetSpec {
    name: &'static str,
    header: &'static [&'static str],
    rows: Vec<Vec<C>>,
}

fn write_masterfile(path: &Path, sheets: &[SheetSpec]) {
    let mut workbook = Workbook::new();
    for spec in sheets {
        let worksheet = workbook.add_worksheet().set_name(spec.name).unwrap();
        let mut rows = vec![spec.header.iter().map(|h| C::T(*h)).collect::<Vec<_>>()];
        rows.extend(spec.rows.iter().cloned());
        write_rows(worksheet, &rows);
    }
    workbook.save(path).unwrap();
}

const RATIO_HEADER: &[&str] = &["CNAE", "Descripcion", "R01_Q1", "R01_Q2", "R01_Q3", "R02_Q1"];

struct Fixture {
    _dir: tempfile::TempDir,
    input: PathBuf,
    master: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("downloads");
        fs::create_dir(&input).unwrap();
        let master = dir.path().join("CNAE masterfile.xlsx");
        Self { _dir: dir, input, master }
    }

    fn config(&self) -> LoaderConfig {
        let mut config = LoaderConfig::with_paths(&self.input, &self.master);
        config.extension = "xlsx".to_string();
        config
    }

    fn reload(&self) -> MasterStore {
        ratiobook_io::xlsx::import_masterfile(&self.master, DEFAULT_KEY_COLUMN).unwrap().0
    }
}

#[test]
fn two_sources_land_sorted_in_one_sheet() {
    let fx = Fixture::new();
    write_masterfile(
        &fx.master,
        &[SheetSpec {
            name: "2023",
            header: RATIO_HEADER,
            rows: vec![vec![C::N(300.0), C::T("Otros servicios")]],
        }],
    );
    write_source(&fx.input.join("2023_0200.xlsx"), &[ratio_row("R01", [4.0, 5.0, 6.0])]);
    write_source(
        &fx.input.join("2023_0100.xlsx"),
        &[ratio_row("R01", [1.0, 2.0, 3.0]), ratio_row("R99", [9.0, 9.0, 9.0])],
    );

    let summary = run(&fx.config()).unwrap();
    assert_eq!(summary.total, 2);
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.errors(), 0);
    assert_eq!(summary.fields_written, 6);
    assert!(summary.persisted);
    assert_eq!(summary.files[0].file, "2023_0100.xlsx");

    let store = fx.reload();
    let sheet = store.sheet("2023").unwrap();
    assert_eq!(sheet.codes(), vec![100, 200, 300]);
    assert_eq!(sheet.value(100, "R01_Q1"), Some(&CellValue::Number(1.0)));
    assert_eq!(sheet.value(100, "R01_Q3"), Some(&CellValue::Number(3.0)));
    assert_eq!(sheet.value(200, "R01_Q2"), Some(&CellValue::Number(5.0)));
    assert_eq!(sheet.value(100, "R02_Q1"), Some(&CellValue::Empty));
    assert_eq!(sheet.value(100, "Descripcion"), Some(&CellValue::Empty));
    // Untouched rows and non-ratio columns survive the rewrite
    assert_eq!(sheet.value(300, "Descripcion"), Some(&CellValue::Text("Otros servicios".into())));
    assert_eq!(sheet.columns().len(), RATIO_HEADER.len());
}

#[test]
fn rerunning_the_same_inputs_changes_nothing() {
    let fx = Fixture::new();
    write_masterfile(&fx.master, &[SheetSpec { name: "2023", header: RATIO_HEADER, rows: vec![] }]);
    write_source(&fx.input.join("2023_0100.xlsx"), &[ratio_row("R01", [1.0, 2.0, 3.0])]);
    write_source(&fx.input.join("2023_0200.xlsx"), &[ratio_row("R02", [7.0, 8.0, 9.0])]);

    run(&fx.config()).unwrap();
    let first = fx.reload();
    run(&fx.config()).unwrap();
    let second = fx.reload();

    assert_eq!(first, second);
    assert_eq!(second.sheet("2023").unwrap().len(), 2);
}

#[test]
fn failed_files_are_counted_and_nothing_is_written() {
    let fx = Fixture::new();
    write_masterfile(&fx.master, &[SheetSpec { name: "2023", header: RATIO_HEADER, rows: vec![] }]);
    let before = fs::read(&fx.master).unwrap();

    write_source(&fx.input.join("notes.xlsx"), &[ratio_row("R01", [1.0, 2.0, 3.0])]);
    // No sentinel anywhere
    let mut workbook = Workbook::new();
    write_rows(workbook.add_worksheet(), &[vec![C::T("Sin datos para este sector")]]);
    workbook.save(fx.input.join("2023_0100.xlsx")).unwrap();
    fs::write(fx.input.join("2023_0200.xlsx"), b"truncated download").unwrap();

    let summary = run(&fx.config()).unwrap();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.processed, 0);
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.empty, 1);
    assert_eq!(summary.read_errors, 1);
    assert!(!summary.persisted);

    let statuses: Vec<&FileStatus> = summary.files.iter().map(|f| &f.status).collect();
    assert!(matches!(statuses[0], FileStatus::Empty { sentinel_found: false }));
    assert!(matches!(statuses[1], FileStatus::ReadError { .. }));
    assert!(matches!(statuses[2], FileStatus::Rejected { .. }));

    assert_eq!(fs::read(&fx.master).unwrap(), before);
}

#[test]
fn sentinel_without_ratio_rows_is_empty() {
    let fx = Fixture::new();
    write_masterfile(&fx.master, &[SheetSpec { name: "2023", header: RATIO_HEADER, rows: vec![] }]);
    write_source(&fx.input.join("2023_0100.xlsx"), &[vec![C::T("Fuente: Banco de España")]]);

    let summary = run(&fx.config()).unwrap();
    assert_eq!(summary.empty, 1);
    assert!(matches!(summary.files[0].status, FileStatus::Empty { sentinel_found: true }));
}

#[test]
fn missing_period_is_cloned_from_smallest_sheet() {
    let fx = Fixture::new();
    write_masterfile(
        &fx.master,
        &[
            SheetSpec { name: "2022", header: RATIO_HEADER, rows: vec![vec![C::N(100.0)]] },
            SheetSpec { name: "2021", header: &["CNAE", "R01_Q1"], rows: vec![] },
        ],
    );
    write_source(&fx.input.join("2024_0100.xlsx"), &[ratio_row("R01", [1.0, 2.0, 3.0])]);

    let summary = run(&fx.config()).unwrap();
    match &summary.files[0].status {
        FileStatus::Processed { written, sheet_created, row_created, .. } => {
            assert_eq!(*written, 1);
            assert!(*sheet_created);
            assert!(*row_created);
        }
        other => panic!("unexpected status {other:?}"),
    }

    let store = fx.reload();
    assert_eq!(store.sheet_names(), vec!["2022", "2021", "2024"]);
    let sheet = store.sheet("2024").unwrap();
    assert_eq!(sheet.columns(), ["CNAE".to_string(), "R01_Q1".to_string()]);
    assert_eq!(sheet.value(100, "R01_Q1"), Some(&CellValue::Number(1.0)));
}

#[test]
fn dry_run_reports_but_does_not_write() {
    let fx = Fixture::new();
    write_masterfile(&fx.master, &[SheetSpec { name: "2023", header: RATIO_HEADER, rows: vec![] }]);
    let before = fs::read(&fx.master).unwrap();
    write_source(&fx.input.join("2023_0100.xlsx"), &[ratio_row("R01", [1.0, 2.0, 3.0])]);

    let mut config = fx.config();
    config.dry_run = true;
    let summary = run(&config).unwrap();

    assert_eq!(summary.processed, 1);
    assert!(summary.dry_run);
    assert!(!summary.persisted);
    assert_eq!(fs::read(&fx.master).unwrap(), before);
}

#[test]
fn absent_masterfile_has_no_template() {
    let fx = Fixture::new();
    write_source(&fx.input.join("2023_0100.xlsx"), &[ratio_row("R01", [1.0, 2.0, 3.0])]);

    let summary = run(&fx.config()).unwrap();
    assert_eq!(summary.upsert_errors, 1);
    assert!(!summary.persisted);
    assert!(!fx.master.exists());
}

#[test]
fn masterfile_without_key_column_aborts() {
    let fx = Fixture::new();
    write_masterfile(&fx.master, &[SheetSpec { name: "2023", header: &["Codigo", "R01_Q1"], rows: vec![] }]);
    write_source(&fx.input.join("2023_0100.xlsx"), &[ratio_row("R01", [1.0, 2.0, 3.0])]);

    let err = run(&fx.config()).unwrap_err();
    assert!(matches!(
        err,
        RunError::Masterfile(MasterfileError::Layout(StoreError::MissingKeyColumn { .. }))
    ));
}

#[test]
fn empty_input_dir_needs_no_masterfile() {
    let fx = Fixture::new();
    let summary = run(&fx.config()).unwrap();
    assert_eq!(summary.total, 0);
    assert!(!fx.master.exists());
}

#[test]
fn missing_input_dir_aborts() {
    let fx = Fixture::new();
    let mut config = fx.config();
    config.input_dir = fx.input.join("nope");
    assert!(matches!(run(&config).unwrap_err(), RunError::InputDir { .. }));
}

#[test]
fn parallel_extraction_matches_sequential() {
    let fx = Fixture::new();
    write_masterfile(&fx.master, &[SheetSpec { name: "2023", header: RATIO_HEADER, rows: vec![] }]);
    for code in 1..=8 {
        let body = format!(
            "Ratios\n\nRatio;Nombre;Empresas;Q1;Q2;Q3\nR01;Liquidez;10;{c};{c}.5;\nNota;;;;;\n",
            c = code
        );
        fs::write(fx.input.join(format!("2023_{:04}.csv", code * 100)), body).unwrap();
    }

    let mut config = fx.config();
    config.extension = "csv".to_string();
    config.dry_run = true;
    let sequential = run(&config).unwrap();

    config.jobs = 4;
    let parallel = run(&config).unwrap();

    assert_eq!(sequential.processed, 8);
    assert_eq!(sequential.files, parallel.files);

    config.dry_run = false;
    run(&config).unwrap();
    let store = fx.reload();
    let sheet = store.sheet("2023").unwrap();
    assert_eq!(sheet.codes(), (1..=8).map(|c| c * 100).collect::<Vec<i64>>());
    assert_eq!(sheet.value(300, "R01_Q2"), Some(&CellValue::Number(3.5)));
    assert_eq!(sheet.value(300, "R01_Q3"), Some(&CellValue::Empty));
}

#[test]
fn semicolon_export_with_decimal_commas_is_loaded() {
    let fx = Fixture::new();
    write_masterfile(&fx.master, &[SheetSpec { name: "2023", header: RATIO_HEADER, rows: vec![] }]);
    fs::write(
        fx.input.join("2023_0100.csv"),
        "Ratios sectoriales\nRatio;Nombre;Empresas;Q1;Q2;Q3\nR01;Liquidez;120;1,25;2,5;-0,75\n",
    )
    .unwrap();

    let mut config = fx.config();
    config.extension = "csv".to_string();
    let summary = run(&config).unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.fields_written, 3);

    let store = fx.reload();
    let sheet = store.sheet("2023").unwrap();
    assert_eq!(sheet.value(100, "R01_Q1"), Some(&CellValue::Number(1.25)));
    assert_eq!(sheet.value(100, "R01_Q3"), Some(&CellValue::Number(-0.75)));
}
