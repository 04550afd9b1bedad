use prodboard::aggregate::{self, CompanyFilter};
use prodboard::downloader::{self, Workbook};
use prodboard::section;
use prodboard::{Granularity, Ledger, LedgerError, Period, Section, storage::FileStore};

use std::env;
use std::fs;

fn usage(program: &str) {
    eprintln!("Usage:");
    eprintln!("  {} <data-file> summary <year> <month>", program);
    eprintln!("  {} <data-file> export-monthly <year> <month> [out.xlsx]", program);
    eprintln!("  {} <data-file> export-yearly <year> [out.xlsx]", program);
    eprintln!("  {} <data-file> csv <section> <year> <month>", program);
}

fn bad_arguments() -> LedgerError {
    LedgerError::InvalidInput("unrecognised command line".to_string())
}

fn parse_period(year: &str, month: &str) -> Result<Period, LedgerError> {
    let year: i32 = year
        .parse()
        .map_err(|_| LedgerError::InvalidInput(format!("bad year: {}", year)))?;
    let month: u32 = month
        .parse()
        .map_err(|_| LedgerError::InvalidInput(format!("bad month: {}", month)))?;
    Period::new(year, month)
}

fn load_sections() -> Result<Vec<Section>, LedgerError> {
    match env::var("PRODBOARD_SECTIONS_FILE") {
        Ok(path) if !path.trim().is_empty() => section::load_sections(path.trim()),
        _ => Ok(section::reference_sections()),
    }
}

fn write_workbook(book: &Workbook, out: Option<&String>) -> Result<(), Box<dyn std::error::Error>> {
    let path = out.cloned().unwrap_or_else(|| book.file_name.clone());
    let bytes = downloader::to_xlsx(book)?;
    fs::write(&path, bytes)?;
    println!("Wrote {} ({} sheets)", path, book.sheets.len());
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("prodboard-cli");
    if args.len() < 3 {
        usage(program);
        return Err(bad_arguments().into());
    }

    let store = FileStore::open(&args[1]);
    let mut ledger = Ledger::open(Box::new(store), load_sections()?);
    let everyone = CompanyFilter::All;

    match (args[2].as_str(), &args[3..]) {
        ("summary", [year, month]) => {
            let period = parse_period(year, month)?;
            let data = ledger.snapshot();
            let totals = aggregate::section_totals(
                ledger.registry_mut(),
                &data,
                period,
                Granularity::Monthly,
                &everyone,
            )?;
            println!("{:<16} {:>12} {:>12}", "Section", "Count", "Kg");
            for total in &totals {
                println!("{:<16} {:>12} {:>12}", total.name, total.count, total.weight);
            }
        }
        ("export-monthly", [year, month, rest @ ..]) => {
            let period = parse_period(year, month)?;
            let book = ledger.export_monthly(period, &everyone)?;
            write_workbook(&book, rest.first())?;
        }
        ("export-yearly", [year, rest @ ..]) => {
            let period = parse_period(year, "1")?;
            let book = ledger.export_yearly(period.year, &everyone)?;
            write_workbook(&book, rest.first())?;
        }
        ("csv", [section_id, year, month]) => {
            let period = parse_period(year, month)?;
            let name = ledger
                .sections()
                .iter()
                .find(|s| &s.id == section_id)
                .map(|s| downloader::sheet_name(&s.name))
                .ok_or_else(|| LedgerError::UnknownSection(section_id.clone()))?;
            let book = ledger.export_monthly(period, &everyone)?;
            match book.sheets.iter().find(|sheet| sheet.name == name) {
                Some(sheet) => print!("{}", downloader::to_csv(sheet)),
                None => return Err(LedgerError::UnknownSection(section_id.clone()).into()),
            }
        }
        _ => {
            usage(program);
            return Err(bad_arguments().into());
        }
    }

    Ok(())
}
