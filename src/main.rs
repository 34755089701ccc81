// Estimate Engine - CLI
// Small operational frontend over the SQLite store: seed default
// templates, show totals and top earners/spenders, export item CSVs.

use anyhow::{bail, Result};
use estimate_engine::{
    export_csv, top_n, Document, DocumentKey, DocumentSide, DocumentStore, SqliteStore,
};
use std::env;
use std::fs::File;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("demo") => run_demo(),
        Some("seed") if args.len() == 4 => run_seed(&args[2], &args[3]),
        Some("show") if args.len() == 5 => run_show(&args[2], &args[3], &args[4]),
        Some("export") if args.len() == 6 => run_export(&args[2], &args[3], &args[4], &args[5]),
        _ => {
            eprintln!("Usage:");
            eprintln!("  estimate-engine demo");
            eprintln!("  estimate-engine seed <db> <entity>");
            eprintln!("  estimate-engine show <db> <entity> <revenue|cost>");
            eprintln!("  estimate-engine export <db> <entity> <revenue|cost> <out.csv>");
            std::process::exit(1);
        }
    }
}

fn parse_side(side: &str) -> Result<DocumentSide> {
    match DocumentSide::parse(side) {
        Some(s) => Ok(s),
        None => bail!("Unknown side '{}', expected 'revenue' or 'cost'", side),
    }
}

fn run_demo() -> Result<()> {
    println!("📊 Estimate Engine demo (default revenue template)\n");
    let document = Document::default_template(DocumentSide::Revenue);
    print_document(&document);
    Ok(())
}

fn run_seed(db_path: &str, entity_id: &str) -> Result<()> {
    let store = SqliteStore::open(db_path)?;

    for side in [DocumentSide::Revenue, DocumentSide::Cost] {
        let key = DocumentKey::new(entity_id, side);
        let document = Document::default_template(side);
        store.save(&key, &document)?;
        println!("✓ Seeded {} document for '{}'", side.as_str(), entity_id);
    }

    Ok(())
}

fn run_show(db_path: &str, entity_id: &str, side: &str) -> Result<()> {
    let store = SqliteStore::open(db_path)?;
    let key = DocumentKey::new(entity_id, parse_side(side)?);
    let document = store.load(&key)?;

    println!("📊 {} / {} ({})", entity_id, side, document.currency);
    print_document(&document);
    Ok(())
}

fn run_export(db_path: &str, entity_id: &str, side: &str, out_path: &str) -> Result<()> {
    let store = SqliteStore::open(db_path)?;
    let key = DocumentKey::new(entity_id, parse_side(side)?);
    let document = store.load(&key)?;

    let file = File::create(out_path)?;
    export_csv(&document, file)?;

    let item_count: usize = document.categories.iter().map(|c| c.items.len()).sum();
    println!("✓ Exported {} items to {}", item_count, out_path);
    Ok(())
}

fn print_document(document: &Document) {
    for category in &document.categories {
        println!(
            "  {:<16} {:>12.2}  ({} items, formula {})",
            category.name,
            estimate_engine::category_total(category),
            category.items.len(),
            category.formula
        );
    }
    println!("  {:<16} {:>12.2}", "GRAND TOTAL", document.grand_total());

    let top = top_n(&document.categories, 3);
    if !top.is_empty() {
        println!("\n  Top items:");
        for ranked in top {
            println!(
                "    {:<24} {:>12.2}  [{}]",
                ranked.name, ranked.total, ranked.category_name
            );
        }
    }
}
