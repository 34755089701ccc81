// 📤 Bulk CSV import/export - One row per item
// Row shape: category name, item name, then the item's values in the
// category's current column order. Rows are ragged (column counts vary
// per category), so both directions run with flexible record lengths.
// Import maps values positionally against whatever columns the target
// category has at import time.

use crate::document::Document;
use anyhow::{Context, Result};
use std::io::{Read, Write};

/// Write every item of every category as one CSV row
pub fn export_csv<W: Write>(document: &Document, writer: W) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .flexible(true)
        .has_headers(false)
        .from_writer(writer);

    for category in &document.categories {
        for item in &category.items {
            let mut record = vec![category.name.clone(), item.name.clone()];
            for value in category.row_values(item) {
                record.push(value.to_string());
            }
            csv_writer
                .write_record(&record)
                .context("Failed to write CSV record")?;
        }
    }

    csv_writer.flush().context("Failed to flush CSV output")?;
    Ok(())
}

/// Read rows back into the document, returning how many items landed
///
/// Each row names a category; rows naming a category the document does
/// not have are skipped. Values map positionally to the category's
/// current column order; surplus values are dropped, missing ones stay
/// at 0. No guarantee is made beyond that positional mapping.
pub fn import_csv<R: Read>(document: &mut Document, reader: R) -> Result<usize> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(false)
        .from_reader(reader);

    let mut imported = 0;
    for record in csv_reader.records() {
        let record = record.context("Failed to read CSV record")?;
        let mut fields = record.iter();

        let category_name = match fields.next() {
            Some(name) => name.to_string(),
            None => continue,
        };
        let item_name = fields.next().unwrap_or("New item").to_string();

        let category_id = match document
            .categories
            .iter()
            .find(|c| c.name == category_name)
        {
            Some(category) => category.id.clone(),
            None => continue,
        };

        // add_item cannot fail here, the category was just found
        let item_id = match document.add_item(&category_id) {
            Ok(item) => item.id,
            Err(_) => continue,
        };
        document
            .rename_item(&category_id, item_id, &item_name)
            .ok();

        let column_ids: Vec<String> = document
            .category(&category_id)
            .map(|c| c.columns.iter().map(|col| col.id.clone()).collect())
            .unwrap_or_default();

        for (column_id, raw) in column_ids.iter().zip(fields) {
            document
                .update_item_value(&category_id, item_id, column_id, raw)
                .ok();
        }
        imported += 1;
    }

    Ok(imported)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentSide;

    fn seeded_revenue() -> Document {
        let mut doc = Document::default_template(DocumentSide::Revenue);
        let ticketing = doc.categories[0].id.clone();

        let item = doc.add_item(&ticketing).unwrap();
        doc.rename_item(&ticketing, item.id, "GA ticket").unwrap();
        doc.update_item_value(&ticketing, item.id, "fee", "5.5").unwrap();
        doc.update_item_value(&ticketing, item.id, "quantity", "2").unwrap();
        doc.update_item_value(&ticketing, item.id, "percentage", "100")
            .unwrap();
        doc
    }

    #[test]
    fn test_export_row_shape() {
        let doc = seeded_revenue();
        let mut out = Vec::new();
        export_csv(&doc, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let line = text.lines().next().unwrap();
        assert_eq!(line, "Ticketing,GA ticket,5.5,2,100");
    }

    #[test]
    fn test_import_maps_positionally() {
        let mut doc = Document::default_template(DocumentSide::Revenue);
        let csv = "Ticketing,VIP ticket,20,50,90\nUnknown Category,x,1\n";

        let imported = import_csv(&mut doc, csv.as_bytes()).unwrap();
        assert_eq!(imported, 1); // unknown category skipped

        let ticketing = &doc.categories[0];
        let item = &ticketing.items[0];
        assert_eq!(item.name, "VIP ticket");
        assert_eq!(item.value("fee"), 20.0);
        assert_eq!(item.value("quantity"), 50.0);
        assert_eq!(item.value("percentage"), 90.0);
    }

    #[test]
    fn test_export_import_round_trip_totals() {
        let doc = seeded_revenue();
        let mut out = Vec::new();
        export_csv(&doc, &mut out).unwrap();

        let mut fresh = Document::default_template(DocumentSide::Revenue);
        import_csv(&mut fresh, out.as_slice()).unwrap();

        assert_eq!(fresh.grand_total(), doc.grand_total());
    }

    #[test]
    fn test_import_short_row_leaves_zeroes() {
        let mut doc = Document::default_template(DocumentSide::Revenue);
        let imported = import_csv(&mut doc, "Ticketing,Cheap seat,3".as_bytes()).unwrap();
        assert_eq!(imported, 1);

        let item = &doc.categories[0].items[0];
        assert_eq!(item.value("fee"), 3.0);
        assert_eq!(item.value("quantity"), 0.0);
    }
}
