use std::cmp;

use anyhow::Result;
use serde::Serialize;

use crate::migrate::GenerateOutcome;
use crate::models::{
    BatchSummary, Item, LookupResult, LookupTarget, Sale, SaleReceipt, StoreBackendKind,
    StoreSummary,
};

/// Internal representation of a row rendered by the CLI.
///
/// Both item and sale lookups are flattened into the same shape so
/// that text and table output share one code path.
struct DisplayRow {
    id: u64,
    label: String,
    amount: i64,
    detail: String,
    store_id: Option<u64>,
}

/// Write any serializable value as a single line of JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    serde_json::to_writer(std::io::stdout(), value)?;
    println!();
    Ok(())
}

/// Render a `LookupResult` in human-readable text form.
///
/// Items are rendered as `#id name price=.. qty=.. [sku=..]`, sales as
/// `#id customer total=..`.
pub fn print_lookup_text(result: &LookupResult) -> Result<()> {
    for row in build_rows(result) {
        let store = row
            .store_id
            .map(|id| format!(" store={id}"))
            .unwrap_or_default();
        println!(
            "#{} {} {}{}{}",
            row.id,
            row.label,
            amount_label(result.target, row.amount),
            row.detail,
            store
        );
    }

    if result.summary.truncated {
        println!("(showing first {} matches)", result.summary.total_matches);
    }

    Ok(())
}

/// Render a `LookupResult` as a simple table.
///
/// Columns:
/// - ID
/// - NAME (items) or CUSTOMER (sales)
/// - PRICE (items) or TOTAL (sales)
/// - DETAIL (quantity and sku for items)
/// - STORE
pub fn print_lookup_table(result: &LookupResult) -> Result<()> {
    let rows = build_rows(result);

    if rows.is_empty() {
        return Ok(());
    }

    const MAX_LABEL_WIDTH: usize = 30;
    const MAX_DETAIL_WIDTH: usize = 30;

    let (label_header, amount_header) = match result.target {
        LookupTarget::Items => ("NAME", "PRICE"),
        LookupTarget::Sales => ("CUSTOMER", "TOTAL"),
    };
    let id_header = "ID";
    let detail_header = "DETAIL";
    let store_header = "STORE";

    let max_id_len = rows.iter().map(|r| r.id.to_string().len()).max().unwrap_or(0);
    let max_label_len = rows.iter().map(|r| r.label.chars().count()).max().unwrap_or(0);
    let max_amount_len = rows
        .iter()
        .map(|r| r.amount.to_string().len())
        .max()
        .unwrap_or(0);
    let max_detail_len = rows
        .iter()
        .map(|r| r.detail.trim().chars().count())
        .max()
        .unwrap_or(0);

    let id_width = cmp::max(id_header.len(), max_id_len);
    let label_width = cmp::min(cmp::max(label_header.len(), max_label_len), MAX_LABEL_WIDTH);
    let amount_width = cmp::max(amount_header.len(), max_amount_len);
    let detail_width = cmp::min(
        cmp::max(detail_header.len(), max_detail_len),
        MAX_DETAIL_WIDTH,
    );

    println!(
        "{:>id_width$} {:<label_width$} {:>amount_width$} {:<detail_width$} {}",
        id_header, label_header, amount_header, detail_header, store_header
    );

    for row in rows {
        let label = truncate(&row.label, label_width);
        let detail = truncate(row.detail.trim(), detail_width);
        let store = row.store_id.map(|id| id.to_string()).unwrap_or_default();

        println!(
            "{:>id_width$} {:<label_width$} {:>amount_width$} {:<detail_width$} {}",
            row.id, label, row.amount, detail, store
        );
    }

    Ok(())
}

fn build_rows(result: &LookupResult) -> Vec<DisplayRow> {
    match result.target {
        LookupTarget::Items => result.items.iter().map(item_row).collect(),
        LookupTarget::Sales => result.sales.iter().map(sale_row).collect(),
    }
}

fn item_row(item: &Item) -> DisplayRow {
    let sku = item
        .sku
        .as_deref()
        .map(|sku| format!(" sku={sku}"))
        .unwrap_or_default();
    DisplayRow {
        id: item.id,
        label: item.name.clone(),
        amount: item.price,
        detail: format!(" qty={}{}", item.quantity, sku),
        store_id: item.store_id,
    }
}

fn sale_row(sale: &Sale) -> DisplayRow {
    DisplayRow {
        id: sale.id,
        label: sale.customer.clone().unwrap_or_else(|| "-".to_string()),
        amount: sale.total,
        detail: String::new(),
        store_id: sale.store_id,
    }
}

fn amount_label(target: LookupTarget, amount: i64) -> String {
    match target {
        LookupTarget::Items => format!("price={amount}"),
        LookupTarget::Sales => format!("total={amount}"),
    }
}

/// Render a `BatchSummary` with one line per created record and one
/// per failed input.
pub fn print_batch_text<T>(
    summary: &BatchSummary<T>,
    noun: &str,
    describe: impl Fn(&T) -> String,
) -> Result<()> {
    for value in &summary.values {
        println!("created {noun} {}", describe(value));
    }
    for failure in &summary.failures {
        println!("failed  [{}] {}", failure.index, failure.error);
    }
    println!(
        "{} of {} {noun} record(s) created, {} failed",
        summary.succeeded, summary.total, summary.failed
    );
    Ok(())
}

/// Render a recorded sale and its lines.
pub fn print_receipt_text(receipt: &SaleReceipt) -> Result<()> {
    let customer = receipt.sale.customer.as_deref().unwrap_or("-");
    println!(
        "sale #{} customer={} total={}",
        receipt.sale.id, customer, receipt.sale.total
    );
    for line in &receipt.lines {
        println!(
            "    item #{} x{} @ {}",
            line.item_id, line.quantity, line.unit_price
        );
    }
    Ok(())
}

/// Render a `StoreSummary` in human-readable text form.
pub fn print_store_summary_text(summary: &StoreSummary) -> Result<()> {
    let backend_str = match summary.backend {
        StoreBackendKind::File => "file",
        StoreBackendKind::Sqlite => "sqlite",
    };

    println!("backend      : {backend_str}");
    println!("store_path   : {}", summary.store_path.display());

    if let Some(schema) = &summary.schema_version {
        println!("schema       : {schema}");
    }
    if let Some(tool) = &summary.tool_version {
        println!("tool_version : {tool}");
    }
    if let Some(created) = &summary.created_at {
        println!("created_at   : {created}");
    }
    if let Some(updated) = &summary.updated_at {
        println!("updated_at   : {updated}");
    }

    println!("stores       : {}", summary.stores);
    println!("items        : {}", summary.items);
    println!("sales        : {}", summary.sales);

    Ok(())
}

/// Render the outcome of `migrate generate`.
pub fn print_migration_text(outcome: &GenerateOutcome) -> Result<()> {
    match &outcome.migration {
        Some(path) => println!("wrote {} ({} statements)", path.display(), outcome.statements),
        None => println!("no schema changes"),
    }
    Ok(())
}

fn truncate(s: &str, max_width: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_width {
        s.to_string()
    } else if max_width <= 1 {
        "…".to_string()
    } else {
        s.chars()
            .take(max_width.saturating_sub(1))
            .collect::<String>()
            + "…"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_leaves_short_strings_unchanged() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abc", 3), "abc");
    }

    #[test]
    fn truncate_handles_unicode_characters() {
        assert_eq!(truncate("abcdef", 4), "abc…");
        assert_eq!(truncate("éééé", 3), "éé…");
        assert_eq!(truncate("éééé", 1), "…");
    }

    #[test]
    fn item_rows_carry_sku_and_quantity() {
        let row = item_row(&Item {
            id: 4,
            name: "Mug".to_string(),
            sku: Some("M-1".to_string()),
            price: 400,
            quantity: 12,
            store_id: Some(1),
            created_at: 0,
        });
        assert_eq!(row.detail, " qty=12 sku=M-1");
        assert_eq!(amount_label(LookupTarget::Items, row.amount), "price=400");
    }
}
