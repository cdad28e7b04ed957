//! Statement-level orchestration: run the three category parsers, drop
//! duplicates inside each category, merge everything into one chronological
//! stream and attach the processing meta.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::json;

use models::{NormalizedStatement, Operation};

use crate::grid::{Grid, SheetSource};
use crate::parsers::{CashMovementsParser, CategoryParser, TradesParser, TransfersParser};
use crate::profiles::Profile;

/// Rows inspected when looking for the account/contract id in a sheet
/// preamble.
const ACCOUNT_SCAN_ROWS: usize = 10;

/// Normalizes one statement workbook.
///
/// Never fails as a whole: a category that cannot be parsed contributes
/// zero operations and carries its error inside `meta.stats`.
pub fn normalize_statement(
    source: &mut dyn SheetSource,
    profile: &'static Profile,
) -> NormalizedStatement {
    let cash = CashMovementsParser::new(profile).parse(source);
    let trades = TradesParser::new(profile).parse(source);
    let transfers = TransfersParser::new(profile).parse(source);

    let mut operations = Vec::new();
    operations.extend(dedup(cash.operations));
    operations.extend(dedup(trades.operations));
    operations.extend(dedup(transfers.operations));

    // Stable sort: operations sharing a timestamp and kind keep their
    // within-category order.
    operations.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    let (date_start, date_end) = date_range(&operations);
    let account_id = scan_account_ids(
        source,
        &[&cash.stats.detected_sheet, &trades.stats.detected_sheet],
        profile.account_labels,
    );

    let meta = json!({
        "fin_ops_raw_count": cash.stats.total_rows,
        "trade_ops_raw_count": trades.stats.total_rows,
        "transfer_ops_raw_count": transfers.stats.total_rows,
        "total_ops_count": operations.len(),
        "fin_ops_stats": cash.stats.finalize(),
        "trade_ops_stats": trades.stats.finalize(),
        "transfer_ops_stats": transfers.stats.finalize(),
        "detected_sheets": {
            "fin_sheet": cash.stats.detected_sheet,
            "trades_sheet": trades.stats.detected_sheet,
            "transfers_sheet": transfers.stats.detected_sheet,
        },
    });

    NormalizedStatement {
        operations: operations.iter().map(Operation::to_record).collect(),
        meta,
        account_id,
        date_start,
        date_end,
    }
}

/// Drops duplicates within one category; the first occurrence wins and the
/// source order of the survivors is preserved.
fn dedup(operations: Vec<Operation>) -> Vec<Operation> {
    let mut seen = HashSet::new();
    operations
        .into_iter()
        .filter(|op| seen.insert(op.dedup_key()))
        .collect()
}

/// Covered period as `dd.mm.YYYY` strings, empty when no operation carries
/// a date.
fn date_range(operations: &[Operation]) -> (String, String) {
    let dates: Vec<_> = operations.iter().filter_map(|op| op.date).collect();
    let fmt = |d: &chrono::NaiveDateTime| d.format("%d.%m.%Y").to_string();
    (
        dates.iter().min().map(fmt).unwrap_or_default(),
        dates.iter().max().map(fmt).unwrap_or_default(),
    )
}

fn account_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[0-9]{4,}[0-9A-Za-zА-Яа-я-]*").expect("valid regex"))
}

/// Pulls agreement/contract numbers out of the sheet preambles. The label
/// cell usually carries the number itself ("Генеральное соглашение №
/// 12345-ИИС от ..."); otherwise the next cells to the right are checked.
fn scan_account_ids(
    source: &mut dyn SheetSource,
    sheets: &[&str],
    labels: &[&str],
) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();

    for sheet in sheets {
        if sheet.is_empty() {
            continue;
        }
        let Ok(grid) = source.grid(sheet) else {
            continue;
        };
        scan_grid_for_ids(&grid, labels, &mut ids);
    }

    ids
}

fn scan_grid_for_ids(grid: &Grid, labels: &[&str], ids: &mut Vec<String>) {
    for row in grid.iter().take(ACCOUNT_SCAN_ROWS) {
        for (idx, cell) in row.iter().enumerate() {
            let text = cell.as_text();
            if !labels.iter().any(|l| text.to_lowercase().contains(l)) {
                continue;
            }
            let found = extract_account_token(&text).or_else(|| {
                row.iter()
                    .skip(idx + 1)
                    .take(3)
                    .find_map(|c| extract_account_token(&c.as_text()))
            });
            if let Some(id) = found {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
    }
}

/// First number-led token; a suffixed agreement number keeps only the part
/// before the dash ("12345-ИИС" is account "12345").
fn extract_account_token(text: &str) -> Option<String> {
    let m = account_token_re().find(text)?;
    let token = m.as_str().split('-').next().unwrap_or(m.as_str());
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
