//! Completed trades ("Завершенные сделки"). Emits buy/sale operations with
//! price, quantity, accrued interest and commission; the cash-movement
//! sheet's settlement/commission/ACI legs for these trades are skipped by
//! the classifier so nothing is double-counted.

use std::sync::OnceLock;

use anyhow::{bail, Result};
use regex::Regex;

use coercion::{extract_first_value, extract_isin_or_raw};
use models::{Operation, ParserStats};

use crate::classify::canonical_currency;
use crate::columns::{
    apply_fallback_positions, map_columns, missing_roles, pick_numeric_column, Role,
};
use crate::grid::SheetSource;
use crate::locate::{find_header_row, pick_sheet};
use crate::parsers::{
    number_field, record_column_mapping, role_cell, row_is_blank, text_field, Category,
    CategoryOutcome, CategoryParser,
};
use crate::profiles::Profile;

/// Hard cap on data rows; statements never come close, runaway ranges do.
const MAX_DATA_ROWS: usize = 5000;

pub struct TradesParser {
    profile: &'static Profile,
}

impl TradesParser {
    pub fn new(profile: &'static Profile) -> Self {
        Self { profile }
    }

    fn run(&self, source: &mut dyn SheetSource, stats: &mut ParserStats) -> Result<Vec<Operation>> {
        let cfg = &self.profile.trades;

        let sheet = pick_sheet(&source.sheet_names(), &cfg.sheet)?;
        tracing::info!("trades: using sheet '{}'", sheet);
        stats.detected_sheet = sheet.clone();

        let grid = source.grid(&sheet)?;
        let Some(header_row) = find_header_row(&grid, cfg.header_all, cfg.header_any) else {
            bail!("header row not found on sheet '{}'", sheet);
        };

        let headers = &grid[header_row];
        let mut map = map_columns(headers, cfg.columns);

        // Exports carry both "в валюте цены" and "в валюте расчетов" amount
        // columns; sample the data to find the one that actually holds
        // settlement amounts.
        let amount_candidates: Vec<usize> = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| {
                let low = h.as_text().to_lowercase();
                low.contains("сумма") && low.contains("валют")
            })
            .map(|(idx, _)| idx)
            .collect();
        if amount_candidates.len() > 1 {
            if let Some(col) = pick_numeric_column(&grid, header_row, &amount_candidates) {
                map.insert(Role::Amount, col);
            }
        }

        let missing = missing_roles(&map, cfg.required);
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|r| r.as_str()).collect();
            tracing::warn!("trades: columns not found: {}, using fixed positions", names.join(", "));
            apply_fallback_positions(&mut map, cfg.fallback_positions, headers.len());
        }
        record_column_mapping(stats, &map);

        let mut operations = Vec::new();
        let mut last_date = None;

        for row in grid.iter().skip(header_row + 1).take(MAX_DATA_ROWS) {
            if row_is_blank(row) {
                continue;
            }
            stats.total_rows += 1;

            // Grouped fills share one printed conclusion date; rows below
            // the first inherit it.
            let date = match role_cell(row, &map, Role::Date).and_then(|c| c.as_datetime()) {
                Some(d) => {
                    last_date = Some(d);
                    d
                }
                None => match last_date {
                    Some(d) => d,
                    None => {
                        stats.skipped_no_date += 1;
                        continue;
                    }
                },
            };

            let qty = number_field(row, &map, Role::Quantity);
            if qty == 0.0 {
                stats.skipped_no_qty += 1;
                continue;
            }

            let kind = self.direction(row, &map, qty);
            let price = number_field(row, &map, Role::Price);
            let amount = number_field(row, &map, Role::Amount);
            let aci = number_field(row, &map, Role::Aci);
            let commission = number_field(row, &map, Role::Commission);
            let currency = canonical_currency(&text_field(row, &map, Role::Currency));

            let isin = extract_isin_or_raw(&text_field(row, &map, Role::Isin));
            let asset_name = text_field(row, &map, Role::AssetName);
            let ticker = extract_ticker(&asset_name);

            // One cell can pack several newline-separated ids for a grouped
            // fill; only the first is the trade id.
            let trade_id = extract_first_value(&text_field(row, &map, Role::TradeId));
            let comment = text_field(row, &map, Role::Comment);

            operations.push(Operation {
                date: Some(date),
                operation_type: kind,
                payment_sum: amount.abs(),
                currency,
                ticker,
                isin,
                price,
                quantity: qty.abs(),
                aci,
                comment,
                operation_id: trade_id,
                commission,
                ..Operation::default()
            });

            stats.total_commission += commission;
            stats.parsed += 1;
        }

        tracing::info!(
            "trades: parsed {} of {} rows, total commission {}",
            stats.parsed,
            stats.total_rows,
            stats.total_commission
        );
        Ok(operations)
    }

    /// Buy/sell from the explicit direction column when one is mapped,
    /// otherwise from the sign of the quantity.
    fn direction(&self, row: &[crate::grid::Cell], map: &crate::columns::ColumnMap, qty: f64) -> String {
        let cfg = &self.profile.trades;
        let label = text_field(row, map, Role::Direction).to_lowercase();
        if !label.is_empty() {
            if cfg.sell_markers.iter().any(|m| label.contains(m)) {
                return "sale".to_string();
            }
            if cfg.buy_markers.iter().any(|m| label.contains(m)) {
                return "buy".to_string();
            }
        }
        if qty > 0.0 {
            "buy".to_string()
        } else {
            "sale".to_string()
        }
    }
}

impl CategoryParser for TradesParser {
    fn category(&self) -> Category {
        Category::Trades
    }

    fn parse(&self, source: &mut dyn SheetSource) -> CategoryOutcome {
        let mut stats = ParserStats::default();
        match self.run(source, &mut stats) {
            Ok(operations) => CategoryOutcome { operations, stats },
            Err(e) => {
                tracing::warn!("trades parse failed: {e:#}");
                stats.error = Some(e.to_string());
                CategoryOutcome {
                    operations: Vec::new(),
                    stats,
                }
            }
        }
    }
}

fn ticker_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-ZА-Я0-9]{1,6}(\.[A-Z]{1,4})?$").expect("valid regex")
    })
}

fn ticker_paren_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\(([A-ZА-Я0-9]{1,6}(\.[A-Z]{1,4})?)\)").expect("valid regex")
    })
}

/// Pulls a ticker out of a free-text instrument name: either the leading
/// token when it is ticker-shaped, or a parenthesized code anywhere in the
/// name. Empty string when neither form is present.
fn extract_ticker(asset_name: &str) -> String {
    if asset_name.is_empty() {
        return String::new();
    }

    let cleaned: String = asset_name
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || matches!(c, '.' | '-' | '_'))
        .collect();
    if let Some(first) = cleaned.split_whitespace().next() {
        if ticker_token_re().is_match(first) {
            return first.to_string();
        }
    }

    ticker_paren_re()
        .captures(asset_name)
        .map(|caps| caps[1].to_string())
        .unwrap_or_default()
}
