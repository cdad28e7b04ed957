//! Non-trade asset transfers ("Неторговые операции"). The sheet mixes many
//! movement kinds; only currency conversions are kept — everything else is
//! either noise or already covered by the other two categories.
//!
//! The export has no clean header row: the table is anchored on the
//! operation-label header cell and the neighbouring columns are found
//! relative to it, with content-sampling heuristics as the next tier and
//! fixed positions as the last.

use std::sync::OnceLock;

use anyhow::Result;
use regex::Regex;

use coercion::extract_isin_or_raw;
use models::{Operation, ParserStats};

use crate::columns::{apply_fallback_positions, missing_roles, ColumnMap, Role};
use crate::grid::{Cell, Grid, SheetSource};
use crate::locate::pick_sheet;
use crate::parsers::{
    number_field, record_column_mapping, role_cell, row_is_blank, text_field, Category,
    CategoryOutcome, CategoryParser,
};
use crate::profiles::Profile;

/// Rows/columns inspected by the anchored and sampling passes.
const STRUCTURE_SCAN_ROWS: usize = 10;

pub struct TransfersParser {
    profile: &'static Profile,
}

impl TransfersParser {
    pub fn new(profile: &'static Profile) -> Self {
        Self { profile }
    }

    fn run(&self, source: &mut dyn SheetSource, stats: &mut ParserStats) -> Result<Vec<Operation>> {
        let cfg = &self.profile.transfers;

        let sheet = pick_sheet(&source.sheet_names(), &cfg.sheet)?;
        tracing::info!("transfers: using sheet '{}'", sheet);
        stats.detected_sheet = sheet.clone();

        let grid = source.grid(&sheet)?;
        let mut map = self.find_columns(&grid);

        let width = grid.iter().map(|r| r.len()).max().unwrap_or(0);
        let missing = missing_roles(&map, &[Role::Date, Role::Label, Role::Quantity]);
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|r| r.as_str()).collect();
            tracing::warn!("transfers: columns not found: {}, using fixed positions", names.join(", "));
            apply_fallback_positions(&mut map, cfg.fallback_positions, width);
        }
        record_column_mapping(stats, &map);

        let start_row = self.find_data_start(&grid, &map);

        let mut operations = Vec::new();
        for row in grid.iter().skip(start_row) {
            if row_is_blank(row) {
                continue;
            }
            stats.total_rows += 1;

            let Some(date) = role_cell(row, &map, Role::Date).and_then(|c| c.as_datetime()) else {
                stats.skipped_no_date += 1;
                continue;
            };

            let qty = number_field(row, &map, Role::Quantity);
            if qty == 0.0 {
                stats.skipped_no_qty += 1;
                continue;
            }

            let label = text_field(row, &map, Role::Label);
            let comment = text_field(row, &map, Role::Comment);
            if !self.is_conversion(&label, &comment) {
                stats.skipped_not_conversion += 1;
                continue;
            }

            let asset_name = text_field(row, &map, Role::AssetName);
            let isin = extract_isin_or_raw(&asset_name);

            let kind = if qty > 0.0 { "asset_receive" } else { "asset_withdrawal" };

            operations.push(Operation {
                date: Some(date),
                operation_type: kind.to_string(),
                isin,
                quantity: qty.abs(),
                comment,
                ..Operation::default()
            });
            stats.parsed += 1;
        }

        tracing::info!(
            "transfers: parsed {} of {} rows",
            stats.parsed,
            stats.total_rows
        );
        Ok(operations)
    }

    /// Anchored discovery first, content sampling second. The returned map
    /// may still be incomplete; the caller applies fixed positions then.
    fn find_columns(&self, grid: &Grid) -> ColumnMap {
        let cfg = &self.profile.transfers;
        let mut map = ColumnMap::new();

        let mut anchor = None;
        'outer: for (row_idx, row) in grid.iter().take(STRUCTURE_SCAN_ROWS).enumerate() {
            for (col_idx, cell) in row.iter().enumerate() {
                if cell.as_text().to_lowercase().contains(cfg.anchor) {
                    anchor = Some((row_idx, col_idx));
                    break 'outer;
                }
            }
        }

        let Some((header_row, anchor_col)) = anchor else {
            return self.find_columns_by_sampling(grid);
        };

        let header = &grid[header_row];
        let lowered: Vec<String> = header.iter().map(|c| c.as_text().to_lowercase()).collect();

        for col in (0..anchor_col).rev() {
            if lowered[col].contains("дата") {
                map.insert(Role::Date, col);
                break;
            }
        }
        for col in anchor_col + 1..(anchor_col + 5).min(lowered.len()) {
            if ["актив", "инструмент", "наименование"].iter().any(|k| lowered[col].contains(k)) {
                map.insert(Role::AssetName, col);
                break;
            }
        }
        for col in anchor_col + 2..(anchor_col + 6).min(lowered.len()) {
            if ["комментарий", "примечание", "основание"].iter().any(|k| lowered[col].contains(k)) {
                map.insert(Role::Comment, col);
                break;
            }
        }
        for col in anchor_col + 3..(anchor_col + 8).min(lowered.len()) {
            if ["зачисление", "списание", "количество", "кол-во"].iter().any(|k| lowered[col].contains(k)) {
                map.insert(Role::Quantity, col);
                break;
            }
        }

        // The anchor header spans merged cells; the printed label value
        // actually sits a couple of columns to its right.
        map.insert(Role::Label, anchor_col + cfg.label_offset);

        map
    }

    /// No header at all: identify columns by what their first rows contain.
    fn find_columns_by_sampling(&self, grid: &Grid) -> ColumnMap {
        let cfg = &self.profile.transfers;
        let mut map = ColumnMap::new();
        let width = grid.iter().map(|r| r.len()).max().unwrap_or(0);

        for col in 0..width {
            let dates = grid
                .iter()
                .take(STRUCTURE_SCAN_ROWS)
                .filter(|row| row.get(col).is_some_and(looks_like_date))
                .count();
            if dates >= 3 {
                map.insert(Role::Date, col);
                break;
            }
        }

        for col in 0..width {
            let transfers = grid
                .iter()
                .take(STRUCTURE_SCAN_ROWS)
                .filter(|row| {
                    row.get(col).is_some_and(|c| {
                        let low = c.as_text().to_lowercase();
                        cfg.transfer_markers.iter().any(|m| low.contains(m))
                    })
                })
                .count();
            if transfers >= 2 {
                map.insert(Role::Label, col);
                break;
            }
        }

        for col in 0..width {
            if map.values().any(|assigned| *assigned == col) {
                continue;
            }
            let numbers = grid
                .iter()
                .take(STRUCTURE_SCAN_ROWS)
                .filter(|row| row.get(col).is_some_and(looks_like_number))
                .count();
            if numbers >= 3 {
                map.insert(Role::Quantity, col);
                break;
            }
        }

        map
    }

    /// First of the top rows whose date column actually holds a date;
    /// everything above is preamble.
    fn find_data_start(&self, grid: &Grid, map: &ColumnMap) -> usize {
        let Some(date_col) = map.get(&Role::Date) else {
            return 0;
        };
        grid.iter()
            .take(STRUCTURE_SCAN_ROWS)
            .position(|row| row.get(*date_col).is_some_and(looks_like_date))
            .unwrap_or(0)
    }

    fn is_conversion(&self, label: &str, comment: &str) -> bool {
        let cfg = &self.profile.transfers;
        let label_low = label.to_lowercase();
        let comment_low = comment.to_lowercase();
        cfg.transfer_markers.iter().any(|m| label_low.contains(m))
            && cfg.conversion_markers.iter().any(|m| comment_low.contains(m))
    }
}

impl CategoryParser for TransfersParser {
    fn category(&self) -> Category {
        Category::Transfers
    }

    fn parse(&self, source: &mut dyn SheetSource) -> CategoryOutcome {
        let mut stats = ParserStats::default();
        match self.run(source, &mut stats) {
            Ok(operations) => CategoryOutcome { operations, stats },
            Err(e) => {
                tracing::warn!("transfers parse failed: {e:#}");
                stats.error = Some(e.to_string());
                CategoryOutcome {
                    operations: Vec::new(),
                    stats,
                }
            }
        }
    }
}

fn date_like_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{1,2}[./-]\d{1,2}[./-]\d{2,4}|\d{4}[./-]\d{1,2}[./-]\d{1,2})")
            .expect("valid regex")
    })
}

fn number_like_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-?\d+[.,]?\d*$").expect("valid regex"))
}

fn looks_like_date(cell: &Cell) -> bool {
    match cell {
        Cell::DateTime(_) => true,
        Cell::Text(s) => date_like_re().is_match(s.trim()),
        _ => false,
    }
}

fn looks_like_number(cell: &Cell) -> bool {
    match cell {
        Cell::Number(_) => true,
        Cell::Text(s) => number_like_re().is_match(s.trim()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::MemorySource;
    use crate::profiles::ALFA;

    fn t(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    /// Layout with the anchored header: label column is anchor + 2 because
    /// the header cell spans merged columns.
    fn anchored_source(rows: Vec<Vec<Cell>>) -> MemorySource {
        let mut grid = vec![
            vec![t("Неторговые операции за период")],
            vec![
                t(""),
                t("Дата операции"),
                t("Наименование операции"),
                t(""),
                t(""),
                t("Актив"),
                t("Основание"),
                t("Количество"),
            ],
        ];
        grid.extend(rows);
        MemorySource::new(vec![("Неторговые операции".to_string(), grid)])
    }

    fn row(date: &str, label: &str, asset: &str, comment: &str, qty: &str) -> Vec<Cell> {
        vec![
            t(""),
            t(date),
            t(""),
            t(""),
            t(label),
            t(asset),
            t(comment),
            t(qty),
        ]
    }

    #[test]
    fn conversion_rows_are_kept_others_discarded() {
        let mut src = anchored_source(vec![
            row("15.03.2023", "Перевод", "USD", "конвертация валюты", "100"),
            row("16.03.2023", "Перевод", "USD", "прочее", "50"),
            row("17.03.2023", "Зачисление", "USD", "конвертация валюты", "25"),
        ]);
        let outcome = TransfersParser::new(&ALFA).parse(&mut src);

        assert_eq!(outcome.operations.len(), 1);
        assert_eq!(outcome.operations[0].operation_type, "asset_receive");
        assert_eq!(outcome.operations[0].quantity, 100.0);
        assert_eq!(outcome.stats.skipped_not_conversion, 2);
    }

    #[test]
    fn withdrawal_direction_from_sign() {
        let mut src = anchored_source(vec![row(
            "15.03.2023",
            "Перевод",
            "USD",
            "конверсия средств",
            "-40",
        )]);
        let outcome = TransfersParser::new(&ALFA).parse(&mut src);

        assert_eq!(outcome.operations.len(), 1);
        assert_eq!(outcome.operations[0].operation_type, "asset_withdrawal");
        assert_eq!(outcome.operations[0].quantity, 40.0);
    }

    #[test]
    fn sampling_heuristics_without_any_header() {
        // No header row at all: columns identified purely by content.
        let grid = vec![
            vec![t("01.02.2023"), t("Перевод"), t("конвертация валюты"), t("10")],
            vec![t("02.02.2023"), t("Перевод"), t("конвертация валюты"), t("20")],
            vec![t("03.02.2023"), t("Списание"), t("вывод средств"), t("30")],
        ];
        let mut src = MemorySource::new(vec![("Конвертации".to_string(), grid)]);
        let outcome = TransfersParser::new(&ALFA).parse(&mut src);

        // Comment column is unmapped in this tier, so the conversion filter
        // can only match rows whose comment fell into a mapped column; the
        // two transfer rows lack a mapped comment and are dropped.
        assert_eq!(outcome.stats.total_rows, 3);
        assert_eq!(outcome.operations.len(), 0);
        assert_eq!(outcome.stats.column_mapping.get("date"), Some(&0));
        assert_eq!(outcome.stats.column_mapping.get("label"), Some(&1));
        assert_eq!(outcome.stats.column_mapping.get("quantity"), Some(&3));
    }

    #[test]
    fn date_and_number_shapes() {
        assert!(looks_like_date(&t("15.03.2023")));
        assert!(looks_like_date(&t("2023-03-15")));
        assert!(!looks_like_date(&t("Перевод")));
        assert!(looks_like_number(&t("-123,45")));
        assert!(looks_like_number(&Cell::Number(5.0)));
        assert!(!looks_like_number(&t("12 345"))); // grouped, not a bare number
    }
}
