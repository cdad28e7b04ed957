//! Cash movements ("Движение ДС"): dividends, coupons, taxes, transfers in
//! and out of the account. The hard-required category: a missing header
//! row or unmapped required column is a structural error.

use anyhow::{bail, Result};

use coercion::{extract_isin, extract_reg_number};
use models::{Operation, ParserStats};

use crate::classify::{canonical_currency, classify, should_skip};
use crate::columns::{map_columns, missing_roles, Role};
use crate::grid::SheetSource;
use crate::locate::{find_header_row, pick_sheet};
use crate::parsers::{
    number_field, record_column_mapping, role_cell, row_is_blank, text_field, Category,
    CategoryOutcome, CategoryParser,
};
use crate::profiles::Profile;

pub struct CashMovementsParser {
    profile: &'static Profile,
}

impl CashMovementsParser {
    pub fn new(profile: &'static Profile) -> Self {
        Self { profile }
    }

    fn run(&self, source: &mut dyn SheetSource, stats: &mut ParserStats) -> Result<Vec<Operation>> {
        let cfg = &self.profile.cash;

        let sheet = pick_sheet(&source.sheet_names(), &cfg.sheet)?;
        tracing::info!("cash movements: using sheet '{}'", sheet);
        stats.detected_sheet = sheet.clone();

        let grid = source.grid(&sheet)?;
        let Some(header_row) = find_header_row(&grid, cfg.header_all, cfg.header_any) else {
            bail!("header row not found on sheet '{}'", sheet);
        };

        let map = map_columns(&grid[header_row], cfg.columns);
        let missing = missing_roles(&map, cfg.required);
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|r| r.as_str()).collect();
            bail!("required columns not found: {}", names.join(", "));
        }
        record_column_mapping(stats, &map);

        let mut operations = Vec::new();
        for row in grid.iter().skip(header_row + 1) {
            if row_is_blank(row) {
                continue;
            }
            stats.total_rows += 1;

            let status = text_field(row, &map, Role::Status);
            if status != cfg.executed_status {
                stats.skipped_not_executed += 1;
                continue;
            }

            let Some(date) = role_cell(row, &map, Role::Date).and_then(|c| c.as_datetime()) else {
                stats.skipped_no_date += 1;
                continue;
            };

            let amount = number_field(row, &map, Role::Amount);
            if amount == 0.0 {
                stats.skipped_no_amount += 1;
                continue;
            }

            let label = text_field(row, &map, Role::Label);
            let label_lower = label.to_lowercase();
            if cfg.totals_markers.iter().any(|m| label_lower.starts_with(m)) {
                stats.skipped_totals_row += 1;
                continue;
            }

            let comment = text_field(row, &map, Role::Comment);
            if should_skip(&label) {
                stats.skipped += 1;
                continue;
            }

            let kind = classify(&label, &comment, amount);
            let currency = canonical_currency(&text_field(row, &map, Role::Currency));
            let instrument_code = text_field(row, &map, Role::InstrumentCode);

            let full_text = format!("{} {}", comment, instrument_code);
            let isin = extract_isin(&full_text);
            let reg_number = extract_reg_number(&full_text);

            operations.push(Operation {
                date: Some(date),
                operation_type: kind.clone(),
                payment_sum: amount.abs(),
                currency,
                isin,
                reg_number,
                comment: comment.clone(),
                ..Operation::default()
            });

            stats.record_amount(&label, &kind, amount);
            stats.record_comment(&comment);
            stats.parsed += 1;
        }

        tracing::info!(
            "cash movements: parsed {} of {} rows",
            stats.parsed,
            stats.total_rows
        );
        Ok(operations)
    }
}

impl CategoryParser for CashMovementsParser {
    fn category(&self) -> Category {
        Category::CashMovements
    }

    fn parse(&self, source: &mut dyn SheetSource) -> CategoryOutcome {
        let mut stats = ParserStats::default();
        match self.run(source, &mut stats) {
            Ok(operations) => CategoryOutcome { operations, stats },
            Err(e) => {
                tracing::warn!("cash movements parse failed: {e:#}");
                stats.error = Some(e.to_string());
                CategoryOutcome {
                    operations: Vec::new(),
                    stats,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Cell, MemorySource};
    use crate::profiles::ALFA;
    use chrono::NaiveDate;

    fn t(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn header() -> Vec<Cell> {
        vec![
            t("Дата исполнения поручения"),
            t("Операция"),
            t("Сумма"),
            t("Валюта операции"),
            t("Содержание операции"),
            t("Статус"),
            t("Код финансового инструмента"),
        ]
    }

    fn source(rows: Vec<Vec<Cell>>) -> MemorySource {
        let mut grid = vec![vec![t("Отчет об операциях")], header()];
        grid.extend(rows);
        MemorySource::new(vec![
            ("Справка".to_string(), vec![vec![t("x")]]),
            ("Движение ДС".to_string(), grid),
        ])
    }

    #[test]
    fn executed_dividend_row_parses() {
        let mut src = source(vec![vec![
            t("15.03.2023"),
            t("Дивиденды"),
            t("1 234,56"),
            t("Рубль"),
            t("Дивиденды по акциям RU0009029540"),
            t("Исполнена"),
            t(""),
        ]]);
        let outcome = CashMovementsParser::new(&ALFA).parse(&mut src);

        assert_eq!(outcome.operations.len(), 1);
        let op = &outcome.operations[0];
        assert_eq!(op.operation_type, "dividend");
        assert_eq!(op.payment_sum, 1234.56);
        assert_eq!(op.currency, "RUB");
        assert_eq!(op.isin, "RU0009029540");
        assert_eq!(
            op.date.unwrap().date(),
            NaiveDate::from_ymd_opt(2023, 3, 15).unwrap()
        );
        assert_eq!(outcome.stats.parsed, 1);
        assert_eq!(outcome.stats.detected_sheet, "Движение ДС");
    }

    #[test]
    fn skip_reasons_are_counted_separately() {
        let mut src = source(vec![
            // not executed
            vec![t("15.03.2023"), t("Дивиденды"), t("10"), t("RUB"), t(""), t("Отменена"), t("")],
            // no date
            vec![t(""), t("Дивиденды"), t("10"), t("RUB"), t(""), t("Исполнена"), t("")],
            // zero amount
            vec![t("15.03.2023"), t("Дивиденды"), t("0"), t("RUB"), t(""), t("Исполнена"), t("")],
            // duplicate trade leg
            vec![t("15.03.2023"), t("Расчеты по сделке"), t("10"), t("RUB"), t(""), t("Исполнена"), t("")],
            // totals row
            vec![t("15.03.2023"), t("Итого по валюте"), t("99"), t("RUB"), t(""), t("Исполнена"), t("")],
        ]);
        let outcome = CashMovementsParser::new(&ALFA).parse(&mut src);

        assert!(outcome.operations.is_empty());
        let s = &outcome.stats;
        assert_eq!(s.total_rows, 5);
        assert_eq!(s.skipped_not_executed, 1);
        assert_eq!(s.skipped_no_date, 1);
        assert_eq!(s.skipped_no_amount, 1);
        assert_eq!(s.skipped, 1);
        assert_eq!(s.skipped_totals_row, 1);
    }

    #[test]
    fn negative_amount_keeps_direction_in_kind() {
        let mut src = source(vec![vec![
            t("15.03.2023"),
            t("НДФЛ"),
            t("-160"),
            t("RUB"),
            t("удержание налога"),
            t("Исполнена"),
            t(""),
        ]]);
        let outcome = CashMovementsParser::new(&ALFA).parse(&mut src);

        let op = &outcome.operations[0];
        assert_eq!(op.operation_type, "withholding");
        assert_eq!(op.payment_sum, 160.0); // magnitude only
    }

    #[test]
    fn missing_required_column_is_structural_error() {
        // no status column anywhere
        let grid = vec![
            vec![t("Дата исполнения поручения"), t("Операция"), t("Сумма"), t("Валюта операции")],
            vec![t("15.03.2023"), t("Дивиденды"), t("10"), t("RUB")],
        ];
        let mut src = MemorySource::new(vec![("Движение ДС".to_string(), grid)]);
        let outcome = CashMovementsParser::new(&ALFA).parse(&mut src);

        assert!(outcome.operations.is_empty());
        let err = outcome.stats.error.expect("structural error");
        assert!(err.contains("status"), "unexpected error: {err}");
    }
}
