//! Category parsers. Each one owns the pipeline for one operation
//! category: locate sheet → locate header → map columns → extract rows →
//! classify → build operations → update statistics.
//!
//! A parser never lets an error escape: structural failures are recorded
//! in its statistics and the orchestrator treats the category as empty.

mod cash_movements;
mod trades;
mod transfers;

pub use cash_movements::CashMovementsParser;
pub use trades::TradesParser;
pub use transfers::TransfersParser;

use std::collections::BTreeMap;

use models::{Operation, ParserStats};

use crate::columns::{ColumnMap, Role};
use crate::grid::{Cell, SheetSource};

/// The three operation categories a statement is split into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    CashMovements,
    Trades,
    Transfers,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::CashMovements => "cash_movements",
            Category::Trades => "trades",
            Category::Transfers => "transfers",
        }
    }
}

/// Result of one category parse: whatever operations could be extracted
/// plus the statistics accumulator (carrying the error, if any).
#[derive(Debug)]
pub struct CategoryOutcome {
    pub operations: Vec<Operation>,
    pub stats: ParserStats,
}

/// Shared contract for the per-category parsers. Institution variants are
/// profile data, not separate implementations.
pub trait CategoryParser {
    fn category(&self) -> Category;

    /// Never fails past this boundary: an unrecoverable problem produces an
    /// empty operation list and an `error` string in the statistics.
    fn parse(&self, source: &mut dyn SheetSource) -> CategoryOutcome;
}

/// Cell at a mapped role, if the role is mapped and the row is wide enough.
pub(crate) fn role_cell<'a>(row: &'a [Cell], map: &ColumnMap, role: Role) -> Option<&'a Cell> {
    map.get(&role).and_then(|idx| row.get(*idx))
}

pub(crate) fn text_field(row: &[Cell], map: &ColumnMap, role: Role) -> String {
    role_cell(row, map, role).map(|c| c.as_text()).unwrap_or_default()
}

pub(crate) fn number_field(row: &[Cell], map: &ColumnMap, role: Role) -> f64 {
    role_cell(row, map, role).map(|c| c.as_number()).unwrap_or(0.0)
}

pub(crate) fn record_column_mapping(stats: &mut ParserStats, map: &ColumnMap) {
    stats.column_mapping = map
        .iter()
        .map(|(role, idx)| (role.as_str().to_string(), *idx))
        .collect::<BTreeMap<_, _>>();
}

pub(crate) fn row_is_blank(row: &[Cell]) -> bool {
    row.iter().all(|c| c.is_empty())
}
