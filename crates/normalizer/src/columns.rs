//! Mapping header text (or sampled content) to semantic field roles.

use std::collections::HashMap;

use crate::grid::{Cell, Grid};

/// Semantic meaning of a column within one category's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Date,
    Label,
    Amount,
    Currency,
    Status,
    Comment,
    InstrumentCode,
    TradeId,
    Direction,
    Isin,
    AssetName,
    Quantity,
    Price,
    Aci,
    Commission,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Date => "date",
            Role::Label => "label",
            Role::Amount => "amount",
            Role::Currency => "currency",
            Role::Status => "status",
            Role::Comment => "comment",
            Role::InstrumentCode => "instrument_code",
            Role::TradeId => "trade_id",
            Role::Direction => "direction",
            Role::Isin => "isin",
            Role::AssetName => "asset_name",
            Role::Quantity => "quantity",
            Role::Price => "price",
            Role::Aci => "aci",
            Role::Commission => "commission",
        }
    }
}

/// Keyword list for one role. Matching is case-insensitive substring,
/// headers scanned left to right, first hit wins.
#[derive(Debug, Clone, Copy)]
pub struct RoleKeywords {
    pub role: Role,
    pub keywords: &'static [&'static str],
}

/// Semantic-role → column-index mapping for one sheet-parse session.
pub type ColumnMap = HashMap<Role, usize>;

/// Builds the column map from a header row. A role already assigned is
/// never overwritten, so keyword order encodes priority.
pub fn map_columns(headers: &[Cell], table: &[RoleKeywords]) -> ColumnMap {
    let lowered: Vec<String> = headers.iter().map(|c| c.as_text().to_lowercase()).collect();
    let mut map = ColumnMap::new();

    for entry in table {
        if map.contains_key(&entry.role) {
            continue;
        }
        'cols: for (idx, header) in lowered.iter().enumerate() {
            for kw in entry.keywords {
                if header.contains(kw) {
                    map.insert(entry.role, idx);
                    break 'cols;
                }
            }
        }
    }

    map
}

/// Roles from `required` that the map failed to assign.
pub fn missing_roles(map: &ColumnMap, required: &[Role]) -> Vec<Role> {
    required
        .iter()
        .copied()
        .filter(|r| !map.contains_key(r))
        .collect()
}

/// Fills unassigned roles from fixed positions, guarded by the actual row
/// width so a narrow sheet cannot map a role past its last column.
pub fn apply_fallback_positions(
    map: &mut ColumnMap,
    fallback: &[(Role, usize)],
    width: usize,
) {
    for (role, idx) in fallback {
        if !map.contains_key(role) && *idx < width {
            map.insert(*role, *idx);
        }
    }
}

/// Number of data rows sampled when several columns claim the same role.
const SAMPLE_ROWS: usize = 5;
/// Minimum numeric hits for a candidate column to win the sampling pass.
const SAMPLE_MIN_NUMERIC: usize = 2;

/// Disambiguates between candidate columns (e.g. several amount columns
/// labelled with a currency) by sampling the rows below the header: the
/// first candidate where at least 2 of the next 5 rows parse as numeric
/// wins.
pub fn pick_numeric_column(grid: &Grid, header_row: usize, candidates: &[usize]) -> Option<usize> {
    for &col in candidates {
        let mut numeric = 0;
        for row in grid.iter().skip(header_row + 1).take(SAMPLE_ROWS) {
            match row.get(col) {
                Some(Cell::Number(_)) => numeric += 1,
                Some(Cell::Text(s)) if coercion::to_float_safe(s) != 0.0 => numeric += 1,
                _ => {}
            }
        }
        if numeric >= SAMPLE_MIN_NUMERIC {
            return Some(col);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(cells: &[&str]) -> Vec<Cell> {
        cells.iter().map(|s| Cell::Text(s.to_string())).collect()
    }

    const TABLE: &[RoleKeywords] = &[
        RoleKeywords { role: Role::Date, keywords: &["дата исполнения"] },
        RoleKeywords { role: Role::Label, keywords: &["операция"] },
        RoleKeywords { role: Role::Amount, keywords: &["сумма"] },
        RoleKeywords { role: Role::Currency, keywords: &["валюта операции", "валюта"] },
    ];

    #[test]
    fn first_match_wins_left_to_right() {
        let h = headers(&[
            "Дата исполнения поручения",
            "Операция",
            "Сумма",
            "Сумма в рублях",
            "Валюта операции",
        ]);
        let map = map_columns(&h, TABLE);
        assert_eq!(map[&Role::Date], 0);
        assert_eq!(map[&Role::Amount], 2); // not the second "Сумма" column
        assert_eq!(map[&Role::Currency], 4);
    }

    #[test]
    fn assigned_role_is_never_overwritten() {
        // Currency has two keyword alternatives; the more specific one is
        // listed first and must not be replaced by the generic one.
        let h = headers(&["Валюта", "Валюта операции"]);
        let map = map_columns(&h, TABLE);
        assert_eq!(map[&Role::Currency], 1);
    }

    #[test]
    fn missing_roles_reported() {
        let h = headers(&["Операция", "Сумма"]);
        let map = map_columns(&h, TABLE);
        let missing = missing_roles(&map, &[Role::Date, Role::Label, Role::Currency]);
        assert_eq!(missing, vec![Role::Date, Role::Currency]);
    }

    #[test]
    fn fallback_respects_sheet_width() {
        let mut map = ColumnMap::new();
        apply_fallback_positions(&mut map, &[(Role::Date, 2), (Role::Quantity, 7)], 5);
        assert_eq!(map.get(&Role::Date), Some(&2));
        assert_eq!(map.get(&Role::Quantity), None); // column 7 doesn't exist
    }

    #[test]
    fn numeric_sampling_picks_the_real_amount_column() {
        let grid: Grid = vec![
            headers(&["Сумма в валюте цены", "Сумма в валюте расчетов"]),
            vec![Cell::Text("см. ниже".into()), Cell::Number(1000.0)],
            vec![Cell::Text("".into()), Cell::Number(2000.0)],
            vec![Cell::Text("-".into()), Cell::Text("3 000,50".into())],
        ];
        assert_eq!(pick_numeric_column(&grid, 0, &[0, 1]), Some(1));
        assert_eq!(pick_numeric_column(&grid, 0, &[0]), None);
    }
}
