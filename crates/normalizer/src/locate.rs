//! Heuristic table discovery: which sheet holds a category, and where its
//! header row sits. Every step is a fallback chain because institutions
//! rename sheets and shift headers between export versions.

use anyhow::{bail, Result};

use crate::grid::Grid;

/// How to pick a sheet for one category.
///
/// Tiers are tried in order: each tier is a keyword list matched as a
/// case-insensitive substring against every sheet name; the first sheet the
/// first non-empty tier hits wins. Then exact names, then the positional
/// fallback. Only an empty workbook is an error.
#[derive(Debug, Clone, Copy)]
pub struct SheetSpec {
    pub keyword_tiers: &'static [&'static [&'static str]],
    pub exact_names: &'static [&'static str],
    pub fallback_index: usize,
}

pub fn pick_sheet(sheet_names: &[String], spec: &SheetSpec) -> Result<String> {
    if sheet_names.is_empty() {
        bail!("workbook has no sheets");
    }

    for tier in spec.keyword_tiers {
        for name in sheet_names {
            let lower = name.to_lowercase();
            if tier.iter().any(|kw| lower.contains(kw)) {
                return Ok(name.clone());
            }
        }
    }

    for exact in spec.exact_names {
        if let Some(name) = sheet_names.iter().find(|n| n.as_str() == *exact) {
            return Ok(name.clone());
        }
    }

    let fallback = sheet_names
        .get(spec.fallback_index)
        .unwrap_or(&sheet_names[0]);
    tracing::warn!(
        "no sheet matched keywords, falling back to '{}' (position {})",
        fallback,
        spec.fallback_index
    );
    Ok(fallback.clone())
}

/// Scan depth for header discovery; real statements bury the table under a
/// preamble of account info, but never this deep.
pub const HEADER_SCAN_ROWS: usize = 20;

/// Finds the header row: first a row containing ALL of `all_markers`, then
/// a looser pass for ANY of `any_markers`. `None` means the caller must use
/// fixed fallback column positions.
pub fn find_header_row(
    grid: &Grid,
    all_markers: &[&str],
    any_markers: &[&str],
) -> Option<usize> {
    let depth = grid.len().min(HEADER_SCAN_ROWS);

    for (idx, row) in grid.iter().take(depth).enumerate() {
        let cells: Vec<String> = row.iter().map(|c| c.as_text().to_lowercase()).collect();
        if all_markers
            .iter()
            .all(|m| cells.iter().any(|c| c.contains(m)))
        {
            return Some(idx);
        }
    }

    for (idx, row) in grid.iter().take(depth).enumerate() {
        let cells: Vec<String> = row.iter().map(|c| c.as_text().to_lowercase()).collect();
        if any_markers
            .iter()
            .any(|m| cells.iter().any(|c| c.contains(m)))
        {
            return Some(idx);
        }
    }

    None
}
