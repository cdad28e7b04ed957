//! Broker statement normalization engine.
//!
//! Takes a spreadsheet export (XLS/XLSX) of a broker account statement and
//! produces one chronologically ordered stream of canonical operations:
//! cash movements, trades and non-trade asset transfers, each discovered
//! heuristically on its own sheet, classified and deduplicated.

pub mod classify;
pub mod columns;
pub mod grid;
pub mod locate;
pub mod normalize;
pub mod parsers;
pub mod profiles;

pub use grid::{Cell, Grid, MemorySource, SheetSource, WorkbookSource};
pub use normalize::normalize_statement;
pub use profiles::{Profile, ALFA};
