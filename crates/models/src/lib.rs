use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::{json, Value};

/// One canonical financial operation, produced by exactly one category
/// parser from one source row and immutable afterwards.
///
/// Direction lives in `operation_type` ("buy", "sale", "asset_receive", ...);
/// `payment_sum` and `quantity` are magnitudes and never negative.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub date: Option<NaiveDateTime>,
    pub operation_type: String,
    pub payment_sum: f64,
    pub currency: String,
    pub ticker: String,
    pub isin: String,
    pub reg_number: String,
    pub price: f64,
    pub quantity: f64,
    pub aci: f64,
    pub comment: String,
    pub operation_id: String,
    pub commission: f64,
}

impl Default for Operation {
    fn default() -> Self {
        Self {
            date: None,
            operation_type: String::new(),
            payment_sum: 0.0,
            currency: String::new(),
            ticker: String::new(),
            isin: String::new(),
            reg_number: String::new(),
            price: 0.0,
            quantity: 0.0,
            aci: 0.0,
            comment: String::new(),
            operation_id: String::new(),
            commission: 0.0,
        }
    }
}

impl Operation {
    /// Key used during the merge to collapse duplicates. An external id wins;
    /// otherwise a composite of date, kind, absolute sum, ticker and ISIN.
    pub fn dedup_key(&self) -> String {
        let oid = self.operation_id.trim();
        if !oid.is_empty() {
            return format!("id:{}", oid);
        }
        let date_part = self
            .date
            .map(|d| d.format("%Y-%m-%dT%H:%M:%S").to_string())
            .unwrap_or_default();
        format!(
            "auto:{}|{}|{}|{}|{}",
            date_part,
            self.operation_type,
            self.payment_sum.abs(),
            self.ticker,
            self.isin
        )
    }

    /// Chronological sort key. Operations without a parsable timestamp sort
    /// first; ties are broken by the canonical kind so the order stays
    /// deterministic.
    pub fn sort_key(&self) -> (NaiveDateTime, &str) {
        (
            self.date.unwrap_or(NaiveDateTime::MIN),
            self.operation_type.as_str(),
        )
    }

    pub fn to_record(&self) -> OperationRecord {
        OperationRecord {
            date: self
                .date
                .map(|d| d.format("%Y-%m-%dT%H:%M:%S").to_string())
                .unwrap_or_default(),
            operation_type: self.operation_type.clone(),
            payment_sum: self.payment_sum,
            currency: self.currency.clone(),
            ticker: self.ticker.clone(),
            isin: self.isin.clone(),
            reg_number: self.reg_number.clone(),
            price: self.price,
            quantity: self.quantity,
            aci: self.aci,
            comment: self.comment.clone(),
            operation_id: self.operation_id.clone(),
            commission: self.commission,
        }
    }
}

/// Serialized form of [`Operation`]. The timestamp becomes an ISO-8601
/// string, or an empty string when the source row carried no usable date.
#[derive(Debug, Clone, Serialize)]
pub struct OperationRecord {
    pub date: String,
    pub operation_type: String,
    pub payment_sum: f64,
    pub currency: String,
    pub ticker: String,
    pub isin: String,
    pub reg_number: String,
    pub price: f64,
    pub quantity: f64,
    pub aci: f64,
    pub comment: String,
    pub operation_id: String,
    pub commission: f64,
}

/// Running counters for one category parse. One instance per parser
/// invocation; finalized into JSON at the end with monetary aggregates
/// rendered as strings.
#[derive(Debug, Clone, Default)]
pub struct ParserStats {
    pub total_rows: u64,
    pub parsed: u64,
    pub skipped: u64,
    pub skipped_not_executed: u64,
    pub skipped_no_date: u64,
    pub skipped_no_amount: u64,
    pub skipped_no_qty: u64,
    pub skipped_not_conversion: u64,
    pub skipped_totals_row: u64,
    pub skipped_invalid: u64,
    pub example_comments: Vec<String>,
    pub amounts_by_label: BTreeMap<String, f64>,
    pub amounts_by_mapped_type: BTreeMap<String, f64>,
    pub total_income: f64,
    pub total_expense: f64,
    pub total_commission: f64,
    pub detected_sheet: String,
    pub column_mapping: BTreeMap<String, usize>,
    pub error: Option<String>,
}

impl ParserStats {
    pub fn record_amount(&mut self, label: &str, mapped_type: &str, amount: f64) {
        if !label.is_empty() {
            *self.amounts_by_label.entry(label.to_string()).or_default() += amount;
        }
        *self
            .amounts_by_mapped_type
            .entry(mapped_type.to_string())
            .or_default() += amount;
        if amount > 0.0 {
            self.total_income += amount;
        } else {
            self.total_expense += amount.abs();
        }
    }

    pub fn record_comment(&mut self, comment: &str) {
        if self.example_comments.len() < 5 && !comment.is_empty() {
            self.example_comments.push(comment.to_string());
        }
    }

    /// Renders the accumulator as the JSON object exposed in the result
    /// meta. Monetary totals are stringified so downstream consumers never
    /// see float-formatting drift.
    pub fn finalize(&self) -> Value {
        let by_label: BTreeMap<&str, String> = self
            .amounts_by_label
            .iter()
            .map(|(k, v)| (k.as_str(), format_amount(*v)))
            .collect();
        let by_type: BTreeMap<&str, String> = self
            .amounts_by_mapped_type
            .iter()
            .map(|(k, v)| (k.as_str(), format_amount(*v)))
            .collect();

        let mut out = json!({
            "total_rows": self.total_rows,
            "parsed": self.parsed,
            "skipped": self.skipped,
            "skipped_not_executed": self.skipped_not_executed,
            "skipped_no_date": self.skipped_no_date,
            "skipped_no_amount": self.skipped_no_amount,
            "skipped_no_qty": self.skipped_no_qty,
            "skipped_not_conversion": self.skipped_not_conversion,
            "skipped_totals_row": self.skipped_totals_row,
            "skipped_invalid": self.skipped_invalid,
            "example_comments": self.example_comments,
            "amounts_by_label": by_label,
            "amounts_by_mapped_type": by_type,
            "total_income": format_amount(self.total_income),
            "total_expense": format_amount(self.total_expense),
            "total_commission": format_amount(self.total_commission),
            "detected_sheet": self.detected_sheet,
            "column_mapping": self.column_mapping,
        });
        if let Some(err) = &self.error {
            out.as_object_mut()
                .expect("stats object")
                .insert("error".to_string(), Value::String(err.clone()));
        }
        out
    }
}

fn format_amount(v: f64) -> String {
    // Trim the trailing zero noise of f64 display while keeping cents.
    let s = format!("{:.2}", v);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Everything the normalizer returns for one statement file.
#[derive(Debug, Serialize)]
pub struct NormalizedStatement {
    pub operations: Vec<OperationRecord>,
    pub meta: Value,
    pub account_id: Vec<String>,
    pub date_start: String,
    pub date_end: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn op(date: Option<NaiveDateTime>, kind: &str) -> Operation {
        Operation {
            date,
            operation_type: kind.to_string(),
            ..Operation::default()
        }
    }

    #[test]
    fn record_serializes_date_as_iso_or_empty() {
        let d = NaiveDate::from_ymd_opt(2023, 3, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        let with_date = op(Some(d), "dividend").to_record();
        assert_eq!(with_date.date, "2023-03-15T10:30:00");

        let without_date = op(None, "dividend").to_record();
        assert_eq!(without_date.date, "");
    }

    #[test]
    fn dedup_key_prefers_external_id() {
        let mut a = op(None, "buy");
        a.operation_id = "14533071091".to_string();
        assert_eq!(a.dedup_key(), "id:14533071091");

        a.operation_id = "  ".to_string();
        assert!(a.dedup_key().starts_with("auto:"));
    }

    #[test]
    fn dedup_key_uses_absolute_sum() {
        let mut a = op(None, "coupon");
        a.payment_sum = 12.5;
        let mut b = a.clone();
        b.payment_sum = -12.5;
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn missing_date_sorts_first() {
        let dated = op(
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap().and_hms_opt(0, 0, 0),
            "buy",
        );
        let undated = op(None, "buy");
        assert!(undated.sort_key() < dated.sort_key());
    }

    #[test]
    fn stats_finalize_stringifies_totals() {
        let mut stats = ParserStats::default();
        stats.record_amount("Дивиденды", "dividend", 1234.56);
        stats.record_amount("НДФЛ", "withholding", -160.0);
        let v = stats.finalize();
        assert_eq!(v["total_income"], "1234.56");
        assert_eq!(v["total_expense"], "160");
        assert_eq!(v["amounts_by_mapped_type"]["dividend"], "1234.56");
        assert!(v.get("error").is_none());
    }
}
