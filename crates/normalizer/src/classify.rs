//! Classification of raw operation labels into canonical kinds, and the
//! skip rules for rows that duplicate trade legs captured elsewhere.

/// How a matched rule resolves to a kind.
#[derive(Debug, Clone, Copy)]
pub enum Resolver {
    Fixed(&'static str),
    /// Branch on the sign of the payment amount.
    SignSplit {
        positive: &'static str,
        negative: &'static str,
    },
}

/// One classification rule: a lowercase substring pattern against the raw
/// label plus a resolver. Evaluated in declaration order, before the plain
/// label tables, so a label matching both resolves here.
#[derive(Debug, Clone, Copy)]
pub struct ClassifyRule {
    pub pattern: &'static str,
    pub resolver: Resolver,
}

/// Dynamic rules. Personal income tax postings flip meaning with the sign:
/// a positive amount is the broker refunding over-withheld tax.
const DYNAMIC_RULES: &[ClassifyRule] = &[ClassifyRule {
    pattern: "ндфл",
    resolver: Resolver::SignSplit {
        positive: "refund",
        negative: "withholding",
    },
}];

/// Exact label → kind, tried before the substring pass over the same table.
const LABEL_KIND_MAP: &[(&str, &str)] = &[
    ("Возмещение", "commission_refund"),
    ("Дивиденды", "dividend"),
    ("Купонный доход", "coupon"),
    ("Погашение купона", "coupon"),
];

/// Generic transfer labels are sub-classified by scanning the comment.
const TRANSFER_MARKER: &str = "перевод";

const TRANSFER_COMMENT_PATTERNS: &[(&str, &[&str])] = &[
    ("coupon", &["погашение купона", "погашением купона"]),
    (
        "amortization",
        &["частичное погашение номинала", "частичном погашении номинала"],
    ),
    (
        "repayment",
        &[
            "полное погашение номинала",
            "полном погашении номинала",
            "досрочное погашение номинала",
        ],
    ),
    (
        "deposit",
        &["из ао \"альфа-банк", "из ао альфа-банк", "card2catd", "card2bpk"],
    ),
    ("dividend", &["дивиденд"]),
    (
        "withdrawal",
        &["списание по поручению клиента", "возврат средств по дог"],
    ),
    (
        "other_income",
        &["выплата по поручению клиента в рамках", "исполнение обязательств"],
    ),
];

/// Rows carrying these labels are duplicate legs of trades already captured
/// by the trades parser and must not be double-counted.
const SKIP_PHRASES: &[&str] = &[
    "расчеты по сделке",
    "комиссия по сделке",
    "нкд по сделке",
    "покупка/продажа",
    "покупка/продажа (репо)",
    "переводы между площадками",
];

const CURRENCY_MAP: &[(&str, &str)] = &[
    ("AED", "AED"),
    ("AMD", "AMD"),
    ("BYN", "BYN"),
    ("CHF", "CHF"),
    ("CNY", "CNY"),
    ("EUR", "EUR"),
    ("GBP", "GBP"),
    ("HKD", "HKD"),
    ("JPY", "JPY"),
    ("KGS", "KGS"),
    ("KZT", "KZT"),
    ("NOK", "NOK"),
    ("RUB", "RUB"),
    ("RUR", "RUB"),
    ("РУБ", "RUB"),
    ("РУБЛЬ", "RUB"),
    ("SEK", "SEK"),
    ("TJS", "TJS"),
    ("TRY", "TRY"),
    ("USD", "USD"),
    ("UZS", "UZS"),
    ("XAG", "XAG"),
    ("XAU", "XAU"),
    ("ZAR", "ZAR"),
];

/// Maps a raw label plus context to a canonical operation kind.
///
/// Resolution order: dynamic rules, exact label table, substring label
/// table, transfer sub-classification by comment, then the trimmed raw
/// label itself ("unknown" when blank).
pub fn classify(label: &str, comment: &str, signed_amount: f64) -> String {
    let label_lower = label.to_lowercase();
    let comment_lower = comment.to_lowercase();

    for rule in DYNAMIC_RULES {
        if label_lower.contains(rule.pattern) {
            return match rule.resolver {
                Resolver::Fixed(kind) => kind.to_string(),
                Resolver::SignSplit { positive, negative } => {
                    if signed_amount > 0.0 {
                        positive.to_string()
                    } else {
                        negative.to_string()
                    }
                }
            };
        }
    }

    for (exact, kind) in LABEL_KIND_MAP {
        if label.trim() == *exact {
            return kind.to_string();
        }
    }

    for (key, kind) in LABEL_KIND_MAP {
        if label_lower.contains(&key.to_lowercase()) {
            return kind.to_string();
        }
    }

    if label_lower.contains(TRANSFER_MARKER) {
        for (kind, patterns) in TRANSFER_COMMENT_PATTERNS {
            if patterns.iter().any(|p| comment_lower.contains(p)) {
                return kind.to_string();
            }
        }
        return "transfer".to_string();
    }

    let trimmed = label.trim();
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

/// True when the row must be dropped: blank label, or the label contains
/// any fixed skip phrase (case-insensitive, substring).
pub fn should_skip(label: &str) -> bool {
    if label.trim().is_empty() {
        return true;
    }
    let low = label.to_lowercase();
    SKIP_PHRASES.iter().any(|p| low.contains(p))
}

/// Canonical uppercase currency code; unknown codes are passed through
/// uppercased, blank stays blank.
pub fn canonical_currency(raw: &str) -> String {
    let upper = raw.trim().to_uppercase();
    if upper.is_empty() || upper == "NAN" {
        return String::new();
    }
    for (key, code) in CURRENCY_MAP {
        if upper == *key {
            return code.to_string();
        }
    }
    upper
}
