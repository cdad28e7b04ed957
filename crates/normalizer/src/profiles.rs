//! Institution profiles: every keyword list, marker phrase and fallback
//! column position the parsers consult, kept as data so a new institution
//! layout is a new `Profile` value rather than new parser code.

use crate::columns::{Role, RoleKeywords};
use crate::locate::SheetSpec;

#[derive(Debug, Clone, Copy)]
pub struct CashProfile {
    pub sheet: SheetSpec,
    pub header_all: &'static [&'static str],
    pub header_any: &'static [&'static str],
    pub columns: &'static [RoleKeywords],
    /// Unmapped required roles are a structural error for this category.
    pub required: &'static [Role],
    /// Status cell value marking a settled row; anything else is skipped.
    pub executed_status: &'static str,
    /// Labels of summary rows that close out the table.
    pub totals_markers: &'static [&'static str],
}

#[derive(Debug, Clone, Copy)]
pub struct TradesProfile {
    pub sheet: SheetSpec,
    pub header_all: &'static [&'static str],
    pub header_any: &'static [&'static str],
    pub columns: &'static [RoleKeywords],
    /// Unmapped required roles fall back to fixed positions here.
    pub required: &'static [Role],
    pub fallback_positions: &'static [(Role, usize)],
    /// Direction column values; matched as lowercase substrings.
    pub buy_markers: &'static [&'static str],
    pub sell_markers: &'static [&'static str],
}

#[derive(Debug, Clone, Copy)]
pub struct TransfersProfile {
    pub sheet: SheetSpec,
    /// Header cell anchoring the table; other columns are found relative
    /// to it.
    pub anchor: &'static str,
    /// Printed label sits right of the anchor because of merged header
    /// cells in the export.
    pub label_offset: usize,
    pub fallback_positions: &'static [(Role, usize)],
    /// Row is kept only when the label matches one of these...
    pub transfer_markers: &'static [&'static str],
    /// ...and the comment matches one of these.
    pub conversion_markers: &'static [&'static str],
}

#[derive(Debug, Clone, Copy)]
pub struct Profile {
    pub name: &'static str,
    pub cash: CashProfile,
    pub trades: TradesProfile,
    pub transfers: TransfersProfile,
    /// Header labels whose neighbouring value is the account/contract id.
    pub account_labels: &'static [&'static str],
}

/// The Alfa-Bank full-statement export. Phrase lists mix institution and
/// generic wording on purpose: exports from reselling portals reuse the
/// same layout with translated sheet names.
pub const ALFA: Profile = Profile {
    name: "alfa",
    cash: CashProfile {
        sheet: SheetSpec {
            keyword_tiers: &[&["движение дс"], &["движение"]],
            exact_names: &["Движение ДС"],
            fallback_index: 2,
        },
        header_all: &["дата", "операция"],
        header_any: &["сумма"],
        columns: &[
            RoleKeywords { role: Role::Date, keywords: &["дата исполнения поручения", "дата исполнения"] },
            RoleKeywords { role: Role::Label, keywords: &["операция"] },
            RoleKeywords { role: Role::Amount, keywords: &["сумма"] },
            RoleKeywords { role: Role::Currency, keywords: &["валюта операции", "валюта"] },
            RoleKeywords { role: Role::Comment, keywords: &["содержание операции", "комментарий"] },
            RoleKeywords { role: Role::Status, keywords: &["статус"] },
            RoleKeywords { role: Role::InstrumentCode, keywords: &["код финансового инструмента"] },
        ],
        required: &[Role::Date, Role::Label, Role::Amount, Role::Currency, Role::Status],
        executed_status: "Исполнена",
        totals_markers: &["итого", "всего"],
    },
    trades: TradesProfile {
        sheet: SheetSpec {
            keyword_tiers: &[&["сделки"]],
            exact_names: &["Завершенные сделки", "Сделки", "Trades"],
            fallback_index: 0,
        },
        header_all: &["№ сделки", "дата заключения", "количество"],
        header_any: &["isin"],
        columns: &[
            RoleKeywords { role: Role::TradeId, keywords: &["№ сделки", "номер сделки", "id сделки"] },
            RoleKeywords { role: Role::Date, keywords: &["дата заключения", "заключен"] },
            RoleKeywords { role: Role::Direction, keywords: &["вид сделки", "покупка/продажа", "операция"] },
            RoleKeywords { role: Role::Isin, keywords: &["isin", "рег.код", "код"] },
            RoleKeywords { role: Role::AssetName, keywords: &["актив", "наименование"] },
            RoleKeywords { role: Role::Quantity, keywords: &["количество", "шт./грамм", "объем"] },
            RoleKeywords { role: Role::Price, keywords: &["цена"] },
            RoleKeywords { role: Role::Amount, keywords: &["сумма сделки", "стоимость", "сумма"] },
            RoleKeywords { role: Role::Aci, keywords: &["нкд", "в т.ч. нкд"] },
            RoleKeywords { role: Role::Currency, keywords: &["валюта расчетов", "валюта"] },
            RoleKeywords { role: Role::Commission, keywords: &["комиссия банка", "комиссия"] },
            RoleKeywords { role: Role::Comment, keywords: &["коммент", "примечание"] },
        ],
        required: &[
            Role::Date,
            Role::Isin,
            Role::AssetName,
            Role::Quantity,
            Role::Price,
            Role::Amount,
            Role::Currency,
        ],
        fallback_positions: &[
            (Role::Date, 2),
            (Role::Isin, 4),
            (Role::AssetName, 5),
            (Role::Quantity, 7),
            (Role::Price, 8),
            (Role::Amount, 9),
            (Role::Currency, 10),
            (Role::Commission, 11),
        ],
        buy_markers: &["покупка", "купля", "buy"],
        sell_markers: &["продажа", "sell"],
    },
    transfers: TransfersProfile {
        sheet: SheetSpec {
            keyword_tiers: &[
                &[
                    "неторговые операции",
                    "non-trade operations",
                    "неторговые",
                    "операции с ценными бумагами",
                    "non trade operations",
                    "неторговая операция",
                    "non-trade operation",
                    "конвертация",
                ],
                &["неторг", "non-trade", "конверт", "transfer"],
            ],
            exact_names: &["Неторговые операции", "Конвертации", "Non-trade operations"],
            fallback_index: 0,
        },
        anchor: "наименование операции",
        label_offset: 2,
        fallback_positions: &[
            (Role::Date, 1),
            (Role::Label, 8),
            (Role::AssetName, 9),
            (Role::Comment, 10),
            (Role::Quantity, 11),
        ],
        transfer_markers: &["перевод"],
        conversion_markers: &["конвертация", "конверсия"],
    },
    account_labels: &["генеральное соглашение", "номер договора", "договор №"],
};
