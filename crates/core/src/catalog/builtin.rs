//! Built-in Swedish BAS catalog versions.
//!
//! These are the default datasets shipped with the engine; deployments may
//! replace them with catalogs loaded from data files or repository rows.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::types::{AccountCatalog, AccountRecord, AccountType};

fn account(
    number: &str,
    name: &str,
    account_type: AccountType,
    vat_hint: Option<Decimal>,
    tags: &[&str],
) -> AccountRecord {
    AccountRecord {
        number: number.to_string(),
        name: name.to_string(),
        class: number.chars().take(2).collect(),
        account_type,
        default_vat_rate: vat_hint,
        allowed_regions: vec!["SE".to_string()],
        tags: tags.iter().map(ToString::to_string).collect(),
    }
}

fn base_accounts() -> Vec<AccountRecord> {
    use AccountType::{Asset, Expense, Income, Liability};

    vec![
        account("1930", "Kassa och bank", Asset, None, &["bank"]),
        account(
            "2614",
            "Utgående moms omvänd skattskyldighet, 25%",
            Liability,
            Some(Decimal::from(25)),
            &["vat_output_reverse"],
        ),
        account(
            "2640",
            "Ingående moms",
            Liability,
            Some(Decimal::from(25)),
            &["vat_input"],
        ),
        account(
            "2641",
            "Debiterad ingående moms",
            Liability,
            Some(Decimal::from(12)),
            &[],
        ),
        account(
            "2645",
            "Beräknad ingående moms på förvärv från utlandet",
            Liability,
            Some(Decimal::from(25)),
            &["vat_input_reverse"],
        ),
        account(
            "3740",
            "Öres- och kronutjämning",
            Income,
            None,
            &["rounding"],
        ),
        account(
            "6071",
            "Representation, avdragsgill",
            Expense,
            Some(Decimal::from(12)),
            &[],
        ),
        account("6072", "Representation, ej avdragsgill", Expense, None, &[]),
        account(
            "6110",
            "Kontorsmateriel",
            Expense,
            Some(Decimal::from(25)),
            &[],
        ),
        account(
            "6540",
            "IT-tjänster",
            Expense,
            Some(Decimal::from(25)),
            &[],
        ),
        account(
            "6541",
            "Programvaror och datatjänster",
            Expense,
            Some(Decimal::from(25)),
            &[],
        ),
    ]
}

/// BAS 2025 v1.0, effective 2025-01-01 through 2025-06-30.
#[must_use]
pub fn bas_2025_v1() -> AccountCatalog {
    AccountCatalog {
        version: "2025_v1.0".to_string(),
        effective_from: NaiveDate::from_ymd_opt(2025, 1, 1).expect("valid date"),
        effective_to: NaiveDate::from_ymd_opt(2025, 6, 30),
        regions: vec!["SE".to_string()],
        accounts: base_accounts(),
    }
}

/// BAS 2025 v2.0, effective from 2025-07-01.
///
/// Adds 6073 (digital representation) and 6542 (AI och automatisering)
/// on top of v1.0.
#[must_use]
pub fn bas_2025_v2() -> AccountCatalog {
    let mut accounts = base_accounts();
    accounts.push(account(
        "6073",
        "Representation, digital",
        AccountType::Expense,
        Some(Decimal::from(12)),
        &[],
    ));
    accounts.push(account(
        "6542",
        "AI och automatisering",
        AccountType::Expense,
        Some(Decimal::from(25)),
        &[],
    ));

    AccountCatalog {
        version: "2025_v2.0".to_string(),
        effective_from: NaiveDate::from_ymd_opt(2025, 7, 1).expect("valid date"),
        effective_to: None,
        regions: vec!["SE".to_string()],
        accounts,
    }
}
