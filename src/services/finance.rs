use chrono::{DateTime, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kinds of finance records. Every kind except expenses is an income
/// account that withdrawals can be drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Offering,
    #[serde(rename = "projectoffering")]
    ProjectOffering,
    Tithe,
    Welfare,
    Expense,
}

impl RecordKind {
    pub const INCOME_ACCOUNTS: [RecordKind; 4] = [
        RecordKind::Offering,
        RecordKind::ProjectOffering,
        RecordKind::Tithe,
        RecordKind::Welfare,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Offering => "offering",
            RecordKind::ProjectOffering => "projectoffering",
            RecordKind::Tithe => "tithe",
            RecordKind::Welfare => "welfare",
            RecordKind::Expense => "expense",
        }
    }

    pub fn is_income_account(&self) -> bool {
        !matches!(self, RecordKind::Expense)
    }

    /// Status a new record starts in when the form does not set one.
    pub fn default_status(&self) -> &'static str {
        match self {
            RecordKind::Offering | RecordKind::ProjectOffering | RecordKind::Expense => "Pending",
            RecordKind::Tithe | RecordKind::Welfare => "Paid",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RecordKind::Offering => "Offering",
            RecordKind::ProjectOffering => "Project Offering",
            RecordKind::Tithe => "Tithe",
            RecordKind::Welfare => "Welfare",
            RecordKind::Expense => "Expense",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offering" => Ok(RecordKind::Offering),
            "projectoffering" => Ok(RecordKind::ProjectOffering),
            "tithe" => Ok(RecordKind::Tithe),
            "welfare" => Ok(RecordKind::Welfare),
            "expense" => Ok(RecordKind::Expense),
            other => Err(format!("Invalid transaction type: {}", other)),
        }
    }
}

/// Maps a form label ("Mobile Money") to its stored value, defaulting to cash.
pub fn normalize_payment_method(label: &str) -> &'static str {
    match label.trim() {
        "Mobile Money" | "Mobile_Money" => "Mobile_Money",
        "Bank Transfer" | "Bank_Transfer" => "Bank_Transfer",
        "Cheque" => "Cheque",
        "Mixed" => "Mixed",
        _ => "Cash",
    }
}

/// Maps a service label to its stored value, defaulting to Sunday worship.
pub fn normalize_service_type(label: &str) -> &'static str {
    match label.trim() {
        "Wednesday Service" | "Wednesday_Service" => "Wednesday_Service",
        "Prayer Meeting" | "Prayer_Meeting" => "Prayer_Meeting",
        "Special Offering" | "Special_Offering" => "Special_Offering",
        "Special Project Offering" | "Special_Project_Offering" => "Special_Project_Offering",
        _ => "Sunday_Worship",
    }
}

pub fn normalize_payment_period(label: &str) -> &'static str {
    match label.trim() {
        "Quarterly" => "Quarterly",
        "Annually" => "Annually",
        _ => "Monthly",
    }
}

/// Converts a decimal amount to minor units. Rejects non-finite, zero and
/// negative amounts.
pub fn amount_to_cents(amount: f64) -> Option<i64> {
    if !amount.is_finite() || amount <= 0.0 {
        return None;
    }

    let cents = (amount * 100.0).round();
    if cents < 1.0 || cents > i64::MAX as f64 {
        return None;
    }

    Some(cents as i64)
}

/// Formats minor units as `1234.50`.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Income, withdrawals and what is left for one account, in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccountBalance {
    pub income_cents: i64,
    pub withdrawals_cents: i64,
    pub balance_cents: i64,
}

impl AccountBalance {
    pub fn new(income_cents: i64, withdrawals_cents: i64) -> Self {
        Self {
            income_cents,
            withdrawals_cents,
            balance_cents: income_cents - withdrawals_cents,
        }
    }

    /// Checks that `amount_cents` can be drawn, returning the balance left.
    pub fn withdraw(&self, amount_cents: i64) -> Result<i64, String> {
        if self.balance_cents < amount_cents {
            return Err(format!(
                "Insufficient funds. Available: ₵{}",
                format_cents(self.balance_cents)
            ));
        }

        Ok(self.balance_cents - amount_cents)
    }
}

/// Generates `<prefix>-<unix millis>-<0..999>`, e.g. `TRX-1718000000000-42`.
pub fn transaction_id(prefix: &str, now: DateTime<Utc>) -> String {
    let mut bytes = [0u8; 2];
    let suffix = match SystemRandom::new().fill(&mut bytes) {
        Ok(()) => u16::from_le_bytes(bytes) % 1000,
        Err(_) => (now.timestamp_subsec_micros() % 1000) as u16,
    };

    format!("{}-{}-{}", prefix, now.timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_kind_parsing() {
        assert_eq!("projectoffering".parse::<RecordKind>(), Ok(RecordKind::ProjectOffering));
        assert_eq!("expense".parse::<RecordKind>(), Ok(RecordKind::Expense));
        assert!("donation".parse::<RecordKind>().is_err());

        let kind: RecordKind = serde_json::from_str("\"projectoffering\"").unwrap();
        assert_eq!(kind, RecordKind::ProjectOffering);
        assert_eq!(serde_json::to_string(&RecordKind::Tithe).unwrap(), "\"tithe\"");
    }

    #[test]
    fn test_income_accounts_exclude_expenses() {
        assert!(RecordKind::INCOME_ACCOUNTS.iter().all(RecordKind::is_income_account));
        assert!(!RecordKind::Expense.is_income_account());
    }

    #[test]
    fn test_amount_to_cents() {
        assert_eq!(amount_to_cents(12.5), Some(1250));
        assert_eq!(amount_to_cents(0.1 + 0.2), Some(30));
        assert_eq!(amount_to_cents(0.0), None);
        assert_eq!(amount_to_cents(-5.0), None);
        assert_eq!(amount_to_cents(f64::NAN), None);
        assert_eq!(amount_to_cents(0.001), None);
    }

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(123450), "1234.50");
        assert_eq!(format_cents(5), "0.05");
        assert_eq!(format_cents(-250), "-2.50");
    }

    #[test]
    fn test_balance_and_withdrawal() {
        let balance = AccountBalance::new(50_000, 20_000);
        assert_eq!(balance.balance_cents, 30_000);

        assert_eq!(balance.withdraw(30_000), Ok(0));
        assert_eq!(
            balance.withdraw(30_001),
            Err("Insufficient funds. Available: ₵300.00".to_string())
        );
    }

    #[test]
    fn test_form_label_normalization() {
        assert_eq!(normalize_payment_method("Mobile Money"), "Mobile_Money");
        assert_eq!(normalize_payment_method("Crypto"), "Cash");
        assert_eq!(normalize_service_type("Prayer Meeting"), "Prayer_Meeting");
        assert_eq!(normalize_service_type(""), "Sunday_Worship");
        assert_eq!(normalize_payment_period("Annually"), "Annually");
    }

    #[test]
    fn test_transaction_id_shape() {
        let now = Utc::now();
        let id = transaction_id("WD", now);
        let parts: Vec<&str> = id.split('-').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "WD");
        assert_eq!(parts[1], now.timestamp_millis().to_string());
        assert!(parts[2].parse::<u16>().unwrap() < 1000);
    }
}
