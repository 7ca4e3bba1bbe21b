//! Domain models for Bearcat

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Name of the remote collection holding every expense
pub const EXPENSES_COLLECTION: &str = "expenses";

/// An expense as stored in the ledger collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseRecord {
    /// Store-assigned document id
    pub id: String,
    pub amount: f64,
    #[serde(default)]
    pub note: String,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Display for ExpenseRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${} — {}", self.amount, self.note)
    }
}

/// Payload for appending an expense; the id is assigned by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExpense {
    pub amount: f64,
    #[serde(default)]
    pub note: String,
    pub created_at: DateTime<Utc>,
}

impl NewExpense {
    /// Build an expense stamped with the current time
    pub fn new(amount: f64, note: impl Into<String>) -> Self {
        Self {
            amount,
            note: note.into(),
            created_at: Utc::now(),
        }
    }

    /// Attach the id the store assigned
    pub fn into_record(self, id: impl Into<String>) -> ExpenseRecord {
        ExpenseRecord {
            id: id.into(),
            amount: self.amount,
            note: self.note,
            created_at: self.created_at,
        }
    }
}

/// A full copy of the collection as delivered by a subscription
pub type Snapshot = Vec<ExpenseRecord>;

/// Parse the amount typed by the user
///
/// Accepts any finite, non-negative decimal after trimming whitespace.
pub fn parse_amount(input: &str) -> Result<f64, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyAmount);
    }

    let amount: f64 = trimmed
        .parse()
        .map_err(|_| ValidationError::InvalidAmount(trimmed.to_string()))?;

    if !amount.is_finite() {
        return Err(ValidationError::InvalidAmount(trimmed.to_string()));
    }
    if amount < 0.0 {
        return Err(ValidationError::NegativeAmount);
    }

    // Normalize -0.0
    Ok(if amount == 0.0 { 0.0 } else { amount })
}

/// Sum of all amounts in a snapshot
///
/// Starts from `+0.0`; `Iterator::sum` over floats starts from `-0.0` and
/// would print an empty ledger as `$-0.00`.
pub fn total_spent(records: &[ExpenseRecord]) -> f64 {
    records.iter().fold(0.0, |acc, r| acc + r.amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, amount: f64, note: &str) -> ExpenseRecord {
        NewExpense::new(amount, note).into_record(id)
    }

    #[test]
    fn test_parse_amount_decimal() {
        assert_eq!(parse_amount("12.50"), Ok(12.5));
        assert_eq!(parse_amount("  7 "), Ok(7.0));
        assert_eq!(parse_amount("0"), Ok(0.0));
    }

    #[test]
    fn test_parse_amount_negative_zero_normalized() {
        let amount = parse_amount("-0").unwrap();
        assert!(amount.is_sign_positive());
    }

    #[test]
    fn test_parse_amount_empty() {
        assert_eq!(parse_amount(""), Err(ValidationError::EmptyAmount));
        assert_eq!(parse_amount("   "), Err(ValidationError::EmptyAmount));
    }

    #[test]
    fn test_parse_amount_not_a_number() {
        assert_eq!(
            parse_amount("abc"),
            Err(ValidationError::InvalidAmount("abc".to_string()))
        );
        assert!(parse_amount("12abc").is_err());
        assert!(parse_amount("$5").is_err());
    }

    #[test]
    fn test_parse_amount_not_finite() {
        assert!(parse_amount("NaN").is_err());
        assert!(parse_amount("inf").is_err());
        assert!(parse_amount("-infinity").is_err());
    }

    #[test]
    fn test_parse_amount_negative() {
        assert_eq!(parse_amount("-3"), Err(ValidationError::NegativeAmount));
    }

    #[test]
    fn test_total_spent() {
        let records = vec![record("a", 20.0, ""), record("b", 2.25, "bus")];
        assert!((total_spent(&records) - 22.25).abs() < f64::EPSILON);
        assert_eq!(total_spent(&[]), 0.0);
    }

    #[test]
    fn test_total_spent_empty_is_positive_zero() {
        let total = total_spent(&[]);
        assert!(total.is_sign_positive());
        assert_eq!(format!("{:.2}", total), "0.00");
        assert!(crate::ai::tip_prompt(total).contains("$0.00"));
    }

    #[test]
    fn test_record_display() {
        assert_eq!(record("a", 12.5, "coffee").to_string(), "$12.5 — coffee");
        assert_eq!(record("b", 20.0, "").to_string(), "$20 — ");
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let json = serde_json::to_value(record("a", 1.0, "x")).unwrap();
        assert!(json.get("createdAt").is_some());
        assert!(json.get("created_at").is_none());
        assert_eq!(json["id"], "a");
    }

    #[test]
    fn test_new_expense_note_defaults_empty() {
        let expense: NewExpense =
            serde_json::from_str(r#"{"amount": 3.0, "createdAt": "2024-01-01T00:00:00Z"}"#)
                .unwrap();
        assert_eq!(expense.note, "");
    }
}
