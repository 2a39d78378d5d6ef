//! Request and response bodies of the savings API.
//!
//! Output is camelCase. Input accepts both camelCase and snake_case for
//! multi-word fields so clients generated from either convention work.

use serde::{Deserialize, Deserializer, Serialize};

/// Accepts an integer, or a float with no fractional part such as `30.0`.
fn whole_number<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Number {
        Int(i64),
        Float(f64),
    }

    match Number::deserialize(deserializer)? {
        Number::Int(n) => Ok(n),
        Number::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
        Number::Float(f) => Err(serde::de::Error::custom(format!(
            "expected a whole number, got {f}"
        ))),
    }
}

/// A raw expense as reported by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    /// `YYYY-MM-DD HH:mm:ss`
    pub date: String,
    pub amount: f64,
}

/// An expense with its round-up ceiling and the remanent to invest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub date: String,
    pub amount: f64,
    pub ceiling: f64,
    pub remanent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidTransaction {
    pub date: String,
    pub amount: f64,
    pub ceiling: f64,
    pub remanent: f64,
    pub message: String,
}

impl InvalidTransaction {
    pub fn rejected(t: &Transaction, message: impl Into<String>) -> Self {
        Self {
            date: t.date.clone(),
            amount: t.amount,
            ceiling: t.ceiling,
            remanent: t.remanent,
            message: message.into(),
        }
    }
}

/// Replaces the remanent of every transaction inside the period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QPeriod {
    pub fixed: f64,
    pub start: String,
    pub end: String,
}

/// Adds `extra` to the remanent of every transaction inside the period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PPeriod {
    pub extra: f64,
    pub start: String,
    pub end: String,
}

/// Reporting window that savings are grouped by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KPeriod {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRequest {
    /// Monthly wage. Accepted for compatibility, not used by validation.
    pub wage: f64,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResponse {
    pub valid: Vec<Transaction>,
    pub invalid: Vec<InvalidTransaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterRequest {
    #[serde(default)]
    pub q: Vec<QPeriod>,
    #[serde(default)]
    pub p: Vec<PPeriod>,
    #[serde(default)]
    pub k: Vec<KPeriod>,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnsRequest {
    #[serde(deserialize_with = "whole_number")]
    pub age: i64,
    /// Monthly wage.
    pub wage: f64,
    pub inflation: f64,
    #[serde(default)]
    pub q: Vec<QPeriod>,
    #[serde(default)]
    pub p: Vec<PPeriod>,
    #[serde(default)]
    pub k: Vec<KPeriod>,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsByDate {
    pub start: String,
    pub end: String,
    pub amount: f64,
    pub profits: f64,
    #[serde(default, alias = "tax_benefit")]
    pub tax_benefit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnsResponse {
    #[serde(alias = "transactions_total_amount")]
    pub transactions_total_amount: f64,
    #[serde(alias = "transactions_total_ceiling")]
    pub transactions_total_ceiling: f64,
    #[serde(alias = "savings_by_dates")]
    pub savings_by_dates: Vec<SavingsByDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceResponse {
    /// Uptime as `HH:MM:SS.000`.
    pub time: String,
    /// Resident memory as `x.xx MB`.
    pub memory: String,
    pub threads: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    #[serde(alias = "job_id")]
    pub job_id: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    #[serde(alias = "job_id")]
    pub job_id: String,
    pub status: String,
    pub result: Option<ReturnsResponse>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculateRequest {
    #[serde(deserialize_with = "whole_number")]
    pub age: i64,
    pub wage: f64,
    pub inflation: f64,
    #[serde(default)]
    pub q: Vec<QPeriod>,
    #[serde(default)]
    pub p: Vec<PPeriod>,
    #[serde(default)]
    pub k: Vec<KPeriod>,
    pub expenses: Vec<Expense>,
}

/// Record counts after each orchestrator step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStepSummary {
    pub parsed: usize,
    pub valid: usize,
    pub filtered: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculateResponse {
    pub summary: PipelineStepSummary,
    #[serde(alias = "rejected_transactions")]
    pub rejected_transactions: Vec<InvalidTransaction>,
    pub nps: ReturnsResponse,
    #[serde(alias = "index_fund")]
    pub index_fund: ReturnsResponse,
}
