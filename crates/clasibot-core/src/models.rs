//! Domain models for Clasibot

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::tax::TaxCode;

/// Maximum number of categories kept on a result
pub const MAX_POSSIBLE_CATEGORIES: usize = 3;

/// A ledger category (expense account)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
}

impl Category {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Which cascade tier produced a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassifiedBy {
    Matching,
    Database,
    #[serde(rename = "LLM")]
    Llm,
}

impl ClassifiedBy {
    /// Tie-break rank between sources; higher is more trusted
    pub fn confidence_value(&self) -> u8 {
        match self {
            Self::Matching => 3,
            Self::Database => 2,
            Self::Llm => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Matching => "Matching",
            Self::Database => "Database",
            Self::Llm => "LLM",
        }
    }
}

impl std::str::FromStr for ClassifiedBy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "matching" => Ok(Self::Matching),
            "database" => Ok(Self::Database),
            "llm" => Ok(Self::Llm),
            _ => Err(format!("Unknown classification source: {}", s)),
        }
    }
}

impl std::fmt::Display for ClassifiedBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A category together with the tier that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedCategory {
    #[serde(flatten)]
    pub category: Category,
    pub classified_by: ClassifiedBy,
}

/// Result of one resolution pass over one transaction
///
/// Equality ignores `computed_at`: two passes that pick the same categories
/// from the same tier are the same result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorizedResult {
    pub transaction_id: String,
    /// Highest-confidence first, at most [`MAX_POSSIBLE_CATEGORIES`]
    pub possible_categories: Vec<Category>,
    pub classified_by: ClassifiedBy,
    pub computed_at: DateTime<Utc>,
}

impl PartialEq for CategorizedResult {
    fn eq(&self, other: &Self) -> bool {
        self.transaction_id == other.transaction_id
            && self.possible_categories == other.possible_categories
            && self.classified_by == other.classified_by
    }
}

impl Eq for CategorizedResult {}

impl CategorizedResult {
    pub fn new(
        transaction_id: impl Into<String>,
        mut possible_categories: Vec<Category>,
        classified_by: ClassifiedBy,
    ) -> Self {
        possible_categories.truncate(MAX_POSSIBLE_CATEGORIES);
        Self {
            transaction_id: transaction_id.into(),
            possible_categories,
            classified_by,
            computed_at: Utc::now(),
        }
    }

    /// Explicit "nothing found" result
    pub fn unresolved(transaction_id: impl Into<String>) -> Self {
        Self::new(transaction_id, Vec::new(), ClassifiedBy::Llm)
    }

    pub fn is_resolved(&self) -> bool {
        !self.possible_categories.is_empty()
    }

    /// Best category, if any
    pub fn top(&self) -> Option<&Category> {
        self.possible_categories.first()
    }

    pub fn classified_categories(&self) -> Vec<ClassifiedCategory> {
        self.possible_categories
            .iter()
            .map(|c| ClassifiedCategory {
                category: c.clone(),
                classified_by: self.classified_by,
            })
            .collect()
    }

    /// Pick between two results for the same transaction
    ///
    /// The higher confidence value wins; on a tie the more recently computed
    /// result wins, and on identical timestamps `other` wins.
    pub fn merge(self, other: CategorizedResult) -> CategorizedResult {
        let mine = self.classified_by.confidence_value();
        let theirs = other.classified_by.confidence_value();
        match mine.cmp(&theirs) {
            std::cmp::Ordering::Greater => self,
            std::cmp::Ordering::Less => other,
            std::cmp::Ordering::Equal => {
                if self.computed_at > other.computed_at {
                    self
                } else {
                    other
                }
            }
        }
    }
}

/// Transaction pending categorization, as used by the resolver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDescriptor {
    pub transaction_id: String,
    pub name: String,
    pub date: Option<NaiveDate>,
    pub account_id: String,
    pub account_name: String,
    /// Negative = expense
    pub amount: f64,
    /// Candidate tax-rate names attached to the transaction or its account
    #[serde(default)]
    pub tax_rates: Vec<String>,
}

impl TransactionDescriptor {
    pub fn new(transaction_id: impl Into<String>, name: impl Into<String>, amount: f64) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            name: name.into(),
            date: None,
            account_id: String::new(),
            account_name: String::new(),
            amount,
            tax_rates: Vec::new(),
        }
    }

    /// Name used as the classification record key
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }
}

/// Instructions for how the ledger should add a reviewed transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddAsLedgerTxn {
    pub txn_type_id: String,
    pub txn_fdm_name: String,
}

/// "For review" transaction as the ledger reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawForReviewTransaction {
    pub id: String,
    #[serde(default)]
    pub olb_txn_id: String,
    #[serde(rename = "qboAccountId")]
    pub account_id: String,
    pub description: String,
    #[serde(default)]
    pub orig_description: String,
    pub amount: f64,
    pub olb_txn_date: String,
    #[serde(default)]
    pub accept_type: String,
    #[serde(rename = "addAsQboTxn", default)]
    pub add_as_txn: Option<AddAsLedgerTxn>,
    #[serde(default)]
    pub tax_rates: Vec<String>,
}

impl RawForReviewTransaction {
    /// Money left the account
    pub fn is_expense(&self) -> bool {
        self.amount < 0.0
    }

    pub fn to_descriptor(&self, account_name: &str, account_rates: &[String]) -> TransactionDescriptor {
        let date = self
            .olb_txn_date
            .split('T')
            .next()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());

        let mut tax_rates = self.tax_rates.clone();
        for rate in account_rates {
            if !tax_rates.iter().any(|r| r.eq_ignore_ascii_case(rate)) {
                tax_rates.push(rate.clone());
            }
        }

        TransactionDescriptor {
            transaction_id: self.id.clone(),
            name: self.description.clone(),
            date,
            account_id: self.account_id.clone(),
            account_name: account_name.to_string(),
            amount: self.amount,
            tax_rates,
        }
    }
}

/// A ledger account that receives bank-feed transactions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerAccount {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub account_type: String,
    /// Default tax rates configured on the account
    #[serde(default)]
    pub tax_rates: Vec<String>,
    /// Default tax code of the account; its rates are added to `tax_rates`
    #[serde(default)]
    pub tax_code_id: Option<String>,
}

impl LedgerAccount {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            account_type: String::new(),
            tax_rates: Vec::new(),
            tax_code_id: None,
        }
    }
}

/// Company location as reported by the ledger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyLocation {
    pub country: String,
    pub sub_location: Option<String>,
}

/// Company details used to build LLM context and scope tax codes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyInfo {
    pub name: String,
    pub industry: Option<String>,
    pub location: CompanyLocation,
}

/// Registered tenant company
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub company_id: String,
    pub name: String,
    pub firm_name: Option<String>,
    pub industry: Option<String>,
    /// The synthetic bookkeeper has been invited to this company
    pub bookkeeper_connected: bool,
    /// Last scheduled run failed for this company
    pub classification_failed: bool,
}

/// Company registration input
#[derive(Debug, Clone, Default)]
pub struct NewCompany {
    pub company_id: String,
    pub name: String,
    pub firm_name: Option<String>,
    pub industry: Option<String>,
    pub bookkeeper_connected: bool,
}

/// One `{category, count}` entry of a classification record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

/// Frequency cache of confirmed classifications for one transaction name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionClassificationRecord {
    pub name: String,
    pub categories: Vec<CategoryCount>,
}

/// A company's past confirmed classification, the matching vocabulary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedHistoryEntry {
    pub company_id: String,
    pub name: String,
    pub amount: f64,
    pub category: String,
    pub date: NaiveDate,
}

/// A transaction with its resolution and tax code, ready to be written back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedTransaction {
    pub transaction: RawForReviewTransaction,
    pub result: CategorizedResult,
    pub tax_code: Option<TaxCode>,
}

impl ClassifiedTransaction {
    pub fn category(&self) -> Option<&Category> {
        self.result.top()
    }
}

/// Status of a company's batch job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Success,
    PartialFailure,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::PartialFailure => "partial_failure",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::PartialFailure | Self::Failed)
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "success" => Ok(Self::Success),
            "partial_failure" => Ok(Self::PartialFailure),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Summary of one company's pass, kept in the job log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyOutcome {
    pub run_id: String,
    pub company_id: String,
    pub status: JobStatus,
    pub message: String,
    pub detail: String,
    pub completed_chunks: usize,
    pub max_chunks: usize,
    /// Transactions written back
    pub classified: usize,
    pub finished_at: DateTime<Utc>,
}

/// Aggregate result of a scheduled run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<CompanyOutcome>,
    pub next_review: DateTime<Utc>,
}

impl RunSummary {
    pub fn count(&self, status: JobStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }
}

/// Normalize a transaction name for lookups
///
/// Lowercases, drops punctuation other than `&` and `'`, and collapses whitespace.
pub fn normalize_name(name: &str) -> String {
    static PUNCT: OnceLock<Regex> = OnceLock::new();
    static SPACES: OnceLock<Regex> = OnceLock::new();
    let punct = PUNCT.get_or_init(|| Regex::new(r"[^\p{L}\p{N}&'\s]+").expect("valid regex"));
    let spaces = SPACES.get_or_init(|| Regex::new(r"\s+").expect("valid regex"));

    let lowered = name.to_lowercase();
    let stripped = punct.replace_all(&lowered, " ");
    spaces.replace_all(stripped.trim(), " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_confidence_values_are_strictly_ordered() {
        assert_eq!(ClassifiedBy::Matching.confidence_value(), 3);
        assert_eq!(ClassifiedBy::Database.confidence_value(), 2);
        assert_eq!(ClassifiedBy::Llm.confidence_value(), 1);
        assert!(ClassifiedBy::Matching.confidence_value() > ClassifiedBy::Database.confidence_value());
        assert!(ClassifiedBy::Database.confidence_value() > ClassifiedBy::Llm.confidence_value());
    }

    #[test]
    fn test_classified_by_serde_names() {
        assert_eq!(serde_json::to_string(&ClassifiedBy::Llm).unwrap(), "\"LLM\"");
        assert_eq!(
            serde_json::to_string(&ClassifiedBy::Matching).unwrap(),
            "\"Matching\""
        );
        assert_eq!("llm".parse::<ClassifiedBy>().unwrap(), ClassifiedBy::Llm);
        assert!("guess".parse::<ClassifiedBy>().is_err());
    }

    #[test]
    fn test_result_caps_categories() {
        let cats = (0..5)
            .map(|i| Category::new(i.to_string(), format!("Cat {}", i)))
            .collect();
        let result = CategorizedResult::new("t1", cats, ClassifiedBy::Database);
        assert_eq!(result.possible_categories.len(), MAX_POSSIBLE_CATEGORIES);
        assert_eq!(result.top().unwrap().name, "Cat 0");
    }

    #[test]
    fn test_result_equality_ignores_computed_at() {
        let first = CategorizedResult::new("t1", vec![Category::new("1", "Meals")], ClassifiedBy::Matching);
        let mut later = first.clone();
        later.computed_at = first.computed_at + Duration::minutes(3);
        assert_eq!(first, later);

        let other_tier = CategorizedResult::new("t1", vec![Category::new("1", "Meals")], ClassifiedBy::Llm);
        assert_ne!(first, other_tier);
    }

    #[test]
    fn test_classified_categories_carry_source() {
        let result = CategorizedResult::new(
            "t1",
            vec![Category::new("1", "Meals"), Category::new("2", "Travel")],
            ClassifiedBy::Database,
        );
        let classified = result.classified_categories();
        assert_eq!(classified.len(), 2);
        assert_eq!(classified[1].category.name, "Travel");
        assert!(classified.iter().all(|c| c.classified_by == ClassifiedBy::Database));
    }

    #[test]
    fn test_merge_prefers_higher_confidence() {
        let matching = CategorizedResult::new(
            "t1",
            vec![Category::new("1", "Meals")],
            ClassifiedBy::Matching,
        );
        let mut llm = CategorizedResult::new(
            "t1",
            vec![Category::new("2", "Travel")],
            ClassifiedBy::Llm,
        );
        llm.computed_at = matching.computed_at + Duration::hours(1);

        let merged = matching.clone().merge(llm.clone());
        assert_eq!(merged.classified_by, ClassifiedBy::Matching);
        let merged = llm.merge(matching);
        assert_eq!(merged.classified_by, ClassifiedBy::Matching);
    }

    #[test]
    fn test_merge_equal_confidence_prefers_newer() {
        let older = CategorizedResult::new(
            "t1",
            vec![Category::new("1", "Meals")],
            ClassifiedBy::Database,
        );
        let mut newer = CategorizedResult::new(
            "t1",
            vec![Category::new("2", "Travel")],
            ClassifiedBy::Database,
        );
        newer.computed_at = older.computed_at + Duration::seconds(5);

        assert_eq!(older.clone().merge(newer.clone()).top().unwrap().name, "Travel");
        assert_eq!(newer.merge(older).top().unwrap().name, "Travel");
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  UBER   *EATS  "), "uber eats");
        assert_eq!(normalize_name("Acme Office-Supplies #123"), "acme office supplies 123");
        assert_eq!(normalize_name("Trader Joe's"), "trader joe's");
    }

    #[test]
    fn test_raw_transaction_to_descriptor() {
        let raw = RawForReviewTransaction {
            id: "tx-1".into(),
            olb_txn_id: "olb-1".into(),
            account_id: "35".into(),
            description: "UBER EATS".into(),
            orig_description: "UBER EATS TORONTO".into(),
            amount: -23.5,
            olb_txn_date: "2024-05-02T00:00:00".into(),
            accept_type: "ADD".into(),
            add_as_txn: None,
            tax_rates: vec!["GST Purchase".into()],
        };
        assert!(raw.is_expense());

        let desc = raw.to_descriptor("Chequing", &["gst purchase".into(), "PST (BC) Purchase".into()]);
        assert_eq!(desc.transaction_id, "tx-1");
        assert_eq!(desc.date, NaiveDate::from_ymd_opt(2024, 5, 2));
        assert_eq!(desc.account_name, "Chequing");
        assert_eq!(desc.tax_rates, vec!["GST Purchase", "PST (BC) Purchase"]);
    }

    #[test]
    fn test_raw_transaction_wire_names() {
        let json = r#"{
            "id": "9",
            "olbTxnId": "77",
            "qboAccountId": "35",
            "description": "SHELL",
            "origDescription": "SHELL 0042",
            "amount": -60.0,
            "olbTxnDate": "2024-01-10T00:00:00.000Z",
            "acceptType": "ADD",
            "addAsQboTxn": {"txnTypeId": "54", "txnFdmName": "Expense"}
        }"#;
        let raw: RawForReviewTransaction = serde_json::from_str(json).unwrap();
        assert_eq!(raw.account_id, "35");
        assert_eq!(raw.add_as_txn.unwrap().txn_fdm_name, "Expense");
    }

    #[test]
    fn test_job_status_roundtrip_names() {
        assert_eq!(JobStatus::PartialFailure.as_str(), "partial_failure");
        assert_eq!("failed".parse::<JobStatus>().unwrap(), JobStatus::Failed);
        assert!(JobStatus::Success.is_terminal());
        assert!(!JobStatus::InProgress.is_terminal());
    }
}
