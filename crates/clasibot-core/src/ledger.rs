//! Accounting ledger client
//!
//! Reads company details, categories, tax codes and "for review" bank-feed
//! transactions, and writes accepted classifications back. Every call acts as
//! the synthetic bookkeeper through the tokens of one company's session.
//!
//! Ledger faults arrive as `{"Fault": {"Error": [{"Message", "Detail"}]}}` and
//! become [`Error::LedgerFault`].
//!
//! A write back is one accept call per ledger account. Calls keep going after
//! one account is rejected, and the [`WriteBackReport`] carries both the number
//! of transactions the ledger accepted and the first fault.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::EndpointConfig;
use crate::error::{Error, Result};
use crate::models::{
    Category, ClassifiedHistoryEntry, ClassifiedTransaction, CompanyInfo, CompanyLocation,
    LedgerAccount, RawForReviewTransaction,
};
use crate::query_result::LedgerFaultBody;
use crate::session::SessionTokens;
use crate::tax::TaxCode;

/// Account subtypes that receive bank-feed transactions
pub const TRANSACTION_ACCOUNT_SUBTYPES: &[&str] = &[
    "CreditCard",
    "Checking",
    "MoneyMarket",
    "RentsHeldInTrust",
    "Savings",
    "TrustAccounts",
    "CashOnHand",
];

/// Upper bound on rows returned by one ledger query
const MAX_RESULTS: usize = 1000;

/// Columns requested from the transaction list report, in row order
const HISTORY_COLUMNS: &str = "tx_date,name,other_account,subt_nat_amount";

/// Outcome of writing one batch back to the ledger
#[derive(Debug, Default)]
pub struct WriteBackReport {
    /// Transactions the ledger accepted
    pub written: usize,
    /// First rejected accept call, if any
    pub fault: Option<Error>,
}

impl WriteBackReport {
    pub fn failed(fault: Error) -> Self {
        Self {
            written: 0,
            fault: Some(fault),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.fault.is_none()
    }

    fn record_fault(&mut self, fault: Error) {
        if self.fault.is_none() {
            self.fault = Some(fault);
        }
    }
}

/// Read and write access to a company's books
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn company_info(&self, company_id: &str, tokens: &SessionTokens) -> Result<CompanyInfo>;

    /// Valid expense categories
    async fn categories(&self, company_id: &str, tokens: &SessionTokens) -> Result<Vec<Category>>;

    /// Accounts that carry bank-feed transactions
    async fn transaction_accounts(
        &self,
        company_id: &str,
        tokens: &SessionTokens,
    ) -> Result<Vec<LedgerAccount>>;

    /// Pending transactions of one account
    async fn for_review(
        &self,
        company_id: &str,
        tokens: &SessionTokens,
        account_id: &str,
    ) -> Result<Vec<RawForReviewTransaction>>;

    /// Active tax codes with their rates
    async fn tax_codes(&self, company_id: &str, tokens: &SessionTokens) -> Result<Vec<TaxCode>>;

    /// Expense transactions already categorized in the books, dated `since` or later
    async fn classified_transactions(
        &self,
        company_id: &str,
        tokens: &SessionTokens,
        since: NaiveDate,
    ) -> Result<Vec<ClassifiedHistoryEntry>>;

    /// Accept classified transactions
    ///
    /// Transactions without a category are skipped. A rejected account does
    /// not stop the others; see [`WriteBackReport`].
    async fn write_back(
        &self,
        company_id: &str,
        tokens: &SessionTokens,
        batch: &[ClassifiedTransaction],
    ) -> WriteBackReport;
}

// Wire shapes of the ledger's query API

#[derive(Debug, Deserialize)]
struct WireRef {
    value: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireAccount {
    id: String,
    name: String,
    #[serde(default)]
    account_type: String,
    #[serde(default = "default_true")]
    active: bool,
    #[serde(default)]
    tax_code_ref: Option<WireRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireTaxCode {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default = "default_true")]
    active: bool,
    #[serde(default)]
    purchase_tax_rate_list: Option<WireRateList>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireRateList {
    #[serde(default)]
    tax_rate_detail: Vec<WireRateDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireRateDetail {
    tax_rate_ref: WireRef,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireCompanyInfo {
    #[serde(default)]
    company_name: String,
    #[serde(default)]
    company_addr: Option<WireAddress>,
    #[serde(default)]
    name_value: Vec<WireNameValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireAddress {
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    country_sub_division_code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireNameValue {
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireReport {
    #[serde(default)]
    rows: Option<WireReportRows>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireReportRows {
    #[serde(default)]
    row: Vec<WireReportRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireReportRow {
    #[serde(default)]
    col_data: Vec<WireColData>,
    #[serde(default)]
    summary: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct WireColData {
    #[serde(default)]
    value: serde_json::Value,
}

impl WireReportRow {
    /// Text of column `index`; report cells hold strings or numbers
    fn cell(&self, index: usize) -> String {
        match self.col_data.get(index).map(|c| &c.value) {
            Some(serde_json::Value::String(s)) => s.trim().to_string(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    }

    /// History entry for a categorized expense row, in [`HISTORY_COLUMNS`] order
    fn to_history(&self, company_id: &str, fallback_date: NaiveDate) -> Option<ClassifiedHistoryEntry> {
        let name = self.cell(1);
        let category = self.cell(2);
        let amount: f64 = self.cell(3).parse().ok()?;
        if name.is_empty() || category.is_empty() || amount >= 0.0 {
            return None;
        }
        let date = NaiveDate::parse_from_str(&self.cell(0), "%Y-%m-%d").unwrap_or(fallback_date);
        Some(ClassifiedHistoryEntry {
            company_id: company_id.to_string(),
            name,
            amount,
            category,
            date,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ForReviewResponse {
    #[serde(default)]
    items: Vec<RawForReviewTransaction>,
}

fn default_true() -> bool {
    true
}

impl From<WireCompanyInfo> for CompanyInfo {
    fn from(wire: WireCompanyInfo) -> Self {
        let industry = wire
            .name_value
            .iter()
            .find(|nv| nv.name == "QBOIndustryType" || nv.name == "IndustryType")
            .map(|nv| nv.value.trim().to_string())
            .filter(|v| !v.is_empty());
        let location = wire
            .company_addr
            .map(|addr| CompanyLocation {
                country: addr.country.unwrap_or_default(),
                sub_location: addr.country_sub_division_code.filter(|s| !s.is_empty()),
            })
            .unwrap_or_default();
        CompanyInfo {
            name: wire.company_name,
            industry,
            location,
        }
    }
}

// Wire shapes of the batch accept call

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcceptRequest<'a> {
    txn_list: AcceptTxnList<'a>,
    next_txn_info: NextTxnInfo<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcceptTxnList<'a> {
    olb_txns: Vec<AcceptedTxn<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcceptedTxn<'a> {
    id: &'a str,
    #[serde(rename = "qboAccountId")]
    account_id: &'a str,
    description: &'a str,
    orig_description: &'a str,
    amount: f64,
    olb_txn_date: &'a str,
    accept_type: &'a str,
    #[serde(rename = "addAsQboTxn")]
    add_as: AcceptAddAs<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcceptAddAs<'a> {
    details: Vec<AcceptDetail<'a>>,
    name_id: Option<&'a str>,
    txn_date: &'a str,
    txn_type_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcceptDetail<'a> {
    category_id: &'a str,
    tax_code_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NextTxnInfo<'a> {
    account_id: &'a str,
    next_transaction_index: i64,
    review_state: &'static str,
}

impl<'a> AcceptRequest<'a> {
    fn new(account_id: &'a str, transactions: &[&'a ClassifiedTransaction]) -> Self {
        let olb_txns = transactions
            .iter()
            .copied()
            .filter_map(|ct| {
                let category = ct.category()?;
                let raw = &ct.transaction;
                Some(AcceptedTxn {
                    id: &raw.id,
                    account_id: &raw.account_id,
                    description: &raw.description,
                    orig_description: &raw.orig_description,
                    amount: raw.amount,
                    olb_txn_date: &raw.olb_txn_date,
                    accept_type: if raw.accept_type.is_empty() {
                        "ADD"
                    } else {
                        raw.accept_type.as_str()
                    },
                    add_as: AcceptAddAs {
                        details: vec![AcceptDetail {
                            category_id: &category.id,
                            tax_code_id: ct.tax_code.as_ref().map(|t| t.id.as_str()),
                        }],
                        name_id: None,
                        txn_date: &raw.olb_txn_date,
                        txn_type_id: raw
                            .add_as_txn
                            .as_ref()
                            .map(|a| a.txn_type_id.as_str())
                            .unwrap_or_default(),
                    },
                })
            })
            .collect();

        Self {
            txn_list: AcceptTxnList { olb_txns },
            next_txn_info: NextTxnInfo {
                account_id,
                next_transaction_index: -1,
                review_state: "PENDING",
            },
        }
    }
}

/// Group transactions by account, keeping first-appearance order
fn group_by_account(batch: &[ClassifiedTransaction]) -> Vec<(&str, Vec<&ClassifiedTransaction>)> {
    let mut groups: Vec<(&str, Vec<&ClassifiedTransaction>)> = Vec::new();
    for ct in batch.iter().filter(|ct| ct.category().is_some()) {
        let account = ct.transaction.account_id.as_str();
        match groups.iter_mut().find(|(id, _)| *id == account) {
            Some((_, members)) => members.push(ct),
            None => groups.push((account, vec![ct])),
        }
    }
    groups
}

/// Turn a non-success body into a ledger fault
fn fault_from_body(context: &str, status: reqwest::StatusCode, body: &str) -> Error {
    match LedgerFaultBody::parse(body) {
        Some((message, detail)) => Error::ledger(message, detail),
        None => Error::ledger(context, format!("{}: {}", status, body.trim())),
    }
}

/// Ledger reached over HTTP
#[derive(Clone)]
pub struct HttpLedger {
    client: Client,
    base_url: String,
    agent_id: Option<String>,
}

impl HttpLedger {
    pub fn new(base_url: &str, agent_id: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            agent_id,
        }
    }

    pub fn from_config(endpoints: &EndpointConfig) -> Option<Self> {
        let base = endpoints.ledger_base_url.as_deref()?;
        Some(Self::new(base, endpoints.ledger_agent_id.clone()))
    }

    /// Attach the synthetic session cookie and bearer token
    fn authorize(&self, request: RequestBuilder, tokens: &SessionTokens) -> RequestBuilder {
        let agent_id = self.agent_id.as_deref().unwrap_or(&tokens.auth_id);
        let cookie = format!(
            "qbn.ticket={}; qbn.agentid={}; qbn.authid={};",
            tokens.ticket, agent_id, tokens.auth_id
        );
        let request = request
            .header(reqwest::header::COOKIE, cookie)
            .header(reqwest::header::ACCEPT, "application/json");
        if tokens.access_token.is_empty() {
            request
        } else {
            request.bearer_auth(&tokens.access_token)
        }
    }

    /// Send a request and return the body, translating faults
    async fn send(&self, context: &str, request: RequestBuilder) -> Result<String> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(fault_from_body(context, status, &body));
        }
        // faults are sometimes reported with a 200
        if let Some((message, detail)) = LedgerFaultBody::parse(&body) {
            return Err(Error::ledger(message, detail));
        }
        Ok(body)
    }

    /// Run a query and return the rows of `entity`
    async fn query<T: DeserializeOwned>(
        &self,
        company_id: &str,
        tokens: &SessionTokens,
        query: &str,
        entity: &str,
    ) -> Result<Vec<T>> {
        let url = format!("{}/v3/company/{}/query", self.base_url, company_id);
        debug!(company_id = %company_id, entity = entity, "Ledger query");
        let request = self.authorize(self.client.get(&url), tokens).query(&[("query", query)]);
        let body = self
            .send(&format!("Failed to query {}", entity), request)
            .await?;

        let mut value: serde_json::Value = serde_json::from_str(&body)?;
        let rows = value
            .get_mut("QueryResponse")
            .and_then(|r| r.get_mut(entity))
            .map(serde_json::Value::take)
            .unwrap_or_else(|| serde_json::Value::Array(Vec::new()));
        Ok(serde_json::from_value(rows)?)
    }

    fn neo_url(&self, company_id: &str, action: &str) -> String {
        format!(
            "{}/api/neo/v1/company/{}/olb/ng/{}",
            self.base_url, company_id, action
        )
    }
}

#[async_trait]
impl Ledger for HttpLedger {
    async fn company_info(&self, company_id: &str, tokens: &SessionTokens) -> Result<CompanyInfo> {
        let rows: Vec<WireCompanyInfo> = self
            .query(company_id, tokens, "SELECT * FROM CompanyInfo", "CompanyInfo")
            .await?;
        rows.into_iter()
            .next()
            .map(CompanyInfo::from)
            .ok_or_else(|| Error::ledger("Failed to fetch company info", "no CompanyInfo returned"))
    }

    async fn categories(&self, company_id: &str, tokens: &SessionTokens) -> Result<Vec<Category>> {
        let query = format!(
            "SELECT * FROM Account WHERE Classification = 'Expense' MAXRESULTS {}",
            MAX_RESULTS
        );
        let rows: Vec<WireAccount> = self.query(company_id, tokens, &query, "Account").await?;
        Ok(rows
            .into_iter()
            .filter(|a| a.active)
            .map(|a| Category::new(a.id, a.name))
            .collect())
    }

    async fn transaction_accounts(
        &self,
        company_id: &str,
        tokens: &SessionTokens,
    ) -> Result<Vec<LedgerAccount>> {
        let subtypes = TRANSACTION_ACCOUNT_SUBTYPES
            .iter()
            .map(|s| format!("'{}'", s))
            .collect::<Vec<_>>()
            .join(", ");
        let query = format!(
            "SELECT * FROM Account WHERE AccountSubType IN ({}) MAXRESULTS {}",
            subtypes, MAX_RESULTS
        );
        let rows: Vec<WireAccount> = self.query(company_id, tokens, &query, "Account").await?;
        Ok(rows
            .into_iter()
            .filter(|a| a.active)
            .map(|a| LedgerAccount {
                tax_code_id: a.tax_code_ref.map(|r| r.value),
                account_type: a.account_type,
                tax_rates: Vec::new(),
                ..LedgerAccount::new(a.id, a.name)
            })
            .collect())
    }

    async fn for_review(
        &self,
        company_id: &str,
        tokens: &SessionTokens,
        account_id: &str,
    ) -> Result<Vec<RawForReviewTransaction>> {
        let request = self
            .authorize(self.client.get(self.neo_url(company_id, "getTransactions")), tokens)
            .query(&[
                ("accountId", account_id),
                ("sort", "-amount"),
                ("reviewState", "PENDING"),
                ("ignoreMatching", "false"),
            ]);
        let body = self
            .send("Failed to fetch for review transactions", request)
            .await?;
        let parsed: ForReviewResponse = serde_json::from_str(&body)?;
        debug!(
            company_id = %company_id,
            account_id = %account_id,
            transactions = parsed.items.len(),
            "Fetched for review transactions"
        );
        Ok(parsed.items)
    }

    async fn tax_codes(&self, company_id: &str, tokens: &SessionTokens) -> Result<Vec<TaxCode>> {
        let query = format!("SELECT * FROM TaxCode MAXRESULTS {}", MAX_RESULTS);
        let rows: Vec<WireTaxCode> = self.query(company_id, tokens, &query, "TaxCode").await?;
        Ok(rows
            .into_iter()
            .filter(|t| t.active)
            .filter_map(|t| {
                let name = t.name.filter(|n| !n.trim().is_empty())?;
                let rates = t
                    .purchase_tax_rate_list
                    .map(|list| {
                        list.tax_rate_detail
                            .into_iter()
                            .filter_map(|d| d.tax_rate_ref.name)
                            .collect()
                    })
                    .unwrap_or_default();
                Some(TaxCode {
                    id: t.id,
                    name,
                    rates,
                    active: true,
                })
            })
            .collect())
    }

    async fn classified_transactions(
        &self,
        company_id: &str,
        tokens: &SessionTokens,
        since: NaiveDate,
    ) -> Result<Vec<ClassifiedHistoryEntry>> {
        let today = Utc::now().date_naive();
        let url = format!("{}/v3/company/{}/reports/TransactionList", self.base_url, company_id);
        let request = self.authorize(self.client.get(&url), tokens).query(&[
            ("start_date", since.format("%Y-%m-%d").to_string()),
            ("end_date", today.format("%Y-%m-%d").to_string()),
            ("columns", HISTORY_COLUMNS.to_string()),
        ]);
        let body = self
            .send("Failed to fetch saved transactions", request)
            .await?;
        let report: WireReport = serde_json::from_str(&body)?;

        let history: Vec<ClassifiedHistoryEntry> = report
            .rows
            .map(|rows| rows.row)
            .unwrap_or_default()
            .iter()
            .take_while(|row| row.summary.is_none())
            .filter_map(|row| row.to_history(company_id, today))
            .collect();
        debug!(company_id = %company_id, entries = history.len(), "Fetched classified transactions");
        Ok(history)
    }

    async fn write_back(
        &self,
        company_id: &str,
        tokens: &SessionTokens,
        batch: &[ClassifiedTransaction],
    ) -> WriteBackReport {
        let url = self.neo_url(company_id, "batchAcceptTransactions");
        let mut report = WriteBackReport::default();
        for (account_id, members) in group_by_account(batch) {
            let payload = AcceptRequest::new(account_id, &members);
            let request = self.authorize(self.client.post(&url), tokens).json(&payload);
            match self.send("Failed to accept transactions", request).await {
                Ok(_) => report.written += payload.txn_list.olb_txns.len(),
                Err(e) => {
                    warn!(
                        company_id = %company_id,
                        account_id = %account_id,
                        error = %e,
                        "Account rejected classified transactions"
                    );
                    report.record_fault(e);
                }
            }
        }
        info!(
            company_id = %company_id,
            written = report.written,
            complete = report.is_complete(),
            "Wrote back classified transactions"
        );
        report
    }
}

/// Books of one company held by [`InMemoryLedger`]
#[derive(Debug, Clone, Default)]
pub struct LedgerFixture {
    pub info: CompanyInfo,
    pub categories: Vec<Category>,
    pub accounts: Vec<LedgerAccount>,
    pub tax_codes: Vec<TaxCode>,
    /// Pending transactions keyed by account id
    pub for_review: HashMap<String, Vec<RawForReviewTransaction>>,
    /// Transactions already categorized in the books
    pub history: Vec<ClassifiedHistoryEntry>,
}

impl LedgerFixture {
    pub fn new(info: CompanyInfo) -> Self {
        Self {
            info,
            ..Default::default()
        }
    }

    pub fn with_categories(mut self, categories: Vec<Category>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_tax_codes(mut self, tax_codes: Vec<TaxCode>) -> Self {
        self.tax_codes = tax_codes;
        self
    }

    pub fn with_history(mut self, history: Vec<ClassifiedHistoryEntry>) -> Self {
        self.history = history;
        self
    }

    /// Add an account and its pending transactions
    pub fn with_account(
        mut self,
        account: LedgerAccount,
        transactions: Vec<RawForReviewTransaction>,
    ) -> Self {
        self.for_review.insert(account.id.clone(), transactions);
        self.accounts.push(account);
        self
    }
}

#[derive(Default)]
struct LedgerState {
    companies: HashMap<String, LedgerFixture>,
    failing_fetch: HashSet<String>,
    /// 1-based write call numbers that fail, per company
    failing_writes: HashMap<String, HashSet<usize>>,
    /// Accounts whose transactions are always rejected, per company
    failing_accounts: HashMap<String, HashSet<String>>,
    write_calls: HashMap<String, usize>,
    written: HashMap<String, Vec<ClassifiedTransaction>>,
}

/// Ledger kept in memory, for tests and dry runs
///
/// Clones share the same books, so a test can keep a handle and inspect what
/// an orchestrator wrote.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_company(self, company_id: &str, fixture: LedgerFixture) -> Self {
        self.state().companies.insert(company_id.to_string(), fixture);
        self
    }

    /// Every read for this company fails
    pub fn failing_fetch(self, company_id: &str) -> Self {
        self.state().failing_fetch.insert(company_id.to_string());
        self
    }

    /// The `nth` write (1-based) for this company fails
    pub fn failing_write(self, company_id: &str, nth: usize) -> Self {
        self.state()
            .failing_writes
            .entry(company_id.to_string())
            .or_default()
            .insert(nth);
        self
    }

    /// Transactions of this account are rejected on every write
    pub fn failing_account(self, company_id: &str, account_id: &str) -> Self {
        self.state()
            .failing_accounts
            .entry(company_id.to_string())
            .or_default()
            .insert(account_id.to_string());
        self
    }

    /// Transactions accepted so far for a company
    pub fn written(&self, company_id: &str) -> Vec<ClassifiedTransaction> {
        self.state()
            .written
            .get(company_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Write calls received for a company, including failed ones
    pub fn write_calls(&self, company_id: &str) -> usize {
        self.state().write_calls.get(company_id).copied().unwrap_or(0)
    }

    fn fixture(&self, company_id: &str) -> Result<LedgerFixture> {
        let state = self.state();
        if state.failing_fetch.contains(company_id) {
            return Err(Error::ledger(
                "Service unavailable",
                format!("reads are failing for company {}", company_id),
            ));
        }
        state
            .companies
            .get(company_id)
            .cloned()
            .ok_or_else(|| Error::ledger("Company not found", company_id.to_string()))
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn company_info(&self, company_id: &str, _tokens: &SessionTokens) -> Result<CompanyInfo> {
        Ok(self.fixture(company_id)?.info)
    }

    async fn categories(&self, company_id: &str, _tokens: &SessionTokens) -> Result<Vec<Category>> {
        Ok(self.fixture(company_id)?.categories)
    }

    async fn transaction_accounts(
        &self,
        company_id: &str,
        _tokens: &SessionTokens,
    ) -> Result<Vec<LedgerAccount>> {
        Ok(self.fixture(company_id)?.accounts)
    }

    async fn for_review(
        &self,
        company_id: &str,
        _tokens: &SessionTokens,
        account_id: &str,
    ) -> Result<Vec<RawForReviewTransaction>> {
        let fixture = self.fixture(company_id)?;
        let written: HashSet<String> = self
            .written(company_id)
            .into_iter()
            .map(|ct| ct.transaction.id)
            .collect();
        Ok(fixture
            .for_review
            .get(account_id)
            .map(|txns| {
                txns.iter()
                    .filter(|t| !written.contains(&t.id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn tax_codes(&self, company_id: &str, _tokens: &SessionTokens) -> Result<Vec<TaxCode>> {
        Ok(self.fixture(company_id)?.tax_codes)
    }

    async fn classified_transactions(
        &self,
        company_id: &str,
        _tokens: &SessionTokens,
        since: NaiveDate,
    ) -> Result<Vec<ClassifiedHistoryEntry>> {
        Ok(self
            .fixture(company_id)?
            .history
            .into_iter()
            .filter(|entry| entry.date >= since)
            .collect())
    }

    async fn write_back(
        &self,
        company_id: &str,
        _tokens: &SessionTokens,
        batch: &[ClassifiedTransaction],
    ) -> WriteBackReport {
        let mut state = self.state();
        let call = {
            let calls = state.write_calls.entry(company_id.to_string()).or_insert(0);
            *calls += 1;
            *calls
        };
        let fails = state
            .failing_writes
            .get(company_id)
            .is_some_and(|calls| calls.contains(&call));
        if fails {
            return WriteBackReport::failed(Error::ledger(
                "Stale object error",
                format!("write {} rejected for company {}", call, company_id),
            ));
        }

        let rejected = state
            .failing_accounts
            .get(company_id)
            .cloned()
            .unwrap_or_default();
        let mut report = WriteBackReport::default();
        let mut accepted = Vec::new();
        for (account_id, members) in group_by_account(batch) {
            if rejected.contains(account_id) {
                report.record_fault(Error::ledger(
                    "Account is inactive",
                    format!("account {} rejected for company {}", account_id, company_id),
                ));
                continue;
            }
            accepted.extend(members.into_iter().cloned());
        }
        report.written = accepted.len();
        state
            .written
            .entry(company_id.to_string())
            .or_default()
            .extend(accepted);
        report
    }
}
