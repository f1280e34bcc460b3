//! Scheduled batch classification
//!
//! A run visits every company the synthetic bookkeeper is connected to. Each
//! company is processed in its own task:
//!
//! login → company info → categories → tax codes → accounts → for review
//! transactions → categorized history → chunks of `chunk_size`, each resolved
//! then written back.
//!
//! The Matching vocabulary is the company's categorized expense history read
//! from the ledger, plus any classifications confirmed locally.
//!
//! Companies never share mutable state, so one company failing (or its task
//! panicking) does not affect the others. Chunks that fail to write leave
//! their transactions in the review queue for the next run.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::ai::AIClient;
use crate::config::{Config, OrchestratorConfig};
use crate::db::Database;
use crate::enrichment::{Enricher, WebEnricher};
use crate::error::{Error, Result};
use crate::ledger::{HttpLedger, Ledger, WriteBackReport};
use crate::models::{
    Category, ClassifiedTransaction, Company, CompanyInfo, CompanyOutcome, JobStatus,
    RawForReviewTransaction, RunSummary, TransactionDescriptor,
};
use crate::query_result::QueryResult;
use crate::resolver::Resolver;
use crate::session::{HttpSessionProvider, SessionManager, SessionTokens};
use crate::sources::{history_since, DatabaseSource, LlmSource, MatchingSource};
use crate::tax::{Province, TaxCode, TaxCodeResolver};

/// Detail recorded when a company task dies without reporting
const TASK_ABORTED_DETAIL: &str = "The classification task for this company stopped unexpectedly";

/// Everything a company task needs, passed explicitly
#[derive(Debug, Clone)]
pub struct CompanyContext {
    pub run_id: String,
    pub company_id: String,
    pub firm_name: Option<String>,
    pub chunk_size: usize,
    pub call_timeout: Duration,
}

impl CompanyContext {
    pub fn new(run_id: &str, company: &Company, config: &OrchestratorConfig) -> Self {
        Self {
            run_id: run_id.to_string(),
            company_id: company.company_id.clone(),
            firm_name: company.firm_name.clone(),
            chunk_size: config.chunk_size.max(1),
            call_timeout: config.call_timeout(),
        }
    }
}

/// A pending transaction together with its resolver input
#[derive(Debug, Clone)]
struct PendingTransaction {
    raw: RawForReviewTransaction,
    descriptor: TransactionDescriptor,
}

/// Per-run progress of one company
///
/// Lives only for the duration of the company task; only the resulting
/// [`CompanyOutcome`] is kept.
#[derive(Debug)]
pub struct CompanyBatchJob {
    pub company_id: String,
    tokens: Option<SessionTokens>,
    pending: Vec<PendingTransaction>,
    pub completed_chunks: usize,
    pub failed_chunks: usize,
    pub max_chunks: usize,
    pub classified: usize,
    pub status: JobStatus,
}

impl CompanyBatchJob {
    pub fn new(company_id: &str) -> Self {
        Self {
            company_id: company_id.to_string(),
            tokens: None,
            pending: Vec::new(),
            completed_chunks: 0,
            failed_chunks: 0,
            max_chunks: 0,
            classified: 0,
            status: JobStatus::Pending,
        }
    }

    /// Status once every chunk has been attempted
    fn settle(&mut self) -> JobStatus {
        self.status = match (self.completed_chunks, self.failed_chunks) {
            (_, 0) => JobStatus::Success,
            (0, _) => JobStatus::Failed,
            _ => JobStatus::PartialFailure,
        };
        self.status
    }

    fn outcome(&self, run_id: &str, result: &QueryResult) -> CompanyOutcome {
        CompanyOutcome {
            run_id: run_id.to_string(),
            company_id: self.company_id.clone(),
            status: self.status,
            message: result.message.clone(),
            detail: result.detail.clone(),
            completed_chunks: self.completed_chunks,
            max_chunks: self.max_chunks,
            classified: self.classified,
            finished_at: Utc::now(),
        }
    }

    fn fail(mut self, run_id: &str, result: &QueryResult) -> CompanyOutcome {
        self.status = JobStatus::Failed;
        self.outcome(run_id, result)
    }
}

/// What was read from the ledger before classification
struct CompanyBooks {
    info: CompanyInfo,
    categories: Vec<Category>,
    tax: Option<(Province, TaxCodeResolver)>,
    pending: Vec<PendingTransaction>,
}

/// New run id: UTC timestamp plus a process-wide sequence number
pub fn next_run_id() -> String {
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);
    format!(
        "run-{}-{}",
        Utc::now().format("%Y%m%dT%H%M%S"),
        SEQUENCE.fetch_add(1, Ordering::SeqCst)
    )
}

/// Location label used in LLM prompts, e.g. `BC, CA`
fn location_label(info: &CompanyInfo) -> Option<String> {
    let country = info.location.country.trim();
    match (info.location.sub_location.as_deref(), country.is_empty()) {
        (Some(sub), false) => Some(format!("{}, {}", sub, country)),
        (Some(sub), true) => Some(sub.to_string()),
        (None, false) => Some(country.to_string()),
        (None, true) => None,
    }
}

/// Drives scheduled runs over all connected companies
pub struct Orchestrator {
    db: Database,
    ledger: Arc<dyn Ledger>,
    sessions: SessionManager,
    ai: Option<AIClient>,
    enricher: Option<Arc<dyn Enricher>>,
    config: Config,
}

impl Orchestrator {
    pub fn new(db: Database, ledger: Arc<dyn Ledger>, sessions: SessionManager, config: Config) -> Self {
        Self {
            db,
            ledger,
            sessions,
            ai: None,
            enricher: None,
            config,
        }
    }

    pub fn with_ai(mut self, ai: AIClient) -> Self {
        self.ai = Some(ai);
        self
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// Wire up the HTTP collaborators named in the configuration
    ///
    /// The language model comes from `AI_BACKEND`; without one, transactions
    /// that Matching and Database cannot place stay unclassified.
    pub fn from_config(db: Database, config: Config) -> Result<Self> {
        let ledger = HttpLedger::from_config(&config.endpoints)
            .ok_or_else(|| Error::Configuration("LEDGER_BASE_URL is not set".into()))?;
        let session_url = config
            .endpoints
            .session_service_url
            .as_deref()
            .ok_or_else(|| Error::Configuration("SESSION_SERVICE_URL is not set".into()))?;
        let sessions = SessionManager::new(
            Arc::new(HttpSessionProvider::new(session_url)),
            config.orchestrator.call_timeout(),
        );

        let enricher = WebEnricher::from_config(&config.enrichment, config.classifier.call_timeout());
        let ai = AIClient::from_env();
        if ai.is_none() {
            warn!("No language model configured, the LLM tier is disabled");
        }

        let mut orchestrator = Self::new(db, Arc::new(ledger), sessions, config);
        orchestrator.ai = ai;
        if let Some(enricher) = enricher {
            orchestrator.enricher = Some(Arc::new(enricher));
        }
        Ok(orchestrator)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start a run in the background
    ///
    /// The run id is returned right away so the trigger can answer before the
    /// run finishes.
    pub fn start_run(self: &Arc<Self>) -> (String, JoinHandle<RunSummary>) {
        let run_id = next_run_id();
        let this = Arc::clone(self);
        let id = run_id.clone();
        let handle = tokio::spawn(async move { this.run_with_id(id).await });
        (run_id, handle)
    }

    /// Run to completion under a fresh run id
    pub async fn run(self: &Arc<Self>) -> RunSummary {
        self.run_with_id(next_run_id()).await
    }

    pub async fn run_with_id(self: &Arc<Self>, run_id: String) -> RunSummary {
        let started_at = Utc::now();
        let companies = match self.db.list_connected_companies() {
            Ok(companies) => companies,
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Failed to list connected companies");
                Vec::new()
            }
        };
        info!(run_id = %run_id, companies = companies.len(), "Starting classification run");

        let tasks: Vec<(String, JoinHandle<CompanyOutcome>)> = companies
            .iter()
            .map(|company| {
                let ctx = CompanyContext::new(&run_id, company, &self.config.orchestrator);
                let this = Arc::clone(self);
                let handle = tokio::spawn(async move { this.process_company(ctx).await });
                (company.company_id.clone(), handle)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(tasks.len());
        for (company_id, handle) in tasks {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(run_id = %run_id, company_id = %company_id, error = %e, "Company task aborted");
                    CompanyBatchJob::new(&company_id).fail(
                        &run_id,
                        &QueryResult::error("An unexpected error occurred", TASK_ABORTED_DETAIL),
                    )
                }
            };
            self.record_outcome(&outcome);
            outcomes.push(outcome);
        }

        let next_review = self.schedule_next_review();
        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            outcomes,
            next_review,
        };
        info!(
            run_id = %summary.run_id,
            success = summary.count(JobStatus::Success),
            partial = summary.count(JobStatus::PartialFailure),
            failed = summary.count(JobStatus::Failed),
            next_review = %summary.next_review,
            "Classification run complete"
        );
        summary
    }

    /// Persist the next review time, returning it even if persisting fails
    pub fn schedule_next_review(&self) -> DateTime<Utc> {
        let at = Utc::now() + chrono::Duration::days(self.config.orchestrator.review_interval_days);
        if let Err(e) = self.db.set_next_review(at) {
            error!(next_review = %at, error = %e, "Failed to store next review time");
        }
        at
    }

    fn record_outcome(&self, outcome: &CompanyOutcome) {
        if let Err(e) = self.db.record_company_outcome(outcome) {
            warn!(company_id = %outcome.company_id, error = %e, "Failed to record job outcome");
        }
        let failed = outcome.status == JobStatus::Failed;
        if let Err(e) = self.db.set_classification_failed(&outcome.company_id, failed) {
            warn!(company_id = %outcome.company_id, error = %e, "Failed to update company failure flag");
        }
    }

    /// One company's full pipeline
    pub async fn process_company(&self, ctx: CompanyContext) -> CompanyOutcome {
        let mut job = CompanyBatchJob::new(&ctx.company_id);
        job.status = JobStatus::InProgress;
        info!(run_id = %ctx.run_id, company_id = %ctx.company_id, "Processing company");

        let (login, tokens) = self
            .sessions
            .login(&ctx.company_id, ctx.firm_name.as_deref(), None)
            .await;
        let Some(tokens) = tokens else {
            error!(company_id = %ctx.company_id, detail = %login.detail, "Company failed at login");
            return job.fail(&ctx.run_id, &login);
        };
        job.tokens = Some(tokens);

        let books = match self.read_books(&ctx, &job).await {
            Ok(books) => books,
            Err(e) => {
                error!(company_id = %ctx.company_id, error = %e, "Company failed while reading the ledger");
                return job.fail(&ctx.run_id, &QueryResult::from(&e));
            }
        };
        job.pending = books.pending;
        job.max_chunks = job.pending.len().div_ceil(ctx.chunk_size);

        if job.pending.is_empty() {
            job.status = JobStatus::Success;
            info!(company_id = %ctx.company_id, "No transactions to classify");
            return job.outcome(
                &ctx.run_id,
                &QueryResult::success("No transactions to classify", ""),
            );
        }

        let matching = match job.tokens.as_ref() {
            Some(tokens) => self.matching_source(&ctx, tokens).await,
            None => MatchingSource::new(Vec::new(), self.config.classifier.match_threshold),
        };
        let resolver = self.build_resolver(matching, &books.info);
        let mut last_failure: Option<QueryResult> = None;
        let pending = std::mem::take(&mut job.pending);

        for (index, chunk) in pending.chunks(ctx.chunk_size).enumerate() {
            let classified = self
                .classify_chunk(&resolver, chunk, &books.categories, books.tax.as_ref())
                .await;

            let Some(tokens) = job.tokens.as_ref() else {
                break;
            };
            let report = self
                .bounded(ctx.call_timeout, "write back", async {
                    Ok::<_, Error>(self.ledger.write_back(&ctx.company_id, tokens, &classified).await)
                })
                .await
                .unwrap_or_else(WriteBackReport::failed);

            // accepted transactions count even when part of the chunk was rejected
            job.classified += report.written;
            match report.fault {
                None => {
                    job.completed_chunks += 1;
                    debug!(
                        company_id = %ctx.company_id,
                        chunk = index + 1,
                        of = job.max_chunks,
                        written = report.written,
                        "Chunk written back"
                    );
                }
                Some(e) => {
                    job.failed_chunks += 1;
                    warn!(
                        company_id = %ctx.company_id,
                        chunk = index + 1,
                        of = job.max_chunks,
                        written = report.written,
                        error = %e,
                        "Chunk write back failed"
                    );
                    last_failure = Some(QueryResult::from(&e));
                }
            }
        }

        let status = job.settle();
        let result = match (status, last_failure) {
            (JobStatus::Success, _) | (_, None) => QueryResult::success(
                "Successfully classified transactions",
                format!("{} transactions written back", job.classified),
            ),
            (JobStatus::PartialFailure, Some(failure)) => QueryResult::error(
                format!(
                    "Classified {} of {} chunks",
                    job.completed_chunks, job.max_chunks
                ),
                format!("{}: {}", failure.message, failure.detail),
            ),
            (_, Some(failure)) => failure,
        };

        match status {
            JobStatus::Failed => {
                error!(company_id = %ctx.company_id, detail = %result.detail, "Every chunk failed")
            }
            _ => info!(
                company_id = %ctx.company_id,
                status = %status,
                classified = job.classified,
                chunks = job.completed_chunks,
                "Company processed"
            ),
        }
        job.outcome(&ctx.run_id, &result)
    }

    /// Matching vocabulary from the ledger's categorized history and local confirmations
    ///
    /// Either side failing only shrinks the vocabulary.
    async fn matching_source(&self, ctx: &CompanyContext, tokens: &SessionTokens) -> MatchingSource {
        let classifier = &self.config.classifier;
        let since = history_since(classifier.history_years);

        let mut history = self
            .bounded(
                ctx.call_timeout,
                "classified transactions",
                self.ledger.classified_transactions(&ctx.company_id, tokens, since),
            )
            .await
            .unwrap_or_else(|e| {
                warn!(company_id = %ctx.company_id, error = %e, "Failed to fetch classified transactions");
                Vec::new()
            });
        let from_ledger = history.len();

        match self.db.list_classified_history(&ctx.company_id, since) {
            Ok(local) => history.extend(local),
            Err(e) => {
                warn!(company_id = %ctx.company_id, error = %e, "Failed to load confirmed history")
            }
        }

        debug!(
            company_id = %ctx.company_id,
            ledger = from_ledger,
            total = history.len(),
            "Built matching vocabulary"
        );
        MatchingSource::new(history, classifier.match_threshold)
    }

    /// Resolver over the given history, the shared records and the LLM
    pub fn build_resolver(&self, matching: MatchingSource, info: &CompanyInfo) -> Resolver {
        let classifier = &self.config.classifier;
        let mut resolver = Resolver::new(classifier.call_timeout())
            .with_matching(matching)
            .with_database(DatabaseSource::new(self.db.clone(), classifier.database_top_n));

        if let Some(ai) = &self.ai {
            let location = location_label(info);
            let mut llm = LlmSource::new(ai.clone())
                .with_company(info.industry.as_deref(), location.as_deref());
            if let Some(enricher) = &self.enricher {
                llm = llm.with_enricher(Arc::clone(enricher));
            }
            resolver = resolver.with_llm(llm);
        }
        resolver
    }

    async fn classify_chunk(
        &self,
        resolver: &Resolver,
        chunk: &[PendingTransaction],
        categories: &[Category],
        tax: Option<&(Province, TaxCodeResolver)>,
    ) -> Vec<ClassifiedTransaction> {
        let descriptors: Vec<TransactionDescriptor> =
            chunk.iter().map(|p| p.descriptor.clone()).collect();
        let results = resolver.resolve_batch(&descriptors, categories).await;

        chunk
            .iter()
            .zip(results)
            .map(|(pending, result)| {
                let tax_code = tax.and_then(|(province, codes)| {
                    codes.resolve_tax_code(*province, &pending.descriptor.tax_rates)
                });
                ClassifiedTransaction {
                    transaction: pending.raw.clone(),
                    result,
                    tax_code,
                }
            })
            .collect()
    }

    /// Fetch everything needed to classify one company
    async fn read_books(&self, ctx: &CompanyContext, job: &CompanyBatchJob) -> Result<CompanyBooks> {
        let tokens = job
            .tokens
            .as_ref()
            .ok_or_else(|| Error::SessionFailure("no session for company".into()))?;
        let company_id = ctx.company_id.as_str();
        let timeout = ctx.call_timeout;

        let info = self
            .bounded(timeout, "company info", self.ledger.company_info(company_id, tokens))
            .await?;
        let categories = self
            .bounded(timeout, "categories", self.ledger.categories(company_id, tokens))
            .await?;

        // tax codes only apply in Canada; a failed fetch just skips them
        let province = Province::for_company(&info);
        let tax_codes: Vec<TaxCode> = match province {
            Some(_) => self
                .bounded(timeout, "tax codes", self.ledger.tax_codes(company_id, tokens))
                .await
                .unwrap_or_else(|e| {
                    warn!(company_id = %company_id, error = %e, "Failed to fetch tax codes");
                    Vec::new()
                }),
            None => Vec::new(),
        };

        let accounts = self
            .bounded(
                timeout,
                "transaction accounts",
                self.ledger.transaction_accounts(company_id, tokens),
            )
            .await?;

        let mut pending = Vec::new();
        for account in &accounts {
            let raws = self
                .bounded(
                    timeout,
                    "for review transactions",
                    self.ledger.for_review(company_id, tokens, &account.id),
                )
                .await?;

            let mut account_rates = account.tax_rates.clone();
            if let Some(code) = account
                .tax_code_id
                .as_deref()
                .and_then(|id| tax_codes.iter().find(|c| c.id == id))
            {
                account_rates.extend(code.rates.iter().cloned());
            }

            pending.extend(raws.into_iter().filter(|r| r.is_expense()).map(|raw| {
                let descriptor = raw.to_descriptor(&account.name, &account_rates);
                PendingTransaction { raw, descriptor }
            }));
        }

        info!(
            company_id = %company_id,
            categories = categories.len(),
            accounts = accounts.len(),
            pending = pending.len(),
            "Read company books"
        );

        Ok(CompanyBooks {
            info,
            categories,
            tax: province.map(|p| (p, TaxCodeResolver::new(tax_codes))),
            pending,
        })
    }

    async fn bounded<T>(
        &self,
        timeout: Duration,
        what: &str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "{} after {}s",
                what,
                timeout.as_secs()
            ))),
        }
    }
}
