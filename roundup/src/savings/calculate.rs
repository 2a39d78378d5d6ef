//! End-to-end orchestrator behind `POST /calculate`.
//!
//! ```text
//!   1. Parse        expenses → transactions
//!   2. Validate     drop negatives, over-limit amounts, duplicate dates
//!   3. Filter       apply q/p rules, drop unparseable dates
//!   4. NpsReturns ─┬─ computed concurrently over the filtered set
//!      IndexReturns┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use roundup_shared::{RoundupError, RoundupResult};
use tokio::sync::Mutex;

use super::financial::Instrument;
use super::returns::{Investor, compute_returns};
use super::schema::{
    CalculateRequest, CalculateResponse, InvalidTransaction, PipelineStepSummary, ReturnsResponse,
    Transaction,
};
use super::transactions::{apply_rules, parse_expenses, validate_transactions};
use crate::pipeline::{BoxedTask, ExecutionPlan, PipelineExecutor, PipelineTask, Stage};

/// Shared state threaded through the calculate pipeline.
pub struct CalculateContext {
    request: CalculateRequest,
    parsed: Option<Vec<Transaction>>,
    validated: Option<Vec<Transaction>>,
    filtered: Option<Arc<Vec<Transaction>>>,
    rejected: Vec<InvalidTransaction>,
    summary: PipelineStepSummary,
    nps: Option<ReturnsResponse>,
    index_fund: Option<ReturnsResponse>,
}

impl CalculateContext {
    fn new(request: CalculateRequest) -> Self {
        Self {
            request,
            parsed: None,
            validated: None,
            filtered: None,
            rejected: Vec::new(),
            summary: PipelineStepSummary::default(),
            nps: None,
            index_fund: None,
        }
    }

    fn investor(&self) -> Investor {
        Investor {
            age: self.request.age,
            wage: self.request.wage,
            inflation: self.request.inflation,
        }
    }
}

pub type CalculateCtx = Arc<Mutex<CalculateContext>>;

fn missing(step: &str) -> RoundupError {
    RoundupError::Internal(format!("{step} step must run first"))
}

/// Run a CPU-bound step on the blocking pool so the reactor keeps serving
/// other connections.
async fn offload<T, F>(step: &'static str, work: F) -> RoundupResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| RoundupError::Internal(format!("{step} step panicked: {e}")))
}

struct ParseTask;

#[async_trait]
impl PipelineTask<CalculateCtx> for ParseTask {
    async fn run(self: Box<Self>, ctx: CalculateCtx) -> RoundupResult<()> {
        let expenses = std::mem::take(&mut ctx.lock().await.request.expenses);
        let parsed = offload("parse", move || parse_expenses(&expenses)).await?;

        let mut ctx = ctx.lock().await;
        ctx.summary.parsed = parsed.len();
        ctx.parsed = Some(parsed);
        Ok(())
    }

    fn name(&self) -> &str {
        "parse"
    }
}

struct ValidateTask;

#[async_trait]
impl PipelineTask<CalculateCtx> for ValidateTask {
    async fn run(self: Box<Self>, ctx: CalculateCtx) -> RoundupResult<()> {
        let parsed = ctx.lock().await.parsed.take().ok_or_else(|| missing("parse"))?;
        let outcome = offload("validate", move || validate_transactions(parsed)).await?;

        let mut ctx = ctx.lock().await;
        ctx.summary.valid = outcome.valid.len();
        ctx.rejected.extend(outcome.invalid);
        ctx.validated = Some(outcome.valid);
        Ok(())
    }

    fn name(&self) -> &str {
        "validate"
    }
}

struct FilterTask;

#[async_trait]
impl PipelineTask<CalculateCtx> for FilterTask {
    async fn run(self: Box<Self>, ctx: CalculateCtx) -> RoundupResult<()> {
        let (validated, q, p) = {
            let mut ctx = ctx.lock().await;
            let validated = ctx.validated.take().ok_or_else(|| missing("validate"))?;
            (validated, ctx.request.q.clone(), ctx.request.p.clone())
        };
        let outcome = offload("filter", move || apply_rules(&validated, &q, &p)).await?;

        let mut ctx = ctx.lock().await;
        ctx.summary.filtered = outcome.valid.len();
        ctx.rejected.extend(outcome.invalid);
        ctx.summary.rejected = ctx.rejected.len();
        ctx.filtered = Some(Arc::new(outcome.valid));
        Ok(())
    }

    fn name(&self) -> &str {
        "filter"
    }
}

/// Computes returns for one instrument on the blocking pool. The lock is
/// held only to copy inputs and to store the result, so both instruments
/// overlap.
struct ReturnsTask(Instrument);

#[async_trait]
impl PipelineTask<CalculateCtx> for ReturnsTask {
    async fn run(self: Box<Self>, ctx: CalculateCtx) -> RoundupResult<()> {
        let instrument = self.0;
        let (filtered, k, investor) = {
            let ctx = ctx.lock().await;
            let filtered = ctx.filtered.clone().ok_or_else(|| missing("filter"))?;
            (filtered, ctx.request.k.clone(), ctx.investor())
        };

        let response = offload(instrument.as_str(), move || {
            compute_returns(&filtered, &k, investor, instrument)
        })
        .await?;

        let mut ctx = ctx.lock().await;
        match instrument {
            Instrument::Nps => ctx.nps = Some(response),
            Instrument::IndexFund => ctx.index_fund = Some(response),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        match self.0 {
            Instrument::Nps => "returns_nps",
            Instrument::IndexFund => "returns_index",
        }
    }
}

fn execution_plan() -> ExecutionPlan<CalculateCtx> {
    let stages: Vec<Stage<BoxedTask<CalculateCtx>>> = vec![
        Stage::sequential(vec![Box::new(ParseTask)]),
        Stage::sequential(vec![Box::new(ValidateTask)]),
        Stage::sequential(vec![Box::new(FilterTask)]),
        Stage::parallel(vec![
            Box::new(ReturnsTask(Instrument::Nps)),
            Box::new(ReturnsTask(Instrument::IndexFund)),
        ]),
    ];
    ExecutionPlan::new(stages)
}

/// Run the full parse → validate → filter → returns pipeline.
pub async fn calculate(request: CalculateRequest) -> RoundupResult<CalculateResponse> {
    let ctx: CalculateCtx = Arc::new(Mutex::new(CalculateContext::new(request)));

    let metrics = PipelineExecutor::execute("calculate", execution_plan(), Arc::clone(&ctx)).await?;
    metrics.log_tasks();

    let mut ctx = ctx.lock().await;
    let nps = ctx.nps.take().ok_or_else(|| missing("returns_nps"))?;
    let index_fund = ctx.index_fund.take().ok_or_else(|| missing("returns_index"))?;

    Ok(CalculateResponse {
        summary: ctx.summary.clone(),
        rejected_transactions: std::mem::take(&mut ctx.rejected),
        nps,
        index_fund,
    })
}
