use crate::assemble::{self, ChartSpec, QueryPayload};
use crate::dataset::Dataset;
use crate::gateway::LlmGateway;
use crate::protocol;
use anyhow::Result;

/// Upper bound on generate→critique→revise cycles per query.
pub const MAX_ATTEMPTS: usize = 2;

/// Terminal reply once every attempt has been exhausted.
pub const FAILURE_MESSAGE: &str =
    "Error: graph failed to load after two attempts, please try again.";

/// Control states of one attempt. Each variant carries what the cycle has
/// produced so far, so failure handling is a visible transition rather than
/// a catch block.
#[derive(Debug)]
pub enum PipelineState {
    Generating,
    Critiquing { spec: String },
    Revising { spec: String, feedback: String },
    Finalizing { revised: String },
    Succeeded(QueryPayload),
    Failed(anyhow::Error),
}

pub enum PipelineOutcome {
    Chart(QueryPayload),
    Failed(String),
}

pub struct ChartPipeline<'a> {
    gateway: &'a dyn LlmGateway,
    dataset: &'a Dataset,
    query: &'a str,
    sample_table: String,
}

impl<'a> ChartPipeline<'a> {
    pub fn new(gateway: &'a dyn LlmGateway, dataset: &'a Dataset, query: &'a str) -> Self {
        Self {
            gateway,
            dataset,
            query,
            sample_table: dataset.sample_table(),
        }
    }

    /// Advance the state machine by one transition. Gateway errors, parse
    /// failures, and validation rejections all land in `Failed`; the retry
    /// loop does not distinguish them by kind.
    pub async fn step(&self, state: PipelineState) -> PipelineState {
        match state {
            PipelineState::Generating => {
                let prompt = protocol::generate_prompt(self.query, &self.sample_table);
                match self.gateway.complete_structured(&prompt).await {
                    Ok(spec) => PipelineState::Critiquing { spec },
                    Err(e) => PipelineState::Failed(e.context("chart generation failed")),
                }
            }
            PipelineState::Critiquing { spec } => {
                let prompt = protocol::critique_prompt(self.query, &self.sample_table, &spec);
                match self.gateway.complete_text(&prompt).await {
                    Ok(feedback) => PipelineState::Revising { spec, feedback },
                    Err(e) => PipelineState::Failed(e.context("critique failed")),
                }
            }
            PipelineState::Revising { spec, feedback } => {
                let prompt =
                    protocol::revise_prompt(self.query, &self.sample_table, &spec, &feedback);
                match self.gateway.complete_structured(&prompt).await {
                    Ok(revised) => PipelineState::Finalizing { revised },
                    Err(e) => PipelineState::Failed(e.context("revision failed")),
                }
            }
            PipelineState::Finalizing { revised } => match self.finalize(&revised).await {
                Ok(payload) => PipelineState::Succeeded(payload),
                Err(e) => PipelineState::Failed(e.context("finalization failed")),
            },
            done @ (PipelineState::Succeeded(_) | PipelineState::Failed(_)) => done,
        }
    }

    async fn finalize(&self, revised: &str) -> Result<QueryPayload> {
        let spec = ChartSpec::parse(revised)?;
        assemble::assemble(self.gateway, spec, self.dataset).await
    }

    /// Run up to [`MAX_ATTEMPTS`] full cycles. A failed attempt logs its
    /// diagnostic and re-enters `Generating`; exhausting the bound yields
    /// the terminal failure message.
    #[tracing::instrument(skip_all, fields(query = %self.query))]
    pub async fn run(&self) -> PipelineOutcome {
        for attempt in 1..=MAX_ATTEMPTS {
            let mut state = PipelineState::Generating;
            loop {
                state = self.step(state).await;
                match state {
                    PipelineState::Succeeded(payload) => {
                        tracing::debug!(attempt, "chart attempt succeeded");
                        return PipelineOutcome::Chart(payload);
                    }
                    PipelineState::Failed(ref e) => {
                        tracing::warn!(attempt, error = %format!("{e:#}"), "chart attempt failed");
                        break;
                    }
                    _ => {}
                }
            }
        }
        PipelineOutcome::Failed(FAILURE_MESSAGE.to_string())
    }
}
