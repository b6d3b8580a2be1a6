use crate::gateway::LlmGateway;
use crate::protocol;
use anyhow::Result;

/// Fixed reply for queries arriving before any dataset upload. Returned
/// without invoking the gateway.
pub const NO_DATASET_MESSAGE: &str = "No dataset uploaded yet.";

/// Ask the model whether the query is relevant and answerable given the
/// dataset's column names. Only a response containing "yes" (any case)
/// counts as relevant; a gateway error propagates so callers can tell a
/// provider failure apart from a negative judgment.
pub async fn check(gateway: &dyn LlmGateway, query: &str, columns: &[String]) -> Result<bool> {
    let prompt = protocol::relevance_prompt(query, columns);
    let answer = gateway.complete_text(&prompt).await?;
    Ok(answer.to_lowercase().contains("yes"))
}

pub fn not_relevant_message(query: &str) -> String {
    format!("The question \"{query}\" is not relevant to the dataset.")
}
