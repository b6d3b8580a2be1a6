use crate::dataset::Dataset;
use crate::gateway::LlmGateway;
use crate::protocol;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Top-level Vega-Lite keys that may stand in for a `mark` on composed
/// charts.
const COMPOSITION_KEYS: &[&str] = &["layer", "hconcat", "vconcat", "concat", "facet", "repeat", "spec"];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DataBlock {
    #[serde(default)]
    pub values: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Typed Vega-Lite document. Known fields are named; everything else rides
/// in the flattened remainder so round-tripping preserves the model's spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartSpec {
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<DataBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mark: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChartSpec {
    /// Parse a model-produced spec string and validate its shape before the
    /// attempt is considered successful. The parse into the typed document
    /// doubles as normalization.
    pub fn parse(spec: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(spec).context("spec is not valid JSON")?;
        if !value.is_object() {
            bail!("spec must be a JSON object");
        }
        let spec: ChartSpec =
            serde_json::from_value(value).context("spec does not match the chart grammar")?;
        spec.validate()?;
        Ok(spec)
    }

    fn validate(&self) -> Result<()> {
        let has_composition = COMPOSITION_KEYS.iter().any(|k| self.extra.contains_key(*k));
        if self.mark.is_none() && !has_composition {
            bail!("spec has neither a mark nor a composition operator");
        }
        if let Some(mark) = &self.mark {
            if !mark.is_string() && !mark.is_object() {
                bail!("mark must be a string or an object");
            }
        }
        // The model is instructed to leave the data field empty; the full
        // dataset is injected at assembly time.
        if let Some(data) = &self.data {
            if !data.values.is_empty() {
                bail!("spec arrived with pre-filled data values");
            }
        }
        Ok(())
    }
}

/// Payload returned to the caller on the success path.
#[derive(Debug, Clone, Serialize)]
pub struct QueryPayload {
    pub chart: Value,
    pub response: String,
}

/// Merge the finalized spec with the full dataset and a short description.
/// This is the only point where the complete row set enters the response.
pub async fn assemble(
    gateway: &dyn LlmGateway,
    mut spec: ChartSpec,
    dataset: &Dataset,
) -> Result<QueryPayload> {
    // Describe the spec before data injection; the model never sees the
    // full row set, only the finalized encoding.
    let spec_json =
        serde_json::to_string(&spec).context("failed to serialize finalized spec")?;

    let mut data = spec.data.take().unwrap_or_default();
    data.values = dataset.values();
    spec.data = Some(data);
    let chart = serde_json::to_value(&spec).context("failed to serialize normalized spec")?;

    // Description is a diagnostic call: a provider failure becomes a
    // value-level message instead of failing the attempt.
    let response = match gateway.complete_text(&protocol::describe_prompt(&spec_json)).await {
        Ok(text) => text,
        Err(e) => format!("Error querying the model: {e:#}"),
    };

    Ok(QueryPayload { chart, response })
}
