//! Prompt construction and the structured-output schema shared by the
//! relevance filter, the chart pipeline, and the response assembler.

use serde_json::{json, Value};

/// Width cap requested from the model for generated charts.
pub const MAX_CHART_WIDTH: u32 = 400;

/// Single-field schema the structured completions are constrained to:
/// the model must return `{"spec": "<vega-lite JSON>"}`.
pub fn spec_json_schema() -> Value {
    json!({
        "name": "chart_spec",
        "schema": {
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "spec": { "type": "string" }
            },
            "required": ["spec"]
        },
        "strict": true
    })
}

/// `response_format` body for schema-constrained chat completions.
pub fn spec_response_format() -> Value {
    json!({
        "type": "json_schema",
        "json_schema": spec_json_schema()
    })
}

pub fn relevance_prompt(query: &str, columns: &[String]) -> String {
    format!(
        "Is the following prompt relevant and answerable based on data with these columns {:?}? \
         Any question that mentions the columns is answerable.\n\n\
         Respond with just 'yes' or 'no'.\n\n\
         Here is the prompt: {}",
        columns, query
    )
}

pub fn generate_prompt(query: &str, sample_table: &str) -> String {
    format!(
        "Dataset overview (top five rows):\n{sample_table}\n\n\
         Given the dataset above, generate a vega-lite specification for the user query, \
         limit width to {MAX_CHART_WIDTH}. The data field will be inserted dynamically, \
         so leave it empty: {query}."
    )
}

pub fn critique_prompt(query: &str, sample_table: &str, spec: &str) -> String {
    format!(
        "Dataset overview (top five rows):\n{sample_table}\n\n\
         User query: {query}.\n\n\
         Generated Vega-lite spec: {spec}\n\n\
         Please provide feedback on the generated chart whether the spec is valid \
         in syntax and faithful to the user query."
    )
}

pub fn revise_prompt(query: &str, sample_table: &str, spec: &str, feedback: &str) -> String {
    format!(
        "Dataset overview (top five rows):\n{sample_table}\n\n\
         User query: {query}.\n\n\
         Generated Vega-lite spec: {spec}\n\n\
         Feedback: {feedback}\n\n\
         Improve the vega-lite spec with the feedback if only necessary. \
         Otherwise, return the original spec."
    )
}

pub fn describe_prompt(spec_json: &str) -> String {
    format!("Provide a short, 2 sentence description of the following vega chart:\n\n{spec_json}")
}
