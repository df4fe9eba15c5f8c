//! Asks the model which header plays which role and validates the answer.

use serde_json::Value;

use crate::error::AppError;
use crate::models::{ColumnMapping, Role};
use crate::services::llm_agent::{extract_json_object, CompletionClient, CompletionRequest};

const MAPPING_MAX_TOKENS: u16 = 500;

pub async fn resolve(client: &dyn CompletionClient, headers: &[String]) -> Result<ColumnMapping, AppError> {
    let start = std::time::Instant::now();
    let request = CompletionRequest {
        system: system_prompt(),
        user: format!("Columns: {}", headers.join(", ")),
        max_tokens: MAPPING_MAX_TOKENS,
    };

    let reply = client.complete(request).await?;
    let mapping = parse_mapping(&reply)?;
    tracing::info!("Column mapping resolved in {:?}: {:?}", start.elapsed(), mapping);
    Ok(mapping)
}

fn system_prompt() -> String {
    let keys = Role::ALL
        .iter()
        .map(|role| format!("  \"{}\": \"col_name_or_null\"", role.as_str()))
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        r#"You are a data analyst. You receive the header row of an e-commerce sales file.
Decide which column holds each of the fields below. Use the column names exactly as given.
If no column fits a field, use null.

Return ONLY a JSON object with exactly these keys:
{{
{}
}}"#,
        keys
    )
}

/// Accepts a JSON object with exactly the seven role keys, each a string or null.
pub fn parse_mapping(reply: &str) -> Result<ColumnMapping, AppError> {
    let json_str = extract_json_object(reply)
        .ok_or_else(|| AppError::Service("Failed to parse AI mapping: no JSON object in reply".to_string()))?;

    let value: Value = serde_json::from_str(json_str)
        .map_err(|e| AppError::Service(format!("Failed to parse AI mapping: {}", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| AppError::Service("Failed to parse AI mapping: expected an object".to_string()))?;

    if let Some(unknown) = object
        .keys()
        .find(|key| !Role::ALL.iter().any(|role| role.as_str() == key.as_str()))
    {
        return Err(AppError::Service(format!(
            "Failed to parse AI mapping: unexpected key '{}'",
            unknown
        )));
    }

    let mut mapping = ColumnMapping::default();
    for role in Role::ALL {
        let column = match object.get(role.as_str()) {
            None => {
                return Err(AppError::Service(format!(
                    "Failed to parse AI mapping: missing key '{}'",
                    role.as_str()
                )))
            }
            Some(Value::Null) => None,
            Some(Value::String(name)) if name.is_empty() => None,
            Some(Value::String(name)) => Some(name.clone()),
            Some(other) => {
                return Err(AppError::Service(format!(
                    "Failed to parse AI mapping: '{}' must be a string or null, got {}",
                    role.as_str(),
                    other
                )))
            }
        };
        mapping.set(role, column);
    }

    Ok(mapping)
}
