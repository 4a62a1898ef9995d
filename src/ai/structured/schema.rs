//! Output schemas a session can ask the model for and the typed
//! results they parse into.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::ai::recipe::models::{PartialRecipe, RecipeResponse, recipe_json_schema};

const RECIPE_TAG: &str = "RecipeResponse";
const CONVERSATIONAL_TAG: &str = "ConversationalResponse";

#[derive(Debug, thiserror::Error)]
pub enum StructuredError {
    #[error("Model output does not match the {schema:?} schema: {source}")]
    InvalidOutput {
        schema: OutputSchema,
        #[source]
        source: serde_json::Error,
    },
}

/// Respond in a conversational manner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationalResponse {
    pub response: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct PartialConversational {
    response: Option<String>,
}

/// The envelope the model fills in when it can choose between
/// answering conversationally or returning a recipe. Serialized as
/// `{"type": "RecipeResponse", "response": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "response")]
pub enum StructuredResponse {
    #[serde(rename = "RecipeResponse")]
    Recipe(RecipeResponse),
    #[serde(rename = "ConversationalResponse")]
    Conversational(ConversationalResponse),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartialEnvelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    response: Option<Value>,
}

/// A fully parsed model response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StructuredOutput {
    Conversational(ConversationalResponse),
    Envelope(StructuredResponse),
}

impl StructuredOutput {
    pub fn to_value(&self) -> Value {
        // Every variant is plain strings and lists so this can't fail
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Returns the recipe when this is a recipe response.
    pub fn recipe(&self) -> Option<&RecipeResponse> {
        match self {
            StructuredOutput::Envelope(StructuredResponse::Recipe(recipe)) => Some(recipe),
            _ => None,
        }
    }
}

/// Which result shape a session expects from the model. Fixed for the
/// lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSchema {
    /// `{"response": "..."}`
    Conversational,
    /// The [`StructuredResponse`] envelope
    Recipe,
}

fn partial_of<T: DeserializeOwned + Default + Serialize>(value: Option<Value>) -> Option<Value> {
    let partial: T = match value {
        Some(v) => serde_json::from_value(v).ok()?,
        None => T::default(),
    };
    serde_json::to_value(partial).ok()
}

impl OutputSchema {
    /// The `response_format` to send with a chat completion request.
    pub fn response_format(&self) -> Value {
        match self {
            OutputSchema::Conversational => json!({
                "type": "json_schema",
                "json_schema": {
                    "name": CONVERSATIONAL_TAG,
                    "strict": true,
                    "schema": conversational_json_schema(),
                }
            }),
            OutputSchema::Recipe => json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "StructuredResponse",
                    "strict": true,
                    "schema": {
                        "type": "object",
                        "properties": {
                            "type": {
                                "type": "string",
                                "enum": [RECIPE_TAG, CONVERSATIONAL_TAG],
                                "description": "The type of 'response' -- either 'RecipeResponse' or 'ConversationalResponse'."
                            },
                            "response": {
                                "anyOf": [
                                    {"$ref": "#/$defs/RecipeResponse"},
                                    {"$ref": "#/$defs/ConversationalResponse"}
                                ]
                            }
                        },
                        "required": ["type", "response"],
                        "additionalProperties": false,
                        "$defs": {
                            "RecipeResponse": recipe_json_schema(),
                            "ConversationalResponse": conversational_json_schema(),
                        }
                    }
                }
            }),
        }
    }

    /// Parses the complete text of a response. Fails on anything that
    /// doesn't match the schema, including an unknown `type` tag.
    pub fn parse(&self, text: &str) -> Result<StructuredOutput, StructuredError> {
        let invalid = |source| StructuredError::InvalidOutput {
            schema: *self,
            source,
        };
        match self {
            OutputSchema::Conversational => serde_json::from_str(text)
                .map(StructuredOutput::Conversational)
                .map_err(invalid),
            OutputSchema::Recipe => serde_json::from_str(text)
                .map(StructuredOutput::Envelope)
                .map_err(invalid),
        }
    }

    /// Best-effort snapshot of a response that is still being
    /// generated. Fields that haven't arrived yet are `null` (or empty
    /// lists). Returns `None` when the text can't be parsed yet.
    pub fn parse_partial(&self, text: &str) -> Option<Value> {
        let completed = super::partial::complete_json(text)?;
        let value: Value = serde_json::from_str(&completed).ok()?;
        if !value.is_object() {
            return None;
        }

        match self {
            OutputSchema::Conversational => partial_of::<PartialConversational>(Some(value)),
            OutputSchema::Recipe => {
                let envelope: PartialEnvelope = serde_json::from_value(value).ok()?;
                let response = match envelope.kind.as_deref() {
                    Some(RECIPE_TAG) => partial_of::<PartialRecipe>(envelope.response)?,
                    Some(CONVERSATIONAL_TAG) => {
                        partial_of::<PartialConversational>(envelope.response)?
                    }
                    Some(_) => return None,
                    None => Value::Null,
                };
                Some(json!({"type": envelope.kind, "response": response}))
            }
        }
    }
}

fn conversational_json_schema() -> Value {
    json!({
        "type": "object",
        "description": "Respond in a conversational manner.",
        "properties": {
            "response": {
                "type": "string",
                "description": "A conversational response to the user's query."
            }
        },
        "required": ["response"],
        "additionalProperties": false
    })
}
