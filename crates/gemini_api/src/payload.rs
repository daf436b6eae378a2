use serde::{Deserialize, Serialize};

use crate::wire::WireContent;

/// Request body shared by `generateContent` and `streamGenerateContent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

impl GenerateContentRequest {
    pub fn new(contents: Vec<WireContent>, system_instruction: Option<String>) -> Self {
        Self {
            contents,
            system_instruction: system_instruction
                .filter(|instruction| !instruction.trim().is_empty())
                .map(|instruction| WireContent::new(None, instruction)),
            generation_config: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}
