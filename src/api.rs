//! Remote analysis client for the chat-completions endpoint.
//!
//! Builds a single multimodal user message (before images, after images,
//! instructions) with a strict JSON-schema response constraint, posts it
//! once, and decodes the structured result. No retries: a failed cycle's
//! analysis is simply dropped.

use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::activity_log::ActivityRecord;
use crate::error::{TrackerError, TrackerResult};

/// Model used for screenshot analysis.
pub const ANALYSIS_MODEL: &str = "gpt-4o-mini";
/// Token cap for one analysis completion.
pub const ANALYSIS_MAX_TOKENS: u32 = 300;
/// Default API endpoint; overridable for local mocks.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const SCHEMA_NAME: &str = "screenshot_analysis_schema";

const ANALYSIS_INSTRUCTIONS: &str = "You are an assistant that analyzes pairs of screenshots to determine what I am doing.\n\
Compare the current screenshots to the last screenshots to identify any changes.\n\
For any screen where there is a change, analyze the current screenshot to determine\n\
what I am doing on that screen. Ignore any screens where there is no change.\n\
Output the result in JSON format with keys: timestamp, client, tool, activity.";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrlDetail },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrlDetail {
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: String,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
    pub json_schema: JsonSchemaFormat,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonSchemaFormat {
    pub name: String,
    pub schema: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub response_format: ResponseFormat,
}

fn image_part(bytes: &[u8]) -> ContentPart {
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    ContentPart::ImageUrl {
        image_url: ImageUrlDetail {
            url: format!("data:image/png;base64,{}", encoded),
        },
    }
}

/// The response schema: exactly the four record fields, all strings, all
/// required, nothing extra.
fn analysis_response_format() -> ResponseFormat {
    ResponseFormat {
        format_type: "json_schema".to_string(),
        json_schema: JsonSchemaFormat {
            name: SCHEMA_NAME.to_string(),
            schema: json!({
                "type": "object",
                "properties": {
                    "timestamp": {"type": "string", "description": "Timelog in ISO Format yyyy-MM-ddTHH:mm:ss"},
                    "client": {"type": "string", "description": "Client you're working for"},
                    "tool": {"type": "string", "description": "Tool like Microsoft Teams, Google Chrome."},
                    "activity": {"type": "string", "description": "Describe what user is doing. If nothing has changed write 'Previous Client'"}
                },
                "required": ["timestamp", "client", "tool", "activity"],
                "additionalProperties": false
            }),
        },
    }
}

/// Assemble the single-user-message request. Part order is fixed: lead-in
/// text, before images, current-capture text with the timestamp, after
/// images, instruction block.
pub(crate) fn build_analysis_request(
    before: &[Vec<u8>],
    after: &[Vec<u8>],
    timestamp: &str,
) -> ChatCompletionRequest {
    let mut content = vec![ContentPart::Text {
        text: "I have these screenshots from the last capture.".to_string(),
    }];
    content.extend(before.iter().map(|bytes| image_part(bytes)));
    content.push(ContentPart::Text {
        text: format!(
            "I have these screenshots from the current capture at {}.",
            timestamp
        ),
    });
    content.extend(after.iter().map(|bytes| image_part(bytes)));
    content.push(ContentPart::Text {
        text: ANALYSIS_INSTRUCTIONS.to_string(),
    });

    ChatCompletionRequest {
        model: ANALYSIS_MODEL.to_string(),
        messages: vec![Message {
            role: "user".to_string(),
            content,
        }],
        max_tokens: ANALYSIS_MAX_TOKENS,
        response_format: analysis_response_format(),
    }
}

/// Extract the record from a chat-completions response body. Any missing
/// piece of the `choices[0].message.content` path, or content that is not
/// the expected JSON object, means no data.
pub(crate) fn parse_response_body(body: &Value) -> Option<ActivityRecord> {
    let content = body["choices"][0]["message"]["content"].as_str()?;
    match serde_json::from_str::<ActivityRecord>(content) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("Analysis content is not a valid record: {}", e);
            None
        }
    }
}

pub struct AnalysisClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnalysisClient {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    /// Send one analysis request for the changed displays of a cycle.
    ///
    /// `Ok(Some(_))` is a decoded record. Transport failures and unusable
    /// responses (bad status, missing or malformed content) all come back
    /// as `Ok(None)`; callers branch on presence. The only error is an
    /// unconfigured key, raised before any I/O.
    pub async fn analyze(
        &self,
        before: &[Vec<u8>],
        after: &[Vec<u8>],
        timestamp: &str,
    ) -> TrackerResult<Option<ActivityRecord>> {
        if self.api_key.is_empty() {
            return Err(TrackerError::MissingApiKey);
        }

        let request = build_analysis_request(before, after, timestamp);
        let url = format!("{}/chat/completions", self.base_url);
        debug!(
            "Analyzing {} changed display(s) via {}",
            after.len(),
            self.base_url
        );

        let response = match self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Analysis request failed: {}", e);
                return Ok(None);
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            warn!("Analysis API returned {}: {}", status, error_text);
            return Ok(None);
        }

        let body = match response.json::<Value>().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Analysis response was not valid JSON: {}", e);
                return Ok(None);
            }
        };
        Ok(parse_response_body(&body))
    }
}
