//! Prompt templates for analyzing knowledge base documents with an LLM

use serde::Deserialize;

use crate::ai::{Message, OpenAIClient};
use crate::config::Config;
use crate::models::KnowledgeFile;

/// Extracted text beyond this many characters is cut before prompting
const MAX_PROMPT_CHARS: usize = 12_000;

const SYSTEM_PROMPT: &str = "You are a support knowledge analyst for a customer service team. \
Answer only from the document provided. If the document does not contain the information, say so.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AnalysisKind {
    #[default]
    Summary,
    KeyPoints,
    Faq,
}

impl AnalysisKind {
    fn instruction(self) -> &'static str {
        match self {
            AnalysisKind::Summary => "Write a concise summary (at most 5 sentences) of the document.",
            AnalysisKind::KeyPoints => "List the key points of the document as short bullet points.",
            AnalysisKind::Faq => {
                "Write 5 frequently asked customer questions this document answers, each followed by its answer."
            }
        }
    }
}

/// Cut `text` to `max` characters, marking the cut
pub fn truncate_chars(text: &str, max: usize) -> (String, bool) {
    match text.char_indices().nth(max) {
        Some((idx, _)) => (format!("{}\n[...truncated]", &text[..idx]), true),
        None => (text.to_string(), false),
    }
}

pub fn build_prompt(kind: AnalysisKind, filename: &str, content: &str) -> Vec<Message> {
    let (body, _) = truncate_chars(content, MAX_PROMPT_CHARS);
    vec![
        Message::system(SYSTEM_PROMPT),
        Message::user(format!(
            "{}\n\nDocument: {}\n---\n{}\n---",
            kind.instruction(),
            filename,
            body
        )),
    ]
}

pub struct KnowledgeAnalyzer {
    client: OpenAIClient,
}

impl KnowledgeAnalyzer {
    /// None when no LLM key is configured
    pub fn from_config(config: &Config) -> Result<Option<Self>, String> {
        let Some(key) = config.llm_api_key.as_deref() else {
            return Ok(None);
        };
        let client = OpenAIClient::new(key, &config.llm_endpoint, &config.llm_model)?;
        Ok(Some(Self { client }))
    }

    pub async fn analyze(&self, kind: AnalysisKind, file: &KnowledgeFile) -> Result<String, String> {
        let content = file.content.as_deref().unwrap_or_default();
        if content.trim().is_empty() {
            return Err("File has no extracted text to analyze".to_string());
        }
        log::info!("[KNOWLEDGE] Running {} analysis on file {}", kind.as_ref(), file.id);
        self.client.generate_text(&build_prompt(kind, &file.filename, content)).await
    }
}
