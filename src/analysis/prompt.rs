//! Prompt construction
//!
//! The system message teaches the flag taxonomy and the JSON shape for the
//! active schema version. The user message embeds the text and context
//! verbatim: nothing is truncated or escaped.

use super::SchemaVersion;
use crate::llm::{ChatMessage, CompletionRequest, SamplingParams};
use crate::models::AnalysisRequest;
use std::fmt::Write;

/// Flag labels with the guidance given to the model
const FLAG_GUIDE: [(&str, &str); 10] = [
    (
        "gaslighting",
        "denying or rewriting the other person's reality (\"that never happened\", \"you're imagining things\")",
    ),
    (
        "guilt_tripping",
        "using guilt as leverage (\"after everything I've done for you\")",
    ),
    (
        "blame_shifting",
        "pushing responsibility onto the other person (\"you made me do this\")",
    ),
    (
        "invalidation",
        "dismissing or minimising feelings (\"you're overreacting\", \"it's not a big deal\")",
    ),
    (
        "stonewalling",
        "shutting the conversation down, one-word replies, refusing to engage",
    ),
    (
        "passive_aggression",
        "indirect hostility, sarcasm, backhanded remarks (\"fine, whatever\")",
    ),
    (
        "controlling_behavior",
        "dictating choices, monitoring, or restricting the other person",
    ),
    (
        "non_apology",
        "apologies that deflect (\"I'm sorry you feel that way\")",
    ),
    (
        "defensiveness",
        "counter-attacking or excusing instead of listening",
    ),
    (
        "emotional_manipulation",
        "exploiting emotions to steer behaviour (threats, love withdrawal)",
    ),
];

const STANDARD_SCHEMA: &str = r#"{
  "flags": [
    {"type": "invalidation", "severity": 0.6, "evidence": "exact quote", "description": "why it matters"}
  ],
  "sentiment": "positive | neutral | negative",
  "interpretation": "what the message is really communicating",
  "suggestions": ["a healthier way to respond"],
  "triggers": ["words or topics likely to escalate"]
}"#;

const ENHANCED_SCHEMA: &str = r#"{
  "flags": [
    {"type": "invalidation", "severity": 0.6, "evidence": "exact quote", "description": "why it matters", "participant": "them | you"}
  ],
  "sentiment": "positive | neutral | negative",
  "interpretation": "what the message is really communicating",
  "suggestions": ["a healthier way to respond"],
  "triggers": ["words or topics likely to escalate"],
  "emotional_tone": "short description, e.g. frustrated, warm, dismissive",
  "communication_style": "e.g. assertive, passive, aggressive, passive-aggressive",
  "confidence_score": 0.85,
  "emotional_maturity_level": "low | moderate | high",
  "relationship_insights": "what this exchange suggests about the relationship"
}"#;

/// Builds chat messages for one analysis
#[derive(Debug, Clone, Copy)]
pub struct PromptBuilder {
    schema: SchemaVersion,
}

impl PromptBuilder {
    pub fn new(schema: SchemaVersion) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> SchemaVersion {
        self.schema
    }

    pub fn system_prompt(&self) -> String {
        let mut prompt = String::from(
            "You are My ÆI, an emotional intelligence assistant that reads messages \
             and identifies unhealthy communication patterns.\n\n\
             Look for the following patterns and use exactly these labels:\n",
        );

        for (i, (label, guidance)) in FLAG_GUIDE.iter().enumerate() {
            // Writing to a String cannot fail
            let _ = writeln!(prompt, "{}. {} - {}", i + 1, label, guidance);
        }

        prompt.push_str(
            "\nFor every pattern you detect, give its type, a severity between 0.0 \
             (mild) and 1.0 (severe), and the exact text that shows it. If the input \
             is a conversation, say which participant the flag belongs to.\n\n\
             Respond with a single JSON object of this shape:\n",
        );
        prompt.push_str(match self.schema {
            SchemaVersion::Standard => STANDARD_SCHEMA,
            SchemaVersion::Enhanced => ENHANCED_SCHEMA,
        });
        prompt.push_str(
            "\n\nUse an empty array for \"flags\" when nothing is detected. \
             Return only the JSON object, with no prose before or after it.",
        );

        prompt
    }

    /// `Message to analyze: {text}` plus `\n\nContext: {context}` when present
    pub fn user_prompt(text: &str, context: Option<&str>) -> String {
        match context {
            Some(context) => format!("Message to analyze: {}\n\nContext: {}", text, context),
            None => format!("Message to analyze: {}", text),
        }
    }

    pub fn build(&self, request: &AnalysisRequest, sampling: &SamplingParams) -> CompletionRequest {
        CompletionRequest {
            messages: vec![
                ChatMessage::system(self.system_prompt()),
                ChatMessage::user(Self::user_prompt(&request.text, request.context())),
            ],
            sampling: sampling.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::llm::Role;
    use crate::models::FlagType;

    #[test]
    fn test_system_prompt_lists_every_known_flag() {
        let prompt = PromptBuilder::new(SchemaVersion::Enhanced).system_prompt();
        for flag in FlagType::KNOWN.iter() {
            assert!(
                prompt.contains(flag.as_str()),
                "system prompt should mention {}",
                flag
            );
        }
    }

    #[test]
    fn test_flag_guide_matches_taxonomy() {
        let labels: Vec<&str> = FLAG_GUIDE.iter().map(|(label, _)| *label).collect();
        let known: Vec<&str> = FlagType::KNOWN.iter().map(|f| f.as_str()).collect();
        assert_eq!(labels, known);
    }

    #[test]
    fn test_system_prompt_schema_follows_version() {
        let standard = PromptBuilder::new(SchemaVersion::Standard).system_prompt();
        let enhanced = PromptBuilder::new(SchemaVersion::Enhanced).system_prompt();

        assert!(!standard.contains("emotional_tone"));
        for field in SchemaVersion::Enhanced.required_fields() {
            assert!(enhanced.contains(field), "enhanced prompt missing {}", field);
        }
        for field in SchemaVersion::Standard.required_fields() {
            assert!(standard.contains(field), "standard prompt missing {}", field);
        }
    }

    #[test]
    fn test_user_prompt_without_context() {
        assert_eq!(
            PromptBuilder::user_prompt("You never listen", None),
            "Message to analyze: You never listen"
        );
    }

    #[test]
    fn test_user_prompt_with_context() {
        assert_eq!(
            PromptBuilder::user_prompt("Fine, whatever", Some("text from my partner")),
            "Message to analyze: Fine, whatever\n\nContext: text from my partner"
        );
    }

    #[test]
    fn test_user_prompt_embeds_text_verbatim() {
        let text = "He said \"{not json}\"\n```\nand then left";
        let prompt = PromptBuilder::user_prompt(text, None);
        assert!(prompt.ends_with(text));
    }

    #[test]
    fn test_build_skips_blank_context() {
        let request = AnalysisRequest::new("hello").with_context("  ");
        let sampling = SamplingParams::from_config(&LlmConfig::default());
        let completion = PromptBuilder::new(SchemaVersion::Standard).build(&request, &sampling);

        assert_eq!(completion.messages.len(), 2);
        assert_eq!(completion.messages[0].role, Role::System);
        assert_eq!(completion.messages[1].content, "Message to analyze: hello");
        assert_eq!(completion.sampling, sampling);
    }
}
