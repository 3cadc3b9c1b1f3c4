//! Grounded prompt construction and the fixed reply texts.

use serde::{Deserialize, Serialize};

use kbchat_core::types::{GroundedMessage, IntentLabel, SearchHit};
use kbchat_hybrid::UsableHits;

pub const REFUSAL: &str = "I can only assist with Discovery-related queries.";

pub const TEMPORARY_ISSUE: &str = "I'm experiencing a temporary issue. Please try again in a moment.";

pub const NO_INFORMATION: &str = "I understand you're asking about Discovery services. Could you try asking about Vitality benefits, KeyCare plans, or medical scheme coverage?";

pub const CONTACT_DISCOVERY: &str = "For the most up-to-date information, please contact Discovery directly.";

const NOT_FOUND: &str = "While I can help with Discovery queries, I don't have specific information about that. I can tell you about Vitality benefits, KeyCare plans, or medical scheme coverage. What would you like to know?";

const BLOCK_SEPARATOR: &str = "\n\n---\n\n";

fn system_rules() -> String {
    format!(
        "You are DiscoBuddy, a Discovery-only assistant. You must follow these rules strictly:

1. ONLY answer questions about Discovery products, services, benefits, and processes
2. If asked about anything else, reply exactly: \"{REFUSAL}\"
3. Use ONLY the provided context to answer questions
4. If the exact information isn't in the context, but you can provide related helpful information, do so and then add: \"{CONTACT_DISCOVERY}\"
5. If no relevant information is found, say: \"{NOT_FOUND}\"
6. Be helpful, accurate, and professional
7. Cite the source documents when possible
8. Keep answers concise but complete
9. If unsure, err on the side of caution and refer to official Discovery channels

Remember: You are a Discovery assistant. Stay in scope but try to be helpful with related information when possible."
    )
}

fn context_blocks(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| format!("# Document {} ({})\n{}", i + 1, hit.filename, hit.content))
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}

fn grounding_instructions(hits: &[SearchHit], query: &str) -> String {
    format!(
        "IMPORTANT: You MUST answer using ONLY the following context. Do not use any external knowledge.

Context documents:
{}

User question: {query}

Instructions:
- Answer based ONLY on the context above
- If the answer isn't in the context, say you don't have enough information
- Cite the source document(s) you used
- Be specific and accurate",
        context_blocks(hits)
    )
}

/// The three messages sent to generation: rules, grounding context, user query.
///
/// Only [`GroundedPrompt::build`] creates one, and it needs [`UsableHits`], so
/// every prompt carries at least one passage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundedPrompt {
    rules: GroundedMessage,
    grounding: GroundedMessage,
    query: GroundedMessage,
}

impl GroundedPrompt {
    pub fn build(hits: &UsableHits, query: &str) -> Self {
        Self {
            rules: GroundedMessage::system(system_rules()),
            grounding: GroundedMessage::system(grounding_instructions(hits.as_slice(), query)),
            query: GroundedMessage::user(query),
        }
    }

    pub fn messages(&self) -> [GroundedMessage; 3] { [self.rules.clone(), self.grounding.clone(), self.query.clone()] }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    pub doc: String,
    pub score: f32,
}

/// One citation per hit, in hit order, scores rounded to two decimals.
pub fn format_citations(hits: &[SearchHit]) -> Vec<Citation> {
    hits.iter()
        .map(|h| Citation { doc: h.filename.clone(), score: (h.score * 100.0).round() / 100.0 })
        .collect()
}

/// Reply used when retrieval produced nothing to ground an answer on.
pub fn no_information(label: IntentLabel) -> &'static str {
    match label {
        IntentLabel::In => NO_INFORMATION,
        IntentLabel::Out | IntentLabel::Ambiguous => REFUSAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbchat_core::types::Role;

    fn hits() -> UsableHits {
        UsableHits::new(vec![
            SearchHit { content: "Vitality rewards healthy living.".into(), filename: "vitality.pdf".into(), score: 0.4567, path: None },
            SearchHit { content: "KeyCare uses a GP network.".into(), filename: "keycare.pdf".into(), score: 0.123, path: None },
        ])
        .unwrap()
    }

    #[test]
    fn prompt_has_fixed_order() {
        let messages = GroundedPrompt::build(&hits(), "How do I join Vitality?").messages();
        assert_eq!(messages.iter().map(|m| m.role).collect::<Vec<_>>(), vec![Role::System, Role::System, Role::User]);
        assert!(messages[0].content.starts_with("You are DiscoBuddy"));
        assert!(messages[0].content.contains(REFUSAL));
        assert!(messages[0].content.contains(CONTACT_DISCOVERY));
        assert_eq!(messages[2].content, "How do I join Vitality?");
    }

    #[test]
    fn context_blocks_are_numbered_and_separated() {
        let messages = GroundedPrompt::build(&hits(), "q").messages();
        let grounding = &messages[1].content;
        assert!(grounding.contains(
            "# Document 1 (vitality.pdf)\nVitality rewards healthy living.\n\n---\n\n# Document 2 (keycare.pdf)\nKeyCare uses a GP network."
        ));
        assert!(grounding.contains("User question: q"));
    }

    #[test]
    fn building_twice_is_deterministic() {
        assert_eq!(GroundedPrompt::build(&hits(), "q"), GroundedPrompt::build(&hits(), "q"));
    }

    #[test]
    fn citations_round_to_two_decimals() {
        let c = format_citations(hits().as_slice());
        assert_eq!(c[0], Citation { doc: "vitality.pdf".into(), score: 0.46 });
        assert_eq!(c[1], Citation { doc: "keycare.pdf".into(), score: 0.12 });
    }

    #[test]
    fn no_information_text_depends_on_label() {
        assert_eq!(no_information(IntentLabel::In), NO_INFORMATION);
        assert_eq!(no_information(IntentLabel::Ambiguous), REFUSAL);
    }
}
