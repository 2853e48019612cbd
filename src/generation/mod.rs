//! Answer generator
//!
//! Builds the grounding prompt from the filtered evidence and invokes the
//! generator capability exactly once per call.

use crate::llm::Generator;
use crate::models::Passage;
use crate::state::ConversationState;
use crate::Result;
use std::sync::Arc;
use tracing::info;

/// Join passage texts, in order, separated by a blank line
pub fn format_context(documents: &[Passage]) -> String {
    documents
        .iter()
        .map(|p| p.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        r#"You are an assistant for question-answering tasks.

Here is the context to use to answer the question:

{context}

Think carefully about the above context.

Now, review the user question:

{question}

Provide an answer to this question using only the above context.
Use three sentences maximum and keep the answer concise.

Answer:"#
    )
}

pub struct AnswerGenerator {
    generator: Arc<dyn Generator>,
}

impl AnswerGenerator {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Generate an answer and record it on the session state
    pub async fn generate(&self, state: &mut ConversationState) -> Result<()> {
        let context = format_context(state.documents());
        let prompt = build_prompt(state.question(), &context);

        let answer = self.generator.complete(&prompt).await?;
        state.record_generation(answer)?;

        info!(
            loop_step = state.loop_step(),
            evidence = state.documents().len(),
            "Answer generated"
        );

        Ok(())
    }
}
