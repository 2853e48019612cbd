//! Document relevance filter
//!
//! Grades every retrieved passage independently against the question and
//! keeps the relevant ones in their original order. Grading runs with a
//! bounded number of in-flight classifier calls; any classifier failure
//! aborts the whole filter.

use crate::llm::Classifier;
use crate::models::Passage;
use crate::state::ConversationState;
use crate::Result;
use futures::future::FutureExt;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, info};

pub(crate) const RELEVANCE_INSTRUCTIONS: &str = "You are a grader assessing the relevance of a \
retrieved document to a user question. If the document contains keywords or semantic meaning \
related to the question, grade it as relevant.";

fn relevance_prompt(document: &str, question: &str) -> String {
    format!(
        "Here is the retrieved document:\n\n{}\n\nHere is the user question:\n\n{}\n\n\
Carefully and objectively assess whether the document contains at least some information \
that is relevant to the question. Return JSON with a single key, binary_score, whose value \
is 'yes' or 'no' to indicate whether the document contains at least some information that \
is relevant to the question.",
        document, question
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterReport {
    pub graded: usize,
    pub retained: usize,
}

pub struct RelevanceFilter {
    classifier: Arc<dyn Classifier>,
    concurrency: usize,
}

impl RelevanceFilter {
    pub fn new(classifier: Arc<dyn Classifier>, concurrency: usize) -> Self {
        Self {
            classifier,
            concurrency: concurrency.max(1),
        }
    }

    /// One verdict per passage, index-aligned with `documents`
    pub async fn grade(&self, question: &str, documents: &[Passage]) -> Result<Vec<bool>> {
        let mut graded: Vec<(usize, bool)> = stream::iter(documents.iter().enumerate())
            .map(|(index, passage)| {
                let prompt = relevance_prompt(&passage.content, question);
                async move {
                    let grade = self
                        .classifier
                        .complete_structured(RELEVANCE_INSTRUCTIONS, &prompt)
                        .await?;

                    debug!(
                        passage_id = %passage.id,
                        relevant = grade.is_yes(),
                        "Graded passage"
                    );
                    Ok::<_, crate::error::OrchestrationError>((index, grade.is_yes()))
                }
            })
            .buffer_unordered(self.concurrency)
            .try_collect::<Vec<(usize, bool)>>()
            .boxed()
            .await?;

        graded.sort_by_key(|(index, _)| *index);
        Ok(graded.into_iter().map(|(_, relevant)| relevant).collect())
    }

    /// Narrow the session's documents to the relevant subsequence
    pub async fn filter(&self, state: &mut ConversationState) -> Result<FilterReport> {
        let verdicts = self.grade(state.question(), state.documents()).await?;
        let graded = verdicts.len();

        state.retain_relevant(&verdicts)?;

        let report = FilterReport {
            graded,
            retained: state.documents().len(),
        };

        info!(
            graded = report.graded,
            retained = report.retained,
            "Relevance filtering complete"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::llm::Grade;
    use crate::testing::{passages, ScriptedClassifier};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Classifier that answers later passages first and tracks how many
    /// calls are in flight at once. Even-numbered passages are relevant.
    struct StaggeredClassifier {
        passages: usize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        completed: Mutex<Vec<usize>>,
    }

    impl StaggeredClassifier {
        fn new(passages: usize) -> Self {
            Self {
                passages,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                completed: Mutex::new(Vec::new()),
            }
        }

        fn passage_index(&self, prompt: &str) -> usize {
            (0..self.passages)
                .find(|i| prompt.contains(&format!("Passage number {} about", i)))
                .unwrap()
        }
    }

    #[async_trait]
    impl Classifier for StaggeredClassifier {
        async fn complete_structured(&self, _instructions: &str, prompt: &str) -> Result<Grade> {
            let index = self.passage_index(prompt);

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let delay = 10 * (self.passages - index) as u64;
            tokio::time::sleep(Duration::from_millis(delay)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.completed.lock().unwrap().push(index);

            let score = if index % 2 == 0 { "yes" } else { "no" };
            Grade::from_json(&format!(r#"{{"binary_score": "{}"}}"#, score))
        }
    }

    fn state_with(docs: Vec<Passage>) -> ConversationState {
        let mut state = ConversationState::new("How do agents plan?", 3);
        state.replace_documents(docs);
        state
    }

    #[tokio::test]
    async fn test_every_verdict_pattern_yields_ordered_subsequence() {
        // all 2^5 yes/no patterns over five passages
        for mask in 0u32..32 {
            let classifier = ScriptedClassifier::approving().relevance_when(move |prompt| {
                (0..5).any(|i| {
                    mask & (1 << i) != 0
                        && prompt.contains(&format!("Passage number {} about", i))
                })
            });
            let filter = RelevanceFilter::new(Arc::new(classifier), 3);
            let mut state = state_with(passages(5));

            let report = filter.filter(&mut state).await.unwrap();

            let expected: Vec<String> = (0..5)
                .filter(|i| mask & (1 << i) != 0)
                .map(|i| format!("doc-{}", i))
                .collect();
            let actual: Vec<String> = state.documents().iter().map(|p| p.id.clone()).collect();

            assert_eq!(actual, expected, "mask {:05b}", mask);
            assert_eq!(report.graded, 5);
            assert_eq!(report.retained, expected.len());
        }
    }

    #[tokio::test]
    async fn test_grades_every_passage_without_early_exit() {
        let classifier = Arc::new(ScriptedClassifier::approving());
        let filter = RelevanceFilter::new(classifier.clone(), 2);
        let mut state = state_with(passages(4));

        filter.filter(&mut state).await.unwrap();

        assert_eq!(classifier.calls().len(), 4);
        assert_eq!(state.documents().len(), 4);
    }

    #[tokio::test]
    async fn test_verdict_compare_is_case_insensitive() {
        let classifier = ScriptedClassifier::approving().relevance_raw(|prompt| {
            if prompt.contains("Passage number 1 about") {
                r#"{"binary_score": "YES"}"#.to_string()
            } else {
                r#"{"binary_score": "No"}"#.to_string()
            }
        });
        let filter = RelevanceFilter::new(Arc::new(classifier), 4);
        let mut state = state_with(passages(3));

        filter.filter(&mut state).await.unwrap();

        assert_eq!(state.documents().len(), 1);
        assert_eq!(state.documents()[0].id, "doc-1");
    }

    #[tokio::test]
    async fn test_missing_verdict_is_schema_violation() {
        let classifier = ScriptedClassifier::approving()
            .relevance_raw(|_| r#"{"explanation": "looks relevant"}"#.to_string());
        let filter = RelevanceFilter::new(Arc::new(classifier), 4);
        let mut state = state_with(passages(3));

        let err = filter.filter(&mut state).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Schema);
        assert_eq!(state.documents().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let filter = RelevanceFilter::new(Arc::new(ScriptedClassifier::approving()), 4);
        let mut state = state_with(Vec::new());

        let report = filter.filter(&mut state).await.unwrap();
        assert_eq!(report, FilterReport { graded: 0, retained: 0 });
    }

    #[tokio::test]
    async fn test_out_of_order_completions_keep_original_order() {
        let classifier = Arc::new(StaggeredClassifier::new(8));
        let filter = RelevanceFilter::new(classifier.clone(), 3);
        let mut state = state_with(passages(8));

        let report = filter.filter(&mut state).await.unwrap();

        let completed = classifier.completed.lock().unwrap().clone();
        let mut sorted = completed.clone();
        sorted.sort();
        assert_ne!(completed, sorted, "completions should arrive out of order");

        let ids: Vec<&str> = state.documents().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["doc-0", "doc-2", "doc-4", "doc-6"]);
        assert_eq!(report, FilterReport { graded: 8, retained: 4 });
    }

    #[tokio::test]
    async fn test_in_flight_grading_respects_concurrency_bound() {
        for concurrency in [1, 2, 4] {
            let classifier = Arc::new(StaggeredClassifier::new(6));
            let filter = RelevanceFilter::new(classifier.clone(), concurrency);
            let mut state = state_with(passages(6));

            filter.filter(&mut state).await.unwrap();

            let peak = classifier.peak.load(Ordering::SeqCst);
            assert!(peak <= concurrency, "peak {} > {}", peak, concurrency);
            assert_eq!(peak, concurrency);
            assert_eq!(classifier.completed.lock().unwrap().len(), 6);
        }
    }
}
