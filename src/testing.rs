//! Scripted capabilities for driving sessions deterministically in tests

use crate::error::OrchestrationError;
use crate::llm::{Classifier, Generator, Grade};
use crate::models::{Capability, Passage};
use crate::relevance::RELEVANCE_INSTRUCTIONS;
use crate::retrieval::Retriever;
use crate::verification::{GROUNDING_INSTRUCTIONS, RESPONSIVENESS_INSTRUCTIONS};
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

pub fn yes() -> String {
    r#"{"binary_score": "yes", "explanation": "criteria met"}"#.to_string()
}

pub fn no() -> String {
    r#"{"binary_score": "no", "explanation": "criteria not met"}"#.to_string()
}

pub fn passages(n: usize) -> Vec<Passage> {
    (0..n)
        .map(|i| Passage::new(format!("doc-{}", i), format!("Passage number {} about agents.", i)))
        .collect()
}

//
// ================= Retriever =================
//

pub struct ScriptedRetriever {
    passages: Vec<Passage>,
    fail: bool,
    calls: AtomicU32,
}

impl ScriptedRetriever {
    pub fn new(passages: Vec<Passage>) -> Self {
        Self {
            passages,
            fail: false,
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            passages: Vec::new(),
            fail: true,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Retriever for ScriptedRetriever {
    async fn search(&self, _query: &str) -> Result<Vec<Passage>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(OrchestrationError::unavailable(
                Capability::Retriever,
                "vector store offline",
            ));
        }
        Ok(self.passages.clone())
    }
}

//
// ================= Generator =================
//

pub struct ScriptedGenerator {
    answers: Mutex<VecDeque<String>>,
    steady: String,
    fail: bool,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(steady: &str) -> Self {
        Self {
            answers: Mutex::new(VecDeque::new()),
            steady: steady.to_string(),
            fail: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answers are handed out in order, then `steady` forever
    pub fn with_answers(mut self, answers: &[&str]) -> Self {
        self.answers = Mutex::new(answers.iter().map(|a| a.to_string()).collect());
        self
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new("")
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail {
            return Err(OrchestrationError::unavailable(
                Capability::Generator,
                "model not loaded",
            ));
        }
        let next = self.answers.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.steady.clone()))
    }
}

//
// ================= Classifier =================
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    Relevance,
    Grounding,
    Responsiveness,
}

struct Script {
    queue: VecDeque<String>,
    steady: String,
}

impl Script {
    fn steady(raw: String) -> Self {
        Self {
            queue: VecDeque::new(),
            steady: raw,
        }
    }

    fn next(&mut self) -> String {
        self.queue
            .pop_front()
            .unwrap_or_else(|| self.steady.clone())
    }
}

type RelevanceRule = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Classifier whose answers are scripted per check kind. Relevance verdicts
/// are computed from the prompt so that concurrent grading stays deterministic.
pub struct ScriptedClassifier {
    relevance: RelevanceRule,
    grounding: Mutex<Script>,
    responsiveness: Mutex<Script>,
    calls: Mutex<Vec<CheckKind>>,
}

impl ScriptedClassifier {
    /// Every check answers `yes`
    pub fn approving() -> Self {
        Self {
            relevance: Box::new(|_| yes()),
            grounding: Mutex::new(Script::steady(yes())),
            responsiveness: Mutex::new(Script::steady(yes())),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn relevance_when<F>(mut self, relevant: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.relevance = Box::new(move |prompt| if relevant(prompt) { yes() } else { no() });
        self
    }

    pub fn relevance_raw<F>(mut self, rule: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.relevance = Box::new(rule);
        self
    }

    pub fn grounding(self, queue: &[String], steady: String) -> Self {
        *self.grounding.lock().unwrap() = Script {
            queue: queue.iter().cloned().collect(),
            steady,
        };
        self
    }

    pub fn responsiveness(self, queue: &[String], steady: String) -> Self {
        *self.responsiveness.lock().unwrap() = Script {
            queue: queue.iter().cloned().collect(),
            steady,
        };
        self
    }

    pub fn calls(&self) -> Vec<CheckKind> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, kind: CheckKind) -> usize {
        self.calls().iter().filter(|k| **k == kind).count()
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn complete_structured(&self, instructions: &str, prompt: &str) -> Result<Grade> {
        let kind = if instructions == RELEVANCE_INSTRUCTIONS {
            CheckKind::Relevance
        } else if instructions == GROUNDING_INSTRUCTIONS {
            CheckKind::Grounding
        } else if instructions == RESPONSIVENESS_INSTRUCTIONS {
            CheckKind::Responsiveness
        } else {
            panic!("unexpected classifier instructions: {}", instructions);
        };

        self.calls.lock().unwrap().push(kind);

        let raw = match kind {
            CheckKind::Relevance => (self.relevance)(prompt),
            CheckKind::Grounding => self.grounding.lock().unwrap().next(),
            CheckKind::Responsiveness => self.responsiveness.lock().unwrap().next(),
        };

        Grade::from_json(&raw)
    }
}
