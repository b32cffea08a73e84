//! Per-request generation state.
//!
//! `Init -> Stepping -> {Done, Cancelled}`. The state owns the live token
//! window and is dropped when the request finishes.

use llmcore_runtime::TokenSequence;
use serde::Serialize;

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The model emitted the end-of-sequence id
    EndOfSequence,
    /// The token budget was used up
    Budget,
    /// The cancel token fired at a step boundary
    Cancelled,
    /// A zero budget; nothing was run
    Empty,
}

/// Result of one generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Completion {
    /// Decoded text of the final window
    pub text: String,
    /// Tokens appended
    pub steps: usize,
    pub finish: FinishReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Stepping,
    Done(FinishReason),
    Cancelled,
}

#[derive(Debug)]
pub struct GenerationState {
    sequence: TokenSequence,
    max_context: usize,
    steps: usize,
    text: String,
    phase: Phase,
}

impl GenerationState {
    /// Start from an encoded prompt, keeping its most recent `max_context` ids.
    pub fn new(mut prompt: TokenSequence, max_context: usize) -> Self {
        prompt.keep_most_recent(max_context);
        Self {
            sequence: prompt,
            max_context,
            steps: 0,
            text: String::new(),
            phase: Phase::Init,
        }
    }

    pub fn sequence(&self) -> &TokenSequence {
        &self.sequence
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Done(_) | Phase::Cancelled)
    }

    /// Append a chosen id, sliding the window if it overflows.
    pub fn append(&mut self, id: u32) {
        self.sequence.push(id);
        self.sequence.keep_most_recent(self.max_context);
        self.steps += 1;
        self.phase = Phase::Stepping;
    }

    pub fn set_text(&mut self, text: String) {
        self.text = text;
    }

    pub fn finish(&mut self, reason: FinishReason) {
        self.phase = Phase::Done(reason);
    }

    pub fn cancel(&mut self) {
        self.phase = Phase::Cancelled;
    }

    pub fn into_completion(self) -> Completion {
        let finish = match self.phase {
            Phase::Done(reason) => reason,
            Phase::Cancelled => FinishReason::Cancelled,
            // Only reachable with a zero budget.
            Phase::Init | Phase::Stepping => FinishReason::Empty,
        };
        Completion {
            text: self.text,
            steps: self.steps,
            finish,
        }
    }
}
