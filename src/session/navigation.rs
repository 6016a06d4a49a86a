use serde::Serialize;

use crate::session::answers::AnswerStore;
use crate::session::model::{ExamDefinition, QuestionModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub answered: usize,
    pub total: usize,
}

impl Progress {
    pub fn percent(self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.answered * 100) / self.total).min(100) as u8
    }
}

/// Cursor over the exam's questions. Moves clamp at both ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationIndex {
    current: usize,
    total: usize,
}

impl NavigationIndex {
    pub fn new(total: usize) -> Self {
        Self { current: 0, total }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_first(&self) -> bool {
        self.current == 0
    }

    pub fn is_last(&self) -> bool {
        self.total == 0 || self.current + 1 == self.total
    }

    pub fn next(&mut self) -> usize {
        if !self.is_last() {
            self.current += 1;
        }
        self.current
    }

    pub fn previous(&mut self) -> usize {
        self.current = self.current.saturating_sub(1);
        self.current
    }

    /// Jumps to `index`. Out-of-range indices leave the cursor where it is.
    pub fn go_to(&mut self, index: usize) -> usize {
        if index < self.total {
            self.current = index;
        }
        self.current
    }

    pub fn current_question<'a>(&self, definition: &'a ExamDefinition) -> Option<&'a QuestionModel> {
        definition.questions.get(self.current)
    }

    pub fn progress(&self, answers: &AnswerStore) -> Progress {
        Progress { answered: answers.answered_count(), total: self.total }
    }
}
