//! Submitted command history with cursor-based recall.

/// Ordered list of submitted commands plus a recall cursor.
///
/// The cursor ranges over `0..=len`; `len` is the "new entry" position. Text
/// typed at that position is kept as a draft while the user walks back, and
/// returned when they walk forward past the newest entry again.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommandHistory {
    entries: Vec<String>,
    cursor: usize,
    draft: String,
}

impl CommandHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a submitted command and reset the cursor past the end.
    ///
    /// A command equal to the newest entry is not stored again.
    pub fn record(&mut self, command: &str) {
        if self.entries.last().map(String::as_str) != Some(command) {
            self.entries.push(command.to_string());
        }
        self.cursor = self.entries.len();
        self.draft.clear();
    }

    /// Step back one entry. `current_input` is kept as the draft when leaving
    /// the new-entry position. `None` means the input should stay as it is.
    pub fn recall_previous(&mut self, current_input: &str) -> Option<&str> {
        if self.cursor == 0 {
            return None;
        }
        if self.cursor == self.entries.len() {
            self.draft = current_input.to_string();
        }
        self.cursor -= 1;
        Some(&self.entries[self.cursor])
    }

    /// Step forward one entry, ending at the draft.
    pub fn recall_next(&mut self) -> &str {
        if self.cursor + 1 < self.entries.len() {
            self.cursor += 1;
            &self.entries[self.cursor]
        } else {
            self.cursor = self.entries.len();
            &self.draft
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn history_of(commands: &[&str]) -> CommandHistory {
        let mut history = CommandHistory::new();
        for command in commands {
            history.record(command);
        }
        history
    }

    #[test]
    fn empty_history_recalls_nothing() {
        let mut history = CommandHistory::new();
        assert_eq!(history.recall_previous("typed"), None);
        assert_eq!(history.recall_next(), "");
        assert_eq!(history.cursor(), 0);
    }

    #[test]
    fn consecutive_duplicates_are_suppressed() {
        let history = history_of(&["ls", "ls", "pwd", "ls", "ls"]);
        assert_eq!(history.entries(), ["ls", "pwd", "ls"]);
        assert_eq!(history.cursor(), 3);
    }

    #[test]
    fn walks_back_and_stops_at_oldest() {
        let mut history = history_of(&["one", "two", "three"]);
        assert_eq!(history.recall_previous(""), Some("three"));
        assert_eq!(history.recall_previous("three"), Some("two"));
        assert_eq!(history.recall_previous("two"), Some("one"));
        assert_eq!(history.recall_previous("one"), None);
        assert_eq!(history.cursor(), 0);
    }

    #[test]
    fn walking_forward_past_newest_restores_draft() {
        let mut history = history_of(&["one", "two"]);
        assert_eq!(history.recall_previous("half-typed"), Some("two"));
        assert_eq!(history.recall_previous("two"), Some("one"));
        assert_eq!(history.recall_next(), "two");
        assert_eq!(history.recall_next(), "half-typed");
        assert_eq!(history.cursor(), 2);
        assert_eq!(history.recall_next(), "half-typed");
    }

    #[test]
    fn recording_resets_cursor_and_draft() {
        let mut history = history_of(&["one", "two"]);
        history.recall_previous("draft");
        history.record("three");
        assert_eq!(history.cursor(), 3);
        assert_eq!(history.recall_next(), "");
    }

    proptest! {
        #[test]
        fn never_stores_adjacent_duplicates(commands in proptest::collection::vec("[a-c]{1,2}", 0..40)) {
            let mut history = CommandHistory::new();
            for command in &commands {
                history.record(command);
            }
            for pair in history.entries().windows(2) {
                prop_assert_ne!(&pair[0], &pair[1]);
            }
            prop_assert_eq!(history.cursor(), history.entries().len());
        }

        #[test]
        fn distinct_submissions_move_cursor_to_count(n in 0usize..50) {
            let mut history = CommandHistory::new();
            for i in 0..n {
                history.record(&format!("cmd-{}", i));
            }
            prop_assert_eq!(history.cursor(), n);
        }

        #[test]
        fn back_then_forward_returns_original_input(
            commands in proptest::collection::vec("[a-z]{1,6}", 0..10),
            input in "[a-z ]{0,8}",
            steps in 0usize..12,
        ) {
            let mut history = CommandHistory::new();
            for command in &commands {
                history.record(command);
            }
            let mut current = input.clone();
            let mut moved = 0;
            for _ in 0..steps {
                match history.recall_previous(&current) {
                    Some(entry) => {
                        current = entry.to_string();
                        moved += 1;
                    }
                    None => break,
                }
            }
            for _ in 0..moved {
                current = history.recall_next().to_string();
            }
            prop_assert_eq!(current, input);
            prop_assert_eq!(history.cursor(), history.entries().len());
        }
    }
}
