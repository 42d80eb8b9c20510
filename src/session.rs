use crate::db::executor::ResultSet;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// History keeps this many entries; the oldest fall off first.
pub const MAX_HISTORY: usize = 10;

/// Where the console sits in the refinement loop. `AwaitingRefinement`
/// means the user declared dissatisfaction and the next submission is a
/// follow-up, not a fresh question.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    AwaitingRefinement,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LastAction {
    #[default]
    None,
    Initial,
    Refined,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub sql: String,
    pub table_label: String,
    pub result: ResultSet,
    pub recorded_at: DateTime<Utc>,
}

/// Per-session console state. Owned by the application state and handed
/// into each interaction handler; initialized empty, mutated only by the
/// two generation paths and reset, never persisted.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    question: String,
    sql: String,
    result: Option<ResultSet>,
    phase: Phase,
    last_action: LastAction,
    history: Vec<HistoryEntry>,
}

/// Snapshot of the fields the frontend renders.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub question: String,
    pub sql: String,
    pub result: Option<ResultSet>,
    pub phase: Phase,
    pub last_action: LastAction,
    pub history_len: usize,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn result(&self) -> Option<&ResultSet> {
        self.result.as_ref()
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// True once an initial query has run; a second initial run is refused
    /// until the user resets (the refine path is how results evolve).
    pub fn has_active_question(&self) -> bool {
        !self.question.is_empty()
    }

    /// Applies a successful initial run: the question becomes active and
    /// the result starts a new history entry.
    pub fn begin_initial(
        &mut self,
        question: String,
        sql: String,
        table_label: String,
        result: ResultSet,
    ) {
        self.question = question;
        self.sql = sql.clone();
        self.result = Some(result.clone());
        self.phase = Phase::Idle;
        self.last_action = LastAction::Initial;
        self.record(sql, table_label, result, false);
    }

    /// User declared dissatisfaction with the current result.
    pub fn open_refinement(&mut self) -> Result<(), &'static str> {
        if self.result.is_none() {
            return Err("There is no query result to refine yet");
        }
        self.phase = Phase::AwaitingRefinement;
        Ok(())
    }

    /// Applies a successful refinement: the displayed result is replaced
    /// and the latest history entry is overwritten in place.
    pub fn apply_refinement(&mut self, sql: String, table_label: String, result: ResultSet) {
        self.sql = sql.clone();
        self.result = Some(result.clone());
        self.phase = Phase::Idle;
        self.last_action = LastAction::Refined;
        self.record(sql, table_label, result, true);
    }

    /// Append-or-coalesce. A refinement overwrites the most recent entry
    /// rather than appending; coalescing is keyed on this explicit signal,
    /// not on the table label, so unrelated queries that happen to share a
    /// label never collapse into each other.
    pub fn record(&mut self, sql: String, table_label: String, result: ResultSet, refined: bool) {
        let recorded_at = Utc::now();

        if refined {
            if let Some(last) = self.history.last_mut() {
                last.sql = sql;
                last.table_label = table_label;
                last.result = result;
                last.recorded_at = recorded_at;
                return;
            }
        }

        self.history.push(HistoryEntry {
            sql,
            table_label,
            result,
            recorded_at,
        });

        if self.history.len() > MAX_HISTORY {
            let excess = self.history.len() - MAX_HISTORY;
            self.history.drain(..excess);
        }
    }

    /// Back to the initial empty state. History survives a reset.
    pub fn reset(&mut self) {
        self.question.clear();
        self.sql.clear();
        self.result = None;
        self.phase = Phase::Idle;
        self.last_action = LastAction::None;
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            question: self.question.clone(),
            sql: self.sql.clone(),
            result: self.result.clone(),
            phase: self.phase,
            last_action: self.last_action,
            history_len: self.history.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with(rows: usize) -> ResultSet {
        ResultSet {
            columns: vec!["Country".to_string()],
            rows: (0..rows).map(|i| vec![serde_json::json!(i)]).collect(),
        }
    }

    fn record_initial(session: &mut SessionState, label: &str) {
        session.record("SELECT 1".into(), label.into(), result_with(1), false);
    }

    #[test]
    fn initial_run_activates_the_question() {
        let mut session = SessionState::new();
        assert!(!session.has_active_question());

        session.begin_initial(
            "show all orders".into(),
            "SELECT * FROM \"orders\"".into(),
            "All Orders".into(),
            result_with(3),
        );

        assert!(session.has_active_question());
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.result().unwrap().row_count(), 3);
    }

    #[test]
    fn refinement_replaces_result_and_coalesces_history() {
        let mut session = SessionState::new();
        session.begin_initial(
            "orders from Germany".into(),
            "SELECT * FROM \"orders\" WHERE \"Country\" = 'Germany'".into(),
            "German Orders".into(),
            result_with(3),
        );
        session.open_refinement().unwrap();
        assert_eq!(session.phase(), Phase::AwaitingRefinement);

        session.apply_refinement(
            "SELECT * FROM \"orders\" WHERE \"Country\" = 'Germany' AND \"Quantity\" > 10".into(),
            "Large German Orders".into(),
            result_with(1),
        );

        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.history().len(), 1, "refinement coalesces");
        assert_eq!(session.history()[0].table_label, "Large German Orders");
        assert_eq!(session.history()[0].result.row_count(), 1);
    }

    #[test]
    fn identical_labels_do_not_coalesce_without_the_refinement_signal() {
        let mut session = SessionState::new();
        record_initial(&mut session, "Orders");
        record_initial(&mut session, "Orders");
        record_initial(&mut session, "Other");

        assert_eq!(session.history().len(), 3);
    }

    #[test]
    fn refinement_signal_coalesces_across_differing_labels() {
        let mut session = SessionState::new();
        record_initial(&mut session, "Orders");
        session.record("SELECT 2".into(), "Narrowed Orders".into(), result_with(2), true);

        assert_eq!(session.history().len(), 1);
        assert_eq!(session.history()[0].table_label, "Narrowed Orders");
        assert_eq!(session.history()[0].sql, "SELECT 2");
    }

    #[test]
    fn history_is_capped_at_ten_entries_dropping_the_oldest() {
        let mut session = SessionState::new();
        for i in 0..11 {
            record_initial(&mut session, &format!("Label {}", i));
        }

        assert_eq!(session.history().len(), MAX_HISTORY);
        assert_eq!(session.history()[0].table_label, "Label 1");
        assert_eq!(session.history()[9].table_label, "Label 10");
    }

    #[test]
    fn refinement_requires_a_result() {
        let mut session = SessionState::new();
        assert!(session.open_refinement().is_err());
    }

    #[test]
    fn reset_clears_the_console_but_not_the_history() {
        let mut session = SessionState::new();
        session.begin_initial(
            "orders".into(),
            "SELECT 1".into(),
            "Orders".into(),
            result_with(2),
        );
        session.open_refinement().unwrap();

        session.reset();

        assert!(!session.has_active_question());
        assert_eq!(session.phase(), Phase::Idle);
        assert!(session.result().is_none());
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.history()[0].table_label, "Orders");
    }
}
