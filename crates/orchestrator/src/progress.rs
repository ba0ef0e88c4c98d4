#![forbid(unsafe_code)]

/// Per-rule result vocabulary reported by the engine.
///
/// Unrecognized tokens are passed through verbatim rather than dropped,
/// so a newer engine cannot silently lose results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleStatus {
    Processing,
    Pass,
    Fail,
    Fixed,
    Error,
    Unknown,
    NotApplicable,
    NotChecked,
    NotSelected,
    Informational,
    Other(String),
}

impl RuleStatus {
    pub fn from_token(token: &str) -> Self {
        match token {
            "processing" => RuleStatus::Processing,
            "pass" => RuleStatus::Pass,
            "fail" => RuleStatus::Fail,
            "fixed" => RuleStatus::Fixed,
            "error" => RuleStatus::Error,
            "unknown" => RuleStatus::Unknown,
            "notapplicable" => RuleStatus::NotApplicable,
            "notchecked" => RuleStatus::NotChecked,
            "notselected" => RuleStatus::NotSelected,
            "informational" => RuleStatus::Informational,
            other => RuleStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RuleStatus::Processing => "processing",
            RuleStatus::Pass => "pass",
            RuleStatus::Fail => "fail",
            RuleStatus::Fixed => "fixed",
            RuleStatus::Error => "error",
            RuleStatus::Unknown => "unknown",
            RuleStatus::NotApplicable => "notapplicable",
            RuleStatus::NotChecked => "notchecked",
            RuleStatus::NotSelected => "notselected",
            RuleStatus::Informational => "informational",
            RuleStatus::Other(token) => token,
        }
    }
}

impl std::fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub rule: String,
    pub status: RuleStatus,
}

/// Output of one `feed` call: either a well-formed progress event or the
/// raw buffer of a malformed fragment the caller should surface as a
/// warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressNote {
    Event(ProgressEvent),
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ReadingRule,
    ReadingStatus,
}

/// Incremental parser for the engine's progress stream.
///
/// The stream is lines of the form `rule-identifier:status`. On the
/// colon the parser emits `(rule, processing)` and remembers the rule;
/// on the newline it emits `(rule, status)`. A newline while reading a
/// rule or a colon while reading a status is malformed upstream output:
/// the buffered fragment is reported and parsing resumes at the top of
/// the current state, keeping subsequent lines intact.
#[derive(Debug)]
pub struct ProgressParser {
    state: State,
    buffer: String,
    last_rule: String,
    enabled: bool,
}

impl Default for ProgressParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressParser {
    pub fn new() -> Self {
        Self {
            state: State::ReadingRule,
            buffer: String::new(),
            last_rule: String::new(),
            enabled: true,
        }
    }

    /// A parser that drains input without interpreting it, for engines
    /// without progress support.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    /// Restore the initial state for reuse between runs.
    pub fn reset(&mut self) {
        self.state = State::ReadingRule;
        self.buffer.clear();
        self.last_rule.clear();
    }

    pub fn feed(&mut self, chunk: &str) -> Vec<ProgressNote> {
        let mut notes = Vec::new();
        if !self.enabled {
            return notes;
        }

        for ch in chunk.chars() {
            match (self.state, ch) {
                (State::ReadingRule, ':') => {
                    let rule = std::mem::take(&mut self.buffer);
                    notes.push(ProgressNote::Event(ProgressEvent {
                        rule: rule.clone(),
                        status: RuleStatus::Processing,
                    }));
                    self.last_rule = rule;
                    self.state = State::ReadingStatus;
                }
                (State::ReadingRule, '\n') => {
                    notes.push(ProgressNote::Malformed(std::mem::take(&mut self.buffer)));
                }
                (State::ReadingRule, ch) => self.buffer.push(ch),
                (State::ReadingStatus, '\n') => {
                    let status = std::mem::take(&mut self.buffer);
                    notes.push(ProgressNote::Event(ProgressEvent {
                        rule: self.last_rule.clone(),
                        status: RuleStatus::from_token(&status),
                    }));
                    self.state = State::ReadingRule;
                }
                (State::ReadingStatus, ':') => {
                    notes.push(ProgressNote::Malformed(std::mem::take(&mut self.buffer)));
                }
                (State::ReadingStatus, ch) => self.buffer.push(ch),
            }
        }

        notes
    }
}
