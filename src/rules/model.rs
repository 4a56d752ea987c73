//! Rule data model: closed enumerations for fields, predicates and actions.
//!
//! Every value representable by these types is a valid rule component: a
//! date condition always carries a parsed date, and a string field can only
//! be paired with a string predicate. Raw documents become these types
//! through [`super::parse`].

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

/// Fixed format for `received_date` condition values (e.g. `08-03-2024`).
pub const DATE_FORMAT: &str = "%d-%m-%Y";

/// How the conditions of a rule are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionPredicate {
    /// Every condition must hold (conjunction).
    All,
    /// At least one condition must hold (disjunction).
    Any,
}

impl CollectionPredicate {
    pub const VARIANTS: [Self; 2] = [Self::All, Self::Any];

    /// Parse the document representation (`"All"` / `"Any"`).
    pub fn parse(s: &str) -> Option<Self> {
        Self::VARIANTS.into_iter().find(|p| p.as_str() == s)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::All => "All",
            Self::Any => "Any",
        }
    }
}

/// Message field a condition tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    FromAddress,
    ToAddress,
    Subject,
    ReceivedDate,
    Body,
}

impl Field {
    pub const VARIANTS: [Self; 5] = [
        Self::FromAddress,
        Self::ToAddress,
        Self::Subject,
        Self::ReceivedDate,
        Self::Body,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        Self::VARIANTS.into_iter().find(|f| f.as_str() == s)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FromAddress => "from_address",
            Self::ToAddress => "to_address",
            Self::Subject => "subject",
            Self::ReceivedDate => "received_date",
            Self::Body => "body",
        }
    }

    /// The string-valued counterpart of this field, if it has one.
    pub const fn as_text(&self) -> Option<TextField> {
        match self {
            Self::FromAddress => Some(TextField::FromAddress),
            Self::ToAddress => Some(TextField::ToAddress),
            Self::Subject => Some(TextField::Subject),
            Self::Body => Some(TextField::Body),
            Self::ReceivedDate => None,
        }
    }
}

/// String-valued message fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextField {
    FromAddress,
    ToAddress,
    Subject,
    Body,
}

impl TextField {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FromAddress => "from_address",
            Self::ToAddress => "to_address",
            Self::Subject => "subject",
            Self::Body => "body",
        }
    }
}

/// Predicates allowed on string fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextPredicate {
    Contains,
    DoesNotContain,
}

impl TextPredicate {
    pub const VARIANTS: [Self; 2] = [Self::Contains, Self::DoesNotContain];

    pub fn parse(s: &str) -> Option<Self> {
        Self::VARIANTS.into_iter().find(|p| p.as_str() == s)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::DoesNotContain => "does not contain",
        }
    }

    /// Substring test, ignoring ASCII case (as SQLite `LIKE` does).
    pub fn test(&self, haystack: &str, needle: &str) -> bool {
        let found = haystack
            .to_ascii_lowercase()
            .contains(&needle.to_ascii_lowercase());
        match self {
            Self::Contains => found,
            Self::DoesNotContain => !found,
        }
    }
}

/// Relational predicates allowed on `received_date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatePredicate {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl DatePredicate {
    pub const VARIANTS: [Self; 4] = [Self::Gt, Self::Gte, Self::Lt, Self::Lte];

    pub fn parse(s: &str) -> Option<Self> {
        Self::VARIANTS.into_iter().find(|p| p.as_str() == s)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
        }
    }

    /// Evaluate `lhs <op> rhs`.
    pub fn compare<T: Ord>(&self, lhs: &T, rhs: &T) -> bool {
        match self {
            Self::Gt => lhs > rhs,
            Self::Gte => lhs >= rhs,
            Self::Lt => lhs < rhs,
            Self::Lte => lhs <= rhs,
        }
    }
}

/// A single validated field/predicate/value test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Substring test on a string field.
    Text {
        field: TextField,
        predicate: TextPredicate,
        value: String,
    },
    /// Relational test on the received timestamp.
    ReceivedDate {
        predicate: DatePredicate,
        date: NaiveDate,
    },
}

impl Condition {
    pub const fn field(&self) -> Field {
        match self {
            Self::Text { field, .. } => match field {
                TextField::FromAddress => Field::FromAddress,
                TextField::ToAddress => Field::ToAddress,
                TextField::Subject => Field::Subject,
                TextField::Body => Field::Body,
            },
            Self::ReceivedDate { .. } => Field::ReceivedDate,
        }
    }

    pub const fn predicate_str(&self) -> &'static str {
        match self {
            Self::Text { predicate, .. } => predicate.as_str(),
            Self::ReceivedDate { predicate, .. } => predicate.as_str(),
        }
    }

    /// The value as it appears in a rule document.
    pub fn value_string(&self) -> String {
        match self {
            Self::Text { value, .. } => value.clone(),
            Self::ReceivedDate { date, .. } => date.format(DATE_FORMAT).to_string(),
        }
    }
}

/// Midnight UTC at the start of `date`; the instant a date condition compares against.
pub fn date_threshold(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Closed set of action kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    MoveToFolder,
    MarkAsRead,
}

impl ActionKind {
    pub const VARIANTS: [Self; 2] = [Self::MoveToFolder, Self::MarkAsRead];

    pub fn parse(s: &str) -> Option<Self> {
        Self::VARIANTS.into_iter().find(|a| a.as_str() == s)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MoveToFolder => "move_to_folder",
            Self::MarkAsRead => "mark_as_read",
        }
    }
}

/// One action together with its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    MoveToFolder(String),
    MarkAsRead(bool),
}

impl Action {
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::MoveToFolder(_) => ActionKind::MoveToFolder,
            Self::MarkAsRead(_) => ActionKind::MarkAsRead,
        }
    }
}

/// The action mapping of a rule: at most one value per action kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Actions {
    pub move_to_folder: Option<String>,
    pub mark_as_read: Option<bool>,
}

impl Actions {
    /// Record an action, replacing any earlier value of the same kind.
    pub fn set(&mut self, action: Action) {
        match action {
            Action::MoveToFolder(folder) => self.move_to_folder = Some(folder),
            Action::MarkAsRead(read) => self.mark_as_read = Some(read),
        }
    }

    /// Configured actions in kind order.
    pub fn iter(&self) -> impl Iterator<Item = Action> + '_ {
        let folder = self.move_to_folder.clone().map(Action::MoveToFolder);
        let read = self.mark_as_read.map(Action::MarkAsRead);
        folder.into_iter().chain(read)
    }

    pub fn is_empty(&self) -> bool {
        self.move_to_folder.is_none() && self.mark_as_read.is_none()
    }
}

/// A validated, immutable triage rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    collection_predicate: CollectionPredicate,
    conditions: Vec<Condition>,
    actions: Actions,
}

impl Rule {
    pub fn new(
        collection_predicate: CollectionPredicate,
        conditions: Vec<Condition>,
        actions: Actions,
    ) -> Self {
        Self {
            collection_predicate,
            conditions,
            actions,
        }
    }

    pub fn collection_predicate(&self) -> CollectionPredicate {
        self.collection_predicate
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn actions(&self) -> &Actions {
        &self.actions
    }

    /// Same conditions and actions under a different combination mode.
    pub fn with_collection_predicate(&self, collection_predicate: CollectionPredicate) -> Self {
        Self {
            collection_predicate,
            ..self.clone()
        }
    }
}

/// Render an allowed set for error messages: `a, b, c`.
pub(crate) fn join_allowed<'a>(items: impl IntoIterator<Item = &'a str>) -> String {
    items.into_iter().collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_names_round_trip() {
        for f in Field::VARIANTS {
            assert_eq!(Field::parse(f.as_str()), Some(f));
        }
        for p in DatePredicate::VARIANTS {
            assert_eq!(DatePredicate::parse(p.as_str()), Some(p));
        }
        assert_eq!(
            TextPredicate::parse("does not contain"),
            Some(TextPredicate::DoesNotContain)
        );
        assert_eq!(TextPredicate::parse("does_not_contain"), None);
        assert_eq!(CollectionPredicate::parse("all"), None);
    }

    #[test]
    fn text_predicate_folds_ascii_case_only() {
        assert!(TextPredicate::Contains.test("Invoice #1", "invoice"));
        assert!(!TextPredicate::DoesNotContain.test("Invoice #1", "INVOICE"));
        assert!(TextPredicate::DoesNotContain.test("Invoice #1", "receipt"));
        assert!(!TextPredicate::Contains.test("Élan", "élan"));
        assert!(TextPredicate::Contains.test("anything", ""));
    }

    #[test]
    fn date_predicate_compares() {
        assert!(DatePredicate::Gt.compare(&2, &1));
        assert!(!DatePredicate::Gt.compare(&1, &1));
        assert!(DatePredicate::Gte.compare(&1, &1));
        assert!(DatePredicate::Lt.compare(&0, &1));
        assert!(DatePredicate::Lte.compare(&1, &1));
    }

    #[test]
    fn only_received_date_lacks_text_counterpart() {
        let non_text: Vec<Field> = Field::VARIANTS
            .into_iter()
            .filter(|f| f.as_text().is_none())
            .collect();
        assert_eq!(non_text, vec![Field::ReceivedDate]);
    }

    #[test]
    fn date_condition_renders_in_document_format() {
        let cond = Condition::ReceivedDate {
            predicate: DatePredicate::Gt,
            date: NaiveDate::from_ymd_opt(2024, 3, 8).unwrap(),
        };
        assert_eq!(cond.field(), Field::ReceivedDate);
        assert_eq!(cond.value_string(), "08-03-2024");
        assert_eq!(
            date_threshold(NaiveDate::from_ymd_opt(2024, 3, 8).unwrap()).to_rfc3339(),
            "2024-03-08T00:00:00+00:00"
        );
    }

    #[test]
    fn actions_keep_one_value_per_kind() {
        let mut actions = Actions::default();
        assert!(actions.is_empty());
        actions.set(Action::MarkAsRead(false));
        actions.set(Action::MoveToFolder("Receipts".into()));
        actions.set(Action::MarkAsRead(true));
        let all: Vec<Action> = actions.iter().collect();
        assert_eq!(
            all,
            vec![
                Action::MoveToFolder("Receipts".into()),
                Action::MarkAsRead(true)
            ]
        );
    }
}
