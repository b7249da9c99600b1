use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{
    auth::OWNER_FIELD,
    error::{Error, Result},
    store::{Document, FieldValue, Fields},
};

#[derive(Debug, Clone, PartialEq)]
pub struct TodoList {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub current_streak: u32,
    pub last_completed_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Todo {
    pub id: String,
    pub list_id: String,
    pub owner_id: String,
    pub text: String,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A list counts as complete only when it has tasks and every one is done.
pub fn all_completed(todos: &[Todo]) -> bool {
    !todos.is_empty() && todos.iter().all(|todo| todo.completed)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListRecord {
    title: String,
    #[serde(default)]
    description: Option<String>,
    owner_id: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    current_streak: u32,
    #[serde(default)]
    last_completed_date: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TodoRecord {
    list_id: String,
    owner_id: String,
    text: String,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

fn decode<T: for<'de> Deserialize<'de>>(kind: &'static str, doc: &Document) -> Result<T> {
    serde_json::from_value(serde_json::Value::Object(doc.fields.clone())).map_err(|e| {
        Error::Corrupt {
            kind,
            id: doc.id.clone(),
            reason: e.to_string(),
        }
    })
}

/// Trims `input` and rejects it if nothing is left.
pub fn non_empty(what: &str, input: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(format!("{} must not be empty", what)));
    }
    Ok(trimmed.to_string())
}

impl TodoList {
    /// Timestamps the store has not stamped yet read as `now`.
    pub fn from_document(doc: &Document, now: DateTime<Utc>) -> Result<Self> {
        let record: ListRecord = decode("list", doc)?;
        Ok(TodoList {
            id: doc.id.clone(),
            title: record.title,
            description: record.description,
            owner_id: record.owner_id,
            created_at: record.created_at.unwrap_or(now),
            updated_at: record.updated_at.unwrap_or(now),
            current_streak: record.current_streak,
            last_completed_date: record.last_completed_date,
        })
    }

    pub fn new_fields(title: &str, description: Option<&str>, owner_id: &str) -> Fields {
        let mut fields = Fields::new();
        fields.insert("title".into(), FieldValue::json(title));
        fields.insert("description".into(), FieldValue::json(description));
        fields.insert(OWNER_FIELD.into(), FieldValue::json(owner_id));
        fields.insert("createdAt".into(), FieldValue::ServerTimestamp);
        fields.insert("updatedAt".into(), FieldValue::ServerTimestamp);
        fields.insert("currentStreak".into(), FieldValue::json(0));
        fields.insert("lastCompletedDate".into(), FieldValue::Json(serde_json::Value::Null));
        fields
    }
}

impl Todo {
    pub fn from_document(doc: &Document, now: DateTime<Utc>) -> Result<Self> {
        let record: TodoRecord = decode("task", doc)?;
        Ok(Todo {
            id: doc.id.clone(),
            list_id: record.list_id,
            owner_id: record.owner_id,
            text: record.text,
            completed: record.completed,
            completed_at: record.completed_at,
            created_at: record.created_at.unwrap_or(now),
        })
    }

    pub fn new_fields(list_id: &str, text: &str, owner_id: &str) -> Fields {
        let mut fields = Fields::new();
        fields.insert("listId".into(), FieldValue::json(list_id));
        fields.insert(OWNER_FIELD.into(), FieldValue::json(owner_id));
        fields.insert("text".into(), FieldValue::json(text));
        fields.insert("completed".into(), FieldValue::json(false));
        fields.insert("completedAt".into(), FieldValue::Json(serde_json::Value::Null));
        fields.insert("createdAt".into(), FieldValue::ServerTimestamp);
        fields
    }
}

/// Partial update of a list. `updatedAt` is always bumped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListUpdate {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub current_streak: Option<u32>,
    pub last_completed_date: Option<Option<DateTime<Utc>>>,
}

impl ListUpdate {
    /// Only bumps `updatedAt`.
    pub fn touch() -> Self {
        ListUpdate::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: Option<String>) -> Self {
        self.description = Some(description);
        self
    }

    pub fn into_fields(self) -> Fields {
        let mut fields = Fields::new();
        if let Some(title) = self.title {
            fields.insert("title".into(), FieldValue::json(title));
        }
        if let Some(description) = self.description {
            fields.insert("description".into(), FieldValue::json(description));
        }
        if let Some(streak) = self.current_streak {
            fields.insert("currentStreak".into(), FieldValue::json(streak));
        }
        if let Some(date) = self.last_completed_date {
            fields.insert(
                "lastCompletedDate".into(),
                FieldValue::json(date.map(|d| d.to_rfc3339())),
            );
        }
        fields.insert("updatedAt".into(), FieldValue::ServerTimestamp);
        fields
    }
}

/// Task counts behind the "3/5 tasks" figure on the dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListStats {
    pub list_id: String,
    pub total: usize,
    pub completed: usize,
}

impl ListStats {
    pub fn of(list_id: &str, todos: &[Todo]) -> Self {
        let mine = todos.iter().filter(|todo| todo.list_id == list_id);
        let (total, completed) = mine.fold((0, 0), |(total, done), todo| {
            (total + 1, done + usize::from(todo.completed))
        });
        ListStats {
            list_id: list_id.to_string(),
            total,
            completed,
        }
    }

    /// Percentage of completed tasks, rounded down. Empty lists are at 0.
    pub fn progress(&self) -> u16 {
        if self.total == 0 {
            return 0;
        }
        (self.completed * 100 / self.total) as u16
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        "2024-05-01T09:00:00Z".parse().unwrap()
    }

    fn todo(list_id: &str, completed: bool) -> Todo {
        Todo {
            id: format!("t-{}-{}", list_id, completed),
            list_id: list_id.into(),
            owner_id: "ana".into(),
            text: "x".into(),
            completed,
            completed_at: None,
            created_at: now(),
        }
    }

    #[test]
    fn empty_list_is_never_complete() {
        assert!(!all_completed(&[]));
        assert!(all_completed(&[todo("l", true), todo("l", true)]));
        assert!(!all_completed(&[todo("l", true), todo("l", false)]));
    }

    #[test]
    fn list_decodes_with_defaults() {
        let doc = Document {
            id: "l1".into(),
            fields: json!({
                "title": "Gym",
                "ownerId": "ana",
                "lastCompletedDate": "2024-04-30T21:00:00+02:00",
            })
            .as_object()
            .cloned()
            .unwrap(),
        };
        let list = TodoList::from_document(&doc, now()).unwrap();
        assert_eq!(list.current_streak, 0);
        assert_eq!(list.description, None);
        assert_eq!(list.created_at, now());
        assert_eq!(
            list.last_completed_date,
            Some("2024-04-30T19:00:00Z".parse().unwrap())
        );
    }

    #[test]
    fn malformed_document_is_corrupt() {
        let doc = Document {
            id: "l1".into(),
            fields: json!({ "ownerId": "ana" }).as_object().cloned().unwrap(),
        };
        assert!(matches!(
            TodoList::from_document(&doc, now()),
            Err(Error::Corrupt { kind: "list", .. })
        ));
    }

    #[test]
    fn update_always_bumps_updated_at() {
        let fields = ListUpdate::touch().into_fields();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["updatedAt"], FieldValue::ServerTimestamp);

        let update = ListUpdate {
            last_completed_date: Some(None),
            ..ListUpdate::default()
        };
        let fields = update.into_fields();
        assert_eq!(fields["lastCompletedDate"], FieldValue::Json(json!(null)));
    }

    #[test]
    fn stats_count_only_the_given_list() {
        let todos = [todo("a", true), todo("a", false), todo("b", true)];
        let stats = ListStats::of("a", &todos);
        assert_eq!((stats.total, stats.completed), (2, 1));
        assert_eq!(stats.progress(), 50);
        assert!(!stats.is_complete());
        assert_eq!(ListStats::of("c", &todos).progress(), 0);
        assert!(ListStats::of("b", &todos).is_complete());
    }
}
