use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::Backend;
use crate::{
    auth::{Access, OWNER_FIELD},
    error::Result,
    model::{non_empty, Todo},
    store::{Document, FieldValue, Fields, Filter, LISTS, TODOS},
};

#[derive(Clone)]
pub struct TodoRepository {
    backend: Backend,
}

impl TodoRepository {
    pub fn new(backend: Backend) -> Self {
        TodoRepository { backend }
    }

    fn access(&self) -> Access<'_> {
        Access::new(self.backend.identity.as_ref())
    }

    /// Loads a list document and checks the caller owns it.
    fn owned_list(&self, list_id: &str) -> Result<Document> {
        self.access()
            .fetch_owned(self.backend.store.as_ref(), LISTS, list_id)
    }

    fn owned_todo(&self, id: &str) -> Result<Todo> {
        let doc = self
            .access()
            .fetch_owned(self.backend.store.as_ref(), TODOS, id)?;
        Todo::from_document(&doc, self.backend.clock.now())
    }

    /// The caller's tasks, optionally narrowed to one list, oldest first.
    pub fn list_todos(&self, list_id: Option<&str>) -> Result<Vec<Todo>> {
        let owner = self.access().caller()?;
        let mut filters = vec![Filter::eq(OWNER_FIELD, owner.as_str())];
        if let Some(list_id) = list_id {
            self.owned_list(list_id)?;
            filters.push(Filter::eq("listId", list_id));
        }

        let now = self.backend.clock.now();
        let docs = self.backend.store.query(TODOS, &filters)?;
        debug!(%owner, list = ?list_id, count = docs.len(), "fetched tasks");

        let mut todos: Vec<Todo> = docs
            .iter()
            .filter_map(|doc| match Todo::from_document(doc, now) {
                Ok(todo) => Some(todo),
                Err(e) => {
                    warn!(error = %e, "skipping task");
                    None
                }
            })
            .collect();
        todos.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(todos)
    }

    pub fn get_todo(&self, id: &str) -> Result<Todo> {
        self.owned_todo(id)
    }

    pub fn add_todo(&self, list_id: &str, text: &str) -> Result<Todo> {
        let owner = self.access().caller()?;
        let text = non_empty("task", text)?;
        self.owned_list(list_id)?;

        let id = self
            .backend
            .store
            .create(TODOS, Todo::new_fields(list_id, &text, &owner))?;
        info!(%id, list = %list_id, "task added");
        self.owned_todo(&id)
    }

    /// Flips `completed` and returns the id of the owning list.
    pub fn toggle_todo(&self, id: &str) -> Result<String> {
        let todo = self.owned_todo(id)?;
        let completed = !todo.completed;
        let completed_at = match completed {
            true => FieldValue::json(self.backend.clock.now().to_rfc3339()),
            false => FieldValue::Json(Value::Null),
        };

        let mut fields = Fields::new();
        fields.insert("completed".into(), FieldValue::json(completed));
        fields.insert("completedAt".into(), completed_at);
        self.backend.store.update(TODOS, id, fields)?;
        info!(%id, completed, "task toggled");

        Ok(todo.list_id)
    }

    /// Deletes the task and returns what it was.
    pub fn delete_todo(&self, id: &str) -> Result<Todo> {
        let todo = self.owned_todo(id)?;
        self.backend.store.delete(TODOS, id)?;
        info!(%id, list = %todo.list_id, "task deleted");
        Ok(todo)
    }

    /// Removes the caller's tasks whose list no longer exists.
    pub fn sweep_orphans(&self) -> Result<usize> {
        let owner = self.access().caller()?;
        let owner_filter = [Filter::eq(OWNER_FIELD, owner.as_str())];
        let lists: HashSet<String> = self
            .backend
            .store
            .query(LISTS, &owner_filter)?
            .into_iter()
            .map(|doc| doc.id)
            .collect();

        let mut removed = 0;
        for doc in self.backend.store.query(TODOS, &owner_filter)? {
            let orphaned = doc
                .str_field("listId")
                .map_or(true, |list_id| !lists.contains(list_id));
            if orphaned {
                self.backend.store.delete(TODOS, &doc.id)?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!(%owner, removed, "swept orphaned tasks");
        }
        Ok(removed)
    }
}
