//! The one entry point the front end talks to.
//!
//! Reads never fail: a store or permission error is logged and the read comes
//! back empty. Writes return their error so the initiating action can be
//! reported. Every task mutation re-runs the streak engine on a fresh read of
//! the list's tasks before returning; a failure there is logged, never raised.

use std::{collections::BTreeSet, sync::Arc};

use tracing::{debug, instrument, warn};

use crate::{
    auth::Identity,
    clock::{Clock, DateKey},
    error::Result,
    model::{ListStats, ListUpdate, Todo, TodoList},
    repository::{Backend, ListRepository, TodoRepository},
    store::DocumentStore,
    streak::next_streak_state,
    sync::{Invalidation, Mutation, SyncCoordinator, Synced, ViewKey},
};

pub struct TodoService {
    lists: ListRepository,
    todos: TodoRepository,
    clock: Arc<dyn Clock>,
    sync: SyncCoordinator,
}

impl TodoService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn Identity>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let backend = Backend::new(store, identity, clock.clone());
        TodoService {
            lists: ListRepository::new(backend.clone()),
            todos: TodoRepository::new(backend),
            clock,
            sync: SyncCoordinator::new(),
        }
    }

    pub fn sync(&self) -> &SyncCoordinator {
        &self.sync
    }

    fn synced<T>(&self, value: T, mutations: &[Mutation]) -> Synced<T> {
        let mut invalidated = Invalidation::default();
        for mutation in mutations {
            invalidated.merge(mutation.invalidation());
        }
        Synced {
            value,
            invalidated: self.sync.publish(invalidated),
        }
    }

    // Reads

    pub fn get_lists(&self) -> Vec<TodoList> {
        self.lists.list_lists().unwrap_or_else(|e| {
            warn!(error = %e, "failed to fetch lists");
            vec![]
        })
    }

    pub fn get_list(&self, id: &str) -> Option<TodoList> {
        self.lists
            .get_list(id)
            .map_err(|e| warn!(%id, error = %e, "failed to fetch list"))
            .ok()
    }

    pub fn get_todos(&self, list_id: Option<&str>) -> Vec<Todo> {
        self.todos.list_todos(list_id).unwrap_or_else(|e| {
            warn!(list = ?list_id, error = %e, "failed to fetch tasks");
            vec![]
        })
    }

    /// Distinct calendar days on which any of the caller's lists is banked.
    pub fn get_completed_dates(&self) -> Vec<DateKey> {
        let dates: BTreeSet<DateKey> = self
            .get_lists()
            .iter()
            .filter_map(|list| list.last_completed_date.as_ref())
            .map(|date| self.clock.date_key_of(date))
            .collect();
        dates.into_iter().collect()
    }

    /// Task counts for each of the caller's lists, in list order.
    pub fn get_list_stats(&self) -> Vec<ListStats> {
        let todos = self.get_todos(None);
        self.get_lists()
            .iter()
            .map(|list| ListStats::of(&list.id, &todos))
            .collect()
    }

    // Writes

    #[instrument(skip(self, description))]
    pub fn create_list(&self, title: &str, description: Option<&str>) -> Result<Synced<TodoList>> {
        let list = self.lists.create_list(title, description)?;
        let mutation = Mutation::CreateList {
            list_id: list.id.clone(),
        };
        Ok(self.synced(list, &[mutation]))
    }

    /// Title and description edits. Streak fields are owned by the engine.
    #[instrument(skip(self, description))]
    pub fn update_list(
        &self,
        id: &str,
        title: Option<&str>,
        description: Option<Option<&str>>,
    ) -> Result<Synced<()>> {
        let update = ListUpdate {
            title: title.map(str::to_string),
            description: description.map(|d| d.map(str::to_string)),
            ..ListUpdate::default()
        };
        self.lists.update_list(id, update)?;
        let mutation = Mutation::UpdateList {
            list_id: id.to_string(),
            completion_changed: false,
        };
        Ok(self.synced((), &[mutation]))
    }

    /// Returns how many tasks went with the list.
    #[instrument(skip(self))]
    pub fn delete_list(&self, id: &str) -> Result<Synced<usize>> {
        let removed = self.lists.delete_list(id)?;
        let mutation = Mutation::DeleteList {
            list_id: id.to_string(),
        };
        Ok(self.synced(removed, &[mutation]))
    }

    #[instrument(skip(self, text))]
    pub fn add_todo(&self, list_id: &str, text: &str) -> Result<Synced<Todo>> {
        let todo = self.todos.add_todo(list_id, text)?;
        self.after_todo_write(list_id);
        let mutation = Mutation::AddTodo {
            list_id: list_id.to_string(),
        };
        Ok(self.synced(todo, &[mutation]))
    }

    /// Returns the id of the list the task belongs to.
    #[instrument(skip(self))]
    pub fn toggle_todo(&self, id: &str) -> Result<Synced<String>> {
        let list_id = self.todos.toggle_todo(id)?;
        self.after_todo_write(&list_id);
        let mutation = Mutation::ToggleTodo {
            list_id: list_id.clone(),
        };
        Ok(self.synced(list_id, &[mutation]))
    }

    #[instrument(skip(self))]
    pub fn delete_todo(&self, id: &str) -> Result<Synced<Todo>> {
        let todo = self.todos.delete_todo(id)?;
        self.after_todo_write(&todo.list_id);
        let mutation = Mutation::DeleteTodo {
            list_id: todo.list_id.clone(),
        };
        Ok(self.synced(todo, &[mutation]))
    }

    /// Clears out tasks left behind by interrupted list deletions.
    pub fn sweep_orphans(&self) -> Result<Synced<usize>> {
        let removed = self.todos.sweep_orphans()?;
        let invalidated = match removed {
            0 => Invalidation::default(),
            _ => [ViewKey::Todos(None)].into_iter().collect(),
        };
        Ok(Synced {
            value: removed,
            invalidated: self.sync.publish(invalidated),
        })
    }

    fn after_todo_write(&self, list_id: &str) {
        if let Err(e) = self.update_list_progress(list_id) {
            warn!(list = %list_id, error = %e, "streak update failed");
        }
    }

    /// Recomputes and persists the list's streak from its current tasks.
    /// Always bumps `updatedAt`, since a task of the list just changed.
    fn update_list_progress(&self, list_id: &str) -> Result<()> {
        let _guard = self.sync.serialize_streak();

        let todos = self.todos.list_todos(Some(list_id))?;
        let list = self.lists.get_list(list_id)?;
        let next = next_streak_state(&list, &todos, self.clock.now(), self.clock.as_ref());

        let update = if next.differs_from(&list) {
            debug!(
                list = %list_id,
                streak = next.current_streak,
                banked = next.last_completed_date.is_some(),
                "streak changed"
            );
            next.to_update()
        } else {
            ListUpdate::touch()
        };
        self.lists.update_list(list_id, update)
    }
}
