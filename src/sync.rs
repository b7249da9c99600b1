use std::{
    collections::BTreeSet,
    fmt,
    sync::{Mutex, MutexGuard},
};

use tracing::trace;

/// Semantic identity of a cached read.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ViewKey {
    Lists,
    List(String),
    /// `None` is the todos-of-every-list view.
    Todos(Option<String>),
    CompletedDates,
}

impl fmt::Display for ViewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewKey::Lists => write!(f, "(\"lists\",)"),
            ViewKey::List(id) => write!(f, "(\"list\", {:?})", id),
            ViewKey::Todos(Some(id)) => write!(f, "(\"todos\", {:?})", id),
            ViewKey::Todos(None) => write!(f, "(\"todos\",)"),
            ViewKey::CompletedDates => write!(f, "(\"completedDates\",)"),
        }
    }
}

/// The set of views made stale by one or more mutations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invalidation(BTreeSet<ViewKey>);

impl Invalidation {
    pub fn contains(&self, key: &ViewKey) -> bool {
        self.0.contains(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ViewKey> {
        self.0.iter()
    }

    pub fn merge(&mut self, other: Invalidation) {
        self.0.extend(other.0);
    }

    /// True if any per-list todo view is stale.
    pub fn touches_todos(&self) -> bool {
        self.0.iter().any(|key| matches!(key, ViewKey::Todos(_)))
    }
}

impl FromIterator<ViewKey> for Invalidation {
    fn from_iter<I: IntoIterator<Item = ViewKey>>(iter: I) -> Self {
        Invalidation(iter.into_iter().collect())
    }
}

impl IntoIterator for Invalidation {
    type Item = ViewKey;
    type IntoIter = std::collections::btree_set::IntoIter<ViewKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    CreateList { list_id: String },
    UpdateList { list_id: String, completion_changed: bool },
    DeleteList { list_id: String },
    AddTodo { list_id: String },
    ToggleTodo { list_id: String },
    DeleteTodo { list_id: String },
}

impl Mutation {
    /// Views whose contents this mutation may have changed.
    pub fn invalidation(&self) -> Invalidation {
        match self {
            Mutation::CreateList { .. } => [ViewKey::Lists].into_iter().collect(),
            Mutation::UpdateList {
                list_id,
                completion_changed,
            } => {
                let mut keys = vec![ViewKey::Lists, ViewKey::List(list_id.clone())];
                if *completion_changed {
                    keys.push(ViewKey::CompletedDates);
                }
                keys.into_iter().collect()
            }
            // Every todo mutation re-runs the streak engine, so each may move
            // `lastCompletedDate` as well as the todo views and `updatedAt`.
            Mutation::DeleteList { list_id }
            | Mutation::AddTodo { list_id }
            | Mutation::ToggleTodo { list_id }
            | Mutation::DeleteTodo { list_id } => [
                ViewKey::Lists,
                ViewKey::List(list_id.clone()),
                ViewKey::Todos(Some(list_id.clone())),
                ViewKey::Todos(None),
                ViewKey::CompletedDates,
            ]
            .into_iter()
            .collect(),
        }
    }
}

/// A mutation result together with the views it invalidated.
#[derive(Debug, Clone, PartialEq)]
pub struct Synced<T> {
    pub value: T,
    pub invalidated: Invalidation,
}

impl<T> Synced<T> {
    pub fn into_inner(self) -> T {
        self.value
    }
}

/// Collects stale views for whatever reactive layer is reading, and
/// serializes streak read-modify-write sequences within this process.
#[derive(Debug, Default)]
pub struct SyncCoordinator {
    dirty: Mutex<BTreeSet<ViewKey>>,
    streak: Mutex<()>,
}

impl SyncCoordinator {
    pub fn new() -> Self {
        SyncCoordinator::default()
    }

    /// Records `invalidation` as pending and hands it back.
    pub fn publish(&self, invalidation: Invalidation) -> Invalidation {
        let mut dirty = lock(&self.dirty);
        for key in invalidation.iter() {
            trace!(view = %key, "view invalidated");
            dirty.insert(key.clone());
        }
        invalidation
    }

    /// Drains every view marked stale since the last call.
    pub fn take_dirty(&self) -> Invalidation {
        Invalidation(std::mem::take(&mut *lock(&self.dirty)))
    }

    /// Held for the whole read-todos, read-list, compute, write-list sequence.
    pub fn serialize_streak(&self) -> MutexGuard<'_, ()> {
        lock(&self.streak)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::{sync::Arc, thread};

    fn id() -> String {
        "l1".to_string()
    }

    #[rstest]
    #[case::add(Mutation::AddTodo { list_id: id() })]
    #[case::toggle(Mutation::ToggleTodo { list_id: id() })]
    #[case::delete(Mutation::DeleteTodo { list_id: id() })]
    #[case::delete_list(Mutation::DeleteList { list_id: id() })]
    fn todo_mutations_invalidate_calendar(#[case] mutation: Mutation) {
        let keys = mutation.invalidation();
        assert!(keys.contains(&ViewKey::CompletedDates));
        assert!(keys.contains(&ViewKey::Lists));
        assert!(keys.contains(&ViewKey::List(id())));
        assert!(keys.contains(&ViewKey::Todos(Some(id()))));
        assert!(keys.touches_todos());
    }

    #[test]
    fn plain_list_edit_leaves_calendar_alone() {
        let edit = Mutation::UpdateList {
            list_id: id(),
            completion_changed: false,
        };
        assert!(!edit.invalidation().contains(&ViewKey::CompletedDates));

        let streak = Mutation::UpdateList {
            list_id: id(),
            completion_changed: true,
        };
        assert!(streak.invalidation().contains(&ViewKey::CompletedDates));

        let created = Mutation::CreateList { list_id: id() }.invalidation();
        assert_eq!(created.len(), 1);
        assert!(!created.touches_todos());
    }

    #[test]
    fn dirty_set_accumulates_and_drains() {
        let sync = SyncCoordinator::new();
        sync.publish(Mutation::CreateList { list_id: id() }.invalidation());
        sync.publish(
            Mutation::UpdateList {
                list_id: id(),
                completion_changed: false,
            }
            .invalidation(),
        );

        let dirty = sync.take_dirty();
        assert_eq!(dirty.len(), 2);
        assert!(dirty.contains(&ViewKey::List(id())));
        assert!(sync.take_dirty().is_empty());
    }

    #[test]
    fn view_keys_render_as_query_tuples() {
        assert_eq!(ViewKey::Lists.to_string(), "(\"lists\",)");
        assert_eq!(ViewKey::Todos(Some(id())).to_string(), "(\"todos\", \"l1\")");
        assert_eq!(ViewKey::CompletedDates.to_string(), "(\"completedDates\",)");
    }

    #[test]
    fn streak_guard_serializes_sections() {
        let sync = Arc::new(SyncCoordinator::new());
        let counter = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..4)
            .map(|n| {
                let sync = Arc::clone(&sync);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    let _guard = sync.serialize_streak();
                    counter.lock().unwrap().push((n, "enter"));
                    thread::yield_now();
                    counter.lock().unwrap().push((n, "leave"));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let log = counter.lock().unwrap();
        for pair in log.chunks(2) {
            assert_eq!(pair[0].0, pair[1].0);
            assert_eq!((pair[0].1, pair[1].1), ("enter", "leave"));
        }
    }
}
