use tracing::{debug, info, warn};

use super::Backend;
use crate::{
    auth::{Access, OWNER_FIELD},
    error::Result,
    model::{non_empty, ListUpdate, TodoList},
    store::{Filter, LISTS, TODOS},
};

#[derive(Clone)]
pub struct ListRepository {
    backend: Backend,
}

impl ListRepository {
    pub fn new(backend: Backend) -> Self {
        ListRepository { backend }
    }

    fn access(&self) -> Access<'_> {
        Access::new(self.backend.identity.as_ref())
    }

    /// Every list owned by the caller. Undecodable documents are skipped.
    pub fn list_lists(&self) -> Result<Vec<TodoList>> {
        let owner = self.access().caller()?;
        let now = self.backend.clock.now();
        let docs = self
            .backend
            .store
            .query(LISTS, &[Filter::eq(OWNER_FIELD, owner.as_str())])?;
        debug!(%owner, count = docs.len(), "fetched lists");

        let mut lists: Vec<TodoList> = docs
            .iter()
            .filter_map(|doc| match TodoList::from_document(doc, now) {
                Ok(list) => Some(list),
                Err(e) => {
                    warn!(error = %e, "skipping list");
                    None
                }
            })
            .collect();
        lists.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(lists)
    }

    pub fn get_list(&self, id: &str) -> Result<TodoList> {
        let doc = self
            .access()
            .fetch_owned(self.backend.store.as_ref(), LISTS, id)?;
        TodoList::from_document(&doc, self.backend.clock.now())
    }

    pub fn create_list(&self, title: &str, description: Option<&str>) -> Result<TodoList> {
        let owner = self.access().caller()?;
        let title = non_empty("title", title)?;
        let description = description.map(str::trim).filter(|d| !d.is_empty());

        let id = self.backend.store.create(
            LISTS,
            TodoList::new_fields(&title, description, &owner),
        )?;
        info!(%id, %owner, "list created");
        self.get_list(&id)
    }

    /// Applies `update` as given. Streak fields are written verbatim.
    pub fn update_list(&self, id: &str, mut update: ListUpdate) -> Result<()> {
        self.get_list(id)?;
        if let Some(title) = update.title.take() {
            update.title = Some(non_empty("title", &title)?);
        }
        self.backend.store.update(LISTS, id, update.into_fields())?;
        Ok(())
    }

    pub fn touch(&self, id: &str) -> Result<()> {
        self.update_list(id, ListUpdate::touch())
    }

    /// Deletes the list, then its tasks one at a time. Tasks that fail to
    /// delete are left for [`super::TodoRepository::sweep_orphans`].
    /// Returns how many tasks were removed.
    pub fn delete_list(&self, id: &str) -> Result<usize> {
        let list = self.get_list(id)?;
        self.backend.store.delete(LISTS, id)?;
        info!(%id, "list deleted");

        let todos = match self.backend.store.query(
            TODOS,
            &[
                Filter::eq("listId", id),
                Filter::eq(OWNER_FIELD, list.owner_id.as_str()),
            ],
        ) {
            Ok(todos) => todos,
            Err(e) => {
                warn!(%id, error = %e, "could not load tasks of deleted list");
                return Ok(0);
            }
        };

        let mut removed = 0;
        for todo in &todos {
            match self.backend.store.delete(TODOS, &todo.id) {
                Ok(()) => removed += 1,
                Err(e) => warn!(list = %id, todo = %todo.id, error = %e, "orphaned task left behind"),
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::StaticIdentity,
        clock::{Clock, FixedClock},
        error::Error,
        model::Todo,
        store::{DocumentStore, MemoryStore, StoreError, StoreOp},
    };
    use std::sync::Arc;

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<FixedClock>,
    }

    impl Fixture {
        fn new() -> Self {
            let clock = Arc::new(FixedClock::at("2024-05-01T09:00:00Z").unwrap());
            Fixture {
                store: Arc::new(MemoryStore::new(clock.clone())),
                clock,
            }
        }

        fn repo(&self, user: Option<&str>) -> ListRepository {
            let identity = match user {
                Some(user) => StaticIdentity::signed_in(user),
                None => StaticIdentity::anonymous(),
            };
            ListRepository::new(Backend::new(
                self.store.clone(),
                Arc::new(identity),
                self.clock.clone(),
            ))
        }

        fn add_todo(&self, list_id: &str, owner: &str) -> String {
            self.store
                .create(TODOS, Todo::new_fields(list_id, "task", owner))
                .unwrap()
        }
    }

    #[test]
    fn create_list_starts_without_streak() {
        let fx = Fixture::new();
        let list = fx
            .repo(Some("ana"))
            .create_list("  Gym  ", Some(" "))
            .unwrap();
        assert_eq!(list.title, "Gym");
        assert_eq!(list.description, None);
        assert_eq!(list.owner_id, "ana");
        assert_eq!(list.current_streak, 0);
        assert_eq!(list.last_completed_date, None);
        assert_eq!(list.created_at, fx.clock.now());
        assert_eq!(list.created_at, list.updated_at);
    }

    #[test]
    fn create_list_rejects_blank_title_and_anonymous_caller() {
        let fx = Fixture::new();
        assert!(matches!(
            fx.repo(Some("ana")).create_list("   ", None),
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(
            fx.repo(None).create_list("Gym", None),
            Err(Error::Unauthenticated)
        );
    }

    #[test]
    fn lists_are_scoped_to_owner() {
        let fx = Fixture::new();
        let ana = fx.repo(Some("ana"));
        let bo = fx.repo(Some("bo"));
        let mine = ana.create_list("Mine", None).unwrap();
        bo.create_list("Theirs", None).unwrap();

        let titles: Vec<_> = ana
            .list_lists()
            .unwrap()
            .into_iter()
            .map(|l| l.title)
            .collect();
        assert_eq!(titles, vec!["Mine"]);

        assert_eq!(bo.get_list(&mine.id), Err(Error::PermissionDenied));
        assert_eq!(
            bo.update_list(&mine.id, ListUpdate::touch().title("hijack")),
            Err(Error::PermissionDenied)
        );
        assert_eq!(bo.delete_list(&mine.id), Err(Error::PermissionDenied));
        assert_eq!(ana.get_list(&mine.id).unwrap().title, "Mine");
    }

    #[test]
    fn missing_list_is_not_found() {
        let fx = Fixture::new();
        assert!(matches!(
            fx.repo(Some("ana")).get_list("nope"),
            Err(Error::NotFound { kind: "list", .. })
        ));
    }

    #[test]
    fn signed_out_caller_is_rejected_before_lookup() {
        let fx = Fixture::new();
        let repo = fx.repo(None);
        assert_eq!(repo.get_list("ghost"), Err(Error::Unauthenticated));
        assert_eq!(
            repo.update_list("ghost", ListUpdate::touch()),
            Err(Error::Unauthenticated)
        );
        assert_eq!(repo.delete_list("ghost"), Err(Error::Unauthenticated));
    }

    #[test]
    fn update_bumps_updated_at() {
        let fx = Fixture::new();
        let repo = fx.repo(Some("ana"));
        let list = repo.create_list("Gym", None).unwrap();

        fx.clock.advance(chrono::Duration::minutes(10));
        repo.update_list(&list.id, ListUpdate::touch().description(Some("legs".into())))
            .unwrap();

        let after = repo.get_list(&list.id).unwrap();
        assert_eq!(after.description.as_deref(), Some("legs"));
        assert_eq!(after.created_at, list.created_at);
        assert_eq!(after.updated_at, fx.clock.now());
    }

    #[test]
    fn delete_cascades_to_tasks() {
        let fx = Fixture::new();
        let repo = fx.repo(Some("ana"));
        let doomed = repo.create_list("Doomed", None).unwrap();
        let kept = repo.create_list("Kept", None).unwrap();
        for _ in 0..3 {
            fx.add_todo(&doomed.id, "ana");
        }
        fx.add_todo(&kept.id, "ana");

        assert_eq!(repo.delete_list(&doomed.id), Ok(3));
        assert_eq!(fx.store.len(TODOS), 1);
        assert!(matches!(
            repo.get_list(&doomed.id),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn failed_task_cleanup_does_not_fail_delete() {
        let fx = Fixture::new();
        let repo = fx.repo(Some("ana"));
        let list = repo.create_list("Doomed", None).unwrap();
        fx.add_todo(&list.id, "ana");
        fx.add_todo(&list.id, "ana");
        fx.store
            .fail_next(StoreOp::Delete, TODOS, StoreError::Unavailable("flaky".into()));

        assert_eq!(repo.delete_list(&list.id), Ok(1));
        assert_eq!(fx.store.len(TODOS), 1);
        assert_eq!(fx.store.len(LISTS), 0);
    }
}
