use crate::{
    error::{Error, Result},
    store::{Document, DocumentStore},
};

/// Who is calling. `None` means nobody is signed in.
pub trait Identity: Send + Sync {
    fn current_user_id(&self) -> Option<String>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(Option<String>);

impl StaticIdentity {
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        StaticIdentity(Some(user_id.into()))
    }

    pub fn anonymous() -> Self {
        StaticIdentity(None)
    }
}

impl Identity for StaticIdentity {
    fn current_user_id(&self) -> Option<String> {
        self.0.clone()
    }
}

pub const OWNER_FIELD: &str = "ownerId";

/// The one authorization check every repository call goes through.
pub struct Access<'a> {
    identity: &'a dyn Identity,
}

impl<'a> Access<'a> {
    pub fn new(identity: &'a dyn Identity) -> Self {
        Access { identity }
    }

    pub fn caller(&self) -> Result<String> {
        self.identity
            .current_user_id()
            .filter(|id| !id.is_empty())
            .ok_or(Error::Unauthenticated)
    }

    /// Checks that `doc` belongs to the caller and returns the caller id.
    pub fn authorize(&self, doc: &Document) -> Result<String> {
        let caller = self.caller()?;
        match doc.str_field(OWNER_FIELD) {
            Some(owner) if owner == caller => Ok(caller),
            _ => Err(Error::PermissionDenied),
        }
    }

    /// Loads a document the caller owns. Nothing is read without a caller.
    pub fn fetch_owned(
        &self,
        store: &dyn DocumentStore,
        collection: &str,
        id: &str,
    ) -> Result<Document> {
        self.caller()?;
        let doc = store.get(collection, id)?;
        self.authorize(&doc)?;
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::FixedClock,
        store::{MemoryStore, StoreOp, StoreError, LISTS},
    };
    use serde_json::json;
    use std::sync::Arc;

    fn doc(owner: Option<&str>) -> Document {
        let fields = match owner {
            Some(owner) => json!({ "ownerId": owner }),
            None => json!({}),
        };
        Document {
            id: "d1".into(),
            fields: fields.as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn anonymous_caller_is_unauthenticated() {
        let identity = StaticIdentity::anonymous();
        let access = Access::new(&identity);
        assert_eq!(access.caller(), Err(Error::Unauthenticated));
        assert_eq!(access.authorize(&doc(Some("ana"))), Err(Error::Unauthenticated));

        let blank = StaticIdentity::signed_in("");
        assert_eq!(Access::new(&blank).caller(), Err(Error::Unauthenticated));
    }

    #[test]
    fn owner_must_match() {
        let identity = StaticIdentity::signed_in("ana");
        let access = Access::new(&identity);
        assert_eq!(access.authorize(&doc(Some("ana"))), Ok("ana".to_string()));
        assert_eq!(access.authorize(&doc(Some("bo"))), Err(Error::PermissionDenied));
        assert_eq!(access.authorize(&doc(None)), Err(Error::PermissionDenied));
    }

    #[test]
    fn fetch_owned_checks_caller_before_reading() {
        let clock = Arc::new(FixedClock::at("2024-05-01T09:00:00Z").unwrap());
        let store = MemoryStore::new(clock);
        let anonymous = StaticIdentity::anonymous();
        // A read would surface this failure; an anonymous caller never gets that far.
        store.fail_next(StoreOp::Get, LISTS, StoreError::Unavailable("down".into()));
        assert_eq!(
            Access::new(&anonymous).fetch_owned(&store, LISTS, "ghost"),
            Err(Error::Unauthenticated)
        );

        let ana = StaticIdentity::signed_in("ana");
        assert_eq!(
            Access::new(&ana).fetch_owned(&store, LISTS, "ghost"),
            Err(Error::StoreUnavailable("down".into()))
        );
    }
}
