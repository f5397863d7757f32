use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo::{StoreError, StoreResult, UserStore};
use super::repo_types::{NewUser, User};

/// In-process `UserStore` enforcing the same unique indexes as the SQL schema.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops a user record, simulating deletion after tokens were issued.
    pub fn remove(&self, id: Uuid) {
        self.users.lock().unwrap().remove(&id);
    }

    fn update<F>(&self, id: Uuid, f: F) -> StoreResult<Option<User>>
    where
        F: FnOnce(&mut User),
    {
        let mut users = self.users.lock().unwrap();
        Ok(users.get_mut(&id).map(|u| {
            f(u);
            u.updated_at = OffsetDateTime::now_utc();
            u.clone()
        }))
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_login(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> StoreResult<Option<User>> {
        let users = self.users.lock().unwrap();
        Ok(users
            .values()
            .find(|u| username == Some(u.username.as_str()) || email == Some(u.email.as_str()))
            .cloned())
    }

    async fn create(&self, new: NewUser) -> StoreResult<User> {
        let mut users = self.users.lock().unwrap();
        if users
            .values()
            .any(|u| u.username == new.username || u.email == new.email)
        {
            return Err(StoreError::Conflict("Username or email already taken".into()));
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            username: new.username,
            email: new.email,
            full_name: new.full_name,
            avatar: new.avatar,
            cover_image: new.cover_image,
            password_hash: new.password_hash,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> StoreResult<bool> {
        let token = token.map(str::to_owned);
        Ok(self.update(id, |u| u.refresh_token = token)?.is_some())
    }

    async fn set_password_hash(&self, id: Uuid, hash: &str) -> StoreResult<bool> {
        Ok(self
            .update(id, |u| u.password_hash = hash.to_owned())?
            .is_some())
    }

    async fn update_account(
        &self,
        id: Uuid,
        full_name: &str,
        email: &str,
    ) -> StoreResult<Option<User>> {
        // conflict check and write share one lock
        let mut users = self.users.lock().unwrap();
        if users.values().any(|u| u.id != id && u.email == email) {
            return Err(StoreError::Conflict("Username or email already taken".into()));
        }
        Ok(users.get_mut(&id).map(|u| {
            u.full_name = full_name.to_owned();
            u.email = email.to_owned();
            u.updated_at = OffsetDateTime::now_utc();
            u.clone()
        }))
    }

    async fn set_avatar(&self, id: Uuid, url: &str) -> StoreResult<Option<User>> {
        self.update(id, |u| u.avatar = url.to_owned())
    }

    async fn set_cover_image(&self, id: Uuid, url: &str) -> StoreResult<Option<User>> {
        self.update(id, |u| u.cover_image = Some(url.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            full_name: "Test User".into(),
            avatar: "https://cdn.local/a.png".into(),
            cover_image: None,
            password_hash: "hash".into(),
        }
    }

    #[tokio::test]
    async fn enforces_unique_username_and_email() {
        let store = MemoryUserStore::new();
        store.create(new_user("bob", "bob@example.com")).await.unwrap();

        let dup_name = store.create(new_user("bob", "other@example.com")).await;
        assert!(matches!(dup_name, Err(StoreError::Conflict(_))));

        let dup_email = store.create(new_user("other", "bob@example.com")).await;
        assert!(matches!(dup_email, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn find_by_login_matches_either_field() {
        let store = MemoryUserStore::new();
        let bob = store.create(new_user("bob", "bob@example.com")).await.unwrap();

        let by_name = store.find_by_login(Some("bob"), None).await.unwrap();
        assert_eq!(by_name.map(|u| u.id), Some(bob.id));

        let by_email = store.find_by_login(None, Some("bob@example.com")).await.unwrap();
        assert_eq!(by_email.map(|u| u.id), Some(bob.id));

        assert!(store.find_by_login(None, None).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_email_updates_never_duplicate() {
        let store = std::sync::Arc::new(MemoryUserStore::new());
        let a = store.create(new_user("amy", "amy@example.com")).await.unwrap();
        let b = store.create(new_user("ben", "ben@example.com")).await.unwrap();

        for i in 0..50 {
            let email = format!("shared{}@example.com", i);
            let tasks: Vec<_> = [a.id, b.id]
                .into_iter()
                .map(|id| {
                    let store = store.clone();
                    let email = email.clone();
                    tokio::spawn(async move { store.update_account(id, "Name", &email).await })
                })
                .collect();

            let mut won = 0;
            for task in tasks {
                match task.await.unwrap() {
                    Ok(Some(_)) => won += 1,
                    Err(StoreError::Conflict(_)) => {}
                    other => panic!("unexpected {:?}", other.map(|u| u.map(|u| u.id))),
                }
            }
            assert_eq!(won, 1, "exactly one writer may claim {}", email);
        }
    }

    #[tokio::test]
    async fn update_account_keeps_own_email_and_reports_missing_user() {
        let store = MemoryUserStore::new();
        let amy = store.create(new_user("amy", "amy@example.com")).await.unwrap();

        let same = store.update_account(amy.id, "Amy A", "amy@example.com").await.unwrap();
        assert_eq!(same.map(|u| u.full_name).as_deref(), Some("Amy A"));

        let missing = store.update_account(Uuid::new_v4(), "X", "x@example.com").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn set_refresh_token_on_missing_user_reports_false() {
        let store = MemoryUserStore::new();
        assert!(!store.set_refresh_token(Uuid::new_v4(), Some("t")).await.unwrap());
    }
}
