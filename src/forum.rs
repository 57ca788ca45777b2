use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::{error::ForumError, models::UserRecord};

/// ForumService Trait
///
/// The forum-domain modules (users, categories, topics, posts) as seen by the routing
/// layer. Handlers and middleware only ever call through this trait, so the data model
/// stays outside this crate and tests can substitute a stub.
#[async_trait]
pub trait ForumService: Send + Sync {
    // --- Users ---
    async fn get_user(&self, uid: u64) -> Option<UserRecord>;
    // Records activity for the "online users" list.
    async fn update_last_online(&self, uid: u64, at: DateTime<Utc>);
    async fn set_user_picture(&self, uid: u64, url: &str) -> Result<(), ForumError>;
    // Admin export: one row per user.
    async fn users_csv(&self) -> Result<String, ForumError>;

    // --- Categories & topics ---
    async fn get_moderators(&self, cid: u64) -> Result<Vec<UserRecord>, ForumError>;
    async fn topic_slug(&self, tid: u64) -> Option<String>;
    async fn category_slug(&self, cid: u64) -> Option<String>;

    // --- Posts ---
    /// Recent posts visible to `uid`, newest first, indices `start..=stop`. `term` picks
    /// the window ("day", "week" or "month"; anything else means a day).
    async fn get_recent_posts(
        &self,
        uid: u64,
        start: usize,
        stop: usize,
        term: Option<&str>,
    ) -> Result<Vec<Value>, ForumError>;
}

/// ForumState
///
/// The shared handle to the forum service.
pub type ForumState = Arc<dyn ForumService>;

/// MemoryForum
///
/// A small in-process forum used by the standalone binary and by tests. Seed it with the
/// builder methods before sharing it.
#[derive(Default)]
pub struct MemoryForum {
    inner: RwLock<MemoryData>,
}

#[derive(Default)]
struct MemoryData {
    users: BTreeMap<u64, UserRecord>,
    last_online: HashMap<u64, DateTime<Utc>>,
    moderators: HashMap<u64, Vec<u64>>,
    topic_slugs: HashMap<u64, String>,
    category_slugs: HashMap<u64, String>,
    posts: Vec<(DateTime<Utc>, Value)>,
}

impl MemoryForum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: UserRecord) -> Self {
        self.inner.get_mut().users.insert(user.uid, user);
        self
    }

    pub fn with_moderator(mut self, cid: u64, uid: u64) -> Self {
        self.inner.get_mut().moderators.entry(cid).or_default().push(uid);
        self
    }

    pub fn with_topic(mut self, tid: u64, slug: &str) -> Self {
        self.inner.get_mut().topic_slugs.insert(tid, slug.to_string());
        self
    }

    pub fn with_category(mut self, cid: u64, slug: &str) -> Self {
        self.inner.get_mut().category_slugs.insert(cid, slug.to_string());
        self
    }

    pub fn with_post(mut self, at: DateTime<Utc>, post: Value) -> Self {
        self.inner.get_mut().posts.push((at, post));
        self
    }

    pub async fn last_online(&self, uid: u64) -> Option<DateTime<Utc>> {
        self.inner.read().await.last_online.get(&uid).copied()
    }
}

fn recent_window(term: Option<&str>) -> Duration {
    match term {
        Some("week") => Duration::days(7),
        Some("month") => Duration::days(30),
        _ => Duration::days(1),
    }
}

#[async_trait]
impl ForumService for MemoryForum {
    async fn get_user(&self, uid: u64) -> Option<UserRecord> {
        self.inner.read().await.users.get(&uid).cloned()
    }

    async fn update_last_online(&self, uid: u64, at: DateTime<Utc>) {
        self.inner.write().await.last_online.insert(uid, at);
    }

    async fn set_user_picture(&self, uid: u64, url: &str) -> Result<(), ForumError> {
        let mut data = self.inner.write().await;
        let user = data.users.get_mut(&uid).ok_or(ForumError::NotFound)?;
        user.picture = Some(url.to_string());
        Ok(())
    }

    async fn users_csv(&self) -> Result<String, ForumError> {
        let data = self.inner.read().await;
        let mut csv = String::from("uid,username,userslug\n");
        for user in data.users.values() {
            csv.push_str(&format!("{},{},{}\n", user.uid, user.username, user.userslug));
        }
        Ok(csv)
    }

    async fn get_moderators(&self, cid: u64) -> Result<Vec<UserRecord>, ForumError> {
        let data = self.inner.read().await;
        let moderators = data
            .moderators
            .get(&cid)
            .map(|uids| {
                uids.iter()
                    .filter_map(|uid| data.users.get(uid).cloned())
                    .collect()
            })
            .unwrap_or_default();
        Ok(moderators)
    }

    async fn topic_slug(&self, tid: u64) -> Option<String> {
        self.inner.read().await.topic_slugs.get(&tid).cloned()
    }

    async fn category_slug(&self, cid: u64) -> Option<String> {
        self.inner.read().await.category_slugs.get(&cid).cloned()
    }

    async fn get_recent_posts(
        &self,
        _uid: u64,
        start: usize,
        stop: usize,
        term: Option<&str>,
    ) -> Result<Vec<Value>, ForumError> {
        let since = Utc::now() - recent_window(term);
        let data = self.inner.read().await;

        let mut recent: Vec<_> = data.posts.iter().filter(|(at, _)| *at >= since).collect();
        recent.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(recent
            .into_iter()
            .skip(start)
            .take(stop.saturating_sub(start) + 1)
            .map(|(_, post)| post.clone())
            .collect())
    }
}
