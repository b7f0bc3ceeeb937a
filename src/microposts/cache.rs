use super::Micropost;
use crate::db::Db;
use crate::error::ModelError;

/// Explicit cache of one user's microposts (newest first).
///
/// Nothing is loaded implicitly: the cache is empty until [`refresh`] runs,
/// and [`invalidate`] drops whatever was loaded.
///
/// [`refresh`]: MicropostCache::refresh
/// [`invalidate`]: MicropostCache::invalidate
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MicropostCache {
    posts: Option<Vec<Micropost>>,
}

impl MicropostCache {
    /// Loaded posts, or `None` when the cache is cold.
    pub fn get(&self) -> Option<&[Micropost]> {
        self.posts.as_deref()
    }

    pub fn count(&self) -> Option<usize> {
        self.posts.as_ref().map(Vec::len)
    }

    pub fn is_loaded(&self) -> bool {
        self.posts.is_some()
    }

    pub fn invalidate(&mut self) {
        self.posts = None;
    }

    /// Reloads the posts of `user_id` from the store.
    pub async fn refresh(&mut self, db: &Db, user_id: i64) -> Result<&[Micropost], ModelError> {
        let posts = Micropost::find_by_user(db, user_id).await?;
        Ok(self.posts.insert(posts).as_slice())
    }

    /// Records a freshly created post; a cold cache stays cold.
    pub(crate) fn record_created(&mut self, post: Micropost) {
        if let Some(posts) = self.posts.as_mut() {
            posts.insert(0, post);
        }
    }
}
