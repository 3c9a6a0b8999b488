use log::debug;

use crate::error::{Error, Result};
use crate::models::{FeedCursor, LikeOutcome, Post, PostId, ShareOutcome};
use crate::paginator::FeedPaginator;
use crate::store::DocumentStore;

/// Page sizes and layout of a home feed as the client renders it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSizes {
    /// Size of the first page.
    pub hero: usize,
    /// Size of every page after the first.
    pub batch: usize,
    /// Leading items shown in the featured layout instead of the list.
    pub featured_slots: usize,
}

impl Default for PageSizes {
    fn default() -> Self {
        PageSizes {
            hero: 5,
            batch: 3,
            featured_slots: 3,
        }
    }
}

impl PageSizes {
    pub fn validate(&self) -> Result<()> {
        if self.hero == 0 {
            return Err(Error::InvalidPageSize(self.hero));
        }
        if self.batch == 0 {
            return Err(Error::InvalidPageSize(self.batch));
        }
        Ok(())
    }
}

/// The feed one client has loaded so far.
///
/// Every page is appended as-is; the session relies on the cursor protocol
/// rather than deduplicating. Only one `load_more` should be in flight at a
/// time, and debouncing repeated requests is up to the caller.
#[derive(Debug, Clone)]
pub struct FeedSession {
    sizes: PageSizes,
    posts: Vec<Post>,
    cursor: Option<FeedCursor>,
}

impl FeedSession {
    pub fn new(sizes: PageSizes) -> Self {
        FeedSession {
            sizes,
            posts: Vec::new(),
            cursor: None,
        }
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn cursor(&self) -> Option<&FeedCursor> {
        self.cursor.as_ref()
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor.as_ref().is_some_and(FeedCursor::is_end)
    }

    pub fn featured(&self) -> &[Post] {
        let end = self.sizes.featured_slots.min(self.posts.len());
        &self.posts[..end]
    }

    pub fn scrollable(&self) -> &[Post] {
        let start = self.sizes.featured_slots.min(self.posts.len());
        &self.posts[start..]
    }

    /// Fetches the next page and appends it. Returns how many posts were
    /// added; once a page comes back empty the session is exhausted and
    /// later calls return 0 without querying.
    pub async fn load_more<S: DocumentStore>(
        &mut self,
        paginator: &FeedPaginator<S>,
    ) -> Result<usize> {
        if self.is_exhausted() {
            return Ok(0);
        }
        let page_size = match self.cursor {
            None => self.sizes.hero,
            Some(_) => self.sizes.batch,
        };
        let page = paginator.next_page(self.cursor.as_ref(), page_size).await?;
        let added = page.items.len();
        self.posts.extend(page.items);
        self.cursor = Some(page.cursor);
        debug!("Session holds {} posts", self.posts.len());
        Ok(added)
    }

    /// Reflects a completed like in the local copy of the post.
    pub fn apply_like(&mut self, post_id: &PostId, outcome: LikeOutcome) {
        if let Some(post) = self.post_mut(post_id) {
            post.metadata.like_count = outcome.new_like_count;
        }
    }

    pub fn apply_share(&mut self, post_id: &PostId, outcome: ShareOutcome) {
        if let Some(post) = self.post_mut(post_id) {
            post.metadata.share_count = outcome.new_share_count;
        }
    }

    fn post_mut(&mut self, post_id: &PostId) -> Option<&mut Post> {
        self.posts.iter_mut().find(|post| &post.id == post_id)
    }
}
