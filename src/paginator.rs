//! Score-ordered feed pages.
//!
//! Pages are cut with a start bound taken from the last item handed out,
//! never with an offset: score descending, then post id ascending. A post
//! whose score rises above the cursor between two calls is not seen again in
//! that pass through the feed, and one that drops below it may be seen
//! twice; the store's ordering is trusted as-is and nothing is re-sorted or
//! deduplicated here.

use log::{debug, warn};

use crate::engagement::decode_post;
use crate::error::{Error, Result};
use crate::models::{FeedCursor, FeedPage, PostId, UserId};
use crate::store::{Direction, DocumentStore, OrderedQuery, SortKey, StartBound};
use crate::{AUTHOR_FIELD, POSTS, SCORE_FIELD};

pub struct FeedPaginator<S> {
    store: S,
}

impl<S: DocumentStore> FeedPaginator<S> {
    pub fn new(store: S) -> Self {
        FeedPaginator { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The `page_size` posts after `cursor`, or from the top of the feed
    /// when there is no cursor. An empty page ends the feed.
    pub async fn next_page(
        &self,
        cursor: Option<&FeedCursor>,
        page_size: usize,
    ) -> Result<FeedPage> {
        self.page(cursor, page_size, None).await
    }

    /// Like [`next_page`](Self::next_page), restricted to one author's posts.
    pub async fn author_page(
        &self,
        author: &UserId,
        cursor: Option<&FeedCursor>,
        page_size: usize,
    ) -> Result<FeedPage> {
        self.page(cursor, page_size, Some(author)).await
    }

    /// Parses a cursor received as text and fetches the page after it. A
    /// cursor that does not parse ends the feed.
    pub async fn next_page_from(
        &self,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<FeedPage> {
        if page_size == 0 {
            return Err(Error::InvalidPageSize(page_size));
        }
        match parse_cursor(cursor) {
            Ok(cursor) => self.next_page(cursor.as_ref(), page_size).await,
            Err(err) => Ok(stale(err)),
        }
    }

    pub async fn author_page_from(
        &self,
        author: &UserId,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<FeedPage> {
        if page_size == 0 {
            return Err(Error::InvalidPageSize(page_size));
        }
        match parse_cursor(cursor) {
            Ok(cursor) => self.author_page(author, cursor.as_ref(), page_size).await,
            Err(err) => Ok(stale(err)),
        }
    }

    async fn page(
        &self,
        cursor: Option<&FeedCursor>,
        page_size: usize,
        author: Option<&UserId>,
    ) -> Result<FeedPage> {
        if page_size == 0 {
            return Err(Error::InvalidPageSize(page_size));
        }
        let mut start = match cursor {
            None => StartBound::At(SortKey::value(f64::INFINITY)),
            Some(FeedCursor::After { score, id }) => {
                StartBound::After(SortKey::new(*score, id.0.as_str()))
            }
            Some(FeedCursor::End) => return Ok(end_of_feed()),
        };

        // An empty page means end of feed, so a run of undecodable posts is
        // stepped over rather than returned as an empty page.
        loop {
            let mut query =
                OrderedQuery::new(SCORE_FIELD, Direction::Descending, page_size).start(start);
            if let Some(author) = author {
                query = query.filter(AUTHOR_FIELD, author.0.as_str());
            }

            let docs = self.store.query_ordered(POSTS, query).await?;
            // The cursor follows the last document returned by the store,
            // even if that document could not be decoded.
            let next = docs.last().and_then(|doc| {
                doc.sort_value(SCORE_FIELD)
                    .map(|score| SortKey::new(score, doc.id.as_str()))
            });
            let Some(next) = next else {
                debug!("Feed exhausted after {:?}", cursor);
                return Ok(end_of_feed());
            };

            let mut items = Vec::with_capacity(docs.len());
            for doc in &docs {
                match decode_post(doc) {
                    Ok(post) => items.push(post),
                    Err(err) => warn!("Skipping undecodable post {}: {}", doc.id, err),
                }
            }
            if items.is_empty() {
                start = StartBound::After(next);
                continue;
            }

            let next_cursor = FeedCursor::After {
                score: next.value,
                id: PostId(next.id.unwrap_or_default()),
            };
            debug!("Served {} posts, next cursor {}", items.len(), next_cursor);
            return Ok(FeedPage {
                items,
                cursor: next_cursor,
            });
        }
    }
}

fn end_of_feed() -> FeedPage {
    FeedPage {
        items: Vec::new(),
        cursor: FeedCursor::End,
    }
}

fn parse_cursor(cursor: Option<&str>) -> Result<Option<FeedCursor>> {
    cursor
        .filter(|c| !c.is_empty())
        .map(str::parse::<FeedCursor>)
        .transpose()
}

fn stale(err: Error) -> FeedPage {
    warn!("{}, treating as end of feed", err);
    end_of_feed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Post;
    use crate::store::{MemoryStore, SetOptions};
    use serde_json::json;

    async fn paginator(posts: &[(&str, f64, &str)]) -> FeedPaginator<MemoryStore> {
        let store = MemoryStore::new();
        for (id, score, author) in posts {
            store
                .set_document(
                    POSTS,
                    id,
                    json!({
                        "id": id,
                        "metadata": { "author": author, "headline": id },
                        "score": score
                    }),
                    SetOptions::default(),
                )
                .await
                .unwrap();
        }
        FeedPaginator::new(store)
    }

    fn ids(items: &[Post]) -> Vec<&str> {
        items.iter().map(|p| p.id.0.as_str()).collect()
    }

    #[tokio::test]
    async fn ties_resolve_by_post_id() {
        let feed = paginator(&[
            ("d", 5.0, "u"),
            ("c", 8.0, "u"),
            ("b", 8.0, "u"),
            ("a", 10.0, "u"),
        ])
        .await;
        let first = feed.next_page(None, 2).await.unwrap();
        assert_eq!(ids(&first.items), ["a", "b"]);
        assert_eq!(
            first.cursor,
            FeedCursor::After {
                score: 8.0,
                id: PostId("b".to_string())
            }
        );

        let second = feed.next_page(Some(&first.cursor), 2).await.unwrap();
        assert_eq!(ids(&second.items), ["c", "d"]);

        let third = feed.next_page(Some(&second.cursor), 2).await.unwrap();
        assert!(third.items.is_empty());
        assert!(third.cursor.is_end());
    }

    #[tokio::test]
    async fn empty_feed_stays_empty() {
        let feed = paginator(&[]).await;
        let page = feed.next_page(None, 5).await.unwrap();
        assert!(page.items.is_empty());
        for _ in 0..3 {
            let again = feed.next_page(Some(&page.cursor), 3).await.unwrap();
            assert!(again.items.is_empty());
            assert!(again.cursor.is_end());
        }
    }

    #[tokio::test]
    async fn zero_page_size_is_rejected() {
        let feed = paginator(&[("a", 1.0, "u")]).await;
        assert!(matches!(
            feed.next_page(None, 0).await,
            Err(Error::InvalidPageSize(0))
        ));
    }

    #[tokio::test]
    async fn garbage_cursor_ends_the_feed() {
        let feed = paginator(&[("a", 1.0, "u")]).await;
        let page = feed.next_page_from(Some("not-a-cursor"), 3).await.unwrap();
        assert!(page.items.is_empty());
        assert!(page.cursor.is_end());

        let page = feed.next_page_from(Some(""), 3).await.unwrap();
        assert_eq!(ids(&page.items), ["a"]);
    }

    #[tokio::test]
    async fn cursor_survives_deleted_anchor() {
        let feed = paginator(&[("a", 3.0, "u"), ("b", 2.0, "u"), ("c", 1.0, "u")]).await;
        let first = feed.next_page(None, 2).await.unwrap();
        feed.store().delete_document(POSTS, "b").await.unwrap();
        let second = feed.next_page(Some(&first.cursor), 2).await.unwrap();
        assert_eq!(ids(&second.items), ["c"]);
    }

    #[tokio::test]
    async fn author_pages_only_hold_that_author() {
        let feed = paginator(&[
            ("a", 9.0, "u1"),
            ("b", 8.0, "u2"),
            ("c", 7.0, "u1"),
            ("d", 6.0, "u1"),
        ])
        .await;
        let author = UserId("u1".to_string());
        let first = feed.author_page(&author, None, 2).await.unwrap();
        assert_eq!(ids(&first.items), ["a", "c"]);
        let second = feed.author_page(&author, Some(&first.cursor), 2).await.unwrap();
        assert_eq!(ids(&second.items), ["d"]);
    }

    #[tokio::test]
    async fn undecodable_post_is_skipped_but_advances_cursor() {
        let feed = paginator(&[("a", 3.0, "u"), ("c", 1.0, "u")]).await;
        feed.store()
            .set_document(POSTS, "b", json!({ "score": 2.0 }), SetOptions::default())
            .await
            .unwrap();
        let first = feed.next_page(None, 2).await.unwrap();
        assert_eq!(ids(&first.items), ["a"]);
        let second = feed.next_page(Some(&first.cursor), 2).await.unwrap();
        assert_eq!(ids(&second.items), ["c"]);
    }

    #[tokio::test]
    async fn page_of_undecodable_posts_does_not_end_the_feed() {
        let feed = paginator(&[("c", 1.0, "u")]).await;
        for (id, score) in [("a", 9.0), ("b", 8.0)] {
            feed.store()
                .set_document(POSTS, id, json!({ "score": score }), SetOptions::default())
                .await
                .unwrap();
        }
        let first = feed.next_page(None, 2).await.unwrap();
        assert_eq!(ids(&first.items), ["c"]);
        assert_eq!(
            first.cursor,
            FeedCursor::After {
                score: 1.0,
                id: PostId("c".to_string())
            }
        );
        let second = feed.next_page(Some(&first.cursor), 2).await.unwrap();
        assert!(second.items.is_empty());
        assert!(second.cursor.is_end());
    }

    #[tokio::test]
    async fn only_undecodable_posts_end_the_feed() {
        let feed = paginator(&[]).await;
        feed.store()
            .set_document(POSTS, "a", json!({ "score": 3.0 }), SetOptions::default())
            .await
            .unwrap();
        let page = feed.next_page(None, 2).await.unwrap();
        assert!(page.items.is_empty());
        assert!(page.cursor.is_end());
    }
}
