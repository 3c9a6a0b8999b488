//! Like and share handling.
//!
//! A like is a record at `posts/{postId}/likes/{userId}`; the post's
//! `metadata.likeCount` caches how many exist. Counters move through the
//! store's atomic increment, and the score is written in the same update,
//! computed from the caller's projected counter rather than a fresh read.
//!
//! Two users toggling the same post at once both land in the counter, but
//! each writes a score derived from its own projection, so the stored score
//! can lag the counter until the next engagement or [`recompute_score`]
//! (score drift). That window is accepted and not corrected here.
//!
//! [`recompute_score`]: EngagementCoordinator::recompute_score

use std::future::Future;

use chrono::Utc;
use log::{debug, warn};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{
    EngagementRecord, LikeOutcome, Post, PostId, PostMetadata, ShareOutcome, UserId,
};
use crate::score::ScoreEngine;
use crate::store::{Document, DocumentStore, FieldUpdate};
use crate::{LIKE_COUNT_FIELD, POSTS, SCORE_FIELD, SHARE_COUNT_FIELD};

pub(crate) fn likes_collection(post_id: &PostId) -> String {
    format!("{POSTS}/{post_id}/likes")
}

pub(crate) fn decode_post(doc: &Document) -> Result<Post> {
    let mut post: Post = doc.decode()?;
    post.id = PostId(doc.id.clone());
    Ok(post)
}

/// Applies engagement actions to posts.
pub struct EngagementCoordinator<S> {
    store: S,
    engine: ScoreEngine,
}

impl<S: DocumentStore> EngagementCoordinator<S> {
    pub fn new(store: S, engine: ScoreEngine) -> Self {
        EngagementCoordinator { store, engine }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn engine(&self) -> &ScoreEngine {
        &self.engine
    }

    pub async fn load_post(&self, post_id: &PostId) -> Result<Post> {
        let doc = self
            .store
            .get_document(POSTS, &post_id.0)
            .await?
            .ok_or_else(|| Error::PostNotFound(post_id.0.clone()))?;
        decode_post(&doc)
    }

    pub async fn is_liked(&self, post_id: &PostId, user_id: &UserId) -> Result<bool> {
        Ok(self
            .store
            .get_document(&likes_collection(post_id), &user_id.0)
            .await?
            .is_some())
    }

    /// Likes `post` for `user_id`, or removes the like if one exists.
    ///
    /// `post` is the caller's last-known copy: the returned count is its
    /// counter plus or minus one, and the persisted score is computed from
    /// that same projection.
    pub async fn toggle_like(&self, post: &Post, user_id: &UserId) -> Result<LikeOutcome> {
        let likes = likes_collection(&post.id);
        let known = post.metadata.like_count;
        let record = self.like_record(post, user_id)?;

        if self.is_liked(&post.id, user_id).await? {
            if !self.store.delete_document(&likes, &user_id.0).await? {
                debug!("Like by {} on {} already removed", user_id, post.id);
                return Ok(LikeOutcome {
                    liked: false,
                    new_like_count: known,
                });
            }
            let projected = known.saturating_sub(1);
            let change = FieldUpdate::decrement_floored(LIKE_COUNT_FIELD, 0);
            let written = self.write_like_count(post, change, projected).await;
            if let Err(err) = written {
                if let Err(undo) = self.store.create_document(&likes, &user_id.0, record).await {
                    warn!("Could not restore like by {} on {}: {}", user_id, post.id, undo);
                }
                return Err(err);
            }
            debug!("{} unliked {} ({} likes)", user_id, post.id, projected);
            Ok(LikeOutcome {
                liked: false,
                new_like_count: projected,
            })
        } else {
            if !self.store.create_document(&likes, &user_id.0, record).await? {
                debug!("Like by {} on {} already recorded", user_id, post.id);
                return Ok(LikeOutcome {
                    liked: true,
                    new_like_count: known,
                });
            }
            let projected = known.saturating_add(1);
            let change = FieldUpdate::increment(LIKE_COUNT_FIELD, 1);
            let written = self.write_like_count(post, change, projected).await;
            if let Err(err) = written {
                if let Err(undo) = self.store.delete_document(&likes, &user_id.0).await {
                    warn!("Could not remove like by {} on {}: {}", user_id, post.id, undo);
                }
                return Err(err);
            }
            debug!("{} liked {} ({} likes)", user_id, post.id, projected);
            Ok(LikeOutcome {
                liked: true,
                new_like_count: projected,
            })
        }
    }

    /// Counts a completed share. Shares are not toggled: every call adds one.
    pub async fn toggle_share(&self, post: &Post) -> Result<ShareOutcome> {
        let projected = post.metadata.share_count.saturating_add(1);
        let metadata = PostMetadata {
            share_count: projected,
            ..post.metadata.clone()
        };
        let updates = vec![
            FieldUpdate::increment(SHARE_COUNT_FIELD, 1),
            FieldUpdate::set(SCORE_FIELD, self.engine.score(&metadata)),
        ];
        self.write_counters(&post.id, updates, SHARE_COUNT_FIELD, projected)
            .await?;
        debug!("{} shared ({} shares)", post.id, projected);
        Ok(ShareOutcome {
            new_share_count: projected,
        })
    }

    /// Waits for an external share to finish and counts it if it did.
    ///
    /// A failed share is logged and yields `Ok(None)` without touching the
    /// store.
    pub async fn share_when_completed<F, E>(
        &self,
        post: &Post,
        completion: F,
    ) -> Result<Option<ShareOutcome>>
    where
        F: Future<Output = std::result::Result<(), E>> + Send,
        E: std::fmt::Display,
    {
        match completion.await {
            Ok(()) => self.toggle_share(post).await.map(Some),
            Err(err) => {
                warn!("Share of {} did not complete: {}", post.id, err);
                Ok(None)
            }
        }
    }

    /// Rewrites the stored score from the stored counters.
    pub async fn recompute_score(&self, post_id: &PostId) -> Result<f64> {
        let post = self.load_post(post_id).await?;
        let score = self.engine.score(&post.metadata);
        self.store
            .update_document(POSTS, &post_id.0, vec![FieldUpdate::set(SCORE_FIELD, score)])
            .await?;
        if post.score != Some(score) {
            debug!("Rescored {} from {:?} to {}", post_id, post.score, score);
        }
        Ok(score)
    }

    fn like_record(&self, post: &Post, user_id: &UserId) -> Result<Value> {
        let record = EngagementRecord {
            user_id: user_id.clone(),
            post_id: post.id.clone(),
            created_at: Utc::now().timestamp_millis(),
        };
        Ok(serde_json::to_value(record)?)
    }

    async fn write_like_count(
        &self,
        post: &Post,
        change: FieldUpdate,
        projected: u64,
    ) -> Result<()> {
        let metadata = PostMetadata {
            like_count: projected,
            ..post.metadata.clone()
        };
        let updates = vec![
            change,
            FieldUpdate::set(SCORE_FIELD, self.engine.score(&metadata)),
        ];
        self.write_counters(&post.id, updates, LIKE_COUNT_FIELD, projected)
            .await
    }

    /// Writes a counter change and its score in one update.
    async fn write_counters(
        &self,
        post_id: &PostId,
        updates: Vec<FieldUpdate>,
        counter: &str,
        projected: u64,
    ) -> Result<()> {
        let doc = self.store.update_document(POSTS, &post_id.0, updates).await?;
        let stored = doc.field(counter).and_then(Value::as_u64);
        if stored != Some(projected) {
            warn!(
                "Score drift on {}: {} is {:?} at the store, score written for {}",
                post_id, counter, stored, projected
            );
        }
        Ok(())
    }
}
