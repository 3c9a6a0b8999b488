use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub String);

#[derive(Debug, Clone, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A published post as stored in the `posts` collection.
///
/// `score` is derived from `metadata` by the [`ScoreEngine`](crate::ScoreEngine)
/// and is absent on posts that were never scored. Unscored posts do not show
/// up in ordered feeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(default)]
    pub id: PostId,
    pub metadata: PostMetadata,
    #[serde(default)]
    pub cover_image: CoverImage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMetadata {
    pub author: UserId,
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub share_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverImage {
    #[serde(default)]
    pub cover_image_url: String,
    #[serde(default)]
    pub cover_image_caption: String,
}

/// Marks that `user_id` currently likes `post_id`. Its existence is the
/// source of truth; `metadata.likeCount` only caches the aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementRecord {
    pub user_id: UserId,
    pub post_id: PostId,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
}

/// Position in a score-ordered feed.
///
/// `After` holds the sort key of the last item handed out: the next page
/// starts strictly after it. `End` is returned once a page comes back empty
/// and yields nothing on every later call.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedCursor {
    After { score: f64, id: PostId },
    End,
}

impl FeedCursor {
    pub fn after(post: &Post) -> Option<Self> {
        post.score.map(|score| FeedCursor::After {
            score,
            id: post.id.clone(),
        })
    }

    pub fn is_end(&self) -> bool {
        matches!(self, FeedCursor::End)
    }
}

impl fmt::Display for FeedCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedCursor::After { score, id } => write!(f, "{score}:{id}"),
            FeedCursor::End => f.write_str("end"),
        }
    }
}

impl FromStr for FeedCursor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "end" {
            return Ok(FeedCursor::End);
        }
        // The score never contains ':', the id may.
        let (score, id) = s
            .split_once(':')
            .ok_or_else(|| Error::StaleCursor(s.to_string()))?;
        let score = score
            .parse::<f64>()
            .map_err(|_| Error::StaleCursor(s.to_string()))?;
        if score.is_nan() || id.is_empty() {
            return Err(Error::StaleCursor(s.to_string()));
        }
        Ok(FeedCursor::After {
            score,
            id: PostId(id.to_string()),
        })
    }
}

impl Serialize for FeedCursor {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One page of a feed together with the cursor for the page after it.
#[derive(Debug, Clone, Serialize)]
pub struct FeedPage {
    pub items: Vec<Post>,
    pub cursor: FeedCursor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeOutcome {
    pub liked: bool,
    pub new_like_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareOutcome {
    pub new_share_count: u64,
}
