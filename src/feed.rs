use std::convert::Infallible;
use std::sync::Arc;

use env_logger::Env;
use log::{error, info};
use serde::{Deserialize, Serialize};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::config::Config;
use crate::engagement::EngagementCoordinator;
use crate::error::Error;
use crate::models::{PostId, UserId};
use crate::paginator::FeedPaginator;
use crate::score::ScoreEngine;
use crate::store::DocumentStore;

#[derive(Debug, Deserialize)]
struct PageQuery {
    cursor: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LikeRequest {
    user_id: UserId,
}

#[derive(Serialize)]
struct LikeStatus {
    liked: bool,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// The feed core behind an HTTP API.
///
/// - `GET /feed?cursor=&limit=`
/// - `GET /users/{author}/posts?cursor=&limit=`
/// - `GET /posts/{id}/likes/{userId}`
/// - `POST /posts/{id}/like` with `{ "userId": ... }`
/// - `POST /posts/{id}/share`
///
/// Without `limit`, the first feed page uses the hero size and later pages
/// the batch size from [`Config::page_sizes`].
pub struct Feed<S> {
    coordinator: EngagementCoordinator<S>,
    paginator: FeedPaginator<S>,
    config: Config,
}

impl<S: DocumentStore + Clone + 'static> Feed<S> {
    pub fn new(store: S, config: Config) -> Self {
        let engine = ScoreEngine::new(config.score_weights.clone());
        Feed {
            coordinator: EngagementCoordinator::new(store.clone(), engine),
            paginator: FeedPaginator::new(store),
            config,
        }
    }

    pub fn coordinator(&self) -> &EngagementCoordinator<S> {
        &self.coordinator
    }

    pub fn paginator(&self) -> &FeedPaginator<S> {
        &self.paginator
    }

    /// All API routes, with errors already turned into JSON responses.
    pub fn routes(
        self: Arc<Self>,
    ) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
        let state = warp::any().map(move || self.clone());

        let home_feed_route = warp::path!("feed")
            .and(warp::get())
            .and(warp::query::<PageQuery>())
            .and(state.clone())
            .and_then(home_feed::<S>);

        let author_feed_route = warp::path!("users" / String / "posts")
            .and(warp::get())
            .and(warp::query::<PageQuery>())
            .and(state.clone())
            .and_then(author_feed::<S>);

        let like_status_route = warp::path!("posts" / String / "likes" / String)
            .and(warp::get())
            .and(state.clone())
            .and_then(like_status::<S>);

        let toggle_like_route = warp::path!("posts" / String / "like")
            .and(warp::post())
            .and(warp::body::content_length_limit(16 * 1024))
            .and(warp::body::json::<LikeRequest>())
            .and(state.clone())
            .and_then(toggle_like::<S>);

        let toggle_share_route = warp::path!("posts" / String / "share")
            .and(warp::post())
            .and(state)
            .and_then(toggle_share::<S>);

        home_feed_route
            .or(author_feed_route)
            .or(like_status_route)
            .or(toggle_like_route)
            .or(toggle_share_route)
            .recover(handle_rejection)
    }

    /// Serves the API on `config.bind_address`.
    ///
    /// # Panics
    ///
    /// Panics if unable to bind to the configured address.
    pub async fn start(self) {
        env_logger::Builder::from_env(Env::default().default_filter_or("info"))
            .try_init()
            .ok();

        let address = self.config.bind_address;
        let routes = Arc::new(self).routes().with(warp::log::custom(|info| {
            let method = info.method();
            let path = info.path();
            let status = info.status();
            let elapsed = info.elapsed().as_millis();

            if status.is_success() {
                info!(
                    "Method: {}, Path: {}, Status: {}, Elapsed Time: {}ms",
                    method, path, status, elapsed
                );
            } else {
                error!(
                    "Method: {}, Path: {}, Status: {}, Elapsed Time: {}ms",
                    method, path, status, elapsed,
                );
            }
        }));

        info!("Serving feed on {}", address);
        warp::serve(routes).run(address).await
    }
}

async fn home_feed<S: DocumentStore + Clone + 'static>(
    query: PageQuery,
    feed: Arc<Feed<S>>,
) -> Result<impl Reply, Rejection> {
    let sizes = feed.config.page_sizes;
    let limit = query.limit.unwrap_or(match query.cursor {
        None => sizes.hero,
        Some(_) => sizes.batch,
    });
    let page = feed
        .paginator
        .next_page_from(query.cursor.as_deref(), limit)
        .await
        .map_err(warp::reject::custom)?;
    Ok(warp::reply::json(&page))
}

async fn author_feed<S: DocumentStore + Clone + 'static>(
    author: String,
    query: PageQuery,
    feed: Arc<Feed<S>>,
) -> Result<impl Reply, Rejection> {
    let limit = query.limit.unwrap_or(feed.config.author_page_size);
    let page = feed
        .paginator
        .author_page_from(&UserId(author), query.cursor.as_deref(), limit)
        .await
        .map_err(warp::reject::custom)?;
    Ok(warp::reply::json(&page))
}

async fn like_status<S: DocumentStore + Clone + 'static>(
    post_id: String,
    user_id: String,
    feed: Arc<Feed<S>>,
) -> Result<impl Reply, Rejection> {
    let liked = feed
        .coordinator
        .is_liked(&PostId(post_id), &UserId(user_id))
        .await
        .map_err(warp::reject::custom)?;
    Ok(warp::reply::json(&LikeStatus { liked }))
}

async fn toggle_like<S: DocumentStore + Clone + 'static>(
    post_id: String,
    request: LikeRequest,
    feed: Arc<Feed<S>>,
) -> Result<impl Reply, Rejection> {
    let post = feed
        .coordinator
        .load_post(&PostId(post_id))
        .await
        .map_err(warp::reject::custom)?;
    let outcome = feed
        .coordinator
        .toggle_like(&post, &request.user_id)
        .await
        .map_err(warp::reject::custom)?;
    Ok(warp::reply::json(&outcome))
}

async fn toggle_share<S: DocumentStore + Clone + 'static>(
    post_id: String,
    feed: Arc<Feed<S>>,
) -> Result<impl Reply, Rejection> {
    let post = feed
        .coordinator
        .load_post(&PostId(post_id))
        .await
        .map_err(warp::reject::custom)?;
    let outcome = feed
        .coordinator
        .toggle_share(&post)
        .await
        .map_err(warp::reject::custom)?;
    Ok(warp::reply::json(&outcome))
}

async fn handle_rejection(rejection: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if let Some(err) = rejection.find::<Error>() {
        let status = match err {
            Error::PostNotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidPageSize(_) | Error::StaleCursor(_) => StatusCode::BAD_REQUEST,
            Error::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::InvalidDocument(_) | Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, err.to_string())
    } else if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".to_string())
    } else if let Some(err) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, err.to_string())
    } else if let Some(err) = rejection.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, err.to_string())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
    } else {
        error!("Unhandled rejection: {:?}", rejection);
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
    };
    Ok(warp::reply::with_status(
        warp::reply::json(&ErrorBody { error: message }),
        status,
    ))
}
