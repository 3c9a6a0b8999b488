use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use dotenv::dotenv;

use crate::error::{Error, Result};
use crate::score::ScoreWeights;
use crate::session::PageSizes;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub score_weights: ScoreWeights,
    pub page_sizes: PageSizes,
    pub author_page_size: usize,
    pub sqlite_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 3030)),
            score_weights: ScoreWeights::default(),
            page_sizes: PageSizes::default(),
            author_page_size: 10,
            sqlite_path: None,
        }
    }
}

impl Config {
    /// Loads the config from a local `.env` file, if present, and the process
    /// environment. Unset variables keep their defaults.
    ///
    /// - `FEED_BIND_ADDRESS`: address the server binds to
    /// - `FEED_SCORE_WEIGHTS`: score weights, e.g. `likes=1,shares=2`
    /// - `FEED_HERO_PAGE_SIZE`, `FEED_PAGE_SIZE`, `FEED_FEATURED_SLOTS`: home feed layout
    /// - `FEED_AUTHOR_PAGE_SIZE`: page size of a user's own posts
    /// - `FEED_SQLITE_PATH`: database file for the SQLite store
    pub fn load_env_config() -> Result<Self> {
        dotenv().ok();
        let defaults = Config::default();
        let config = Config {
            bind_address: var("FEED_BIND_ADDRESS")?.unwrap_or(defaults.bind_address),
            score_weights: var("FEED_SCORE_WEIGHTS")?.unwrap_or(defaults.score_weights),
            page_sizes: PageSizes {
                hero: var("FEED_HERO_PAGE_SIZE")?.unwrap_or(defaults.page_sizes.hero),
                batch: var("FEED_PAGE_SIZE")?.unwrap_or(defaults.page_sizes.batch),
                featured_slots: var("FEED_FEATURED_SLOTS")?
                    .unwrap_or(defaults.page_sizes.featured_slots),
            },
            author_page_size: var("FEED_AUTHOR_PAGE_SIZE")?.unwrap_or(defaults.author_page_size),
            sqlite_path: var("FEED_SQLITE_PATH")?,
        };
        config.page_sizes.validate()?;
        if config.author_page_size == 0 {
            return Err(Error::Config("FEED_AUTHOR_PAGE_SIZE must be at least 1".to_string()));
        }
        Ok(config)
    }
}

fn var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{name}: {e}"))),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(Error::Config(format!("{name}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test uses its own variable names; the process environment is shared.

    #[test]
    fn unset_variable_is_none() {
        assert_eq!(var::<usize>("SCOREFEED_TEST_UNSET").unwrap(), None);
    }

    #[test]
    fn parses_set_variable() {
        env::set_var("SCOREFEED_TEST_SIZE", " 7 ");
        assert_eq!(var::<usize>("SCOREFEED_TEST_SIZE").unwrap(), Some(7));
    }

    #[test]
    fn malformed_variable_is_config_error() {
        env::set_var("SCOREFEED_TEST_BAD", "seven");
        assert!(matches!(
            var::<usize>("SCOREFEED_TEST_BAD"),
            Err(Error::Config(msg)) if msg.starts_with("SCOREFEED_TEST_BAD")
        ));
    }

    #[test]
    fn weights_come_from_text() {
        env::set_var("SCOREFEED_TEST_WEIGHTS", "likes=2,shares=3");
        let weights = var::<ScoreWeights>("SCOREFEED_TEST_WEIGHTS").unwrap().unwrap();
        assert_eq!(weights.weight(crate::score::Signal::Shares), 3.0);
    }
}
