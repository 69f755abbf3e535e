use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use crate::models::{UserId, UserInfo};

/// Errors that can occur when talking to the user directory
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Directory returned status {0}")]
    ApiError(u16),

    #[error("User {0} not found in directory")]
    NotFound(UserId),

    #[error("Directory call timed out after {0:?}")]
    Timeout(Duration),

    #[error("User {0} failed a recent directory lookup")]
    RecentMiss(UserId),

    #[error("User directory is not configured")]
    Unavailable,
}

/// Read-only view of the external user directory
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, user_id: UserId) -> Result<UserInfo, DirectoryError>;
}

/// Directory client speaking `GET {base}/api/users/{id}`
pub struct HttpUserDirectory {
    base_url: String,
    client: Client,
    timeout: Duration,
}

impl HttpUserDirectory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, DirectoryError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: base_url.into(),
            client,
            timeout,
        })
    }

    async fn fetch(&self, user_id: UserId) -> Result<UserInfo, DirectoryError> {
        let url = format!(
            "{}/api/users/{}",
            self.base_url.trim_end_matches('/'),
            user_id
        );

        tracing::debug!("Fetching user from directory: {}", url);

        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(DirectoryError::NotFound(user_id));
        }
        if !status.is_success() {
            return Err(DirectoryError::ApiError(status.as_u16()));
        }

        Ok(response.json::<UserInfo>().await?)
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn get_user(&self, user_id: UserId) -> Result<UserInfo, DirectoryError> {
        tokio::time::timeout(self.timeout, self.fetch(user_id))
            .await
            .map_err(|_| DirectoryError::Timeout(self.timeout))?
    }
}

/// In-memory cache in front of another directory
///
/// Successful lookups live for `ttl`. Failed lookups are remembered for
/// `miss_ttl` so a degraded directory is not asked again on every request.
/// The inner call runs on its own task and records its outcome even when
/// the caller gives up waiting.
pub struct CachedDirectory {
    inner: Arc<dyn UserDirectory>,
    cache: moka::future::Cache<UserId, UserInfo>,
    misses: moka::future::Cache<UserId, ()>,
}

impl CachedDirectory {
    pub fn new(inner: Arc<dyn UserDirectory>, capacity: u64, ttl: Duration, miss_ttl: Duration) -> Self {
        let cache = moka::future::CacheBuilder::new(capacity)
            .time_to_live(ttl)
            .build();
        let misses = moka::future::CacheBuilder::new(capacity)
            .time_to_live(miss_ttl)
            .build();

        Self { inner, cache, misses }
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl UserDirectory for CachedDirectory {
    async fn get_user(&self, user_id: UserId) -> Result<UserInfo, DirectoryError> {
        if let Some(info) = self.cache.get(&user_id).await {
            tracing::trace!(user_id, "directory cache hit");
            return Ok(info);
        }
        if self.misses.contains_key(&user_id) {
            tracing::trace!(user_id, "directory recent miss");
            return Err(DirectoryError::RecentMiss(user_id));
        }

        let inner = Arc::clone(&self.inner);
        let cache = self.cache.clone();
        let misses = self.misses.clone();
        let lookup = tokio::spawn(async move {
            match inner.get_user(user_id).await {
                Ok(info) => {
                    cache.insert(user_id, info.clone()).await;
                    Ok(info)
                }
                Err(e) => {
                    misses.insert(user_id, ()).await;
                    Err(e)
                }
            }
        });

        lookup.await.map_err(|e| {
            tracing::warn!(user_id, error = %e, "directory lookup task failed");
            DirectoryError::Unavailable
        })?
    }
}

/// Directory used when no base URL is configured; every lookup fails
pub struct OfflineDirectory;

#[async_trait]
impl UserDirectory for OfflineDirectory {
    async fn get_user(&self, _user_id: UserId) -> Result<UserInfo, DirectoryError> {
        Err(DirectoryError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDirectory {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl UserDirectory for CountingDirectory {
        async fn get_user(&self, user_id: UserId) -> Result<UserInfo, DirectoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(UserInfo {
                id: Some(user_id),
                username: Some("mina".to_string()),
                ..UserInfo::default()
            })
        }
    }

    #[tokio::test]
    async fn test_http_directory_parses_user() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/users/7")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"id":7,"username":"mina","genderType":"FEMALE","unknown":1,
                    "pets":[{"petName":"Bori","breed":"Maltese","age":3}]}"#,
            )
            .create_async()
            .await;

        let directory = HttpUserDirectory::new(server.url(), Duration::from_secs(2)).unwrap();
        let info = directory.get_user(7).await.unwrap();

        mock.assert_async().await;
        assert_eq!(info.username.as_deref(), Some("mina"));
        assert_eq!(info.pets[0].breed.as_deref(), Some("Maltese"));
    }

    #[tokio::test]
    async fn test_http_directory_maps_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/users/8")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/api/users/9")
            .with_status(503)
            .create_async()
            .await;
        server
            .mock("GET", "/api/users/10")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let directory = HttpUserDirectory::new(server.url(), Duration::from_secs(2)).unwrap();

        assert!(matches!(
            directory.get_user(8).await,
            Err(DirectoryError::NotFound(8))
        ));
        assert!(matches!(
            directory.get_user(9).await,
            Err(DirectoryError::ApiError(503))
        ));
        assert!(matches!(
            directory.get_user(10).await,
            Err(DirectoryError::RequestError(_))
        ));
    }

    #[tokio::test]
    async fn test_cached_directory_hits_inner_once() {
        let inner = Arc::new(CountingDirectory {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedDirectory::new(
            inner.clone(),
            100,
            Duration::from_secs(60),
            Duration::from_secs(30),
        );

        cached.get_user(1).await.unwrap();
        cached.get_user(1).await.unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    struct SlowFailingDirectory {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl UserDirectory for SlowFailingDirectory {
        async fn get_user(&self, _user_id: UserId) -> Result<UserInfo, DirectoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            Err(DirectoryError::ApiError(503))
        }
    }

    #[tokio::test]
    async fn test_cached_directory_remembers_failures() {
        let inner = Arc::new(SlowFailingDirectory {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedDirectory::new(
            inner.clone(),
            100,
            Duration::from_secs(60),
            Duration::from_secs(30),
        );

        assert!(matches!(cached.get_user(3).await, Err(DirectoryError::ApiError(503))));
        assert!(matches!(cached.get_user(3).await, Err(DirectoryError::RecentMiss(3))));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cached_directory_records_miss_after_caller_gives_up() {
        let inner = Arc::new(SlowFailingDirectory {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedDirectory::new(
            inner.clone(),
            100,
            Duration::from_secs(60),
            Duration::from_secs(30),
        );

        let abandoned = tokio::time::timeout(Duration::from_millis(10), cached.get_user(4)).await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(matches!(cached.get_user(4).await, Err(DirectoryError::RecentMiss(4))));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_offline_directory_fails() {
        assert!(matches!(
            OfflineDirectory.get_user(1).await,
            Err(DirectoryError::Unavailable)
        ));
    }
}
