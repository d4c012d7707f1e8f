use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

use crate::error::{MileageError, MileageResult};

use super::models::UserProfile;

/// key: user-directory -> identity lookup for charge-request listings
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn lookup(&self, user_id: i64) -> MileageResult<UserProfile>;

    /// Profiles keyed by user id. Users the directory has no profile for are
    /// absent from the map. Defaults to one `lookup` per user.
    async fn lookup_many(&self, user_ids: &[i64]) -> MileageResult<HashMap<i64, UserProfile>> {
        Ok(lookup_each(self, user_ids).await)
    }
}

/// Looks every user up concurrently. Failed lookups are logged and left out.
pub async fn lookup_each<D>(directory: &D, user_ids: &[i64]) -> HashMap<i64, UserProfile>
where
    D: UserDirectory + ?Sized,
{
    let lookups = user_ids
        .iter()
        .map(move |&user_id| async move { (user_id, directory.lookup(user_id).await) });

    join_all(lookups)
        .await
        .into_iter()
        .filter_map(|(user_id, result)| match result {
            Ok(profile) => Some((user_id, profile)),
            Err(err) => {
                warn!(?err, user_id, "user directory lookup failed; omitting profile");
                None
            }
        })
        .collect()
}

/// Client for the user service's `GET /api/users/{userId}` and
/// `GET /api/users/list?userIds=` endpoints.
#[derive(Clone)]
pub struct HttpUserDirectory {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryUser {
    user_id: i64,
    #[serde(flatten)]
    profile: UserProfile,
}

impl HttpUserDirectory {
    pub fn new(base_url: impl Into<String>, timeout_ms: u64) -> MileageResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|err| MileageError::Directory(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> MileageResult<T> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|err| MileageError::Directory(format!("GET {url}: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MileageError::Directory(format!(
                "GET {url} returned {status}"
            )));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|err| MileageError::Directory(format!("GET {url}: {err}")))?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn lookup(&self, user_id: i64) -> MileageResult<UserProfile> {
        let url = format!("{}/api/users/{user_id}", self.base_url);
        self.fetch(&url, &[]).await
    }

    async fn lookup_many(&self, user_ids: &[i64]) -> MileageResult<HashMap<i64, UserProfile>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids = user_ids
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}/api/users/list", self.base_url);
        let users: Vec<DirectoryUser> = self.fetch(&url, &[("userIds", ids)]).await?;
        Ok(users
            .into_iter()
            .map(|user| (user.user_id, user.profile))
            .collect())
    }
}
