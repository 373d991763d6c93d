use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use secrecy::Secret;
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;

use crate::domain::Identity;

/// One page of a user listing. `next_page_token` is `None` on the last page.
#[derive(Debug, Default)]
pub struct IdentityPage {
    pub identities: Vec<Identity>,
    pub next_page_token: Option<String>,
}

/// Anything that can list registered users, one page at a time
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn list_page(
        &self,
        page_token: Option<&str>,
    ) -> Result<IdentityPage, anyhow::Error>;
}

enum Cursor {
    Start,
    Token(String),
    Done,
}

/// Lazy traversal over all pages of an `IdentityProvider`. Pages are only
/// requested when asked for, and the total count is never needed.
pub struct IdentityPages<'a> {
    provider: &'a dyn IdentityProvider,
    cursor: Cursor,
}

impl<'a> IdentityPages<'a> {
    pub fn new(provider: &'a dyn IdentityProvider) -> Self {
        Self {
            provider,
            cursor: Cursor::Start,
        }
    }

    /// `Ok(None)` once every page has been returned
    pub async fn next_page(&mut self) -> Result<Option<Vec<Identity>>, anyhow::Error> {
        let page = match &self.cursor {
            Cursor::Done => return Ok(None),
            Cursor::Start => self.provider.list_page(None).await?,
            Cursor::Token(token) => self.provider.list_page(Some(token)).await?,
        };
        self.cursor = match page.next_page_token {
            // some providers send "" instead of omitting the field
            Some(token) if !token.is_empty() => Cursor::Token(token),
            _ => Cursor::Done,
        };
        Ok(Some(page.identities))
    }
}

/// HTTP client for an Identity Toolkit style `accounts:batchGet` endpoint.
///
/// As with any HTTP client, the underlying `Client` (and its connection pool)
/// should be built once and reused.
pub struct IdentityClient {
    http_client: Client,
    base_url: String,
    project_id: String,
    api_token: Secret<String>,
    page_size: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchGetResponse {
    /// Decoded one by one, see `parse_user`
    #[serde(default)]
    users: Vec<serde_json::Value>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserInfo {
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
    /// milliseconds, sent as a string
    #[serde(deserialize_with = "deserialize_number_from_string")]
    created_at: i64,
    /// JSON object, sent as a string
    custom_attributes: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct CustomAttributes {
    country: Option<String>,
    #[serde(default)]
    marketing_opt_out: bool,
}

impl TryFrom<UserInfo> for Identity {
    type Error = anyhow::Error;
    fn try_from(user: UserInfo) -> Result<Self, Self::Error> {
        let created_at = Identity::created_at_from_millis(user.created_at)
            .with_context(|| format!("creation timestamp out of range: {}", user.created_at))?;
        let attrs: CustomAttributes = match user.custom_attributes.as_deref() {
            None | Some("") => CustomAttributes::default(),
            Some(raw) => serde_json::from_str(raw).context("invalid customAttributes")?,
        };
        Ok(Identity {
            id: user.local_id,
            email: user.email,
            display_name: user.display_name,
            created_at,
            country: attrs.country,
            marketing_opt_out: attrs.marketing_opt_out,
        })
    }
}

fn parse_user(user: serde_json::Value) -> Result<Identity, anyhow::Error> {
    let user: UserInfo = serde_json::from_value(user).context("invalid user record")?;
    Identity::try_from(user)
}

impl IdentityClient {
    pub fn new(
        base_url: String,
        project_id: String,
        api_token: Secret<String>,
        page_size: u32,
        timeout: Duration,
    ) -> Result<Self, anyhow::Error> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .context("could not build identity provider http client")?;
        Ok(Self {
            http_client,
            base_url,
            project_id,
            api_token,
            page_size,
        })
    }
}

#[async_trait]
impl IdentityProvider for IdentityClient {
    #[tracing::instrument(name = "Listing identities", skip(self))]
    async fn list_page(
        &self,
        page_token: Option<&str>,
    ) -> Result<IdentityPage, anyhow::Error> {
        let url = format!(
            "{}/v1/projects/{}/accounts:batchGet",
            self.base_url, self.project_id
        );
        let mut query = vec![("maxResults", self.page_size.to_string())];
        if let Some(token) = page_token {
            query.push(("nextPageToken", token.to_string()));
        }

        let resp: BatchGetResponse = self
            .http_client
            .get(&url)
            .bearer_auth(self.api_token.expose_secret())
            .query(&query)
            .send()
            .await
            .context("could not reach identity provider")?
            .error_for_status()
            .context("identity provider rejected listing request")?
            .json()
            .await
            .context("invalid identity provider response")?;

        // one malformed user must not hide the rest of the page
        let identities = resp
            .users
            .into_iter()
            .filter_map(|user| {
                let id = user
                    .get("localId")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                match parse_user(user) {
                    Ok(identity) => Some(identity),
                    Err(e) => {
                        tracing::warn!(
                            error.cause_chain=?e,
                            user_id=%id,
                            "skipping malformed identity"
                        );
                        None
                    }
                }
            })
            .collect();

        Ok(IdentityPage {
            identities,
            next_page_token: resp.next_page_token,
        })
    }
}
