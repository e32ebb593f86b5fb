//! GroupMe REST client: posting as the bot and searching group members.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Publishes a message to the group the bot belongs to.
#[async_trait]
pub trait MessagePoster: Send + Sync {
    async fn post(&self, text: &str) -> Result<(), Error>;
}

/// Resolves a nickname to a GroupMe user id.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    /// First member of `group_name` whose nickname is exactly `nickname`.
    /// `Ok(None)` when no such group or member exists.
    async fn find_member(&self, group_name: &str, nickname: &str) -> Result<Option<i64>, Error>;
}

pub struct Client {
    api_key: String,
    api_base: String,
    bot_id: String,
    http: reqwest::Client,
}

/// Every GroupMe response wraps its payload in `{"response": ..., "meta": ...}`.
#[derive(Deserialize)]
struct Envelope<T> {
    response: Option<T>,
}

#[derive(Deserialize)]
struct ApiBot {
    bot_id: String,
    name: String,
}

#[derive(Deserialize)]
struct ApiGroup {
    name: String,
    #[serde(default)]
    members: Vec<ApiMember>,
}

#[derive(Deserialize)]
struct ApiMember {
    user_id: String,
    nickname: String,
}

#[derive(Serialize)]
struct PostRequest<'a> {
    bot_id: &'a str,
    text: &'a str,
}

impl Client {
    pub fn new(api_key: String, api_base: String, bot_id: String) -> Self {
        Self {
            api_key,
            api_base,
            bot_id,
            http: reqwest::Client::new(),
        }
    }

    /// Build a client, looking up the bot id by name when it isn't known.
    pub async fn connect(
        api_key: String,
        api_base: String,
        bot_id: Option<String>,
        bot_name: &str,
    ) -> Result<Self, Error> {
        let mut client = Self::new(api_key, api_base, bot_id.unwrap_or_default());
        if client.bot_id.is_empty() {
            client.bot_id = client.find_bot_id(bot_name).await?;
            info!("Resolved bot '{}' to id {}", bot_name, client.bot_id);
        }
        Ok(client)
    }

    pub fn bot_id(&self) -> &str {
        &self.bot_id
    }

    async fn find_bot_id(&self, bot_name: &str) -> Result<String, Error> {
        let bots: Vec<ApiBot> = self.get("bots", &[]).await?;
        bots.into_iter()
            .find(|b| b.name == bot_name)
            .map(|b| b.bot_id)
            .ok_or_else(|| Error::NotFound(format!("bot '{bot_name}'")))
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, Error> {
        let response = self
            .http
            .get(format!("{}/{}", self.api_base, path))
            .query(&[("token", self.api_key.as_str())])
            .query(query)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api(format!("{status}: {body}")));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        envelope.response.ok_or(Error::Empty)
    }
}

#[async_trait]
impl MessagePoster for Client {
    async fn post(&self, text: &str) -> Result<(), Error> {
        let request = PostRequest { bot_id: &self.bot_id, text };

        let response = self
            .http
            .post(format!("{}/bots/post", self.api_base))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api(format!("{status}: {body}")));
        }

        debug!("Posted: {text}");
        Ok(())
    }
}

#[async_trait]
impl MemberDirectory for Client {
    async fn find_member(&self, group_name: &str, nickname: &str) -> Result<Option<i64>, Error> {
        let groups: Vec<ApiGroup> = self.get("groups", &[("per_page", "100")]).await?;
        pick_member(&groups, group_name, nickname)
    }
}

fn pick_member(groups: &[ApiGroup], group_name: &str, nickname: &str) -> Result<Option<i64>, Error> {
    let Some(group) = groups.iter().find(|g| g.name == group_name) else {
        warn!("Group '{group_name}' not found");
        return Ok(None);
    };

    match group.members.iter().find(|m| m.nickname == nickname) {
        Some(member) => member
            .user_id
            .parse()
            .map(Some)
            .map_err(|_| Error::Parse(format!("user_id '{}' is not numeric", member.user_id))),
        None => Ok(None),
    }
}

#[derive(Debug)]
pub enum Error {
    Http(String),
    Api(String),
    Parse(String),
    NotFound(String),
    Empty,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Api(e) => write!(f, "API error: {e}"),
            Error::Parse(e) => write!(f, "Parse error: {e}"),
            Error::NotFound(what) => write!(f, "Not found: {what}"),
            Error::Empty => write!(f, "Empty response"),
        }
    }
}

impl std::error::Error for Error {}
