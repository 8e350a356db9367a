//! Trello REST client.
//!
//! Authenticates with the public app key plus a user token passed as query
//! parameters. All calls are blocking.

use chrono::Utc;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;

use super::{BoardApi, RemoteError};
use crate::models::{BoardMeta, Card, CustomField, Label, List, Snapshot};

/// Trello API base URL
pub const TRELLO_API_BASE: &str = "https://trello.com/1";

/// Public application key of this tool
pub const TRELLO_APP_KEY: &str = "fee6885be0783a3f421d5998840da9cb";

/// Token name shown to the user when authorizing, and checked on validation
pub const TOKEN_NAME: &str = "TrelloSA";

/// The Firefox board
pub const DEFAULT_BOARD_ID: &str = "5887b9767bc90fd832e669f8";

const USER_AGENT: &str = concat!("trellosa/", env!("CARGO_PKG_VERSION"));

const SERVICE: &str = "Trello";

/// URL where the user authorizes a new token for this tool.
pub fn generate_token_url(expiration: &str, scope: &str) -> String {
    format!(
        "https://trello.com/1/authorize?key={}&name={}&expiration={}&response_type=token&scope={}",
        TRELLO_APP_KEY, TOKEN_NAME, expiration, scope
    )
}

/// Trello tokens are 64 alphanumeric characters.
pub fn is_plausible_token(token: &str) -> bool {
    token.len() == 64 && token.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Access a token grants on boards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenAccess {
    ReadWrite,
    ReadOnly,
    /// Malformed, unknown, issued for another app, or without board access
    Invalid,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    identifier: String,
    #[serde(default)]
    permissions: Vec<TokenPermission>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenPermission {
    model_type: String,
    #[serde(default)]
    read: bool,
    #[serde(default)]
    write: bool,
}

fn access_from_info(info: &TokenInfo) -> TokenAccess {
    if info.identifier != TOKEN_NAME {
        return TokenAccess::Invalid;
    }
    match info.permissions.iter().find(|p| p.model_type == "Board") {
        Some(p) if p.read && p.write => TokenAccess::ReadWrite,
        Some(p) if p.read => TokenAccess::ReadOnly,
        _ => TokenAccess::Invalid,
    }
}

/// Blocking client for one Trello board.
pub struct TrelloClient {
    agent: ureq::Agent,
    base_url: String,
    token: String,
    board_id: String,
}

impl TrelloClient {
    pub fn with_base_url(
        base_url: impl Into<String>,
        token: impl Into<String>,
        board_id: impl Into<String>,
    ) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(60))
            .user_agent(USER_AGENT)
            .build();
        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            board_id: board_id.into(),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method.trim_start_matches('/'))
    }

    fn get<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, &str)],
    ) -> Result<T, RemoteError> {
        let mut request = self
            .agent
            .get(&self.url(method))
            .query("key", TRELLO_APP_KEY)
            .query("token", &self.token);
        for (k, v) in params {
            request = request.query(k, v);
        }
        let response = request
            .call()
            .map_err(|e| RemoteError::from_ureq(SERVICE, method, e))?;
        response
            .into_json()
            .map_err(|e| RemoteError::Parse(SERVICE, e.to_string()))
    }

    fn keyed<T, F>(
        &self,
        method: &str,
        params: &[(&str, &str)],
        id: F,
    ) -> Result<BTreeMap<String, T>, RemoteError>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> String,
    {
        let items: Vec<T> = self.get(method, params)?;
        Ok(items.into_iter().map(|item| (id(&item), item)).collect())
    }

    /// Check which access the configured token grants.
    pub fn check_token(&self) -> Result<TokenAccess, RemoteError> {
        if !is_plausible_token(&self.token) {
            return Ok(TokenAccess::Invalid);
        }
        match self.get::<TokenInfo>(&format!("/tokens/{}", self.token), &[]) {
            Ok(info) => Ok(access_from_info(&info)),
            Err(RemoteError::NotFound(..)) | Err(RemoteError::Unauthorized(_)) => {
                Ok(TokenAccess::Invalid)
            }
            Err(e) => Err(e),
        }
    }
}

impl BoardApi for TrelloClient {
    fn fetch_board_snapshot(&self) -> Result<Snapshot, RemoteError> {
        let captured_at = Utc::now();
        let board_path = format!("/boards/{}", self.board_id);

        let board: BoardMeta = self.get(&board_path, &[])?;
        let labels = self.keyed(&format!("{}/labels", board_path), &[], |l: &Label| l.id.clone())?;
        let lists = self.keyed(&format!("{}/lists/all", board_path), &[], |l: &List| l.id.clone())?;
        let cards = self.keyed(
            &format!("{}/cards/all", board_path),
            &[("customFieldItems", "true")],
            |c: &Card| c.id.clone(),
        )?;
        let custom_fields = self.keyed(
            &format!("{}/customFields", board_path),
            &[],
            |f: &CustomField| f.id.clone(),
        )?;

        let mut snapshot = Snapshot::new(captured_at);
        snapshot.meta.board = board;
        snapshot.labels = labels;
        snapshot.lists = lists;
        snapshot.cards = cards;
        snapshot.custom_fields = custom_fields;
        Ok(snapshot)
    }

    fn set_custom_field_text(
        &self,
        card_id: &str,
        field_id: &str,
        text: &str,
    ) -> Result<(), RemoteError> {
        let method = format!("/card/{}/customField/{}/item", card_id, field_id);
        self.agent
            .put(&self.url(&method))
            .query("key", TRELLO_APP_KEY)
            .query("token", &self.token)
            .send_json(serde_json::json!({ "value": { "text": text } }))
            .map_err(|e| RemoteError::from_ureq(SERVICE, &method, e))?;
        Ok(())
    }

    fn add_card_label(&self, card_id: &str, label_id: &str) -> Result<(), RemoteError> {
        let method = format!("/cards/{}/idLabels", card_id);
        self.agent
            .post(&self.url(&method))
            .query("key", TRELLO_APP_KEY)
            .query("token", &self.token)
            .query("value", label_id)
            .call()
            .map_err(|e| RemoteError::from_ureq(SERVICE, &method, e))?;
        Ok(())
    }

    fn remove_card_label(&self, card_id: &str, label_id: &str) -> Result<(), RemoteError> {
        let method = format!("/cards/{}/idLabels/{}", card_id, label_id);
        self.agent
            .delete(&self.url(&method))
            .query("key", TRELLO_APP_KEY)
            .query("token", &self.token)
            .call()
            .map_err(|e| RemoteError::from_ureq(SERVICE, &method, e))?;
        Ok(())
    }
}
