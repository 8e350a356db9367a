//! `trellosa setup`: store API tokens or report their status.
//!
//! With `--trello-token` and/or `--bugzilla-token` the tokens are validated
//! (format always, against the services unless `--no-verify`) and written to
//! state.kdl. Without them, the current tokens are reported. Status never
//! touches the network.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Context, Output, json_of};
use crate::config::{Resolved, TrellosaState};
use crate::config::schema::mask_token;
use crate::remote::bugzilla::{api_key_url, is_plausible_api_key};
use crate::remote::trello::{TokenAccess, generate_token_url, is_plausible_token};
use crate::remote::{BugzillaClient, TrelloClient};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenStatus {
    pub service: &'static str,
    pub configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub well_formed: bool,
    /// Where to get a new token
    pub url: String,
}

impl TokenStatus {
    fn of(
        service: &'static str,
        token: Option<&Resolved<String>>,
        well_formed: fn(&str) -> bool,
        url: String,
    ) -> Self {
        Self {
            service,
            configured: token.is_some(),
            source: token.map(|t| t.source.to_string()),
            token: token.map(|t| mask_token(&t.value)),
            well_formed: token.is_some_and(|t| well_formed(&t.value)),
            url,
        }
    }

    fn human(&self) -> String {
        match (&self.token, &self.source) {
            (Some(token), Some(source)) if self.well_formed => {
                format!("{}: {} (from {})", self.service, token, source)
            }
            (Some(token), Some(source)) => format!(
                "{}: {} (from {}) looks malformed, get a new one at {}",
                self.service, token, source, self.url
            ),
            _ => format!(
                "{}: not configured, get a token at {} and pass it to `trellosa setup`",
                self.service, self.url
            ),
        }
    }
}

#[derive(Serialize)]
pub struct SetupResult {
    /// Services whose tokens were written by this run
    pub stored: Vec<&'static str>,
    pub verified: bool,
    pub trello: TokenStatus,
    pub bugzilla: TokenStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_validated_at: Option<DateTime<Utc>>,
    pub state_path: String,
}

impl Output for SetupResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        if !self.stored.is_empty() {
            lines.push(format!(
                "Stored {} token(s) in {}{}",
                self.stored.join(" and "),
                self.state_path,
                if self.verified { "" } else { " without verification" }
            ));
        }
        lines.push(self.trello.human());
        lines.push(self.bugzilla.human());
        if let Some(at) = self.token_validated_at {
            lines.push(format!("Last validated at {}", at.to_rfc3339()));
        }
        lines.join("\n")
    }
}

fn verify_trello(ctx: &Context, token: &str) -> Result<()> {
    let client = TrelloClient::with_base_url(
        &ctx.config.trello_url.value,
        token,
        &ctx.config.board.value,
    );
    match client.check_token()? {
        TokenAccess::ReadWrite => Ok(()),
        TokenAccess::ReadOnly => Err(Error::InvalidInput(
            "Trello token is read-only, triage needs write access".to_string(),
        )),
        TokenAccess::Invalid => Err(Error::InvalidInput("Invalid Trello token".to_string())),
    }
}

fn verify_bugzilla(ctx: &Context, key: &str) -> Result<()> {
    let client = BugzillaClient::new(&ctx.config.bugzilla_url.value, key);
    if client.check_api_key()? {
        Ok(())
    } else {
        Err(Error::InvalidInput("Invalid Bugzilla API key".to_string()))
    }
}

pub fn setup(ctx: &Context, no_verify: bool) -> Result<SetupResult> {
    let mut stored = Vec::new();
    let new_trello = ctx.tokens.trello_token.as_deref();
    let new_bugzilla = ctx.tokens.bugzilla_token.as_deref();

    if new_trello.is_some() || new_bugzilla.is_some() {
        let mut update = TrellosaState::new();
        if let Some(token) = new_trello {
            if !is_plausible_token(token) {
                return Err(Error::InvalidInput(
                    "Trello tokens are 64 alphanumeric characters".to_string(),
                ));
            }
            if !no_verify {
                verify_trello(ctx, token)?;
            }
            update.trello_token = Some(token.to_string());
            stored.push("Trello");
        }
        if let Some(key) = new_bugzilla {
            if !is_plausible_api_key(key) {
                return Err(Error::InvalidInput(
                    "Bugzilla API keys are 31 to 49 alphanumeric characters".to_string(),
                ));
            }
            if !no_verify {
                verify_bugzilla(ctx, key)?;
            }
            update.bugzilla_token = Some(key.to_string());
            stored.push("Bugzilla");
        }
        if !no_verify {
            update.token_validated_at = Some(Utc::now());
        }

        let mut state = ctx.workdir.read_state()?;
        state.merge(&update);
        tracing::info!("Writing new tokens to {}", ctx.workdir.state_path().display());
        ctx.workdir.write_state(&state)?;
    }

    let resolved = ctx.state()?;
    Ok(SetupResult {
        stored,
        verified: !no_verify,
        trello: TokenStatus::of(
            "Trello",
            resolved.trello_token.as_ref(),
            is_plausible_token,
            generate_token_url("never", "read,write"),
        ),
        bugzilla: TokenStatus::of(
            "Bugzilla",
            resolved.bugzilla_token.as_ref(),
            is_plausible_api_key,
            api_key_url(&ctx.config.bugzilla_url.value),
        ),
        token_validated_at: resolved.token_validated_at,
        state_path: ctx.workdir.state_path().display().to_string(),
    })
}
