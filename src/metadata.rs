//! # Game metadata
//!
//! Cover art comes from IGDB. Access needs a Twitch client-credentials
//! token, which is cached until shortly before it expires. A search returns
//! at most one game, and only games that have a cover.

use std::fs;
use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::logging::Logger;

pub const AUTH_URL: &str = "https://id.twitch.tv/oauth2/token";
pub const API_URL: &str = "https://api.igdb.com/v4";

/// Tokens are treated as expired this long before IGDB says they are.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Cover {
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct GameMetadata {
    #[serde(default)]
    pub id: Option<u64>,
    pub name: String,
    #[serde(default)]
    pub cover: Option<Cover>,
}

impl GameMetadata {
    /// The cover URL, absolute and asking for the 720p variant.
    pub fn cover_url(&self) -> Option<String> {
        let url = &self.cover.as_ref()?.url;
        let url = if url.starts_with("//") {
            format!("https:{}", url)
        } else {
            url.clone()
        };
        Some(url.replace("t_thumb", "t_720p"))
    }
}

pub trait MetadataProvider {
    /// Make sure a usable token is at hand.
    fn authenticate(&mut self) -> bool;

    /// The best match for `name`, if any.
    fn search_game(&mut self, name: &str) -> Option<GameMetadata>;

    /// Save the image at `url` to `dest`.
    fn download_cover(&mut self, url: &str, dest: &Path) -> bool;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

pub fn search_query(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
    format!(
        "search \"{}\"; fields name,cover.url; where cover != null; limit 1;",
        escaped
    )
}

pub struct IgdbClient {
    client_id: String,
    client_secret: String,
    auth_url: String,
    api_url: String,
    agent: ureq::Agent,
    token: Option<(String, Instant)>,
    log: Logger,
}

impl IgdbClient {
    pub fn new(client_id: &str, client_secret: &str, log: Logger) -> Self {
        IgdbClient::with_endpoints(client_id, client_secret, AUTH_URL, API_URL, log)
    }

    pub fn with_endpoints(
        client_id: &str,
        client_secret: &str,
        auth_url: &str,
        api_url: &str,
        log: Logger,
    ) -> Self {
        IgdbClient {
            client_id: client_id.to_owned(),
            client_secret: client_secret.to_owned(),
            auth_url: auth_url.to_owned(),
            api_url: api_url.trim_end_matches('/').to_owned(),
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(30))
                .build(),
            token: None,
            log,
        }
    }

    fn valid_token(&self) -> Option<&str> {
        match &self.token {
            Some((token, expires)) if Instant::now() < *expires => Some(token),
            _ => None,
        }
    }

    fn request_token(&self) -> Result<(String, Instant)> {
        let response: TokenResponse = self
            .agent
            .post(&self.auth_url)
            .query("client_id", &self.client_id)
            .query("client_secret", &self.client_secret)
            .query("grant_type", "client_credentials")
            .call()?
            .into_json()?;
        let issued = Duration::from_secs(response.expires_in);
        // Short-lived tokens keep their full lifetime rather than none.
        let lifetime = match issued.checked_sub(EXPIRY_MARGIN) {
            Some(lifetime) if !lifetime.is_zero() => lifetime,
            _ => issued,
        };
        Ok((response.access_token, Instant::now() + lifetime))
    }

    fn query_games(&self, token: &str, name: &str) -> Result<Option<GameMetadata>> {
        let games: Vec<GameMetadata> = self
            .agent
            .post(&format!("{}/games", self.api_url))
            .set("Client-ID", &self.client_id)
            .set("Authorization", &format!("Bearer {}", token))
            .send_string(&search_query(name))?
            .into_json()?;
        Ok(games.into_iter().next())
    }

    fn fetch_to(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self.agent.get(url).call()?;
        let mut file = fs::File::create(dest)?;
        if let Err(err) = io::copy(&mut response.into_reader(), &mut file) {
            drop(file);
            let _ = fs::remove_file(dest);
            return Err(err.into());
        }
        Ok(())
    }
}

impl MetadataProvider for IgdbClient {
    fn authenticate(&mut self) -> bool {
        let log = self.log.clone();
        log.scope(|| {
            if self.client_id.is_empty() || self.client_secret.is_empty() {
                error!("{}", Error::MissingCredentials);
                return false;
            }
            if self.valid_token().is_some() {
                return true;
            }
            match self.request_token() {
                Ok(token) => {
                    self.token = Some(token);
                    info!("Authenticated with IGDB");
                    true
                }
                Err(err) => {
                    error!(%err, "Failed to authenticate with IGDB");
                    false
                }
            }
        })
    }

    fn search_game(&mut self, name: &str) -> Option<GameMetadata> {
        if !self.authenticate() {
            return None;
        }
        let token = self.token.as_ref()?.0.clone();
        self.log.scope(|| match self.query_games(&token, name) {
            Ok(Some(game)) => {
                debug!(query = name, found = %game.name, "IGDB match");
                Some(game)
            }
            Ok(None) => {
                debug!(query = name, "No IGDB match");
                None
            }
            Err(err) => {
                error!(game = name, %err, "IGDB search failed");
                None
            }
        })
    }

    fn download_cover(&mut self, url: &str, dest: &Path) -> bool {
        self.log.scope(|| match self.fetch_to(url, dest) {
            Ok(()) => true,
            Err(err) => {
                warn!(%url, %err, "Failed to download cover art");
                false
            }
        })
    }
}
