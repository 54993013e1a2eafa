//! Per-source HTTP session.
//!
//! A session lives for one source during one search. It spaces out the
//! source's requests, remembers the last exchange (needed to build download
//! headers), and carries whatever the source's authentication produced: a
//! search token, an Authorization token, a passkey or a login cookie.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::SourceSettings;
use crate::definitions::SourceDefinition;
use crate::fetch::{FetchError, FetchRequest, FetchResponse, Fetcher};

use super::types::SearchError;

static CSRF_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"name="_?csrf_token" value="(.*?)""#).unwrap());

/// Credentials configured for a private source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub passkey: Option<String>,
}

impl Credentials {
    pub fn from_settings(settings: Option<&SourceSettings>) -> Self {
        let non_empty = |value: Option<&String>| value.filter(|v| !v.is_empty()).cloned();
        match settings {
            Some(s) => Self {
                username: non_empty(s.username.as_ref()),
                password: non_empty(s.password.as_ref()),
                passkey: non_empty(s.passkey.as_ref()),
            },
            None => Self::default(),
        }
    }
}

/// Request state of one source during one search.
pub struct SourceSession {
    source: Arc<SourceDefinition>,
    fetcher: Arc<dyn Fetcher>,
    credentials: Credentials,
    user_agent: String,
    spacing: Duration,
    requests: u32,
    skip_auth: bool,
    search_token: Option<String>,
    auth_token: Option<String>,
    logged_in: bool,
    last_url: String,
    last_request_headers: Vec<(String, String)>,
}

impl SourceSession {
    pub fn new(
        source: Arc<SourceDefinition>,
        fetcher: Arc<dyn Fetcher>,
        credentials: Credentials,
        user_agent: impl Into<String>,
        spacing: Duration,
        skip_auth: bool,
    ) -> Self {
        Self {
            source,
            fetcher,
            credentials,
            user_agent: user_agent.into(),
            spacing,
            requests: 0,
            skip_auth,
            search_token: None,
            auth_token: None,
            logged_in: false,
            last_url: String::new(),
            last_request_headers: Vec::new(),
        }
    }

    pub fn source(&self) -> &SourceDefinition {
        &self.source
    }

    pub fn fetcher(&self) -> Arc<dyn Fetcher> {
        self.fetcher.clone()
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Authorization token obtained through token auth.
    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    /// Passkey, once the private flow has used it.
    pub fn passkey(&self) -> Option<&str> {
        if self.logged_in && self.source.private {
            self.credentials.passkey.as_deref()
        } else {
            None
        }
    }

    /// Final URL of the last exchange.
    pub fn last_url(&self) -> &str {
        &self.last_url
    }

    pub fn last_request_headers(&self) -> &[(String, String)] {
        &self.last_request_headers
    }

    /// Attach the Authorization token, if any, to a request.
    pub fn authorize_request(&self, request: FetchRequest) -> FetchRequest {
        match &self.auth_token {
            Some(token) => request.header("Authorization", token.clone()),
            None => request,
        }
    }

    /// Issue a request, pausing first when it is not the session's first.
    pub async fn open(&mut self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        self.requests += 1;
        if self.requests > 1 && !self.spacing.is_zero() {
            tokio::time::sleep(self.spacing).await;
        }
        let request = self
            .authorize_request(request)
            .response_charset(self.source.response_charset.clone());
        let response = self.fetcher.fetch(request).await?;
        self.last_url = response.url.clone();
        self.last_request_headers = response.request_headers.clone();
        Ok(response)
    }

    /// Run the source's authentication steps and fill the credential
    /// placeholders of a search URL.
    ///
    /// Steps that already succeeded earlier in the session are not
    /// repeated. A failed login ends the source's search.
    pub async fn prepare_url(&mut self, url: &str) -> Result<String, SearchError> {
        let mut url = url.to_string();
        let source = self.source.clone();

        if let Some(initial) = &source.auth.initial_url {
            let initial = if initial.starts_with("http") {
                initial.clone()
            } else {
                format!("{}{}", source.root_url, initial)
            };
            debug!(source = %source.id, url = %initial, "Opening initial page");
            if let Err(e) = self.open(FetchRequest::get(initial)).await {
                warn!(source = %source.id, error = %e, "Initial page request failed");
            }
        }

        url = self.apply_search_token(url).await;

        if self.logged_in {
            debug!(source = %source.id, "Reusing previous login");
        } else if self.auth_token.is_some() {
            debug!(source = %source.id, "Reusing previous token authorization");
        } else if source.private {
            url = self.authenticate(url).await?;
        }
        Ok(url)
    }

    async fn apply_search_token(&mut self, url: String) -> String {
        if let Some(token) = &self.search_token {
            return url.replace("TOKEN", token);
        }
        let Some(path) = self.source.auth.token.clone() else {
            return url;
        };

        let token_url = format!("{}{}", self.source.base_url, path);
        debug!(source = %self.source.id, url = %token_url, "Requesting search token");
        let token = match self.open(FetchRequest::get(token_url)).await {
            Ok(response) => json_token(&response.body),
            Err(e) => {
                warn!(source = %self.source.id, error = %e, "Search token request failed");
                None
            }
        };
        match token {
            Some(token) => {
                let url = url.replace("TOKEN", &token);
                self.search_token = Some(token);
                url
            }
            None => {
                warn!(source = %self.source.id, "Unable to get search token");
                url
            }
        }
    }

    async fn authenticate(&mut self, mut url: String) -> Result<String, SearchError> {
        let source = self.source.clone();
        let credentials = self.credentials.clone();
        let recipe = &source.auth;

        if let Some(username) = &credentials.username {
            url = url.replace("USERNAME", username);
        }

        if let Some(passkey) = &credentials.passkey {
            self.logged_in = true;
            return Ok(url.replace("PASSKEY", passkey));
        }

        if recipe.login_object.is_empty() {
            return Ok(url);
        }

        let username = credentials.username.clone().unwrap_or_default();
        let password = credentials.password.clone().unwrap_or_default();
        let mut form: Vec<(String, String)> = recipe
            .login_object
            .iter()
            .map(|(k, v)| (k.clone(), v.replace("USERNAME", &username).replace("PASSWORD", &password)))
            .collect();
        let mut logged_in = self.skip_auth;

        if recipe.csrf_token {
            let login_url = format!(
                "{}{}",
                source.root_url,
                recipe.login_path.as_deref().unwrap_or_default()
            );
            match self.open(FetchRequest::get(login_url)).await {
                Ok(response) if !response.body.is_empty() => {
                    match CSRF_FIELD.captures(&response.body) {
                        Some(caps) => {
                            let token = caps[1].to_string();
                            for (_, value) in form.iter_mut() {
                                *value = value.replace("CSRF_TOKEN", &token);
                            }
                        }
                        // No form means the stored cookies are still valid.
                        None => logged_in = true,
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(source = %source.id, error = %e, "Login page request failed"),
            }
        }

        if let Some(path) = &recipe.token_auth {
            let token_url = format!("{}{}", source.root_url, path);
            let response = self
                .open(FetchRequest::post(token_url, form))
                .await
                .map_err(|e| SearchError::AuthFailed(e.to_string()))?;
            if !response.is_ok() {
                return Err(SearchError::AuthFailed(format!(
                    "token authorization returned status {}",
                    response.status
                )));
            }
            let token = json_token(&response.body).ok_or_else(|| {
                SearchError::AuthFailed("token authorization returned no token".to_string())
            })?;
            info!(source = %source.id, "Token authorization successful");
            self.auth_token = Some(token);
            return Ok(url);
        }

        if !logged_in {
            self.login(form).await?;
            info!(source = %source.id, "Login successful");
        }
        self.logged_in = true;
        Ok(url)
    }

    async fn login(&mut self, form: Vec<(String, String)>) -> Result<(), SearchError> {
        let source = self.source.clone();
        let recipe = &source.auth;
        let path = recipe.login_path.clone().unwrap_or_default();
        let url = if path.starts_with("http") {
            path
        } else {
            format!("{}{}", source.root_url, path)
        };

        let request = FetchRequest::post(url, form).headers(recipe.login_headers.iter().cloned());
        let response = self
            .open(request)
            .await
            .map_err(|e| SearchError::AuthFailed(e.to_string()))?;

        if !response.is_ok() {
            warn!(source = %source.id, status = response.status, "Login failed");
            return Err(SearchError::AuthFailed(format!("login returned status {}", response.status)));
        }
        if let Some(marker) = recipe.login_failed.as_deref().filter(|m| !m.is_empty()) {
            if response.body.contains(marker) {
                warn!(source = %source.id, "Login rejected, wrong username or password");
                return Err(SearchError::AuthFailed("wrong username or password".to_string()));
            }
        }
        Ok(())
    }
}

/// `token` member of a JSON body.
fn json_token(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("token")? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}
