//! Registry credentials and a redirect-safe HTTP client
//!
//! Key security features:
//! - Credentials only sent below the repository URL they were given for
//! - NEVER sends credentials after cross-origin redirect
//! - Docker `config.json` lookup for image registries

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use url::Url;

use crate::config::TlsOptions;
use crate::error::{RepoError, Result};

/// Username and password given for the chart repository
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn resolve(&self) -> ResolvedCredentials {
        ResolvedCredentials::Basic {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

/// Resolved credentials ready for use
#[derive(Debug, Clone)]
pub enum ResolvedCredentials {
    Basic { username: String, password: String },
    DockerAuth(DockerConfig),
}

impl ResolvedCredentials {
    /// Get authorization header value for a URL
    pub fn auth_header(&self, url: &str) -> Option<String> {
        match self {
            ResolvedCredentials::Basic { username, password } => {
                Some(format!("Basic {}", encode_basic(username, password)))
            }
            ResolvedCredentials::DockerAuth(config) => {
                let host = Url::parse(url).ok()?.host_str()?.to_string();
                config
                    .basic_for_registry(&host)
                    .map(|(u, p)| format!("Basic {}", encode_basic(&u, &p)))
            }
        }
    }

    /// Username/password pair for a registry host, if these credentials have one
    pub fn basic_for_registry(&self, registry: &str) -> Option<(String, String)> {
        match self {
            ResolvedCredentials::Basic { username, password } => {
                Some((username.clone(), password.clone()))
            }
            ResolvedCredentials::DockerAuth(config) => config.basic_for_registry(registry),
        }
    }
}

fn encode_basic(username: &str, password: &str) -> String {
    base64::Engine::encode(
        &base64::engine::general_purpose::STANDARD,
        format!("{}:{}", username, password),
    )
}

/// Docker config.json format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DockerConfig {
    #[serde(default)]
    pub auths: HashMap<String, DockerAuth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerAuth {
    #[serde(default)]
    pub auth: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl DockerConfig {
    /// Load Docker config from the given path or `~/.docker/config.json`
    ///
    /// A missing file yields an empty config.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let home = dirs::home_dir().ok_or_else(|| RepoError::AuthFailed {
                    message: "Could not determine home directory".to_string(),
                })?;
                home.join(".docker").join("config.json")
            }
        };

        if !config_path.exists() {
            return Ok(DockerConfig::default());
        }

        let content = std::fs::read_to_string(&config_path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Username/password for a registry host
    pub fn basic_for_registry(&self, registry: &str) -> Option<(String, String)> {
        let mut candidates = vec![
            registry.to_string(),
            format!("https://{}", registry),
            format!("http://{}", registry),
        ];
        if matches!(
            registry,
            "docker.io" | "index.docker.io" | "registry-1.docker.io"
        ) {
            candidates.push("https://index.docker.io/v1/".to_string());
        }

        let auth = candidates.iter().find_map(|c| self.auths.get(c))?;
        if let (Some(u), Some(p)) = (&auth.username, &auth.password) {
            return Some((u.clone(), p.clone()));
        }

        let encoded = auth.auth.as_ref()?;
        let decoded =
            base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (user, pass) = decoded.split_once(':')?;
        Some((user.to_string(), pass.to_string()))
    }
}

/// Check if two URLs are same-origin (for redirect safety)
pub fn same_origin(url1: &str, url2: &str) -> bool {
    match (Url::parse(url1), Url::parse(url2)) {
        (Ok(u1), Ok(u2)) => {
            u1.scheme() == u2.scheme()
                && u1.host() == u2.host()
                && u1.port_or_known_default() == u2.port_or_known_default()
        }
        _ => false,
    }
}

/// Secure HTTP client wrapper with redirect protection
pub struct SecureHttpClient {
    client: reqwest::Client,
    /// Credentials and the URL prefix they are valid for
    credentials: Option<(String, ResolvedCredentials)>,
}

impl SecureHttpClient {
    /// Create a new secure HTTP client without credentials
    pub fn new(tls: &TlsOptions) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            // Redirects are followed by hand so credentials never leak cross-origin
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(30))
            .danger_accept_invalid_certs(tls.insecure_skip_tls);

        if let Some(pem) = tls.ca_certificate()? {
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| RepoError::InvalidTls {
                message: e.to_string(),
            })?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder.build().map_err(|e| RepoError::NetworkError {
            message: e.to_string(),
        })?;

        Ok(Self {
            client,
            credentials: None,
        })
    }

    /// Create without credentials (public repos)
    pub fn public() -> Result<Self> {
        Self::new(&TlsOptions::default())
    }

    /// Send `credentials` to URLs below `scope`
    pub fn with_credentials(mut self, scope: &str, credentials: ResolvedCredentials) -> Self {
        self.credentials = Some((scope.trim_end_matches('/').to_string(), credentials));
        self
    }

    /// Credentials for a URL, if it lies below the credential scope
    fn credentials_for(&self, url: &str) -> Option<&ResolvedCredentials> {
        self.credentials
            .as_ref()
            .filter(|(scope, _)| url.starts_with(scope.as_str()) && same_origin(scope, url))
            .map(|(_, creds)| creds)
    }

    /// Fetch a URL with secure redirect handling
    ///
    /// SECURITY: Credentials are NEVER sent after cross-origin redirects
    pub async fn get(&self, url: &str) -> Result<reqwest::Response> {
        self.get_with_redirects(url, 10).await
    }

    async fn get_with_redirects(&self, url: &str, max_redirects: u32) -> Result<reqwest::Response> {
        let mut current_url = url.to_string();
        let mut redirects = 0;

        loop {
            let mut request = self.client.get(&current_url);

            if same_origin(url, &current_url) {
                if let Some(auth) = self
                    .credentials_for(&current_url)
                    .and_then(|creds| creds.auth_header(&current_url))
                {
                    request = request.header("Authorization", auth);
                }
            } else {
                tracing::warn!(
                    "Cross-origin redirect from {} to {} - credentials not forwarded",
                    url,
                    current_url
                );
            }

            let response = request.send().await?;
            let status = response.status();

            if status.is_redirection() {
                redirects += 1;
                if redirects > max_redirects {
                    return Err(RepoError::NetworkError {
                        message: format!("Too many redirects (max {})", max_redirects),
                    });
                }

                let location = response
                    .headers()
                    .get("Location")
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| RepoError::NetworkError {
                        message: "Redirect without Location header".to_string(),
                    })?;

                let base = Url::parse(&current_url)?;
                current_url = base.join(location)?.to_string();
                continue;
            }

            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Err(RepoError::AuthRequired { url: current_url });
            }
            if status == reqwest::StatusCode::FORBIDDEN {
                return Err(RepoError::AuthFailed {
                    message: format!("Access denied to {}", current_url),
                });
            }
            if !status.is_success() {
                return Err(RepoError::HttpError {
                    status: status.as_u16(),
                    message: format!("Request to {} failed", current_url),
                });
            }

            return Ok(response);
        }
    }

    /// Fetch bytes from URL
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.get(url).await?;
        let bytes = response.bytes().await.map_err(|e| RepoError::NetworkError {
            message: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}
