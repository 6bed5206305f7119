//! OCI Registry client
//!
//! Charts stored as Helm OCI artifacts: `oci://registry/path/<name>:<version>`.
//! NOTE: OCI tags cannot contain `+`, so build metadata is stored with `_`.

use oci_distribution::Reference;
use oci_distribution::client::{
    Certificate, CertificateEncoding, Client, ClientConfig, ClientProtocol,
};
use oci_distribution::secrets::RegistryAuth;

use crate::config::{Repository, TlsOptions};
use crate::credentials::ResolvedCredentials;
use crate::error::{RepoError, Result};
use crate::index::{ChartEntry, best_match, highest_version, is_constraint};

/// Media types for Helm charts and container images in OCI
pub mod media_types {
    /// Helm chart config
    pub const HELM_CONFIG: &str = "application/vnd.cncf.helm.config.v1+json";
    /// Helm chart content layer
    pub const HELM_CONTENT: &str = "application/vnd.cncf.helm.chart.content.v1.tar+gzip";

    /// Docker v2 image layer
    pub const DOCKER_LAYER: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";
    /// Docker foreign (non-distributable) layer
    pub const DOCKER_FOREIGN_LAYER: &str =
        "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip";
    /// OCI gzip image layer
    pub const OCI_LAYER_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";
    /// OCI uncompressed image layer
    pub const OCI_LAYER: &str = "application/vnd.oci.image.layer.v1.tar";

    /// Layer types accepted when pulling container images
    pub const IMAGE_LAYERS: &[&str] = &[DOCKER_LAYER, DOCKER_FOREIGN_LAYER, OCI_LAYER_GZIP, OCI_LAYER];
}

/// Build an OCI client honouring the TLS settings
pub(crate) fn create_client(tls: &TlsOptions) -> Result<Client> {
    let protocol = if tls.plain_http {
        ClientProtocol::Http
    } else {
        ClientProtocol::Https
    };

    let extra_root_certificates = tls
        .ca_certificate()?
        .map(|data| {
            vec![Certificate {
                encoding: CertificateEncoding::Pem,
                data,
            }]
        })
        .unwrap_or_default();

    let config = ClientConfig {
        protocol,
        accept_invalid_certificates: tls.insecure_skip_tls,
        extra_root_certificates,
        ..Default::default()
    };
    Ok(Client::new(config))
}

/// Map resolved credentials to registry auth for one registry host
pub(crate) fn registry_auth(
    credentials: Option<&ResolvedCredentials>,
    registry: &str,
) -> RegistryAuth {
    match credentials.and_then(|c| c.basic_for_registry(registry)) {
        Some((username, password)) => RegistryAuth::Basic(username, password),
        None => RegistryAuth::Anonymous,
    }
}

/// Parse an OCI reference string
///
/// Format: oci://registry/repo:tag or registry/repo:tag
pub fn parse_reference(reference: &str) -> Result<Reference> {
    let clean = reference
        .trim_start_matches("oci://")
        .trim_start_matches("https://")
        .trim_start_matches("http://");

    Reference::try_from(clean).map_err(|e| RepoError::InvalidOciReference {
        reference: format!("{}: {}", reference, e),
    })
}

/// OCI registry client
pub struct OciRegistry {
    repo: Repository,
    client: Client,
    auth: RegistryAuth,
}

impl OciRegistry {
    /// Create a new OCI registry client
    pub fn new(repo: Repository, credentials: Option<ResolvedCredentials>) -> Result<Self> {
        let registry = repo
            .url
            .trim_start_matches("oci://")
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string();
        let auth = registry_auth(credentials.as_ref(), &registry);
        let client = create_client(&repo.tls)?;

        Ok(Self { repo, client, auth })
    }

    pub fn name(&self) -> &str {
        &self.repo.name
    }

    pub fn url(&self) -> &str {
        &self.repo.url
    }

    /// Pull the packaged chart archive for `name:tag`
    pub async fn pull(&self, name: &str, tag: &str) -> Result<Vec<u8>> {
        let reference = self.build_reference(name, tag)?;

        let image_data = self
            .client
            .pull(
                &reference,
                &self.auth,
                vec![media_types::HELM_CONFIG, media_types::HELM_CONTENT],
            )
            .await
            .map_err(|e| RepoError::OciError {
                message: format!("Failed to pull {}: {}", reference, e),
            })?;

        let chart_layer = image_data
            .layers
            .into_iter()
            .find(|l| l.media_type == media_types::HELM_CONTENT)
            .ok_or_else(|| RepoError::OciError {
                message: "No chart content layer found in manifest".to_string(),
            })?;

        Ok(chart_layer.data)
    }

    /// List chart versions published under `name`
    pub async fn list_tags(&self, name: &str) -> Result<Vec<String>> {
        let reference = self.build_reference(name, "latest")?;

        let tags = self
            .client
            .list_tags(&reference, &self.auth, None, None)
            .await
            .map_err(|e| RepoError::OciError {
                message: format!("Failed to list tags: {}", e),
            })?;

        Ok(tags.tags.into_iter().map(|t| t.replace('_', "+")).collect())
    }

    /// Check if a specific tag exists
    pub async fn exists(&self, name: &str, tag: &str) -> Result<bool> {
        let reference = self.build_reference(name, tag)?;

        match self
            .client
            .fetch_manifest_digest(&reference, &self.auth)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let error_str = e.to_string().to_lowercase();
                if error_str.contains("not found")
                    || error_str.contains("manifest unknown")
                    || error_str.contains("404")
                {
                    Ok(false)
                } else {
                    Err(RepoError::OciError {
                        message: e.to_string(),
                    })
                }
            }
        }
    }

    /// Resolve a requested version against the registry's tags
    pub async fn resolve(&self, name: &str, version: Option<&str>) -> Result<ChartEntry> {
        let version = match version {
            Some(exact) if !is_constraint(exact) => {
                if !self.exists(name, exact).await? {
                    return Err(RepoError::VersionNotFound {
                        name: name.to_string(),
                        version: exact.to_string(),
                        repo: self.repo.name.clone(),
                    });
                }
                exact.to_string()
            }
            requested => {
                let tags = self.list_tags(name).await?;
                let picked = match requested {
                    Some(constraint) => best_match(name, tags.iter().map(String::as_str), constraint)?,
                    None => highest_version(tags.iter().map(String::as_str)).ok_or_else(|| {
                        RepoError::ChartNotFound {
                            name: name.to_string(),
                            repo: self.repo.name.clone(),
                        }
                    })?,
                };
                picked.to_string()
            }
        };

        Ok(ChartEntry {
            name: name.to_string(),
            urls: vec![format!(
                "{}/{}:{}",
                self.repo.url.trim_end_matches('/'),
                name,
                version
            )],
            version,
            ..Default::default()
        })
    }

    /// Build an OCI reference from chart name and tag
    fn build_reference(&self, name: &str, tag: &str) -> Result<Reference> {
        // oci://ghcr.io/myorg/charts -> ghcr.io/myorg/charts/name:tag
        let base = self
            .repo
            .url
            .trim_start_matches("oci://")
            .trim_end_matches('/');

        let full_ref = format!("{}/{}:{}", base, name, tag.replace('+', "_"));
        parse_reference(&full_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reference() {
        let reference = parse_reference("oci://ghcr.io/myorg/charts/nginx:1.0.0").unwrap();
        assert_eq!(reference.registry(), "ghcr.io");
        assert_eq!(reference.repository(), "myorg/charts/nginx");
        assert_eq!(reference.tag(), Some("1.0.0"));
    }

    #[test]
    fn test_build_reference_escapes_build_metadata() {
        let repo = Repository::new("r", "oci://registry.example.com/charts/").unwrap();
        let registry = OciRegistry::new(repo, None).unwrap();

        let reference = registry.build_reference("nginx", "1.0.0+build.1").unwrap();
        assert_eq!(reference.registry(), "registry.example.com");
        assert_eq!(reference.repository(), "charts/nginx");
        assert_eq!(reference.tag(), Some("1.0.0_build.1"));
    }

    #[test]
    fn test_registry_auth_mapping() {
        let creds = ResolvedCredentials::Basic {
            username: "u".into(),
            password: "p".into(),
        };
        assert!(matches!(
            registry_auth(Some(&creds), "ghcr.io"),
            RegistryAuth::Basic(u, p) if u == "u" && p == "p"
        ));
        assert!(matches!(
            registry_auth(None, "ghcr.io"),
            RegistryAuth::Anonymous
        ));
    }

    #[test]
    fn test_create_client_plain_http() {
        let tls = TlsOptions {
            plain_http: true,
            insecure_skip_tls: true,
            ..Default::default()
        };
        assert!(create_client(&tls).is_ok());
    }
}
