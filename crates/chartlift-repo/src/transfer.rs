//! Container image pull and save through an OCI registry client

use chartlift_core::{CoreError, ImageReference, ImageTransfer, PulledImage, save_image_tarball};
use oci_distribution::client::Client;
use std::path::Path;
use tokio::runtime::Runtime;

use crate::config::TlsOptions;
use crate::credentials::{DockerConfig, ResolvedCredentials};
use crate::error::{RepoError, Result};
use crate::oci::{create_client, media_types, parse_reference, registry_auth};

/// Pulls images from their registries and writes them as image tarballs
///
/// Without explicit credentials, each registry's entry in the Docker
/// `config.json` is used when present.
pub struct RegistryImageTransfer {
    runtime: Runtime,
    client: Client,
    credentials: Option<ResolvedCredentials>,
}

impl RegistryImageTransfer {
    pub fn new(tls: &TlsOptions, credentials: Option<ResolvedCredentials>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let credentials = match credentials {
            Some(creds) => Some(creds),
            None => match DockerConfig::load(None) {
                Ok(config) => Some(ResolvedCredentials::DockerAuth(config)),
                Err(e) => {
                    tracing::debug!(error = %e, "no docker credentials available");
                    None
                }
            },
        };

        Ok(Self {
            runtime,
            client: create_client(tls)?,
            credentials,
        })
    }

    async fn pull_async(&self, image: &ImageReference) -> Result<PulledImage> {
        let reference = parse_reference(image.as_str())?;
        let auth = registry_auth(self.credentials.as_ref(), reference.resolve_registry());

        let data = self
            .client
            .pull(&reference, &auth, media_types::IMAGE_LAYERS.to_vec())
            .await
            .map_err(|e| RepoError::OciError {
                message: format!("Failed to pull {}: {}", reference, e),
            })?;

        tracing::info!(
            image = %image,
            layers = data.layers.len(),
            "pulled image"
        );

        Ok(PulledImage {
            reference: image.clone(),
            config: data.config.data,
            layers: data.layers.into_iter().map(|l| l.data).collect(),
        })
    }
}

impl ImageTransfer for RegistryImageTransfer {
    fn pull(&self, image: &ImageReference) -> chartlift_core::Result<PulledImage> {
        self.runtime
            .block_on(self.pull_async(image))
            .map_err(|e| CoreError::transfer(image.as_str(), e))
    }

    fn save(&self, image: &PulledImage, path: &Path) -> chartlift_core::Result<()> {
        save_image_tarball(image, path).map_err(|e| CoreError::transfer(image.reference.as_str(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_invalid_reference_is_transfer_error() {
        let transfer = RegistryImageTransfer::new(
            &TlsOptions::default(),
            Some(ResolvedCredentials::Basic {
                username: "robot".into(),
                password: "t".into(),
            }),
        )
        .unwrap();

        let err = transfer
            .pull(&ImageReference::new("Not A Valid Reference"))
            .unwrap_err();
        assert!(matches!(err, CoreError::Transfer { .. }));
    }

    #[test]
    fn test_save_writes_tarball() {
        let transfer = RegistryImageTransfer::new(&TlsOptions::default(), None).unwrap();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("images").join("nginx-1.25.tar");

        let image = PulledImage {
            reference: ImageReference::new("nginx:1.25"),
            config: b"{}".to_vec(),
            layers: vec![b"layer".to_vec()],
        };
        transfer.save(&image, &path).unwrap();

        let mut archive = tar::Archive::new(std::fs::File::open(&path).unwrap());
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().display().to_string())
            .collect();
        assert_eq!(names[0], "manifest.json");
        assert_eq!(names.len(), 3);
    }
}
