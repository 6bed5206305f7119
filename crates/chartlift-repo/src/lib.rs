//! chartlift Repository Access
//!
//! This crate connects a run to the outside world:
//!
//! - **HTTP repositories**: Helm-style repos with index.yaml
//! - **OCI registries**: charts stored as Helm OCI artifacts
//! - **Local file repositories**: a directory of packaged `.tgz` charts
//! - **Image transfer**: pulling container images and saving them as tarballs
//!
//! `RemoteChartSource` and `RegistryImageTransfer` implement the blocking
//! capability traits from `chartlift-core` on top of the async clients.
//!
//! ## Security Notes
//!
//! - Credentials are NEVER sent after cross-origin redirects
//! - Chart archives are verified against the index digest when one is published

pub mod backend;
pub mod config;
pub mod credentials;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod index;
pub mod oci;
pub mod transfer;

pub use backend::{ChartSource, create_source};
pub use config::{Repository, RepositoryType, TlsOptions};
pub use credentials::{
    Credentials, DockerConfig, ResolvedCredentials, SecureHttpClient, same_origin,
};
pub use error::{RepoError, Result};
pub use fetcher::RemoteChartSource;
pub use http::HttpRepository;
pub use index::{ChartEntry, ChartIndex};
pub use oci::OciRegistry;
pub use transfer::RegistryImageTransfer;
