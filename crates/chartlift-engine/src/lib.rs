//! chartlift Engine - renders charts into manifests for image discovery
//!
//! This crate provides:
//! - a Go template engine for Helm charts (pest parser, sprig functions)
//! - a MiniJinja renderer with Helm-flavoured filters (toyaml, b64encode, nindent, etc.)
//! - subchart discovery with values scoped per subchart
//! - a synthetic release context (chart name, `fake-namespace-name`)
//! - an implementation of `chartlift_core::ManifestRenderer`

pub mod error;
pub mod filters;
pub mod gotemplate;
pub mod renderer;
pub mod subchart;
pub mod values;

pub use error::{EngineError, Result};
pub use gotemplate::TemplateSet;
pub use renderer::{ChartRenderer, FAKE_NAMESPACE, Flavour, KUBE_VERSION, RendererBuilder};
