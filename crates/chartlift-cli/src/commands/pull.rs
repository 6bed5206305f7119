//! Pull command - fetch charts, package them and save their images

use chartlift_engine::ChartRenderer;
use chartlift_pipeline::{
    Builder, ConsoleChartWriter, ConsoleImagesWriter, FileChartWriter, FileImagesWriter,
    RemoteChartLoader,
};
use chartlift_repo::{
    Credentials, RegistryImageTransfer, RemoteChartSource, Repository, TlsOptions,
};
use clap::Args;
use console::style;
use std::path::PathBuf;
use tempfile::TempDir;

use crate::error::{CliError, Result};

#[derive(Args, Debug)]
pub struct PullArgs {
    /// Chart repository (http(s)://, oci://, file:// or a local directory)
    #[arg(long)]
    pub from_chart_repo: String,

    /// Charts to pull, comma separated (`name` or `name:version`)
    #[arg(long, value_delimiter = ',', required = true)]
    pub from_charts: Vec<String>,

    /// Output directory; without it the report is printed and nothing is kept
    #[arg(long)]
    pub to_dir: Option<PathBuf>,

    /// Keep the unpacked chart files next to each archive
    #[arg(long)]
    pub chart_files_included: bool,

    /// Discover images without pulling them
    #[arg(long)]
    pub dry_run: bool,

    /// Repository username
    #[arg(long, env = "CHARTLIFT_USERNAME")]
    pub username: Option<String>,

    /// Repository password
    #[arg(long, env = "CHARTLIFT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// PEM bundle used to verify the repository and registries
    #[arg(long)]
    pub ca_file: Option<PathBuf>,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure_skip_tls_verify: bool,

    /// Talk to OCI registries over plain HTTP
    #[arg(long)]
    pub plain_http: bool,
}

impl PullArgs {
    fn tls(&self) -> TlsOptions {
        TlsOptions {
            ca_file: self.ca_file.clone(),
            insecure_skip_tls: self.insecure_skip_tls_verify,
            plain_http: self.plain_http,
        }
    }

    fn credentials(&self) -> Result<Option<Credentials>> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => {
                Ok(Some(Credentials::basic(username.as_str(), password.as_str())))
            }
            (None, None) => Ok(None),
            _ => Err(CliError::input_with_help(
                "--username and --password must be given together",
                "set both flags, or CHARTLIFT_USERNAME and CHARTLIFT_PASSWORD",
            )),
        }
    }

    /// An empty `--to-dir` counts as absent
    fn output_dir(&self) -> Option<&PathBuf> {
        self.to_dir
            .as_ref()
            .filter(|dir| !dir.as_os_str().is_empty())
    }
}

pub fn run(args: &PullArgs) -> Result<()> {
    let tls = args.tls();
    let credentials = args.credentials()?.map(|c| c.resolve());

    let repo = Repository::from_url(&args.from_chart_repo)?.with_tls(tls.clone());
    let fetcher = RemoteChartSource::new(repo, credentials)?;

    // Console mode still needs somewhere to unpack the downloads
    let (to_dir, _staging) = match args.output_dir() {
        Some(dir) => (dir.clone(), None),
        None => {
            let staging = TempDir::new()?;
            (staging.path().to_path_buf(), Some(staging))
        }
    };

    tracing::debug!(
        repo = %args.from_chart_repo,
        to_dir = %to_dir.display(),
        charts = args.from_charts.len(),
        "starting pull"
    );

    let builder = Builder::new()
        .with_chart_loader(RemoteChartLoader::new(
            fetcher,
            args.from_charts.iter(),
            &to_dir,
        ))
        .chart_files_included(args.chart_files_included)
        .dry_run(args.dry_run);

    let renderer = ChartRenderer::default();
    let builder = if args.output_dir().is_some() {
        // Image registries authenticate through the docker config, never
        // with the chart repository credentials
        let transfer = RegistryImageTransfer::new(&tls, None)?;
        builder
            .with_chart_writer(FileChartWriter::new(&to_dir))
            .with_images_writer(FileImagesWriter::new(&to_dir, renderer, transfer))
    } else {
        builder
            .with_chart_writer(ConsoleChartWriter)
            .with_images_writer(ConsoleImagesWriter::new(renderer))
    };

    eprintln!(
        "{} Pulling {} from {}",
        style("→").cyan().bold(),
        style(args.from_charts.join(", ")).bold(),
        args.from_chart_repo
    );

    let mut packager = builder.complete()?;
    packager.process()?;

    if let Some(dir) = args.output_dir() {
        eprintln!(
            "{} Saved to {}",
            style("✓").green().bold(),
            style(dir.display()).bold()
        );
    }
    Ok(())
}
