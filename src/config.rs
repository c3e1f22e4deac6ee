use crate::models::{
    catalog::BucketKind,
    profile::{ConnectionProfile, DEFAULT_REGION},
};
use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::env;

const ENV_PREFIX: &str = "STREAMHUB_";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
///
/// `Debug` output never contains the secret access key.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub bucket_kind: BucketKind,
    pub profile: ConnectionProfile,
}

/// Command-line + environment configuration.
#[derive(Parser, Default)]
#[command(author, version, about = "StreamHub catalog and watch-progress service")]
pub struct Args {
    /// Host to bind to (overrides STREAMHUB_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides STREAMHUB_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// S3-compatible endpoint URL; omit for AWS (overrides STREAMHUB_ENDPOINT)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Access key id (overrides STREAMHUB_ACCESS_KEY_ID)
    #[arg(long)]
    pub access_key_id: Option<String>,

    /// Secret access key (overrides STREAMHUB_SECRET_ACCESS_KEY)
    #[arg(long)]
    pub secret_access_key: Option<String>,

    /// Bucket to open at startup (overrides STREAMHUB_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// series, anime or movie (overrides STREAMHUB_BUCKET_KIND)
    #[arg(long)]
    pub bucket_kind: Option<String>,

    /// Signing region (overrides STREAMHUB_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// Progress database URL (overrides STREAMHUB_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::merge(Args::parse(), |name| env::var(name).ok())
    }

    /// Merge parsed flags over values returned by `lookup` for the
    /// `STREAMHUB_*` variables.
    pub fn merge(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}")).filter(|value| !value.trim().is_empty())
        };
        let required = |flag: Option<String>, name: &str| {
            flag.or_else(|| var(name)).ok_or_else(|| {
                anyhow!(
                    "missing {}: pass --{} or set {ENV_PREFIX}{name}",
                    name.to_lowercase().replace('_', " "),
                    name.to_lowercase().replace('_', "-"),
                )
            })
        };

        let port = match args.port {
            Some(port) => port,
            None => match var("PORT") {
                Some(value) => value
                    .parse::<u16>()
                    .with_context(|| format!("parsing {ENV_PREFIX}PORT value `{}`", value))?,
                None => 3000,
            },
        };

        let bucket_kind = match args.bucket_kind.or_else(|| var("BUCKET_KIND")) {
            Some(value) => value
                .parse::<BucketKind>()
                .with_context(|| format!("parsing bucket kind `{}`", value))?,
            None => BucketKind::Series,
        };

        let profile = ConnectionProfile {
            endpoint: args
                .endpoint
                .or_else(|| var("ENDPOINT"))
                .filter(|endpoint| !endpoint.trim().is_empty()),
            access_key_id: required(args.access_key_id, "ACCESS_KEY_ID")?,
            secret_access_key: required(args.secret_access_key, "SECRET_ACCESS_KEY")?,
            bucket: required(args.bucket, "BUCKET")?,
            region: args
                .region
                .or_else(|| var("REGION"))
                .unwrap_or_else(|| DEFAULT_REGION.into()),
        };

        Ok(Self {
            host: args
                .host
                .or_else(|| var("HOST"))
                .unwrap_or_else(|| "127.0.0.1".into()),
            port,
            database_url: args
                .database_url
                .or_else(|| var("DATABASE_URL"))
                .unwrap_or_else(|| "sqlite::memory:".into()),
            bucket_kind,
            profile,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
