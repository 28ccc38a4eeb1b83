//! Vendor selection and provider construction

use provisio_cloud::{CloudError, CloudProvider, PollConfig, Result, RetryConfig};
use provisio_cloud_aws::{AwsApi, AwsProvider, AwsSettings};
use provisio_config::{PollSettings, ProvisioConfig, RetrySettings, VendorSettings};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Supported cloud vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vendor {
    Aws,
}

impl Vendor {
    /// Key of the vendor's section in the config file
    pub fn key(&self) -> &'static str {
        match self {
            Vendor::Aws => "aws",
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Vendor {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aws" | "amazon" => Ok(Vendor::Aws),
            _ => Err(CloudError::UnsupportedVendor(s.to_string())),
        }
    }
}

/// Builds provider handles from configuration and registered clients.
///
/// `get` only reads configuration; no vendor is contacted until an
/// operation runs on the returned handle.
pub struct ProviderFactory {
    config: ProvisioConfig,
    aws_api: Option<Arc<dyn AwsApi>>,
}

impl ProviderFactory {
    pub fn new(config: ProvisioConfig) -> Self {
        Self {
            config,
            aws_api: None,
        }
    }

    /// Register the client the AWS backend talks through
    pub fn with_aws_api(mut self, api: Arc<dyn AwsApi>) -> Self {
        self.aws_api = Some(api);
        self
    }

    pub fn config(&self) -> &ProvisioConfig {
        &self.config
    }

    pub fn get(&self, vendor_key: &str) -> Result<Arc<dyn CloudProvider>> {
        let vendor: Vendor = vendor_key.parse()?;
        let settings = self.config.vendor(vendor.key()).ok_or_else(|| {
            CloudError::InvalidConfig(format!("no '{vendor}' section under vendors"))
        })?;

        match vendor {
            Vendor::Aws => self.build_aws(settings),
        }
    }

    fn build_aws(&self, settings: &VendorSettings) -> Result<Arc<dyn CloudProvider>> {
        let region = settings
            .region
            .as_deref()
            .ok_or_else(|| CloudError::InvalidConfig("aws: region is not set".to_string()))?;
        validate_aws_region(region)?;

        if let Some(credentials_ref) = &settings.credentials_ref {
            resolve_credentials_ref(credentials_ref)?;
        }

        let api = self.aws_api.clone().ok_or_else(|| {
            CloudError::InvalidConfig("no client registered for vendor 'aws'".to_string())
        })?;

        let mut aws = AwsSettings::new(region)
            .with_tags(settings.tags.clone())
            .with_poll(poll_config(&self.config.polling))
            .with_retry(retry_config(&self.config.retry));
        if let Some(credentials_ref) = &settings.credentials_ref {
            aws = aws.with_credentials_ref(credentials_ref.as_str());
        }

        tracing::info!(vendor = "aws", region = %region, "provider ready");
        Ok(Arc::new(AwsProvider::new(api, aws)))
    }
}

pub fn poll_config(settings: &PollSettings) -> PollConfig {
    PollConfig {
        initial_interval: settings.initial_interval(),
        max_interval: settings.max_interval(),
        multiplier: settings.multiplier,
        timeout: settings.timeout(),
    }
}

pub fn retry_config(settings: &RetrySettings) -> RetryConfig {
    RetryConfig {
        max_attempts: settings.max_attempts,
        initial_delay: settings.initial_delay(),
        max_delay: settings.max_delay(),
        backoff_multiplier: settings.backoff_multiplier,
        jitter: settings.jitter,
    }
}

/// `us-east-1`, `eu-central-2`, `us-gov-west-1`, ...
fn validate_aws_region(region: &str) -> Result<()> {
    let parts: Vec<&str> = region.split('-').collect();
    let lower = |p: &str| !p.is_empty() && p.chars().all(|c| c.is_ascii_lowercase());

    let well_formed = matches!(parts.len(), 3 | 4)
        && parts[0].len() == 2
        && parts[..parts.len() - 1].iter().all(|&p| lower(p))
        && parts[parts.len() - 1]
            .chars()
            .all(|c| c.is_ascii_digit())
        && !parts[parts.len() - 1].is_empty();

    if well_formed {
        Ok(())
    } else {
        Err(CloudError::InvalidConfig(format!(
            "aws: '{region}' is not a valid region name"
        )))
    }
}

/// Check that a credentials reference points at something that exists
/// (`env:NAME`) or is at least well-formed (`profile:NAME`, `secret:NAME`)
fn resolve_credentials_ref(reference: &str) -> Result<()> {
    let invalid = |message: String| Err(CloudError::InvalidConfig(message));

    match reference.split_once(':') {
        Some(("env", name)) if !name.is_empty() => match std::env::var(name) {
            Ok(value) if !value.is_empty() => Ok(()),
            _ => invalid(format!(
                "credentials_ref '{reference}': environment variable {name} is not set"
            )),
        },
        Some(("profile" | "secret", name)) if !name.trim().is_empty() => Ok(()),
        Some(("env" | "profile" | "secret", _)) => {
            invalid(format!("credentials_ref '{reference}' has an empty name"))
        }
        _ => invalid(format!(
            "credentials_ref '{reference}' must be env:NAME, profile:NAME or secret:NAME"
        )),
    }
}
