use provisio::ProviderFactory;
use provisio::aws::testing::SimulatedAws;
use provisio::config::{ProvisioConfig, VendorSettings};
use std::sync::Arc;

pub const REGION: &str = "us-east-1";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[allow(dead_code)]
pub fn aws_config(region: &str) -> ProvisioConfig {
    let mut config = ProvisioConfig::default();
    config.vendors.insert(
        "aws".to_string(),
        VendorSettings {
            region: Some(region.to_string()),
            ..Default::default()
        },
    );
    config
}

/// Factory wired to a simulated AWS account
pub struct TestCloud {
    pub sim: Arc<SimulatedAws>,
    pub factory: ProviderFactory,
}

impl TestCloud {
    pub fn new() -> Self {
        Self::with_config(aws_config(REGION))
    }

    #[allow(dead_code)]
    pub fn with_config(config: ProvisioConfig) -> Self {
        init_tracing();
        let sim = Arc::new(SimulatedAws::new(REGION));
        let factory = ProviderFactory::new(config).with_aws_api(sim.clone());
        Self { sim, factory }
    }
}
