//! Core E2E testing framework

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    /// Upper bound for a scenario's execute phase
    pub timeout_secs: u64,

    /// Run the cleanup phase after each scenario
    pub cleanup: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            cleanup: true,
        }
    }
}

#[async_trait::async_trait]
pub trait TestScenario: Send + Sync {
    async fn setup(&self) -> Result<()>;
    async fn execute(&self) -> Result<TestMetrics>;
    async fn cleanup(&self) -> Result<()>;

    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn timeout(&self) -> Duration;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestMetrics {
    pub requests_sent: u64,
    pub replies_received: u64,
    pub broker_accepted: u64,
    pub broker_rejected: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub scenario_name: String,
    pub success: bool,
    pub duration: Duration,
    pub error_message: Option<String>,
    pub metrics: TestMetrics,
}

impl TestResult {
    fn failed(name: &str, started: Instant, message: String) -> Self {
        Self {
            scenario_name: name.to_string(),
            success: false,
            duration: started.elapsed(),
            error_message: Some(message),
            metrics: TestMetrics::default(),
        }
    }
}

pub struct TestFramework {
    config: TestConfig,
}

impl TestFramework {
    pub fn new(config: TestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    /// Run setup, execute (bounded by the scenario and config timeouts)
    /// and cleanup. Failures are reported in the result, not returned.
    pub async fn run_scenario(&self, scenario: &dyn TestScenario) -> TestResult {
        info!("Starting test scenario: {}", scenario.name());
        info!("Description: {}", scenario.description());
        let started = Instant::now();

        if let Err(e) = scenario.setup().await {
            error!("Setup failed: {:#}", e);
            return TestResult::failed(scenario.name(), started, format!("Setup failed: {:#}", e));
        }

        let limit = scenario
            .timeout()
            .min(Duration::from_secs(self.config.timeout_secs));
        let result = match tokio::time::timeout(limit, scenario.execute()).await {
            Ok(Ok(metrics)) => TestResult {
                scenario_name: scenario.name().to_string(),
                success: true,
                duration: started.elapsed(),
                error_message: None,
                metrics,
            },
            Ok(Err(e)) => {
                error!("Test execution failed: {:#}", e);
                TestResult::failed(scenario.name(), started, format!("Execution failed: {:#}", e))
            }
            Err(_) => {
                error!("Test execution timed out after {:?}", limit);
                TestResult::failed(scenario.name(), started, "Test execution timed out".into())
            }
        };

        if self.config.cleanup {
            if let Err(e) = scenario.cleanup().await {
                warn!("Cleanup failed: {:#}", e);
            }
        }

        info!(
            "Test scenario completed: {} (success: {})",
            scenario.name(),
            result.success
        );
        result
    }

    pub async fn run_all(&self, scenarios: &[Box<dyn TestScenario>]) -> Vec<TestResult> {
        let mut results = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            results.push(self.run_scenario(scenario.as_ref()).await);
        }
        results
    }
}
