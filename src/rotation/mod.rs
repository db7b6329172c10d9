//! Credential rotation loop.
//!
//! A perpetual background task that watches the account pool and, when the
//! serving credential goes stale, hands the next healthy credential to the
//! deployer. Each cycle is isolated: whatever fails inside it is logged,
//! the next wait is shortened, and the loop carries on. Only process
//! shutdown stops it.

use std::time::Duration;

use crate::config::RotationConfig;
use crate::store::{Account, BearerToken, SharedStore};

/// Makes a credential the live one for the serving instance, e.g. by
/// restarting a container with new environment. Invoked once per rotation
/// decision; the outcome is success or failure only.
pub trait Deployer {
    fn deploy(
        &self,
        bearer_token: &BearerToken,
        config_id: &str,
    ) -> impl std::future::Future<Output = Result<(), DeployError>> + Send;
}

/// Deployment errors.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("Failed to spawn deploy command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Deploy command exited with {status}")]
    Failed { status: std::process::ExitStatus },
}

/// Runs a configured shell command with the credential exported in its
/// environment. The command decides what "making it live" means --
/// typically restarting the serving container.
pub struct CommandDeployer {
    command: String,
}

impl CommandDeployer {
    pub fn new(command: impl Into<String>) -> Self {
        CommandDeployer {
            command: command.into(),
        }
    }
}

impl Deployer for CommandDeployer {
    async fn deploy(
        &self,
        bearer_token: &BearerToken,
        config_id: &str,
    ) -> Result<(), DeployError> {
        let status = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .env("BEARER_TOKEN", bearer_token.expose_secret())
            .env("CONFIG_ID", config_id)
            .status()
            .await?;

        if !status.success() {
            return Err(DeployError::Failed { status });
        }
        Ok(())
    }
}

/// What one polling cycle decided to do.
#[derive(Debug, PartialEq)]
pub(crate) enum Plan {
    /// No account is both operator-enabled and token-bearing.
    NoHealthy,
    /// The serving credential is still fresh.
    Fresh,
    /// The serving credential is stale; deploy this account's credential.
    Rotate { email: String },
}

/// The healthy account cyclically following `current_email`, wrapping from
/// the last entry to the first. When the current account is not in the
/// healthy list at all, the first healthy account is the fallback.
pub(crate) fn next_in_rotation<'a>(
    healthy: &[&'a Account],
    current_email: &str,
) -> Option<&'a Account> {
    if healthy.is_empty() {
        return None;
    }
    match healthy.iter().position(|a| a.email == current_email) {
        Some(idx) => Some(healthy[(idx + 1) % healthy.len()]),
        None => Some(healthy[0]),
    }
}

/// Pure rotation decision over a pool snapshot.
pub(crate) fn plan_rotation(accounts: &[Account], now: i64, max_age: Duration) -> Plan {
    let healthy: Vec<&Account> = accounts.iter().filter(|a| a.is_healthy()).collect();
    if healthy.is_empty() {
        return Plan::NoHealthy;
    }

    // Selection runs over the full pool; the healthy subset only orders
    // the rotation itself.
    let Some(current) = crate::store::select_next(accounts) else {
        return Plan::NoHealthy;
    };

    if now - current.last_used <= max_age.as_secs() as i64 {
        return Plan::Fresh;
    }

    match next_in_rotation(&healthy, &current.email) {
        Some(next) => Plan::Rotate {
            email: next.email.clone(),
        },
        None => Plan::NoHealthy,
    }
}

/// Per-cycle failures. Never fatal to the loop.
#[derive(Debug, thiserror::Error)]
pub enum RotationError {
    #[error("Deploy failed: {0}")]
    Deploy(#[from] DeployError),

    #[error("Rotation target '{email}' disappeared from the pool")]
    TargetVanished { email: String },
}

/// The rotation control loop.
pub struct Rotator<D> {
    store: SharedStore,
    deployer: D,
    interval: Duration,
    retry_interval: Duration,
    token_max_age: Duration,
}

impl<D: Deployer> Rotator<D> {
    pub fn new(store: SharedStore, deployer: D, config: &RotationConfig) -> Self {
        Rotator {
            store,
            deployer,
            interval: config.interval,
            retry_interval: config.retry_interval,
            token_max_age: config.token_max_age,
        }
    }

    /// Run forever. One cycle per period; a failed cycle shortens the next
    /// wait to the retry period, then the normal cadence resumes.
    pub async fn run(self) {
        loop {
            let wait = match self.run_cycle().await {
                Ok(()) => self.interval,
                Err(e) => {
                    tracing::warn!(error = %e, "Rotation cycle failed, retrying sooner");
                    self.retry_interval
                }
            };
            tokio::time::sleep(wait).await;
        }
    }

    async fn run_cycle(&self) -> Result<(), RotationError> {
        let accounts = self.store.snapshot().await;
        let now = chrono::Utc::now().timestamp();

        match plan_rotation(&accounts, now, self.token_max_age) {
            Plan::NoHealthy => {
                tracing::warn!("No healthy accounts in the pool, waiting for next cycle");
                Ok(())
            }
            Plan::Fresh => Ok(()),
            Plan::Rotate { email } => {
                let next = accounts
                    .iter()
                    .find(|a| a.email == email)
                    .ok_or(RotationError::TargetVanished { email: email.clone() })?;

                tracing::info!(email = %next.email, "Serving credential is stale, rotating");
                self.deployer
                    .deploy(&next.bearer_token, &next.config_id)
                    .await?;
                tracing::info!(email = %next.email, "Deployed rotated credential");
                Ok(())
            }
        }
    }
}
