//! Idempotent bootstrap of the physical resource behind a storage.
//!
//! Several storages (one per namespace) may be constructed concurrently
//! against the same resource. Each of them calls [`ensure_resource`]: the
//! first caller creates the resource, the others see
//! [`StorageError::AlreadyExists`], and all of them wait until the resource
//! reports ready.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::{StorageError, StorageResult};

/// Service-side management of physical storage resources.
#[async_trait]
pub trait Provision: Send + Sync {
    /// Creates the resource, or fails with [`StorageError::AlreadyExists`].
    async fn create_resource(&self, name: &str) -> StorageResult<()>;

    /// Returns `true` once the resource accepts reads and writes.
    async fn resource_ready(&self, name: &str) -> StorageResult<bool>;
}

/// How long [`ensure_resource`] waits for a resource to become ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Number of readiness checks before giving up.
    pub attempts: u32,
    /// Pause between two checks.
    pub interval: Duration,
}

impl ReadinessPolicy {
    /// Creates a policy.
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    /// Upper bound of the time spent waiting.
    pub fn max_wait(&self) -> Duration {
        self.interval.saturating_mul(self.attempts)
    }
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            attempts: 20,
            interval: Duration::from_millis(250),
        }
    }
}

/// Creates `name` if it does not exist and waits until it is ready.
///
/// An [`StorageError::AlreadyExists`] from the provisioner counts as success.
/// Fails with [`StorageError::NotReady`] when the resource is still not ready
/// after `policy.attempts` checks.
pub async fn ensure_resource<P>(
    provisioner: &P,
    name: &str,
    policy: ReadinessPolicy,
) -> StorageResult<()>
where
    P: Provision + ?Sized,
{
    match provisioner.create_resource(name).await {
        Ok(()) => debug!(resource = name, "Created storage resource"),
        Err(StorageError::AlreadyExists(_)) => {
            debug!(resource = name, "Storage resource already exists")
        }
        Err(error) => return Err(error),
    }

    for attempt in 1..=policy.attempts {
        if provisioner.resource_ready(name).await? {
            trace!(resource = name, attempt, "Storage resource is ready");
            return Ok(());
        }
        trace!(resource = name, attempt, "Waiting for storage resource");
        tokio::time::sleep(policy.interval).await;
    }

    Err(StorageError::NotReady {
        resource: name.to_owned(),
        waited: policy.max_wait(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct Flaky {
        exists: bool,
        ready_after: u32,
        checks: AtomicU32,
    }

    #[async_trait]
    impl Provision for Flaky {
        async fn create_resource(&self, name: &str) -> StorageResult<()> {
            if self.exists {
                Err(StorageError::AlreadyExists(name.to_owned()))
            } else {
                Ok(())
            }
        }

        async fn resource_ready(&self, _name: &str) -> StorageResult<bool> {
            let checks = self.checks.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(checks > self.ready_after)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_exists_is_success() {
        let provisioner = Flaky {
            exists: true,
            ..Default::default()
        };
        ensure_resource(&provisioner, "cache", ReadinessPolicy::default())
            .await
            .unwrap();
        assert_eq!(provisioner.checks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_readiness() {
        let provisioner = Flaky {
            ready_after: 3,
            ..Default::default()
        };
        ensure_resource(&provisioner, "cache", ReadinessPolicy::default())
            .await
            .unwrap();
        assert_eq!(provisioner.checks.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_ready_after_attempts() {
        let provisioner = Flaky {
            ready_after: u32::MAX,
            ..Default::default()
        };
        let policy = ReadinessPolicy::new(3, Duration::from_secs(1));
        let error = ensure_resource(&provisioner, "cache", policy)
            .await
            .unwrap_err();
        match error {
            StorageError::NotReady { resource, waited } => {
                assert_eq!(resource, "cache");
                assert_eq!(waited, Duration::from_secs(3));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
