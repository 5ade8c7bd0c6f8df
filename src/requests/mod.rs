//! One-shot request/response orchestration.
//!
//! Each request is handled by its own spawned task with its own deadline;
//! no state is shared between concurrent requests. The exchange is a
//! two-state machine: *AwaitingResult* from dispatch until the first of
//! {result ready, failure, deadline}, then *Terminal*. Exactly one reply is
//! produced per request. Timeout cancellation is soft: a result arriving
//! after the deadline is discarded at the closed channel, the in-flight
//! lookup is not forcibly aborted.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::error::{DistributionError, ErrorKind};
use crate::library::repository::RepositoryClient;
use crate::library::{ComponentGroups, PackageConfig, PublishedLibraryCache};
use crate::runtime::Runtime;
use crate::version::LibraryName;

/// Which release of a library a request refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum VersionSpec {
    /// The library is expected in the local cache; no network access.
    Local,
    /// A published release, fetched from `repository_url` on a cache miss.
    Published {
        version: semver::Version,
        repository_url: String,
    },
}

/// A "resolve & fetch" query for one library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetPackage {
    pub namespace: String,
    pub name: String,
    pub version: VersionSpec,
}

impl GetPackage {
    fn library_name(&self) -> LibraryName {
        LibraryName::new(self.namespace.clone(), self.name.clone())
    }
}

/// Successful reply payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    #[serde(rename = "component-groups", skip_serializing_if = "Option::is_none")]
    pub component_groups: Option<ComponentGroups>,
}

impl From<PackageConfig> for PackageInfo {
    fn from(config: PackageConfig) -> Self {
        Self {
            license: config.license,
            component_groups: config.component_groups,
        }
    }
}

/// Failure reply payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub kind: ErrorKind,
    pub message: String,
}

/// The single reply every request terminates with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum Reply {
    Result(PackageInfo),
    Error(ErrorReply),
}

/// Events that drive the exchange into its terminal state.
enum Event {
    ResultReady(PackageInfo),
    Failed(DistributionError),
    TimedOut,
}

/// Handles GetPackage requests, one isolated task and timer per request.
pub struct PackageRequestHandler<R: Runtime + 'static, C: RepositoryClient + 'static> {
    cache: Arc<PublishedLibraryCache<R, C>>,
    timeout: Duration,
}

impl<R: Runtime + 'static, C: RepositoryClient + 'static> PackageRequestHandler<R, C> {
    pub fn new(cache: Arc<PublishedLibraryCache<R, C>>, timeout: Duration) -> Self {
        Self { cache, timeout }
    }

    /// Runs one request to its terminal state and returns the single reply.
    #[tracing::instrument(skip(self, request))]
    pub async fn handle(&self, request: GetPackage) -> Reply {
        let subject = format!("{}.{}", request.namespace, request.name);
        let (reply_tx, reply_rx) = oneshot::channel();

        let cache = Arc::clone(&self.cache);
        tokio::spawn(async move {
            let result = dispatch(cache, request).await;
            // A closed receiver means the deadline already fired; the late
            // result is discarded here.
            if reply_tx.send(result).is_err() {
                debug!("Discarding late lookup result");
            }
        });

        let event = match tokio::time::timeout(self.timeout, reply_rx).await {
            Ok(Ok(Ok(info))) => Event::ResultReady(info),
            Ok(Ok(Err(e))) => Event::Failed(e),
            // A dropped sender means the lookup task died (e.g. panicked)
            // without a result. That is an internal failure of this process,
            // not a network condition.
            Ok(Err(_closed)) => {
                warn!("Lookup task for {} ended without producing a result", subject);
                return Reply::Error(ErrorReply {
                    kind: ErrorKind::Integrity,
                    message: format!("lookup for {subject} ended without producing a result"),
                });
            }
            Err(_elapsed) => Event::TimedOut,
        };

        match event {
            Event::ResultReady(info) => Reply::Result(info),
            Event::Failed(e) => {
                warn!("Package request for {} failed: {}", subject, e);
                Reply::Error(ErrorReply {
                    kind: e.kind(),
                    message: e.to_string(),
                })
            }
            Event::TimedOut => {
                let e = DistributionError::Timeout {
                    subject,
                    millis: self.timeout.as_millis() as u64,
                };
                warn!("{}", e);
                Reply::Error(ErrorReply {
                    kind: e.kind(),
                    message: e.to_string(),
                })
            }
        }
    }
}

/// The underlying resolution, chosen by the request's version spec.
async fn dispatch<R: Runtime, C: RepositoryClient>(
    cache: Arc<PublishedLibraryCache<R, C>>,
    request: GetPackage,
) -> Result<PackageInfo, DistributionError> {
    let name = request.library_name();
    let config = match &request.version {
        VersionSpec::Local => cache.find_local_package(&name)?,
        VersionSpec::Published {
            version,
            repository_url,
        } => {
            cache
                .get_or_fetch_package(&name, version, repository_url)
                .await?
        }
    };
    Ok(config.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::repository::MockRepositoryClient;
    use crate::paths::DistributionLayout;
    use crate::runtime::RealRuntime;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::{TempDir, tempdir};
    use test_log::test;

    fn handler_with(
        root: &TempDir,
        client: MockRepositoryClient,
        timeout: Duration,
    ) -> PackageRequestHandler<RealRuntime, MockRepositoryClient> {
        let cache = PublishedLibraryCache::new(
            Arc::new(RealRuntime),
            client,
            DistributionLayout::new(root.path().to_path_buf()),
        );
        PackageRequestHandler::new(Arc::new(cache), timeout)
    }

    fn published_request(repository_url: &str) -> GetPackage {
        GetPackage {
            namespace: "Standard".into(),
            name: "Table".into(),
            version: VersionSpec::Published {
                version: semver::Version::new(1, 2, 0),
                repository_url: repository_url.to_string(),
            },
        }
    }

    #[test(tokio::test)]
    async fn test_published_lookup_succeeds() {
        let root = tempdir().unwrap();
        let mut client = MockRepositoryClient::new();
        client.expect_fetch_package_descriptor().returning(|_, _, _| {
            Ok(r#"{"namespace": "Standard", "name": "Table", "license": "MIT"}"#.to_string())
        });

        let handler = handler_with(&root, client, Duration::from_secs(5));
        let reply = handler.handle(published_request("https://repo.example")).await;

        assert_eq!(
            reply,
            Reply::Result(PackageInfo {
                license: Some("MIT".into()),
                component_groups: None,
            })
        );
    }

    #[test(tokio::test)]
    async fn test_local_lookup_succeeds_without_network() {
        let root = tempdir().unwrap();
        let dir = root
            .path()
            .join("libraries")
            .join("Standard")
            .join("Table")
            .join("1.0.0");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("package.json"),
            r#"{"namespace": "Standard", "name": "Table", "license": "MIT"}"#,
        )
        .unwrap();

        let handler = handler_with(&root, MockRepositoryClient::new(), Duration::from_secs(5));
        let reply = handler
            .handle(GetPackage {
                namespace: "Standard".into(),
                name: "Table".into(),
                version: VersionSpec::Local,
            })
            .await;

        assert!(matches!(reply, Reply::Result(_)));
    }

    #[test(tokio::test)]
    async fn test_failure_maps_onto_error_reply() {
        let root = tempdir().unwrap();
        let mut client = MockRepositoryClient::new();
        client.expect_fetch_package_descriptor().returning(|url, name, version| {
            Err(DistributionError::LibraryNotFoundInRepository {
                library: name.clone(),
                version: version.clone(),
                repository: url.to_string(),
            })
        });

        let handler = handler_with(&root, client, Duration::from_secs(5));
        let reply = handler.handle(published_request("https://repo.example")).await;

        match reply {
            Reply::Error(error) => {
                assert_eq!(error.kind, ErrorKind::NotFound);
                assert!(error.message.contains("Standard.Table"));
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    /// Repository client that answers only after a delay, counting completed
    /// lookups so the test can observe a discarded late result.
    struct SlowClient {
        delay: Duration,
        completed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RepositoryClient for SlowClient {
        async fn fetch_package_descriptor(
            &self,
            _repository_url: &str,
            _name: &LibraryName,
            _version: &semver::Version,
        ) -> Result<String, DistributionError> {
            tokio::time::sleep(self.delay).await;
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(r#"{"namespace": "Standard", "name": "Table"}"#.to_string())
        }
    }

    #[test(tokio::test)]
    async fn test_slow_lookup_times_out_with_exactly_one_reply() {
        let root = tempdir().unwrap();
        let completed = Arc::new(AtomicUsize::new(0));
        let client = SlowClient {
            delay: Duration::from_millis(200),
            completed: Arc::clone(&completed),
        };
        let cache = PublishedLibraryCache::new(
            Arc::new(RealRuntime),
            client,
            DistributionLayout::new(root.path().to_path_buf()),
        );
        let handler =
            PackageRequestHandler::new(Arc::new(cache), Duration::from_millis(20));

        let reply = handler.handle(published_request("https://repo.example")).await;
        match reply {
            Reply::Error(error) => assert_eq!(error.kind, ErrorKind::Timeout),
            other => panic!("unexpected reply: {other:?}"),
        }

        // The lookup still completes afterwards; its result is discarded
        // rather than producing a second reply.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }

    /// Repository client that dies mid-lookup, taking the reply sender
    /// down with its task.
    struct PanickyClient;

    #[async_trait]
    impl RepositoryClient for PanickyClient {
        async fn fetch_package_descriptor(
            &self,
            _repository_url: &str,
            _name: &LibraryName,
            _version: &semver::Version,
        ) -> Result<String, DistributionError> {
            panic!("lookup task dies before replying");
        }
    }

    #[test(tokio::test)]
    async fn test_vanished_lookup_task_is_an_internal_failure() {
        let root = tempdir().unwrap();
        let cache = PublishedLibraryCache::new(
            Arc::new(RealRuntime),
            PanickyClient,
            DistributionLayout::new(root.path().to_path_buf()),
        );
        let handler = PackageRequestHandler::new(Arc::new(cache), Duration::from_secs(5));

        let reply = handler.handle(published_request("https://repo.example")).await;
        match reply {
            Reply::Error(error) => {
                assert_eq!(error.kind, ErrorKind::Integrity);
                assert!(error.message.contains("without producing a result"));
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test(tokio::test)]
    async fn test_concurrent_requests_are_isolated() {
        let root = tempdir().unwrap();
        let mut client = MockRepositoryClient::new();
        client.expect_fetch_package_descriptor().returning(|_, name, _| {
            Ok(format!(
                r#"{{"namespace": "{}", "name": "{}", "license": "MIT"}}"#,
                name.namespace, name.name
            ))
        });

        let handler = Arc::new(handler_with(&root, client, Duration::from_secs(5)));
        let mut handles = Vec::new();
        for i in 0..4 {
            let handler = Arc::clone(&handler);
            handles.push(tokio::spawn(async move {
                handler
                    .handle(GetPackage {
                        namespace: "Standard".into(),
                        name: format!("Lib{i}"),
                        version: VersionSpec::Published {
                            version: semver::Version::new(1, 0, 0),
                            repository_url: "https://repo.example".into(),
                        },
                    })
                    .await
            }));
        }
        for handle in handles {
            assert!(matches!(handle.await.unwrap(), Reply::Result(_)));
        }
    }

    #[test]
    fn test_request_wire_format() {
        let request: GetPackage = serde_json::from_str(
            r#"{
                "namespace": "Standard",
                "name": "Table",
                "version": {
                    "kind": "published",
                    "version": "1.2.0",
                    "repository_url": "https://repo.example"
                }
            }"#,
        )
        .unwrap();
        assert!(matches!(request.version, VersionSpec::Published { .. }));

        let reply = Reply::Error(ErrorReply {
            kind: ErrorKind::Timeout,
            message: "too slow".into(),
        });
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["kind"], "timeout");
    }
}
