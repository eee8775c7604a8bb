//! Test server wrapper starting the gateway on a random port
//!
//! The builder opens (and migrates) the registry at a temp path first so
//! tests can seed the fleet before the server comes up; background loops
//! are not spawned, keeping probe traffic out of the assertions.

use std::net::SocketAddr;

use crossbar_config::GatewayConfig;
use crossbar_server::Server;
use crossbar_store::Store;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Builds a gateway over a temp registry
pub struct TestServerBuilder {
    dir: tempfile::TempDir,
    store: Store,
    classifier_url: String,
    api_key: Option<String>,
}

impl TestServerBuilder {
    /// Open a fresh registry; migrations seed the defaults
    pub async fn new() -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        let store = Store::open(dir.path().join("router.db")).await?;
        Ok(Self {
            dir,
            store,
            // Nothing listens here: classification degrades to defaults
            classifier_url: "http://127.0.0.1:1/v1".to_owned(),
            api_key: None,
        })
    }

    /// Registry handle for seeding
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Point Tier 2 at a live classifier
    pub fn with_classifier(mut self, url: &str) -> Self {
        self.classifier_url = url.to_owned();
        self
    }

    /// Require this bearer key on the gateway
    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_owned());
        self
    }

    /// Start the gateway on a random port
    pub async fn start(self) -> anyhow::Result<TestServer> {
        let config = GatewayConfig {
            port: 0,
            db_path: self.dir.path().join("router.db"),
            classifier_url: Url::parse(&self.classifier_url)?,
            classifier_model: "tiny".to_owned(),
            probe_interval_ms: 60_000,
            api_key: self.api_key.map(SecretString::from),
            anthropic_version: "2023-06-01".to_owned(),
        };

        let server = Server::new(config).await?;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, server.into_router())
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(TestServer {
            addr,
            shutdown,
            client: reqwest::Client::new(),
            store: self.store,
            _dir: self.dir,
        })
    }
}

/// A running gateway instance
pub struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    client: reqwest::Client,
    /// Registry handle shared with the server's own connection
    pub store: Store,
    _dir: tempfile::TempDir,
}

impl TestServer {
    /// Full URL for a path on the running server
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// HTTP client for requests against the server
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
