use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::error::{AnalysisError, AnalysisResult};

/// Decides whether a live (non-cached) analysis may run.
#[async_trait]
pub trait TrialGate: Send + Sync {
    async fn can_perform_call(&self) -> bool;

    /// Called once after each successful live call.
    async fn record_call(&self);
}

/// Reports whether the network is reachable before a live call.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_online(&self) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UnlimitedTrial;

#[async_trait]
impl TrialGate for UnlimitedTrial {
    async fn can_perform_call(&self) -> bool {
        true
    }

    async fn record_call(&self) {}
}

/// Allows a fixed number of live calls.
#[derive(Debug)]
pub struct QuotaTrialGate {
    limit: u32,
    used: AtomicU32,
}

impl QuotaTrialGate {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            used: AtomicU32::new(0),
        }
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl TrialGate for QuotaTrialGate {
    async fn can_perform_call(&self) -> bool {
        self.used.load(Ordering::SeqCst) < self.limit
    }

    async fn record_call(&self) {
        let used = self.used.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!("Trial usage {}/{}", used.min(self.limit), self.limit);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOnline;

#[async_trait]
impl ConnectivityProbe for AlwaysOnline {
    async fn is_online(&self) -> bool {
        true
    }
}

/// HEAD request against a known URL. Any HTTP answer counts as online.
pub struct HttpConnectivityProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpConnectivityProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> AnalysisResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AnalysisError::Configuration(format!("cannot build connectivity client: {}", e))
            })?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ConnectivityProbe for HttpConnectivityProbe {
    async fn is_online(&self) -> bool {
        match self.client.head(&self.url).send().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Connectivity probe to {} failed: {}", self.url, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_quota_gate() {
        let gate = QuotaTrialGate::new(2);
        assert!(gate.can_perform_call().await);
        gate.record_call().await;
        assert_eq!(gate.remaining(), 1);
        gate.record_call().await;
        assert!(!gate.can_perform_call().await);
        assert_eq!(gate.remaining(), 0);
    }

    #[tokio::test]
    async fn test_zero_quota_denies_immediately() {
        assert!(!QuotaTrialGate::new(0).can_perform_call().await);
    }

    #[test]
    fn test_defaults_allow() {
        assert!(tokio_test::block_on(UnlimitedTrial.can_perform_call()));
        assert!(tokio_test::block_on(AlwaysOnline.is_online()));
    }

    #[tokio::test]
    async fn test_unreachable_host_reports_offline() {
        let check =
            HttpConnectivityProbe::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        assert!(!check.is_online().await);
    }

    #[tokio::test]
    async fn test_any_http_answer_counts_as_online() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let reply = "HTTP/1.1 503 Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
                let _ = socket.write_all(reply.as_bytes()).await;
            }
        });

        let check = HttpConnectivityProbe::new(url, Duration::from_secs(2)).unwrap();
        assert!(check.is_online().await);
    }
}
