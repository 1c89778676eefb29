use anyhow::{Result, anyhow};
use rand::Rng;
use std::net::IpAddr;
use std::process::Stdio;
use std::time::{Duration, Instant};
use surge_ping::{
    Client as PingClient, Config as PingConfig, ICMP, PingIdentifier, PingSequence, SurgeError,
};
use tokio::process::Command;
use tracing::{debug, warn};

/// Most body bytes read from an HTTP response before latency is taken
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Checker trait for the different kinds of reachability probes
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Perform the check, returning latency in milliseconds and a short message.
    ///
    /// Any failure, including a response classified as down, is an `Err`
    /// whose text becomes the observation message.
    async fn check(&self, target: &str) -> Result<(f64, String)>;
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// HTTP/HTTPS checker
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self, target: &str) -> Result<(f64, String)> {
        let start = Instant::now();

        let mut response = self.client.get(target).send().await.map_err(|e| {
            if e.is_timeout() {
                anyhow!("HTTP request timed out")
            } else {
                anyhow!("HTTP request failed: {}", e)
            }
        })?;

        let status_code = response.status().as_u16();
        if status_code >= 400 {
            return Err(anyhow!("HTTP {}", status_code));
        }

        // The status decides; the body only extends the latency, up to a cap
        let mut drained = 0usize;
        while drained < MAX_BODY_BYTES {
            match response.chunk().await {
                Ok(Some(chunk)) => drained += chunk.len(),
                Ok(None) => break,
                Err(e) => {
                    debug!("Stopped reading body of {} after {} bytes: {}", target, drained, e);
                    break;
                }
            }
        }

        Ok((elapsed_ms(start), format!("HTTP {}", status_code)))
    }
}

/// ICMP checker
///
/// Sends one echo request through `surge_ping` and reports its round-trip
/// time. When the process may not open ICMP sockets, falls back to the system
/// `ping` binary, whose latency includes process startup.
pub struct IcmpChecker {
    wait: Duration,
    v4: Option<PingClient>,
    v6: Option<PingClient>,
}

impl IcmpChecker {
    /// Must be called inside a tokio runtime
    pub fn new(wait: Duration) -> Self {
        let v4 = PingClient::new(&PingConfig::default())
            .inspect_err(|e| warn!("ICMPv4 socket unavailable, using system ping: {}", e))
            .ok();
        let v6 = PingClient::new(&PingConfig::builder().kind(ICMP::V6).build())
            .inspect_err(|e| debug!("ICMPv6 socket unavailable, using system ping: {}", e))
            .ok();

        Self { wait, v4, v6 }
    }

    /// Checker that always shells out to `ping`
    pub fn system(wait: Duration) -> Self {
        Self { wait, v4: None, v6: None }
    }

    async fn resolve(target: &str) -> Result<IpAddr> {
        if let Ok(ip) = target.parse::<IpAddr>() {
            return Ok(ip);
        }

        tokio::net::lookup_host((target, 0))
            .await
            .map_err(|e| anyhow!("Name resolution failed: {}", e))?
            .map(|addr| addr.ip())
            .next()
            .ok_or_else(|| anyhow!("No IP address found for {}", target))
    }

    async fn socket_ping(&self, client: &PingClient, ip: IpAddr) -> Result<(f64, String)> {
        let payload = [0u8; 56];
        let mut pinger = client.pinger(ip, PingIdentifier(rand::random())).await;
        pinger.timeout(self.wait);

        match pinger.ping(PingSequence(0), &payload).await {
            Ok((_, rtt)) => Ok((rtt.as_secs_f64() * 1000.0, "Ping OK".to_string())),
            Err(SurgeError::Timeout { .. }) => Err(anyhow!("Ping timeout")),
            Err(e) => Err(anyhow!("Ping failed: {}", e)),
        }
    }

    async fn system_ping(&self, target: &str) -> Result<(f64, String)> {
        let wait_secs = self.wait.as_secs().max(1);

        let mut command = Command::new("ping");
        command
            .arg("-c")
            .arg("1")
            .arg("-W")
            .arg(wait_secs.to_string())
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let start = Instant::now();
        let status = command.status().await.map_err(|e| anyhow!("Failed to run ping: {}", e))?;
        let latency = elapsed_ms(start);

        if status.success() {
            Ok((latency, "Ping OK".to_string()))
        } else {
            Err(anyhow!("Ping timeout"))
        }
    }
}

#[async_trait::async_trait]
impl Checker for IcmpChecker {
    async fn check(&self, target: &str) -> Result<(f64, String)> {
        if self.v4.is_none() && self.v6.is_none() {
            return self.system_ping(target).await;
        }

        let ip = Self::resolve(target).await?;
        let client = match ip {
            IpAddr::V4(_) => self.v4.as_ref(),
            IpAddr::V6(_) => self.v6.as_ref(),
        };

        match client {
            Some(client) => self.socket_ping(client, ip).await,
            None => self.system_ping(&ip.to_string()).await,
        }
    }
}

/// Simulated checker for demo deployments without network access
pub struct MockChecker {
    failure_rate: f64,
}

impl MockChecker {
    pub fn new(failure_rate: f64) -> Self {
        Self { failure_rate: failure_rate.clamp(0.0, 1.0) }
    }
}

impl Default for MockChecker {
    fn default() -> Self {
        Self::new(0.2)
    }
}

#[async_trait::async_trait]
impl Checker for MockChecker {
    async fn check(&self, _target: &str) -> Result<(f64, String)> {
        let (delay, is_up) = {
            let mut rng = rand::thread_rng();
            (rng.gen_range(0.05..0.3), rng.r#gen::<f64>() >= self.failure_rate)
        };

        tokio::time::sleep(Duration::from_secs_f64(delay)).await;

        if is_up {
            let latency = (delay * 1000.0 * 100.0).round() / 100.0;
            Ok((latency, "Service is reachable".to_string()))
        } else {
            Err(anyhow!("Connection timed out"))
        }
    }
}
