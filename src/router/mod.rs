//! Router core: fans [`Envelope`](crate::protocol::messages::Envelope)s out
//! from couplers to the publishers subscribed to them. Every publisher gets
//! its own bounded `tokio::sync::mpsc` queue; a publisher that falls behind
//! past its configured `max_lost` threshold is stopped rather than allowed
//! to backpressure the whole fabric. Same Service/Handle/Runner split as
//! [`crate::protocol::managment::address_supervisor`]: a cheap sender handle
//! for couplers, and a runner owning the fan-out loop on its own task.
pub mod coupler;
pub mod device_table;
pub mod filter;
pub mod publisher;

use std::collections::HashMap;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::RouterConfig;
use crate::error::{ConfigError, RouterError};
use crate::protocol::messages::Envelope;
use crate::router::device_table::{DeviceTableHandle, DeviceTableRunner, DEFAULT_MAX_SILENT};
use crate::router::filter::FilterSet;
use crate::router::publisher::{PublisherHandle, PublisherRunner};

/// One routed envelope plus the name of the coupler that produced it, used
/// by the fan-out loop to resolve the subscription map.
#[derive(Debug, Clone)]
pub struct RoutedEnvelope {
    pub source_coupler: String,
    pub envelope: Envelope,
}

/// Inverted subscription map: coupler name -> publishers that read from it.
#[derive(Debug, Default)]
struct SubscriptionMap {
    by_coupler: HashMap<String, Vec<String>>,
}

impl SubscriptionMap {
    fn build(config: &RouterConfig) -> Result<Self, ConfigError> {
        let coupler_names: std::collections::HashSet<&str> =
            config.couplers.iter().map(|c| c.name.as_str()).collect();
        let mut by_coupler: HashMap<String, Vec<String>> = HashMap::new();
        for publisher in &config.publishers {
            let sources: Vec<&str> = if publisher.sources.is_empty() {
                coupler_names.iter().copied().collect()
            } else {
                publisher.sources.iter().map(String::as_str).collect()
            };
            for source in sources {
                if !coupler_names.contains(source) {
                    return Err(ConfigError::UnknownEndpoint {
                        name: source.to_string(),
                        filter: publisher.name.clone(),
                    });
                }
                by_coupler
                    .entry(source.to_string())
                    .or_default()
                    .push(publisher.name.clone());
            }
        }
        Ok(Self { by_coupler })
    }

    fn publishers_for(&self, coupler: &str) -> &[String] {
        self.by_coupler.get(coupler).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Assembled router: the ingestion side couplers push envelopes into, and
/// the per-publisher handles built from configuration. Call
/// [`Router::split`] to get the ingestion `RouterHandle` and the
/// `RouterRunner` to spawn.
pub struct Router {
    subscriptions: SubscriptionMap,
    publishers: HashMap<String, (PublisherHandle, PublisherRunner)>,
}

impl Router {
    /// Validates the subscription graph and builds one bounded queue plus
    /// filter chain per configured publisher. Does not start any task.
    pub fn from_config(config: &RouterConfig) -> Result<Self, RouterError> {
        let subscriptions = SubscriptionMap::build(config)?;
        let mut publishers = HashMap::new();
        for publisher_config in &config.publishers {
            let filters = FilterSet::from_names(&publisher_config.filters, &config.filters)
                .map_err(RouterError::Config)?;
            let (tx, rx) = mpsc::channel(publisher_config.queue_size.max(1));
            let consecutive_lost = Arc::new(AtomicU32::new(0));
            let handle = PublisherHandle {
                name: publisher_config.name.clone(),
                sender: tx,
                consecutive_lost: consecutive_lost.clone(),
            };
            let runner = PublisherRunner::with_lost_counter(publisher_config.clone(), filters, rx, consecutive_lost);
            publishers.insert(publisher_config.name.clone(), (handle, runner));
        }
        Ok(Self { subscriptions, publishers })
    }

    /// Splits into the ingestion handle couplers push into, one runner per
    /// publisher, and the device table runner — every one of the three is
    /// expected to be `tokio::spawn`ed except the ingestion handle itself.
    pub fn split(self, cancellation: CancellationToken) -> (RouterHandle, Vec<(String, PublisherRunner)>, DeviceTableRunner) {
        let mut handles = HashMap::new();
        let mut runners = Vec::new();
        for (name, (handle, runner)) in self.publishers {
            handles.insert(name.clone(), handle);
            runners.push((name, runner));
        }
        let (device_table, device_table_runner) = DeviceTableHandle::new(DEFAULT_MAX_SILENT);
        let handle = RouterHandle {
            subscriptions: Arc::new(self.subscriptions),
            publisher_handles: Arc::new(handles),
            device_table,
            cancellation,
        };
        (handle, runners, device_table_runner)
    }
}

/// Cheap, cloneable ingestion point every coupler task pushes envelopes
/// into. Fan-out itself runs synchronously on the caller's task: each
/// publisher's queue absorbs its own backpressure, so pushing never blocks
/// on a slow sibling beyond the bound of its own queue.
#[derive(Clone)]
pub struct RouterHandle {
    subscriptions: Arc<SubscriptionMap>,
    publisher_handles: Arc<HashMap<String, PublisherHandle>>,
    device_table: DeviceTableHandle,
    cancellation: CancellationToken,
}

impl RouterHandle {
    /// Pushes an envelope from `source_coupler` to every subscribed
    /// publisher, and records it in the device table first — every envelope
    /// that enters the fabric passes through here regardless of which
    /// coupler produced it. A publisher whose queue is full counts one lost
    /// envelope against its `max_lost` budget rather than blocking the
    /// coupler.
    pub async fn route(&self, source_coupler: &str, envelope: Envelope) {
        self.device_table.observe(&envelope);
        for publisher_name in self.subscriptions.publishers_for(source_coupler) {
            if let Some(handle) = self.publisher_handles.get(publisher_name) {
                handle.offer(envelope.clone()).await;
            }
        }
    }

    pub fn device_table(&self) -> &DeviceTableHandle {
        &self.device_table
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CouplerConfig, PublisherConfig};

    fn coupler(name: &str) -> CouplerConfig {
        CouplerConfig {
            name: name.to_string(),
            class: "test".to_string(),
            device: None,
            timeout_secs: 10,
            baud_rate: 4800,
            max_attempt: 5,
            open_delay_ms: 2000,
            stop_system: false,
            bidirectional: false,
            trace: false,
        }
    }

    fn publisher(name: &str, sources: Vec<&str>) -> PublisherConfig {
        PublisherConfig {
            name: name.to_string(),
            class: "test".to_string(),
            sources: sources.into_iter().map(String::from).collect(),
            queue_size: 4,
            max_lost: 5,
            max_silent_secs: 60,
            filter_select: false,
            format: crate::config::PublisherFormat::Transparent,
            filters: vec![],
        }
    }

    #[test]
    fn subscription_map_fans_no_sources_publisher_out_to_every_coupler() {
        let config = RouterConfig {
            couplers: vec![coupler("can0"), coupler("can1")],
            publishers: vec![publisher("all", vec![])],
            ..Default::default()
        };
        let map = SubscriptionMap::build(&config).unwrap();
        assert_eq!(map.publishers_for("can0"), &["all".to_string()]);
        assert_eq!(map.publishers_for("can1"), &["all".to_string()]);
    }

    #[test]
    fn subscription_map_rejects_unknown_source() {
        let config = RouterConfig {
            couplers: vec![coupler("can0")],
            publishers: vec![publisher("sink", vec!["can-missing"])],
            ..Default::default()
        };
        let err = SubscriptionMap::build(&config).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownEndpoint { .. }));
    }

    #[tokio::test]
    async fn route_delivers_only_to_subscribed_publisher() {
        let config = RouterConfig {
            couplers: vec![coupler("can0"), coupler("can1")],
            publishers: vec![publisher("sink", vec!["can0"])],
            ..Default::default()
        };
        let router = Router::from_config(&config).unwrap();
        let (handle, mut runners, _device_table_runner) = router.split(CancellationToken::new());
        assert_eq!(runners.len(), 1);
        let (_, runner) = runners.remove(0);

        let envelope = Envelope::Sentence0183 {
            talker: "GP".to_string(),
            sentence: "$GPGGA".to_string(),
        };
        handle.route("can0", envelope.clone()).await;
        handle.route("can1", envelope).await;

        let mut rx = runner.into_inbox();
        rx.close();
        let received = rx.recv().await;
        assert!(received.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn route_records_every_source_in_the_device_table() {
        let config = RouterConfig {
            couplers: vec![coupler("can0")],
            publishers: vec![publisher("sink", vec!["can0"])],
            ..Default::default()
        };
        let router = Router::from_config(&config).unwrap();
        let (handle, _runners, _device_table_runner) = router.split(CancellationToken::new());

        let envelope = Envelope::Raw2000 { pgn: 127_488, source: 14, destination: None, priority: 2, payload: vec![0; 8] };
        handle.route("can0", envelope).await;

        assert!(handle.device_table().contains(14));
        assert!(!handle.device_table().contains(15));
    }
}
