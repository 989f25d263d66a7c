//! MQTT control surface built on `rumqttc`.
//!
//! The event loop is the only task that talks to the broker. Inbound messages
//! are routed into operations and handed to the scheduler; outbound state and
//! timer reports are queued with `try_publish` so the render owner never waits
//! on the network.

use std::time::Duration;

use mr_tree_core::mqtt::{self, Topics};
use mr_tree_core::{Backoff, MqttConfig, Notification, TreeError, TreeHandle};
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Packet, QoS};
use tokio::sync::{broadcast, watch};
use tokio::time;

const REQUEST_CAPACITY: usize = 64;

fn options(config: &MqttConfig, topics: &Topics) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
    options.set_last_will(LastWill::new(
        &topics.availability,
        mqtt::OFFLINE,
        QoS::AtLeastOnce,
        true,
    ));
    if let Some(username) = &config.username {
        options.set_credentials(username, config.password.as_deref().unwrap_or_default());
    }
    options
}

fn transport(err: impl std::fmt::Display) -> TreeError {
    TreeError::Transport(err.to_string())
}

/// Subscribes and announces the node. Runs after every (re)connect because
/// the broker forgets subscriptions of a clean session.
async fn on_connected(
    client: &AsyncClient,
    topics: &Topics,
    tree: &TreeHandle,
) -> mr_tree_core::Result<()> {
    for topic in topics.subscriptions() {
        client.try_subscribe(topic, QoS::AtLeastOnce).map_err(transport)?;
    }
    client
        .try_publish(&topics.availability, QoS::AtLeastOnce, true, mqtt::ONLINE)
        .map_err(transport)?;
    for (topic, document) in topics.discovery_documents() {
        let payload = serde_json::to_vec(&document)?;
        client
            .try_publish(topic, QoS::AtLeastOnce, true, payload)
            .map_err(transport)?;
    }
    let state = tree.state().await?;
    client
        .try_publish(&topics.state, QoS::AtLeastOnce, true, mqtt::state_payload(&state)?)
        .map_err(transport)?;
    tracing::info!("mqtt subscriptions and discovery published");
    Ok(())
}

fn on_message(topics: &Topics, tree: &TreeHandle, topic: &str, payload: &[u8]) {
    match topics.route(topic, payload) {
        Ok(Some(op)) => {
            tracing::debug!(topic, ?op, "mqtt command");
            let tree = tree.clone();
            tokio::spawn(async move {
                if let Err(err) = tree.call(op).await {
                    tracing::warn!(%err, "mqtt command rejected");
                }
            });
        }
        Ok(None) => tracing::trace!(topic, "ignoring message"),
        Err(err) => tracing::warn!(topic, %err, "dropping malformed mqtt message"),
    }
}

/// Forwards scheduler notifications to the broker until the scheduler stops.
async fn publish_notifications(
    client: AsyncClient,
    topics: Topics,
    mut notifications: broadcast::Receiver<Notification>,
) {
    loop {
        let notification = match notifications.recv().await {
            Ok(notification) => notification,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "mqtt publisher fell behind");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        let published = topics
            .outbound(&notification)
            .and_then(|(topic, payload)| {
                client
                    .try_publish(topic, QoS::AtLeastOnce, true, payload)
                    .map_err(transport)
            });
        if let Err(err) = published {
            tracing::warn!(%err, "dropping mqtt notification");
        }
    }
}

/// Drives the broker connection until `shutdown` flips, reconnecting with
/// exponential backoff.
pub async fn run(config: MqttConfig, tree: TreeHandle, mut shutdown: watch::Receiver<bool>) {
    let topics = Topics::from_config(&config);
    let (client, mut events) = AsyncClient::new(options(&config, &topics), REQUEST_CAPACITY);
    let publisher = tokio::spawn(publish_notifications(
        client.clone(),
        topics.clone(),
        tree.subscribe(),
    ));

    let poll_timeout = Duration::from_millis(config.poll_timeout_ms.max(1));
    let mut backoff = Backoff::new(
        Duration::from_millis(config.backoff_initial_ms),
        Duration::from_millis(config.backoff_max_ms),
    );
    tracing::info!(host = %config.host, port = config.port, "mqtt surface starting");

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            polled = time::timeout(poll_timeout, events.poll()) => match polled {
                Err(_) => tracing::trace!("mqtt poll idle"),
                Ok(Ok(Event::Incoming(Packet::ConnAck(_)))) => {
                    backoff.reset();
                    tracing::info!("mqtt connected");
                    if let Err(err) = on_connected(&client, &topics, &tree).await {
                        tracing::warn!(%err, "failed to announce on mqtt");
                    }
                }
                Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                    on_message(&topics, &tree, &publish.topic, &publish.payload);
                }
                Ok(Ok(_)) => {}
                Ok(Err(err)) => {
                    let delay = backoff.next_delay();
                    tracing::warn!(%err, delay_ms = delay.as_millis() as u64, "mqtt connection lost");
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = time::sleep(delay) => {}
                    }
                }
            },
        }
    }

    publisher.abort();
    disconnect(&client, &topics, &mut events, poll_timeout).await;
}

async fn disconnect(client: &AsyncClient, topics: &Topics, events: &mut EventLoop, limit: Duration) {
    let _ = client.try_publish(&topics.availability, QoS::AtLeastOnce, true, mqtt::OFFLINE);
    let _ = client.try_disconnect();
    let flush = async {
        while events.poll().await.is_ok() {}
    };
    let _ = time::timeout(limit, flush).await;
    tracing::info!("mqtt surface stopped");
}
