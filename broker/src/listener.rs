use crate::error::{subscription_error, Error};
use events::{Envelope, EventPublisher};
use futures::{Stream, StreamExt};
use log::*;

/// A raw message received on a broker channel, before decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerMessage {
    pub channel: String,
    pub payload: String,
}

impl BrokerMessage {
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

/// The single process-wide pub/sub subscription covering the event channels.
pub struct Subscription {
    pubsub: redis::aio::PubSub,
}

impl Subscription {
    /// Open one pub/sub connection and subscribe it to every channel in `channels`.
    ///
    /// Failure here is an initialization fault. It is returned to the process
    /// owner, never retried.
    pub async fn open(client: &redis::Client, channels: &[&str]) -> Result<Self, Error> {
        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(subscription_error)?;

        pubsub
            .subscribe(channels)
            .await
            .map_err(subscription_error)?;

        info!("Subscribed to {} broker channel(s): {:?}", channels.len(), channels);
        Ok(Self { pubsub })
    }

    /// Turn the subscription into a stream of raw messages, in arrival order.
    pub fn into_stream(self) -> impl Stream<Item = BrokerMessage> + Send {
        self.pubsub.into_on_message().filter_map(|msg| async move {
            let channel = msg.get_channel_name().to_string();
            match msg.get_payload::<String>() {
                Ok(payload) => Some(BrokerMessage { channel, payload }),
                Err(e) => {
                    warn!("Dropping unreadable message on {channel}: {e}");
                    None
                }
            }
        })
    }
}

/// Consume broker messages one at a time and publish each decoded envelope.
///
/// Messages are processed sequentially, so envelopes on the same channel reach
/// the publisher in the order the broker delivered them. A message that is not
/// valid JSON is logged and dropped. Returns the number of envelopes published
/// once the upstream stream ends.
pub async fn run<S>(stream: S, publisher: EventPublisher) -> u64
where
    S: Stream<Item = BrokerMessage>,
{
    futures::pin_mut!(stream);
    let mut published = 0;

    while let Some(message) = stream.next().await {
        match Envelope::decode(&message.channel, &message.payload) {
            Ok(envelope) => {
                publisher.publish(&envelope).await;
                published += 1;
            }
            Err(e) => {
                warn!(
                    "Dropping malformed envelope on channel {}: {e}",
                    message.channel
                );
            }
        }
    }

    warn!("Broker subscription stream ended after {published} envelope(s)");
    published
}
