use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::{
    configuration::{AppState, State},
    error::Error,
    model::DomainKind,
    types::{channel_name, AuthMessage, PushEvent, SubscribeMessage},
};

/// Live-update listener. Every push marks the cached queries of the
/// channel it arrived on stale; nothing from the push body is cached.
#[derive(Debug)]
pub struct Event {
    app_state: AppState<State>,
}

impl Event {
    pub fn new(app_state: AppState<State>) -> Self {
        Self { app_state }
    }

    pub async fn run(&self) -> Result<(), Error> {
        let Some(url) = self.app_state.config.websocket_url.clone() else {
            info!("WS_URL not set, push invalidation disabled");
            return Ok(());
        };
        let reconnect = Duration::from_secs(
            self.app_state.config.socket_reconnect_interval,
        );

        loop {
            match self.init(&url).await {
                Ok(()) => warn!("WS closed by server, reconnecting..."),
                Err(e) => {
                    error!("WS disconnected with error: {}, reconnecting...", e)
                },
            }
            tokio::time::sleep(reconnect).await;
        }
    }

    async fn init(&self, url: &str) -> Result<(), Error> {
        let (socket, _response) = connect_async(url).await?;
        info!("WS connect successfully");

        let (mut write, mut read) = socket.split();

        if let Some(api_key) = &self.app_state.config.api_key {
            let auth = serde_json::to_string(&AuthMessage::new(api_key))?;
            write.send(Message::Text(auth)).await?;
        }

        for channel in self.channels() {
            let subscribe =
                serde_json::to_string(&SubscribeMessage::new(&channel))?;
            write.send(Message::Text(subscribe)).await?;
            debug!("WS subscribed to {}", channel);
        }

        while let Some(message) = read.next().await {
            match message? {
                Message::Text(text) => {
                    self.on_message(&text).await;
                },
                Message::Close(_) => break,
                Message::Binary(_)
                | Message::Ping(_)
                | Message::Pong(_)
                | Message::Frame(_) => {},
            }
        }

        Ok(())
    }

    fn channels(&self) -> Vec<String> {
        let config = &self.app_state.config;

        config
            .tracked_chains
            .iter()
            .map(|chain| channel_name(DomainKind::Blockchain, Some(chain.as_str())))
            .chain(config.tracked_exchanges.iter().map(|exchange| {
                channel_name(DomainKind::Exchange, Some(exchange.as_str()))
            }))
            .chain([
                channel_name(DomainKind::Market, None),
                channel_name(DomainKind::Portfolio, None),
            ])
            .collect()
    }

    /// Returns how many cache entries the message invalidated.
    pub(crate) async fn on_message(&self, text: &str) -> usize {
        let event = match serde_json::from_str::<PushEvent>(text) {
            Ok(event) => event,
            Err(e) => {
                warn!("WS message ignored, not a push event: {}", e);
                return 0;
            },
        };

        let Some(target) = event.target() else {
            debug!("WS message without a known channel ignored");
            return 0;
        };

        let count = self
            .app_state
            .cache
            .invalidate_matching(target.domain, target.identifier.as_deref())
            .await;
        debug!(
            "WS push for {} invalidated {} entries",
            channel_name(target.domain, target.identifier.as_deref()),
            count
        );

        count
    }
}
