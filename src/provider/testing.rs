use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;

use super::Transport;
use crate::{
    configuration::Config,
    error::TransportError,
    types::{QueryParams, RawPayload},
};

type Reply = Result<RawPayload, TransportError>;

/// In-memory transport answering per endpoint from a queue of replies.
/// The last reply of a queue repeats.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<(String, QueryParams)>>,
    delay: Duration,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn reply(self, endpoint: &str, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(endpoint.to_owned())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<(String, QueryParams)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, endpoint: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(called, _)| called == endpoint)
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(
        &self,
        endpoint: &str,
        params: &QueryParams,
    ) -> Result<RawPayload, TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push((endpoint.to_owned(), params.clone()));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut replies = self.replies.lock().unwrap();
        let queue = replies.get_mut(endpoint).ok_or_else(|| {
            TransportError::ConnectionFailed(format!("no reply for {}", endpoint))
        })?;

        if queue.len() > 1 {
            return queue
                .pop_front()
                .unwrap_or(Err(TransportError::ConnectionFailed(String::new())));
        }

        queue
            .front()
            .cloned()
            .unwrap_or(Err(TransportError::ConnectionFailed(String::new())))
    }
}

pub fn config() -> Config {
    Config {
        api_base_url: String::from("http://127.0.0.1:1/"),
        api_key: None,
        websocket_url: None,
        timeout: 1,
        refresh_interval: 60,
        max_cache_entries: 32,
        tracked_chains: vec![String::from("ethereum")],
        tracked_exchanges: vec![String::from("binance")],
        socket_reconnect_interval: 1,
        cache_warmup: true,
    }
}
