use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::error::{Result, StudioError};
use crate::studio::transport::{RawResponse, Transport};

pub(crate) enum Reply {
    Ready(Result<RawResponse>),
    After(Duration, RawResponse),
    Gated(oneshot::Receiver<RawResponse>),
    Never,
}

/// Replays canned responses per path, in order, and records what was sent.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<(String, Option<serde_json::Value>)>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, path: &str, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
    }

    pub(crate) fn reply(&self, path: &str, response: RawResponse) {
        self.push(path, Reply::Ready(Ok(response)));
    }

    pub(crate) fn reply_after(&self, path: &str, delay: Duration, response: RawResponse) {
        self.push(path, Reply::After(delay, response));
    }

    pub(crate) fn gate(&self, path: &str) -> oneshot::Sender<RawResponse> {
        let (tx, rx) = oneshot::channel();
        self.push(path, Reply::Gated(rx));
        tx
    }

    pub(crate) fn calls_to(&self, path: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(p, _)| p == path).count()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn posted_bodies(&self, path: &str) -> Vec<serde_json::Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .filter_map(|(_, body)| body.clone())
            .collect()
    }

    async fn respond(&self, path: &str, body: Option<serde_json::Value>) -> Result<RawResponse> {
        self.calls.lock().unwrap().push((path.to_string(), body));
        let next = self
            .routes
            .lock()
            .unwrap()
            .get_mut(path)
            .and_then(|queue| queue.pop_front());

        match next {
            Some(Reply::Ready(result)) => result,
            Some(Reply::After(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            Some(Reply::Gated(rx)) => rx
                .await
                .map_err(|_| StudioError::NetworkError("gate dropped".into())),
            Some(Reply::Never) => std::future::pending().await,
            None => Err(StudioError::NetworkError(format!("no scripted reply for {}", path))),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, path: &str) -> Result<RawResponse> {
        self.respond(path, None).await
    }

    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
        _accept: &str,
    ) -> Result<RawResponse> {
        self.respond(path, Some(body.clone())).await
    }
}
