use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{InboundMessage, MessageSource};

/// Replays a fixed script of fetch results. Once the script is drained it
/// cancels `done` and parks, so a consumer under test stops on its own.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<InboundMessage, String>>>,
    acknowledged: Mutex<Vec<i64>>,
    done: CancellationToken,
}

impl ScriptedSource {
    pub fn new(done: CancellationToken) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            acknowledged: Mutex::new(Vec::new()),
            done,
        }
    }

    /// Queue a message; offsets are assigned in script order.
    pub fn push_payload(self, payload: impl Into<Vec<u8>>) -> Self {
        {
            let mut script = self.script.lock().unwrap();
            let offset = script.len() as i64;
            script.push_back(Ok(InboundMessage {
                topic: "orders".to_string(),
                partition: 0,
                offset,
                key: None,
                payload: payload.into(),
            }));
        }
        self
    }

    pub fn push_fetch_error(self, error: &str) -> Self {
        self.script.lock().unwrap().push_back(Err(error.to_string()));
        self
    }

    pub fn acknowledged(&self) -> Vec<i64> {
        self.acknowledged.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSource for ScriptedSource {
    async fn fetch(&self) -> anyhow::Result<InboundMessage> {
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(message)) => Ok(message),
            Some(Err(error)) => Err(anyhow!(error)),
            None => {
                self.done.cancel();
                std::future::pending().await
            }
        }
    }

    async fn acknowledge(&self, message: &InboundMessage) -> anyhow::Result<()> {
        self.acknowledged.lock().unwrap().push(message.offset);
        Ok(())
    }
}
