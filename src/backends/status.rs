//! In-memory display surface
//!
//! Holds the latest text of every channel and announces each change as an
//! [`EngineEvent::ChannelUpdated`], which the IPC server forwards to
//! subscribed renderers.

use std::collections::BTreeMap;
use std::sync::RwLock;

use tokio::sync::broadcast;
use tracing::debug;

use crate::collab::{Channel, Display};
use crate::events::EngineEvent;

pub struct StatusBoard {
    lines: RwLock<BTreeMap<Channel, String>>,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl StatusBoard {
    pub fn new(event_tx: broadcast::Sender<EngineEvent>) -> Self {
        Self {
            lines: RwLock::new(BTreeMap::new()),
            event_tx,
        }
    }

    #[cfg(test)]
    pub fn get(&self, channel: Channel) -> Option<String> {
        self.lines
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&channel)
            .cloned()
    }

    /// Every channel written so far
    pub fn snapshot(&self) -> BTreeMap<Channel, String> {
        self.lines.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Display for StatusBoard {
    fn show(&self, channel: Channel, text: &str) {
        {
            let mut lines = self.lines.write().unwrap_or_else(|e| e.into_inner());
            if lines.get(&channel).map(String::as_str) == Some(text) {
                return;
            }
            lines.insert(channel, text.to_string());
        }

        debug!(%channel, text, "display updated");
        let _ = self.event_tx.send(EngineEvent::ChannelUpdated {
            channel,
            text: text.to_string(),
        });
    }
}
