//! A topic-based publish/subscribe transport.
//!
//! Each topic is a `tokio::sync::broadcast` channel bound to one message type
//! the first time it is advertised or subscribed. Publishing is
//! fire-and-forget: nothing acknowledges delivery, and a message sent while
//! nobody listens is simply dropped.
//!
//! Subscribers are serviced by their own tokio task, so handlers run off the
//! simulation thread.

use crate::error::TransportError;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Buffered messages per topic before slow subscribers start lagging.
pub const TOPIC_CAPACITY: usize = 64;

/// Bound satisfied by every type that can travel over a topic.
pub trait Message: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Message for T {}

type TopicTable = HashMap<String, Box<dyn Any + Send + Sync>>;

/// A handle to the topic registry.
///
/// Nodes are created by the host and handed to each plugin explicitly. Clones
/// share the same topics, so a publisher and a subscriber holding clones of
/// one node talk to each other.
#[derive(Clone, Default)]
pub struct Node {
    topics: Arc<Mutex<TopicTable>>,
}

impl Node {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender<M: Message>(&self, topic: &str) -> Result<broadcast::Sender<M>, TransportError> {
        if !topic.starts_with('/') {
            return Err(TransportError::InvalidTopic(topic.to_string()));
        }
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = topics.entry(topic.to_string()).or_insert_with(|| {
            debug!("Creating topic {}", topic);
            let (sender, _) = broadcast::channel::<M>(TOPIC_CAPACITY);
            Box::new(sender)
        });
        entry
            .downcast_ref::<broadcast::Sender<M>>()
            .cloned()
            .ok_or_else(|| TransportError::TypeMismatch {
                topic: topic.to_string(),
            })
    }

    /// Opens a publishing endpoint on `topic`.
    pub fn advertise<M: Message>(&self, topic: &str) -> Result<Publisher<M>, TransportError> {
        Ok(Publisher {
            topic: topic.to_string(),
            sender: self.sender(topic)?,
        })
    }

    /// Subscribes `handler` to `topic`.
    ///
    /// The handler runs on a dedicated delivery task spawned on the current
    /// tokio runtime. Dropping the returned `Subscriber` stops delivery.
    pub fn subscribe<M, F>(&self, topic: &str, handler: F) -> Result<Subscriber, TransportError>
    where
        M: Message,
        F: Fn(M) + Send + Sync + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| TransportError::NoRuntime(topic.to_string()))?;
        let mut rx = self.sender::<M>(topic)?.subscribe();
        let topic_name = topic.to_string();
        let task = runtime.spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(message) => handler(message),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Subscriber on {} lagged, {} messages skipped", topic_name, skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Ok(Subscriber {
            topic: topic.to_string(),
            task,
        })
    }

    /// Returns a raw receiver on `topic`, for observers that want to poll or
    /// `await` messages themselves.
    pub fn receiver<M: Message>(&self, topic: &str) -> Result<broadcast::Receiver<M>, TransportError> {
        Ok(self.sender::<M>(topic)?.subscribe())
    }

    /// Names of every topic created so far.
    pub fn topics(&self) -> Vec<String> {
        let topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = topics.keys().cloned().collect();
        names.sort();
        names
    }
}

/// A publishing endpoint on a single topic.
#[derive(Debug, Clone)]
pub struct Publisher<M> {
    topic: String,
    sender: broadcast::Sender<M>,
}

impl<M: Message> Publisher<M> {
    /// Hands `message` to the topic. Fire-and-forget: there is no delivery
    /// confirmation and no retry.
    pub fn publish(&self, message: M) {
        if self.sender.send(message).is_err() {
            trace!("No subscribers on {}, message dropped", self.topic);
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Number of receivers currently attached to the topic.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// A live subscription. Dropping it aborts the delivery task.
#[derive(Debug)]
pub struct Subscriber {
    topic: String,
    task: JoinHandle<()>,
}

impl Subscriber {
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.task.abort();
    }
}
