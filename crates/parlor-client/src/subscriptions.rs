//! Room notification fan-out.
//!
//! Every room has one broadcast channel. Publishing never blocks: a
//! subscriber that falls more than the channel capacity behind loses the
//! oldest notifications and is told how many it missed.

use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};

use crate::event::RoomNotification;

/// Publishing side, shared by the driver and its clones.
#[derive(Debug, Clone)]
pub struct Subscriptions {
    sender: broadcast::Sender<RoomNotification>,
}

impl Subscriptions {
    /// Channel buffering `capacity` notifications per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// New subscriber. It only sees notifications published after this call.
    pub fn subscribe(&self) -> Subscription {
        Subscription { receiver: self.sender.subscribe() }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Deliver to every subscriber.
    pub fn publish(&self, notification: RoomNotification) {
        if self.sender.send(notification).is_err() {
            tracing::trace!("notification dropped, no subscribers");
        }
    }
}

/// Receiving side of a room's notifications.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<RoomNotification>,
}

impl Subscription {
    /// Next notification, or `None` once the room is gone.
    ///
    /// Lag is logged and skipped over.
    pub async fn recv(&mut self) -> Option<RoomNotification> {
        loop {
            match self.receiver.recv().await {
                Ok(notification) => return Some(notification),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscriber lagged, notifications lost");
                },
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next buffered notification without waiting.
    pub fn try_recv(&mut self) -> Option<RoomNotification> {
        loop {
            match self.receiver.try_recv() {
                Ok(notification) => return Some(notification),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscriber lagged, notifications lost");
                },
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Drain everything currently buffered.
    pub fn drain(&mut self) -> Vec<RoomNotification> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

#[cfg(test)]
mod tests {
    use parlor_proto::RoomId;

    use super::*;

    fn changed(n: u8) -> RoomNotification {
        RoomNotification::StateChanged { room_id: RoomId::new(format!("!{n}:x")) }
    }

    #[test]
    fn every_subscriber_sees_every_notification() {
        let subscriptions = Subscriptions::new(8);
        let mut a = subscriptions.subscribe();
        let mut b = subscriptions.subscribe();
        subscriptions.publish(changed(1));

        assert_eq!(a.drain().len(), 1);
        assert_eq!(b.drain().len(), 1);
    }

    #[test]
    fn lagging_subscriber_keeps_newest() {
        let subscriptions = Subscriptions::new(2);
        let mut slow = subscriptions.subscribe();
        for n in 0..5 {
            subscriptions.publish(changed(n));
        }

        let rooms: Vec<_> = slow.drain().iter().map(|n| n.room_id().to_string()).collect();
        assert_eq!(rooms, vec!["!3:x", "!4:x"]);
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let subscriptions = Subscriptions::new(2);
        subscriptions.publish(changed(0));
        assert_eq!(subscriptions.subscriber_count(), 0);
    }
}
