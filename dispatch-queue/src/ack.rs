use lapin::Channel;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use log::warn;
use tokio::sync::mpsc;

/// An ack or nack destined for the broker's I/O-owning task, identified
/// by delivery tag.
pub enum AckMsg {
    Ack(u64),
    Nack { delivery_tag: u64, requeue: bool },
}

/// Handed to worker tasks instead of the channel itself. Workers must
/// never ack/nack a delivery directly; only the task spawned by
/// [`spawn_ack_owner`] touches the channel, mirroring the
/// `add_callback_threadsafe` marshalling the source system uses to keep
/// acks on the connection's own thread.
#[derive(Clone)]
pub struct AckHandle {
    tx: mpsc::UnboundedSender<AckMsg>,
}

impl AckHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<AckMsg>) -> Self {
        Self { tx }
    }

    pub fn ack(&self, delivery_tag: u64) {
        if self.tx.send(AckMsg::Ack(delivery_tag)).is_err() {
            warn!("ack owner task is gone, delivery {delivery_tag} not acknowledged");
        }
    }

    pub fn nack(&self, delivery_tag: u64, requeue: bool) {
        if self
            .tx
            .send(AckMsg::Nack { delivery_tag, requeue })
            .is_err()
        {
            warn!("ack owner task is gone, delivery {delivery_tag} not nacked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ack_hands_the_delivery_tag_to_the_owner_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = AckHandle::new(tx);

        handle.ack(42);

        match rx.recv().await.expect("ack message should have been sent") {
            AckMsg::Ack(delivery_tag) => assert_eq!(delivery_tag, 42),
            AckMsg::Nack { .. } => panic!("expected an Ack message"),
        }
    }

    #[tokio::test]
    async fn nack_carries_the_requeue_flag() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = AckHandle::new(tx);

        handle.nack(7, true);

        match rx.recv().await.expect("nack message should have been sent") {
            AckMsg::Nack { delivery_tag, requeue } => {
                assert_eq!(delivery_tag, 7);
                assert!(requeue);
            }
            AckMsg::Ack(_) => panic!("expected a Nack message"),
        }
    }

    #[test]
    fn ack_after_owner_is_gone_does_not_panic() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = AckHandle::new(tx);
        drop(rx);

        handle.ack(1);
        handle.nack(2, false);
    }
}

pub(crate) fn spawn_ack_owner(channel: Channel, mut rx: mpsc::UnboundedReceiver<AckMsg>) {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let result = match msg {
                AckMsg::Ack(delivery_tag) => {
                    channel.basic_ack(delivery_tag, BasicAckOptions::default()).await
                }
                AckMsg::Nack { delivery_tag, requeue } => {
                    channel
                        .basic_nack(delivery_tag, BasicNackOptions { requeue, ..Default::default() })
                        .await
                }
            };
            if let Err(err) = result {
                warn!("ack/nack against the broker failed: {err}");
            }
        }
    });
}
