//! Core Functionality Tests - FIFO hand-off between producer and consumer

#[cfg(test)]
mod tests {
    use crate::queue::{Message, MessageQueue, QueueItem};

    #[tokio::test]
    async fn test_core_put_get_workflow() {
        let queue = MessageQueue::new();
        let publisher = queue.create_publisher("test-producer");
        let mut consumer = queue.into_consumer();

        let message = Message::with_instance_name("test-producer", "cattle-aaaa");
        let id = message.message_id();
        publisher.put(message).unwrap();

        match consumer.get().await {
            Some(QueueItem::Message(received)) => {
                assert_eq!(received.message_id(), id);
                assert_eq!(received.producer_id(), "test-producer");
            }
            other => panic!("Expected a message, got: {:?}", other),
        }

        assert!(consumer.try_get().is_none());
    }

    #[tokio::test]
    async fn test_single_producer_order_is_preserved() {
        let queue = MessageQueue::new();
        let publisher = queue.create_publisher("ordered");
        let mut consumer = queue.into_consumer();

        let names: Vec<String> = (0..100).map(|i| format!("cattle-{i:04}")).collect();
        for name in &names {
            publisher
                .put(Message::with_instance_name("ordered", name.clone()))
                .unwrap();
        }
        publisher.finish().unwrap();

        let mut received = Vec::new();
        while let Some(item) = consumer.get().await {
            match item {
                QueueItem::Message(message) => received.push(message.instance_name().to_string()),
                QueueItem::Done { producer_id } => {
                    assert_eq!(producer_id, "ordered");
                    break;
                }
            }
        }

        assert_eq!(received, names);
    }

    #[tokio::test]
    async fn test_sentinel_arrives_after_messages() {
        let queue = MessageQueue::new();
        let publisher = queue.create_publisher("p");
        let mut consumer = queue.into_consumer();

        publisher.put(Message::new("p")).unwrap();
        publisher.put(Message::new("p")).unwrap();
        publisher.finish().unwrap();

        assert!(matches!(consumer.get().await, Some(QueueItem::Message(_))));
        assert!(matches!(consumer.get().await, Some(QueueItem::Message(_))));
        assert!(matches!(
            consumer.get().await,
            Some(QueueItem::Done { .. })
        ));
    }

    #[tokio::test]
    async fn test_stream_ends_when_publishers_dropped() {
        let queue = MessageQueue::new();
        let publisher = queue.create_publisher("p");
        let mut consumer = queue.into_consumer();

        publisher.put(Message::new("p")).unwrap();
        drop(publisher);

        assert!(matches!(consumer.get().await, Some(QueueItem::Message(_))));
        assert!(consumer.get().await.is_none());
    }
}
