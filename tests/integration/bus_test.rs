use devbot::core::diagnostics::{BusCapacity, EventBus};
use futures_util::StreamExt;
use tokio::time::{timeout, Duration};

#[test]
fn test_replay_never_exceeds_capacity() {
    let bus = EventBus::new("test", BusCapacity::CRASH);
    for i in 0..(BusCapacity::CRASH.replay * 3) {
        bus.publish(i);
        assert!(bus.replay().len() <= BusCapacity::CRASH.replay);
    }

    let replay = bus.replay();
    assert_eq!(replay.len(), 10);
    assert_eq!(replay.first(), Some(&20));
    assert_eq!(replay.last(), Some(&29));
}

#[test]
fn test_publish_without_subscribers_is_not_an_error() {
    let bus = EventBus::new("test", BusCapacity::new(2, 2));
    bus.publish("a");
    bus.publish("b");
    bus.publish("c");
    assert_eq!(bus.replay(), vec!["b", "c"]);
    assert_eq!(bus.dropped_count(), 0);
}

#[test]
fn test_overflow_drops_for_full_subscriber_only() {
    let capacity = BusCapacity::new(2, 3);
    let bus = EventBus::new("test", capacity);
    let mut stalled = bus.subscribe();
    let mut draining = bus.subscribe();

    let mut received = Vec::new();
    for i in 0..20 {
        // Never blocks even though `stalled` is full
        bus.publish(i);
        received.extend(draining.drain());
    }

    assert_eq!(received, (0..20).collect::<Vec<_>>());
    assert_eq!(stalled.drain().len(), capacity.subscriber_queue());
    assert_eq!(bus.dropped_count(), 20 - capacity.subscriber_queue() as u64);
    // Replay evicts oldest
    assert_eq!(bus.replay(), vec![18, 19]);
}

#[test]
fn test_read_only_stream_view() {
    let bus = EventBus::new("test", BusCapacity::new(3, 3));
    let stream = bus.stream();
    bus.publish(1);
    bus.publish(2);

    assert_eq!(stream.replay(), vec![1, 2]);
    let mut sub = stream.subscribe();
    assert_eq!(sub.drain(), vec![1, 2]);
    assert_eq!(stream.dropped_count(), 0);
}

#[tokio::test]
async fn test_subscription_as_stream() {
    let bus = EventBus::new("test", BusCapacity::new(0, 8));
    let sub = bus.subscribe();

    let producer = {
        let bus = bus.clone();
        tokio::spawn(async move {
            for i in 0..5 {
                bus.publish(i);
                tokio::task::yield_now().await;
            }
        })
    };

    let collected: Vec<i32> = timeout(Duration::from_secs(5), sub.take(5).collect())
        .await
        .unwrap();
    producer.await.unwrap();
    assert_eq!(collected, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_recv_ends_when_bus_is_gone() {
    let bus = EventBus::new("test", BusCapacity::new(1, 1));
    bus.publish(7);
    let mut sub = bus.subscribe();
    drop(bus);

    assert_eq!(sub.recv().await, Some(7));
    assert_eq!(sub.recv().await, None);
}
