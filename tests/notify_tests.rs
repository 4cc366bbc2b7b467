//! Fanout integration tests: registration windows (no replay), delivery
//! order, best-effort degradation on full or closed channels, and
//! publish/subscribe churn under concurrency.

use std::sync::Arc;

use serde_json::json;

use beacon::notify::ChangeNotifier;

#[tokio::test]
async fn registered_subscriber_receives_exactly_one_event() {
    let notifier = ChangeNotifier::default();
    let mut sub = notifier.subscribe();

    let payload = json!({"code": "GH01", "name": "General"});
    let delivered = notifier.publish("update:item", payload.clone());
    assert_eq!(delivered, 1);

    let evt = sub.recv().await.expect("event");
    assert_eq!(evt.event, "update:item");
    assert_eq!(evt.data, payload);
    assert!(sub.try_recv().is_none(), "exactly one event, no duplicates");
}

#[tokio::test]
async fn unsubscribed_subscriber_receives_nothing() {
    let notifier = ChangeNotifier::default();
    let mut sub = notifier.subscribe();
    notifier.unsubscribe(sub.id());

    assert_eq!(notifier.publish("update:item", json!({})), 0);
    assert!(sub.try_recv().is_none());
}

#[tokio::test]
async fn late_subscriber_sees_no_replay() {
    let notifier = ChangeNotifier::default();
    notifier.publish("update:item", json!({"n": 1}));

    let mut sub = notifier.subscribe();
    assert!(sub.try_recv().is_none(), "events published before registration are never delivered");
}

#[tokio::test]
async fn events_arrive_in_publish_order() {
    let notifier = ChangeNotifier::default();
    let mut sub = notifier.subscribe();

    for n in 1..=3 {
        notifier.publish("update:item", json!({"n": n}));
    }
    for n in 1..=3 {
        let evt = sub.recv().await.expect("event");
        assert_eq!(evt.data, json!({"n": n}));
    }
}

#[tokio::test]
async fn full_subscriber_never_blocks_the_publisher() {
    let notifier = ChangeNotifier::new(1);
    let mut stalled = notifier.subscribe(); // never drained while publishing
    let mut live = notifier.subscribe();

    // returns immediately every time; the stalled queue just loses events
    for n in 0..10 {
        notifier.publish("update:item", json!({"n": n}));
        let evt = live.try_recv().expect("a stalled peer must not cost the live subscriber events");
        assert_eq!(evt.data, json!({"n": n}));
    }

    let first = stalled.try_recv().expect("the first event fit the queue");
    assert_eq!(first.data, json!({"n": 0}));
    assert!(stalled.try_recv().is_none(), "overflow drops the newest events");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn publish_survives_subscribe_unsubscribe_churn() {
    let notifier = Arc::new(ChangeNotifier::new(256));
    let mut persistent = notifier.subscribe();

    let publisher = {
        let notifier = Arc::clone(&notifier);
        tokio::spawn(async move {
            for n in 0..100u64 {
                notifier.publish("update:item", json!({"n": n}));
                tokio::task::yield_now().await;
            }
        })
    };
    let churn = {
        let notifier = Arc::clone(&notifier);
        tokio::spawn(async move {
            for _ in 0..50 {
                let sub = notifier.subscribe();
                tokio::task::yield_now().await;
                notifier.unsubscribe(sub.id());
            }
        })
    };
    let (publisher, churn) = futures::future::join(publisher, churn).await;
    publisher.expect("publisher");
    churn.expect("churn");

    // the subscriber registered throughout observed every event, in order
    let mut seen = 0u64;
    while let Some(evt) = persistent.try_recv() {
        assert_eq!(evt.data, json!({"n": seen}));
        seen += 1;
    }
    assert_eq!(seen, 100);
    notifier.unsubscribe(persistent.id());
    assert_eq!(notifier.subscriber_count(), 0, "churned subscribers were all removed");
}

#[tokio::test]
async fn dropped_receiver_is_pruned_and_publish_succeeds() {
    let notifier = ChangeNotifier::default();
    let gone = notifier.subscribe();
    let mut alive = notifier.subscribe();
    drop(gone);

    let delivered = notifier.publish("delete:item", json!({"code": "GH01"}));
    assert_eq!(delivered, 1, "publish keeps going past a closed channel");
    assert!(alive.recv().await.is_some());
    assert_eq!(notifier.subscriber_count(), 1);
}
