use framepipe::engine::{BoundedFrameQueue, Dequeued, QueueClosed};
use std::collections::BTreeSet;
use tokio::time::Duration;
use tokio_test::{assert_pending, assert_ready, task};

const WAIT: Duration = Duration::from_millis(50);

#[tokio::test]
async fn test_full_queue_suspends_producer() {
    // capacity 2: third enqueue waits until a consumer makes room
    let queue = BoundedFrameQueue::new(2);
    queue.enqueue(1).await.unwrap();
    queue.enqueue(2).await.unwrap();

    let mut third = task::spawn(queue.enqueue(3));
    assert_pending!(third.poll());

    assert!(matches!(queue.dequeue(WAIT).await, Dequeued::Item(1)));
    assert!(third.is_woken());
    assert!(assert_ready!(third.poll()).is_ok());
    drop(third);

    assert!(matches!(queue.dequeue(WAIT).await, Dequeued::Item(2)));
    assert!(matches!(queue.dequeue(WAIT).await, Dequeued::Item(3)));
}

#[tokio::test]
async fn test_empty_queue_times_out() {
    let queue = BoundedFrameQueue::<u32>::new(2);
    assert!(matches!(queue.dequeue(WAIT).await, Dequeued::TimedOut));
    // a timeout is not end of stream
    assert!(!queue.is_closed());
}

#[tokio::test]
async fn test_close_drains_then_reports_closed() {
    let queue = BoundedFrameQueue::new(4);
    queue.enqueue("a").await.unwrap();
    queue.enqueue("b").await.unwrap();
    queue.close();
    assert!(queue.is_closed());

    assert!(matches!(queue.dequeue(WAIT).await, Dequeued::Item("a")));
    assert!(matches!(queue.dequeue(WAIT).await, Dequeued::Item("b")));
    assert!(matches!(queue.dequeue(WAIT).await, Dequeued::Closed));
}

#[tokio::test]
async fn test_enqueue_after_close_returns_item() {
    let queue = BoundedFrameQueue::new(1);
    queue.close();

    match queue.enqueue(42).await {
        Err(QueueClosed(item)) => assert_eq!(item, 42),
        Ok(()) => panic!("enqueue succeeded on a closed queue"),
    }
}

#[tokio::test]
async fn test_drain_takes_everything_queued() {
    let queue = BoundedFrameQueue::new(8);
    for i in 0..5 {
        queue.enqueue(i).await.unwrap();
    }

    assert_eq!(queue.drain().await, vec![0, 1, 2, 3, 4]);
    assert_eq!(queue.size(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_consumers_see_each_item_once() {
    let queue = BoundedFrameQueue::new(8);
    let consumers: Vec<_> = (0..4)
        .map(|_| {
            let queue = queue.clone();
            tokio::spawn(async move {
                let mut seen = Vec::new();
                loop {
                    match queue.dequeue(WAIT).await {
                        Dequeued::Item(n) => seen.push(n),
                        Dequeued::TimedOut => continue,
                        Dequeued::Closed => break,
                    }
                }
                seen
            })
        })
        .collect();

    for i in 0..200u32 {
        queue.enqueue(i).await.unwrap();
    }
    queue.close();

    let mut all = Vec::new();
    for consumer in consumers {
        all.extend(consumer.await.unwrap());
    }
    assert_eq!(all.len(), 200);
    let unique: BTreeSet<u32> = all.into_iter().collect();
    assert_eq!(unique, (0..200).collect());
}
