//! Forwarding behavior of the standard proxy over a scripted mock host
//!
//! Every test builds a pool of single-letter remotes whose behavior is
//! scripted on a `MockHost`, then checks the outcome of a call together
//! with what the host and the tracer saw.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use delegate_core::{MockHost, PeerIdentity, RemoteBehavior, RoutingMessage, SimulationIdentity};
use delegate_proxy::protocol::{self, encode_varint};
use delegate_proxy::trace::events;
use delegate_proxy::{
    AttemptError, CallContext, DEFAULT_MAX_MESSAGE_SIZE, ErrorKind, FramingError, ProxyConfig,
    ProxyError, RecordingTracer, RoutingProxy, StandardProxy,
};

type TestHost = MockHost<SimulationIdentity>;
type TestProxy = StandardProxy<SimulationIdentity, TestHost, RoutingMessage>;

fn peer(c: char) -> SimulationIdentity {
    SimulationIdentity::new(c).unwrap()
}

/// Build a host scripted with `remotes` and a proxy over all of them
fn setup(remotes: &[(char, RemoteBehavior)]) -> (Arc<TestHost>, TestProxy, RecordingTracer) {
    let mut host = MockHost::new(peer('L'));
    for (c, behavior) in remotes {
        host = host.with_remote(peer(*c), behavior.clone());
    }
    let host = Arc::new(host);
    let tracer = RecordingTracer::new();
    let pool = remotes.iter().map(|(c, _)| peer(*c)).collect();
    let proxy = TestProxy::new(host.clone(), pool).with_tracer(Arc::new(tracer.clone()));
    (host, proxy, tracer)
}

fn framed(msg: &RoutingMessage) -> Vec<u8> {
    protocol::encode_message(msg, DEFAULT_MAX_MESSAGE_SIZE).unwrap()
}

fn provider_reply() -> RoutingMessage {
    RoutingMessage::get_providers(b"cid".to_vec())
        .with_provider_peers(vec![delegate_core::PeerRecord::new(b"provider".to_vec())])
}

// ============================================================================
// Success paths
// ============================================================================

#[tokio::test]
async fn test_request_falls_through_to_working_remote() {
    let (host, proxy, tracer) = setup(&[
        ('A', RemoteBehavior::Unreachable),
        ('B', RemoteBehavior::Unreachable),
        ('C', RemoteBehavior::Echo),
    ]);
    let msg = RoutingMessage::find_node(b"target".to_vec());

    let reply = proxy.send_request(&CallContext::new(), &msg).await.unwrap();
    assert_eq!(reply, msg);

    // C is always the last remote contacted, whatever the order
    let attempts = host.connect_attempts();
    assert_eq!(attempts.last(), Some(&peer('C')));

    let recorded = tracer.events();
    assert_eq!(recorded.len(), attempts.len());
    let (last, earlier) = recorded.split_last().unwrap();
    assert_eq!(last.remote, "C");
    assert!(last.error.is_none());
    assert!(earlier.iter().all(|e| e.error.is_some()));
    assert!(recorded.iter().all(|e| e.finished));
    assert!(recorded.iter().all(|e| e.name == events::SEND_REQUEST && e.local == "L"));
}

#[tokio::test]
async fn test_request_returns_scripted_reply() {
    let reply = provider_reply();
    let (_, proxy, _) = setup(&[('A', RemoteBehavior::Reply(framed(&reply)))]);

    let got = proxy
        .send_request(&CallContext::new(), &RoutingMessage::get_providers(b"cid".to_vec()))
        .await
        .unwrap();
    assert_eq!(got, reply);
    assert_eq!(got.provider_peers.len(), 1);
}

#[tokio::test]
async fn test_no_remote_contacted_after_success() {
    let (host, proxy, tracer) = setup(&[
        ('A', RemoteBehavior::Echo),
        ('B', RemoteBehavior::Echo),
        ('C', RemoteBehavior::Echo),
    ]);

    proxy
        .send_request(&CallContext::new(), &RoutingMessage::ping())
        .await
        .unwrap();

    assert_eq!(host.connect_count(), 1);
    assert_eq!(host.streams().len(), 1);
    assert_eq!(tracer.len(), 1);
}

#[tokio::test]
async fn test_one_way_message_writes_one_frame() {
    let (host, proxy, tracer) = setup(&[('A', RemoteBehavior::Silent)]);
    let msg = RoutingMessage::add_provider(
        b"cid".to_vec(),
        delegate_core::PeerRecord::new(b"me".to_vec()).with_addr(b"/ip4/127.0.0.1".to_vec()),
    );

    proxy.send_message(&CallContext::new(), &msg).await.unwrap();

    let streams = host.streams();
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0].protocol, delegate_proxy::PROTOCOL_ID);
    assert_eq!(streams[0].bytes_written, framed(&msg).len());
    // One-way calls never read
    assert_eq!(streams[0].bytes_read, 0);
    assert_eq!(streams[0].close_count, 1);
    assert_eq!(tracer.events()[0].name, events::SEND_MESSAGE);
}

#[tokio::test]
async fn test_custom_protocol_identifier_used() {
    let host = Arc::new(MockHost::new(peer('L')).with_remote(peer('A'), RemoteBehavior::Silent));
    let config = ProxyConfig::default().with_protocol("/test/routing/2");
    let proxy = TestProxy::with_config(host.clone(), vec![peer('A')], config);

    proxy
        .send_message(&CallContext::new(), &RoutingMessage::ping())
        .await
        .unwrap();
    assert_eq!(host.streams()[0].protocol, "/test/routing/2");
}

// ============================================================================
// Failure paths
// ============================================================================

#[tokio::test]
async fn test_empty_pool_is_distinct_error() {
    let (host, proxy, tracer) = setup(&[]);

    let err = proxy
        .send_request(&CallContext::new(), &RoutingMessage::ping())
        .await
        .unwrap_err();
    assert!(err.is_no_remotes());
    assert!(err.last_error().is_none());

    let err = proxy
        .send_message(&CallContext::new(), &RoutingMessage::ping())
        .await
        .unwrap_err();
    assert!(matches!(err, ProxyError::NoRemotes));

    assert_eq!(host.connect_count(), 0);
    assert!(tracer.is_empty());
}

#[tokio::test]
async fn test_exhausted_reports_last_remote_in_traversal_order() {
    let (host, proxy, tracer) = setup(&[
        ('A', RemoteBehavior::Unreachable),
        ('B', RemoteBehavior::RefuseStream),
        ('C', RemoteBehavior::FailWrite),
    ]);

    for _ in 0..10 {
        host.reset_history();
        tracer.clear();

        let err = proxy
            .send_message(&CallContext::new(), &RoutingMessage::ping())
            .await
            .unwrap_err();
        let ProxyError::Exhausted(exhausted) = &err else {
            panic!("expected exhausted error, got {err:?}");
        };

        // Every remote tried exactly once
        let mut tried = host.connect_attempts();
        assert_eq!(tried.len(), 3);
        let last_tried = tried.last().unwrap().short_id();
        tried.sort();
        assert_eq!(tried, vec![peer('A'), peer('B'), peer('C')]);

        assert_eq!(exhausted.len(), 3);
        assert_eq!(exhausted.last().remote, last_tried);
        assert_eq!(tracer.events().last().unwrap().remote, last_tried);

        let order: Vec<_> = exhausted.attempts().map(|a| a.remote.clone()).collect();
        let traced: Vec<_> = tracer.events().into_iter().map(|e| e.remote).collect();
        assert_eq!(order, traced);

        let expected = match last_tried.as_str() {
            "A" => ErrorKind::Connection,
            _ => ErrorKind::Stream,
        };
        assert_eq!(err.kind(), expected);
    }
}

#[tokio::test]
async fn test_unknown_remote_counts_as_connection_failure() {
    let host = Arc::new(MockHost::new(peer('L')));
    let proxy = TestProxy::new(host, vec![peer('Z')]);

    let err = proxy
        .send_request(&CallContext::new(), &RoutingMessage::ping())
        .await
        .unwrap_err();
    assert!(matches!(err.last_error(), Some(AttemptError::Connection(_))));
}

#[tokio::test]
async fn test_silent_remote_is_no_response() {
    let (host, proxy, _) = setup(&[('A', RemoteBehavior::Silent)]);

    let err = proxy
        .send_request(&CallContext::new(), &RoutingMessage::ping())
        .await
        .unwrap_err();
    assert!(matches!(err.last_error(), Some(AttemptError::NoResponse)));
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert_eq!(host.streams()[0].close_count, 1);
}

#[tokio::test]
async fn test_streams_closed_once_on_every_failure() {
    let mut oversized = Vec::new();
    encode_varint(&mut oversized, DEFAULT_MAX_MESSAGE_SIZE as u64 + 1);

    let (host, proxy, tracer) = setup(&[
        ('A', RemoteBehavior::FailWrite),
        ('B', RemoteBehavior::ResetOnRead),
        ('C', RemoteBehavior::Silent),
        ('D', RemoteBehavior::Reply(oversized)),
        ('E', RemoteBehavior::Reply(vec![10, 1, 2])),
        ('F', RemoteBehavior::Reply(vec![3, 0xFF, 0xFF, 0xFF])),
    ]);

    let err = proxy
        .send_request(&CallContext::new(), &RoutingMessage::ping())
        .await
        .unwrap_err();

    let ProxyError::Exhausted(exhausted) = err else {
        panic!("expected exhausted error");
    };
    assert_eq!(exhausted.len(), 6);

    let streams = host.streams();
    assert_eq!(streams.len(), 6);
    assert!(streams.iter().all(|s| s.close_count == 1));
    assert_eq!(tracer.failures().len(), 6);

    let by_remote: HashMap<_, _> = exhausted
        .attempts()
        .map(|a| (a.remote.clone(), a.error.kind()))
        .collect();
    assert_eq!(by_remote["A"], ErrorKind::Stream);
    assert_eq!(by_remote["B"], ErrorKind::Stream);
    assert_eq!(by_remote["C"], ErrorKind::Protocol);
    assert_eq!(by_remote["D"], ErrorKind::Protocol);
    assert_eq!(by_remote["E"], ErrorKind::Protocol);
    assert_eq!(by_remote["F"], ErrorKind::Protocol);
}

#[tokio::test]
async fn test_oversized_reply_rejected_before_body() {
    let mut oversized = Vec::new();
    encode_varint(&mut oversized, DEFAULT_MAX_MESSAGE_SIZE as u64 + 1);
    let prefix_len = oversized.len();
    oversized.extend_from_slice(&[0u8; 64]);

    let (host, proxy, _) = setup(&[('A', RemoteBehavior::Reply(oversized))]);
    let err = proxy
        .send_request(&CallContext::new(), &RoutingMessage::ping())
        .await
        .unwrap_err();

    assert!(matches!(
        err.last_error(),
        Some(AttemptError::Protocol(FramingError::MessageTooLarge { .. }))
    ));
    assert_eq!(host.streams()[0].bytes_read, prefix_len);
}

#[tokio::test]
async fn test_oversized_reply_falls_back_to_next_remote() {
    let mut oversized = Vec::new();
    encode_varint(&mut oversized, DEFAULT_MAX_MESSAGE_SIZE as u64 + 1);

    let (_, proxy, tracer) = setup(&[
        ('A', RemoteBehavior::Reply(oversized)),
        ('B', RemoteBehavior::Echo),
    ]);

    for _ in 0..5 {
        tracer.clear();
        let msg = RoutingMessage::get_value(b"key".to_vec());
        let reply = proxy.send_request(&CallContext::new(), &msg).await.unwrap();
        assert_eq!(reply, msg);

        for event in tracer.failures() {
            assert_eq!(event.remote, "A");
            assert!(event.error.unwrap().contains("too large"));
        }
    }
}

#[tokio::test]
async fn test_oversized_outgoing_message_is_encode_error() {
    let host = Arc::new(MockHost::new(peer('L')).with_remote(peer('A'), RemoteBehavior::Echo));
    let config = ProxyConfig::default().with_max_message_size(16);
    let proxy = TestProxy::with_config(host.clone(), vec![peer('A')], config);

    let err = proxy
        .send_request(&CallContext::new(), &RoutingMessage::put_value(
            delegate_core::Record::new(b"key".to_vec(), vec![7u8; 128]),
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, ProxyError::Encode(FramingError::MessageTooLarge { .. })));
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(host.connect_count(), 0);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancel_interrupts_hung_remote() {
    let (host, proxy, tracer) = setup(&[
        ('A', RemoteBehavior::Hang),
        ('B', RemoteBehavior::Hang),
    ]);
    let ctx = CallContext::new();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let err = proxy
        .send_request(&ctx, &RoutingMessage::ping())
        .await
        .unwrap_err();

    assert!(matches!(err.last_error(), Some(AttemptError::Cancelled)));
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    // Iteration stops once the context is done
    assert_eq!(host.connect_count(), 1);
    assert_eq!(tracer.len(), 1);

    let streams = host.streams();
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0].close_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_interrupts_hung_remote() {
    let (host, proxy, _) = setup(&[('A', RemoteBehavior::Hang), ('B', RemoteBehavior::Hang)]);
    let ctx = CallContext::with_timeout(Duration::from_secs(5));

    let err = proxy
        .send_request(&ctx, &RoutingMessage::ping())
        .await
        .unwrap_err();

    assert!(matches!(err.last_error(), Some(AttemptError::DeadlineExceeded)));
    assert_eq!(host.connect_count(), 1);
    assert_eq!(host.streams()[0].close_count, 1);
}

#[tokio::test]
async fn test_already_cancelled_context_contacts_nobody() {
    let (host, proxy, tracer) = setup(&[('A', RemoteBehavior::Echo), ('B', RemoteBehavior::Echo)]);
    let ctx = CallContext::new();
    ctx.cancel();

    let err = proxy
        .send_request(&ctx, &RoutingMessage::ping())
        .await
        .unwrap_err();

    assert!(matches!(err.last_error(), Some(AttemptError::Cancelled)));
    assert_eq!(host.connect_count(), 0);
    assert_eq!(tracer.len(), 1);
}

// ============================================================================
// Selection and concurrency
// ============================================================================

#[tokio::test]
async fn test_first_choice_is_roughly_uniform() {
    let (host, proxy, _) = setup(&[
        ('A', RemoteBehavior::Silent),
        ('B', RemoteBehavior::Silent),
        ('C', RemoteBehavior::Silent),
        ('D', RemoteBehavior::Silent),
    ]);

    let mut firsts: HashMap<SimulationIdentity, usize> = HashMap::new();
    for _ in 0..400 {
        host.reset_history();
        proxy
            .send_message(&CallContext::new(), &RoutingMessage::ping())
            .await
            .unwrap();
        *firsts.entry(host.connect_attempts()[0]).or_default() += 1;
    }

    // Expected 100 each
    assert_eq!(firsts.len(), 4);
    assert!(firsts.values().all(|&n| n > 50), "skewed selection: {firsts:?}");
}

#[tokio::test]
async fn test_duplicate_remote_tried_twice() {
    let host = Arc::new(MockHost::new(peer('L')).with_remote(peer('A'), RemoteBehavior::Unreachable));
    let proxy = TestProxy::new(host.clone(), vec![peer('A'), peer('A')]);

    let err = proxy
        .send_message(&CallContext::new(), &RoutingMessage::ping())
        .await
        .unwrap_err();

    assert_eq!(host.connect_attempts(), vec![peer('A'), peer('A')]);
    let ProxyError::Exhausted(exhausted) = err else {
        panic!("expected exhausted error");
    };
    assert_eq!(exhausted.len(), 2);
}

#[tokio::test]
async fn test_failed_remote_gets_a_fresh_chance_next_call() {
    let (host, proxy, _) = setup(&[('A', RemoteBehavior::Unreachable)]);
    let msg = RoutingMessage::get_value(b"k".to_vec());

    let err = proxy.send_request(&CallContext::new(), &msg).await.unwrap_err();
    assert!(matches!(err.last_error(), Some(AttemptError::Connection(_))));

    // Nothing about the failure is remembered between calls
    host.set_behavior(peer('A'), RemoteBehavior::Echo);
    let reply = proxy.send_request(&CallContext::new(), &msg).await.unwrap();
    assert_eq!(reply, msg);

    host.set_behavior(peer('A'), RemoteBehavior::Silent);
    let err = proxy.send_request(&CallContext::new(), &msg).await.unwrap_err();
    assert!(matches!(err.last_error(), Some(AttemptError::NoResponse)));

    assert_eq!(host.connect_attempts(), vec![peer('A'); 3]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_proxy() {
    let (host, proxy, tracer) = setup(&[
        ('A', RemoteBehavior::Unreachable),
        ('B', RemoteBehavior::Echo),
        ('C', RemoteBehavior::RefuseStream),
    ]);

    let mut handles = Vec::new();
    for i in 0..32u8 {
        let proxy = proxy.clone();
        handles.push(tokio::spawn(async move {
            let msg = RoutingMessage::find_node(vec![i]);
            let reply = proxy.send_request(&CallContext::new(), &msg).await?;
            Ok::<_, ProxyError>((msg, reply))
        }));
    }

    for handle in handles {
        let (sent, got) = handle.await.unwrap().unwrap();
        assert_eq!(sent, got);
    }

    // B answered every call exactly once
    let b_streams = host.streams().into_iter().filter(|s| s.remote == peer('B')).count();
    assert_eq!(b_streams, 32);
    assert!(tracer.events().iter().all(|e| e.finished));
}
