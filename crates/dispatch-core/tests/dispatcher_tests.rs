//! Request dispatch: handler resolution, pipeline order, caching, cancellation

mod common;

use common::*;
use dispatch_core::{
    DispatchError, Dispatcher, DispatcherOptions, MessageSettings, TimeoutPolicy,
};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_send_without_handler_is_not_found() {
    let dispatcher = Dispatcher::builder().build();

    let err = dispatcher.send(&Ping::new("hello")).await.unwrap_err();
    match err {
        DispatchError::HandlerNotFound { request_type } => assert_eq!(request_type, "Ping"),
        other => panic!("expected HandlerNotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_send_with_one_handler_returns_response() {
    let journal = Journal::new();
    let dispatcher = Dispatcher::builder()
        .request_handler(PingHandler { journal: journal.clone() })
        .build();

    let response = assert_ok!(dispatcher.send(&Ping::new("hello")).await);
    assert_eq!(response, "pong: hello");
    assert_eq!(journal.entries(), vec!["H"]);
}

#[tokio::test]
async fn test_send_with_two_handlers_is_ambiguous() {
    let journal = Journal::new();
    let dispatcher = Dispatcher::builder()
        .request_handler(PingHandler { journal: journal.clone() })
        .request_handler(PingHandler { journal: journal.clone() })
        .build();

    let err = dispatcher.send(&Ping::new("hello")).await.unwrap_err();
    assert!(matches!(err, DispatchError::AmbiguousHandler { count: 2, .. }));
    assert!(journal.entries().is_empty(), "no handler may run");
}

#[tokio::test]
async fn test_behaviors_wrap_in_registration_order() {
    let journal = Journal::new();
    let dispatcher = Dispatcher::builder()
        .request_behavior(Tag::new("B1", &journal))
        .request_behavior_for(PingTag { name: "B2", journal: journal.clone() })
        .request_behavior(Tag::new("B3", &journal))
        .request_handler(PingHandler { journal: journal.clone() })
        .build();

    assert_ok!(dispatcher.send(&Ping::new("x")).await);
    assert_eq!(
        journal.entries(),
        vec!["B1 before", "B2 before", "B3 before", "H", "B3 after", "B2 after", "B1 after"]
    );
}

#[tokio::test]
async fn test_behavior_can_short_circuit() {
    let journal = Journal::new();
    let dispatcher = Dispatcher::builder()
        .request_behavior(Tag::new("outer", &journal))
        .request_behavior(Reject)
        .request_handler(PingHandler { journal: journal.clone() })
        .build();

    let err = dispatcher.send(&Ping::new("x")).await.unwrap_err();
    assert!(is_handler_error(&err));
    assert_eq!(err.to_string(), "Ping rejected");
    assert_eq!(journal.entries(), vec!["outer before", "outer after"]);
}

#[tokio::test]
async fn test_wrong_payload_from_open_behavior() {
    let journal = Journal::new();
    let dispatcher = Dispatcher::builder()
        .request_behavior(WrongPayload)
        .request_handler(PingHandler { journal })
        .build();

    let err = dispatcher.send(&Ping::new("x")).await.unwrap_err();
    assert!(matches!(err, DispatchError::PayloadMismatch { message_type: "Ping" }));
}

#[tokio::test]
async fn test_open_behaviors_apply_to_unit_responses() {
    let journal = Journal::new();
    let calls = Counter::new();
    let dispatcher = Dispatcher::builder()
        .request_behavior(Tag::new("B1", &journal))
        .request_handler(SleepHandler { calls: calls.clone() })
        .build();

    assert_ok!(dispatcher.send_void(&Sleep { delay: Duration::ZERO }).await);
    assert_eq!(calls.get(), 1);
    assert_eq!(journal.entries(), vec!["B1 before", "B1 after"]);
}

#[tokio::test]
async fn test_handler_error_passes_through_without_behaviors() {
    let calls = Counter::new();
    let dispatcher = Dispatcher::builder()
        .request_handler(ScriptedCharge::failing(1, calls.clone()))
        .build();

    let err = assert_err!(dispatcher.send(&Charge { amount: 10 }).await);
    assert!(is_handler_error(&err));
    assert!(err.to_string().contains("payment gateway unavailable"));
    assert_eq!(calls.get(), 1);
}

#[tokio::test]
async fn test_routes_are_cached_per_type() {
    let journal = Journal::new();
    let dispatcher = Dispatcher::builder()
        .request_handler(PingHandler { journal: journal.clone() })
        .build();

    assert_eq!(dispatcher.cached_routes(), 0);
    assert_ok!(dispatcher.send(&Ping::new("a")).await);
    assert_ok!(dispatcher.send(&Ping::new("b")).await);
    assert_eq!(dispatcher.cached_routes(), 1);
    assert_eq!(journal.entries(), vec!["H", "H"]);
}

#[tokio::test]
async fn test_cache_disabled_resolves_every_time() {
    let journal = Journal::new();
    let dispatcher = Dispatcher::builder()
        .options(DispatcherOptions::default().with_pipeline_cache(false))
        .request_handler(PingHandler { journal: journal.clone() })
        .build();

    assert_ok!(dispatcher.send(&Ping::new("a")).await);
    assert_ok!(dispatcher.send(&Ping::new("b")).await);
    assert_eq!(dispatcher.cached_routes(), 0);
    assert_eq!(journal.entries(), vec!["H", "H"]);
}

#[tokio::test]
async fn test_not_found_is_not_cached() {
    let dispatcher = Dispatcher::builder().build();
    assert!(dispatcher.send(&Ping::new("a")).await.is_err());
    assert_eq!(dispatcher.cached_routes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelling_token_aborts_request() {
    let calls = Counter::new();
    let dispatcher = Dispatcher::builder()
        .request_handler(SleepHandler { calls: calls.clone() })
        .build();

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let err = dispatcher
        .send_with_token(&Sleep { delay: Duration::from_secs(10) }, token)
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Cancelled { message_type: "Sleep" }));
    assert_eq!(calls.get(), 1);
}

#[tokio::test]
async fn test_already_cancelled_token_never_reaches_handler() {
    let calls = Counter::new();
    let dispatcher = Dispatcher::builder()
        .request_handler(SleepHandler { calls: calls.clone() })
        .build();

    let token = CancellationToken::new();
    token.cancel();

    let err = dispatcher
        .send_with_token(&Sleep { delay: Duration::ZERO }, token)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(calls.get(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_core_behaviors_wrap_handler_failures() {
    let calls = Counter::new();
    let dispatcher = Dispatcher::builder()
        .with_core_behaviors()
        .request_handler(ScriptedCharge::failing(1, calls.clone()))
        .build();

    let err = dispatcher.send(&Charge { amount: 5 }).await.unwrap_err();
    match &err {
        DispatchError::Unhandled { message_type, source } => {
            assert_eq!(*message_type, "Charge");
            assert!(is_handler_error(source));
        }
        other => panic!("expected Unhandled, got {:?}", other),
    }
    assert_eq!(err.to_string(), "Failed to execute Charge");
}

#[tokio::test(start_paused = true)]
async fn test_core_behaviors_use_default_timeout() {
    let calls = Counter::new();
    let dispatcher = Dispatcher::builder()
        .options(DispatcherOptions::default().with_default_timeout(TimeoutPolicy::After(Duration::from_millis(50))))
        .with_core_behaviors()
        .request_handler(SleepHandler { calls })
        .build();

    let err = dispatcher
        .send(&Sleep { delay: Duration::from_millis(200) })
        .await
        .unwrap_err();
    // timeouts are library errors and pass the exception behavior unchanged
    assert!(matches!(err, DispatchError::Timeout { duration_ms: 50, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_per_type_settings_override_default_timeout() {
    let calls = Counter::new();
    let dispatcher = Dispatcher::builder()
        .options(DispatcherOptions::default().with_default_timeout(TimeoutPolicy::After(Duration::from_millis(50))))
        .with_core_behaviors()
        .configure::<Sleep>(MessageSettings::new().with_infinite_timeout())
        .request_handler(SleepHandler { calls: calls.clone() })
        .build();

    assert_ok!(dispatcher.send(&Sleep { delay: Duration::from_secs(60) }).await);
    assert_eq!(calls.get(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_default_behaviors_stop_retrying_once_circuit_opens() {
    let calls = Counter::new();
    let dispatcher = Dispatcher::builder()
        .with_default_behaviors()
        .request_handler(ScriptedCharge::failing(10, calls.clone()))
        .build();

    // retry sits outside the breaker: three failures open the circuit and the
    // next retry is rejected without reaching the handler
    let err = dispatcher.send(&Charge { amount: 1 }).await.unwrap_err();
    assert!(matches!(err, DispatchError::CircuitOpen { message_type: "Charge" }));
    assert_eq!(calls.get(), 3);

    let breakers = dispatcher.circuit_breakers().expect("advanced behaviors installed");
    assert_eq!(
        breakers.state::<Charge>(),
        Some(dispatch_core::behaviors::CircuitState::Open)
    );
}

#[tokio::test(start_paused = true)]
async fn test_default_behaviors_recover_transient_failure() {
    let calls = Counter::new();
    let dispatcher = Dispatcher::builder()
        .with_default_behaviors()
        .request_handler(ScriptedCharge::failing(2, calls.clone()))
        .build();

    let charged = assert_ok!(dispatcher.send(&Charge { amount: 42 }).await);
    assert_eq!(charged, 42);
    assert_eq!(calls.get(), 3);
}
