//! Tests for the workers, the supervisor and startup assembly.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use acmemesh_gpio::{KernelId, MemoryPins, PinInfo};
use acmemesh_mesh::{Connector, Message, PipeConnector, PipePeer, Session, SessionError, new_pipe};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::logger::CapturingLogger;

// =============================================================================
// Fixtures
// =============================================================================

#[derive(Default)]
struct FakeSystem {
    debug: AtomicBool,
    shutdowns: AtomicUsize,
}

#[async_trait]
impl SystemControl for FakeSystem {
    fn now(&self) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2015, 2, 7)
            .unwrap()
            .and_hms_opt(18, 30, 5)
            .unwrap()
    }

    async fn ip_address(&self) -> Option<String> {
        Some("192.168.10.10".to_string())
    }

    async fn shutdown(&self) -> io::Result<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_debug(&self, on: bool) {
        self.debug.store(on, Ordering::SeqCst);
    }
}

fn four_pins() -> Vec<PinInfo> {
    vec![
        PinInfo::new("J4.7", "PA23").unwrap(),
        PinInfo::new("J4.8", "PA22").unwrap(),
        PinInfo::new("J4.10", "PA21").unwrap(),
        PinInfo::new("J4.11", "PA24").unwrap(),
    ]
}

fn registry() -> (RegistryHandle, Arc<MemoryPins>) {
    let pins = Arc::new(MemoryPins::with_catalog(four_pins()));
    let handle = spawn_registry(PinRegistry::new(pins.clone(), four_pins()));
    (handle, pins)
}

fn fast_options() -> SupervisorOptions {
    SupervisorOptions {
        retry_limit: 1,
        reset_retries_on_connect: false,
        connect_delay: Duration::from_millis(10),
        cooldown: Duration::from_millis(20),
        poll_interval: Duration::from_millis(100),
        settle: Duration::from_millis(50),
        inputs: Vec::new(),
        inverted: Vec::new(),
    }
}

async fn wait_for_state(rx: &mut broadcast::Receiver<SupervisorEvent>, state: ConnectionState) {
    loop {
        match rx.recv().await.unwrap() {
            SupervisorEvent::State(s) if s == state => return,
            _ => {}
        }
    }
}

fn drain(rx: &mut broadcast::Receiver<SupervisorEvent>) -> Vec<SupervisorEvent> {
    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    events
}

async fn wait_for_value(reg: &RegistryHandle, index: usize, value: Option<u8>) {
    for _ in 0..100 {
        if reg.snapshot().await.unwrap()[index].value == value {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("pin {} never reached {:?}", index, value);
}

fn new_listener(
    reg: &RegistryHandle,
    system: Arc<FakeSystem>,
    logger: Arc<CapturingLogger>,
) -> (Listener, PipePeer) {
    let (session, peer) = new_pipe();
    let session: Arc<dyn Session> = Arc::new(session);
    (Listener::new(session, reg.clone(), system, logger), peer)
}

// =============================================================================
// Listener
// =============================================================================

#[tokio::test]
async fn test_listener_skips_bad_tokens() {
    let (reg, pins) = registry();
    let logger = Arc::new(CapturingLogger::default());
    let (listener, _peer) = new_listener(&reg, Arc::new(FakeSystem::default()), logger.clone());

    let msg = Message::Broadcast(vec![
        "pinPA23on".to_string(),
        "bogus".to_string(),
        "pinJ9.9on".to_string(),
        "pinpattern 1x".to_string(),
        "pinj4.8on".to_string(),
    ]);
    assert_eq!(listener.handle_message(msg).await, Ok(None));

    assert_eq!(pins.level(KernelId(55)), 1);
    assert_eq!(pins.level(KernelId(54)), 1);
    assert!(logger.contains("error", "bogus"));
    assert!(logger.contains("error", "J9.9"));
    assert!(logger.contains("error", "pinpattern"));
}

#[tokio::test]
async fn test_listener_all_and_pattern() {
    let (reg, _) = registry();
    let logger = Arc::new(CapturingLogger::default());
    let (listener, _peer) = new_listener(&reg, Arc::new(FakeSystem::default()), logger);

    listener.apply(Command::SetAll { on: true }).await.unwrap();
    let snap = reg.snapshot().await.unwrap();
    assert!(snap.iter().all(|p| p.value == Some(1)));

    listener
        .apply(Command::SetPattern {
            bits: "0011".to_string(),
        })
        .await
        .unwrap();
    let values: Vec<_> = reg.snapshot().await.unwrap().iter().map(|p| p.value).collect();
    assert_eq!(values, vec![Some(0), Some(0), Some(1), Some(1)]);
}

#[tokio::test]
async fn test_listener_replies() {
    let (reg, _) = registry();
    let system = Arc::new(FakeSystem::default());
    let (listener, peer) = new_listener(&reg, system.clone(), Arc::new(CapturingLogger::default()));

    let msg = Message::Broadcast(vec![
        "gettime".to_string(),
        "getip".to_string(),
        "getversion".to_string(),
        "sghdebug on".to_string(),
        "shutdown".to_string(),
    ]);
    listener.handle_message(msg).await.unwrap();

    let time = peer.recv_report().await.unwrap();
    assert_eq!(time.get("fulldatetime"), Some("20150207183005"));
    assert_eq!(time.get("hours"), Some("18"));
    let ip = peer.recv_report().await.unwrap();
    assert_eq!(ip.get("ipaddress"), Some("192.168.10.10"));
    let version = peer.recv_report().await.unwrap();
    assert_eq!(version.get("version"), Some(system::VERSION));

    assert!(system.debug.load(Ordering::SeqCst));
    assert_eq!(system.shutdowns.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_listener_ignores_sensor_updates() {
    let (reg, pins) = registry();
    let logger = Arc::new(CapturingLogger::default());
    let (listener, _peer) = new_listener(&reg, Arc::new(FakeSystem::default()), logger.clone());

    let msg = Message::SensorUpdate(vec![
        ("pinJ4.7".to_string(), "1".to_string()),
        ("pinJ4.8".to_string(), "high".to_string()),
        ("pinJ4.9".to_string(), "2.5".to_string()),
    ]);
    listener.handle_message(msg).await.unwrap();
    listener
        .handle_message(Message::Unknown("peer-name".to_string()))
        .await
        .unwrap();

    assert_eq!(pins.write_count(), 0);
    assert!(logger.contains("error", "pinJ4.8"));
    assert!(logger.contains("debug", "echo of pin J4.7: 1"));
    assert!(logger.contains("warn", "J4.9"));
    assert!(logger.contains("debug", "recv sensor-update"));
    assert!(logger.contains("error", "peer-name"));
}

#[tokio::test]
async fn test_listener_run_ends() {
    let (reg, _) = registry();
    let system = Arc::new(FakeSystem::default());

    // Stop command, with a token after it that must not run.
    let (listener, peer) = new_listener(&reg, system.clone(), Arc::new(CapturingLogger::default()));
    peer.send(Message::Broadcast(vec![
        "stophandler".to_string(),
        "allon".to_string(),
    ]))
    .await
    .unwrap();
    assert_eq!(
        listener.run(CancellationToken::new()).await,
        Ok(ListenerExit::StopRequested)
    );
    assert!(reg.snapshot().await.unwrap().iter().all(|p| p.value.is_none()));

    // Broken session.
    let (listener, peer) = new_listener(&reg, system.clone(), Arc::new(CapturingLogger::default()));
    peer.break_with(SessionError::Io("reset".to_string()));
    assert_eq!(
        listener.run(CancellationToken::new()).await,
        Err(SessionError::Io("reset".to_string()))
    );

    // Cancelled.
    let (listener, _peer) = new_listener(&reg, system, Arc::new(CapturingLogger::default()));
    let cancel = CancellationToken::new();
    cancel.cancel();
    assert_eq!(listener.run(cancel).await, Ok(ListenerExit::Cancelled));
}

// =============================================================================
// Notifier
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_notifier_batches_changes() {
    let (reg, pins) = registry();
    reg.set_mode("J4.7", PinMode::Input).await.unwrap();
    reg.set_mode("J4.10", PinMode::Input).await.unwrap();

    let (session, peer) = new_pipe();
    let notifier = Notifier::new(Arc::new(session), reg.clone(), Arc::new(NopLogger));

    // First cycle reports the initial level of both inputs.
    assert_eq!(notifier.poll_once().await, Ok(2));
    let report = peer.recv_report().await.unwrap();
    assert_eq!(report.get("pinJ4.7"), Some("0"));
    assert_eq!(report.get("pinJ4.10"), Some("0"));

    assert_eq!(notifier.poll_once().await, Ok(0));
    assert!(peer.try_recv_report().is_none());

    pins.set_level(KernelId(53), 1);
    let before = tokio::time::Instant::now();
    assert_eq!(notifier.poll_once().await, Ok(1));
    assert!(before.elapsed() >= DEFAULT_SETTLE);
    let report = peer.recv_report().await.unwrap();
    assert_eq!(report.pairs(), &[("pinJ4.10".to_string(), "1".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn test_notifier_run_stops_on_send_failure() {
    let (reg, pins) = registry();
    reg.set_mode("J4.7", PinMode::Input).await.unwrap();
    let (session, peer) = new_pipe();
    let notifier = Notifier::new(Arc::new(session), reg.clone(), Arc::new(NopLogger))
        .with_period(Duration::from_millis(100));

    let task = tokio::spawn(notifier.run(CancellationToken::new()));
    assert!(peer.recv_report().await.is_some());

    peer.break_with(SessionError::Closed);
    pins.set_level(KernelId(55), 1);
    assert_eq!(task.await.unwrap(), Err(SessionError::Closed));
}

// =============================================================================
// Supervisor
// =============================================================================

fn supervisor(
    connector: Arc<PipeConnector>,
    reg: &RegistryHandle,
    options: SupervisorOptions,
) -> Supervisor {
    Supervisor::new(connector, reg.clone(), Arc::new(FakeSystem::default()), options)
        .with_logger(Arc::new(NopLogger))
}

#[tokio::test(start_paused = true)]
async fn test_supervisor_disconnect_cycle() {
    let (reg, _) = registry();
    let connector = Arc::new(PipeConnector::new());
    let (session, peer) = new_pipe();
    connector.push_session(session);

    let sup = supervisor(connector.clone(), &reg, fast_options());
    let mut events = sup.subscribe();
    let mut watch = sup.state();
    let task = tokio::spawn(async move { sup.run(CancellationToken::new()).await });

    let mut observer = events.resubscribe();
    wait_for_state(&mut observer, ConnectionState::Running).await;
    assert_eq!(*watch.borrow_and_update(), ConnectionState::Running);

    // Two messages, then the session breaks.
    peer.broadcast("pinJ4.7on").await.unwrap();
    peer.broadcast("pinJ4.11on").await.unwrap();
    wait_for_value(&reg, 3, Some(1)).await;
    peer.break_with(SessionError::Io("reset".to_string()));

    // Right after the reset every pin is unused again.
    loop {
        if observer.recv().await.unwrap() == SupervisorEvent::PinsReset {
            break;
        }
    }
    let snap = reg.snapshot().await.unwrap();
    assert!(snap.iter().all(|p| p.mode == PinMode::Unused && p.value.is_none()));
    assert!(peer.is_closed());

    // Nothing else queued: the next attempt fails and exhausts the limit.
    let result = task.await.unwrap();
    assert_eq!(
        result,
        Err(SupervisorError::RetriesExhausted {
            attempts: 1,
            last: SessionError::Connect("no session queued".to_string()),
        })
    );

    assert_eq!(
        drain(&mut events),
        vec![
            SupervisorEvent::State(ConnectionState::Start),
            SupervisorEvent::State(ConnectionState::Running),
            SupervisorEvent::State(ConnectionState::Disconnected),
            SupervisorEvent::WorkersJoined,
            SupervisorEvent::PinsReset,
            SupervisorEvent::State(ConnectionState::Start),
            SupervisorEvent::ConnectFailed { attempt: 1 },
            SupervisorEvent::PinsReset,
        ]
    );
    assert_eq!(connector.attempts(), 2);
}

/// Queues two refusals, one session, then three more refusals.
fn flaky_connector() -> (Arc<PipeConnector>, PipePeer) {
    let connector = Arc::new(PipeConnector::new());
    let refused = || SessionError::Connect("refused".to_string());
    connector.push_failure(refused());
    connector.push_failure(refused());
    let (session, peer) = new_pipe();
    connector.push_session(session);
    for _ in 0..3 {
        connector.push_failure(refused());
    }
    (connector, peer)
}

/// Runs a supervisor with retry limit 3 over [`flaky_connector`], breaks
/// the session once it runs, and returns the result with the failed
/// attempt numbers.
async fn run_flaky(
    reset_retries_on_connect: bool,
) -> (std::result::Result<Exit, SupervisorError>, Vec<u32>, usize) {
    let (reg, _) = registry();
    let (connector, peer) = flaky_connector();

    let mut options = fast_options();
    options.retry_limit = 3;
    options.reset_retries_on_connect = reset_retries_on_connect;
    let sup = supervisor(connector.clone(), &reg, options);
    let mut events = sup.subscribe();
    let task = tokio::spawn(async move { sup.run(CancellationToken::new()).await });

    let mut observer = events.resubscribe();
    wait_for_state(&mut observer, ConnectionState::Running).await;
    peer.break_with(SessionError::Closed);

    let result = task.await.unwrap();
    let attempts: Vec<u32> = drain(&mut events)
        .into_iter()
        .filter_map(|ev| match ev {
            SupervisorEvent::ConnectFailed { attempt } => Some(attempt),
            _ => None,
        })
        .collect();
    (result, attempts, connector.attempts())
}

#[tokio::test(start_paused = true)]
async fn test_supervisor_failures_count_over_the_run() {
    let (result, attempts, tried) = run_flaky(false).await;
    assert!(matches!(
        result,
        Err(SupervisorError::RetriesExhausted { attempts: 3, .. })
    ));
    // The third failure overall ends the run, one session later.
    assert_eq!(attempts, vec![1, 2, 3]);
    assert_eq!(tried, 4);
}

#[tokio::test(start_paused = true)]
async fn test_supervisor_failure_counter_resets_when_enabled() {
    let (result, attempts, tried) = run_flaky(true).await;
    assert!(matches!(
        result,
        Err(SupervisorError::RetriesExhausted { attempts: 3, .. })
    ));
    assert_eq!(attempts, vec![1, 2, 1, 2, 3]);
    assert_eq!(tried, 6);
}

#[tokio::test(start_paused = true)]
async fn test_supervisor_stop_handler() {
    let (reg, pins) = registry();
    let connector = Arc::new(PipeConnector::new());
    let (session, peer) = new_pipe();
    connector.push_session(session);

    let sup = supervisor(connector, &reg, fast_options());
    let mut events = sup.subscribe();
    let task = tokio::spawn(async move { sup.run(CancellationToken::new()).await });

    peer.broadcast("allon").await.unwrap();
    wait_for_value(&reg, 0, Some(1)).await;
    peer.broadcast("stophandler").await.unwrap();

    assert_eq!(task.await.unwrap(), Ok(Exit::Stopped));
    assert!(peer.is_closed());
    assert!(reg.snapshot().await.unwrap().iter().all(|p| p.mode == PinMode::Unused));
    assert_eq!(pins.direction(KernelId(55)), acmemesh_gpio::Direction::Input);

    let evs = drain(&mut events);
    assert!(!evs.contains(&SupervisorEvent::State(ConnectionState::Disconnected)));
    assert_eq!(
        &evs[evs.len() - 2..],
        &[SupervisorEvent::WorkersJoined, SupervisorEvent::PinsReset]
    );
}

#[tokio::test(start_paused = true)]
async fn test_supervisor_interrupt() {
    let (reg, _) = registry();
    let connector = Arc::new(PipeConnector::new());
    let (session, peer) = new_pipe();
    connector.push_session(session);

    let sup = supervisor(connector, &reg, fast_options());
    let mut events = sup.subscribe();
    let shutdown = CancellationToken::new();
    let task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { sup.run(shutdown).await })
    };

    wait_for_state(&mut events, ConnectionState::Running).await;
    shutdown.cancel();
    assert_eq!(task.await.unwrap(), Ok(Exit::Interrupted));
    assert!(peer.is_closed());
    assert_eq!(
        drain(&mut events),
        vec![SupervisorEvent::WorkersJoined, SupervisorEvent::PinsReset]
    );
}

#[tokio::test(start_paused = true)]
async fn test_supervisor_interrupt_while_connecting() {
    let (reg, _) = registry();
    let connector = Arc::new(PipeConnector::new());
    let mut options = fast_options();
    options.retry_limit = 0;
    let sup = supervisor(connector.clone(), &reg, options);

    let shutdown = CancellationToken::new();
    let task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { sup.run(shutdown).await })
    };
    tokio::time::sleep(Duration::from_millis(500)).await;
    shutdown.cancel();

    assert_eq!(task.await.unwrap(), Ok(Exit::Interrupted));
    // Infinite retry kept trying.
    assert!(connector.attempts() > 10);
}

#[tokio::test(start_paused = true)]
async fn test_supervisor_prepares_pins_on_connect() {
    let (reg, _) = registry();
    let connector = Arc::new(PipeConnector::new());
    let (session, peer) = new_pipe();
    connector.push_session(session);

    let mut options = fast_options();
    options.inputs = vec!["pa22".to_string(), "J9.9".to_string()];
    options.inverted = vec!["J4.7".to_string()];
    let sup = supervisor(connector, &reg, options);
    let shutdown = CancellationToken::new();
    let task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { sup.run(shutdown).await })
    };

    // The notifier reports the new input's level.
    let report = peer.recv_report().await.unwrap();
    assert_eq!(report.get("pinJ4.8"), Some("0"));

    peer.broadcast("pinJ4.7on").await.unwrap();
    wait_for_value(&reg, 0, Some(0)).await;
    let snap = reg.snapshot().await.unwrap();
    assert_eq!(snap[1].mode, PinMode::Input);
    assert!(snap[0].invert);

    shutdown.cancel();
    assert_eq!(task.await.unwrap(), Ok(Exit::Interrupted));
}

// =============================================================================
// Bridge
// =============================================================================

async fn bridge(config: Config) -> error::Result<Bridge> {
    let connector: Arc<dyn Connector> = Arc::new(PipeConnector::new());
    Bridge::new(
        config,
        Arc::new(MemoryPins::new()),
        connector,
        Arc::new(FakeSystem::default()),
    )
    .await
}

#[tokio::test]
async fn test_bridge_assembly() {
    let mut config = Config::default();
    config.inputs = vec!["J4.7".to_string()];
    config.inverted = vec!["pb14".to_string()];
    let bridge = bridge(config).await.unwrap();

    assert_eq!(bridge.board(), acmemesh_gpio::Board::AriettaG25);
    let snap = bridge.registry().snapshot().await.unwrap();
    assert_eq!(snap.len(), 25);
    assert!(snap.iter().all(|p| p.mode == PinMode::Unused));
    assert_eq!(*bridge.state().borrow(), ConnectionState::Start);
}

#[tokio::test]
async fn test_bridge_rejects_bad_config() {
    let mut config = Config::default();
    config.board = "Daisy".to_string();
    assert!(matches!(
        bridge(config).await,
        Err(Error::Gpio(acmemesh_gpio::Error::UnsupportedBoard(_)))
    ));

    let mut config = Config::default();
    config.board = "Raspberry".to_string();
    assert!(matches!(bridge(config).await, Err(Error::Gpio(_))));

    let mut config = Config::default();
    config.inputs = vec!["J9.9".to_string()];
    match bridge(config).await {
        Err(Error::Config(msg)) => assert!(msg.contains("J9.9")),
        other => panic!("unexpected {:?}", other.err()),
    }
}
