use crate::error::Error;
use crate::listeners::{ListenerId, Listeners, CONNECTED, DISCONNECTED, ERROR, MESSAGE};
use crate::policy::ReconnectPolicy;
use crate::transport::{Connector, Transport};
use futures::{SinkExt, StreamExt};
use log::*;
use serde_json::{json, Value};
use std::cell::Cell;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Lifecycle of the managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Initial state, and the state after an explicit `disconnect()`.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Connected and subscribed; frames are being dispatched.
    Connected,
    /// Waiting out the backoff delay before the next attempt.
    Reconnecting,
    /// The attempt cap was reached. Only a new `connect()` restarts the machine.
    GivenUp,
}

thread_local! {
    /// Set while this thread is running listener callbacks for a connection task.
    static DISPATCHING: Cell<bool> = const { Cell::new(false) };
}

/// Mutable state guarded by one lock so that every transition is serialized.
///
/// `generation` is bumped by every `connect()` and `disconnect()`. A
/// connection task only acts while its generation is current, so a task that
/// was superseded can never move the machine again.
struct Control {
    generation: u64,
    intent: Option<String>,
    task: Option<JoinHandle<()>>,
    outbound: Option<mpsc::UnboundedSender<String>>,
}

struct Shared {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    listeners: Listeners,
    control: Mutex<Control>,
    /// Held by a connection task for the whole of one listener emission.
    dispatch_gate: Mutex<()>,
    state: watch::Sender<ConnectionState>,
}

/// Owns one logical connection to the distribution node.
///
/// The manager reconnects on failure according to its [`ReconnectPolicy`],
/// replays the subscription intent as the first frame of every connection,
/// and re-exposes inbound envelopes to local listeners: every frame under
/// `"message"`, and each frame's `data` under its `channel` name.
///
/// Cloning yields another handle to the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, policy: ReconnectPolicy) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                connector,
                policy,
                listeners: Listeners::new(),
                control: Mutex::new(Control {
                    generation: 0,
                    intent: None,
                    task: None,
                    outbound: None,
                }),
                dispatch_gate: Mutex::new(()),
                state,
            }),
        }
    }

    /// Start (or restart) the connection, subscribing to `scope` once connected.
    /// `None` subscribes to every project.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self, scope: Option<String>) {
        self.start(scope);
        self.shared.settle();
    }

    fn start(&self, scope: Option<String>) {
        let mut control = self.shared.lock();
        control.generation += 1;
        if let Some(task) = control.task.take() {
            task.abort();
        }
        control.outbound = None;
        control.intent = scope;

        let generation = control.generation;
        self.shared.state.send_replace(ConnectionState::Connecting);
        info!(
            "Connecting (subscription: {})",
            control.intent.as_deref().unwrap_or("<all projects>")
        );

        let shared = self.shared.clone();
        control.task = Some(tokio::spawn(async move {
            shared.run(generation).await;
        }));
    }

    /// Close the connection and cancel any pending reconnect.
    ///
    /// No further attempts are made and a handshake still in flight is
    /// discarded rather than promoted to `Connected`. Once this returns, no
    /// callback receives anything from the closed connection.
    pub fn disconnect(&self) {
        let was_connected = {
            let mut control = self.shared.lock();
            control.generation += 1;
            if let Some(task) = control.task.take() {
                task.abort();
            }
            control.outbound = None;
            self.shared.state.send_replace(ConnectionState::Disconnected)
                == ConnectionState::Connected
        };
        self.shared.settle();

        info!("Disconnected by caller");
        if was_connected {
            self.shared.listeners.emit(DISCONNECTED, &Value::Null);
        }
    }

    /// Send a JSON value over the current connection.
    /// Returns false, without queuing, when not connected.
    pub fn send(&self, value: &Value) -> bool {
        let control = self.shared.lock();
        match &control.outbound {
            Some(outbound) => outbound.send(value.to_string()).is_ok(),
            None => false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Observe state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// The scope replayed after every (re)connect.
    pub fn subscription_intent(&self) -> Option<String> {
        self.shared.lock().intent.clone()
    }

    /// Register a callback for a local event key or channel name.
    pub fn on<F>(&self, key: &str, callback: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.shared.listeners.on(key, callback)
    }

    pub fn off(&self, key: &str, id: ListenerId) -> bool {
        self.shared.listeners.off(key, id)
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    /// Wait for an emission running on another thread to finish. Called after
    /// bumping the generation, so every later emission sees it is stale.
    ///
    /// From inside a callback the emission is our own caller; the generation
    /// check before each emission is enough there.
    fn settle(&self) {
        if !DISPATCHING.with(Cell::get) {
            drop(
                self.dispatch_gate
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner),
            );
        }
    }

    /// Emit `key` to local listeners if `generation` is still current.
    fn emit_current(&self, generation: u64, key: &str, value: &Value) -> bool {
        let _gate = self
            .dispatch_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !self.is_current(generation) {
            return false;
        }

        let outer = DISPATCHING.with(|flag| flag.replace(true));
        self.listeners.emit(key, value);
        DISPATCHING.with(|flag| flag.set(outer));
        true
    }

    /// Move to `state` if `generation` is still current.
    fn transition(&self, generation: u64, state: ConnectionState) -> bool {
        let control = self.lock();
        if control.generation != generation {
            return false;
        }
        self.state.send_replace(state);
        true
    }

    /// Promote a finished handshake to `Connected` if `generation` is still
    /// current. Returns the subscription intent to replay.
    fn promote(
        &self,
        generation: u64,
        outbound: mpsc::UnboundedSender<String>,
    ) -> Option<Option<String>> {
        let mut control = self.lock();
        if control.generation != generation {
            return None;
        }
        control.outbound = Some(outbound);
        self.state.send_replace(ConnectionState::Connected);
        Some(control.intent.clone())
    }

    fn clear_outbound(&self, generation: u64) {
        let mut control = self.lock();
        if control.generation == generation {
            control.outbound = None;
        }
    }

    async fn run(&self, generation: u64) {
        let mut failures: u32 = 0;

        loop {
            if !self.transition(generation, ConnectionState::Connecting) {
                return;
            }

            match self.connector.connect().await {
                Ok(mut transport) => {
                    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                    let Some(intent) = self.promote(generation, outbound_tx) else {
                        debug!("Closing connection that completed after cancellation");
                        let _ = transport.sink.close().await;
                        return;
                    };
                    failures = 0;
                    info!("Connected");

                    let result = self
                        .pump(generation, transport, outbound_rx, &intent)
                        .await;
                    self.clear_outbound(generation);
                    if let Err(e) = result {
                        warn!("Connection error: {e}");
                        self.emit_current(generation, ERROR, &json!(e.to_string()));
                    }
                    info!("Connection closed");
                    self.emit_current(generation, DISCONNECTED, &Value::Null);
                }
                Err(e) => {
                    warn!("Connection attempt failed: {e}");
                    self.emit_current(generation, ERROR, &json!(e.to_string()));
                }
            }

            failures += 1;
            if !self.policy.allows(failures) {
                if self.transition(generation, ConnectionState::GivenUp) {
                    warn!("Giving up after {failures} failed attempt(s)");
                }
                return;
            }

            if !self.transition(generation, ConnectionState::Reconnecting) {
                return;
            }
            let delay = self.policy.delay_for(failures);
            info!(
                "Attempting to reconnect in {:?} ({}/{})",
                delay, failures, self.policy.max_attempts
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Drive an established connection until it ends.
    ///
    /// The subscription intent is always the first outbound frame. Returns
    /// early once `generation` is superseded, even with frames still buffered.
    async fn pump(
        &self,
        generation: u64,
        transport: Transport,
        mut outbound_rx: mpsc::UnboundedReceiver<String>,
        intent: &Option<String>,
    ) -> Result<(), Error> {
        let Transport {
            mut sink,
            mut stream,
        } = transport;

        sink.send(subscribe_frame(intent)).await?;
        if !self.emit_current(generation, CONNECTED, &Value::Null) {
            return Ok(());
        }

        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(text)) => {
                        if !self.dispatch(generation, &text) {
                            return Ok(());
                        }
                    }
                    Some(Err(e)) => return Err(e),
                    None => return Ok(()),
                },
                Some(text) = outbound_rx.recv() => {
                    sink.send(text).await?;
                }
            }
        }
    }

    /// Publish one inbound frame to local listeners. Frames that are not JSON
    /// are logged and dropped; they never reach a callback.
    ///
    /// Returns false once `generation` is superseded.
    fn dispatch(&self, generation: u64, text: &str) -> bool {
        let message: Value = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Failed to parse inbound frame: {e}");
                return self.is_current(generation);
            }
        };

        if !self.emit_current(generation, MESSAGE, &message) {
            return false;
        }

        match message
            .get("channel")
            .and_then(Value::as_str)
            .filter(|channel| !channel.is_empty())
        {
            Some(channel) => {
                let data = message.get("data").unwrap_or(&Value::Null);
                self.emit_current(generation, channel, data)
            }
            None => self.is_current(generation),
        }
    }
}

fn subscribe_frame(intent: &Option<String>) -> String {
    match intent {
        Some(project_id) => json!({"type": "subscribe", "projectId": project_id}),
        None => json!({"type": "subscribe"}),
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::handshake_error;
    use crate::error::transport_error;
    use futures::channel::mpsc as fmpsc;
    use futures::future;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::OnceLock;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// The server end of one accepted test connection.
    struct ServerSide {
        from_client: fmpsc::UnboundedReceiver<String>,
        to_client: fmpsc::UnboundedSender<Result<String, Error>>,
    }

    impl ServerSide {
        async fn next_frame(&mut self) -> Value {
            let text = tokio::time::timeout(Duration::from_secs(60), self.from_client.next())
                .await
                .expect("timed out waiting for a client frame")
                .expect("client closed the connection");
            serde_json::from_str(&text).unwrap()
        }

        fn push(&self, text: &str) {
            self.to_client.unbounded_send(Ok(text.to_string())).unwrap();
        }
    }

    /// Refuses the first `refusals` attempts, then accepts every attempt.
    /// When a gate is set, every attempt waits for it before resolving.
    struct ScriptedConnector {
        refusals: AtomicU32,
        attempts: AtomicU32,
        gate: Option<Arc<Notify>>,
        accepted: mpsc::UnboundedSender<ServerSide>,
    }

    impl ScriptedConnector {
        fn new(refusals: u32) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerSide>) {
            Self::build(refusals, None)
        }

        fn build(
            refusals: u32,
            gate: Option<Arc<Notify>>,
        ) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerSide>) {
            let (accepted, accepted_rx) = mpsc::unbounded_channel();
            let connector = Arc::new(Self {
                refusals: AtomicU32::new(refusals),
                attempts: AtomicU32::new(0),
                gate,
                accepted,
            });
            (connector, accepted_rx)
        }

        fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self) -> Result<Transport, Error> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }

            let refused = self
                .refusals
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                    left.checked_sub(1)
                })
                .is_ok();
            if refused {
                return Err(handshake_error("connection refused"));
            }

            let (client_tx, from_client) = fmpsc::unbounded::<String>();
            let (to_client, client_rx) = fmpsc::unbounded::<Result<String, Error>>();
            let _ = self.accepted.send(ServerSide {
                from_client,
                to_client,
            });

            Ok(Transport {
                sink: Box::pin(client_tx.sink_map_err(|e| transport_error(&e.to_string()))),
                stream: Box::pin(client_rx),
            })
        }
    }

    fn manager_with(connector: Arc<ScriptedConnector>) -> ConnectionManager {
        ConnectionManager::new(
            connector,
            ReconnectPolicy::fixed(5, Duration::from_secs(3)),
        )
    }

    async fn wait_for_state(manager: &ConnectionManager, target: ConnectionState) {
        let mut rx = manager.watch_state();
        tokio::time::timeout(Duration::from_secs(600), rx.wait_for(|state| *state == target))
            .await
            .expect("timed out waiting for state")
            .expect("state channel closed");
    }

    async fn accept(accepted: &mut mpsc::UnboundedReceiver<ServerSide>) -> ServerSide {
        tokio::time::timeout(Duration::from_secs(600), accepted.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("connector dropped")
    }

    fn counter(manager: &ConnectionManager, key: &str) -> Arc<AtomicU32> {
        let count = Arc::new(AtomicU32::new(0));
        let inner = count.clone();
        manager.on(key, move |_| {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_after_refusals_and_replays_the_intent_first() {
        let (connector, mut accepted) = ScriptedConnector::new(4);
        let manager = manager_with(connector.clone());
        let connected = counter(&manager, CONNECTED);

        manager.connect(Some("abc".to_string()));
        let mut server = accept(&mut accepted).await;

        assert_eq!(
            server.next_frame().await,
            json!({"type": "subscribe", "projectId": "abc"})
        );
        wait_for_state(&manager, ConnectionState::Connected).await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(connector.attempts(), 5);
        assert_eq!(connected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_the_attempt_cap() {
        let (connector, _accepted) = ScriptedConnector::new(u32::MAX);
        let manager = manager_with(connector.clone());
        let errors = counter(&manager, ERROR);

        manager.connect(None);
        wait_for_state(&manager, ConnectionState::GivenUp).await;
        assert_eq!(connector.attempts(), 5);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(connector.attempts(), 5);
        assert_eq!(errors.load(Ordering::SeqCst), 5);
        assert_eq!(manager.state(), ConnectionState::GivenUp);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_after_giving_up_starts_over() {
        let (connector, mut accepted) = ScriptedConnector::new(5);
        let manager = manager_with(connector.clone());

        manager.connect(Some("p1".to_string()));
        wait_for_state(&manager, ConnectionState::GivenUp).await;

        manager.connect(Some("p2".to_string()));
        let mut server = accept(&mut accepted).await;
        assert_eq!(
            server.next_frame().await,
            json!({"type": "subscribe", "projectId": "p2"})
        );
        assert_eq!(connector.attempts(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_while_connecting_discards_the_handshake() {
        let gate = Arc::new(Notify::new());
        let (connector, mut accepted) = ScriptedConnector::build(0, Some(gate.clone()));
        let manager = manager_with(connector.clone());
        let connected = counter(&manager, CONNECTED);

        manager.connect(Some("abc".to_string()));
        while connector.attempts() == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(manager.state(), ConnectionState::Connecting);

        manager.disconnect();
        // The handshake would now succeed.
        gate.notify_waiters();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(connected.load(Ordering::SeqCst), 0);
        assert_eq!(connector.attempts(), 1);
        assert!(accepted.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_a_pending_reconnect() {
        let (connector, _accepted) = ScriptedConnector::new(u32::MAX);
        let manager = manager_with(connector.clone());

        manager.connect(None);
        wait_for_state(&manager, ConnectionState::Reconnecting).await;
        manager.disconnect();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.attempts(), 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn channel_listeners_receive_only_the_payload() {
        let (connector, mut accepted) = ScriptedConnector::new(0);
        let manager = manager_with(connector);
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        manager.on("execution-updates", move |data| {
            sink.lock().unwrap().push(data.clone());
        });
        let messages = counter(&manager, MESSAGE);

        manager.connect(Some("abc".to_string()));
        let mut server = accept(&mut accepted).await;
        server.next_frame().await;

        server.push(r#"{"type":"subscribed","projectId":"abc"}"#);
        server.push(
            r#"{"channel":"execution-updates","data":{"projectId":"abc","status":"done"}}"#,
        );
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(
            *received.lock().unwrap(),
            vec![json!({"projectId": "abc", "status": "done"})]
        );
        assert_eq!(messages.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_frames_are_swallowed_and_the_connection_stays_up() {
        let (connector, mut accepted) = ScriptedConnector::new(0);
        let manager = manager_with(connector.clone());
        let messages = counter(&manager, MESSAGE);
        let disconnected = counter(&manager, DISCONNECTED);

        manager.connect(None);
        let mut server = accept(&mut accepted).await;
        server.next_frame().await;

        server.push("this is not json");
        server.push(r#"{"channel":"agent-events","data":{}}"#);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(messages.load(Ordering::SeqCst), 1);
        assert_eq!(disconnected.load(Ordering::SeqCst), 0);
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_connection_reconnects_and_resubscribes() {
        let (connector, mut accepted) = ScriptedConnector::new(0);
        let manager = manager_with(connector.clone());
        let disconnected = counter(&manager, DISCONNECTED);

        manager.connect(Some("abc".to_string()));
        let mut first = accept(&mut accepted).await;
        first.next_frame().await;
        drop(first);

        let mut second = accept(&mut accepted).await;
        assert_eq!(
            second.next_frame().await,
            json!({"type": "subscribe", "projectId": "abc"})
        );
        wait_for_state(&manager, ConnectionState::Connected).await;
        assert_eq!(disconnected.load(Ordering::SeqCst), 1);
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn send_is_refused_unless_connected() {
        let (connector, mut accepted) = ScriptedConnector::new(0);
        let manager = manager_with(connector);
        assert!(!manager.send(&json!({"type": "ping"})));

        manager.connect(None);
        let mut server = accept(&mut accepted).await;
        assert_eq!(server.next_frame().await, json!({"type": "subscribe"}));
        wait_for_state(&manager, ConnectionState::Connected).await;

        assert!(manager.send(&json!({"type": "ping"})));
        assert_eq!(server.next_frame().await, json!({"type": "ping"}));

        manager.disconnect();
        assert!(!manager.send(&json!({"type": "ping"})));
    }

    /// Accepts every attempt with a sink that disconnects the manager while
    /// the subscribe frame is being written.
    struct DisconnectOnSubscribe {
        manager: OnceLock<ConnectionManager>,
        held: Mutex<Vec<fmpsc::UnboundedReceiver<String>>>,
    }

    #[async_trait::async_trait]
    impl Connector for DisconnectOnSubscribe {
        async fn connect(&self) -> Result<Transport, Error> {
            let (client_tx, from_client) = fmpsc::unbounded::<String>();
            self.held.lock().unwrap().push(from_client);
            let manager = self.manager.get().cloned();
            let sink = client_tx
                .sink_map_err(|e| transport_error(&e.to_string()))
                .with(move |text: String| {
                    if let Some(manager) = &manager {
                        manager.disconnect();
                    }
                    future::ready(Ok::<_, Error>(text))
                });

            Ok(Transport {
                sink: Box::pin(sink),
                stream: Box::pin(futures::stream::pending::<Result<String, Error>>()),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_during_the_subscribe_write_suppresses_connected() {
        let connector = Arc::new(DisconnectOnSubscribe {
            manager: OnceLock::new(),
            held: Mutex::new(Vec::new()),
        });
        let manager = ConnectionManager::new(connector.clone(), ReconnectPolicy::default());
        assert!(connector.manager.set(manager.clone()).is_ok());
        let connected = counter(&manager, CONNECTED);

        manager.connect(Some("abc".to_string()));
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(connected.load(Ordering::SeqCst), 0);
        assert_eq!(connector.held.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn buffered_frames_stop_at_disconnect() {
        let (connector, mut accepted) = ScriptedConnector::new(0);
        let manager = manager_with(connector.clone());
        let seen = Arc::new(AtomicU32::new(0));
        let inner = seen.clone();
        let handle = manager.clone();
        manager.on(MESSAGE, move |_| {
            inner.fetch_add(1, Ordering::SeqCst);
            handle.disconnect();
        });
        let updates = counter(&manager, "agent-events");

        manager.connect(None);
        let mut server = accept(&mut accepted).await;
        server.next_frame().await;
        wait_for_state(&manager, ConnectionState::Connected).await;

        for seq in 0..3 {
            server.push(&json!({"channel": "agent-events", "data": {"seq": seq}}).to_string());
        }
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(updates.load(Ordering::SeqCst), 0);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(connector.attempts(), 1);
    }

    #[test]
    fn disconnect_waits_for_a_dispatch_on_another_thread() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let (connector, mut accepted) = ScriptedConnector::new(0);
            let manager = manager_with(connector);
            let (entered_tx, entered_rx) = std::sync::mpsc::channel::<()>();
            let finished = Arc::new(AtomicU32::new(0));
            let late = Arc::new(AtomicU32::new(0));

            let done = finished.clone();
            manager.on("agent-events", move |data| {
                if data["seq"] == 0 {
                    let _ = entered_tx.send(());
                    std::thread::sleep(Duration::from_millis(100));
                    done.fetch_add(1, Ordering::SeqCst);
                }
            });
            let after = late.clone();
            manager.on(MESSAGE, move |message| {
                if message["data"]["seq"] == 1 {
                    after.fetch_add(1, Ordering::SeqCst);
                }
            });

            manager.connect(None);
            let mut server = accept(&mut accepted).await;
            server.next_frame().await;
            server.push(r#"{"channel":"agent-events","data":{"seq":0}}"#);
            server.push(r#"{"channel":"agent-events","data":{"seq":1}}"#);

            let disconnecting = manager.clone();
            tokio::task::spawn_blocking(move || {
                entered_rx
                    .recv_timeout(Duration::from_secs(5))
                    .expect("dispatch never started");
                disconnecting.disconnect();
                // The in-flight callback has finished by the time we return.
                assert_eq!(finished.load(Ordering::SeqCst), 1);
            })
            .await
            .unwrap();

            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(late.load(Ordering::SeqCst), 0);
        });
    }
}
