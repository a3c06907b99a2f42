//! Broadcast hub: room membership, chat log and fan-out routing.
//!
//! The hub is the only owner of the session map and the [`ChatLog`]. Every
//! public operation takes the room lock for its whole duration and never
//! touches a socket while holding it: delivery is a non-blocking `try_send`
//! onto each session's bounded outbound queue.
//!
//! A session whose queue is full is a slow consumer. It is evicted inside the
//! same critical section: its connection is closed through its cancellation
//! token and a "left" notice is logged and broadcast, exactly as if it had
//! disconnected.

use std::{collections::HashMap, sync::Arc};

use parlor_shared::{
    Envelope, Username,
    time::{Clock, SystemClock},
};
use serde::Serialize;
use tokio::sync::{Mutex, mpsc, mpsc::error::TrySendError};
use tokio_util::sync::CancellationToken;

use crate::domain::{ChatLog, ClientId, format_chat, format_joined, format_left};

/// Hub-side view of one connected client.
#[derive(Debug)]
pub struct SessionHandle {
    name: Username,
    outbound: mpsc::Sender<Envelope>,
    closer: CancellationToken,
}

impl SessionHandle {
    /// # Arguments
    ///
    /// * `name` - Validated display name
    /// * `outbound` - Sending side of the session's outbound queue
    /// * `closer` - Cancelled by the hub to tear the connection down
    pub fn new(name: Username, outbound: mpsc::Sender<Envelope>, closer: CancellationToken) -> Self {
        Self {
            name,
            outbound,
            closer,
        }
    }
}

/// Entry in [`RoomStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientSummary {
    pub id: ClientId,
    pub name: String,
}

/// Read-only summary of the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomStatus {
    pub clients: Vec<ClientSummary>,
    pub log_len: usize,
}

struct RoomState {
    sessions: HashMap<ClientId, SessionHandle>,
    log: ChatLog,
    next_id: u64,
}

impl RoomState {
    fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            log: ChatLog::new(),
            next_id: 1,
        }
    }

    fn register(&mut self, handle: SessionHandle) -> ClientId {
        let id = ClientId::new(self.next_id);
        self.next_id += 1;
        tracing::debug!("Registered '{}' as {}", handle.name, id);
        self.sessions.insert(id, handle);
        id
    }

    /// Remove `id`, close its connection, log and broadcast the "left" notice.
    fn remove(&mut self, id: ClientId, now: i64) -> bool {
        let Some(session) = self.sessions.remove(&id) else {
            return false;
        };
        session.closer.cancel();
        let notice = format_left(now, session.name.as_str());
        self.log.append(notice.clone());
        self.deliver(&Envelope::NewChat { text: notice }, None, now);
        true
    }

    /// Fan `envelope` out to every session except `skip`, evicting slow consumers.
    fn deliver(&mut self, envelope: &Envelope, skip: Option<ClientId>, now: i64) {
        let mut overflowed = self.enqueue(envelope, skip);
        while let Some(id) = overflowed.pop() {
            let Some(session) = self.sessions.remove(&id) else {
                continue;
            };
            tracing::warn!(
                "Outbound queue of '{}' ({}) is full, disconnecting slow consumer",
                session.name,
                id
            );
            session.closer.cancel();
            let notice = format_left(now, session.name.as_str());
            self.log.append(notice.clone());
            overflowed.extend(self.enqueue(&Envelope::NewChat { text: notice }, None));
        }
    }

    /// Try to enqueue onto each queue; returns the ids whose queue was full.
    fn enqueue(&self, envelope: &Envelope, skip: Option<ClientId>) -> Vec<ClientId> {
        let mut overflowed = Vec::new();
        for (id, session) in &self.sessions {
            if Some(*id) == skip {
                continue;
            }
            match session.outbound.try_send(envelope.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => overflowed.push(*id),
                Err(TrySendError::Closed(_)) => {
                    // Writer already gone; its controller is closing the session.
                    tracing::debug!("Outbound queue of {} is closed, skipping", id);
                }
            }
        }
        overflowed
    }
}

/// Shared room state behind a single lock.
pub struct Hub {
    state: Mutex<RoomState>,
    clock: Arc<dyn Clock>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl Hub {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(RoomState::new()),
            clock,
        }
    }

    /// Allocate a fresh id and admit `handle` to future broadcasts.
    pub async fn register(&self, handle: SessionHandle) -> ClientId {
        self.state.lock().await.register(handle)
    }

    /// Admit a newly joined client in one critical section.
    ///
    /// Logs the "joined" notice and sends it to everyone already in the room,
    /// takes the log snapshot (which ends with that notice), queues the
    /// snapshot as `StartingState` ahead of anything else on the new session's
    /// queue and registers the session. Nothing can slip in between the
    /// snapshot and live delivery, so the client sees no gap and no duplicate.
    pub async fn join(&self, handle: SessionHandle) -> ClientId {
        let mut state = self.state.lock().await;
        let now = self.clock.now_jst_millis();

        let notice = format_joined(now, handle.name.as_str());
        state.log.append(notice.clone());
        state.deliver(&Envelope::NewChat { text: notice }, None, now);

        let history = state.log.snapshot();
        if let Err(e) = handle
            .outbound
            .try_send(Envelope::StartingState { history })
        {
            tracing::warn!("Failed to queue starting state for '{}': {}", handle.name, e);
        }

        state.register(handle)
    }

    /// Enqueue `envelope` for every registered session.
    pub async fn broadcast(&self, envelope: Envelope) {
        let mut state = self.state.lock().await;
        let now = self.clock.now_jst_millis();
        state.deliver(&envelope, None, now);
    }

    /// Enqueue `envelope` for every registered session except `id`.
    pub async fn broadcast_except(&self, envelope: Envelope, id: ClientId) {
        let mut state = self.state.lock().await;
        let now = self.clock.now_jst_millis();
        state.deliver(&envelope, Some(id), now);
    }

    /// Current chat log, oldest first.
    pub async fn snapshot(&self) -> Vec<String> {
        self.state.lock().await.log.snapshot()
    }

    /// Remove a session and announce its departure.
    ///
    /// Returns `false` without side effects when `id` is not registered (already
    /// deregistered or evicted), so calling it twice is harmless.
    pub async fn deregister(&self, id: ClientId) -> bool {
        let mut state = self.state.lock().await;
        let now = self.clock.now_jst_millis();
        let removed = state.remove(id, now);
        if removed {
            tracing::info!("{} deregistered, {} client(s) remain", id, state.sessions.len());
        }
        removed
    }

    /// Format, log and broadcast a chat line from `id` to everyone, author included.
    ///
    /// Returns the formatted entry, or `None` if `id` is not registered.
    pub async fn append_chat(&self, id: ClientId, text: &str) -> Option<String> {
        let mut state = self.state.lock().await;
        let now = self.clock.now_jst_millis();
        let author = state.sessions.get(&id)?.name.to_string();

        let entry = format_chat(now, &author, text);
        state.log.append(entry.clone());
        state.deliver(
            &Envelope::NewChat {
                text: entry.clone(),
            },
            None,
            now,
        );
        Some(entry)
    }

    pub async fn is_registered(&self, id: ClientId) -> bool {
        self.state.lock().await.sessions.contains_key(&id)
    }

    pub async fn client_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    /// Connected clients sorted by id, plus the log length.
    pub async fn status(&self) -> RoomStatus {
        let state = self.state.lock().await;
        let mut clients: Vec<ClientSummary> = state
            .sessions
            .iter()
            .map(|(id, session)| ClientSummary {
                id: *id,
                name: session.name.to_string(),
            })
            .collect();
        clients.sort_by_key(|c| c.id);

        RoomStatus {
            clients,
            log_len: state.log.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_shared::time::FixedClock;

    const T: i64 = 1672498800000;
    const TS: &str = "2023-01-01T00:00:00.000+09:00";

    fn create_test_hub() -> Hub {
        Hub::new(Arc::new(FixedClock::new(T)))
    }

    struct TestSession {
        handle: SessionHandle,
        rx: mpsc::Receiver<Envelope>,
        closer: CancellationToken,
    }

    fn create_test_session(name: &str, capacity: usize) -> TestSession {
        let (tx, rx) = mpsc::channel(capacity);
        let closer = CancellationToken::new();
        TestSession {
            handle: SessionHandle::new(Username::parse(name).unwrap(), tx, closer.clone()),
            rx,
            closer,
        }
    }

    fn drain(rx: &mut mpsc::Receiver<Envelope>) -> Vec<Envelope> {
        let mut received = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            received.push(envelope);
        }
        received
    }

    fn chat(text: String) -> Envelope {
        Envelope::NewChat { text }
    }

    #[tokio::test]
    async fn test_register_allocates_increasing_ids() {
        // テスト項目: register は単調増加する一意の ID を払い出す
        // given (前提条件):
        let hub = create_test_hub();
        let alice = create_test_session("alice", 8);
        let bob = create_test_session("bob", 8);

        // when (操作):
        let id_a = hub.register(alice.handle).await;
        let id_b = hub.register(bob.handle).await;

        // then (期待する結果):
        assert_eq!(id_a, ClientId::new(1));
        assert_eq!(id_b, ClientId::new(2));
        assert_eq!(hub.client_count().await, 2);
    }

    #[tokio::test]
    async fn test_ids_are_not_reused_after_deregister() {
        // テスト項目: 退出後も ID は再利用されない
        // given (前提条件):
        let hub = create_test_hub();
        let id_a = hub.register(create_test_session("alice", 8).handle).await;
        hub.deregister(id_a).await;

        // when (操作):
        let id_b = hub.register(create_test_session("bob", 8).handle).await;

        // then (期待する結果):
        assert_ne!(id_a, id_b);
        assert!(id_b > id_a);
    }

    #[tokio::test]
    async fn test_broadcast_and_broadcast_except() {
        // テスト項目: broadcast は全員に、broadcast_except は指定 ID 以外に届く
        // given (前提条件):
        let hub = create_test_hub();
        let mut alice = create_test_session("alice", 8);
        let mut bob = create_test_session("bob", 8);
        let id_a = hub.register(alice.handle).await;
        hub.register(bob.handle).await;

        // when (操作):
        hub.broadcast(chat("to all".to_string())).await;
        hub.broadcast_except(chat("not alice".to_string()), id_a).await;

        // then (期待する結果):
        assert_eq!(drain(&mut alice.rx), vec![chat("to all".to_string())]);
        assert_eq!(
            drain(&mut bob.rx),
            vec![chat("to all".to_string()), chat("not alice".to_string())]
        );
    }

    #[tokio::test]
    async fn test_join_sends_snapshot_first_and_notifies_others() {
        // テスト項目: join は既存参加者へ入室通知を送り、新規参加者には StartingState を最初に送る
        // given (前提条件):
        let hub = create_test_hub();
        let mut alice = create_test_session("alice", 8);
        hub.join(alice.handle).await;
        drain(&mut alice.rx);
        let mut bob = create_test_session("bob", 8);

        // when (操作):
        let id_b = hub.join(bob.handle).await;

        // then (期待する結果):
        let joined_a = format!("[{TS}][Server] 'alice' has joined.");
        let joined_b = format!("[{TS}][Server] 'bob' has joined.");
        assert!(hub.is_registered(id_b).await);
        assert_eq!(drain(&mut alice.rx), vec![chat(joined_b.clone())]);
        assert_eq!(
            drain(&mut bob.rx),
            vec![Envelope::StartingState {
                history: vec![joined_a, joined_b]
            }]
        );
    }

    #[tokio::test]
    async fn test_two_client_chat_scenario() {
        // テスト項目: A, B の順に入室し A が発言すると、B に整形済みチャットが届きログは 3 件になる
        // given (前提条件):
        let hub = create_test_hub();
        let mut alice = create_test_session("A", 8);
        let mut bob = create_test_session("B", 8);
        let id_a = hub.join(alice.handle).await;
        hub.join(bob.handle).await;
        drain(&mut alice.rx);
        drain(&mut bob.rx);

        // when (操作):
        let entry = hub.append_chat(id_a, "hi").await;

        // then (期待する結果):
        let expected = format!("[{TS}][A] hi");
        assert_eq!(entry.as_deref(), Some(expected.as_str()));
        assert_eq!(drain(&mut bob.rx), vec![chat(expected.clone())]);
        // 発言者自身にも同じ経路でエコーされる
        assert_eq!(drain(&mut alice.rx), vec![chat(expected.clone())]);
        assert_eq!(
            hub.snapshot().await,
            vec![
                format!("[{TS}][Server] 'A' has joined."),
                format!("[{TS}][Server] 'B' has joined."),
                expected,
            ]
        );
    }

    #[tokio::test]
    async fn test_append_chat_from_unknown_client_is_ignored() {
        // テスト項目: 未登録 ID からのチャットはログに追加されない
        // given (前提条件):
        let hub = create_test_hub();

        // when (操作):
        let entry = hub.append_chat(ClientId::new(42), "ghost").await;

        // then (期待する結果):
        assert_eq!(entry, None);
        assert!(hub.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_deregister_is_idempotent() {
        // テスト項目: 同じ ID の deregister を 2 回呼んでも退室通知は 1 回だけ
        // given (前提条件):
        let hub = create_test_hub();
        let alice = create_test_session("alice", 8);
        let mut bob = create_test_session("bob", 8);
        let id_a = hub.register(alice.handle).await;
        hub.register(bob.handle).await;

        // when (操作):
        let first = hub.deregister(id_a).await;
        let second = hub.deregister(id_a).await;

        // then (期待する結果):
        let left = format!("[{TS}][Server] 'alice' has left.");
        assert!(first);
        assert!(!second);
        assert!(alice.closer.is_cancelled());
        assert_eq!(drain(&mut bob.rx), vec![chat(left.clone())]);
        assert_eq!(hub.snapshot().await, vec![left]);
        assert!(!hub.is_registered(id_a).await);
    }

    #[tokio::test]
    async fn test_slow_consumer_is_evicted() {
        // テスト項目: 送信キューが溢れたクライアントは切断され、他の参加者に退室通知が届く
        // given (前提条件): carol のキュー容量は 1
        let hub = create_test_hub();
        let mut alice = create_test_session("alice", 8);
        let carol = create_test_session("carol", 1);
        hub.register(alice.handle).await;
        let id_c = hub.register(carol.handle).await;
        hub.broadcast(chat("one".to_string())).await;

        // when (操作): carol のキューは満杯
        hub.broadcast(chat("two".to_string())).await;

        // then (期待する結果):
        let left = format!("[{TS}][Server] 'carol' has left.");
        assert!(!hub.is_registered(id_c).await);
        assert!(carol.closer.is_cancelled());
        assert_eq!(
            drain(&mut alice.rx),
            vec![
                chat("one".to_string()),
                chat("two".to_string()),
                chat(left.clone())
            ]
        );
        assert_eq!(hub.snapshot().await, vec![left]);
        // 既に退出済みなので deregister は何もしない
        assert!(!hub.deregister(id_c).await);
    }

    #[tokio::test]
    async fn test_closed_queue_is_skipped() {
        // テスト項目: 受信側が閉じたキューへの配送はスキップされ、登録は維持される
        // given (前提条件):
        let hub = create_test_hub();
        let alice = create_test_session("alice", 8);
        let mut bob = create_test_session("bob", 8);
        let id_a = hub.register(alice.handle).await;
        hub.register(bob.handle).await;
        drop(alice.rx);

        // when (操作):
        hub.broadcast(chat("hello".to_string())).await;

        // then (期待する結果):
        assert!(hub.is_registered(id_a).await);
        assert_eq!(drain(&mut bob.rx), vec![chat("hello".to_string())]);
    }

    #[tokio::test]
    async fn test_status_lists_clients_sorted_by_id() {
        // テスト項目: status は ID 順の参加者一覧とログ件数を返す
        // given (前提条件):
        let hub = create_test_hub();
        hub.join(create_test_session("zed", 8).handle).await;
        hub.join(create_test_session("amy", 8).handle).await;

        // when (操作):
        let status = hub.status().await;

        // then (期待する結果):
        assert_eq!(
            status,
            RoomStatus {
                clients: vec![
                    ClientSummary {
                        id: ClientId::new(1),
                        name: "zed".to_string()
                    },
                    ClientSummary {
                        id: ClientId::new(2),
                        name: "amy".to_string()
                    },
                ],
                log_len: 2,
            }
        );
    }
}
