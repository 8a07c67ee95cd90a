//! UseCase: Message Fan-out Dispatcher
//!
//! ルームのオンラインユーザー → 各ユーザーの「そのルームに join している接続」へと解決し、
//! 接続ごとに 1 回だけペイロードを送る。配信先は接続単位なので、
//! 同じユーザーが 2 本接続していれば 2 回届く。
//!
//! メッセージは配信対象の解決だけをロック内で行い、送信はロックを解放してから行う。
//! オンライン状況は、状況の読み取り・対象の解決・送信キューへの投入を 1 回のロック保持の中で行う。
//! 送信キューへの投入は待機しないので、ロックの保持時間は短いまま、
//! 各接続に届く状況は変更順に並び、最後に届くものが常に最新になる。

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::domain::{
    BroadcastReport, ConnectionId, MessagePusher, PresenceBook, RoomId, RoomPresence, UserId,
};

pub struct FanoutDispatcher {
    book: Arc<Mutex<PresenceBook>>,
    message_pusher: Arc<dyn MessagePusher>,
}

impl FanoutDispatcher {
    pub fn new(book: Arc<Mutex<PresenceBook>>, message_pusher: Arc<dyn MessagePusher>) -> Self {
        Self {
            book,
            message_pusher,
        }
    }

    /// ルームの全接続にペイロードを配信する
    ///
    /// `exclude` に指定した接続（送信者自身）はスキップする。
    /// 閉じた接続への配信失敗はログに残すだけで、全体の失敗にはしない。
    pub async fn deliver(
        &self,
        room_id: RoomId,
        payload: &str,
        exclude: Option<ConnectionId>,
    ) -> BroadcastReport {
        let targets = {
            let book = self.book.lock().await;
            book.delivery_targets(&room_id, exclude.as_ref())
        };
        if targets.is_empty() {
            tracing::debug!("No live connections in room {}", room_id);
            return BroadcastReport::default();
        }

        let report = self.message_pusher.broadcast(&targets, payload).await;
        log_report(room_id, &targets, &report);
        report
    }

    /// ユーザーの全接続にペイロードを配信する（ルームに関係なく）
    pub async fn deliver_to_user(&self, user_id: UserId, payload: &str) -> BroadcastReport {
        let targets = self.book.lock().await.connections_of(&user_id);
        if targets.is_empty() {
            tracing::debug!("User {} has no live connections", user_id);
            return BroadcastReport::default();
        }
        let report = self.message_pusher.broadcast(&targets, payload).await;
        if !report.failed.is_empty() {
            tracing::warn!(
                "Delivery to {} connection(s) of user {} failed: {:?}",
                report.failed.len(),
                user_id,
                report.failed
            );
        }
        report
    }

    /// 各ルームの現在のオンライン状況を、そのルームの全接続に配信する
    ///
    /// 呼び出し側が持っている状況ではなく、配信時点の状況を読み直して送る。
    pub async fn deliver_presence<F>(&self, room_ids: &[RoomId], encode: F)
    where
        F: Fn(&RoomPresence) -> String + Send + Sync,
    {
        let book = self.book.lock().await;
        for room_id in room_ids {
            let targets = book.delivery_targets(room_id, None);
            if targets.is_empty() {
                tracing::debug!("No live connections in room {}", room_id);
                continue;
            }
            let payload = encode(&book.presence(*room_id));
            let report = self.message_pusher.broadcast(&targets, &payload).await;
            log_report(*room_id, &targets, &report);
        }
    }
}

fn log_report(room_id: RoomId, targets: &[ConnectionId], report: &BroadcastReport) {
    if !report.failed.is_empty() {
        tracing::warn!(
            "Delivery to {} connection(s) in room {} failed: {:?}",
            report.failed.len(),
            room_id,
            report.failed
        );
    }
    tracing::debug!(
        "Delivered to {}/{} connection(s) in room {}",
        report.delivered,
        targets.len(),
        room_id
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{MessagePusher, PusherChannel, Timestamp},
        infrastructure::message_pusher::WebSocketMessagePusher,
    };
    use tokio::sync::mpsc;

    const ROOM: RoomId = RoomId::new(7);

    struct Fixture {
        book: Arc<Mutex<PresenceBook>>,
        pusher: Arc<WebSocketMessagePusher>,
        dispatcher: FanoutDispatcher,
    }

    fn create_fixture() -> Fixture {
        let book = Arc::new(Mutex::new(PresenceBook::new()));
        let pusher = Arc::new(WebSocketMessagePusher::new());
        let dispatcher = FanoutDispatcher::new(book.clone(), pusher.clone());
        Fixture {
            book,
            pusher,
            dispatcher,
        }
    }

    async fn join(
        fixture: &Fixture,
        user_id: UserId,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let conn = ConnectionId::generate();
        let (tx, rx): (PusherChannel, _) = mpsc::unbounded_channel();
        {
            let mut book = fixture.book.lock().await;
            book.register(conn, user_id, Timestamp::new(0)).unwrap();
            book.join(&conn, ROOM).unwrap();
        }
        fixture.pusher.attach(conn, tx).await;
        (conn, rx)
    }

    #[tokio::test]
    async fn test_deliver_once_per_connection_excluding_sender() {
        // テスト項目: K 本の接続があるルームで、送信者を除く各接続にちょうど 1 回届く
        // given (前提条件): alice は 2 本、bob は 1 本接続
        let fixture = create_fixture();
        let (alice_phone, mut alice_phone_rx) = join(&fixture, UserId::new(1)).await;
        let (_alice_laptop, mut alice_laptop_rx) = join(&fixture, UserId::new(1)).await;
        let (_bob, mut bob_rx) = join(&fixture, UserId::new(2)).await;

        // when (操作):
        let report = fixture
            .dispatcher
            .deliver(ROOM, "hello", Some(alice_phone))
            .await;

        // then (期待する結果):
        assert_eq!(report.delivered, 2);
        assert!(report.failed.is_empty());
        assert_eq!(alice_laptop_rx.try_recv().ok(), Some("hello".to_string()));
        assert_eq!(bob_rx.try_recv().ok(), Some("hello".to_string()));
        assert!(alice_phone_rx.try_recv().is_err());
        // 重複配信がない
        assert!(alice_laptop_rx.try_recv().is_err());
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_deliver_without_exclusion_reaches_all() {
        // テスト項目: 除外指定がなければ K 本すべてに届く
        // given (前提条件):
        let fixture = create_fixture();
        let (_a, mut a_rx) = join(&fixture, UserId::new(1)).await;
        let (_b, mut b_rx) = join(&fixture, UserId::new(2)).await;

        // when (操作):
        let report = fixture.dispatcher.deliver(ROOM, "status", None).await;

        // then (期待する結果):
        assert_eq!(report.delivered, 2);
        assert_eq!(a_rx.try_recv().ok(), Some("status".to_string()));
        assert_eq!(b_rx.try_recv().ok(), Some("status".to_string()));
    }

    #[tokio::test]
    async fn test_closed_connection_does_not_fail_delivery() {
        // テスト項目: 受信側が閉じた接続への配信失敗は他の接続への配信を妨げない
        // given (前提条件):
        let fixture = create_fixture();
        let (closed, closed_rx) = join(&fixture, UserId::new(1)).await;
        let (_open, mut open_rx) = join(&fixture, UserId::new(2)).await;
        drop(closed_rx);

        // when (操作):
        let report = fixture.dispatcher.deliver(ROOM, "hi", None).await;

        // then (期待する結果):
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, vec![closed]);
        assert_eq!(open_rx.try_recv().ok(), Some("hi".to_string()));
    }

    #[tokio::test]
    async fn test_deliver_to_empty_room() {
        // テスト項目: 誰もいないルームへの配信は何もしない
        // given (前提条件):
        let fixture = create_fixture();

        // when (操作):
        let report = fixture.dispatcher.deliver(RoomId::new(404), "hi", None).await;

        // then (期待する結果):
        assert_eq!(report, BroadcastReport::default());
    }

    #[tokio::test]
    async fn test_deliver_passes_resolved_targets_to_pusher() {
        // テスト項目: 解決した配信対象だけが MessagePusher に渡され、空のルームでは呼ばれない
        // given (前提条件):
        let book = Arc::new(Mutex::new(PresenceBook::new()));
        let conn = ConnectionId::generate();
        {
            let mut book = book.lock().await;
            book.register(conn, UserId::new(1), Timestamp::new(0)).unwrap();
            book.join(&conn, ROOM).unwrap();
        }
        let mut pusher = crate::domain::MockMessagePusher::new();
        pusher
            .expect_broadcast()
            .withf(move |targets, content| targets.to_vec() == vec![conn] && content.to_string() == "ping")
            .times(1)
            .returning(|targets, _| BroadcastReport {
                delivered: targets.len(),
                failed: Vec::new(),
            });
        let dispatcher = FanoutDispatcher::new(book, Arc::new(pusher));

        // when (操作):
        let report = dispatcher.deliver(ROOM, "ping", None).await;
        let empty = dispatcher.deliver(RoomId::new(8), "ping", None).await;

        // then (期待する結果):
        assert_eq!(report.delivered, 1);
        assert_eq!(empty, BroadcastReport::default());
    }

    #[tokio::test]
    async fn test_deliver_presence_reads_current_state() {
        // テスト項目: オンライン状況は配信時点の状況で、接続のあるルームにだけ送られる
        // given (前提条件): 状況を取得した後に bob が join している
        let fixture = create_fixture();
        let (_alice, mut alice_rx) = join(&fixture, UserId::new(1)).await;
        let stale = fixture.book.lock().await.presence(ROOM);
        let (_bob, mut bob_rx) = join(&fixture, UserId::new(2)).await;
        assert_eq!(stale.online_count, 1);

        // when (操作):
        fixture
            .dispatcher
            .deliver_presence(&[ROOM, RoomId::new(404)], |p| {
                format!("{}:{}", p.room_id, p.online_count)
            })
            .await;

        // then (期待する結果):
        assert_eq!(alice_rx.try_recv().ok(), Some("7:2".to_string()));
        assert_eq!(bob_rx.try_recv().ok(), Some("7:2".to_string()));
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_deliver_to_user_reaches_every_connection() {
        // テスト項目: ユーザー宛ての配信は、ルームに join していない接続も含めた全接続に届く
        // given (前提条件):
        let fixture = create_fixture();
        let (_joined, mut joined_rx) = join(&fixture, UserId::new(2)).await;
        let lobby = ConnectionId::generate();
        let (tx, mut lobby_rx): (PusherChannel, _) = mpsc::unbounded_channel();
        fixture
            .book
            .lock()
            .await
            .register(lobby, UserId::new(2), Timestamp::new(0))
            .unwrap();
        fixture.pusher.attach(lobby, tx).await;
        let (_other, mut other_rx) = join(&fixture, UserId::new(3)).await;

        // when (操作):
        let report = fixture
            .dispatcher
            .deliver_to_user(UserId::new(2), "ring")
            .await;
        let offline = fixture
            .dispatcher
            .deliver_to_user(UserId::new(404), "ring")
            .await;

        // then (期待する結果):
        assert_eq!(report.delivered, 2);
        assert_eq!(joined_rx.try_recv().ok(), Some("ring".to_string()));
        assert_eq!(lobby_rx.try_recv().ok(), Some("ring".to_string()));
        assert!(other_rx.try_recv().is_err());
        assert_eq!(offline, BroadcastReport::default());
    }
}
