//! Session Gateway
//!
//! プロトコル側の窓口。接続の認証、Presence Coordinator を通したセッションの
//! 開始と終了、受信イベントのユースケースへの振り分けを行う。
//!
//! 受信フレーム 1 つにつき、返信はちょうど 1 つ（`ack` か `error`）。
//! ユースケースのエラーはすべてここで `ErrorDto` に変換される。

use std::{sync::Arc, time::Duration};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use tokio::sync::Mutex;

use hiroba_shared::time::Clock;

use crate::{
    domain::{
        AuthVerifier, ChatMembershipStore, ConnectionId, FileStore, MessageContent, MessageKind,
        MessagePusher, MessageStore, PresenceBook, PusherChannel, RoomId, RoomPresence,
        UploadError, UploadSessionId, UserId, ValueObjectError,
    },
    infrastructure::dto::{
        conversion::{new_message_frame, online_status_frame},
        http::HealthResponse,
        websocket::{
            AckDto, AckResult, CallSignalDto, DecodeError, ErrorCode, ErrorDto, InboundEvent,
            InboundFrame, MergeChunksPayload, OnlineStatusDto, OutboundFrame, RoomPayload,
            SendMessagePayload, SessionPayload, UploadChunkPayload,
        },
    },
    usecase::{
        CallRelayError, CallRelayUseCase, ConnectError, FanoutDispatcher, FileTransferError, FileTransferUseCase,
        GetChatHistoryUseCase, HistoryError, MergeRequest, PresenceCoordinator, PresenceError,
        SendMessageError, SendMessageUseCase, UploadLimits,
    },
};

/// 認証済みの接続
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
}

impl Session {
    pub fn new(user_id: UserId) -> Self {
        Self {
            connection_id: ConnectionId::generate(),
            user_id,
        }
    }
}

/// 外部コラボレータ一式
pub struct Dependencies {
    pub auth_verifier: Arc<dyn AuthVerifier>,
    pub membership_store: Arc<dyn ChatMembershipStore>,
    pub message_store: Arc<dyn MessageStore>,
    pub file_store: Arc<dyn FileStore>,
    pub message_pusher: Arc<dyn MessagePusher>,
    pub clock: Arc<dyn Clock>,
}

pub struct SessionGateway {
    presence: Arc<PresenceCoordinator>,
    fanout: Arc<FanoutDispatcher>,
    send_message: Arc<SendMessageUseCase>,
    file_transfer: Arc<FileTransferUseCase>,
    history: Arc<GetChatHistoryUseCase>,
    call_relay: Arc<CallRelayUseCase>,
}

impl SessionGateway {
    pub fn new(
        presence: Arc<PresenceCoordinator>,
        fanout: Arc<FanoutDispatcher>,
        send_message: Arc<SendMessageUseCase>,
        file_transfer: Arc<FileTransferUseCase>,
        history: Arc<GetChatHistoryUseCase>,
        call_relay: Arc<CallRelayUseCase>,
    ) -> Self {
        Self {
            presence,
            fanout,
            send_message,
            file_transfer,
            history,
            call_relay,
        }
    }

    /// 1 つの `PresenceBook` を共有するユースケース一式を組み立てる
    pub fn assemble(deps: Dependencies, limits: UploadLimits, history_limit: usize) -> Self {
        let book = Arc::new(Mutex::new(PresenceBook::new()));
        let fanout = Arc::new(FanoutDispatcher::new(
            book.clone(),
            deps.message_pusher.clone(),
        ));
        let presence = Arc::new(PresenceCoordinator::new(
            book,
            deps.auth_verifier,
            deps.membership_store.clone(),
            deps.message_pusher,
            deps.clock.clone(),
        ));
        let send_message = Arc::new(SendMessageUseCase::new(
            deps.membership_store.clone(),
            deps.message_store.clone(),
            presence.clone(),
            fanout.clone(),
        ));
        let file_transfer = Arc::new(FileTransferUseCase::new(
            deps.membership_store.clone(),
            deps.file_store,
            deps.message_store.clone(),
            fanout.clone(),
            deps.clock,
            limits,
        ));
        let history = Arc::new(GetChatHistoryUseCase::new(
            deps.membership_store.clone(),
            deps.message_store,
            history_limit,
        ));
        let call_relay = Arc::new(CallRelayUseCase::new(deps.membership_store, fanout.clone()));
        Self::new(
            presence,
            fanout,
            send_message,
            file_transfer,
            history,
            call_relay,
        )
    }

    // ========================================
    // Session lifecycle
    // ========================================

    /// 接続トークンを検証する
    pub async fn authenticate(&self, token: &str) -> Result<UserId, ConnectError> {
        self.presence.authenticate(token).await
    }

    /// セッションを登録し、送信キューを紐付ける
    pub async fn register(&self, session: &Session, sender: PusherChannel) -> Result<(), ConnectError> {
        self.presence
            .register(session.connection_id, session.user_id, sender)
            .await
    }

    /// ユーザーの全ルームに自動 join し、オンライン状況を通知する
    ///
    /// 失敗時は返されたエラーフレームを送ってから接続を閉じること。
    pub async fn join_rooms(&self, session: &Session) -> Result<(), String> {
        match self
            .presence
            .join_user_rooms(session.connection_id, session.user_id)
            .await
        {
            Ok(presences) => {
                self.broadcast_presence(&presences).await;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to join rooms for connection {}: {}",
                    session.connection_id,
                    e
                );
                Err(OutboundFrame::Error(ErrorDto::from(e)).to_json())
            }
        }
    }

    /// セッションを終了し（冪等）、変化したオンライン状況を通知する
    pub async fn close_session(&self, session: &Session) {
        let changed = self.presence.disconnect(session.connection_id).await;
        self.broadcast_presence(&changed).await;
    }

    async fn broadcast_presence(&self, presences: &[RoomPresence]) {
        let room_ids: Vec<RoomId> = presences.iter().map(|p| p.room_id).collect();
        self.fanout
            .deliver_presence(&room_ids, online_status_frame)
            .await;
    }

    // ========================================
    // Inbound events
    // ========================================

    /// 受信テキストフレームを 1 つ処理し、返信フレームを返す
    pub async fn handle_text(&self, session: &Session, text: &str) -> String {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Connection {} sent a malformed frame: {}", session.connection_id, e);
                return OutboundFrame::Error(ErrorDto::from(e)).to_json();
            }
        };
        tracing::debug!(
            "Connection {} sent '{}'",
            session.connection_id,
            frame.event
        );

        let result = match frame.decode() {
            Ok(event) => self.dispatch(session, event).await,
            Err(e) => Err(ErrorDto::from(e)),
        };

        let reply = match result {
            Ok(result) => OutboundFrame::Ack(AckDto {
                event: frame.event,
                request_id: frame.request_id,
                result,
            }),
            Err(mut error) => {
                error.event = Some(frame.event);
                error.request_id = frame.request_id;
                OutboundFrame::Error(error)
            }
        };
        reply.to_json()
    }

    /// バイナリフレームへの返信
    pub fn unsupported_frame(&self) -> String {
        OutboundFrame::Error(ErrorDto::new(
            ErrorCode::BadRequest,
            "binary frames are not supported; send JSON text frames",
        ))
        .to_json()
    }

    async fn dispatch(&self, session: &Session, event: InboundEvent) -> Result<AckResult, ErrorDto> {
        match event {
            InboundEvent::SendMessage(payload) => self.on_send_message(session, payload).await,
            InboundEvent::SubscribeToChat(payload) => self.on_subscribe(session, payload).await,
            InboundEvent::UnsubscribeFromChat(payload) => {
                self.on_unsubscribe(session, payload).await
            }
            InboundEvent::UploadChunk(payload) => self.on_upload_chunk(session, payload).await,
            InboundEvent::MergeChunks(payload) => self.on_merge_chunks(session, payload).await,
            InboundEvent::CancelUpload(payload) => self.on_cancel_upload(session, payload).await,
            InboundEvent::GetChatHistory(payload) => self.on_history(session, payload).await,
            InboundEvent::GetOnlineStatus => self.on_online_status(session).await,
            InboundEvent::CallUser(payload) => {
                let mut signal = CallSignalDto::from_user(session.user_id.value());
                signal.offer = Some(payload.offer);
                self.on_call_signal(session, payload.to, OutboundFrame::IncomingCall(signal))
                    .await
            }
            InboundEvent::AnswerCall(payload) => {
                let mut signal = CallSignalDto::from_user(session.user_id.value());
                signal.answer = Some(payload.answer);
                self.on_call_signal(session, payload.to, OutboundFrame::CallAnswered(signal))
                    .await
            }
            InboundEvent::IceCandidate(payload) => {
                let mut signal = CallSignalDto::from_user(session.user_id.value());
                signal.candidate = Some(payload.candidate);
                self.on_call_signal(session, payload.to, OutboundFrame::IceCandidate(signal))
                    .await
            }
            InboundEvent::EndCall(payload) => {
                let signal = CallSignalDto::from_user(session.user_id.value());
                self.on_call_signal(session, payload.to, OutboundFrame::CallEnded(signal))
                    .await
            }
        }
    }

    async fn on_send_message(
        &self,
        session: &Session,
        payload: SendMessagePayload,
    ) -> Result<AckResult, ErrorDto> {
        let kind = match payload.kind.as_deref() {
            None => MessageKind::Text,
            Some(kind) => MessageKind::parse(kind).map_err(bad_request)?,
        };
        if kind == MessageKind::File {
            return Err(ErrorDto::new(
                ErrorCode::BadRequest,
                "file messages are created by mergeChunks",
            ));
        }
        let content = MessageContent::new(payload.content).map_err(bad_request)?;

        let message = self
            .send_message
            .execute(
                session.connection_id,
                session.user_id,
                RoomId::new(payload.room_id),
                kind,
                content,
                new_message_frame,
                online_status_frame,
            )
            .await?;
        Ok(AckResult::MessageSent {
            message: (&message).into(),
        })
    }

    async fn on_subscribe(
        &self,
        session: &Session,
        payload: RoomPayload,
    ) -> Result<AckResult, ErrorDto> {
        let outcome = self
            .presence
            .subscribe(
                session.connection_id,
                session.user_id,
                RoomId::new(payload.room_id),
            )
            .await?;
        if !outcome.already_subscribed {
            self.broadcast_presence(std::slice::from_ref(&outcome.presence))
                .await;
        }
        Ok(AckResult::Subscribed {
            already_subscribed: outcome.already_subscribed,
            status: (&outcome.presence).into(),
        })
    }

    async fn on_unsubscribe(
        &self,
        session: &Session,
        payload: RoomPayload,
    ) -> Result<AckResult, ErrorDto> {
        let room_id = RoomId::new(payload.room_id);
        if let Some(presence) = self
            .presence
            .unsubscribe(session.connection_id, session.user_id, room_id)
            .await?
        {
            self.broadcast_presence(&[presence]).await;
        }
        Ok(AckResult::Unsubscribed {
            room_id: room_id.value(),
        })
    }

    async fn on_upload_chunk(
        &self,
        session: &Session,
        payload: UploadChunkPayload,
    ) -> Result<AckResult, ErrorDto> {
        let session_id = UploadSessionId::new(payload.session_id).map_err(bad_request)?;
        let bytes = BASE64.decode(payload.bytes.as_bytes()).map_err(|e| {
            ErrorDto::new(ErrorCode::BadRequest, format!("chunk is not valid base64: {}", e))
        })?;

        let receipt = self
            .file_transfer
            .upload_chunk(
                session.user_id,
                &session_id,
                payload.index,
                payload.total_chunks,
                bytes,
            )
            .await?;
        Ok(AckResult::ChunkStored {
            session_id: session_id.into(),
            chunk_index: receipt.chunk_index,
            received_chunks: receipt.received_chunks,
            total_chunks: receipt.total_chunks,
        })
    }

    async fn on_merge_chunks(
        &self,
        session: &Session,
        payload: MergeChunksPayload,
    ) -> Result<AckResult, ErrorDto> {
        let session_id = UploadSessionId::new(payload.session_id).map_err(bad_request)?;
        let merged = self
            .file_transfer
            .merge(
                session.connection_id,
                session.user_id,
                MergeRequest {
                    session_id,
                    room_id: RoomId::new(payload.room_id),
                    filename: payload.filename,
                    mimetype: payload.mimetype,
                    declared_size: payload.size,
                },
                new_message_frame,
            )
            .await?;
        Ok(AckResult::FileMerged {
            message: (&merged.message).into(),
            file: (&merged.file).into(),
        })
    }

    async fn on_cancel_upload(
        &self,
        session: &Session,
        payload: SessionPayload,
    ) -> Result<AckResult, ErrorDto> {
        let session_id = UploadSessionId::new(payload.session_id).map_err(bad_request)?;
        let discarded = self
            .file_transfer
            .discard(session.user_id, &session_id)
            .await?;
        Ok(AckResult::UploadCancelled {
            session_id: session_id.into(),
            discarded,
        })
    }

    async fn on_history(
        &self,
        session: &Session,
        payload: RoomPayload,
    ) -> Result<AckResult, ErrorDto> {
        let room_id = RoomId::new(payload.room_id);
        let messages = self.history.execute(session.user_id, room_id).await?;
        Ok(AckResult::History {
            room_id: room_id.value(),
            messages: messages.iter().map(Into::into).collect(),
        })
    }

    async fn on_online_status(&self, session: &Session) -> Result<AckResult, ErrorDto> {
        let statuses = self.presence.online_statuses(session.user_id).await?;
        Ok(AckResult::OnlineStatuses {
            statuses: statuses.iter().map(Into::into).collect(),
        })
    }

    async fn on_call_signal(
        &self,
        session: &Session,
        to: i64,
        frame: OutboundFrame,
    ) -> Result<AckResult, ErrorDto> {
        let to = UserId::new(to);
        let delivered = self
            .call_relay
            .relay(session.user_id, to, &frame.to_json())
            .await?;
        Ok(AckResult::SignalRelayed {
            to: to.value(),
            delivered,
        })
    }

    // ========================================
    // Maintenance and introspection
    // ========================================

    /// `idle_timeout` 以上放置されたアップロードセッションを回収する
    pub async fn sweep_idle_uploads(&self, idle_timeout: Duration) -> usize {
        self.file_transfer.sweep_idle(idle_timeout).await.len()
    }

    pub async fn room_presence(&self, room_id: RoomId) -> OnlineStatusDto {
        (&self.presence.presence(room_id).await).into()
    }

    pub async fn health(&self) -> HealthResponse {
        let (upload_sessions, buffered_bytes) = self.file_transfer.buffer_usage().await;
        HealthResponse {
            status: "ok",
            connections: self.presence.connection_count().await,
            upload_sessions,
            buffered_bytes,
        }
    }
}

// ========================================
// エラー → ErrorDto
// ========================================

fn bad_request(e: ValueObjectError) -> ErrorDto {
    ErrorDto::new(ErrorCode::BadRequest, e.to_string())
}

fn upstream(e: impl std::fmt::Display) -> ErrorDto {
    tracing::error!("Upstream failure: {}", e);
    ErrorDto::new(
        ErrorCode::UpstreamFailure,
        "a backing service failed; please retry",
    )
}

fn internal(e: impl std::fmt::Display) -> ErrorDto {
    tracing::error!("Internal invariant violated: {}", e);
    ErrorDto::new(ErrorCode::Internal, "internal error")
}

impl From<DecodeError> for ErrorDto {
    fn from(e: DecodeError) -> Self {
        ErrorDto::new(ErrorCode::BadRequest, e.to_string())
    }
}

impl From<ConnectError> for ErrorDto {
    fn from(e: ConnectError) -> Self {
        match e {
            ConnectError::Auth(e) => ErrorDto::new(ErrorCode::Unauthorized, e.to_string()),
            ConnectError::Upstream(e) => upstream(e),
            ConnectError::Registry(e) => internal(e),
            ConnectError::Cancelled => ErrorDto::new(ErrorCode::Internal, e.to_string()),
        }
    }
}

impl From<PresenceError> for ErrorDto {
    fn from(e: PresenceError) -> Self {
        match e {
            PresenceError::Forbidden(_) => ErrorDto::new(ErrorCode::Forbidden, e.to_string()),
            PresenceError::Upstream(e) => upstream(e),
            PresenceError::Registry(e) => internal(e),
        }
    }
}

impl From<SendMessageError> for ErrorDto {
    fn from(e: SendMessageError) -> Self {
        match e {
            SendMessageError::Forbidden(_) => ErrorDto::new(ErrorCode::Forbidden, e.to_string()),
            SendMessageError::InvalidMessage(e) => bad_request(e),
            SendMessageError::Upstream(e) => upstream(e),
        }
    }
}

impl From<UploadError> for ErrorDto {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::IncompleteUpload { ref missing } => {
                let missing = missing.clone();
                let mut dto = ErrorDto::new(ErrorCode::IncompleteUpload, e.to_string());
                dto.missing_chunks = Some(missing);
                dto
            }
            UploadError::InconsistentUpload { .. } => {
                ErrorDto::new(ErrorCode::InconsistentUpload, e.to_string())
            }
            UploadError::NotOwner(_) => ErrorDto::new(ErrorCode::Forbidden, e.to_string()),
            UploadError::InvalidChunk { .. } | UploadError::UnknownSession(_) => {
                ErrorDto::new(ErrorCode::BadRequest, e.to_string())
            }
        }
    }
}

impl From<FileTransferError> for ErrorDto {
    fn from(e: FileTransferError) -> Self {
        match e {
            FileTransferError::Upload(e) => e.into(),
            FileTransferError::Forbidden(_) => ErrorDto::new(ErrorCode::Forbidden, e.to_string()),
            FileTransferError::ChunkTooLarge { .. }
            | FileTransferError::TotalChunksOutOfRange { .. }
            | FileTransferError::BufferLimitExceeded { .. } => {
                ErrorDto::new(ErrorCode::BadRequest, e.to_string())
            }
            FileTransferError::InvalidFile(e) => bad_request(e),
            FileTransferError::Upstream(e) => upstream(e),
        }
    }
}

impl From<CallRelayError> for ErrorDto {
    fn from(e: CallRelayError) -> Self {
        match e {
            CallRelayError::Forbidden(_) => ErrorDto::new(ErrorCode::Forbidden, e.to_string()),
            CallRelayError::Upstream(e) => upstream(e),
        }
    }
}

impl From<HistoryError> for ErrorDto {
    fn from(e: HistoryError) -> Self {
        match e {
            HistoryError::Forbidden(_) => ErrorDto::new(ErrorCode::Forbidden, e.to_string()),
            HistoryError::Upstream(e) => upstream(e),
        }
    }
}
