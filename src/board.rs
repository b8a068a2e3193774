//! Public message board with threaded replies and a ticker.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use tokio::sync::watch;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::store::{Collection, Document, Listing, StoreError};

pub const COLLECTION_NAME: &str = "board_messages";

/// Number of entries the board shows.
pub const RECENT_LIMIT: usize = 50;
/// Number of entries scrolled by the ticker.
pub const TICKER_LIMIT: usize = 10;
pub const TICKER_WELCOME: &str = "Welcome to the live board!";
pub const DEFAULT_SPEED: f64 = 5.0;

/// Replies younger than this mark their thread as new.
fn recent_reply_window() -> Duration {
    Duration::minutes(5)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BoardEntry {
    pub id: String,
    pub nickname: String,
    pub text: String,
    pub is_reply: bool,
    pub parent_id: Option<String>,
    pub color: Option<String>,
    pub font_size: Option<String>,
    pub font_weight: Option<String>,
    #[serde(rename = "isRTL")]
    pub is_rtl: bool,
    pub speed: f64,
    pub is_pinned: bool,
    pub timestamp: DateTime<Utc>,
}

impl Document for BoardEntry {
    fn key(&self) -> &str {
        &self.id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "nickname": "dispatch",
    "text": "Vessel cut-off moved to Friday",
    "color": "#ffd6a5",
    "isRTL": true,
    "speed": 4.0
}))]
pub struct NewBoardMessage {
    pub nickname: String,
    pub text: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub font_size: Option<String>,
    #[serde(default)]
    pub font_weight: Option<String>,
    #[serde(default, rename = "isRTL")]
    pub is_rtl: bool,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub is_pinned: bool,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct ReplyRequest {
    pub nickname: String,
    pub text: String,
}

/// A top-level entry together with its replies.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BoardThread {
    pub entry: BoardEntry,
    pub replies: Vec<BoardEntry>,
    pub has_recent_reply: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("Enter a nickname")]
    MissingNickname,
    #[error("Enter a message")]
    MissingText,
    #[error("Message '{0}' not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct BoardService {
    entries: Collection<BoardEntry>,
}

impl BoardService {
    pub fn new(entries: Collection<BoardEntry>) -> Self {
        Self { entries }
    }

    pub async fn post(&self, message: NewBoardMessage) -> Result<BoardEntry, BoardError> {
        self.post_at(message, Utc::now()).await
    }

    /// Posts a message. A message naming a parent is a reply to it; it is
    /// flagged `is_reply` only when its text also starts with `@`.
    pub async fn post_at(
        &self,
        message: NewBoardMessage,
        now: DateTime<Utc>,
    ) -> Result<BoardEntry, BoardError> {
        let (nickname, text) = validate(&message.nickname, &message.text)?;
        if let Some(parent) = &message.parent_id {
            self.ensure_exists(parent).await?;
        }

        let entry = BoardEntry {
            id: Uuid::new_v4().to_string(),
            nickname,
            is_reply: text.starts_with('@') && message.parent_id.is_some(),
            text,
            parent_id: message.parent_id,
            color: message.color,
            font_size: message.font_size,
            font_weight: message.font_weight,
            is_rtl: message.is_rtl,
            speed: message
                .speed
                .filter(|s| s.is_finite() && *s > 0.0)
                .unwrap_or(DEFAULT_SPEED),
            is_pinned: message.is_pinned,
            timestamp: now,
        };
        self.entries.put(entry.clone()).await?;
        tracing::debug!(id = %entry.id, nickname = %entry.nickname, "board message posted");
        Ok(entry)
    }

    pub async fn reply(&self, parent_id: &str, reply: ReplyRequest) -> Result<BoardEntry, BoardError> {
        self.reply_at(parent_id, reply, Utc::now()).await
    }

    pub async fn reply_at(
        &self,
        parent_id: &str,
        reply: ReplyRequest,
        now: DateTime<Utc>,
    ) -> Result<BoardEntry, BoardError> {
        let (nickname, text) = validate(&reply.nickname, &reply.text)?;
        self.ensure_exists(parent_id).await?;

        let entry = BoardEntry {
            id: Uuid::new_v4().to_string(),
            nickname,
            text,
            is_reply: true,
            parent_id: Some(parent_id.to_string()),
            color: None,
            font_size: None,
            font_weight: None,
            is_rtl: false,
            speed: DEFAULT_SPEED,
            is_pinned: false,
            timestamp: now,
        };
        self.entries.put(entry.clone()).await?;
        Ok(entry)
    }

    /// Deletes a message together with its replies.
    pub async fn delete(&self, id: &str) -> Result<(), BoardError> {
        self.ensure_exists(id).await?;
        let removed = self
            .entries
            .remove_where(|e| e.id == id || e.parent_id.as_deref() == Some(id))
            .await?;
        tracing::debug!(id, removed, "board message deleted");
        Ok(())
    }

    /// The newest `RECENT_LIMIT` entries, newest first.
    pub async fn recent(&self) -> Vec<BoardEntry> {
        let mut entries = self.entries.list().await;
        entries.truncate(RECENT_LIMIT);
        entries
    }

    pub async fn threads(&self, now: DateTime<Utc>) -> Vec<BoardThread> {
        build_threads(&self.recent().await, now)
    }

    pub async fn ticker(&self) -> Vec<String> {
        ticker_lines(&self.recent().await)
    }

    pub fn subscribe(&self) -> watch::Receiver<Listing<BoardEntry>> {
        self.entries.subscribe()
    }

    async fn ensure_exists(&self, id: &str) -> Result<(), BoardError> {
        match self.entries.get(id).await {
            Some(_) => Ok(()),
            None => Err(BoardError::NotFound(id.to_string())),
        }
    }
}

fn validate(nickname: &str, text: &str) -> Result<(String, String), BoardError> {
    let nickname = nickname.trim();
    if nickname.is_empty() {
        return Err(BoardError::MissingNickname);
    }
    let text = text.trim();
    if text.is_empty() {
        return Err(BoardError::MissingText);
    }
    Ok((nickname.to_string(), text.to_string()))
}

/// Groups a newest-first listing into threads.
///
/// Replies whose parent is outside the listing are not shown.
pub fn build_threads(entries: &[BoardEntry], now: DateTime<Utc>) -> Vec<BoardThread> {
    entries
        .iter()
        .filter(|e| e.parent_id.is_none())
        .map(|parent| {
            let replies: Vec<BoardEntry> = entries
                .iter()
                .filter(|e| e.parent_id.as_deref() == Some(parent.id.as_str()))
                .cloned()
                .collect();
            let has_recent_reply = replies
                .iter()
                .any(|r| now.signed_duration_since(r.timestamp) < recent_reply_window());
            BoardThread {
                entry: parent.clone(),
                replies,
                has_recent_reply,
            }
        })
        .collect()
}

/// Texts for the scrolling ticker, newest first.
pub fn ticker_lines(entries: &[BoardEntry]) -> Vec<String> {
    if entries.is_empty() {
        return vec![TICKER_WELCOME.to_string()];
    }
    entries
        .iter()
        .take(TICKER_LIMIT)
        .map(|e| e.text.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn service() -> BoardService {
        BoardService::new(Collection::in_memory(COLLECTION_NAME))
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn message(text: &str) -> NewBoardMessage {
        NewBoardMessage {
            nickname: "ops".to_string(),
            text: text.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn post_validates_input() {
        let board = service();
        let mut msg = message("hello");
        msg.nickname = "  ".to_string();
        assert!(matches!(board.post(msg).await, Err(BoardError::MissingNickname)));
        assert!(matches!(board.post(message(" ")).await, Err(BoardError::MissingText)));

        let entry = board.post(message(" hello ")).await.unwrap();
        assert_eq!(entry.text, "hello");
        assert_eq!(entry.speed, DEFAULT_SPEED);
        assert!(!entry.is_reply);
    }

    #[tokio::test]
    async fn replies_need_an_existing_parent() {
        let board = service();
        let reply = ReplyRequest {
            nickname: "a".to_string(),
            text: "b".to_string(),
        };
        assert!(matches!(
            board.reply("nope", reply).await,
            Err(BoardError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn at_mention_with_parent_is_a_reply() {
        let board = service();
        let parent = board.post(message("question")).await.unwrap();

        let mut msg = message("@ops answer");
        msg.parent_id = Some(parent.id.clone());
        assert!(board.post(msg).await.unwrap().is_reply);

        let mut msg = message("plain follow-up");
        msg.parent_id = Some(parent.id);
        assert!(!board.post(msg).await.unwrap().is_reply);
    }

    #[tokio::test]
    async fn threads_group_replies_and_flag_recent_ones() {
        let board = service();
        let old = board.post_at(message("old"), at(0)).await.unwrap();
        let fresh = board.post_at(message("fresh"), at(10)).await.unwrap();
        let reply = |text: &str| ReplyRequest {
            nickname: "r".to_string(),
            text: text.to_string(),
        };
        board.reply_at(&old.id, reply("late"), at(20)).await.unwrap();
        board.reply_at(&fresh.id, reply("quick"), at(1_000)).await.unwrap();

        let threads = board.threads(at(1_100)).await;
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].entry.text, "fresh");
        assert!(threads[0].has_recent_reply);
        assert_eq!(threads[1].replies[0].text, "late");
        assert!(!threads[1].has_recent_reply);
    }

    #[tokio::test]
    async fn delete_removes_replies_too() {
        let board = service();
        let parent = board.post_at(message("p"), at(0)).await.unwrap();
        board
            .reply_at(
                &parent.id,
                ReplyRequest {
                    nickname: "r".to_string(),
                    text: "child".to_string(),
                },
                at(1),
            )
            .await
            .unwrap();
        board.post_at(message("other"), at(2)).await.unwrap();

        board.delete(&parent.id).await.unwrap();
        let texts: Vec<String> = board.recent().await.into_iter().map(|e| e.text).collect();
        assert_eq!(texts, vec!["other"]);
        assert!(matches!(
            board.delete(&parent.id).await,
            Err(BoardError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn recent_and_ticker_are_bounded() {
        let board = service();
        assert_eq!(board.ticker().await, vec![TICKER_WELCOME.to_string()]);

        for i in 0..(RECENT_LIMIT as i64 + 5) {
            board
                .post_at(message(&format!("msg {i}")), at(i))
                .await
                .unwrap();
        }
        let recent = board.recent().await;
        assert_eq!(recent.len(), RECENT_LIMIT);
        assert_eq!(recent[0].text, "msg 54");

        let ticker = board.ticker().await;
        assert_eq!(ticker.len(), TICKER_LIMIT);
        assert_eq!(ticker[9], "msg 45");
    }
}
