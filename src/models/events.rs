use crate::models::{common::Position3D, traits::IMessageSink};
use tracing::{debug, info};

/// ミッションログイベントの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEventKind {
    Comment,
    Position,
    Takeoff,
    Land,
    Crash,
    Pickup,
    Dropoff,
}

impl LogEventKind {
    /// ログファイル上のイベントコード
    pub fn code(&self) -> u32 {
        match self {
            LogEventKind::Comment => 0,
            LogEventKind::Position => 1,
            LogEventKind::Takeoff => 10,
            LogEventKind::Land => 11,
            LogEventKind::Crash => 12,
            LogEventKind::Pickup => 13,
            LogEventKind::Dropoff => 14,
        }
    }
}

/// 記録済みのミッションログイベント
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub kind: LogEventKind,
    /// ミッション経過時間（秒）
    pub elapsed_s: f64,
    pub position: Position3D,
    pub text: String,
}

/// メモリ上のメッセージ／ミッションログ
///
/// 追記と同時に `tracing` にも流します。
#[derive(Debug, Default)]
pub struct MessageLog {
    /// 画面メッセージ（古い順）
    pub messages: Vec<String>,
    /// ミッションログイベント（古い順）
    pub events: Vec<LogEvent>,
    /// イベントに記録するミッション経過時間（秒）
    pub mission_time_s: f64,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定種別のイベント
    pub fn events_of(&self, kind: LogEventKind) -> impl Iterator<Item = &LogEvent> {
        self.events.iter().filter(move |e| e.kind == kind)
    }

    /// 最後に追加された画面メッセージ
    pub fn last_message(&self) -> Option<&str> {
        self.messages.last().map(String::as_str)
    }
}

impl IMessageSink for MessageLog {
    fn add_message(&mut self, text: &str) {
        debug!(message = %text, "SIM_MESSAGE");
        self.messages.push(text.to_string());
    }

    fn append_log_event(&mut self, kind: LogEventKind, position: Position3D, text: &str) {
        info!(
            event_code = kind.code(),
            elapsed_s = self.mission_time_s,
            event_kind = ?kind,
            position_x = position.x,
            position_y = position.y,
            position_z = position.z,
            "MISSION_LOG_EVENT: {}",
            text
        );
        self.events.push(LogEvent {
            kind,
            elapsed_s: self.mission_time_s,
            position,
            text: text.to_string(),
        });
    }
}

/// "1 passenger" / "3 passengers"
pub(crate) fn passenger_noun(count: u32) -> &'static str {
    if count == 1 { "passenger" } else { "passengers" }
}
