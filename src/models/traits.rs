use crate::models::common::Position3D;
use crate::models::entity::EntityId;
use crate::models::events::LogEventKind;

/// メッセージ／ミッションログの出力先インターフェース
///
/// どちらも投げっぱなしで、失敗を呼び出し元に返しません。
pub trait IMessageSink {
    /// 画面メッセージの追加
    fn add_message(&mut self, text: &str);

    /// ミッションログイベントの追記
    fn append_log_event(&mut self, kind: LogEventKind, position: Position3D, text: &str);
}

/// 接触検知の通知先インターフェース
///
/// 物理的な応答は外部の積分器側の責務で、ここでは通知のみを受け取ります。
pub trait ICollisionListener {
    /// `source` が `obstruction` に衝突した
    fn on_collision(&mut self, source: EntityId, obstruction: EntityId, impact_coeff: f64);
}

/// 受け取った衝突をすべて記録するリスナー
#[derive(Debug, Default)]
pub struct CollisionRecorder {
    pub collisions: Vec<(EntityId, EntityId, f64)>,
}

impl ICollisionListener for CollisionRecorder {
    fn on_collision(&mut self, source: EntityId, obstruction: EntityId, impact_coeff: f64) {
        self.collisions.push((source, obstruction, impact_coeff));
    }
}
