/// 救助1名の収容あたりの得点
pub const POINTS_VICTIM_PICKED_UP: i64 = 50;

/// 救助1名の搬送完了あたりの得点
pub const POINTS_VICTIM_RESCUED: i64 = 50;

/// プレイヤー成績
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayerStats {
    /// パイロット名（ログに使用）
    pub name: String,
    pub score: i64,
    pub rescues: u32,
    pub crashes: u32,
}

impl PlayerStats {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// 収容による加点
    pub fn record_pickup(&mut self, count: u32) {
        self.score += POINTS_VICTIM_PICKED_UP * i64::from(count);
    }

    /// 搬送完了による加点
    pub fn record_rescue(&mut self, count: u32) {
        self.rescues += count;
        self.score += POINTS_VICTIM_RESCUED * i64::from(count);
    }
}
