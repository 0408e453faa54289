use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{
    entity::{EntityId, ObjectRegistry},
    events::MessageLog,
    mission::{self, Mission},
    player::PlayerStats,
};

/// シミュレーション全体のオプション
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimOptions {
    /// プレイヤー機のホイスト収容半径の拡大係数（1 未満は 1 として扱う）
    pub hoist_contact_expansion_coeff: f64,
    pub mission_check_interval_ms: u64,
    /// 成功／失敗が確定してから終了判定するまでの待ち時間
    pub mission_end_delay_ms: u64,
    pub log_position_interval_ms: u64,
    pub time_compression: f64,
    /// 支持面がない場所の地表高度（m）
    pub ground_elevation_m: f64,
    pub surface_contact_z_tolerance_m: f64,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            hoist_contact_expansion_coeff: 1.0,
            mission_check_interval_ms: 1000,
            mission_end_delay_ms: 5000,
            log_position_interval_ms: 10000,
            time_compression: 1.0,
            ground_elevation_m: 0.0,
            surface_contact_z_tolerance_m: 0.05,
        }
    }
}

/// シミュレーション時計（ミリ秒）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SimClock {
    /// 現在時刻
    pub cur_millitime: u64,
    /// 直前のティックからの経過時間
    pub lapsed_millitime: u64,
}

impl SimClock {
    /// 時計を進める
    pub fn advance(&mut self, lapsed_ms: u64) {
        self.lapsed_millitime = lapsed_ms;
        self.cur_millitime += lapsed_ms;
    }

    /// 直前のティックの経過時間（秒、時間圧縮込み）
    pub fn lapsed_secs(&self, time_compression: f64) -> f64 {
        self.lapsed_millitime as f64 * time_compression / 1000.0
    }
}

/// シミュレーションコンテキスト
///
/// レジストリ・ミッション・プレイヤー情報をまとめて保持し、
/// 接触検知・ホイスト・ミッションの各操作に明示的に渡します。
#[derive(Debug, Default)]
pub struct SimContext {
    pub registry: ObjectRegistry,
    pub mission: Option<Mission>,
    /// プレイヤー機
    pub player: Option<EntityId>,
    pub player_stats: Option<PlayerStats>,
    pub messages: MessageLog,
    pub options: SimOptions,
    pub clock: SimClock,
}

impl SimContext {
    pub fn new(options: SimOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn time_compression(&self) -> f64 {
        self.options.time_compression
    }

    /// 直前のティックの経過時間（秒、時間圧縮込み）
    pub fn lapsed_secs(&self) -> f64 {
        self.clock.lapsed_secs(self.options.time_compression)
    }

    pub fn is_player(&self, id: EntityId) -> bool {
        self.player == Some(id)
    }

    /// ミッションを一時的に取り出して処理を行う
    ///
    /// ミッションが設定されていなければ `None` を返し、何もしません。
    pub fn with_mission<R>(&mut self, f: impl FnOnce(&mut Mission, &mut SimContext) -> R) -> Option<R> {
        let mut mission = self.mission.take()?;
        let result = f(&mut mission, self);
        if self.mission.is_some() {
            warn!("MISSION_REPLACED: 処理中にミッションが差し替えられたため破棄します");
        }
        self.mission = Some(mission);
        Some(result)
    }

    /// ログ上の名前（プレイヤー機ならパイロット名）
    pub fn display_name(&self, id: EntityId) -> String {
        if self.is_player(id) {
            if let Some(stats) = &self.player_stats {
                return stats.name.clone();
            }
        }
        self.registry.name_of(id).unwrap_or_default().to_string()
    }

    /// エンティティの破棄
    ///
    /// 解放前にミッションへ破棄を通知します。
    /// プレイヤー機の場合はミッションの有無に関わらず墜落回数を数えます。
    ///
    /// # 戻り値
    /// 破棄した場合 true、無効なハンドルなら false
    pub fn destroy_entity(&mut self, id: EntityId) -> bool {
        if !self.registry.is_valid(id) {
            return false;
        }
        if self.is_player(id) {
            if let Some(stats) = self.player_stats.as_mut() {
                stats.crashes += 1;
            }
        }
        mission::destroy_notify(self, id);
        if let Some(entity) = self.registry.delete(id) {
            debug!(entity = %entity.name, "ENTITY_DESTROYED: エンティティを破棄");
        }
        if self.is_player(id) {
            self.player = None;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        common::Position3D,
        entity::{Aircraft, Entity, EntityKind},
    };
    use approx::assert_abs_diff_eq;

    fn with_player(options: SimOptions) -> (SimContext, EntityId) {
        let mut ctx = SimContext::new(options);
        let id = ctx.registry.add(Entity::new(
            "Rescue1",
            EntityKind::Aircraft(Aircraft::new(2)),
            Position3D::default(),
        ));
        ctx.player = Some(id);
        ctx.player_stats = Some(PlayerStats::new("Pilot"));
        (ctx, id)
    }

    #[test]
    fn test_player_crash_counted_without_mission() {
        let (mut ctx, player) = with_player(SimOptions::default());
        assert!(ctx.mission.is_none());

        assert!(ctx.destroy_entity(player));
        assert_eq!(ctx.player_stats.as_ref().map(|s| s.crashes), Some(1));
        assert_eq!(ctx.player, None);
        assert!(!ctx.destroy_entity(player));
        assert_eq!(ctx.player_stats.as_ref().map(|s| s.crashes), Some(1));
    }

    #[test]
    fn test_lapsed_secs_follows_options() {
        let (mut ctx, _) = with_player(SimOptions::default());
        ctx.clock.advance(500);
        assert_abs_diff_eq!(ctx.lapsed_secs(), 0.5);

        ctx.options.time_compression = 4.0;
        assert_abs_diff_eq!(ctx.time_compression(), 4.0);
        assert_abs_diff_eq!(ctx.lapsed_secs(), 2.0);
        assert_eq!(ctx.clock.cur_millitime, 500);
    }
}
