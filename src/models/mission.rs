use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::context::{SimContext, SimOptions};
use crate::models::{
    entity::EntityId,
    events::{LogEventKind, passenger_noun},
    hoist,
    traits::IMessageSink,
};

const MESSAGE_ENROUTE: &str = "Mission in progress, enroute to";
const MESSAGE_TIME_LEFT: &str = "Time left";
const MESSAGE_STANDBY: &str = "Mission on stand by, please wait...";
const MESSAGE_FAILED: &str = "Mission failed!";
const MESSAGE_RESCUE_COMPLETE: &str = "Rescue mission complete!";
const MESSAGE_RESCUE_IN_PROGRESS: &str = "Rescue in progress";
const MESSAGE_MORE_TO_FIND: &str = "more to find...";
const MESSAGE_ALL_FOUND: &str = "all found!";
const MESSAGE_TO_GET_ALL_TO_SAFETY: &str = "to get all to safety!";
const MESSAGE_TO_PICK_UP_ALL: &str = "to pick up all!";

/// ミッション処理のエラー
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MissionError {
    #[error("ミッションが設定されていません")]
    NoMission,
    #[error("現在の目標がないのに終了していないミッション状態です: {0:?}")]
    UnsupportedState(MissionState),
}

/// 目標の種類
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectiveKind {
    /// 指定地点に着陸する
    ArriveAt { target: String },
    /// 指定人数を収容する
    PickUp { humans_needed: u32 },
    /// 指定人数を収容して指定地点に届ける
    PickUpArriveAt { target: String, humans_needed: u32 },
}

impl ObjectiveKind {
    pub fn label(&self) -> &'static str {
        match self {
            ObjectiveKind::ArriveAt { .. } => "arrive_at",
            ObjectiveKind::PickUp { .. } => "pick_up",
            ObjectiveKind::PickUpArriveAt { .. } => "pick_up_arrive_at",
        }
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            ObjectiveKind::ArriveAt { target } | ObjectiveKind::PickUpArriveAt { target, .. } => {
                Some(target.as_str())
            }
            ObjectiveKind::PickUp { .. } => None,
        }
    }

    fn humans_needed(&self) -> u32 {
        match self {
            ObjectiveKind::ArriveAt { .. } => 0,
            ObjectiveKind::PickUp { humans_needed } | ObjectiveKind::PickUpArriveAt { humans_needed, .. } => {
                *humans_needed
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveState {
    Incomplete,
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionState {
    InProgress,
    Accomplished,
    Failed,
}

/// ミッション定期処理の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionStatus {
    /// 継続中（または判定時刻前）
    Continue,
    Accomplished,
    Failed,
}

/// ミッションの目標
#[derive(Debug, Clone, PartialEq)]
pub struct Objective {
    pub kind: ObjectiveKind,
    pub state: ObjectiveState,
    /// 制限時間（秒、0 以下は無制限）
    pub time_limit: f64,
    pub time_left: f64,
    /// まだ救助が必要な人数（負になりうる）
    pub humans_need_rescue: i64,
    pub message_success: Option<String>,
    pub message_fail: Option<String>,
}

impl Objective {
    pub fn new(kind: ObjectiveKind, time_limit: f64) -> Self {
        let humans_need_rescue = i64::from(kind.humans_needed());
        Self {
            kind,
            state: ObjectiveState::Incomplete,
            time_limit,
            time_left: time_limit,
            humans_need_rescue,
            message_success: None,
            message_fail: None,
        }
    }

    pub fn arrive_at(target: impl Into<String>, time_limit: f64) -> Self {
        Self::new(ObjectiveKind::ArriveAt { target: target.into() }, time_limit)
    }

    pub fn pick_up(humans_needed: u32, time_limit: f64) -> Self {
        Self::new(ObjectiveKind::PickUp { humans_needed }, time_limit)
    }

    pub fn pick_up_arrive_at(target: impl Into<String>, humans_needed: u32, time_limit: f64) -> Self {
        Self::new(
            ObjectiveKind::PickUpArriveAt {
                target: target.into(),
                humans_needed,
            },
            time_limit,
        )
    }

    pub fn with_messages(mut self, success: Option<String>, fail: Option<String>) -> Self {
        self.message_success = success;
        self.message_fail = fail;
        self
    }
}

/// ミッション
///
/// 目標リストとカーソルで進行を管理します。カーソルが末尾を越えると
/// 成功または失敗で確定し、以後 `InProgress` に戻ることはありません。
#[derive(Debug, Clone, PartialEq)]
pub struct Mission {
    pub title: String,
    pub description: String,
    objectives: Vec<Objective>,
    cursor: usize,
    state: MissionState,
    /// ミッション経過時間（秒、時間圧縮込み）
    pub time_spent: f64,
    next_check_ms: u64,
    pub check_interval_ms: u64,
    pub end_delay_ms: u64,
    next_log_position_ms: u64,
    pub log_position_interval_ms: u64,
    /// 前回の目標処理以降に経過した時間（秒）
    pending_elapsed_s: f64,
}

impl Mission {
    pub fn new(title: impl Into<String>, objectives: Vec<Objective>) -> Self {
        let defaults = SimOptions::default();
        let mut mission = Self {
            title: title.into(),
            description: String::new(),
            objectives,
            cursor: 0,
            state: MissionState::InProgress,
            time_spent: 0.0,
            next_check_ms: 0,
            check_interval_ms: defaults.mission_check_interval_ms,
            end_delay_ms: defaults.mission_end_delay_ms,
            next_log_position_ms: 0,
            log_position_interval_ms: defaults.log_position_interval_ms,
            pending_elapsed_s: 0.0,
        };
        mission.start_current_objective();
        mission
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_options(mut self, options: &SimOptions) -> Self {
        self.check_interval_ms = options.mission_check_interval_ms;
        self.end_delay_ms = options.mission_end_delay_ms;
        self.log_position_interval_ms = options.log_position_interval_ms;
        self
    }

    pub fn state(&self) -> MissionState {
        self.state
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn objectives(&self) -> &[Objective] {
        &self.objectives
    }

    pub fn current_objective(&self) -> Option<&Objective> {
        self.objectives.get(self.cursor)
    }

    fn current_objective_mut(&mut self) -> Option<&mut Objective> {
        self.objectives.get_mut(self.cursor)
    }

    /// 次回の定期判定時刻（ミリ秒）
    pub fn next_check_ms(&self) -> u64 {
        self.next_check_ms
    }

    /// 現在の目標のタイマーを制限時間から始め直す
    fn start_current_objective(&mut self) {
        self.pending_elapsed_s = 0.0;
        if let Some(objective) = self.current_objective_mut() {
            objective.time_left = objective.time_limit;
        }
    }

    /// 現在の目標を成功として次へ進める
    ///
    /// 最後の目標だった場合はミッションを `Accomplished` にし、
    /// 終了判定を一定時間後に予約します。
    ///
    /// # 戻り値
    /// ミッションが達成された場合 true
    pub fn advance_on_success(&mut self, ctx: &mut SimContext) -> bool {
        if self.state != MissionState::InProgress {
            return false;
        }
        let cursor = self.cursor;
        if let Some(objective) = self.current_objective_mut() {
            objective.state = ObjectiveState::Success;
            let kind = objective.kind.label();
            if let Some(text) = objective.message_success.clone() {
                ctx.messages.add_message(&text);
            }
            info!(objective = cursor, kind, "OBJECTIVE_SUCCESS: 目標を達成");
            self.cursor += 1;
        }

        if self.cursor >= self.objectives.len() {
            self.state = MissionState::Accomplished;
            self.next_check_ms = ctx.clock.cur_millitime + self.end_delay_ms;
            info!(
                mission = %self.title,
                time_spent_s = self.time_spent,
                "MISSION_ACCOMPLISHED: ミッション達成"
            );
            true
        } else {
            self.start_current_objective();
            false
        }
    }

    /// 現在の目標を失敗とし、ミッション全体を失敗で確定させる
    ///
    /// # 戻り値
    /// ミッションが失敗で確定した場合 true
    pub fn advance_on_failure(&mut self, ctx: &mut SimContext) -> bool {
        if self.state != MissionState::InProgress {
            return false;
        }
        let cursor = self.cursor;
        if let Some(objective) = self.current_objective_mut() {
            objective.state = ObjectiveState::Failed;
            let kind = objective.kind.label();
            if let Some(text) = objective.message_fail.clone() {
                ctx.messages.add_message(&text);
            }
            warn!(objective = cursor, kind, "OBJECTIVE_FAILED: 目標に失敗");
        }
        self.cursor = self.objectives.len();
        self.state = MissionState::Failed;
        self.next_check_ms = ctx.clock.cur_millitime + self.end_delay_ms;
        warn!(
            mission = %self.title,
            time_spent_s = self.time_spent,
            "MISSION_FAILED: ミッション失敗"
        );
        true
    }

    fn log_event(&self, ctx: &mut SimContext, kind: LogEventKind, vehicle: EntityId, text: &str) {
        let position = ctx.registry.get(vehicle).map(|e| e.position).unwrap_or_default();
        ctx.messages.mission_time_s = self.time_spent;
        ctx.messages.append_log_event(kind, position, text);
    }

    /// 降ろした乗客の記録（プレイヤー機なら加点）
    fn account_dropoff(&self, ctx: &mut SimContext, vehicle: EntityId, count: u32) {
        if ctx.is_player(vehicle) {
            if let Some(stats) = ctx.player_stats.as_mut() {
                stats.record_rescue(count);
            }
        }
        let text = format!(
            "{} dropped off {} {}",
            ctx.display_name(vehicle),
            count,
            passenger_noun(count)
        );
        self.log_event(ctx, LogEventKind::Dropoff, vehicle, &text);
    }

    fn destroyed(&mut self, ctx: &mut SimContext, id: EntityId) {
        if !ctx.registry.is_valid(id) {
            return;
        }
        let is_player = ctx.is_player(id);
        let text = format!("{} crashed", ctx.display_name(id));
        self.log_event(ctx, LogEventKind::Crash, id, &text);

        if is_player && self.current_objective().is_some() {
            self.advance_on_failure(ctx);
        }
    }

    fn hoisted_in(&mut self, ctx: &mut SimContext, vehicle: EntityId, count: u32) {
        if count == 0 || !ctx.registry.is_valid(vehicle) {
            return;
        }
        let Some(objective) = self.current_objective() else {
            return;
        };
        let pick_up_done =
            matches!(objective.kind, ObjectiveKind::PickUp { .. }) && objective.humans_need_rescue <= 0;

        if ctx.is_player(vehicle) {
            if let Some(stats) = ctx.player_stats.as_mut() {
                stats.record_pickup(count);
            }
        }
        let text = format!(
            "{} picked up {} {}",
            ctx.display_name(vehicle),
            count,
            passenger_noun(count)
        );
        self.log_event(ctx, LogEventKind::Pickup, vehicle, &text);

        if pick_up_done {
            self.advance_on_success(ctx);
        }
    }

    fn passengers_entered(&mut self, ctx: &mut SimContext, vehicle: EntityId, count: u32) {
        if count == 0 {
            return;
        }
        let Some(objective) = self.current_objective_mut() else {
            return;
        };
        if !matches!(objective.kind, ObjectiveKind::PickUp { .. }) {
            return;
        }
        objective.humans_need_rescue -= i64::from(count);
        let remaining = objective.humans_need_rescue;
        debug!(vehicle = ?vehicle, entered = count, remaining, "PASSENGERS_ENTERED");
        if remaining <= 0 {
            self.advance_on_success(ctx);
        }
    }

    fn landed(&mut self, ctx: &mut SimContext, vehicle: EntityId, ground_contacts: &[EntityId]) {
        let Some(objective) = self.current_objective() else {
            return;
        };
        let Some(target) = objective.kind.target() else {
            // 収容のみの目標では着陸しても何も起きない
            return;
        };
        let arrived = ground_contacts.iter().any(|id| {
            ctx.registry
                .get(*id)
                .is_some_and(|e| e.name.eq_ignore_ascii_case(target))
        });
        if !arrived {
            return;
        }
        let kind = objective.kind.clone();
        info!(vehicle = %ctx.display_name(vehicle), pad = target, "LANDED_AT_TARGET: 目的地に着陸");

        let onboard = ctx.registry.get(vehicle).map(|e| e.passengers()).unwrap_or(0);
        let unloaded = hoist::unload_all_passengers(ctx, vehicle);
        if unloaded > 0 {
            self.account_dropoff(ctx, vehicle, unloaded);
        }

        let in_progress = self.state == MissionState::InProgress;
        let Some(objective) = self.current_objective_mut() else {
            return;
        };
        let incomplete = objective.state == ObjectiveState::Incomplete;
        match kind {
            ObjectiveKind::ArriveAt { .. } => {
                if ctx.is_player(vehicle) && incomplete && in_progress {
                    self.advance_on_success(ctx);
                }
            }
            ObjectiveKind::PickUpArriveAt { .. } => {
                // どの機体が届けてもよい
                objective.humans_need_rescue -= i64::from(onboard);
                if objective.humans_need_rescue <= 0 && incomplete && in_progress {
                    self.advance_on_success(ctx);
                }
            }
            ObjectiveKind::PickUp { .. } => {}
        }
    }

    /// 現在の目標の制限時間処理
    fn manage_objective(&mut self, ctx: &mut SimContext) {
        let elapsed = std::mem::take(&mut self.pending_elapsed_s);
        let player_passengers = ctx
            .player
            .and_then(|p| ctx.registry.get(p))
            .map(|e| i64::from(e.passengers()))
            .unwrap_or(0);

        let Some(objective) = self.current_objective_mut() else {
            return;
        };
        if objective.time_left <= 0.0 {
            return;
        }
        objective.time_left -= elapsed;
        if objective.time_left > 0.0 {
            return;
        }

        let expired = match objective.kind {
            ObjectiveKind::ArriveAt { .. } | ObjectiveKind::PickUpArriveAt { .. } => true,
            // 残りの要救助者を全員乗せていれば猶予
            ObjectiveKind::PickUp { .. } => objective.humans_need_rescue - player_passengers > 0,
        };
        if expired {
            warn!(kind = objective.kind.label(), "OBJECTIVE_TIMEOUT: 制限時間切れ");
            self.advance_on_failure(ctx);
        }
    }

    /// ミッションの定期処理
    ///
    /// 毎ティック呼び出します。経過時間を積算し、判定時刻になったら
    /// 状態を確認して目標の制限時間を処理します。
    ///
    /// # 戻り値
    /// 継続中なら `Continue`、確定済みなら `Accomplished` / `Failed`。
    /// 終了していないのに現在の目標がない場合はエラー
    pub fn manage(&mut self, ctx: &mut SimContext) -> Result<MissionStatus, MissionError> {
        let lapsed = ctx.lapsed_secs();
        self.time_spent += lapsed;
        self.pending_elapsed_s += lapsed;
        ctx.messages.mission_time_s = self.time_spent;
        let now = ctx.clock.cur_millitime;

        if self.state == MissionState::InProgress && now >= self.next_log_position_ms {
            self.next_log_position_ms = now + self.log_position_interval_ms;
            if let Some(player) = ctx.player.filter(|p| ctx.registry.is_valid(*p)) {
                let text = ctx.display_name(player);
                self.log_event(ctx, LogEventKind::Position, player, &text);
            }
        }

        if self.next_check_ms > now {
            return Ok(MissionStatus::Continue);
        }
        self.next_check_ms = now + self.check_interval_ms;

        if self.state != MissionState::InProgress || self.current_objective().is_none() {
            return match self.state {
                MissionState::Accomplished => Ok(MissionStatus::Accomplished),
                MissionState::Failed => Ok(MissionStatus::Failed),
                state => {
                    error!(state = ?state, "MISSION_STATE_ERROR: 現在の目標がありません");
                    Err(MissionError::UnsupportedState(state))
                }
            };
        }

        self.manage_objective(ctx);
        Ok(MissionStatus::Continue)
    }

    /// 状況表示用のメッセージ
    pub fn status_lines(&self, ctx: &SimContext) -> Vec<String> {
        let mut lines = Vec::new();

        let (passengers, passengers_max) = ctx
            .player
            .and_then(|p| ctx.registry.get(p))
            .and_then(|e| e.aircraft())
            .map(|a| (a.passengers, a.passengers_max))
            .unwrap_or((0, 0));
        lines.push(format!("Passengers: {}({})", passengers, passengers_max));

        let Some(objective) = self.current_objective() else {
            lines.push(
                match self.state {
                    MissionState::InProgress => MESSAGE_STANDBY,
                    MissionState::Failed => MESSAGE_FAILED,
                    MissionState::Accomplished => MESSAGE_RESCUE_COMPLETE,
                }
                .to_string(),
            );
            return lines;
        };

        let time_left = (objective.time_left > 0.0).then(|| format_delta_time(objective.time_left));
        match &objective.kind {
            ObjectiveKind::ArriveAt { target } => {
                lines.push(format!("{} {}", MESSAGE_ENROUTE, target));
                if let Some(t) = time_left {
                    lines.push(format!("{} {}", MESSAGE_TIME_LEFT, t));
                }
            }
            ObjectiveKind::PickUp { .. } | ObjectiveKind::PickUpArriveAt { .. } => {
                if objective.humans_need_rescue > 0 {
                    lines.push(format!(
                        "{}, {} {}",
                        MESSAGE_RESCUE_IN_PROGRESS, objective.humans_need_rescue, MESSAGE_MORE_TO_FIND
                    ));
                } else {
                    lines.push(format!("{}, {}", MESSAGE_RESCUE_IN_PROGRESS, MESSAGE_ALL_FOUND));
                }
                if let Some(t) = time_left {
                    let goal = if matches!(objective.kind, ObjectiveKind::PickUp { .. }) {
                        MESSAGE_TO_PICK_UP_ALL
                    } else {
                        MESSAGE_TO_GET_ALL_TO_SAFETY
                    };
                    lines.push(format!("{} {} {}", MESSAGE_TIME_LEFT, t, goal));
                }
            }
        }
        lines
    }
}

fn plural(n: u64, unit: &str) -> String {
    if n == 1 {
        format!("{} {}", n, unit)
    } else {
        format!("{} {}s", n, unit)
    }
}

/// 残り時間の表示（"2 minutes 5 seconds" など）
pub fn format_delta_time(secs: f64) -> String {
    let t = secs.max(0.0) as u64;
    if t == 0 {
        return "none".to_string();
    }
    if t < 60 {
        return plural(t, "second");
    }
    if t < 3600 {
        let (min, sec) = (t / 60, t % 60);
        return if sec != 0 {
            format!("{} {}", plural(min, "minute"), plural(sec, "second"))
        } else {
            plural(min, "minute")
        };
    }
    let (hr, min) = (t / 3600, (t / 60) % 60);
    if min != 0 {
        format!("{} {}", plural(hr, "hour"), plural(min, "minute"))
    } else {
        plural(hr, "hour")
    }
}

/// 破棄前通知（解放前に呼ぶこと）
///
/// 破棄されたのがプレイヤー機なら現在の目標を失敗させ、
/// 墜落イベントを記録します。
pub fn destroy_notify(ctx: &mut SimContext, id: EntityId) {
    ctx.with_mission(|mission, ctx| mission.destroyed(ctx, id));
}

/// ホイストによる収容の通知
pub fn hoist_in_notify(ctx: &mut SimContext, vehicle: EntityId, count: u32) {
    ctx.with_mission(|mission, ctx| mission.hoisted_in(ctx, vehicle, count));
}

/// 乗客が乗り込んだことの通知
///
/// 収容のみの目標で要救助者数を減らす唯一の経路です。
pub fn passengers_entered_notify(ctx: &mut SimContext, vehicle: EntityId, count: u32) {
    ctx.with_mission(|mission, ctx| mission.passengers_entered(ctx, vehicle, count));
}

/// 着陸の通知
///
/// # 引数
/// * `ground_contacts` - 着陸した支持面のエンティティ
pub fn landed_notify(ctx: &mut SimContext, vehicle: EntityId, ground_contacts: &[EntityId]) {
    ctx.with_mission(|mission, ctx| mission.landed(ctx, vehicle, ground_contacts));
}

/// ミッションの定期処理（ミッションがなければエラー）
pub fn manage(ctx: &mut SimContext) -> Result<MissionStatus, MissionError> {
    ctx.with_mission(|mission, ctx| mission.manage(ctx))
        .unwrap_or(Err(MissionError::NoMission))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        common::Position3D,
        entity::{Aircraft, Entity, EntityKind},
        player::PlayerStats,
    };
    use approx::assert_abs_diff_eq;

    struct Fixture {
        ctx: SimContext,
        player: EntityId,
        other: EntityId,
        helipad: EntityId,
        other_pad: EntityId,
    }

    fn fixture(objectives: Vec<Objective>) -> Fixture {
        let mut ctx = SimContext::new(SimOptions::default());
        let player = ctx.registry.add(Entity::new(
            "Rescue1",
            EntityKind::Aircraft(Aircraft::new(6)),
            Position3D::new(0.0, 0.0, 50.0),
        ));
        let other = ctx.registry.add(Entity::new(
            "Rescue2",
            EntityKind::Aircraft(Aircraft::new(6)),
            Position3D::new(100.0, 0.0, 50.0),
        ));
        let helipad = ctx
            .registry
            .add(Entity::new("Helipad1", EntityKind::Helipad, Position3D::default()));
        let other_pad = ctx
            .registry
            .add(Entity::new("OtherPad", EntityKind::Helipad, Position3D::new(500.0, 0.0, 0.0)));
        ctx.player = Some(player);
        ctx.player_stats = Some(PlayerStats::new("Pilot"));
        ctx.mission = Some(Mission::new("test", objectives));
        Fixture {
            ctx,
            player,
            other,
            helipad,
            other_pad,
        }
    }

    fn mission(ctx: &SimContext) -> &Mission {
        ctx.mission.as_ref().expect("mission")
    }

    fn set_passengers(ctx: &mut SimContext, id: EntityId, n: u32) {
        if let Some(a) = ctx.registry.get_mut(id).and_then(|e| e.aircraft_mut()) {
            a.passengers = n;
        }
    }

    /// dt ミリ秒刻みで total ミリ秒進める
    fn run_for(ctx: &mut SimContext, total_ms: u64, dt_ms: u64) -> Vec<MissionStatus> {
        let mut statuses = Vec::new();
        for _ in 0..total_ms / dt_ms {
            ctx.clock.advance(dt_ms);
            statuses.push(manage(ctx).expect("manage"));
        }
        statuses
    }

    #[test]
    fn test_pick_up_counts_down_to_success() {
        let mut f = fixture(vec![Objective::pick_up(3, 0.0)]);

        passengers_entered_notify(&mut f.ctx, f.player, 2);
        let m = mission(&f.ctx);
        assert_eq!(m.current_objective().map(|o| o.humans_need_rescue), Some(1));
        assert_eq!(m.state(), MissionState::InProgress);

        passengers_entered_notify(&mut f.ctx, f.player, 1);
        let m = mission(&f.ctx);
        assert_eq!(m.objectives()[0].state, ObjectiveState::Success);
        assert_eq!(m.state(), MissionState::Accomplished);
    }

    #[test]
    fn test_hoist_in_succeeds_only_after_need_is_met() {
        let mut f = fixture(vec![Objective::pick_up(1, 0.0), Objective::arrive_at("Helipad1", 0.0)]);

        hoist_in_notify(&mut f.ctx, f.player, 1);
        assert_eq!(mission(&f.ctx).cursor(), 0);
        assert_eq!(f.ctx.player_stats.as_ref().map(|s| s.score), Some(50));

        passengers_entered_notify(&mut f.ctx, f.player, 1);
        assert_eq!(mission(&f.ctx).cursor(), 1);
        assert_eq!(f.ctx.messages.events_of(LogEventKind::Pickup).count(), 1);
        assert_eq!(
            f.ctx.messages.events_of(LogEventKind::Pickup).next().map(|e| e.text.as_str()),
            Some("Pilot picked up 1 passenger")
        );
    }

    #[test]
    fn test_arrive_at_requires_matching_pad() {
        let mut f = fixture(vec![Objective::arrive_at("Helipad1", 60.0)]);

        landed_notify(&mut f.ctx, f.player, &[f.other_pad]);
        assert_eq!(mission(&f.ctx).objectives()[0].state, ObjectiveState::Incomplete);

        // プレイヤー以外の着陸では達成しない
        landed_notify(&mut f.ctx, f.other, &[f.helipad]);
        assert_eq!(mission(&f.ctx).objectives()[0].state, ObjectiveState::Incomplete);

        landed_notify(&mut f.ctx, f.player, &[f.other_pad, f.helipad]);
        assert_eq!(mission(&f.ctx).objectives()[0].state, ObjectiveState::Success);
        assert_eq!(mission(&f.ctx).state(), MissionState::Accomplished);
    }

    #[test]
    fn test_arrive_at_unloads_and_scores_dropoff() {
        let mut f = fixture(vec![Objective::arrive_at("helipad1", 0.0)]);
        set_passengers(&mut f.ctx, f.player, 2);

        landed_notify(&mut f.ctx, f.player, &[f.helipad]);
        let stats = f.ctx.player_stats.clone().unwrap_or_default();
        assert_eq!(stats.rescues, 2);
        assert_eq!(stats.score, 100);
        assert_eq!(f.ctx.registry.get(f.player).map(|e| e.passengers()), Some(0));
        let dropoff = f.ctx.messages.events_of(LogEventKind::Dropoff).next().map(|e| e.text.clone());
        assert_eq!(dropoff.as_deref(), Some("Pilot dropped off 2 passengers"));
    }

    #[test]
    fn test_pick_up_arrive_at_accepts_any_vehicle() {
        let mut f = fixture(vec![Objective::pick_up_arrive_at("Helipad1", 3, 0.0)]);
        set_passengers(&mut f.ctx, f.other, 2);

        landed_notify(&mut f.ctx, f.other, &[f.helipad]);
        let m = mission(&f.ctx);
        assert_eq!(m.current_objective().map(|o| o.humans_need_rescue), Some(1));
        // プレイヤー以外は加点しない
        assert_eq!(f.ctx.player_stats.as_ref().map(|s| s.score), Some(0));

        set_passengers(&mut f.ctx, f.player, 1);
        landed_notify(&mut f.ctx, f.player, &[f.helipad]);
        assert_eq!(mission(&f.ctx).state(), MissionState::Accomplished);
    }

    #[test]
    fn test_landing_has_no_effect_on_pick_up() {
        let mut f = fixture(vec![Objective::pick_up(1, 0.0)]);
        set_passengers(&mut f.ctx, f.player, 1);
        landed_notify(&mut f.ctx, f.player, &[f.helipad]);
        assert_eq!(f.ctx.registry.get(f.player).map(|e| e.passengers()), Some(1));
        assert_eq!(mission(&f.ctx).state(), MissionState::InProgress);
    }

    #[test]
    fn test_timeout_fails_arrive_at() {
        let mut f = fixture(vec![Objective::arrive_at("Helipad1", 5.0)]);

        let statuses = run_for(&mut f.ctx, 4000, 100);
        assert!(statuses.iter().all(|s| *s == MissionStatus::Continue));
        assert_eq!(mission(&f.ctx).state(), MissionState::InProgress);

        run_for(&mut f.ctx, 2000, 100);
        let m = mission(&f.ctx);
        assert_eq!(m.objectives()[0].state, ObjectiveState::Failed);
        assert_eq!(m.state(), MissionState::Failed);

        // 終了判定は一定時間後に報告される
        let statuses = run_for(&mut f.ctx, 6000, 100);
        assert!(statuses.contains(&MissionStatus::Failed));
        assert!(!statuses.contains(&MissionStatus::Accomplished));
    }

    #[test]
    fn test_time_compression_speeds_up_timer() {
        let mut f = fixture(vec![Objective::arrive_at("Helipad1", 10.0)]);
        f.ctx.options.time_compression = 4.0;
        run_for(&mut f.ctx, 2000, 100);
        assert_eq!(mission(&f.ctx).state(), MissionState::InProgress);
        run_for(&mut f.ctx, 2000, 100);
        assert_eq!(mission(&f.ctx).state(), MissionState::Failed);
        assert_abs_diff_eq!(mission(&f.ctx).time_spent, 16.0, epsilon = 1e-6);
    }

    #[test]
    fn test_pick_up_timeout_grace_when_carrying_remaining() {
        let mut f = fixture(vec![Objective::pick_up(2, 2.0)]);
        set_passengers(&mut f.ctx, f.player, 2);
        run_for(&mut f.ctx, 4000, 100);
        assert_eq!(mission(&f.ctx).state(), MissionState::InProgress);

        let mut f = fixture(vec![Objective::pick_up(2, 2.0)]);
        set_passengers(&mut f.ctx, f.player, 1);
        run_for(&mut f.ctx, 4000, 100);
        assert_eq!(mission(&f.ctx).state(), MissionState::Failed);
    }

    #[test]
    fn test_player_destruction_fails_mission() {
        let mut f = fixture(vec![Objective::arrive_at("Helipad1", 0.0), Objective::pick_up(1, 0.0)]);

        assert!(f.ctx.destroy_entity(f.other));
        assert_eq!(mission(&f.ctx).state(), MissionState::InProgress);

        assert!(f.ctx.destroy_entity(f.player));
        let m = mission(&f.ctx);
        assert_eq!(m.state(), MissionState::Failed);
        assert_eq!(m.cursor(), 2);
        assert_eq!(m.objectives()[1].state, ObjectiveState::Incomplete);
        assert_eq!(f.ctx.player_stats.as_ref().map(|s| s.crashes), Some(1));

        let crashes: Vec<&str> = f
            .ctx
            .messages
            .events_of(LogEventKind::Crash)
            .map(|e| e.text.as_str())
            .collect();
        assert_eq!(crashes, vec!["Rescue2 crashed", "Pilot crashed"]);
        assert!(!f.ctx.registry.is_valid(f.player));
    }

    #[test]
    fn test_cursor_is_monotonic_and_terminal_states_stick() {
        let mut f = fixture(vec![
            Objective::arrive_at("Helipad1", 0.0),
            Objective::arrive_at("OtherPad", 0.0),
            Objective::pick_up(1, 0.0),
        ]);
        let mut m = f.ctx.mission.take().expect("mission");

        let mut last = m.cursor();
        assert!(!m.advance_on_success(&mut f.ctx));
        assert!(m.cursor() > last);
        last = m.cursor();

        assert!(m.advance_on_failure(&mut f.ctx));
        assert!(m.cursor() >= last);
        assert_eq!(m.cursor(), 3);
        assert_eq!(m.state(), MissionState::Failed);

        assert!(!m.advance_on_success(&mut f.ctx));
        assert!(!m.advance_on_failure(&mut f.ctx));
        assert_eq!(m.cursor(), 3);
        assert_eq!(m.state(), MissionState::Failed);
    }

    #[test]
    fn test_next_objective_gets_fresh_timer() {
        let mut f = fixture(vec![Objective::arrive_at("Helipad1", 30.0), Objective::pick_up(1, 20.0)]);
        run_for(&mut f.ctx, 10_000, 500);
        landed_notify(&mut f.ctx, f.player, &[f.helipad]);

        let m = mission(&f.ctx);
        assert_eq!(m.cursor(), 1);
        assert_abs_diff_eq!(m.current_objective().map(|o| o.time_left).unwrap_or(0.0), 20.0);
    }

    #[test]
    fn test_manage_errors() {
        let mut ctx = SimContext::new(SimOptions::default());
        assert_eq!(manage(&mut ctx), Err(MissionError::NoMission));

        ctx.mission = Some(Mission::new("empty", Vec::new()));
        assert_eq!(
            manage(&mut ctx),
            Err(MissionError::UnsupportedState(MissionState::InProgress))
        );
    }

    #[test]
    fn test_position_events_are_periodic() {
        let mut f = fixture(vec![Objective::arrive_at("Helipad1", 0.0)]);
        run_for(&mut f.ctx, 25_000, 1000);
        // 1s, 11s, 21s
        assert_eq!(f.ctx.messages.events_of(LogEventKind::Position).count(), 3);
    }

    #[test]
    fn test_status_lines() {
        let mut f = fixture(vec![Objective::pick_up_arrive_at("Helipad1", 2, 125.0)]);
        set_passengers(&mut f.ctx, f.player, 1);
        let lines = mission(&f.ctx).status_lines(&f.ctx);
        assert_eq!(
            lines,
            vec![
                "Passengers: 1(6)".to_string(),
                "Rescue in progress, 2 more to find...".to_string(),
                "Time left 2 minutes 5 seconds to get all to safety!".to_string(),
            ]
        );

        f.ctx.destroy_entity(f.player);
        let lines = mission(&f.ctx).status_lines(&f.ctx);
        assert_eq!(lines, vec!["Passengers: 0(0)".to_string(), MESSAGE_FAILED.to_string()]);
    }

    #[test]
    fn test_format_delta_time() {
        assert_eq!(format_delta_time(0.0), "none");
        assert_eq!(format_delta_time(1.0), "1 second");
        assert_eq!(format_delta_time(60.0), "1 minute");
        assert_eq!(format_delta_time(3720.0), "1 hour 2 minutes");
    }
}
