//! # Simulation モジュール
//!
//! 救助シミュレーションのヘッドレス実行ループを提供します。
//!
//! 外部の運動積分器の代わりに、各エンティティをシナリオで与えた一定速度で
//! 動かし、時刻指定のスクリプトでホイスト操作や着陸を行います。
//!
//! ## シミュレーション処理順序
//!
//! 各時間刻みにおいて、以下の順序で処理が実行されます：
//!
//! 1. **スクリプト処理**: ホイストの上げ下げ、速度変更、着陸／離陸
//! 2. **移動処理**: 一定速度での移動、地面への接地
//! 3. **衝突処理**: 衝突しうる全エンティティの接触判定と破棄
//! 4. **ホイスト処理**: バスケット位置更新と要救助者の収容判定
//! 5. **ミッション処理**: 制限時間と終了判定
//!
//! ## 使用例
//!
//! ```no_run
//! use rescuesim::scenario::ScenarioConfig;
//! use rescuesim::simulation::SimulationEngine;
//!
//! let scenario = ScenarioConfig::from_file("scenarios/lake_rescue.yaml")?;
//! let mut engine = SimulationEngine::from_scenario(&scenario, 1)?;
//! let report = engine.run()?;
//! println!("{:?}", report.status);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use tracing::{debug, info, trace};

use crate::context::SimContext;
use crate::models::{
    common::Velocity3D,
    contact,
    entity::{EntityId, Target},
    events::LogEventKind,
    hoist,
    mission::{self, MissionError, MissionStatus},
    traits::{ICollisionListener, IMessageSink},
};
use crate::scenario::{ScenarioConfig, ScenarioError, ScriptAction, ScriptCommandConfig};

/// 解決済みのスクリプトコマンド
#[derive(Debug, Clone)]
pub struct ScheduledCommand {
    pub at_s: f64,
    pub duration_s: f64,
    pub target: Target,
    pub action: ScriptAction,
    pub velocity: Option<Velocity3D>,
    done: bool,
}

impl ScheduledCommand {
    pub fn new(at_s: f64, target: Target, action: ScriptAction) -> Self {
        Self {
            at_s,
            duration_s: 0.0,
            target,
            action,
            velocity: None,
            done: false,
        }
    }

    fn resolve(config: &ScriptCommandConfig, ctx: &SimContext) -> Result<Self, ScenarioError> {
        let target = if config.entity.eq_ignore_ascii_case("player") {
            Target::Player
        } else {
            let id = ctx
                .registry
                .find_by_name(&config.entity)
                .ok_or_else(|| ScenarioError::UnknownEntity(config.entity.clone()))?;
            Target::Entity(id)
        };
        Ok(Self {
            at_s: config.at_s,
            duration_s: config.duration_s,
            target,
            action: config.action,
            velocity: config.velocity.map(Into::into),
            done: false,
        })
    }

    /// ホイスト操作は [at_s, at_s + duration_s) の間毎ティック実行する
    fn is_continuous(&self) -> bool {
        matches!(self.action, ScriptAction::LowerHoist | ScriptAction::RaiseHoist)
    }
}

/// 衝突を記録し、ティックの最後にまとめて処理するためのリスナー
#[derive(Debug, Default)]
struct CrashCollector {
    crashed: Vec<(EntityId, EntityId)>,
}

impl ICollisionListener for CrashCollector {
    fn on_collision(&mut self, source: EntityId, obstruction: EntityId, impact_coeff: f64) {
        trace!(source = ?source, obstruction = ?obstruction, impact_coeff, "COLLISION_NOTIFY");
        self.crashed.push((source, obstruction));
    }
}

/// 実行結果
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub elapsed_s: f64,
    pub steps: u64,
    /// ミッションがなければ `None`
    pub status: Option<MissionStatus>,
    pub score: i64,
    pub rescues: u32,
    pub crashes: u32,
}

pub struct SimulationEngine {
    pub ctx: SimContext,
    pub current_time: f64,
    pub dt: f64,
    pub max_time: f64,
    pub step_count: u64,
    pub commands: Vec<ScheduledCommand>,
    pub status: Option<MissionStatus>,
    pub verbose_level: u8,
}

impl SimulationEngine {
    pub fn new(ctx: SimContext, dt: f64, max_time: f64, verbose_level: u8) -> Self {
        Self {
            ctx,
            current_time: 0.0,
            dt,
            max_time,
            step_count: 0,
            commands: Vec::new(),
            status: None,
            verbose_level,
        }
    }

    /// シナリオからエンジンを構築
    pub fn from_scenario(scenario: &ScenarioConfig, verbose_level: u8) -> Result<Self, ScenarioError> {
        let ctx = scenario.build_context()?;
        let commands = scenario
            .script
            .iter()
            .map(|c| ScheduledCommand::resolve(c, &ctx))
            .collect::<Result<Vec<_>, _>>()?;

        let mut engine = Self::new(ctx, scenario.sim.dt_s, scenario.sim.t_max_s, verbose_level);
        engine.commands = commands;

        if verbose_level > 0 {
            info!(
                entities = engine.ctx.registry.count(),
                commands = engine.commands.len(),
                mission = engine.ctx.mission.is_some(),
                "SIM_INIT: シミュレーションエンジンを初期化"
            );
        }
        Ok(engine)
    }

    pub fn run(&mut self) -> Result<SimulationReport, MissionError> {
        info!("=== シミュレーション実行開始 ===");

        while self.current_time < self.max_time {
            let status = self.step()?;

            if self.verbose_level > 2 {
                trace!("時刻: {:.1}秒 (ステップ: {})", self.current_time, self.step_count);
            }

            if self.step_count % 100 == 0 && self.verbose_level > 0 {
                let progress = (self.current_time / self.max_time) * 100.0;
                info!("進行状況: {:.1}% ({:.1}/{:.1}秒)", progress, self.current_time, self.max_time);
            }

            if matches!(status, Some(MissionStatus::Accomplished | MissionStatus::Failed)) {
                break;
            }
        }

        let report = self.report();
        info!("=== シミュレーション完了 ===");
        info!(
            elapsed_s = report.elapsed_s,
            steps = report.steps,
            status = ?report.status,
            score = report.score,
            rescues = report.rescues,
            crashes = report.crashes,
            "SIM_DONE: 実行終了"
        );
        Ok(report)
    }

    pub fn report(&self) -> SimulationReport {
        let stats = self.ctx.player_stats.clone().unwrap_or_default();
        SimulationReport {
            elapsed_s: self.current_time,
            steps: self.step_count,
            status: self.status,
            score: stats.score,
            rescues: stats.rescues,
            crashes: stats.crashes,
        }
    }

    /// 1ティック進める
    ///
    /// # 戻り値
    /// ミッションの判定結果（ミッションがなければ `None`）
    pub fn step(&mut self) -> Result<Option<MissionStatus>, MissionError> {
        let dt_ms = (self.dt * 1000.0).round() as u64;
        self.ctx.clock.advance(dt_ms);

        self.process_script();
        self.process_movement();
        self.process_crashes();
        self.process_hoists();
        let status = self.process_mission()?;

        self.current_time += self.dt;
        self.step_count += 1;
        Ok(status)
    }

    fn process_script(&mut self) {
        let now = self.current_time;
        let dt = self.dt;
        let player = self.ctx.player;

        for command in &mut self.commands {
            if command.done || now + 1e-9 < command.at_s {
                continue;
            }
            if command.is_continuous() {
                if now + 1e-9 >= command.at_s + command.duration_s.max(dt) {
                    command.done = true;
                    continue;
                }
            } else {
                command.done = true;
            }
            let Some(id) = command.target.resolve(player) else {
                continue;
            };
            if !self.ctx.registry.is_valid(id) {
                continue;
            }

            match command.action {
                ScriptAction::LowerHoist => {
                    hoist::lower_hoist(&mut self.ctx, id, 1.0, dt);
                }
                ScriptAction::RaiseHoist => {
                    hoist::raise_hoist(&mut self.ctx, id, 1.0, dt);
                }
                ScriptAction::SetVelocity => {
                    if let Some(entity) = self.ctx.registry.get_mut(id) {
                        entity.velocity = command.velocity.unwrap_or_default();
                        debug!(entity = %entity.name, velocity = ?entity.velocity, "SET_VELOCITY");
                    }
                    if let Some(aircraft) = self.ctx.registry.get_mut(id).and_then(|e| e.aircraft_mut()) {
                        aircraft.landed = false;
                    }
                }
                ScriptAction::Land => land(&mut self.ctx, id),
                ScriptAction::Takeoff => takeoff(&mut self.ctx, id),
            }
        }
    }

    fn process_movement(&mut self) {
        let dt = self.dt * self.ctx.time_compression();
        for id in self.ctx.registry.ids() {
            let Some(entity) = self.ctx.registry.get_mut(id) else {
                continue;
            };
            if entity.aircraft().is_some_and(|a| a.landed) {
                continue;
            }
            if entity.velocity.magnitude() <= 0.0 {
                continue;
            }
            entity.position = entity.position + entity.velocity.displacement(dt);
            let position = entity.position;
            let descending = entity.velocity.z < 0.0;
            let is_aircraft = entity.aircraft().is_some();

            let ground_z = contact::find_ground(
                &self.ctx.registry,
                &position,
                Some(id),
                self.ctx.options.ground_elevation_m,
                self.ctx.options.surface_contact_z_tolerance_m,
            );
            if position.z <= ground_z && descending {
                if is_aircraft {
                    land(&mut self.ctx, id);
                } else if let Some(entity) = self.ctx.registry.get_mut(id) {
                    entity.position.z = ground_z;
                    entity.velocity.z = 0.0;
                }
            }
        }
    }

    fn process_crashes(&mut self) {
        let mut collector = CrashCollector::default();
        for id in self.ctx.registry.ids() {
            // 破棄済みや墜落済みは判定しない
            let crashed = self
                .ctx
                .registry
                .get(id)
                .is_none_or(|e| e.aircraft().is_some_and(|a| a.crashed));
            if crashed {
                continue;
            }
            contact::find_crash_contact(&self.ctx.registry, id, &mut collector);
        }

        for (source, obstruction) in collector.crashed {
            if !self.ctx.registry.is_valid(source) {
                continue;
            }
            if let Some(aircraft) = self.ctx.registry.get_mut(source).and_then(|e| e.aircraft_mut()) {
                aircraft.crashed = true;
            }
            info!(
                source = %self.ctx.display_name(source),
                obstruction = self.ctx.registry.name_of(obstruction).unwrap_or_default(),
                "CRASH: 衝突により破壊"
            );
            self.ctx.destroy_entity(source);
        }
    }

    fn process_hoists(&mut self) {
        for id in self.ctx.registry.ids() {
            let deployed = self
                .ctx
                .registry
                .get(id)
                .and_then(|e| e.hoist())
                .is_some_and(|h| h.rope_cur > 0.0);
            if !deployed {
                continue;
            }
            hoist::update_hoist(&mut self.ctx, id);
            if let Some(human) = contact::find_hoist_pickup(&mut self.ctx, id) {
                debug!(vehicle = ?id, human = ?human, "HOIST_PICKUP_DONE");
            }
        }
    }

    fn process_mission(&mut self) -> Result<Option<MissionStatus>, MissionError> {
        if self.ctx.mission.is_none() {
            return Ok(None);
        }
        let status = mission::manage(&mut self.ctx)?;
        self.status = Some(status);
        Ok(Some(status))
    }
}

/// 着陸処理
///
/// 真下の地面に降ろし、接地している支持面をミッションに通知します。
pub fn land(ctx: &mut SimContext, vehicle: EntityId) {
    let Some(entity) = ctx.registry.get(vehicle) else {
        return;
    };
    if entity.aircraft().is_none_or(|a| a.landed) {
        return;
    }
    let ground_z = contact::find_ground(
        &ctx.registry,
        &entity.position,
        Some(vehicle),
        ctx.options.ground_elevation_m,
        ctx.options.surface_contact_z_tolerance_m,
    );

    let Some(entity) = ctx.registry.get_mut(vehicle) else {
        return;
    };
    entity.position.z = ground_z;
    entity.velocity = Default::default();
    let position = entity.position;
    if let Some(aircraft) = entity.aircraft_mut() {
        aircraft.landed = true;
    }

    let text = format!("{} landed", ctx.display_name(vehicle));
    ctx.messages.append_log_event(LogEventKind::Land, position, &text);

    let contacts = contact::find_ground_contacts(
        &ctx.registry,
        &position,
        Some(vehicle),
        ctx.options.surface_contact_z_tolerance_m,
    );
    info!(
        vehicle = %ctx.display_name(vehicle),
        ground = ?contacts.iter().filter_map(|id| ctx.registry.name_of(*id)).collect::<Vec<_>>(),
        "LANDED: 着陸"
    );
    mission::landed_notify(ctx, vehicle, &contacts);
}

/// 離陸処理
pub fn takeoff(ctx: &mut SimContext, vehicle: EntityId) {
    let Some(entity) = ctx.registry.get_mut(vehicle) else {
        return;
    };
    let position = entity.position;
    let Some(aircraft) = entity.aircraft_mut() else {
        return;
    };
    if !aircraft.landed {
        return;
    }
    aircraft.landed = false;

    let text = format!("{} took off", ctx.display_name(vehicle));
    ctx.messages.append_log_event(LogEventKind::Takeoff, position, &text);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimOptions;
    use crate::models::{
        common::Position3D,
        contact::{ContactBounds, CrashFlags, RectBounds},
        entity::{Aircraft, Entity, EntityKind},
        mission::{Mission, MissionState, Objective},
        player::PlayerStats,
    };
    use approx::assert_abs_diff_eq;

    fn engine_with(objectives: Vec<Objective>) -> (SimulationEngine, EntityId) {
        let mut ctx = SimContext::new(SimOptions::default());
        let mut aircraft = Aircraft::new(4);
        aircraft.landed = false;
        let heli = ctx.registry.add(
            Entity::new("Rescue1", EntityKind::Aircraft(aircraft), Position3D::new(0.0, 0.0, 20.0))
                .with_contact(ContactBounds::cylindrical(5.0, -1.0, 2.0, CrashFlags::CRASH_OTHER)),
        );
        ctx.registry.add(
            Entity::new("Helipad1", EntityKind::Helipad, Position3D::new(100.0, 0.0, 0.0)).with_contact(
                ContactBounds::rectangular(
                    RectBounds::new((-10.0, 10.0), (-10.0, 10.0), (-1.0, 0.0)),
                    CrashFlags::SUPPORT_SURFACE,
                ),
            ),
        );
        ctx.player = Some(heli);
        ctx.player_stats = Some(PlayerStats::new("Pilot"));
        ctx.mission = Some(Mission::new("m", objectives));
        (SimulationEngine::new(ctx, 0.1, 60.0, 0), heli)
    }

    #[test]
    fn test_demo_scenario_accomplishes_mission() {
        let scenario = ScenarioConfig::demo().expect("demo");
        let mut engine = SimulationEngine::from_scenario(&scenario, 0).expect("engine");
        let report = engine.run().expect("run");

        assert_eq!(report.status, Some(MissionStatus::Accomplished));
        assert_eq!(report.rescues, 2);
        assert_eq!(report.crashes, 0);
        assert!(report.elapsed_s < scenario.sim.t_max_s);
        // 収容時 50 × 2 + 搬送時 50 × 2
        assert_eq!(report.score, 200);
        assert_eq!(engine.ctx.messages.events_of(LogEventKind::Pickup).count(), 2);
        assert_eq!(engine.ctx.messages.events_of(LogEventKind::Dropoff).count(), 1);
        assert!(engine.ctx.messages.messages.iter().any(|m| m == "Thank you!"));
    }

    #[test]
    fn test_descending_aircraft_lands_on_pad() {
        let (mut engine, heli) = engine_with(vec![Objective::arrive_at("Helipad1", 0.0)]);
        if let Some(entity) = engine.ctx.registry.get_mut(heli) {
            entity.position = Position3D::new(100.0, 0.0, 2.0);
            entity.velocity = Velocity3D::new(0.0, 0.0, -5.0);
        }
        engine.run().expect("run");

        let entity = engine.ctx.registry.get(heli).expect("heli");
        assert!(entity.aircraft().is_some_and(|a| a.landed));
        assert_abs_diff_eq!(entity.position.z, 0.0);
        assert_eq!(engine.status, Some(MissionStatus::Accomplished));
        assert_eq!(engine.ctx.messages.events_of(LogEventKind::Land).count(), 1);
    }

    #[test]
    fn test_scripted_landing_unloads_at_pad() {
        let (mut engine, heli) = engine_with(vec![Objective::pick_up_arrive_at("Helipad1", 2, 0.0)]);
        if let Some(entity) = engine.ctx.registry.get_mut(heli) {
            entity.position = Position3D::new(95.0, 3.0, 10.0);
        }
        if let Some(a) = engine.ctx.registry.get_mut(heli).and_then(|e| e.aircraft_mut()) {
            a.passengers = 2;
        }
        engine.commands = vec![ScheduledCommand::new(1.0, Target::Player, ScriptAction::Land)];
        let report = engine.run().expect("run");

        assert_eq!(report.status, Some(MissionStatus::Accomplished));
        assert_eq!(report.rescues, 2);
        assert_eq!(engine.ctx.registry.get(heli).map(|e| e.passengers()), Some(0));
        assert!(report.elapsed_s > 1.0);
    }

    #[test]
    fn test_crash_destroys_player_and_fails_mission() {
        let (mut engine, heli) = engine_with(vec![Objective::arrive_at("Helipad1", 0.0)]);
        engine.ctx.registry.add(
            Entity::new("Tower", EntityKind::Building, Position3D::new(30.0, 0.0, 0.0))
                .with_contact(ContactBounds::cylindrical(3.0, 0.0, 40.0, CrashFlags::CRASH_CAUSE)),
        );
        if let Some(entity) = engine.ctx.registry.get_mut(heli) {
            entity.velocity = Velocity3D::new(10.0, 0.0, 0.0);
        }
        let report = engine.run().expect("run");

        assert!(!engine.ctx.registry.is_valid(heli));
        assert_eq!(engine.ctx.player, None);
        assert_eq!(report.status, Some(MissionStatus::Failed));
        assert_eq!(report.crashes, 1);
        let mission = engine.ctx.mission.as_ref().expect("mission");
        assert_eq!(mission.state(), MissionState::Failed);
    }

    #[test]
    fn test_timeout_stops_run_early() {
        let (mut engine, _) = engine_with(vec![Objective::arrive_at("Helipad1", 5.0)]);
        let report = engine.run().expect("run");
        assert_eq!(report.status, Some(MissionStatus::Failed));
        assert!(report.elapsed_s < 15.0);
    }

    #[test]
    fn test_empty_mission_reports_error() {
        let (mut engine, _) = engine_with(Vec::new());
        assert_eq!(
            engine.run(),
            Err(MissionError::UnsupportedState(MissionState::InProgress))
        );
    }

    #[test]
    fn test_takeoff_logs_event() {
        let (mut engine, heli) = engine_with(Vec::new());
        if let Some(a) = engine.ctx.registry.get_mut(heli).and_then(|e| e.aircraft_mut()) {
            a.landed = true;
        }
        takeoff(&mut engine.ctx, heli);
        takeoff(&mut engine.ctx, heli);
        assert_eq!(engine.ctx.messages.events_of(LogEventKind::Takeoff).count(), 1);
    }
}
