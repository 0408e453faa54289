use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::context::{SimContext, SimOptions};
use crate::models::{
    common::{Position3D, Velocity3D, math_utils},
    contact::{ContactBounds, CrashFlags, RectBounds},
    entity::{Aircraft, Entity, EntityKind, Human, RescueDoor},
    hoist::{Hoist, HoistDeployment},
    mission::{Mission, Objective, ObjectiveKind},
    player::PlayerStats,
};

/// 組み込みのデモシナリオ
pub const DEMO_SCENARIO_YAML: &str = r#"
meta:
  version: "1.0"
  name: "demo_lake_rescue"
  description: "湖上の要救助者2名をホイストで収容し、ヘリパッドへ搬送する"
sim:
  dt_s: 0.1
  t_max_s: 120.0
options:
  hoist_contact_expansion_coeff: 1.5
player:
  entity: "Rescue1"
  pilot: "Pilot"
entities:
  - name: "Rescue1"
    kind: aircraft
    position: { x_m: 0.0, y_m: 0.0, z_m: 15.0 }
    heading_deg: 90.0
    contact:
      shape: { type: cylindrical, radius_m: 6.0, z_min_m: -1.0, z_max_m: 3.0 }
      crash_other: true
    aircraft:
      passengers_max: 4
      landed: false
      rescue_door: { stay_open: false }
      hoist:
        offset: { x_m: 1.5, y_m: 0.0, z_m: -0.5 }
        rope_max_m: 30.0
        rope_rate_mps: 5.0
  - name: "Victim1"
    kind: human
    position: { x_m: 1.0, y_m: 0.5, z_m: 0.0 }
    contact:
      shape: { type: cylindrical, radius_m: 0.4, z_min_m: 0.0, z_max_m: 1.7 }
    human: { mass_kg: 70.0, needs_rescue: true, enter_message: "Thank you!" }
  - name: "Victim2"
    kind: human
    position: { x_m: 1.0, y_m: -0.5, z_m: 0.0 }
    contact:
      shape: { type: cylindrical, radius_m: 0.4, z_min_m: 0.0, z_max_m: 1.7 }
    human: { mass_kg: 80.0, needs_rescue: true }
  - name: "Helipad1"
    kind: helipad
    position: { x_m: 200.0, y_m: 0.0, z_m: 0.0 }
    contact:
      shape: { type: rectangular, x_min_m: -15.0, x_max_m: 15.0, y_min_m: -15.0, y_max_m: 15.0, z_min_m: -1.0, z_max_m: 0.0 }
      support_surface: true
mission:
  title: "Lake Rescue"
  description: "Pick up both swimmers and fly them to Helipad1"
  objectives:
    - type: pick_up
      humans_needed: 2
      time_limit_s: 60.0
      message_success: "Both swimmers aboard"
    - type: arrive_at
      target: "Helipad1"
      time_limit_s: 90.0
      message_success: "Swimmers delivered"
      message_fail: "Too late"
script:
  - { at_s: 0.5, action: lower_hoist, duration_s: 4.0 }
  - { at_s: 6.0, action: raise_hoist, duration_s: 5.0 }
  - { at_s: 12.0, action: lower_hoist, duration_s: 4.0 }
  - { at_s: 17.0, action: raise_hoist, duration_s: 5.0 }
  - { at_s: 23.0, action: set_velocity, velocity: { x_mps: 20.0, y_mps: 0.0, z_mps: 0.0 } }
  - { at_s: 33.0, action: land }
"#;

/// シナリオメタデータ
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioMeta {
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// シミュレーション設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    pub dt_s: f64,
    pub t_max_s: f64,
}

/// プレイヤー設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayerConfig {
    /// プレイヤーが操縦する機体のエンティティ名
    pub entity: String,
    /// パイロット名（ログに使用）
    pub pilot: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct Position3DConfig {
    #[serde(default)]
    pub x_m: f64,
    #[serde(default)]
    pub y_m: f64,
    #[serde(default)]
    pub z_m: f64,
}

impl From<Position3DConfig> for Position3D {
    fn from(p: Position3DConfig) -> Self {
        Position3D::new(p.x_m, p.y_m, p.z_m)
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct VelocityConfig {
    #[serde(default)]
    pub x_mps: f64,
    #[serde(default)]
    pub y_mps: f64,
    #[serde(default)]
    pub z_mps: f64,
}

impl From<VelocityConfig> for Velocity3D {
    fn from(v: VelocityConfig) -> Self {
        Velocity3D::new(v.x_mps, v.y_mps, v.z_mps)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKindConfig {
    Aircraft,
    Human,
    Helipad,
    Runway,
    Building,
    Ground,
    Static,
}

/// 接触範囲の形状設定
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContactShapeConfig {
    Spherical {
        radius_m: f64,
    },
    Cylindrical {
        radius_m: f64,
        z_min_m: f64,
        z_max_m: f64,
    },
    Rectangular {
        x_min_m: f64,
        x_max_m: f64,
        y_min_m: f64,
        y_max_m: f64,
        z_min_m: f64,
        z_max_m: f64,
    },
}

/// 接触範囲設定
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct ContactConfig {
    pub shape: ContactShapeConfig,
    #[serde(default)]
    pub crash_other: bool,
    #[serde(default)]
    pub crash_cause: bool,
    #[serde(default)]
    pub support_surface: bool,
}

impl ContactConfig {
    fn flags(&self) -> CrashFlags {
        let mut flags = CrashFlags::empty();
        flags.set(CrashFlags::CRASH_OTHER, self.crash_other);
        flags.set(CrashFlags::CRASH_CAUSE, self.crash_cause);
        flags.set(CrashFlags::SUPPORT_SURFACE, self.support_surface);
        flags
    }

    fn to_bounds(&self) -> ContactBounds {
        let flags = self.flags();
        match self.shape {
            ContactShapeConfig::Spherical { radius_m } => ContactBounds::spherical(radius_m, flags),
            ContactShapeConfig::Cylindrical {
                radius_m,
                z_min_m,
                z_max_m,
            } => ContactBounds::cylindrical(radius_m, z_min_m, z_max_m, flags),
            ContactShapeConfig::Rectangular {
                x_min_m,
                x_max_m,
                y_min_m,
                y_max_m,
                z_min_m,
                z_max_m,
            } => ContactBounds::rectangular(
                RectBounds::new((x_min_m, x_max_m), (y_min_m, y_max_m), (z_min_m, z_max_m)),
                flags,
            ),
        }
    }

    fn validate(&self, entity: &str) -> Result<(), ScenarioError> {
        let malformed = match self.shape {
            ContactShapeConfig::Spherical { radius_m } => radius_m < 0.0,
            ContactShapeConfig::Cylindrical {
                radius_m,
                z_min_m,
                z_max_m,
            } => radius_m < 0.0 || z_min_m > z_max_m,
            ContactShapeConfig::Rectangular {
                x_min_m,
                x_max_m,
                y_min_m,
                y_max_m,
                z_min_m,
                z_max_m,
            } => x_min_m > x_max_m || y_min_m > y_max_m || z_min_m > z_max_m,
        };
        if malformed {
            return Err(ScenarioError::Validation(format!(
                "Entity {} has a malformed contact volume",
                entity
            )));
        }
        Ok(())
    }
}

/// ホイスト設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HoistConfig {
    pub offset: Position3DConfig,
    pub rope_max_m: f64,
    pub rope_rate_mps: f64,
    pub deployment: HoistDeployment,
    pub contact_radius_m: f64,
    pub contact_z_min_m: f64,
    pub contact_z_max_m: f64,
    /// 積載上限（kg、0 は無制限）
    pub capacity_kg: f64,
    pub max_occupants: usize,
}

impl Default for HoistConfig {
    fn default() -> Self {
        let hoist = Hoist::default();
        Self {
            offset: Position3DConfig::default(),
            rope_max_m: hoist.rope_max,
            rope_rate_mps: hoist.rope_rate,
            deployment: hoist.deployment,
            contact_radius_m: hoist.contact_radius,
            contact_z_min_m: hoist.contact_z_min,
            contact_z_max_m: hoist.contact_z_max,
            capacity_kg: hoist.capacity,
            max_occupants: hoist.max_occupants,
        }
    }
}

impl HoistConfig {
    /// バスケット高さとロープ長の整合チェック
    fn validate(&self, entity: &str) -> Result<(), ScenarioError> {
        let reason = if self.contact_z_max_m <= 0.0 {
            "contact_z_max_m must be positive"
        } else if self.rope_max_m < self.contact_z_max_m {
            "rope_max_m must not be shorter than contact_z_max_m"
        } else if self.rope_rate_mps < 0.0 {
            "rope_rate_mps must not be negative"
        } else {
            return Ok(());
        };
        Err(ScenarioError::Validation(format!(
            "Hoist of {}: {}",
            entity, reason
        )))
    }

    fn to_hoist(&self) -> Hoist {
        Hoist {
            deployment: self.deployment,
            contact_radius: self.contact_radius_m,
            contact_z_min: self.contact_z_min_m,
            contact_z_max: self.contact_z_max_m,
            capacity: self.capacity_kg,
            max_occupants: self.max_occupants,
            ..Hoist::new(self.offset.into(), self.rope_max_m, self.rope_rate_mps)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct RescueDoorConfig {
    #[serde(default)]
    pub stay_open: bool,
}

/// 機体設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AircraftConfig {
    pub passengers_max: u32,
    #[serde(default)]
    pub passengers: u32,
    #[serde(default = "default_true")]
    pub landed: bool,
    #[serde(default)]
    pub hoist: Option<HoistConfig>,
    #[serde(default)]
    pub rescue_door: Option<RescueDoorConfig>,
}

impl Default for AircraftConfig {
    fn default() -> Self {
        Self {
            passengers_max: 0,
            passengers: 0,
            landed: true,
            hoist: None,
            rescue_door: None,
        }
    }
}

/// 人物設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HumanConfig {
    #[serde(default = "default_human_mass")]
    pub mass_kg: f64,
    #[serde(default)]
    pub needs_rescue: bool,
    #[serde(default)]
    pub enter_message: Option<String>,
}

impl Default for HumanConfig {
    fn default() -> Self {
        Self {
            mass_kg: default_human_mass(),
            needs_rescue: false,
            enter_message: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_human_mass() -> f64 {
    75.0
}

/// エンティティ設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EntityConfig {
    pub name: String,
    pub kind: EntityKindConfig,
    #[serde(default)]
    pub position: Position3DConfig,
    #[serde(default)]
    pub heading_deg: f64,
    #[serde(default)]
    pub velocity: VelocityConfig,
    #[serde(default)]
    pub contact: Option<ContactConfig>,
    #[serde(default)]
    pub aircraft: Option<AircraftConfig>,
    #[serde(default)]
    pub human: Option<HumanConfig>,
}

impl EntityConfig {
    fn to_entity(&self) -> Entity {
        let kind = match self.kind {
            EntityKindConfig::Aircraft => {
                let config = self.aircraft.clone().unwrap_or_default();
                let mut aircraft = Aircraft::new(config.passengers_max);
                aircraft.passengers = config.passengers;
                aircraft.landed = config.landed;
                aircraft.hoist = config.hoist.as_ref().map(HoistConfig::to_hoist);
                aircraft.rescue_door = config.rescue_door.map(|d| RescueDoor {
                    open: false,
                    stay_open: d.stay_open,
                });
                EntityKind::Aircraft(aircraft)
            }
            EntityKindConfig::Human => {
                let config = self.human.clone().unwrap_or_default();
                let mut human = Human::new(config.mass_kg, config.needs_rescue);
                human.enter_message = config.enter_message;
                EntityKind::Human(human)
            }
            EntityKindConfig::Helipad => EntityKind::Helipad,
            EntityKindConfig::Runway => EntityKind::Runway,
            EntityKindConfig::Building => EntityKind::Building,
            EntityKindConfig::Ground => EntityKind::Ground,
            EntityKindConfig::Static => EntityKind::Static,
        };

        let mut entity = Entity::new(self.name.clone(), kind, self.position.into());
        entity.velocity = self.velocity.into();
        if let Some(contact) = &self.contact {
            entity = entity.with_contact(contact.to_bounds());
        }
        entity.with_heading(math_utils::deg_to_rad(self.heading_deg))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveType {
    ArriveAt,
    PickUp,
    PickUpArriveAt,
}

/// 目標設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObjectiveConfig {
    #[serde(rename = "type")]
    pub objective_type: ObjectiveType,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub humans_needed: i64,
    /// 制限時間（秒、0 は無制限）
    #[serde(default)]
    pub time_limit_s: f64,
    #[serde(default)]
    pub message_success: Option<String>,
    #[serde(default)]
    pub message_fail: Option<String>,
}

impl ObjectiveConfig {
    fn to_objective(&self) -> Objective {
        let target = self.target.clone().unwrap_or_default();
        let humans_needed = u32::try_from(self.humans_needed.max(0)).unwrap_or(u32::MAX);
        let kind = match self.objective_type {
            ObjectiveType::ArriveAt => ObjectiveKind::ArriveAt { target },
            ObjectiveType::PickUp => ObjectiveKind::PickUp { humans_needed },
            ObjectiveType::PickUpArriveAt => ObjectiveKind::PickUpArriveAt { target, humans_needed },
        };
        Objective::new(kind, self.time_limit_s)
            .with_messages(self.message_success.clone(), self.message_fail.clone())
    }
}

/// ミッション設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MissionConfig {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub objectives: Vec<ObjectiveConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptAction {
    LowerHoist,
    RaiseHoist,
    SetVelocity,
    Land,
    Takeoff,
}

/// 時刻指定のコマンド（ヘッドレス実行用）
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScriptCommandConfig {
    pub at_s: f64,
    /// 対象エンティティ名（"player" はプレイヤー機）
    #[serde(default = "default_script_entity")]
    pub entity: String,
    pub action: ScriptAction,
    /// ホイスト操作を続ける時間
    #[serde(default)]
    pub duration_s: f64,
    #[serde(default)]
    pub velocity: Option<VelocityConfig>,
}

fn default_script_entity() -> String {
    "player".to_string()
}

/// 完全なシナリオ設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioConfig {
    pub meta: ScenarioMeta,
    pub sim: SimulationConfig,
    #[serde(default)]
    pub options: SimOptions,
    #[serde(default)]
    pub player: Option<PlayerConfig>,
    pub entities: Vec<EntityConfig>,
    #[serde(default)]
    pub mission: Option<MissionConfig>,
    #[serde(default)]
    pub script: Vec<ScriptCommandConfig>,
}

impl ScenarioConfig {
    /// YAMLファイルからシナリオ設定を読み込み
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.to_path_buf()));
        }

        let contents = fs::read_to_string(path).map_err(|e| ScenarioError::Io(path.to_path_buf(), e))?;

        let config: ScenarioConfig =
            serde_yaml::from_str(&contents).map_err(|e| ScenarioError::Parse(path.to_path_buf(), e))?;

        config.validate()?;

        Ok(config)
    }

    /// YAML文字列から読み込み
    pub fn from_yaml_str(contents: &str) -> Result<Self, ScenarioError> {
        let config: ScenarioConfig =
            serde_yaml::from_str(contents).map_err(|e| ScenarioError::Parse(PathBuf::from("<inline>"), e))?;
        config.validate()?;
        Ok(config)
    }

    /// 組み込みのデモシナリオ
    pub fn demo() -> Result<Self, ScenarioError> {
        Self::from_yaml_str(DEMO_SCENARIO_YAML)
    }

    /// 設定の基本的な検証
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.sim.dt_s <= 0.0 {
            return Err(ScenarioError::Validation("dt_s must be positive".to_string()));
        }
        if self.sim.t_max_s <= 0.0 {
            return Err(ScenarioError::Validation("t_max_s must be positive".to_string()));
        }
        if self.options.time_compression <= 0.0 {
            return Err(ScenarioError::Validation(
                "time_compression must be positive".to_string(),
            ));
        }

        // 名前検索は大文字小文字を区別しないため、重複判定も合わせる
        let mut names = HashSet::new();
        for entity in &self.entities {
            if !names.insert(entity.name.to_ascii_lowercase()) {
                return Err(ScenarioError::Validation(format!(
                    "Duplicate entity name: {}",
                    entity.name
                )));
            }
            if let Some(contact) = &entity.contact {
                contact.validate(&entity.name)?;
            }
            if let Some(aircraft) = &entity.aircraft {
                if aircraft.passengers > aircraft.passengers_max {
                    return Err(ScenarioError::Validation(format!(
                        "Aircraft {} carries more passengers than seats",
                        entity.name
                    )));
                }
                if let Some(hoist) = &aircraft.hoist {
                    hoist.validate(&entity.name)?;
                }
            }
        }

        if let Some(player) = &self.player {
            let entity = self
                .find_entity(&player.entity)
                .ok_or_else(|| ScenarioError::UnknownEntity(player.entity.clone()))?;
            if entity.kind != EntityKindConfig::Aircraft {
                return Err(ScenarioError::Validation(format!(
                    "Player entity {} is not an aircraft",
                    player.entity
                )));
            }
        }

        if let Some(mission) = &self.mission {
            for (i, objective) in mission.objectives.iter().enumerate() {
                if objective.humans_needed < 0 {
                    return Err(ScenarioError::Validation(format!(
                        "Objective {} has a negative humans_needed",
                        i
                    )));
                }
                let needs_target = objective.objective_type != ObjectiveType::PickUp;
                if needs_target && objective.target.as_deref().is_none_or(str::is_empty) {
                    return Err(ScenarioError::Validation(format!(
                        "Objective {} needs a target name",
                        i
                    )));
                }
            }
        }

        for command in &self.script {
            if command.at_s < 0.0 || command.duration_s < 0.0 {
                return Err(ScenarioError::Validation(format!(
                    "Script command at {}s has a negative time",
                    command.at_s
                )));
            }
            if command.action == ScriptAction::SetVelocity && command.velocity.is_none() {
                return Err(ScenarioError::Validation(format!(
                    "set_velocity at {}s needs a velocity",
                    command.at_s
                )));
            }
            if command.entity.eq_ignore_ascii_case("player") {
                if self.player.is_none() {
                    return Err(ScenarioError::UnknownEntity(command.entity.clone()));
                }
            } else if self.find_entity(&command.entity).is_none() {
                return Err(ScenarioError::UnknownEntity(command.entity.clone()));
            }
        }

        Ok(())
    }

    fn find_entity(&self, name: &str) -> Option<&EntityConfig> {
        self.entities.iter().find(|e| e.name.eq_ignore_ascii_case(name))
    }

    /// シミュレーションコンテキストを構築
    ///
    /// エンティティをシナリオの記述順に登録し、プレイヤーとミッションを設定します。
    pub fn build_context(&self) -> Result<SimContext, ScenarioError> {
        let mut ctx = SimContext::new(self.options.clone());
        for config in &self.entities {
            ctx.registry.add(config.to_entity());
        }

        if let Some(player) = &self.player {
            let id = ctx
                .registry
                .find_by_name(&player.entity)
                .ok_or_else(|| ScenarioError::UnknownEntity(player.entity.clone()))?;
            ctx.player = Some(id);
            ctx.player_stats = Some(PlayerStats::new(player.pilot.clone()));
        }

        if let Some(mission) = &self.mission {
            let objectives = mission.objectives.iter().map(ObjectiveConfig::to_objective).collect();
            ctx.mission = Some(
                Mission::new(mission.title.clone(), objectives)
                    .with_description(mission.description.clone())
                    .with_options(&self.options),
            );
        }

        Ok(ctx)
    }

    /// シナリオの概要を表示
    pub fn print_summary(&self) {
        println!("=== シナリオ情報 ===");
        println!("名前: {}", self.meta.name);
        println!("説明: {}", self.meta.description);
        println!("バージョン: {}", self.meta.version);
        println!();

        println!("=== シミュレーション設定 ===");
        println!("時間刻み: {:.3}秒", self.sim.dt_s);
        println!("最大時間: {:.1}秒 ({:.1}分)", self.sim.t_max_s, self.sim.t_max_s / 60.0);
        println!("時間圧縮: {:.1}倍", self.options.time_compression);
        println!();

        println!("=== エンティティ ===");
        let count_of = |kind: EntityKindConfig| self.entities.iter().filter(|e| e.kind == kind).count();
        println!("機体: {}機", count_of(EntityKindConfig::Aircraft));
        let victims = self
            .entities
            .iter()
            .filter(|e| e.human.as_ref().is_some_and(|h| h.needs_rescue))
            .count();
        println!("人物: {}名 (要救助: {}名)", count_of(EntityKindConfig::Human), victims);
        println!("ヘリパッド: {}", count_of(EntityKindConfig::Helipad));
        if let Some(player) = &self.player {
            println!("プレイヤー: {} ({})", player.entity, player.pilot);
        }
        println!();

        if let Some(mission) = &self.mission {
            println!("=== ミッション ===");
            println!("{}: {}", mission.title, mission.description);
            for (i, objective) in mission.objectives.iter().enumerate() {
                println!(
                    "  {}. {:?} target={} humans={} limit={:.0}秒",
                    i + 1,
                    objective.objective_type,
                    objective.target.as_deref().unwrap_or("-"),
                    objective.humans_needed,
                    objective.time_limit_s
                );
            }
        }
    }
}

/// シナリオ読み込みエラー
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("シナリオファイルが見つかりません: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("ファイル読み込みエラー {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),
    #[error("YAML解析エラー {}: {}", .0.display(), .1)]
    Parse(PathBuf, #[source] serde_yaml::Error),
    #[error("設定検証エラー: {0}")]
    Validation(String),
    #[error("不明なエンティティ: {0}")]
    UnknownEntity(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::mission::MissionState;
    use approx::assert_abs_diff_eq;

    fn minimal_yaml(extra: &str) -> String {
        format!(
            r#"
meta: {{ version: "1", name: "t" }}
sim: {{ dt_s: 0.1, t_max_s: 10.0 }}
entities:
  - {{ name: "Heli", kind: aircraft, aircraft: {{ passengers_max: 2 }} }}
  - {{ name: "Pad", kind: helipad }}
{}
"#,
            extra
        )
    }

    #[test]
    fn test_demo_scenario_builds_context() {
        let scenario = ScenarioConfig::demo().expect("demo");
        let ctx = scenario.build_context().expect("context");

        assert_eq!(ctx.registry.count(), 4);
        let player = ctx.player.expect("player");
        let heli = ctx.registry.get(player).expect("heli");
        assert_eq!(heli.name, "Rescue1");
        assert!(heli.hoist().is_some());
        assert_abs_diff_eq!(heli.direction.heading, std::f64::consts::FRAC_PI_2, epsilon = 1e-12);
        assert_abs_diff_eq!(ctx.options.hoist_contact_expansion_coeff, 1.5);

        let mission = ctx.mission.as_ref().expect("mission");
        assert_eq!(mission.objectives().len(), 2);
        assert_eq!(mission.state(), MissionState::InProgress);
        assert_eq!(ctx.player_stats.as_ref().map(|s| s.name.as_str()), Some("Pilot"));
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let yaml = minimal_yaml("").replace(
            "  - { name: \"Pad\", kind: helipad }\n",
            "  - { name: \"Pad\", kind: helipad }\n  - { name: \"heli\", kind: static }\n",
        );
        let err = ScenarioConfig::from_yaml_str(&yaml).unwrap_err();
        assert!(matches!(err, ScenarioError::Validation(msg) if msg.contains("heli")));
    }

    #[test]
    fn test_rejects_unknown_player_and_script_entity() {
        let err = ScenarioConfig::from_yaml_str(&minimal_yaml(
            "player: { entity: \"Nobody\", pilot: \"P\" }",
        ))
        .unwrap_err();
        assert!(matches!(err, ScenarioError::UnknownEntity(name) if name == "Nobody"));

        let err = ScenarioConfig::from_yaml_str(&minimal_yaml(
            "script:\n  - { at_s: 1.0, entity: \"Ghost\", action: land }",
        ))
        .unwrap_err();
        assert!(matches!(err, ScenarioError::UnknownEntity(_)));
    }

    #[test]
    fn test_rejects_negative_need_and_missing_target() {
        let err = ScenarioConfig::from_yaml_str(&minimal_yaml(
            "mission:\n  title: m\n  objectives:\n    - { type: pick_up, humans_needed: -1 }",
        ))
        .unwrap_err();
        assert!(matches!(err, ScenarioError::Validation(_)));

        let err = ScenarioConfig::from_yaml_str(&minimal_yaml(
            "mission:\n  title: m\n  objectives:\n    - { type: arrive_at }",
        ))
        .unwrap_err();
        assert!(matches!(err, ScenarioError::Validation(_)));
    }

    #[test]
    fn test_rejects_malformed_volume() {
        let yaml = minimal_yaml("").replace(
            "{ name: \"Pad\", kind: helipad }",
            "{ name: \"Pad\", kind: helipad, contact: { shape: { type: cylindrical, radius_m: 1.0, z_min_m: 2.0, z_max_m: 1.0 } } }",
        );
        let err = ScenarioConfig::from_yaml_str(&yaml).unwrap_err();
        assert!(matches!(err, ScenarioError::Validation(_)));
    }

    #[test]
    fn test_rejects_inconsistent_hoist() {
        let with_hoist = |hoist: &str| {
            minimal_yaml("").replace(
                "aircraft: { passengers_max: 2 }",
                &format!("aircraft: {{ passengers_max: 2, hoist: {{ {} }} }}", hoist),
            )
        };

        for hoist in [
            "contact_z_max_m: 0.0",
            "contact_z_max_m: -1.0",
            "rope_max_m: 0.5, contact_z_max_m: 1.0",
            "rope_rate_mps: -2.0",
        ] {
            let err = ScenarioConfig::from_yaml_str(&with_hoist(hoist)).unwrap_err();
            assert!(
                matches!(&err, ScenarioError::Validation(msg) if msg.contains("Heli")),
                "{}: {:?}",
                hoist,
                err
            );
        }

        let scenario = ScenarioConfig::from_yaml_str(&with_hoist("rope_max_m: 1.0, contact_z_max_m: 1.0"))
            .expect("valid hoist");
        assert!(scenario.entities[0].aircraft.as_ref().and_then(|a| a.hoist.as_ref()).is_some());
    }

    #[test]
    fn test_rejects_non_positive_dt() {
        let yaml = minimal_yaml("").replace("dt_s: 0.1", "dt_s: 0.0");
        assert!(matches!(
            ScenarioConfig::from_yaml_str(&yaml),
            Err(ScenarioError::Validation(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = ScenarioConfig::from_file("no/such/scenario.yaml").unwrap_err();
        assert!(matches!(err, ScenarioError::FileNotFound(_)));
    }
}
