use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::context::SimContext;
use crate::models::{
    common::{Direction3D, Position3D, math_utils},
    contact,
    entity::{EntityId, HumanFlags},
    events::passenger_noun,
    mission,
    traits::IMessageSink,
};

pub const MESSAGE_NO_ROOM: &str = "No room left for additional passengers!";

/// ロープ先端の装備
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HoistDeployment {
    #[default]
    Basket,
    Diver,
    Hook,
}

impl HoistDeployment {
    /// 収容者をバスケット位置から上下にずらす量（m）
    pub fn occupant_z_offset(&self) -> f64 {
        match self {
            // バスケットは水面より上
            HoistDeployment::Basket => 0.2,
            // ダイバーとフックは腰まで水に浸かる
            HoistDeployment::Diver | HoistDeployment::Hook => -1.0,
        }
    }
}

/// ホイストの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoistState {
    Retracted,
    Deployed,
}

/// 救助用ホイスト
#[derive(Debug, Clone, PartialEq)]
pub struct Hoist {
    /// 機体ローカルの取り付け位置
    pub offset: Position3D,
    /// バスケットのワールド位置
    pub position: Position3D,
    pub direction: Direction3D,
    /// ロープの繰り出し長（0 = 格納）
    pub rope_cur: f64,
    pub rope_max: f64,
    /// 巻き上げ／繰り出し速度（m/s）
    pub rope_rate: f64,
    /// 地面で止まった分を除いた見かけのロープ長
    pub rope_cur_vis: f64,
    pub on_ground: bool,
    pub deployment: HoistDeployment,
    /// バスケットの平面接触半径
    pub contact_radius: f64,
    pub contact_z_min: f64,
    /// バスケットの高さ。ロープがこれより短くなると格納とみなす
    pub contact_z_max: f64,
    /// 積載上限（kg、0 以下は無制限）
    pub capacity: f64,
    pub max_occupants: usize,
    pub occupants: Vec<EntityId>,
    pub occupants_mass: f64,
}

impl Default for Hoist {
    fn default() -> Self {
        Self {
            offset: Position3D::default(),
            position: Position3D::default(),
            direction: Direction3D::default(),
            rope_cur: 0.0,
            rope_max: 40.0,
            rope_rate: 4.0,
            rope_cur_vis: 0.0,
            on_ground: false,
            deployment: HoistDeployment::Basket,
            contact_radius: 1.0,
            contact_z_min: 0.0,
            contact_z_max: 1.0,
            capacity: 0.0,
            max_occupants: 1,
            occupants: Vec::new(),
            occupants_mass: 0.0,
        }
    }
}

impl Hoist {
    pub fn new(offset: Position3D, rope_max: f64, rope_rate: f64) -> Self {
        Self {
            offset,
            rope_max,
            rope_rate,
            ..Self::default()
        }
    }

    pub fn state(&self) -> HoistState {
        if self.rope_cur > 0.0 {
            HoistState::Deployed
        } else {
            HoistState::Retracted
        }
    }

    /// 収容判定に使う平面半径
    ///
    /// バスケット半径の2倍。プレイヤー機の場合はさらに拡大係数を掛けます。
    pub fn pickup_radius(&self, is_player: bool, expansion_coeff: f64) -> f64 {
        let coeff = if is_player { expansion_coeff.max(1.0) } else { 1.0 };
        self.contact_radius * 2.0 * coeff
    }

    /// バスケットにもう1人収容できるか
    pub fn can_take_occupant(&self, mass: f64) -> bool {
        if self.occupants.len() >= self.max_occupants {
            return false;
        }
        self.capacity <= 0.0 || self.occupants_mass + mass <= self.capacity
    }

    /// ロープを繰り出す
    ///
    /// 格納状態からはバスケットを取り付け位置に置き、ロープ長を
    /// バスケットの高さに初期化します。
    ///
    /// # 引数
    /// * `amount` - 繰り出す長さ（m）
    /// * `parent_pos` - 機体位置
    /// * `parent_heading` - 機体の heading
    ///
    /// # 戻り値
    /// ロープが動いた場合 true。すでに最大長なら false
    pub fn lower(&mut self, amount: f64, parent_pos: &Position3D, parent_heading: f64) -> bool {
        if self.rope_cur < self.contact_z_max {
            let r = math_utils::rotate_heading(self.offset, parent_heading);
            self.position = Position3D::new(
                parent_pos.x + r.x,
                parent_pos.y + r.y,
                parent_pos.z + self.offset.z - self.rope_cur,
            );
            self.rope_cur = self.contact_z_max;
            self.rope_cur_vis = self.rope_cur;
            self.on_ground = false;
            return true;
        }
        if self.rope_cur >= self.rope_max {
            return false;
        }
        self.rope_cur = (self.rope_cur + amount).min(self.rope_max);
        true
    }

    /// ロープを巻き上げる
    ///
    /// # 戻り値
    /// この呼び出しで繰り出し状態から格納状態に移った場合のみ true
    pub fn raise(&mut self, amount: f64) -> bool {
        let prev_rope = self.rope_cur;
        self.rope_cur -= amount;
        if self.rope_cur > 0.0 && self.rope_cur >= self.contact_z_max {
            return false;
        }

        self.rope_cur = 0.0;
        self.rope_cur_vis = 0.0;
        self.on_ground = false;
        if prev_rope > 0.0 {
            self.occupants_mass = 0.0;
            true
        } else {
            false
        }
    }

    /// バスケット位置の更新
    ///
    /// 機体位置に姿勢で回転した取り付け位置を足し、ロープ長だけ下げます。
    /// 地面より下になる場合は見かけのロープ長だけを短くします。
    pub fn update_basket(&mut self, parent_pos: &Position3D, parent_dir: &Direction3D, ground_z: f64) {
        let mut basket = *parent_pos + parent_dir.rotate_offset(self.offset);
        basket.z -= self.rope_cur;
        self.rope_cur_vis = self.rope_cur;
        self.on_ground = basket.z <= ground_z + 0.01;
        if basket.z < ground_z {
            self.rope_cur_vis = (self.rope_cur - ground_z + basket.z).max(0.0);
            basket.z = ground_z;
        }
        self.position = basket;
        self.direction = *parent_dir;
    }
}

/// 時間圧縮込みのロープ移動量
fn rope_travel(ctx: &SimContext, rope_rate: f64, dt_s: f64, control_coeff: f64) -> f64 {
    rope_rate * dt_s * ctx.time_compression() * control_coeff
}

/// ホイストを下ろす（救助ドアも開く）
///
/// # 戻り値
/// ロープが動いた場合 true
pub fn lower_hoist(ctx: &mut SimContext, vehicle: EntityId, control_coeff: f64, dt_s: f64) -> bool {
    let is_player = ctx.is_player(vehicle);
    let Some(entity) = ctx.registry.get(vehicle) else {
        return false;
    };
    let Some(hoist) = entity.hoist() else {
        return false;
    };
    if hoist.rope_rate <= 0.0 || control_coeff <= 0.0 {
        return false;
    }
    let amount = rope_travel(ctx, hoist.rope_rate, dt_s, control_coeff);

    let mut warn_no_room = false;
    let Some(entity) = ctx.registry.get_mut(vehicle) else {
        return false;
    };
    let parent_pos = entity.position;
    let parent_heading = entity.direction.heading;
    let Some(aircraft) = entity.aircraft_mut() else {
        return false;
    };
    let has_room = aircraft.has_room();
    if let Some(door) = aircraft.rescue_door.as_mut() {
        if !door.open {
            door.open = true;
            debug!(vehicle = ?vehicle, "RESCUE_DOOR_OPEN: 救助ドアを開放");
            warn_no_room = !has_room;
        }
    }
    let Some(hoist) = aircraft.hoist.as_mut() else {
        return false;
    };
    let moved = hoist.lower(amount, &parent_pos, parent_heading);
    let rope = hoist.rope_cur;

    if warn_no_room && is_player {
        ctx.messages.add_message(MESSAGE_NO_ROOM);
    }
    if moved {
        trace!(vehicle = ?vehicle, rope_m = rope, "HOIST_LOWER");
    }
    moved
}

/// ホイストを巻き上げる
///
/// 格納しきった瞬間に収容者を機内へ移し、固定されていなければ救助ドアを閉じます。
///
/// # 戻り値
/// 格納への遷移が起きた場合 true
pub fn raise_hoist(ctx: &mut SimContext, vehicle: EntityId, control_coeff: f64, dt_s: f64) -> bool {
    let Some(hoist) = ctx.registry.get(vehicle).and_then(|e| e.hoist()) else {
        return false;
    };
    if hoist.rope_rate <= 0.0 || control_coeff <= 0.0 {
        return false;
    }
    let amount = rope_travel(ctx, hoist.rope_rate, dt_s, control_coeff);

    let crossed = ctx
        .registry
        .get_mut(vehicle)
        .and_then(|e| e.hoist_mut())
        .is_some_and(|h| h.raise(amount));
    if !crossed {
        return false;
    }

    info!(vehicle = ?vehicle, "HOIST_RETRACTED: ホイストを格納");
    do_hoist_in(ctx, vehicle);

    if let Some(door) = ctx
        .registry
        .get_mut(vehicle)
        .and_then(|e| e.aircraft_mut())
        .and_then(|a| a.rescue_door.as_mut())
    {
        if door.open && !door.stay_open {
            door.open = false;
            debug!(vehicle = ?vehicle, "RESCUE_DOOR_CLOSE: 救助ドアを閉鎖");
        }
    }
    true
}

/// ホイストと収容者の位置更新（ロープが出ている場合のみ）
///
/// 収容者はバスケット位置に移動し、向きをホイストに合わせます。
/// 削除済みの収容者は読み飛ばします。
pub fn update_hoist(ctx: &mut SimContext, vehicle: EntityId) {
    let Some(entity) = ctx.registry.get(vehicle) else {
        return;
    };
    if !entity.hoist().is_some_and(|h| h.rope_cur > 0.0) {
        return;
    }
    let parent_pos = entity.position;
    let parent_dir = entity.direction;
    let ground_z = contact::find_ground(
        &ctx.registry,
        &parent_pos,
        Some(vehicle),
        ctx.options.ground_elevation_m,
        ctx.options.surface_contact_z_tolerance_m,
    );

    let Some(hoist) = ctx.registry.get_mut(vehicle).and_then(|e| e.hoist_mut()) else {
        return;
    };
    hoist.update_basket(&parent_pos, &parent_dir, ground_z);
    let basket = hoist.position;
    let direction = hoist.direction;
    let dz = hoist.deployment.occupant_z_offset();
    let occupants = hoist.occupants.clone();

    for id in occupants {
        let Some(occupant) = ctx.registry.get_mut(id) else {
            continue;
        };
        occupant.position = Position3D::new(basket.x, basket.y, basket.z + dz);
        occupant.direction = direction;
    }
}

/// 要救助者をバスケットに収容
///
/// 機内に空席がない場合（プレイヤー機ならメッセージを出す）や
/// バスケットが満員の場合は収容しません。
///
/// # 戻り値
/// 収容した場合 true
pub fn pick_up_human(ctx: &mut SimContext, vehicle: EntityId, human: EntityId) -> bool {
    if vehicle == human {
        return false;
    }
    let Some(mass) = ctx.registry.get(human).and_then(|e| e.human()).map(|h| h.mass) else {
        return false;
    };
    let is_player = ctx.is_player(vehicle);

    let Some(aircraft) = ctx.registry.get_mut(vehicle).and_then(|e| e.aircraft_mut()) else {
        return false;
    };
    let has_room = aircraft.has_room();
    let Some(hoist) = aircraft.hoist.as_mut() else {
        return false;
    };
    if !has_room {
        if is_player {
            ctx.messages.add_message(MESSAGE_NO_ROOM);
        }
        return false;
    }
    if !hoist.can_take_occupant(mass) {
        return false;
    }

    hoist.occupants.push(human);
    hoist.occupants_mass += mass;
    let deployment = hoist.deployment;

    if let Some(h) = ctx.registry.get_mut(human).and_then(|e| e.human_mut()) {
        h.flags = match deployment {
            HoistDeployment::Basket => HumanFlags::GRIPPED | HumanFlags::SIT_DOWN,
            HoistDeployment::Diver | HoistDeployment::Hook => HumanFlags::GRIPPED,
        };
    }

    info!(
        vehicle = %ctx.display_name(vehicle),
        human = ctx.registry.name_of(human).unwrap_or_default(),
        mass_kg = mass,
        "HOIST_PICKUP: 要救助者をバスケットに収容"
    );
    true
}

/// 乗客を機内に乗せる
///
/// 乗客数と乗客質量を増やし、ミッションに乗り込みを通知したあと
/// 乗客エンティティを削除します。
///
/// # 戻り値
/// 乗せた場合 true（`passenger` はもう存在しない）
pub fn board_object(ctx: &mut SimContext, vehicle: EntityId, passenger: EntityId) -> bool {
    if vehicle == passenger {
        return false;
    }
    let Some(mass) = ctx
        .registry
        .get(passenger)
        .map(|e| e.human().map(|h| h.mass).unwrap_or(0.0))
    else {
        return false;
    };
    let Some(aircraft) = ctx.registry.get_mut(vehicle).and_then(|e| e.aircraft_mut()) else {
        return false;
    };
    if !aircraft.has_room() {
        return false;
    }
    aircraft.passengers += 1;
    aircraft.passengers_mass = aircraft.passengers_mass.max(0.0) + mass;

    mission::passengers_entered_notify(ctx, vehicle, 1);

    if let Some(entity) = ctx.registry.delete(passenger) {
        debug!(vehicle = ?vehicle, passenger = %entity.name, "PASSENGER_BOARDED: 乗客が搭乗");
    }
    true
}

/// バスケット内の収容者を機内に移す
///
/// 収容者リストは空になり、ミッションに収容人数を通知します。
///
/// # 戻り値
/// 機内に移した人数
pub fn do_hoist_in(ctx: &mut SimContext, vehicle: EntityId) -> u32 {
    let is_player = ctx.is_player(vehicle);
    let Some(entity) = ctx.registry.get(vehicle) else {
        return 0;
    };
    let Some(hoist) = entity.hoist() else {
        return 0;
    };
    let occupants = hoist.occupants.clone();
    let prev_passengers = entity.passengers();

    let mut hoisted_in = 0;
    for id in occupants {
        if id == vehicle {
            continue;
        }
        let Some(occupant) = ctx.registry.get(id) else {
            continue;
        };
        if is_player {
            if let Some(text) = occupant.human().and_then(|h| h.enter_message.clone()) {
                ctx.messages.add_message(&text);
            }
        }
        if board_object(ctx, vehicle, id) {
            hoisted_in += 1;
        }
    }

    if let Some(hoist) = ctx.registry.get_mut(vehicle).and_then(|e| e.hoist_mut()) {
        hoist.occupants.clear();
    }

    if let Some(aircraft) = ctx.registry.get(vehicle).and_then(|e| e.aircraft()) {
        let (passengers, passengers_max) = (aircraft.passengers, aircraft.passengers_max);
        if prev_passengers < passengers {
            let text = if is_player {
                format!("Passengers: {}({})", passengers, passengers_max)
            } else {
                let gained = passengers - prev_passengers;
                format!(
                    "{} picked up {} {}",
                    ctx.registry.name_of(vehicle).unwrap_or_default(),
                    gained,
                    passenger_noun(gained)
                )
            };
            ctx.messages.add_message(&text);
        }
    }

    mission::hoist_in_notify(ctx, vehicle, hoisted_in);
    hoisted_in
}

/// 機内の乗客を全員降ろす
///
/// # 戻り値
/// 降ろした人数
pub fn unload_all_passengers(ctx: &mut SimContext, vehicle: EntityId) -> u32 {
    let Some(aircraft) = ctx.registry.get_mut(vehicle).and_then(|e| e.aircraft_mut()) else {
        return 0;
    };
    let unloaded = aircraft.passengers;
    aircraft.passengers = 0;
    aircraft.passengers_mass = 0.0;
    if unloaded > 0 {
        debug!(vehicle = ?vehicle, unloaded, "PASSENGERS_UNLOADED: 乗客を降ろした");
    }
    unloaded
}
