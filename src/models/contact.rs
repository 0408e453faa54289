use bitflags::bitflags;
use tracing::{debug, trace};

use crate::context::SimContext;
use crate::models::{
    common::{Position3D, math_utils},
    entity::{EntityId, EntityKind, ObjectRegistry},
    hoist,
    traits::ICollisionListener,
};

/// 衝突通知に渡す固定の衝撃係数
pub const COLLISION_SEVERITY: f64 = 1.1;

bitflags! {
    /// 接触範囲のフラグ
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CrashFlags: u8 {
        /// 他のエンティティにぶつかりうる
        const CRASH_OTHER     = 1 << 0;
        /// 他のエンティティからぶつけられうる
        const CRASH_CAUSE     = 1 << 1;
        /// 上に着陸／歩行できる支持面
        const SUPPORT_SURFACE = 1 << 2;
    }
}

/// 矩形接触範囲（エンティティのローカル座標）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectBounds {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub z_min: f64,
    pub z_max: f64,
    /// cos(-heading)
    pub cos_heading: f64,
    /// sin(-heading)
    pub sin_heading: f64,
}

impl RectBounds {
    pub fn new(x: (f64, f64), y: (f64, f64), z: (f64, f64)) -> Self {
        Self {
            x_min: x.0,
            x_max: x.1,
            y_min: y.0,
            y_max: y.1,
            z_min: z.0,
            z_max: z.1,
            cos_heading: 1.0,
            sin_heading: 0.0,
        }
    }

    /// ワールド上の差分（矩形中心から見た相手）をローカル座標に戻す
    fn to_local(&self, dx: f64, dy: f64) -> (f64, f64) {
        math_utils::inverse_rotate_xy(dx, dy, self.cos_heading, self.sin_heading)
    }

    /// ローカル座標 (lx, ly) が、各辺を `margin` だけ広げた範囲内にあるか
    fn contains_xy(&self, lx: f64, ly: f64, margin: f64) -> bool {
        lx >= self.x_min - margin
            && lx <= self.x_max + margin
            && ly >= self.y_min - margin
            && ly <= self.y_max + margin
    }
}

/// 接触範囲の形状
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContactShape {
    Spherical { radius: f64 },
    /// z_min / z_max はエンティティ位置からの高さ方向オフセット
    Cylindrical { radius: f64, z_min: f64, z_max: f64 },
    Rectangular(RectBounds),
}

impl ContactShape {
    /// 平面（XY）上の接触半径
    ///
    /// 矩形は x 幅と y 幅の大きい方を使います。
    pub fn flat_radius(&self) -> f64 {
        let r = match self {
            ContactShape::Spherical { radius } => *radius,
            ContactShape::Cylindrical { radius, .. } => *radius,
            ContactShape::Rectangular(b) => (b.x_max - b.x_min).max(b.y_max - b.y_min),
        };
        r.max(0.0)
    }

    /// 位置 z を基準とした高さ方向の範囲（球は ±半径）
    fn z_band(&self, z: f64) -> (f64, f64) {
        match self {
            ContactShape::Spherical { radius } => (z - radius, z + radius),
            ContactShape::Cylindrical { z_min, z_max, .. } => (z + z_min, z + z_max),
            ContactShape::Rectangular(b) => (z + b.z_min, z + b.z_max),
        }
    }
}

/// 接触範囲（形状とフラグ）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactBounds {
    pub flags: CrashFlags,
    pub shape: ContactShape,
}

impl ContactBounds {
    pub fn spherical(radius: f64, flags: CrashFlags) -> Self {
        Self {
            flags,
            shape: ContactShape::Spherical { radius },
        }
    }

    pub fn cylindrical(radius: f64, z_min: f64, z_max: f64, flags: CrashFlags) -> Self {
        Self {
            flags,
            shape: ContactShape::Cylindrical { radius, z_min, z_max },
        }
    }

    pub fn rectangular(bounds: RectBounds, flags: CrashFlags) -> Self {
        Self {
            flags,
            shape: ContactShape::Rectangular(bounds),
        }
    }

    /// heading 変更時に矩形の cos/sin キャッシュを更新
    pub fn set_heading(&mut self, heading: f64) {
        if let ContactShape::Rectangular(b) = &mut self.shape {
            let (s, c) = (-heading).sin_cos();
            b.cos_heading = c;
            b.sin_heading = s;
        }
    }

    pub fn can_crash_into_others(&self) -> bool {
        self.flags.contains(CrashFlags::CRASH_OTHER)
    }

    pub fn can_be_crashed_into(&self) -> bool {
        self.flags.contains(CrashFlags::CRASH_CAUSE)
    }

    pub fn is_support_surface(&self) -> bool {
        self.flags.contains(CrashFlags::SUPPORT_SURFACE)
    }
}

/// エンティティの平面接触半径（接触範囲がなければ 0）
pub fn flat_contact_radius(registry: &ObjectRegistry, id: EntityId) -> f64 {
    registry
        .get(id)
        .and_then(|e| e.contact.as_ref())
        .map(|cb| cb.shape.flat_radius())
        .unwrap_or(0.0)
}

/// 2つの接触形状が触れているか
///
/// `src` がぶつかる側、`tar` がぶつけられる側です。
/// 矩形同士は常に「接触なし」を返します。
///
/// # 引数
/// * `src_pos` - ぶつかる側の位置
/// * `src` - ぶつかる側の形状
/// * `tar_pos` - ぶつけられる側の位置
/// * `tar` - ぶつけられる側の形状
pub fn shapes_in_contact(
    src_pos: &Position3D,
    src: &ContactShape,
    tar_pos: &Position3D,
    tar: &ContactShape,
) -> bool {
    use ContactShape::*;

    match (src, tar) {
        (Spherical { radius: rs }, Spherical { radius: rt }) => {
            let dr = src_pos.distance_xy(tar_pos);
            if dr - rs - rt > 0.0 {
                return false;
            }
            dr.hypot(tar_pos.z - src_pos.z) - rs - rt <= 0.0
        }
        (Spherical { radius: rs }, Cylindrical { radius: rt, z_min, z_max }) => {
            if src_pos.distance_xy(tar_pos) - rs - rt > 0.0 {
                return false;
            }
            src_pos.z >= tar_pos.z + z_min && src_pos.z <= tar_pos.z + z_max
        }
        (Cylindrical { radius: rs, z_min, z_max }, Spherical { radius: rt }) => {
            if src_pos.distance_xy(tar_pos) - rs - rt > 0.0 {
                return false;
            }
            tar_pos.z + rt >= src_pos.z + z_min && tar_pos.z - rt <= src_pos.z + z_max
        }
        (
            Cylindrical { radius: rs, z_min: s_min, z_max: s_max },
            Cylindrical { radius: rt, z_min: t_min, z_max: t_max },
        ) => {
            if src_pos.distance_xy(tar_pos) - rs - rt > 0.0 {
                return false;
            }
            math_utils::bands_overlap(
                src_pos.z + s_min,
                src_pos.z + s_max,
                tar_pos.z + t_min,
                tar_pos.z + t_max,
            )
        }
        (Rectangular(_), Rectangular(_)) => false,
        (_, Rectangular(b)) => {
            let (s_min, s_max) = src.z_band(src_pos.z);
            let (t_min, t_max) = tar.z_band(tar_pos.z);
            if !math_utils::bands_overlap(s_min, s_max, t_min, t_max) {
                return false;
            }
            let (lx, ly) = b.to_local(src_pos.x - tar_pos.x, src_pos.y - tar_pos.y);
            b.contains_xy(lx, ly, src.flat_radius())
        }
        (Rectangular(b), _) => {
            let (s_min, s_max) = src.z_band(src_pos.z);
            let (t_min, t_max) = tar.z_band(tar_pos.z);
            if !math_utils::bands_overlap(s_min, s_max, t_min, t_max) {
                return false;
            }
            let (lx, ly) = b.to_local(tar_pos.x - src_pos.x, tar_pos.y - src_pos.y);
            b.contains_xy(lx, ly, tar.flat_radius())
        }
    }
}

/// 衝突接触の検出
///
/// `id` のエンティティが CRASH_OTHER を持つ場合のみ、CRASH_CAUSE を持つ
/// 他のエンティティをレジストリ順に走査し、最初に接触したものを返します。
/// 見つかった場合は `listener` に固定の衝撃係数で通知します。
///
/// # 引数
/// * `registry` - エンティティレジストリ
/// * `id` - 判定するエンティティ
/// * `listener` - 衝突通知先
///
/// # 戻り値
/// 接触した相手のハンドル。なければ `None`
pub fn find_crash_contact(
    registry: &ObjectRegistry,
    id: EntityId,
    listener: &mut dyn ICollisionListener,
) -> Option<EntityId> {
    let source = registry.get(id)?;
    let src_cb = source.contact.as_ref()?;
    if !src_cb.can_crash_into_others() {
        return None;
    }

    let hit = registry.iter().find_map(|(tid, target)| {
        if tid == id {
            return None;
        }
        let tar_cb = target.contact.as_ref()?;
        if !tar_cb.can_be_crashed_into() {
            return None;
        }
        shapes_in_contact(&source.position, &src_cb.shape, &target.position, &tar_cb.shape)
            .then_some(tid)
    })?;

    debug!(
        source = %source.name,
        obstruction = registry.name_of(hit).unwrap_or_default(),
        "CRASH_CONTACT: 接触を検出"
    );
    listener.on_collision(id, hit, COLLISION_SEVERITY);
    Some(hit)
}

/// ホイストのバスケット位置から、候補の形状に届くか
fn basket_reaches(
    basket: &Position3D,
    pickup_radius: f64,
    basket_z_min: f64,
    tar_pos: &Position3D,
    tar: &ContactShape,
) -> bool {
    let d = basket.distance_xy(tar_pos);
    let (reach, top) = match tar {
        ContactShape::Spherical { radius } => (*radius, tar_pos.z + radius),
        ContactShape::Cylindrical { radius, z_max, .. } => (*radius, tar_pos.z + z_max),
        ContactShape::Rectangular(b) => (b.x_max - b.x_min, tar_pos.z + b.z_max),
    };
    if d - pickup_radius - reach > 0.0 {
        return false;
    }
    // バスケットより下にいる相手は掴めない
    top >= basket.z + basket_z_min
}

/// ホイストによる救助者の収容判定
///
/// ロープが出ている場合のみ、要救助フラグを持つ人物をレジストリ順に調べ、
/// 最初に収容できた人物を返します（その時点で走査を打ち切ります）。
/// 収容できるかどうか（空席・バスケットの定員）の判定は
/// [`hoist::pick_up_human`] が行います。
///
/// # 引数
/// * `ctx` - シミュレーションコンテキスト
/// * `vehicle` - ホイストを持つ機体
///
/// # 戻り値
/// 収容した人物のハンドル
pub fn find_hoist_pickup(ctx: &mut SimContext, vehicle: EntityId) -> Option<EntityId> {
    let is_player = ctx.player == Some(vehicle);
    let coeff = ctx.options.hoist_contact_expansion_coeff;

    let candidates: Vec<EntityId> = {
        let hoist = ctx.registry.get(vehicle)?.hoist()?;
        if hoist.rope_cur <= 0.0 {
            return None;
        }
        let pickup_radius = hoist.pickup_radius(is_player, coeff);
        let basket = hoist.position;
        let basket_z_min = hoist.contact_z_min;

        ctx.registry
            .iter()
            .filter(|(_, e)| e.human().is_some_and(|h| h.needs_rescue()))
            .filter(|(_, e)| {
                e.contact.as_ref().is_some_and(|cb| {
                    basket_reaches(&basket, pickup_radius, basket_z_min, &e.position, &cb.shape)
                })
            })
            .map(|(id, _)| id)
            .collect()
    };

    for human in candidates {
        trace!(human = ?human, "HOIST_PICKUP_CANDIDATE");
        if hoist::pick_up_human(ctx, vehicle, human) {
            return Some(human);
        }
    }
    None
}

/// 支持面の上面高さ
///
/// `pos` が支持面の上（許容差込み）にある場合に上面の z を返します。
/// 上面より下にいる場合は「中空」とみなして `None` を返します。
///
/// # 引数
/// * `tar_pos` - 支持面エンティティの位置
/// * `cb` - 支持面エンティティの接触範囲
/// * `pos` - 判定する位置
/// * `z_tolerance` - z 許容差（負の値は 0 扱い）
pub fn support_surface_height(
    tar_pos: &Position3D,
    cb: &ContactBounds,
    pos: &Position3D,
    z_tolerance: f64,
) -> Option<f64> {
    let tol = z_tolerance.max(0.0);
    let top = match &cb.shape {
        ContactShape::Spherical { radius } => {
            if pos.distance_xy(tar_pos) > *radius {
                return None;
            }
            tar_pos.z + radius
        }
        ContactShape::Cylindrical { radius, z_max, .. } => {
            if pos.distance_xy(tar_pos) > *radius {
                return None;
            }
            tar_pos.z + z_max
        }
        ContactShape::Rectangular(b) => {
            let top = tar_pos.z + b.z_max;
            if pos.z + tol < top {
                return None;
            }
            let (lx, ly) = b.to_local(pos.x - tar_pos.x, pos.y - tar_pos.y);
            if !b.contains_xy(lx, ly, 0.0) {
                return None;
            }
            top
        }
    };
    (pos.z + tol >= top).then_some(top)
}

/// 位置 `pos` の真下にある最も高い地面（支持面またはシーンの地表高度）
///
/// `exclude` のエンティティ自身は支持面として扱いません。
pub fn find_ground(
    registry: &ObjectRegistry,
    pos: &Position3D,
    exclude: Option<EntityId>,
    ground_elevation: f64,
    z_tolerance: f64,
) -> f64 {
    registry
        .iter()
        .filter(|(id, _)| Some(*id) != exclude)
        .filter_map(|(_, e)| {
            let cb = e.contact.as_ref().filter(|cb| cb.is_support_surface())?;
            support_surface_height(&e.position, cb, pos, z_tolerance)
        })
        .fold(ground_elevation, f64::max)
}

/// 位置 `pos` が上面に乗っている支持面の一覧
///
/// 上面との高さの差が許容差以内のものを、レジストリ順で返します。
/// 着陸時の接地リストとして使います。
pub fn find_ground_contacts(
    registry: &ObjectRegistry,
    pos: &Position3D,
    exclude: Option<EntityId>,
    z_tolerance: f64,
) -> Vec<EntityId> {
    let tol = z_tolerance.max(0.0);
    registry
        .iter()
        .filter(|(id, _)| Some(*id) != exclude)
        .filter(|(_, e)| !matches!(e.kind, EntityKind::Human(_) | EntityKind::Aircraft(_)))
        .filter_map(|(id, e)| {
            let cb = e.contact.as_ref().filter(|cb| cb.is_support_surface())?;
            let top = support_surface_height(&e.position, cb, pos, tol)?;
            ((pos.z - top).abs() <= tol).then_some(id)
        })
        .collect()
}
