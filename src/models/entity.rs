use bitflags::bitflags;
use slotmap::{SlotMap, new_key_type};

use crate::models::{
    common::{Direction3D, Position3D, Velocity3D},
    contact::ContactBounds,
    hoist::Hoist,
};

new_key_type! {
    /// レジストリ上のエンティティハンドル（スロット＋世代）
    ///
    /// 削除済みのハンドルは世代が一致しないため、参照しても `None` になります。
    pub struct EntityId;
}

/// 参照先の指定
///
/// 「なし」「プレイヤー」「特定エンティティ」を区別します。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    #[default]
    None,
    Player,
    Entity(EntityId),
}

impl Target {
    /// プレイヤーハンドルを使って実体のハンドルへ解決
    pub fn resolve(&self, player: Option<EntityId>) -> Option<EntityId> {
        match self {
            Target::None => None,
            Target::Player => player,
            Target::Entity(id) => Some(*id),
        }
    }
}

bitflags! {
    /// 人物の状態フラグ
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HumanFlags: u16 {
        const NEED_RESCUE = 1 << 0;
        const SIT_DOWN    = 1 << 1;
        const LYING       = 1 << 2;
        const IN_WATER    = 1 << 3;
        const RUN         = 1 << 4;
        const GRIPPED     = 1 << 5;
    }
}

/// 人物（要救助者を含む）
#[derive(Debug, Clone, PartialEq)]
pub struct Human {
    pub flags: HumanFlags,
    /// 質量（kg）
    pub mass: f64,
    /// 機内に収容されたときにプレイヤーへ表示するメッセージ
    pub enter_message: Option<String>,
}

impl Human {
    pub fn new(mass: f64, needs_rescue: bool) -> Self {
        let flags = if needs_rescue {
            HumanFlags::NEED_RESCUE
        } else {
            HumanFlags::empty()
        };
        Self {
            flags,
            mass,
            enter_message: None,
        }
    }

    pub fn needs_rescue(&self) -> bool {
        self.flags.contains(HumanFlags::NEED_RESCUE)
    }
}

/// 救助用ドア
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RescueDoor {
    pub open: bool,
    /// 開いたまま固定されている
    pub stay_open: bool,
}

/// 機体（ホイストを持ちうる乗り物）
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Aircraft {
    pub crew: u32,
    pub passengers: u32,
    pub passengers_max: u32,
    /// 搭乗者の合計質量（kg）
    pub passengers_mass: f64,
    pub hoist: Option<Hoist>,
    pub rescue_door: Option<RescueDoor>,
    pub landed: bool,
    pub crashed: bool,
}

impl Aircraft {
    pub fn new(passengers_max: u32) -> Self {
        Self {
            crew: 1,
            passengers_max,
            landed: true,
            ..Self::default()
        }
    }

    pub fn has_room(&self) -> bool {
        self.passengers < self.passengers_max
    }
}

/// エンティティの種類
#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    Aircraft(Aircraft),
    Human(Human),
    Helipad,
    Runway,
    Building,
    Ground,
    Static,
}

impl EntityKind {
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Aircraft(_) => "aircraft",
            EntityKind::Human(_) => "human",
            EntityKind::Helipad => "helipad",
            EntityKind::Runway => "runway",
            EntityKind::Building => "building",
            EntityKind::Ground => "ground",
            EntityKind::Static => "static",
        }
    }
}

/// シミュレーション上のエンティティ
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub name: String,
    pub kind: EntityKind,
    pub position: Position3D,
    pub direction: Direction3D,
    /// 外部積分器の代役が使う一定速度
    pub velocity: Velocity3D,
    pub contact: Option<ContactBounds>,
}

impl Entity {
    pub fn new(name: impl Into<String>, kind: EntityKind, position: Position3D) -> Self {
        Self {
            name: name.into(),
            kind,
            position,
            direction: Direction3D::default(),
            velocity: Velocity3D::default(),
            contact: None,
        }
    }

    pub fn with_contact(mut self, contact: ContactBounds) -> Self {
        self.contact = Some(contact);
        let heading = self.direction.heading;
        self.set_heading(heading);
        self
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.set_heading(heading);
        self
    }

    /// heading を設定し、矩形接触範囲の cos/sin キャッシュも更新
    pub fn set_heading(&mut self, heading: f64) {
        self.direction.heading = heading;
        if let Some(contact) = self.contact.as_mut() {
            contact.set_heading(heading);
        }
    }

    pub fn aircraft(&self) -> Option<&Aircraft> {
        match &self.kind {
            EntityKind::Aircraft(a) => Some(a),
            _ => None,
        }
    }

    pub fn aircraft_mut(&mut self) -> Option<&mut Aircraft> {
        match &mut self.kind {
            EntityKind::Aircraft(a) => Some(a),
            _ => None,
        }
    }

    pub fn human(&self) -> Option<&Human> {
        match &self.kind {
            EntityKind::Human(h) => Some(h),
            _ => None,
        }
    }

    pub fn human_mut(&mut self) -> Option<&mut Human> {
        match &mut self.kind {
            EntityKind::Human(h) => Some(h),
            _ => None,
        }
    }

    pub fn hoist(&self) -> Option<&Hoist> {
        self.aircraft().and_then(|a| a.hoist.as_ref())
    }

    pub fn hoist_mut(&mut self) -> Option<&mut Hoist> {
        self.aircraft_mut().and_then(|a| a.hoist.as_mut())
    }

    /// 機内の乗客数（ホイストのバスケット内は含まない）
    pub fn passengers(&self) -> u32 {
        self.aircraft().map(|a| a.passengers).unwrap_or(0)
    }
}

/// エンティティレジストリ
///
/// 世代タグ付きのスロットで保持し、走査はスロット順で決定的に行います。
/// 削除後のハンドルは `is_valid` が false になります。
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    entities: SlotMap<EntityId, Entity>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entity: Entity) -> EntityId {
        self.entities.insert(entity)
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    pub fn is_valid(&self, id: EntityId) -> bool {
        self.entities.contains_key(id)
    }

    /// 削除して実体を返す。無効なハンドルなら `None`
    pub fn delete(&mut self, id: EntityId) -> Option<Entity> {
        self.entities.remove(id)
    }

    pub fn count(&self) -> usize {
        self.entities.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.entities.iter()
    }

    /// 現時点のハンドル一覧（削除を伴うループ用のスナップショット）
    pub fn ids(&self) -> Vec<EntityId> {
        self.entities.keys().collect()
    }

    /// 名前で検索（大文字小文字は区別しない）
    pub fn find_by_name(&self, name: &str) -> Option<EntityId> {
        self.entities
            .iter()
            .find(|(_, e)| e.name.eq_ignore_ascii_case(name))
            .map(|(id, _)| id)
    }

    pub fn name_of(&self, id: EntityId) -> Option<&str> {
        self.get(id).map(|e| e.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deleted_handle_is_invalid_and_not_reused() {
        let mut registry = ObjectRegistry::new();
        let a = registry.add(Entity::new("a", EntityKind::Static, Position3D::default()));
        assert!(registry.is_valid(a));

        assert!(registry.delete(a).is_some());
        assert!(!registry.is_valid(a));
        assert!(registry.get(a).is_none());
        assert!(registry.delete(a).is_none());

        // 同じスロットが再利用されても古いハンドルは無効のまま
        let b = registry.add(Entity::new("b", EntityKind::Static, Position3D::default()));
        assert!(registry.is_valid(b));
        assert!(!registry.is_valid(a));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_find_by_name_ignores_case() {
        let mut registry = ObjectRegistry::new();
        let pad = registry.add(Entity::new("Helipad1", EntityKind::Helipad, Position3D::default()));
        assert_eq!(registry.find_by_name("helipad1"), Some(pad));
        assert_eq!(registry.find_by_name("Helipad2"), None);
    }

    #[test]
    fn test_target_resolution() {
        let mut registry = ObjectRegistry::new();
        let player = registry.add(Entity::new("p", EntityKind::Aircraft(Aircraft::new(4)), Position3D::default()));
        let other = registry.add(Entity::new("o", EntityKind::Static, Position3D::default()));

        assert_eq!(Target::None.resolve(Some(player)), None);
        assert_eq!(Target::Player.resolve(Some(player)), Some(player));
        assert_eq!(Target::Player.resolve(None), None);
        assert_eq!(Target::Entity(other).resolve(Some(player)), Some(other));
    }
}
