// 基本的なデータ型と数学ユーティリティ
pub mod common;

// 外部の協調先インターフェース（trait）定義
pub mod traits;

// エンティティとレジストリ
pub mod entity;
pub mod events;
pub mod player;

// 接触検知・ホイスト・ミッション
pub mod contact;
pub mod hoist;
pub mod mission;

// 便利な re-export
pub use common::*;
pub use traits::*;
pub use entity::{Entity, EntityId, EntityKind, ObjectRegistry, Target};
pub use contact::{ContactBounds, ContactShape, CrashFlags, RectBounds};
pub use hoist::{Hoist, HoistDeployment, HoistState};
pub use mission::{Mission, MissionError, MissionState, MissionStatus, Objective, ObjectiveKind, ObjectiveState};
