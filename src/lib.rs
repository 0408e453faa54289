//! 救助シミュレーションのコア（接触検知・救助ホイスト・ミッション管理）

pub mod context;
pub mod logging;
pub mod models;
pub mod scenario;
pub mod simulation;
