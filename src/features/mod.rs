/// 健康检查
pub mod health;
/// 背景去除
pub mod removal;
