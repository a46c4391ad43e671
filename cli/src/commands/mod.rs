mod export;
mod goal;
mod helpers;
mod progress;
mod user;
mod weight;

pub(crate) use export::{cmd_export, cmd_import};
pub(crate) use goal::{cmd_goal_clear, cmd_goal_set, cmd_goal_show};
pub(crate) use helpers::resolve_user;
pub(crate) use progress::cmd_progress;
pub(crate) use user::cmd_user_add;
pub(crate) use weight::{cmd_weight_delete, cmd_weight_history, cmd_weight_log, cmd_weight_update};
