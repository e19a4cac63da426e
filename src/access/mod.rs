//! Pure authorization rules: who can see a task, who can move its status.

mod status;
mod visibility;

pub use status::can_update_status;
pub use visibility::can_view;
