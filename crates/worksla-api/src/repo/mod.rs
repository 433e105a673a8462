pub mod assignees;
pub mod settings;
pub mod work_items;

pub use assignees::AssigneeRepo;
pub use settings::SettingsRepo;
pub use work_items::{WorkItemFilters, WorkItemRepo, WorkItemStats};
