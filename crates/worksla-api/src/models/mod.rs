pub mod allowlist_entry;
pub mod journal;
pub mod setting;
pub mod work_item;

pub use allowlist_entry::AllowlistEntry;
pub use journal::{ActivityEntry, ChangeDetail, JournalEntry};
pub use setting::Setting;
pub use work_item::{CustomField, WorkItemDetail, WorkItemRecord};
