pub mod mutators;
pub mod recorder;
pub mod session;

pub use mutators::{
    StepPatch, delete_timeline_item_by_id, flatten_timeline_items, select_steps,
    timeline_items_to_create_steps, update_timeline_item_by_id,
};
pub use recorder::{
    RenameAction, RenameDedupState, RenameObservation, RenameRecord, StepIdGenerator,
    UuidStepIds, record_rename_column_step,
};
pub use session::{RecorderConfig, SheetRecorder};
