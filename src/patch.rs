mod patch_table;

pub use patch_table::{PatchTable, Patcher};
