pub mod matcher;
pub mod volume_index;
