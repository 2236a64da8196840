pub mod biobert;
pub mod model;
pub mod t5;
