#![deny(rust_2018_idioms)]

pub mod value;

pub mod column;
pub mod config;
pub mod transform;
pub mod validate;

pub mod read;
pub use read::function::{read_grid, read_rows};

pub mod xlsx;

pub mod write;
pub use write::function::write;

pub mod select;
pub use select::function::{group_data, partition};

pub mod naming;
pub mod stats;

pub mod run;
pub use run::function::run;

pub mod merge;
pub use merge::function::{merge, prepare as prepare_merge};
