pub mod cell;
pub mod directive;
pub mod driver;
pub mod error;
pub mod model;
pub mod results;
pub mod task;
pub mod value;
