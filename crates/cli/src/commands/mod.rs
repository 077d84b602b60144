pub mod modules;
pub mod status;
pub mod suspensions;
