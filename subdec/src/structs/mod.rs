pub mod item;
pub mod params;
pub mod timestamp;
