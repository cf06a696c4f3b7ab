pub mod catalog;
pub mod events;
pub mod image;
pub mod params;

pub use catalog::*;
pub use events::*;
pub use image::*;
pub use params::*;
