pub mod kml;
pub mod links;
pub mod text;

pub use kml::parse_placemarks;
pub use text::{mine, MinedText};
