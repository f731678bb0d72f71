pub mod backend_config;
pub mod backends;
pub mod errors;
pub mod frame;
pub mod geometry_utils;
pub mod perception;
pub mod status;
pub mod systems;
pub mod tether_interface;
pub mod theme;

pub type Point2D = (f32, f32);
