pub mod interactive_map;
pub mod static_map;
pub mod style;
