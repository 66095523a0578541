pub mod kibana;
pub mod render;
