pub mod image_helper;
pub mod synthetic_scene;
