pub mod centroid_accumulator;
pub mod coordinate;
pub mod depth_estimator;
pub mod division_unit;
pub mod frame_tabulator;
pub mod stereo_correspondence;
pub mod utils;
