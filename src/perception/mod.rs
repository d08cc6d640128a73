pub mod annotator;
pub mod capture;
