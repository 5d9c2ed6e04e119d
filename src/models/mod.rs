// Data models for decoded frames and hand landmark observations

pub mod capture;
pub mod pose;
