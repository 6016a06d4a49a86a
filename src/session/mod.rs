pub mod answers;
pub mod controller;
pub mod driver;
pub mod model;
pub mod navigation;
pub mod timer;
pub mod variants;
