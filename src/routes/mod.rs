pub mod billing;
pub mod canvases;
pub mod stripe;
