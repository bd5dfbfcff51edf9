pub mod canvas;
pub mod subscription;
