pub mod canvas_repository;
pub mod mock_db;
pub mod postgres_canvas_repository;
pub mod postgres_subscription_repository;
pub mod subscription_repository;
