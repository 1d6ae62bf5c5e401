pub mod audit_repository;
pub mod models;
pub mod referral_repository;
pub mod revenue_repository;
pub mod task_repository;
pub mod transaction_repository;
pub mod user_repository;
pub mod wallet_repository;
