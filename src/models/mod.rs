pub mod activity;
pub mod employee;
pub mod insights;
pub mod score;
pub mod task;
