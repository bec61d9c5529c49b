pub mod audit_log_service;
pub mod chain_anchor_service;
pub mod insights_service;
pub mod scoring_service;
pub mod task_service;
