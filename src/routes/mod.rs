pub mod health;
pub mod logs;
pub mod scan;
pub mod scans;
pub mod stats;
