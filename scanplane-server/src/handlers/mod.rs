pub mod adapters;
pub mod health;
pub mod hooks;
pub mod projects;
pub mod scan;
