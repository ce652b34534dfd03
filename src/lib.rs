pub mod cache;
pub mod catalog;
pub mod commands;
pub mod config;
pub mod files;
pub mod ignore;
pub mod imaging;
pub mod job;
pub mod metadata;
pub mod notify;
pub mod queue;
pub mod service;
pub mod tracker;
pub mod worker;
