//! Folio - a self-hosted portfolio and blog CMS
//!
//! JSON API for projects, blog posts, contact inquiries and newsletter
//! subscriptions, backed by SQLite or MySQL.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
