//! Contact Manager - a REST backend for contacts, groups and their history.
//!
//! # Overview
//!
//! Contacts can be created, filtered, sorted, paginated, starred, grouped,
//! bulk-edited and exported as CSV or JSON. Groups keep a count of the
//! contacts that reference them. Every mutation is recorded in an
//! append-only activity log, and a dashboard summarises the collection.
//!
//! # Consistency
//!
//! Writes that touch several records (a contact and its groups, a group and
//! its members) run in one SQLite transaction. The activity log is written
//! afterwards by a background subscriber and never fails the operation that
//! produced the entry.
//!
//! # Modules
//!
//! - [`model`]: Entities, request payloads and response envelopes
//! - [`validation`]: Input normalisation and field validation
//! - [`query`]: Query-string parsing for listings and exports
//! - [`storage`]: SQLite storage layer
//! - [`activity`]: Audit log publisher and subscriber
//! - [`export`]: CSV and JSON rendering
//! - [`analytics`]: Dashboard aggregation
//! - [`api`]: HTTP routes and handlers
//! - [`config`]: Environment configuration
//! - [`error`]: API error type

pub mod activity;
pub mod analytics;
pub mod api;
pub mod config;
pub mod error;
pub mod export;
pub mod model;
pub mod query;
pub mod storage;
pub mod validation;
