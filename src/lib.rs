//! `attachback`: back up Gmail attachments to a local folder.
//!
//! This crate provides the library behind the `attachback` binary:
//! authenticating against the Gmail API, walking the messages that match a
//! search query, and saving the attachments whose content type matches a
//! filter without downloading anything twice.

pub mod auth;
pub mod config;
pub mod download;
pub mod error;
pub mod export;
pub mod gmail;
pub mod mailbox;
pub mod model;
pub mod records;
