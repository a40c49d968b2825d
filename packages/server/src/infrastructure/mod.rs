//! Infrastructure 層：永続化、ワイヤフォーマット、外部連携の具体実装

pub mod config;
pub mod dto;
pub mod geo;
pub mod repository;
pub mod sanitizer;
pub mod webhook;
