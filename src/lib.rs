#![deny(clippy::all)]

pub mod annotate;
pub mod config;
pub mod describe;
pub mod exam;
pub mod intake;
pub mod pipeline;
pub mod storage;
pub mod utils;
pub mod web;

#[macro_use]
extern crate napi_derive;
