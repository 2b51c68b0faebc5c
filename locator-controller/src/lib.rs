#![doc = include_str!("../../doc_include.md")]

pub mod config;
pub mod deck;
pub mod error;
pub mod geometry;
pub mod input;
pub mod jog_controller;
pub mod motion_gateway;
pub mod path_builder;
pub mod resource_teacher;
pub mod session;
pub mod setup;
pub mod simulated;
pub mod tip_teacher;
