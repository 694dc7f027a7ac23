#![allow(dead_code)]

pub mod couch_server;
pub mod scripted_store;
