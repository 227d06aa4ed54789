mod adapter;
mod config;
mod engine;
