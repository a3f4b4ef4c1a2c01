pub mod batch;
pub mod config;
pub mod db;
pub mod engine;
pub mod errors;
pub mod fingerprint;
pub mod metadata;
pub mod model;
pub mod normalize;
pub mod probe;
pub mod report;
pub mod scoring;
pub mod script;
pub mod settings;
pub mod storage;
