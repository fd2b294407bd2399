pub mod download;
pub mod init_config;
pub mod search;
