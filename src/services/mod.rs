pub mod board;
pub mod composer;
pub mod message_service;
pub mod storage_service;
