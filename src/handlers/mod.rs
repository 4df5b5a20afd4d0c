pub mod health_handlers;
pub mod message_handlers;
pub mod page_handlers;
pub mod status_handlers;
pub mod upload_handlers;
