pub mod endpoint_service;
pub mod event;
pub mod heartbeat_service;
pub mod link;
pub mod management_service;
pub mod panel_service;
pub mod recovery_service;
