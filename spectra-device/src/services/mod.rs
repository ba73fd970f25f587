pub mod actuator_service;
pub mod command_service;
pub mod heartbeat_service;
pub mod link_service;
pub mod publisher;
pub mod scheduler_service;
