pub mod capability;
pub mod conversation;
pub mod directory;
pub mod routing;
