pub mod hardware;
pub mod process;
pub mod version;
