pub mod archive;
pub mod classifier;
pub mod downloader;
pub mod java;
pub mod normalizer;
pub mod traits;
pub mod validator;

pub use traits::{BuildIdValidator, JavaProvider, ModloaderInstaller};
